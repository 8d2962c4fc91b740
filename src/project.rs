//! Project aggregate and the dependent rows removed with it
use crate::invoice::Invoice;
use crate::types::{CalendarDate, TimeStamp};

/// Category recorded on expenses created before finance classifies them.
pub const PENDING_CATEGORY: &str = "pending";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Project {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub client: Option<String>,
    #[n(3)]
    pub created_at: TimeStamp,
}

/// Ledger entry owned by accounting, created from an approved invoice.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Expense {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub project_id: String,
    #[n(2)]
    pub provider_id: Option<String>,
    #[n(3)]
    pub source_invoice_id: Option<String>,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub category: String,
    #[n(6)]
    pub amount: u64,
    #[n(7)]
    pub net_value: Option<u64>,
    #[n(8)]
    pub tax_percentage: Option<f64>,
    #[n(9)]
    pub tax_value: Option<u64>,
    #[n(10)]
    pub total_with_tax: Option<u64>,
    #[n(11)]
    pub issue_date: CalendarDate,
    #[n(12)]
    pub due_date: Option<CalendarDate>,
    #[n(13)]
    pub observations: String,
    #[n(14)]
    pub created_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDeliverable {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub expense_id: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub created_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub project_id: String,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub amount: u64,
    #[n(4)]
    pub created_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub project_id: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub done: bool,
    #[n(4)]
    pub created_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub project_id: String,
    #[n(2)]
    pub author: String,
    #[n(3)]
    pub body: String,
    #[n(4)]
    pub created_at: TimeStamp,
}

/// Rows that live and die with a single project.
pub trait ProjectScoped {
    fn project_id(&self) -> &str;
}

impl Project {
    pub fn new(id: String, name: &str, client: Option<&str>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            client: client.map(str::to_owned),
            created_at: TimeStamp::now(),
        }
    }
}

impl Expense {
    /// Ledger copy of an approved invoice. Due date is issue date plus the payment term.
    pub fn from_invoice(id: String, invoice: &Invoice, project_id: String) -> Self {
        let mut observations = format!("Radicado #{}", invoice.radicado_number);
        if let Some(notes) = invoice.admin_notes.as_deref().filter(|n| !n.trim().is_empty()) {
            observations.push_str(" - ");
            observations.push_str(notes.trim());
        }
        let description = match &invoice.description {
            Some(d) if !d.trim().is_empty() => d.clone(),
            _ => format!("{} {}", invoice.invoice_type.label(), invoice.invoice_number),
        };

        Self {
            id,
            project_id,
            provider_id: Some(invoice.provider_id.clone()),
            source_invoice_id: Some(invoice.id.clone()),
            description,
            category: invoice
                .categoria
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| PENDING_CATEGORY.to_owned()),
            amount: invoice.billed_total(),
            net_value: invoice.net_value,
            tax_percentage: invoice.tax_percentage,
            tax_value: invoice.tax_value,
            total_with_tax: invoice.total_with_tax,
            issue_date: invoice.issue_date,
            due_date: invoice.estimated_payment_date(),
            observations,
            created_at: TimeStamp::now(),
        }
    }
}

impl ExpenseDeliverable {
    pub fn new(id: String, expense_id: &str, name: &str) -> Self {
        Self {
            id,
            expense_id: expense_id.to_owned(),
            name: name.to_owned(),
            created_at: TimeStamp::now(),
        }
    }
}

impl Sale {
    pub fn new(id: String, project_id: &str, description: &str, amount: u64) -> Self {
        Self {
            id,
            project_id: project_id.to_owned(),
            description: description.to_owned(),
            amount,
            created_at: TimeStamp::now(),
        }
    }
}

impl Task {
    pub fn new(id: String, project_id: &str, title: &str) -> Self {
        Self {
            id,
            project_id: project_id.to_owned(),
            title: title.to_owned(),
            done: false,
            created_at: TimeStamp::now(),
        }
    }
}

impl Comment {
    pub fn new(id: String, project_id: &str, author: &str, body: &str) -> Self {
        Self {
            id,
            project_id: project_id.to_owned(),
            author: author.to_owned(),
            body: body.to_owned(),
            created_at: TimeStamp::now(),
        }
    }
}

impl ProjectScoped for Expense {
    fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl ProjectScoped for Sale {
    fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl ProjectScoped for Task {
    fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl ProjectScoped for Comment {
    fn project_id(&self) -> &str {
        &self.project_id
    }
}
