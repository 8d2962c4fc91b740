//! Invoice record, lifecycle states and the provider-side draft
use crate::authz::actions;
use crate::error::{StoreError, ValidationError};
use crate::finance::{self, TaxBreakdown};
use crate::types::{CalendarDate, TimeStamp};
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    InReview,
    #[n(2)]
    Approved,
    #[n(3)]
    Returned,
    #[n(4)]
    Rejected,
    #[n(5)]
    Paid,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceType {
    #[n(0)]
    FormalInvoice,
    #[n(1)]
    HonorariumReceipt, // cuenta de cobro
}

/// One provider billing document.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Invoice {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub radicado_number: u64, // intake ticket, assigned once
    #[n(2)]
    pub invoice_type: InvoiceType,
    #[n(3)]
    pub invoice_number: String, // the vendor's own document number
    #[n(4)]
    pub description: Option<String>,
    #[n(5)]
    pub amount: u64, // gross total as submitted
    #[n(6)]
    pub net_value: Option<u64>,
    #[n(7)]
    pub tax_percentage: Option<f64>,
    #[n(8)]
    pub tax_value: Option<u64>,
    #[n(9)]
    pub total_with_tax: Option<u64>,
    #[n(10)]
    pub payment_term_days: u32,
    #[n(11)]
    pub provider_id: String,
    #[n(12)]
    pub project_id: Option<String>,
    #[n(13)]
    pub categoria: Option<String>,
    #[n(14)]
    pub expense_id: Option<String>, // written by the orchestrator only
    #[n(15)]
    pub status: InvoiceStatus,
    #[n(16)]
    pub admin_notes: Option<String>,
    #[n(17)]
    pub payment_date: Option<CalendarDate>,
    #[n(18)]
    pub issue_date: CalendarDate,
    #[n(19)]
    pub created_at: TimeStamp,
    #[n(20)]
    pub updated_at: TimeStamp,
}

/// Portal submission. Becomes an [`Invoice`] once validated and given a radicado.
#[derive(Debug, Default, Clone)]
pub struct InvoiceDraft {
    provider_id: Option<String>,
    invoice_type: Option<InvoiceType>,
    invoice_number: Option<String>,
    description: Option<String>,
    amount: u64,
    net_value: Option<u64>,
    tax_percentage: Option<f64>,
    issue_date: Option<CalendarDate>,
    payment_term_days: Option<u32>,
}

/// Provider corrections applied when resubmitting a returned invoice.
/// `None` leaves the stored value as it is.
#[derive(Debug, Default, Clone)]
pub struct InvoiceAmendment {
    pub invoice_type: Option<InvoiceType>,
    pub invoice_number: Option<String>,
    pub description: Option<String>,
    pub amount: Option<u64>,
    pub net_value: Option<u64>,
    pub tax_percentage: Option<f64>,
    pub issue_date: Option<CalendarDate>,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::InReview => "in_review",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Returned => "returned",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Paid => "paid",
        }
    }
    /// Label shown to vendors in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "Pendiente",
            InvoiceStatus::InReview => "En revisión",
            InvoiceStatus::Approved => "Aprobada",
            InvoiceStatus::Returned => "Devuelta",
            InvoiceStatus::Rejected => "Rechazada",
            InvoiceStatus::Paid => "Pagada",
        }
    }
    /// Targets an administrator may move an invoice to from this state.
    ///
    /// `Returned -> Pending` is absent on purpose: only the provider's
    /// resubmission reopens a returned invoice.
    pub fn allowed_targets(&self) -> &'static [InvoiceStatus] {
        use InvoiceStatus::*;

        match self {
            Pending => &[InReview, Approved, Returned, Rejected],
            InReview => &[Approved, Returned, Rejected],
            Approved => &[Paid],
            Returned | Rejected | Paid => &[],
        }
    }
    pub fn can_transition_to(&self, target: InvoiceStatus) -> bool {
        self.allowed_targets().contains(&target)
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Rejected | InvoiceStatus::Paid)
    }
    /// Token an actor needs to move an invoice into this state.
    pub fn required_action(&self) -> Option<&'static str> {
        match self {
            InvoiceStatus::Pending => None,
            InvoiceStatus::InReview => Some(actions::REVIEW_INVOICE),
            InvoiceStatus::Approved => Some(actions::APPROVE_EXPENSE),
            InvoiceStatus::Returned => Some(actions::RETURN_INVOICE),
            InvoiceStatus::Rejected => Some(actions::REJECT_INVOICE),
            InvoiceStatus::Paid => Some(actions::PAY_INVOICE),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "in_review" => Ok(InvoiceStatus::InReview),
            "approved" => Ok(InvoiceStatus::Approved),
            "returned" => Ok(InvoiceStatus::Returned),
            "rejected" => Ok(InvoiceStatus::Rejected),
            "paid" => Ok(InvoiceStatus::Paid),
            other => Err(format!("unknown invoice status '{other}'")),
        }
    }
}

impl InvoiceType {
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceType::FormalInvoice => "Factura",
            InvoiceType::HonorariumReceipt => "Cuenta de cobro",
        }
    }
}

impl Invoice {
    /// Content hash of the stored row. Changes on every write.
    pub fn etag(&self) -> Result<String, StoreError> {
        let cbor = minicbor::to_vec(self).map_err(|e| StoreError::Encode {
            entity: "invoice",
            reason: e.to_string(),
        })?;

        Ok(sha256::digest(&cbor))
    }
    pub fn estimated_payment_date(&self) -> Option<CalendarDate> {
        finance::estimate_payment_date(self.issue_date, self.payment_term_days)
    }
    /// Gross figures for ledger entries: the decomposed total when present.
    pub fn billed_total(&self) -> u64 {
        self.total_with_tax.unwrap_or(self.amount)
    }
    /// Replace the provider-editable fields, re-deriving tax figures.
    pub fn apply_amendment(&mut self, amendment: InvoiceAmendment) -> Result<(), ValidationError> {
        if let Some(invoice_type) = amendment.invoice_type {
            self.invoice_type = invoice_type;
        }
        if let Some(number) = amendment.invoice_number {
            self.invoice_number = number;
        }
        if amendment.description.is_some() {
            self.description = amendment.description;
        }
        if let Some(amount) = amendment.amount {
            self.amount = amount;
        }
        if let Some(issue_date) = amendment.issue_date {
            self.issue_date = issue_date;
        }

        let net_value = amendment.net_value.or(self.net_value);
        let tax_percentage = amendment.tax_percentage.or(self.tax_percentage);
        let breakdown = derive_financials(self.amount, net_value, tax_percentage)?;

        if self.invoice_number.trim().is_empty() {
            return Err(ValidationError::MissingField("invoice number"));
        }

        self.net_value = breakdown.map(|b| b.net_value);
        self.tax_percentage = breakdown.and(tax_percentage);
        self.tax_value = breakdown.map(|b| b.tax_value);
        self.total_with_tax = breakdown.map(|b| b.total_with_tax);

        Ok(())
    }
}

impl InvoiceDraft {
    /// Construct a new draft, filled in by the provider portal
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_provider(mut self, provider_id: &str) -> Self {
        self.provider_id = Some(provider_id.to_owned());
        self
    }
    pub fn set_invoice_type(mut self, invoice_type: InvoiceType) -> Self {
        self.invoice_type = Some(invoice_type);
        self
    }
    pub fn set_invoice_number(mut self, number: &str) -> Self {
        self.invoice_number = Some(number.to_owned());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }
    pub fn set_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }
    pub fn set_net_value(mut self, net_value: u64) -> Self {
        self.net_value = Some(net_value);
        self
    }
    pub fn set_tax_percentage(mut self, percentage: f64) -> Self {
        self.tax_percentage = Some(percentage);
        self
    }
    pub fn set_issue_date(mut self, date: CalendarDate) -> Self {
        self.issue_date = Some(date);
        self
    }
    pub fn set_payment_term_days(mut self, days: u32) -> Self {
        self.payment_term_days = Some(days);
        self
    }
    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }
    // Checks fields and derives the tax breakdown, returning the invoice ready to store
    pub fn validate_and_finalise(
        self,
        id: String,
        radicado_number: u64,
        default_payment_term_days: u32,
    ) -> Result<Invoice, ValidationError> {
        let provider_id = self
            .provider_id
            .filter(|p| !p.trim().is_empty())
            .ok_or(ValidationError::MissingField("provider"))?;
        let invoice_type = self
            .invoice_type
            .ok_or(ValidationError::MissingField("invoice type"))?;
        let invoice_number = self
            .invoice_number
            .filter(|n| !n.trim().is_empty())
            .ok_or(ValidationError::MissingField("invoice number"))?;
        let issue_date = self
            .issue_date
            .ok_or(ValidationError::MissingField("issue date"))?;
        let payment_term_days = self.payment_term_days.unwrap_or(default_payment_term_days);
        if payment_term_days == 0 {
            return Err(ValidationError::InvalidPaymentTerm);
        }

        let breakdown = derive_financials(self.amount, self.net_value, self.tax_percentage)?;
        let now = TimeStamp::now();

        Ok(Invoice {
            id,
            radicado_number,
            invoice_type,
            invoice_number,
            description: self.description,
            amount: self.amount,
            net_value: breakdown.map(|b| b.net_value),
            tax_percentage: breakdown.and(self.tax_percentage),
            tax_value: breakdown.map(|b| b.tax_value),
            total_with_tax: breakdown.map(|b| b.total_with_tax),
            payment_term_days,
            provider_id,
            project_id: None,
            categoria: None,
            expense_id: None,
            status: InvoiceStatus::Pending,
            admin_notes: None,
            payment_date: None,
            issue_date,
            created_at: now,
            updated_at: now,
        })
    }
}

// A percentage without a net value means the amount already includes tax.
fn derive_financials(
    amount: u64,
    net_value: Option<u64>,
    tax_percentage: Option<f64>,
) -> Result<Option<TaxBreakdown>, ValidationError> {
    if amount == 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    if let Some(pct) = tax_percentage {
        if !(0.0..=100.0).contains(&pct) {
            return Err(ValidationError::TaxPercentageOutOfRange(pct));
        }
    }
    if let Some(net) = net_value {
        if net == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        if net > amount {
            return Err(ValidationError::NetExceedsAmount { net, amount });
        }
    }

    Ok(match (net_value, tax_percentage) {
        (Some(net), Some(pct)) => Some(finance::compute_tax(net, pct)),
        (Some(net), None) => Some(finance::compute_tax(net, 0.0)),
        (None, Some(pct)) => Some(finance::decompose_gross(amount, pct)),
        (None, None) => None,
    })
}
