//! Project deletion with best-effort removal of its dependents.
//!
//! Order: deliverables of the project's expenses, then expenses, sales, tasks,
//! comments and invoice links in parallel, then the project row. Dependents
//! are reconstructable relative to the project, so their failures are logged
//! and reported while the project delete is the only step that can fail the
//! call. Each sub-step is atomic on its own; the cascade as a whole is not.
use crate::error::{CascadeError, StoreError, abort, settle};
use crate::invoice::Invoice;
use crate::project::{Comment, Expense, ExpenseDeliverable, Project, Sale, Task};
use crate::store::{Record, Store, decode, encode};
use crate::types::TimeStamp;
use rayon::prelude::*;
use sled::Batch;
use sled::transaction::ConflictableTransactionResult;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeStep {
    ExpenseLookup,
    Deliverables,
    Expenses,
    Sales,
    Tasks,
    Comments,
    InvoiceLinks, // invoices keep their row and expense pointer, only the project link goes
}

/// Persistence operations the coordinator needs, keyed by project.
pub trait CascadeStore: Sync {
    fn project_exists(&self, project_id: &str) -> Result<bool, StoreError>;
    fn expense_ids_for_project(&self, project_id: &str) -> Result<Vec<String>, StoreError>;
    fn delete_deliverables(&self, expense_ids: &[String]) -> Result<usize, StoreError>;
    /// Remove (or for invoices, detach) every row of `step` tied to the project.
    fn delete_dependents(&self, step: CascadeStep, project_id: &str) -> Result<usize, StoreError>;
    fn delete_project(&self, project_id: &str) -> Result<(), StoreError>;
}

/// One dependent sub-step that failed without stopping the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubStepFailure {
    pub step: CascadeStep,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub project_id: String,
    pub removed: Vec<(CascadeStep, usize)>,
    pub failures: Vec<SubStepFailure>, // partial cascade failures, logged and returned
}

pub struct CascadeCoordinator<S> {
    store: S,
}

const PARALLEL_STEPS: [CascadeStep; 5] = [
    CascadeStep::Expenses,
    CascadeStep::Sales,
    CascadeStep::Tasks,
    CascadeStep::Comments,
    CascadeStep::InvoiceLinks,
];

impl CascadeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStep::ExpenseLookup => "expense_lookup",
            CascadeStep::Deliverables => "expense_deliverables",
            CascadeStep::Expenses => "expenses",
            CascadeStep::Sales => "sales",
            CascadeStep::Tasks => "tasks",
            CascadeStep::Comments => "comments",
            CascadeStep::InvoiceLinks => "invoice_links",
        }
    }
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
    pub fn removed(&self, step: CascadeStep) -> Option<usize> {
        self.removed
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, count)| *count)
    }
}

impl<S: CascadeStore> CascadeCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub fn delete_project(&self, project_id: &str) -> Result<CascadeReport, CascadeError> {
        if !self.store.project_exists(project_id)? {
            return Err(CascadeError::NotFound(project_id.to_owned()));
        }

        let mut report = CascadeReport {
            project_id: project_id.to_owned(),
            removed: Vec::new(),
            failures: Vec::new(),
        };

        // deliverables first, they would be orphaned once their expenses are gone
        match self.store.expense_ids_for_project(project_id) {
            Ok(expense_ids) if expense_ids.is_empty() => {}
            Ok(expense_ids) => {
                let outcome = self.store.delete_deliverables(&expense_ids);
                record(&mut report, CascadeStep::Deliverables, outcome);
            }
            Err(e) => record(&mut report, CascadeStep::ExpenseLookup, Err(e)),
        }

        let outcomes: Vec<(CascadeStep, Result<usize, StoreError>)> = PARALLEL_STEPS
            .par_iter()
            .map(|step| (*step, self.store.delete_dependents(*step, project_id)))
            .collect();
        for (step, outcome) in outcomes {
            record(&mut report, step, outcome);
        }

        if let Err(source) = self.store.delete_project(project_id) {
            error!(project_id, error = %source, "project row could not be deleted");
            return Err(CascadeError::Fatal {
                project_id: project_id.to_owned(),
                source,
            });
        }

        if report.is_clean() {
            info!(project_id, "project deleted with all dependents");
        } else {
            warn!(
                project_id,
                failed_steps = report.failures.len(),
                "project deleted, some dependents were left behind"
            );
        }
        Ok(report)
    }
}

fn record(report: &mut CascadeReport, step: CascadeStep, outcome: Result<usize, StoreError>) {
    match outcome {
        Ok(count) => report.removed.push((step, count)),
        Err(e) => {
            warn!(project_id = %report.project_id, step = %step, error = %e, "dependent deletion failed");
            report.failures.push(SubStepFailure {
                step,
                error: e.to_string(),
            });
        }
    }
}

impl CascadeStore for Store {
    fn project_exists(&self, project_id: &str) -> Result<bool, StoreError> {
        Ok(Project::tree(self).contains_key(project_id.as_bytes())?)
    }

    fn expense_ids_for_project(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .scan::<Expense>(|e| e.project_id == project_id)?
            .into_iter()
            .map(|e| e.id)
            .collect())
    }

    fn delete_deliverables(&self, expense_ids: &[String]) -> Result<usize, StoreError> {
        let owners: HashSet<&str> = expense_ids.iter().map(String::as_str).collect();
        let tree = ExpenseDeliverable::tree(self);
        let mut batch = Batch::default();
        let mut removed = 0;

        for entry in tree.iter() {
            let (key, bytes) = entry?;
            let deliverable: ExpenseDeliverable = decode(&bytes)?;
            if owners.contains(deliverable.expense_id.as_str()) {
                batch.remove(key);
                removed += 1;
            }
        }

        tree.apply_batch(batch)?;
        Ok(removed)
    }

    fn delete_dependents(&self, step: CascadeStep, project_id: &str) -> Result<usize, StoreError> {
        match step {
            CascadeStep::Expenses => self.remove_scoped::<Expense>(project_id),
            CascadeStep::Sales => self.remove_scoped::<Sale>(project_id),
            CascadeStep::Tasks => self.remove_scoped::<Task>(project_id),
            CascadeStep::Comments => self.remove_scoped::<Comment>(project_id),
            CascadeStep::InvoiceLinks => self.detach_invoices(project_id),
            CascadeStep::ExpenseLookup | CascadeStep::Deliverables => Ok(0),
        }
    }

    fn delete_project(&self, project_id: &str) -> Result<(), StoreError> {
        self.remove::<Project>(project_id)?;

        // links committed after the detach step; none can land once the row is gone
        match self.detach_invoices(project_id) {
            Ok(0) => {}
            Ok(late) => info!(project_id, late, "detached invoices linked during the cascade"),
            Err(e) => warn!(project_id, error = %e, "late invoice links could not be detached"),
        }
        Ok(())
    }
}

impl Store {
    /// Clear the project link of every invoice still pointing at `project_id`.
    ///
    /// Rows are re-read inside the transaction and only `project_id` changes, so
    /// a transition committed between the scan and the write is kept.
    fn detach_invoices(&self, project_id: &str) -> Result<usize, StoreError> {
        let keys: Vec<String> = self
            .scan::<Invoice>(|i| i.project_id.as_deref() == Some(project_id))?
            .into_iter()
            .map(|i| i.id)
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        settle(Invoice::tree(self).transaction(
            |tx| -> ConflictableTransactionResult<usize, StoreError> {
                let mut detached = 0;
                for key in &keys {
                    let Some(raw) = tx.get(key.as_bytes())? else {
                        continue;
                    };
                    let mut invoice: Invoice = decode(&raw).map_err(abort)?;
                    if invoice.project_id.as_deref() != Some(project_id) {
                        continue;
                    }
                    invoice.project_id = None;
                    invoice.updated_at = TimeStamp::now();
                    tx.insert(key.as_bytes(), encode(&invoice).map_err(abort)?)?;
                    detached += 1;
                }
                Ok(detached)
            },
        ))
    }
}
