//! Post-transition side effects: expense materialization and vendor notification.
//!
//! Effects are best-effort. A failure is logged and the outbox task stays queued;
//! nothing here ever fails the transition that queued it. Each task is claimed
//! before it runs, so overlapping runs deliver every effect once.
use crate::error::{EffectError, StoreError, abort, settle};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::notify::{Notifier, invoice_status_message};
use crate::outbox::{EffectKind, OutboxTask};
use crate::project::Expense;
use crate::provider::Provider;
use crate::store::{Store, decode, encode};
use crate::types::TimeStamp;
use crate::utils;
use rayon::prelude::*;
use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct SideEffectOrchestrator {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    Created(String),
    AlreadyLinked(String), // the invoice already points at an expense
    NoProject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFailure {
    pub invoice_id: String,
    pub kind: EffectKind,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EffectsReport {
    pub completed: Vec<(String, EffectKind)>,
    pub failed: Vec<EffectFailure>,
    pub parked: Vec<EffectFailure>, // out of attempts, left queued but no longer retried
    pub in_flight: usize,           // claimed by another worker, left alone
}

impl EffectsReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.parked.is_empty()
    }
}

/// What happened to one queued task during a run.
enum Attempt {
    Done(OutboxTask, Vec<u8>),
    Failed(OutboxTask, Vec<u8>, EffectError),
    Parked(OutboxTask),
    Unclaimed(OutboxTask, StoreError),
    Busy,
    Gone,
}

impl SideEffectOrchestrator {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Run every queued effect of one invoice. Returns once all have finished or failed.
    #[instrument(skip(self))]
    pub fn run_for_invoice(&self, invoice_id: &str) -> EffectsReport {
        match self.store.scan::<OutboxTask>(|t| t.invoice_id == invoice_id) {
            Ok(tasks) => self.run(tasks),
            Err(e) => {
                error!(invoice_id, error = %e, "could not read queued side effects");
                EffectsReport::default()
            }
        }
    }

    /// Retry everything left in the outbox, e.g. after a crash or a relay outage.
    #[instrument(skip(self))]
    pub fn drain_pending(&self) -> Result<EffectsReport, StoreError> {
        let tasks = self.store.scan::<OutboxTask>(|_| true)?;
        info!(pending = tasks.len(), "draining side-effect outbox");
        Ok(self.run(tasks))
    }

    pub fn pending(&self) -> Result<Vec<OutboxTask>, StoreError> {
        self.store.scan::<OutboxTask>(|_| true)
    }

    fn run(&self, tasks: Vec<OutboxTask>) -> EffectsReport {
        let attempts: Vec<Attempt> = tasks
            .into_par_iter()
            .map(|task| match self.claim(&task.id) {
                Ok(attempt) => attempt,
                Err(e) => Attempt::Unclaimed(task, e),
            })
            .collect();

        let mut report = EffectsReport::default();
        for attempt in attempts {
            match attempt {
                Attempt::Done(task, claimed) => {
                    self.release(&task.id, claimed, None);
                    report.completed.push((task.invoice_id, task.kind));
                }
                Attempt::Failed(mut task, claimed, e) => {
                    let reason = e.to_string();
                    task.record_failure(&reason);
                    task.claimed_at = None;
                    if task.is_exhausted() {
                        error!(
                            invoice_id = %task.invoice_id,
                            effect = %task.kind,
                            attempts = task.attempts,
                            error = %reason,
                            "side effect out of attempts, parked"
                        );
                    } else {
                        warn!(
                            invoice_id = %task.invoice_id,
                            effect = %task.kind,
                            attempts = task.attempts,
                            error = %reason,
                            "side effect failed, kept for retry"
                        );
                    }
                    match encode(&task) {
                        Ok(cbor) => self.release(&task.id, claimed, Some(cbor)),
                        Err(store_err) => {
                            error!(task_id = %task.id, error = %store_err, "could not record effect failure")
                        }
                    }
                    report.failed.push(EffectFailure {
                        invoice_id: task.invoice_id,
                        kind: task.kind,
                        error: reason,
                    });
                }
                Attempt::Parked(task) => report.parked.push(EffectFailure {
                    invoice_id: task.invoice_id,
                    kind: task.kind,
                    error: task.last_error.unwrap_or_default(),
                }),
                Attempt::Unclaimed(task, e) => {
                    error!(task_id = %task.id, error = %e, "could not claim side effect");
                    report.failed.push(EffectFailure {
                        invoice_id: task.invoice_id,
                        kind: task.kind,
                        error: e.to_string(),
                    });
                }
                Attempt::Busy => report.in_flight += 1,
                Attempt::Gone => {}
            }
        }
        report
    }

    /// Stamp the task as ours and run it. Loses quietly to a live claim held elsewhere.
    fn claim(&self, task_id: &str) -> Result<Attempt, StoreError> {
        let outbox = &self.store.outbox;
        loop {
            let Some(current) = outbox.get(task_id.as_bytes())? else {
                return Ok(Attempt::Gone);
            };
            let mut task: OutboxTask = decode(&current)?;
            if task.is_exhausted() {
                return Ok(Attempt::Parked(task));
            }
            let now = TimeStamp::now();
            if task.is_claimed(now) {
                debug!(task_id, "side effect claimed by another worker");
                return Ok(Attempt::Busy);
            }

            task.claimed_at = Some(now);
            let claimed = encode(&task)?;
            if outbox
                .compare_and_swap(task_id.as_bytes(), Some(current), Some(claimed.clone()))?
                .is_err()
            {
                continue;
            }

            return Ok(match self.execute(&task) {
                Ok(()) => Attempt::Done(task, claimed),
                Err(e) => Attempt::Failed(task, claimed, e),
            });
        }
    }

    /// Replace our claimed row with `next`, or remove it when the effect is done.
    fn release(&self, task_id: &str, claimed: Vec<u8>, next: Option<Vec<u8>>) {
        match self
            .store
            .outbox
            .compare_and_swap(task_id.as_bytes(), Some(claimed), next)
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!(task_id, "claim expired before the side effect was settled"),
            Err(e) => error!(task_id, error = %e, "could not settle outbox task"),
        }
    }

    fn execute(&self, task: &OutboxTask) -> Result<(), EffectError> {
        match task.kind {
            EffectKind::MaterializeExpense => self.materialize_expense(&task.invoice_id).map(|_| ()),
            EffectKind::NotifyEmail => self.notify_email(&task.invoice_id, task.status),
            EffectKind::NotifyInApp => self.notify_in_app(&task.invoice_id, task.status).map(|_| ()),
        }
    }

    fn load(&self, invoice_id: &str) -> Result<(Invoice, Option<Provider>), EffectError> {
        let invoice: Invoice = self
            .store
            .get(invoice_id)?
            .ok_or_else(|| EffectError::MissingInvoice(invoice_id.to_owned()))?;
        let provider = self.store.get::<Provider>(&invoice.provider_id)?;
        Ok((invoice, provider))
    }

    /// Create the ledger expense for an approved invoice, at most once.
    ///
    /// The expense insert and the `expense_id` write-back commit together and
    /// only while the invoice has no expense, so repeated calls are no-ops.
    pub fn materialize_expense(&self, invoice_id: &str) -> Result<Materialization, EffectError> {
        let expense_id = utils::new_id(utils::EXPENSE_HRP)?;
        let invoices = &self.store.invoices;
        let expenses = &self.store.expenses;
        let projects = &self.store.projects;

        let outcome = settle((invoices, expenses, projects).transaction(
            |(invoices, expenses, projects)| -> ConflictableTransactionResult<Materialization, EffectError> {
                let Some(raw) = invoices.get(invoice_id.as_bytes())? else {
                    return Err(abort(EffectError::MissingInvoice(invoice_id.to_owned())));
                };
                let mut invoice: Invoice =
                    decode(&raw).map_err(|e| abort(EffectError::from(e)))?;

                if let Some(existing) = &invoice.expense_id {
                    return Ok(Materialization::AlreadyLinked(existing.clone()));
                }
                if !matches!(invoice.status, InvoiceStatus::Approved | InvoiceStatus::Paid) {
                    return Err(abort(EffectError::NotApproved {
                        id: invoice.id.clone(),
                        status: invoice.status.to_string(),
                    }));
                }
                let Some(project_id) = invoice.project_id.clone() else {
                    return Ok(Materialization::NoProject);
                };
                if projects.get(project_id.as_bytes())?.is_none() {
                    return Err(abort(EffectError::MissingProject(project_id)));
                }

                let expense = Expense::from_invoice(expense_id.clone(), &invoice, project_id);
                let expense_cbor = encode(&expense).map_err(|e| abort(EffectError::from(e)))?;
                expenses.insert(expense_id.as_bytes(), expense_cbor)?;

                invoice.expense_id = Some(expense_id.clone());
                invoice.updated_at = TimeStamp::now();
                let invoice_cbor = encode(&invoice).map_err(|e| abort(EffectError::from(e)))?;
                invoices.insert(invoice_id.as_bytes(), invoice_cbor)?;

                Ok(Materialization::Created(expense_id.clone()))
            },
        ))?;

        match &outcome {
            Materialization::Created(id) => info!(invoice_id, expense_id = %id, "expense created from approved invoice"),
            Materialization::AlreadyLinked(id) => debug!(invoice_id, expense_id = %id, "invoice already has an expense"),
            Materialization::NoProject => info!(invoice_id, "approved without a project, no expense created"),
        }
        Ok(outcome)
    }

    fn notify_email(&self, invoice_id: &str, status: InvoiceStatus) -> Result<(), EffectError> {
        let (invoice, provider) = self.load(invoice_id)?;
        let recipient = provider.and_then(|p| p.email);
        let payload = invoice_status_message(&invoice, status).into_email(
            utils::new_id(utils::NOTIFICATION_HRP)?,
            &invoice.provider_id,
            recipient,
        );

        self.notifier.send_email(&payload)?;
        debug!(invoice_id, status = %status, "status email queued");
        Ok(())
    }

    fn notify_in_app(&self, invoice_id: &str, status: InvoiceStatus) -> Result<Delivery, EffectError> {
        let (invoice, provider) = self.load(invoice_id)?;
        let Some(user_id) = provider.and_then(|p| p.user_id) else {
            debug!(invoice_id, "provider has no linked user, in-app notification skipped");
            return Ok(Delivery::Skipped);
        };
        let message = invoice_status_message(&invoice, status);

        self.notifier
            .send(&user_id, &message.title, &message.body, &message.meta)?;
        Ok(Delivery::Sent)
    }
}
