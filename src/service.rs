//! Service layer API for invoice lifecycle operations
use crate::authz::AuthorizationGate;
use crate::effects::SideEffectOrchestrator;
use crate::error::{LifecycleError, ValidationError, abort, settle};
use crate::finance::DEFAULT_PAYMENT_TERM_DAYS;
use crate::invoice::{Invoice, InvoiceAmendment, InvoiceDraft, InvoiceStatus};
use crate::outbox::{OutboxTask, effects_for};
use crate::provider::Provider;
use crate::store::{Store, decode, encode};
use crate::types::{CalendarDate, TimeStamp};
use crate::utils;
use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;
use tracing::{info, instrument, warn};

const RESUBMIT_INVOICE: &str = "invoices.resubmit";

pub struct InvoiceService {
    store: Store,
    gate: AuthorizationGate,
    effects: SideEffectOrchestrator,
    default_payment_term_days: u32,
}

/// Optional inputs that accompany an administrative transition.
#[derive(Debug, Default, Clone)]
pub struct TransitionContext {
    pub notes: Option<String>,
    pub payment_date: Option<CalendarDate>,
    pub project_id: Option<String>,
    pub categoria: Option<String>,
    pub payment_term_days: Option<u32>,
    pub expected_etag: Option<String>, // reject the write if the row changed since it was read
}

impl TransitionContext {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_owned());
        self
    }
    pub fn with_payment_date(mut self, date: CalendarDate) -> Self {
        self.payment_date = Some(date);
        self
    }
    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_owned());
        self
    }
    pub fn with_categoria(mut self, categoria: &str) -> Self {
        self.categoria = Some(categoria.to_owned());
        self
    }
    pub fn with_payment_term_days(mut self, days: u32) -> Self {
        self.payment_term_days = Some(days);
        self
    }
    pub fn expecting_etag(mut self, etag: &str) -> Self {
        self.expected_etag = Some(etag.to_owned());
        self
    }
    fn trimmed_notes(&self) -> Option<String> {
        self.notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
    }
}

fn not_found(entity: &'static str, id: &str) -> LifecycleError {
    LifecycleError::NotFound {
        entity,
        id: id.to_owned(),
    }
}

fn invalid(from: InvoiceStatus, to: InvoiceStatus, reason: &str) -> LifecycleError {
    LifecycleError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.to_owned(),
    }
}

impl InvoiceService {
    pub fn new(store: Store, gate: AuthorizationGate, effects: SideEffectOrchestrator) -> Self {
        Self {
            store,
            gate,
            effects,
            default_payment_term_days: DEFAULT_PAYMENT_TERM_DAYS,
        }
    }

    pub fn with_default_payment_term(mut self, days: u32) -> Self {
        self.default_payment_term_days = days;
        self
    }

    pub fn effects(&self) -> &SideEffectOrchestrator {
        &self.effects
    }

    pub fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, LifecycleError> {
        self.store
            .get(invoice_id)?
            .ok_or_else(|| not_found("invoice", invoice_id))
    }

    pub fn invoices_for_provider(&self, provider_id: &str) -> Result<Vec<Invoice>, LifecycleError> {
        let mut invoices = self
            .store
            .scan::<Invoice>(|i| i.provider_id == provider_id)?;
        invoices.sort_by_key(|i| i.radicado_number);
        Ok(invoices)
    }

    pub fn invoices_for_project(&self, project_id: &str) -> Result<Vec<Invoice>, LifecycleError> {
        let mut invoices = self
            .store
            .scan::<Invoice>(|i| i.project_id.as_deref() == Some(project_id))?;
        invoices.sort_by_key(|i| i.radicado_number);
        Ok(invoices)
    }

    /// Targets `actor_role` may move the invoice to right now. Drives the admin action buttons.
    pub fn allowed_targets(
        &self,
        invoice_id: &str,
        actor_role: &str,
    ) -> Result<Vec<InvoiceStatus>, LifecycleError> {
        let invoice = self.get_invoice(invoice_id)?;

        Ok(invoice
            .status
            .allowed_targets()
            .iter()
            .copied()
            .filter(|target| {
                target
                    .required_action()
                    .is_some_and(|action| self.gate.is_permitted(actor_role, action))
            })
            .collect())
    }

    /// Provider portal intake: validates the draft and files it as `pending` with a new radicado
    #[instrument(skip(self, draft))]
    pub fn submit_invoice(&self, draft: InvoiceDraft) -> Result<Invoice, LifecycleError> {
        let provider_id = draft
            .provider_id()
            .ok_or(ValidationError::MissingField("provider"))?
            .to_owned();
        let provider: Provider = self
            .store
            .get(&provider_id)?
            .ok_or_else(|| not_found("provider", &provider_id))?;
        if !provider.is_validated() {
            return Err(ValidationError::ProviderNotValidated(provider_id).into());
        }

        // validate before drawing a radicado so rejected drafts leave no gaps
        let mut invoice = draft.validate_and_finalise(
            utils::new_id(utils::INVOICE_HRP)?,
            0,
            self.default_payment_term_days,
        )?;
        invoice.radicado_number = self.store.next_radicado()?;
        self.store.insert(&invoice)?;

        info!(
            invoice_id = %invoice.id,
            radicado = invoice.radicado_number,
            provider_id = %invoice.provider_id,
            "invoice submitted"
        );
        Ok(invoice)
    }

    /// Provider edit of a returned invoice. Puts it back to `pending` and clears the admin notes.
    #[instrument(skip(self, amendment))]
    pub fn resubmit_invoice(
        &self,
        invoice_id: &str,
        provider_id: &str,
        amendment: InvoiceAmendment,
    ) -> Result<Invoice, LifecycleError> {
        let invoice = settle(self.store.invoices.transaction(
            |tx| -> ConflictableTransactionResult<Invoice, LifecycleError> {
                let Some(raw) = tx.get(invoice_id.as_bytes())? else {
                    return Err(abort(not_found("invoice", invoice_id)));
                };
                let mut invoice: Invoice = decode(&raw).map_err(|e| abort(LifecycleError::from(e)))?;

                if invoice.provider_id != provider_id {
                    return Err(abort(LifecycleError::Forbidden {
                        role: format!("provider {provider_id}"),
                        action: RESUBMIT_INVOICE,
                    }));
                }
                if invoice.status != InvoiceStatus::Returned {
                    return Err(abort(invalid(
                        invoice.status,
                        InvoiceStatus::Pending,
                        "only returned invoices can be resubmitted",
                    )));
                }

                invoice
                    .apply_amendment(amendment.clone())
                    .map_err(|e| abort(LifecycleError::from(e)))?;
                invoice.status = InvoiceStatus::Pending;
                invoice.admin_notes = None;
                invoice.updated_at = TimeStamp::now();

                let cbor = encode(&invoice).map_err(|e| abort(LifecycleError::from(e)))?;
                tx.insert(invoice_id.as_bytes(), cbor)?;
                Ok(invoice)
            },
        ))?;

        info!(invoice_id, radicado = invoice.radicado_number, "invoice resubmitted by provider");
        Ok(invoice)
    }

    /// Move an invoice to `target` on behalf of `actor_role`.
    ///
    /// The status write, its administrative reclassification and the queued
    /// side effects commit in one transaction that re-validates the row and
    /// the target project, so two concurrent requests cannot both move the
    /// same invoice and a project deleted mid-request is never linked. Effects run
    /// after the commit and never turn a committed transition into an error.
    #[instrument(skip(self, context))]
    pub fn request_transition(
        &self,
        invoice_id: &str,
        target: InvoiceStatus,
        actor_role: &str,
        context: TransitionContext,
    ) -> Result<Invoice, LifecycleError> {
        let Some(action) = target.required_action() else {
            let current = self.get_invoice(invoice_id)?;
            return Err(invalid(
                current.status,
                target,
                "an invoice returns to pending only when the provider resubmits it",
            ));
        };
        if let Err(e) = self.gate.authorize(actor_role, action) {
            warn!(invoice_id, actor_role, action, "transition denied");
            return Err(e);
        }

        let notes = context.trimmed_notes();
        if context.payment_term_days == Some(0) {
            return Err(ValidationError::InvalidPaymentTerm.into());
        }

        let effects = effects_for(target);
        let task_ids = effects
            .iter()
            .map(|_| utils::new_id(utils::TASK_HRP))
            .collect::<Result<Vec<_>, _>>()?;
        let today = CalendarDate::today();
        let invoices = &self.store.invoices;
        let outbox = &self.store.outbox;
        let projects = &self.store.projects;

        let committed = settle((invoices, outbox, projects).transaction(
            |(invoices, outbox, projects)| -> ConflictableTransactionResult<Invoice, LifecycleError> {
                let Some(raw) = invoices.get(invoice_id.as_bytes())? else {
                    return Err(abort(not_found("invoice", invoice_id)));
                };
                let mut invoice: Invoice = decode(&raw).map_err(|e| abort(LifecycleError::from(e)))?;
                let from = invoice.status;

                if let Some(expected) = &context.expected_etag {
                    let current = invoice.etag().map_err(|e| abort(LifecycleError::from(e)))?;
                    if &current != expected {
                        return Err(abort(LifecycleError::Conflict {
                            entity: "invoice",
                            id: invoice_id.to_owned(),
                        }));
                    }
                }
                if target == InvoiceStatus::Returned && notes.is_none() {
                    return Err(abort(invalid(from, target, "notes required to return")));
                }
                if !from.can_transition_to(target) {
                    let reason = if from.is_terminal() {
                        format!("{from} is final")
                    } else {
                        format!("{target} is not reachable from {from}")
                    };
                    return Err(abort(invalid(from, target, &reason)));
                }
                // the queued expense is built from the project held at approval
                let project_locked = invoice.expense_id.is_some()
                    || (from == InvoiceStatus::Approved && invoice.project_id.is_some());
                if project_locked
                    && context.project_id.is_some()
                    && context.project_id != invoice.project_id
                {
                    return Err(abort(invalid(
                        from,
                        target,
                        "the project cannot change once the invoice was approved with one",
                    )));
                }
                if let Some(project_id) = &context.project_id {
                    if projects.get(project_id.as_bytes())?.is_none() {
                        return Err(abort(not_found("project", project_id)));
                    }
                }

                invoice.status = target;
                if let Some(notes) = &notes {
                    invoice.admin_notes = Some(notes.clone());
                }
                if let Some(project_id) = &context.project_id {
                    invoice.project_id = Some(project_id.clone());
                }
                if let Some(categoria) = &context.categoria {
                    invoice.categoria = Some(categoria.clone());
                }
                if let Some(days) = context.payment_term_days {
                    invoice.payment_term_days = days;
                }
                if target == InvoiceStatus::Paid {
                    invoice.payment_date = Some(context.payment_date.unwrap_or(today));
                }
                invoice.updated_at = TimeStamp::now();

                let cbor = encode(&invoice).map_err(|e| abort(LifecycleError::from(e)))?;
                invoices.insert(invoice_id.as_bytes(), cbor)?;

                for (kind, task_id) in effects.iter().zip(&task_ids) {
                    let task = OutboxTask::new(task_id.clone(), invoice_id, *kind, target);
                    let cbor = encode(&task).map_err(|e| abort(LifecycleError::from(e)))?;
                    outbox.insert(task_id.as_bytes(), cbor)?;
                }

                Ok(invoice)
            },
        ))?;

        info!(
            invoice_id,
            radicado = committed.radicado_number,
            actor_role,
            status = %committed.status,
            "invoice transition committed"
        );

        if effects.is_empty() {
            return Ok(committed);
        }
        let report = self.effects.run_for_invoice(invoice_id);
        if !report.is_clean() {
            warn!(invoice_id, failed = report.failed.len(), "side effects pending retry");
        }

        // effects may have linked an expense; fall back to the committed row on read errors
        match self.store.get::<Invoice>(invoice_id) {
            Ok(Some(invoice)) => Ok(invoice),
            _ => Ok(committed),
        }
    }
}
