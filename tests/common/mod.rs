//! Shared fixtures for the integration tests
#![allow(dead_code)]

use invoice_lifecycle::{
    Console,
    error::NotifyError,
    invoice::{Invoice, InvoiceDraft, InvoiceType},
    notify::{EmailPayload, NotificationMeta, Notifier},
    project::Project,
    provider::{OnboardingStatus, Provider},
    settings::ConsoleConfig,
    store::Store,
    types::CalendarDate,
    utils,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub struct InAppCall {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub meta: NotificationMeta,
}

/// Notifier double that records every call and can be switched to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub emails: Mutex<Vec<EmailPayload>>,
    pub in_app: Mutex<Vec<InAppCall>>,
    pub fail_email: AtomicBool,
    pub fail_in_app: AtomicBool,
}

impl RecordingNotifier {
    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }
    pub fn in_app_count(&self) -> usize {
        self.in_app.lock().unwrap().len()
    }
    pub fn set_failing(&self, email: bool, in_app: bool) {
        self.fail_email.store(email, Ordering::SeqCst);
        self.fail_in_app.store(in_app, Ordering::SeqCst);
    }
}

impl Notifier for RecordingNotifier {
    fn send(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        meta: &NotificationMeta,
    ) -> Result<(), NotifyError> {
        if self.fail_in_app.load(Ordering::SeqCst) {
            return Err(NotifyError::InApp("notification service unavailable".into()));
        }
        self.in_app.lock().unwrap().push(InAppCall {
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            message: message.to_owned(),
            meta: meta.clone(),
        });
        Ok(())
    }

    fn send_email(&self, payload: &EmailPayload) -> Result<(), NotifyError> {
        if self.fail_email.load(Ordering::SeqCst) {
            return Err(NotifyError::Email("smtp relay timed out".into()));
        }
        self.emails.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub console: Console,
    pub store: Store,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir, // dropped last, removes the database
}

// Sled locks its directory, so every test opens its own database under a temp dir.
pub fn fixture() -> anyhow::Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(dir.path().join("console.sled"))?;
    let notifier = Arc::new(RecordingNotifier::default());
    let console = Console::assemble(&ConsoleConfig::default(), store.clone(), notifier.clone());

    Ok(Fixture {
        console,
        store,
        notifier,
        _dir: dir,
    })
}

impl Fixture {
    pub fn validated_provider(&self, user_id: Option<&str>) -> anyhow::Result<Provider> {
        let provider = self.console.providers.register_provider(
            "Casa Productora Luz SAS",
            Some("cuentas@luz.co"),
            user_id,
        )?;
        Ok(self.console.providers.request_onboarding_transition(
            &provider.id,
            OnboardingStatus::Validated,
            "admin",
            None,
        )?)
    }

    pub fn project(&self, name: &str) -> anyhow::Result<Project> {
        let project = Project::new(utils::new_id(utils::PROJECT_HRP)?, name, None);
        self.store.insert(&project)?;
        Ok(project)
    }

    pub fn submitted(&self, provider: &Provider) -> anyhow::Result<Invoice> {
        Ok(self.console.invoices.submit_invoice(draft(&provider.id))?)
    }
}

pub fn draft(provider_id: &str) -> InvoiceDraft {
    InvoiceDraft::new()
        .set_provider(provider_id)
        .set_invoice_type(InvoiceType::FormalInvoice)
        .set_invoice_number("FE-1001")
        .set_amount(119_000)
        .set_net_value(100_000)
        .set_tax_percentage(19.0)
        .set_issue_date(CalendarDate::new(2024, 1, 1).unwrap())
}
