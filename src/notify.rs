//! Notification contracts and status-change message composition
use crate::error::NotifyError;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::provider::{OnboardingStatus, Provider};
use crate::store::Store;
use crate::types::TimeStamp;
use crate::utils;

/// Structured context attached to every notification.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct NotificationMeta {
    #[n(0)]
    pub subject_id: String, // invoice or provider id
    #[n(1)]
    pub reference: Option<String>, // radicado, when the subject is an invoice
    #[n(2)]
    pub status: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct InAppNotification {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub message: String,
    #[n(4)]
    pub meta: NotificationMeta,
    #[n(5)]
    pub read: bool,
    #[n(6)]
    pub created_at: TimeStamp,
}

/// Outbound mail request handed to the mail-sending collaborator.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct EmailPayload {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub provider_id: String,
    #[n(2)]
    pub recipient: Option<String>, // relay resolves the provider's contact when absent
    #[n(3)]
    pub subject: String,
    #[n(4)]
    pub body: String,
    #[n(5)]
    pub meta: NotificationMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub title: String,
    pub body: String,
    pub meta: NotificationMeta,
}

/// Delivery channels. Callers treat both as fire-and-forget and only log failures.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        meta: &NotificationMeta,
    ) -> Result<(), NotifyError>;
    fn send_email(&self, payload: &EmailPayload) -> Result<(), NotifyError>;
}

/// Records in-app notifications and queues outbound mail in the store for a relay.
#[derive(Clone)]
pub struct StoreNotifier {
    store: Store,
}

impl StoreNotifier {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl Notifier for StoreNotifier {
    fn send(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        meta: &NotificationMeta,
    ) -> Result<(), NotifyError> {
        let notification = InAppNotification {
            id: utils::new_id(utils::NOTIFICATION_HRP)?,
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            message: message.to_owned(),
            meta: meta.clone(),
            read: false,
            created_at: TimeStamp::now(),
        };

        self.store.insert(&notification)?;
        Ok(())
    }

    fn send_email(&self, payload: &EmailPayload) -> Result<(), NotifyError> {
        self.store.insert(payload)?;
        Ok(())
    }
}

/// Message sent to the vendor when one of their invoices changes state.
pub fn invoice_status_message(invoice: &Invoice, status: InvoiceStatus) -> StatusMessage {
    let mut body = format!(
        "Tu {} {} (radicado #{}) cambió a estado: {}.",
        invoice.invoice_type.label().to_lowercase(),
        invoice.invoice_number,
        invoice.radicado_number,
        status.label(),
    );
    if let Some(notes) = invoice.admin_notes.as_deref().filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!("\nObservaciones: {}", notes.trim()));
    }
    if let (InvoiceStatus::Paid, Some(date)) = (status, invoice.payment_date) {
        body.push_str(&format!("\nFecha de pago: {date}"));
    }

    StatusMessage {
        title: format!("{} {}: {}", invoice.invoice_type.label(), invoice.invoice_number, status.label()),
        body,
        meta: NotificationMeta {
            subject_id: invoice.id.clone(),
            reference: Some(invoice.radicado_number.to_string()),
            status: status.as_str().to_owned(),
        },
    }
}

pub fn onboarding_status_message(provider: &Provider, status: OnboardingStatus) -> StatusMessage {
    let mut body = format!(
        "El perfil de proveedor {} cambió a estado: {}.",
        provider.name,
        status.label()
    );
    if let Some(notes) = provider.admin_notes.as_deref().filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!("\nObservaciones: {}", notes.trim()));
    }

    StatusMessage {
        title: format!("Perfil de proveedor: {}", status.label()),
        body,
        meta: NotificationMeta {
            subject_id: provider.id.clone(),
            reference: None,
            status: status.as_str().to_owned(),
        },
    }
}

impl StatusMessage {
    pub fn into_email(self, id: String, provider_id: &str, recipient: Option<String>) -> EmailPayload {
        EmailPayload {
            id,
            provider_id: provider_id.to_owned(),
            recipient,
            subject: self.title,
            body: self.body,
            meta: self.meta,
        }
    }
}
