//! Durable queue of side effects owed after an invoice transition.
//!
//! Tasks are written in the same transaction as the status change, so a crash
//! between the status write and the effects leaves the work queued instead of
//! lost. A task is removed once its effect succeeds; failures stay queued with
//! an attempt counter until [`crate::effects::SideEffectOrchestrator::drain_pending`]
//! retries them.
//!
//! A worker claims a task before running it by stamping `claimed_at` with a
//! compare-and-swap, so concurrent runs never deliver the same effect twice.
//! A claim older than [`CLAIM_LEASE_SECS`] is treated as abandoned. After
//! [`MAX_ATTEMPTS`] failures a task is parked: it stays queued for inspection
//! but is no longer retried.
use crate::invoice::InvoiceStatus;
use crate::types::TimeStamp;
use chrono::TimeDelta;
use std::fmt;

pub const MAX_ATTEMPTS: u32 = 10;
pub const CLAIM_LEASE_SECS: i64 = 300;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    #[n(0)]
    MaterializeExpense,
    #[n(1)]
    NotifyEmail,
    #[n(2)]
    NotifyInApp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OutboxTask {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub invoice_id: String,
    #[n(2)]
    pub kind: EffectKind,
    #[n(3)]
    pub status: InvoiceStatus, // the status whose transition queued this task
    #[n(4)]
    pub attempts: u32,
    #[n(5)]
    pub last_error: Option<String>,
    #[n(6)]
    pub enqueued_at: TimeStamp,
    #[n(7)]
    pub claimed_at: Option<TimeStamp>, // set while a worker is running the effect
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::MaterializeExpense => "materialize_expense",
            EffectKind::NotifyEmail => "notify_email",
            EffectKind::NotifyInApp => "notify_in_app",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effects owed after an administrator moves an invoice into `status`.
pub fn effects_for(status: InvoiceStatus) -> &'static [EffectKind] {
    match status {
        InvoiceStatus::Approved => &[
            EffectKind::MaterializeExpense,
            EffectKind::NotifyEmail,
            EffectKind::NotifyInApp,
        ],
        InvoiceStatus::Pending => &[],
        _ => &[EffectKind::NotifyEmail, EffectKind::NotifyInApp],
    }
}

impl OutboxTask {
    pub fn new(id: String, invoice_id: &str, kind: EffectKind, status: InvoiceStatus) -> Self {
        Self {
            id,
            invoice_id: invoice_id.to_owned(),
            kind,
            status,
            attempts: 0,
            last_error: None,
            enqueued_at: TimeStamp::now(),
            claimed_at: None,
        }
    }
    pub fn record_failure(&mut self, error: &str) {
        self.attempts += 1;
        self.last_error = Some(error.to_owned());
    }
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }
    /// True while another worker holds an unexpired claim at `now`.
    pub fn is_claimed(&self, now: TimeStamp) -> bool {
        self.claimed_at.is_some_and(|claimed| {
            now.to_datetime_utc() - claimed.to_datetime_utc() < TimeDelta::seconds(CLAIM_LEASE_SECS)
        })
    }
}
