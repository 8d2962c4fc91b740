//! Identifier generation

use crate::error::StoreError;
use bech32::Bech32m;
use uuid7::uuid7;

pub const INVOICE_HRP: &str = "inv_";
pub const EXPENSE_HRP: &str = "exp_";
pub const PROVIDER_HRP: &str = "prov_";
pub const PROJECT_HRP: &str = "proj_";
pub const RECORD_HRP: &str = "rec_"; // sales, tasks, comments, deliverables
pub const TASK_HRP: &str = "job_"; // outbox tasks
pub const NOTIFICATION_HRP: &str = "note_";

// construct a unique time-ordered id then encode using bech32
pub fn new_id(hrp: &str) -> Result<String, StoreError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| StoreError::Identifier(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| StoreError::Identifier(e.to_string()))
}
