//! Role to action-token gate consulted before any lifecycle mutation
use crate::error::LifecycleError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Action tokens understood by the gate.
pub mod actions {
    pub const REVIEW_INVOICE: &str = "invoices.review";
    pub const APPROVE_EXPENSE: &str = "finance.approve_expense";
    pub const REJECT_INVOICE: &str = "invoices.reject";
    pub const RETURN_INVOICE: &str = "invoices.return";
    pub const PAY_INVOICE: &str = "finance.pay_invoice";
    pub const VALIDATE_PROVIDER: &str = "providers.validate";
    pub const RETURN_PROVIDER: &str = "providers.return";

    pub const ALL: [&str; 7] = [
        REVIEW_INVOICE,
        APPROVE_EXPENSE,
        REJECT_INVOICE,
        RETURN_INVOICE,
        PAY_INVOICE,
        VALIDATE_PROVIDER,
        RETURN_PROVIDER,
    ];
}

/// Read-only snapshot of role permissions, built once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionTable {
    roles: HashMap<String, HashSet<String>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn grant<I, S>(mut self, role: &str, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .entry(role.to_owned())
            .or_default()
            .extend(tokens.into_iter().map(Into::into));
        self
    }
    /// Roles shipped with the console when configuration names none.
    pub fn builtin() -> Self {
        use self::actions::*;

        Self::new()
            .grant("admin", ALL)
            .grant(
                "finance",
                [
                    REVIEW_INVOICE,
                    APPROVE_EXPENSE,
                    REJECT_INVOICE,
                    RETURN_INVOICE,
                    PAY_INVOICE,
                ],
            )
            .grant("coordinator", [REVIEW_INVOICE, RETURN_INVOICE, VALIDATE_PROVIDER, RETURN_PROVIDER])
            .grant("producer", [REVIEW_INVOICE])
    }
    pub fn from_map(map: &HashMap<String, Vec<String>>) -> Self {
        map.iter()
            .fold(Self::new(), |table, (role, tokens)| table.grant(role, tokens.iter().cloned()))
    }
    pub fn contains(&self, role: &str, action: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|tokens| tokens.contains(action))
    }
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    table: Arc<PermissionTable>,
}

impl AuthorizationGate {
    pub fn new(table: PermissionTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }
    pub fn is_permitted(&self, role: &str, action: &str) -> bool {
        self.table.contains(role, action)
    }
    pub fn authorize(&self, role: &str, action: &'static str) -> Result<(), LifecycleError> {
        if self.is_permitted(role, action) {
            return Ok(());
        }

        Err(LifecycleError::Forbidden {
            role: role.to_owned(),
            action,
        })
    }
}
