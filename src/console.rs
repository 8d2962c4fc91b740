//! Wires the store, gate, notifier and services from one configuration
use crate::authz::AuthorizationGate;
use crate::cascade::CascadeCoordinator;
use crate::effects::SideEffectOrchestrator;
use crate::error::StoreError;
use crate::notify::{Notifier, StoreNotifier};
use crate::onboarding::ProviderService;
use crate::service::InvoiceService;
use crate::settings::ConsoleConfig;
use crate::store::Store;
use std::sync::Arc;

pub struct Console {
    pub store: Store,
    pub invoices: InvoiceService,
    pub providers: ProviderService,
    pub projects: CascadeCoordinator<Store>,
}

impl Console {
    /// Open the configured store and deliver notifications through it.
    pub fn open(config: &ConsoleConfig) -> Result<Self, StoreError> {
        let store = Store::open(&config.storage.path)?;
        let notifier = Arc::new(StoreNotifier::new(store.clone()));
        Ok(Self::assemble(config, store, notifier))
    }

    /// Build on an existing store with a caller-supplied notifier.
    pub fn assemble(config: &ConsoleConfig, store: Store, notifier: Arc<dyn Notifier>) -> Self {
        let gate = AuthorizationGate::new(config.permission_table());
        let effects = SideEffectOrchestrator::new(store.clone(), notifier.clone());

        Self {
            invoices: InvoiceService::new(store.clone(), gate.clone(), effects)
                .with_default_payment_term(config.invoices.default_payment_term_days),
            providers: ProviderService::new(store.clone(), gate, notifier),
            projects: CascadeCoordinator::new(store.clone()),
            store,
        }
    }
}
