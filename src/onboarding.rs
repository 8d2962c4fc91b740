//! Provider onboarding status gate
use crate::authz::AuthorizationGate;
use crate::error::{LifecycleError, ValidationError, abort, settle};
use crate::notify::{Notifier, onboarding_status_message};
use crate::provider::{OnboardingStatus, Provider};
use crate::store::{Store, decode, encode};
use crate::types::TimeStamp;
use crate::utils;
use sled::transaction::ConflictableTransactionResult;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct ProviderService {
    store: Store,
    gate: AuthorizationGate,
    notifier: Arc<dyn Notifier>,
}

fn not_found(id: &str) -> LifecycleError {
    LifecycleError::NotFound {
        entity: "provider",
        id: id.to_owned(),
    }
}

fn invalid(from: OnboardingStatus, to: OnboardingStatus, reason: &str) -> LifecycleError {
    LifecycleError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.to_owned(),
    }
}

impl ProviderService {
    pub fn new(store: Store, gate: AuthorizationGate, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            gate,
            notifier,
        }
    }

    /// Register a vendor profile. It starts under review.
    #[instrument(skip(self))]
    pub fn register_provider(
        &self,
        name: &str,
        email: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Provider, LifecycleError> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("provider name").into());
        }
        let provider = Provider::new(utils::new_id(utils::PROVIDER_HRP)?, name, email, user_id);
        self.store.insert(&provider)?;

        info!(provider_id = %provider.id, "provider registered");
        Ok(provider)
    }

    pub fn get_provider(&self, provider_id: &str) -> Result<Provider, LifecycleError> {
        self.store
            .get(provider_id)?
            .ok_or_else(|| not_found(provider_id))
    }

    /// Attach the portal user that receives in-app notifications.
    pub fn link_user(&self, provider_id: &str, user_id: &str) -> Result<Provider, LifecycleError> {
        self.update(provider_id, |provider| {
            provider.user_id = Some(user_id.to_owned());
            Ok(())
        })
    }

    /// Validate or return a provider profile under review.
    #[instrument(skip(self, notes))]
    pub fn request_onboarding_transition(
        &self,
        provider_id: &str,
        target: OnboardingStatus,
        actor_role: &str,
        notes: Option<&str>,
    ) -> Result<Provider, LifecycleError> {
        let Some(action) = target.required_action() else {
            let current = self.get_provider(provider_id)?;
            return Err(invalid(
                current.onboarding_status,
                target,
                "a profile goes back under review only when the provider resubmits it",
            ));
        };
        if let Err(e) = self.gate.authorize(actor_role, action) {
            warn!(provider_id, actor_role, action, "onboarding transition denied");
            return Err(e);
        }
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        let provider = self.update(provider_id, |provider| {
            let from = provider.onboarding_status;
            if target == OnboardingStatus::Returned && notes.is_none() {
                return Err(invalid(from, target, "notes required to return"));
            }
            if !from.can_transition_to(target) {
                return Err(invalid(from, target, "transition not allowed"));
            }
            provider.onboarding_status = target;
            if let Some(notes) = notes {
                provider.admin_notes = Some(notes.to_owned());
            }
            Ok(())
        })?;

        info!(provider_id, status = %target, actor_role, "onboarding status changed");
        self.notify(&provider);
        Ok(provider)
    }

    /// Provider correction of a returned profile. Sends it back under review.
    #[instrument(skip(self))]
    pub fn resubmit_profile(
        &self,
        provider_id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Provider, LifecycleError> {
        self.update(provider_id, |provider| {
            let from = provider.onboarding_status;
            if from != OnboardingStatus::Returned {
                return Err(invalid(
                    from,
                    OnboardingStatus::UnderReview,
                    "only returned profiles can be resubmitted",
                ));
            }
            if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
                provider.name = name.to_owned();
            }
            if let Some(email) = email {
                provider.email = Some(email.to_owned());
            }
            provider.onboarding_status = OnboardingStatus::UnderReview;
            provider.admin_notes = None;
            Ok(())
        })
    }

    // read-modify-write of one provider row inside a transaction
    fn update(
        &self,
        provider_id: &str,
        change: impl Fn(&mut Provider) -> Result<(), LifecycleError>,
    ) -> Result<Provider, LifecycleError> {
        settle(self.store.providers.transaction(
            |tx| -> ConflictableTransactionResult<Provider, LifecycleError> {
                let Some(raw) = tx.get(provider_id.as_bytes())? else {
                    return Err(abort(not_found(provider_id)));
                };
                let mut provider: Provider = decode(&raw).map_err(|e| abort(LifecycleError::from(e)))?;

                change(&mut provider).map_err(abort)?;
                provider.updated_at = TimeStamp::now();

                let cbor = encode(&provider).map_err(|e| abort(LifecycleError::from(e)))?;
                tx.insert(provider_id.as_bytes(), cbor)?;
                Ok(provider)
            },
        ))
    }

    // best-effort: a vendor missing a notice never undoes the status change
    fn notify(&self, provider: &Provider) {
        let message = onboarding_status_message(provider, provider.onboarding_status);

        match utils::new_id(utils::NOTIFICATION_HRP) {
            Ok(id) => {
                let payload = message
                    .clone()
                    .into_email(id, &provider.id, provider.email.clone());
                if let Err(e) = self.notifier.send_email(&payload) {
                    warn!(provider_id = %provider.id, error = %e, "onboarding email failed");
                }
            }
            Err(e) => warn!(provider_id = %provider.id, error = %e, "onboarding email skipped"),
        }

        match &provider.user_id {
            Some(user_id) => {
                if let Err(e) = self
                    .notifier
                    .send(user_id, &message.title, &message.body, &message.meta)
                {
                    warn!(provider_id = %provider.id, error = %e, "onboarding in-app notification failed");
                }
            }
            None => debug!(provider_id = %provider.id, "provider has no linked user"),
        }
    }
}
