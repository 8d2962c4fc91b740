//! Provider (vendor) profile and its onboarding status
use crate::authz::actions;
use crate::types::TimeStamp;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnboardingStatus {
    #[n(0)]
    UnderReview,
    #[n(1)]
    Returned,
    #[n(2)]
    Validated,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: Option<String>,
    #[n(3)]
    pub user_id: Option<String>, // portal login, when the vendor has one
    #[n(4)]
    pub onboarding_status: OnboardingStatus,
    #[n(5)]
    pub admin_notes: Option<String>,
    #[n(6)]
    pub created_at: TimeStamp,
    #[n(7)]
    pub updated_at: TimeStamp,
}

impl OnboardingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStatus::UnderReview => "under_review",
            OnboardingStatus::Returned => "returned",
            OnboardingStatus::Validated => "validated",
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            OnboardingStatus::UnderReview => "En revisión",
            OnboardingStatus::Returned => "Devuelto",
            OnboardingStatus::Validated => "Validado",
        }
    }
    /// `Returned -> UnderReview` happens only through the provider's own resubmission.
    pub fn allowed_targets(&self) -> &'static [OnboardingStatus] {
        match self {
            OnboardingStatus::UnderReview => {
                &[OnboardingStatus::Validated, OnboardingStatus::Returned]
            }
            OnboardingStatus::Returned | OnboardingStatus::Validated => &[],
        }
    }
    pub fn can_transition_to(&self, target: OnboardingStatus) -> bool {
        self.allowed_targets().contains(&target)
    }
    pub fn required_action(&self) -> Option<&'static str> {
        match self {
            OnboardingStatus::UnderReview => None,
            OnboardingStatus::Returned => Some(actions::RETURN_PROVIDER),
            OnboardingStatus::Validated => Some(actions::VALIDATE_PROVIDER),
        }
    }
}

impl fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Provider {
    pub fn new(id: String, name: &str, email: Option<&str>, user_id: Option<&str>) -> Self {
        let now = TimeStamp::now();

        Self {
            id,
            name: name.trim().to_owned(),
            email: email.map(str::to_owned),
            user_id: user_id.map(str::to_owned),
            onboarding_status: OnboardingStatus::UnderReview,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
    pub fn is_validated(&self) -> bool {
        self.onboarding_status == OnboardingStatus::Validated
    }
}
