//! Connected-account onboarding status for payees.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl OnboardingStatus {
    /// Derives the status from the three capability flags on an account.
    pub fn from_capabilities(
        charges_enabled: bool,
        payouts_enabled: bool,
        details_submitted: bool,
    ) -> Self {
        match (charges_enabled, payouts_enabled, details_submitted) {
            (true, true, true) => OnboardingStatus::Complete,
            (_, _, true) => OnboardingStatus::InProgress,
            _ => OnboardingStatus::NotStarted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStatus::NotStarted => "not_started",
            OnboardingStatus::InProgress => "in_progress",
            OnboardingStatus::Complete => "complete",
        }
    }
}

impl FromStr for OnboardingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(OnboardingStatus::NotStarted),
            "in_progress" => Ok(OnboardingStatus::InProgress),
            "complete" => Ok(OnboardingStatus::Complete),
            other => Err(ValidationError::invalid_format(
                "onboarding_status",
                format!("unknown onboarding status '{}'", other),
            )),
        }
    }
}
