//! Portal session lifecycle states.

use serde::{Deserialize, Serialize};

/// Authentication state of the shared browsing context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No valid session; login required.
    Unauthenticated,
    /// Loading the login page.
    Navigating,
    /// Login form is open; credentials are being typed.
    AwaitingCredentialEntry,
    /// Captcha image sent to the admin; waiting for the reply.
    AwaitingCaptcha,
    /// Login form submitted; waiting for the redirect.
    SubmittingForm,
    /// Session is authenticated.
    Authenticated,
    /// Login attempts exhausted for this cycle.
    Failed,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Any state may fall back to `Unauthenticated` (relaunch) or move to
    /// `Failed`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Unauthenticated | Self::Failed)
                | (Self::Unauthenticated, Self::Navigating | Self::Authenticated)
                | (Self::Navigating, Self::AwaitingCredentialEntry)
                | (
                    Self::AwaitingCredentialEntry,
                    Self::AwaitingCaptcha | Self::SubmittingForm
                )
                | (Self::AwaitingCaptcha, Self::SubmittingForm)
                | (Self::SubmittingForm, Self::Authenticated)
                | (Self::Authenticated, Self::Navigating)
        )
    }
}
