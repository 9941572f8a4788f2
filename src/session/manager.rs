//! Session state machine guaranteeing an authenticated browsing context.

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::config::{Credentials, PortalConfig};
use crate::models::session::SessionState;
use crate::{AppError, Result};

use super::captcha::CaptchaBroker;
use super::retry::{RetryDecision, RetryPolicy};
use super::BrowsingContext;

/// Where a navigation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Identity provider or a login path; the session is not valid.
    Login,
    /// The course portal; the session is valid.
    Portal,
    /// Anything else.
    Unexpected,
}

/// Classify a browser location against the portal configuration.
#[must_use]
pub fn classify_location(portal: &PortalConfig, location: &str) -> Location {
    let on_login_host = portal
        .login_hosts
        .iter()
        .any(|host| !host.is_empty() && location.contains(host.as_str()));
    if on_login_host || location.contains("login") {
        Location::Login
    } else if location.contains(portal.portal_host.as_str()) {
        Location::Portal
    } else {
        Location::Unexpected
    }
}

/// Drives the browsing context from any state to `Authenticated`.
pub struct SessionManager {
    browser: Arc<dyn BrowsingContext>,
    captcha: CaptchaBroker,
    portal: PortalConfig,
    credentials: Credentials,
    retry: RetryPolicy,
    state: SessionState,
}

impl SessionManager {
    /// Create a manager in the `Unauthenticated` state.
    #[must_use]
    pub fn new(
        browser: Arc<dyn BrowsingContext>,
        captcha: CaptchaBroker,
        portal: PortalConfig,
        credentials: Credentials,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            browser,
            captcha,
            portal,
            credentials,
            retry,
            state: SessionState::Unauthenticated,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::LoginFailed(format!(
                "invalid session transition {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Make sure the browsing context is alive, relaunching it if not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the relaunch fails; the context is
    /// shut down in that case.
    pub async fn ensure_healthy(&mut self) -> Result<()> {
        match self.browser.ping().await {
            Ok(true) => return Ok(()),
            Ok(false) => warn!("browsing context not responsive, relaunching"),
            Err(err) => warn!(%err, "browsing context probe failed, relaunching"),
        }
        self.relaunch().await
    }

    /// Start a fresh browsing context. Any session is lost.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the launch fails; the context is shut
    /// down in that case.
    pub async fn relaunch(&mut self) -> Result<()> {
        self.state = SessionState::Unauthenticated;
        if let Err(err) = self.browser.shutdown().await {
            warn!(%err, "failed to close previous browsing context");
        }
        if let Err(err) = self.browser.launch().await {
            if let Err(close_err) = self.browser.shutdown().await {
                warn!(%close_err, "failed to close half-started browsing context");
            }
            return Err(err);
        }
        info!("browsing context launched");
        Ok(())
    }

    async fn relaunch_with_second_try(&mut self) -> Result<()> {
        match self.relaunch().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%err, "relaunch failed, trying once more");
                tokio::time::sleep(self.retry.relaunch_delay()).await;
                self.relaunch().await
            }
        }
    }

    /// Probe whether the current session is still authenticated by loading
    /// `probe_url`.
    ///
    /// A navigation failure relaunches the context and reports the session
    /// as invalid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` only if that relaunch fails.
    pub async fn is_session_valid(&mut self, probe_url: &str) -> Result<bool> {
        match self.browser.navigate(probe_url).await {
            Ok(location) => match classify_location(&self.portal, &location) {
                Location::Portal => {
                    info!("session is active");
                    self.state = SessionState::Authenticated;
                    Ok(true)
                }
                Location::Login => {
                    info!(%location, "session expired, login required");
                    self.state = SessionState::Unauthenticated;
                    Ok(false)
                }
                Location::Unexpected => {
                    warn!(%location, "unexpected location, will log in");
                    self.state = SessionState::Unauthenticated;
                    Ok(false)
                }
            },
            Err(err) => {
                warn!(%err, "could not verify session, relaunching");
                self.relaunch_with_second_try().await?;
                Ok(false)
            }
        }
    }

    /// Log in, retrying with a fresh context between attempts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LoginFailed` once all attempts are exhausted.
    pub async fn login(&mut self) -> Result<()> {
        let span = info_span!("login", max_attempts = self.retry.max_attempts());
        async move {
            let mut attempts = 0;
            loop {
                attempts += 1;
                match self.attempt_login().await {
                    Ok(()) => {
                        info!(attempt = attempts, "login succeeded");
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(attempt = attempts, %err, "login attempt failed");
                        match self.retry.after_failure(attempts) {
                            RetryDecision::GiveUp => {
                                self.state = SessionState::Failed;
                                return Err(AppError::LoginFailed(format!(
                                    "giving up after {attempts} attempts: {err}"
                                )));
                            }
                            RetryDecision::RetryAfter(delay) => {
                                tokio::time::sleep(delay).await;
                                if let Err(relaunch_err) = self.relaunch_with_second_try().await {
                                    warn!(%relaunch_err, "relaunch before retry failed");
                                }
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt_login(&mut self) -> Result<()> {
        self.state = SessionState::Unauthenticated;
        self.transition(SessionState::Navigating)?;
        self.browser.open_login_form(&self.portal.login_url).await?;

        self.transition(SessionState::AwaitingCredentialEntry)?;
        let captcha = self
            .browser
            .enter_credentials(&self.credentials.username, &self.credentials.password)
            .await?;

        if let Some(image) = captcha {
            self.transition(SessionState::AwaitingCaptcha)?;
            let code = self.captcha.solve(image).await?;
            self.browser.enter_captcha(&code).await?;
        }

        self.transition(SessionState::SubmittingForm)?;
        let location = self.browser.submit_login().await?;

        match classify_location(&self.portal, &location) {
            Location::Portal => self.transition(SessionState::Authenticated),
            _ => Err(AppError::LoginFailed(format!(
                "login did not reach the portal: {location}"
            ))),
        }
    }

    /// Guarantee a healthy, authenticated session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the context cannot be started and
    /// `AppError::LoginFailed` if login attempts are exhausted.
    pub async fn ensure_authenticated(&mut self, probe_url: &str) -> Result<()> {
        self.ensure_healthy().await?;
        if self.is_session_valid(probe_url).await? {
            return Ok(());
        }
        self.login().await
    }

    /// Recover from a broken context mid-cycle: relaunch and log in again.
    ///
    /// # Errors
    ///
    /// Returns the relaunch or login error.
    pub async fn recover(&mut self) -> Result<()> {
        self.relaunch_with_second_try().await?;
        self.login().await
    }

    /// Close the browsing context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if teardown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.state = SessionState::Unauthenticated;
        self.browser.shutdown().await
    }
}
