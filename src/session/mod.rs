//! Portal session management.
//!
//! The [`BrowsingContext`] trait abstracts the headless browser that holds
//! the portal session; [`SessionManager`] drives it through login, captcha
//! hand-off, and recovery.

pub mod captcha;
pub mod manager;
pub mod retry;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

pub use manager::{classify_location, Location, SessionManager};

/// Cookies and identity needed to fetch files outside the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    /// `Cookie` header value (`name=value; ...`).
    pub cookie_header: String,
    /// Browser user agent.
    pub user_agent: String,
}

/// The single browsing context holding the portal session.
///
/// Calls are serialized by implementations; callers never issue two
/// concurrently.
pub trait BrowsingContext: Send + Sync {
    /// Start a fresh context, discarding any previous one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the context cannot be started.
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Whether the context is alive and responsive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the liveness probe itself fails.
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Load `url` and return the final location after redirects.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Navigation` or `AppError::Timeout` on failure.
    fn navigate(&self, url: &str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Load the login page and open the credential form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Navigation` if the form cannot be reached.
    fn open_login_form(
        &self,
        login_url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Type credentials into the form; returns the captcha image when the
    /// form shows one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the form fields are missing.
    fn enter_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + '_>>;

    /// Type the captcha answer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the captcha field is missing.
    fn enter_captcha(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Submit the form and return the location reached.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Navigation` if submission fails.
    fn submit_login(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Cookies and user agent of the current session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the context is gone.
    fn session_cookies(&self) -> Pin<Box<dyn Future<Output = Result<SessionCookies>> + Send + '_>>;

    /// Drop cached page resources.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if the context is gone.
    fn clear_cache(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Close the context. Closing an already-closed context succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if teardown fails.
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
