//! The reconciliation engine.
//!
//! [`Monitor`] owns the session, the collaborators, and the persisted
//! [`MonitorState`]; a cycle walks every configured course, reconciles the
//! fresh snapshot against stored history, and flushes after each mutation.

pub mod cycle;
pub mod detector;
pub mod files;
pub mod overview;
pub mod pruner;
pub mod reconciler;
pub mod reminders;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::deadline::DeadlineTracker;
use crate::extract::ContentExtractor;
use crate::messaging::MessagingGateway;
use crate::models::session::SessionState;
use crate::persistence::document_repo::DocumentRepo;
use crate::persistence::state::MonitorState;
use crate::session::{BrowsingContext, SessionManager};
use crate::Result;

pub use cycle::CycleReport;
pub use files::{FileFetcher, HttpFileFetcher};

/// Services a cycle talks to.
pub struct Collaborators {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Browsing context, for session cookies and cache clearing.
    pub browser: Arc<dyn BrowsingContext>,
    /// Page extraction.
    pub extractor: Arc<dyn ContentExtractor>,
    /// Outbound messages.
    pub gateway: Arc<dyn MessagingGateway>,
    /// Attachment downloads.
    pub fetcher: Arc<dyn FileFetcher>,
    /// Document store.
    pub repo: DocumentRepo,
    /// Date parsing and display.
    pub tracker: DeadlineTracker,
    /// Wall clock.
    pub clock: Clock,
}

impl Collaborators {
    /// Current instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Persist `state` as of now.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any write fails.
    pub async fn flush(&self, state: &mut MonitorState) -> Result<()> {
        state.flush(&self.repo, self.now()).await
    }
}

/// Course monitor: one session, one state, sequential cycles.
pub struct Monitor {
    session: SessionManager,
    deps: Collaborators,
    state: MonitorState,
}

impl Monitor {
    /// Build a monitor, loading persisted state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the stored documents cannot be read.
    pub async fn load(session: SessionManager, deps: Collaborators) -> Result<Self> {
        let state = MonitorState::load(&deps.repo).await?;
        Ok(Self {
            session,
            deps,
            state,
        })
    }

    /// Current in-memory state.
    #[must_use]
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Current session state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Close the browsing context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Browser` if teardown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.session.shutdown().await
    }
}
