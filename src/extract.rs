//! Content extraction seam.
//!
//! Page rendering and DOM heuristics live behind [`ContentExtractor`]; the
//! monitor only ever sees normalized snapshots and details.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::models::course::{ActivityKind, AssignmentDetails, CourseSnapshot};
use crate::Result;

/// Structured view of portal pages.
pub trait ContentExtractor: Send + Sync {
    /// Sections and activities of a course page.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LoginRequired` when the page turned out to be the
    /// login page, and `AppError::Navigation`/`AppError::Extraction` on
    /// other failures.
    fn extract_sections(
        &self,
        course_url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CourseSnapshot>> + Send + '_>>;

    /// Dates and attachments of an assignment page.
    ///
    /// An unreadable page yields `fetch_succeeded = false` rather than an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns transient errors (`Browser`, `Navigation`, `Timeout`) only.
    fn extract_assignment_details(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AssignmentDetails>> + Send + '_>>;

    /// Opening and closing times of a quiz page.
    ///
    /// # Errors
    ///
    /// Same contract as [`ContentExtractor::extract_assignment_details`].
    fn extract_quiz_details(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AssignmentDetails>> + Send + '_>>;
}

/// Fetch details for a deadline-bearing activity.
///
/// Non-transient failures are folded into a failed placeholder so callers
/// only have to handle a broken browsing context.
///
/// # Errors
///
/// Returns the extractor's error when it is transient.
pub async fn fetch_details(
    extractor: &dyn ContentExtractor,
    kind: &ActivityKind,
    url: &str,
) -> Result<AssignmentDetails> {
    let result = match kind {
        ActivityKind::Assignment => extractor.extract_assignment_details(url).await,
        ActivityKind::Quiz => extractor.extract_quiz_details(url).await,
        _ => return Ok(AssignmentDetails::failed(kind)),
    };

    match result {
        Ok(details) => Ok(details),
        Err(err) if err.is_transient() => Err(err),
        Err(err) => {
            warn!(activity_url = url, %err, "detail extraction failed");
            Ok(AssignmentDetails::failed(kind))
        }
    }
}
