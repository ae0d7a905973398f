//! Fault isolation for reads and writes.
//!
//! Every read and write runs in its own task. A panic inside it surfaces as
//! [`SyncError::Unexpected`] on the binding instead of tearing down the
//! caller, and [`RecoveryReport`] turns any error into what a fallback view
//! shows.

use meridian_core::SyncError;
use std::any::Any;
use std::future::Future;
use tokio::task::JoinError;

const RECOVERY_MESSAGE: &str = "Something went wrong. Please try again.";

/// What a fallback view shows after an unexpected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub message: String,
    pub can_retry: bool,
    /// Error details, populated only in debug builds.
    pub detail: Option<String>,
}

impl RecoveryReport {
    pub fn from_error(err: &SyncError) -> Self {
        let can_retry = !matches!(err, SyncError::Unauthorized);
        Self {
            message: err.user_message(RECOVERY_MESSAGE),
            can_retry,
            detail: cfg!(debug_assertions).then(|| format!("{:?}", err)),
        }
    }
}

/// Run `future` on its own task, converting a panic into an error.
pub async fn guarded<F, T>(future: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(future).await {
        Ok(result) => result,
        Err(err) => Err(from_join_error(err)),
    }
}

pub fn from_join_error(err: JoinError) -> SyncError {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        tracing::error!(panic = %message, "Task panicked");
        SyncError::unexpected(message)
    } else {
        SyncError::unexpected("task cancelled")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_passes_results_through() {
        assert_eq!(guarded(async { Ok::<_, SyncError>(7) }).await, Ok(7));
        assert_eq!(
            guarded(async { Err::<(), _>(SyncError::Timeout) }).await,
            Err(SyncError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_guarded_converts_panics() {
        let explode = std::hint::black_box(true);
        let result: Result<(), SyncError> = guarded(async move {
            if explode {
                panic!("boom");
            }
            Ok(())
        })
        .await;
        assert_eq!(result, Err(SyncError::unexpected("boom")));
    }

    #[test]
    fn test_report_hides_raw_errors_from_message() {
        let report = RecoveryReport::from_error(&SyncError::unexpected("index out of bounds"));
        assert_eq!(report.message, RECOVERY_MESSAGE);
        assert!(report.can_retry);
        if cfg!(debug_assertions) {
            assert!(report
                .detail
                .as_deref()
                .is_some_and(|d| d.contains("index out of bounds")));
        } else {
            assert!(report.detail.is_none());
        }
    }

    #[test]
    fn test_report_for_expired_session_cannot_retry() {
        let report = RecoveryReport::from_error(&SyncError::Unauthorized);
        assert!(!report.can_retry);
    }
}
