use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a [`Factory`](crate::factory::Factory).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The factory could not produce a handle (remote unreachable, auth failure, ...).
    #[error("Failed to create pooled handle: {0}")]
    CreateFailed(#[source] BoxError),

    /// No capacity became available before the wait ended.
    #[error("Pool exhausted{}", waited_suffix(.waited))]
    PoolExhausted { waited: Option<Duration> },

    #[error("Pool is closed")]
    PoolClosed,

    /// The released handle is not tracked as borrowed by this pool.
    #[error("Released handle is not borrowed from this pool")]
    UnknownHandle,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Every handle a borrow checked failed validation, the last one freshly
/// created. Surfaces as the source of [`PoolError::CreateFailed`].
#[derive(Debug, Error)]
#[error("new handle failed validation ({failed} failed checks in this borrow)")]
pub struct ValidationFailed {
    pub failed: usize,
}

impl PoolError {
    pub(crate) fn create_failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PoolError::CreateFailed(Box::new(err))
    }

    /// `true` for conditions a caller may reasonably retry after backing off.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::CreateFailed(_) | PoolError::PoolExhausted { .. }
        )
    }
}

fn waited_suffix(waited: &Option<Duration>) -> String {
    match waited {
        Some(d) => format!(" after waiting {}", humantime::format_duration(*d)),
        None => String::new(),
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::ConfigError(format!("invalid pool configuration JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_mentions_wait() {
        let err = PoolError::PoolExhausted {
            waited: Some(Duration::from_millis(250)),
        };
        assert_eq!(err.to_string(), "Pool exhausted after waiting 250ms");

        let err = PoolError::PoolExhausted { waited: None };
        assert_eq!(err.to_string(), "Pool exhausted");
    }

    #[test]
    fn only_operational_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(PoolError::create_failed(io).is_transient());
        assert!(PoolError::PoolExhausted { waited: None }.is_transient());
        assert!(!PoolError::PoolClosed.is_transient());
        assert!(!PoolError::UnknownHandle.is_transient());
    }

    #[test]
    fn rejected_fresh_handle_reads_as_create_failure() {
        let err = PoolError::create_failed(ValidationFailed { failed: 4 });
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Failed to create pooled handle: new handle failed validation (4 failed checks in this borrow)"
        );
    }
}
