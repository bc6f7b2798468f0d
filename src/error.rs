//! Tray error types.

use crate::tray::session::SessionState;

/// Result alias used throughout the crate.
pub type TrayResult<T> = Result<T, TrayError>;

/// Errors produced by a tray session or one of its backends.
#[derive(Debug, thiserror::Error)]
pub enum TrayError {
    /// The notification service or native menu subsystem could not be used.
    #[error("tray initialization failed: {reason}")]
    Initialization {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The native event-retrieval primitive failed. The session is unusable.
    #[error("tray event loop failed: {0}")]
    EventLoop(String),

    /// The operation is not allowed in the session's current state.
    #[error("cannot {operation} a tray session that is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The menu tree failed structural validation.
    #[error("invalid menu: {0}")]
    InvalidMenu(String),
}

impl TrayError {
    /// Initialization failure without an underlying cause.
    pub fn init(reason: impl Into<String>) -> Self {
        TrayError::Initialization {
            reason: reason.into(),
            source: None,
        }
    }

    /// Initialization failure caused by `source`.
    pub fn init_with<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TrayError::Initialization {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns `true` for errors that end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrayError::EventLoop(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialization_error_keeps_source() {
        let io = std::io::Error::other("bus unavailable");
        let err = TrayError::init_with("cannot reach the session bus", io);
        assert_eq!(
            err.to_string(),
            "tray initialization failed: cannot reach the session bus"
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_fatal());
    }

    #[test]
    fn invalid_state_names_operation() {
        let err = TrayError::InvalidState {
            operation: "update",
            state: SessionState::Terminated,
        };
        assert_eq!(
            err.to_string(),
            "cannot update a tray session that is Terminated"
        );
    }

    #[test]
    fn loop_errors_are_fatal() {
        assert!(TrayError::EventLoop("GetMessageW returned -1".into()).is_fatal());
    }
}
