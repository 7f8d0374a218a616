use epx_integrity::IntegrityError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The session task is gone (all handles dropped or the task panicked).
    #[error("session {0} is closed")]
    SessionClosed(Uuid),
    /// The engine refused the command; state is unchanged.
    #[error(transparent)]
    Rejected(#[from] IntegrityError),
    #[error("unknown attempt {0}")]
    UnknownAttempt(Uuid),
}

impl RuntimeError {
    /// True when the refusal came from a submitted or force-submitted attempt.
    pub fn is_terminal_refusal(&self) -> bool {
        matches!(
            self,
            RuntimeError::Rejected(IntegrityError::SessionAlreadyTerminal { .. })
        )
    }
}
