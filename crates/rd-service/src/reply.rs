//! The uniform response envelope.

use serde::{Deserialize, Serialize};

use rd_dispatch::DispatchError;
use rd_presence::PresenceError;

/// Errors that can be folded into a failed [`Reply`].
pub trait ReplyError: std::fmt::Display {
    fn kind(&self) -> &'static str;
    fn is_retryable(&self) -> bool;
}

impl ReplyError for DispatchError {
    fn kind(&self) -> &'static str {
        DispatchError::kind(self)
    }

    fn is_retryable(&self) -> bool {
        DispatchError::is_retryable(self)
    }
}

impl ReplyError for PresenceError {
    fn kind(&self) -> &'static str {
        PresenceError::kind(self)
    }

    fn is_retryable(&self) -> bool {
        PresenceError::is_retryable(self)
    }
}

/// Success flag, message and optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply<T> {
    pub success:    bool,
    pub message:    String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data:       Option<T>,
    /// Stable error tag, e.g. `"not_suggested"`.  `None` on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub retryable:  bool,
}

impl<T> Reply<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success:    true,
            message:    message.into(),
            data:       Some(data),
            error_kind: None,
            retryable:  false,
        }
    }

    pub fn fail(kind: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success:    false,
            message:    message.into(),
            data:       None,
            error_kind: Some(kind.to_owned()),
            retryable,
        }
    }

    /// A failed reply describing `err`.
    pub fn error<E: ReplyError>(err: &E) -> Self {
        Self::fail(err.kind(), err.to_string(), err.is_retryable())
    }

    /// `Ok` becomes a success carrying `message`; `Err` a failure.
    pub fn from_result<E: ReplyError>(result: Result<T, E>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(e)   => Self::error(&e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            success:    self.success,
            message:    self.message,
            data:       self.data.map(f),
            error_kind: self.error_kind,
            retryable:  self.retryable,
        }
    }

    pub fn kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }
}
