//! Application-wide error types.
//!
//! [`AppError`] covers process-level failures (bootstrap, components).
//! [`CourseError`] is the domain vocabulary shared by the provisioning and
//! decommission engines and the reaction dispatcher.

use std::fmt;

use thiserror::Error;

use crate::platform::PlatformError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of platform resource named in a [`CourseError::ResourceNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Role,
    TextChannel,
    VoiceChannel,
    Category,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Role => "role",
            ResourceKind::TextChannel => "text channel",
            ResourceKind::VoiceChannel => "voice channel",
            ResourceKind::Category => "category",
        })
    }
}

#[derive(Debug, Error)]
pub enum CourseError {
    #[error("group count must be between 1 and {max}, got {requested}")]
    InvalidGroupCount { requested: usize, max: usize },

    #[error("emoji palette has {available} entries, {requested} requested")]
    EmojiPoolExhausted { requested: usize, available: usize },

    #[error("platform call `{operation}` failed: {cause}")]
    PlatformCallFailed {
        operation: &'static str,
        cause: PlatformError,
    },

    #[error("{kind} not found: {name}")]
    ResourceNotFound { kind: ResourceKind, name: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("no group is bound to emoji {0}")]
    UnknownEmoji(String),

    #[error("role not found for group {0}")]
    RoleNotFound(String),

    #[error("guild {0} already has an active semester")]
    SemesterActive(u64),

    #[error("canvas error: {0}")]
    Canvas(String),
}

impl CourseError {
    /// Input errors are raised before any side effect.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CourseError::InvalidGroupCount { .. }
                | CourseError::EmojiPoolExhausted { .. }
                | CourseError::SemesterActive(_)
        )
    }
}

/// A failed provisioning run: the original cause plus whatever the
/// compensation pass could not undo.
#[derive(Debug)]
pub struct ProvisionError {
    pub cause: CourseError,
    pub compensation_failures: Vec<CourseError>,
}

impl From<CourseError> for ProvisionError {
    fn from(cause: CourseError) -> Self {
        Self { cause, compensation_failures: Vec::new() }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)?;
        if !self.compensation_failures.is_empty() {
            write!(
                f,
                " (cleanup left {} resource(s) behind)",
                self.compensation_failures.len()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn platform_failure_names_operation() {
        let e = CourseError::PlatformCallFailed {
            operation: "create_role",
            cause: PlatformError::Forbidden("missing MANAGE_ROLES".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("create_role"));
        assert!(msg.contains("MANAGE_ROLES"));
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(CourseError::InvalidGroupCount { requested: 26, max: 25 }.is_input_error());
        assert!(CourseError::EmojiPoolExhausted { requested: 5, available: 2 }.is_input_error());
        assert!(!CourseError::RoleNotFound("group_1".into()).is_input_error());
    }

    #[test]
    fn provision_error_keeps_original_cause() {
        let err = ProvisionError {
            cause: CourseError::PlatformCallFailed {
                operation: "send_embed",
                cause: PlatformError::RateLimited { retry_after_ms: 500 },
            },
            compensation_failures: vec![CourseError::ResourceNotFound {
                kind: ResourceKind::Role,
                name: "group_1".into(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("send_embed"));
        assert!(msg.contains("1 resource(s)"));
        assert!(err.source().is_some());
    }
}
