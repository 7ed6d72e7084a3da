use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::locale::LocaleError;
use crate::secmem::AllocError;

/// Reply codes handed back to the invoking daemon alongside a negative status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    WindowTooSmall,
    MissingEnvVar,
    LocaleProblem,
    Timeout,
    FullyCanceled,
    FatalAllocation,
    Config,
    Io,
}

#[derive(Debug, Error)]
pub enum DialogError {
    /// The dialog needs more rows or columns than the terminal has.
    #[error("terminal window too small for the dialog")]
    WindowTooSmall,

    /// Terminal dimensions could not be determined.
    #[error("terminal dimensions are unknown")]
    MissingEnvVar,

    #[error("locale conversion failed ({context}): {source}")]
    LocaleProblem {
        context: &'static str,
        #[source]
        source: LocaleError,
    },

    #[error("dialog timed out")]
    Timeout,

    /// An interrupt arrived while the dialog was open.
    #[error("dialog interrupted")]
    FullyCanceled,

    /// Growing a secret buffer failed. Unrecoverable; the binary aborts.
    #[error("secure buffer growth failed: {0}")]
    FatalAllocation(#[from] AllocError),

    #[error("invalid dialog request: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DialogError {
    pub fn locale(context: &'static str, source: LocaleError) -> Self {
        Self::LocaleProblem { context, source }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::WindowTooSmall => ErrorCode::WindowTooSmall,
            Self::MissingEnvVar => ErrorCode::MissingEnvVar,
            Self::LocaleProblem { .. } => ErrorCode::LocaleProblem,
            Self::Timeout => ErrorCode::Timeout,
            Self::FullyCanceled => ErrorCode::FullyCanceled,
            Self::FatalAllocation(_) => ErrorCode::FatalAllocation,
            Self::Config(_) => ErrorCode::Config,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    /// Timeouts and interrupts end the dialog like a user cancel.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout | Self::FullyCanceled)
    }
}

pub type Result<T> = std::result::Result<T, DialogError>;
