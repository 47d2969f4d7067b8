use std::path::PathBuf;

use thiserror::Error;

use crate::launcher::Stage;

/// Failure of one login attempt.
///
/// Every variant that can occur after the login window was found carries the
/// [`Stage`] that was in progress, so diagnostics always name the stage that
/// failed.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("failed to launch target executable `{}`: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The login window never appeared within the detection timeout and the
    /// restart budget.
    #[error("unable to detect the login window")]
    DetectionTimeout,

    /// The target process died after cancellation was armed.
    #[error("target process died unexpectedly while {stage}")]
    ProcessCrashed { stage: Stage },

    /// A login stage did not complete within its timeout.
    #[error("timed out while {stage}")]
    StageTimeout { stage: Stage },

    /// A scripting or marshalling call into the document bridge failed.
    #[error("automation failure while {stage}: {message}")]
    Automation { stage: Stage, message: String },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}
