use std::fmt;
use std::path::{Path, PathBuf};

/// Username/password pair held in memory for the duration of one launch
/// attempt. Never serialized, never logged.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed for one launch attempt. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    executable: PathBuf,
    credentials: Credentials,
    extra_arguments: String,
    start_minimized: bool,
}

impl LaunchRequest {
    pub fn new(
        executable: impl Into<PathBuf>,
        credentials: Credentials,
        extra_arguments: impl Into<String>,
    ) -> Self {
        let extra_arguments = extra_arguments.into();
        let start_minimized = extra_arguments
            .split_whitespace()
            .any(|arg| arg.eq_ignore_ascii_case("/minimized"));
        Self {
            executable: executable.into(),
            credentials,
            extra_arguments,
            start_minimized,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn extra_arguments(&self) -> &str {
        &self.extra_arguments
    }

    /// Whether the pass-through arguments ask the target to start minimized.
    pub fn starts_minimized(&self) -> bool {
        self.start_minimized
    }

    /// The single argument string handed to the target process. The password
    /// is never part of it.
    pub fn composed_arguments(&self) -> String {
        let username = self.credentials.username();
        if self.extra_arguments.is_empty() {
            format!("/username:{username}")
        } else {
            format!("{} /username:{username}", self.extra_arguments.trim_end())
        }
    }
}
