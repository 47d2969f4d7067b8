use std::sync::Arc;
use std::time::Duration;

use crate::document::{DocumentError, LoginDocument};
use crate::errors::LoginError;
use crate::locator::{LoginSurface, WindowHandle};
use crate::process::SupervisedProcess;

/// The platform seam the login state machine drives.
pub trait AutomationBackend: Send + Sync {
    /// Snapshots the target's window tree and classifies the login surface.
    /// Enumeration failures are reported as [`LoginSurface::NotFound`]; the
    /// caller retries on the next polling cycle.
    fn locate_login_surface(&self, process: &SupervisedProcess) -> LoginSurface;

    /// Extracts the scriptable document behind an embedded browser control.
    /// Returns `Ok(None)` while the control has not finished initializing;
    /// the caller retries under the poll-wait discipline.
    fn open_document(
        &self,
        control: WindowHandle,
    ) -> Result<Option<Box<dyn LoginDocument>>, DocumentError>;

    /// Writes the username into a native text-entry control and synthesizes
    /// the activation key press.
    fn submit_native_login(
        &self,
        control: WindowHandle,
        username: &str,
    ) -> Result<(), DocumentError>;
}

#[cfg(target_os = "windows")]
pub mod windows;

/// Creates the backend for the current platform.
pub fn create_backend(
    html_object_timeout: Duration,
) -> Result<Arc<dyn AutomationBackend>, LoginError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsBackend::new(html_object_timeout)?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = html_object_timeout;
        Err(LoginError::UnsupportedPlatform(
            "the target's login surface only exists on Windows".to_string(),
        ))
    }
}
