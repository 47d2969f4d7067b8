//! Console-driven login automation for the Skype desktop client
//!
//! This crate starts the Skype executable, discovers the login surface inside
//! its window tree, and walks the staged login protocol (native dialog stage,
//! embedded browser stage, remote identity-provider page) without a human
//! clicking through the UI.
//!
//! The target offers no completion callbacks, so every wait is an active poll
//! racing against a possible process crash: before the login window is found a
//! crash triggers a bounded restart, afterwards it cancels the whole attempt.

pub mod cancel;
pub mod document;
pub mod errors;
pub mod launcher;
pub mod locator;
pub mod platforms;
pub mod process;
pub mod request;
#[cfg(test)]
mod tests;
pub mod wait;

pub use cancel::CancelToken;
pub use document::{fill_field, DocumentError, LoginDocument, PageLocation, ReadyState};
pub use errors::LoginError;
pub use launcher::{LoginLauncher, LoginOutcome, LoginPolicy, Stage};
pub use locator::{LoginControl, LoginSurface, WindowHandle, WindowInfo};
pub use process::{ProcessSupervisor, SupervisedProcess, SystemSupervisor};
pub use request::{Credentials, LaunchRequest};
pub use wait::{poll_until, PollOutcome};
