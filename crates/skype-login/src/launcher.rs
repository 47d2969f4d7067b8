//! The login state machine.
//!
//! Sequences "wait for window" → "authenticate via native control or embedded
//! browser" → "wait for the identity-provider redirect" → "submit to the
//! identity provider", with bounded restart before the login window is found
//! and hard cancellation afterwards.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::document::{
    fill_field, LoginDocument, IDENTITY_SIGN_IN_BUTTON_ID, PASSWORD_FIELD_NAME, SIGN_IN_BUTTON_ID,
    USERNAME_FIELD_ID,
};
use crate::errors::LoginError;
use crate::locator::{LoginControl, LoginSurface, WindowHandle};
use crate::platforms::{self, AutomationBackend};
use crate::process::{ProcessSupervisor, SupervisedProcess, SystemSupervisor};
use crate::request::LaunchRequest;
use crate::wait::{poll_until, PollOutcome};

/// Timeouts, intervals, and the restart budget for one launch attempt.
///
/// The document extraction deliberately carries two timeouts: a short one per
/// WM_HTML_GETOBJECT send and a long outer retry window. The target needs
/// both and no unifying rule is known, so they stay separate knobs.
#[derive(Debug, Clone)]
pub struct LoginPolicy {
    /// Sleep between predicate evaluations.
    pub retry_interval: Duration,
    /// Total wait for the login window to appear after a launch.
    pub window_detect_timeout: Duration,
    /// Outer retry window for extracting the browser document.
    pub document_timeout: Duration,
    /// Budget for a single WM_HTML_GETOBJECT round trip.
    pub html_object_timeout: Duration,
    /// Wait for page loads, the identity-provider redirect, and element
    /// lookups on the hosted pages.
    pub page_ready_timeout: Duration,
    /// Pause before relaunching a target that exited prematurely.
    pub restart_cooldown: Duration,
    /// Maximum number of relaunches before the attempt fails.
    pub max_restarts: u32,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(30),
            window_detect_timeout: Duration::from_secs(12),
            document_timeout: Duration::from_secs(12),
            html_object_timeout: Duration::from_secs(1),
            page_ready_timeout: Duration::from_secs(10),
            restart_cooldown: Duration::from_secs(1),
            max_restarts: 3,
        }
    }
}

/// The blocking stage currently in progress, preserved inside errors so a
/// failure always names the stage that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingWindow,
    AcquiringDocument,
    InitialPageLoad,
    SubmittingUsername,
    AwaitingIdentityRedirect,
    AwaitingIdentityPageLoad,
    LocatingPasswordField,
    SubmittingCredentials,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::AwaitingWindow => "waiting for the login window",
            Stage::AcquiringDocument => "acquiring the login web document",
            Stage::InitialPageLoad => "loading the sign-in page",
            Stage::SubmittingUsername => "submitting the username",
            Stage::AwaitingIdentityRedirect => "waiting for the identity-provider redirect",
            Stage::AwaitingIdentityPageLoad => "loading the identity-provider login page",
            Stage::LocatingPasswordField => "locating the password field",
            Stage::SubmittingCredentials => "submitting credentials",
        };
        f.write_str(text)
    }
}

/// Terminal success states of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials were delivered and the final sign-in control invoked.
    Completed,
    /// A session already existed; nothing was written anywhere.
    AlreadyAuthenticated,
}

/// Orchestrates one login attempt end to end.
pub struct LoginLauncher {
    request: LaunchRequest,
    policy: LoginPolicy,
    backend: Arc<dyn AutomationBackend>,
    supervisor: Arc<dyn ProcessSupervisor>,
}

impl LoginLauncher {
    /// Creates a launcher wired to the real platform backend and supervisor.
    pub fn new(request: LaunchRequest) -> Result<Self, LoginError> {
        Self::with_policy(request, LoginPolicy::default())
    }

    pub fn with_policy(request: LaunchRequest, policy: LoginPolicy) -> Result<Self, LoginError> {
        let backend = platforms::create_backend(policy.html_object_timeout)?;
        Ok(Self::with_parts(
            request,
            policy,
            backend,
            Arc::new(SystemSupervisor),
        ))
    }

    /// Fully injected constructor, used by tests to substitute doubles.
    pub fn with_parts(
        request: LaunchRequest,
        policy: LoginPolicy,
        backend: Arc<dyn AutomationBackend>,
        supervisor: Arc<dyn ProcessSupervisor>,
    ) -> Self {
        Self {
            request,
            policy,
            backend,
            supervisor,
        }
    }

    /// Runs the whole staged login flow.
    pub fn run(&self) -> Result<LoginOutcome, LoginError> {
        if self.request.starts_minimized() {
            debug!("target is asked to start minimized");
        }

        let cancel = CancelToken::new();
        let mut process = self.supervisor.start(&self.request, &cancel)?;

        let control = match self.await_login_window(&cancel, &mut process)? {
            Some(control) => control,
            None => {
                info!("already logged in");
                return Ok(LoginOutcome::AlreadyAuthenticated);
            }
        };

        // From here a process exit is a hard cancellation of the attempt,
        // not a restart condition.
        cancel.arm();
        let result = self.authenticate(&cancel, control);
        cancel.disarm();
        result?;

        Ok(LoginOutcome::Completed)
    }

    /// Waits for the login surface, relaunching the target (bounded) when it
    /// exits before the window appears. `Ok(None)` means a session already
    /// exists.
    fn await_login_window(
        &self,
        cancel: &CancelToken,
        process: &mut SupervisedProcess,
    ) -> Result<Option<LoginControl>, LoginError> {
        debug!("waiting for the login window to be created");
        let mut restarts = 0u32;

        loop {
            let mut surface = LoginSurface::NotFound;
            let backend = &self.backend;
            poll_until(
                self.policy.window_detect_timeout,
                self.policy.retry_interval,
                cancel,
                || {
                    if process.has_exited() {
                        // Break out of the poll; the restart policy below
                        // decides what happens next.
                        return true;
                    }
                    surface = backend.locate_login_surface(process);
                    !matches!(surface, LoginSurface::NotFound)
                },
            );

            if let LoginSurface::AlreadyAuthenticated = surface {
                return Ok(None);
            }

            if let LoginSurface::Found { dialog, control } = surface {
                debug!(?dialog, ?control, "login surface found");
                return Ok(Some(control));
            }

            if process.has_exited() {
                restarts += 1;
                if restarts > self.policy.max_restarts {
                    warn!(restarts = restarts - 1, "restart budget exhausted");
                    return Err(LoginError::DetectionTimeout);
                }
                warn!(
                    restart = restarts,
                    cooldown_ms = self.policy.restart_cooldown.as_millis() as u64,
                    "target exited before the login window appeared, relaunching"
                );
                thread::sleep(self.policy.restart_cooldown);
                *process = self.supervisor.start(&self.request, cancel)?;
                continue;
            }

            return Err(LoginError::DetectionTimeout);
        }
    }

    fn authenticate(&self, cancel: &CancelToken, control: LoginControl) -> Result<(), LoginError> {
        match control {
            LoginControl::Edit(handle) => self.native_login(cancel, handle),
            LoginControl::Browser(handle) => self.browser_login(cancel, handle),
        }
    }

    /// Fast path for older target variants: the username goes straight into
    /// the native edit control and the activation key submits it. The
    /// identity-provider stages only exist for the browser variant.
    fn native_login(&self, cancel: &CancelToken, control: WindowHandle) -> Result<(), LoginError> {
        self.ensure_alive(cancel, Stage::SubmittingUsername)?;
        info!("native login control detected, submitting username directly");
        self.backend
            .submit_native_login(control, self.request.credentials().username())
            .map_err(|e| automation(Stage::SubmittingUsername, e))?;
        Ok(())
    }

    fn browser_login(&self, cancel: &CancelToken, control: WindowHandle) -> Result<(), LoginError> {
        let policy = &self.policy;

        // Extraction can report "not ready" until the control finishes
        // initializing, so it runs under the same poll discipline.
        debug!("acquiring the document of the login page");
        let mut document: Option<Box<dyn LoginDocument>> = None;
        let backend = &self.backend;
        self.wait_for(cancel, Stage::AcquiringDocument, policy.document_timeout, || {
            match backend.open_document(control) {
                Ok(Some(doc)) => {
                    document = Some(doc);
                    true
                }
                Ok(None) => false,
                Err(error) => {
                    debug!(%error, "document extraction not ready");
                    false
                }
            }
        })?;
        let document = document.ok_or_else(|| LoginError::Automation {
            stage: Stage::AcquiringDocument,
            message: "document extraction reported success without a document".to_string(),
        })?;
        let document = document.as_ref();

        debug!("waiting for the sign-in page to finish loading");
        self.wait_for(cancel, Stage::InitialPageLoad, policy.page_ready_timeout, || {
            matches!(document.ready_state(), Ok(state) if state.is_complete())
        })?;

        self.ensure_alive(cancel, Stage::SubmittingUsername)?;
        let exists = document
            .element_exists(USERNAME_FIELD_ID)
            .map_err(|e| automation(Stage::SubmittingUsername, e))?;
        if !exists {
            return Err(LoginError::Automation {
                stage: Stage::SubmittingUsername,
                message: format!("login form element `{USERNAME_FIELD_ID}` is missing"),
            });
        }
        info!("submitting username");
        fill_field(document, USERNAME_FIELD_ID, self.request.credentials().username())
            .map_err(|e| automation(Stage::SubmittingUsername, e))?;
        document
            .click(SIGN_IN_BUTTON_ID)
            .map_err(|e| automation(Stage::SubmittingUsername, e))?;

        // Transient location read failures during navigation count as "not
        // yet", never as errors.
        debug!("waiting for the redirect to the identity provider");
        self.wait_for(
            cancel,
            Stage::AwaitingIdentityRedirect,
            policy.page_ready_timeout,
            || matches!(document.location(), Ok(location) if location.is_identity_provider()),
        )?;

        debug!("waiting for the identity-provider page to finish loading");
        self.wait_for(
            cancel,
            Stage::AwaitingIdentityPageLoad,
            policy.page_ready_timeout,
            || matches!(document.ready_state(), Ok(state) if state.is_complete()),
        )?;

        let mut password_field: Option<String> = None;
        self.wait_for(
            cancel,
            Stage::LocatingPasswordField,
            policy.page_ready_timeout,
            || match document.unique_element_id_by_name(PASSWORD_FIELD_NAME) {
                Ok(Some(id)) => {
                    password_field = Some(id);
                    true
                }
                _ => false,
            },
        )?;
        let password_field = password_field.ok_or_else(|| LoginError::Automation {
            stage: Stage::LocatingPasswordField,
            message: format!("password element `{PASSWORD_FIELD_NAME}` did not resolve"),
        })?;

        self.ensure_alive(cancel, Stage::SubmittingCredentials)?;
        info!("submitting credentials to the identity provider");
        fill_field(document, &password_field, self.request.credentials().password())
            .map_err(|e| automation(Stage::SubmittingCredentials, e))?;
        document
            .click(IDENTITY_SIGN_IN_BUTTON_ID)
            .map_err(|e| automation(Stage::SubmittingCredentials, e))?;

        info!("login flow completed");
        Ok(())
    }

    /// Polls one stage, translating the outcome into the stage-typed errors.
    fn wait_for(
        &self,
        cancel: &CancelToken,
        stage: Stage,
        timeout: Duration,
        predicate: impl FnMut() -> bool,
    ) -> Result<(), LoginError> {
        match poll_until(timeout, self.policy.retry_interval, cancel, predicate) {
            PollOutcome::Satisfied => Ok(()),
            PollOutcome::TimedOut => Err(LoginError::StageTimeout { stage }),
            PollOutcome::Cancelled => Err(LoginError::ProcessCrashed { stage }),
        }
    }

    /// Checks the armed cancellation latch before a non-polling stage runs.
    fn ensure_alive(&self, cancel: &CancelToken, stage: Stage) -> Result<(), LoginError> {
        if cancel.is_cancelled() {
            Err(LoginError::ProcessCrashed { stage })
        } else {
            Ok(())
        }
    }
}

fn automation(stage: Stage, error: crate::document::DocumentError) -> LoginError {
    LoginError::Automation {
        stage,
        message: error.to_string(),
    }
}
