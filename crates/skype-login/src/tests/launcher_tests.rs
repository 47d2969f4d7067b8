//! End-to-end scenarios for the login state machine, driven by test doubles
//! standing in for the supervisor, the platform backend, and the document.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::document::{
    DocumentError, LoginDocument, PageLocation, ReadyState, IDENTITY_SIGN_IN_BUTTON_ID,
    PASSWORD_FIELD_NAME, SIGN_IN_BUTTON_ID, USERNAME_FIELD_ID,
};
use crate::errors::LoginError;
use crate::launcher::{LoginLauncher, LoginOutcome, LoginPolicy, Stage};
use crate::locator::{LoginControl, LoginSurface, WindowHandle};
use crate::platforms::AutomationBackend;
use crate::process::{ProcessSupervisor, SupervisedProcess, SystemSupervisor};
use crate::request::{Credentials, LaunchRequest};

const PASSWORD_ELEMENT_ID: &str = "i0118";

fn request() -> LaunchRequest {
    LaunchRequest::new(
        "C:/Program Files/Skype/Phone/Skype.exe",
        Credentials::new("alice", "hunter2"),
        "",
    )
}

fn fast_policy() -> LoginPolicy {
    LoginPolicy {
        retry_interval: Duration::from_millis(2),
        window_detect_timeout: Duration::from_millis(80),
        document_timeout: Duration::from_millis(80),
        html_object_timeout: Duration::from_millis(10),
        page_ready_timeout: Duration::from_millis(80),
        restart_cooldown: Duration::from_millis(3),
        max_restarts: 3,
    }
}

/// Shared simulation of the target process: how often it was launched, the
/// liveness flag of the current launch, and the token its exit watcher would
/// signal.
#[derive(Default)]
struct TargetSim {
    starts: AtomicUsize,
    current: Mutex<Option<Arc<AtomicBool>>>,
    token: Mutex<Option<CancelToken>>,
}

impl TargetSim {
    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Simulates the process dying, exactly the way the real exit watcher
    /// reports it: liveness flag first, then the (arming-aware) token signal.
    fn kill_current(&self) {
        if let Some(flag) = self.current.lock().unwrap().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(token) = self.token.lock().unwrap().as_ref() {
            token.cancel();
        }
    }
}

/// Supervisor double. Launches numbered `1..=dead_launches` exit immediately.
struct FakeSupervisor {
    sim: Arc<TargetSim>,
    dead_launches: usize,
}

impl ProcessSupervisor for FakeSupervisor {
    fn start(
        &self,
        _request: &LaunchRequest,
        cancel: &CancelToken,
    ) -> Result<SupervisedProcess, LoginError> {
        let launch = self.sim.starts.fetch_add(1, Ordering::SeqCst) + 1;
        let exited = Arc::new(AtomicBool::new(launch <= self.dead_launches));
        *self.sim.current.lock().unwrap() = Some(Arc::clone(&exited));
        *self.sim.token.lock().unwrap() = Some(cancel.clone());
        Ok(SupervisedProcess::from_parts(4000 + launch as u32, exited))
    }
}

#[derive(Clone, Copy)]
enum SurfacePlan {
    NeverFound,
    AlreadyAuthenticated,
    BrowserWhenAlive,
    EditWhenAlive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DocEvent {
    Set(String, String),
    Change(String),
    Click(String),
}

#[derive(Default)]
struct PageState {
    on_identity_page: bool,
    location_failures: usize,
    events: Vec<DocEvent>,
}

/// Backend double sharing one scripted page across document handles.
struct FakeBackend {
    sim: Arc<TargetSim>,
    plan: SurfacePlan,
    page: Arc<Mutex<PageState>>,
    open_document_calls: AtomicUsize,
    kill_on_open_document: bool,
    native_submissions: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn new(sim: Arc<TargetSim>, plan: SurfacePlan) -> Self {
        Self {
            sim,
            plan,
            page: Arc::new(Mutex::new(PageState::default())),
            open_document_calls: AtomicUsize::new(0),
            kill_on_open_document: false,
            native_submissions: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<DocEvent> {
        self.page.lock().unwrap().events.clone()
    }
}

impl AutomationBackend for FakeBackend {
    fn locate_login_surface(&self, process: &SupervisedProcess) -> LoginSurface {
        match self.plan {
            SurfacePlan::NeverFound => LoginSurface::NotFound,
            SurfacePlan::AlreadyAuthenticated => LoginSurface::AlreadyAuthenticated,
            SurfacePlan::BrowserWhenAlive if !process.has_exited() => LoginSurface::Found {
                dialog: WindowHandle::new(0x20),
                control: LoginControl::Browser(WindowHandle::new(0x21)),
            },
            SurfacePlan::EditWhenAlive if !process.has_exited() => LoginSurface::Found {
                dialog: WindowHandle::new(0x20),
                control: LoginControl::Edit(WindowHandle::new(0x22)),
            },
            _ => LoginSurface::NotFound,
        }
    }

    fn open_document(
        &self,
        _control: WindowHandle,
    ) -> Result<Option<Box<dyn LoginDocument>>, DocumentError> {
        self.open_document_calls.fetch_add(1, Ordering::SeqCst);
        if self.kill_on_open_document {
            self.sim.kill_current();
            return Ok(None);
        }
        Ok(Some(Box::new(FakePage {
            state: Arc::clone(&self.page),
        })))
    }

    fn submit_native_login(
        &self,
        _control: WindowHandle,
        username: &str,
    ) -> Result<(), DocumentError> {
        self.native_submissions
            .lock()
            .unwrap()
            .push(username.to_string());
        Ok(())
    }
}

struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl LoginDocument for FakePage {
    fn location(&self) -> Result<PageLocation, DocumentError> {
        let mut state = self.state.lock().unwrap();
        if state.location_failures > 0 {
            state.location_failures -= 1;
            return Err(DocumentError::NotReady("mid-navigation".to_string()));
        }
        if state.on_identity_page {
            Ok(PageLocation {
                host: "login.live.com".to_string(),
                path: "/oauth20_authorize.srf?client_id=0".to_string(),
            })
        } else {
            Ok(PageLocation {
                host: "login.skype.com".to_string(),
                path: "/login".to_string(),
            })
        }
    }

    fn ready_state(&self) -> Result<ReadyState, DocumentError> {
        Ok(ReadyState::Complete)
    }

    fn element_exists(&self, id: &str) -> Result<bool, DocumentError> {
        Ok(id == USERNAME_FIELD_ID || id == SIGN_IN_BUTTON_ID)
    }

    fn unique_element_id_by_name(&self, name: &str) -> Result<Option<String>, DocumentError> {
        let state = self.state.lock().unwrap();
        if name == PASSWORD_FIELD_NAME && state.on_identity_page {
            Ok(Some(PASSWORD_ELEMENT_ID.to_string()))
        } else {
            Ok(None)
        }
    }

    fn set_field_value(&self, id: &str, value: &str) -> Result<(), DocumentError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(DocEvent::Set(id.to_string(), value.to_string()));
        Ok(())
    }

    fn fire_change_event(&self, id: &str) -> Result<(), DocumentError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(DocEvent::Change(id.to_string()));
        Ok(())
    }

    fn click(&self, id: &str) -> Result<(), DocumentError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(DocEvent::Click(id.to_string()));
        if id == SIGN_IN_BUTTON_ID {
            state.on_identity_page = true;
        }
        Ok(())
    }
}

fn launcher_with(
    backend: Arc<FakeBackend>,
    supervisor: FakeSupervisor,
    policy: LoginPolicy,
) -> LoginLauncher {
    LoginLauncher::with_parts(request(), policy, backend, Arc::new(supervisor))
}

#[test]
fn full_browser_flow_delivers_credentials_and_completes() {
    super::init_tracing();
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(
        Arc::clone(&sim),
        SurfacePlan::BrowserWhenAlive,
    ));
    // One transient location failure mid-navigation must count as "not yet".
    backend.page.lock().unwrap().location_failures = 1;

    let supervisor = FakeSupervisor {
        sim: Arc::clone(&sim),
        dead_launches: 0,
    };
    let outcome = launcher_with(Arc::clone(&backend), supervisor, fast_policy())
        .run()
        .expect("login should complete");

    assert_eq!(outcome, LoginOutcome::Completed);
    assert_eq!(sim.starts(), 1);
    assert_eq!(
        backend.events(),
        vec![
            DocEvent::Set(USERNAME_FIELD_ID.to_string(), "alice".to_string()),
            DocEvent::Change(USERNAME_FIELD_ID.to_string()),
            DocEvent::Click(SIGN_IN_BUTTON_ID.to_string()),
            DocEvent::Set(PASSWORD_ELEMENT_ID.to_string(), "hunter2".to_string()),
            DocEvent::Change(PASSWORD_ELEMENT_ID.to_string()),
            DocEvent::Click(IDENTITY_SIGN_IN_BUTTON_ID.to_string()),
        ]
    );

    let password_writes = backend
        .events()
        .iter()
        .filter(|event| matches!(event, DocEvent::Set(_, value) if value == "hunter2"))
        .count();
    assert_eq!(password_writes, 1);
}

#[test]
fn every_field_write_is_followed_by_exactly_one_change_event() {
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(
        Arc::clone(&sim),
        SurfacePlan::BrowserWhenAlive,
    ));
    let supervisor = FakeSupervisor {
        sim,
        dead_launches: 0,
    };
    launcher_with(Arc::clone(&backend), supervisor, fast_policy())
        .run()
        .expect("login should complete");

    let events = backend.events();
    for (index, event) in events.iter().enumerate() {
        if let DocEvent::Set(id, _) = event {
            assert_eq!(
                events.get(index + 1),
                Some(&DocEvent::Change(id.clone())),
                "value write to `{id}` must be followed by its change event"
            );
        }
    }
}

#[test]
fn existing_session_short_circuits_with_zero_writes() {
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(
        Arc::clone(&sim),
        SurfacePlan::AlreadyAuthenticated,
    ));
    let supervisor = FakeSupervisor {
        sim: Arc::clone(&sim),
        dead_launches: 0,
    };
    let outcome = launcher_with(Arc::clone(&backend), supervisor, fast_policy())
        .run()
        .expect("an existing session is a success");

    assert_eq!(outcome, LoginOutcome::AlreadyAuthenticated);
    assert!(backend.events().is_empty());
    assert_eq!(backend.open_document_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn immediate_exits_consume_exactly_the_restart_budget() {
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(
        Arc::clone(&sim),
        SurfacePlan::BrowserWhenAlive,
    ));
    let supervisor = FakeSupervisor {
        sim: Arc::clone(&sim),
        dead_launches: usize::MAX,
    };
    let error = launcher_with(backend, supervisor, fast_policy())
        .run()
        .expect_err("a target that always dies cannot log in");

    // A crash before the surface is found is never ProcessCrashed.
    assert!(matches!(error, LoginError::DetectionTimeout));
    // Initial launch plus exactly max_restarts relaunches, never more.
    assert_eq!(sim.starts(), 4);
}

#[test]
fn target_recovering_within_the_budget_still_completes() {
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(
        Arc::clone(&sim),
        SurfacePlan::BrowserWhenAlive,
    ));
    let supervisor = FakeSupervisor {
        sim: Arc::clone(&sim),
        dead_launches: 2,
    };
    let outcome = launcher_with(backend, supervisor, fast_policy())
        .run()
        .expect("third launch should survive and log in");

    assert_eq!(outcome, LoginOutcome::Completed);
    // Two crashes, two relaunches, then success on the third process.
    assert_eq!(sim.starts(), 3);
}

#[test]
fn exit_after_the_window_was_found_cancels_instead_of_restarting() {
    let sim = Arc::new(TargetSim::default());
    let mut backend = FakeBackend::new(Arc::clone(&sim), SurfacePlan::BrowserWhenAlive);
    backend.kill_on_open_document = true;
    let backend = Arc::new(backend);

    let supervisor = FakeSupervisor {
        sim: Arc::clone(&sim),
        dead_launches: 0,
    };
    let error = launcher_with(Arc::clone(&backend), supervisor, fast_policy())
        .run()
        .expect_err("armed crash must fail the attempt");

    assert!(matches!(
        error,
        LoginError::ProcessCrashed {
            stage: Stage::AcquiringDocument
        }
    ));
    // No restart once cancellation is armed, and no stage ran afterwards.
    assert_eq!(sim.starts(), 1);
    assert!(backend.events().is_empty());
}

#[test]
fn native_edit_control_takes_the_fast_path() {
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(
        Arc::clone(&sim),
        SurfacePlan::EditWhenAlive,
    ));
    let supervisor = FakeSupervisor {
        sim,
        dead_launches: 0,
    };
    let outcome = launcher_with(Arc::clone(&backend), supervisor, fast_policy())
        .run()
        .expect("native variant should complete");

    assert_eq!(outcome, LoginOutcome::Completed);
    assert_eq!(
        *backend.native_submissions.lock().unwrap(),
        vec!["alice".to_string()]
    );
    assert_eq!(backend.open_document_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn login_window_never_appearing_times_out_without_restarts() {
    let sim = Arc::new(TargetSim::default());
    let backend = Arc::new(FakeBackend::new(Arc::clone(&sim), SurfacePlan::NeverFound));
    let supervisor = FakeSupervisor {
        sim: Arc::clone(&sim),
        dead_launches: 0,
    };
    let error = launcher_with(backend, supervisor, fast_policy())
        .run()
        .expect_err("no window means detection failure");

    assert!(matches!(error, LoginError::DetectionTimeout));
    assert_eq!(sim.starts(), 1);
}

#[test]
fn system_supervisor_reports_an_invalid_executable() {
    let request = LaunchRequest::new(
        "/nonexistent-directory/definitely-not-skype.exe",
        Credentials::new("alice", "hunter2"),
        "",
    );
    let error = SystemSupervisor
        .start(&request, &CancelToken::new())
        .expect_err("spawning a missing executable must fail");
    assert!(matches!(error, LoginError::Launch { .. }));
}

#[test]
fn composed_arguments_carry_the_username_but_never_the_password() {
    let request = LaunchRequest::new(
        "Skype.exe",
        Credentials::new("alice", "hunter2"),
        "/minimized /nosplash",
    );
    assert_eq!(
        request.composed_arguments(),
        "/minimized /nosplash /username:alice"
    );
    assert!(!request.composed_arguments().contains("hunter2"));
    assert!(request.starts_minimized());

    let bare = LaunchRequest::new("Skype.exe", Credentials::new("bob", "pw"), "");
    assert_eq!(bare.composed_arguments(), "/username:bob");
    assert!(!bare.starts_minimized());
}

#[test]
fn credentials_debug_output_redacts_the_password() {
    let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
    assert!(rendered.contains("alice"));
    assert!(!rendered.contains("hunter2"));
}
