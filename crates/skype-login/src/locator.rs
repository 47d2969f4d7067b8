//! Classification of the target's window tree into a login surface.
//!
//! The classification itself is pure: it operates on snapshots taken by the
//! platform backend, which re-enumerates the tree on every polling cycle. The
//! target is known to create several candidate login windows and destroy all
//! but one, so handles are only trusted within the cycle that produced them.

/// Window class of the main contact-list window once a session exists.
pub const MAIN_WINDOW_CLASS: &str = "tSkMainForm";
/// Window class of the login dialog.
pub const LOGIN_WINDOW_CLASS: &str = "TLoginForm";
/// Class-name prefix of the embedded browser child hosting the login page.
pub const BROWSER_CHILD_CLASS_PREFIX: &str = "Internet Explorer_Server";
/// Class-name prefix of the plain text-entry child used by older variants.
pub const EDIT_CHILD_CLASS_PREFIX: &str = "TEdit";
/// Titles the main window carries before any user has signed in.
pub const PRE_LOGIN_TITLES: &[&str] = &["Skype\u{2122}\u{200e}", "Skype"];

/// Opaque OS window identifier. Valid for the polling cycle that discovered
/// it; never cache one across cycles without re-validating.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub(crate) fn new(raw: isize) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(&self) -> isize {
        self.0
    }
}

impl std::fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

/// Snapshot of one window taken during enumeration.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub class_name: String,
    pub title: String,
    pub visible: bool,
}

/// The control inside the login dialog that receives the username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginControl {
    /// Embedded browser surface; login continues on the hosted web page.
    Browser(WindowHandle),
    /// Native text-entry control used by older target variants.
    Edit(WindowHandle),
}

/// Result of locating the login UI for one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSurface {
    NotFound,
    /// A session already exists; terminal success with no credential writes.
    AlreadyAuthenticated,
    Found {
        dialog: WindowHandle,
        control: LoginControl,
    },
}

/// Outcome of classifying the top-level windows of the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelClassification {
    NotFound,
    AlreadyAuthenticated,
    LoginDialog(WindowHandle),
}

/// Classifies the top-level windows by class name.
///
/// A visible main window, or a main window whose title no longer matches the
/// pre-login titles, means the user is already signed in.
pub fn classify_top_level(windows: &[WindowInfo]) -> TopLevelClassification {
    let main_window = windows
        .iter()
        .find(|w| w.class_name == MAIN_WINDOW_CLASS);
    let login_dialog = windows
        .iter()
        .find(|w| w.class_name == LOGIN_WINDOW_CLASS);

    if let Some(main) = main_window {
        if main.visible || !PRE_LOGIN_TITLES.contains(&main.title.as_str()) {
            return TopLevelClassification::AlreadyAuthenticated;
        }
    }

    match login_dialog {
        Some(dialog) => TopLevelClassification::LoginDialog(dialog.handle),
        None => TopLevelClassification::NotFound,
    }
}

/// Picks the login control among the children of the login dialog.
///
/// First match in enumeration order wins; the target sometimes constructs and
/// tears down duplicate login windows, so the caller re-enumerates on every
/// cycle rather than trusting an earlier pick.
pub fn select_login_control(children: &[WindowInfo]) -> Option<LoginControl> {
    children.iter().find_map(|child| {
        if child.class_name.starts_with(BROWSER_CHILD_CLASS_PREFIX) {
            Some(LoginControl::Browser(child.handle))
        } else if child.class_name.starts_with(EDIT_CHILD_CLASS_PREFIX) {
            Some(LoginControl::Edit(child.handle))
        } else {
            None
        }
    })
}
