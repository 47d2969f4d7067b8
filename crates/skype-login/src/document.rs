//! Scriptable view of the login page hosted by the embedded browser control.

use thiserror::Error;

/// Host suffix of the identity provider the target redirects to.
pub const IDENTITY_PROVIDER_HOST_SUFFIX: &str = "login.live.com";
/// Path prefix of the identity-provider authorization page.
pub const IDENTITY_PROVIDER_PATH_PREFIX: &str = "/oauth20_authorize.srf";
/// Element id of the username field on the initial sign-in page.
pub const USERNAME_FIELD_ID: &str = "unifiedUsername";
/// Element id of the initial sign-in button.
pub const SIGN_IN_BUTTON_ID: &str = "unifiedSignIn";
/// Element name of the password field on the identity-provider page. Must
/// resolve to exactly one element.
pub const PASSWORD_FIELD_NAME: &str = "passwd";
/// Element id of the identity-provider sign-in button.
pub const IDENTITY_SIGN_IN_BUTTON_ID: &str = "idSIButton9";

/// Host and path of the page currently loaded in the embedded browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub host: String,
    pub path: String,
}

impl PageLocation {
    /// Whether the browser has reached the identity-provider login page.
    pub fn is_identity_provider(&self) -> bool {
        self.host.ends_with(IDENTITY_PROVIDER_HOST_SUFFIX)
            && self.path.starts_with(IDENTITY_PROVIDER_PATH_PREFIX)
    }
}

/// Document ready state as reported by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Uninitialized,
    Loading,
    Loaded,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "complete" => ReadyState::Complete,
            "interactive" => ReadyState::Interactive,
            "loaded" => ReadyState::Loaded,
            "loading" => ReadyState::Loading,
            _ => ReadyState::Uninitialized,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ReadyState::Complete)
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document cannot be read right now, typically mid-navigation.
    /// Callers polling for a condition treat this as "not yet".
    #[error("document not ready: {0}")]
    NotReady(String),

    #[error("element `{0}` not found in the login page")]
    ElementNotFound(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("platform automation error: {0}")]
    Platform(String),
}

/// Primitives the login flow needs from the embedded page.
///
/// Implemented for the MSHTML document on Windows and by test doubles
/// elsewhere. Elements are addressed by DOM id; the one name-based lookup the
/// flow performs resolves the name to an id first, since the change
/// notification is dispatched by id.
pub trait LoginDocument {
    fn location(&self) -> Result<PageLocation, DocumentError>;

    fn ready_state(&self) -> Result<ReadyState, DocumentError>;

    fn element_exists(&self, id: &str) -> Result<bool, DocumentError>;

    /// Resolves `name` to the id of the matching element, or `None` unless
    /// exactly one element carries that name.
    fn unique_element_id_by_name(&self, name: &str) -> Result<Option<String>, DocumentError>;

    fn set_field_value(&self, id: &str, value: &str) -> Result<(), DocumentError>;

    /// Dispatches a synthetic `change` event on the element. The page reacts
    /// to this event, not to the raw value write.
    fn fire_change_event(&self, id: &str) -> Result<(), DocumentError>;

    fn click(&self, id: &str) -> Result<(), DocumentError>;
}

/// Writes a form field and fires the change notification the page listens
/// for. Every successful value write is paired with exactly one change event.
pub fn fill_field(
    document: &dyn LoginDocument,
    id: &str,
    value: &str,
) -> Result<(), DocumentError> {
    document.set_field_value(id, value)?;
    document.fire_change_event(id)
}
