//! Extraction of the scriptable MSHTML document from an embedded
//! `Internet Explorer_Server` control, and the [`LoginDocument`] built on it.
//!
//! The hosted page navigates across several documents during login, so
//! nothing is cached: every read re-extracts the current document from the
//! control handle via WM_HTML_GETOBJECT.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;
use windows::core::{Interface, BSTR, VARIANT};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Com::{
    CoGetApartmentType, CoInitializeEx, CoUninitialize, APTTYPE, APTTYPEQUALIFIER, APTTYPE_MAINSTA,
    APTTYPE_STA, COINIT_APARTMENTTHREADED,
};
use windows::Win32::UI::Accessibility::ObjectFromLresult;
use windows::Win32::UI::WindowsAndMessaging::{
    RegisterWindowMessageW, SendMessageTimeoutW, SMTO_ABORTIFHUNG,
};
use windows::Win32::Web::MsHtml::{
    IHTMLDocument2, IHTMLDocument3, IHTMLElement, IHTMLWindow2,
};

use super::hwnd;
use crate::document::{DocumentError, LoginDocument, PageLocation, ReadyState};
use crate::locator::WindowHandle;

/// Tries to reach the document behind the browser control. `Ok(None)` means
/// the control has not produced a document yet; the caller re-polls.
pub(crate) fn open_document(
    control: WindowHandle,
    timeout: Duration,
) -> Result<Option<Box<dyn LoginDocument>>, DocumentError> {
    match extract_document(control, timeout)? {
        Some(_) => Ok(Some(Box::new(MshtmlDocument {
            browser: control,
            timeout,
        }))),
        None => Ok(None),
    }
}

fn extract_document(
    control: WindowHandle,
    timeout: Duration,
) -> Result<Option<IHTMLDocument2>, DocumentError> {
    unsafe {
        let message = RegisterWindowMessageW(windows::core::w!("WM_HTML_GETOBJECT"));
        if message == 0 {
            return Err(DocumentError::Platform(
                "failed to register WM_HTML_GETOBJECT".to_string(),
            ));
        }

        let mut object_result: usize = 0;
        SendMessageTimeoutW(
            hwnd(control),
            message,
            WPARAM(0),
            LPARAM(0),
            SMTO_ABORTIFHUNG,
            timeout.as_millis() as u32,
            Some(&mut object_result),
        );
        if object_result == 0 {
            return Ok(None);
        }

        let mut raw: *mut core::ffi::c_void = std::ptr::null_mut();
        if ObjectFromLresult(
            LRESULT(object_result as isize),
            &IHTMLDocument2::IID,
            WPARAM(0),
            &mut raw,
        )
        .is_err()
            || raw.is_null()
        {
            return Ok(None);
        }
        Ok(Some(IHTMLDocument2::from_raw(raw)))
    }
}

/// Scriptable document addressed through the browser control handle.
pub struct MshtmlDocument {
    browser: WindowHandle,
    timeout: Duration,
}

impl MshtmlDocument {
    /// The current document. Re-extracted on every call because a navigation
    /// replaces the document behind the same control.
    fn document(&self) -> Result<IHTMLDocument2, DocumentError> {
        extract_document(self.browser, self.timeout)?
            .ok_or_else(|| DocumentError::NotReady("browser control has no document".to_string()))
    }

    fn dom(&self) -> Result<IHTMLDocument3, DocumentError> {
        self.document()?
            .cast::<IHTMLDocument3>()
            .map_err(|e| DocumentError::Platform(format!("document does not expose DOM: {e}")))
    }

    fn element_by_id(&self, id: &str) -> Result<IHTMLElement, DocumentError> {
        unsafe { self.dom()?.getElementById(&BSTR::from(id)) }
            .map_err(|_| DocumentError::ElementNotFound(id.to_string()))
    }
}

impl LoginDocument for MshtmlDocument {
    fn location(&self) -> Result<PageLocation, DocumentError> {
        // Reads race the page's own navigation; every failure here is
        // transient by contract.
        let document = self.document()?;
        unsafe {
            let location = document
                .location()
                .map_err(|e| DocumentError::NotReady(e.to_string()))?;
            let host = location
                .host()
                .map_err(|e| DocumentError::NotReady(e.to_string()))?;
            let path = location
                .pathname()
                .map_err(|e| DocumentError::NotReady(e.to_string()))?;
            Ok(PageLocation {
                host: host.to_string(),
                path: path.to_string(),
            })
        }
    }

    fn ready_state(&self) -> Result<ReadyState, DocumentError> {
        let raw = unsafe { self.document()?.readyState() }
            .map_err(|e| DocumentError::NotReady(e.to_string()))?;
        Ok(ReadyState::parse(&raw.to_string()))
    }

    fn element_exists(&self, id: &str) -> Result<bool, DocumentError> {
        match self.element_by_id(id) {
            Ok(_) => Ok(true),
            Err(DocumentError::ElementNotFound(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    fn unique_element_id_by_name(&self, name: &str) -> Result<Option<String>, DocumentError> {
        unsafe {
            let collection = self
                .dom()?
                .getElementsByName(&BSTR::from(name))
                .map_err(|e| DocumentError::Platform(format!("name lookup failed: {e}")))?;
            let length = collection
                .length()
                .map_err(|e| DocumentError::Platform(format!("collection length failed: {e}")))?;
            if length != 1 {
                return Ok(None);
            }
            let item = collection
                .item(&VARIANT::from(BSTR::from(name)), &VARIANT::from(0i32))
                .map_err(|e| DocumentError::Platform(format!("collection item failed: {e}")))?;
            let element: IHTMLElement = item
                .cast()
                .map_err(|e| DocumentError::Platform(format!("item is not an element: {e}")))?;
            let id = element
                .id()
                .map_err(|e| DocumentError::Platform(format!("element id read failed: {e}")))?;
            Ok(Some(id.to_string()))
        }
    }

    fn set_field_value(&self, id: &str, value: &str) -> Result<(), DocumentError> {
        let element = self.element_by_id(id)?;
        unsafe {
            element
                .setAttribute(
                    &BSTR::from("value"),
                    &VARIANT::from(BSTR::from(value)),
                    0,
                )
                .map_err(|e| DocumentError::Platform(format!("value write failed: {e}")))
        }
    }

    fn fire_change_event(&self, id: &str) -> Result<(), DocumentError> {
        let script = format!(
            "{{\n\
             var __sk__evt = document.createEvent('HTMLEvents');\n\
             __sk__evt.initEvent('change', false, true);\n\
             document.getElementById('{id}').dispatchEvent(__sk__evt);\n\
             }}"
        );
        execute_script(self.browser, self.timeout, script)
    }

    fn click(&self, id: &str) -> Result<(), DocumentError> {
        let element = self.element_by_id(id)?;
        unsafe {
            element
                .click()
                .map_err(|e| DocumentError::Script(format!("click on `{id}` failed: {e}")))
        }
    }
}

/// Runs `script` against the document with the apartment affinity MSHTML
/// requires. On the wrong apartment the call is marshalled to a dedicated STA
/// worker, which re-extracts the document from the control handle (the
/// COM-legal way to cross threads); the caller blocks until it finishes.
fn execute_script(
    browser: WindowHandle,
    timeout: Duration,
    script: String,
) -> Result<(), DocumentError> {
    if current_apartment_is_sta() {
        let document = extract_document(browser, timeout)?
            .ok_or_else(|| DocumentError::NotReady("browser control has no document".into()))?;
        return run_script(&document, &script);
    }

    debug!("marshalling script execution to a dedicated STA worker");
    let raw = browser.raw();
    let (sender, receiver) = mpsc::channel::<Result<(), DocumentError>>();
    let worker = thread::Builder::new()
        .name("mshtml-sta-worker".to_string())
        .spawn(move || {
            let result = unsafe {
                let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
                if hr.is_err() {
                    Err(DocumentError::Platform(format!(
                        "worker failed to enter STA: {hr}"
                    )))
                } else {
                    let outcome = extract_document(WindowHandle::new(raw), timeout)
                        .and_then(|doc| {
                            doc.ok_or_else(|| {
                                DocumentError::NotReady(
                                    "browser control has no document".to_string(),
                                )
                            })
                        })
                        .and_then(|doc| run_script(&doc, &script));
                    CoUninitialize();
                    outcome
                }
            };
            let _ = sender.send(result);
        })
        .map_err(|e| DocumentError::Script(format!("failed to spawn STA worker: {e}")))?;

    let outcome = receiver
        .recv()
        .map_err(|_| DocumentError::Script("STA worker dropped its result".to_string()))?;
    let _ = worker.join();
    outcome
}

fn run_script(document: &IHTMLDocument2, script: &str) -> Result<(), DocumentError> {
    unsafe {
        let window: IHTMLWindow2 = document
            .parentWindow()
            .map_err(|e| DocumentError::Script(format!("document has no parent window: {e}")))?;
        window
            .execScript(&BSTR::from(script), &BSTR::from("JavaScript"))
            .map_err(|e| DocumentError::Script(format!("execScript failed: {e}")))?;
    }
    Ok(())
}

fn current_apartment_is_sta() -> bool {
    unsafe {
        let mut apartment = APTTYPE::default();
        let mut qualifier = APTTYPEQUALIFIER::default();
        CoGetApartmentType(&mut apartment, &mut qualifier).is_ok()
            && (apartment == APTTYPE_STA || apartment == APTTYPE_MAINSTA)
    }
}
