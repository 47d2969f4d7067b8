//! Windows backend: window-tree enumeration and the MSHTML document bridge.

mod mshtml;

use std::time::Duration;

use tracing::debug;
use windows::core::BOOL;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, LPARAM, WPARAM};
use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::UI::Input::KeyboardAndMouse::VK_RETURN;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumThreadWindows, GetClassNameW, GetWindowTextLengthW, GetWindowTextW,
    IsWindowVisible, PostMessageW, SendMessageW, WM_KEYDOWN, WM_KEYUP, WM_SETTEXT,
};

use crate::document::{DocumentError, LoginDocument};
use crate::errors::LoginError;
use crate::locator::{
    classify_top_level, select_login_control, LoginSurface, TopLevelClassification, WindowHandle,
    WindowInfo,
};
use crate::platforms::AutomationBackend;
use crate::process::SupervisedProcess;

pub struct WindowsBackend {
    html_object_timeout: Duration,
}

impl WindowsBackend {
    pub fn new(html_object_timeout: Duration) -> Result<Self, LoginError> {
        // MSHTML document objects are apartment-threaded; the primary control
        // thread therefore joins an STA. "Already initialized" is fine.
        unsafe {
            let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            if hr.is_err() && hr != windows::Win32::Foundation::RPC_E_CHANGED_MODE {
                return Err(LoginError::UnsupportedPlatform(format!(
                    "failed to initialize COM: {hr}"
                )));
            }
        }
        Ok(Self {
            html_object_timeout,
        })
    }
}

impl AutomationBackend for WindowsBackend {
    fn locate_login_surface(&self, process: &SupervisedProcess) -> LoginSurface {
        let top_level = match top_level_windows(process.pid()) {
            Ok(windows) => windows,
            Err(error) => {
                // Enumeration failures are retried on the next cycle.
                debug!(%error, "window enumeration failed");
                return LoginSurface::NotFound;
            }
        };

        let dialog = match classify_top_level(&top_level) {
            TopLevelClassification::AlreadyAuthenticated => {
                return LoginSurface::AlreadyAuthenticated
            }
            TopLevelClassification::NotFound => return LoginSurface::NotFound,
            TopLevelClassification::LoginDialog(handle) => handle,
        };

        // The dialog can vanish between enumeration and this read; an empty
        // child list then classifies as NotFound and the caller re-polls.
        let children = child_windows(hwnd(dialog));
        match select_login_control(&children) {
            Some(control) => LoginSurface::Found { dialog, control },
            None => LoginSurface::NotFound,
        }
    }

    fn open_document(
        &self,
        control: WindowHandle,
    ) -> Result<Option<Box<dyn LoginDocument>>, DocumentError> {
        mshtml::open_document(control, self.html_object_timeout)
    }

    fn submit_native_login(
        &self,
        control: WindowHandle,
        username: &str,
    ) -> Result<(), DocumentError> {
        let target = hwnd(control);
        let mut text: Vec<u16> = username.encode_utf16().collect();
        text.push(0);
        unsafe {
            SendMessageW(
                target,
                WM_SETTEXT,
                Some(WPARAM(0)),
                Some(LPARAM(text.as_ptr() as isize)),
            );
            PostMessageW(
                Some(target),
                WM_KEYDOWN,
                WPARAM(VK_RETURN.0 as usize),
                LPARAM(0),
            )
            .map_err(|e| DocumentError::Platform(format!("failed to post key down: {e}")))?;
            PostMessageW(
                Some(target),
                WM_KEYUP,
                WPARAM(VK_RETURN.0 as usize),
                LPARAM(0),
            )
            .map_err(|e| DocumentError::Platform(format!("failed to post key up: {e}")))?;
        }
        Ok(())
    }
}

pub(crate) fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.raw() as *mut core::ffi::c_void)
}

// RAII guard so Toolhelp snapshots are always closed.
struct HandleGuard(HANDLE);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Ids of every thread owned by the process, via a Toolhelp snapshot.
fn thread_ids(pid: u32) -> Result<Vec<u32>, DocumentError> {
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)
            .map_err(|e| DocumentError::Platform(format!("thread snapshot failed: {e}")))?;
        let _guard = HandleGuard(snapshot);

        let mut entry = THREADENTRY32 {
            dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
            ..Default::default()
        };

        let mut ids = Vec::new();
        if Thread32First(snapshot, &mut entry).is_err() {
            return Err(DocumentError::Platform(
                "failed to read first thread entry".to_string(),
            ));
        }
        loop {
            if entry.th32OwnerProcessID == pid {
                ids.push(entry.th32ThreadID);
            }
            if Thread32Next(snapshot, &mut entry).is_err() {
                break;
            }
        }
        Ok(ids)
    }
}

/// Every top-level window belonging to every thread of the process.
fn top_level_windows(pid: u32) -> Result<Vec<WindowInfo>, DocumentError> {
    let mut handles: Vec<HWND> = Vec::new();
    for thread_id in thread_ids(pid)? {
        unsafe {
            let _ = EnumThreadWindows(
                thread_id,
                Some(collect_window),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            );
        }
    }
    Ok(handles.into_iter().map(snapshot_window).collect())
}

fn child_windows(parent: HWND) -> Vec<WindowInfo> {
    let mut handles: Vec<HWND> = Vec::new();
    unsafe {
        let _ = EnumChildWindows(
            Some(parent),
            Some(collect_window),
            LPARAM(&mut handles as *mut Vec<HWND> as isize),
        );
    }
    handles.into_iter().map(snapshot_window).collect()
}

unsafe extern "system" fn collect_window(window: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(window);
    true.into()
}

fn snapshot_window(window: HWND) -> WindowInfo {
    WindowInfo {
        handle: WindowHandle::new(window.0 as isize),
        class_name: window_class_name(window),
        title: window_title(window),
        visible: unsafe { IsWindowVisible(window) }.as_bool(),
    }
}

fn window_class_name(window: HWND) -> String {
    let mut buffer = [0u16; 256];
    let len = unsafe { GetClassNameW(window, &mut buffer) };
    String::from_utf16_lossy(&buffer[..len.max(0) as usize])
}

fn window_title(window: HWND) -> String {
    let len = unsafe { GetWindowTextLengthW(window) };
    if len <= 0 {
        return String::new();
    }
    let mut buffer = vec![0u16; len as usize + 1];
    let copied = unsafe { GetWindowTextW(window, &mut buffer) };
    String::from_utf16_lossy(&buffer[..copied.max(0) as usize])
}
