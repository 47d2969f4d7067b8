//! Window classification over snapshot fixtures.

use crate::locator::{
    classify_top_level, select_login_control, LoginControl, TopLevelClassification, WindowHandle,
    WindowInfo, LOGIN_WINDOW_CLASS, MAIN_WINDOW_CLASS, PRE_LOGIN_TITLES,
};

fn win(raw: isize, class_name: &str, title: &str, visible: bool) -> WindowInfo {
    WindowInfo {
        handle: WindowHandle::new(raw),
        class_name: class_name.to_string(),
        title: title.to_string(),
        visible,
    }
}

#[test]
fn empty_window_set_is_not_found() {
    assert_eq!(classify_top_level(&[]), TopLevelClassification::NotFound);
}

#[test]
fn unrelated_windows_are_ignored() {
    let windows = [
        win(0x1, "Shell_TrayWnd", "", true),
        win(0x2, "tooltips_class32", "", false),
    ];
    assert_eq!(
        classify_top_level(&windows),
        TopLevelClassification::NotFound
    );
}

#[test]
fn visible_main_window_means_already_authenticated() {
    let windows = [win(0x10, MAIN_WINDOW_CLASS, PRE_LOGIN_TITLES[1], true)];
    assert_eq!(
        classify_top_level(&windows),
        TopLevelClassification::AlreadyAuthenticated
    );
}

#[test]
fn retitled_main_window_means_already_authenticated() {
    // An invisible main window whose title is no longer a pre-login title
    // belongs to a signed-in session.
    let windows = [
        win(0x10, MAIN_WINDOW_CLASS, "alice - Skype", false),
        win(0x20, LOGIN_WINDOW_CLASS, "", false),
    ];
    assert_eq!(
        classify_top_level(&windows),
        TopLevelClassification::AlreadyAuthenticated
    );
}

#[test]
fn pre_login_main_window_does_not_mask_the_login_dialog() {
    let windows = [
        win(0x10, MAIN_WINDOW_CLASS, PRE_LOGIN_TITLES[0], false),
        win(0x20, LOGIN_WINDOW_CLASS, "Skype", false),
    ];
    assert_eq!(
        classify_top_level(&windows),
        TopLevelClassification::LoginDialog(WindowHandle::new(0x20))
    );
}

#[test]
fn missing_login_dialog_is_not_found() {
    let windows = [win(0x10, MAIN_WINDOW_CLASS, PRE_LOGIN_TITLES[1], false)];
    assert_eq!(
        classify_top_level(&windows),
        TopLevelClassification::NotFound
    );
}

#[test]
fn first_login_dialog_wins_on_duplicates() {
    // The target creates duplicate login windows and destroys all but one;
    // the tie-break is first in enumeration order.
    let windows = [
        win(0x20, LOGIN_WINDOW_CLASS, "", false),
        win(0x30, LOGIN_WINDOW_CLASS, "", false),
    ];
    assert_eq!(
        classify_top_level(&windows),
        TopLevelClassification::LoginDialog(WindowHandle::new(0x20))
    );
}

#[test]
fn classification_is_idempotent_on_an_unchanged_window_set() {
    let windows = [
        win(0x10, MAIN_WINDOW_CLASS, PRE_LOGIN_TITLES[0], false),
        win(0x20, LOGIN_WINDOW_CLASS, "", false),
    ];
    assert_eq!(classify_top_level(&windows), classify_top_level(&windows));
}

#[test]
fn browser_child_is_selected_by_class_prefix() {
    let children = [
        win(0x100, "TPanel", "", true),
        win(0x101, "Internet Explorer_Server1", "", true),
    ];
    assert_eq!(
        select_login_control(&children),
        Some(LoginControl::Browser(WindowHandle::new(0x101)))
    );
}

#[test]
fn edit_child_is_selected_by_class_prefix() {
    let children = [
        win(0x100, "TPanel", "", true),
        win(0x102, "TEditUserName", "", true),
    ];
    assert_eq!(
        select_login_control(&children),
        Some(LoginControl::Edit(WindowHandle::new(0x102)))
    );
}

#[test]
fn first_matching_child_wins_in_enumeration_order() {
    let children = [
        win(0x102, "TEdit", "", true),
        win(0x101, "Internet Explorer_Server", "", true),
    ];
    assert_eq!(
        select_login_control(&children),
        Some(LoginControl::Edit(WindowHandle::new(0x102)))
    );
}

#[test]
fn no_matching_child_yields_none() {
    let children = [win(0x100, "TPanel", "", true)];
    assert_eq!(select_login_control(&children), None);
}
