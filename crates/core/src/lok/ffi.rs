//! Raw LibreOfficeKit C ABI.
//!
//! Mirrors `LibreOfficeKit.h` with the unstable API enabled. Only the
//! leading slots up to the ones this crate calls are declared; both class
//! structs are append-only, so newer engines simply report a larger
//! `n_size`.

#![allow(dead_code)]

use std::os::raw::{c_char, c_int, c_long, c_uchar, c_void};

pub type LibreOfficeKitCallback =
    Option<unsafe extern "C" fn(n_type: c_int, payload: *const c_char, data: *mut c_void)>;

/// `libreofficekit_hook(install_path)`
pub type HookFn = unsafe extern "C" fn(install_path: *const c_char) -> *mut LibreOfficeKit;

/// `libreofficekit_hook_2(install_path, user_profile_url)`
pub type Hook2Fn = unsafe extern "C" fn(
    install_path: *const c_char,
    user_profile_url: *const c_char,
) -> *mut LibreOfficeKit;

#[repr(C)]
pub struct LibreOfficeKit {
    pub class: *const LibreOfficeKitClass,
}

#[repr(C)]
pub struct LibreOfficeKitClass {
    pub n_size: usize,

    pub destroy: Option<unsafe extern "C" fn(this: *mut LibreOfficeKit)>,
    pub document_load: Option<
        unsafe extern "C" fn(this: *mut LibreOfficeKit, url: *const c_char) -> *mut LibreOfficeKitDocument,
    >,
    pub get_error: Option<unsafe extern "C" fn(this: *mut LibreOfficeKit) -> *mut c_char>,
    pub document_load_with_options: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKit,
            url: *const c_char,
            options: *const c_char,
        ) -> *mut LibreOfficeKitDocument,
    >,
    pub free_error: Option<unsafe extern "C" fn(message: *mut c_char)>,
    pub register_callback: Option<
        unsafe extern "C" fn(this: *mut LibreOfficeKit, callback: LibreOfficeKitCallback, data: *mut c_void),
    >,
    pub get_filter_types: Option<unsafe extern "C" fn(this: *mut LibreOfficeKit) -> *mut c_char>,
    pub set_optional_features: Option<unsafe extern "C" fn(this: *mut LibreOfficeKit, features: u64)>,
    pub set_document_password: Option<
        unsafe extern "C" fn(this: *mut LibreOfficeKit, url: *const c_char, password: *const c_char),
    >,
    pub get_version_info: Option<unsafe extern "C" fn(this: *mut LibreOfficeKit) -> *mut c_char>,
}

#[repr(C)]
pub struct LibreOfficeKitDocument {
    pub class: *const LibreOfficeKitDocumentClass,
}

#[repr(C)]
pub struct LibreOfficeKitDocumentClass {
    pub n_size: usize,

    pub destroy: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument)>,
    pub save_as: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKitDocument,
            url: *const c_char,
            format: *const c_char,
            filter_options: *const c_char,
        ) -> c_int,
    >,
    pub get_document_type: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument) -> c_int>,
    pub get_parts: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument) -> c_int>,
    pub get_part_page_rectangles:
        Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument) -> *mut c_char>,
    pub get_part: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument) -> c_int>,
    pub set_part: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, part: c_int)>,
    pub get_part_name:
        Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, part: c_int) -> *mut c_char>,
    pub set_part_mode: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, mode: c_int)>,
    pub paint_tile: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKitDocument,
            buffer: *mut c_uchar,
            canvas_width: c_int,
            canvas_height: c_int,
            tile_pos_x: c_int,
            tile_pos_y: c_int,
            tile_width: c_int,
            tile_height: c_int,
        ),
    >,
    pub get_tile_mode: Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument) -> c_int>,
    pub get_document_size: Option<
        unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, width: *mut c_long, height: *mut c_long),
    >,
    pub initialize_for_rendering:
        Option<unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, arguments: *const c_char)>,
    pub register_callback: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKitDocument,
            callback: LibreOfficeKitCallback,
            data: *mut c_void,
        ),
    >,
    pub post_key_event: Option<
        unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, n_type: c_int, char_code: c_int, key_code: c_int),
    >,
    pub post_mouse_event: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKitDocument,
            n_type: c_int,
            x: c_int,
            y: c_int,
            count: c_int,
            buttons: c_int,
            modifier: c_int,
        ),
    >,
    pub post_uno_command: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKitDocument,
            command: *const c_char,
            arguments: *const c_char,
            notify_when_finished: bool,
        ),
    >,
    pub set_text_selection: Option<
        unsafe extern "C" fn(this: *mut LibreOfficeKitDocument, n_type: c_int, x: c_int, y: c_int),
    >,
    pub get_text_selection: Option<
        unsafe extern "C" fn(
            this: *mut LibreOfficeKitDocument,
            mime_type: *const c_char,
            used_mime_type: *mut *mut c_char,
        ) -> *mut c_char,
    >,
}

/// Whether a class struct of `n_size` bytes contains the slot at `offset`.
pub fn has_slot(n_size: usize, offset: usize) -> bool {
    offset + std::mem::size_of::<usize>() <= n_size
}
