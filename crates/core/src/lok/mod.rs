//! LibreOfficeKit backend.
//!
//! Loads the LibreOffice core library from an installation's `program`
//! directory and drives it through its C vtables. The library is never
//! unloaded, and LibreOffice cannot be started twice in one process, so a
//! second [`Backend::start`] after the first engine is destroyed fails.

mod ffi;

use crate::config::EngineConfig;
use crate::engine::{Backend, DocumentHandle, Engine};
use crate::error::{OfficeError, Result};
use std::ffi::{CStr, CString};
use std::mem::offset_of;
use std::os::raw::{c_char, c_long, c_void};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["libsofficeapp.dylib", "libmergedlo.dylib"];
#[cfg(not(target_os = "macos"))]
const LIBRARY_NAMES: &[&str] = &["libsofficeapp.so", "libmergedlo.so"];

const PROGRAM_DIR_CANDIDATES: &[&str] = &[
    // macOS
    "/Applications/LibreOffice.app/Contents/Frameworks",
    // Linux
    "/usr/lib/libreoffice/program",
    "/usr/lib64/libreoffice/program",
    "/usr/local/lib/libreoffice/program",
    "/opt/libreoffice/program",
    // Snap (Ubuntu)
    "/snap/libreoffice/current/lib/libreoffice/program",
];

static STARTED: AtomicBool = AtomicBool::new(false);

/// Backend that starts the installed LibreOffice in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibreOfficeKit;

impl LibreOfficeKit {
    pub fn new() -> Self {
        Self
    }

    /// Locate the LibreOffice `program` directory.
    pub fn find_program_dir(config: &EngineConfig) -> Result<PathBuf> {
        if let Some(ref dir) = config.install_dir {
            if has_core_library(dir) {
                return Ok(dir.clone());
            }
            return Err(OfficeError::EngineNotFound);
        }

        for candidate in PROGRAM_DIR_CANDIDATES {
            let dir = Path::new(candidate);
            if has_core_library(dir) {
                return Ok(dir.to_path_buf());
            }
        }

        // Try PATH; /usr/bin/soffice is usually a symlink into program/
        which::which("soffice")
            .or_else(|_| which::which("libreoffice"))
            .ok()
            .and_then(|bin| bin.canonicalize().ok())
            .and_then(|bin| bin.parent().map(Path::to_path_buf))
            .filter(|dir| has_core_library(dir))
            .ok_or(OfficeError::EngineNotFound)
    }
}

fn has_core_library(dir: &Path) -> bool {
    LIBRARY_NAMES.iter().any(|name| dir.join(name).exists())
}

fn c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value).map_err(|_| OfficeError::EngineStartFailed {
        message: format!("{} contains a NUL byte", what),
    })
}

fn dl_error() -> String {
    // SAFETY: dlerror returns either null or a thread-local C string.
    unsafe {
        let message = libc::dlerror();
        if message.is_null() {
            "unknown dlopen error".to_string()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}

fn open_library(program_dir: &Path) -> Result<*mut c_void> {
    let mut errors = Vec::new();
    for name in LIBRARY_NAMES {
        let path = program_dir.join(name);
        if !path.exists() {
            continue;
        }
        let c_path = c_string(&path.to_string_lossy(), "library path")?;
        // SAFETY: c_path is a valid NUL-terminated string.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY | libc::RTLD_GLOBAL) };
        if !handle.is_null() {
            debug!("Loaded {:?}", path);
            return Ok(handle);
        }
        errors.push(format!("{}: {}", path.display(), dl_error()));
    }

    Err(OfficeError::EngineStartFailed {
        message: if errors.is_empty() {
            format!("no LibreOfficeKit library in {}", program_dir.display())
        } else {
            errors.join("; ")
        },
    })
}

fn symbol(library: *mut c_void, name: &CStr) -> Option<*mut c_void> {
    // SAFETY: library is a live handle from dlopen and name is NUL-terminated.
    let sym = unsafe { libc::dlsym(library, name.as_ptr()) };
    (!sym.is_null()).then_some(sym)
}

fn file_url(path: &Path) -> String {
    let path = path.to_string_lossy();
    let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
    format!("file://{}", encoded.join("/"))
}

fn absolute(path: &str) -> String {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_string_lossy().into_owned();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path).to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Take ownership of a malloc'd string returned by the engine.
///
/// # Safety
/// `raw` must be null or a string the caller is responsible for freeing.
unsafe fn take_string(raw: *mut c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    let value = CStr::from_ptr(raw).to_string_lossy().into_owned();
    libc::free(raw.cast());
    Some(value)
}

macro_rules! slot {
    ($class:expr, $ty:ty, $field:ident) => {
        if ffi::has_slot($class.n_size, offset_of!($ty, $field)) {
            $class.$field
        } else {
            None
        }
    };
}

impl Backend for LibreOfficeKit {
    type Engine = LokOffice;

    fn start(&self, config: &EngineConfig) -> Result<LokOffice> {
        if STARTED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OfficeError::EngineStartFailed {
                message: "LibreOfficeKit has already been started in this process".to_string(),
            });
        }

        let started = start_engine(config);
        if started.is_err() {
            STARTED.store(false, Ordering::SeqCst);
        }
        started
    }
}

fn start_engine(config: &EngineConfig) -> Result<LokOffice> {
    let program_dir = LibreOfficeKit::find_program_dir(config)?;
    let library = open_library(&program_dir)?;

    let (profile_dir, temp_profile) = match &config.user_profile {
        Some(dir) => (dir.clone(), None),
        None => {
            let temp = TempDir::with_prefix("officekit-profile-")?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };

    let install = c_string(&program_dir.to_string_lossy(), "install path")?;
    let profile_url = c_string(&file_url(&profile_dir), "profile path")?;

    let raw = if let Some(hook2) = symbol(library, c"libreofficekit_hook_2") {
        // SAFETY: the symbol has the libreofficekit_hook_2 signature.
        unsafe {
            let hook2: ffi::Hook2Fn = std::mem::transmute(hook2);
            hook2(install.as_ptr(), profile_url.as_ptr())
        }
    } else if let Some(hook) = symbol(library, c"libreofficekit_hook") {
        if config.user_profile.is_some() {
            warn!("This LibreOffice does not support a custom user profile; ignoring it");
        }
        // SAFETY: the symbol has the libreofficekit_hook signature.
        unsafe {
            let hook: ffi::HookFn = std::mem::transmute(hook);
            hook(install.as_ptr())
        }
    } else {
        return Err(OfficeError::EngineStartFailed {
            message: format!("no libreofficekit_hook in {}: {}", program_dir.display(), dl_error()),
        });
    };

    let raw = NonNull::new(raw).ok_or_else(|| OfficeError::EngineStartFailed {
        message: format!("LibreOfficeKit failed to initialize from {}", program_dir.display()),
    })?;

    info!("Started LibreOfficeKit from {:?}", program_dir);
    Ok(LokOffice {
        raw,
        local_error: None,
        _profile: temp_profile,
    })
}

/// A running LibreOfficeKit instance.
pub struct LokOffice {
    raw: NonNull<ffi::LibreOfficeKit>,
    /// Errors raised on this side of the boundary, before the engine saw the call.
    local_error: Option<String>,
    _profile: Option<TempDir>,
}

// SAFETY: the instance is only ever used through &mut self, and callers
// serialize all access to it and its documents.
unsafe impl Send for LokOffice {}

impl LokOffice {
    fn class(&self) -> &ffi::LibreOfficeKitClass {
        // SAFETY: raw is live until drop and its class pointer is static.
        unsafe { &*(*self.raw.as_ptr()).class }
    }

    fn free_error(&self, raw: *mut c_char) {
        if raw.is_null() {
            return;
        }
        match slot!(self.class(), ffi::LibreOfficeKitClass, free_error) {
            // SAFETY: raw came from getError on this instance.
            Some(free_error) => unsafe { free_error(raw) },
            // SAFETY: older engines allocate errors with malloc.
            None => unsafe { libc::free(raw.cast()) },
        }
    }
}

impl Engine for LokOffice {
    type Document = LokDocument;

    fn load_document(&mut self, path: &str, options: Option<&str>) -> Option<LokDocument> {
        self.local_error = None;

        let url = match CString::new(absolute(path)) {
            Ok(url) => url,
            Err(_) => {
                self.local_error = Some(format!("Path {:?} contains a NUL byte", path));
                return None;
            }
        };
        let options = match options.map(CString::new).transpose() {
            Ok(options) => options,
            Err(_) => {
                self.local_error = Some("Load options contain a NUL byte".to_string());
                return None;
            }
        };

        let class = self.class();
        let this = self.raw.as_ptr();
        // SAFETY: this is live; url and options outlive the call.
        let raw = unsafe {
            match (
                slot!(class, ffi::LibreOfficeKitClass, document_load_with_options),
                class.document_load,
            ) {
                (Some(load), _) => load(
                    this,
                    url.as_ptr(),
                    options.as_ref().map_or(ptr::null(), |o| o.as_ptr()),
                ),
                (None, Some(load)) => load(this, url.as_ptr()),
                (None, None) => ptr::null_mut(),
            }
        };

        NonNull::new(raw).map(|raw| LokDocument { raw })
    }

    fn last_error(&mut self) -> Option<String> {
        if let Some(message) = self.local_error.clone() {
            return Some(message);
        }
        let get_error = self.class().get_error?;
        // SAFETY: raw is live; the returned string is owned by us.
        let raw = unsafe { get_error(self.raw.as_ptr()) };
        if raw.is_null() {
            return None;
        }
        // SAFETY: raw is a NUL-terminated string from getError.
        let message = unsafe { CStr::from_ptr(raw).to_string_lossy().into_owned() };
        self.free_error(raw);
        Some(message)
    }

    fn version_info(&mut self) -> Option<String> {
        let get_version_info = slot!(self.class(), ffi::LibreOfficeKitClass, get_version_info)?;
        // SAFETY: raw is live; the returned string is malloc'd and ours.
        unsafe { take_string(get_version_info(self.raw.as_ptr())) }
    }
}

impl Drop for LokOffice {
    fn drop(&mut self) {
        if let Some(destroy) = self.class().destroy {
            // SAFETY: every document of this instance has already been destroyed.
            unsafe { destroy(self.raw.as_ptr()) };
        }
        debug!("LibreOfficeKit instance destroyed");
    }
}

/// A document loaded by [`LokOffice`].
pub struct LokDocument {
    raw: NonNull<ffi::LibreOfficeKitDocument>,
}

// SAFETY: as for LokOffice, all calls are serialized by the caller.
unsafe impl Send for LokDocument {}

impl LokDocument {
    fn class(&self) -> &ffi::LibreOfficeKitDocumentClass {
        // SAFETY: raw is live until drop and its class pointer is static.
        unsafe { &*(*self.raw.as_ptr()).class }
    }

    fn this(&self) -> *mut ffi::LibreOfficeKitDocument {
        self.raw.as_ptr()
    }
}

type DocClass = ffi::LibreOfficeKitDocumentClass;

impl DocumentHandle for LokDocument {
    fn document_type(&mut self) -> i32 {
        match slot!(self.class(), DocClass, get_document_type) {
            // SAFETY: document is live.
            Some(f) => unsafe { f(self.this()) },
            None => -1,
        }
    }

    fn document_size(&mut self) -> (i64, i64) {
        let (mut width, mut height): (c_long, c_long) = (0, 0);
        if let Some(f) = slot!(self.class(), DocClass, get_document_size) {
            // SAFETY: document is live and both out-pointers are valid.
            unsafe { f(self.this(), &mut width, &mut height) };
        }
        (width as i64, height as i64)
    }

    fn parts(&mut self) -> i32 {
        match slot!(self.class(), DocClass, get_parts) {
            // SAFETY: document is live.
            Some(f) => unsafe { f(self.this()) },
            None => 0,
        }
    }

    fn part(&mut self) -> i32 {
        match slot!(self.class(), DocClass, get_part) {
            // SAFETY: document is live.
            Some(f) => unsafe { f(self.this()) },
            None => 0,
        }
    }

    fn set_part(&mut self, part: i32) {
        if let Some(f) = slot!(self.class(), DocClass, set_part) {
            // SAFETY: document is live; part was range-checked by the caller.
            unsafe { f(self.this(), part) };
        }
    }

    fn part_name(&mut self, part: i32) -> Option<String> {
        let f = slot!(self.class(), DocClass, get_part_name)?;
        // SAFETY: document is live; the name is malloc'd and ours.
        unsafe { take_string(f(self.this(), part)) }
    }

    fn initialize_for_rendering(&mut self, arguments: Option<&str>) {
        let Some(f) = slot!(self.class(), DocClass, initialize_for_rendering) else {
            return;
        };
        let arguments = arguments.and_then(|a| CString::new(a).ok());
        // SAFETY: document is live; arguments outlives the call.
        unsafe {
            f(
                self.this(),
                arguments.as_ref().map_or(ptr::null(), |a| a.as_ptr()),
            )
        };
    }

    fn tile_mode(&mut self) -> i32 {
        match slot!(self.class(), DocClass, get_tile_mode) {
            // SAFETY: document is live.
            Some(f) => unsafe { f(self.this()) },
            None => 0,
        }
    }

    fn paint_tile(
        &mut self,
        buffer: &mut [u8],
        canvas_width: i32,
        canvas_height: i32,
        tile_x: i32,
        tile_y: i32,
        tile_width: i32,
        tile_height: i32,
    ) {
        let required = (canvas_width.max(0) as usize) * (canvas_height.max(0) as usize) * 4;
        if buffer.len() < required {
            warn!(
                "Tile buffer of {} bytes is too small for {}x{}; not painting",
                buffer.len(),
                canvas_width,
                canvas_height
            );
            return;
        }
        if let Some(f) = slot!(self.class(), DocClass, paint_tile) {
            // SAFETY: document is live and buffer holds canvas_width * canvas_height * 4 bytes.
            unsafe {
                f(
                    self.this(),
                    buffer.as_mut_ptr(),
                    canvas_width,
                    canvas_height,
                    tile_x,
                    tile_y,
                    tile_width,
                    tile_height,
                )
            };
        }
    }

    fn post_uno_command(&mut self, command: &str, arguments: Option<&str>, notify: bool) {
        let Some(f) = slot!(self.class(), DocClass, post_uno_command) else {
            return;
        };
        let Ok(command) = CString::new(command) else {
            warn!("Dropping UNO command containing a NUL byte");
            return;
        };
        let arguments = arguments.and_then(|a| CString::new(a).ok());
        // SAFETY: document is live; strings outlive the call.
        unsafe {
            f(
                self.this(),
                command.as_ptr(),
                arguments.as_ref().map_or(ptr::null(), |a| a.as_ptr()),
                notify,
            )
        };
    }

    fn text_selection(&mut self, mime_type: &str) -> Option<String> {
        let f = slot!(self.class(), DocClass, get_text_selection)?;
        let mime_type = CString::new(mime_type).ok()?;
        let mut used_mime_type: *mut c_char = ptr::null_mut();
        // SAFETY: document is live; both returned strings are malloc'd and ours.
        unsafe {
            let text = take_string(f(self.this(), mime_type.as_ptr(), &mut used_mime_type));
            take_string(used_mime_type);
            text
        }
    }

    fn save_as(&mut self, path: &str, format: &str, filter_options: Option<&str>) -> bool {
        let Some(f) = self.class().save_as else {
            return false;
        };
        let (Ok(url), Ok(format)) = (CString::new(absolute(path)), CString::new(format)) else {
            return false;
        };
        let filter_options = filter_options.and_then(|o| CString::new(o).ok());
        // SAFETY: document is live; strings outlive the call.
        let saved = unsafe {
            f(
                self.this(),
                url.as_ptr(),
                format.as_ptr(),
                filter_options.as_ref().map_or(ptr::null(), |o| o.as_ptr()),
            )
        };
        saved != 0
    }
}

impl Drop for LokDocument {
    fn drop(&mut self) {
        if let Some(destroy) = self.class().destroy {
            // SAFETY: document is live and dropped exactly once.
            unsafe { destroy(self.this()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_program_dir_rejects_bad_install_dir() {
        let config = EngineConfig::with_install_dir("/nonexistent/libreoffice/program");
        assert!(matches!(
            LibreOfficeKit::find_program_dir(&config),
            Err(OfficeError::EngineNotFound)
        ));
    }

    #[test]
    fn test_find_program_dir_accepts_dir_with_library() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LIBRARY_NAMES[1]), b"").unwrap();
        let config = EngineConfig::with_install_dir(dir.path());
        assert_eq!(
            LibreOfficeKit::find_program_dir(&config).unwrap(),
            dir.path()
        );
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        assert_eq!(absolute("/tmp/a.docx"), "/tmp/a.docx");
        assert!(Path::new(&absolute("a.docx")).is_absolute());
    }

    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/profile")), "file:///tmp/profile");
        assert_eq!(
            file_url(Path::new("/tmp/my profile/#1")),
            "file:///tmp/my%20profile/%231"
        );
    }
}
