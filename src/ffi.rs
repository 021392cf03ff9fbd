//! FFI bindings for Synheart Affect
//!
//! C-compatible entry points for hosts that drive the processor from another
//! language. Strings are null-terminated UTF-8. Every string returned by this
//! module is allocated here and must be released with `affect_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::config::AffectConfig;
use crate::context::TaskType;
use crate::external::{FaceEmotionResult, HandGestureResult};
use crate::processor::{AffectProcessor, SharedAffectProcessor};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse an optional external reading. Malformed input counts as absent.
unsafe fn optional_signal<T>(
    json: *const c_char,
    source: &'static str,
    parse: fn(&str) -> Result<T, crate::error::AffectError>,
) -> Option<T> {
    let json = cstr_to_string(json)?;
    match parse(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(source, error = %e, "ignoring malformed external signal");
            None
        }
    }
}

// ============================================================================
// Processor lifecycle
// ============================================================================

/// Opaque handle to an `AffectProcessor`
pub struct AffectProcessorHandle {
    processor: SharedAffectProcessor,
}

/// Create a processor from a JSON configuration (NULL for defaults).
///
/// Persistence is enabled when the configuration names a database path.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `affect_processor_free`.
/// - Returns NULL on error; call `affect_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_new(
    config_json: *const c_char,
) -> *mut AffectProcessorHandle {
    clear_last_error();

    let config = match cstr_to_string(config_json) {
        Some(json) => match AffectConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => AffectConfig::default(),
    };

    let processor = if config.storage.db_path.is_some() {
        match AffectProcessor::with_persistence(config) {
            Ok(processor) => processor,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    } else {
        AffectProcessor::new(config)
    };

    Box::into_raw(Box::new(AffectProcessorHandle {
        processor: processor.into_shared(),
    }))
}

/// Free a processor, ending any active session and draining pending
/// storage writes.
///
/// # Safety
/// - `processor` must be a pointer returned by `affect_processor_new`, or NULL.
/// - The pointer is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_free(processor: *mut AffectProcessorHandle) {
    if processor.is_null() {
        return;
    }
    let handle = Box::from_raw(processor);
    match Arc::try_unwrap(handle.processor) {
        Ok(processor) => {
            processor.into_inner().shutdown(Utc::now());
        }
        Err(shared) => {
            let mut processor = shared.lock();
            if processor.is_session_active() {
                if let Err(e) = processor.end_session(Utc::now()) {
                    warn!(error = %e, "failed to close session on free");
                }
            }
        }
    }
}

/// Start a session and return its id.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - `task_type` must be NULL (chat) or a valid C string: "chat",
///   "navigation" or "passive".
/// - Returns a newly allocated string; free with `affect_free_string`.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_start_session(
    processor: *mut AffectProcessorHandle,
    task_type: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let task = match cstr_to_string(task_type) {
        Some(s) => match s.parse::<TaskType>() {
            Ok(task) => task,
            Err(e) => {
                set_last_error(&e);
                return ptr::null_mut();
            }
        },
        None => TaskType::default(),
    };

    let id = handle.processor.lock().start_session(Utc::now(), task);
    string_to_cstr(&id)
}

/// End the active session and return it as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - Returns a newly allocated string; free with `affect_free_string`.
/// - Returns NULL if no session is active.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_end_session(
    processor: *mut AffectProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let result = handle.processor.lock().end_session(Utc::now());
    match result.and_then(|session| Ok(serde_json::to_string(&session)?)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Input
// ============================================================================

/// Feed one JSON-encoded input event.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns 1 if the event was taken, 0 if collection is idle, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_ingest(
    processor: *mut AffectProcessorHandle,
    event_json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &*processor;

    let json = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return -1;
        }
    };

    match handle.processor.lock().ingest_json(&json) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Record whether the user's latest action succeeded (non-zero = success).
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_record_outcome(
    processor: *mut AffectProcessorHandle,
    success: i32,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    (*processor).processor.lock().record_outcome(success != 0);
    0
}

// ============================================================================
// Tick and output
// ============================================================================

/// Run one tick at the current time and return the state as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - `face_json` and `hand_json` must each be NULL or a valid C string.
///   Malformed readings are treated as absent.
/// - Returns a newly allocated string; free with `affect_free_string`.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_tick(
    processor: *mut AffectProcessorHandle,
    face_json: *const c_char,
    hand_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let face = optional_signal(face_json, "face", FaceEmotionResult::from_json);
    let hand = optional_signal(hand_json, "hand", HandGestureResult::from_json);

    let mut processor = handle.processor.lock();
    let state = processor.tick(Utc::now(), face.as_ref(), hand.as_ref());
    match processor.encode_state(&state) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Context block for the latest tick.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - Returns a newly allocated string; free with `affect_free_string`.
/// - Returns NULL before the first tick.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_context_block(
    processor: *mut AffectProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    match (*processor).processor.lock().context_block() {
        Some(block) => string_to_cstr(&block),
        None => {
            set_last_error("No pipeline state yet");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Baselines
// ============================================================================

/// Save baseline state to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - Returns a newly allocated string; free with `affect_free_string`.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_save_baselines(
    processor: *mut AffectProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    match (*processor).processor.lock().save_baselines() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load baseline state from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_load_baselines(
    processor: *mut AffectProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match (*processor).processor.lock().load_baselines(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Queue a purge of all stored sessions, baselines and trajectories.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `affect_processor_new`.
/// - Returns 0 when queued, -1 when the processor has no storage.
#[no_mangle]
pub unsafe extern "C" fn affect_processor_purge(processor: *mut AffectProcessorHandle) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    if (*processor).processor.lock().purge_all_data() {
        0
    } else {
        set_last_error("Processor has no storage");
        -1
    }
}

// ============================================================================
// Memory and errors
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a pointer returned by an `affect_*` function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn affect_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Last error message on this thread.
///
/// # Safety
/// - The pointer is valid until the next `affect_*` call on this thread.
/// - Do NOT free it. NULL if the last call succeeded.
#[no_mangle]
pub unsafe extern "C" fn affect_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn affect_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
