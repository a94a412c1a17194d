//! FFI bindings for Attention Flux
//!
//! This module provides C-compatible functions for driving an attention engine
//! from other languages. Inputs and outputs are JSON in null-terminated C
//! strings; returned strings are allocated here and must be freed by the caller
//! using `attn_free_string`. Timestamps are Unix milliseconds supplied by the
//! caller.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::engine::AttentionEngine;
use crate::error::TrackerError;
use crate::types::Frame;

// Thread-local storage for the last error message
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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn timestamp(unix_ms: i64) -> Result<DateTime<Utc>, TrackerError> {
    Utc.timestamp_millis_opt(unix_ms)
        .single()
        .ok_or(TrackerError::InvalidTimestamp(unix_ms))
}

/// Serialize `result` into a caller-owned string, or record the error and return NULL
fn json_result<T: Serialize>(result: Result<T, TrackerError>) -> *mut c_char {
    match result.and_then(|value| Ok(serde_json::to_string(&value)?)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to an AttentionEngine
pub struct AttnEngineHandle {
    engine: AttentionEngine,
}

/// Create a new engine.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a pointer that must be freed with `attn_engine_free`.
/// - Returns NULL on error; call `attn_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_new(config_json: *const c_char) -> *mut AttnEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        TrackerConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match TrackerConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(AttnEngineHandle {
        engine: AttentionEngine::new(config),
    });
    Box::into_raw(handle)
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_free(engine: *mut AttnEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Process one frame and return the frame outcome as JSON.
///
/// `frame_json` is `{"landmarks": [[x, y], ...] | null}`; a missing or null
/// `landmarks` field means no face was detected.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `attn_free_string`.
/// - Returns NULL on error; call `attn_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_process_frame(
    engine: *mut AttnEngineHandle,
    frame_json: *const c_char,
    unix_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    let json = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid frame string pointer");
            return ptr::null_mut();
        }
    };

    let outcome = serde_json::from_str::<Frame>(&json)
        .map_err(TrackerError::from)
        .and_then(|frame| {
            let now = timestamp(unix_ms)?;
            Ok(handle.engine.process_frame(frame.landmarks.as_ref(), now))
        });
    json_result(outcome)
}

/// Current session stats as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`.
/// - Returns a newly allocated string that must be freed with `attn_free_string`.
/// - Returns NULL on error; call `attn_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_stats(
    engine: *const AttnEngineHandle,
    unix_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    json_result(timestamp(unix_ms).map(|now| handle.engine.stats(now)))
}

/// Session analytics as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`.
/// - Returns a newly allocated string that must be freed with `attn_free_string`.
/// - Returns NULL on error; call `attn_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_analytics(
    engine: *const AttnEngineHandle,
    unix_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    json_result(timestamp(unix_ms).map(|now| handle.engine.analytics(now)))
}

/// Open a calibration window at `unix_ms`.
///
/// Fails until the engine has processed at least one frame.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `attn_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_start_calibration(
    engine: *mut AttnEngineHandle,
    unix_ms: i64,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    match timestamp(unix_ms).and_then(|now| handle.engine.start_calibration(now)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Flush the session and return its summary as JSON (`null` if no session started).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`.
/// - Returns a newly allocated string that must be freed with `attn_free_string`.
/// - Returns NULL on error; call `attn_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_stop(
    engine: *mut AttnEngineHandle,
    unix_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    json_result(timestamp(unix_ms).map(|now| handle.engine.stop(now)))
}

/// Discard the session and all smoothing state.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `attn_engine_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn attn_engine_reset(engine: *mut AttnEngineHandle) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*engine).engine.reset();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by an `attn_` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an `attn_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn attn_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `attn_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn attn_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn attn_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
