//! FFI bindings for Habit Flux
//!
//! This module provides C-compatible functions for calling Habit Flux from other
//! languages. All functions take JSON documents as C strings (null-terminated)
//! and return allocated memory that must be freed by the caller using
//! `habit_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::{policy_from_str, rubric_from_str, ConfigFormat};
use crate::error::ScoringError;
use crate::history::DEFAULT_HISTORY_WINDOW;
use crate::pipeline::{program_summary_json, recommend_json, score_day_json, HabitProcessor};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Read a required string argument, recording an error when it is unusable
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {name} string pointer"));
    }
    value
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn result_to_cstr(result: Result<String, ScoringError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score one day and return a daily score report.
///
/// # Safety
/// - `rubric_json` and `day_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `habit_free_string`.
/// - Returns NULL on error; call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_score_daily_json(
    rubric_json: *const c_char,
    day_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(rubric) = required_arg(rubric_json, "rubric") else {
        return ptr::null_mut();
    };
    let Some(day) = required_arg(day_json, "day") else {
        return ptr::null_mut();
    };

    result_to_cstr(score_day_json(&rubric, &day))
}

/// Summarize a JSON array of day records and return a program summary report.
///
/// # Safety
/// - `rubric_json` and `days_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `habit_free_string`.
/// - Returns NULL on error; call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_program_summary_json(
    rubric_json: *const c_char,
    days_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(rubric) = required_arg(rubric_json, "rubric") else {
        return ptr::null_mut();
    };
    let Some(days) = required_arg(days_json, "days") else {
        return ptr::null_mut();
    };

    result_to_cstr(program_summary_json(&rubric, &days))
}

/// Recommend next targets from an adaptation history.
///
/// # Safety
/// - `rubric_json`, `policy_json` and `history_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `habit_free_string`.
/// - Returns NULL on error; call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_recommend_json(
    rubric_json: *const c_char,
    policy_json: *const c_char,
    history_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(rubric) = required_arg(rubric_json, "rubric") else {
        return ptr::null_mut();
    };
    let Some(policy) = required_arg(policy_json, "policy") else {
        return ptr::null_mut();
    };
    let Some(history) = required_arg(history_json, "history") else {
        return ptr::null_mut();
    };

    result_to_cstr(recommend_json(&rubric, &policy, &history))
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a HabitProcessor
pub struct HabitProcessorHandle {
    processor: HabitProcessor,
}

/// Create a new HabitProcessor from rubric and policy JSON.
///
/// # Safety
/// - `rubric_json` and `policy_json` must be valid null-terminated C strings.
/// - Returns a pointer to a newly allocated HabitProcessor.
/// - Must be freed with `habit_processor_free`.
/// - Returns NULL on error; call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_processor_new(
    rubric_json: *const c_char,
    policy_json: *const c_char,
    history_window_days: i32,
) -> *mut HabitProcessorHandle {
    clear_last_error();

    let Some(rubric_str) = required_arg(rubric_json, "rubric") else {
        return ptr::null_mut();
    };
    let Some(policy_str) = required_arg(policy_json, "policy") else {
        return ptr::null_mut();
    };

    let window_days = if history_window_days <= 0 {
        DEFAULT_HISTORY_WINDOW
    } else {
        history_window_days as usize
    };

    let processor = rubric_from_str(&rubric_str, ConfigFormat::Json).and_then(|rubric| {
        let policy = policy_from_str(&policy_str, ConfigFormat::Json, &rubric)?;
        HabitProcessor::with_history_window(rubric, policy, window_days)
    });

    match processor {
        Ok(processor) => Box::into_raw(Box::new(HabitProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a HabitProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `habit_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn habit_processor_free(processor: *mut HabitProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Ingest one day record with a stateful processor and return a day result report.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `habit_processor_new`.
/// - `day_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `habit_free_string`.
/// - Returns NULL on error; call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_processor_ingest_json(
    processor: *mut HabitProcessorHandle,
    day_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let Some(day) = required_arg(day_json, "day") else {
        return ptr::null_mut();
    };

    result_to_cstr(handle.processor.ingest_day_json(&day))
}

/// Save processor history to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `habit_processor_new`.
/// - Returns a newly allocated string that must be freed with `habit_free_string`.
/// - Returns NULL on error; call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_processor_save_history(
    processor: *mut HabitProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;
    result_to_cstr(handle.processor.save_history())
}

/// Load processor history from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `habit_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `habit_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn habit_processor_load_history(
    processor: *mut HabitProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let Some(json_str) = required_arg(json, "history") else {
        return -1;
    };

    match handle.processor.load_history(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Habit Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Habit Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn habit_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Habit Flux call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn habit_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn habit_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rubric_json() -> CString {
        CString::new(
            r#"{
                "activities": {
                    "exercise": {"labels": {"none": 0, "light": 0.3, "moderate": 0.6, "intense": 1.0}},
                    "diet": {"labels": {"junk": 0, "moderate": 0.5, "clean": 1.0}}
                },
                "weights_activities": {"exercise": 1, "diet": 2}
            }"#,
        )
        .unwrap()
    }

    fn sample_day_json() -> CString {
        CString::new(r#"{"entries": {"exercise": "moderate", "diet": "clean"}}"#).unwrap()
    }

    #[test]
    fn test_ffi_score_daily() {
        let rubric = sample_rubric_json();
        let day = sample_day_json();

        unsafe {
            let result = habit_score_daily_json(rubric.as_ptr(), day.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let payload: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(payload["body"]["final_daily_score"], 91.67);

            habit_free_string(result);
        }
    }

    #[test]
    fn test_ffi_recommend() {
        let rubric = sample_rubric_json();
        let policy = CString::new("{}").unwrap();
        let history = CString::new(r#"{"entries": []}"#).unwrap();

        unsafe {
            let result = habit_recommend_json(rubric.as_ptr(), policy.as_ptr(), history.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("\"keep\""));

            habit_free_string(result);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        let rubric = sample_rubric_json();
        let policy = CString::new("{}").unwrap();
        let day = sample_day_json();

        unsafe {
            let processor = habit_processor_new(rubric.as_ptr(), policy.as_ptr(), 7);
            assert!(!processor.is_null());

            let result = habit_processor_ingest_json(processor, day.as_ptr());
            assert!(!result.is_null());
            habit_free_string(result);

            let history = habit_processor_save_history(processor);
            assert!(!history.is_null());

            let processor2 = habit_processor_new(rubric.as_ptr(), policy.as_ptr(), 7);
            let load_result = habit_processor_load_history(processor2, history);
            assert_eq!(load_result, 0);

            habit_free_string(history);
            habit_processor_free(processor);
            habit_processor_free(processor2);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let invalid = CString::new("not json").unwrap();
        let day = sample_day_json();

        unsafe {
            let result = habit_score_daily_json(invalid.as_ptr(), day.as_ptr());
            assert!(result.is_null());

            let error = habit_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.starts_with("Invalid JSON"));

            let result = habit_score_daily_json(ptr::null(), day.as_ptr());
            assert!(result.is_null());
            let error_str = CStr::from_ptr(habit_last_error()).to_str().unwrap();
            assert_eq!(error_str, "Invalid rubric string pointer");
        }
    }

    #[test]
    fn test_ffi_processor_rejects_bad_config() {
        let rubric = CString::new(r#"{"activities": {"sleep": {"labels": {}}}}"#).unwrap();
        let policy = CString::new("{}").unwrap();

        unsafe {
            let processor = habit_processor_new(rubric.as_ptr(), policy.as_ptr(), 0);
            assert!(processor.is_null());
            assert!(!habit_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = habit_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
