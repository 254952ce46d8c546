//! FFI bindings for Synheart Zone
//!
//! This module provides C-compatible functions for calling Zone from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `zone_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::pipeline::{default_table_json, parse_table, summarize_to_json};
use crate::zones::{classify, estimate_max_heart_rate};

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

/// Read an optional table argument; NULL selects the default table
unsafe fn optional_table(table_json: *const c_char) -> Result<Option<String>, &'static str> {
    if table_json.is_null() {
        return Ok(None);
    }
    cstr_to_string(table_json)
        .map(Some)
        .ok_or("Invalid table string pointer")
}

// ============================================================================
// Classification
// ============================================================================

/// Classify a heart-rate reading.
///
/// # Safety
/// - `table_json` must be a valid null-terminated C string, or NULL for the
///   default table.
/// - Returns the zone (0-5), or -1 on error; call `zone_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn zone_classify(bpm: f64, table_json: *const c_char) -> i32 {
    clear_last_error();

    let table_str = match optional_table(table_json) {
        Ok(s) => s,
        Err(msg) => {
            set_last_error(msg);
            return -1;
        }
    };

    match parse_table(table_str.as_deref()) {
        Ok(table) => i32::from(classify(bpm, &table)),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Summarize a finished workout.
///
/// `samples_json` is a JSON array (or NDJSON) of `{timestamp, bpm}` objects.
///
/// # Safety
/// - `samples_json` must be a valid null-terminated C string.
/// - `table_json` must be a valid null-terminated C string, or NULL for the
///   default table.
/// - Returns a newly allocated string that must be freed with `zone_free_string`.
/// - Returns NULL on error; call `zone_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn zone_summarize(
    samples_json: *const c_char,
    table_json: *const c_char,
    target_zone: u8,
) -> *mut c_char {
    clear_last_error();

    let samples_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid samples string pointer");
            return ptr::null_mut();
        }
    };

    let table_str = match optional_table(table_json) {
        Ok(s) => s,
        Err(msg) => {
            set_last_error(msg);
            return ptr::null_mut();
        }
    };

    match summarize_to_json(&samples_str, table_str.as_deref(), target_zone) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Zone tables
// ============================================================================

/// Standard zone table for a maximum heart rate, as JSON.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `zone_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn zone_default_table(max_heart_rate: u32) -> *mut c_char {
    clear_last_error();

    let Ok(max_hr) = u16::try_from(max_heart_rate) else {
        set_last_error("Maximum heart rate out of range");
        return ptr::null_mut();
    };

    match default_table_json(max_hr) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Estimated maximum heart rate for an age in years (220 - age).
#[no_mangle]
pub extern "C" fn zone_estimate_max_heart_rate(age_years: u32) -> u32 {
    let age = u16::try_from(age_years).unwrap_or(u16::MAX);
    u32::from(estimate_max_heart_rate(age))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Zone functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Zone function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn zone_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Zone function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn zone_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Zone library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn zone_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn reference_table() -> CString {
        CString::new(
            r#"{
                "zones": [
                    {"zone": 1, "min": 0, "max": 131},
                    {"zone": 2, "min": 132, "max": 144},
                    {"zone": 3, "min": 145, "max": 156},
                    {"zone": 4, "min": 157, "max": 167},
                    {"zone": 5, "min": 168, "max": 220}
                ],
                "max_heart_rate": 220
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_classify() {
        let table = reference_table();
        unsafe {
            assert_eq!(zone_classify(131.0, table.as_ptr()), 1);
            assert_eq!(zone_classify(132.0, table.as_ptr()), 2);
            assert_eq!(zone_classify(221.0, table.as_ptr()), 0);
            assert!(zone_last_error().is_null());

            let default = zone_classify(100.0, ptr::null());
            assert!((0..=5).contains(&default));
        }
    }

    #[test]
    fn test_ffi_summarize() {
        let samples = CString::new(
            r#"[{"timestamp":"2024-06-03T07:00:00Z","bpm":150.0},
                {"timestamp":"2024-06-03T07:00:01Z","bpm":120.0}]"#,
        )
        .unwrap();
        let table = reference_table();
        unsafe {
            let result = zone_summarize(samples.as_ptr(), table.as_ptr(), 3);
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let value: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(value["summary"]["target_zone_percentage"], 50.0);

            zone_free_string(result);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let invalid = CString::new("not json").unwrap();
        unsafe {
            assert_eq!(zone_classify(140.0, invalid.as_ptr()), -1);

            let result = zone_summarize(invalid.as_ptr(), ptr::null(), 3);
            assert!(result.is_null());

            let error = zone_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            assert!(zone_default_table(0).is_null());
            assert!(zone_default_table(70_000).is_null());
        }
    }

    #[test]
    fn test_ffi_default_table_and_version() {
        assert_eq!(zone_estimate_max_heart_rate(30), 190);
        unsafe {
            let table = zone_default_table(190);
            assert!(!table.is_null());
            let table_str = CStr::from_ptr(table).to_str().unwrap();
            assert!(table_str.contains("\"max_heart_rate\":190"));
            zone_free_string(table);

            let version = zone_version();
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
