//! Fuzz test for upload filename handling
//!
//! Whatever a client sends as a filename, an accepted name is a bare,
//! bounded basename.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sfup_core::engine::{MAX_FILENAME_LEN, validate_filename};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    if let Ok(name) = validate_filename(&raw) {
        assert!(!name.is_empty());
        assert!(name.len() <= MAX_FILENAME_LEN);
        assert!(!name.contains('/') && !name.contains('\\'));
        assert!(!name.chars().any(char::is_control));
        assert!(name != "." && name != "..");

        // Already-clean names are fixed points
        assert_eq!(validate_filename(&name).ok(), Some(name.clone()));
    }
});
