//! Fuzz test for ticket request parameters
//!
//! Ticket ids and download keys arrive as URL text; parsing must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sfup_core::TicketId;
use sfup_crypto::{MAX_TICKET_ID, TicketKey};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(id) = s.parse::<TicketId>() {
            assert!(id.get() < MAX_TICKET_ID);
            assert_eq!(id.to_string().parse::<TicketId>().ok(), Some(id));
        }

        if let Ok(key) = TicketKey::from_base64url(s) {
            // Canonical encodings survive a second pass
            let encoded = key.to_base64url();
            assert_eq!(TicketKey::from_base64url(&encoded).ok(), Some(key));
        }
    }
});
