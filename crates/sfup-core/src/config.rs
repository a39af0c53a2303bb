//! Engine configuration

use std::time::Duration;

/// Default upload limit (1 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Default lifetime of an idle ticket (7 days)
pub const DEFAULT_TICKET_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Transfer engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Addresses allowed to reserve tickets
    pub allowed_emails: Vec<String>,

    /// Largest accepted upload body, `None` for unlimited
    pub max_file_size: Option<u64>,

    /// Tickets untouched for longer than this are swept
    pub ticket_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allowed_emails: Vec::new(),
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
            ticket_ttl: DEFAULT_TICKET_TTL,
        }
    }
}

impl EngineConfig {
    /// Config allowing the given addresses, defaults otherwise.
    pub fn with_allowed<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_emails: emails.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether `email` may reserve a ticket.
    ///
    /// Comparison ignores surrounding whitespace and ASCII case.
    #[must_use]
    pub fn is_allowed(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty()
            && self
                .allowed_emails
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(email))
    }
}
