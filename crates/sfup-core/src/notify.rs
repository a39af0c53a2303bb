//! Out-of-band delivery of upload instructions.
//!
//! The reserve endpoint only acknowledges; the ticket id reaches the
//! requester through a [`Notifier`]. A failed notification rolls the
//! reservation back.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::NotifyError;
use crate::ticket::TicketId;

/// Subject line of reservation mails
pub const RESERVATION_SUBJECT: &str = "Your SFUP reservation";

/// A reservation to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Allow-listed address that asked for the ticket
    pub recipient: String,
    /// The reserved ticket
    pub ticket_id: TicketId,
    /// Public base URL of the server, without a trailing slash
    pub base_url: String,
}

impl Notification {
    /// One-liner that fetches the helper script and uploads a file with it.
    #[must_use]
    pub fn script_command(&self) -> String {
        format!(
            "curl -s {}/bash/{}|sh -s -- <filename>",
            self.base_url, self.ticket_id
        )
    }

    /// Plain multipart upload one-liner.
    #[must_use]
    pub fn upload_command(&self) -> String {
        format!(
            "curl -qF \"file=@<filename>\" {}/ul/{}",
            self.base_url, self.ticket_id
        )
    }

    /// HTML body of the reservation mail.
    #[must_use]
    pub fn render_html(&self) -> String {
        format!(
            "<p>Hi, and thanks for using SFUP!</p>\n\
             <p>&nbsp;&nbsp;Use this command to upload your file:</p>\n\
             <pre>\n{}\n</pre>\n\
             <p>or, simpler (and windows-compatible):</p>\n\
             <pre>\n{}\n</pre>\n\
             <p>Have fun!</p>\n\
             <p>-- sfup</p>",
            escape_html(&self.script_command()),
            escape_html(&self.upload_command()),
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Sink for reservation notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the instructions for a freshly reserved ticket.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient,
            ticket = %notification.ticket_id,
            "Reservation ready, upload with: {}",
            notification.upload_command()
        );
        Ok(())
    }
}

/// Pipes an HTML mail to a sendmail-compatible command.
///
/// The command reads a full RFC 5322 message on stdin; with the default
/// `-t -i` arguments it takes the recipient from the `To:` header.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    command: PathBuf,
    args: Vec<String>,
    from: String,
}

impl SendmailNotifier {
    /// Create a notifier that runs `command` with `-t -i`.
    pub fn new(command: impl Into<PathBuf>, from: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec!["-t".to_string(), "-i".to_string()],
            from: from.into(),
        }
    }

    /// Replace the command arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Render the complete message for a notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidRecipient`] if either address contains
    /// characters that would break the header block.
    pub fn render_message(&self, notification: &Notification) -> Result<String, NotifyError> {
        let header_safe = |s: &str| !s.is_empty() && !s.chars().any(char::is_control);
        if !header_safe(&notification.recipient) || !header_safe(&self.from) {
            return Err(NotifyError::InvalidRecipient);
        }

        Ok(format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=\"UTF-8\"\r\n\r\n{}\r\n",
            self.from,
            notification.recipient,
            RESERVATION_SUBJECT,
            notification.render_html().replace('\n', "\r\n"),
        ))
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.render_message(notification)?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                command = %self.command.display(),
                status = %output.status,
                "Mail command failed: {}",
                stderr.trim()
            );
            return Err(NotifyError::CommandFailed(output.status.to_string()));
        }

        tracing::debug!(
            ticket = %notification.ticket_id,
            "Reservation mail handed to {}",
            self.command.display()
        );
        Ok(())
    }
}

/// Keeps notifications in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier that records and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that rejects every notification without recording it.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    /// Notifications delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Rejected("recording notifier set to fail".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
