use std::fmt::Display;

use tracing::{error, info, warn};

use crate::message::MailMessage;

/// Operator-facing log stream. Every line is tagged with the processor name;
/// quiet mode suppresses all output.
#[derive(Debug, Clone)]
pub struct OperatorLog {
    name: String,
    quiet: bool,
}

impl OperatorLog {
    pub fn new(name: impl Into<String>, quiet: bool) -> Self {
        Self {
            name: name.into(),
            quiet,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn info(&self, message: impl Display) {
        if !self.quiet {
            info!(processor = %self.name, "{}: {}", self.name, message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        if !self.quiet {
            warn!(processor = %self.name, "{}: {}", self.name, message);
        }
    }

    pub fn error(&self, message: impl Display) {
        if !self.quiet {
            error!(processor = %self.name, "{}: {}", self.name, message);
        }
    }

    /// Logs `message` followed by the identifying headers of `email`.
    pub fn message(&self, message: impl Display, email: &MailMessage) {
        if !self.quiet {
            info!(processor = %self.name, "{}: {}", self.name, message);
            info!(processor = %self.name, "{}", context_line(email));
        }
    }

    pub fn message_error(&self, message: impl Display, email: Option<&MailMessage>) {
        if self.quiet {
            return;
        }
        error!(processor = %self.name, "{}: {}", self.name, message);
        if let Some(email) = email {
            error!(processor = %self.name, "{}", context_line(email));
        }
    }
}

fn context_line(email: &MailMessage) -> String {
    format!(
        "  From: {}, Subject: {} ({})",
        email.from.join(", "),
        email.subject.as_deref().unwrap_or(""),
        email.message_id.as_deref().unwrap_or("")
    )
}
