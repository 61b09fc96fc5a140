//! Terminal output: messages on stdout, status notices on stderr.

use serde::Serialize;

use dashlink_core::AppError;
use dashlink_realtime::{ApplicationMessage, ChannelObserver};

/// Print an application message as one JSON line.
///
/// Returns whether a line was written; unencodable messages are logged and
/// skipped.
pub fn print_message(message: &ApplicationMessage) -> bool {
    match render_line(message, &message.kind) {
        Some(line) => {
            println!("{}", line);
            true
        }
        None => false,
    }
}

fn render_line<T: Serialize + ?Sized>(value: &T, kind: &str) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Failed to encode message, skipping");
            None
        }
    }
}

/// Print a status notice
pub fn print_status(msg: &str) {
    eprintln!("● {}", msg);
}

/// Print a warning notice
pub fn print_warning(msg: &str) {
    eprintln!("⚠ {}", msg);
}

/// Observer that turns lifecycle events into status notices.
#[derive(Debug, Default)]
pub struct StatusPrinter;

impl ChannelObserver for StatusPrinter {
    fn on_open(&self) {
        print_status("connected");
    }

    fn on_error(&self, error: &AppError) {
        print_warning(&format!("connection error: {}", error));
    }

    fn on_reconnect_scheduled(&self, attempt: u32, max_attempts: u32) {
        print_status(&format!("reconnecting (attempt {}/{})", attempt, max_attempts));
    }

    fn on_exhausted(&self, attempts: u32) {
        print_warning(&format!("gave up after {} reconnect attempts", attempts));
    }
}
