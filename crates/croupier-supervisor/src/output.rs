//! # Captured Output
//!
//! Lines read from a child's stdout/stderr are handed to an [`OutputSink`]
//! tagged with the service name.

use std::fmt;

use tracing::{info, warn};

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Receives captured lines. Called from the reader task; must not block.
pub trait OutputSink: Send + Sync {
    /// One line, without its trailing newline.
    fn line(&self, service_name: &str, stream: OutputStream, line: &str);
}

/// Re-emits captured lines as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, service_name: &str, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => info!(service = service_name, "[{service_name}] {line}"),
            OutputStream::Stderr => warn!(service = service_name, "[{service_name}] {line}"),
        }
    }
}
