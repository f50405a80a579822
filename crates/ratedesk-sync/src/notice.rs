//! User-facing notices produced by save and publish operations.

use std::fmt;

use crate::http::BackendError;

/// At most this many server error lines are shown.
pub const MAX_ERROR_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
    /// Server error lines, already capped.
    pub detail: Vec<String>,
}

impl Notice {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            detail: Vec::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Level::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    /// Turn a failed backend call into a notice.
    ///
    /// A structured `errors` list becomes the detail (first three lines plus
    /// an ellipsis line if more were reported); otherwise `fallback` is shown.
    pub fn from_backend_error(fallback: &str, err: &BackendError) -> Self {
        let errors = err.server_errors();
        let message = err.server_message().unwrap_or(fallback).to_string();
        Self {
            level: Level::Error,
            message,
            detail: cap_lines(errors),
        }
    }

    /// Errors with a detail list are shown in a modal rather than a toast.
    pub fn is_modal(&self) -> bool {
        self.level == Level::Error && !self.detail.is_empty()
    }
}

fn cap_lines(mut lines: Vec<String>) -> Vec<String> {
    if lines.len() > MAX_ERROR_LINES {
        let more = lines.len() - MAX_ERROR_LINES;
        lines.truncate(MAX_ERROR_LINES);
        lines.push(format!("... and {more} more"));
    }
    lines
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            Level::Info => "info",
            Level::Success => "ok",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)?;
        for line in &self.detail {
            write!(f, "\n  - {line}")?;
        }
        Ok(())
    }
}
