//! Output routing for CLI commands: plain text, JSON, or nothing (quiet).

use crate::error::Result;
use serde::Serialize;
use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text, colored when stdout is a terminal
    Plain,
    /// JSON output only
    Json,
    /// Minimal output (quiet mode)
    Quiet,
}

/// Central output coordinator that respects json/quiet modes.
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    mode: OutputMode,
    color: bool,
}

impl OutputContext {
    /// Create from CLI-style flags.
    #[must_use]
    pub fn from_flags(json: bool, quiet: bool, no_color: bool) -> Self {
        let mode = if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Plain
        };
        let color = mode == OutputMode::Plain
            && !no_color
            && std::env::var_os("NO_COLOR").is_none()
            && std::io::stdout().is_terminal();
        Self { mode, color }
    }

    #[must_use]
    pub const fn mode(&self) -> OutputMode {
        self.mode
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.mode == OutputMode::Quiet
    }

    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.mode == OutputMode::Plain
    }

    /// Print a line in plain mode.
    pub fn print(&self, content: &str) {
        if self.is_plain() {
            println!("{content}");
        }
    }

    /// Pretty JSON on stdout in JSON mode; nothing otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json_pretty<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.is_json() {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if self.is_plain() {
            println!("{} {message}", self.paint("32", "✓"));
        }
    }

    pub fn warning(&self, message: &str) {
        if self.is_plain() {
            eprintln!("{} {message}", self.paint("33", "Warning:"));
        }
    }

    /// Bold text when color is on.
    #[must_use]
    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    /// Dimmed text when color is on.
    #[must_use]
    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_wins_over_quiet() {
        let ctx = OutputContext::from_flags(true, true, false);
        assert_eq!(ctx.mode(), OutputMode::Json);
        assert!(!ctx.is_plain());
    }

    #[test]
    fn no_color_leaves_text_untouched() {
        let ctx = OutputContext::from_flags(false, false, true);
        assert!(ctx.is_plain());
        assert_eq!(ctx.bold("x"), "x");
        assert_eq!(ctx.dim("y"), "y");
    }

    #[test]
    fn quiet_mode() {
        let ctx = OutputContext::from_flags(false, true, false);
        assert!(ctx.is_quiet());
    }
}
