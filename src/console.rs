//! Terminal output for the CLI.
//!
//! Labels and badges are colored only when stdout is a TTY and `NO_COLOR`
//! is unset.

use crate::jobs::{JobStatus, Progress};
use crate::language::Language;
use crate::quota::QuotaSnapshot;
use crate::utils::format_duration;
use std::io::{self, IsTerminal, Write};

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Color used for a job status badge.
fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Pending => Style::Gray,
        JobStatus::Processing => Style::Yellow,
        JobStatus::Done => Style::Green,
        JobStatus::Failed => Style::Red,
    }
}

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();
        Self { colors_enabled }
    }

    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", self.label("INFO", Style::Blue), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.label("OK", Style::Green), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    /// Errors go to stderr.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.label("ERROR", Style::Red), message);
    }

    pub fn step(&self, message: &str) {
        println!("{} {}", self.label("STEP", Style::Cyan), message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Clears the current line (for progress updates).
    pub fn clear_line(&self) {
        if self.colors_enabled {
            print!("\r\x1b[2K");
            let _ = io::stdout().flush();
        }
    }

    /// Prints a progress update on the same line when the terminal allows it.
    pub fn progress_update(&self, message: &str) {
        if self.colors_enabled {
            self.clear_line();
            print!("{} {}", self.label("..", Style::Cyan), message);
            let _ = io::stdout().flush();
        } else {
            println!("{} {}", self.label("..", Style::Cyan), message);
        }
    }

    /// Formats a status as a fixed-width colored badge, e.g. `[DONE      ]`.
    pub fn status_badge(&self, status: JobStatus) -> String {
        let padded = format!("{:<10}", status.as_str());
        format!("[{}]", self.style(&padded, &[status_style(status), Style::Bold]))
    }

    /// Formats the `completed/total` counter.
    pub fn counter(&self, completed: usize, total: usize) -> String {
        let style = if completed == total { Style::Green } else { Style::Cyan };
        self.style(&format!("{}/{}", completed, total), &[style, Style::Bold])
    }

    /// One-line summary of a progress snapshot.
    pub fn progress_line(&self, progress: &Progress) -> String {
        let mut line = format!("{} translated", self.counter(progress.completed, progress.total));
        let failed = progress.failed();
        if !failed.is_empty() {
            let codes: Vec<&str> = failed.iter().map(|lang| lang.code()).collect();
            line.push_str(&format!(
                ", {}",
                self.style(&format!("failed: {}", codes.join(" ")), &[Style::Red])
            ));
        }
        if progress.degraded {
            line.push_str(&format!(", {}", self.muted("status service unreachable")));
        }
        line
    }

    /// Prints one line per language with its status badge.
    pub fn job_table(&self, progress: &Progress) {
        for (language, status) in &progress.statuses {
            println!("  {} {}", self.language(*language), self.status_badge(*status));
        }
        println!("  {}", self.progress_line(progress));
    }

    /// Formats a language code for display.
    pub fn language(&self, language: Language) -> String {
        self.style(language.code(), &[Style::Bold])
    }

    /// Formats a quota snapshot, e.g. `3 left (7 used), resets in 5h 12m`.
    pub fn quota(&self, snapshot: &QuotaSnapshot) -> String {
        let remaining = snapshot.state.remaining;
        let style = if remaining == 0 { Style::Red } else { Style::Green };
        format!(
            "{} left ({} used), resets in {}",
            self.style(&remaining.to_string(), &[style, Style::Bold]),
            snapshot.state.used,
            format_duration(snapshot.reset_in())
        )
    }
}
