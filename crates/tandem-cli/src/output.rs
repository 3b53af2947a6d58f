// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.
//! Colors are automatically disabled when output is piped.

use colored::{ColoredString, Colorize};

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

// === Error Output ===

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

// === Scenario Output ===

pub fn banner_ok(scenario: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} OK", scenario).green().bold(),
        "===".dimmed()
    )
}

pub fn banner_fail(scenario: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} FAILED", scenario).red().bold(),
        "===".dimmed()
    )
}

pub fn status_pass() -> ColoredString {
    "✓".green()
}

pub fn status_fail() -> ColoredString {
    "✗".red()
}

pub fn value(v: impl std::fmt::Display) -> ColoredString {
    v.to_string().cyan()
}

// === Help Output ===

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}
