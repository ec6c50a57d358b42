//! Status lines written to stderr
//!
//! stdout is reserved for command results (mount paths, image ids, JSON)
//! so scripts can capture them directly.

use console::style;

/// Display a success step
pub fn step_ok(message: &str) {
    eprintln!("  {} {}", style("[OK]").green(), message);
}

/// Display a success step with detail
pub fn step_ok_detail(message: &str, detail: &str) {
    eprintln!("  {} {} ({})", style("[OK]").green(), message, style(detail).dim());
}

/// Display a warning step with hint
pub fn step_warn_hint(message: &str, hint: &str) {
    eprintln!(
        "  {} {} - {}",
        style("[WARN]").yellow(),
        message,
        style(hint).dim()
    );
}
