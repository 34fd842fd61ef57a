//! Terminal output helpers.

use colored::Colorize;

use crate::reporter::ReportEntry;

/// Stand-in for values the directory could not supply.
const ABSENT: &str = "-";

/// Print one report entry as labeled lines followed by a separator line.
pub fn print_entry(entry: &ReportEntry) {
    print!("{}", render_entry(entry));
}

/// Print an error message to stderr.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

fn render_entry(entry: &ReportEntry) -> String {
    format!(
        "{}: {}\n{}: {}\n{}: {}\n\n",
        "role_name".cyan(),
        entry.role_name.as_deref().unwrap_or(ABSENT),
        "display_name".cyan(),
        entry.display_name,
        "mail".cyan(),
        entry.mail.as_deref().unwrap_or(ABSENT),
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
