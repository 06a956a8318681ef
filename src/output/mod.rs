//! Styled terminal output for the import tool
//!
//! Structured diagnostics go through `tracing`; these helpers render the
//! short human-facing progress and summary lines.

use owo_colors::OwoColorize;

type Rgb = (u8, u8, u8);

const GREEN: Rgb = (152, 225, 152);
const RED: Rgb = (255, 160, 160);
const YELLOW: Rgb = (255, 230, 160);
const BLUE: Rgb = (160, 200, 255);
const LAVENDER: Rgb = (181, 174, 254);
const GREY: Rgb = (160, 160, 160);

fn symbol(glyph: &str, (r, g, b): Rgb) -> String {
    glyph.truecolor(r, g, b).bold().to_string()
}

fn muted(text: &str) -> String {
    let (r, g, b) = GREY;
    text.truecolor(r, g, b).to_string()
}

pub fn success(message: &str) {
    println!("{} {}", symbol("✓", GREEN), message.bright_white());
}

/// Errors go to stderr so they survive redirected output
pub fn error(message: &str) {
    eprintln!("{} {}", symbol("✗", RED), message.bright_white());
}

pub fn warning(message: &str) {
    println!("{} {}", symbol("⚠", YELLOW), message.bright_white());
}

pub fn info(message: &str) {
    println!("{} {}", symbol("ℹ", BLUE), message.bright_white());
}

/// Section header followed by a rule
pub fn section(title: &str) {
    let (r, g, b) = LAVENDER;
    println!("\n{}", title.truecolor(r, g, b).bold());
    println!("{}", muted(&"─".repeat(50)));
}

pub fn key_value(key: &str, value: &str) {
    println!("  {} {}", muted(&format!("{}:", key)), value.bright_white());
}

pub fn dimmed(message: &str) {
    println!("{}", muted(message));
}

pub fn blank() {
    println!();
}

/// One line of a prerequisite check, e.g. the terraform binary
pub fn status_check(item: &str, available: bool) {
    let (glyph, color, status) = if available {
        ("✓", GREEN, "ready")
    } else {
        ("✗", RED, "not found")
    };
    println!("  {} {} {}", symbol(glyph, color), item.bright_white(), muted(status));
}
