// src/utils/log.rs

//! Phase-level progress lines for the workflows.
//!
//! Thin helpers over the `log` facade so that pipeline output reads the
//! same whichever logger the host installed.

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    ::log::info!("{border}");
    ::log::info!("  {title}");
    ::log::info!("{border}");
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    ::log::info!("{}", format_step(step_num, total, message));
}

/// Log a success message
pub fn success(message: &str) {
    ::log::info!("[OK] {message}");
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    ::log::info!("    {message}");
}

/// Log a warning
pub fn warn(message: &str) {
    ::log::warn!("{message}");
}

/// Log an error
pub fn error(message: &str) {
    ::log::error!("{message}");
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    ::log::info!("[SUMMARY] {title}");
    for (key, value) in items {
        ::log::info!("    {key}: {value}");
    }
}

fn format_step(step_num: usize, total: usize, message: &str) -> String {
    format!("[STEP {step_num}/{total}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_format() {
        assert_eq!(format_step(2, 5, "Login"), "[STEP 2/5] Login");
    }
}
