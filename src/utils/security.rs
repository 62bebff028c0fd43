//! Client-supplied filename handling.

const FALLBACK_NAME: &str = "unnamed";

// Reserved device names that Windows refuses as file stems
const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Reduce an uploaded filename to something safe to show and to use as a
/// path component.
///
/// Path separators become word breaks, runs of whitespace collapse to `_`,
/// everything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots
/// and underscores are trimmed, so no `..` or absolute path survives.
/// Returns `"unnamed"` when nothing usable is left.
pub fn secure_filename(name: &str) -> String {
    let separated = name.replace(['/', '\\'], " ");
    let joined = separated.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined.chars().filter(|c| is_allowed(*c)).collect();
    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem))
    {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}
