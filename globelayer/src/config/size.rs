//! Human-readable byte sizes.

use super::ConfigError;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Parses sizes such as `512MB`, `2 GB`, `64k` or `1048576`.
///
/// Units are binary (1 KB = 1024 bytes) and case-insensitive; fractional
/// values are allowed with a unit.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let trimmed = input.trim();
    let invalid = || ConfigError::InvalidSize(input.to_string());

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number.parse().map_err(|_| invalid())?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KB,
        "M" | "MB" | "MIB" => MB,
        "G" | "GB" | "GIB" => GB,
        "T" | "TB" | "TIB" => TB,
        _ => return Err(invalid()),
    };

    if !number.is_finite() || number < 0.0 {
        return Err(invalid());
    }
    Ok((number * multiplier as f64).round() as u64)
}

/// Formats a byte count with the largest unit that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    for (unit, name) in [(TB, "TB"), (GB, "GB"), (MB, "MB"), (KB, "KB")] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, name);
        }
    }
    if bytes >= MB {
        return format!("{:.1}MB", bytes as f64 / MB as f64);
    }
    format!("{}B", bytes)
}
