//! Size-string parsing shared by `RollingFileSink` and `Config`.
//!
//! Accepts a trailing unit of `K`, `M`, or `G` (case-insensitive, base
//! 1024); no unit means bytes.

use crate::error::EmberlogError;

pub fn parse_size(input: &str) -> Result<u64, EmberlogError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(EmberlogError::InvalidSizeLimit(input.to_string()));
    }

    let split_at = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    if split_at == 0 {
        return Err(EmberlogError::InvalidSizeLimit(input.to_string()));
    }

    let (num_str, unit) = s.split_at(split_at);
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        _ => return Err(EmberlogError::InvalidSizeLimit(input.to_string())),
    };

    num_str
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| EmberlogError::InvalidSizeLimit(input.to_string()))
}
