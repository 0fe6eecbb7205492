//! Centralized environment-variable parsing helpers.
//!
//! Every tuning knob read from the environment goes through these so the
//! truthy and numeric parsing rules live in one place. Each helper takes
//! the raw value (`None` when unset) so callers can read from the process
//! environment or from any other lookup.

/// Reads `var_name` from the process environment. Non-UTF-8 values count
/// as unset.
#[inline]
pub(crate) fn process_var(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok()
}

/// `true` when the value is truthy (`1`, `true`, `yes`, or `on`,
/// case-insensitive, trimmed).
#[inline]
pub(crate) fn truthy(raw: Option<&str>) -> bool {
    raw.is_some_and(is_truthy)
}

/// `Some` only when the value is a valid positive (> 0) integer.
#[inline]
pub(crate) fn positive_u64(raw: Option<&str>) -> Option<u64> {
    raw.and_then(parse_positive)
}

#[inline]
pub(crate) fn positive_u32(raw: Option<&str>) -> Option<u32> {
    positive_u64(raw).and_then(|value| u32::try_from(value).ok())
}

/// Negative values allowed.
#[inline]
pub(crate) fn signed_i32(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|raw| raw.trim().parse::<i32>().ok())
}

fn is_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_positive(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}
