//! Utility functions for Leasekeeper

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Returns true when `reference` is usable as a lease key
///
/// # Examples
///
/// ```
/// use leasekeeper_common::utils::is_valid_reference;
///
/// assert!(is_valid_reference("A1B2C3"));
/// assert!(!is_valid_reference(""));
/// assert!(!is_valid_reference("  "));
/// ```
pub fn is_valid_reference(reference: &str) -> bool {
    !reference.trim().is_empty()
}
