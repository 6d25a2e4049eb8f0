//! Cleaning of error text before it is stored.
//!
//! Prober and transport errors can carry control characters and arbitrarily
//! long chains of wrapped messages. Both are stripped here so measurement rows
//! stay readable and bounded.

use crate::config::MAX_ERROR_MESSAGE_LENGTH;

/// Removes control characters other than tab, newline and carriage return.
pub fn sanitize_error_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Sanitizes `message` and cuts it to at most [`MAX_ERROR_MESSAGE_LENGTH`] bytes.
///
/// The cut happens on a character boundary and is marked with a suffix that
/// records the original length.
pub fn sanitize_and_truncate_error_message(message: &str) -> String {
    let sanitized = sanitize_error_message(message);
    if sanitized.len() <= MAX_ERROR_MESSAGE_LENGTH {
        return sanitized;
    }

    let suffix = format!("... (truncated, original length: {} bytes)", sanitized.len());
    let mut cut = MAX_ERROR_MESSAGE_LENGTH.saturating_sub(suffix.len());
    while !sanitized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &sanitized[..cut], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_removes_control_chars() {
        assert_eq!(
            sanitize_error_message("dial\x00 tcp\x1b: refused\n"),
            "dial tcp: refused\n"
        );
    }

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(
            sanitize_and_truncate_error_message("connection reset by peer"),
            "connection reset by peer"
        );
    }

    #[test]
    fn test_long_message_is_bounded() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_LENGTH * 2);
        let out = sanitize_and_truncate_error_message(&long);
        assert!(out.len() <= MAX_ERROR_MESSAGE_LENGTH);
        assert!(out.contains("truncated"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long = "ä".repeat(MAX_ERROR_MESSAGE_LENGTH);
        let out = sanitize_and_truncate_error_message(&long);
        assert!(out.len() <= MAX_ERROR_MESSAGE_LENGTH);
        assert!(out.starts_with('ä'));
    }
}
