//! Probe banner detection
//!
//! Both devices answer a probe with a banner naming what they are:
//!
//! ```text
//! ---- MOUSE COM PORT ----
//! ---- RECEIVER COM PORT ----
//! ```
//!
//! The banner may be surrounded by any other output (menus, boot noise), and
//! the dash runs may have any length of at least one.

use crate::Role;

const MARKER: &str = " COM PORT ";

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Find the subject word of the first well-formed banner in `text`
pub fn banner_subject(text: &str) -> Option<&str> {
    for (idx, _) in text.match_indices(MARKER) {
        if !text[idx + MARKER.len()..].starts_with('-') {
            continue;
        }

        let head = &text[..idx];
        let start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !is_word(*c))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);

        let subject = &head[start..];
        if subject.is_empty() {
            continue;
        }

        let lead = &head[..start];
        if lead.strip_suffix(' ').is_some_and(|l| l.ends_with('-')) {
            return Some(subject);
        }
    }
    None
}

/// Determine which role answered a probe
///
/// Unknown subjects and missing banners both yield [`Role::None`]; neither is
/// an error.
pub fn detect_role(response: &[u8]) -> Role {
    let text = String::from_utf8_lossy(response);
    banner_subject(&text)
        .map(Role::from_subject)
        .unwrap_or(Role::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouse_banner() {
        assert_eq!(detect_role(b"---- MOUSE COM PORT ----\r\n"), Role::Mouse);
    }

    #[test]
    fn test_receiver_banner() {
        assert_eq!(
            detect_role(b"---- RECEIVER COM PORT ----\r\n"),
            Role::Receiver
        );
    }

    #[test]
    fn test_banner_with_surrounding_output() {
        let response = b"\r\nboot ok\r\n- MOUSE COM PORT -------\r\n> ";
        assert_eq!(detect_role(response), Role::Mouse);
    }

    #[test]
    fn test_unknown_subject() {
        assert_eq!(banner_subject("---- DONGLE COM PORT ----"), Some("DONGLE"));
        assert_eq!(detect_role(b"---- DONGLE COM PORT ----"), Role::None);
    }

    #[test]
    fn test_missing_banner() {
        assert_eq!(detect_role(b""), Role::None);
        assert_eq!(detect_role(b"Left clicks: 3\r\n"), Role::None);
        assert_eq!(detect_role(b"MOUSE COM PORT"), Role::None);
    }

    #[test]
    fn test_dashes_required_on_both_sides() {
        assert_eq!(banner_subject("MOUSE COM PORT ----"), None);
        assert_eq!(banner_subject("---- MOUSE COM PORT "), None);
        assert_eq!(banner_subject("----MOUSE COM PORT ----"), None);
    }

    #[test]
    fn test_first_banner_wins() {
        let text = "---- RECEIVER COM PORT ----\n---- MOUSE COM PORT ----";
        assert_eq!(banner_subject(text), Some("RECEIVER"));
    }

    #[test]
    fn test_malformed_banner_before_valid_one() {
        let text = "x COM PORT -\n---- MOUSE COM PORT ----";
        assert_eq!(banner_subject(text), Some("MOUSE"));
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut response = vec![0xFF, 0xFE];
        response.extend_from_slice(b"---- MOUSE COM PORT ----");
        assert_eq!(detect_role(&response), Role::Mouse);
    }
}
