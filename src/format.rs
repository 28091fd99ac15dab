//! Text Formatting
//!
//! Section-sign format codes used by client-visible text, plus helpers to
//! strip them from untrusted input (usernames, chat lines).

/// The format escape character (section sign).
pub const ESCAPE: char = '\u{00A7}';

/// Black color code.
pub const BLACK: &str = "\u{00A7}0";
/// Dark blue color code.
pub const DARK_BLUE: &str = "\u{00A7}1";
/// Dark green color code.
pub const DARK_GREEN: &str = "\u{00A7}2";
/// Dark aqua color code.
pub const DARK_AQUA: &str = "\u{00A7}3";
/// Dark red color code.
pub const DARK_RED: &str = "\u{00A7}4";
/// Dark purple color code.
pub const DARK_PURPLE: &str = "\u{00A7}5";
/// Gold color code.
pub const GOLD: &str = "\u{00A7}6";
/// Gray color code.
pub const GRAY: &str = "\u{00A7}7";
/// Dark gray color code.
pub const DARK_GRAY: &str = "\u{00A7}8";
/// Blue color code.
pub const BLUE: &str = "\u{00A7}9";
/// Green color code.
pub const GREEN: &str = "\u{00A7}a";
/// Aqua color code.
pub const AQUA: &str = "\u{00A7}b";
/// Red color code.
pub const RED: &str = "\u{00A7}c";
/// Light purple color code.
pub const LIGHT_PURPLE: &str = "\u{00A7}d";
/// Yellow color code.
pub const YELLOW: &str = "\u{00A7}e";
/// White color code.
pub const WHITE: &str = "\u{00A7}f";

/// Obfuscated style code.
pub const OBFUSCATED: &str = "\u{00A7}k";
/// Bold style code.
pub const BOLD: &str = "\u{00A7}l";
/// Strikethrough style code.
pub const STRIKETHROUGH: &str = "\u{00A7}m";
/// Underline style code.
pub const UNDERLINE: &str = "\u{00A7}n";
/// Italic style code.
pub const ITALIC: &str = "\u{00A7}o";
/// Reset style code.
pub const RESET: &str = "\u{00A7}r";

/// Strip format codes (the escape plus its selector) and control characters
/// from a string. Applied to client-supplied usernames and chat text before
/// they reach anything trusted. Newlines survive; chat splits on them.
pub fn clean(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == ESCAPE {
            // Swallow the selector character too.
            chars.next();
        } else if c == '\n' || !c.is_control() {
            out.push(c);
        }
    }

    out
}

/// Reserved names a client may never log in under.
const RESERVED_NAMES: [&str; 2] = ["rcon", "console"];

/// Check whether a username is acceptable for login.
///
/// A name is valid when it is not reserved, is 1..=16 characters long, and
/// contains only letters, digits, underscores, and spaces.
pub fn is_valid_username(name: &str) -> bool {
    let lower = name.to_lowercase();
    if RESERVED_NAMES.contains(&lower.as_str()) {
        return false;
    }

    let len = name.chars().count();
    if !(1..=16).contains(&len) {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_format_codes() {
        let colored = format!("{}Steve{}!", YELLOW, RESET);
        assert_eq!(clean(&colored), "Steve!");
    }

    #[test]
    fn test_clean_strips_control_chars_but_keeps_newlines() {
        assert_eq!(clean("Ste\u{0001}ve"), "Steve");
        assert_eq!(clean("one\ntwo"), "one\ntwo");
    }

    #[test]
    fn test_clean_plain_text_untouched() {
        assert_eq!(clean("Hello World_123"), "Hello World_123");
    }

    #[test]
    fn test_clean_trailing_escape() {
        // Escape with nothing after it just disappears.
        let s = format!("Steve{}", ESCAPE);
        assert_eq!(clean(&s), "Steve");
    }

    #[test]
    fn test_valid_usernames() {
        assert!(is_valid_username("Steve"));
        assert!(is_valid_username("a"));
        assert!(is_valid_username("Steve_The Brave1"));
        assert!(is_valid_username("1234567890123456"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        assert!(!is_valid_username("rcon"));
        assert!(!is_valid_username("RCON"));
        assert!(!is_valid_username("Console"));
    }

    #[test]
    fn test_length_bounds() {
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("12345678901234567"));
    }

    #[test]
    fn test_charset_violations_rejected() {
        assert!(!is_valid_username("Steve!"));
        assert!(!is_valid_username("St\u{00A7}eve"));
        assert!(!is_valid_username("Stève"));
    }
}
