//! Wire-format size limits for the IRCv3/TS6 message codec.
//!
//! These mirror `msgbuf.h`'s `TAGSLEN`/`TAGSPARTLEN`/`DATALEN` constants:
//! the codec truncates oversized input to these bounds rather than
//! rejecting the whole message.

/// Maximum bytes in the raw tag section (between `@` and the following
/// space), before parsing.
pub const TAGSLEN: usize = 8_191;

/// Maximum bytes in one tag *part* when unparsing: server tags and
/// client-only (`+`-prefixed) tags are capped separately.
pub const TAGSPARTLEN: usize = 4_094;

/// Maximum bytes in the message data (prefix, command, params), excluding
/// CRLF and any tag section.
pub const DATALEN: usize = 510;

/// Maximum number of tags retained on a parsed message.
pub const MAX_TAGS: usize = 30;

/// Maximum number of parameters retained on a parsed message (RFC 2812).
pub const MAX_PARAMS: usize = 15;

/// Truncate `s` to at most `max_bytes` bytes, backing off to the nearest
/// preceding `char` boundary so the result is always valid UTF-8.
#[must_use]
pub fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_bytes_noop_when_short() {
        assert_eq!(truncate_to_bytes("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_to_bytes_cuts_at_limit() {
        assert_eq!(truncate_to_bytes("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_to_bytes_respects_char_boundary() {
        // "é" is 2 bytes in UTF-8; a cap of 1 must back off to 0.
        let s = "é";
        assert_eq!(truncate_to_bytes(s, 1), "");
        assert_eq!(truncate_to_bytes(s, 2), "é");
    }
}
