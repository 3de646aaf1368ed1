//! Message parsing implementation.
//!
//! This module implements `FromStr` for `Message` using the nom-based parser.

use std::borrow::Cow;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};

use super::limits;
use super::nom_parser::ParsedMessage;
use super::tags::unescape_tag_value;
use super::types::{Message, Tag};

/// Intern common tag keys to avoid allocations.
///
/// IRCv3 messages frequently use the same tag keys. By returning
/// `Cow::Borrowed` for known keys, we avoid heap allocations.
#[inline]
fn intern_tag_key(key: &str) -> Cow<'static, str> {
    match key {
        // Core IRCv3 tags
        "msgid" => Cow::Borrowed("msgid"),
        "time" => Cow::Borrowed("time"),
        "batch" => Cow::Borrowed("batch"),
        "account" => Cow::Borrowed("account"),
        "label" => Cow::Borrowed("label"),

        // Capability tags
        "echo-message" => Cow::Borrowed("echo-message"),
        "message-tags" => Cow::Borrowed("message-tags"),

        // Typing indicators
        "+typing" => Cow::Borrowed("+typing"),
        "+draft/typing" => Cow::Borrowed("+draft/typing"),

        // Reply tags
        "+draft/reply" => Cow::Borrowed("+draft/reply"),
        "+draft/react" => Cow::Borrowed("+draft/react"),

        // Other common tags
        _ => Cow::Owned(key.to_owned()),
    }
}

/// Parse a raw tags string into a vector of `Tag` structs.
///
/// The input should be the tags portion without the leading `@`. An empty
/// key or a bare `+` (vendor prefix with nothing after it) is skipped. If
/// the same key appears more than once, only the last occurrence survives:
/// we walk the split tags last-to-first and keep the first copy of each key
/// we see, which is exactly the last one in wire order. The result is
/// capped at `MAX_TAGS`.
fn parse_tags_string(tags_str: &str) -> Vec<Tag> {
    let split: Vec<(&str, Option<String>)> = tags_str
        .split(';')
        .filter(|s| !s.is_empty())
        .filter_map(|tag| {
            let mut iter = tag.splitn(2, '=');
            let key = iter.next().unwrap_or("");
            if key.is_empty() || key == "+" {
                return None;
            }
            let value = iter.next().map(unescape_tag_value);
            Some((key, value))
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<(&str, Option<String>)> = Vec::with_capacity(split.len());
    for (key, value) in split.into_iter().rev() {
        if seen.insert(key) {
            deduped.push((key, value));
        }
    }
    deduped.reverse();

    deduped
        .into_iter()
        .take(limits::MAX_TAGS)
        .map(|(key, value)| Tag(intern_tag_key(key), value))
        .collect()
}

/// Truncate a raw wire line to the codec's size caps before parsing: the
/// tag section (if any) to `TAGSLEN` bytes, and the data that follows
/// (prefix/command/params) to `DATALEN` bytes.
fn truncate_wire_line(s: &str) -> Cow<'_, str> {
    if !s.starts_with('@') {
        return match limits::truncate_to_bytes(s, limits::DATALEN) {
            truncated if truncated.len() == s.len() => Cow::Borrowed(s),
            truncated => Cow::Borrowed(truncated),
        };
    }

    // Tags run from byte 1 up to (not including) the first space; if there
    // is none the line is malformed and is left for the parser to reject.
    let Some(rel_space) = s[1..].find(' ') else {
        return Cow::Borrowed(s);
    };
    let space_idx = 1 + rel_space;
    let tags_part = &s[1..space_idx];
    let data_part = &s[space_idx..];

    let truncated_tags = limits::truncate_to_bytes(tags_part, limits::TAGSLEN);
    let truncated_data = limits::truncate_to_bytes(data_part, limits::DATALEN);

    if truncated_tags.len() == tags_part.len() && truncated_data.len() == data_part.len() {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(1 + truncated_tags.len() + truncated_data.len());
    out.push('@');
    out.push_str(truncated_tags);
    out.push_str(truncated_data);
    Cow::Owned(out)
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        if s.is_empty() {
            return Err(ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause: MessageParseError::EmptyMessage,
            });
        }

        // Truncate oversized tag/data sections before handing off to the
        // nom parser, per the wire codec's size caps.
        let truncated = truncate_wire_line(s);

        // Use the nom parser
        let parsed = ParsedMessage::parse(&truncated).map_err(|parse_err| {
            // Convert detailed parse error to appropriate message parse error
            let cause = MessageParseError::ParseContext {
                position: parse_err.position,
                context: format!("Parse error: {:?}", parse_err.kind),
                source: None,
                source_message: None,
            };

            ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause,
            }
        })?;

        // Convert parsed tags to owned Tag structs
        let tags = parsed.tags.map(parse_tags_string);

        // Build the owned Message
        Message::with_tags(tags, parsed.prefix, parsed.command, parsed.params.to_vec()).map_err(
            |cause| ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    #[test]
    fn test_parse_simple_ping() {
        let msg: Message = "PING :server\r\n".parse().unwrap();
        assert!(matches!(msg.command, Command::PING(_, _)));
    }

    #[test]
    fn test_parse_server_pass_ts6() {
        let msg: Message = "PASS hunter2 TS 6 :001\r\n".parse().unwrap();
        match msg.command {
            Command::PassTs6 { password, sid } => {
                assert_eq!(password, "hunter2");
                assert_eq!(sid, "001");
            }
            other => panic!("expected PassTs6, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_privmsg() {
        let msg: Message = ":nick!user@host PRIVMSG #channel :Hello, world!\r\n"
            .parse()
            .unwrap();
        assert!(matches!(msg.command, Command::PRIVMSG(_, _)));
        assert!(msg.prefix.is_some());
    }

    #[test]
    fn test_parse_with_tags() {
        let msg: Message = "@time=2023-01-01T00:00:00Z;msgid=abc123 :nick PRIVMSG #ch :Hi\r\n"
            .parse()
            .unwrap();

        assert!(msg.tags.is_some());
        let tags = msg.tags.as_ref().unwrap();
        assert_eq!(tags.len(), 2);

        // Check tag values
        assert_eq!(msg.tag_value("time"), Some("2023-01-01T00:00:00Z"));
        assert_eq!(msg.tag_value("msgid"), Some("abc123"));
    }

    #[test]
    fn test_parse_escaped_tags() {
        // Test tag value escaping: \s = space, \: = semicolon
        let msg: Message = "@key=value\\swith\\sspace PING :test\r\n".parse().unwrap();
        assert_eq!(msg.tag_value("key"), Some("value with space"));
    }

    #[test]
    fn test_parse_empty_message() {
        let result: Result<Message, _> = "".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_numeric_response() {
        let msg: Message = ":server 001 nick :Welcome to IRC\r\n".parse().unwrap();
        assert!(matches!(msg.command, Command::Response(_, _)));
    }

    #[test]
    fn test_parse_encap() {
        let msg: Message = ":sid ENCAP * LOGIN AAAAB test\r\n".parse().unwrap();
        match msg.command {
            Command::ENCAP(target, subcommand, params) => {
                assert_eq!(target, "*");
                assert_eq!(subcommand, "LOGIN");
                assert_eq!(params, vec!["AAAAB".to_string(), "test".to_string()]);
            }
            other => panic!("expected ENCAP, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_user_command() {
        let msg: Message = "USER guest 0 * :Real Name\r\n".parse().unwrap();
        assert!(matches!(msg.command, Command::USER(_, _, _)));
    }

    #[test]
    fn test_parse_join() {
        let msg: Message = "JOIN #channel\r\n".parse().unwrap();
        assert!(matches!(msg.command, Command::JOIN(_, _, _)));
    }

    #[test]
    fn test_parse_mode() {
        let msg: Message = "MODE #channel +o nick\r\n".parse().unwrap();
        assert!(matches!(msg.command, Command::ChannelMODE(_, _)));
    }

    #[test]
    fn test_duplicate_tag_key_keeps_last_occurrence() {
        let msg: Message = "@time=one;time=two PING :test\r\n".parse().unwrap();
        assert_eq!(msg.tag_value("time"), Some("two"));
        assert_eq!(msg.tags.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_tag_key_and_bare_plus_are_skipped() {
        let msg: Message = "@=bogus;+;time=one PING :test\r\n".parse().unwrap();
        let tags = msg.tags.as_ref().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(msg.tag_value("time"), Some("one"));
    }

    #[test]
    fn test_tag_count_capped_at_max_tags() {
        let raw_tags: String = (0..40)
            .map(|i| format!("t{i}=v"))
            .collect::<Vec<_>>()
            .join(";");
        let line = format!("@{raw_tags} PING :test\r\n");
        let msg: Message = line.parse().unwrap();
        assert_eq!(msg.tags.as_ref().unwrap().len(), crate::message::limits::MAX_TAGS);
    }

    #[test]
    fn test_oversized_tag_section_is_truncated_before_parsing() {
        let huge_value = "x".repeat(limits::TAGSLEN + 500);
        let line = format!("@k={huge_value} PING :test\r\n");
        // Must not error; the tag section is truncated to TAGSLEN first.
        let msg: Message = line.parse().unwrap();
        assert!(matches!(msg.command, Command::PING(_, _)));
    }

    #[test]
    fn test_oversized_data_is_truncated_before_parsing() {
        let huge_trailing = "x".repeat(limits::DATALEN + 500);
        let line = format!("PRIVMSG #ch :{huge_trailing}\r\n");
        let msg: Message = line.parse().unwrap();
        assert!(matches!(msg.command, Command::PRIVMSG(_, _)));
    }

    #[test]
    fn test_intern_common_tags() {
        // Verify that common tags are interned (borrowed, not owned)
        let key = intern_tag_key("msgid");
        assert!(matches!(key, Cow::Borrowed(_)));

        let key = intern_tag_key("time");
        assert!(matches!(key, Cow::Borrowed(_)));

        let key = intern_tag_key("unknown-tag");
        assert!(matches!(key, Cow::Owned(_)));
    }
}
