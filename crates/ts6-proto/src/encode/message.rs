//! Encoding implementations for IRC messages and prefixes.

use std::io::{self, Write};

use crate::message::limits;
use crate::message::tags::escape_tag_value_to_writer;
use crate::message::{Message, MessageRef, Tag};
use crate::prefix::Prefix;

use super::IrcEncode;

/// Encode a single tag to the writer.
fn encode_tag<W: Write>(w: &mut W, tag: &Tag) -> io::Result<usize> {
    let mut written = w.write(tag.0.as_bytes())?;
    if let Some(ref value) = tag.1 {
        written += w.write(b"=")?;
        written += escape_tag_value_to_writer(w, value)?;
    }
    Ok(written)
}

/// Render one tag to its `key[=escaped-value]` wire form.
fn render_one_tag(tag: &Tag) -> String {
    let mut buf = Vec::new();
    let _ = encode_tag(&mut buf, tag);
    String::from_utf8(buf).unwrap_or_default()
}

/// Join rendered tags with `;`, capped at `max_bytes`. A tag that would
/// overflow the cap is dropped (not truncated); shorter tags later in the
/// list are still tried.
fn cap_part(rendered: &[String], max_bytes: usize) -> String {
    let mut out = String::new();
    for tag in rendered {
        let candidate_len = if out.is_empty() {
            tag.len()
        } else {
            out.len() + 1 + tag.len()
        };
        if candidate_len > max_bytes {
            continue;
        }
        if !out.is_empty() {
            out.push(';');
        }
        out.push_str(tag);
    }
    out
}

/// Render the full tag section: server tags first, then client-only
/// (`+`-prefixed) tags, each section capped at `TAGSPARTLEN` independently.
fn render_tag_section(tags: &[Tag]) -> String {
    let mut server_tags = Vec::new();
    let mut client_tags = Vec::new();
    for tag in tags {
        let rendered = render_one_tag(tag);
        if tag.0.starts_with('+') {
            client_tags.push(rendered);
        } else {
            server_tags.push(rendered);
        }
    }

    let server_part = cap_part(&server_tags, limits::TAGSPARTLEN);
    let client_part = cap_part(&client_tags, limits::TAGSPARTLEN);

    match (server_part.is_empty(), client_part.is_empty()) {
        (true, true) => String::new(),
        (false, true) => server_part,
        (true, false) => client_part,
        (false, false) => format!("{server_part};{client_part}"),
    }
}

impl IrcEncode for Message {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let mut written = 0;

        // Tags: server tags then client tags, each part capped at
        // TAGSPARTLEN with overflowing tags dropped rather than truncated.
        if let Some(ref tags) = self.tags {
            let tag_section = render_tag_section(tags);
            if !tag_section.is_empty() {
                written += w.write(b"@")?;
                written += w.write(tag_section.as_bytes())?;
                written += w.write(b" ")?;
            }
        }

        // Prefix + command + params are rendered into a buffer so the
        // DATALEN cap can be enforced before anything hits the wire.
        let mut data = Vec::with_capacity(128);
        if let Some(ref prefix) = self.prefix {
            data.write_all(b":")?;
            prefix.encode(&mut data)?;
            data.write_all(b" ")?;
        }
        self.command.encode(&mut data)?;

        if data.len() > limits::DATALEN {
            let lossy = String::from_utf8_lossy(&data).into_owned();
            let truncated = limits::truncate_to_bytes(&lossy, limits::DATALEN).to_owned();
            data = truncated.into_bytes();
        }

        written += w.write(&data)?;

        // CRLF
        written += w.write(b"\r\n")?;

        Ok(written)
    }
}

impl<'a> IrcEncode for MessageRef<'a> {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let mut written = 0;

        // Tags (raw, already formatted)
        if let Some(tags) = self.tags {
            written += w.write(b"@")?;
            written += w.write(tags.as_bytes())?;
            written += w.write(b" ")?;
        }

        // Prefix
        if let Some(ref prefix) = self.prefix {
            written += w.write(b":")?;
            written += w.write(prefix.raw.as_bytes())?;
            written += w.write(b" ")?;
        }

        // Command (raw)
        written += w.write(self.command.name.as_bytes())?;
        for arg in &self.command.args {
            written += w.write(b" ")?;
            written += w.write(arg.as_bytes())?;
        }

        // CRLF
        written += w.write(b"\r\n")?;

        Ok(written)
    }
}

impl IrcEncode for Prefix {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        match self {
            Prefix::ServerName(name) => w.write(name.as_bytes()),
            Prefix::Nickname(nick, user, host) => {
                let mut written = w.write(nick.as_bytes())?;
                if !user.is_empty() {
                    written += w.write(b"!")?;
                    written += w.write(user.as_bytes())?;
                }
                if !host.is_empty() {
                    written += w.write(b"@")?;
                    written += w.write(host.as_bytes())?;
                }
                Ok(written)
            }
        }
    }
}

#[cfg(test)]
mod cap_tests {
    use super::*;

    #[test]
    fn test_client_tags_render_after_server_tags() {
        let msg = Message::privmsg("#ch", "hi")
            .with_tag("+draft/typing", Some("active"))
            .with_tag("time", Some("2023-01-01T00:00:00Z"));
        let bytes = msg.to_bytes();
        let s = String::from_utf8(bytes).unwrap();
        let tag_section = s.strip_prefix('@').unwrap().split(' ').next().unwrap();
        let time_pos = tag_section.find("time=").unwrap();
        let typing_pos = tag_section.find("+draft/typing=").unwrap();
        assert!(time_pos < typing_pos, "server tags must precede client tags");
    }

    #[test]
    fn test_oversized_single_tag_value_is_dropped() {
        let huge = "x".repeat(limits::TAGSPARTLEN + 10);
        let msg = Message::privmsg("#ch", "hi")
            .with_tag("huge", Some(huge.as_str()))
            .with_tag("msgid", Some("abc"));
        let bytes = msg.to_bytes();
        let s = String::from_utf8(bytes).unwrap();
        assert!(!s.contains("huge="), "oversized tag must be dropped, not truncated");
        assert!(s.contains("msgid=abc"), "shorter tag after a dropped one must still be tried");
    }

    #[test]
    fn test_data_section_truncated_to_datalen() {
        let huge = "x".repeat(limits::DATALEN + 200);
        let msg = Message::privmsg("#ch", huge.as_str());
        let bytes = msg.to_bytes();
        let s = String::from_utf8(bytes).unwrap();
        let data = s.trim_end_matches("\r\n");
        assert!(data.len() <= limits::DATALEN);
    }
}
