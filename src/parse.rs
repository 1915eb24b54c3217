//! Wire-line and input parsing.
//!
//! One stripped IRC line goes in, one [`Event`] comes out. Lines become
//! events of kind `packet`, or `ctcp`/`ctcp-reply` when a CTCP payload is
//! lifted out of a PRIVMSG/NOTICE. User-typed lines become events of kind
//! `input`.
//!
//! # Reference
//! - RFC 1459 §2.3.1, RFC 2812 §2.3.1 (message format)
//! - IRCv3 message tags: <https://ircv3.net/specs/extensions/message-tags>

use crate::error::ParseError;
use crate::event::Event;

/// Parses an IRC line (CR/LF already stripped) into an event of kind
/// `packet`, `ctcp` or `ctcp-reply`.
pub fn parse_packet(line: &str) -> Result<Event, ParseError> {
    if line.is_empty() {
        return Err(ParseError::EmptyLine);
    }

    let mut event = Event::new("packet", "");
    let mut rest = line;

    // Tags
    if let Some(tag_block) = rest.strip_prefix('@') {
        let (block, remainder) = tag_block.split_once(' ').ok_or(ParseError::Incomplete)?;

        for token in block.split(';') {
            match token.split_once('=') {
                Some((key, value)) => {
                    event.tags.insert(key.to_string(), unescape_tag_value(value));
                }
                None => {
                    event.tags.insert(token.to_string(), String::new());
                }
            }
        }

        rest = remainder;
    }

    // Prefix
    if let Some(prefix_block) = rest.strip_prefix(':') {
        let (prefix, remainder) = prefix_block.split_once(' ').ok_or(ParseError::Incomplete)?;

        match prefix.split_once('!') {
            Some((nick, userhost)) => {
                event.nick = nick.to_string();

                let parts: Vec<&str> = userhost.split('@').collect();
                if parts.len() < 2 {
                    return Err(ParseError::BadUserHost);
                }
                event.user = parts[0].to_string();
                event.host = parts[1].to_string();
            }
            None => event.nick = prefix.to_string(),
        }

        rest = remainder;
    }

    // Body: the head splits into verb and args at single spaces; only the
    // first " :" starts the trailing text.
    let head = match rest.split_once(" :") {
        Some((head, text)) => {
            event.text = text.to_string();
            head
        }
        None => rest,
    };

    let mut tokens = head.split(' ');
    let mut verb = tokens.next().unwrap_or("").to_string();
    event.args = tokens.map(str::to_string).collect();

    // CTCP lift
    let mut kind = "packet";
    if (verb == "PRIVMSG" || verb == "NOTICE") && event.text.starts_with('\x01') {
        kind = if verb == "PRIVMSG" { "ctcp" } else { "ctcp-reply" };

        let inner = event.text.replacen('\x01', "", 2);
        match inner.split_once(' ') {
            Some((ctcp_verb, ctcp_text)) => {
                verb = ctcp_verb.to_string();
                event.text = ctcp_text.to_string();
            }
            None => {
                verb = inner;
                event.text = String::new();
            }
        }
    }

    let mut result = Event::new(kind, &verb);
    result.time = event.time;
    result.nick = event.nick;
    result.user = event.user;
    result.host = event.host;
    result.args = event.args;
    result.text = event.text;
    result.tags = event.tags;

    Ok(result)
}

/// Parses a user-typed line into an event of kind `input`.
///
/// A leading `/` makes the first token the verb (lowercased) and the rest
/// the text; anything else becomes verb `text` with the whole line as
/// text. No args are populated.
pub fn parse_input(line: &str) -> Event {
    match line.strip_prefix('/') {
        Some(command) => match command.split_once(' ') {
            Some((verb, text)) => {
                let mut event = Event::new("input", &verb.to_lowercase());
                event.text = text.to_string();
                event
            }
            None => Event::new("input", &command.to_lowercase()),
        },
        None => {
            let mut event = Event::new("input", "text");
            event.text = line.to_string();
            event
        }
    }
}

/// Unescape a tag value from wire format.
///
/// Applies the IRCv3 substitutions `\\`→`\`, `\:`→`;`, `\s`→space,
/// `\r`→CR, `\n`→LF exactly once. Unknown escapes drop the backslash; a
/// trailing backslash is dropped.
pub(crate) fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}

/// Escape a tag value for the wire. Reverses the decoding the parser
/// applies to incoming tag values.
pub fn escape_tag_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => escaped.push_str("\\:"),
            ' ' => escaped.push_str("\\s"),
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
