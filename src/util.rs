//! Utility functions for outbound message sizing.
//!
//! IRC lines are capped at 512 bytes including CRLF. Because the server
//! prepends `:nick!user@host ` when relaying, the usable space for message
//! text depends on the sender's own identity. This module computes that
//! overhead and cuts long texts into pieces that each fit on one line.

/// Maximum length of an IRC line payload, excluding CRLF.
pub const MAX_LINE_LENGTH: usize = 510;

/// Calculates the overhead in a `PRIVMSG` sent by a client with the given
/// nick, user, host and target name. A `NOTICE` is shorter, so it is safe
/// to use the same function for it.
///
/// # Examples
///
/// ```
/// use slirc_client::util::message_overhead;
///
/// let overhead = message_overhead("Tester", "~test", "10.0.0.1", "#Test", false);
/// assert_eq!(overhead, ":!@ PRIVMSG  :".len() + "Tester~test10.0.0.1#Test".len());
/// ```
pub fn message_overhead(nick: &str, user: &str, host: &str, target: &str, action: bool) -> usize {
    let mut template = ":!@ PRIVMSG  :".len();
    if action {
        template += "\x01ACTION \x01".len();
    }

    template + nick.len() + user.len() + host.len() + target.len()
}

/// Cuts the message into pieces that each fit within `510 - overhead`
/// bytes, preferring to split on single spaces. If any space-delimited
/// token alone exceeds the cut length, it falls back to
/// [`cut_message_no_space`].
///
/// Joining the result with `" "` (or `""` for the no-space fallback)
/// reproduces the input exactly.
pub fn cut_message(text: &str, overhead: usize) -> Vec<String> {
    let cut_length = MAX_LINE_LENGTH.saturating_sub(overhead);
    let tokens: Vec<&str> = text.split(' ').collect();
    if tokens.iter().any(|token| token.len() >= cut_length) {
        return cut_message_no_space(text, overhead);
    }

    let mut result = Vec::with_capacity(text.len() / cut_length.max(1) + 1);
    let mut current = String::with_capacity(cut_length);
    for token in tokens {
        if current.len() + 1 + token.len() > cut_length {
            result.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(token);
    }

    result.push(current);
    result
}

/// Cuts the message at UTF-8 codepoint boundaries, ignoring spaces. No
/// piece ends mid-codepoint.
pub fn cut_message_no_space(text: &str, overhead: usize) -> Vec<String> {
    let cut_length = MAX_LINE_LENGTH.saturating_sub(overhead).max(4);
    let mut result = Vec::with_capacity(text.len() / cut_length + 1);
    let mut remaining = text;

    while remaining.len() > cut_length {
        let chunk = truncate_utf8_safe(remaining, cut_length);
        result.push(chunk.to_string());
        remaining = &remaining[chunk.len()..];
    }

    result.push(remaining.to_string());
    result
}

/// Truncates a string to at most `max_bytes` bytes without breaking a
/// multi-byte UTF-8 codepoint at the end.
#[inline]
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

/// Parses a text like `"#Channel stuff and things"` into `"#Channel"` and
/// `"stuff and things"`. This is commonly used for input commands, which
/// have no standard argument grammar.
pub fn parse_arg_and_text(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_overhead() {
        // :Longer_Name!mircuser@some-long-hostname-from-some-isp.com PRIVMSG #Test :\x01ACTION \x01
        let overhead = message_overhead(
            "Longer_Name",
            "mircuser",
            "some-long-hostname-from-some-isp.com",
            "#Test",
            true,
        );
        assert_eq!(overhead, 14 + 9 + 11 + 8 + 36 + 5);
    }

    #[test]
    fn test_cut_message_short() {
        let overhead = message_overhead("=Scene=", "Gissleh", "npc.fakeuser.invalid", "#Channel3", false);
        let cuts = cut_message("A really short message that will not be cut.", overhead);
        assert_eq!(cuts, vec!["A really short message that will not be cut."]);
    }

    #[test]
    fn test_cut_message_spaces() {
        let overhead = message_overhead("Tester", "~test", "example.com", "#Test", false);
        let word = "word ".repeat(250);
        let text = word.trim_end();

        let cuts = cut_message(text, overhead);
        assert!(cuts.len() > 1);
        for cut in &cuts {
            assert!(cut.len() <= MAX_LINE_LENGTH - overhead, "cut too long: {}", cut.len());
        }
        assert_eq!(cuts.join(" "), text);
    }

    #[test]
    fn test_cut_message_no_space_fallback() {
        let overhead = message_overhead("Tester", "~test", "example.com", "#Test", false);
        let text = "1234567890".repeat(120);

        let cuts = cut_message(&text, overhead);
        assert!(cuts.len() > 1);
        for cut in &cuts {
            assert!(cut.len() <= MAX_LINE_LENGTH - overhead);
        }
        assert_eq!(cuts.concat(), text);
    }

    #[test]
    fn test_cut_message_multibyte() {
        let overhead = message_overhead("Tester", "~test", "example.com", "#Test", false);
        // Multi-byte runes must not be split across cuts.
        let text = "火皇テミヘユ関評レクな記本ラ日設識こへぎ読認水リるっ定件ラリレロ裁写フ記気やい".repeat(30);

        let cuts = cut_message(&text, overhead);
        assert!(cuts.len() > 1);
        for cut in &cuts {
            assert!(cut.len() <= MAX_LINE_LENGTH - overhead);
            assert!(std::str::from_utf8(cut.as_bytes()).is_ok());
        }
        assert_eq!(cuts.concat(), text);
    }

    #[test]
    fn test_truncate_utf8_safe() {
        assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
        assert_eq!(truncate_utf8_safe("hello", 10), "hello");
        assert_eq!(truncate_utf8_safe("café", 4), "caf");
        assert_eq!(truncate_utf8_safe("日本語", 4), "日");
    }

    #[test]
    fn test_parse_arg_and_text() {
        assert_eq!(
            parse_arg_and_text("#Channel stuff and things"),
            ("#Channel", "stuff and things")
        );
        assert_eq!(parse_arg_and_text("#Channel"), ("#Channel", ""));
        assert_eq!(parse_arg_and_text(""), ("", ""));
    }
}
