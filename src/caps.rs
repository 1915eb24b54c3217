//! IRCv3 capability negotiation support.
//!
//! The client advertises interest in a fixed set of capabilities during
//! `CAP LS` and tracks which of them the server acknowledges. Anything the
//! server offers outside this set is recorded but never requested.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

/// Capabilities the client knows how to use.
///
/// The order here is not significant; requests preserve the server's
/// discovery order.
pub const SUPPORTED_CAPS: &[&str] = &[
    "server-time",
    "cap-notify",
    "multi-prefix",
    "userhost-in-names",
    "account-notify",
    "away-notify",
    "invite-notify",
    "extended-join",
    "chghost",
    "account-tag",
    "echo-message",
    "draft/languages",
    "sasl",
];

/// Check if a capability name is supported by this client.
pub fn is_supported(name: &str) -> bool {
    SUPPORTED_CAPS.iter().any(|cap| *cap == name)
}

/// Split a `CAP LS`/`CAP NEW` token of the form `key` or `key=data`.
///
/// Only the first `=` is significant; data may itself contain `=`.
pub fn split_cap_token(token: &str) -> (&str, Option<&str>) {
    match token.split_once('=') {
        Some((key, data)) => (key, Some(data)),
        None => (token, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        assert!(is_supported("multi-prefix"));
        assert!(is_supported("sasl"));
        assert!(is_supported("draft/languages"));
        assert!(!is_supported("vendorname/custom-stuff"));
        assert!(!is_supported(""));
    }

    #[test]
    fn test_split_cap_token() {
        assert_eq!(split_cap_token("multi-prefix"), ("multi-prefix", None));
        assert_eq!(split_cap_token("sasl=PLAIN,EXTERNAL"), ("sasl", Some("PLAIN,EXTERNAL")));
        assert_eq!(
            split_cap_token("vendorname/advanced-custom-stuff=things,and,items"),
            ("vendorname/advanced-custom-stuff", Some("things,and,items"))
        );
        assert_eq!(split_cap_token("=malformed"), ("", Some("malformed")));
    }
}
