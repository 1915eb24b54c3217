//! Property-based tests for the parser, the message cutter and the
//! userlist ordering invariants.

use std::sync::Arc;

use proptest::prelude::*;

use slirc_client::util::{cut_message, message_overhead, MAX_LINE_LENGTH};
use slirc_client::{parse_packet, Isupport, UserList};

// =============================================================================
// STRATEGIES
// =============================================================================

fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z\\[\\]\\\\^_`{|}][a-zA-Z0-9\\-\\[\\]\\\\^_`{|}]{0,8}")
        .expect("valid regex")
}

fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("~?[a-zA-Z][a-zA-Z0-9]{0,9}").expect("valid regex")
}

fn hostname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,16}(\\.[a-z0-9]{1,10}){0,3}").expect("valid regex")
}

fn verb_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[A-Z]{3,10}").expect("valid regex"),
        prop::string::string_regex("[0-9]{3}").expect("valid regex"),
    ]
}

fn arg_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[#&]?[a-zA-Z0-9\\-_]{1,16}").expect("valid regex")
}

fn text_strategy() -> impl Strategy<Value = String> {
    // No CR/LF/NUL and no leading \x01, which would make it CTCP.
    prop::string::string_regex("[a-zA-Z0-9 :,.!?'\\-]{0,200}").expect("valid regex")
}

fn mode_set_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ovhaq]{0,5}").expect("valid regex")
}

fn test_isupport() -> Arc<Isupport> {
    let isupport = Isupport::default();
    isupport.set("CHANTYPES", "#&");
    isupport.set("CHANMODES", "eIbq,k,flj,CFLNPQcgimnprstz");
    isupport.set("PREFIX", "(qaohv)~&@%+");
    Arc::new(isupport)
}

// =============================================================================
// PARSER
// =============================================================================

proptest! {
    #[test]
    fn parse_packet_roundtrips_well_formed_lines(
        nick in nickname_strategy(),
        user in username_strategy(),
        host in hostname_strategy(),
        verb in verb_strategy(),
        args in prop::collection::vec(arg_strategy(), 0..4),
        text in text_strategy(),
    ) {
        let mut line = format!(":{}!{}@{} {}", nick, user, host, verb);
        for arg in &args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push_str(" :");
        line.push_str(&text);

        let event = parse_packet(&line).expect("well-formed line should parse");

        prop_assert_eq!(event.kind(), "packet");
        prop_assert_eq!(event.verb(), verb.as_str());
        prop_assert_eq!(&event.nick, &nick);
        prop_assert_eq!(&event.user, &user);
        prop_assert_eq!(&event.host, &host);
        prop_assert_eq!(&event.args, &args);
        prop_assert_eq!(&event.text, &text);

        // The derived name is always kind.verb lowercased.
        prop_assert_eq!(event.name(), format!("packet.{}", verb.to_lowercase()));
    }

    #[test]
    fn parse_packet_never_panics(line in "\\PC{0,256}") {
        let _ = parse_packet(&line);
    }
}

// =============================================================================
// MESSAGE CUTTER
// =============================================================================

proptest! {
    #[test]
    fn cut_message_bounds_and_reassembly(
        nick in nickname_strategy(),
        user in username_strategy(),
        host in hostname_strategy(),
        target in prop::string::string_regex("[#&][a-zA-Z0-9\\-_]{1,20}").expect("valid regex"),
        action in any::<bool>(),
        words in prop::collection::vec(
            prop::string::string_regex("[a-zA-Z0-9é日本語]{1,12}").expect("valid regex"),
            1..300,
        ),
    ) {
        let overhead = message_overhead(&nick, &user, &host, &target, action);
        let text = words.join(" ");
        let cut_length = MAX_LINE_LENGTH - overhead;

        let cuts = cut_message(&text, overhead);

        for cut in &cuts {
            prop_assert!(cut.len() <= cut_length, "cut of {} bytes exceeds {}", cut.len(), cut_length);
            // No piece may end mid-codepoint.
            prop_assert!(std::str::from_utf8(cut.as_bytes()).is_ok());
        }

        // Space cutting joins with the separator it split on; the
        // rune-boundary fallback concatenates.
        let fell_back = text.split(' ').any(|token| token.len() >= cut_length);
        let joined = if fell_back { cuts.concat() } else { cuts.join(" ") };
        prop_assert_eq!(joined, text);
    }
}

// =============================================================================
// USERLIST
// =============================================================================

proptest! {
    #[test]
    fn userlist_stays_sorted_and_indexed(
        entries in prop::collection::vec(
            (mode_set_strategy(), nickname_strategy()),
            1..24,
        ),
        mode_ops in prop::collection::vec(
            (any::<bool>(), prop::sample::select(vec!['o', 'v', 'h', 'x']), 0usize..24),
            0..24,
        ),
    ) {
        let isupport = test_isupport();
        let list = UserList::new(isupport.clone());

        let mut inserted = Vec::new();
        for (modes, nick) in &entries {
            let prefixes: String = modes.chars().filter_map(|m| isupport.prefix_for_mode(m)).collect();
            let token = format!("{}{}", prefixes, nick);
            if list.insert_from_names_token(&token) {
                inserted.push(nick.clone());
            }
        }

        for (add, mode, pick) in &mode_ops {
            let nick = &inserted[pick % inserted.len()];
            if *add {
                list.add_mode(nick, *mode);
            } else {
                list.remove_mode(nick, *mode);
            }
        }

        let users = list.users();
        prop_assert_eq!(users.len(), inserted.len());

        for pair in users.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let a_mode = a.highest_mode();
            let b_mode = b.highest_mode();

            // Sorted by mode rank first, casefolded nick second.
            prop_assert!(!isupport.is_mode_higher(b_mode, a_mode),
                "{} ranks above {}", b.prefixed_nick, a.prefixed_nick);
            if a_mode == b_mode {
                prop_assert!(a.nick.to_lowercase() <= b.nick.to_lowercase());
            }
        }

        for user in &users {
            // The index resolves every present nick.
            let found = list.user(&user.nick);
            prop_assert!(found.is_some());

            // prefixedNick is the highest prefix plus the nick.
            let expected = match user.prefixes.chars().next() {
                Some(prefix) => format!("{}{}", prefix, user.nick),
                None => user.nick.clone(),
            };
            prop_assert_eq!(&user.prefixed_nick, &expected);

            // Modes stay inside the declared order and sorted.
            prop_assert_eq!(isupport.sort_modes(&user.modes), user.modes.clone());
        }
    }

    #[test]
    fn sort_modes_is_idempotent(modes in "[a-z]{0,12}") {
        let isupport = test_isupport();
        let sorted = isupport.sort_modes(&modes);
        prop_assert_eq!(isupport.sort_modes(&sorted), sorted.clone());

        // Unknown modes are dropped.
        for mode in sorted.chars() {
            prop_assert!("qaohv".contains(mode));
        }
    }
}
