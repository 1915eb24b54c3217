//! ISUPPORT (numeric 005) registry.
//!
//! The server advertises its limits, mode letters and prefix characters in
//! `005` tokens shortly after registration. This module accumulates them
//! and answers the questions the rest of the client needs answered: is this
//! name a channel, which of these modes ranks highest, does this mode take
//! an argument.
//!
//! The registry is internally locked, so queries are safe from any task;
//! writes only happen from the dispatcher while the 005 burst comes in.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Decoded ISUPPORT state. This is the serializable snapshot form; the
/// live registry wraps it in a lock.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsupportState {
    /// Raw key to value mapping, exactly as received.
    pub raw: HashMap<String, String>,
    /// Prefix character to mode letter, from `PREFIX`.
    pub prefix_map: HashMap<char, char>,
    /// Permission mode letters ordered high to low, e.g. `"ov"`.
    pub mode_order: String,
    /// Prefix characters parallel to `mode_order`, e.g. `"@+"`.
    pub prefix_order: String,
    /// The four `CHANMODES` groups A, B, C, D.
    pub channel_modes: Vec<String>,
}

/// The live ISUPPORT registry.
///
/// Built from `005` key/value tokens and reset at the start of every
/// connection.
#[derive(Debug, Default)]
pub struct Isupport {
    state: RwLock<IsupportState>,
}

impl Isupport {
    /// Gets an isupport value by key. This is unprocessed data; prefer a
    /// query helper where one exists.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state.read().unwrap().raw.get(key).cloned()
    }

    /// Gets a key and converts it to a number.
    pub fn number(&self, key: &str) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .raw
            .get(key)
            .and_then(|v| v.parse().ok())
    }

    /// Sets an isupport key and updates the decoded views for the keys
    /// that have them (`PREFIX`, `CHANMODES`).
    pub fn set(&self, key: &str, value: &str) {
        let key = key.to_ascii_uppercase();
        let mut state = self.state.write().unwrap();

        state.raw.insert(key.clone(), value.to_string());

        match key.as_str() {
            // PREFIX=(ov)@+
            "PREFIX" => {
                let spec = value.strip_prefix('(').unwrap_or(value);
                if let Some((modes, prefixes)) = spec.split_once(')') {
                    state.mode_order = modes.to_string();
                    state.prefix_order = prefixes.to_string();
                    state.prefix_map = prefixes.chars().zip(modes.chars()).collect();
                }
            }
            // CHANMODES=eIbq,k,flj,CFLNPQcgimnprstz
            "CHANMODES" => {
                state.channel_modes = value.split(',').map(str::to_string).collect();
            }
            _ => {}
        }
    }

    /// Clears everything, raw and decoded.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        state.raw.clear();
        state.prefix_map.clear();
        state.mode_order.clear();
        state.prefix_order.clear();
        state.channel_modes.clear();
    }

    /// Returns whether the target name is a channel, i.e. whether its
    /// first character is listed in `CHANTYPES`.
    pub fn is_channel(&self, target_name: &str) -> bool {
        let first = match target_name.chars().next() {
            Some(ch) => ch,
            None => return false,
        };

        self.state
            .read()
            .unwrap()
            .raw
            .get("CHANTYPES")
            .map(|types| types.contains(first))
            .unwrap_or(false)
    }

    /// Parses a prefixed nick into its components.
    /// Example: `"@+HammerTime62"` -> `("HammerTime62", "ov", "@+")`.
    pub fn parse_prefixed_nick<'a>(&self, fullnick: &'a str) -> (&'a str, String, String) {
        let state = self.state.read().unwrap();
        let mut modes = String::new();
        let mut prefixes = String::new();

        for (i, ch) in fullnick.char_indices() {
            match state.prefix_map.get(&ch) {
                Some(mode) => {
                    modes.push(*mode);
                    prefixes.push(ch);
                }
                None => return (&fullnick[i..], modes, prefixes),
            }
        }

        ("", modes, prefixes)
    }

    /// Gets the highest-ranking mode in `modes` per the declared order.
    pub fn highest_mode(&self, modes: &str) -> Option<char> {
        let state = self.state.read().unwrap();
        state
            .mode_order
            .chars()
            .find(|order_mode| modes.contains(*order_mode))
    }

    /// Gets the highest-ranking prefix in `prefixes` per the declared order.
    pub fn highest_prefix(&self, prefixes: &str) -> Option<char> {
        let state = self.state.read().unwrap();
        state
            .prefix_order
            .chars()
            .find(|order_prefix| prefixes.contains(*order_prefix))
    }

    /// Returns true if `current` ranks higher than `other`. `None` ranks
    /// below every known mode.
    pub fn is_mode_higher(&self, current: Option<char>, other: Option<char>) -> bool {
        match (current, other) {
            (Some(current), Some(other)) if current != other => {
                let state = self.state.read().unwrap();
                for mode in state.mode_order.chars() {
                    if mode == current {
                        return true;
                    } else if mode == other {
                        return false;
                    }
                }
                false
            }
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Projects `modes` onto the declared order, dropping unknowns.
    /// Idempotent.
    pub fn sort_modes(&self, modes: &str) -> String {
        let state = self.state.read().unwrap();
        state
            .mode_order
            .chars()
            .filter(|order_mode| modes.contains(*order_mode))
            .collect()
    }

    /// Projects `prefixes` onto the declared order, dropping unknowns.
    pub fn sort_prefixes(&self, prefixes: &str) -> String {
        let state = self.state.read().unwrap();
        state
            .prefix_order
            .chars()
            .filter(|order_prefix| prefixes.contains(*order_prefix))
            .collect()
    }

    /// Gets the mode for a prefix character.
    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        self.state.read().unwrap().prefix_map.get(&prefix).copied()
    }

    /// Gets the prefix for a mode letter. Slower than the other direction,
    /// but far less frequently needed.
    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        let state = self.state.read().unwrap();
        state
            .prefix_map
            .iter()
            .find(|(_, mapped)| **mapped == mode)
            .map(|(prefix, _)| *prefix)
    }

    /// Gets the prefixes for a mode string, in the same order, skipping
    /// unknown modes.
    pub fn prefixes_for_modes(&self, modes: &str) -> String {
        modes
            .chars()
            .filter_map(|mode| self.prefix_for_mode(mode))
            .collect()
    }

    /// Returns whether the flag is a permission mode (listed in `PREFIX`).
    pub fn is_permission_mode(&self, flag: char) -> bool {
        self.state.read().unwrap().mode_order.contains(flag)
    }

    /// Returns true if the mode takes an argument. Permission modes and
    /// groups A and B always do; group C only when adding; group D never.
    pub fn mode_takes_argument(&self, flag: char, adding: bool) -> bool {
        let state = self.state.read().unwrap();

        if state.mode_order.contains(flag) {
            return true;
        }

        let group = |i: usize| state.channel_modes.get(i).map(|g| g.contains(flag)).unwrap_or(false);
        if group(0) || group(1) {
            return true;
        }
        if adding && group(2) {
            return true;
        }

        false
    }

    /// Returns the `CHANMODES` group index (0-3) the mode belongs to.
    /// Permission modes behave like group A for argument purposes.
    pub fn channel_mode_type(&self, mode: char) -> Option<usize> {
        let state = self.state.read().unwrap();

        if state.mode_order.contains(mode) {
            return Some(0);
        }

        state
            .channel_modes
            .iter()
            .position(|group| group.contains(mode))
    }

    /// Gets a copy of the decoded state for snapshots.
    pub fn state(&self) -> IsupportState {
        self.state.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_isupport() -> Isupport {
        let isupport = Isupport::default();
        for token in "CHANTYPES=#& EXCEPTS INVEX CHANMODES=eIbq,k,flj,CFLNPQcgimnprstz \
                      PREFIX=(aovh)~@+% NETWORK=TestServer CASEMAPPING=rfc1459 NICKLEN=30"
            .split(' ')
        {
            match token.split_once('=') {
                Some((key, value)) => isupport.set(key, value),
                None => isupport.set(token, ""),
            }
        }
        isupport
    }

    #[test]
    fn test_parse_prefixed_nick() {
        let is = test_isupport();
        let table = [
            ("User", "User", "", ""),
            ("+User", "User", "v", "+"),
            ("@%+User", "User", "ohv", "@%+"),
            ("~User", "User", "a", "~"),
        ];

        for (full, nick, modes, prefixes) in table {
            let (got_nick, got_modes, got_prefixes) = is.parse_prefixed_nick(full);
            assert_eq!(got_nick, nick, "{}", full);
            assert_eq!(got_modes, modes, "{}", full);
            assert_eq!(got_prefixes, prefixes, "{}", full);
        }
    }

    #[test]
    fn test_is_channel() {
        let is = test_isupport();
        assert!(is.is_channel("#Test"));
        assert!(is.is_channel("&Test"));
        assert!(is.is_channel("#TestAndSuch"));
        assert!(!is.is_channel("User"));
        assert!(!is.is_channel("+Stuff"));
        assert!(!is.is_channel("@astrwef"));
        assert!(!is.is_channel(""));
    }

    #[test]
    fn test_is_permission_mode() {
        let is = test_isupport();
        for (flag, expected) in [
            ('#', false),
            ('+', false),
            ('o', true),
            ('v', true),
            ('h', true),
            ('a', true),
            ('g', false),
            ('p', false),
        ] {
            assert_eq!(is.is_permission_mode(flag), expected, "{}", flag);
        }
    }

    #[test]
    fn test_mode_takes_argument() {
        let is = test_isupport();
        // Permission modes always take an argument.
        assert!(is.mode_takes_argument('o', true));
        assert!(is.mode_takes_argument('o', false));
        // Group A and B always do.
        assert!(is.mode_takes_argument('b', true));
        assert!(is.mode_takes_argument('b', false));
        assert!(is.mode_takes_argument('k', false));
        // Group C only when adding.
        assert!(is.mode_takes_argument('f', true));
        assert!(!is.mode_takes_argument('f', false));
        // Group D never does.
        assert!(!is.mode_takes_argument('m', true));
        assert!(!is.mode_takes_argument('m', false));
        // Unknown modes never do.
        assert!(!is.mode_takes_argument('?', true));
    }

    #[test]
    fn test_channel_mode_type() {
        let is = test_isupport();
        assert_eq!(is.channel_mode_type('o'), Some(0));
        assert_eq!(is.channel_mode_type('b'), Some(0));
        assert_eq!(is.channel_mode_type('k'), Some(1));
        assert_eq!(is.channel_mode_type('j'), Some(2));
        assert_eq!(is.channel_mode_type('m'), Some(3));
        assert_eq!(is.channel_mode_type('?'), None);
    }

    #[test]
    fn test_sort_modes_idempotent() {
        let is = test_isupport();
        assert_eq!(is.sort_modes("vo"), "ov");
        assert_eq!(is.sort_modes(&is.sort_modes("vhoa")), "aovh");
        // Unknown modes are dropped.
        assert_eq!(is.sort_modes("zvoz"), "ov");
        assert_eq!(is.sort_prefixes("+@"), "@+");
    }

    #[test]
    fn test_highest_mode_and_ranking() {
        let is = test_isupport();
        assert_eq!(is.highest_mode("vo"), Some('o'));
        assert_eq!(is.highest_mode("v"), Some('v'));
        assert_eq!(is.highest_mode(""), None);
        assert_eq!(is.highest_prefix("+@"), Some('@'));

        assert!(is.is_mode_higher(Some('o'), Some('v')));
        assert!(!is.is_mode_higher(Some('v'), Some('o')));
        assert!(is.is_mode_higher(Some('v'), None));
        assert!(!is.is_mode_higher(None, Some('v')));
        assert!(!is.is_mode_higher(Some('o'), Some('o')));
    }

    #[test]
    fn test_prefix_mode_mapping() {
        let is = test_isupport();
        assert_eq!(is.mode_for_prefix('@'), Some('o'));
        assert_eq!(is.prefix_for_mode('o'), Some('@'));
        assert_eq!(is.prefixes_for_modes("ov"), "@+");
        assert_eq!(is.mode_for_prefix('!'), None);
    }

    #[test]
    fn test_reset() {
        let is = test_isupport();
        assert!(is.is_channel("#Test"));
        is.reset();
        assert!(!is.is_channel("#Test"));
        assert_eq!(is.get("NETWORK"), None);
        assert_eq!(is.highest_mode("ov"), None);
    }

    #[test]
    fn test_number() {
        let is = test_isupport();
        assert_eq!(is.number("NICKLEN"), Some(30));
        assert_eq!(is.number("NETWORK"), None);
        assert_eq!(is.number("MISSING"), None);
    }
}
