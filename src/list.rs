//! Channel userlist.
//!
//! An ordered set of channel members with their modes and prefixes. The
//! list stays sorted by (highest-mode rank, casefolded nick) and keeps a
//! case-insensitive nick index for O(1) lookup. Sorting can be paused
//! while a NAMES burst is ingested and re-applied in one go afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::isupport::Isupport;

/// A member of a userlist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Nickname.
    pub nick: String,
    /// Ident/username, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Hostname, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// Services account. Empty means not identified.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    /// Away message. Empty means present.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub away: String,
    /// Permission modes, sorted high to low.
    pub modes: String,
    /// Prefix characters, parallel to `modes`.
    pub prefixes: String,
    /// Highest prefix plus nick, e.g. `"@Gisle"`.
    pub prefixed_nick: String,
}

impl User {
    /// Returns the highest mode, which is always first after sorting.
    pub fn highest_mode(&self) -> Option<char> {
        self.modes.chars().next()
    }

    /// Returns true if the user is marked away.
    pub fn is_away(&self) -> bool {
        !self.away.is_empty()
    }

    fn update_prefixed_nick(&mut self) {
        self.prefixed_nick = match self.prefixes.chars().next() {
            Some(prefix) => format!("{}{}", prefix, self.nick),
            None => self.nick.clone(),
        };
    }
}

/// A partial update applied through [`UserList::patch`]. Non-empty fields
/// are set; the clear flags zero their field explicitly.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    /// New ident/username, if non-empty.
    pub user: String,
    /// New hostname, if non-empty.
    pub host: String,
    /// New account, if non-empty.
    pub account: String,
    /// New away message, if non-empty.
    pub away: String,
    /// Clear the account field.
    pub clear_account: bool,
    /// Clear the away field.
    pub clear_away: bool,
}

#[derive(Debug, Default)]
struct ListInner {
    users: Vec<User>,
    index: HashMap<String, usize>,
    autosort: bool,
}

/// The list of users in a channel.
///
/// Internally locked; snapshots and lookups are safe from any task while
/// the dispatcher mutates it.
#[derive(Debug)]
pub struct UserList {
    isupport: Arc<Isupport>,
    inner: RwLock<ListInner>,
}

impl UserList {
    /// Creates a new list bound to the client's ISUPPORT registry, which
    /// decides mode ranking and prefix mapping.
    pub fn new(isupport: Arc<Isupport>) -> UserList {
        UserList {
            isupport,
            inner: RwLock::new(ListInner {
                users: Vec::with_capacity(64),
                index: HashMap::with_capacity(64),
                autosort: true,
            }),
        }
    }

    /// Inserts a user from a NAMES token, e.g. `"@+Nick!user@host"`.
    /// Handles `multi-prefix` and `userhost-in-names`.
    pub fn insert_from_names_token(&self, token: &str) -> bool {
        let (rest, modes, prefixes) = self.isupport.parse_prefixed_nick(token);

        let mut user = User {
            modes,
            prefixes,
            ..User::default()
        };

        match rest.split_once('!') {
            Some((nick, userhost)) => {
                user.nick = nick.to_string();
                if let Some((ident, host)) = userhost.split_once('@') {
                    user.user = ident.to_string();
                    user.host = host.to_string();
                }
            }
            None => user.nick = rest.to_string(),
        }

        self.insert(user)
    }

    /// Inserts a user. Modes and prefixes are normalized before insertion.
    /// Returns false without mutating if the nick is already present.
    pub fn insert(&self, mut user: User) -> bool {
        if !user.modes.is_empty() {
            // Servers promise rank order in WHO and NAMES replies, but one
            // can never be too sure with IRC.
            user.modes = self.isupport.sort_modes(&user.modes);
            if user.prefixes.len() < user.modes.len() {
                user.prefixes = self.isupport.prefixes_for_modes(&user.modes);
            } else {
                user.prefixes = self.isupport.sort_prefixes(&user.prefixes);
            }
        } else {
            user.prefixes.clear();
        }
        user.update_prefixed_nick();

        let mut inner = self.inner.write().unwrap();
        let key = user.nick.to_ascii_lowercase();
        if inner.index.contains_key(&key) {
            return false;
        }

        inner.users.push(user);
        let pos = inner.users.len() - 1;
        inner.index.insert(key, pos);

        if inner.autosort {
            self.sort(&mut inner);
        }

        true
    }

    /// Adds a permission mode to a user. Redundant modes are ignored.
    /// Returns true if the user was found, even if the mode was redundant.
    pub fn add_mode(&self, nick: &str, mode: char) -> bool {
        if !self.isupport.is_permission_mode(mode) {
            return false;
        }

        let mut inner = self.inner.write().unwrap();
        let pos = match inner.index.get(&nick.to_ascii_lowercase()) {
            Some(pos) => *pos,
            None => return false,
        };

        let user = &mut inner.users[pos];
        if user.modes.contains(mode) {
            return true;
        }

        let prev_highest = user.highest_mode();
        let mut modes = user.modes.clone();
        modes.push(mode);
        user.modes = self.isupport.sort_modes(&modes);
        user.prefixes = self.isupport.prefixes_for_modes(&user.modes);
        user.update_prefixed_nick();

        // Only re-sort if the change affected the highest mode.
        let changed = prev_highest != user.highest_mode();
        if inner.autosort && changed {
            self.sort(&mut inner);
        }

        true
    }

    /// Removes a permission mode from a user. Returns true if the user was
    /// found, even if the mode was not set.
    pub fn remove_mode(&self, nick: &str, mode: char) -> bool {
        if !self.isupport.is_permission_mode(mode) {
            return false;
        }

        let mut inner = self.inner.write().unwrap();
        let pos = match inner.index.get(&nick.to_ascii_lowercase()) {
            Some(pos) => *pos,
            None => return false,
        };

        let user = &mut inner.users[pos];
        if !user.modes.contains(mode) {
            return true;
        }

        let prev_highest = user.highest_mode();
        user.modes = user.modes.replace(mode, "");
        if let Some(prefix) = self.isupport.prefix_for_mode(mode) {
            user.prefixes = user.prefixes.replace(prefix, "");
        }
        user.update_prefixed_nick();

        let changed = prev_highest != user.highest_mode();
        if inner.autosort && changed {
            self.sort(&mut inner);
        }

        true
    }

    /// Renames a user. Succeeds if `from` exists and either the rename is
    /// a no-op or `to` is free.
    pub fn rename(&self, from: &str, to: &str) -> bool {
        let from_key = from.to_ascii_lowercase();
        let to_key = to.to_ascii_lowercase();

        let mut inner = self.inner.write().unwrap();
        let pos = match inner.index.get(&from_key) {
            Some(pos) => *pos,
            None => return false,
        };
        if from == to {
            return true;
        }
        if inner.index.contains_key(&to_key) {
            return false;
        }

        let user = &mut inner.users[pos];
        user.nick = to.to_string();
        user.update_prefixed_nick();

        inner.index.remove(&from_key);
        inner.index.insert(to_key, pos);

        if inner.autosort {
            self.sort(&mut inner);
        }

        true
    }

    /// Removes a user by nick.
    pub fn remove(&self, nick: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let pos = match inner.index.remove(&nick.to_ascii_lowercase()) {
            Some(pos) => pos,
            None => return false,
        };

        inner.users.remove(pos);
        Self::reindex(&mut inner);

        true
    }

    /// Gets a copy of the user by nick.
    pub fn user(&self, nick: &str) -> Option<User> {
        let inner = self.inner.read().unwrap();
        inner
            .index
            .get(&nick.to_ascii_lowercase())
            .map(|pos| inner.users[*pos].clone())
    }

    /// Gets a copy of the users in the list's current order.
    pub fn users(&self) -> Vec<User> {
        self.inner.read().unwrap().users.clone()
    }

    /// Returns the number of users in the list.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().users.len()
    }

    /// Returns true if the list has no users.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().users.is_empty()
    }

    /// Applies a partial update to a user. See [`UserPatch`].
    pub fn patch(&self, nick: &str, patch: UserPatch) -> bool {
        let mut inner = self.inner.write().unwrap();
        let pos = match inner.index.get(&nick.to_ascii_lowercase()) {
            Some(pos) => *pos,
            None => return false,
        };

        let user = &mut inner.users[pos];
        if !patch.user.is_empty() {
            user.user = patch.user;
        }
        if !patch.host.is_empty() {
            user.host = patch.host;
        }
        if !patch.account.is_empty() || patch.clear_account {
            user.account = patch.account;
        }
        if !patch.away.is_empty() || patch.clear_away {
            user.away = patch.away;
        }

        true
    }

    /// Enables or disables automatic sorting, which is on by default.
    /// Disabling it makes sense for bulk NAMES ingestion; enabling it
    /// triggers an immediate sort.
    pub fn set_auto_sort(&self, autosort: bool) {
        let mut inner = self.inner.write().unwrap();
        inner.autosort = autosort;
        if autosort {
            self.sort(&mut inner);
        }
    }

    /// Removes all users.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.users.clear();
        inner.index.clear();
    }

    fn sort(&self, inner: &mut ListInner) {
        let isupport = &self.isupport;
        inner.users.sort_by(|a, b| {
            let a_mode = a.highest_mode();
            let b_mode = b.highest_mode();

            if a_mode != b_mode {
                if isupport.is_mode_higher(a_mode, b_mode) {
                    return std::cmp::Ordering::Less;
                }
                return std::cmp::Ordering::Greater;
            }

            a.nick.to_ascii_lowercase().cmp(&b.nick.to_ascii_lowercase())
        });

        Self::reindex(inner);
    }

    fn reindex(inner: &mut ListInner) {
        inner.index.clear();
        for (pos, user) in inner.users.iter().enumerate() {
            inner.index.insert(user.nick.to_ascii_lowercase(), pos);
        }
    }
}
