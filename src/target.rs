//! Conversation targets: channels, queries and the status target.
//!
//! A target is the client's in-memory handle for a conversation endpoint.
//! The dispatcher routes events into targets, and each target mutates its
//! own state from them. Exactly one status target exists per client; it is
//! created at construction and can never be removed.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use rand::Rng;

use crate::client::Client;
use crate::event::Event;
use crate::isupport::Isupport;
use crate::list::{User, UserList, UserPatch};
use crate::state::TargetState;

/// A conversation endpoint: a channel, a direct-message query, or the
/// client's status.
///
/// Targets are cheap to clone; the variants share their state through the
/// contained `Arc`.
#[derive(Clone, Debug)]
pub enum Target {
    /// A channel with a userlist.
    Channel(Arc<Channel>),
    /// A direct-message conversation with one other user.
    Query(Arc<Query>),
    /// The client's status window.
    Status(Arc<Status>),
}

impl Target {
    /// The target's stable, opaque ID.
    pub fn id(&self) -> &str {
        match self {
            Target::Channel(channel) => &channel.id,
            Target::Query(query) => &query.id,
            Target::Status(status) => &status.id,
        }
    }

    /// The target's kind: `channel`, `query` or `status`.
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Channel(_) => "channel",
            Target::Query(_) => "query",
            Target::Status(_) => "status",
        }
    }

    /// The target's name: channel name, query nick, or `Status`.
    pub fn name(&self) -> String {
        match self {
            Target::Channel(channel) => channel.name.clone(),
            Target::Query(query) => query.user().nick,
            Target::Status(_) => "Status".to_string(),
        }
    }

    /// Snapshot for [`crate::state::ClientState`].
    pub fn state(&self) -> TargetState {
        match self {
            Target::Channel(channel) => channel.state(),
            Target::Query(query) => query.state(),
            Target::Status(status) => status.state(),
        }
    }

    pub(crate) fn handle(&self, event: &mut Event, client: &Client) {
        match self {
            Target::Channel(channel) => channel.handle(event, client),
            Target::Query(query) => query.handle(event, client),
            Target::Status(status) => status.handle(event, client),
        }
    }
}

/// A channel target. It owns the userlist.
#[derive(Debug)]
pub struct Channel {
    id: String,
    name: String,
    userlist: UserList,
    parted: AtomicBool,
    isupport: Arc<Isupport>,
}

impl Channel {
    pub(crate) fn new(name: &str, isupport: Arc<Isupport>) -> Channel {
        Channel {
            id: generate_id('T'),
            name: name.to_string(),
            userlist: UserList::new(isupport.clone()),
            parted: AtomicBool::new(false),
            isupport,
        }
    }

    /// The channel's unique ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channel's userlist.
    pub fn userlist(&self) -> &UserList {
        &self.userlist
    }

    /// Returns true once the client has left the channel.
    pub fn parted(&self) -> bool {
        self.parted.load(Ordering::Acquire)
    }

    pub(crate) fn set_parted(&self) {
        self.parted.store(true, Ordering::Release);
    }

    fn state(&self) -> TargetState {
        TargetState {
            id: self.id.clone(),
            kind: "channel".to_string(),
            name: self.name.clone(),
            users: self.userlist.users(),
        }
    }

    fn handle(&self, event: &mut Event, _client: &Client) {
        match event.name().as_str() {
            "packet.join" => {
                // extended-join carries the account as the extra argument,
                // with `*` meaning logged out.
                let account = match event.arg(1) {
                    "" | "*" => String::new(),
                    account => account.to_string(),
                };

                self.userlist.insert(User {
                    nick: event.nick.clone(),
                    user: event.user.clone(),
                    host: event.host.clone(),
                    account,
                    ..User::default()
                });
            }
            "packet.part" | "packet.quit" => {
                self.userlist.remove(&event.nick);
            }
            "packet.kick" => {
                self.userlist.remove(event.arg(1));
            }
            "packet.nick" => {
                self.userlist.rename(&event.nick, event.arg(0));
            }
            "packet.account" => {
                match event.arg(0) {
                    "" | "*" => self.userlist.patch(
                        &event.nick,
                        UserPatch {
                            clear_account: true,
                            ..UserPatch::default()
                        },
                    ),
                    account => self.userlist.patch(
                        &event.nick,
                        UserPatch {
                            account: account.to_string(),
                            ..UserPatch::default()
                        },
                    ),
                };
            }
            "packet.away" => {
                if event.text.is_empty() {
                    self.userlist.patch(
                        &event.nick,
                        UserPatch {
                            clear_away: true,
                            ..UserPatch::default()
                        },
                    );
                } else {
                    self.userlist.patch(
                        &event.nick,
                        UserPatch {
                            away: event.text.clone(),
                            ..UserPatch::default()
                        },
                    );
                }
            }
            "packet.chghost" => {
                self.userlist.patch(
                    &event.nick,
                    UserPatch {
                        user: event.arg(0).to_string(),
                        host: event.arg(1).to_string(),
                        ..UserPatch::default()
                    },
                );
            }
            "packet.353" => {
                // NAMES burst; one sort at the end is enough.
                self.userlist.set_auto_sort(false);
                for token in event.text.split_whitespace() {
                    self.userlist.insert_from_names_token(token);
                }
            }
            "packet.366" => {
                self.userlist.set_auto_sort(true);
            }
            "packet.mode" => {
                self.apply_modes(event);
            }
            _ => {}
        }
    }

    fn apply_modes(&self, event: &Event) {
        let mut adding = true;
        let mut arg_index = 2;

        for flag in event.arg(1).to_string().chars() {
            match flag {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    let arg = if self.isupport.mode_takes_argument(flag, adding) {
                        let arg = event.arg(arg_index).to_string();
                        arg_index += 1;
                        arg
                    } else {
                        String::new()
                    };

                    if self.isupport.is_permission_mode(flag) {
                        if adding {
                            self.userlist.add_mode(&arg, flag);
                        } else {
                            self.userlist.remove_mode(&arg, flag);
                        }
                    }
                }
            }
        }
    }
}

/// A query target: a direct-message conversation with one other user.
#[derive(Debug)]
pub struct Query {
    id: String,
    user: RwLock<User>,
}

impl Query {
    pub(crate) fn new(user: User) -> Query {
        Query {
            id: generate_id('T'),
            user: RwLock::new(user),
        }
    }

    /// The query's unique ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A copy of the remote user's record.
    pub fn user(&self) -> User {
        self.user.read().unwrap().clone()
    }

    fn state(&self) -> TargetState {
        let user = self.user();
        TargetState {
            id: self.id.clone(),
            kind: "query".to_string(),
            name: user.nick.clone(),
            users: vec![user],
        }
    }

    fn handle(&self, event: &mut Event, _client: &Client) {
        match event.name().as_str() {
            "packet.nick" => {
                self.user.write().unwrap().nick = event.arg(0).to_string();
            }
            "packet.account" => {
                let account = match event.arg(0) {
                    "" | "*" => String::new(),
                    account => account.to_string(),
                };
                self.user.write().unwrap().account = account;
            }
            "packet.chghost" => {
                let mut user = self.user.write().unwrap();
                user.user = event.arg(0).to_string();
                user.host = event.arg(1).to_string();
            }
            "packet.away" => {
                self.user.write().unwrap().away = event.text.clone();
            }
            _ => {}
        }
    }
}

/// The status target. It receives everything not routed elsewhere.
#[derive(Debug)]
pub struct Status {
    id: String,
}

impl Status {
    pub(crate) fn new() -> Status {
        Status { id: generate_id('T') }
    }

    /// The status target's unique ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> TargetState {
        TargetState {
            id: self.id.clone(),
            kind: "status".to_string(),
            name: "Status".to_string(),
            users: Vec::new(),
        }
    }

    fn handle(&self, _event: &mut Event, _client: &Client) {}
}

/// Generates a unique ID: a prefix letter, random bytes, and the current
/// unix time mixed in so IDs sort roughly by creation.
pub(crate) fn generate_id(prefix: char) -> String {
    let mut buffer = [0u8; 12];
    rand::thread_rng().fill(&mut buffer[..]);
    buffer[4..8].copy_from_slice(&(chrono::Utc::now().timestamp() as u32).to_be_bytes());

    let mut id = String::with_capacity(25);
    id.push(prefix);
    for byte in buffer {
        let _ = write!(id, "{:02x}", byte);
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_isupport() -> Arc<Isupport> {
        let isupport = Isupport::default();
        isupport.set("CHANTYPES", "#&");
        isupport.set("CHANMODES", "eIbq,k,flj,CFLNPQcgimnprstz");
        isupport.set("PREFIX", "(ov)@+");
        Arc::new(isupport)
    }

    #[test]
    fn test_generate_id() {
        let a = generate_id('T');
        let b = generate_id('T');
        assert_ne!(a, b);
        assert!(a.starts_with('T'));
        assert_eq!(a.len(), 25);
    }

    #[test]
    fn test_target_kinds() {
        let isupport = test_isupport();
        let channel = Target::Channel(Arc::new(Channel::new("#Test", isupport)));
        let query = Target::Query(Arc::new(Query::new(User {
            nick: "Hunter2".to_string(),
            ..User::default()
        })));
        let status = Target::Status(Arc::new(Status::new()));

        assert_eq!(channel.kind(), "channel");
        assert_eq!(channel.name(), "#Test");
        assert_eq!(query.kind(), "query");
        assert_eq!(query.name(), "Hunter2");
        assert_eq!(status.kind(), "status");
        assert_eq!(status.name(), "Status");
    }

    #[test]
    fn test_channel_state() {
        let channel = Channel::new("#Test", test_isupport());
        channel.userlist.insert_from_names_token("@+Gisle!gisle@gisle.me");

        let state = channel.state();
        assert_eq!(state.kind, "channel");
        assert_eq!(state.name, "#Test");
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.users[0].prefixed_nick, "@Gisle");
    }
}
