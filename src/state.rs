//! Serializable client snapshots.
//!
//! Frontends persist and restore these; the client itself only produces
//! them (see [`crate::Client::state`]).

use serde::{Deserialize, Serialize};

use crate::isupport::IsupportState;
use crate::list::User;

/// A snapshot of the client's state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    /// The client's unique ID.
    pub id: String,
    /// Current nick, as accepted by the server.
    pub nick: String,
    /// Current ident, as reported by WHO.
    pub user: String,
    /// Current hostname, as reported by WHO.
    pub host: String,
    /// Whether a connection is up.
    pub connected: bool,
    /// Whether the end of the MOTD has been seen.
    pub ready: bool,
    /// Whether the user has explicitly quit.
    pub quit: bool,
    /// Decoded ISUPPORT state.
    pub isupport: IsupportState,
    /// Enabled capability names, sorted.
    pub caps: Vec<String>,
    /// Snapshots of all targets, status included.
    pub targets: Vec<TargetState>,
}

/// A target's part of the client state snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetState {
    /// The target's unique ID.
    pub id: String,
    /// `channel`, `query` or `status`.
    pub kind: String,
    /// Channel name, query nick, or `Status`.
    pub name: String,
    /// Channel members, or the single remote user of a query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip() {
        let state = ClientState {
            id: "C123".to_string(),
            nick: "Test768".to_string(),
            connected: true,
            caps: vec!["multi-prefix".to_string(), "server-time".to_string()],
            targets: vec![TargetState {
                id: "T456".to_string(),
                kind: "channel".to_string(),
                name: "#Test".to_string(),
                users: vec![User {
                    nick: "Gisle".to_string(),
                    modes: "o".to_string(),
                    prefixes: "@".to_string(),
                    prefixed_nick: "@Gisle".to_string(),
                    ..User::default()
                }],
            }],
            ..ClientState::default()
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: ClientState = serde_json::from_str(&json).unwrap();

        assert_eq!(back.nick, "Test768");
        assert_eq!(back.targets.len(), 1);
        assert_eq!(back.targets[0].users[0].prefixed_nick, "@Gisle");
        assert!(json.contains("\"prefixedNick\":\"@Gisle\""));
    }
}
