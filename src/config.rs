//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::sasl::SaslConfig;

/// The configuration for an IRC client.
///
/// [`Config::with_defaults`] fills in the blanks; [`crate::Client::new`]
/// applies it for you.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The nick that you go by. By default it's "IrcUser".
    pub nick: String,

    /// Nicks to try if `nick` is occupied, in order of preference. By
    /// default it's your nick with numbers 1 through 9.
    pub alternatives: Vec<String>,

    /// The ident, sent along with all messages and commonly shown before
    /// the @ on join, quit, and so on. Some servers tack a `~` in front
    /// of it if you do not run an ident server.
    pub user: String,

    /// Shown in WHOIS as your real name. By default "...".
    pub real_name: String,

    /// The server password used upon connection (PASS). This is not your
    /// NickServ/SASL password!
    #[serde(skip)]
    pub password: Option<String>,

    /// Disables TLS certificate verification. Do not do this in
    /// production.
    pub skip_ssl_verification: bool,

    /// Queued lines sent per second. Defaults to 2.
    pub send_rate: u32,

    /// RFC 5646 language tags for the `draft/languages` capability, in
    /// order of preference.
    pub languages: Vec<String>,

    /// Join channels automatically when invited.
    pub auto_join_invites: bool,

    /// Overwrite event timestamps from the IRCv3 `time` tag.
    pub use_server_time: bool,

    /// SASL PLAIN credentials. Authentication is attempted whenever this
    /// is set and the server offers the `sasl` capability.
    #[serde(skip)]
    pub sasl: Option<SaslConfig>,
}

impl Config {
    /// Returns the config with default values filled in for everything
    /// left empty or zero.
    pub fn with_defaults(mut self) -> Config {
        if self.nick.is_empty() {
            self.nick = "IrcUser".to_string();
        }
        if self.user.is_empty() {
            self.user = "IrcUser".to_string();
        }
        if self.real_name.is_empty() {
            self.real_name = "...".to_string();
        }
        if self.send_rate == 0 {
            self.send_rate = 2;
        }

        if self.alternatives.is_empty() {
            self.alternatives = (1..=9).map(|i| format!("{}{}", self.nick, i)).collect();
        }

        self
    }
}
