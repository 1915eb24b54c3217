//! The event type that everything in the client revolves around.
//!
//! Parsed server lines, user input, timers and lifecycle notifications all
//! become [`Event`]s and pass through the dispatcher in sequence. An event
//! is mutated by the handlers that see it (render tags, target attachment,
//! prevent-default), so it is never shared between concurrent handler
//! executions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tokio_util::sync::CancellationToken;

use crate::target::{Channel, Query, Status, Target};

/// Any thing that passes through the client's event loop.
///
/// The `kind` is a short lowercase category (`packet`, `ctcp`,
/// `ctcp-reply`, `input`, `client`, `hook`, `error`, `echo`, `info`), the
/// `verb` is the command, numeric or input verb. The derived name is
/// `kind.verb` with the verb lowercased.
#[derive(Clone, Debug)]
pub struct Event {
    kind: String,
    verb: String,

    /// When the event happened. Overwritten from the `time` tag when the
    /// client is configured to honor server-time.
    pub time: DateTime<Utc>,
    /// Source nick, empty for server-originated or local events.
    pub nick: String,
    /// Source ident.
    pub user: String,
    /// Source hostname.
    pub host: String,
    /// Positional arguments.
    pub args: Vec<String>,
    /// The trailing (colon-prefixed) parameter.
    pub text: String,
    /// IRCv3 message tags, escape-decoded.
    pub tags: HashMap<String, String>,
    /// Non-protocol hints set by handlers for downstream consumers.
    pub render_tags: HashMap<String, String>,

    targets: Vec<Target>,
    prevented_default: bool,
    hidden: bool,
    token: Option<CancellationToken>,
}

impl PartialEq for Event {
    /// Compares all fields except `targets` and `token`, which don't
    /// implement `PartialEq` and aren't meaningful to compare by value.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.verb == other.verb
            && self.time == other.time
            && self.nick == other.nick
            && self.user == other.user
            && self.host == other.host
            && self.args == other.args
            && self.text == other.text
            && self.tags == other.tags
            && self.render_tags == other.render_tags
            && self.prevented_default == other.prevented_default
            && self.hidden == other.hidden
    }
}

impl Event {
    /// Makes a new event with kind and verb set and the current time.
    pub fn new(kind: &str, verb: &str) -> Event {
        Event {
            kind: kind.to_string(),
            verb: verb.to_string(),
            time: Utc::now(),
            nick: String::new(),
            user: String::new(),
            host: String::new(),
            args: Vec::with_capacity(4),
            text: String::new(),
            tags: HashMap::new(),
            render_tags: HashMap::new(),
            targets: Vec::new(),
            prevented_default: false,
            hidden: false,
            token: None,
        }
    }

    /// Makes an event of kind `error` with the given code as verb. It's
    /// absolutely trivial, but it's good to have standardized.
    pub fn error(code: &str, text: &str) -> Event {
        let mut event = Event::new("error", code);
        event.text = text.to_string();
        event
    }

    /// Gets the event's kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Gets the event's verb. Parsed packets keep the wire casing here;
    /// only the name lowercases it.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Gets the event name: kind and lowercased verb separated by a dot.
    pub fn name(&self) -> String {
        format!("{}.{}", self.kind, self.verb.to_lowercase())
    }

    /// Returns true if the event has the kind and one of the verbs.
    pub fn is_either(&self, kind: &str, verbs: &[&str]) -> bool {
        self.kind == kind && verbs.iter().any(|verb| self.verb.eq_ignore_ascii_case(verb))
    }

    /// Gets the argument by index, counting the trailing text as the last
    /// argument. Some servers use the trailing for the last argument in
    /// JOINs and such.
    pub fn arg(&self, index: usize) -> &str {
        if index < self.args.len() {
            &self.args[index]
        } else if index == self.args.len() {
            &self.text
        } else {
            ""
        }
    }

    /// Inhibits the auto-synthesis of a raw command from an unhandled
    /// input event. Propagation through later handlers is not stopped.
    pub fn prevent_default(&mut self) {
        self.prevented_default = true;
    }

    /// Returns true if [`Event::prevent_default`] has been called.
    pub fn default_prevented(&self) -> bool {
        self.prevented_default
    }

    /// Marks the event as hidden. Propagation continues, but output
    /// handlers know not to render it.
    pub fn hide(&mut self) {
        self.hidden = true;
    }

    /// Returns true if [`Event::hide`] has been called.
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Finds the first attached target with one of the kinds specified.
    /// Earlier kinds take priority over later ones; with no kinds given,
    /// the first target is returned.
    pub fn target(&self, kinds: &[&str]) -> Option<&Target> {
        if kinds.is_empty() {
            return self.targets.first();
        }

        for kind in kinds {
            for target in &self.targets {
                if target.kind() == *kind {
                    return Some(target);
                }
            }
        }

        None
    }

    /// Gets the first attached channel target.
    pub fn channel_target(&self) -> Option<&Channel> {
        match self.target(&["channel"]) {
            Some(Target::Channel(channel)) => Some(channel.as_ref()),
            _ => None,
        }
    }

    /// Gets the first attached query target.
    pub fn query_target(&self) -> Option<&Query> {
        match self.target(&["query"]) {
            Some(Target::Query(query)) => Some(query.as_ref()),
            _ => None,
        }
    }

    /// Gets the first attached status target.
    pub fn status_target(&self) -> Option<&Status> {
        match self.target(&["status"]) {
            Some(Target::Status(status)) => Some(status.as_ref()),
            _ => None,
        }
    }

    /// All attached targets, in attachment order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// IDs of all attached targets.
    pub fn target_ids(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.id().to_string()).collect()
    }

    /// The event's cancellation token. It fires when the dispatcher is
    /// done with the event, or when the client is destroyed.
    pub fn token(&self) -> CancellationToken {
        match &self.token {
            Some(token) => token.clone(),
            None => CancellationToken::new(),
        }
    }

    pub(crate) fn set_token(&mut self, token: CancellationToken) {
        self.token = Some(token);
    }

    pub(crate) fn attach_target(&mut self, target: Target) {
        self.targets.push(target);
    }

    pub(crate) fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    pub(crate) fn finish(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Event", 12)?;
        s.serialize_field("name", &self.name())?;
        s.serialize_field("kind", &self.kind)?;
        s.serialize_field("verb", &self.verb)?;
        s.serialize_field("time", &self.time)?;
        s.serialize_field("nick", &self.nick)?;
        s.serialize_field("user", &self.user)?;
        s.serialize_field("host", &self.host)?;
        s.serialize_field("args", &self.args)?;
        s.serialize_field("text", &self.text)?;
        s.serialize_field("tags", &self.tags)?;
        s.serialize_field("targets", &self.target_ids())?;
        s.serialize_field("renderTags", &self.render_tags)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_derivation() {
        let event = Event::new("packet", "PRIVMSG");
        assert_eq!(event.kind(), "packet");
        assert_eq!(event.verb(), "PRIVMSG");
        assert_eq!(event.name(), "packet.privmsg");

        let event = Event::new("input", "me");
        assert_eq!(event.name(), "input.me");
    }

    #[test]
    fn test_is_either() {
        let event = Event::new("packet", "433");
        assert!(event.is_either("packet", &["431", "432", "433", "436"]));
        assert!(!event.is_either("packet", &["001"]));
        assert!(!event.is_either("input", &["433"]));
    }

    #[test]
    fn test_arg_counts_text_as_last() {
        let mut event = Event::new("packet", "JOIN");
        event.args = vec!["#Test".to_string()];
        event.text = "accountname".to_string();

        assert_eq!(event.arg(0), "#Test");
        assert_eq!(event.arg(1), "accountname");
        assert_eq!(event.arg(2), "");
    }

    #[test]
    fn test_prevent_default_and_hide() {
        let mut event = Event::new("input", "me");
        assert!(!event.default_prevented());
        event.prevent_default();
        assert!(event.default_prevented());

        assert!(!event.hidden());
        event.hide();
        assert!(event.hidden());
    }

    #[test]
    fn test_target_resolution_prefers_earlier_kinds() {
        use crate::isupport::Isupport;
        use crate::list::User;
        use std::sync::Arc;

        let isupport = Arc::new(Isupport::default());
        let channel = Target::Channel(Arc::new(Channel::new("#Test", isupport)));
        let query = Target::Query(Arc::new(Query::new(User {
            nick: "Hunter2".to_string(),
            ..User::default()
        })));

        let mut event = Event::new("packet", "PRIVMSG");
        event.attach_target(channel.clone());
        event.attach_target(query.clone());

        // No kinds: first attached wins.
        assert_eq!(event.target(&[]).unwrap().id(), channel.id());
        // Earlier kinds take priority even when attached later.
        assert_eq!(event.target(&["query", "channel"]).unwrap().id(), query.id());
        assert!(event.target(&["status"]).is_none());

        assert_eq!(event.channel_target().unwrap().name(), "#Test");
        assert_eq!(event.query_target().unwrap().user().nick, "Hunter2");
        assert!(event.status_target().is_none());

        assert_eq!(event.target_ids(), vec![channel.id(), query.id()]);
    }

    #[test]
    fn test_error_event() {
        let event = Event::error("invalid_target", "Target does not exist.");
        assert_eq!(event.name(), "error.invalid_target");
        assert_eq!(event.text, "Target does not exist.");
    }

    #[test]
    fn test_serialize() {
        let mut event = Event::new("packet", "PRIVMSG");
        event.nick = "Tester".to_string();
        event.args = vec!["#Test".to_string()];
        event.text = "Hello".to_string();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "packet.privmsg");
        assert_eq!(json["verb"], "PRIVMSG");
        assert_eq!(json["args"][0], "#Test");
        assert_eq!(json["targets"].as_array().unwrap().len(), 0);
    }
}
