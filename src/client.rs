//! The IRC client handle.
//!
//! A [`Client`] is a cheap, cloneable handle over shared state owned by
//! three tasks: the dispatcher (all protocol state), the queue worker
//! (rate-limited sends), and, per connection, the socket reader/writer
//! pair. Public accessors read a small locked state struct; everything
//! else is mutated only on the dispatcher task.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::conn::{self, ConnHandle};
use crate::dispatch;
use crate::error::ClientError;
use crate::event::Event;
use crate::isupport::Isupport;
use crate::list::User;
use crate::parse;
use crate::state::ClientState;
use crate::target::{generate_id, Channel, Query, Status, Target};
use crate::util;

/// A handler function registered on a client. Handlers run inline on the
/// dispatcher task and see every event, in order; they must not block.
pub type Handler = Arc<dyn Fn(&mut Event, &Client) + Send + Sync>;

/// An IRC client.
///
/// Construct it with [`Client::new`] from within a tokio runtime; it
/// spawns its worker tasks immediately. Clones share the same client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    id: String,
    config: Config,
    isupport: Arc<Isupport>,
    status: Arc<Status>,
    events_tx: mpsc::Sender<Event>,
    sends_tx: mpsc::Sender<String>,
    connected_tx: watch::Sender<bool>,
    token: CancellationToken,
    conn_seq: AtomicU64,
    shared: RwLock<Shared>,
}

/// Fields readable from outside the dispatcher, under the reader half of
/// the lock. The dispatcher takes the writer half around mutations.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) conn: Option<ConnHandle>,
    pub(crate) nick: String,
    pub(crate) user: String,
    pub(crate) host: String,
    pub(crate) ready: bool,
    pub(crate) quit: bool,
    pub(crate) cap_enabled: HashSet<String>,
    pub(crate) cap_data: HashMap<String, String>,
    pub(crate) caps_requested: Vec<String>,
    pub(crate) targets: Vec<Target>,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) values: HashMap<String, String>,
    pub(crate) last_send: Option<Instant>,
    // Registration-time flags; handlers never see these.
    pub(crate) sasl_method: Option<String>,
    pub(crate) nick_change_locked: bool,
    pub(crate) primed_nick_change: Option<String>,
}

impl Client {
    /// Creates a new client and spawns its dispatcher and send-queue
    /// tasks. Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Client {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (sends_tx, sends_rx) = mpsc::channel(64);
        let (connected_tx, connected_rx) = watch::channel(false);

        let client = Client {
            inner: Arc::new(ClientInner {
                id: generate_id('C'),
                config: config.with_defaults(),
                isupport: Arc::new(Isupport::default()),
                status: Arc::new(Status::new()),
                events_tx,
                sends_tx,
                connected_tx,
                token: CancellationToken::new(),
                conn_seq: AtomicU64::new(0),
                shared: RwLock::new(Shared::default()),
            }),
        };

        let _ = client.add_target(Target::Status(client.inner.status.clone()));

        tokio::spawn(dispatch::run(client.clone(), events_rx));
        tokio::spawn(send_queue_task(client.clone(), sends_rx, connected_rx));

        client.emit_non_blocking(Event::new("client", "create"));

        client
    }

    /// The unique identifier for the client, usable as a map key.
    pub fn id(&self) -> String {
        self.inner.id.clone()
    }

    /// The client's configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The client's ISUPPORT registry. Reads are safe from any task.
    pub fn isupport(&self) -> Arc<Isupport> {
        self.inner.isupport.clone()
    }

    /// The current nick, empty until the server accepts one.
    pub fn nick(&self) -> String {
        self.inner.shared.read().unwrap().nick.clone()
    }

    /// The ident as the server reported it back, empty until known.
    pub fn user(&self) -> String {
        self.inner.shared.read().unwrap().user.clone()
    }

    /// The hostname as the server reported it back, empty until known.
    pub fn host(&self) -> String {
        self.inner.shared.read().unwrap().host.clone()
    }

    /// True once the end of the MOTD has been seen.
    pub fn ready(&self) -> bool {
        self.inner.shared.read().unwrap().ready
    }

    /// True if the client has deliberately quit. Check it before doing
    /// any reconnection logic.
    pub fn has_quit(&self) -> bool {
        self.inner.shared.read().unwrap().quit
    }

    /// True while a connection is up.
    pub fn connected(&self) -> bool {
        self.inner.shared.read().unwrap().conn.is_some()
    }

    /// Whether an IRCv3 capability is enabled.
    pub fn cap_enabled(&self, cap: &str) -> bool {
        self.inner.shared.read().unwrap().cap_enabled.contains(cap)
    }

    /// Additional data the server attached to a capability in CAP LS.
    pub fn cap_data(&self, cap: &str) -> Option<String> {
        self.inner.shared.read().unwrap().cap_data.get(cap).cloned()
    }

    /// Gets an ad-hoc client value. The store is advisory and meant for
    /// handler coordination.
    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.shared.read().unwrap().values.get(key).cloned()
    }

    /// Sets an ad-hoc client value.
    pub fn set_value(&self, key: &str, value: &str) {
        self.inner
            .shared
            .write()
            .unwrap()
            .values
            .insert(key.to_string(), value.to_string());
    }

    /// True once the client has been destroyed; it accepts no further
    /// events or connections.
    pub fn destroyed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Destroys the client: disconnects, emits `client.destroy`, and
    /// cancels everything derived from the client's root token.
    pub async fn destroy(&self) {
        let _ = self.disconnect(false);
        self.emit(Event::new("client", "destroy")).await;
        self.inner.token.cancel();
    }

    // ---- Connection ----

    /// Connects to the server at `addr` (host:port), optionally over TLS.
    /// On failure an `error.connect` event is emitted and the error
    /// returned.
    pub async fn connect(&self, addr: &str, ssl: bool) -> Result<(), ClientError> {
        if self.destroyed() {
            return Err(ClientError::Destroyed);
        }
        if self.connected() {
            let _ = self.disconnect(false);
        }

        self.inner.isupport.reset();
        self.inner.shared.write().unwrap().quit = false;

        self.emit_non_blocking(Event::new("client", "connecting"));

        let skip_verification = self.inner.config.skip_ssl_verification;
        let (read_half, write_half) = match conn::dial(addr, ssl, skip_verification).await {
            Ok(halves) => halves,
            Err(err) => {
                if !self.destroyed() {
                    self.emit_non_blocking(Event::error("connect", &format!("Connect failed: {}", err)));
                }
                return Err(err.into());
            }
        };

        if self.destroyed() {
            return Err(ClientError::Destroyed);
        }

        let seq = self.inner.conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.inner.token.child_token();
        let (wire_tx, wire_rx) = mpsc::channel(64);

        self.inner.shared.write().unwrap().conn = Some(ConnHandle {
            wire_tx,
            token: token.clone(),
            seq,
        });
        let _ = self.inner.connected_tx.send(true);

        tokio::spawn(conn::writer_task(self.clone(), write_half, wire_rx, token.clone()));
        tokio::spawn(conn::reader_task(self.clone(), read_half, token, seq));

        self.emit_non_blocking(Event::new("client", "connect"));

        Ok(())
    }

    /// Disconnects from the server, or returns
    /// [`ClientError::NoConnection`]. With `mark_as_quit`,
    /// [`Client::has_quit`] reports true until the next connection.
    pub fn disconnect(&self, mark_as_quit: bool) -> Result<(), ClientError> {
        let mut shared = self.inner.shared.write().unwrap();
        if mark_as_quit {
            shared.quit = true;
        }

        match shared.conn.take() {
            Some(conn) => {
                conn.token.cancel();
                let _ = self.inner.connected_tx.send(false);
                Ok(())
            }
            None => Err(ClientError::NoConnection),
        }
    }

    /// Called by the connection reader when its connection ends for any
    /// reason. Clears the connection if it is still the current one and
    /// emits `client.disconnect`.
    pub(crate) fn connection_lost(&self, seq: u64) {
        {
            let mut shared = self.inner.shared.write().unwrap();
            if shared.conn.as_ref().map(|c| c.seq) == Some(seq) {
                shared.conn = None;
                let _ = self.inner.connected_tx.send(false);
            }
            shared.ready = false;
        }

        self.emit_non_blocking(Event::new("client", "disconnect"));
    }

    // ---- Sending ----

    /// Sends a line directly, bypassing the send queue. CRLF is appended
    /// if missing. This is meant for registration traffic (CAP, PASS,
    /// NICK, USER, PONG); for anything a user could flood with, use
    /// [`Client::send_queued`] and stay clear of a flood kick.
    ///
    /// Lines submitted here appear on the wire in submission order.
    /// Write failures surface as `error.write` events and force a
    /// disconnect.
    pub async fn send(&self, line: &str) -> Result<(), ClientError> {
        let wire_tx = {
            let shared = self.inner.shared.read().unwrap();
            match &shared.conn {
                Some(conn) => conn.wire_tx.clone(),
                None => return Err(ClientError::NoConnection),
            }
        };

        let mut line = line.to_string();
        if !line.ends_with('\n') {
            line.push_str("\r\n");
        }

        self.inner.shared.write().unwrap().last_send = Some(Instant::now());

        wire_tx.send(line).await.map_err(|_| ClientError::NoConnection)
    }

    /// Appends a line to the rate-limited send queue. If the queue is
    /// full a task is spawned to finish the enqueue, so this never blocks
    /// the caller; relative order with other spilled enqueues is not
    /// guaranteed. Lines queued while disconnected are dropped quietly so
    /// a reconnection does not drain stale traffic.
    pub fn send_queued(&self, line: &str) {
        match self.inner.sends_tx.try_send(line.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(line)) => {
                let sends_tx = self.inner.sends_tx.clone();
                tokio::spawn(async move {
                    let _ = sends_tx.send(line).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Sends a queued CTCP message with the given verb and text. A reply
    /// uses NOTICE instead of PRIVMSG.
    pub fn send_ctcp(&self, verb: &str, target_name: &str, reply: bool, text: &str) {
        let irc_verb = if reply { "NOTICE" } else { "PRIVMSG" };
        self.send_queued(&format!("{} {} :\x01{} {}\x01", irc_verb, target_name, verb, text));
    }

    /// Sends a PRIVMSG to the target, cutting the message if it gets too
    /// long.
    pub fn say(&self, target_name: &str, text: &str) {
        let overhead = self.privmsg_overhead(target_name, false);
        for cut in util::cut_message(text, overhead) {
            self.send_queued(&format!("PRIVMSG {} :{}", target_name, cut));
        }
    }

    /// Sends a CTCP ACTION to the target, cutting the message if it gets
    /// too long.
    pub fn describe(&self, target_name: &str, text: &str) {
        let overhead = self.privmsg_overhead(target_name, true);
        for cut in util::cut_message(text, overhead) {
            self.send_queued(&format!("PRIVMSG {} :\x01ACTION {}\x01", target_name, cut));
        }
    }

    /// Joins one or more channels.
    pub fn join(&self, channels: &[&str]) {
        self.send_queued(&format!("JOIN {}", channels.join(",")));
    }

    /// Parts one or more channels.
    pub fn part(&self, channels: &[&str]) {
        self.send_queued(&format!("PART {}", channels.join(",")));
    }

    /// Sends a quit message and marks the client as having quit, so that
    /// [`Client::has_quit`] returns true.
    pub fn quit(&self, reason: &str) {
        self.inner.shared.write().unwrap().quit = true;
        self.send_queued(&format!("QUIT :{}", reason));
    }

    /// The byte overhead of a PRIVMSG to the target, counting the CTCP
    /// ACTION wrapper when `action` is set. Returns a safe estimate while
    /// the client's own user/host are still unknown.
    pub fn privmsg_overhead(&self, target_name: &str, action: bool) -> usize {
        let shared = self.inner.shared.read().unwrap();
        if shared.user.is_empty() || shared.host.is_empty() {
            return 200;
        }

        util::message_overhead(&shared.nick, &shared.user, &shared.host, target_name, action)
    }

    // ---- Events ----

    /// Sends an event through the client's event loop, waiting for an
    /// inbox slot if it is full. The returned token fires when the
    /// dispatcher has finished the event, or when the client is
    /// destroyed.
    pub async fn emit(&self, mut event: Event) -> CancellationToken {
        let token = self.inner.token.child_token();
        event.set_token(token.clone());

        if self.destroyed() {
            token.cancel();
            return token;
        }

        if self.inner.events_tx.send(event).await.is_err() {
            token.cancel();
        }

        token
    }

    /// Like [`Client::emit`], but spawns a task to finish the enqueue if
    /// the inbox is full, so it may be called from handlers without ever
    /// blocking. Spilled emissions are not ordered relative to other
    /// concurrent non-blocking emissions.
    pub fn emit_non_blocking(&self, mut event: Event) -> CancellationToken {
        let token = self.inner.token.child_token();
        event.set_token(token.clone());

        if self.destroyed() {
            token.cancel();
            return token;
        }

        match self.inner.events_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let events_tx = self.inner.events_tx.clone();
                tokio::spawn(async move {
                    let _ = events_tx.send(event).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => token.cancel(),
        }

        token
    }

    /// Emits an event and waits until the dispatcher has finished it.
    /// Dropping the returned future (e.g. from a `select!`) is the
    /// caller-side cancellation.
    pub async fn emit_sync(&self, event: Event) {
        let token = self.emit(event).await;
        token.cancelled().await;
    }

    /// Emits an input event parsed from the line, directed at the given
    /// target, or at the status target when none is given. A stale target
    /// produces an `error.invalid_target` event instead.
    pub async fn emit_input(&self, line: &str, target: Option<&Target>) -> CancellationToken {
        let mut event = parse::parse_input(line);

        match target {
            Some(target) => {
                if self.target_by_id(target.id()).is_none() {
                    self.emit_non_blocking(Event::error("invalid_target", "Target does not exist."));

                    let token = self.inner.token.child_token();
                    token.cancel();
                    return token;
                }

                event.attach_target(target.clone());
            }
            None => event.attach_target(self.status()),
        }

        self.emit(event).await
    }

    // ---- Targets ----

    /// The client's status target.
    pub fn status(&self) -> Target {
        Target::Status(self.inner.status.clone())
    }

    /// Gets a target by kind and (case-insensitive) name.
    pub fn target(&self, kind: &str, name: &str) -> Option<Target> {
        let shared = self.inner.shared.read().unwrap();
        shared
            .targets
            .iter()
            .find(|t| t.kind() == kind && t.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Gets a target by ID.
    pub fn target_by_id(&self, id: &str) -> Option<Target> {
        let shared = self.inner.shared.read().unwrap();
        shared.targets.iter().find(|t| t.id() == id).cloned()
    }

    /// Gets all targets of the given kinds, or all of them with no kinds
    /// given.
    pub fn targets(&self, kinds: &[&str]) -> Vec<Target> {
        let shared = self.inner.shared.read().unwrap();
        if kinds.is_empty() {
            return shared.targets.clone();
        }

        shared
            .targets
            .iter()
            .filter(|t| kinds.contains(&t.kind()))
            .cloned()
            .collect()
    }

    /// Shorthand for getting a channel target.
    pub fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        match self.target("channel", name) {
            Some(Target::Channel(channel)) => Some(channel),
            _ => None,
        }
    }

    /// All channel targets.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.targets(&["channel"])
            .into_iter()
            .filter_map(|t| match t {
                Target::Channel(channel) => Some(channel),
                _ => None,
            })
            .collect()
    }

    /// Shorthand for getting a query target by the remote nick.
    pub fn query(&self, name: &str) -> Option<Arc<Query>> {
        match self.target("query", name) {
            Some(Target::Query(query)) => Some(query),
            _ => None,
        }
    }

    /// Adds a target to the client.
    pub fn add_target(&self, target: Target) -> Result<(), ClientError> {
        {
            let mut shared = self.inner.shared.write().unwrap();
            for existing in &shared.targets {
                if existing.id() == target.id() {
                    return Err(ClientError::TargetAlreadyAdded);
                }
                if existing.kind() == target.kind() && existing.name().eq_ignore_ascii_case(&target.name()) {
                    return Err(ClientError::TargetConflict);
                }
            }

            shared.targets.push(target.clone());
        }

        let mut event = Event::new("hook", "add_target");
        event.args = vec![target.id().to_string(), target.kind().to_string(), target.name()];
        event.attach_target(target);
        self.emit_non_blocking(event);

        Ok(())
    }

    /// Removes a target from the client and returns its ID. A channel
    /// that has not been parted yet is parted on the way out.
    pub fn remove_target(&self, target: &Target) -> Result<String, ClientError> {
        if target.id() == self.inner.status.id() {
            return Err(ClientError::TargetIsStatus);
        }

        let removed = {
            let mut shared = self.inner.shared.write().unwrap();
            match shared.targets.iter().position(|t| t.id() == target.id()) {
                Some(pos) => shared.targets.remove(pos),
                None => return Err(ClientError::TargetNotFound),
            }
        };

        let mut event = Event::new("hook", "remove_target");
        event.args = vec![removed.id().to_string(), removed.kind().to_string(), removed.name()];
        self.emit_non_blocking(event);

        if let Target::Channel(channel) = &removed {
            if !channel.parted() {
                self.send_queued(&format!("PART {}", channel.name()));
            }
        }

        Ok(removed.id().to_string())
    }

    /// Checks each channel to find user info about a nick.
    pub fn find_user(&self, nick: &str) -> Option<User> {
        self.channels()
            .into_iter()
            .find_map(|channel| channel.userlist().user(nick))
    }

    /// A serializable snapshot of the client's state.
    pub fn state(&self) -> ClientState {
        let shared = self.inner.shared.read().unwrap();

        let mut caps: Vec<String> = shared.cap_enabled.iter().cloned().collect();
        caps.sort();

        ClientState {
            id: self.inner.id.clone(),
            nick: shared.nick.clone(),
            user: shared.user.clone(),
            host: shared.host.clone(),
            connected: shared.conn.is_some(),
            ready: shared.ready,
            quit: shared.quit,
            isupport: self.inner.isupport.state(),
            caps,
            targets: shared.targets.iter().map(|t| t.state()).collect(),
        }
    }

    /// Registers a handler that runs for every event after the built-in
    /// protocol logic, in registration order.
    pub fn add_handler(&self, handler: impl Fn(&mut Event, &Client) + Send + Sync + 'static) {
        self.inner.shared.write().unwrap().handlers.push(Arc::new(handler));
    }

    pub(crate) fn shared(&self) -> &RwLock<Shared> {
        &self.inner.shared
    }

    pub(crate) fn root_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

/// The send-queue worker: pops queued lines and writes them at the
/// configured rate, refreshing its credit once per wall-clock second.
/// On disconnect the queue is flushed, so a reconnection does not drain
/// stale traffic.
async fn send_queue_task(
    client: Client,
    mut sends_rx: mpsc::Receiver<String>,
    mut connected_rx: watch::Receiver<bool>,
) {
    let rate = client.inner.config.send_rate.max(1) as i64;
    let mut last_refresh = Instant::now();
    let mut credits = rate;

    loop {
        let line = tokio::select! {
            _ = client.inner.token.cancelled() => break,

            changed = connected_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*connected_rx.borrow_and_update() {
                    let mut dropped = 0;
                    while sends_rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                    if dropped > 0 {
                        debug!(dropped, "flushed queued lines on disconnect");
                    }
                }
                continue;
            }

            maybe = sends_rx.recv() => match maybe {
                Some(line) => line,
                None => break,
            },
        };

        let now = Instant::now();
        let delta = now.duration_since(last_refresh);

        if delta < Duration::from_secs(1) {
            credits -= 1;
            if credits <= 0 {
                tokio::time::sleep(Duration::from_secs(1) - delta).await;
                last_refresh = now;
                credits = rate - 1;
            }
        } else {
            last_refresh = now;
            credits = rate - 1;
        }

        // Failed sends are discarded quietly so a backlog is not thrown
        // at the next connection.
        if client.send(&line).await.is_err() {
            debug!("dropped queued line without a connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_sync_reaches_handler() {
        let client = Client::new(Config::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.add_handler(move |event, _client| {
            let _ = tx.send(event.name());
        });

        client.emit_sync(Event::new("test", "thing")).await;

        // Lifecycle events came through first; ours must be among them.
        let mut seen = Vec::new();
        while let Ok(name) = rx.try_recv() {
            seen.push(name);
        }
        assert!(seen.contains(&"test.thing".to_string()), "seen: {:?}", seen);

        client.destroy().await;
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let client = Client::new(Config::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let tx1 = tx.clone();
        client.add_handler(move |event, _client| {
            if event.kind() == "test" {
                let _ = tx1.send(1);
            }
        });
        let tx2 = tx;
        client.add_handler(move |event, _client| {
            if event.kind() == "test" {
                let _ = tx2.send(2);
            }
        });

        client.emit_sync(Event::new("test", "order")).await;

        assert_eq!(rx.try_recv().ok(), Some(1));
        assert_eq!(rx.try_recv().ok(), Some(2));

        client.destroy().await;
    }

    #[tokio::test]
    async fn test_unrouted_events_fall_back_to_status() {
        let client = Client::new(Config::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.add_handler(move |event, _client| {
            if event.kind() == "test" {
                let _ = tx.send(event.target(&[]).map(|t| t.kind()));
            }
        });

        client.emit_sync(Event::new("test", "routing")).await;
        assert_eq!(rx.try_recv().ok(), Some(Some("status")));

        client.destroy().await;
    }

    #[tokio::test]
    async fn test_add_and_remove_target() {
        let client = Client::new(Config::default());

        let channel = Target::Channel(Arc::new(Channel::new("#Test", client.isupport())));
        client.add_target(channel.clone()).unwrap();

        assert!(matches!(
            client.add_target(channel.clone()),
            Err(ClientError::TargetAlreadyAdded)
        ));

        let conflicting = Target::Channel(Arc::new(Channel::new("#test", client.isupport())));
        assert!(matches!(
            client.add_target(conflicting),
            Err(ClientError::TargetConflict)
        ));

        assert!(matches!(
            client.remove_target(&client.status()),
            Err(ClientError::TargetIsStatus)
        ));

        let id = client.remove_target(&channel).unwrap();
        assert_eq!(id, channel.id());
        assert!(matches!(
            client.remove_target(&channel),
            Err(ClientError::TargetNotFound)
        ));

        client.destroy().await;
    }

    #[tokio::test]
    async fn test_emit_input_rejects_stale_target() {
        let client = Client::new(Config::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.add_handler(move |event, _client| {
            if event.kind() == "error" {
                let _ = tx.send(event.name());
            }
        });

        let channel = Target::Channel(Arc::new(Channel::new("#Gone", client.isupport())));
        let token = client.emit_input("hello", Some(&channel)).await;
        assert!(token.is_cancelled());

        // Flush the loop so the error event has been dispatched.
        client.emit_sync(Event::new("test", "barrier")).await;
        assert_eq!(rx.try_recv().ok(), Some("error.invalid_target".to_string()));

        client.destroy().await;
    }

    #[tokio::test]
    async fn test_values_are_advisory_storage() {
        let client = Client::new(Config::default());

        assert_eq!(client.value("ctcp.version.reply"), None);
        client.set_value("ctcp.version.reply", "slirc-client v0.1");
        assert_eq!(
            client.value("ctcp.version.reply").as_deref(),
            Some("slirc-client v0.1")
        );

        client.destroy().await;
    }

    #[tokio::test]
    async fn test_destroyed_client_accepts_nothing() {
        let client = Client::new(Config::default());
        client.destroy().await;

        assert!(client.destroyed());
        assert!(matches!(
            client.connect("127.0.0.1:1", false).await,
            Err(ClientError::Destroyed)
        ));

        let token = client.emit(Event::new("test", "late")).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_privmsg_overhead_estimate() {
        let client = Client::new(Config::default());

        // Unknown user/host falls back to a safe estimate.
        assert_eq!(client.privmsg_overhead("#Test", false), 200);

        {
            let mut shared = client.shared().write().unwrap();
            shared.nick = "Test768".to_string();
            shared.user = "~test".to_string();
            shared.host = "127.0.0.1".to_string();
        }

        assert_eq!(
            client.privmsg_overhead("#Test", false),
            util::message_overhead("Test768", "~test", "127.0.0.1", "#Test", false)
        );
        assert!(client.privmsg_overhead("#Test", true) > client.privmsg_overhead("#Test", false));

        client.destroy().await;
    }
}
