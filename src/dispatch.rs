//! The event dispatcher and built-in protocol logic.
//!
//! One long-lived task owns the event inbox and drives every state
//! transition: per-event lifecycle (server-time, pre-attached targets,
//! protocol logic, status fallback, user handlers, input synthesis) and
//! the 30-second tick that feeds the keepalive.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

use crate::caps;
use crate::client::Client;
use crate::event::Event;
use crate::list::User;
use crate::sasl;
use crate::target::{Channel, Query, Target};
use crate::util;

const TICK_INTERVAL: Duration = Duration::from_secs(30);
const PING_AFTER_IDLE: Duration = Duration::from_secs(120);

/// The dispatcher loop. Consumes the inbox until the client is destroyed,
/// injecting a `hook.tick` event every 30 seconds.
pub(crate) async fn run(client: Client, mut events_rx: mpsc::Receiver<Event>) {
    let token = client.root_token();
    let start = tokio::time::Instant::now() + TICK_INTERVAL;
    let mut tick = tokio::time::interval_at(start, TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            maybe = events_rx.recv() => match maybe {
                Some(mut event) => handle_event(&client, &mut event).await,
                None => break,
            },

            _ = tick.tick() => {
                let mut event = Event::new("hook", "tick");
                event.set_token(token.child_token());
                handle_event(&client, &mut event).await;
            }

            _ = token.cancelled() => break,
        }
    }

    debug!(id = client.id().as_str(), "dispatcher finished");
    let _ = client.disconnect(false);
}

/// Runs one event through the full pipeline.
pub(crate) async fn handle_event(client: &Client, event: &mut Event) {
    // Only overwrite the timestamp from `server-time` when asked to.
    // Frontends can still read the tag themselves.
    if client.config().use_server_time {
        if let Some(time_tag) = event.tags.get("time") {
            if let Ok(server_time) = DateTime::parse_from_rfc3339(time_tag) {
                let server_time = server_time.with_timezone(&Utc);
                if server_time.year() > 2000 {
                    event.time = server_time;
                }
            }
        }
    }

    // Targets attached by the producer (input, mostly) get the event
    // before anything else.
    for target in event.targets().to_vec() {
        target.handle(event, client);
    }

    protocol(client, event).await;

    // Anything unrouted belongs to the status target.
    if !event.has_targets() {
        let status = client.status();
        event.attach_target(status.clone());
        status.handle(event, client);
    }

    let handlers = client.shared().read().unwrap().handlers.clone();
    for handler in handlers {
        (*handler)(event, client);
    }

    // Turn an unhandled input into a raw command.
    if event.kind() == "input" && !event.default_prevented() {
        let mut line = event.verb().to_uppercase();
        if !event.text.is_empty() {
            line.push(' ');
            line.push_str(&event.text);
        }
        client.send_queued(&line);
    }

    event.finish();
}

/// The built-in protocol logic, keyed by event name.
async fn protocol(client: &Client, event: &mut Event) {
    let mut sent_cap_end = false;
    let name = event.name();

    match name.as_str() {
        // Ping Pong
        "hook.tick" => {
            let last_send = client.shared().read().unwrap().last_send;
            let idle = last_send.map(|at| at.elapsed()).unwrap_or(PING_AFTER_IDLE);

            if idle >= PING_AFTER_IDLE {
                let nonce: u64 = rand::thread_rng().gen();
                let _ = client.send(&format!("PING :{:x}", nonce)).await;
            }
        }

        "packet.ping" => {
            let mut message = String::from("PONG");
            for arg in &event.args {
                message.push(' ');
                message.push_str(arg);
            }
            if !event.text.is_empty() {
                message.push_str(" :");
                message.push_str(&event.text);
            }

            let _ = client.send(&message).await;
        }

        // Client registration
        "client.connect" => {
            let nick = {
                let mut shared = client.shared().write().unwrap();

                // Reuse the previous nick across reconnects.
                let nick = if shared.nick.is_empty() {
                    client.config().nick.clone()
                } else {
                    shared.nick.clone()
                };

                shared.nick.clear();
                shared.user.clear();
                shared.host.clear();
                shared.cap_enabled.clear();
                shared.cap_data.clear();
                shared.caps_requested.clear();
                shared.sasl_method = None;
                shared.nick_change_locked = false;
                shared.primed_nick_change = None;

                nick
            };

            let _ = client.send("CAP LS 302").await;

            if let Some(password) = &client.config().password {
                let _ = client.send(&format!("PASS :{}", password)).await;
            }

            let _ = client.send(&format!("NICK {}", nick)).await;
            let _ = client
                .send(&format!("USER {} 8 * :{}", client.config().user, client.config().real_name))
                .await;
        }

        // Welcome message
        "packet.001" => {
            let nick = event.arg(0).to_string();
            client.shared().write().unwrap().nick = nick.clone();

            // A WHO on ourselves gathers the user/host needed for precise
            // message cutting.
            let _ = client.send(&format!("WHO {}", nick)).await;
        }

        // Nick rotation
        "packet.431" | "packet.432" | "packet.433" | "packet.436" => {
            // Once registered, a rejection concerns a manual change; leave
            // it to the user.
            if !client.nick().is_empty() {
                return;
            }

            let rejected = event.arg(1);
            let config = client.config();

            let mut new_nick = String::new();
            let mut prev = config.nick.as_str();
            for alternative in &config.alternatives {
                if rejected == prev {
                    new_nick = alternative.clone();
                    break;
                }
                prev = alternative;
            }

            if new_nick.is_empty() {
                let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
                new_nick = format!("{}{:05}", config.nick, suffix);
            }

            let locked = client.shared().read().unwrap().nick_change_locked;
            if locked {
                // CAP negotiation is still in flight; replay at CAP END.
                client.shared().write().unwrap().primed_nick_change = Some(new_nick);
            } else {
                let _ = client.send(&format!("NICK {}", new_nick)).await;
            }
        }

        "packet.nick" => {
            let nick = event.nick.clone();
            handle_in_targets(client, event, &nick);

            if nick == client.nick() {
                client.shared().write().unwrap().nick = event.arg(0).to_string();
            }
        }

        // ISUPPORT
        "packet.005" => {
            let isupport = client.isupport();
            for token in event.args.iter().skip(1) {
                match token.split_once('=') {
                    Some((key, value)) => isupport.set(key, value),
                    None => isupport.set(token, ""),
                }
            }
        }

        // Capability negotiation
        "packet.cap" => {
            handle_cap(client, event, &mut sent_cap_end).await;
        }

        // SASL
        "packet.authenticate" => {
            if event.arg(0) != "+" {
                return;
            }

            let method = client.shared().read().unwrap().sasl_method.clone();
            if method.as_deref() == Some("PLAIN") {
                if let Some(sasl_config) = &client.config().sasl {
                    let payload = sasl::encode_plain(sasl_config);
                    let _ = client.send(&format!("AUTHENTICATE {}", payload)).await;
                }
            }
        }

        // SASL failed
        "packet.904" => {
            let _ = client.send("AUTHENTICATE *").await;
            client.shared().write().unwrap().sasl_method = None;
        }

        // SASL ended; kick the nick rotation back into motion if the
        // server held registration for it.
        "packet.903" | "packet.906" => {
            if client.nick().is_empty() {
                let _ = client.send(&format!("NICK {}", client.config().nick)).await;
            }
        }

        // WHO reply, for user/host detection
        "packet.352" => {
            // Args: <client> <channel> <user> <host> <server> <nick> ...
            let nick = event.arg(5).to_string();
            let user = event.arg(2).to_string();
            let host = event.arg(3).to_string();

            if nick == client.nick() {
                let mut shared = client.shared().write().unwrap();
                shared.user = user;
                shared.host = host;
            }
        }

        "packet.chghost" => {
            if event.nick == client.nick() {
                let mut shared = client.shared().write().unwrap();
                shared.user = event.arg(0).to_string();
                shared.host = event.arg(1).to_string();
            }

            // Relevant in every channel and query where the user resides.
            let nick = event.nick.clone();
            handle_in_targets(client, event, &nick);
        }

        // Channel lifecycle
        "packet.join" => {
            let channel_name = event.arg(0).to_string();

            let target = if event.nick == client.nick() {
                let channel = Arc::new(Channel::new(&channel_name, client.isupport()));
                let target = Target::Channel(channel);
                let _ = client.add_target(target.clone());
                Some(target)
            } else {
                client.channel(&channel_name).map(Target::Channel)
            };

            if let Some(target) = target {
                handle_in_target(client, event, target);
            }
        }

        "packet.part" => {
            let channel = match client.channel(event.arg(0)) {
                Some(channel) => channel,
                None => return,
            };

            if event.nick == client.nick() {
                channel.set_parted();
                let _ = client.remove_target(&Target::Channel(channel));
            } else {
                handle_in_target(client, event, Target::Channel(channel));
            }
        }

        "packet.kick" => {
            let channel = match client.channel(event.arg(0)) {
                Some(channel) => channel,
                None => return,
            };

            if event.arg(1) == client.nick() {
                channel.set_parted();
                let _ = client.remove_target(&Target::Channel(channel));
            } else {
                handle_in_target(client, event, Target::Channel(channel));
            }
        }

        "packet.quit" => {
            let nick = event.nick.clone();
            handle_in_targets(client, event, &nick);
        }

        // NAMES
        "packet.353" => {
            if let Some(channel) = client.channel(event.arg(2)) {
                handle_in_target(client, event, Target::Channel(channel));
            }
        }

        // End of NAMES
        "packet.366" => {
            if let Some(channel) = client.channel(event.arg(1)) {
                handle_in_target(client, event, Target::Channel(channel));
            }
        }

        "packet.invite" => {
            let invitee = event.arg(0).to_string();
            let channel_name = event.arg(1).to_string();
            let channel = client.channel(&channel_name);

            if client.config().auto_join_invites && channel.is_none() && invitee == client.nick() {
                client.join(&[&channel_name]);
            }

            // Route into the channel for rendering invite-notify.
            if let Some(channel) = channel {
                handle_in_target(client, event, Target::Channel(channel));
            }
        }

        "packet.mode" => {
            let target_name = event.arg(0).to_string();
            if client.isupport().is_channel(&target_name) {
                if let Some(channel) = client.channel(&target_name) {
                    handle_in_target(client, event, Target::Channel(channel));
                }
            }
        }

        // Message routing
        "packet.privmsg" | "ctcp.action" => {
            let target_name = event.arg(0).to_string();

            let target = if target_name == client.nick() {
                match client.query(&event.nick) {
                    Some(query) => Target::Query(query),
                    None => {
                        let mut user = User {
                            nick: event.nick.clone(),
                            user: event.user.clone(),
                            host: event.host.clone(),
                            ..User::default()
                        };
                        if let Some(account) = event.tags.get("account") {
                            user.account = account.clone();
                        }

                        let query = Arc::new(Query::new(user));
                        let target = Target::Query(query.clone());
                        let _ = client.add_target(target.clone());
                        event.render_tags.insert("spawned".to_string(), query.id().to_string());

                        target
                    }
                }
            } else {
                match client.channel(&target_name) {
                    Some(channel) => {
                        if let Some(user) = channel.userlist().user(&event.nick) {
                            event
                                .render_tags
                                .insert("prefixedNick".to_string(), user.prefixed_nick);
                        }
                        Target::Channel(channel)
                    }
                    None => client.status(),
                }
            };

            handle_in_target(client, event, target);
        }

        "packet.notice" => {
            let target_name = event.arg(0).to_string();
            let isupport = client.isupport();

            if isupport.is_channel(&target_name) {
                if let Some(channel) = client.channel(&target_name) {
                    if let Some(user) = channel.userlist().user(&event.nick) {
                        event
                            .render_tags
                            .insert("prefixedNick".to_string(), user.prefixed_nick);
                    }
                    handle_in_target(client, event, Target::Channel(channel));
                }
            } else {
                // Server notices sometimes mention the channel they are
                // about; route them there.
                let tokens: Vec<String> = event.text.split_whitespace().map(str::to_string).collect();
                for token in tokens {
                    if !isupport.is_channel(&token) {
                        continue;
                    }
                    if let Some(channel) = client.channel(&token) {
                        if let Some(user) = channel.userlist().user(&event.nick) {
                            event
                                .render_tags
                                .insert("prefixedNick".to_string(), user.prefixed_nick);
                        }
                        handle_in_target(client, event, Target::Channel(channel));
                        break;
                    }
                }
            }

            // Otherwise it belongs to the status target, which the
            // pipeline attaches on its own.
        }

        // account-notify / away-notify
        "packet.account" | "packet.away" => {
            let nick = event.nick.clone();
            handle_in_targets(client, event, &nick);
        }

        // End of MOTD: mark ready, and rejoin on reconnects.
        "packet.376" | "packet.422" => {
            let channels = client.targets(&["channel"]);
            if !channels.is_empty() {
                let names: Vec<String> = channels.iter().map(|t| t.name()).collect();
                let _ = client.send(&format!("JOIN {}", names.join(","))).await;

                let mut rejoin = Event::new("info", "rejoin");
                for channel in &channels {
                    rejoin.attach_target(channel.clone());
                }
                client.emit_non_blocking(rejoin);
            }

            client.shared().write().unwrap().ready = true;
            client.emit_non_blocking(Event::new("hook", "ready"));
        }

        // Actions typed by the user; mirrored locally when the server
        // will not echo them back.
        "input.me" | "input.action" => {
            event.prevent_default();

            if event.text.is_empty() {
                emit_input_error(client, "Usage: /me <text...>", "usage_me");
                return;
            }

            let target = match event.target(&["query", "channel"]) {
                Some(target) => target.clone(),
                None => {
                    emit_input_error(client, "Target is not a channel or query", "target_kind");
                    return;
                }
            };

            let text = event.text.clone();
            send_action(client, &target.name(), &text, Some(target)).await;
        }

        "input.describe" => {
            event.prevent_default();

            let (target_name, text) = util::parse_arg_and_text(&event.text);
            if target_name.is_empty() || text.is_empty() {
                emit_input_error(client, "Usage: /describe <target> <text...>", "usage_describe");
                return;
            }

            let target = client
                .target("channel", target_name)
                .or_else(|| client.target("query", target_name));

            let (target_name, text) = (target_name.to_string(), text.to_string());
            send_action(client, &target_name, &text, target).await;
        }

        _ => {}
    }

    if sent_cap_end {
        // Negotiation over; release the nick lock and replay a change
        // that was primed while it was held.
        let primed = {
            let mut shared = client.shared().write().unwrap();
            shared.nick_change_locked = false;
            shared.primed_nick_change.take()
        };

        if let Some(nick) = primed {
            let _ = client.send(&format!("NICK {}", nick)).await;
        }
    }
}

/// CAP subcommand handling. Split out because it dwarfs the other arms.
async fn handle_cap(client: &Client, event: &mut Event, sent_cap_end: &mut bool) {
    let subcommand = event.arg(1).to_string();
    let tokens: Vec<String> = event
        .text
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    match subcommand.as_str() {
        "LS" => {
            {
                let mut shared = client.shared().write().unwrap();

                // Hold nick changes back until CAP END; rejections that
                // come in meanwhile are replayed then.
                shared.nick_change_locked = true;

                for token in &tokens {
                    let (key, data) = caps::split_cap_token(token);
                    if key.is_empty() {
                        continue;
                    }

                    if let Some(data) = data {
                        shared.cap_data.insert(key.to_string(), data.to_string());
                    }

                    if caps::is_supported(key) {
                        shared.caps_requested.push(key.to_string());
                    }
                }
            }

            // A `*` in the third argument means more LS lines follow.
            let more = event.args.len() >= 3 && event.args[2] == "*";
            if !more {
                let requested = client.shared().read().unwrap().caps_requested.join(" ");
                if requested.is_empty() {
                    *sent_cap_end = true;
                    let _ = client.send("CAP END").await;
                } else {
                    let _ = client.send(&format!("CAP REQ :{}", requested)).await;
                }
            }
        }

        "ACK" => {
            for token in &tokens {
                client.shared().write().unwrap().cap_enabled.insert(token.clone());

                match token.as_str() {
                    "sasl" => {
                        if client.config().sasl.is_none() {
                            continue;
                        }

                        // The LS data lists the mechanisms; no data at all
                        // means the server is old enough to take anything.
                        let data = client.cap_data("sasl").unwrap_or_default();
                        let plain_offered =
                            data.is_empty() || data.split(',').any(|mechanism| mechanism == "PLAIN");

                        if plain_offered {
                            let _ = client.send("AUTHENTICATE PLAIN").await;
                            client.shared().write().unwrap().sasl_method = Some("PLAIN".to_string());
                        }
                    }

                    "draft/languages" => {
                        if client.config().languages.is_empty() {
                            continue;
                        }

                        // draft/languages=15,en,~bs,~de,~fr-FR,...
                        let data = client.cap_data("draft/languages").unwrap_or_default();
                        let mut parts = data.split(',');
                        let max_count = match parts.next().and_then(|count| count.parse::<usize>().ok()) {
                            Some(count) => count,
                            None => continue,
                        };

                        let offered: Vec<&str> =
                            parts.map(|lang| lang.strip_prefix('~').unwrap_or(lang)).collect();

                        let mut languages = Vec::with_capacity(max_count);
                        'outer: for language in &client.config().languages {
                            for offer in &offered {
                                if language.eq_ignore_ascii_case(offer) {
                                    languages.push(language.clone());
                                    if languages.len() >= max_count {
                                        break 'outer;
                                    }
                                    break;
                                }
                            }
                        }

                        if !languages.is_empty() {
                            let _ = client.send(&format!("LANGUAGE {}", languages.join(" "))).await;
                        }
                    }

                    _ => {}
                }
            }

            if !client.ready() {
                *sent_cap_end = true;
                let _ = client.send("CAP END").await;
            }
        }

        "NAK" => {
            {
                let mut shared = client.shared().write().unwrap();
                for token in &tokens {
                    if let Some(pos) = shared.caps_requested.iter().position(|cap| cap == token) {
                        shared.caps_requested.remove(pos);
                    }
                }
            }

            let requested = client.shared().read().unwrap().caps_requested.join(" ");
            let _ = client.send(&format!("CAP REQ :{}", requested)).await;
        }

        "NEW" => {
            let requests: Vec<&str> = tokens
                .iter()
                .map(|token| caps::split_cap_token(token).0)
                .filter(|key| caps::is_supported(key))
                .collect();

            if !requests.is_empty() {
                let _ = client.send(&format!("CAP REQ :{}", requests.join(" "))).await;
            }
        }

        "DEL" => {
            let mut shared = client.shared().write().unwrap();
            for token in &tokens {
                shared.cap_enabled.remove(token);
            }
        }

        _ => {}
    }
}

/// Sends a CTCP ACTION in cut pieces, and synthesizes a local
/// `echo.action` event when the server will not echo it back.
async fn send_action(client: &Client, target_name: &str, text: &str, target: Option<Target>) {
    let overhead = client.privmsg_overhead(target_name, true);
    for cut in util::cut_message(text, overhead) {
        client.send_queued(&format!("PRIVMSG {} :\x01ACTION {}\x01", target_name, cut));
    }

    if !client.cap_enabled("echo-message") {
        let mut echo = Event::new("echo", "action");
        {
            let shared = client.shared().read().unwrap();
            echo.nick = shared.nick.clone();
            echo.user = shared.user.clone();
            echo.host = shared.host.clone();
        }
        echo.args = vec![target_name.to_string()];
        echo.text = text.to_string();
        if let Some(target) = target {
            echo.attach_target(target);
        }

        client.emit_non_blocking(echo);
    }
}

fn emit_input_error(client: &Client, text: &str, i18n_key: &str) {
    let mut error = Event::error("input", text);
    error.tags.insert("i18n_key".to_string(), i18n_key.to_string());
    client.emit_non_blocking(error);
}

/// Routes the event into every target where `nick` is present: channels
/// whose userlist has them, queries with them on the other side, and the
/// status target when the subject is the client itself.
fn handle_in_targets(client: &Client, event: &mut Event, nick: &str) {
    for target in client.targets(&[]) {
        match &target {
            Target::Channel(channel) => {
                if !nick.is_empty() && channel.userlist().user(nick).is_none() {
                    continue;
                }

                target.handle(event, client);
                event.attach_target(target.clone());
            }
            Target::Query(query) => {
                if query.user().nick.eq_ignore_ascii_case(nick) {
                    target.handle(event, client);
                    event.attach_target(target.clone());
                }
            }
            Target::Status(_) => {
                if !event.nick.is_empty() && client.nick() == event.nick {
                    target.handle(event, client);
                    event.attach_target(target.clone());
                }
            }
        }
    }
}

/// Attaches the target to the event and runs its handler.
fn handle_in_target(client: &Client, event: &mut Event, target: Target) {
    event.attach_target(target.clone());
    target.handle(event, client);
}
