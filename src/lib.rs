//! # slirc-client
//!
//! An IRCv3 client library built around a single-threaded event
//! dispatcher. Server lines, user input, timers and lifecycle changes all
//! become [`Event`]s; the dispatcher runs them through the built-in
//! protocol logic, per-target handlers and any handlers you register, in
//! order, and keeps the observable state (channels, queries, userlists,
//! ISUPPORT) coherent while doing so.
//!
//! ## Features
//!
//! - Wire parsing with IRCv3 message tags and CTCP lifting
//! - CAP negotiation, SASL PLAIN, nick-collision rotation
//! - Channel userlists ordered by mode rank, driven by ISUPPORT
//! - Rate-limited send queue with a direct path for registration traffic
//! - TCP and TLS transports
//! - Serializable state snapshots for frontends
//!
//! ## Quick Start
//!
//! ```no_run
//! use slirc_client::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(Config {
//!         nick: "Tester".to_string(),
//!         ..Config::default()
//!     });
//!
//!     client.add_handler(|event, client| {
//!         if event.name() == "packet.privmsg" {
//!             client.say(event.arg(0), "I heard that.");
//!         }
//!     });
//!
//!     client.connect("irc.example.com:6697", true).await.unwrap();
//! }
//! ```

#![deny(clippy::all)]

pub mod caps;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod isupport;
pub mod list;
pub mod parse;
pub mod sasl;
pub mod state;
pub mod target;
pub mod util;

mod conn;
mod dispatch;

pub use self::client::{Client, Handler};
pub use self::config::Config;
pub use self::error::{ClientError, ParseError, Result};
pub use self::event::Event;
pub use self::isupport::{Isupport, IsupportState};
pub use self::list::{User, UserList, UserPatch};
pub use self::parse::{parse_input, parse_packet};
pub use self::sasl::SaslConfig;
pub use self::state::{ClientState, TargetState};
pub use self::target::{Channel, Query, Status, Target};
