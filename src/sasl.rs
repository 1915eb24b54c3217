//! SASL authentication helpers.
//!
//! Only the PLAIN mechanism is implemented; it is negotiated through the
//! `sasl` capability and carried over `AUTHENTICATE` commands.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Credentials for the PLAIN mechanism.
///
/// Deliberately not serializable; snapshots must never carry passwords.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaslConfig {
    /// Authentication identity (who is authenticating).
    pub authentication_identity: String,
    /// Authorization identity (who to act as). Usually empty.
    pub authorization_identity: String,
    /// Password.
    pub password: String,
}

/// Encode PLAIN credentials for an `AUTHENTICATE` payload.
///
/// The fields are NUL-joined as `authcid NUL authzid NUL password` and
/// base64-encoded.
pub fn encode_plain(config: &SaslConfig) -> String {
    let mut payload = Vec::with_capacity(
        config.authentication_identity.len()
            + config.authorization_identity.len()
            + config.password.len()
            + 2,
    );
    payload.extend_from_slice(config.authentication_identity.as_bytes());
    payload.push(0x00);
    payload.extend_from_slice(config.authorization_identity.as_bytes());
    payload.push(0x00);
    payload.extend_from_slice(config.password.as_bytes());

    BASE64.encode(payload)
}
