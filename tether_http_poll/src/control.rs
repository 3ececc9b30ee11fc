//! First-contact control packets.
//!
//! The body of the first `200` response is not ingress data: it is a control
//! packet. The transport does not know the packet wire format; the owner
//! supplies a [`ControlDecoder`] that turns the body into a keyed field
//! record. Only one directive is understood here: a `method` of
//! [`PATCH_URL_METHOD`] together with a target URL tells the session to move
//! to a new path on the same origin.
//!
//! Anything else, including a body that fails to decode, is
//! [`FirstContact::Ignored`]. Ignoring is the policy, not an error: polling
//! carries on at the current target.

use std::collections::BTreeMap;

/// Method value requesting a target path change.
pub const PATCH_URL_METHOD: &str = "core_patch_url";

/// Fields of a control packet the transport reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlField {
    /// The request method name.
    Method,

    /// The replacement target path.
    TargetUrl,
}

/// A decoded control packet with typed field lookup.
pub trait ControlPacket {
    /// Look up a string field.
    fn get_str(&self, field: ControlField) -> Option<&str>;
}

impl ControlPacket for BTreeMap<ControlField, String> {
    fn get_str(&self, field: ControlField) -> Option<&str> {
        self.get(&field).map(String::as_str)
    }
}

/// Decodes response bodies into control packets.
pub trait ControlDecoder: Send + Sync + 'static {
    /// The decoded packet.
    type Packet: ControlPacket;

    /// The decode error.
    type Error: core::error::Error;

    /// Decode a complete response body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` is not a well-formed packet.
    fn decode(&self, body: &[u8]) -> Result<Self::Packet, Self::Error>;
}

/// What the first response asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstContact {
    /// Move to this path on the current origin.
    Migrate {
        /// The server-supplied path.
        path: String,
    },

    /// Nothing to do.
    Ignored(IgnoreReason),
}

/// Why a first-contact packet did not trigger a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The body did not decode.
    Undecodable(String),

    /// The method field was absent or named another method.
    OtherMethod(Option<String>),

    /// The method asked for a patch but carried no target.
    MissingTarget,
}

/// Interpret a first-contact response body.
pub fn interpret<D: ControlDecoder>(decoder: &D, body: &[u8]) -> FirstContact {
    let packet = match decoder.decode(body) {
        Ok(packet) => packet,
        Err(e) => return FirstContact::Ignored(IgnoreReason::Undecodable(e.to_string())),
    };

    match packet.get_str(ControlField::Method) {
        Some(PATCH_URL_METHOD) => {}
        other => {
            return FirstContact::Ignored(IgnoreReason::OtherMethod(other.map(str::to_string)));
        }
    }

    match packet.get_str(ControlField::TargetUrl) {
        Some(path) => FirstContact::Migrate {
            path: path.to_string(),
        },
        None => FirstContact::Ignored(IgnoreReason::MissingTarget),
    }
}

/// Decoders for exercising the transport without a real packet format.
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils {
    use std::collections::BTreeMap;

    use super::{ControlDecoder, ControlField};

    /// UTF-8 `key=value` lines. Reads the keys `method` and `url`; other keys
    /// are skipped.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct LineDecoder;

    /// The body was not UTF-8 `key=value` lines.
    #[derive(Debug, Clone, Copy, thiserror::Error)]
    #[error("not a control packet")]
    pub struct NotAPacket;

    impl ControlDecoder for LineDecoder {
        type Packet = BTreeMap<ControlField, String>;
        type Error = NotAPacket;

        fn decode(&self, body: &[u8]) -> Result<Self::Packet, Self::Error> {
            let text = core::str::from_utf8(body).map_err(|_| NotAPacket)?;
            let mut packet = BTreeMap::new();
            for line in text.lines().filter(|l| !l.is_empty()) {
                let (key, value) = line.split_once('=').ok_or(NotAPacket)?;
                let field = match key {
                    "method" => ControlField::Method,
                    "url" => ControlField::TargetUrl,
                    _ => continue,
                };
                packet.insert(field, value.to_string());
            }
            Ok(packet)
        }
    }
}
