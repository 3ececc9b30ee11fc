//! # Tether HTTP Poll Transport
//!
//! Carries an opaque, bidirectional byte stream between a controller and an
//! agent over a sequence of ordinary outbound HTTP requests. The agent never
//! holds a connection open: it polls.
//!
//! # Protocol
//!
//! ```text
//! ┌──────────┐                          ┌──────────┐
//! │  Agent   │                          │  Server  │
//! └────┬─────┘                          └────┬─────┘
//!      │                                     │
//!      │  GET <uri>          (first contact) │
//!      │ ──────────────────────────────────► │
//!      │  200 + control packet               │
//!      │  (may carry `core_patch_url`)       │
//!      │ ◄────────────────────────────────── │
//!      │                                     │
//!      │  POST <uri'>        (egress queued) │
//!      │  Content-Type: octet-stream         │
//!      │ ──────────────────────────────────► │
//!      │  200 + ingress bytes (maybe empty)  │
//!      │ ◄────────────────────────────────── │
//!      │                                     │
//!      │  GET <uri'>         (nothing queued)│
//!      │ ──────────────────────────────────► │
//!      │  200 (empty) / error / no response  │
//!      │ ◄────────────────────────────────── │
//! ```
//!
//! At most one request is outstanding at any time. The poll cadence drops to
//! [`MIN_POLL_INTERVAL`](backoff::MIN_POLL_INTERVAL) while data flows and
//! walks back up towards [`MAX_POLL_INTERVAL`](backoff::MAX_POLL_INTERVAL)
//! while the channel is quiet.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   HttpPollTransport (owner)                 │
//! │                                                             │
//! │  egress(bytes) ──► [unbounded channel] ──┐                  │
//! │                                          ▼                  │
//! │  ┌───────────────── driver task ──────────────────────────┐ │
//! │  │  tick ──► PollSession::on_tick ──► HttpClient::request │ │
//! │  │  done ──► PollSession::on_completion ──► events        │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! │                                          │                  │
//! │  events: Reachable / Unreachable / Ingress ◄┘               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`session::PollSession`] is the sans-io state machine; [`transport`]
//! drives it on a tokio task.

pub mod backoff;
pub mod config;
pub mod control;
pub mod error;
pub mod http_client;
pub mod session;
pub mod transport;
pub mod uri;

/// URI schemes served by this transport.
pub const SCHEMES: [&str; 2] = ["http", "https"];

/// Content type of every POST body.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Whether a transport URI (or configuration string) names a scheme this
/// transport serves.
///
/// The owning registry multiplexes transport types by scheme and uses this
/// to pick the HTTP poll transport.
#[must_use]
pub fn handles_scheme(uri: &str) -> bool {
    uri::TargetUri::new(uri).is_ok_and(|uri| {
        uri.scheme()
            .is_some_and(|scheme| SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)))
    })
}
