//! The poll-transport session state machine.
//!
//! [`PollSession`] owns everything a transport needs between requests and
//! reacts to exactly two events:
//!
//! - [`on_tick`](PollSession::on_tick): the poll timer fired. Dispatch one
//!   request unless one is already outstanding, and say when to tick next.
//! - [`on_completion`](PollSession::on_completion): the outstanding request
//!   finished. Classify the response, hand back any ingress data, apply the
//!   first-contact migration, and adjust the poll interval.
//!
//! The session does no I/O and holds no timer. The [`transport`] driver
//! feeds it events and carries out what it returns.
//!
//! ```text
//!            on_tick                          on_completion
//!   ┌──────┐ ───────► ┌───────────┐ ─────────────────────────► ┌──────┐
//!   │ idle │          │ in flight │                            │ idle │
//!   └──────┘          └───────────┘ ◄─┐                        └──────┘
//!                           │         │ on_tick (no dispatch)
//!                           └─────────┘
//! ```
//!
//! [`transport`]: crate::transport

use core::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::{
    OCTET_STREAM,
    backoff::{Activity, PollInterval},
    config::{RequestHeaders, TransportConfig, TransportOptions},
    control::{self, ControlDecoder, FirstContact},
    error::ConfigError,
    http_client::{HttpMethod, HttpRequest},
    uri::TargetUri,
};

/// Status passed to [`PollSession::on_completion`] when no HTTP response was
/// received (connection refused, TLS failure, timeout, ...).
pub const NO_RESPONSE: u16 = 0;

/// Status of a response that carries data.
const OK: u16 = 200;

/// Result of a timer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// The request to dispatch, if none was outstanding.
    pub request: Option<HttpRequest>,

    /// When to tick again, or `None` if the session has been stopped.
    pub rearm: Option<Duration>,
}

/// Whether the server answered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Some HTTP status came back.
    Reachable,

    /// No HTTP response.
    Unreachable,
}

/// Result of a request completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Reported to the owner on every completion.
    pub reachability: Reachability,

    /// Response bytes for the owner's ingress sink.
    pub ingress: Option<Bytes>,

    /// The first-contact decision, on the first `200` response only.
    pub first_contact: Option<FirstContact>,

    /// Whether this response counted as work for the backoff.
    pub activity: Activity,
}

/// State of one HTTP poll transport.
#[derive(Debug)]
pub struct PollSession {
    uri: TargetUri,
    headers: RequestHeaders,
    options: TransportOptions,
    egress: BytesMut,
    interval: PollInterval,
    in_flight: bool,
    first_contact_pending: bool,
    running: bool,
}

impl PollSession {
    /// Create a stopped session from a parsed configuration.
    #[must_use]
    pub fn new(config: TransportConfig, options: TransportOptions) -> Self {
        let user_agent = config
            .user_agent
            .unwrap_or_else(|| options.default_user_agent.clone());

        Self {
            uri: config.base_uri,
            headers: RequestHeaders::new(user_agent),
            options,
            egress: BytesMut::new(),
            interval: PollInterval::new(),
            in_flight: false,
            first_contact_pending: true,
            running: false,
        }
    }

    /// Create a stopped session from a `<base-uri>[|<args>]` string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration string is unusable.
    pub fn from_config_str(config: &str, options: TransportOptions) -> Result<Self, ConfigError> {
        Ok(Self::new(TransportConfig::parse(config)?, options))
    }

    /// The current request target.
    #[must_use]
    pub const fn uri(&self) -> &TargetUri {
        &self.uri
    }

    /// The fixed request headers.
    #[must_use]
    pub const fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    /// The options the session was created with.
    #[must_use]
    pub const fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// The current poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.interval.current()
    }

    /// Whether a request is outstanding.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether the session is between `start` and `stop`.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the first `200` response is still to come.
    #[must_use]
    pub const fn first_contact_pending(&self) -> bool {
        self.first_contact_pending
    }

    /// Bytes waiting to be sent.
    #[must_use]
    pub fn egress_len(&self) -> usize {
        self.egress.len()
    }

    /// Start polling. Returns the delay before the first tick.
    pub fn start(&mut self) -> Duration {
        self.running = true;
        self.interval.reset();
        info!(uri = %self.uri, "poll session started");
        self.interval.current()
    }

    /// Stop re-arming the timer. An outstanding request is left alone.
    pub fn stop(&mut self) {
        if self.running {
            info!(uri = %self.uri, "poll session stopped");
        }
        self.running = false;
    }

    /// Queue bytes for the next dispatch.
    pub fn enqueue_egress(&mut self, bytes: &[u8]) {
        self.egress.extend_from_slice(bytes);
    }

    /// Handle a timer tick.
    ///
    /// Dispatches at most one request: a POST of everything queued, or a GET
    /// when nothing is. While a request is outstanding the tick dispatches
    /// nothing. The re-arm delay is the current interval; ticks never change
    /// it.
    pub fn on_tick(&mut self) -> Tick {
        let request = if self.in_flight {
            None
        } else {
            self.in_flight = true;
            Some(self.next_request())
        };

        Tick {
            request,
            rearm: self.running.then(|| self.interval.current()),
        }
    }

    fn next_request(&mut self) -> HttpRequest {
        let (method, content_type, body) = if self.egress.is_empty() {
            (HttpMethod::Get, None, Bytes::new())
        } else {
            let body = self.egress.split().freeze();
            (HttpMethod::Post, Some(OCTET_STREAM), body)
        };

        debug!(uri = %self.uri, ?method, len = body.len(), "dispatching poll request");

        HttpRequest {
            method,
            url: self.uri.to_string(),
            headers: self.headers.clone(),
            content_type,
            body,
        }
    }

    /// Handle completion of the outstanding request.
    ///
    /// `status` is the HTTP status, or [`NO_RESPONSE`]. The first `200`
    /// response is read as a control packet via `decoder`; later non-empty
    /// `200` bodies become ingress.
    pub fn on_completion<D: ControlDecoder>(
        &mut self,
        status: u16,
        body: Bytes,
        decoder: &D,
    ) -> Completion {
        if !self.in_flight {
            debug!(status, "completion without an outstanding request");
        }

        let reachability = if status > NO_RESPONSE {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        };

        let mut ingress = None;
        let mut first_contact = None;

        let activity = if status != OK {
            Activity::Quiet
        } else if self.first_contact_pending {
            let contact = control::interpret(decoder, &body);
            self.apply_first_contact(&contact);
            self.first_contact_pending = false;
            first_contact = Some(contact);
            Activity::Busy
        } else if body.is_empty() {
            Activity::Quiet
        } else {
            ingress = Some(body);
            Activity::Busy
        };

        self.interval.record(activity);
        self.in_flight = false;

        Completion {
            reachability,
            ingress,
            first_contact,
            activity,
        }
    }

    fn apply_first_contact(&mut self, contact: &FirstContact) {
        match contact {
            FirstContact::Migrate { path } => {
                info!(
                    origin = self.uri.origin(),
                    from = self.uri.path(),
                    to = %path,
                    "migrating poll target"
                );
                self.uri.migrate(path);
            }
            FirstContact::Ignored(reason) => {
                debug!(?reason, "first contact carried no migration");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backoff::{MAX_POLL_INTERVAL, MIN_POLL_INTERVAL},
        config::DEFAULT_USER_AGENT,
        control::{IgnoreReason, test_utils::LineDecoder},
    };

    const PATCH: &[u8] = b"method=core_patch_url\nurl=/new/path";

    fn session(config: &str) -> PollSession {
        PollSession::from_config_str(config, TransportOptions::default()).expect("valid config")
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Tick, then complete the dispatched request.
    fn round(session: &mut PollSession, status: u16, body: &'static [u8]) -> Completion {
        let tick = session.on_tick();
        assert!(tick.request.is_some(), "expected a dispatch");
        session.on_completion(status, Bytes::from_static(body), &LineDecoder)
    }

    /// A running session that has already seen its first contact.
    fn past_first_contact() -> PollSession {
        let mut s = session("http://10.0.0.1/a/b/c");
        s.start();
        round(&mut s, 200, b"");
        s
    }

    #[test]
    fn default_user_agent() {
        let s = session("http://h/x");
        assert_eq!(s.headers().user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(
            s.headers().lines(),
            ["Connection: close".to_string(), format!("User-Agent: {DEFAULT_USER_AGENT}")]
        );
    }

    #[test]
    fn configured_user_agent() {
        let s = session("http://h/x|--ua Foo/2.0");
        assert_eq!(s.uri().as_str(), "http://h/x");
        assert!(s.headers().lines().contains(&"User-Agent: Foo/2.0".to_string()));
        assert!(!s.headers().lines().iter().any(|l| l.contains(DEFAULT_USER_AGENT)));
    }

    #[test]
    fn options_supply_fallback_user_agent() {
        let options = TransportOptions::default().with_default_user_agent("Probe/0.1");
        let s = PollSession::from_config_str("http://h/x", options).expect("valid");
        assert_eq!(s.headers().user_agent(), "Probe/0.1");
    }

    #[test]
    fn empty_config_fails() {
        let err = PollSession::from_config_str("", TransportOptions::default());
        assert_eq!(err.err(), Some(ConfigError::EmptyUri));
    }

    #[test]
    fn fresh_session_state() {
        let s = session("http://h/x");
        assert!(!s.is_running());
        assert!(!s.is_in_flight());
        assert!(s.first_contact_pending());
        assert_eq!(s.egress_len(), 0);
    }

    #[test]
    fn start_arms_at_floor() {
        let mut s = session("http://h/x");
        assert_eq!(s.start(), MIN_POLL_INTERVAL);
        assert!(s.is_running());
    }

    #[test]
    fn restart_resets_interval() {
        let mut s = past_first_contact();
        round(&mut s, 200, b"");
        round(&mut s, 200, b"");
        assert_eq!(s.poll_interval(), ms(200));

        s.stop();
        assert_eq!(s.start(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn idle_tick_sends_get() {
        let mut s = session("http://h/x|--ua Foo/2.0");
        s.start();

        let tick = s.on_tick();
        let request = tick.request.expect("dispatch");
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "http://h/x");
        assert_eq!(request.content_type, None);
        assert!(request.body.is_empty());
        assert_eq!(request.headers.user_agent(), "Foo/2.0");
        assert_eq!(tick.rearm, Some(MIN_POLL_INTERVAL));
        assert!(s.is_in_flight());
    }

    #[test]
    fn queued_egress_is_posted_whole() {
        let mut s = session("http://h/x");
        s.start();
        s.enqueue_egress(b"hello ");
        s.enqueue_egress(b"world");

        let request = s.on_tick().request.expect("dispatch");
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.content_type, Some(OCTET_STREAM));
        assert_eq!(request.body, Bytes::from_static(b"hello world"));
        assert_eq!(s.egress_len(), 0);
    }

    #[test]
    fn single_flight() {
        let mut s = session("http://h/x");
        s.start();

        assert!(s.on_tick().request.is_some());
        let second = s.on_tick();
        assert!(second.request.is_none());
        assert_eq!(second.rearm, Some(MIN_POLL_INTERVAL));

        s.on_completion(200, Bytes::new(), &LineDecoder);
        assert!(!s.is_in_flight());
        assert!(s.on_tick().request.is_some());
    }

    #[test]
    fn egress_during_flight_waits_for_next_dispatch() {
        let mut s = session("http://h/x");
        s.start();

        let first = s.on_tick().request.expect("dispatch");
        assert_eq!(first.method, HttpMethod::Get);

        s.enqueue_egress(b"late");
        assert!(s.on_tick().request.is_none());
        assert_eq!(s.egress_len(), 4);

        s.on_completion(200, Bytes::new(), &LineDecoder);
        let next = s.on_tick().request.expect("dispatch");
        assert_eq!(next.method, HttpMethod::Post);
        assert_eq!(next.body, Bytes::from_static(b"late"));
    }

    #[test]
    fn stopped_session_does_not_rearm() {
        let mut s = session("http://h/x");
        s.start();
        s.stop();

        let tick = s.on_tick();
        assert!(tick.request.is_some());
        assert_eq!(tick.rearm, None);
    }

    #[test]
    fn tick_uses_current_interval() {
        let mut s = past_first_contact();
        round(&mut s, 200, b"");
        round(&mut s, 200, b"");

        let tick = s.on_tick();
        assert_eq!(tick.rearm, Some(ms(200)));
    }

    #[test]
    fn no_response_is_unreachable_and_quiet() {
        let mut s = session("http://h/x");
        s.start();

        let done = round(&mut s, NO_RESPONSE, b"");
        assert_eq!(done.reachability, Reachability::Unreachable);
        assert_eq!(done.activity, Activity::Quiet);
        assert_eq!(s.poll_interval(), ms(100));
        assert!(s.first_contact_pending());
    }

    #[test]
    fn error_status_is_reachable_and_quiet() {
        let mut s = past_first_contact();

        let done = round(&mut s, 503, b"busy");
        assert_eq!(done.reachability, Reachability::Reachable);
        assert_eq!(done.activity, Activity::Quiet);
        assert_eq!(done.ingress, None);
    }

    #[test]
    fn backoff_sequence() {
        let mut s = past_first_contact();
        assert_eq!(s.poll_interval(), MIN_POLL_INTERVAL);

        round(&mut s, 200, b"");
        assert_eq!(s.poll_interval(), ms(100));
        round(&mut s, 200, b"");
        assert_eq!(s.poll_interval(), ms(200));
        round(&mut s, 404, b"");
        assert_eq!(s.poll_interval(), ms(300));

        round(&mut s, 200, b"cmd");
        assert_eq!(s.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn interval_stays_in_bounds() {
        let mut s = session("http://h/x");
        s.start();

        let statuses = [0, 200, 500, 200, 0, 0, 302];
        for i in 0..400 {
            let body: &'static [u8] = if i % 37 == 0 { b"data" } else { b"" };
            round(&mut s, statuses[i % statuses.len()], body);
            assert!(s.poll_interval() >= MIN_POLL_INTERVAL);
            assert!(s.poll_interval() <= MAX_POLL_INTERVAL);
        }
    }

    #[test]
    fn ingress_after_first_contact() {
        let mut s = past_first_contact();

        let done = round(&mut s, 200, b"payload");
        assert_eq!(done.ingress, Some(Bytes::from_static(b"payload")));
        assert_eq!(done.activity, Activity::Busy);
        assert_eq!(done.first_contact, None);
    }

    #[test]
    fn first_contact_migrates() {
        let mut s = session("http://10.0.0.1/a/b/c");
        s.start();

        let done = round(&mut s, 200, PATCH);
        assert_eq!(s.uri().as_str(), "http://10.0.0.1/new/path");
        assert_eq!(s.uri().path(), "/new/path");
        assert_eq!(done.ingress, None);
        assert_eq!(done.activity, Activity::Busy);
        assert!(matches!(done.first_contact, Some(FirstContact::Migrate { .. })));
        assert!(!s.first_contact_pending());

        let next = s.on_tick().request.expect("dispatch");
        assert_eq!(next.url, "http://10.0.0.1/new/path");
    }

    #[test]
    fn first_contact_without_enough_slashes_appends() {
        let mut s = session("abc");
        s.start();

        round(&mut s, 200, PATCH);
        assert_eq!(s.uri().as_str(), "abc/new/path");
    }

    #[test]
    fn undecodable_first_contact_still_counts() {
        let mut s = session("http://10.0.0.1/a");
        s.start();

        let done = round(&mut s, 200, &[0xff, 0xfe]);
        assert_eq!(s.uri().as_str(), "http://10.0.0.1/a");
        assert!(!s.first_contact_pending());
        assert_eq!(done.activity, Activity::Busy);
        assert_eq!(done.ingress, None);
        assert!(matches!(
            done.first_contact,
            Some(FirstContact::Ignored(IgnoreReason::Undecodable(_)))
        ));
    }

    #[test]
    fn empty_first_contact_clears_pending() {
        let mut s = session("http://10.0.0.1/a");
        s.start();

        let done = round(&mut s, 200, b"");
        assert!(!s.first_contact_pending());
        assert_eq!(done.activity, Activity::Busy);
        assert_eq!(s.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn failures_keep_first_contact_pending() {
        let mut s = session("http://10.0.0.1/a/b");
        s.start();

        round(&mut s, NO_RESPONSE, b"");
        round(&mut s, 500, PATCH);
        assert!(s.first_contact_pending());

        round(&mut s, 200, PATCH);
        assert_eq!(s.uri().as_str(), "http://10.0.0.1/new/path");
    }

    #[test]
    fn only_first_contact_migrates() {
        let mut s = past_first_contact();

        let done = round(&mut s, 200, PATCH);
        assert_eq!(s.uri().as_str(), "http://10.0.0.1/a/b/c");
        assert_eq!(done.ingress, Some(Bytes::from_static(PATCH)));
    }
}
