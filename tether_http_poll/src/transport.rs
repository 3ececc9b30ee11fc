//! Owner-facing HTTP poll transport.
//!
//! [`HttpPollTransport`] is what the owning registry holds. It exposes the
//! lifecycle (`init`, `start`, `stop`, `teardown`) and the egress entry
//! point. Everything else happens on one background task that owns the
//! [`PollSession`], the HTTP client, and the control decoder:
//!
//! ```text
//!  owner                               driver task
//!  ─────                               ───────────
//!  egress(bytes) ──► [egress chan] ──► absorbed on every tick
//!  stop()        ──► running flag  ──► checked on every tick
//!  teardown()    ──► [shutdown]    ──► no further ticks
//!
//!                  select! { shutdown | in-flight completion | tick }
//!
//!  events ◄── Reachable / Unreachable / Ingress(bytes)
//! ```
//!
//! Ticks and completions are handled one at a time by the task, so the
//! session needs no locking.
//!
//! # Stop and restart
//!
//! After `stop` the task winds down: the next tick is not re-armed, and the
//! task exits once the outstanding request (if any) has completed. It parks
//! the session on the way out, and a later `start` picks it up again on a
//! fresh task with the interval back at the floor. A `start` that arrives
//! while the previous run is still winding down waits for that run to exit.
//!
//! # Slow owners
//!
//! Events are delivered with `send`, so a bounded, full event channel holds
//! up the task until the owner reads. Teardown releases it: an event that
//! cannot be delivered at once after teardown is dropped.
//!
//! # Teardown with a request in flight
//!
//! Teardown neither waits for nor aborts an outstanding request. The task
//! still owns the session, so the late completion is processed normally;
//! its events go to the owner's channel if it is still open and are dropped
//! otherwise. No tick runs after teardown, and the task exits once the
//! outstanding request (if any) has completed. [`HttpPollTransport::teardown`]
//! returns the task's [`JoinHandle`] for callers that want to wait for that.

use core::{fmt, time::Duration};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use bytes::Bytes;
use futures::future::{BoxFuture, OptionFuture};
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    config::TransportOptions,
    control::ControlDecoder,
    error::TransportError,
    http_client::{HttpClient, HttpResponse},
    session::{NO_RESPONSE, PollSession, Reachability},
};

/// Notifications delivered to the transport's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A request completed with an HTTP status.
    Reachable,

    /// A request completed without an HTTP response.
    Unreachable,

    /// Data from the server. Ownership passes to the owner.
    Ingress(Bytes),
}

/// The parked driver, present whenever no run holds it.
type Parking<H, D> = Arc<Mutex<Option<Driver<H, D>>>>;

/// An HTTP poll transport.
///
/// Dropping the transport has the same effect as [`teardown`](Self::teardown).
pub struct HttpPollTransport<H, D> {
    running: Arc<AtomicBool>,
    /// Incremented by every `start`; a run only re-arms while it is current.
    run: Arc<AtomicU64>,
    egress_tx: async_channel::Sender<Bytes>,
    shutdown_tx: async_channel::Sender<()>,
    parked: Parking<H, D>,
    task: Option<JoinHandle<()>>,
}

impl<H, D> fmt::Debug for HttpPollTransport<H, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPollTransport")
            .field("running", &self.is_running())
            .field("run", &self.run.load(Ordering::Acquire))
            .field("started", &self.task.is_some())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "reqwest")]
impl<D: ControlDecoder> HttpPollTransport<crate::http_client::ReqwestHttpClient, D> {
    /// Initialise a transport backed by [`reqwest`](https://docs.rs/reqwest).
    ///
    /// `config` is `<base-uri>[|<args>]`. The transport is created stopped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the configuration is unusable or the
    /// HTTP client cannot be built. Nothing is left running on failure.
    pub fn init(
        config: &str,
        options: TransportOptions,
        decoder: D,
        events: async_channel::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let session = PollSession::from_config_str(config, options)?;
        let http = crate::http_client::ReqwestHttpClient::from_options(session.options())?;
        Ok(Self::from_session(session, http, decoder, events))
    }
}

impl<H: HttpClient, D: ControlDecoder> HttpPollTransport<H, D> {
    /// Initialise a transport with a caller-supplied HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] if the configuration is unusable.
    pub fn with_client(
        config: &str,
        options: TransportOptions,
        http: H,
        decoder: D,
        events: async_channel::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let session = PollSession::from_config_str(config, options)?;
        Ok(Self::from_session(session, http, decoder, events))
    }

    fn from_session(
        session: PollSession,
        http: H,
        decoder: D,
        events: async_channel::Sender<TransportEvent>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(false));
        let run = Arc::new(AtomicU64::new(0));
        let (egress_tx, egress_rx) = async_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = async_channel::bounded(1);

        let driver = Driver {
            session,
            http,
            decoder,
            events,
            egress_rx,
            shutdown_rx,
            running: running.clone(),
            run: run.clone(),
        };

        Self {
            running,
            run,
            egress_tx,
            shutdown_tx,
            parked: Arc::new(Mutex::new(Some(driver))),
            task: None,
        }
    }

    /// Start polling on a new tokio task.
    ///
    /// The first request goes out after the minimum poll interval. A stopped
    /// transport can be started again; its first contact and queued egress
    /// carry over. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyRunning`] if the transport is between
    /// `start` and `stop`.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadyRunning);
        }

        let run = self.run.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self.task.take();
        let parked = self.parked.clone();

        self.task = Some(tokio::spawn(async move {
            if let Some(previous) = previous
                && let Err(e) = previous.await
            {
                warn!(error = %e, "previous poll run ended abnormally");
            }

            let Some(mut driver) = take_parked(&parked) else {
                warn!(run, "poll driver unavailable, not starting");
                return;
            };

            if driver.shutdown_rx.is_closed() {
                debug!(run, "transport torn down before restart");
            } else {
                let first_tick = driver.session.start();
                driver = driver.run(run, first_tick).await;
            }

            park(&parked, driver);
        }));

        Ok(())
    }
}

fn take_parked<H, D>(parked: &Parking<H, D>) -> Option<Driver<H, D>> {
    parked
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

fn park<H, D>(parked: &Parking<H, D>, driver: Driver<H, D>) {
    *parked.lock().unwrap_or_else(PoisonError::into_inner) = Some(driver);
}

impl<H, D> HttpPollTransport<H, D> {
    /// Stop scheduling polls.
    ///
    /// Takes effect at the next tick. An outstanding request is not
    /// cancelled; its completion is still processed. Bytes queued while
    /// stopped go out after the next `start`.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("poll transport stop requested");
        }
    }

    /// Whether the transport is between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the background task of the latest run has exited.
    ///
    /// `false` if the transport was never started.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Queue bytes for delivery with the next poll.
    ///
    /// Accepted at any time until teardown, including before `start` and
    /// while stopped.
    pub fn egress(&self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }

        if let Err(e) = self.egress_tx.try_send(bytes) {
            warn!(
                len = e.into_inner().len(),
                "poll transport torn down, dropping egress"
            );
        }
    }

    /// Release the transport.
    ///
    /// Returns the background task handle if the transport was started.
    /// Awaiting it waits for an outstanding request to complete; dropping it
    /// leaves the task to finish on its own.
    pub fn teardown(mut self) -> Option<JoinHandle<()>> {
        info!(started = self.task.is_some(), "tearing down poll transport");
        self.task.take()
    }
}

impl<H, D> Drop for HttpPollTransport<H, D> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.egress_tx.close();
        self.shutdown_tx.close();
    }
}

/// State owned by the background task.
struct Driver<H, D> {
    session: PollSession,
    http: H,
    decoder: D,
    events: async_channel::Sender<TransportEvent>,
    egress_rx: async_channel::Receiver<Bytes>,
    shutdown_rx: async_channel::Receiver<()>,
    running: Arc<AtomicBool>,
    run: Arc<AtomicU64>,
}

impl<H: HttpClient, D: ControlDecoder> Driver<H, D> {
    /// Drive one run until it is stopped or torn down, then hand the driver
    /// back for parking.
    async fn run(mut self, run: u64, first_tick: Duration) -> Self {
        let mut next_tick = Some(Instant::now() + first_tick);
        let mut in_flight: Option<BoxFuture<'static, Result<HttpResponse, H::Error>>> = None;
        let mut torn_down = false;

        while next_tick.is_some() || in_flight.is_some() {
            let deadline = next_tick.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv(), if !torn_down => {
                    torn_down = true;
                    next_tick = None;
                    self.session.stop();
                    debug!(in_flight = in_flight.is_some(), "poll driver shutting down");
                }

                Some(result) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    self.complete(result).await;
                }

                () = sleep_until(deadline), if next_tick.is_some() => {
                    if !self.is_current(run) {
                        self.session.stop();
                    }
                    self.absorb_egress();

                    let tick = self.session.on_tick();
                    if let Some(request) = tick.request {
                        in_flight = Some(self.http.request(request));
                    }
                    next_tick = tick.rearm.map(|delay| Instant::now() + delay);
                }
            }
        }

        debug!(uri = %self.session.uri(), run, "poll run exited");
        self
    }

    /// Whether `run` is the latest run and has not been stopped.
    fn is_current(&self, run: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.run.load(Ordering::Acquire) == run
    }

    /// Move everything the owner queued into the session.
    fn absorb_egress(&mut self) {
        while let Ok(chunk) = self.egress_rx.try_recv() {
            self.session.enqueue_egress(&chunk);
        }
    }

    async fn complete(&mut self, result: Result<HttpResponse, H::Error>) {
        let (status, body) = match result {
            Ok(resp) => (resp.status, resp.body),
            Err(e) => {
                warn!(uri = %self.session.uri(), error = %e, "poll request failed");
                (NO_RESPONSE, Bytes::new())
            }
        };

        let done = self.session.on_completion(status, body, &self.decoder);

        self.emit(match done.reachability {
            Reachability::Reachable => TransportEvent::Reachable,
            Reachability::Unreachable => TransportEvent::Unreachable,
        })
        .await;

        if let Some(bytes) = done.ingress {
            self.emit(TransportEvent::Ingress(bytes)).await;
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.shutdown_rx.is_closed() {
            if let Err(e) = self.events.try_send(event) {
                debug!(event = ?e.into_inner(), "transport torn down, dropping event");
            }
            return;
        }

        tokio::select! {
            biased;

            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("owner event channel closed");
                }
            }

            _ = self.shutdown_rx.recv() => {
                debug!("transport torn down while owner was busy, dropping event");
            }
        }
    }
}
