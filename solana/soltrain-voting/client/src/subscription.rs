//! Delivery of program events to registered listeners.
//!
//! Listeners are registered on an [`EventHub`] and stay registered for as long as the
//! returned [`Subscription`] is alive. Events can be fed to the hub from executed
//! transactions or from a websocket log stream started with [`spawn_log_stream`].

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, VotingClientError};
use crate::event::{parse_logs, EventKind, ProgramEvent, VotingEvent};

/// Number of delivered `(signature, index)` pairs remembered for deduplication.
const SEEN_CAPACITY: usize = 1024;

type Handler = Arc<dyn Fn(&VotingEvent) + Send + Sync>;

#[derive(Default)]
struct HubState {
    next_id: u64,
    listeners: BTreeMap<u64, (EventKind, Handler)>,
    seen: HashSet<(Signature, usize)>,
    seen_order: VecDeque<(Signature, usize)>,
}

impl HubState {
    /// Records a delivery, returning false if it already happened.
    fn mark_seen(&mut self, key: (Signature, usize)) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.seen_order.push_back(key);
        if self.seen_order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

fn lock(state: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct EventHub {
    state: Arc<Mutex<HubState>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind` until the returned handle is dropped.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&VotingEvent) + Send + Sync + 'static,
    {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.insert(id, (kind, Arc::new(handler)));
        debug!(id, %kind, "Listener registered");
        Subscription {
            id,
            kind,
            hub: Arc::downgrade(&self.state),
        }
    }

    /// Typed variant of [`EventHub::subscribe`].
    #[must_use = "dropping the subscription removes the listener"]
    pub fn on<E, F>(&self, handler: F) -> Subscription
    where
        E: ProgramEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(E::KIND, move |event| {
            if let Some(payload) = E::extract(event) {
                handler(payload);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// Delivers the events of transaction `signature` in order. Events already
    /// delivered for the same signature and position are skipped. Returns the number
    /// of handler invocations.
    pub fn dispatch(&self, signature: &Signature, events: &[VotingEvent]) -> usize {
        let mut delivered = 0;
        for (index, event) in events.iter().enumerate() {
            let handlers: Vec<Handler> = {
                let mut state = lock(&self.state);
                if !state.mark_seen((*signature, index)) {
                    debug!(%signature, index, "Event already delivered");
                    continue;
                }
                state
                    .listeners
                    .values()
                    .filter(|(kind, _)| *kind == event.kind())
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect()
            };
            // Handlers run without the lock so they may subscribe or unsubscribe.
            for handler in handlers {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Parses `logs` for events of `program_id` and dispatches them.
    pub fn dispatch_logs<S: AsRef<str>>(
        &self,
        signature: &Signature,
        program_id: &Pubkey,
        logs: &[S],
    ) -> Result<usize> {
        let events = parse_logs(program_id, logs)?;
        Ok(self.dispatch(signature, &events))
    }
}

/// Registration handle of one listener.
pub struct Subscription {
    id: u64,
    kind: EventKind,
    hub: Weak<Mutex<HubState>>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            lock(&state).listeners.remove(&self.id);
            debug!(id = self.id, kind = %self.kind, "Listener removed");
        }
    }
}

/// Handle of a background log stream. Dropping it stops the stream too.
pub struct LogStreamHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LogStreamHandle {
    /// Stops the stream and waits for it to unsubscribe.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Log stream task ended abnormally");
            }
        }
    }

    /// Waits for the stream to end on its own, e.g. when the endpoint closes it.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Log stream task ended abnormally");
            }
        }
    }
}

impl Drop for LogStreamHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Connects to the websocket endpoint and forwards the program's events to `hub`.
pub async fn spawn_log_stream(
    ws_url: &str,
    program_id: Pubkey,
    commitment: CommitmentConfig,
    hub: EventHub,
) -> Result<LogStreamHandle> {
    let client = PubsubClient::new(ws_url)
        .await
        .map_err(VotingClientError::network)?;
    info!(ws_url, %program_id, "Connected to log stream");

    let (shutdown, mut shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let filter = RpcTransactionLogsFilter::Mentions(vec![program_id.to_string()]);
        let config = RpcTransactionLogsConfig {
            commitment: Some(commitment),
        };
        let (mut stream, unsubscribe) = match client.logs_subscribe(filter, config).await {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(error = %err, "Failed to subscribe to program logs");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Log stream shutdown requested");
                    break;
                }
                item = stream.next() => {
                    let Some(response) = item else {
                        error!("Log stream closed by endpoint");
                        break;
                    };
                    let logs = response.value;
                    if logs.err.is_some() {
                        debug!(signature = %logs.signature, "Ignoring failed transaction");
                        continue;
                    }
                    let signature = match Signature::from_str(&logs.signature) {
                        Ok(signature) => signature,
                        Err(err) => {
                            warn!(
                                signature = %logs.signature,
                                error = %err,
                                "Unparseable signature"
                            );
                            continue;
                        }
                    };
                    if let Err(err) = hub.dispatch_logs(&signature, &program_id, &logs.logs) {
                        warn!(%signature, error = %err, "Could not decode streamed events");
                    }
                }
            }
        }

        drop(stream);
        unsubscribe().await;
        if let Err(err) = client.shutdown().await {
            debug!(error = %err, "Pubsub client shutdown failed");
        }
    });

    Ok(LogStreamHandle {
        shutdown: Some(shutdown),
        task: Some(task),
    })
}
