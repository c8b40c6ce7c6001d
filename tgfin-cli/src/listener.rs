//! Push listener: classifies every message the source delivers and merges it
//! right away. There is no reconnect; once the subscription closes the
//! listener is stopped and the supervisor decides what to do.

use std::sync::Arc;

use tgfin_core::GroupId;
use tgfin_ingest::{IncomingMessage, SourceError, Subscription};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::session::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Why the listener task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    Stopped,
    ConnectionLost,
    Crashed(String),
}

struct Running {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<ListenerExit>,
}

pub struct RealtimeListener {
    pipeline: Pipeline,
    group_ids: Vec<GroupId>,
    state: Arc<watch::Sender<ListenerState>>,
    running: Mutex<Option<Running>>,
}

impl RealtimeListener {
    pub fn new(pipeline: Pipeline, group_ids: Vec<GroupId>) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        Self {
            pipeline,
            group_ids,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Connect, subscribe, and spawn the receive loop. A no-op when already
    /// running; a loop that ended on its own is collected first, so this also
    /// restarts after a connection loss. On failure the listener stays `Stopped`.
    pub async fn start(&self) -> Result<(), SourceError> {
        let mut running = self.running.lock().await;
        if let Some(prev) = running.take() {
            // the task publishes `Stopped` just before it returns
            let ended = prev.handle.is_finished() || self.state() == ListenerState::Stopped;
            if !ended {
                *running = Some(prev);
                return Ok(());
            }
            let exit = join_exit(prev.handle, &self.state).await;
            debug!(?exit, "collected previous listener task before restart");
        }
        self.state.send_replace(ListenerState::Starting);

        let rx = match self.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                self.state.send_replace(ListenerState::Stopped);
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        // set before spawning so an immediate loss is not overwritten
        self.state.send_replace(ListenerState::Running);
        let pipeline = self.pipeline.clone();
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            let exit = pump(pipeline, rx, stop_rx).await;
            state.send_replace(ListenerState::Stopped);
            exit
        });

        info!(
            groups = self.group_ids.len(),
            source = self.pipeline.source.name(),
            "realtime listener running"
        );
        *running = Some(Running {
            stop: stop_tx,
            handle,
        });
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, SourceError> {
        let source = &self.pipeline.source;
        let limit = self.pipeline.call_timeout;
        timeout(limit, source.connect())
            .await
            .map_err(|_| SourceError::Timeout(limit))??;
        timeout(limit, source.subscribe(&self.group_ids))
            .await
            .map_err(|_| SourceError::Timeout(limit))?
    }

    /// Signal the loop and wait for it, including any merge in flight.
    /// `None` when the listener was not started.
    pub async fn stop(&self) -> Option<ListenerExit> {
        let running = self.running.lock().await.take()?;
        self.state.send_if_modified(|s| {
            if *s == ListenerState::Running {
                *s = ListenerState::Stopping;
                true
            } else {
                false
            }
        });
        // the task may already be gone after a connection loss
        let _ = running.stop.send(());
        Some(join_exit(running.handle, &self.state).await)
    }

    /// Wait for the loop to end on its own (connection loss) and collect its
    /// outcome. `None` when the listener was not started.
    pub async fn join(&self) -> Option<ListenerExit> {
        let mut rx = self.watch_state();
        if self.running.lock().await.is_none() {
            return None;
        }
        let _ = rx.wait_for(|s| *s == ListenerState::Stopped).await;
        let running = self.running.lock().await.take()?;
        Some(join_exit(running.handle, &self.state).await)
    }
}

async fn join_exit(
    handle: JoinHandle<ListenerExit>,
    state: &watch::Sender<ListenerState>,
) -> ListenerExit {
    match handle.await {
        Ok(exit) => exit,
        Err(e) => {
            error!(error = %e, "listener task crashed");
            state.send_replace(ListenerState::Stopped);
            ListenerExit::Crashed(e.to_string())
        }
    }
}

async fn pump(
    pipeline: Pipeline,
    mut rx: Subscription,
    mut stop: oneshot::Receiver<()>,
) -> ListenerExit {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                info!("realtime listener stopped");
                return ListenerExit::Stopped;
            }
            msg = rx.recv() => match msg {
                Some(incoming) => ingest(&pipeline, incoming).await,
                None => {
                    error!("subscription closed; realtime listener lost its connection");
                    return ListenerExit::ConnectionLost;
                }
            },
        }
    }
}

async fn ingest(pipeline: &Pipeline, incoming: IncomingMessage) {
    let Some(tx) = pipeline
        .classifier
        .classify_message(&incoming, &pipeline.group_types)
    else {
        return;
    };
    debug!(
        group = %tx.group_id,
        id = %tx.id,
        kind = %tx.tx_type,
        amount = tx.amount,
        "realtime transaction"
    );
    match pipeline.store.merge(vec![tx]).await {
        Ok(r) if r.added() > 0 => info!(added = r.added(), "realtime transaction stored"),
        Ok(_) => debug!("realtime transaction already stored"),
        Err(e) => warn!(error = %e, "realtime merge failed; message dropped"),
    }
}
