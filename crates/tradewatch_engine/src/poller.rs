//! Generic short-polling engine.
//!
//! A poll task wakes on a fixed interval and asks a [`PageSource`] for
//! everything newer than the current high-water mark. The source pushes items
//! onto an internal update channel; a separate relay task moves them to the
//! channel the caller reads, so a burst from the source is never coupled
//! directly to the consumer. Both tasks watch one cancellation token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tradewatch_core::HighWaterMark;
use tradewatch_logging::{watch_debug, watch_info, watch_warn};

use crate::{Error, PollError, PollSettings};

/// Something that can list everything newer than a mark.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Pushes new items onto `updates` in delivery order and returns the mark
    /// to use on the next cycle.
    async fn fetch_since(
        &self,
        mark: HighWaterMark,
        updates: &Updates<Self::Item>,
    ) -> Result<HighWaterMark, Error>;
}

/// Sending half of the internal update channel, lent to a source per cycle.
pub struct Updates<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Updates<T> {
    /// Returns `false` once the relay has stopped; the item is dropped and so
    /// should the rest of the cycle's items be.
    pub async fn push(&self, item: T) -> bool {
        self.tx.send(item).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> From<mpsc::Sender<T>> for Updates<T> {
    fn from(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }
}

#[derive(Debug)]
pub enum PollEvent<T> {
    Item(T),
    Error(PollError),
}

/// Caller's side of a running poller. Dropping it cancels the poller.
pub struct PollHandle<T> {
    items: mpsc::Receiver<T>,
    errors: mpsc::Receiver<PollError>,
    mark: watch::Receiver<HighWaterMark>,
    cancel: CancellationToken,
    items_done: bool,
    errors_done: bool,
    poll_task: Option<JoinHandle<()>>,
    relay_task: Option<JoinHandle<()>>,
}

/// Starts polling `source` from `initial`. Must be called inside a Tokio runtime.
///
/// The first fetch happens one interval after the call.
pub fn start_polling<S>(
    source: Arc<S>,
    initial: HighWaterMark,
    settings: &PollSettings,
) -> PollHandle<S::Item>
where
    S: PageSource,
{
    let capacity = settings.channel_capacity.max(1);
    let interval = settings.interval.max(Duration::from_millis(1));
    let (update_tx, update_rx) = mpsc::channel(capacity);
    let (item_tx, item_rx) = mpsc::channel(capacity);
    let (error_tx, error_rx) = mpsc::channel(capacity);
    let (mark_tx, mark_rx) = watch::channel(initial);
    let cancel = CancellationToken::new();

    watch_info!("poller starting at mark {} every {:?}", initial, interval);
    let poll_task = tokio::spawn(poll_loop(
        source,
        initial,
        interval,
        Updates { tx: update_tx },
        error_tx,
        mark_tx,
        cancel.clone(),
    ));
    let relay_task = tokio::spawn(relay(update_rx, item_tx, cancel.clone()));

    PollHandle {
        items: item_rx,
        errors: error_rx,
        mark: mark_rx,
        cancel,
        items_done: false,
        errors_done: false,
        poll_task: Some(poll_task),
        relay_task: Some(relay_task),
    }
}

impl<T> PollHandle<T> {
    /// Next item, or `None` once cancelled or the poller is gone.
    ///
    /// Errors that nobody reads are dropped once the error buffer is full.
    pub async fn next_item(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            item = self.items.recv() => item,
        }
    }

    pub async fn next_error(&mut self) -> Option<PollError> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            error = self.errors.recv() => error,
        }
    }

    /// Next item or error, whichever arrives first.
    pub async fn next_event(&mut self) -> Option<PollEvent<T>> {
        loop {
            if self.cancel.is_cancelled() || (self.items_done && self.errors_done) {
                return None;
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                item = self.items.recv(), if !self.items_done => match item {
                    Some(item) => return Some(PollEvent::Item(item)),
                    None => self.items_done = true,
                },
                error = self.errors.recv(), if !self.errors_done => match error {
                    Some(error) => return Some(PollEvent::Error(error)),
                    None => self.errors_done = true,
                },
            }
        }
    }

    /// Requests a stop. A fetch already in flight runs to completion but its
    /// remaining items are not delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this poller, for handing to other tasks.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn current_mark(&self) -> HighWaterMark {
        *self.mark.borrow()
    }

    pub fn mark_updates(&self) -> watch::Receiver<HighWaterMark> {
        self.mark.clone()
    }

    /// Cancels and waits for both tasks to finish.
    pub async fn shutdown(mut self) -> HighWaterMark {
        self.cancel.cancel();
        if let Some(task) = self.poll_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.relay_task.take() {
            let _ = task.await;
        }
        self.current_mark()
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop<S>(
    source: Arc<S>,
    mut mark: HighWaterMark,
    interval: Duration,
    updates: Updates<S::Item>,
    errors: mpsc::Sender<PollError>,
    mark_tx: watch::Sender<HighWaterMark>,
    cancel: CancellationToken,
) where
    S: PageSource,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match source.fetch_since(mark, &updates).await {
            Ok(next) => {
                let advanced = mark.advanced_to(next);
                if advanced != mark {
                    watch_debug!("mark advanced {} -> {}", mark, advanced);
                    mark = advanced;
                    mark_tx.send_replace(mark);
                }
            }
            Err(err) => {
                watch_warn!("poll from mark {} failed: {}", mark, err);
                // Items keep flowing even when nobody drains errors.
                match errors.try_send(PollError { mark, source: err }) {
                    Ok(()) | Err(TrySendError::Closed(_)) => {}
                    Err(TrySendError::Full(dropped)) => {
                        watch_warn!("error at mark {} dropped: error buffer full", dropped.mark);
                    }
                }
            }
        }
    }

    watch_info!("poller stopped at mark {}", mark);
}

async fn relay<T>(
    mut updates: mpsc::Receiver<T>,
    items: mpsc::Sender<T>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
{
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = updates.recv() => match update {
                Some(item) => item,
                None => break,
            },
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = items.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}
