//! Stream Multiplexer
//!
//! Runs the `GetEvents` call on a background task. The writer half pulls
//! commands from the queue; the reader half dispatches events to handlers.
//!
//! Once shutdown has been requested, any end of the call reports
//! `Closed`: a broker that ends its half after ours was half-closed is
//! answering the shutdown, not failing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::codec::Streaming;

use super::handlers::HandlerTable;
use super::monitor::{StreamMonitor, StreamStats};
use super::queue::{CommandQueue, QueueClosed};
use super::{StreamError, StreamStatus};
use crate::domain::streaming::{EventKind, StreamState};
use crate::domain::subscription::SubscriptionCommand;
use crate::infrastructure::config::{CallbackPanicPolicy, ShutdownPolicy, StreamSettings};
use crate::infrastructure::grpc::channel::AuthedChannel;
use crate::infrastructure::grpc::convert;
use crate::infrastructure::grpc::proto::{self, event};
use crate::infrastructure::grpc::services::events_client::EventsClient;

/// Upper bound on waiting for the background task after cancellation.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tokens shared between the handle and the background task.
#[derive(Clone, Default)]
struct Signals {
    /// Shutdown requested.
    closing: CancellationToken,
    /// Stop the call now.
    cancel: CancellationToken,
    /// Writer has exited.
    writer_done: CancellationToken,
}

/// Handle to the background event stream of one client.
pub struct EventStream {
    queue: Arc<CommandQueue>,
    handlers: Arc<HandlerTable>,
    monitor: Arc<StreamMonitor>,
    settings: StreamSettings,
    signals: Signals,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventStream {
    /// Start the background task on `runtime`.
    ///
    /// The stream enters `Streaming` before this returns. Commands enqueued
    /// before the call is established are buffered until it is.
    #[must_use]
    pub fn start(
        runtime: &tokio::runtime::Handle,
        client: EventsClient<AuthedChannel>,
        settings: StreamSettings,
    ) -> Self {
        let queue = Arc::new(CommandQueue::new());
        let handlers = Arc::new(HandlerTable::new());
        let monitor = Arc::new(StreamMonitor::new());
        let signals = Signals::default();

        monitor.set_state(StreamState::Streaming);

        let task = runtime.spawn(run(
            client,
            Arc::clone(&queue),
            Arc::clone(&handlers),
            Arc::clone(&monitor),
            settings.clone(),
            signals.clone(),
        ));

        tracing::info!(
            shutdown_policy = settings.shutdown_policy.as_str(),
            callback_panic_policy = settings.callback_panic_policy.as_str(),
            "Event stream started"
        );

        Self {
            queue,
            handlers,
            monitor,
            settings,
            signals,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue a command for the writer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] after shutdown or once the stream has ended.
    pub fn enqueue(&self, command: SubscriptionCommand) -> Result<(), QueueClosed> {
        let kind = command.kind();
        tracing::debug!(
            command = kind.as_str(),
            request_id = command.request_id(),
            "Command enqueued"
        );
        self.queue.enqueue(command)?;
        self.monitor.increment_enqueued(kind);
        Ok(())
    }

    /// Handler table shared with the reader.
    #[must_use]
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.monitor.get_state()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.monitor.snapshot()
    }

    /// Stop the stream and wait for the background task.
    ///
    /// Idempotent: later calls return immediately.
    pub async fn shutdown(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };

        self.signals.closing.cancel();
        self.queue.close();

        if self.settings.shutdown_policy == ShutdownPolicy::Drain
            && !self.signals.cancel.is_cancelled()
        {
            let budget = self.settings.drain_poll_interval + self.settings.drain_timeout;
            if tokio::time::timeout(budget, self.signals.writer_done.cancelled())
                .await
                .is_err()
            {
                tracing::warn!(
                    pending = self.queue.len(),
                    timeout_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                    "Drain timed out, discarding pending commands"
                );
            }
        }

        self.signals.cancel.cancel();

        match tokio::time::timeout(JOIN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Event stream task failed"),
            Err(_) => tracing::warn!("Event stream task did not stop in time"),
        }

        tracing::info!("Event stream shut down");
    }

    /// Cancel the background task without waiting.
    pub fn abort(&self) {
        self.signals.closing.cancel();
        self.queue.close();
        self.signals.cancel.cancel();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.abort();
    }
}

// =============================================================================
// Background Task
// =============================================================================

async fn run(
    mut client: EventsClient<AuthedChannel>,
    queue: Arc<CommandQueue>,
    handlers: Arc<HandlerTable>,
    monitor: Arc<StreamMonitor>,
    settings: StreamSettings,
    signals: Signals,
) {
    let Signals {
        closing,
        cancel,
        writer_done,
    } = signals;
    let (tx, rx) = mpsc::channel(settings.outbound_buffer.max(1));
    let writer_cancel = cancel.child_token();
    let writer = tokio::spawn(write_loop(
        Arc::clone(&queue),
        tx,
        Arc::clone(&monitor),
        settings.drain_poll_interval,
        writer_cancel.clone(),
        writer_done,
    ));

    let status = tokio::select! {
        biased;
        () = cancel.cancelled() => StreamStatus::Closed,
        response = client.get_events(ReceiverStream::new(rx)) => match response {
            Ok(response) => {
                tracing::info!("Event stream established");
                read_loop(
                    response.into_inner(),
                    &handlers,
                    &monitor,
                    &settings,
                    &closing,
                    &cancel,
                )
                .await
            }
            Err(status) if closing.is_cancelled() => {
                tracing::debug!(code = ?status.code(), "Event stream call ended during shutdown");
                StreamStatus::Closed
            }
            Err(status) => StreamStatus::Failed(StreamError::from(status)),
        },
    };

    queue.close();
    writer_cancel.cancel();
    if let Err(e) = writer.await {
        tracing::error!(error = %e, "Event stream writer task failed");
    }

    let discarded = queue.clear();
    monitor.add_discarded(u64::try_from(discarded).unwrap_or(u64::MAX));
    if discarded > 0 {
        tracing::warn!(discarded, "Pending commands discarded at stream close");
    }

    finish(&status, &handlers, &monitor);
}

fn finish(status: &StreamStatus, handlers: &HandlerTable, monitor: &StreamMonitor) {
    match status {
        StreamStatus::Closed => {
            monitor.set_state(StreamState::Closed);
            tracing::info!("Event stream closed");
        }
        StreamStatus::Failed(err) => {
            monitor.set_error(err.to_string());
            monitor.set_state(StreamState::Failed);
            tracing::error!(error = %err, "Event stream failed");
        }
    }

    if let Err(message) = handlers.status.complete(status) {
        tracing::error!(panic = %message, "Status handler panicked");
    }
}

/// Forward queued commands to the outbound half until cancelled, or until
/// the queue is closed and empty.
async fn write_loop(
    queue: Arc<CommandQueue>,
    tx: mpsc::Sender<proto::SubscriptionRequest>,
    monitor: Arc<StreamMonitor>,
    poll_interval: Duration,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    let _done = done.drop_guard();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = queue.dequeue(poll_interval) => next,
        };

        let Some(command) = next else {
            if queue.is_closed() {
                tracing::debug!("Command queue drained");
                break;
            }
            continue;
        };

        let kind = command.kind();
        let request = convert::command_to_request(&command);
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            result = tx.send(request) => result.is_ok(),
        };

        if !sent {
            monitor.add_discarded(1);
            break;
        }

        monitor.increment_sent(kind);
        tracing::debug!(
            command = kind.as_str(),
            request_id = command.request_id(),
            "Command sent"
        );
    }
    // Dropping `tx` half-closes the outbound stream.
}

/// Dispatch inbound events until cancelled, failed, or closed by the server.
///
/// After `closing` is set, the end of the inbound half is the broker's
/// answer to our half-close and reports `Closed`.
async fn read_loop(
    mut inbound: Streaming<proto::Event>,
    handlers: &HandlerTable,
    monitor: &StreamMonitor,
    settings: &StreamSettings,
    closing: &CancellationToken,
    cancel: &CancellationToken,
) -> StreamStatus {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamStatus::Closed,
            message = inbound.message() => message,
        };

        match message {
            Ok(Some(event)) => {
                if let Err(err) = dispatch(event, handlers, monitor, settings.callback_panic_policy)
                {
                    return StreamStatus::Failed(err);
                }
            }
            Ok(None) if closing.is_cancelled() => return StreamStatus::Closed,
            Ok(None) => return StreamStatus::Failed(StreamError::ServerClosed),
            Err(status) if closing.is_cancelled() => {
                tracing::debug!(code = ?status.code(), "Inbound half ended during shutdown");
                return StreamStatus::Closed;
            }
            Err(status) => return StreamStatus::Failed(StreamError::from(status)),
        }
    }
}

/// Route one event to the handler for its payload.
fn dispatch(
    event: proto::Event,
    handlers: &HandlerTable,
    monitor: &StreamMonitor,
    policy: CallbackPanicPolicy,
) -> Result<(), StreamError> {
    let Some(payload) = event.payload else {
        tracing::trace!("Event without payload ignored");
        return Ok(());
    };

    let (kind, outcome) = match &payload {
        event::Payload::OrderBook(ev) => (EventKind::OrderBook, handlers.order_book.invoke(ev)),
        event::Payload::Portfolio(ev) => (EventKind::Portfolio, handlers.portfolio.invoke(ev)),
        event::Payload::Order(ev) => (EventKind::Order, handlers.order.invoke(ev)),
        event::Payload::Trade(ev) => (EventKind::Trade, handlers.trade.invoke(ev)),
        event::Payload::Response(ev) => (EventKind::Response, handlers.response.invoke(ev)),
    };
    monitor.increment_event(kind);
    tracing::trace!(event = kind.as_str(), "Event dispatched");

    let Err(message) = outcome else {
        return Ok(());
    };

    monitor.increment_panics(kind);
    match policy {
        CallbackPanicPolicy::Isolate => {
            tracing::error!(event = kind.as_str(), panic = %message, "Event handler panicked");
            Ok(())
        }
        CallbackPanicPolicy::Propagate => Err(StreamError::HandlerPanicked { kind, message }),
    }
}
