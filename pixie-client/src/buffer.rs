//! The table buffer ("component B"): an ordered queue of rows between the
//! stream demultiplexer (single producer) and a single consumer, with
//! end-of-stream and error signalling.
//!
//! Built on `Mutex` + `Notify` rather than an `mpsc` channel because the
//! discard-on-error policy below needs to retroactively drop already
//! enqueued rows, which a strict FIFO channel cannot do once they've been
//! sent.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use pixie_data::Row;
use pixie_errors::ApiError;
use tokio::sync::Notify;

struct BufferState {
    queue: VecDeque<Row>,
    closed: bool,
    error: Option<ApiError>,
    error_delivered: bool,
}

/// One outstanding row-batch of backpressure: a push blocks until the
/// previously pushed batch has been fully drained.
pub struct TableBuffer {
    state: Mutex<BufferState>,
    notify: Notify,
}

/// What a consumer's pull observed.
#[derive(Debug)]
pub enum PullOutcome {
    Row(Row),
    End,
    Err(ApiError),
}

impl TableBuffer {
    pub fn new() -> Arc<TableBuffer> {
        Arc::new(TableBuffer {
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                closed: false,
                error: None,
                error_delivered: false,
            }),
            notify: Notify::new(),
        })
    }

    /// Enqueues one decoded row-batch. Blocks until the buffer is empty if
    /// a previous batch hasn't been fully drained yet, so the producer
    /// never gets more than one batch ahead of the consumer. A push after
    /// close is silently ignored.
    pub async fn push_rows(&self, rows: Vec<Row>) {
        if rows.is_empty() {
            return;
        }
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return;
                }
                if state.queue.is_empty() {
                    state.queue.extend(rows);
                    drop(state);
                    self.notify.notify_waiters();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Marks the buffer closed with no error. Idempotent.
    pub fn close_ok(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Closes the buffer with a terminal error, discarding any rows still
    /// queued. Idempotent; the first `close_err`/`close_ok` wins.
    pub fn close_err(&self, err: ApiError) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.queue.clear();
        state.error = Some(err);
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Pulls the next row, or `End`/`Err` once the buffer is closed. A
    /// terminal error is delivered exactly once; subsequent pulls after
    /// that return `End`.
    pub async fn pull(&self) -> PullOutcome {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(row) = state.queue.pop_front() {
                    drop(state);
                    self.notify.notify_waiters();
                    return PullOutcome::Row(row);
                }
                if let Some(err) = state.error.clone() {
                    if !state.error_delivered {
                        state.error_delivered = true;
                        return PullOutcome::Err(err);
                    }
                    return PullOutcome::End;
                }
                if state.closed {
                    return PullOutcome::End;
                }
            }
            notified.await;
        }
    }
}

/// A per-table pull iterator handle returned by `Script::subscribe` and by
/// `Script::subscribe_all_tables`'s generator.
pub struct TableSub {
    name: String,
    buffer: Arc<TableBuffer>,
}

impl TableSub {
    pub(crate) fn new(name: String, buffer: Arc<TableBuffer>) -> TableSub {
        TableSub { name, buffer }
    }

    pub fn table_name(&self) -> &str {
        &self.name
    }

    /// Advances the iterator. Returns `None` once the table's stream has
    /// ended (whether by clean end-of-stream or by a terminal error that
    /// was already delivered on an earlier call).
    pub async fn next_row(&mut self) -> Option<Result<Row, ApiError>> {
        match self.buffer.pull().await {
            PullOutcome::Row(row) => Some(Ok(row)),
            PullOutcome::End => None,
            PullOutcome::Err(err) => Some(Err(err)),
        }
    }
}
