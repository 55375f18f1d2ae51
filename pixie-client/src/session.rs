//! The execution session ("component D"): the `Script` type users build up
//! with `subscribe`/`add_callback`/`subscribe_all_tables` calls during a
//! configuration phase, then drive to completion with `run`/`results`.

use std::collections::HashMap;
use std::sync::Arc;

use pixie_data::Row;
use pixie_errors::{ApiError, ApiResult};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::buffer::{TableBuffer, TableSub};
use crate::cancel::Cancel;
use crate::cluster::Conn;
use crate::demux::{run_demultiplexer, Registration};

/// A user-supplied row callback. Returning `Err` aborts the whole run: no
/// further rows reach any table's callbacks after the point of failure.
pub type CallbackFn =
    Box<dyn FnMut(Row) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send>;

enum Subscription {
    Pull(Arc<TableBuffer>),
    Callbacks {
        buffer: Arc<TableBuffer>,
        callbacks: Vec<CallbackFn>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Configuring,
    Running,
    Done,
}

/// One script bound to one cluster connection.
///
/// Calls that add subscriptions or callbacks are only valid while the
/// session is `Configuring`; `run`/`results` move it to `Running` and it
/// never leaves `Done` once the run finishes, successfully or not — a
/// `Script` runs at most once.
pub struct Script {
    text: String,
    conn: Conn,
    state: LifecycleState,
    subscriptions: HashMap<String, Subscription>,
    subscribe_all: bool,
    all_tables_tx: Option<mpsc::UnboundedSender<TableSub>>,
}

/// Handed out by [`Script::subscribe_all_tables`]; yields a [`TableSub`] for
/// every table the script produces that wasn't claimed by a direct
/// `subscribe`/`add_callback` call, in the order its metadata arrives.
pub struct TableSubGenerator {
    rx: mpsc::UnboundedReceiver<TableSub>,
}

impl TableSubGenerator {
    pub async fn next(&mut self) -> Option<TableSub> {
        self.rx.recv().await
    }
}

/// The blocking pull iterator returned by [`Script::results`].
///
/// Bridges the async `TableSub` onto a synchronous `Iterator` by driving a
/// private single-threaded runtime; the run itself was already started in
/// the background on that same runtime when `results` was called.
pub struct ResultsIter {
    rt: tokio::runtime::Runtime,
    sub: TableSub,
}

impl Iterator for ResultsIter {
    type Item = Result<Row, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rt.block_on(self.sub.next_row())
    }
}

impl Script {
    pub(crate) fn new(text: impl Into<String>, conn: Conn) -> Script {
        Script {
            text: text.into(),
            conn,
            state: LifecycleState::Configuring,
            subscriptions: HashMap::new(),
            subscribe_all: false,
            all_tables_tx: None,
        }
    }

    fn require_configuring(&self, what: &str) -> ApiResult<()> {
        match self.state {
            LifecycleState::Configuring => Ok(()),
            LifecycleState::Running => Err(ApiError::lifecycle(format!(
                "cannot {what}: the script is already running"
            ))),
            LifecycleState::Done => Err(ApiError::lifecycle(format!(
                "cannot {what}: the script has already run"
            ))),
        }
    }

    fn claim_for_pull(&mut self, table_name: &str) -> ApiResult<()> {
        if self.subscriptions.contains_key(table_name) {
            return Err(ApiError::lifecycle(format!(
                "already subscribed to table '{table_name}'"
            )));
        }
        Ok(())
    }

    /// Registers `callback` to be invoked, in registration order, for every
    /// row of `table_name`. Multiple `add_callback` calls on the same table
    /// append to that table's callback list; a prior `subscribe` of the
    /// same name is rejected, since that name is already pull-claimed.
    pub fn add_callback(&mut self, table_name: impl Into<String>, callback: CallbackFn) -> ApiResult<()> {
        self.require_configuring("add a callback")?;
        let table_name = table_name.into();
        match self.subscriptions.get_mut(&table_name) {
            Some(Subscription::Callbacks { callbacks, .. }) => {
                callbacks.push(callback);
            }
            Some(Subscription::Pull(_)) => {
                return Err(ApiError::lifecycle(format!(
                    "table '{table_name}' is already subscribed for pull"
                )));
            }
            None => {
                let buffer = TableBuffer::new();
                self.subscriptions.insert(
                    table_name,
                    Subscription::Callbacks {
                        buffer,
                        callbacks: vec![callback],
                    },
                );
            }
        }
        Ok(())
    }

    /// Reserves `table_name` for pull-style consumption; the returned
    /// [`TableSub`] only becomes live once the run starts.
    pub fn subscribe(&mut self, table_name: impl Into<String>) -> ApiResult<()> {
        self.require_configuring("subscribe to a table")?;
        let table_name = table_name.into();
        self.claim_for_pull(&table_name)?;
        let buffer = TableBuffer::new();
        self.subscriptions.insert(table_name, Subscription::Pull(buffer));
        Ok(())
    }

    /// Claims every table not already claimed by a direct `subscribe` or
    /// `add_callback` call. A name explicitly claimed before or after this
    /// call keeps being served by that direct subscription instead; a
    /// direct `subscribe`/`add_callback` for a name already surfaced
    /// through the generator is rejected by `claim`, since by then it would
    /// already be running.
    pub fn subscribe_all_tables(&mut self) -> ApiResult<TableSubGenerator> {
        self.require_configuring("subscribe to all tables")?;
        if self.subscribe_all {
            return Err(ApiError::lifecycle(
                "subscribe_all_tables has already been called for this script",
            ));
        }
        self.subscribe_all = true;
        let (tx, rx) = mpsc::unbounded_channel();
        self.all_tables_tx = Some(tx);
        Ok(TableSubGenerator { rx })
    }

    /// True if any table was claimed with `subscribe` rather than
    /// `add_callback`. `subscribe_all_tables`'s generator doesn't count:
    /// it's meant to be drained concurrently (typically from another
    /// thread) alongside a blocking `run()` call, not in place of one.
    fn has_outstanding_pull_subscriptions(&self) -> bool {
        self.subscriptions
            .values()
            .any(|s| matches!(s, Subscription::Pull(_)))
    }

    /// Subscribes to `table_name` and returns a blocking iterator over its
    /// rows, starting the run in the background if it hasn't started yet.
    pub fn results(mut self, table_name: impl Into<String>) -> ApiResult<ResultsIter> {
        let table_name = table_name.into();
        self.subscribe(table_name.clone())?;
        let buffer = match self.subscriptions.get(&table_name) {
            Some(Subscription::Pull(buffer)) => buffer.clone(),
            _ => unreachable!("subscribe just inserted a Pull subscription"),
        };
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::protocol(format!("failed to start client runtime: {e}")))?;
        let handle = rt.handle().clone();
        self.state = LifecycleState::Running;
        handle.spawn(self.run_async());
        Ok(ResultsIter {
            rt,
            sub: TableSub::new(table_name, buffer),
        })
    }

    /// Runs the script to completion, blocking the calling thread.
    ///
    /// Only valid when every subscription on this script is callback-based:
    /// a script with outstanding pull subscriptions must be driven through
    /// `results` instead, since nothing would ever read those buffers.
    pub fn run(mut self) -> ApiResult<()> {
        if self.has_outstanding_pull_subscriptions() {
            return Err(ApiError::lifecycle(
                "cannot call run() on a script with outstanding pull subscriptions; use results() instead",
            ));
        }
        self.state = LifecycleState::Running;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::protocol(format!("failed to start client runtime: {e}")))?;
        rt.block_on(self.run_async())
    }

    async fn run_async(mut self) -> ApiResult<()> {
        let cluster_id = self.conn.cluster_id();
        debug!(cluster = %cluster_id, "executing script");
        let stream = self.conn.transport.execute_script(&self.text, cluster_id).await?;

        let cancel = Cancel::new();
        let mut joins: JoinSet<ApiResult<()>> = JoinSet::new();
        // Only the directly subscribed names are ever checked for
        // "table never received" at clean stream end: subscribe_all_tables'
        // sink has no fixed set of expected names to compare against.
        let subscribed_names: std::collections::HashSet<String> =
            self.subscriptions.keys().cloned().collect();

        // Buffers not yet bound to a table id, keyed by name. Shared with
        // the register closure so that any buffer the stream never got
        // around to naming still gets closed once the demultiplexer
        // finishes, instead of leaving its consumer blocked forever.
        let remaining: Arc<parking_lot::Mutex<HashMap<String, Arc<TableBuffer>>>> =
            Arc::new(parking_lot::Mutex::new(HashMap::new()));
        for (name, sub) in self.subscriptions.drain() {
            match sub {
                Subscription::Pull(buffer) => {
                    remaining.lock().insert(name, buffer);
                }
                Subscription::Callbacks { buffer, callbacks } => {
                    remaining.lock().insert(name.clone(), buffer.clone());
                    let cancel = cancel.clone();
                    joins.spawn(run_callback_loop(name, buffer, callbacks, cancel));
                }
            }
        }

        let subscribe_all = self.subscribe_all;
        let all_tables_tx = self.all_tables_tx.take();

        let register_remaining = remaining.clone();
        let register = move |_id: uuid::Uuid, name: &str, _schema: Arc<pixie_data::Schema>| {
            if let Some(buffer) = register_remaining.lock().remove(name) {
                return Registration::Deliver(buffer);
            }
            if subscribe_all {
                let buffer = TableBuffer::new();
                if let Some(tx) = &all_tables_tx {
                    let _ = tx.send(TableSub::new(name.to_string(), buffer.clone()));
                }
                return Registration::Deliver(buffer);
            }
            Registration::Drop
        };

        let demux_cancel = cancel.clone();
        let demux_result = tokio::spawn(run_demultiplexer(
            stream,
            register,
            subscribed_names,
            demux_cancel,
        ))
        .await;

        let mut first_error: Option<ApiError> = None;
        match demux_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => first_error = Some(e),
            Err(join_err) => {
                warn!(error = %join_err, "the stream demultiplexer task panicked");
                first_error = Some(ApiError::protocol(format!(
                    "internal task failure: {join_err}"
                )));
            }
        }

        // Any buffer the demultiplexer never got around to naming (e.g. a
        // subscribed table whose metadata never arrived) would otherwise
        // leave its consumer task blocked on an empty buffer forever.
        let leftover: Vec<Arc<TableBuffer>> = remaining.lock().drain().map(|(_, b)| b).collect();
        if !leftover.is_empty() {
            let err = first_error
                .clone()
                .unwrap_or_else(|| ApiError::protocol("table never bound to a stream id"));
            for buffer in leftover {
                buffer.close_err(err.clone());
            }
        }

        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "a callback task panicked");
                    if first_error.is_none() {
                        first_error = Some(ApiError::protocol(format!(
                            "internal task failure: {join_err}"
                        )));
                    }
                }
            }
        }

        self.state = LifecycleState::Done;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Drains one table's buffer and feeds every row to its callbacks in order,
/// signalling `cancel` (and stopping) on the first callback error or the
/// buffer's own terminal error.
async fn run_callback_loop(
    table_name: String,
    buffer: Arc<TableBuffer>,
    mut callbacks: Vec<CallbackFn>,
    cancel: Cancel,
) -> ApiResult<()> {
    let mut sub = TableSub::new(table_name.clone(), buffer);
    loop {
        match sub.next_row().await {
            None => return Ok(()),
            Some(Err(err)) => {
                cancel.signal(err.clone());
                return Err(err);
            }
            Some(Ok(row)) => {
                for callback in callbacks.iter_mut() {
                    if let Err(e) = callback(row.clone()) {
                        let err = ApiError::callback(e);
                        debug!(table = %table_name, error = %err, "callback failed");
                        cancel.signal(err.clone());
                        return Err(err);
                    }
                }
            }
        }
    }
}

