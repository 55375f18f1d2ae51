//! The stream demultiplexer ("component C"): consumes the ordered server
//! response stream, routes each message to the right [`TableBuffer`],
//! enforces the wire protocol's invariants, and translates a terminal
//! status into a typed error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use pixie_data::{decode_row_batch, Schema};
use pixie_errors::{ApiError, ApiResult};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::buffer::TableBuffer;
use crate::cancel::Cancel;
use crate::transport::{Response, ResponseStream, Status};

/// What the registration callback decides for a newly seen table.
pub enum Registration {
    /// Deliver rows for this table into the given buffer.
    Deliver(Arc<TableBuffer>),
    /// Nobody subscribed to this table; decode and discard its rows.
    Drop,
}

enum TableState {
    Open { buffer: Arc<TableBuffer>, schema: Arc<Schema> },
    Dropped { schema: Arc<Schema> },
}

fn status_to_error(status: Status) -> ApiError {
    if let Some(first) = status.compiler_errors.into_iter().next() {
        ApiError::ScriptCompileError {
            line: first.line,
            column: first.column,
            message: first.message,
        }
    } else {
        ApiError::ScriptValueError(status.message)
    }
}

/// Drives one execution's response stream to completion.
///
/// `register` is invoked once per newly observed table id, in the order
/// its metadata arrives; `subscribed_names` is the full set of table names
/// the caller registered a consumer for before the run started, used for
/// the "table never received" check at clean stream end. `cancel` is
/// signalled by this function on its own terminal errors and watched so
/// that a callback task's failure elsewhere in the run stops the reader
/// before it feeds any other table another row.
///
/// Returns the session's single terminal outcome: `Ok(())` if the stream
/// ended cleanly and every subscribed table was satisfied, otherwise the
/// first error observed, by the priority rules in the execution session's
/// contract.
pub async fn run_demultiplexer(
    mut stream: ResponseStream,
    mut register: impl FnMut(Uuid, &str, Arc<Schema>) -> Registration,
    subscribed_names: HashSet<String>,
    cancel: Cancel,
) -> ApiResult<()> {
    let mut tables: HashMap<Uuid, TableState> = HashMap::new();
    let mut closed_ids: HashSet<Uuid> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    debug!("stream demultiplexer started");

    loop {
        let item = tokio::select! {
            biased;
            err = cancel.cancelled() => {
                debug!(error = %err, "demultiplexer cancelled by a failing consumer");
                return Err(fail_all(&tables, err).await);
            }
            item = stream.next() => item,
        };
        let Some(item) = item else {
            break;
        };

        let response = match item {
            Ok(r) => r,
            Err(e) => {
                cancel.signal(e.clone());
                return Err(fail_all(&tables, e).await);
            }
        };

        match response {
            Response::Status(status) => {
                if !status.is_ok() {
                    let err = status_to_error(status);
                    debug!(error = %err, "server returned terminal status");
                    cancel.signal(err.clone());
                    return Err(fail_all(&tables, err).await);
                }
                trace!("ignoring interstitial OK status");
            }

            Response::MetaData(meta) => {
                if tables.contains_key(&meta.table_id) || closed_ids.contains(&meta.table_id) {
                    let err = ApiError::protocol(format!("duplicate table id {}", meta.table_id));
                    cancel.signal(err.clone());
                    return Err(fail_all(&tables, err).await);
                }
                let schema = match Schema::new(meta.relation) {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        cancel.signal(e.clone());
                        return Err(fail_all(&tables, e).await);
                    }
                };
                trace!(table = %meta.table_id, name = %meta.name, "table metadata observed");
                seen_names.insert(meta.name.clone());
                match register(meta.table_id, &meta.name, schema.clone()) {
                    Registration::Deliver(buffer) => {
                        tables.insert(meta.table_id, TableState::Open { buffer, schema });
                    }
                    Registration::Drop => {
                        tables.insert(meta.table_id, TableState::Dropped { schema });
                    }
                }
            }

            Response::Data(data) => {
                let Some(batch) = data.batch else {
                    continue;
                };
                let table_id = batch.table_id;
                let eos = batch.eos;
                let num_rows = batch.num_rows;

                match tables.get(&table_id) {
                    None => {
                        let err =
                            ApiError::protocol(format!("row batch for unknown table id {table_id}"));
                        cancel.signal(err.clone());
                        return Err(fail_all(&tables, err).await);
                    }
                    Some(TableState::Dropped { schema }) => {
                        trace!(table = %table_id, rows = num_rows, "discarding row batch for unsubscribed table");
                        if let Err(e) = decode_row_batch(schema, batch.columns, num_rows) {
                            cancel.signal(e.clone());
                            return Err(fail_all(&tables, e).await);
                        }
                    }
                    Some(TableState::Open { buffer, schema }) => {
                        let rows = match decode_row_batch(schema, batch.columns, num_rows) {
                            Ok(rows) => rows,
                            Err(e) => {
                                cancel.signal(e.clone());
                                return Err(fail_all(&tables, e).await);
                            }
                        };
                        trace!(table = %table_id, rows = rows.len(), "pushing row batch");
                        buffer.push_rows(rows).await;
                    }
                }

                if eos {
                    if let Some(TableState::Open { buffer, .. }) = tables.remove(&table_id) {
                        buffer.close_ok();
                    } else {
                        tables.remove(&table_id);
                    }
                    closed_ids.insert(table_id);
                    trace!(table = %table_id, "end-of-stream observed");
                }
            }
        }
    }

    // Stream ended cleanly: reconcile against every table that never got
    // an end-of-stream and every subscribed name that never got metadata.
    let mut outcome: Option<ApiError> = None;
    for (_, state) in tables.drain() {
        if let TableState::Open { buffer, .. } = state {
            let err = ApiError::UnexpectedEndOfStream;
            buffer.close_err(err.clone());
            outcome.get_or_insert(err);
        }
    }
    for name in &subscribed_names {
        if !seen_names.contains(name) {
            outcome.get_or_insert_with(|| ApiError::TableNotReceived { table: name.clone() });
        }
    }

    debug!(ok = outcome.is_none(), "stream demultiplexer finished");
    match outcome {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn fail_all(tables: &HashMap<Uuid, TableState>, err: ApiError) -> ApiError {
    for state in tables.values() {
        if let TableState::Open { buffer, .. } = state {
            buffer.close_err(err.clone());
        }
    }
    err
}
