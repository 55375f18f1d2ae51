//! Client for executing PxL scripts against a Vizier cluster and streaming
//! back the tables they produce.
//!
//! A [`Client`] discovers clusters and opens a [`Conn`] to one of them; a
//! [`Script`] built from that `Conn` is configured with `subscribe`,
//! `add_callback`, and `subscribe_all_tables` calls and then driven to
//! completion with `run` or `results`.

mod buffer;
mod cancel;
mod cluster;
mod demux;
mod session;
pub mod telemetry;
pub mod testing;
mod transport;

pub use buffer::{TableSub, PullOutcome};
pub use cluster::{Client, ClusterHandle, Conn, ConnectionMode, ControlPlaneTransportFactory};
pub use session::{CallbackFn, ResultsIter, Script, TableSubGenerator};
pub use transport::{
    ClusterStatus, CompilerError, ControlPlaneTransport, Data, DataPlaneTransport,
    DataPlaneTransportFactory, MetaData, RawClusterInfo, RawConnectionInfo, Response,
    ResponseStream, RowBatch, Status,
};

pub use pixie_data::{Column, ColumnType, Row, Schema, TypedColumn, Value};
pub use pixie_errors::{ApiError, ApiResult};

impl Conn {
    /// Starts a new script against this connection.
    pub fn script(&self, text: impl Into<String>) -> Script {
        Script::new(text, self.clone())
    }
}
