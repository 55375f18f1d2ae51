//! The wire-level shapes this crate depends on and the two narrow
//! transport traits that stand in for the actual RPC client.
//!
//! Wire encoding itself — how these values get serialized onto a gRPC
//! stream — is out of scope here; the transport is responsible for
//! producing already-decoded [`Response`] values (and already-decoded
//! [`pixie_data::TypedColumn`] data within them).

use async_trait::async_trait;
use futures::stream::BoxStream;
use pixie_data::{Column, TypedColumn};
use pixie_errors::ApiResult;
use uuid::Uuid;

/// One compiler-pointed failure location in a non-OK [`Status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerError {
    pub line: i64,
    pub column: i64,
    pub message: String,
}

/// Terminal or interstitial status envelope.
///
/// `code == 0` is the gRPC `OK` convention; any other code is terminal.
/// `compiler_errors` distinguishes a `ScriptCompileError` (non-empty) from
/// a `ScriptValueError` (empty) for a non-OK status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub message: String,
    pub compiler_errors: Vec<CompilerError>,
}

impl Status {
    pub fn ok() -> Status {
        Status {
            code: 0,
            message: String::new(),
            compiler_errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Table-metadata envelope: announces a table id's name and schema.
#[derive(Debug, Clone)]
pub struct MetaData {
    pub table_id: Uuid,
    pub name: String,
    pub relation: Vec<Column>,
}

/// A columnar slab of rows for one table, plus its end-of-stream marker.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub table_id: Uuid,
    pub columns: Vec<TypedColumn>,
    pub num_rows: usize,
    pub eos: bool,
}

/// Data envelope; `batch` is absent for execution-stats-only frames, which
/// this crate has no use for and ignores.
#[derive(Debug, Clone)]
pub struct Data {
    pub batch: Option<RowBatch>,
}

/// One frame of the response stream `ExecuteScript` returns.
#[derive(Debug, Clone)]
pub enum Response {
    Status(Status),
    MetaData(MetaData),
    Data(Data),
}

/// A live, already-decoded `ExecuteScript` response stream.
pub type ResponseStream = BoxStream<'static, ApiResult<Response>>;

/// The control-plane surface: cluster discovery and connection info lookup.
#[async_trait]
pub trait ControlPlaneTransport: Send + Sync {
    async fn get_cluster_info(&self, id: Option<Uuid>) -> ApiResult<Vec<RawClusterInfo>>;
    async fn get_cluster_connection_info(&self, id: Uuid) -> ApiResult<RawConnectionInfo>;
}

/// A control-plane cluster record, exactly as `GetClusterInfo` returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClusterInfo {
    pub id: Uuid,
    pub name: String,
    pub status: ClusterStatus,
    pub passthrough_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Healthy,
    Unhealthy,
    Other,
}

/// The `{address, token}` pair `GetClusterConnectionInfo` returns for a
/// direct (non-passthrough) cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConnectionInfo {
    pub address: String,
    pub token: String,
}

/// A live data-plane connection, bound to one endpoint and token.
#[async_trait]
pub trait DataPlaneTransport: Send + Sync {
    async fn execute_script(&self, script: &str, cluster_id: Uuid) -> ApiResult<ResponseStream>;
}

/// Dials a [`DataPlaneTransport`] bound to a given endpoint and token.
///
/// Mirrors the source's injected `conn_channel_fn`: production code
/// supplies a factory that opens a real gRPC channel, tests supply one
/// that hands back an in-memory fake (see [`crate::testing`]).
#[async_trait]
pub trait DataPlaneTransportFactory: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        token: &str,
    ) -> ApiResult<std::sync::Arc<dyn DataPlaneTransport>>;
}
