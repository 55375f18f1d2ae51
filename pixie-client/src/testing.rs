//! In-memory transport test doubles ("component H"), standing in for the
//! real gRPC-backed control and data planes in tests.
//!
//! A [`FakeDataPlane`] is scripted ahead of time with the exact [`Response`]
//! sequence `execute_script` should yield; this crate's tests build that
//! sequence by hand to exercise the demultiplexer's protocol rules without
//! a real cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pixie_errors::{ApiError, ApiResult};
use uuid::Uuid;

use crate::cluster::ControlPlaneTransportFactory;
use crate::transport::{
    ClusterStatus, ControlPlaneTransport, DataPlaneTransport, DataPlaneTransportFactory,
    RawClusterInfo, RawConnectionInfo, Response, ResponseStream,
};

/// A control plane with a fixed set of clusters and connection info, held
/// in memory for the life of the test.
#[derive(Default)]
pub struct FakeControlPlane {
    clusters: Vec<RawClusterInfo>,
    connection_info: HashMap<Uuid, RawConnectionInfo>,
}

impl FakeControlPlane {
    pub fn new() -> FakeControlPlane {
        FakeControlPlane::default()
    }

    pub fn with_cluster(mut self, cluster: RawClusterInfo) -> FakeControlPlane {
        self.clusters.push(cluster);
        self
    }

    pub fn with_connection_info(mut self, id: Uuid, info: RawConnectionInfo) -> FakeControlPlane {
        self.connection_info.insert(id, info);
        self
    }
}

#[async_trait]
impl ControlPlaneTransport for FakeControlPlane {
    async fn get_cluster_info(&self, id: Option<Uuid>) -> ApiResult<Vec<RawClusterInfo>> {
        Ok(match id {
            Some(id) => self.clusters.iter().filter(|c| c.id == id).cloned().collect(),
            None => self.clusters.clone(),
        })
    }

    async fn get_cluster_connection_info(&self, id: Uuid) -> ApiResult<RawConnectionInfo> {
        self.connection_info
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::protocol(format!("no connection info for cluster {id}")))
    }
}

/// Hands back a pre-built [`FakeControlPlane`], ignoring the server URL and
/// token it's dialed with.
pub struct FakeControlPlaneFactory {
    control: Arc<FakeControlPlane>,
}

impl FakeControlPlaneFactory {
    pub fn new(control: FakeControlPlane) -> FakeControlPlaneFactory {
        FakeControlPlaneFactory {
            control: Arc::new(control),
        }
    }
}

#[async_trait]
impl ControlPlaneTransportFactory for FakeControlPlaneFactory {
    async fn connect(
        &self,
        _server_url: &str,
        _token: &str,
    ) -> ApiResult<Arc<dyn ControlPlaneTransport>> {
        Ok(self.control.clone())
    }
}

/// A data plane that replays a fixed, pre-scripted response sequence for
/// every `execute_script` call, regardless of the script text given.
///
/// `responses` is wrapped in a `Mutex<Option<_>>` so the fake can be used
/// exactly once per connection: a second `execute_script` call on the same
/// fake returns a protocol error rather than silently replaying history,
/// since a real cluster would see an entirely new script each time.
pub struct FakeDataPlane {
    responses: Mutex<Option<Vec<ApiResult<Response>>>>,
}

impl FakeDataPlane {
    pub fn new(responses: Vec<ApiResult<Response>>) -> FakeDataPlane {
        FakeDataPlane {
            responses: Mutex::new(Some(responses)),
        }
    }
}

#[async_trait]
impl DataPlaneTransport for FakeDataPlane {
    async fn execute_script(&self, _script: &str, _cluster_id: Uuid) -> ApiResult<ResponseStream> {
        let responses = self
            .responses
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ApiError::protocol("fake data plane only supports one run"))?;
        // A real gRPC stream yields control between messages as bytes
        // arrive off the wire; without an equivalent yield here, the
        // demultiplexer would tear through the whole scripted sequence in
        // one synchronous burst and no other task would ever interleave
        // with it.
        let yielding = stream::iter(responses).then(|item| async move {
            tokio::task::yield_now().await;
            item
        });
        Ok(Box::pin(yielding))
    }
}

/// Hands back a single pre-built [`FakeDataPlane`], ignoring the address
/// and token it's dialed with.
pub struct FakeDataPlaneFactory {
    data_plane: Arc<FakeDataPlane>,
}

impl FakeDataPlaneFactory {
    pub fn new(data_plane: FakeDataPlane) -> FakeDataPlaneFactory {
        FakeDataPlaneFactory {
            data_plane: Arc::new(data_plane),
        }
    }
}

#[async_trait]
impl DataPlaneTransportFactory for FakeDataPlaneFactory {
    async fn connect(&self, _address: &str, _token: &str) -> ApiResult<Arc<dyn DataPlaneTransport>> {
        Ok(self.data_plane.clone())
    }
}
