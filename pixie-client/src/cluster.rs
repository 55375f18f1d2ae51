//! Cluster discovery and connection ("component E" of the execution
//! pipeline): list clusters from the control plane, then resolve a chosen
//! cluster to a live data-plane transport.

use std::sync::Arc;

use async_trait::async_trait;
use pixie_errors::ApiResult;
use tracing::debug;
use uuid::Uuid;

use crate::transport::{
    ClusterStatus, ControlPlaneTransport, DataPlaneTransport, DataPlaneTransportFactory,
};

/// Dials the control-plane transport bound to the cloud server's URL and
/// the client's access token. The data-plane analogue is
/// [`DataPlaneTransportFactory`]; this one exists because a `Client` only
/// ever needs a single control-plane connection, opened once.
#[async_trait]
pub trait ControlPlaneTransportFactory: Send + Sync {
    async fn connect(
        &self,
        server_url: &str,
        token: &str,
    ) -> ApiResult<Arc<dyn ControlPlaneTransport>>;
}

/// Whether a cluster is reached via the cloud endpoint (passthrough) or a
/// directly resolved in-cluster endpoint.
///
/// The `Direct` address and per-cluster token are not part of this value —
/// they are fetched from the control plane lazily, the first time
/// [`Client::connect_to_cluster`] is called for the cluster — so this type
/// only carries the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Passthrough,
    Direct,
}

/// A cluster record as returned by `list_healthy_clusters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    pub id: Uuid,
    pub name: String,
    pub status: ClusterStatus,
    pub connection_mode: ConnectionMode,
}

/// A connection to one cluster's data plane, ready to run scripts against.
#[derive(Clone)]
pub struct Conn {
    pub(crate) cluster_id: Uuid,
    pub(crate) transport: Arc<dyn DataPlaneTransport>,
}

impl Conn {
    pub fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }
}

/// Top-level entry point: discovers clusters and opens connections to them.
pub struct Client {
    token: String,
    server_url: String,
    control: Arc<dyn ControlPlaneTransport>,
    data_plane_factory: Arc<dyn DataPlaneTransportFactory>,
}

impl Client {
    /// Connects the control-plane transport and returns a ready `Client`.
    ///
    /// `control_factory` and `data_plane_factory` are the two injection
    /// points the source's `channel_fn`/`conn_channel_fn` correspond to;
    /// production callers supply real gRPC-backed factories, tests supply
    /// the fakes in [`crate::testing`].
    pub async fn new(
        token: impl Into<String>,
        server_url: impl Into<String>,
        control_factory: Arc<dyn ControlPlaneTransportFactory>,
        data_plane_factory: Arc<dyn DataPlaneTransportFactory>,
    ) -> ApiResult<Client> {
        let token = token.into();
        let server_url = server_url.into();
        let control = control_factory.connect(&server_url, &token).await?;
        Ok(Client {
            token,
            server_url,
            control,
            data_plane_factory,
        })
    }

    /// Lists clusters known to the control plane whose status is healthy.
    pub async fn list_healthy_clusters(&self) -> ApiResult<Vec<ClusterHandle>> {
        let all = self.control.get_cluster_info(None).await?;
        let healthy: Vec<ClusterHandle> = all
            .into_iter()
            .filter(|c| c.status == ClusterStatus::Healthy)
            .map(|c| ClusterHandle {
                id: c.id,
                name: c.name,
                status: c.status,
                connection_mode: if c.passthrough_enabled {
                    ConnectionMode::Passthrough
                } else {
                    ConnectionMode::Direct
                },
            })
            .collect();
        debug!(
            total = healthy.len(),
            "listed healthy clusters from control plane"
        );
        Ok(healthy)
    }

    /// Opens a data-plane connection to `cluster`, resolving passthrough vs
    /// direct mode per [`ConnectionMode`].
    pub async fn connect_to_cluster(&self, cluster: &ClusterHandle) -> ApiResult<Conn> {
        let transport = match cluster.connection_mode {
            ConnectionMode::Passthrough => {
                debug!(cluster = %cluster.id, "connecting via passthrough (cloud endpoint)");
                self.data_plane_factory
                    .connect(&self.server_url, &self.token)
                    .await?
            }
            ConnectionMode::Direct => {
                let info = self.control.get_cluster_connection_info(cluster.id).await?;
                debug!(cluster = %cluster.id, address = %info.address, "connecting directly");
                self.data_plane_factory
                    .connect(&info.address, &info.token)
                    .await?
            }
        };
        Ok(Conn {
            cluster_id: cluster.id,
            transport,
        })
    }
}
