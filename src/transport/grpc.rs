//! gRPC transport over a tonic channel.
//!
//! Messages are encoded with the hand-written prost types in
//! [`crate::etcd::proto`] and sent on the method paths etcd serves, so no
//! generated service stubs are needed.

use crate::client::bridge::PendingCall;
use crate::core::config::ConnectionConfig;
use crate::core::error::{ClientError, ClientResult};
use crate::etcd::proto;
use crate::transport::{KvRpc, MaintenanceRpc, StreamCompletion, StreamObserver};
use prost::Message;
use std::sync::Arc;
use tokio::runtime::Handle;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

const KV_RANGE: &str = "/etcdserverpb.KV/Range";
const KV_PUT: &str = "/etcdserverpb.KV/Put";
const KV_DELETE_RANGE: &str = "/etcdserverpb.KV/DeleteRange";
const KV_TXN: &str = "/etcdserverpb.KV/Txn";
const KV_COMPACT: &str = "/etcdserverpb.KV/Compact";
const MAINTENANCE_ALARM: &str = "/etcdserverpb.Maintenance/Alarm";
const MAINTENANCE_STATUS: &str = "/etcdserverpb.Maintenance/Status";
const MAINTENANCE_DEFRAGMENT: &str = "/etcdserverpb.Maintenance/Defragment";
const MAINTENANCE_SNAPSHOT: &str = "/etcdserverpb.Maintenance/Snapshot";

/// Metadata key etcd reads the auth token from.
const TOKEN_METADATA: &str = "token";

/// Transport to one etcd endpoint.
///
/// Cloning shares the underlying channel. Calls run as tasks on the runtime
/// that was current when the transport connected.
#[derive(Clone)]
pub struct GrpcTransport {
    channel: Channel,
    token: Option<AsciiMetadataValue>,
    runtime: Handle,
}

impl GrpcTransport {
    /// Connect to `config.endpoint`, waiting at most the connect timeout.
    ///
    /// Must be awaited inside a tokio runtime.
    pub async fn connect(config: &ConnectionConfig) -> ClientResult<Self> {
        let endpoint = Endpoint::from_shared(config.endpoint.clone())
            .map_err(|e| ClientError::Connect {
                message: format!("invalid endpoint {}: {}", config.endpoint, e),
            })?
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout());

        let token = parse_token(config.auth_token.as_deref())?;
        let channel = endpoint.connect().await.map_err(|e| ClientError::Connect {
            message: format!("{}: {}", config.endpoint, e),
        })?;

        Ok(Self {
            channel,
            token,
            runtime: Handle::current(),
        })
    }

    /// Wrap an existing channel.
    pub fn from_channel(
        channel: Channel,
        auth_token: Option<&str>,
        runtime: Handle,
    ) -> ClientResult<Self> {
        Ok(Self {
            channel,
            token: parse_token(auth_token)?,
            runtime,
        })
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some(token) = &self.token {
            request.metadata_mut().insert(TOKEN_METADATA, token.clone());
        }
        request
    }

    fn unary<Req, Resp>(&self, path: &'static str, message: Req) -> PendingCall<Resp>
    where
        Req: Message + Send + Sync + 'static,
        Resp: Message + Default + Send + Sync + 'static,
    {
        let mut grpc = Grpc::new(self.channel.clone());
        let request = self.request(message);

        PendingCall::spawn_on(&self.runtime, async move {
            grpc.ready()
                .await
                .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
            let codec = ProstCodec::<Req, Resp>::default();
            let response = grpc
                .unary(request, PathAndQuery::from_static(path), codec)
                .await?;
            Ok(response.into_inner())
        })
    }
}

fn parse_token(token: Option<&str>) -> ClientResult<Option<AsciiMetadataValue>> {
    token
        .map(|t| {
            t.parse::<AsciiMetadataValue>()
                .map_err(|_| ClientError::Connect {
                    message: "auth token is not valid ASCII metadata".to_string(),
                })
        })
        .transpose()
}

impl std::fmt::Debug for GrpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransport")
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl KvRpc for GrpcTransport {
    fn range(&self, request: proto::RangeRequest) -> PendingCall<proto::RangeResponse> {
        self.unary(KV_RANGE, request)
    }

    fn put(&self, request: proto::PutRequest) -> PendingCall<proto::PutResponse> {
        self.unary(KV_PUT, request)
    }

    fn delete_range(
        &self,
        request: proto::DeleteRangeRequest,
    ) -> PendingCall<proto::DeleteRangeResponse> {
        self.unary(KV_DELETE_RANGE, request)
    }

    fn txn(&self, request: proto::TxnRequest) -> PendingCall<proto::TxnResponse> {
        self.unary(KV_TXN, request)
    }

    fn compact(&self, request: proto::CompactionRequest) -> PendingCall<proto::CompactionResponse> {
        self.unary(KV_COMPACT, request)
    }
}

impl MaintenanceRpc for GrpcTransport {
    fn status(&self, request: proto::StatusRequest) -> PendingCall<proto::StatusResponse> {
        self.unary(MAINTENANCE_STATUS, request)
    }

    fn defragment(
        &self,
        request: proto::DefragmentRequest,
    ) -> PendingCall<proto::DefragmentResponse> {
        self.unary(MAINTENANCE_DEFRAGMENT, request)
    }

    fn alarm(&self, request: proto::AlarmRequest) -> PendingCall<proto::AlarmResponse> {
        self.unary(MAINTENANCE_ALARM, request)
    }

    fn snapshot(
        &self,
        request: proto::SnapshotRequest,
        observer: Arc<dyn StreamObserver<proto::SnapshotResponse>>,
        mut completion: StreamCompletion,
    ) {
        let mut grpc = Grpc::new(self.channel.clone());
        let request = self.request(request);

        self.runtime.spawn(async move {
            let open = async {
                grpc.ready()
                    .await
                    .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
                let codec =
                    ProstCodec::<proto::SnapshotRequest, proto::SnapshotResponse>::default();
                let path = PathAndQuery::from_static(MAINTENANCE_SNAPSHOT);
                grpc.server_streaming(request, path, codec).await
            };

            let mut stream = tokio::select! {
                _ = completion.completed() => return,
                opened = open => match opened {
                    Ok(response) => response.into_inner(),
                    Err(status) => {
                        observer.on_error(status);
                        return;
                    }
                },
            };

            loop {
                tokio::select! {
                    _ = completion.completed() => {
                        tracing::debug!("snapshot stream closed by caller");
                        return;
                    }
                    message = stream.message() => match message {
                        Ok(Some(chunk)) => observer.on_next(chunk),
                        Ok(None) => {
                            observer.on_completed();
                            return;
                        }
                        Err(status) => {
                            observer.on_error(status);
                            return;
                        }
                    },
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token() {
        assert!(parse_token(None).unwrap().is_none());
        let token = parse_token(Some("abc.def")).unwrap().unwrap();
        assert_eq!(token.to_str().unwrap(), "abc.def");
        assert!(matches!(
            parse_token(Some("line\nbreak")),
            Err(ClientError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn test_token_attached_as_metadata() {
        let channel = Endpoint::from_static("http://127.0.0.1:2379").connect_lazy();
        let transport =
            GrpcTransport::from_channel(channel, Some("secret"), Handle::current()).unwrap();

        let request = transport.request(proto::StatusRequest);
        let token = request.metadata().get(TOKEN_METADATA).unwrap();
        assert_eq!(token.to_str().unwrap(), "secret");
    }
}
