// ABOUTME: Resource gateway speaking JSON over HTTP/1.1 to a control-plane bridge.
// ABOUTME: Connects over TCP or a Unix socket; one connection per request.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper::{Method, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use nonempty::NonEmpty;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::path::PathBuf;
use tokio::net::{TcpStream, UnixStream};

use super::ResourceGateway;
use super::error::{GatewayError, ResourceKind};
use super::model::{ComputeGroup, Instance, LoadBalancer, TargetGroup};
use crate::types::{InstanceId, ResourceName};

/// Failures talking to the bridge, before any response could be interpreted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("invalid gateway endpoint {endpoint}: {reason}"))]
    InvalidEndpoint { endpoint: String, reason: String },

    #[snafu(display("failed to connect to {endpoint}: {source}"))]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[snafu(display("HTTP handshake with {endpoint} failed: {source}"))]
    Handshake {
        endpoint: String,
        source: hyper::Error,
    },

    #[snafu(display("failed to build request for {path}: {reason}"))]
    BuildRequest { path: String, reason: String },

    #[snafu(display("request to {path} failed: {source}"))]
    Request { path: String, source: hyper::Error },

    #[snafu(display("failed to read response from {path}: {source}"))]
    ReadBody { path: String, source: hyper::Error },
}

/// Where the bridge listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
        base_path: String,
    },
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse an `http://host[:port][/prefix]` URL.
    pub fn http(url: &str) -> Result<Self, TransportError> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })?;

        if uri.scheme_str() != Some("http") {
            return InvalidEndpointSnafu {
                endpoint: url,
                reason: "only http:// endpoints are supported",
            }
            .fail();
        }

        let host = match uri.host() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return InvalidEndpointSnafu {
                    endpoint: url,
                    reason: "missing host",
                }
                .fail();
            }
        };

        Ok(Endpoint::Tcp {
            host,
            port: uri.port_u16().unwrap_or(80),
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    fn host_header(&self) -> String {
        match self {
            Endpoint::Tcp { host, port, .. } => format!("{host}:{port}"),
            Endpoint::Unix(_) => "localhost".to_string(),
        }
    }

    fn path(&self, path: &str) -> String {
        match self {
            Endpoint::Tcp { base_path, .. } => format!("{base_path}{path}"),
            Endpoint::Unix(_) => path.to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp {
                host,
                port,
                base_path,
            } => write!(f, "http://{host}:{port}{base_path}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[derive(Serialize)]
struct TerminateRequest<'a> {
    instance_ids: Vec<&'a InstanceId>,
}

/// Gateway backed by a JSON control-plane bridge.
///
/// | call                  | request                                   |
/// |-----------------------|-------------------------------------------|
/// | `get_compute_group`   | `GET /compute-groups/{name}`              |
/// | `get_target_group`    | `GET /target-groups/{name}`               |
/// | `get_load_balancer`   | `GET /load-balancers/{name}`              |
/// | `get_instance`        | `GET /instances/{id}`                     |
/// | `terminate_instances` | `POST /instances/terminate`               |
///
/// A 404 maps to [`GatewayError::NotFound`].
#[derive(Debug, Clone)]
pub struct HttpGateway {
    endpoint: Endpoint,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self) -> Result<SendRequest<Full<Bytes>>, TransportError> {
        let endpoint = self.endpoint.to_string();
        match &self.endpoint {
            Endpoint::Tcp { host, port, .. } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .context(ConnectSnafu {
                        endpoint: endpoint.clone(),
                    })?;
                handshake(TokioIo::new(stream), endpoint).await
            }
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await.context(ConnectSnafu {
                    endpoint: endpoint.clone(),
                })?;
                handshake(TokioIo::new(stream), endpoint).await
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), TransportError> {
        let mut sender = self.connect().await?;
        let uri = self.endpoint.path(path);

        let mut builder = hyper::Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header("Host", self.endpoint.host_header())
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }

        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| TransportError::BuildRequest {
                path: uri.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!("{} {}", method, uri);

        let resp = sender
            .send_request(req)
            .await
            .context(RequestSnafu { path: uri.clone() })?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .context(ReadBodySnafu { path: uri })?
            .to_bytes();

        Ok((status, body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<T, GatewayError> {
        let (status, body) = self.send(Method::GET, path, None).await?;
        decode(status, &body, kind, name)
    }
}

async fn handshake<T>(io: T, endpoint: String) -> Result<SendRequest<Full<Bytes>>, TransportError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .context(HandshakeSnafu {
            endpoint: endpoint.clone(),
        })?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::warn!("gateway connection to {} failed: {}", endpoint, e);
        }
    });

    Ok(sender)
}

fn decode<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
    kind: ResourceKind,
    name: &str,
) -> Result<T, GatewayError> {
    if status == StatusCode::NOT_FOUND {
        return Err(GatewayError::not_found(kind, name));
    }
    check_status(status, body)?;
    serde_json::from_slice(body).map_err(|e| GatewayError::Decode(format!("{kind} {name}: {e}")))
}

fn check_status(status: StatusCode, body: &[u8]) -> Result<(), GatewayError> {
    if status.is_success() {
        return Ok(());
    }
    Err(GatewayError::Rejected {
        status: status.as_u16(),
        message: String::from_utf8_lossy(body).trim().to_string(),
    })
}

#[async_trait]
impl ResourceGateway for HttpGateway {
    async fn get_compute_group(&self, name: &ResourceName) -> Result<ComputeGroup, GatewayError> {
        let path = format!("/compute-groups/{}", urlencoding::encode(name.as_str()));
        self.get_json(&path, ResourceKind::ComputeGroup, name.as_str())
            .await
    }

    async fn get_target_group(&self, name: &ResourceName) -> Result<TargetGroup, GatewayError> {
        let path = format!("/target-groups/{}", urlencoding::encode(name.as_str()));
        self.get_json(&path, ResourceKind::TargetGroup, name.as_str())
            .await
    }

    async fn get_load_balancer(&self, name: &ResourceName) -> Result<LoadBalancer, GatewayError> {
        let path = format!("/load-balancers/{}", urlencoding::encode(name.as_str()));
        self.get_json(&path, ResourceKind::LoadBalancer, name.as_str())
            .await
    }

    async fn terminate_instances(&self, ids: &NonEmpty<InstanceId>) -> Result<(), GatewayError> {
        let request = TerminateRequest {
            instance_ids: ids.iter().collect(),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| GatewayError::Decode(format!("terminate request: {e}")))?;

        let (status, body) = self
            .send(Method::POST, "/instances/terminate", Some(body))
            .await?;

        if status == StatusCode::NOT_FOUND {
            let ids: Vec<&str> = ids.iter().map(InstanceId::as_str).collect();
            return Err(GatewayError::not_found(
                ResourceKind::Instance,
                ids.join(", "),
            ));
        }
        check_status(status, &body)
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance, GatewayError> {
        let path = format!("/instances/{}", urlencoding::encode(id.as_str()));
        self.get_json(&path, ResourceKind::Instance, id.as_str())
            .await
    }
}
