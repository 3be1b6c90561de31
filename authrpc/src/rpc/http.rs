use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, future::BoxFuture};
use serde::de::DeserializeOwned;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::{
    bindings::ServerDescriptor,
    error::Result,
    rpc::{
        CallContext, RpcError, RpcMessage, RpcResult, RpcService, RpcServiceKind, RpcStream,
        client::HttpSession,
    },
};

/// Content type of a subscription response: one JSON message per line.
pub(crate) const NDJSON: &str = "application/x-ndjson";

/// A mounted service with its message types erased, driven by raw JSON.
pub trait HttpInstance: Send + Sync + 'static {
    fn label(&self) -> &'static str;

    fn descriptor(&self) -> ServerDescriptor;

    fn handle_json<'h, 'q, 'f>(
        &'h self,
        ctx: &'q CallContext,
        q: &'q [u8],
    ) -> BoxFuture<'f, RpcResult<Vec<u8>>>
    where
        'h: 'f,
        'q: 'f;

    /// Open a subscription, yielding each item already serialized.
    fn subscribe_json<'h, 'q, 'f>(
        &'h self,
        ctx: &'q CallContext,
        q: &'q [u8],
    ) -> BoxFuture<'f, RpcResult<RpcStream<Vec<u8>>>>
    where
        'h: 'f,
        'q: 'f;
}

fn parse_request<K: RpcServiceKind>(q: &[u8]) -> RpcResult<K::Request> {
    serde_json::from_slice(q).map_err(|e| RpcError::BadRequest(format!("request parse error: {e}")))
}

pub struct DefaultHttpInstance<S: RpcService>(pub Arc<S>);

impl<S: RpcService> HttpInstance for DefaultHttpInstance<S> {
    fn label(&self) -> &'static str {
        <S::Kind as RpcServiceKind>::LABEL
    }

    fn descriptor(&self) -> ServerDescriptor {
        <S::Kind as RpcServiceKind>::descriptor()
    }

    fn handle_json<'h, 'q, 'f>(
        &'h self,
        ctx: &'q CallContext,
        q: &'q [u8],
    ) -> BoxFuture<'f, RpcResult<Vec<u8>>>
    where
        'h: 'f,
        'q: 'f,
    {
        Box::pin(async move {
            let q = parse_request::<S::Kind>(q)?;
            log::debug!("incoming RPC: {}.{}", self.label(), q.verb());
            let a = self.0.handle(ctx, q).await?;
            let res = match serde_json::to_vec(&a) {
                Ok(res) => res,
                Err(e) => Err(RpcError::Misc(format!("serialization failed: {e}")))?,
            };
            Ok(res)
        })
    }

    fn subscribe_json<'h, 'q, 'f>(
        &'h self,
        ctx: &'q CallContext,
        q: &'q [u8],
    ) -> BoxFuture<'f, RpcResult<RpcStream<Vec<u8>>>>
    where
        'h: 'f,
        'q: 'f,
    {
        Box::pin(async move {
            let q = parse_request::<S::Kind>(q)?;
            let label = self.label();
            log::debug!("incoming subscription: {label}.{}", q.verb());
            let items = self.0.subscribe(ctx, q).await?;
            let items = items.filter_map(move |a| {
                let res = match serde_json::to_vec(&a) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        log::error!("{label}: dropping subscription item: {e}");
                        None
                    }
                };
                futures::future::ready(res)
            });
            Ok(items.boxed())
        })
    }
}

type Handlers = Arc<HashMap<&'static str, Arc<dyn HttpInstance>>>;

#[derive(Clone)]
struct ServerState {
    handlers: Handlers,
    revision: Arc<str>,
}

impl ServerState {
    fn handler(&self, label: &str) -> RpcResult<Arc<dyn HttpInstance>> {
        self.handlers
            .get(label)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("no handler for {label}")))
    }
}

/// An HTTP server exposing mounted services under `/rpc/{label}`, with
/// subscriptions under `/rpc/{label}/subscribe`.
pub struct RpcServer {
    handlers: HashMap<&'static str, Arc<dyn HttpInstance>>,
    extra: axum::Router,
    revision: String,
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServer {
    pub fn new() -> RpcServer {
        RpcServer {
            handlers: HashMap::new(),
            extra: axum::Router::new(),
            revision: "unknown".to_owned(),
        }
    }

    /// The revision reported alongside each descriptor.
    pub fn with_revision<S: Into<String>>(mut self, revision: S) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn mount<S: RpcService>(self, service: S) -> Self {
        self.mount_instance(Arc::new(DefaultHttpInstance(Arc::new(service))))
    }

    pub fn mount_instance(mut self, instance: Arc<dyn HttpInstance>) -> Self {
        let label = instance.label();
        if self.handlers.insert(label, instance).is_some() {
            log::warn!("service {label} mounted twice, keeping the last one");
        }
        self
    }

    /// The interface of every mounted service, each nested under its label.
    pub fn descriptor<S: Into<String>>(&self, name: S) -> ServerDescriptor {
        self.handlers
            .iter()
            .fold(ServerDescriptor::new(name), |desc, (label, h)| {
                desc.nest(*label, h.descriptor())
            })
    }

    /// Serve additional routes next to the RPC endpoints.
    pub fn merge(mut self, router: axum::Router) -> Self {
        self.extra = self.extra.merge(router);
        self
    }

    pub fn into_router(self) -> axum::Router {
        let state = ServerState {
            handlers: Arc::new(self.handlers),
            revision: self.revision.into(),
        };
        axum::Router::new()
            .route(
                "/rpc/{label}",
                axum::routing::post(rpc_call).get(rpc_describe),
            )
            .route("/rpc/{label}/subscribe", axum::routing::post(rpc_subscribe))
            .with_state(state)
            .merge(self.extra)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let labels: Vec<&str> = self.handlers.keys().copied().collect();
        log::info!(
            "rpc server listening on {:?} with services {:?}",
            listener.local_addr()?,
            labels
        );
        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown)
            .await?;
        log::info!("rpc server stopped");
        Ok(())
    }

    /// Bind `addr` and serve in a background task.
    pub async fn spawn(self, addr: SocketAddr) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(self.serve(listener, async move {
            let _ = rx.await;
        }));
        Ok(ServerHandle {
            addr,
            shutdown: tx,
            task,
        })
    }
}

/// A server running in the background.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for in-flight calls to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task.await?
    }
}

async fn rpc_call(
    State(state): State<ServerState>,
    Path(label): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> RpcResult<Response> {
    let handler = state.handler(&label)?;
    let ctx = CallContext::from_headers(&headers);
    let res = handler.handle_json(&ctx, &body).await;
    if let Err(e) = &res {
        log::debug!("rpc {label} failed: {e}");
    }
    let bytes = res?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn rpc_subscribe(
    State(state): State<ServerState>,
    Path(label): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> RpcResult<Response> {
    let handler = state.handler(&label)?;
    let ctx = CallContext::from_headers(&headers);
    let items = handler.subscribe_json(&ctx, &body).await.inspect_err(|e| {
        log::debug!("subscription {label} failed: {e}");
    })?;
    let lines = items.map(|mut line| {
        line.push(b'\n');
        Ok::<_, Infallible>(Bytes::from(line))
    });
    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

async fn rpc_describe(
    State(state): State<ServerState>,
    Path(label): Path<String>,
) -> RpcResult<Response> {
    let h = state.handler(&label)?;
    let dump = h.descriptor().to_dump(h.label(), state.revision.as_ref());
    Ok(axum::Json(dump).into_response())
}

pub(crate) async fn http_call<K: RpcServiceKind>(
    session: &HttpSession,
    q: &K::Request,
) -> RpcResult<K::Response> {
    let path = format!("/rpc/{}", K::LABEL);
    log::debug!("outgoing RPC: {}.{} -> {}", K::LABEL, q.verb(), session.url(&path));
    let resp = session.post_json(&path, q).await?;
    let resp = error_for_status(resp).await?;
    let resp_msg = resp.json::<K::Response>().await?;
    Ok(resp_msg)
}

pub(crate) async fn http_subscribe<K: RpcServiceKind>(
    session: &HttpSession,
    q: &K::Request,
) -> RpcResult<RpcStream<RpcResult<K::Response>>> {
    let path = format!("/rpc/{}/subscribe", K::LABEL);
    log::debug!("outgoing subscription: {}.{} -> {}", K::LABEL, q.verb(), session.url(&path));
    let resp = session.post_stream(&path, q).await?;
    let resp = error_for_status(resp).await?;
    Ok(ndjson_lines(resp))
}

/// Decode a response body holding one JSON message per line. A transport
/// error is yielded once and ends the stream.
fn ndjson_lines<T: DeserializeOwned + Send + 'static>(
    resp: reqwest::Response,
) -> RpcStream<RpcResult<T>> {
    let body = resp.bytes_stream().boxed();
    let state = (body, Vec::<u8>::new(), false);
    futures::stream::unfold(state, |(mut body, mut buf, mut done)| async move {
        loop {
            if let Some(end) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=end).collect();
                if end == 0 {
                    continue;
                }
                let item = serde_json::from_slice::<T>(&line[..end]).map_err(RpcError::from);
                return Some((item, (body, buf, done)));
            }
            if done {
                if buf.is_empty() {
                    return None;
                }
                let item = serde_json::from_slice::<T>(&buf).map_err(RpcError::from);
                buf.clear();
                return Some((item, (body, buf, done)));
            }
            match body.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    buf.clear();
                    return Some((Err(RpcError::from(e)), (body, buf, true)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}

/// Turn a non-2xx response into the `RpcError` carried in its body.
pub(crate) async fn error_for_status(resp: reqwest::Response) -> RpcResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match resp.json::<RpcError>().await {
        Ok(e) => Err(e),
        Err(_) if status.is_server_error() => {
            Err(RpcError::Spurious(format!("server responded {status}")))
        }
        Err(_) => Err(RpcError::Misc(format!("server responded {status}"))),
    }
}
