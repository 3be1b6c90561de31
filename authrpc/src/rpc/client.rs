use std::{marker::PhantomData, sync::Arc, time::Duration};

use authrpc_schemas::DumpServer;
use futures::StreamExt;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Serialize;

use crate::{
    cookie::CookieStore,
    retry::{self, Retry, RetryStrategy},
    rpc::{
        CallContext, RpcError, RpcRequest, RpcResult, RpcService, RpcServiceKind, RpcStream,
        http::{self, DefaultHttpInstance, HttpInstance},
    },
};

/// The default retry strategy for RPC clients: 5 attempts with exponential
/// backoff, starting with a delay between 100 and 200 millis. Only queries are
/// retried.
pub const DEFAULT_RETRY: Retry = Retry::jitter_millis(100..=200)
    .with_max_attempts(5)
    .with_backoff(1.5);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An HTTP connection to a server, with the cookies it has handed out.
///
/// Cloning values of this type will result in sessions that share the cookie
/// jar and the underlying connection pool.
#[derive(Clone)]
pub struct HttpSession {
    http: reqwest::Client,
    base: Arc<str>,
    timeout: Duration,
    cookies: CookieStore,
}

impl HttpSession {
    /// `base` is the server root, e.g. `http://127.0.0.1:9944`.
    pub fn new<S: AsRef<str>>(base: S) -> HttpSession {
        HttpSession {
            http: reqwest::Client::new(),
            base: base.as_ref().trim_end_matches('/').into(),
            timeout: DEFAULT_TIMEOUT,
            cookies: CookieStore::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// POST a JSON body to `path`, sending the jar and absorbing any cookies
    /// set by the response. The status is not checked.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> RpcResult<reqwest::Response> {
        let req = self.http.post(self.url(path)).json(body);
        self.send(req.timeout(self.timeout)).await
    }

    /// Like `post_json`, but without the timeout, since the response body
    /// may stay open for as long as the server keeps streaming.
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> RpcResult<reqwest::Response> {
        let req = self.http.post(self.url(path)).json(body);
        self.send(req).await
    }

    pub async fn get(&self, path: &str) -> RpcResult<reqwest::Response> {
        let req = self.http.get(self.url(path));
        self.send(req.timeout(self.timeout)).await
    }

    async fn send(&self, mut req: reqwest::RequestBuilder) -> RpcResult<reqwest::Response> {
        if let Some(cookie) = self.cookies.header() {
            req = req.header(COOKIE, cookie);
        }
        let resp = req.send().await?;
        self.cookies.absorb(
            resp.headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        Ok(resp)
    }
}

#[derive(Clone)]
enum Transport {
    Http(HttpSession),
    Local(Arc<dyn HttpInstance>, CookieStore),
}

/// A client for making requests to an RPC service.
///
/// Cloning values of this type will result in clients that share resources
/// such as cookies and connection pools.
///
/// The `Client` struct defined by the [`rpc_service!`][crate::rpc_service]
/// macro is a thin wrapper around this type.
pub struct RpcClient<K: RpcServiceKind, R = Retry> {
    retry: R,
    transport: Transport,
    _kind: PhantomData<fn() -> K>,
}

impl<K: RpcServiceKind, R: Clone> Clone for RpcClient<K, R> {
    fn clone(&self) -> Self {
        RpcClient {
            retry: self.retry.clone(),
            transport: self.transport.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: RpcServiceKind> RpcClient<K, Retry> {
    /// A client sending calls over HTTP.
    pub fn http(session: HttpSession) -> RpcClient<K, Retry> {
        RpcClient {
            retry: DEFAULT_RETRY,
            transport: Transport::Http(session),
            _kind: PhantomData,
        }
    }

    /// A client invoking `service` in-process. Calls still go through JSON so
    /// they behave exactly like remote ones, cookies included.
    pub fn local<S: RpcService<Kind = K>>(service: S) -> RpcClient<K, Retry> {
        RpcClient {
            retry: DEFAULT_RETRY,
            transport: Transport::Local(
                Arc::new(DefaultHttpInstance(Arc::new(service))),
                CookieStore::new(),
            ),
            _kind: PhantomData,
        }
    }
}

impl<K: RpcServiceKind, R> RpcClient<K, R> {
    pub fn with_retry<X>(self, retry: X) -> RpcClient<K, X> {
        RpcClient {
            retry,
            transport: self.transport,
            _kind: PhantomData,
        }
    }

    pub fn cookies(&self) -> &CookieStore {
        match &self.transport {
            Transport::Http(session) => session.cookies(),
            Transport::Local(_, cookies) => cookies,
        }
    }

    /// The HTTP session, if this client talks to a remote server.
    pub fn session(&self) -> Option<&HttpSession> {
        match &self.transport {
            Transport::Http(session) => Some(session),
            Transport::Local(..) => None,
        }
    }

    /// Send a request once.
    pub async fn call_once(&self, q: &K::Request) -> RpcResult<K::Response> {
        let res = match &self.transport {
            Transport::Http(session) => http::http_call::<K>(session, q).await,
            Transport::Local(instance, cookies) => {
                local_call::<K>(instance.as_ref(), cookies, q).await
            }
        };
        res.map_err(|e| RpcError::Downstream(K::LABEL.to_owned(), Box::new(e)))
    }

    /// Fetch the interface descriptor the server reports for this service.
    pub async fn fetch_descriptor(&self) -> RpcResult<DumpServer> {
        match &self.transport {
            Transport::Http(session) => {
                let resp = session.get(&format!("/rpc/{}", K::LABEL)).await?;
                let resp = http::error_for_status(resp).await?;
                Ok(resp.json::<DumpServer>().await?)
            }
            Transport::Local(instance, _) => {
                Ok(instance.descriptor().to_dump(instance.label(), "local"))
            }
        }
    }
}

impl<K: RpcServiceKind, R> RpcClient<K, R> {
    /// Open a subscription. Subscriptions are never retried; a failure to
    /// open one, or any item that fails, is wrapped like a call error.
    pub async fn subscribe(
        &self,
        q: &K::Request,
    ) -> RpcResult<RpcStream<RpcResult<K::Response>>> {
        let res = match &self.transport {
            Transport::Http(session) => http::http_subscribe::<K>(session, q).await,
            Transport::Local(instance, cookies) => {
                local_subscribe::<K>(instance.as_ref(), cookies, q).await
            }
        };
        let wrap = |e: RpcError| RpcError::Downstream(K::LABEL.to_owned(), Box::new(e));
        let items = res.map_err(wrap)?;
        Ok(items.map(move |item| item.map_err(wrap)).boxed())
    }
}

impl<K: RpcServiceKind, R: RetryStrategy<RpcError>> RpcClient<K, R> {
    /// Send a request. Queries are retried according to the retry strategy;
    /// mutations are sent exactly once.
    pub async fn call(&self, q: &K::Request) -> RpcResult<K::Response> {
        if !q.kind().is_idempotent() {
            return self.call_once(q).await;
        }
        retry::attempt(&self.retry, || self.call_once(q)).await
    }
}

async fn local_call<K: RpcServiceKind>(
    instance: &dyn HttpInstance,
    cookies: &CookieStore,
    q: &K::Request,
) -> RpcResult<K::Response> {
    let ctx = CallContext::from_cookie_header(cookies.header());
    let bytes = serde_json::to_vec(q)?;
    let res = instance.handle_json(&ctx, &bytes).await?;
    Ok(serde_json::from_slice(&res)?)
}

async fn local_subscribe<K: RpcServiceKind>(
    instance: &dyn HttpInstance,
    cookies: &CookieStore,
    q: &K::Request,
) -> RpcResult<RpcStream<RpcResult<K::Response>>> {
    let ctx = CallContext::from_cookie_header(cookies.header());
    let bytes = serde_json::to_vec(q)?;
    let items = instance.subscribe_json(&ctx, &bytes).await?;
    Ok(items
        .map(|item| serde_json::from_slice::<K::Response>(&item).map_err(RpcError::from))
        .boxed())
}
