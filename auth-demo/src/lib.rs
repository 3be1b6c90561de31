//! A server exposing `echo_cookie` and `secret_endpoint` behind cookie
//! sessions, together with the tooling to generate and check its client
//! bindings.

use std::{sync::Arc, time::Duration};

use authrpc::{BindingsStatus, Error, HttpSession, RpcServer, rpc::RpcServiceKind};
use axum::routing::get;
use tokio::net::TcpListener;

use crate::{
    auth::AuthState,
    cli::{Action, Args},
    config::Config,
};

pub mod auth;
pub mod cli;
pub mod config;
pub mod impls;
pub mod kinds;
pub mod sessions;

pub use kinds::api;

/// Digest of the sources this binary was built from.
pub const REVISION: &str = env!("APP_REVISION");

const MAX_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Assemble the HTTP surface: the RPC service, the login routes and a root
/// health route.
pub fn server(auth: Arc<AuthState>) -> RpcServer {
    let service = impls::api::Service::new(impls::api::AuthDemo::new(auth.clone()));
    RpcServer::new()
        .with_revision(REVISION)
        .mount(service)
        .merge(auth::routes(auth))
        .merge(axum::Router::new().route("/", get(|| async { "working" })))
}

pub async fn serve<F>(config: Config, shutdown: F) -> authrpc::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if config.bindings.write_on_start {
        api::descriptor().write_typescript(&config.bindings.dir)?;
    }
    if config.auth.users.is_empty() {
        log::warn!("no users configured, secret_endpoint will reject every call");
    }

    let auth = Arc::new(AuthState::new(config.auth.clone()));
    let purge = tokio::spawn(purge_sessions(auth.clone()));
    let listener = TcpListener::bind(&config.server.bind).await?;
    let res = server(auth).serve(listener, shutdown).await;
    purge.abort();
    res
}

async fn purge_sessions(auth: Arc<AuthState>) {
    let period = auth
        .sessions
        .ttl()
        .clamp(Duration::from_secs(1), MAX_PURGE_INTERVAL);
    let mut tick = tokio::time::interval(period);
    loop {
        tick.tick().await;
        let n = auth.sessions.purge_expired();
        if n > 0 {
            log::debug!("purged {n} expired sessions");
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("received ctrl-c, shutting down"),
        Err(e) => log::error!("could not listen for ctrl-c: {e}"),
    }
}

/// Call `op` on the server at `url` and return its result.
pub async fn call(
    url: &str,
    op: &str,
    login: Option<(String, String)>,
    cookies: Vec<(String, String)>,
) -> authrpc::Result<String> {
    let session = HttpSession::new(url);
    for (name, value) in cookies {
        session.cookies().insert(name, value);
    }
    if let Some((user, password)) = login {
        auth::login(&session, &user, &password).await?;
    }

    let client = api::Client::http(session);
    let res = match op {
        "echo_cookie" => client.echo_cookie().await?,
        "secret_endpoint" => client.secret_endpoint().await?,
        other => {
            return Err(Error::Config(format!(
                "unknown operation {other:?}, expected one of {:?}",
                api::descriptor().names()
            )));
        }
    };
    Ok(res)
}

pub async fn run(args: Args) -> authrpc::Result<()> {
    let mut config = config::load(args.config.as_deref())?;

    match args.action {
        Action::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config, shutdown_signal()).await
        }
        Action::Bindings { out, check } => {
            let dir = out.unwrap_or(config.bindings.dir);
            let desc = api::descriptor();
            if !check {
                desc.write_typescript(&dir)?;
                return Ok(());
            }
            match desc.check_typescript(&dir)? {
                BindingsStatus::UpToDate => {
                    log::info!("bindings in {} are up to date", dir.display());
                    Ok(())
                }
                status => Err(Error::Internal(format!(
                    "bindings in {} are {status:?}, run `auth-demo bindings` to regenerate",
                    dir.display()
                ))),
            }
        }
        Action::Describe => {
            let dump = api::descriptor().to_dump(api::ServiceKind::LABEL, REVISION);
            let json = serde_json::to_string_pretty(&dump)
                .map_err(|e| Error::Internal(format!("could not encode descriptor: {e}")))?;
            println!("{json}");
            Ok(())
        }
        Action::Call {
            op,
            url,
            login,
            cookies,
        } => {
            let url = url.unwrap_or_else(|| format!("http://{}", config.server.bind));
            let res = call(&url, &op, login, cookies).await?;
            println!("{res}");
            Ok(())
        }
    }
}
