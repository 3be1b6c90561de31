//! Login and logout routes, served next to the RPC endpoints.
//!
//! A successful login hands the caller a session cookie; the RPC handlers
//! only ever read that cookie back.

use std::sync::Arc;

use authrpc::{
    CallContext, HttpSession, RpcError, RpcResult, SetCookie,
    cookie::SameSite,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{config::AuthConfig, sessions::SessionStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// State shared by the auth routes and the RPC handlers.
pub struct AuthState {
    pub config: AuthConfig,
    pub sessions: SessionStore,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> AuthState {
        let sessions = SessionStore::new(config.session_ttl());
        AuthState { config, sessions }
    }

    /// Compares in constant time so response timing does not leak how much
    /// of a password matched.
    fn check_password(&self, form: &LoginForm) -> bool {
        self.config
            .users
            .get(&form.username)
            .is_some_and(|p| p.as_bytes().ct_eq(form.password.as_bytes()).into())
    }

    /// The user owning the session cookie of a call.
    pub fn authenticate(&self, ctx: &CallContext) -> RpcResult<String> {
        let token = ctx
            .cookie(&self.config.cookie_name)
            .ok_or_else(|| RpcError::Unauthorized("missing session cookie".to_owned()))?;
        self.sessions
            .lookup(token)
            .ok_or_else(|| RpcError::Unauthorized("invalid or expired session".to_owned()))
    }

    fn session_cookie(&self, token: String) -> SetCookie {
        SetCookie::new(self.config.cookie_name.clone(), token)
            .with_path("/")
            .with_max_age(self.sessions.ttl())
            .http_only()
            .with_same_site(SameSite::Lax)
    }
}

pub fn routes(state: Arc<AuthState>) -> axum::Router {
    axum::Router::new()
        .route("/login", post(login_route))
        .route("/logout", post(logout_route))
        .with_state(state)
}

async fn login_route(
    State(state): State<Arc<AuthState>>,
    form: Result<Json<LoginForm>, JsonRejection>,
) -> RpcResult<Response> {
    let Json(form) = form.map_err(|e| RpcError::BadRequest(e.body_text()))?;
    if !state.check_password(&form) {
        log::warn!("rejected login for {:?}", form.username);
        return Err(RpcError::Unauthorized("bad username or password".to_owned()));
    }
    let token = state.sessions.create(&form.username);
    log::info!("{} logged in", form.username);
    let cookie = state.session_cookie(token).to_string();
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response())
}

async fn logout_route(State(state): State<Arc<AuthState>>, headers: HeaderMap) -> Response {
    let ctx = CallContext::from_headers(&headers);
    if let Some(token) = ctx.cookie(&state.config.cookie_name)
        && state.sessions.revoke(token)
    {
        log::debug!("session revoked");
    }
    let cookie = SetCookie::removal(state.config.cookie_name.clone()).to_string();
    (StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response()
}

/// Log in through `session`, which keeps the returned cookie for later calls.
pub async fn login(session: &HttpSession, username: &str, password: &str) -> RpcResult<()> {
    let form = LoginForm {
        username: username.to_owned(),
        password: password.to_owned(),
    };
    let resp = session.post_json("/login", &form).await?;
    expect_success(resp).await
}

pub async fn logout(session: &HttpSession) -> RpcResult<()> {
    let resp = session.post_json("/logout", &()).await?;
    expect_success(resp).await
}

async fn expect_success(resp: reqwest::Response) -> RpcResult<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    match resp.json::<RpcError>().await {
        Ok(e) => Err(e),
        Err(_) => Err(RpcError::Misc(format!("server responded {status}"))),
    }
}
