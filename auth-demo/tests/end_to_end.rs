use std::sync::Arc;

use auth_demo::{api, auth::AuthState, config::AuthConfig};
use authrpc::{
    HttpSession, OperationKind, RpcError,
    retry::Retry,
    rpc::{RpcClient, ServerHandle},
};
use pretty_assertions::assert_eq;

async fn start() -> (ServerHandle, Arc<AuthState>) {
    let mut config = AuthConfig::default();
    config.users.insert("user".to_owned(), "password".to_owned());
    let auth = Arc::new(AuthState::new(config));
    let handle = auth_demo::server(auth.clone())
        .spawn("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    (handle, auth)
}

fn client(handle: &ServerHandle) -> api::Client {
    api::Client::http(HttpSession::new(handle.base_url())).with_retry(Retry::never())
}

#[test]
fn binding_matches_the_served_interface() {
    let desc = api::descriptor();
    assert_eq!(desc.names(), vec!["echo_cookie", "secret_endpoint"]);
    for op in desc.operations() {
        assert_eq!(op.kind(), OperationKind::Query);
        assert!(op.args().is_empty());
        assert_eq!(op.return_type(), "string");
    }
    assert_eq!(
        desc.render_typescript(),
        "import type { Query } from \"@qubit-rs/client\";\n\
         export type QubitServer = { echo_cookie: Query<() => Promise<string>>, secret_endpoint: Query<() => Promise<string>> };\n"
    );
}

#[tokio::test]
async fn root_route_is_alive() {
    let (handle, _) = start().await;
    let body = reqwest::get(handle.base_url()).await.unwrap().text().await.unwrap();
    assert_eq!(body, "working");
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn echo_cookie_reflects_what_was_sent() {
    let (handle, _) = start().await;
    let client = client(&handle);
    assert_eq!(client.echo_cookie().await.unwrap(), "");

    client.cookies().insert("flavour", "oatmeal");
    assert_eq!(client.echo_cookie().await.unwrap(), "flavour=oatmeal");
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn login_unlocks_the_secret_endpoint() {
    let (handle, auth) = start().await;
    let session = HttpSession::new(handle.base_url());
    let client = api::Client::http(session.clone()).with_retry(Retry::never());

    let err = client.secret_endpoint().await.unwrap_err();
    assert_eq!(
        err.root_cause(),
        &RpcError::Unauthorized("missing session cookie".to_owned())
    );

    let err = auth_demo::auth::login(&session, "user", "wrong").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(auth.sessions.is_empty());

    auth_demo::auth::login(&session, "user", "password").await.unwrap();
    let token = session.cookies().get("qubit-auth").expect("session cookie");
    assert_eq!(auth.sessions.lookup(&token).as_deref(), Some("user"));
    assert_eq!(
        client.echo_cookie().await.unwrap(),
        format!("qubit-auth={token}")
    );
    assert_eq!(
        client.secret_endpoint().await.unwrap(),
        "welcome user: the cake is a lie"
    );

    auth_demo::auth::logout(&session).await.unwrap();
    assert_eq!(session.cookies().get("qubit-auth"), None);
    assert!(auth.sessions.lookup(&token).is_none());
    assert!(client.secret_endpoint().await.unwrap_err().is_unauthorized());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn forged_cookie_is_rejected() {
    let (handle, _) = start().await;
    let client = client(&handle);
    client.cookies().insert("qubit-auth", "0123456789abcdef0123456789abcdef");
    let err = client.secret_endpoint().await.unwrap_err();
    assert_eq!(
        err.root_cause(),
        &RpcError::Unauthorized("invalid or expired session".to_owned())
    );
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_login_is_a_bad_request() {
    let (handle, auth) = start().await;
    let http = reqwest::Client::new();
    for body in ["not json", r#"{"username":"user"}"#] {
        let resp = http
            .post(format!("{}/login", handle.base_url()))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST, "{body}");
        let err = resp.json::<RpcError>().await.unwrap();
        assert!(matches!(err, RpcError::BadRequest(_)), "{err:?}");
    }

    let resp = http
        .post(format!("{}/login", handle.base_url()))
        .body(r#"{"username":"user","password":"password"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(auth.sessions.is_empty());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn server_reports_its_descriptor() {
    let (handle, _) = start().await;
    let client = client(&handle);
    let dump = client.inner().fetch_descriptor().await.unwrap();
    assert_eq!(dump, api::descriptor().to_dump("auth", auth_demo::REVISION));
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_label_and_bad_body() {
    let (handle, _) = start().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/rpc/nope", handle.base_url()))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(matches!(resp.json::<RpcError>().await.unwrap(), RpcError::NotFound(_)));

    let resp = http
        .post(format!("{}/rpc/auth", handle.base_url()))
        .body(r#"{"drop_tables":{}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn unreachable_server_is_spurious() {
    let (handle, _) = start().await;
    let url = handle.base_url();
    handle.stop().await.unwrap();

    let client: RpcClient<api::ServiceKind> =
        RpcClient::http(HttpSession::new(url)).with_retry(Retry::never());
    let err = client
        .call_once(&api::Request::echo_cookie {})
        .await
        .err()
        .expect("server is down");
    assert!(matches!(err.root_cause(), RpcError::Spurious(_)));
}
