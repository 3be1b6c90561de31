pub mod api {
    use std::sync::Arc;

    use authrpc::{CallContext, FromContext, RpcResult};

    use crate::auth::AuthState;

    pub struct AuthDemo {
        auth: Arc<AuthState>,
    }

    impl AuthDemo {
        pub fn new(auth: Arc<AuthState>) -> AuthDemo {
            AuthDemo { auth }
        }
    }

    /// The user behind the session cookie of a call.
    pub struct SignedIn(pub String);

    impl FromContext<AuthDemo> for SignedIn {
        async fn from_context(state: &AuthDemo, ctx: &CallContext) -> RpcResult<SignedIn> {
            state.auth.authenticate(ctx).map(SignedIn)
        }
    }

    impl crate::kinds::api::Handler for AuthDemo {
        async fn echo_cookie(&self, ctx: &CallContext) -> RpcResult<String> {
            Ok(ctx.cookie_header().unwrap_or_default().to_owned())
        }

        async fn secret_endpoint(&self, SignedIn(user): SignedIn) -> RpcResult<String> {
            log::debug!("secret endpoint reached by {user}");
            Ok(format!("welcome {user}: {}", self.auth.config.secret))
        }
    }

    pub type Service = crate::kinds::api::Service<AuthDemo>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{auth::AuthState, config::AuthConfig, kinds::api::Client};

    use super::api::AuthDemo;

    fn client() -> (Client, Arc<AuthState>) {
        let auth = Arc::new(AuthState::new(AuthConfig::default()));
        (Client::local(AuthDemo::new(auth.clone())), auth)
    }

    #[tokio::test]
    async fn echo_cookie_without_cookies_is_empty() {
        let (client, _) = client();
        assert_eq!(client.echo_cookie().await.unwrap(), "");
    }

    #[tokio::test]
    async fn echo_cookie_returns_the_header() {
        let (client, _) = client();
        client.cookies().insert("a", "1");
        client.cookies().insert("b", "2");
        assert_eq!(client.echo_cookie().await.unwrap(), "a=1; b=2");
    }

    #[tokio::test]
    async fn secret_endpoint_needs_a_session() {
        let (client, auth) = client();
        let err = client.secret_endpoint().await.unwrap_err();
        assert!(err.is_unauthorized());

        let token = auth.sessions.create("user");
        client.cookies().insert("qubit-auth", token.clone());
        assert_eq!(
            client.secret_endpoint().await.unwrap(),
            "welcome user: the cake is a lie"
        );

        auth.sessions.revoke(&token);
        assert!(client.secret_endpoint().await.unwrap_err().is_unauthorized());
    }
}
