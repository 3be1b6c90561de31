pub mod api {
    authrpc::rpc_service! {
        const NAME: &'static str = "QubitServer";
        const LABEL: &'static str = "auth";

        /// Echoes back the `Cookie` header the server received.
        query fn echo_cookie() -> String;

        /// Only answers callers holding a live session cookie.
        query(crate::impls::api::SignedIn) fn secret_endpoint() -> String;
    }
}
