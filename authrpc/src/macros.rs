/// A helper macro for defining RPC services.
///
/// This is the recommended way to define a service since it produces the
/// server dispatch code, the typed client and the interface descriptor from a
/// single declaration, so they can never disagree. The macro is invoked with
/// the name of the generated binding type, the label the service is mounted
/// under, and a series of `query fn`, `mutation fn` or `subscription fn`
/// definitions. All parameter and return types must be serializable via serde
/// and implement [`TS`][ts_rs::TS]; user types deriving `TS` are declared in
/// the bindings next to the server type.
///
/// A handler receives the [`CallContext`][crate::rpc::CallContext] of the
/// call. An operation may instead name a context type in parentheses after its
/// kind, which is then derived through [`FromContext`][crate::rpc::FromContext]
/// before the handler runs.
///
/// A subscription handler returns a stream; each item is sent to the caller
/// as it is produced.
///
/// # Example
///
/// ```ignore
/// mod api {
///     authrpc::rpc_service! {
///         const NAME: &'static str = "MapServer";
///         const LABEL: &'static str = "map";
///
///         /// Store a value.
///         mutation(Owner) fn add_item(key: String, value: String) -> ();
///         query fn get_item(key: String) -> Option<String>;
///         subscription fn watch(key: String) -> Option<String>;
///     }
/// }
///
/// pub struct MapService;
///
/// impl api::Handler for MapService {
///     async fn add_item(&self, owner: Owner, key: String, value: String) -> RpcResult<()> {
///         // ...
///     }
///     async fn get_item(&self, ctx: &CallContext, key: String) -> RpcResult<Option<String>> {
///         // ...
///     }
///     async fn watch(&self, ctx: &CallContext, key: String) -> RpcResult<RpcStream<Option<String>>> {
///         // ...
///     }
/// }
///
/// let server = RpcServer::new().mount(api::Service::new(MapService));
/// let client = api::Client::http(HttpSession::new("http://127.0.0.1:9944"));
/// let value: RpcResult<Option<String>> = client.get_item("k".to_owned()).await;
/// ```
#[macro_export]
macro_rules! rpc_service {
    {
        const NAME: &'static str = $name:expr;
        const LABEL: &'static str = $label:expr;

        $($(#[$attr:meta])* $kind:ident $(($ctx_ty:ty))? fn $op:ident ($($arg:ident: $arg_ty:ty),*) -> $ret_ty:ty;)+
    } => {
        #[derive(::serde::Serialize, ::serde::Deserialize)]
        #[allow(non_camel_case_types)]
        pub enum Request {
            $($op { $($arg: $arg_ty),* }),+
        }

        #[derive(::serde::Serialize, ::serde::Deserialize)]
        #[allow(non_camel_case_types)]
        pub enum Response {
            $($op($ret_ty)),+
        }

        impl $crate::rpc::RpcMessage for Request {
            fn verb(&self) -> &'static str {
                match self {
                    $(Request::$op { .. } => stringify!($op)),+
                }
            }
        }

        impl $crate::rpc::RpcRequest for Request {
            fn kind(&self) -> $crate::bindings::OperationKind {
                match self {
                    $(Request::$op { .. } => $crate::__operation_kind!($kind)),+
                }
            }
        }

        impl $crate::rpc::RpcMessage for Response {
            fn verb(&self) -> &'static str {
                match self {
                    $(Response::$op(..) => stringify!($op)),+
                }
            }
        }

        /// The server interface descriptor of this service.
        pub fn descriptor() -> $crate::bindings::ServerDescriptor {
            $crate::bindings::ServerDescriptor::new($name)
            $(.operation(
                $crate::bindings::OperationDescriptor::new(
                    stringify!($op),
                    $crate::__operation_kind!($kind),
                )
                $(.arg_of::<$arg_ty, _>(stringify!($arg)))*
                .returns_of::<$ret_ty>()
            )
            $(.declare::<$arg_ty>())*
            .declare::<$ret_ty>())+
        }

        pub trait Handler: Sync + Send + 'static {
            $($(#[$attr])*
            fn $op(&self, ctx: $crate::__handler_context!($($ctx_ty)?), $($arg: $arg_ty),*)
            -> impl ::std::future::Future<
                Output = $crate::rpc::RpcResult<$crate::__handler_output!($kind, $ret_ty)>,
            > + Send;)+
        }

        pub struct ServiceKind;

        impl $crate::rpc::RpcServiceKind for ServiceKind {
            type Request = Request;
            type Response = Response;

            const LABEL: &'static str = $label;

            fn descriptor() -> $crate::bindings::ServerDescriptor {
                descriptor()
            }
        }

        pub struct Service<H>(::std::sync::Arc<H>);

        impl<H: Handler> Service<H> {
            pub fn new(handler: H) -> Self {
                Service(::std::sync::Arc::new(handler))
            }

            pub fn from_arc(handler: ::std::sync::Arc<H>) -> Self {
                Service(handler)
            }
        }

        impl<H: Handler> $crate::rpc::RpcService for Service<H>
        where
            $($($ctx_ty: $crate::rpc::FromContext<H>,)?)+
        {
            type Kind = ServiceKind;

            async fn handle(&self, ctx: &$crate::rpc::CallContext, q: Request)
            -> $crate::rpc::RpcResult<Response> {
                match q {
                    $(Request::$op { $($arg),* } => $crate::__unary_arm!($kind, $op, ($($arg),*), {
                        let ctx = $crate::__derive_context!(H, &*self.0, ctx $(, $ctx_ty)?);
                        Ok(Response::$op(self.0.$op(ctx, $($arg),*).await?))
                    }),)+
                }
            }

            async fn subscribe(&self, ctx: &$crate::rpc::CallContext, q: Request)
            -> $crate::rpc::RpcResult<$crate::rpc::RpcStream<Response>> {
                match q {
                    $(Request::$op { $($arg),* } => $crate::__stream_arm!($kind, $op, ($($arg),*), {
                        let ctx = $crate::__derive_context!(H, &*self.0, ctx $(, $ctx_ty)?);
                        let items = self.0.$op(ctx, $($arg),*).await?;
                        Ok($crate::__futures::StreamExt::boxed(
                            $crate::__futures::StreamExt::map(items, Response::$op),
                        ))
                    }),)+
                }
            }
        }

        pub struct Client(
            pub $crate::rpc::RpcClient<ServiceKind>,
        );

        impl Clone for Client {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }

        impl Client {
            /// A client calling a remote server over HTTP.
            pub fn http(session: $crate::rpc::HttpSession) -> Self {
                Client($crate::rpc::RpcClient::http(session))
            }

            /// A client calling `handler` in-process.
            pub fn local<H: Handler>(handler: H) -> Self
            where
                $($($ctx_ty: $crate::rpc::FromContext<H>,)?)+
            {
                Client($crate::rpc::RpcClient::local(Service::new(handler)))
            }

            pub fn with_retry(self, retry: $crate::retry::Retry) -> Self {
                Client(self.0.with_retry(retry))
            }

            pub fn cookies(&self) -> &$crate::cookie::CookieStore {
                self.0.cookies()
            }

            pub fn inner(&self) -> &$crate::rpc::RpcClient<ServiceKind> {
                &self.0
            }

            $($(#[$attr])*
            #[allow(unreachable_patterns)]
            pub async fn $op(&self, $($arg: $arg_ty),*)
            -> $crate::rpc::RpcResult<$crate::__client_output!($kind, $ret_ty)> {
                let q = Request::$op { $($arg),* };
                $crate::__client_call!($kind, $op, self.0, q)
            })+
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __operation_kind {
    (query) => {
        $crate::bindings::OperationKind::Query
    };
    (mutation) => {
        $crate::bindings::OperationKind::Mutation
    };
    (subscription) => {
        $crate::bindings::OperationKind::Subscription
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __handler_context {
    () => { &$crate::rpc::CallContext };
    ($ctx_ty:ty) => { $ctx_ty };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __handler_output {
    (subscription, $ret_ty:ty) => { $crate::rpc::RpcStream<$ret_ty> };
    ($kind:ident, $ret_ty:ty) => { $ret_ty };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __client_output {
    (subscription, $ret_ty:ty) => {
        $crate::rpc::RpcStream<$crate::rpc::RpcResult<$ret_ty>>
    };
    ($kind:ident, $ret_ty:ty) => { $ret_ty };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __derive_context {
    ($handler:ty, $state:expr, $ctx:ident) => {
        $ctx
    };
    ($handler:ty, $state:expr, $ctx:ident, $ctx_ty:ty) => {
        <$ctx_ty as $crate::rpc::FromContext<$handler>>::from_context($state, $ctx).await?
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __unary_arm {
    (subscription, $op:ident, ($($arg:ident),*), $body:block) => {{
        let _ = ($($arg,)*);
        Err($crate::rpc::RpcError::BadRequest(
            concat!(stringify!($op), " is a subscription").to_owned(),
        ))
    }};
    ($kind:ident, $op:ident, ($($arg:ident),*), $body:block) => {
        $body
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __stream_arm {
    (subscription, $op:ident, ($($arg:ident),*), $body:block) => {
        $body
    };
    ($kind:ident, $op:ident, ($($arg:ident),*), $body:block) => {{
        let _ = ($($arg,)*);
        Err($crate::rpc::RpcError::BadRequest(
            concat!(stringify!($op), " is not a subscription").to_owned(),
        ))
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __client_call {
    (subscription, $op:ident, $client:expr, $q:ident) => {{
        let items = $client.subscribe(&$q).await?;
        Ok($crate::__futures::StreamExt::boxed(
            $crate::__futures::StreamExt::map(items, |item| match item {
                Ok(Response::$op(a)) => Ok(a),
                Ok(x) => Err($crate::rpc::RpcError::Misc(format!(
                    "got {} but was expecting {}",
                    $crate::rpc::RpcMessage::verb(&x),
                    stringify!($op)
                ))),
                Err(e) => Err(e),
            }),
        ))
    }};
    ($kind:ident, $op:ident, $client:expr, $q:ident) => {
        match $client.call(&$q).await {
            Ok(Response::$op(a)) => Ok(a),
            Ok(x) => Err($crate::rpc::RpcError::Misc(format!(
                "got {} but was expecting {}",
                $crate::rpc::RpcMessage::verb(&x),
                stringify!($op)
            ))),
            Err(e) => Err(e),
        }
    };
}
