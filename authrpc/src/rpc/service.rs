use futures::stream::BoxStream;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    bindings::{OperationKind, ServerDescriptor},
    rpc::{CallContext, RpcError, RpcResult},
};

/// The values produced by a subscription.
pub type RpcStream<T> = BoxStream<'static, T>;

/// A type that can be used as an RPC request or response.
///
/// Message types created by the [`rpc_service!`][crate::rpc_service] macro
/// are automatically given an `RpcMessage` impl.
pub trait RpcMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn verb(&self) -> &'static str;
}

/// A request message, which also knows what kind of operation it invokes.
pub trait RpcRequest: RpcMessage {
    fn kind(&self) -> OperationKind;
}

/// A type naming an RPC service: its messages, the label it is mounted under
/// and its interface descriptor.
pub trait RpcServiceKind: 'static {
    type Request: RpcRequest;
    type Response: RpcMessage;

    const LABEL: &'static str;

    fn descriptor() -> ServerDescriptor;
}

/// A type implementing an RPC service.
pub trait RpcService: Send + Sync + 'static {
    type Kind: RpcServiceKind;

    /// Answer a query or mutation.
    fn handle(
        &self,
        ctx: &CallContext,
        q: <Self::Kind as RpcServiceKind>::Request,
    ) -> impl Future<Output = RpcResult<<Self::Kind as RpcServiceKind>::Response>> + Send;

    /// Open a subscription. Each item is one response message.
    fn subscribe(
        &self,
        _ctx: &CallContext,
        q: <Self::Kind as RpcServiceKind>::Request,
    ) -> impl Future<Output = RpcResult<RpcStream<<Self::Kind as RpcServiceKind>::Response>>> + Send
    {
        let verb = q.verb();
        async move { Err(RpcError::BadRequest(format!("{verb} is not a subscription"))) }
    }
}
