//! Subsystem for building services with an RPC interface.
//!
//! It's recommended to use this module via the
//! [`rpc_service!`][crate::rpc_service] macro. When using that macro, it's
//! rarely necessary to use any of the definitions in this module directly,
//! however they are documented for the sake of completeness.

mod client;
mod context;
mod error;
mod http;
mod service;

pub use client::{DEFAULT_RETRY, DEFAULT_TIMEOUT, HttpSession, RpcClient};
pub use context::{CallContext, FromContext};
pub use error::{RpcError, RpcResult};
pub use http::{DefaultHttpInstance, HttpInstance, RpcServer, ServerHandle};
pub use service::{RpcMessage, RpcRequest, RpcService, RpcServiceKind, RpcStream};
