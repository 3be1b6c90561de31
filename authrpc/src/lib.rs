//! A small RPC framework for services whose clients authenticate with
//! cookies.
//!
//! Services are declared with [`rpc_service!`], which generates the server
//! dispatch, a typed client and a [`ServerDescriptor`] that can be rendered as
//! TypeScript client bindings. Argument and return types are mapped to
//! TypeScript through [`ts_rs::TS`]; deriving it on a user type is enough for
//! the type to be declared in the bindings.

pub mod bindings;
pub mod cookie;
pub mod error;
mod macros;
pub mod retry;
pub mod rpc;

pub use bindings::{BindingsStatus, OperationDescriptor, OperationKind, ServerDescriptor};
pub use cookie::{CookieJar, CookieStore, SetCookie};
pub use error::{Error, Result};
pub use rpc::{CallContext, FromContext, HttpSession, RpcError, RpcResult, RpcServer, RpcStream};

pub use ts_rs;

#[doc(hidden)]
pub use futures as __futures;
