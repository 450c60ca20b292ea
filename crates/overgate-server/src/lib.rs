//! Overgate Server
//!
//! This crate ties the overload controller to the request path: the RPC
//! ingress, the unary interceptor, and the HTTP control plane the external
//! policy agent talks to.
//!
//! # Architecture
//!
//! - [`RpcServer`] accepts one JSON [`protocol::RpcRequest`] envelope per
//!   HTTP POST and dispatches it to the registered handler
//! - [`Interceptor`] wraps every call: admission first, then the handler,
//!   then metrics recording; a denied call never reaches the handler
//! - [`ControlPlane`] serves `GET /metrics`, `POST /set_rate` and
//!   `GET /snapshot` on a separate operator-configured port
//!
//! The controller instance is shared: it is constructed once at startup and
//! passed explicitly to both servers.
//!
//! # Main Components
//!
//! - [`RpcServer`] - RPC ingress with interceptor-wrapped dispatch
//! - [`Interceptor`] - the admission/record wrapper around unary calls
//! - [`HandlerRegistry`] - named async RPC handlers
//! - [`ControlPlane`] - metrics/rate HTTP surface for the policy agent
//! - [`CallMetadata`] - transport-agnostic call metadata carrier

pub mod control_plane;
pub mod handler;
pub mod interceptor;
pub mod metadata;
pub mod protocol;
pub mod rpc_server;

pub use control_plane::ControlPlane;
pub use handler::HandlerRegistry;
pub use interceptor::Interceptor;
pub use metadata::CallMetadata;
pub use rpc_server::RpcServer;
