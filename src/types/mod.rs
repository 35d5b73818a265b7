//! Type definitions for the Barndoor SDK
//!
//! Identifiers for type safety and the DTOs returned by the server registry.

pub mod identifiers;
pub mod options;
pub mod server;

pub use identifiers::{ConnectionId, ServerId};
pub use options::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, SdkOptions, SdkOptionsBuilder,
};
pub use server::{
    ConnectionInit, ConnectionStatus, McpConnectionParams, STREAMABLE_HTTP_TRANSPORT,
    ServerDetail, ServerSummary,
};
