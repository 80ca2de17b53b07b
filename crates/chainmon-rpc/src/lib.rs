//! chainmon-rpc — the only part of chainmon that talks to the daemon.
//!
//! # Architecture
//!
//! ```text
//! RpcGateway
//!   ├── RetryPolicy (budget, exponential backoff + jitter, predicate)
//!   ├── RpcClient::call() ← HttpRpcClient over hyper, or a test double
//!   ├── classify() → Retryable | Fatal | Reported
//!   └── bitcoin_exporter_errors{type} ← every failed attempt
//! ```
//!
//! Connection details are resolved once at startup into a
//! [`ConnectionDescriptor`]; nothing is re-resolved per call.

pub mod call;
pub mod classify;
pub mod client;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod retry;

pub use call::RpcCall;
pub use classify::{Classification, classify};
pub use client::{HttpRpcClient, RpcClient};
pub use connection::{ConnectionDescriptor, ConnectionSettings, CredentialSource, Credentials};
pub use error::{ConfigError, RpcError, RpcResult};
pub use gateway::{EXPORTER_ERRORS_HELP, EXPORTER_ERRORS_METRIC, RpcGateway};
pub use retry::RetryPolicy;
