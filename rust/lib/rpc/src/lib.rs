//! Remote side of the bridge: the Odoo RPC contract and its implementations.
//!
//! [`RemoteClient`] is the only surface the mirror layer talks to.
//! [`OdooClient`] speaks JSON-RPC to a live server; [`MemoryRemote`] keeps
//! models and records in process and records every call it receives.

pub mod domain;
pub mod error;
pub mod memory;
pub mod odoo;
pub mod retry;
pub mod traits;

pub use domain::{Domain, SearchOptions};
pub use error::RpcError;
pub use memory::{MemoryRemote, RemoteCall};
pub use odoo::{normalize_lang, OdooClient};
pub use retry::{
    connect_with_retry, ConnectionInfo, FailureReport, LogNotifier, Notifier, RetryPolicy,
    WebhookNotifier,
};
pub use traits::{RemoteClient, RemoteRecord};
