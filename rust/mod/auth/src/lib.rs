//! Auth module: local users backed by Odoo credentials.
//!
//! # Resources
//!
//! - **User** — local account, never staff or superuser
//! - **OdooUser** — link between a local user and the remote `res.users` id
//! - **Credentials** — last password that logged in successfully, per username
//!
//! # Usage
//!
//! ```ignore
//! use mirror_auth::{OdooAuthBackend, OdooConnector};
//!
//! let backend = OdooAuthBackend::new(sql, kv, Arc::new(OdooConnector::from_config(&config.odoo)))?;
//! if let Some(user) = backend.authenticate("alice", "secret")? {
//!     let client = backend.client_for(&user.username)?;
//!     let session = registry.session_as(client);
//! }
//! ```

pub mod model;
pub mod service;

pub use model::{OdooUser, User};
pub use service::credentials::CredentialCache;
pub use service::{AuthError, Connector, OdooAuthBackend, OdooConnector};
