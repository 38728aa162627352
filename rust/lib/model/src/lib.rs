//! Odoo model mirroring.
//!
//! A mirrored model is declared with a [`ModelSpec`] and finalized through a
//! [`Registry`]: finalization asks the remote server for the model's field
//! metadata, turns every supported field into a local column driven by a
//! [`Converter`], and resolves relational fields against the models already
//! registered (or defers them until their target shows up).
//!
//! ```ignore
//! let registry = Registry::new(client, sql, "en-us");
//! registry.finalize(ModelSpec::new("partner", "res.partner").with_fields(&["name", "parent_id"]))?;
//! registry.finalize(ModelSpec::new("country", "res.country"))?;
//! for dangling in registry.validate() {
//!     tracing::warn!(%dangling, "relation never resolved");
//! }
//!
//! let session = registry.session();
//! let partners = session.search("res.partner", &Domain::new().leaf("is_company", "=", true), &Default::default())?;
//! ```

pub mod convert;
pub mod error;
pub mod field;
pub mod meta;
pub mod model;
pub mod registry;
pub mod session;
mod store;
pub mod translate;
pub mod value;

pub use convert::{Converter, ConverterKind, Mapping, RefResolver};
pub use error::MirrorError;
pub use field::{FieldOverride, LocalField, LocalKind};
pub use meta::FieldMeta;
pub use model::{MirrorModel, MirroredField, ModelSpec};
pub use registry::{DanglingRelation, Registry, RelationKind};
pub use session::Session;
pub use translate::TranslationCache;
pub use value::{FieldValue, Record};
