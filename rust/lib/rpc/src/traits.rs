use serde_json::{Map, Value};

use crate::domain::{Domain, SearchOptions};
use crate::error::RpcError;

/// One record or one `fields_get` result as sent over the wire.
pub type RemoteRecord = Map<String, Value>;

/// The remote Odoo surface consumed by the mirror layer.
///
/// All calls block until the server answers. Implementations must not
/// retry on their own; retry happens only during bootstrap.
pub trait RemoteClient: Send + Sync {
    /// `fields_get` for `model`: field name → descriptor.
    ///
    /// `names = None` asks for every field. With `lang`, labels, help texts
    /// and selection labels come back translated.
    fn fields(
        &self,
        model: &str,
        names: Option<&[String]>,
        lang: Option<&str>,
    ) -> Result<RemoteRecord, RpcError>;

    /// Read `fields` of the records `ids`. Every returned record carries `id`.
    fn read(&self, model: &str, ids: &[i64], fields: &[String])
        -> Result<Vec<RemoteRecord>, RpcError>;

    /// Write the same `values` to every record in `ids`.
    fn write(&self, model: &str, ids: &[i64], values: &RemoteRecord) -> Result<bool, RpcError>;

    /// Create one record, returning its id.
    fn create(&self, model: &str, values: &RemoteRecord) -> Result<i64, RpcError>;

    /// Resolve a domain to record ids.
    fn search(
        &self,
        model: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<i64>, RpcError>;
}
