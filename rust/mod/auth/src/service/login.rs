use std::sync::Arc;

use mirror_rpc::{RemoteClient, RpcError};
use tracing::{debug, warn};

use crate::model::User;
use crate::service::{AuthError, OdooAuthBackend};

impl OdooAuthBackend {
    /// Verify `username`/`password` against Odoo.
    ///
    /// `Ok(None)` when the server refuses the credentials. On success the
    /// password is cached and the linked local user returned, created on
    /// first login.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, AuthError> {
        let (remote_id, _) = match self.connector.connect(username, password) {
            Ok(session) => session,
            Err(RpcError::Auth(reason)) => {
                debug!(username, %reason, "odoo refused credentials");
                return Ok(None);
            }
            Err(e) => {
                warn!(username, error = %e, "odoo login failed");
                return Err(e.into());
            }
        };

        self.credentials.store(username, password)?;
        self.get_or_create_user(username, remote_id).map(Some)
    }

    /// Remote client acting as `username`, logged in with the cached password.
    pub fn client_for(&self, username: &str) -> Result<Arc<dyn RemoteClient>, AuthError> {
        let password = self
            .credentials
            .get(username)?
            .ok_or_else(|| AuthError::Unauthorized(format!("no cached credentials for {username}")))?;
        let (_, client) = self.connector.connect(username, &password)?;
        Ok(client)
    }
}
