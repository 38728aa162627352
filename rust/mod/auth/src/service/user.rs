use mirror_core::now_rfc3339;
use mirror_sql::Value;
use tracing::info;

use crate::model::{OdooUser, User};
use crate::service::{AuthError, OdooAuthBackend};

impl OdooAuthBackend {
    /// Get a user by id.
    pub fn get_user(&self, id: i64) -> Result<Option<User>, AuthError> {
        self.find_record("users", "id", Value::Integer(id))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        self.find_record("users", "username", Value::Text(username.to_string()))
    }

    /// Remote link of a local user.
    pub fn odoo_user(&self, user_id: i64) -> Result<Option<OdooUser>, AuthError> {
        self.find_record("odoo_users", "user_id", Value::Integer(user_id))
    }

    /// Local user linked to remote user `remote_id`, created (with its link)
    /// on first sight. Records the login time either way.
    pub(crate) fn get_or_create_user(&self, username: &str, remote_id: i64) -> Result<User, AuthError> {
        let now = now_rfc3339();

        let linked: Option<OdooUser> =
            self.find_record("odoo_users", "remote_id", Value::Integer(remote_id))?;
        let existing = match linked {
            Some(link) => self.get_user(link.user_id)?,
            None => None,
        };

        if let Some(mut user) = existing {
            user.last_login = Some(now.clone());
            user.updated_at = now;
            self.update_record("users", user.id, &user)?;
            return Ok(user);
        }

        let mut user = User {
            id: 0,
            username: username.to_string(),
            is_staff: false,
            is_superuser: false,
            active: true,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_login: Some(now),
        };
        user.id = self.insert_record("users", &user, &[("username", Value::Text(user.username.clone()))])?;
        self.update_record("users", user.id, &user)?;

        let link = OdooUser {
            user_id: user.id,
            remote_id,
            login: username.to_string(),
        };
        self.insert_record(
            "odoo_users",
            &link,
            &[
                ("user_id", Value::Integer(user.id)),
                ("remote_id", Value::Integer(remote_id)),
            ],
        )?;

        info!(user_id = user.id, username, remote_id, "created local user");
        Ok(user)
    }
}
