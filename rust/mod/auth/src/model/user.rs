use serde::{Deserialize, Serialize};

/// A local user created on first successful Odoo login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Always false: remote users get no local admin rights.
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Last successful login (RFC 3339).
    #[serde(default)]
    pub last_login: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Remote user record a local user is linked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdooUser {
    pub user_id: i64,
    /// `res.users` id on the remote side.
    pub remote_id: i64,
    pub login: String,
}
