mod user;

pub use user::{OdooUser, User};
