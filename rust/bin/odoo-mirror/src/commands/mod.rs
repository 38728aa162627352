pub mod login;
pub mod schema;
pub mod sync;
