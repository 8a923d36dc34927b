//! Data models shared by the session and entitlement code.
//!
//! - `User`: the backend's user record, replaced wholesale on every auth event
//! - `Credential`: the opaque bearer session token

pub mod credential;
pub mod user;

pub use credential::Credential;
pub use user::User;
