//! Account, session, profile and directory handlers.

pub mod directory;
pub mod login;
pub mod password;
pub mod profile;
pub mod register;
pub mod session;
pub mod types;
