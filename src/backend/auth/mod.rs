//! Accounts: user records, JWT sessions, OTP password reset and the
//! account/profile/directory handlers.

pub mod handlers;
pub mod otp;
pub mod sessions;
pub mod users;
