//! branchtalk - branch-organized messaging and payments backend
//!
//! This library implements the server for a branch-organized messaging and
//! payments application:
//!
//! - User accounts grouped into branches, with JWT-backed sessions
//! - Direct and group chat with attachments stored in object storage
//! - Real-time delivery over SSE, backed by per-room broadcast channels,
//!   with read-receipt and unread-count bookkeeping and per-viewer message
//!   visibility (hidden senders, delete-for-me, delete-for-everyone)
//! - Payment records with receipt images
//! - Push notifications (FCM) with per-device badge counters
//! - OTP password-reset mail
//!
//! # Module Structure
//!
//! - **`shared`** - Domain and wire types used across modules
//! - **`backend`** - Axum HTTP server, database layer, realtime broadcasting,
//!   storage, mail and push clients

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;
