//! Push notifications: device-token registry, badge bookkeeping and the
//! FCM HTTP v1 client.

pub mod db;
pub mod fcm;
pub mod handlers;
