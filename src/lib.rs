#![deny(clippy::expect_used, clippy::unwrap_used)]

//! 持久推送消息协议的客户端会话管理器库的根。
//! The root of the client-side session manager library for a persistent
//! push-messaging protocol.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
