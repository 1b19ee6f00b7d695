//! Container-runtime log-driver plugin: the HTTP protocol surface over
//! [`logdriver::LogDriver`], plus process configuration and serving.

pub mod config;
pub mod http;
pub mod protocol;
pub mod server;

pub use config::{ListenAddr, PluginConfig};
pub use http::router;
pub use protocol::ProtocolError;
