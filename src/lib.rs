//! Bridge between a chat-assistant backend and pluggable command handlers.
//!
//! The assistant pushes messages over a server-sent-event stream and accepts
//! replies over plain HTTP. [`hub::sse::SseConnector`] keeps the stream up
//! and exposes both directions behind [`hub::Connector`]; messages flow into
//! a [`handler::Dispatcher`] whose [`handler::CommandRouter`] hands prefixed
//! commands to [`plugin`]s.

pub mod config;
pub mod handler;
pub mod hub;
pub mod plugin;
pub mod scheduler;
