//! # chatlink bot
//!
//! Runtime crate: OpenAI-compatible provider, OneBot v12 channel, and the
//! command dispatcher wiring them to the session layer in chatlink-core.

pub mod channels;
pub mod dispatch;
pub mod providers;
