//! # chatlink core
//!
//! Shared types, traits, and the session layer for the chatlink bridge.
//! The bot runtime crate builds on top of this one.

pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
