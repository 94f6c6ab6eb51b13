//! Guidepost - agent guidance server
//!
//! A synchronous JSON request/response server that steers an AI coding agent
//! through templated documentation and structured workflows. The heart of it
//! is the [`taskcoord`] coordination engine: tools inject events, derived-state
//! consumers react to them, and the guidance they produce piggybacks on the
//! next protocol response.

pub mod cli;
pub mod config;
pub mod consumers;
pub mod docs;
pub mod protocol;
pub mod server;
pub mod tools;

pub use config::Config;
pub use server::{Session, serve};
