//! kbchat is a terminal client for streaming, resumable knowledge-base chat
//! sessions.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session state machine, the message log, incremental
//!   text decoding of reply streams, the conversation directory cache, and
//!   configuration.
//! - [`api`] defines the wire payloads and the [`api::ChatBackend`] seam, with
//!   an HTTP implementation over `reqwest`.
//! - [`auth`] stores the bearer token and performs the login exchange.
//! - [`cli`] parses arguments and runs one-shot commands or the interactive
//!   chat loop.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
