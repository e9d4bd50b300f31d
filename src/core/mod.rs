pub mod chat_stream;
pub mod config;
pub mod decoder;
pub mod directory;
pub mod failure;
pub mod identity;
pub mod message;
pub mod message_log;
pub mod session;
pub mod state_store;
