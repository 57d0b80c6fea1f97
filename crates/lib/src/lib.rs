//! ThinkChat core library: conversation session, Ollama streaming backend, and the
//! thinking/response splitter shared by the CLI and desktop applications.

pub mod config;
pub mod display;
pub mod init;
pub mod llm;
pub mod reparse;
pub mod session;
pub mod splitter;
pub mod turn;
