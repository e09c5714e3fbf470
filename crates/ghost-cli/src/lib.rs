//! # Ghost Drive CLI
//!
//! Command-line front end for encrypted Ghost Drive transfers.
//!
//! ```text
//! ghost-drive init-pin                 create and store a PIN-wrapped file key
//! ghost-drive change-pin               re-wrap the file key under a new PIN
//! ghost-drive upload <FILE> <KEY>      encrypt and upload
//! ghost-drive download <KEY> <SIZE> <OUT>
//! ghost-drive plan <SIZE>              show how a file would be chunked
//! ```

pub mod commands;
pub mod config;

pub use config::CliConfig;
