#![warn(missing_docs)]

//! catalogd administration: config loading, local state handling and the admin CLI

pub mod admin;
pub mod cli;
pub mod config;

pub use admin::AdminState;
pub use config::{AdminConfig, Grant};
