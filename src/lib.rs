//! Intune administration over Microsoft Graph
//!
//! The `intunectl` binary is a thin clap front end over the command
//! modules in [`cmd`]; the Graph client, auth and config layers are
//! usable on their own.

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
