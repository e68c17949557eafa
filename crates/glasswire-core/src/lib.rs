//! Core config, errors, and client-visible wire protocol for Glasswire.

pub mod config;
pub mod error;
pub mod protocol;
