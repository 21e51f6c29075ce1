#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hook;
pub mod host;
pub mod logger;
pub mod patcher;
pub mod plugin;
pub mod registry;
pub mod reloc;
pub mod skse;
pub mod store;

pub use error::Error;
