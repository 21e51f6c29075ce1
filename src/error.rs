//! Errors that stop the plugin from activating

use thiserror::Error;

use crate::config::ConfigError;
use crate::hook::InstallError;
use crate::reloc::{ModuleError, RuntimeVersion};
use crate::store::StoreError;

/// Reasons the plugin declines to run. None of these are ever surfaced to the game as anything but a `false`.
#[derive(Debug, Error)]
pub enum Error {
    /// The game is the Creation Kit, not the runtime
    #[error("loaded in editor, marking as incompatible")]
    Editor,
    /// No offsets are known for this build
    #[error("unsupported runtime version {0}")]
    UnsupportedRuntime(RuntimeVersion),
    /// The loader didn't provide an interface we need
    #[error("couldn't get {0} interface")]
    MissingInterface(&'static str),
    /// `Load` was called without a successful `Query`
    #[error("plugin was not validated by the loader")]
    NotValidated,
    /// Paths couldn't be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The volume store couldn't be read
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The host module couldn't be located
    #[error(transparent)]
    Module(#[from] ModuleError),
    /// A function table slot couldn't be written
    #[error("unable to patch function table: {0}")]
    Install(#[from] InstallError),
}
