//! # Config
//!
//! Fixed identity of the plugin and the paths it reads and writes.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name reported to the loader, nul-terminated
pub const PLUGIN_NAME: &[u8] = b"SNCTSave plugin\0";
/// Version reported to the loader
pub const PLUGIN_VERSION: u32 = 1;
/// Sender whose broadcasts we listen to, nul-terminated
pub const LISTENER_SENDER: &[u8] = b"SKSE\0";

/// Store location, relative to the runtime directory
pub const STORE_PATH: &[&str] = &["Data", "SKSE", "plugins", "SNCTSave.ini"];
/// Log location, relative to the user's documents directory
pub const LOG_PATH: &[&str] = &["My Games", "Skyrim Special Edition", "SKSE", "SNCTSave.log"];

/// Errors when working out where things live
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The path of the running executable couldn't be determined
    #[error("unable to locate the runtime directory: {0}")]
    RuntimeDir(#[from] io::Error),
}

/// Resolved paths
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the game executable
    pub runtime_dir: PathBuf,
    /// Volume store
    pub store_path: PathBuf,
    /// Log file
    pub log_path: PathBuf,
}
impl Config {
    /// Resolves paths for the running game
    pub fn from_environment() -> Result<Self, ConfigError> {
        let exe = env::current_exe()?;
        let runtime_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent"))?;
        Ok(Self::new(runtime_dir, documents_dir()))
    }

    /// Resolves paths against `runtime_dir`. Without a documents directory the log goes next to the game.
    pub fn new(runtime_dir: impl Into<PathBuf>, documents_dir: Option<PathBuf>) -> Self {
        let runtime_dir = runtime_dir.into();
        let store_path = join_all(&runtime_dir, STORE_PATH);
        let log_path = match documents_dir {
            Some(documents) => join_all(&documents, LOG_PATH),
            None => join_all(&runtime_dir, &LOG_PATH[LOG_PATH.len() - 1..]),
        };
        Self {
            runtime_dir,
            store_path,
            log_path,
        }
    }
}

/// The user's documents directory, following folder redirection
#[cfg(windows)]
fn documents_dir() -> Option<PathBuf> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use std::ptr;

    use windows_sys::Win32::System::Com::CoTaskMemFree;
    use windows_sys::Win32::UI::Shell::{FOLDERID_Documents, SHGetKnownFolderPath};

    let mut path = ptr::null_mut::<u16>();
    // Safety: the shell allocates `path` on success and we free it below either way
    let hr = unsafe { SHGetKnownFolderPath(&FOLDERID_Documents, 0, 0, &mut path) };
    let documents = (hr >= 0 && !path.is_null()).then(|| {
        // Safety: a successful call returns a nul-terminated wide string
        let wide = unsafe {
            let len = (0..).take_while(|&i| *path.add(i) != 0).count();
            std::slice::from_raw_parts(path, len)
        };
        PathBuf::from(OsString::from_wide(wide))
    });
    // Safety: freeing null is allowed
    unsafe { CoTaskMemFree(path.cast()) };
    documents
}

/// The user's documents directory
#[cfg(not(windows))]
fn documents_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join("Documents"))
}

/// Joins every component of `parts` onto `base`
fn join_all(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |path, part| path.join(part))
}
