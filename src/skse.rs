//! # SKSE
//!
//! Loader ABI, the exported `SKSEPlugin_Query`/`SKSEPlugin_Load` entry points, and the interposers that end up in the
//! game's function tables.
//!
//! Everything here runs on the game's main thread. The mutexes only exist because Rust statics must be `Sync`.

use std::ffi::{c_char, c_void};
use std::mem;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use lazy_static::lazy_static;

use crate::config::{Config, LISTENER_SENDER, PLUGIN_NAME, PLUGIN_VERSION};
use crate::error::Error;
use crate::hook;
use crate::host::{CategoryRef, HostVolumeControl, ModInfo, SetVolumeFn, SoundCategoryForm};
use crate::logger;
use crate::plugin::{self, HostEnvironment, Plugin, Stage};
use crate::reloc::{ModuleBase, Offsets, RuntimeVersion};

/// Handle the loader identifies this plugin by
pub type PluginHandle = u32;
/// `PluginInfo` layout version we fill in
pub const PLUGIN_INFO_VERSION: u32 = 1;
/// Interface id of the messaging interface
pub const INTERFACE_MESSAGING: u32 = 5;

/// `SKSEInterface`
#[repr(C)]
pub struct SKSEInterface {
    /// Loader version
    pub skse_version: u32,
    /// Packed game version, see [`RuntimeVersion`]
    pub runtime_version: u32,
    /// Packed editor version, zero outside the editor
    pub editor_version: u32,
    /// Non-zero when loaded in the Creation Kit
    pub is_editor: u32,
    /// Looks up an interface by id, null if unavailable
    pub query_interface: unsafe extern "C" fn(id: u32) -> *mut c_void,
    /// Handle of the plugin currently being queried or loaded
    pub get_plugin_handle: unsafe extern "C" fn() -> PluginHandle,
    /// Loader release index
    pub get_release_index: unsafe extern "C" fn() -> u32,
}

/// `PluginInfo`, filled in during query
#[repr(C)]
pub struct PluginInfo {
    /// Must be [`PLUGIN_INFO_VERSION`]
    pub info_version: u32,
    /// Plugin name
    pub name: *const c_char,
    /// Plugin version
    pub version: u32,
}

/// `SKSEMessagingInterface::Message`
#[repr(C)]
pub struct Message {
    /// Name of the sending plugin
    pub sender: *const c_char,
    /// Message type, e.g. [`plugin::MESSAGE_DATA_LOADED`]
    pub kind: u32,
    /// Length of `data`
    pub data_len: u32,
    /// Message payload
    pub data: *mut c_void,
}

/// Listener callback
pub type EventCallback = unsafe extern "C" fn(message: *mut Message);

/// `SKSEMessagingInterface`
#[repr(C)]
pub struct MessagingInterface {
    /// Interface version
    pub interface_version: u32,
    /// Registers `handler` for broadcasts from `sender`
    pub register_listener: unsafe extern "C" fn(
        listener: PluginHandle,
        sender: *const c_char,
        handler: EventCallback,
    ) -> bool,
    /// Sends a message to other plugins
    pub dispatch: unsafe extern "C" fn(
        sender: PluginHandle,
        kind: u32,
        data: *mut c_void,
        data_len: u32,
        receiver: *const c_char,
    ) -> bool,
    /// Gets one of the game's event dispatchers
    pub get_event_dispatcher: unsafe extern "C" fn(dispatcher_id: u32) -> *mut c_void,
}

/// `BGSSoundCategory::LoadForm`
pub type LoadFormFn =
    unsafe extern "C" fn(category: *mut SoundCategoryForm, mod_info: *mut ModInfo) -> bool;
/// `INIPrefSettingCollection` save, called when the settings menu writes the preference file
pub type SaveFromMenuFn =
    unsafe extern "C" fn(this: i64, unk1: i64, file_name: *mut c_char, unk2: i64) -> bool;

/// What a successful query found
#[derive(Clone, Copy)]
struct Validated {
    /// Our handle with the loader
    handle: PluginHandle,
    /// Loader messaging interface
    messaging: NonNull<MessagingInterface>,
    /// Offsets for the running build
    offsets: &'static Offsets,
}
// Safety: the messaging interface is a static table owned by the loader
unsafe impl Send for Validated {}

/// The activated plugin
type GamePlugin = Plugin<SoundCategoryForm, HostVolumeControl>;

lazy_static! {
    static ref VALIDATED: Mutex<Option<Validated>> = Mutex::new(None);
    static ref PLUGIN: Mutex<Option<GamePlugin>> = Mutex::new(None);
}

/// `LoadForm` as it was before we hooked it
static ORIGINAL_LOAD_FORM: OnceLock<LoadFormFn> = OnceLock::new();
/// Preference save as it was before we hooked it
static ORIGINAL_SAVE_FROM_MENU: OnceLock<SaveFromMenuFn> = OnceLock::new();

/// Locks `mutex`, ignoring poisoning: a panic can't leave the plugin state half-written in a way that matters
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current lifecycle stage
pub fn stage() -> Stage {
    lock(&*PLUGIN)
        .as_ref()
        .map_or(Stage::Unvalidated, Plugin::stage)
}

/// Called by the loader to ask whether we want to be loaded
///
/// # Safety
///
/// `skse` and `info` must be valid loader structures
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SKSEPlugin_Query(skse: *const SKSEInterface, info: *mut PluginInfo) -> bool {
    if let Ok(config) = Config::from_environment() {
        // the plugin works without a log
        let _ = logger::init(&config.log_path);
    }
    log::info!("SNCTSave");

    let (Some(skse), Some(info)) = (skse.as_ref(), info.as_mut()) else {
        log::error!("loader passed a null interface");
        return false;
    };
    identify(info);

    match query(skse) {
        Ok(validated) => {
            *lock(&*VALIDATED) = Some(validated);
            true
        }
        Err(e) => {
            log::error!("{e}");
            false
        }
    }
}

/// Called by the loader after a successful query
///
/// # Safety
///
/// Must be called by the loader, on the main thread, before the game has loaded any data
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SKSEPlugin_Load(_skse: *const SKSEInterface) -> bool {
    log::info!("- save added sound categories -");
    match load() {
        Ok(()) => {
            log::info!("all patches applied");
            true
        }
        Err(e) => {
            log::error!("{e}, disabling patch");
            false
        }
    }
}

/// Fills in our identity
fn identify(info: &mut PluginInfo) {
    info.info_version = PLUGIN_INFO_VERSION;
    info.name = PLUGIN_NAME.as_ptr().cast();
    info.version = PLUGIN_VERSION;
}

/// Checks the environment described by `skse`
///
/// # Safety
///
/// The function pointers in `skse` must be callable
unsafe fn query(skse: &SKSEInterface) -> Result<Validated, Error> {
    let handle = (skse.get_plugin_handle)();
    let messaging =
        NonNull::new((skse.query_interface)(INTERFACE_MESSAGING).cast::<MessagingInterface>());
    let env = HostEnvironment {
        runtime_version: RuntimeVersion::from_raw(skse.runtime_version),
        is_editor: skse.is_editor != 0,
        messaging_available: messaging.is_some(),
    };
    let offsets = plugin::validate(&env)?;
    let messaging = messaging.ok_or(Error::MissingInterface("messaging"))?;
    Ok(Validated {
        handle,
        messaging,
        offsets,
    })
}

/// Loads the store, hooks the game and starts listening
///
/// # Safety
///
/// Patches the running game; see [`SKSEPlugin_Load`]
unsafe fn load() -> Result<(), Error> {
    let validated = (*lock(&*VALIDATED)).ok_or(Error::NotValidated)?;
    let config = Config::from_environment()?;
    let base = ModuleBase::current()?;
    let offsets = validated.offsets;

    let set_volume = mem::transmute::<usize, SetVolumeFn>(
        base.resolve(offsets.sound_category_set_volume).address(),
    );
    let plugin = Plugin::load(&config.store_path, HostVolumeControl::new(set_volume))?;
    activate(plugin, || install_patches(base, offsets))?;

    let messaging = validated.messaging.as_ref();
    if (messaging.register_listener)(
        validated.handle,
        LISTENER_SENDER.as_ptr().cast(),
        on_message,
    ) {
        if let Some(plugin) = lock(&*PLUGIN).as_mut() {
            plugin.listening();
        }
    } else {
        log::warn!("couldn't register for loader messages, stored volumes won't be applied");
    }
    Ok(())
}

/// Installs the patches, then publishes `plugin` to the interposers.
///
/// If installing fails the plugin is never published, so an interposer that did get installed only forwards to the
/// game and saves nothing.
fn activate(
    mut plugin: GamePlugin,
    install: impl FnOnce() -> Result<(), Error>,
) -> Result<(), Error> {
    log::info!("hooking vtbls");
    install()?;
    log::info!("success");
    plugin.patches_installed();
    *lock(&*PLUGIN) = Some(plugin);
    Ok(())
}

/// Points both function table slots at our interposers, keeping the originals for forwarding
///
/// # Safety
///
/// `offsets` must belong to the running build and the game must not be calling through the slots yet
unsafe fn install_patches(base: ModuleBase, offsets: &Offsets) -> Result<(), Error> {
    let save_slot = base.resolve(offsets.pref_collection_save_slot);
    let original = hook::install(save_slot.as_mut_ptr(), pref_collection_save_from_menu as *const ())?;
    let _ = ORIGINAL_SAVE_FROM_MENU.set(mem::transmute::<*const (), SaveFromMenuFn>(original));
    log::debug!("hooked preference save at {:#X}", save_slot.address());

    let load_slot = base.resolve(offsets.sound_category_load_form_slot);
    let original = hook::install(load_slot.as_mut_ptr(), sound_category_load_form as *const ())?;
    let _ = ORIGINAL_LOAD_FORM.set(mem::transmute::<*const (), LoadFormFn>(original));
    log::debug!("hooked sound category load at {:#X}", load_slot.address());
    Ok(())
}

/// Loader broadcast listener
unsafe extern "C" fn on_message(message: *mut Message) {
    let Some(message) = message.as_ref() else {
        return;
    };
    if let Some(plugin) = lock(&*PLUGIN).as_mut() {
        plugin.handle_message(message.kind);
    }
}

/// Interposer for `BGSSoundCategory::LoadForm`
unsafe extern "C" fn sound_category_load_form(
    category: *mut SoundCategoryForm,
    mod_info: *mut ModInfo,
) -> bool {
    match ORIGINAL_LOAD_FORM.get() {
        Some(&original) => load_form_with(original, category, mod_info),
        None => {
            log::error!("sound category load called before the original was saved");
            false
        }
    }
}

/// Runs `original`, then tracks the category it loaded. Always returns what `original` returned.
unsafe fn load_form_with(
    original: LoadFormFn,
    category: *mut SoundCategoryForm,
    mod_info: *mut ModInfo,
) -> bool {
    let result = original(category, mod_info);
    let Some(category) = NonNull::new(category) else {
        return result;
    };
    let owner = mod_info.as_ref().map(ModInfo::name).unwrap_or_default();
    if let Some(plugin) = lock(&*PLUGIN).as_mut() {
        plugin.category_loaded(CategoryRef::from_raw(category), &owner, result);
    }
    result
}

/// Interposer for the preference save
unsafe extern "C" fn pref_collection_save_from_menu(
    this: i64,
    unk1: i64,
    file_name: *mut c_char,
    unk2: i64,
) -> bool {
    match ORIGINAL_SAVE_FROM_MENU.get() {
        Some(&original) => save_from_menu_with(original, this, unk1, file_name, unk2),
        None => {
            log::error!("preference save called before the original was saved");
            false
        }
    }
}

/// Runs `original`, then saves our volumes whatever it returned. Always returns what `original` returned.
unsafe fn save_from_menu_with(
    original: SaveFromMenuFn,
    this: i64,
    unk1: i64,
    file_name: *mut c_char,
    unk2: i64,
) -> bool {
    let result = original(this, unk1, file_name, unk2);
    if let Some(plugin) = lock(&*PLUGIN).as_mut() {
        plugin.preferences_saved();
    }
    result
}
