//! C ABI wrapper for the Ambiance engine.
//!
//! Exposes the playback commands and meters of a [`PlaybackController`]
//! driven by a pull-model backend: the host owns the audio callback and
//! calls `ambiance_render_interleaved_f32` from it.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `AmbianceEngine` (heap-allocated; you own/delete it).
//! - Sound ids are NUL-terminated UTF-8. Null pointers and invalid UTF-8 make
//!   the call a no-op (queries return 0).
//! - Render path produces **mono** internally and duplicates to N channels.
//!
//! Threading
//! - The object is NOT thread-safe; serialize all calls on one thread.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{c_char, CStr};

use ambiance_engine::{EngineConfig, ManualBackend, PlaybackController, RecipeTable};
use tracing::warn;

/// Opaque engine handle.
pub struct AmbianceEngine {
    inner: PlaybackController<ManualBackend>,
}

impl AmbianceEngine {
    fn new(sample_rate: u32) -> Option<Self> {
        let config = EngineConfig { sample_rate: sample_rate.max(1), ..EngineConfig::default() };
        let recipes = match RecipeTable::builtin() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "built-in recipes failed to load");
                return None;
            }
        };
        match PlaybackController::new(ManualBackend::new(config.sample_rate), recipes, config) {
            Ok(inner) => Some(Self { inner }),
            Err(e) => {
                warn!(error = %e, "engine creation failed");
                None
            }
        }
    }
}

#[inline]
fn handle<'a>(ptr: *const AmbianceEngine) -> Option<&'a AmbianceEngine> {
    // SAFETY: non-null handles come from `ambiance_create` and are not aliased.
    unsafe { ptr.as_ref() }
}

#[inline]
fn handle_mut<'a>(ptr: *mut AmbianceEngine) -> Option<&'a mut AmbianceEngine> {
    // SAFETY: as above; the caller serializes access.
    unsafe { ptr.as_mut() }
}

#[inline]
fn sound_id<'a>(id: *const c_char) -> Option<&'a str> {
    if id.is_null() {
        return None;
    }
    // SAFETY: the caller passes a NUL-terminated string that outlives the call.
    unsafe { CStr::from_ptr(id) }.to_str().ok()
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine rendering at `sample_rate` with the built-in recipe table.
/// Returns null on failure.
#[no_mangle]
pub extern "C" fn ambiance_create(sample_rate: u32) -> *mut AmbianceEngine {
    match AmbianceEngine::new(sample_rate) {
        Some(e) => Box::into_raw(Box::new(e)),
        None => std::ptr::null_mut(),
    }
}

/// Destroy an engine previously returned by `ambiance_create`.
#[no_mangle]
pub extern "C" fn ambiance_destroy(engine: *mut AmbianceEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)); }
    }
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` of audio into an interleaved f32 buffer with `channels` channels.
/// Silence until a sound has been started, or while suspended.
///
/// Returns the number of frames rendered (0 on error).
#[no_mangle]
pub extern "C" fn ambiance_render_interleaved_f32(
    engine: *mut AmbianceEngine,
    out_interleaved: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    let Some(e) = handle_mut(engine) else { return 0 };
    if out_interleaved.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    let len = frames as usize * channels as usize;
    let out = unsafe { std::slice::from_raw_parts_mut(out_interleaved, len) };
    e.inner.backend_mut().render_interleaved(out, channels as usize) as u32
}

/// Run due teardowns. Call regularly from a non-audio thread (or after render).
#[no_mangle]
pub extern "C" fn ambiance_poll(engine: *mut AmbianceEngine) {
    if let Some(e) = handle_mut(engine) {
        e.inner.poll();
    }
}

// --- Commands --------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn ambiance_play_background(engine: *mut AmbianceEngine, id: *const c_char) {
    if let (Some(e), Some(id)) = (handle_mut(engine), sound_id(id)) {
        e.inner.play_background(id);
    }
}

#[no_mangle]
pub extern "C" fn ambiance_stop_background(engine: *mut AmbianceEngine) {
    if let Some(e) = handle_mut(engine) {
        e.inner.stop_background();
    }
}

#[no_mangle]
pub extern "C" fn ambiance_play_asset(engine: *mut AmbianceEngine, id: *const c_char) {
    if let (Some(e), Some(id)) = (handle_mut(engine), sound_id(id)) {
        e.inner.play_asset(id);
    }
}

#[no_mangle]
pub extern "C" fn ambiance_stop_asset(engine: *mut AmbianceEngine, id: *const c_char) {
    if let (Some(e), Some(id)) = (handle_mut(engine), sound_id(id)) {
        e.inner.stop_asset(id);
    }
}

/// Master volume, clamped to [0, 1].
#[no_mangle]
pub extern "C" fn ambiance_set_master_volume(engine: *mut AmbianceEngine, volume: f32) {
    if let Some(e) = handle_mut(engine) {
        e.inner.set_master_volume(volume);
    }
}

#[no_mangle]
pub extern "C" fn ambiance_set_mute(engine: *mut AmbianceEngine, muted: bool) {
    if let Some(e) = handle_mut(engine) {
        e.inner.set_mute(muted);
    }
}

/// Per-sound volume, clamped to [0, 1]; remembered across stop/replay.
#[no_mangle]
pub extern "C" fn ambiance_set_channel_volume(engine: *mut AmbianceEngine, id: *const c_char, volume: f32) {
    if let (Some(e), Some(id)) = (handle_mut(engine), sound_id(id)) {
        e.inner.set_channel_volume(id, volume);
    }
}

/// Suspend output. The next play request resumes it.
#[no_mangle]
pub extern "C" fn ambiance_suspend(engine: *mut AmbianceEngine) {
    if let Some(e) = handle_mut(engine) {
        e.inner.suspend();
    }
}

// --- Queries ---------------------------------------------------------------------

/// Meter level of one sound in [0, 1]; 0 if not playing.
#[no_mangle]
pub extern "C" fn ambiance_channel_level(engine: *const AmbianceEngine, id: *const c_char) -> f32 {
    match (handle(engine), sound_id(id)) {
        (Some(e), Some(id)) => e.inner.channel_level(id),
        _ => 0.0,
    }
}

#[no_mangle]
pub extern "C" fn ambiance_master_level(engine: *const AmbianceEngine) -> f32 {
    handle(engine).map_or(0.0, |e| e.inner.master_level())
}

/// Number of sounds with a live channel (fading ones included).
#[no_mangle]
pub extern "C" fn ambiance_active_count(engine: *const AmbianceEngine) -> u32 {
    handle(engine).map_or(0, |e| e.inner.active_sound_ids().len() as u32)
}

/// True once the output has been activated and is running.
#[no_mangle]
pub extern "C" fn ambiance_is_active(engine: *const AmbianceEngine) -> bool {
    handle(engine).is_some_and(|e| e.inner.is_active())
}
