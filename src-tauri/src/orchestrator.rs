//! Wires the interception layer, the resolver, and the engine together —
//! the glue `spec.md` §5 describes but doesn't name as its own module.
//!
//! Owns the live `AppSettings`, registers `interception::Callbacks` whose
//! closures resolve the target window's process name and decide whether to
//! swallow (engine absorbs) or forward (interception lets the real wheel
//! event through), and runs the fixed-cadence tick thread that drains the
//! engine into `win32::inject_wheel`/`inject_hwheel`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::engine::{AbsorbOutcome, Axis, Engine, TICK_INTERVAL};
use crate::interception::{self, Callbacks};
use crate::resolver::{self, EffectiveParameters, GLOBAL_DEFAULTS_KEY};
use crate::settings::AppSettings;
use crate::win32;

/// One accepted wheel notch, published from a hook callback to the tick
/// thread along with the resolved parameters it should run under. `at` is
/// the arrival timestamp captured in the hook callback itself, not when the
/// tick thread later drains the message — `spec.md` §3/§4.3/§5 pin
/// acceleration stacking to true inter-arrival gaps, which a timestamp
/// re-sampled at dequeue time would skew by up to one tick interval.
enum EngineMsg {
    Notch {
        axis: Axis,
        at: Instant,
        direction: i32,
        target: Option<win32::SendHwnd>,
        params: EffectiveParameters,
        /// Whether `params` differs from the profile the engine last
        /// reconfigured with — see `cached_profile_key` below.
        params_changed: bool,
    },
}

struct SharedState {
    settings: Mutex<Arc<AppSettings>>,
    /// The `profile_key` the engine was last reconfigured with. `spec.md`
    /// §4.2: "the orchestrator caches profile_key across calls and skips
    /// re-configuring the engine when unchanged, so profile switching does
    /// not cost an allocation per notch." Written only from the hook
    /// callback thread, and reset to `None` whenever the settings surface
    /// publishes a new snapshot (`apply_settings` below) so an in-place edit
    /// to the selected profile's own values is always picked up.
    cached_profile_key: Mutex<Option<String>>,
    running: AtomicBool,
}

static STATE: OnceLock<SharedState> = OnceLock::new();
static ENGINE_TX: OnceLock<SyncSender<EngineMsg>> = OnceLock::new();

fn state() -> &'static SharedState {
    STATE.get_or_init(|| SharedState {
        settings: Mutex::new(Arc::new(AppSettings::default())),
        cached_profile_key: Mutex::new(None),
        running: AtomicBool::new(false),
    })
}

fn current_settings() -> Arc<AppSettings> {
    state().settings.lock().clone()
}

/// Resolve the process name under `(x, y)` and publish a notch for the
/// engine/tick thread to absorb. Returns `true` (swallow) unless the
/// app is excluded, the master toggle is off, the target window can't be
/// resolved (`WindowLookupFailed`, dropped silently per `spec.md` §4.3/§7),
/// or the channel is gone.
fn handle_notch(axis: Axis, delta_wheel_units: i32, x: i32, y: i32) -> bool {
    let at = Instant::now();
    let settings = current_settings();
    if !settings.enabled {
        return false;
    }

    let target = match win32::resolve_target_window(x, y) {
        Ok(hwnd) => hwnd,
        Err(e) => {
            log::debug!("orchestrator: {e}, dropping notch");
            return false;
        }
    };
    let process_name = win32::get_process_name(target);

    let resolution = match &process_name {
        Some(name) => resolver::resolve(&settings, name),
        None => resolver::Resolution {
            excluded: false,
            effective: resolver::resolve(&settings, "").effective,
            profile_key: GLOBAL_DEFAULTS_KEY.to_string(),
        },
    };

    if resolution.excluded {
        return false;
    }

    let params_changed = {
        let mut cached = state().cached_profile_key.lock();
        let changed = cached.as_deref() != Some(resolution.profile_key.as_str());
        if changed {
            *cached = Some(resolution.profile_key.clone());
        }
        changed
    };

    let direction = if delta_wheel_units >= 0 { 1 } else { -1 };
    let Some(tx) = ENGINE_TX.get() else { return false };
    let msg = EngineMsg::Notch {
        axis,
        at,
        direction,
        target: Some(target),
        params: resolution.effective,
        params_changed,
    };
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            log::warn!("orchestrator: engine channel full, dropping notch");
            true // still swallow — dropping a frame beats double-emitting
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

fn spawn_tick_thread(rx: Receiver<EngineMsg>) {
    thread::spawn(move || {
        let mut engine = Engine::new();
        while state().running.load(Ordering::Acquire) {
            while let Ok(msg) = rx.try_recv() {
                match msg {
                    EngineMsg::Notch { axis, at, direction, target, params, params_changed } => {
                        if params_changed {
                            engine.apply_settings(params);
                        }
                        let outcome = engine.absorb_notch(axis, at, direction, target);
                        if let AbsorbOutcome::Immediate(px) = outcome {
                            inject(axis, px);
                        }
                    }
                }
            }

            engine.tick(
                Instant::now(),
                |px| inject_checked(Axis::Vertical, px),
                |px| inject_checked(Axis::Horizontal, px),
            );

            thread::sleep(TICK_INTERVAL);
        }
        engine.stop();
        log::info!("orchestrator: tick thread exiting");
    });
}

fn inject(axis: Axis, px: i32) {
    let _ = inject_checked(axis, px);
}

fn inject_checked(axis: Axis, px: i32) -> bool {
    let result = match axis {
        Axis::Vertical => win32::inject_wheel(px),
        Axis::Horizontal => win32::inject_hwheel(px),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{axis:?}: {e}");
            false
        }
    }
}

/// Start the orchestrator: registers the interception callbacks, spawns the
/// tick thread, and installs the hook if `settings.enabled`. Idempotent.
pub fn start(settings: Arc<AppSettings>) {
    if state().running.swap(true, Ordering::AcqRel) {
        return;
    }
    *state().settings.lock() = settings.clone();

    let (tx, rx) = sync_channel::<EngineMsg>(256);
    let _ = ENGINE_TX.set(tx);

    interception::set_shift_key_horizontal(settings.shift_key_horizontal);
    interception::set_callbacks(Callbacks {
        on_wheel: Box::new(|delta, x, y| handle_notch(Axis::Vertical, delta, x, y)),
        on_hwheel: Box::new(|delta, x, y| handle_notch(Axis::Horizontal, delta, x, y)),
    });

    spawn_tick_thread(rx);

    if settings.enabled {
        interception::install();
    }
}

/// Replace the live settings snapshot. Re-installs/uninstalls the hook if
/// `enabled` changed, and invalidates the cached profile-resolution key so
/// the next notch re-resolves against the new settings.
pub fn apply_settings(new_settings: Arc<AppSettings>) {
    let was_enabled = current_settings().enabled;
    *state().settings.lock() = new_settings.clone();
    *state().cached_profile_key.lock() = None;
    interception::set_shift_key_horizontal(new_settings.shift_key_horizontal);

    if new_settings.enabled && !was_enabled {
        interception::install();
    } else if !new_settings.enabled && was_enabled {
        interception::uninstall();
    }
}

pub fn stop() {
    if !state().running.swap(false, Ordering::AcqRel) {
        return;
    }
    interception::uninstall();
}

pub fn is_running() -> bool {
    state().running.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_resolution_matches_settings_defaults() {
        let settings = AppSettings::default();
        let defaults = resolver::resolve(&settings, "").effective;
        assert_eq!(defaults.step_size_px, settings.step_size_px);
        assert_eq!(defaults.animation_time_ms, settings.animation_time_ms);
    }
}
