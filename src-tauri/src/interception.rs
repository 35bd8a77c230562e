//! Global Wheel Interception Layer — `spec.md` §4.1.
//!
//! Owns the `WH_MOUSE_LL` hook, applies the filtering order (suppressed
//! n_code → injected → taskbar → axis classification), and publishes
//! accepted wheel/hwheel notches to caller-registered callbacks. The
//! callbacks decide exclusion/swallowing; this layer only decides whether
//! an event is even a candidate (not injected, not over the taskbar).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PostThreadMessageW, TranslateMessage, MSG, WM_QUIT,
};

use crate::win32::{self, SendHook};

/// Shift key polled at most every 50ms, per `spec.md` §4.1.
const SHIFT_CACHE_WINDOW: Duration = Duration::from_millis(50);
/// Taskbar handle lookup refreshed every 2s, per `spec.md` §4.1.
const TASKBAR_CACHE_WINDOW: Duration = Duration::from_secs(2);

const TASKBAR_CLASS_PRIMARY: &str = "Shell_TrayWnd";
const TASKBAR_CLASS_SECONDARY: &str = "Shell_SecondaryTrayWnd";

struct ShiftCache {
    last_checked: Option<Instant>,
    cached: bool,
}

impl ShiftCache {
    const fn new() -> Self {
        Self {
            last_checked: None,
            cached: false,
        }
    }

    fn is_shift_down(&mut self) -> bool {
        let now = Instant::now();
        let stale = match self.last_checked {
            Some(last) => now.duration_since(last) >= SHIFT_CACHE_WINDOW,
            None => true,
        };
        if stale {
            self.cached = win32::is_shift_down();
            self.last_checked = Some(now);
        }
        self.cached
    }
}

struct TaskbarCache {
    last_checked: Option<Instant>,
    primary: Option<win32::SendHwnd>,
    secondary: Option<win32::SendHwnd>,
}

impl TaskbarCache {
    const fn new() -> Self {
        Self {
            last_checked: None,
            primary: None,
            secondary: None,
        }
    }

    fn refresh_if_stale(&mut self) {
        let now = Instant::now();
        let stale = match self.last_checked {
            Some(last) => now.duration_since(last) >= TASKBAR_CACHE_WINDOW,
            None => true,
        };
        if stale {
            self.primary = win32::find_window_by_class(TASKBAR_CLASS_PRIMARY);
            self.secondary = win32::find_window_by_class(TASKBAR_CLASS_SECONDARY);
            self.last_checked = Some(now);
        }
    }

    fn is_taskbar(&mut self, hwnd: win32::SendHwnd) -> bool {
        self.refresh_if_stale();
        self.primary == Some(hwnd) || self.secondary == Some(hwnd)
    }
}

/// Callbacks the orchestrator registers once at layer construction. Each
/// returns `true` to swallow the event (the `handled` flag from
/// `spec.md` §4.1's contract), `false` to forward it unchanged.
pub struct Callbacks {
    pub on_wheel: Box<dyn Fn(i32, i32, i32) -> bool + Send + Sync>,
    pub on_hwheel: Box<dyn Fn(i32, i32, i32) -> bool + Send + Sync>,
}

static CALLBACKS: OnceLock<Callbacks> = OnceLock::new();
static SHIFT_KEY_HORIZONTAL: AtomicBool = AtomicBool::new(true);
static SHIFT_CACHE: OnceLock<Mutex<ShiftCache>> = OnceLock::new();
static TASKBAR_CACHE: OnceLock<Mutex<TaskbarCache>> = OnceLock::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);
static HOOK_THREAD_ID: AtomicU32 = AtomicU32::new(0);
static HOOK_HANDLE: OnceLock<Mutex<Option<SendHook>>> = OnceLock::new();

fn shift_cache() -> &'static Mutex<ShiftCache> {
    SHIFT_CACHE.get_or_init(|| Mutex::new(ShiftCache::new()))
}

fn taskbar_cache() -> &'static Mutex<TaskbarCache> {
    TASKBAR_CACHE.get_or_init(|| Mutex::new(TaskbarCache::new()))
}

fn hook_handle_cell() -> &'static Mutex<Option<SendHook>> {
    HOOK_HANDLE.get_or_init(|| Mutex::new(None))
}

/// Whether `shift_key_horizontal` should route a vertical wheel message to
/// the horizontal axis when Shift is held. Mutable, observed per-event.
pub fn set_shift_key_horizontal(enabled: bool) {
    SHIFT_KEY_HORIZONTAL.store(enabled, Ordering::Release);
}

unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    // 1. nCode indicates suppression → forward unchanged.
    if n_code < 0 {
        return win32::call_next_hook(n_code, w_param, l_param);
    }

    let msg = w_param.0 as u32;
    if msg != win32::WM_MOUSEWHEEL && msg != win32::WM_MOUSEHWHEEL {
        return win32::call_next_hook(n_code, w_param, l_param);
    }

    // 2. Marshal the payload defensively.
    let payload = unsafe { win32::read_mouse_payload(l_param) };

    // 3. Injected/lower-IL-injected origin → forward unchanged. This is the
    //    feedback-loop guard against the engine's own synthetic events.
    if win32::is_injected(&payload) {
        return win32::call_next_hook(n_code, w_param, l_param);
    }

    // 4. Over a known taskbar window → forward unchanged.
    let cursor_hwnd = win32::window_from_point(payload.pt.x, payload.pt.y);
    if let Some(hwnd) = cursor_hwnd {
        if taskbar_cache().lock().is_taskbar(hwnd) {
            return win32::call_next_hook(n_code, w_param, l_param);
        }
    }

    let Some(callbacks) = CALLBACKS.get() else {
        return win32::call_next_hook(n_code, w_param, l_param);
    };

    let delta = (payload.mouseData >> 16) as i16 as i32;
    let x = payload.pt.x;
    let y = payload.pt.y;

    // 5. Axis classification.
    let handled = if msg == win32::WM_MOUSEWHEEL {
        if SHIFT_KEY_HORIZONTAL.load(Ordering::Acquire) && shift_cache().lock().is_shift_down() {
            (callbacks.on_hwheel)(delta, x, y)
        } else {
            (callbacks.on_wheel)(delta, x, y)
        }
    } else {
        (callbacks.on_hwheel)(delta, x, y)
    };

    // 6. Swallow or forward based on the callback's verdict.
    if handled {
        LRESULT(1)
    } else {
        win32::call_next_hook(n_code, w_param, l_param)
    }
}

/// Register the layer's callbacks. Must be called exactly once before the
/// first `install()` — subsequent calls are ignored (logged).
pub fn set_callbacks(callbacks: Callbacks) {
    if CALLBACKS.set(callbacks).is_err() {
        log::warn!("interception callbacks already set; ignoring");
    }
}

/// Install the low-level mouse hook. Idempotent: a second call while
/// already installed is a no-op. Spawns a dedicated thread running the
/// Win32 message loop the hook requires.
///
/// Returns `false` (and logs once, non-fatally) when the OS refuses
/// registration — `HookInstallFailed`, per `spec.md` §4.1/§7.
pub fn install() -> bool {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return true; // already installed
    }

    shift_cache().lock().last_checked = None;
    taskbar_cache().lock().last_checked = None;

    let (ready_tx, ready_rx) = mpsc::channel::<bool>();
    thread::spawn(move || {
        let thread_id = win32::current_thread_id();
        HOOK_THREAD_ID.store(thread_id, Ordering::Release);

        let hook = match win32::install_mouse_hook(Some(mouse_hook_proc)) {
            Ok(hook) => hook,
            Err(e) => {
                log::error!("{e}");
                let _ = ready_tx.send(false);
                return;
            }
        };
        *hook_handle_cell().lock() = Some(hook);
        let _ = ready_tx.send(true);

        let mut msg = MSG::default();
        loop {
            let status = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            if status.0 <= 0 {
                break;
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        if let Some(hook) = hook_handle_cell().lock().take() {
            win32::uninstall_hook(hook);
        }
        log::info!("interception: hook thread exiting");
    });

    let ok = ready_rx.recv().unwrap_or(false);
    if !ok {
        INSTALLED.store(false, Ordering::Release);
        log::error!("interception: hook install failed");
    } else {
        log::info!("interception: hook installed");
    }
    ok
}

/// Revoke the hook. Idempotent: a second call while already uninstalled is
/// a no-op.
pub fn uninstall() {
    if !INSTALLED.swap(false, Ordering::AcqRel) {
        return; // already uninstalled
    }
    let thread_id = HOOK_THREAD_ID.load(Ordering::Acquire);
    if thread_id != 0 {
        let _ = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
    }
    log::info!("interception: hook uninstalled");
}

pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_cache_refreshes_after_window() {
        let mut cache = ShiftCache::new();
        assert!(cache.last_checked.is_none());
        let _ = cache.is_shift_down();
        assert!(cache.last_checked.is_some());
        let first = cache.last_checked;
        // Still within the 50ms window — cache must not refresh.
        let _ = cache.is_shift_down();
        assert_eq!(cache.last_checked, first);
    }

    #[test]
    fn taskbar_cache_starts_unpopulated() {
        let mut cache = TaskbarCache::new();
        assert!(!cache.is_taskbar(win32::SendHwnd(1234)));
    }
}
