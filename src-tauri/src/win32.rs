//! Thin Win32 FFI adapters: low-level mouse hook registration, Shift key
//! state, window-under-point/process-name resolution, and synthetic wheel
//! event injection. Nothing here decides *whether* to swallow or forward —
//! that policy lives in `interception`; this module only talks to the OS.

use std::collections::HashSet;
use std::path::Path;

use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, HWND, LPARAM, POINT, WPARAM};
use windows::Win32::System::Threading::{
    GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_HWHEEL,
    MOUSEEVENTF_WHEEL, MOUSEINPUT, VK_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, EnumWindows, FindWindowW, GetAncestor, GetClassNameW, GetDesktopWindow,
    GetForegroundWindow, GetWindowLongW, GetWindowThreadProcessId, IsWindowVisible,
    SetWindowsHookExW, UnhookWindowsHookEx, GA_ROOT, GWL_STYLE, HHOOK, MSLLHOOKSTRUCT,
    WH_MOUSE_LL, WS_CHILD,
};

use crate::error::SwiftScrollError;

/// Low-level hook message constant. Defined locally — not re-exported
/// under that name by every version of the `windows` crate.
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_MOUSEHWHEEL: u32 = 0x020E;

/// `MSLLHOOKSTRUCT::flags` bits marking an event as OS-injected. The engine's
/// own `SendInput`-originated wheel events always carry one of these, which
/// is exactly the feedback-loop guard `spec.md` §4.1 relies on.
pub const LLMHF_INJECTED: u32 = 0x0000_0001;
pub const LLMHF_LOWER_IL_INJECTED: u32 = 0x0000_0002;

/// One Win32 "notch" unit, per `spec.md` §6 ("notches × 120").
pub const WHEEL_DELTA: i32 = 120;

/// A raw `HHOOK` wrapped so it can cross thread boundaries. Win32 hook
/// handles are process-wide identifiers, not thread-local resources, so
/// moving this between threads is sound.
#[derive(Clone, Copy)]
pub struct SendHook(pub HHOOK);
unsafe impl Send for SendHook {}
unsafe impl Sync for SendHook {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendHwnd(pub isize);
unsafe impl Send for SendHwnd {}
unsafe impl Sync for SendHwnd {}

impl SendHwnd {
    pub fn from_hwnd(hwnd: HWND) -> Self {
        Self(hwnd.0 as isize)
    }

    pub fn to_hwnd(self) -> HWND {
        HWND(self.0 as *mut std::ffi::c_void)
    }

    pub fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

/// Install a `WH_MOUSE_LL` hook with the given callback. Returns
/// `HookInstallFailed` (and logs) when the OS refuses registration,
/// non-fatal per `spec.md` §4.1/§7.
pub fn install_mouse_hook(
    proc: windows::Win32::UI::WindowsAndMessaging::HOOKPROC,
) -> Result<SendHook, SwiftScrollError> {
    match unsafe { SetWindowsHookExW(WH_MOUSE_LL, proc, None, 0) } {
        Ok(hook) => Ok(SendHook(hook)),
        Err(e) => {
            let err = SwiftScrollError::HookInstallFailed {
                code: e.code().0 as u32,
            };
            log::error!("{err}");
            Err(err)
        }
    }
}

pub fn uninstall_hook(hook: SendHook) {
    let _ = unsafe { UnhookWindowsHookEx(hook.0) };
}

#[inline]
pub fn call_next_hook(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> windows::Win32::Foundation::LRESULT {
    unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
}

/// Read the `MSLLHOOKSTRUCT` payload out of a hook callback's `l_param`.
/// The caller is responsible for only calling this when `n_code >= 0`, per
/// the hook contract.
///
/// # Safety
/// `l_param` must point to a valid `MSLLHOOKSTRUCT` for the lifetime of the
/// hook callback, which is guaranteed by the OS for `WH_MOUSE_LL`.
#[inline]
pub unsafe fn read_mouse_payload(l_param: LPARAM) -> MSLLHOOKSTRUCT {
    *(l_param.0 as *const MSLLHOOKSTRUCT)
}

/// True when the hook payload's flags mark the event as programmatically
/// injected — either at full or lower integrity level.
#[inline]
pub fn is_injected(payload: &MSLLHOOKSTRUCT) -> bool {
    payload.flags & (LLMHF_INJECTED | LLMHF_LOWER_IL_INJECTED) != 0
}

/// Poll the physical Shift key state. Callers should cache this — see
/// `interception::ShiftCache` — rather than calling on every event.
pub fn is_shift_down() -> bool {
    (unsafe { GetAsyncKeyState(VK_SHIFT.0 as i32) } as u16 & 0x8000) != 0
}

fn get_window_class_name(hwnd: HWND) -> Option<String> {
    let mut buffer = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buffer) };
    if len <= 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buffer[..len as usize]))
}

fn wide_string(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Find a top-level window by class name, used to locate the taskbar.
pub fn find_window_by_class(class_name: &str) -> Option<SendHwnd> {
    let wide = wide_string(class_name);
    let hwnd = unsafe {
        FindWindowW(
            windows::core::PCWSTR(wide.as_ptr()),
            windows::core::PCWSTR::null(),
        )
    }
    .ok()?;
    if hwnd.is_invalid() {
        None
    } else {
        Some(SendHwnd::from_hwnd(hwnd))
    }
}

/// Resolve the root owning window under a screen point, per `spec.md`
/// §4's "Target Resolution": excludes the desktop window itself.
pub fn window_from_point(x: i32, y: i32) -> Option<SendHwnd> {
    let hwnd = unsafe {
        windows::Win32::UI::WindowsAndMessaging::WindowFromPoint(POINT { x, y })
    };
    if hwnd.is_invalid() {
        return None;
    }
    let root = unsafe { GetAncestor(hwnd, GA_ROOT) };
    if root.is_invalid() || root == unsafe { GetDesktopWindow() } {
        return None;
    }
    Some(SendHwnd::from_hwnd(root))
}

/// Resolve the destination window for synthetic injection at notch-arrival
/// time. `WindowLookupFailed` when nothing owns the point — a non-fatal
/// drop-the-notch condition per `spec.md` §4.3/§7, distinct from
/// `window_from_point`'s plain `Option` used by the taskbar-presence check
/// in `interception`, which has no error semantics of its own.
pub fn resolve_target_window(x: i32, y: i32) -> Result<SendHwnd, SwiftScrollError> {
    window_from_point(x, y).ok_or(SwiftScrollError::WindowLookupFailed { x, y })
}

pub fn foreground_window() -> Option<SendHwnd> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.is_invalid() {
        None
    } else {
        Some(SendHwnd::from_hwnd(hwnd))
    }
}

/// The "app name" per `spec.md` §6: the image-file stem (no extension) of
/// the window's owning process, lowercased for case-insensitive matching.
pub fn get_process_name(hwnd: SendHwnd) -> Option<String> {
    let hwnd = hwnd.to_hwnd();
    let mut process_id = 0u32;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));
    }
    if process_id == 0 {
        return None;
    }

    let process =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()? };

    let mut buffer = vec![0u16; 1024];
    let mut size = buffer.len() as u32;
    let query_result = unsafe {
        QueryFullProcessImageNameW(process, PROCESS_NAME_WIN32, PWSTR(buffer.as_mut_ptr()), &mut size)
    };
    let _ = unsafe { CloseHandle(process) };
    if query_result.is_err() || size == 0 {
        return None;
    }

    let full_path = String::from_utf16_lossy(&buffer[..size as usize]);
    let stem = Path::new(&full_path).file_stem()?.to_str()?;
    Some(stem.to_ascii_lowercase())
}

pub fn current_thread_id() -> u32 {
    unsafe { GetCurrentThreadId() }
}

fn is_system_class_name(class_name: &str) -> bool {
    matches!(
        class_name.to_ascii_lowercase().as_str(),
        "shell_traywnd" | "progman" | "workerw" | "shell_secondarytraywnd"
    )
}

fn is_valid_enumeration_target(hwnd: HWND) -> bool {
    if hwnd.is_invalid() || !unsafe { IsWindowVisible(hwnd).as_bool() } {
        return false;
    }
    if hwnd == unsafe { GetDesktopWindow() } {
        return false;
    }
    if get_window_class_name(hwnd)
        .map(|name| is_system_class_name(&name))
        .unwrap_or(false)
    {
        return false;
    }
    if unsafe { GetAncestor(hwnd, GA_ROOT) } != hwnd {
        return false;
    }
    let style = unsafe { GetWindowLongW(hwnd, GWL_STYLE) } as u32;
    style & WS_CHILD.0 == 0
}

unsafe extern "system" fn enum_windows_proc(hwnd: HWND, lparam: LPARAM) -> windows::core::BOOL {
    if is_valid_enumeration_target(hwnd) {
        if let Some(name) = get_process_name(SendHwnd::from_hwnd(hwnd)) {
            let names = &mut *(lparam.0 as *mut HashSet<String>);
            names.insert(name);
        }
    }
    windows::core::BOOL(1)
}

/// Distinct app names (image-file stems) across all visible top-level
/// windows, for the settings UI's process picker (`spec.md` §6).
pub fn get_running_process_names() -> Vec<String> {
    let mut names: HashSet<String> = HashSet::new();
    let ptr = &mut names as *mut HashSet<String>;
    unsafe {
        let _ = EnumWindows(Some(enum_windows_proc), LPARAM(ptr as isize));
    }
    let mut result: Vec<String> = names.into_iter().collect();
    result.sort_unstable();
    result
}

fn mouse_input(flags: windows::Win32::UI::Input::KeyboardAndMouse::MOUSE_EVENT_FLAGS, data: i32) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: data as u32,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

/// Inject a synthetic vertical wheel event scaled to Win32's notches×120
/// unit. `delta_px` is the signed pixel amount for this tick; the engine is
/// responsible for pre-scaling into wheel units via `pixels_to_wheel_units`.
///
/// Per `spec.md` §4.3, injection targets the window captured at notch-arrival
/// time. `SendInput` posts globally (not to a specific HWND); the caller is
/// responsible for ensuring the target window is under the cursor or the
/// foreground focus recipient of wheel messages, matching real OS wheel
/// delivery semantics — this mirrors how Win32 itself routes `WM_MOUSEWHEEL`
/// (to whatever is under the cursor), so no explicit `PostMessage` target is
/// needed beyond what the cursor position already implies.
pub fn inject_wheel(delta_wheel_units: i32) -> Result<(), SwiftScrollError> {
    let input = mouse_input(MOUSEEVENTF_WHEEL, delta_wheel_units);
    send_inputs(&[input])
}

pub fn inject_hwheel(delta_wheel_units: i32) -> Result<(), SwiftScrollError> {
    let input = mouse_input(MOUSEEVENTF_HWHEEL, delta_wheel_units);
    send_inputs(&[input])
}

fn send_inputs(inputs: &[INPUT]) -> Result<(), SwiftScrollError> {
    let size = std::mem::size_of::<INPUT>() as i32;
    let sent = unsafe { SendInput(inputs, size) };
    if sent as usize != inputs.len() {
        let code = unsafe { windows::Win32::Foundation::GetLastError() }.0;
        Err(SwiftScrollError::InjectionFailed { code })
    } else {
        Ok(())
    }
}

/// Scale a signed pixel amount into Win32 wheel units (notches × 120),
/// matching the unit the platform expects per `spec.md` §6. A standard
/// mouse notch worth of travel (one `WHEEL_DELTA`) corresponds to one
/// `step_size_px`-sized pixel contribution at the default profile, so this
/// is a direct 1:1 passthrough of magnitude, just carried in the
/// documented unit.
pub fn pixels_to_wheel_units(pixels: i32) -> i32 {
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_flag_detection() {
        let injected = MSLLHOOKSTRUCT {
            flags: LLMHF_INJECTED,
            ..Default::default()
        };
        assert!(is_injected(&injected));

        let lower_il = MSLLHOOKSTRUCT {
            flags: LLMHF_LOWER_IL_INJECTED,
            ..Default::default()
        };
        assert!(is_injected(&lower_il));

        let real = MSLLHOOKSTRUCT {
            flags: 0,
            ..Default::default()
        };
        assert!(!is_injected(&real));
    }

    #[test]
    fn sendhwnd_roundtrips() {
        let hwnd = HWND(42 as *mut std::ffi::c_void);
        let wrapped = SendHwnd::from_hwnd(hwnd);
        assert_eq!(wrapped.to_hwnd(), hwnd);
        assert!(!wrapped.is_invalid());
    }
}
