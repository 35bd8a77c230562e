//! Error taxonomy shared by every module. Every variant here is non-fatal
//! at the core layer — see `spec.md` §7. None of these ever cross the hook
//! callback boundary; callers on that path degrade instead of propagating.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SwiftScrollError {
    #[error("failed to install low-level hook (win32 error {code:#x})")]
    HookInstallFailed { code: u32 },

    #[error("window lookup failed for point ({x}, {y})")]
    WindowLookupFailed { x: i32, y: i32 },

    #[error("synthetic wheel injection failed (win32 error {code:#x})")]
    InjectionFailed { code: u32 },

    #[error("failed to load settings from {}: {reason}", path.display())]
    SettingsLoadFailed { path: PathBuf, reason: String },

    #[error("failed to save settings to {}: {reason}", path.display())]
    SettingsSaveFailed { path: PathBuf, reason: String },

    #[error("profile {name:?} not found, falling back to global defaults")]
    ProfileNotFound { name: String },
}
