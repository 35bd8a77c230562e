//! `AppSettings` / `ScrollProfile` data model and JSON persistence.
//!
//! The wire format and defaults are pinned by `spec.md` §6. The settings
//! file is a portable flat JSON document beside the executable, not an
//! app-data-dir store, so persistence is hand-rolled with `serde_json` +
//! `std::fs` rather than `tauri-plugin-store` (see `DESIGN.md`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SwiftScrollError;

pub const DEFAULT_PROFILE_NAME: &str = "Default";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
const CURRENT_SCHEMA_VERSION: u32 = 1;

fn clamp_step_size(v: i32) -> i32 {
    v.clamp(1, 25)
}

fn clamp_acceleration_max(v: i32) -> i32 {
    v.max(1)
}

fn clamp_tail_to_head_ratio(v: i32) -> i32 {
    v.max(1)
}

fn clamp_animation_time(v: i32) -> i32 {
    v.max(1)
}

fn clamp_acceleration_delta(v: i32) -> i32 {
    v.max(0)
}

/// Default name a profile is given if the JSON omits it — never surfaced in
/// practice because `profiles[0].profile_name` is always `"Default"`.
fn default_profile_name() -> String {
    DEFAULT_PROFILE_NAME.to_string()
}

fn default_step_size_px() -> i32 {
    12
}
fn default_animation_time_ms() -> i32 {
    250
}
fn default_acceleration_delta_ms() -> i32 {
    60
}
fn default_acceleration_max() -> i32 {
    6
}
fn default_tail_to_head_ratio() -> i32 {
    2
}
fn default_true() -> bool {
    true
}

/// A named tuple of runtime animation parameters. See `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollProfile {
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    #[serde(default = "default_step_size_px")]
    pub step_size_px: i32,
    #[serde(default = "default_animation_time_ms")]
    pub animation_time_ms: i32,
    #[serde(default = "default_acceleration_delta_ms")]
    pub acceleration_delta_ms: i32,
    #[serde(default = "default_acceleration_max")]
    pub acceleration_max: i32,
    #[serde(default = "default_tail_to_head_ratio")]
    pub tail_to_head_ratio: i32,
    #[serde(default = "default_true")]
    pub animation_easing: bool,
    #[serde(default = "default_true")]
    pub horizontal_smoothness: bool,
    #[serde(default)]
    pub reverse_wheel_direction: bool,
}

impl Default for ScrollProfile {
    fn default() -> Self {
        Self {
            profile_name: default_profile_name(),
            step_size_px: default_step_size_px(),
            animation_time_ms: default_animation_time_ms(),
            acceleration_delta_ms: default_acceleration_delta_ms(),
            acceleration_max: default_acceleration_max(),
            tail_to_head_ratio: default_tail_to_head_ratio(),
            animation_easing: true,
            horizontal_smoothness: true,
            reverse_wheel_direction: false,
        }
    }
}

impl ScrollProfile {
    /// Clamp every field into its spec-mandated range. Applied on every
    /// load so a hand-edited JSON file degrades gracefully rather than
    /// being rejected outright (§6: "a malformed file falls back to
    /// defaults without erroring the process").
    pub fn clamp(&mut self) {
        self.step_size_px = clamp_step_size(self.step_size_px);
        self.animation_time_ms = clamp_animation_time(self.animation_time_ms);
        self.acceleration_delta_ms = clamp_acceleration_delta(self.acceleration_delta_ms);
        self.acceleration_max = clamp_acceleration_max(self.acceleration_max);
        self.tail_to_head_ratio = clamp_tail_to_head_ratio(self.tail_to_head_ratio);
    }

    fn named(name: &str) -> Self {
        Self {
            profile_name: name.to_string(),
            ..Self::default()
        }
    }
}

/// One `process_name -> profile_name` binding, preserving insertion order
/// on the wire per §6 (a list of objects, not a map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppProfileEntry {
    pub app_name: String,
    pub profile_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "current_schema_version")]
    pub settings_version: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub shift_key_horizontal: bool,

    #[serde(default = "default_step_size_px")]
    pub step_size_px: i32,
    #[serde(default = "default_animation_time_ms")]
    pub animation_time_ms: i32,
    #[serde(default = "default_acceleration_delta_ms")]
    pub acceleration_delta_ms: i32,
    #[serde(default = "default_acceleration_max")]
    pub acceleration_max: i32,
    #[serde(default = "default_tail_to_head_ratio")]
    pub tail_to_head_ratio: i32,
    #[serde(default = "default_true")]
    pub animation_easing: bool,
    #[serde(default = "default_true")]
    pub horizontal_smoothness: bool,
    #[serde(default)]
    pub reverse_wheel_direction: bool,

    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub excluded_apps: Vec<String>,

    #[serde(default = "default_profiles")]
    pub profiles: Vec<ScrollProfile>,

    #[serde(default)]
    pub app_profiles: Vec<AppProfileEntry>,
}

fn current_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

fn default_profiles() -> Vec<ScrollProfile> {
    vec![ScrollProfile::named(DEFAULT_PROFILE_NAME)]
}

impl Default for AppSettings {
    fn default() -> Self {
        let defaults = ScrollProfile::default();
        Self {
            settings_version: CURRENT_SCHEMA_VERSION,
            enabled: true,
            shift_key_horizontal: true,
            step_size_px: defaults.step_size_px,
            animation_time_ms: defaults.animation_time_ms,
            acceleration_delta_ms: defaults.acceleration_delta_ms,
            acceleration_max: defaults.acceleration_max,
            tail_to_head_ratio: defaults.tail_to_head_ratio,
            animation_easing: defaults.animation_easing,
            horizontal_smoothness: defaults.horizontal_smoothness,
            reverse_wheel_direction: defaults.reverse_wheel_direction,
            autostart: false,
            excluded_apps: Vec::new(),
            profiles: default_profiles(),
            app_profiles: Vec::new(),
        }
    }
}

impl AppSettings {
    /// Enforce every data-layer invariant from `spec.md` §3: profile names
    /// are case-insensitively unique, "Default" always exists first and
    /// cannot be removed, and every profile's numeric fields are clamped.
    pub fn normalize(&mut self) {
        if self.profiles.is_empty() {
            self.profiles = default_profiles();
        }

        let has_default = self
            .profiles
            .iter()
            .any(|p| p.profile_name.eq_ignore_ascii_case(DEFAULT_PROFILE_NAME));
        if !has_default {
            self.profiles.insert(0, ScrollProfile::named(DEFAULT_PROFILE_NAME));
        } else {
            // Ensure Default is first, per §3 ("first is Default").
            if let Some(idx) = self
                .profiles
                .iter()
                .position(|p| p.profile_name.eq_ignore_ascii_case(DEFAULT_PROFILE_NAME))
            {
                if idx != 0 {
                    let def = self.profiles.remove(idx);
                    self.profiles.insert(0, def);
                }
            }
        }

        // De-duplicate case-insensitively, keeping first occurrence.
        let mut seen: HashMap<String, ()> = HashMap::new();
        self.profiles.retain(|p| {
            let key = p.profile_name.to_ascii_lowercase();
            if seen.contains_key(&key) {
                false
            } else {
                seen.insert(key, ());
                true
            }
        });

        for profile in &mut self.profiles {
            profile.clamp();
        }

        self.step_size_px = clamp_step_size(self.step_size_px);
        self.animation_time_ms = clamp_animation_time(self.animation_time_ms);
        self.acceleration_delta_ms = clamp_acceleration_delta(self.acceleration_delta_ms);
        self.acceleration_max = clamp_acceleration_max(self.acceleration_max);
        self.tail_to_head_ratio = clamp_tail_to_head_ratio(self.tail_to_head_ratio);
    }

    /// Remove a profile by case-insensitive name. Rejects removal of
    /// "Default", per the §3/§9 invariant encoded at the data layer.
    pub fn remove_profile(&mut self, name: &str) -> Result<(), SwiftScrollError> {
        if name.eq_ignore_ascii_case(DEFAULT_PROFILE_NAME) {
            return Err(SwiftScrollError::ProfileNotFound {
                name: name.to_string(),
            });
        }
        let before = self.profiles.len();
        self.profiles
            .retain(|p| !p.profile_name.eq_ignore_ascii_case(name));
        if self.profiles.len() == before {
            return Err(SwiftScrollError::ProfileNotFound {
                name: name.to_string(),
            });
        }
        self.app_profiles
            .retain(|e| !e.profile_name.eq_ignore_ascii_case(name));
        Ok(())
    }

    pub fn find_profile(&self, name: &str) -> Option<&ScrollProfile> {
        self.profiles
            .iter()
            .find(|p| p.profile_name.eq_ignore_ascii_case(name))
    }

    /// Build a case-insensitive `process_name -> profile_name` lookup,
    /// rebuilt once per settings publication rather than per notch
    /// (`spec.md` §4.2 / §9).
    pub fn app_profile_map(&self) -> HashMap<String, String> {
        self.app_profiles
            .iter()
            .map(|e| (e.app_name.to_ascii_lowercase(), e.profile_name.clone()))
            .collect()
    }

    pub fn excluded_set(&self) -> std::collections::HashSet<String> {
        self.excluded_apps
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .collect()
    }
}

/// Load settings from `path`, returning `Err` on I/O or parse failure.
/// Unknown JSON fields are ignored by `serde`'s default behavior (no
/// `deny_unknown_fields`); missing fields fall back to compiled defaults
/// via the `#[serde(default = ...)]` annotations above.
pub fn try_load(path: &Path) -> Result<AppSettings, SwiftScrollError> {
    let text = fs::read_to_string(path).map_err(|e| SwiftScrollError::SettingsLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut settings: AppSettings =
        serde_json::from_str(&text).map_err(|e| SwiftScrollError::SettingsLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    settings.normalize();
    Ok(settings)
}

/// Load settings, falling back to compiled defaults on any failure. This is
/// the entry point the orchestrator actually calls — per §6/§7, a
/// malformed or missing file never errors the process.
pub fn load(path: &Path) -> AppSettings {
    match try_load(path) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("settings load failed, using defaults: {e}");
            let mut defaults = AppSettings::default();
            defaults.normalize();
            defaults
        }
    }
}

pub fn try_save(path: &Path, settings: &AppSettings) -> Result<(), SwiftScrollError> {
    let text =
        serde_json::to_string_pretty(settings).map_err(|e| SwiftScrollError::SettingsSaveFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    fs::write(path, text).map_err(|e| SwiftScrollError::SettingsSaveFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn save(path: &Path, settings: &AppSettings) {
    if let Err(e) = try_save(path, settings) {
        log::warn!("settings save failed: {e}");
    }
}

/// First-run migration: if the portable settings file doesn't exist yet but
/// an older per-user location holds one, copy it into place (§6). No-op if
/// the portable file already exists, or if no legacy file is found.
pub fn migrate_legacy_if_present(portable_path: &Path, legacy_path: &Path) {
    if portable_path.exists() {
        return;
    }
    if !legacy_path.exists() {
        return;
    }
    match fs::copy(legacy_path, portable_path) {
        Ok(_) => log::info!(
            "migrated legacy settings from {} to {}",
            legacy_path.display(),
            portable_path.display()
        ),
        Err(e) => log::warn!("legacy settings migration failed: {e}"),
    }
}

/// The portable settings path: `settings.json` beside the running
/// executable (§6).
pub fn portable_settings_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join(SETTINGS_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_windows_classic_preset() {
        let s = AppSettings::default();
        assert_eq!(s.step_size_px, 12);
        assert_eq!(s.animation_time_ms, 250);
        assert_eq!(s.acceleration_delta_ms, 60);
        assert_eq!(s.acceleration_max, 6);
        assert_eq!(s.tail_to_head_ratio, 2);
        assert!(s.animation_easing);
        assert!(s.horizontal_smoothness);
        assert!(!s.reverse_wheel_direction);
        assert!(s.enabled);
        assert!(s.shift_key_horizontal);
    }

    #[test]
    fn round_trip_is_byte_semantic_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let mut settings = AppSettings::default();
        settings.excluded_apps.push("notepad.exe".to_string());
        settings.profiles.push(ScrollProfile::named("Gaming"));
        settings.app_profiles.push(AppProfileEntry {
            app_name: "game.exe".to_string(),
            profile_name: "Gaming".to_string(),
        });
        try_save(&path, &settings).unwrap();

        let loaded = try_load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn unknown_fields_do_not_raise() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            r#"{"enabled": false, "totally_unknown_field": 42, "nested": {"a": 1}}"#,
        )
        .unwrap();

        let loaded = try_load(&path).unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.step_size_px, 12);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "{ this is not valid json").unwrap();

        let loaded = load(&path);
        assert_eq!(loaded, AppSettings::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let loaded = load(&path);
        assert_eq!(loaded, AppSettings::default());
    }

    #[test]
    fn default_profile_cannot_be_removed() {
        let mut settings = AppSettings::default();
        let result = settings.remove_profile("default");
        assert!(result.is_err());
        assert_eq!(settings.profiles.len(), 1);
    }

    #[test]
    fn profile_names_are_case_insensitively_unique_after_normalize() {
        let mut settings = AppSettings::default();
        settings.profiles.push(ScrollProfile::named("Gaming"));
        settings.profiles.push(ScrollProfile::named("GAMING"));
        settings.normalize();
        assert_eq!(settings.profiles.len(), 2);
        assert_eq!(settings.profiles[0].profile_name, DEFAULT_PROFILE_NAME);
    }

    #[test]
    fn step_size_is_clamped_on_normalize() {
        let mut settings = AppSettings::default();
        settings.profiles[0].step_size_px = 999;
        settings.normalize();
        assert_eq!(settings.profiles[0].step_size_px, 25);
    }

    #[test]
    fn legacy_migration_copies_when_portable_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy.json");
        let portable = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&legacy, serde_json::to_string(&AppSettings::default()).unwrap()).unwrap();

        migrate_legacy_if_present(&portable, &legacy);
        assert!(portable.exists());
    }

    #[test]
    fn legacy_migration_is_noop_when_portable_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy.json");
        let portable = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&legacy, "{}").unwrap();
        fs::write(&portable, "{\"enabled\":false}").unwrap();

        migrate_legacy_if_present(&portable, &legacy);
        let contents = fs::read_to_string(&portable).unwrap();
        assert_eq!(contents, "{\"enabled\":false}");
    }
}
