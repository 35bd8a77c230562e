//! Effective Parameter Resolver — `spec.md` §4.2.
//!
//! Maps a foreground/target process name to (excluded, effective
//! parameters, profile key). The orchestrator caches `profile_key` across
//! calls so a steady stream of notches from the same process doesn't pay
//! for a profile lookup or allocation per notch.

use crate::settings::{AppSettings, ScrollProfile, DEFAULT_PROFILE_NAME};

/// Sentinel `profile_key` meaning "no per-process profile selected; the
/// effective parameters are the global defaults." Never collides with a
/// real profile name — profile names are validated non-empty on load.
pub const GLOBAL_DEFAULTS_KEY: &str = "__global__";

/// The subset of `ScrollProfile` fields that actually vary per profile,
/// resolved down to one concrete tuple for the engine to run with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveParameters {
    pub step_size_px: i32,
    pub animation_time_ms: i32,
    pub acceleration_delta_ms: i32,
    pub acceleration_max: i32,
    pub tail_to_head_ratio: i32,
    pub animation_easing: bool,
    pub horizontal_smoothness: bool,
    pub reverse_wheel_direction: bool,
}

impl EffectiveParameters {
    fn from_profile(p: &ScrollProfile) -> Self {
        Self {
            step_size_px: p.step_size_px,
            animation_time_ms: p.animation_time_ms,
            acceleration_delta_ms: p.acceleration_delta_ms,
            acceleration_max: p.acceleration_max,
            tail_to_head_ratio: p.tail_to_head_ratio,
            animation_easing: p.animation_easing,
            horizontal_smoothness: p.horizontal_smoothness,
            reverse_wheel_direction: p.reverse_wheel_direction,
        }
    }

    fn from_global(s: &AppSettings) -> Self {
        Self {
            step_size_px: s.step_size_px,
            animation_time_ms: s.animation_time_ms,
            acceleration_delta_ms: s.acceleration_delta_ms,
            acceleration_max: s.acceleration_max,
            tail_to_head_ratio: s.tail_to_head_ratio,
            animation_easing: s.animation_easing,
            horizontal_smoothness: s.horizontal_smoothness,
            reverse_wheel_direction: s.reverse_wheel_direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub excluded: bool,
    pub effective: EffectiveParameters,
    pub profile_key: String,
}

/// `resolve(process_name) -> Resolution`, per `spec.md` §4.2's algorithm:
/// 1. Exclusion check (case-insensitive).
/// 2. `app_profiles` lookup → named profile.
/// 3. Per-parameter fallback to global defaults when no profile applies.
pub fn resolve(settings: &AppSettings, process_name: &str) -> Resolution {
    let lowered = process_name.to_ascii_lowercase();

    if settings.excluded_set().contains(&lowered) {
        return Resolution {
            excluded: true,
            effective: EffectiveParameters::from_global(settings),
            profile_key: GLOBAL_DEFAULTS_KEY.to_string(),
        };
    }

    let app_profiles = settings.app_profile_map();
    if let Some(profile_name) = app_profiles.get(&lowered) {
        if let Some(profile) = settings.find_profile(profile_name) {
            return Resolution {
                excluded: false,
                effective: EffectiveParameters::from_profile(profile),
                profile_key: profile.profile_name.clone(),
            };
        }
        // Named profile missing — ProfileNotFound, fall back to globals.
        log::warn!(
            "profile {:?} referenced by app_profiles not found; using global defaults",
            profile_name
        );
    }

    Resolution {
        excluded: false,
        effective: EffectiveParameters::from_global(settings),
        profile_key: GLOBAL_DEFAULTS_KEY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AppProfileEntry;

    fn settings_with_profile(name: &str, step: i32) -> AppSettings {
        let mut s = AppSettings::default();
        let mut profile = ScrollProfile::default();
        profile.profile_name = name.to_string();
        profile.step_size_px = step;
        s.profiles.push(profile);
        s
    }

    #[test]
    fn excluded_app_short_circuits() {
        let mut s = AppSettings::default();
        s.excluded_apps.push("notepad".to_string());
        let r = resolve(&s, "Notepad");
        assert!(r.excluded);
    }

    #[test]
    fn app_profile_selects_named_profile() {
        let mut s = settings_with_profile("Gaming", 20);
        s.app_profiles.push(AppProfileEntry {
            app_name: "game.exe".to_string(),
            profile_name: "Gaming".to_string(),
        });
        let r = resolve(&s, "game.exe");
        assert!(!r.excluded);
        assert_eq!(r.effective.step_size_px, 20);
        assert_eq!(r.profile_key, "Gaming");
    }

    #[test]
    fn unmatched_process_uses_global_defaults() {
        let s = AppSettings::default();
        let r = resolve(&s, "unknown.exe");
        assert_eq!(r.profile_key, GLOBAL_DEFAULTS_KEY);
        assert_eq!(r.effective.step_size_px, s.step_size_px);
    }

    #[test]
    fn dangling_app_profile_reference_falls_back_to_global() {
        let mut s = AppSettings::default();
        s.app_profiles.push(AppProfileEntry {
            app_name: "game.exe".to_string(),
            profile_name: "Nonexistent".to_string(),
        });
        let r = resolve(&s, "game.exe");
        assert_eq!(r.profile_key, GLOBAL_DEFAULTS_KEY);
    }

    #[test]
    fn case_insensitive_matching() {
        let mut s = settings_with_profile("Gaming", 20);
        s.app_profiles.push(AppProfileEntry {
            app_name: "Game.EXE".to_string(),
            profile_name: "GAMING".to_string(),
        });
        let r = resolve(&s, "game.exe");
        assert_eq!(r.effective.step_size_px, 20);
    }

    #[test]
    fn default_profile_name_constant_matches_settings() {
        assert_eq!(DEFAULT_PROFILE_NAME, "Default");
    }
}
