//! Tauri command surface — the settings window's only way to read/change
//! live state. Mirrors `spec.md` §4.7's operation list.

use std::sync::Arc;

use parking_lot::Mutex;
use tauri::State;

use crate::orchestrator;
use crate::settings::{self, AppSettings};
use crate::win32;

pub struct AppState {
    pub settings: Arc<Mutex<Arc<AppSettings>>>,
}

#[tauri::command]
pub fn get_settings(state: State<'_, AppState>) -> AppSettings {
    (**state.settings.lock()).clone()
}

#[tauri::command]
pub fn set_settings(state: State<'_, AppState>, mut new_settings: AppSettings) -> Result<(), String> {
    new_settings.normalize();
    let shared = Arc::new(new_settings);
    *state.settings.lock() = shared.clone();

    orchestrator::apply_settings(shared.clone());

    let path = settings::portable_settings_path();
    settings::save(&path, &shared);
    Ok(())
}

#[tauri::command]
pub fn get_running_processes() -> Vec<String> {
    win32::get_running_process_names()
}

#[tauri::command]
pub fn set_enabled(state: State<'_, AppState>, enabled: bool) -> Result<(), String> {
    let mut current = (**state.settings.lock()).clone();
    current.enabled = enabled;
    let shared = Arc::new(current);
    *state.settings.lock() = shared.clone();

    orchestrator::apply_settings(shared.clone());

    let path = settings::portable_settings_path();
    settings::save(&path, &shared);
    Ok(())
}
