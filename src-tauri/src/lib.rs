mod commands;
mod engine;
mod error;
mod interception;
mod orchestrator;
mod resolver;
mod settings;
mod win32;

use std::sync::Arc;

use commands::AppState;
use parking_lot::Mutex;
use tauri::{
    menu::{MenuBuilder, MenuItemBuilder},
    tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent},
    Manager,
};
use tauri_plugin_autostart::{MacosLauncher, ManagerExt};

pub fn run() {
    env_logger::init();
    log::info!("swiftscroll starting");

    tauri::Builder::default()
        .plugin(tauri_plugin_autostart::init(
            MacosLauncher::LaunchAgent,
            Some(vec![]),
        ))
        .setup(|app| {
            let portable_path = settings::portable_settings_path();
            let legacy_path = app
                .path()
                .app_data_dir()
                .map(|dir| dir.join(settings::SETTINGS_FILE_NAME))
                .unwrap_or_else(|_| portable_path.clone());
            settings::migrate_legacy_if_present(&portable_path, &legacy_path);

            let loaded = settings::load(&portable_path);
            sync_autostart(app, loaded.autostart);
            let shared = Arc::new(loaded);

            app.manage(AppState {
                settings: Arc::new(Mutex::new(shared.clone())),
            });

            build_tray(app)?;
            apply_window_effects(app);

            orchestrator::start(shared);
            log::info!("setup complete");

            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                api.prevent_close();
                let _ = window.hide();
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_settings,
            commands::set_settings,
            commands::get_running_processes,
            commands::set_enabled,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

fn sync_autostart(app: &tauri::App, enabled: bool) {
    let manager = app.autolaunch();
    let result = if enabled { manager.enable() } else { manager.disable() };
    if let Err(e) = result {
        log::warn!("failed to sync autostart state: {e}");
    }
}

fn apply_window_effects(app: &tauri::App) {
    let Some(window) = app.get_webview_window("main") else {
        return;
    };
    #[cfg(target_os = "windows")]
    if let Err(e) = window_vibrancy::apply_mica(&window, None) {
        log::warn!("failed to apply window vibrancy: {e}");
    }
}

fn build_tray(app: &tauri::App) -> Result<(), Box<dyn std::error::Error>> {
    let settings_i = MenuItemBuilder::with_id("settings", "Settings").build(app)?;
    let quit_i = MenuItemBuilder::with_id("quit", "Quit").build(app)?;
    let menu = MenuBuilder::new(app).items(&[&settings_i, &quit_i]).build()?;

    TrayIconBuilder::new()
        .icon(app.default_window_icon().unwrap().clone())
        .menu(&menu)
        .tooltip("SwiftScroll")
        .show_menu_on_left_click(false)
        .on_menu_event(|app, event| match event.id().as_ref() {
            "settings" => show_main_window(app),
            "quit" => {
                orchestrator::stop();
                app.exit(0);
            }
            _ => {}
        })
        .on_tray_icon_event(|tray, event| match event {
            TrayIconEvent::Click {
                button: MouseButton::Left,
                button_state: MouseButtonState::Down,
                ..
            }
            | TrayIconEvent::Click {
                button: MouseButton::Left,
                button_state: MouseButtonState::Up,
                ..
            }
            | TrayIconEvent::DoubleClick {
                button: MouseButton::Left,
                ..
            } => {
                let app = tray.app_handle();
                show_main_window(&app);
            }
            _ => {}
        })
        .build(app)?;

    Ok(())
}

fn show_main_window(app: &tauri::AppHandle) {
    if let Some(w) = app.get_webview_window("main") {
        let _ = w.show();
        let _ = w.unminimize();
        let _ = w.set_focus();
    }
}
