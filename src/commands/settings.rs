use std::collections::HashMap;
use std::path::Path;

use crate::config::SETTING_KEYS;
use crate::state::AppState;

pub fn get_settings(state: &AppState) -> HashMap<String, String> {
    let config = state.config();
    let mut map = HashMap::new();
    for key in SETTING_KEYS {
        if let Ok(value) = config.get(key) {
            map.insert(key.to_string(), value);
        }
    }
    map
}

pub fn set_setting(state: &AppState, key: &str, value: &str) -> Result<(), String> {
    state.config_mut().set(key, value).map_err(|e| e.to_string())?;
    log::info!("Setting {} updated", key);
    Ok(())
}

pub fn save_settings(state: &AppState, path: &Path) -> Result<(), String> {
    state.config().save(path).map_err(|e| e.to_string())
}
