use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "gripmeter";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Session history lives under `$HOME/.local/state/gripmeter`.
    pub fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME);
            Some(state_dir.join("sessions.db"))
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|proj_dirs| proj_dirs.data_local_dir().join("sessions.db"))
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|pd| pd.config_dir().join("settings.json"))
    }
}
