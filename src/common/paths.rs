use std::path::PathBuf;
use crate::common::config::DEFAULT_CONFIG_PATH;
use crate::common::dev_mode::DevMode;

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/facelock/facelock.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/facelock/models")
}

/// Picks the config file: an explicit path wins, then the dev-mode copy,
/// then the system file, then the repository-relative default.
/// Returns `None` when none of the implicit candidates exist.
pub fn resolve_config_file(explicit: Option<PathBuf>, dev_mode: &DevMode) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let candidates = dev_mode
        .config_file()
        .into_iter()
        .chain([system_config_file(), PathBuf::from(DEFAULT_CONFIG_PATH)]);

    candidates.into_iter().find(|path| path.exists())
}

/// Relative model paths are looked up next to the working directory first,
/// then in the system models directory.
pub fn resolve_model_path(path: &std::path::Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    let system = system_models_dir().join(path.file_name().unwrap_or(path.as_os_str()));
    if system.exists() {
        system
    } else {
        path.to_path_buf()
    }
}
