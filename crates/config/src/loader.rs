use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::EncoreConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["encore.toml", "encore.yaml", "encore.yml", "encore.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, discovery only looks in this
/// directory and never falls through to the working directory or `~/.config`.
pub fn set_config_dir(path: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = None;
    }
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<EncoreConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./encore.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/encore/encore.{toml,yaml,yml,json}` (user-global)
///
/// When nothing is found a default `encore.toml` is written to the config
/// directory and the defaults are returned. A file that fails to parse is
/// reported and replaced by defaults for this run.
pub fn discover_and_load() -> EncoreConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, writing default config");
        let config = EncoreConfig::default();
        if let Err(e) = write_default_config(&config) {
            warn!(error = %e, "failed to write default config file");
        }
        return config;
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            EncoreConfig::default()
        },
    }
}

fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    first_existing(Path::new(".")).or_else(|| user_config_dir().and_then(|d| first_existing(&d)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/encore/`.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(user_config_dir)
}

fn user_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("encore"))
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("encore.toml")
}

fn write_default_config(config: &EncoreConfig) -> anyhow::Result<()> {
    let path = find_or_default_config_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "wrote default config file");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<EncoreConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    // The override is process-global, so everything touching it lives in one test.
    #[test]
    fn discovery_with_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        set_config_dir(dir.path().to_path_buf());

        // Nothing there yet: defaults are returned and written out.
        let config = discover_and_load();
        assert_eq!(config.server.port, 8081);
        let written = dir.path().join("encore.toml");
        assert!(written.exists());
        assert_eq!(find_or_default_config_path(), written);

        std::fs::write(
            &written,
            "[server]\nport = 9090\n\n[spotify]\nclient_id = \"from-file\"\n",
        )
        .unwrap();
        let config = discover_and_load();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.spotify.client_id.as_deref(), Some("from-file"));

        // Broken file falls back to defaults instead of failing startup.
        std::fs::write(&written, "[server\nport = ").unwrap();
        assert_eq!(discover_and_load().server.port, 8081);

        clear_config_dir();
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("encore.yaml");
        std::fs::write(&yaml, "token:\n  refresh_margin_secs: 120\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().token.refresh_margin_secs, 120);

        let json = dir.path().join("encore.json");
        std::fs::write(&json, r#"{"spotify":{"client_secret":"abc"}}"#).unwrap();
        let config = load_config(&json).unwrap();
        assert_eq!(
            config.spotify.client_secret.unwrap().expose_secret(),
            "abc"
        );
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encore.ini");
        std::fs::write(&path, "port=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
