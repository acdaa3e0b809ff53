//! Configuration loading for the encore server.
//!
//! Config files are discovered in the working directory first, then in
//! `~/.config/encore/`. `${ENV_VAR}` placeholders are substituted before the
//! file is parsed, so secrets can stay out of the file itself.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_or_default_config_path,
        load_config, set_config_dir,
    },
    schema::{EncoreConfig, ServerConfig, SpotifyConfig, TokenConfig},
};
