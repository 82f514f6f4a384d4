//! Configuration for the tasking runtime.
//!
//! Two concerns live here:
//!
//! - **Env layering** ([`load_and_apply`]): read a project `.env` and an XDG
//!   `config.toml` `[env]` table, then set process environment variables with
//!   priority **existing env > .env > XDG**.
//! - **Agent settings** ([`Settings`]): per agent name, an `agent_type` and
//!   per-stage LLM parameters (`model`, `base_url`, `api_key`,
//!   `temperature`, `max_tokens`), loaded from TOML. An `api_key` of the
//!   form `${VAR}` resolves against the layered environment
//!   ([`LlmSettings::resolved_api_key`]), keeping secrets in `.env` rather
//!   than in the settings file.

mod dotenv;
mod settings;
mod xdg_toml;

pub use dotenv::EnvFile;
pub use settings::{AgentSettings, LlmSettings, Settings};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read config file: {0}")]
    Read(std::io::Error),
    #[error("parse toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads env keys from the project `.env` and the XDG `config.toml` `[env]`
/// table, then sets environment variables only for keys that are not already
/// set.
///
/// * `app_name`: used for the XDG path `~/.config/<app_name>/config.toml`.
/// * `override_dir`: look for `.env` here instead of the current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let env_file = EnvFile::load(override_dir).map_err(LoadError::Read)?;
    let xdg_map = xdg_toml::load_env_map(app_name)?;

    // Apply `.env` first so it shadows XDG; within the file, later
    // assignments shadow earlier ones, so walk in reverse. Keys already in
    // the environment always win.
    for (key, value) in env_file.entries().rev() {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
        }
    }
    for (key, value) in &xdg_map {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
        }
    }

    Ok(())
}
