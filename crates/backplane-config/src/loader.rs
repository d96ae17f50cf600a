// SPDX-FileCopyrightText: 2026 Backplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the hierarchy `./backplane.toml` > `~/.config/backplane/backplane.toml`
//! > `/etc/backplane/backplane.toml`, with `BACKPLANE_` environment overrides.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::BackplaneConfig;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/backplane/backplane.toml";
pub const LOCAL_CONFIG_FILE: &str = "backplane.toml";

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/backplane/backplane.toml`
/// 3. `<config dir>/backplane/backplane.toml`
/// 4. `./backplane.toml`
/// 5. `BACKPLANE_*` environment variables
pub fn load_config() -> Result<BackplaneConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults only.
pub fn load_config_from_str(toml_content: &str) -> Result<BackplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BackplaneConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BackplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BackplaneConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(BackplaneConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("backplane").join(LOCAL_CONFIG_FILE))
}

/// Environment provider mapping `BACKPLANE_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys themselves
/// contain underscores: `BACKPLANE_PROCESSOR_BATCH_SIZE` must become
/// `processor.batch_size`, not `processor.batch.size`.
fn env_provider() -> Env {
    Env::prefixed("BACKPLANE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 5] = ["node", "storage", "processor", "retention", "retrieval"];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
