//! Runtime configuration, layered from `config.toml` and `VERSUS_*`
//! environment variables.
//!
//! Nested keys use a double underscore: `VERSUS_ENGINE__K_FACTOR=24`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use versus_api::IdentityConfig;
use versus_core::settings::EngineSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Trusted header carrying the authenticated user's UUID.
  pub identity_header:     String,
  pub session_cookie:      String,
  /// Take the client address from `x-forwarded-for`. Only enable behind a
  /// proxy that overwrites the header.
  pub trust_forwarded_for: bool,
  /// Per-subscriber backlog for the `/events` stream.
  pub event_buffer:        usize,
  pub engine:              EngineSettings,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let identity = IdentityConfig::default();
    Self {
      host:                "127.0.0.1".to_owned(),
      port:                8080,
      store_path:          PathBuf::from("versus.db"),
      identity_header:     identity.user_header,
      session_cookie:      identity.session_cookie,
      trust_forwarded_for: identity.trust_forwarded_for,
      event_buffer:        256,
      engine:              EngineSettings::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (optional) and the environment, then validate the engine
  /// table.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(
        config::Environment::with_prefix("VERSUS")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    let cfg: ServerConfig = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.engine.validate().context("invalid [engine] settings")?;
    Ok(cfg)
  }

  pub fn identity(&self) -> IdentityConfig {
    IdentityConfig {
      user_header:         self.identity_header.clone(),
      session_cookie:      self.session_cookie.clone(),
      trust_forwarded_for: self.trust_forwarded_for,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{name}-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
  }

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = ServerConfig::load(Path::new("/nonexistent/versus.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.identity().user_header, "x-authenticated-user");
    assert!(!cfg.identity().trust_forwarded_for);
    assert_eq!(cfg.engine.anonymous_cap, 10);
  }

  #[test]
  fn file_overrides_nested_engine_table() {
    let path = write_temp(
      "versus-config",
      "port = 9000\nstore_path = \"~/versus.db\"\ntrust_forwarded_for = true\n\n[engine]\nk_factor = 16.0\nseed = 3\n",
    );
    let cfg = ServerConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.store_path, PathBuf::from("~/versus.db"));
    assert!(cfg.identity().trust_forwarded_for);
    assert_eq!(cfg.engine.k_factor, 16.0);
    assert_eq!(cfg.engine.seed, Some(3));
    assert_eq!(cfg.engine.important_cadence, 20);
  }

  #[test]
  fn invalid_engine_settings_are_refused() {
    let path = write_temp("versus-bad", "[engine]\nk_factor = -1.0\n");
    let result = ServerConfig::load(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
  }
}
