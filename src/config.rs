use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::{CachePolicy, CacheSettings, CacheVersion, OfflineRoutes, Response};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin server the cache sits in front of
  pub origin: String,
  pub cache: CacheConfig,
  /// Known-static paths pre-populated on activation
  pub manifest: Vec<String>,
  pub policy: CachePolicy,
  /// Synthetic responses used when both cache and network are unavailable
  pub offline_routes: BTreeMap<String, OfflineRouteConfig>,
  /// Directory for daily-rolling log files (stderr only if unset)
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Store name prefix; the version is appended (e.g. "shakeguard-assets-1")
  pub name: String,
  /// Version tag; bump to invalidate every cached entry
  pub version: String,
  /// SQLite database path (default: $XDG_DATA_HOME/shakeguard/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      name: "shakeguard-assets".to_string(),
      version: env!("CARGO_PKG_VERSION").to_string(),
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OfflineRouteConfig {
  #[serde(default = "default_offline_status")]
  pub status: u16,
  pub body: String,
  #[serde(default = "default_offline_content_type")]
  pub content_type: String,
}

fn default_offline_status() -> u16 {
  200
}

fn default_offline_content_type() -> String {
  "text/plain; charset=utf-8".to_string()
}

impl Default for Config {
  fn default() -> Self {
    let manifest = [
      "/",
      "/login",
      "/resource",
      "/resource_page1",
      "/resource_page2",
      "/resource_page3",
      "/resource_page4",
      "/resource_page5",
      "/resource_page6",
      "/css/style.css",
      "/js/client.js",
      "/js/toasts.mjs",
      "/js/footer-easter-egg.js",
      "/images/Resource1.jpg",
      "/images/Resource2.jpg",
      "/images/Resource3.jpg",
      "/images/Resource4.jpg",
      "/images/Resource5.jpg",
      "/images/Resource6.jpg",
    ];

    // Lets the login page tell "offline" apart from rejected credentials
    let offline_routes = BTreeMap::from([(
      "/login".to_string(),
      OfflineRouteConfig {
        status: 200,
        body: "offline".to_string(),
        content_type: default_offline_content_type(),
      },
    )]);

    Self {
      origin: "http://localhost:8000".to_string(),
      cache: CacheConfig::default(),
      manifest: manifest.iter().map(|p| p.to_string()).collect(),
      policy: CachePolicy::default(),
      offline_routes,
      log_dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shakeguard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shakeguard/config.yaml
  /// 4. Built-in defaults
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shakeguard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shakeguard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.origin_url()?;
    Ok(config)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Build the offline route table from the configured fixed responses.
  pub fn offline_routes(&self) -> OfflineRoutes {
    let mut routes = OfflineRoutes::new();
    for (path, route) in &self.offline_routes {
      routes.insert_static(
        path,
        Response::new(route.status, route.body.as_bytes())
          .with_header("Content-Type", route.content_type.as_str()),
      );
    }
    routes
  }

  /// Controller settings for this configuration.
  pub fn cache_settings(&self) -> Result<CacheSettings> {
    Ok(CacheSettings {
      origin: self.origin_url()?,
      name: self.cache.name.clone(),
      version: CacheVersion::new(self.cache.version.clone()),
      manifest: self.manifest.clone(),
      policy: self.policy.clone(),
      offline_routes: self.offline_routes(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.origin, "http://localhost:8000");
    assert_eq!(config.cache.name, "shakeguard-assets");
    assert!(config.manifest.contains(&"/resource_page1".to_string()));
    assert!(config.offline_routes.contains_key("/login"));
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
origin: https://shakeguard.example.com
cache:
  name: assets
  version: v11
manifest:
  - /
  - /css/style.css
policy:
  templated_pages: [/me]
offline_routes:
  /login:
    body: offline
  /signup:
    status: 503
    body: signup-offline
"#;
    let config = Config::parse(yaml).unwrap();
    let settings = config.cache_settings().unwrap();

    assert_eq!(settings.version.store_name(&settings.name), "assets-v11");
    assert_eq!(settings.manifest, vec!["/", "/css/style.css"]);
    assert!(settings.policy.templated_pages.contains("/me"));
    assert_eq!(config.offline_routes["/login"].status, 200);
    assert_eq!(config.offline_routes["/signup"].status, 503);
    assert_eq!(settings.offline_routes.len(), 2);
  }

  #[test]
  fn test_invalid_origin_rejected() {
    assert!(Config::parse("origin: not a url").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/shakeguard.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shakeguard.yaml");
    std::fs::write(&path, "cache:\n  version: \"42\"\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.cache.version, "42");
    assert_eq!(config.cache.name, "shakeguard-assets");
  }
}
