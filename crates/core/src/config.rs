//! Layered application configuration.
//!
//! Values come from built-in defaults, then `~/.config/estokar/config.toml`,
//! then `ESTOKAR_*` environment variables (`ESTOKAR_API__BASE_URL`, ...).

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{models::ResourceKind, session::CredentialPolicy};

/// Directory name under the platform config/data roots.
pub const APP_DIR: &str = "estokar";

const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# EstoKar console configuration.
# Every key is optional; environment variables such as
# ESTOKAR_API__BASE_URL override the values below.

[api]
base_url = "http://localhost:8080"

[api.paths]
materials = "/Materiais"
brands = "/Marcas"
employees = "/Funcionarios"
sectors = "/Setores"
inbound = "/Entradas"
outbound = "/Saidas"
users = "/Usuarios"
login = "/api/login"
signup = "/cadastrar"
# logout = "/api/logout"
dashboard_stats = "/Dashboard/stats"
dashboard_recent_activity = "/Dashboard/recent-activity"
dashboard_low_stock = "/Dashboard/low-stock"

[credentials]
min_username_len = 3
min_password_len = 6
"#;

/// Top-level configuration for the console.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend origin and path contract.
    pub api: ApiConfig,
    /// Durable session storage.
    pub session: SessionConfig,
    /// Local credential preconditions.
    pub credentials: CredentialPolicy,
}

/// Backend origin plus every path the gateway talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Origin all paths are appended to.
    pub base_url: String,
    /// Backend-defined path contract.
    pub paths: ApiPaths,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            paths: ApiPaths::default(),
        }
    }
}

/// Base paths for each resource and the auth/dashboard endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPaths {
    /// Materials collection.
    pub materials: String,
    /// Brands collection.
    pub brands: String,
    /// Employees collection.
    pub employees: String,
    /// Sectors collection.
    pub sectors: String,
    /// Inbound movements collection.
    pub inbound: String,
    /// Outbound movements collection.
    pub outbound: String,
    /// Users collection.
    pub users: String,
    /// Login endpoint (`POST`).
    pub login: String,
    /// Signup endpoint (`POST`).
    pub signup: String,
    /// Backend sign-out endpoint; logout stays local when unset.
    pub logout: Option<String>,
    /// Dashboard aggregate counters.
    pub dashboard_stats: String,
    /// Dashboard recent activity feed.
    pub dashboard_recent_activity: String,
    /// Dashboard low-stock list.
    pub dashboard_low_stock: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            materials: "/Materiais".to_string(),
            brands: "/Marcas".to_string(),
            employees: "/Funcionarios".to_string(),
            sectors: "/Setores".to_string(),
            inbound: "/Entradas".to_string(),
            outbound: "/Saidas".to_string(),
            users: "/Usuarios".to_string(),
            login: "/api/login".to_string(),
            signup: "/cadastrar".to_string(),
            logout: None,
            dashboard_stats: "/Dashboard/stats".to_string(),
            dashboard_recent_activity: "/Dashboard/recent-activity".to_string(),
            dashboard_low_stock: "/Dashboard/low-stock".to_string(),
        }
    }
}

impl ApiPaths {
    /// Base path bound to a resource.
    pub fn resource(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Materials => &self.materials,
            ResourceKind::Brands => &self.brands,
            ResourceKind::Employees => &self.employees,
            ResourceKind::Sectors => &self.sectors,
            ResourceKind::Inbound => &self.inbound,
            ResourceKind::Outbound => &self.outbound,
            ResourceKind::Users => &self.users,
        }
    }

    fn named(&self) -> Vec<(&'static str, &str)> {
        let mut entries: Vec<(&'static str, &str)> = ResourceKind::ALL
            .iter()
            .map(|kind| (kind.name(), self.resource(*kind)))
            .collect();
        entries.extend([
            ("login", self.login.as_str()),
            ("signup", self.signup.as_str()),
            ("dashboard_stats", self.dashboard_stats.as_str()),
            ("dashboard_recent_activity", self.dashboard_recent_activity.as_str()),
            ("dashboard_low_stock", self.dashboard_low_stock.as_str()),
        ]);
        if let Some(logout) = self.logout.as_deref() {
            entries.push(("logout", logout));
        }
        entries
    }
}

/// Where the durable token store keeps its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding one store file per backend origin.
    pub store_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("session"),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from an explicit file (missing files are ignored).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("ESTOKAR")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the gateway relies on.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api.base_url)
            .with_context(|| format!("invalid api.base_url {:?}", self.api.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("api.base_url must use http or https, got {}", url.scheme());
        }
        for (name, path) in self.api.paths.named() {
            if !path.starts_with('/') {
                bail!("api.paths.{name} must start with '/', got {path:?}");
            }
        }
        if self.credentials.min_username_len == 0 || self.credentials.min_password_len == 0 {
            bail!("credential minimum lengths must be positive");
        }
        Ok(())
    }

    /// Backend origin without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }
}

/// Directory holding the configuration file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of the default configuration file.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Write the commented default configuration when none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    ensure_default_config_at(config_path())
}

/// Write the default configuration to `path` unless a file is already there.
pub fn ensure_default_config_at(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let path = path.into();
    if path.exists() {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote default configuration");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_file_matches_built_in_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = ensure_default_config_at(dir.path().join("estokar/config.toml"))?;
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path)?;
        let defaults = AppConfig::default();
        assert_eq!(loaded.api.paths, defaults.api.paths);
        assert_eq!(loaded.base_url(), "http://localhost:8080");
        assert_eq!(loaded.credentials, defaults.credentials);
        Ok(())
    }

    #[test]
    fn existing_file_is_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api]\nbase_url = \"https://stock.example.com/\"\n")?;
        ensure_default_config_at(&path)?;

        let loaded = AppConfig::load_from(&path)?;
        assert_eq!(loaded.base_url(), "https://stock.example.com");
        assert_eq!(loaded.api.paths.brands, "/Marcas");
        Ok(())
    }

    #[test]
    fn paths_are_backend_configuration() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[api.paths]\nbrands = \"/api/Marca\"\ninbound = \"/Entrada\"\nlogout = \"/api/logout\"\n",
        )?;
        let loaded = AppConfig::load_from(&path)?;
        assert_eq!(loaded.api.paths.resource(ResourceKind::Brands), "/api/Marca");
        assert_eq!(loaded.api.paths.resource(ResourceKind::Inbound), "/Entrada");
        assert_eq!(loaded.api.paths.logout.as_deref(), Some("/api/logout"));
        Ok(())
    }

    #[test]
    fn rejects_relative_paths_and_bad_origins() {
        let mut config = AppConfig::default();
        config.api.paths.sectors = "Setores".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
