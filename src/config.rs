use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::catalog::SubjectCatalog;
use crate::scale::GradeScale;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub scale_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let max_connections = match lookup("CGPA_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("CGPA_DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            max_connections: max_connections.max(1),
            scale_path: lookup("CGPA_GRADE_SCALE").map(PathBuf::from),
            catalog_path: lookup("CGPA_CATALOG").map(PathBuf::from),
        })
    }

    /// Command-line paths take precedence over the environment.
    pub fn with_overrides(mut self, scale: Option<PathBuf>, catalog: Option<PathBuf>) -> Self {
        if scale.is_some() {
            self.scale_path = scale;
        }
        if catalog.is_some() {
            self.catalog_path = catalog;
        }
        self
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }

    pub fn load_scale(&self) -> anyhow::Result<GradeScale> {
        match &self.scale_path {
            Some(path) => GradeScale::from_path(path)
                .with_context(|| format!("failed to load grade scale from {}", path.display())),
            None => GradeScale::builtin().context("built-in grade scale is invalid"),
        }
    }

    pub fn load_catalog(&self) -> anyhow::Result<SubjectCatalog> {
        match &self.catalog_path {
            Some(path) => load_catalog_file(path),
            None => SubjectCatalog::builtin().context("built-in subject catalog is invalid"),
        }
    }
}

fn load_catalog_file(path: &Path) -> anyhow::Result<SubjectCatalog> {
    SubjectCatalog::from_path(path)
        .with_context(|| format!("failed to load subject catalog from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_connections, 5);
        assert!(config.database_url.is_none());
        assert!(config.database_url().is_err());
        assert!(config.load_scale().is_ok());
        assert!(config.load_catalog().is_ok());
    }

    #[test]
    fn reads_paths_and_pool_size() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/cgpa"),
            ("CGPA_DB_MAX_CONNECTIONS", "12"),
            ("CGPA_GRADE_SCALE", "/etc/cgpa/scale.json"),
        ]))
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/cgpa");
        assert_eq!(config.max_connections, 12);
        assert_eq!(
            config.scale_path.as_deref(),
            Some(Path::new("/etc/cgpa/scale.json"))
        );
    }

    #[test]
    fn rejects_bad_pool_size() {
        assert!(AppConfig::from_lookup(lookup(&[("CGPA_DB_MAX_CONNECTIONS", "many")])).is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let config = AppConfig::from_lookup(lookup(&[("CGPA_CATALOG", "env.csv")]))
            .unwrap()
            .with_overrides(None, Some(PathBuf::from("cli.csv")));
        assert_eq!(config.catalog_path.as_deref(), Some(Path::new("cli.csv")));
        assert!(config.scale_path.is_none());
    }

    #[test]
    fn missing_scale_file_is_reported() {
        let config = AppConfig::default()
            .with_overrides(Some(PathBuf::from("/nonexistent/scale.json")), None);
        let err = config.load_scale().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scale.json"));
    }
}
