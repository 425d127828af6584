//! Multi-file configuration loader: a `main.yaml` declares per-upstream
//! and per-downstream fragments (each local or remote), which are fetched,
//! validated for id consistency, and merged into one `AppConfig`.
//!
//! Grounded on `original_source/app/config.py::MultiConfigLoader` /
//! `load_config`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use adrelay_core::config::{AppConfig, Downstream, Route, Settings, Upstream};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::ConfigError;

fn default_source() -> String {
    "local".to_owned()
}

fn default_true() -> bool {
    true
}

/// One entry in `main.yaml`'s `upstream_configs`/`downstream_configs`
/// list: where to find the fragment, and whether its absence is fatal.
#[derive(Debug, Clone, Deserialize)]
struct ConfigRef {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
struct MainConfigFile {
    settings: Settings,
    #[serde(default)]
    upstream_configs: Vec<ConfigRef>,
    #[serde(default)]
    downstream_configs: Vec<ConfigRef>,
    #[serde(default)]
    routes: Vec<Route>,
}

/// Where to load the main config document from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Local(PathBuf),
    Remote(Url),
}

pub struct ConfigLoader {
    local_config_dir: PathBuf,
    http: reqwest::Client,
}

impl ConfigLoader {
    #[must_use]
    pub fn new(local_config_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_config_dir: local_config_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn read_local(&self, path: &Path) -> Result<String, ConfigError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
    }

    async fn fetch_remote(&self, url: &Url) -> Result<String, ConfigError> {
        self.http
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| ConfigError::Http {
                url: url.to_string(),
                source,
            })?
            .text()
            .await
            .map_err(|source| ConfigError::Http {
                url: url.to_string(),
                source,
            })
    }

    fn parse_yaml<T: for<'de> Deserialize<'de>>(
        text: &str,
        source_desc: &str,
    ) -> Result<T, ConfigError> {
        serde_yaml_ng::from_str(text).map_err(|source| ConfigError::Yaml {
            source_desc: source_desc.to_owned(),
            source,
        })
    }

    #[instrument(skip(self))]
    async fn load_main_config(&self, source: &ConfigSource) -> Result<MainConfigFile, ConfigError> {
        let text = match source {
            ConfigSource::Local(path) => {
                info!(path = %path.display(), "loading local main config");
                self.read_local(path).await?
            }
            ConfigSource::Remote(url) => {
                info!(%url, "downloading remote main config");
                self.fetch_remote(url).await?
            }
        };
        Self::parse_yaml(&text, "main config")
    }

    /// Fetch one fragment document's raw text, following its `source`.
    async fn load_fragment_text(&self, r: &ConfigRef, kind: &'static str) -> Result<Option<String>, ConfigError> {
        match r.source.as_str() {
            "remote" => {
                let Some(url) = &r.url else {
                    warn!(id = %r.id, kind, "remote fragment missing url, skipping");
                    return Ok(None);
                };
                let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
                Ok(Some(self.fetch_remote(&parsed).await?))
            }
            _ => {
                let Some(rel_path) = &r.path else {
                    warn!(id = %r.id, kind, "local fragment missing path, skipping");
                    return Ok(None);
                };
                let full_path = self.local_config_dir.join(rel_path);
                if !full_path.exists() {
                    if r.required {
                        return Err(ConfigError::RequiredConfigMissing {
                            kind,
                            id: r.id.clone(),
                            location: full_path.display().to_string(),
                        });
                    }
                    warn!(id = %r.id, kind, path = %full_path.display(), "optional fragment not found, skipping");
                    return Ok(None);
                }
                Ok(Some(self.read_local(&full_path).await?))
            }
        }
    }

    #[instrument(skip(self, refs))]
    async fn load_upstreams(&self, refs: &[ConfigRef]) -> Result<Vec<Upstream>, ConfigError> {
        let mut loaded_ids = HashSet::new();
        let mut upstreams = Vec::new();

        for r in refs {
            if loaded_ids.contains(&r.id) {
                return Err(ConfigError::DuplicateId {
                    kind: "upstream",
                    id: r.id.clone(),
                });
            }
            loaded_ids.insert(r.id.clone());

            if !r.enabled {
                info!(id = %r.id, "skipping disabled upstream");
                continue;
            }

            let Some(text) = self.load_fragment_text(r, "upstream").await? else {
                continue;
            };
            let upstream: Upstream = Self::parse_yaml(&text, &format!("upstream '{}'", r.id))?;

            if upstream.id != r.id {
                return Err(ConfigError::IdMismatch {
                    kind: "upstream",
                    declared: r.id.clone(),
                    actual: upstream.id,
                });
            }

            info!(id = %r.id, name = ?r.name, "loaded upstream fragment");
            upstreams.push(upstream);
        }

        Ok(upstreams)
    }

    #[instrument(skip(self, refs))]
    async fn load_downstreams(&self, refs: &[ConfigRef]) -> Result<Vec<Downstream>, ConfigError> {
        let mut loaded_ids = HashSet::new();
        let mut downstreams = Vec::new();

        for r in refs {
            if loaded_ids.contains(&r.id) {
                return Err(ConfigError::DuplicateId {
                    kind: "downstream",
                    id: r.id.clone(),
                });
            }
            loaded_ids.insert(r.id.clone());

            if !r.enabled {
                info!(id = %r.id, "skipping disabled downstream");
                continue;
            }

            let Some(text) = self.load_fragment_text(r, "downstream").await? else {
                continue;
            };
            let downstream: Downstream = Self::parse_yaml(&text, &format!("downstream '{}'", r.id))?;

            if downstream.id != r.id {
                return Err(ConfigError::IdMismatch {
                    kind: "downstream",
                    declared: r.id.clone(),
                    actual: downstream.id,
                });
            }

            downstreams.push(downstream);
        }

        Ok(downstreams)
    }

    /// Check that every upstream a route rule or fallback names was
    /// actually loaded.
    fn validate(config: &AppConfig) -> Result<(), ConfigError> {
        let loaded: HashSet<&str> = config.upstreams.iter().map(|u| u.id.as_str()).collect();
        let mut ids: Vec<&str> = loaded.iter().copied().collect();
        ids.sort_unstable();
        let loaded_list = ids.join(", ");

        for route in &config.routes {
            for rule in &route.rules {
                if !loaded.contains(rule.upstream.as_str()) {
                    return Err(ConfigError::DanglingUpstreamReference {
                        upstream_id: rule.upstream.clone(),
                        loaded: loaded_list.clone(),
                    });
                }
            }
            if let Some(fallback) = &route.fallback_upstream {
                if !loaded.contains(fallback.as_str()) {
                    return Err(ConfigError::DanglingUpstreamReference {
                        upstream_id: fallback.clone(),
                        loaded: loaded_list.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Load and merge the whole configuration set from `source`.
    #[instrument(skip(self))]
    pub async fn load(&self, source: ConfigSource) -> Result<AppConfig, ConfigError> {
        let main = self.load_main_config(&source).await?;
        let upstreams = self.load_upstreams(&main.upstream_configs).await?;
        let downstreams = self.load_downstreams(&main.downstream_configs).await?;

        let config = AppConfig {
            settings: main.settings,
            upstreams,
            downstreams,
            routes: main.routes,
        };

        Self::validate(&config)?;
        info!(
            upstreams = config.upstreams.len(),
            downstreams = config.downstreams.len(),
            routes = config.routes.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}

/// Resolve the main config source the way the original service did:
/// `CONFIG_DIR` env var, then `./config/main.yaml`, then `MAIN_CONFIG_URL`.
pub async fn load_config() -> Result<AppConfig, ConfigError> {
    if let Ok(dir) = std::env::var("CONFIG_DIR") {
        let path = PathBuf::from(&dir);
        if path.is_dir() {
            info!(dir = %dir, "using CONFIG_DIR");
            let loader = ConfigLoader::new(path.clone());
            return loader.load(ConfigSource::Local(path.join("main.yaml"))).await;
        }
        return Err(ConfigError::Io {
            path: dir,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "CONFIG_DIR not found"),
        });
    }

    let default_dir = PathBuf::from("./config");
    if default_dir.join("main.yaml").exists() {
        info!("using default ./config directory");
        let loader = ConfigLoader::new(default_dir.clone());
        return loader
            .load(ConfigSource::Local(default_dir.join("main.yaml")))
            .await;
    }

    if let Ok(url) = std::env::var("MAIN_CONFIG_URL") {
        info!(%url, "using remote main config");
        let parsed = Url::parse(&url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        let loader = ConfigLoader::new(PathBuf::from("."));
        return loader.load(ConfigSource::Remote(parsed)).await;
    }

    Err(ConfigError::NoSourceAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn loads_merged_config_from_local_fragments() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "main.yaml",
            r#"
settings:
  callback_base: "https://cb.example.com"
upstream_configs:
  - id: up1
    source: local
    path: upstreams/up1.yaml
downstream_configs:
  - id: ds1
    source: local
    path: downstreams/ds1.yaml
routes:
  - match_key: ad_id
    rules:
      - equals: "67576"
        upstream: up1
        downstream: ds1
"#,
        );
        write_file(
            dir.path(),
            "upstreams/up1.yaml",
            r#"
id: up1
name: Partner One
adapters:
  outbound: {}
  inbound_callback: {}
"#,
        );
        write_file(dir.path(), "downstreams/ds1.yaml", "id: ds1\nname: Downstream One\n");

        let loader = ConfigLoader::new(dir.path());
        let config = loader
            .load(ConfigSource::Local(dir.path().join("main.yaml")))
            .await
            .unwrap();

        assert_eq!(config.upstreams.len(), 1);
        assert_eq!(config.upstreams[0].id, "up1");
        assert_eq!(config.downstreams[0].id, "ds1");
        assert_eq!(config.routes.len(), 1);
    }

    #[tokio::test]
    async fn dangling_upstream_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "main.yaml",
            r#"
settings:
  callback_base: "https://cb.example.com"
routes:
  - match_key: ad_id
    rules:
      - equals: "67576"
        upstream: missing_upstream
        downstream: ds1
"#,
        );

        let loader = ConfigLoader::new(dir.path());
        let err = loader
            .load(ConfigSource::Local(dir.path().join("main.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::DanglingUpstreamReference { .. }));
    }

    #[tokio::test]
    async fn duplicate_upstream_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "main.yaml",
            r#"
settings:
  callback_base: "https://cb.example.com"
upstream_configs:
  - id: up1
    path: a.yaml
  - id: up1
    path: b.yaml
"#,
        );
        write_file(dir.path(), "a.yaml", "id: up1\n");
        write_file(dir.path(), "b.yaml", "id: up1\n");

        let loader = ConfigLoader::new(dir.path());
        let err = loader
            .load(ConfigSource::Local(dir.path().join("main.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId { .. }));
    }
}
