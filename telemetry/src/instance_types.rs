//! Process-wide `InstanceType -> vcpu count` catalog, file-cached so a
//! restart doesn't re-fetch types the cluster service already told us
//! about. `Catalog::vcpu` is synchronous: the decision/execute path never
//! awaits on it, only the (rare) cache miss fetch does.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use scalectl_core::ports::{ClusterServiceClient, VcpuCatalog};

use crate::TelemetryError;

pub struct Catalog {
    map: HashMap<String, i64>,
    cache_path: PathBuf,
}

impl Catalog {
    /// Loads the cache file if present; any entries in `needed` that are
    /// still missing afterward are fetched via
    /// `ClusterServiceClient::describe_instance_types` and merged back in,
    /// then the cache file is rewritten.
    pub async fn load_or_fetch(
        cache_path: impl AsRef<Path>,
        provider: &dyn ClusterServiceClient,
        needed: &[String],
    ) -> Result<Self, TelemetryError> {
        let cache_path = cache_path.as_ref().to_path_buf();
        let mut map = read_cache(&cache_path).unwrap_or_default();

        let missing: Vec<String> = needed.iter().filter(|t| !map.contains_key(*t)).cloned().collect();
        if !missing.is_empty() {
            let fetched = provider
                .describe_instance_types(&missing)
                .await
                .map_err(|e| TelemetryError::Fetch("describe_instance_types".into(), e.to_string()))?;
            map.extend(fetched);
            write_cache(&cache_path, &map);
        }

        Ok(Catalog { map, cache_path })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }
}

impl VcpuCatalog for Catalog {
    fn vcpu(&self, instance_type: &str) -> Option<i64> {
        self.map.get(instance_type).copied()
    }
}

fn read_cache(path: &Path) -> Option<HashMap<String, i64>> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_cache(path: &Path, map: &HashMap<String, i64>) {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %err, "could not create instance-type cache directory");
            return;
        }
    }
    match serde_json::to_string(map) {
        Ok(json) => {
            if let Err(err) = std::fs::write(path, json) {
                tracing::warn!(error = %err, "could not write instance-type cache");
            }
        }
        Err(err) => tracing::warn!(error = %err, "could not serialize instance-type cache"),
    }
}

/// Default cache location: `$SCALECTL_INSTANCE_TYPE_CACHE` if set, else
/// `~/.cache/scalectl/instance-types.json`.
pub fn default_cache_path() -> PathBuf {
    if let Ok(path) = std::env::var("SCALECTL_INSTANCE_TYPE_CACHE") {
        return PathBuf::from(path);
    }
    dirs_cache_dir().join("scalectl").join("instance-types.json")
}

fn dirs_cache_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".cache"))
        .unwrap_or_else(|_| PathBuf::from(".cache"))
}
