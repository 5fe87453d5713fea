// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::AgentConfig;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/sam/config.yaml"));
    paths.push(PathBuf::from("/etc/sam/config.yml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("sam/config.yaml"));
        paths.push(cfg.join("sam/config.yml"));
    }

    paths.push(PathBuf::from(".sam/config.yaml"));
    paths.push(PathBuf::from(".sam/config.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files. `extra` may
/// provide an explicit path (the `--config` CLI flag), applied last.
pub fn load(extra: Option<&Path>) -> anyhow::Result<AgentConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: AgentConfig =
        if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
            AgentConfig::default()
        } else {
            serde_yaml::from_value(merged).context("deserializing merged config")?
        };

    if config.sanitize_agent_name() {
        warn!(agent_name = %config.agent_name, "agent_name contained invalid characters, sanitized");
    }

    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("a:\n  b: 1\n  c: 2");
        let src = val("a:\n  c: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"]["b"].as_i64(), Some(1));
        assert_eq!(dst["a"]["c"].as_i64(), Some(99));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/sam_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_files_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.worker_pool_size, 8);
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "agent_name: math\nnamespace: acme\nworker_pool_size: 16").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.agent_name, "math");
        assert_eq!(cfg.namespace, "acme");
        assert_eq!(cfg.worker_pool_size, 16);
    }

    #[test]
    fn load_sanitizes_agent_name() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "agent_name: \"bad name!\"\nnamespace: acme").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.agent_name, "bad_name_");
    }
}
