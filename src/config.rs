//! Group table configuration.
//!
//! The table maps a group name to its serving scope: a base directory, an
//! optional required permission, an optional fallback file and a MIME type
//! allow-list. It is loaded once at startup from a JSON file, validated, and
//! shared read-only for the life of the process. Base paths are canonicalized
//! here so every containment check compares against a symlink-resolved
//! absolute directory without touching the filesystem again.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::ConfigError;

/// One group entry as written in the groups file.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSpec {
    /// Base directory the group serves out of.
    pub path: String,
    /// Permission required for direct fetches, if any.
    #[serde(default)]
    pub right: Option<String>,
    /// Substitute file served in place of eligible denials, if any.
    #[serde(default)]
    pub fallback: Option<String>,
    /// MIME types the group is allowed to serve. An empty list rejects
    /// everything at serve time rather than failing the load; the group is
    /// misconfigured but the process still comes up.
    #[serde(default)]
    pub mimetypes: Vec<String>,
}

/// A validated group. `base` is canonical and is the jail every resolution
/// for this group must stay inside.
#[derive(Debug, Clone)]
pub struct Group {
    pub base: PathBuf,
    pub right: Option<String>,
    pub fallback: Option<PathBuf>,
    pub mimetypes: Vec<String>,
}

impl Group {
    pub fn allows_type(&self, mime: &str) -> bool {
        self.mimetypes.iter().any(|m| m == mime)
    }
}

/// The immutable group table.
#[derive(Debug, Default)]
pub struct AppConfig {
    groups: HashMap<String, Group>,
}

impl AppConfig {
    /// Load and validate the group table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let specs: HashMap<String, GroupSpec> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        Self::from_specs(specs)
    }

    /// Build the table from parsed specs, canonicalizing every base path.
    pub fn from_specs(specs: HashMap<String, GroupSpec>) -> Result<Self, ConfigError> {
        let mut groups = HashMap::with_capacity(specs.len());
        for (name, spec) in specs {
            let base = std::fs::canonicalize(&spec.path).map_err(|e| ConfigError::BadBasePath {
                group: name.clone(),
                path: spec.path.clone(),
                source: e,
            })?;
            if !base.is_dir() {
                return Err(ConfigError::BaseNotDirectory {
                    group: name,
                    path: spec.path,
                });
            }
            if spec.mimetypes.is_empty() {
                warn!(group = %name, "group has an empty mimetypes allow-list, every file will be rejected");
            }
            let fallback = spec.fallback.map(PathBuf::from);
            if let Some(fb) = &fallback {
                if !fb.is_file() {
                    warn!(group = %name, fallback = %fb.display(), "configured fallback file does not exist");
                }
            }
            groups.insert(
                name,
                Group {
                    base,
                    right: spec.right,
                    fallback,
                    mimetypes: spec.mimetypes,
                },
            );
        }
        Ok(Self { groups })
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn spec(path: &Path) -> GroupSpec {
        GroupSpec {
            path: path.display().to_string(),
            right: None,
            fallback: None,
            mimetypes: vec!["image/png".into()],
        }
    }

    #[test]
    fn load_from_json_file() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("img");
        std::fs::create_dir(&base).unwrap();
        let groups_file = dir.path().join("groups.json");
        std::fs::write(
            &groups_file,
            format!(
                r#"{{"photos": {{"path": "{}", "right": "viewphotos", "mimetypes": ["image/png", "image/jpeg"]}}}}"#,
                base.display()
            ),
        )
        .unwrap();

        let cfg = AppConfig::load(&groups_file).unwrap();
        let g = cfg.group("photos").expect("photos group");
        assert_eq!(g.right.as_deref(), Some("viewphotos"));
        assert!(g.allows_type("image/jpeg"));
        assert!(!g.allows_type("image/gif"));
        assert!(cfg.group("other").is_none());
    }

    #[test]
    fn base_path_is_canonicalized() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("img");
        std::fs::create_dir(&base).unwrap();
        // Route through a dot segment; the stored base must come out clean.
        let dotted = dir.path().join(".").join("img");
        let cfg =
            AppConfig::from_specs(HashMap::from([("g".to_string(), spec(&dotted))])).unwrap();
        assert_eq!(cfg.group("g").unwrap().base, base.canonicalize().unwrap());
    }

    #[test]
    fn missing_base_fails_load() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("nope");
        let err = AppConfig::from_specs(HashMap::from([("g".to_string(), spec(&gone))]))
            .expect_err("missing base must fail");
        assert!(matches!(err, ConfigError::BadBasePath { .. }));
    }

    #[test]
    fn file_base_fails_load() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, b"x").unwrap();
        let err = AppConfig::from_specs(HashMap::from([("g".to_string(), spec(&file))]))
            .expect_err("file base must fail");
        assert!(matches!(err, ConfigError::BaseNotDirectory { .. }));
    }
}
