//! Client configuration.
//!
//! One [`Config`] is built (or deserialized) up front and held by each
//! [`TreeStore`](crate::TreeStore). Nothing here is process-global.

use serde::{Deserialize, Serialize};

use crate::{path, Error};

/// Reference markers in stored strings, e.g. `{{/app/name}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
        }
    }
}

/// Names of the metadata namespace and its per-node fields.
///
/// For a node stored at physical path `P` the fields live under
/// `root_dir/P/<field>/`. Tags live under `root_dir/tags_sub_dir/<root>/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataLayout {
    pub root_dir: String,
    pub len_sub_dir: String,
    pub kind_sub_dir: String,
    pub tags_sub_dir: String,
    pub idxes_sub_dir: String,
    pub last_id_sub_dir: String,
}

impl Default for MetadataLayout {
    fn default() -> Self {
        Self {
            root_dir: "/__metadata__".to_string(),
            len_sub_dir: "__len__".to_string(),
            kind_sub_dir: "__kind__".to_string(),
            tags_sub_dir: "__tags__".to_string(),
            idxes_sub_dir: "__idxes__".to_string(),
            last_id_sub_dir: "__lastID__".to_string(),
        }
    }
}

impl MetadataLayout {
    /// Canonical metadata root, e.g. `/__metadata__/`.
    pub fn root(&self) -> String {
        path::abs(&self.root_dir)
    }

    /// Metadata prefix mirroring a physical data path.
    pub fn node_dir(&self, physical: &str) -> String {
        path::join(&[self.root().as_str(), physical])
    }

    fn field(&self, physical: &str, sub_dir: &str) -> String {
        path::join(&[self.node_dir(physical).as_str(), sub_dir])
    }

    pub fn kind_key(&self, physical: &str) -> String {
        self.field(physical, &self.kind_sub_dir)
    }

    pub fn len_key(&self, physical: &str) -> String {
        self.field(physical, &self.len_sub_dir)
    }

    pub fn last_id_key(&self, physical: &str) -> String {
        self.field(physical, &self.last_id_sub_dir)
    }

    pub fn idxes_dir(&self, physical: &str) -> String {
        self.field(physical, &self.idxes_sub_dir)
    }

    pub fn idx_key(&self, physical: &str, child: &str) -> String {
        path::join(&[self.idxes_dir(physical).as_str(), child])
    }

    /// Tag namespace of one top-level data root.
    pub fn tags_dir(&self, root: &str) -> String {
        path::join(&[self.root().as_str(), self.tags_sub_dir.as_str(), root])
    }

    pub fn tag_key(&self, root: &str, name: &str) -> String {
        path::join(&[self.tags_dir(root).as_str(), name])
    }

    /// Segment names that may not appear in data paths.
    pub fn is_reserved(&self, segment: &str) -> bool {
        [
            &self.len_sub_dir,
            &self.kind_sub_dir,
            &self.tags_sub_dir,
            &self.idxes_sub_dir,
            &self.last_id_sub_dir,
        ]
        .iter()
        .any(|name| name.as_str() == segment)
    }

    fn sub_dirs(&self) -> [(&'static str, &str); 5] {
        [
            ("len_sub_dir", self.len_sub_dir.as_str()),
            ("kind_sub_dir", self.kind_sub_dir.as_str()),
            ("tags_sub_dir", self.tags_sub_dir.as_str()),
            ("idxes_sub_dir", self.idxes_sub_dir.as_str()),
            ("last_id_sub_dir", self.last_id_sub_dir.as_str()),
        ]
    }
}

/// Configuration of a [`TreeStore`](crate::TreeStore).
///
/// # Example
///
/// ```rust
/// use structkv_core_store::Config;
///
/// let config = Config::from_json_str(r#"{"delimiters": {"open": "${", "close": "}"}}"#).unwrap();
/// assert_eq!(config.delimiters.open, "${");
/// assert_eq!(config.metadata.root(), "/__metadata__/");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub delimiters: Delimiters,
    pub metadata: MetadataLayout,
    /// Cap on locked-write attempts; `None` retries until the commit lands.
    pub txn_attempts: Option<u32>,
    /// Longest chain of references followed by one evaluation.
    pub max_eval_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delimiters: Delimiters::default(),
            metadata: MetadataLayout::default(),
            txn_attempts: None,
            max_eval_depth: 32,
        }
    }
}

impl Config {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let Delimiters { open, close } = &self.delimiters;
        if open.is_empty() || close.is_empty() {
            return Err(Error::invalid_argument("delimiters must not be empty"));
        }
        if open == close {
            return Err(Error::invalid_argument(
                "open and close delimiters must differ",
            ));
        }

        let root = &self.metadata.root_dir;
        if !path::is_abs(root) || path::is_root(root) {
            return Err(Error::invalid_argument(format!(
                "metadata root {:?} must be an absolute path below /",
                root
            )));
        }

        let sub_dirs = self.metadata.sub_dirs();
        for (field, name) in sub_dirs {
            if name.is_empty() || name.contains(path::SEPARATOR) || name == "." || name == ".." {
                return Err(Error::invalid_argument(format!(
                    "{} {:?} must be a single path segment",
                    field, name
                )));
            }
        }
        for (i, (field, name)) in sub_dirs.iter().enumerate() {
            if sub_dirs[i + 1..].iter().any(|(_, other)| other == name) {
                return Err(Error::invalid_argument(format!(
                    "{} {:?} is used by more than one metadata field",
                    field, name
                )));
            }
        }
        Ok(())
    }
}
