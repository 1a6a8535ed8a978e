//! store::layout
//!
//! Mapping between object ids and paths in the working directory.
//!
//! # Shapes
//!
//! - Single file: `<dir>/<id>.yaml`
//! - File set: `<dir>/<id>/meta.yaml` plus one `<field>.yaml` per
//!   non-meta field
//!
//! # Bare id resolution
//!
//! A bare id (no `/`) is looked up, in order, in the known-path index, in
//! each registered object type's subdirectory, and in the root. The first
//! hit wins. Qualified ids (`items/a1`) resolve only to their own path.

use serde::Serialize;

use crate::core::config::ObjectTypeConfig;
use crate::core::types::{ObjectId, TypeError};

/// Stem of the metadata file of a file set.
pub const META_STEM: &str = "meta";

/// A registered kind of object and where its documents live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectType {
    pub name: String,
    pub subdir: String,
}

impl From<&ObjectTypeConfig> for ObjectType {
    fn from(config: &ObjectTypeConfig) -> Self {
        Self {
            name: config.name.clone(),
            subdir: config.subdir.trim_end_matches('/').to_string(),
        }
    }
}

/// Where an object lives, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum Location {
    /// Path of the document file, extension included.
    File(String),
    /// Directory of a file set.
    FileSet(String),
}

impl Location {
    /// Path to stage, remove or reset for this object.
    pub fn path(&self) -> &str {
        match self {
            Location::File(path) | Location::FileSet(path) => path,
        }
    }

    pub fn is_file_set(&self) -> bool {
        matches!(self, Location::FileSet(_))
    }

    /// Directory holding the object, `""` for the root.
    pub fn parent(&self) -> &str {
        self.path().rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// The object's id: file stem or file set directory name.
    pub fn id(&self) -> Result<ObjectId, TypeError> {
        let name = self.path().rsplit('/').next().unwrap_or_default();
        let stem = match self {
            Location::File(_) => name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name),
            Location::FileSet(_) => name,
        };
        ObjectId::new(stem)
    }

    /// Id including the directory, e.g. `items/a1`.
    pub fn qualified_id(&self) -> Result<ObjectId, TypeError> {
        let id = self.id()?;
        match self.parent() {
            "" => Ok(id),
            dir => ObjectId::new(format!("{}/{}", dir, id)),
        }
    }
}

/// Id/path mapping for one store.
#[derive(Debug, Clone)]
pub struct Layout {
    types: Vec<ObjectType>,
    extension: &'static str,
}

impl Layout {
    pub fn new(types: Vec<ObjectType>, extension: &'static str) -> Self {
        Self { types, extension }
    }

    pub fn object_types(&self) -> &[ObjectType] {
        &self.types
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub(crate) fn join(dir: &str, name: &str) -> String {
        match dir.trim_end_matches('/') {
            "" => name.to_string(),
            dir => format!("{}/{}", dir, name),
        }
    }

    fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension)
    }

    /// Metadata file of the file set at `dir`.
    pub fn meta_file(&self, dir: &str) -> String {
        Self::join(dir, &self.file_name(META_STEM))
    }

    /// File holding `field` of the file set at `dir`.
    pub fn field_file(&self, dir: &str, field: &str) -> String {
        Self::join(dir, &self.file_name(field))
    }

    /// Field name stored in `file_name`, if it is a document file.
    pub fn field_of(&self, file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        (!stem.is_empty()).then(|| stem.to_string())
    }

    /// Location of a new object at `path`.
    ///
    /// Without meta fields `path` names the file and must carry the
    /// extension; with them it names the file set directory.
    pub fn location_for_create(&self, path: &str, file_set: bool) -> Result<Location, String> {
        let path = crate::core::paths::normalize_relative(path);
        crate::core::paths::validate_relative(&path).map_err(|e| e.to_string())?;
        let location = if file_set {
            let dir = path
                .strip_suffix(&format!(".{}", self.extension))
                .unwrap_or(&path)
                .to_string();
            Location::FileSet(dir)
        } else {
            if self.field_of(&path).is_none() {
                return Err(format!("{} does not end in .{}", path, self.extension));
            }
            Location::File(path)
        };
        location.id().map_err(|e| e.to_string())?;
        Ok(location)
    }

    /// Every place `id` may live, in resolution order.
    pub fn candidates(&self, id: &ObjectId) -> Vec<Location> {
        let mut dirs: Vec<&str> = Vec::new();
        if !id.is_qualified() {
            dirs.extend(self.types.iter().map(|t| t.subdir.as_str()));
        }
        dirs.push("");

        let mut out = Vec::with_capacity(dirs.len() * 2);
        for dir in dirs {
            let base = Self::join(dir, id.as_str());
            out.push(Location::File(format!("{}.{}", base, self.extension)));
            out.push(Location::FileSet(base));
        }
        out
    }

    /// Object owning a changed `path`, as reported by git.
    ///
    /// `is_file_set` tells whether a directory holds a file set.
    pub fn owner_of(&self, path: &str, is_file_set: impl Fn(&str) -> bool) -> Option<Location> {
        let path = crate::core::paths::normalize_relative(path);
        if is_file_set(&path) {
            return Some(Location::FileSet(path));
        }
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path.as_str()),
        };
        let field = self.field_of(name)?;
        if !dir.is_empty() && (field == META_STEM || is_file_set(dir)) {
            return Some(Location::FileSet(dir.to_string()));
        }
        Some(Location::File(path.clone()))
    }

    /// Location of a directory entry found while listing `dir`.
    pub fn entry_location(&self, dir: &str, name: &str, is_dir: bool) -> Option<Location> {
        if is_dir {
            return Some(Location::FileSet(Self::join(dir, name)));
        }
        self.field_of(name)?;
        Some(Location::File(Self::join(dir, name)))
    }
}
