//! Render asset catalog: imported meshes for the static object set.
//!
//! Meshes are imported once at startup through an [`ObjectImporter`] and are
//! immutable afterwards. The backend's renderer consumes them by catalog
//! index, in the same order as the physics catalog.

mod catalog;
mod obj;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use catalog::RenderAssetCatalog;
pub use obj::ObjImporter;

/// Triangle mesh with one attribute entry per vertex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl SourceMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// All meshes imported from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedObject {
    pub name: String,
    pub meshes: Vec<SourceMesh>,
}

/// Errors from asset import.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{path} contains no faces")]
    Empty { path: PathBuf },
    #[error("failed to load {name}: {source}")]
    StaticObject {
        name: &'static str,
        #[source]
        source: Box<AssetError>,
    },
}

/// Geometry importer interface.
pub trait ObjectImporter {
    fn import_object(&self, path: &Path) -> Result<ImportedObject, AssetError>;
}
