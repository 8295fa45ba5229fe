use sha2::{Digest, Sha256};
use std::path::Path;

use hideseek_common::STATIC_OBJECT_FILES;

use crate::{AssetError, ImportedObject, ObjectImporter, SourceMesh};

/// Catalog names of the static objects, in load order.
const STATIC_OBJECT_NAMES: [&str; 3] = ["sphere", "plane", "cube"];

/// Imported render meshes, indexed in physics catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderAssetCatalog {
    objects: Vec<ImportedObject>,
}

impl RenderAssetCatalog {
    /// Import the static object set (sphere, plane, cube) from `data_dir`.
    ///
    /// There is no partial catalog: the first object that fails to import
    /// fails the whole load.
    pub fn load_static(
        importer: &dyn ObjectImporter,
        data_dir: &Path,
    ) -> Result<Self, AssetError> {
        let _span = tracing::info_span!("load_render_assets", dir = %data_dir.display()).entered();

        let mut objects = Vec::with_capacity(STATIC_OBJECT_FILES.len());
        for (name, file) in STATIC_OBJECT_NAMES.into_iter().zip(STATIC_OBJECT_FILES) {
            let object = importer
                .import_object(&data_dir.join(file))
                .map_err(|e| AssetError::StaticObject {
                    name,
                    source: Box::new(e),
                })?;
            tracing::debug!(
                name,
                meshes = object.meshes.len(),
                vertices = object.meshes.iter().map(SourceMesh::vertex_count).sum::<usize>(),
                "imported render object"
            );
            objects.push(object);
        }

        let catalog = Self::from_objects(objects);
        tracing::info!(
            objects = catalog.len(),
            hash = %catalog.content_hash_hex(),
            "render assets loaded"
        );
        Ok(catalog)
    }

    /// Build a catalog from already-imported objects.
    pub fn from_objects(objects: Vec<ImportedObject>) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &[ImportedObject] {
        &self.objects
    }

    pub fn get(&self, index: usize) -> Option<&ImportedObject> {
        self.objects.get(index)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn total_vertices(&self) -> usize {
        self.meshes().map(SourceMesh::vertex_count).sum()
    }

    pub fn total_indices(&self) -> usize {
        self.meshes().map(|m| m.indices.len()).sum()
    }

    /// Every mesh of every object, in catalog order.
    pub fn meshes(&self) -> impl Iterator<Item = &SourceMesh> {
        self.objects.iter().flat_map(|o| o.meshes.iter())
    }

    /// SHA-256 over all geometry, so two loads can be compared cheaply.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for object in &self.objects {
            hasher.update(object.name.as_bytes());
            hasher.update((object.meshes.len() as u64).to_le_bytes());
            for mesh in &object.meshes {
                for p in &mesh.positions {
                    for c in p.to_array() {
                        hasher.update(c.to_le_bytes());
                    }
                }
                for n in &mesh.normals {
                    for c in n.to_array() {
                        hasher.update(c.to_le_bytes());
                    }
                }
                for uv in &mesh.uvs {
                    for c in uv.to_array() {
                        hasher.update(c.to_le_bytes());
                    }
                }
                for i in &mesh.indices {
                    hasher.update(i.to_le_bytes());
                }
            }
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    pub fn content_hash_hex(&self) -> String {
        self.content_hash()
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}
