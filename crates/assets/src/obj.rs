use glam::{Vec2, Vec3};
use std::collections::HashMap;
use std::path::Path;

use crate::{AssetError, ImportedObject, ObjectImporter, SourceMesh};

/// Wavefront OBJ importer.
///
/// Reads positions, normals, texture coordinates and polygon faces. Polygons
/// are fan-triangulated and every distinct `v/vt/vn` triple becomes one
/// output vertex. `o` and `g` start a new mesh. Materials, lines and points
/// are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjImporter;

impl ObjImporter {
    pub fn new() -> Self {
        Self
    }

    /// Parse OBJ text. `path` is only used for error messages and the object name.
    pub fn parse(&self, path: &Path, source: &str) -> Result<ImportedObject, AssetError> {
        let mut parser = Parser {
            path,
            line: 0,
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            meshes: Vec::new(),
            current: MeshBuilder::default(),
        };

        for (line_idx, raw) in source.lines().enumerate() {
            parser.line = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };
            match keyword {
                "v" => {
                    let p = parser.floats::<3>(&mut tokens, 3)?;
                    parser.positions.push(Vec3::from_array(p));
                }
                "vn" => {
                    let n = parser.floats::<3>(&mut tokens, 3)?;
                    parser.normals.push(Vec3::from_array(n));
                }
                "vt" => {
                    let t = parser.floats::<2>(&mut tokens, 1)?;
                    parser.uvs.push(Vec2::from_array(t));
                }
                "f" => parser.face(tokens)?,
                "o" | "g" => parser.finish_mesh(),
                _ => {}
            }
        }
        parser.finish_mesh();

        if parser.meshes.is_empty() {
            return Err(AssetError::Empty {
                path: path.to_path_buf(),
            });
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string();
        tracing::trace!(%name, meshes = parser.meshes.len(), "parsed obj");

        Ok(ImportedObject {
            name,
            meshes: parser.meshes,
        })
    }
}

impl ObjectImporter for ObjImporter {
    fn import_object(&self, path: &Path) -> Result<ImportedObject, AssetError> {
        let source = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(path, &source)
    }
}

/// Output vertex key: position, optional uv, optional normal (0-based).
type VertexKey = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct MeshBuilder {
    mesh: SourceMesh,
    lookup: HashMap<VertexKey, u32>,
}

struct Parser<'a> {
    path: &'a Path,
    line: usize,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    meshes: Vec<SourceMesh>,
    current: MeshBuilder,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> AssetError {
        AssetError::Parse {
            path: self.path.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }

    /// Read up to `N` floats, at least `required`; the rest default to zero.
    fn floats<'t, const N: usize>(
        &self,
        tokens: &mut impl Iterator<Item = &'t str>,
        required: usize,
    ) -> Result<[f32; N], AssetError> {
        let mut out = [0.0; N];
        let mut count = 0;
        for (slot, token) in out.iter_mut().zip(tokens) {
            *slot = token
                .parse()
                .map_err(|_| self.error(format!("invalid number '{token}'")))?;
            count += 1;
        }
        if count < required {
            return Err(self.error(format!("expected {required} components, found {count}")));
        }
        Ok(out)
    }

    /// Resolve a 1-based or negative (relative) OBJ index.
    fn resolve(&self, token: &str, len: usize, what: &str) -> Result<usize, AssetError> {
        let raw: i64 = token
            .parse()
            .map_err(|_| self.error(format!("invalid {what} index '{token}'")))?;
        let idx = match raw {
            0 => None,
            r if r > 0 => Some(r as usize - 1),
            r => len.checked_sub(r.unsigned_abs() as usize),
        };
        match idx {
            Some(i) if i < len => Ok(i),
            _ => Err(self.error(format!("{what} index {raw} out of range ({len} defined)"))),
        }
    }

    fn vertex(&mut self, token: &str) -> Result<u32, AssetError> {
        let mut parts = token.split('/');
        let position = self.resolve(parts.next().unwrap_or(""), self.positions.len(), "position")?;
        let uv = match parts.next() {
            Some(t) if !t.is_empty() => Some(self.resolve(t, self.uvs.len(), "uv")?),
            _ => None,
        };
        let normal = match parts.next() {
            Some(t) if !t.is_empty() => Some(self.resolve(t, self.normals.len(), "normal")?),
            _ => None,
        };

        let key = (position, uv, normal);
        if let Some(&idx) = self.current.lookup.get(&key) {
            return Ok(idx);
        }
        let mesh = &mut self.current.mesh;
        let idx = mesh.positions.len() as u32;
        mesh.positions.push(self.positions[position]);
        mesh.uvs.push(uv.map_or(Vec2::ZERO, |i| self.uvs[i]));
        mesh.normals.push(normal.map_or(Vec3::ZERO, |i| self.normals[i]));
        self.current.lookup.insert(key, idx);
        Ok(idx)
    }

    fn face<'t>(&mut self, tokens: impl Iterator<Item = &'t str>) -> Result<(), AssetError> {
        let mut corners = Vec::with_capacity(4);
        for token in tokens {
            corners.push(self.vertex(token)?);
        }
        if corners.len() < 3 {
            return Err(self.error(format!("face has {} vertices", corners.len())));
        }
        let indices = &mut self.current.mesh.indices;
        for i in 1..corners.len() - 1 {
            indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
        }
        Ok(())
    }

    fn finish_mesh(&mut self) {
        let builder = std::mem::take(&mut self.current);
        if !builder.mesh.indices.is_empty() {
            self.meshes.push(builder.mesh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<ImportedObject, AssetError> {
        ObjImporter::new().parse(Path::new("test.obj"), src)
    }

    #[test]
    fn triangle_with_positions_only() {
        let obj = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(obj.name, "test");
        assert_eq!(obj.meshes.len(), 1);
        let mesh = &obj.meshes[0];
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.normals[0], Vec3::ZERO);
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let obj = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();
        assert_eq!(obj.meshes[0].indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(obj.meshes[0].triangle_count(), 2);
    }

    #[test]
    fn attribute_triples_are_deduplicated() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nvt 0 0\nvt 1 1\n\
                   f 1/1/1 2/1/1 3/2/1\nf 1/1/1 3/2/1 4/1/1\n";
        let mesh = &parse(src).unwrap().meshes[0];
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.normals[3], Vec3::Z);
        assert_eq!(mesh.uvs[2], Vec2::ONE);
    }

    #[test]
    fn normal_without_uv() {
        let mesh = &parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 1 0\nf 1//1 2//1 3//1\n")
            .unwrap()
            .meshes[0];
        assert_eq!(mesh.normals, vec![Vec3::Y; 3]);
        assert_eq!(mesh.uvs, vec![Vec2::ZERO; 3]);
    }

    #[test]
    fn negative_indices_are_relative() {
        let mesh = &parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap().meshes[0];
        assert_eq!(mesh.positions[0], Vec3::ZERO);
        assert_eq!(mesh.positions[2], Vec3::Y);
    }

    #[test]
    fn objects_split_meshes() {
        let src = "o a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\no b\nv 0 0 1\nf 1 2 4\n";
        let obj = parse(src).unwrap();
        assert_eq!(obj.meshes.len(), 2);
        assert_eq!(obj.meshes[1].positions[2], Vec3::Z);
    }

    #[test]
    fn comments_and_unknown_keywords_ignored() {
        let src = "# header\nmtllib x.mtl\nusemtl red\ns off\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert_eq!(parse(src).unwrap().meshes[0].triangle_count(), 1);
    }

    #[test]
    fn out_of_range_index_reports_line() {
        let err = parse("v 0 0 0\nv 1 0 0\nf 1 2 9\n").unwrap_err();
        match err {
            AssetError::Parse { line, message, .. } => {
                assert_eq!(line, 3);
                assert!(message.contains("out of range"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_vertex_rejected() {
        assert!(matches!(
            parse("v 0 zero 0\n"),
            Err(AssetError::Parse { line: 1, .. })
        ));
        assert!(matches!(parse("v 0 0\n"), Err(AssetError::Parse { .. })));
    }

    #[test]
    fn file_without_faces_is_empty() {
        assert!(matches!(parse("v 0 0 0\n"), Err(AssetError::Empty { .. })));
    }

    #[test]
    fn import_missing_file_is_io_error() {
        let err = ObjImporter::new()
            .import_object(Path::new("/nonexistent/sphere.obj"))
            .unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn import_from_disk() {
        let tmp = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        std::fs::write(tmp.path(), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let obj = ObjImporter::new().import_object(tmp.path()).unwrap();
        assert_eq!(obj.meshes[0].vertex_count(), 3);
    }
}
