use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Errors from half-edge mesh construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("face {face} has fewer than three vertices")]
    DegenerateFace { face: usize },
    #[error("face {face} references vertex {vertex}, mesh has {vertex_count}")]
    VertexOutOfRange {
        face: usize,
        vertex: u32,
        vertex_count: usize,
    },
    #[error("edge {from} -> {to} is used by more than one face")]
    NonManifoldEdge { from: u32, to: u32 },
    #[error("edge {from} -> {to} has no opposite half-edge")]
    OpenEdge { from: u32, to: u32 },
}

/// One directed edge of a face loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfEdge {
    /// Next half-edge around the same face.
    pub next: u32,
    /// Opposite half-edge on the neighbouring face.
    pub twin: u32,
    /// Vertex this half-edge starts at.
    pub origin: u32,
    pub face: u32,
}

/// Supporting plane of a face: `normal . p == d` for points on the face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacePlane {
    pub normal: Vec3,
    pub d: f32,
}

/// Closed convex polyhedron in half-edge form.
///
/// Faces are counter-clockwise when seen from outside, so face normals point
/// outward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfEdgeMesh {
    vertices: Vec<Vec3>,
    half_edges: Vec<HalfEdge>,
    /// First half-edge of each face.
    face_base: Vec<u32>,
    face_planes: Vec<FacePlane>,
}

impl HalfEdgeMesh {
    /// Build a mesh from polygon loops over `vertices`.
    ///
    /// Every directed edge must be used by exactly one face and its reverse by
    /// exactly one other face.
    pub fn from_polygons(vertices: Vec<Vec3>, faces: &[&[u32]]) -> Result<Self, GeometryError> {
        let mut half_edges = Vec::new();
        let mut face_base = Vec::with_capacity(faces.len());
        let mut face_planes = Vec::with_capacity(faces.len());
        let mut edge_lookup: HashMap<(u32, u32), u32> = HashMap::new();

        for (face_idx, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(GeometryError::DegenerateFace { face: face_idx });
            }
            if let Some(&vertex) = face.iter().find(|&&v| v as usize >= vertices.len()) {
                return Err(GeometryError::VertexOutOfRange {
                    face: face_idx,
                    vertex,
                    vertex_count: vertices.len(),
                });
            }

            let base = half_edges.len() as u32;
            face_base.push(base);
            for (i, &origin) in face.iter().enumerate() {
                let to = face[(i + 1) % face.len()];
                let idx = base + i as u32;
                if edge_lookup.insert((origin, to), idx).is_some() {
                    return Err(GeometryError::NonManifoldEdge { from: origin, to });
                }
                half_edges.push(HalfEdge {
                    next: base + ((i + 1) % face.len()) as u32,
                    twin: u32::MAX,
                    origin,
                    face: face_idx as u32,
                });
            }

            face_planes.push(face_plane(&vertices, face));
        }

        for idx in 0..half_edges.len() {
            let from = half_edges[idx].origin;
            let to = half_edges[half_edges[idx].next as usize].origin;
            let twin = edge_lookup
                .get(&(to, from))
                .copied()
                .ok_or(GeometryError::OpenEdge { from, to })?;
            half_edges[idx].twin = twin;
        }

        Ok(Self {
            vertices,
            half_edges,
            face_base,
            face_planes,
        })
    }

    /// Unit cube spanning [-1, 1] on every axis.
    pub fn cube() -> Self {
        let vertices = vec![
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ];
        #[rustfmt::skip]
        let faces: [&[u32]; 6] = [
            &[0, 3, 2, 1], // -Z
            &[4, 5, 6, 7], // +Z
            &[0, 1, 5, 4], // -Y
            &[3, 7, 6, 2], // +Y
            &[0, 4, 7, 3], // -X
            &[1, 2, 6, 5], // +X
        ];
        match Self::from_polygons(vertices, &faces) {
            Ok(mesh) => mesh,
            Err(e) => unreachable!("cube topology is closed: {e}"),
        }
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn half_edges(&self) -> &[HalfEdge] {
        &self.half_edges
    }

    pub fn face_count(&self) -> usize {
        self.face_base.len()
    }

    pub fn face_plane(&self, face: usize) -> FacePlane {
        self.face_planes[face]
    }

    /// Vertex indices of a face, in winding order.
    pub fn face_vertices(&self, face: usize) -> Vec<u32> {
        let start = self.face_base[face];
        let mut out = Vec::new();
        let mut he = start;
        loop {
            out.push(self.half_edges[he as usize].origin);
            he = self.half_edges[he as usize].next;
            if he == start {
                break;
            }
        }
        out
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.half_edges.len() / 2
    }

    /// Vertex farthest along `dir`.
    pub fn support(&self, dir: Vec3) -> Vec3 {
        self.vertices
            .iter()
            .copied()
            .fold((f32::NEG_INFINITY, Vec3::ZERO), |(best, best_v), v| {
                let d = v.dot(dir);
                if d > best { (d, v) } else { (best, best_v) }
            })
            .1
    }
}

/// Newell's method; robust for slightly non-planar loops.
fn face_plane(vertices: &[Vec3], face: &[u32]) -> FacePlane {
    let mut normal = Vec3::ZERO;
    let mut centroid = Vec3::ZERO;
    for (i, &a) in face.iter().enumerate() {
        let cur = vertices[a as usize];
        let next = vertices[face[(i + 1) % face.len()] as usize];
        normal.x += (cur.y - next.y) * (cur.z + next.z);
        normal.y += (cur.z - next.z) * (cur.x + next.x);
        normal.z += (cur.x - next.x) * (cur.y + next.y);
        centroid += cur;
    }
    let normal = normal.normalize_or_zero();
    centroid /= face.len() as f32;
    FacePlane {
        normal,
        d: normal.dot(centroid),
    }
}
