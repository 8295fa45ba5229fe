//! Physics asset catalog: the collision primitives every world shares.
//!
//! # Invariants
//! - Static primitives load in a fixed order: sphere (0), plane (1), cube (2).
//! - Catalog entries are immutable once loaded and referenced by index.
//! - A failed batch leaves the catalog unchanged.

mod catalog;
mod geometry;

pub use catalog::{
    Aabb, CollisionPrimitive, ObjectId, ObjectManager, PhysicsError, PhysicsLoader,
    PrimitiveKind, RigidBodyMetadata, StorageType, load_static_primitives,
};
pub use geometry::{FacePlane, GeometryError, HalfEdge, HalfEdgeMesh};

/// Catalog capacity the manager reserves.
pub const MAX_OBJECTS: usize = 10;
