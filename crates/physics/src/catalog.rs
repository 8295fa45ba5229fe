use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::HalfEdgeMesh;

/// Stable index of an object in the catalog.
///
/// World logic addresses primitives positionally, so the ids of the static
/// primitives are fixed by load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const SPHERE: Self = Self(0);
    pub const PLANE: Self = Self(1);
    pub const CUBE: Self = Self(2);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Mass properties of a rigid body, stored inverted so immovable bodies are zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyMetadata {
    /// Diagonal of the inverse inertia tensor.
    pub inv_inertia_tensor: Vec3,
    pub inv_mass: f32,
}

impl RigidBodyMetadata {
    /// A body that can never be moved or rotated.
    pub const STATIC: Self = Self {
        inv_inertia_tensor: Vec3::ZERO,
        inv_mass: 0.0,
    };

    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia_tensor == Vec3::ZERO
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub p_min: Vec3,
    pub p_max: Vec3,
}

impl Aabb {
    /// Box covering the whole representable range.
    pub const INFINITE: Self = Self {
        p_min: Vec3::splat(-f32::MAX),
        p_max: Vec3::splat(f32::MAX),
    };

    pub fn new(p_min: Vec3, p_max: Vec3) -> Self {
        Self { p_min, p_max }
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            p_min: self.p_min + offset,
            p_max: self.p_max + offset,
        }
    }

    /// Strict overlap; boxes that only touch do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.p_min.cmplt(other.p_max).all() && self.p_max.cmpgt(other.p_min).all()
    }

    pub fn extent(&self) -> Vec3 {
        self.p_max - self.p_min
    }
}

/// Collision geometry of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollisionPrimitive {
    Sphere { radius: f32 },
    /// Infinite plane through the origin with +Y normal.
    Plane,
    Hull(HalfEdgeMesh),
}

impl CollisionPrimitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Sphere { .. } => PrimitiveKind::Sphere,
            Self::Plane => PrimitiveKind::Plane,
            Self::Hull(_) => PrimitiveKind::Hull,
        }
    }
}

/// Discriminant of [`CollisionPrimitive`], as laid out for device upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PrimitiveKind {
    Sphere = 0,
    Plane = 1,
    Hull = 2,
}

/// Memory domain the catalog is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    Host,
    Device,
}

/// Errors from catalog loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhysicsError {
    #[error("catalog holds at most {capacity} objects, {requested} requested")]
    CapacityExceeded { capacity: usize, requested: usize },
    #[error(
        "object arrays differ in length: {metadata} metadata, {aabbs} bounds, {primitives} primitives"
    )]
    LengthMismatch {
        metadata: usize,
        aabbs: usize,
        primitives: usize,
    },
}

/// Append-only table of physics objects. Entries are immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectManager {
    metadata: Vec<RigidBodyMetadata>,
    aabbs: Vec<Aabb>,
    primitives: Vec<CollisionPrimitive>,
}

impl ObjectManager {
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn metadata(&self, id: ObjectId) -> Option<&RigidBodyMetadata> {
        self.metadata.get(id.index())
    }

    pub fn aabb(&self, id: ObjectId) -> Option<&Aabb> {
        self.aabbs.get(id.index())
    }

    pub fn primitive(&self, id: ObjectId) -> Option<&CollisionPrimitive> {
        self.primitives.get(id.index())
    }

    /// Iterate `(id, metadata, aabb, primitive)` in load order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (ObjectId, &RigidBodyMetadata, &Aabb, &CollisionPrimitive)> {
        self.metadata
            .iter()
            .zip(&self.aabbs)
            .zip(&self.primitives)
            .enumerate()
            .map(|(i, ((m, a), p))| (ObjectId(i as u32), m, a, p))
    }
}

/// Loads objects into an [`ObjectManager`] bound for a given memory domain.
#[derive(Debug)]
pub struct PhysicsLoader {
    storage: StorageType,
    max_objects: usize,
    objects: ObjectManager,
}

impl PhysicsLoader {
    pub fn new(storage: StorageType, max_objects: usize) -> Self {
        Self {
            storage,
            max_objects,
            objects: ObjectManager::default(),
        }
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn capacity(&self) -> usize {
        self.max_objects
    }

    /// Append a batch of objects. Returns the id of the first one.
    ///
    /// The batch is all-or-nothing: on error nothing is appended.
    pub fn load_objects(
        &mut self,
        metadata: &[RigidBodyMetadata],
        aabbs: &[Aabb],
        primitives: Vec<CollisionPrimitive>,
    ) -> Result<ObjectId, PhysicsError> {
        if metadata.len() != aabbs.len() || metadata.len() != primitives.len() {
            return Err(PhysicsError::LengthMismatch {
                metadata: metadata.len(),
                aabbs: aabbs.len(),
                primitives: primitives.len(),
            });
        }
        let requested = self.objects.len() + metadata.len();
        if requested > self.max_objects {
            return Err(PhysicsError::CapacityExceeded {
                capacity: self.max_objects,
                requested,
            });
        }

        let first = ObjectId(self.objects.len() as u32);
        self.objects.metadata.extend_from_slice(metadata);
        self.objects.aabbs.extend_from_slice(aabbs);
        self.objects.primitives.extend(primitives);

        tracing::debug!(
            storage = ?self.storage,
            count = metadata.len(),
            total = self.objects.len(),
            "loaded physics objects"
        );
        Ok(first)
    }

    pub fn object_manager(&self) -> &ObjectManager {
        &self.objects
    }

    pub fn into_object_manager(self) -> ObjectManager {
        self.objects
    }
}

/// Load the geometry every world shares: sphere, plane, cube, in that order.
pub fn load_static_primitives(loader: &mut PhysicsLoader) -> Result<(), PhysicsError> {
    let unit_box = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    let dynamic = RigidBodyMetadata {
        inv_inertia_tensor: Vec3::ONE,
        inv_mass: 1.0,
    };

    let metadata = [dynamic, RigidBodyMetadata::STATIC, dynamic];
    let aabbs = [unit_box, Aabb::INFINITE, unit_box];
    let primitives = vec![
        CollisionPrimitive::Sphere { radius: 1.0 },
        CollisionPrimitive::Plane,
        CollisionPrimitive::Hull(HalfEdgeMesh::cube()),
    ];

    let first = loader.load_objects(&metadata, &aabbs, primitives)?;
    debug_assert_eq!(first, ObjectId::SPHERE);
    Ok(())
}
