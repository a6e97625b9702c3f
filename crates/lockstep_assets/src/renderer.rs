//! # Renderer Collaborator
//!
//! [`ResourceFactory`] is the seam between loading and the GPU. Its methods
//! are called from worker threads, concurrently for distinct resources.
//!
//! [`HeadlessResourceFactory`] backs tests and the demo binary: it hands out
//! sequential identifiers, keeps a record of what was created, and enforces
//! an optional memory budget.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;

use crate::error::ResourceError;
use crate::ids::{MaterialId, ModelId, TextureId};
use crate::requests::TextureRole;

/// Interleaved vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

/// One draw range of a model.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    /// Mesh name from the source file.
    pub name: String,
    /// Vertex buffer contents.
    pub vertices: Vec<Vertex>,
    /// Index buffer contents (triangle list).
    pub indices: Vec<u32>,
    /// Material, or [`MaterialId::INVALID`] for the default material.
    pub material: MaterialId,
}

impl MeshData {
    /// Bytes the mesh occupies once uploaded.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        (bytemuck::cast_slice::<Vertex, u8>(&self.vertices).len()
            + bytemuck::cast_slice::<u32, u8>(&self.indices).len()) as u64
    }
}

/// Pixel layout of a decoded texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, sRGB.
    Rgba8Srgb,
    /// 8-bit RGBA, linear (normal, roughness and similar data maps).
    Rgba8Unorm,
}

impl TextureFormat {
    /// Format a texture in `role` is uploaded as.
    #[must_use]
    pub fn for_role(role: TextureRole) -> Self {
        match role {
            TextureRole::Diffuse | TextureRole::Emissive => TextureFormat::Rgba8Srgb,
            _ => TextureFormat::Rgba8Unorm,
        }
    }
}

/// Decoded texture ready for upload.
#[derive(Clone, Debug)]
pub struct TextureImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: TextureFormat,
    /// Tightly packed rows of RGBA8 pixels.
    pub pixels: Vec<u8>,
}

/// GPU resource creation, callable from any worker thread.
pub trait ResourceFactory: Send + Sync {
    /// Creates vertex/index buffers for every mesh of a model.
    ///
    /// # Errors
    ///
    /// [`ResourceError::OutOfMemory`] when the device is full,
    /// [`ResourceError::InvalidParameters`] for empty or malformed meshes.
    fn create_model_resources(&self, name: &str, meshes: &[MeshData])
        -> Result<ModelId, ResourceError>;

    /// Uploads one texture.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceFactory::create_model_resources`].
    fn create_texture_resource(
        &self,
        name: &str,
        image: &TextureImage,
    ) -> Result<TextureId, ResourceError>;

    /// Creates an empty material named `name`.
    fn create_material(&self, name: &str) -> MaterialId;

    /// Binds `texture` into `role` of `material`.
    fn assign_texture(&self, material: MaterialId, role: TextureRole, texture: TextureId);

    /// Model substituted when a model load fails.
    fn fallback_model(&self) -> ModelId;

    /// Texture substituted when a texture load fails.
    fn fallback_texture(&self) -> TextureId;
}

/// Record of one created model.
#[derive(Clone, Debug)]
pub struct ModelRecord {
    /// Model name.
    pub name: String,
    /// Mesh count.
    pub mesh_count: usize,
    /// Materials referenced by the meshes.
    pub materials: Vec<MaterialId>,
}

/// Record of one created material.
#[derive(Clone, Debug, Default)]
pub struct MaterialRecord {
    /// Material name.
    pub name: String,
    /// Bound textures.
    pub textures: HashMap<TextureRole, TextureId>,
}

#[derive(Default)]
struct Records {
    models: HashMap<ModelId, ModelRecord>,
    textures: HashMap<TextureId, String>,
    materials: HashMap<MaterialId, MaterialRecord>,
}

/// In-memory [`ResourceFactory`] with sequential ids and a byte budget.
///
/// Identifier 0 of each kind is the fallback; created resources start at 1.
pub struct HeadlessResourceFactory {
    next_model: AtomicU32,
    next_texture: AtomicU32,
    next_material: AtomicU32,
    budget_bytes: Option<u64>,
    used_bytes: Mutex<u64>,
    models_created: AtomicUsize,
    textures_created: AtomicUsize,
    refused: AtomicU64,
    records: Mutex<Records>,
}

impl Default for HeadlessResourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessResourceFactory {
    /// Factory with no memory limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_model: AtomicU32::new(1),
            next_texture: AtomicU32::new(1),
            next_material: AtomicU32::new(0),
            budget_bytes: None,
            used_bytes: Mutex::new(0),
            models_created: AtomicUsize::new(0),
            textures_created: AtomicUsize::new(0),
            refused: AtomicU64::new(0),
            records: Mutex::new(Records::default()),
        }
    }

    /// Factory that refuses allocations once `budget_bytes` are in use.
    #[must_use]
    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            budget_bytes: Some(budget_bytes),
            ..Self::new()
        }
    }

    fn reserve(&self, requested_bytes: u64) -> Result<(), ResourceError> {
        let mut used = self.used_bytes.lock();
        if let Some(budget) = self.budget_bytes {
            if *used + requested_bytes > budget {
                self.refused.fetch_add(1, Ordering::Relaxed);
                return Err(ResourceError::OutOfMemory { requested_bytes });
            }
        }
        *used += requested_bytes;
        Ok(())
    }

    /// Models created so far.
    #[must_use]
    pub fn models_created(&self) -> usize {
        self.models_created.load(Ordering::Acquire)
    }

    /// Textures created so far.
    #[must_use]
    pub fn textures_created(&self) -> usize {
        self.textures_created.load(Ordering::Acquire)
    }

    /// Allocations refused for lack of memory.
    #[must_use]
    pub fn refused_allocations(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    /// Bytes currently allocated.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        *self.used_bytes.lock()
    }

    /// Record of a created model.
    #[must_use]
    pub fn model(&self, id: ModelId) -> Option<ModelRecord> {
        self.records.lock().models.get(&id).cloned()
    }

    /// Name of a created texture.
    #[must_use]
    pub fn texture_name(&self, id: TextureId) -> Option<String> {
        self.records.lock().textures.get(&id).cloned()
    }

    /// Record of a created material.
    #[must_use]
    pub fn material(&self, id: MaterialId) -> Option<MaterialRecord> {
        self.records.lock().materials.get(&id).cloned()
    }
}

impl ResourceFactory for HeadlessResourceFactory {
    fn create_model_resources(
        &self,
        name: &str,
        meshes: &[MeshData],
    ) -> Result<ModelId, ResourceError> {
        if meshes.is_empty() {
            return Err(ResourceError::InvalidParameters(format!(
                "model '{name}' has no meshes"
            )));
        }
        if let Some(mesh) = meshes.iter().find(|m| m.vertices.is_empty() || m.indices.is_empty()) {
            return Err(ResourceError::InvalidParameters(format!(
                "mesh '{}' of model '{name}' is empty",
                mesh.name
            )));
        }

        self.reserve(meshes.iter().map(MeshData::byte_size).sum())?;

        let id = ModelId(self.next_model.fetch_add(1, Ordering::Relaxed));
        self.records.lock().models.insert(
            id,
            ModelRecord {
                name: name.to_string(),
                mesh_count: meshes.len(),
                materials: meshes.iter().map(|m| m.material).collect(),
            },
        );
        self.models_created.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(%id, name, meshes = meshes.len(), "model resources created");
        Ok(id)
    }

    fn create_texture_resource(
        &self,
        name: &str,
        image: &TextureImage,
    ) -> Result<TextureId, ResourceError> {
        let expected = u64::from(image.width) * u64::from(image.height) * 4;
        if image.width == 0 || image.height == 0 || image.pixels.len() as u64 != expected {
            return Err(ResourceError::InvalidParameters(format!(
                "texture '{name}' is {}x{} with {} bytes",
                image.width,
                image.height,
                image.pixels.len()
            )));
        }

        self.reserve(expected)?;

        let id = TextureId(self.next_texture.fetch_add(1, Ordering::Relaxed));
        self.records.lock().textures.insert(id, name.to_string());
        self.textures_created.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(%id, name, "texture resource created");
        Ok(id)
    }

    fn create_material(&self, name: &str) -> MaterialId {
        let id = MaterialId(self.next_material.fetch_add(1, Ordering::Relaxed));
        self.records.lock().materials.insert(
            id,
            MaterialRecord {
                name: name.to_string(),
                textures: HashMap::new(),
            },
        );
        id
    }

    fn assign_texture(&self, material: MaterialId, role: TextureRole, texture: TextureId) {
        match self.records.lock().materials.get_mut(&material) {
            Some(record) => {
                record.textures.insert(role, texture);
            }
            None => tracing::warn!(%material, %role, "texture assigned to unknown material"),
        }
    }

    fn fallback_model(&self) -> ModelId {
        ModelId(0)
    }

    fn fallback_texture(&self) -> TextureId {
        TextureId(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        MeshData {
            name: "quad".into(),
            vertices: vec![Vertex::default(); 4],
            indices: vec![0, 1, 2, 2, 3, 0],
            material: MaterialId::INVALID,
        }
    }

    fn image(side: u32) -> TextureImage {
        TextureImage {
            width: side,
            height: side,
            format: TextureFormat::Rgba8Srgb,
            pixels: vec![255; (side * side * 4) as usize],
        }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(quad().byte_size(), 4 * 32 + 6 * 4);
    }

    #[test]
    fn test_sequential_ids_skip_fallback() {
        let factory = HeadlessResourceFactory::new();
        let a = factory.create_texture_resource("a", &image(2)).unwrap();
        let b = factory.create_texture_resource("b", &image(2)).unwrap();
        assert_eq!((a, b), (TextureId(1), TextureId(2)));
        assert_ne!(a, factory.fallback_texture());
        assert_eq!(factory.textures_created(), 2);
        assert_eq!(factory.texture_name(b).as_deref(), Some("b"));
    }

    #[test]
    fn test_budget_refuses_allocation() {
        let factory = HeadlessResourceFactory::with_budget(100);
        assert!(factory.create_texture_resource("small", &image(4)).is_ok());
        assert_eq!(
            factory.create_texture_resource("big", &image(8)),
            Err(ResourceError::OutOfMemory { requested_bytes: 256 })
        );
        assert_eq!(factory.refused_allocations(), 1);
        assert_eq!(factory.used_bytes(), 64);
    }

    #[test]
    fn test_invalid_parameters() {
        let factory = HeadlessResourceFactory::new();
        assert!(matches!(
            factory.create_model_resources("empty", &[]),
            Err(ResourceError::InvalidParameters(_))
        ));
        let mut broken = image(2);
        broken.pixels.pop();
        assert!(factory.create_texture_resource("broken", &broken).is_err());
    }

    #[test]
    fn test_material_assignment() {
        let factory = HeadlessResourceFactory::new();
        let material = factory.create_material("brick");
        let model = factory
            .create_model_resources("wall", &[MeshData { material, ..quad() }])
            .unwrap();
        factory.assign_texture(material, TextureRole::Diffuse, TextureId(3));

        let record = factory.material(material).unwrap();
        assert_eq!(record.name, "brick");
        assert_eq!(record.textures.get(&TextureRole::Diffuse), Some(&TextureId(3)));
        assert_eq!(factory.model(model).unwrap().materials, vec![material]);
    }
}
