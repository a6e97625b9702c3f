//! # Importers
//!
//! Default model and texture importers. Both run on worker threads.
//!
//! Model import reads a Wavefront OBJ (plus its MTL library), creates one
//! material per MTL entry, queues the material textures as their own load
//! task so they decode in parallel on the texture pool, uploads the geometry,
//! and finally binds the resolved textures to the materials.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use lockstep_core::CancellationToken;

use crate::assignments::resolve_texture_assignments;
use crate::error::{AssetError, AssetResult};
use crate::ids::{LoadTaskId, MaterialId, ModelId};
use crate::loader::AssetLoader;
use crate::renderer::{MeshData, ResourceFactory, TextureFormat, TextureImage, Vertex};
use crate::requests::{TextureLoadRequest, TextureRole};

/// Importer signature: `(context, source path, display name) -> model`.
pub type ImportModelFn = fn(&ImportContext<'_>, &Path, &str) -> AssetResult<ModelId>;

/// What an importer may use while it runs.
pub struct ImportContext<'a> {
    loader: &'a AssetLoader,
}

impl<'a> ImportContext<'a> {
    pub(crate) fn new(loader: &'a AssetLoader) -> Self {
        Self { loader }
    }

    /// Loader the import was dispatched from; use it to queue textures.
    #[must_use]
    pub fn loader(&self) -> &'a AssetLoader {
        self.loader
    }

    /// Renderer collaborator.
    #[must_use]
    pub fn factory(&self) -> &'a dyn ResourceFactory {
        self.loader.factory()
    }

    /// Engine-wide shutdown token.
    #[must_use]
    pub fn token(&self) -> &'a CancellationToken {
        self.loader.token()
    }
}

fn decode_error(path: &Path, reason: impl ToString) -> AssetError {
    AssetError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Default importer: Wavefront OBJ via `tobj`.
///
/// # Errors
///
/// [`AssetError::Io`] if the file cannot be opened, [`AssetError::Decode`]
/// if it holds no usable geometry and [`AssetError::ResourceCreation`] if
/// the renderer refuses the buffers. A broken or missing MTL library only
/// loses the materials.
pub fn import_obj_model(ctx: &ImportContext<'_>, path: &Path, name: &str) -> AssetResult<ModelId> {
    let file = File::open(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, materials) = tobj::load_obj_buf(&mut BufReader::new(file), &options, |mtl| {
        tobj::load_mtl(base_dir.join(mtl))
    })
    .map_err(|err| decode_error(path, err))?;

    let materials = materials.unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), error = %err, "material library unusable, using default material");
        Vec::new()
    });
    if models.is_empty() {
        return Err(decode_error(path, "file contains no geometry"));
    }

    let factory = ctx.factory();
    let loader = ctx.loader();

    // Queue material textures first so they decode while the meshes upload.
    let task = LoadTaskId::generate();
    let material_ids: Vec<MaterialId> = materials
        .iter()
        .map(|material| {
            let id = factory.create_material(&material.name);
            for (role, texture) in material_texture_paths(material) {
                loader.queue_texture_load(
                    task,
                    TextureLoadRequest {
                        role,
                        material: id,
                        path: base_dir.join(texture),
                    },
                );
            }
            id
        })
        .collect();
    let texture_results = loader.start_loading_textures(task);

    let meshes: Vec<MeshData> = models
        .iter()
        .map(|model| mesh_data(model, &material_ids))
        .collect();
    let model_id =
        factory
            .create_model_resources(name, &meshes)
            .map_err(|source| AssetError::ResourceCreation {
                path: path.to_path_buf(),
                source,
            })?;

    match resolve_texture_assignments(&texture_results, loader.texture_pool(), ctx.token()) {
        Ok(assignments) => {
            for assignment in &assignments {
                assignment.apply(factory);
            }
        }
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "texture assignment abandoned");
        }
    }

    tracing::debug!(
        path = %path.display(),
        %model_id,
        meshes = meshes.len(),
        materials = material_ids.len(),
        "model imported"
    );
    Ok(model_id)
}

fn mesh_data(model: &tobj::Model, material_ids: &[MaterialId]) -> MeshData {
    let mesh = &model.mesh;
    let vertex_count = mesh.positions.len() / 3;
    let has_normals = mesh.normals.len() == vertex_count * 3;
    let has_uvs = mesh.texcoords.len() == vertex_count * 2;

    let vertices = (0..vertex_count)
        .map(|i| Vertex {
            position: [
                mesh.positions[i * 3],
                mesh.positions[i * 3 + 1],
                mesh.positions[i * 3 + 2],
            ],
            normal: if has_normals {
                [
                    mesh.normals[i * 3],
                    mesh.normals[i * 3 + 1],
                    mesh.normals[i * 3 + 2],
                ]
            } else {
                [0.0, 1.0, 0.0]
            },
            uv: if has_uvs {
                [mesh.texcoords[i * 2], mesh.texcoords[i * 2 + 1]]
            } else {
                [0.0, 0.0]
            },
        })
        .collect();

    MeshData {
        name: model.name.clone(),
        vertices,
        indices: mesh.indices.clone(),
        material: mesh
            .material_id
            .and_then(|index| material_ids.get(index).copied())
            .unwrap_or(MaterialId::INVALID),
    }
}

/// Texture maps referenced by an MTL material, by role.
fn material_texture_paths(material: &tobj::Material) -> Vec<(TextureRole, String)> {
    let mut paths = Vec::new();
    let mut push = |role: TextureRole, value: Option<&String>| {
        // Map statements may carry options ("-bm 0.5 brick_n.png"); the file is last.
        if let Some(file) = value.and_then(|v| v.split_whitespace().last()) {
            paths.push((role, file.to_string()));
        }
    };

    push(TextureRole::Diffuse, material.diffuse_texture.as_ref());
    push(TextureRole::Normal, material.normal_texture.as_ref());
    push(TextureRole::Specular, material.specular_texture.as_ref());
    push(TextureRole::AlphaMask, material.dissolve_texture.as_ref());

    let param = |keys: &[&str]| keys.iter().find_map(|key| material.unknown_param.get(*key));
    push(TextureRole::Emissive, param(&["map_Ke", "map_ke"]));
    push(TextureRole::Height, param(&["disp", "map_disp"]));
    push(TextureRole::Metalness, param(&["map_Pm", "map_pm"]));
    push(TextureRole::Roughness, param(&["map_Pr", "map_pr"]));
    paths
}

/// Decodes an encoded image (PNG, JPEG, TGA, BMP) to RGBA8.
///
/// # Errors
///
/// [`AssetError::Decode`] if the bytes are not a supported image.
pub fn decode_texture(path: &Path, bytes: &[u8], role: TextureRole) -> AssetResult<TextureImage> {
    let decoded = image::load_from_memory(bytes).map_err(|err| decode_error(path, err))?;
    let rgba = decoded.into_rgba8();
    Ok(TextureImage {
        width: rgba.width(),
        height: rgba.height(),
        format: TextureFormat::for_role(role),
        pixels: rgba.into_raw(),
    })
}

/// Reads and decodes a texture file.
///
/// # Errors
///
/// [`AssetError::Io`] if the file cannot be read, otherwise as
/// [`decode_texture`].
pub fn load_texture_file(path: &Path, role: TextureRole) -> AssetResult<TextureImage> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_texture(path, &bytes, role)
}

/// Display name for an asset: the file stem, or the whole path.
#[must_use]
pub fn asset_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}
