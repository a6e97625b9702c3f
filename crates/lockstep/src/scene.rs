//! # Scene Collaborator
//!
//! A [`Scene`] tells the engine what to load, receives the resolved
//! identifiers, and fills a [`FrameSceneView`] every tick. It lives on the
//! update thread.
//!
//! [`LevelScene`] is a data-driven scene read from a TOML level file:
//!
//! ```toml
//! name = "yard"
//!
//! [camera]
//! eye = [0.0, 3.0, 10.0]
//! target = [0.0, 0.0, 0.0]
//!
//! [[lights]]
//! position = [0.0, 10.0, 0.0]
//! color = [1.0, 0.9, 0.8]
//! intensity = 20.0
//!
//! [[objects]]
//! name = "crate_a"
//! model = "models/crate.obj"
//! position = [-2.0, 0.0, 0.0]
//! spin_degrees_per_second = 45.0
//!
//! [[materials]]
//! name = "ground"
//! textures = { diffuse = "textures/ground.png", normal = "textures/ground_n.png" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use lockstep_assets::{LoadOutcome, MaterialId, ModelId, OwnerId, TextureRole};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::frame::{CameraData, FrameSceneView, LightData, MeshRenderCommand};
use crate::math;

/// One model request of a level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPlan {
    /// Game object the model is for.
    pub owner: OwnerId,
    /// Model file.
    pub path: PathBuf,
    /// Display name.
    pub name: String,
}

/// One standalone material of a level and its texture files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialPlan {
    /// Material name.
    pub name: String,
    /// Texture file per role.
    pub textures: Vec<(TextureRole, PathBuf)>,
}

/// Everything a level wants loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadPlan {
    /// Model requests, one per game object.
    pub models: Vec<ModelPlan>,
    /// Standalone materials.
    pub materials: Vec<MaterialPlan>,
}

impl LoadPlan {
    /// Whether nothing needs loading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.materials.is_empty()
    }
}

/// Results of a level load, handed back to the scene.
#[derive(Clone, Debug, Default)]
pub struct LoadedAssets {
    /// Resolved model per owner. Owners whose load was abandoned at shutdown
    /// are missing.
    pub models: HashMap<OwnerId, LoadOutcome<ModelId>>,
    /// Created materials by name.
    pub materials: HashMap<String, MaterialId>,
    /// Loads that resolved to a fallback.
    pub fallbacks: usize,
}

/// Scene collaborator driven by the update thread.
pub trait Scene: Send {
    /// Scene name for logs.
    fn name(&self) -> &str;

    /// What to load when the level starts. Called once, in `Initializing`.
    fn load_plan(&mut self) -> LoadPlan;

    /// Resolved identifiers. Called once, on entering `Simulating`.
    fn on_load_complete(&mut self, assets: LoadedAssets);

    /// Advances simulation by `dt` seconds. Called every `Simulating` tick.
    fn update(&mut self, dt: f32);

    /// Fills `view` (already cleared) from the current scene state.
    fn write_scene_view(&self, view: &mut FrameSceneView);

    /// Releases scene state. Called once when the update thread exits.
    fn unload(&mut self);
}

// =============================================================================
// Level file schema
// =============================================================================

/// Camera section of a level file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraDesc {
    /// Eye position.
    pub eye: [f32; 3],
    /// Look-at target.
    pub target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Width / height.
    pub aspect: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            eye: [0.0, 2.0, 8.0],
            target: [0.0; 3],
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
        }
    }
}

/// Light entry of a level file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightDesc {
    /// Position, or direction when `directional`.
    pub position: [f32; 3],
    /// Treat `position` as a direction.
    pub directional: bool,
    /// Linear RGB color.
    pub color: [f32; 3],
    /// Intensity multiplier.
    pub intensity: f32,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            position: [0.0, 10.0, 0.0],
            directional: false,
            color: [1.0; 3],
            intensity: 1.0,
        }
    }
}

/// Game object entry of a level file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDesc {
    /// Object name.
    pub name: String,
    /// Model file, relative to the level file.
    pub model: PathBuf,
    /// World position.
    #[serde(default)]
    pub position: [f32; 3],
    /// Initial rotation about Y.
    #[serde(default)]
    pub yaw_degrees: f32,
    /// Scale.
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
    /// Constant spin about Y.
    #[serde(default)]
    pub spin_degrees_per_second: f32,
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

/// Material entry of a level file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialDesc {
    /// Material name.
    pub name: String,
    /// Texture file per role name (`diffuse`, `normal`, ...).
    #[serde(default)]
    pub textures: BTreeMap<String, PathBuf>,
}

/// A whole level file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelDesc {
    /// Level name.
    pub name: String,
    /// Camera.
    pub camera: CameraDesc,
    /// Lights.
    pub lights: Vec<LightDesc>,
    /// Game objects.
    pub objects: Vec<ObjectDesc>,
    /// Standalone materials.
    pub materials: Vec<MaterialDesc>,
}

// =============================================================================
// LevelScene
// =============================================================================

struct SceneObject {
    owner: OwnerId,
    desc: ObjectDesc,
    model: ModelId,
    yaw_radians: f32,
}

/// Data-driven scene built from a [`LevelDesc`].
pub struct LevelScene {
    name: String,
    base_dir: PathBuf,
    camera: CameraData,
    lights: Vec<LightData>,
    objects: Vec<SceneObject>,
    materials: Vec<MaterialPlan>,
    material_ids: HashMap<String, MaterialId>,
    elapsed: f32,
    loaded: bool,
}

impl LevelScene {
    /// Builds a scene; relative paths resolve against `base_dir`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for an unknown texture role name.
    pub fn new(desc: LevelDesc, base_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let base_dir = base_dir.into();

        let materials = desc
            .materials
            .iter()
            .map(|material| -> EngineResult<MaterialPlan> {
                let textures = material
                    .textures
                    .iter()
                    .map(|(role, path)| {
                        TextureRole::from_name(role)
                            .map(|role| (role, base_dir.join(path)))
                            .ok_or_else(|| {
                                EngineError::Config(format!(
                                    "material '{}': unknown texture role '{role}'",
                                    material.name
                                ))
                            })
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(MaterialPlan {
                    name: material.name.clone(),
                    textures,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let lights = desc
            .lights
            .iter()
            .map(|light| {
                let w = if light.directional { 0.0 } else { 1.0 };
                LightData {
                    position_or_direction: [light.position[0], light.position[1], light.position[2], w],
                    color_intensity: [light.color[0], light.color[1], light.color[2], light.intensity],
                }
            })
            .collect();

        let objects = desc
            .objects
            .into_iter()
            .enumerate()
            .map(|(index, object)| SceneObject {
                owner: OwnerId(index as u64),
                yaw_radians: object.yaw_degrees.to_radians(),
                desc: object,
                model: ModelId::INVALID,
            })
            .collect();

        let camera = CameraData::look_at(
            desc.camera.eye,
            desc.camera.target,
            desc.camera.fov_y_degrees,
            desc.camera.aspect,
        );

        Ok(Self {
            name: if desc.name.is_empty() { "level".into() } else { desc.name },
            base_dir,
            camera,
            lights,
            objects,
            materials,
            material_ids: HashMap::new(),
            elapsed: 0.0,
            loaded: false,
        })
    }

    /// Parses a level document.
    ///
    /// # Errors
    ///
    /// [`EngineError::Toml`] for malformed input, otherwise as
    /// [`LevelScene::new`].
    pub fn from_toml_str(text: &str, base_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let desc: LevelDesc = toml::from_str(text)?;
        Self::new(desc, base_dir)
    }

    /// Reads a level file; relative paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// As [`LevelScene::from_toml_str`], plus [`EngineError::Io`].
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&text, base_dir)
    }

    /// An empty level: nothing to load, nothing to draw.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            name: "empty".into(),
            base_dir: PathBuf::new(),
            camera: CameraData::default(),
            lights: Vec::new(),
            objects: Vec::new(),
            materials: Vec::new(),
            material_ids: HashMap::new(),
            elapsed: 0.0,
            loaded: false,
        }
    }

    /// Whether [`Scene::on_load_complete`] has run.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Seconds simulated so far.
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Model resolved for object `name`, if any.
    #[must_use]
    pub fn model_of(&self, name: &str) -> Option<ModelId> {
        self.objects
            .iter()
            .find(|object| object.desc.name == name)
            .map(|object| object.model)
            .filter(|model| model.is_valid())
    }

    /// Material created for `name`, if any.
    #[must_use]
    pub fn material(&self, name: &str) -> Option<MaterialId> {
        self.material_ids.get(name).copied()
    }
}

impl Scene for LevelScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_plan(&mut self) -> LoadPlan {
        LoadPlan {
            models: self
                .objects
                .iter()
                .map(|object| ModelPlan {
                    owner: object.owner,
                    path: self.base_dir.join(&object.desc.model),
                    name: object.desc.name.clone(),
                })
                .collect(),
            materials: self.materials.clone(),
        }
    }

    fn on_load_complete(&mut self, assets: LoadedAssets) {
        for object in &mut self.objects {
            object.model = assets
                .models
                .get(&object.owner)
                .map_or(ModelId::INVALID, |outcome| outcome.id);
        }
        self.material_ids = assets.materials;
        self.loaded = true;
        tracing::info!(
            scene = %self.name,
            objects = self.objects.len(),
            fallbacks = assets.fallbacks,
            "scene loaded"
        );
    }

    fn update(&mut self, dt: f32) {
        self.elapsed += dt;
        for object in &mut self.objects {
            object.yaw_radians += object.desc.spin_degrees_per_second.to_radians() * dt;
        }
    }

    fn write_scene_view(&self, view: &mut FrameSceneView) {
        view.camera = self.camera;
        view.lights.extend_from_slice(&self.lights);
        view.mesh_commands.extend(
            self.objects
                .iter()
                .filter(|object| object.model.is_valid())
                .map(|object| MeshRenderCommand {
                    model_id: object.model,
                    world_transform: math::transform(
                        object.desc.position,
                        object.yaw_radians,
                        object.desc.scale,
                    ),
                }),
        );
    }

    fn unload(&mut self) {
        for object in &mut self.objects {
            object.model = ModelId::INVALID;
        }
        self.material_ids.clear();
        self.loaded = false;
        tracing::info!(scene = %self.name, "scene unloaded");
    }
}
