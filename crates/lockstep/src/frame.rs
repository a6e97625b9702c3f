//! # Frame Scene View
//!
//! One frame's worth of render-ready scene data. The engine keeps one per
//! frame-buffer slot in a [`lockstep_core::FrameRing`]; the update thread
//! fills a slot, the render thread consumes it.
//!
//! Camera and light blocks are `Pod` so a renderer can copy them straight
//! into uniform buffers.

use bytemuck::{Pod, Zeroable};
use lockstep_assets::ModelId;

use crate::math::{self, Mat4, IDENTITY};

/// Camera constants for one frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraData {
    /// World → view.
    pub view: Mat4,
    /// View → clip.
    pub proj: Mat4,
    /// World → clip.
    pub view_proj: Mat4,
    /// World-space eye position (w = 1).
    pub position: [f32; 4],
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: IDENTITY,
            proj: IDENTITY,
            view_proj: IDENTITY,
            position: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl CameraData {
    /// Builds the matrices for a camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(eye: [f32; 3], target: [f32; 3], fov_y_degrees: f32, aspect: f32) -> Self {
        let view = math::look_at(eye, target, [0.0, 1.0, 0.0]);
        let proj = math::perspective(fov_y_degrees.to_radians(), aspect, 0.1, 1000.0);
        Self {
            view,
            proj,
            view_proj: math::mul(&proj, &view),
            position: [eye[0], eye[1], eye[2], 1.0],
        }
    }
}

/// One light.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightData {
    /// Position (w = 1) for point lights, direction (w = 0) for directional.
    pub position_or_direction: [f32; 4],
    /// Linear RGB color in xyz, intensity in w.
    pub color_intensity: [f32; 4],
}

/// Draw one model with a world transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshRenderCommand {
    /// Model to draw.
    pub model_id: ModelId,
    /// Object → world.
    pub world_transform: Mat4,
}

/// Render-ready snapshot of the scene.
#[derive(Clone, Debug, Default)]
pub struct FrameSceneView {
    /// Update tick that produced the snapshot.
    pub frame_number: u64,
    /// Camera constants.
    pub camera: CameraData,
    /// Lights in the scene.
    pub lights: Vec<LightData>,
    /// Draw commands, in submission order.
    pub mesh_commands: Vec<MeshRenderCommand>,
}

impl FrameSceneView {
    /// Resets the snapshot for reuse, keeping allocations.
    pub fn clear(&mut self) {
        self.frame_number = 0;
        self.camera = CameraData::default();
        self.lights.clear();
        self.mesh_commands.clear();
    }

    /// Camera block as raw bytes.
    #[must_use]
    pub fn camera_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.camera)
    }

    /// Light array as raw bytes.
    #[must_use]
    pub fn light_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.lights)
    }

    /// Number of draw commands.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.mesh_commands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes() {
        assert_eq!(std::mem::size_of::<CameraData>(), 3 * 64 + 16);
        assert_eq!(std::mem::size_of::<LightData>(), 32);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut view = FrameSceneView {
            frame_number: 7,
            lights: vec![LightData::default(); 4],
            mesh_commands: vec![
                MeshRenderCommand {
                    model_id: ModelId(1),
                    world_transform: IDENTITY,
                };
                16
            ],
            ..Default::default()
        };
        view.clear();

        assert_eq!(view.frame_number, 0);
        assert_eq!(view.draw_count(), 0);
        assert!(view.mesh_commands.capacity() >= 16);
        assert!(view.light_bytes().is_empty());
        assert_eq!(view.camera_bytes().len(), std::mem::size_of::<CameraData>());
    }
}
