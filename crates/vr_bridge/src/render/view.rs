//! Per-eye view and projection construction
//!
//! The runtime tracks in meters with Y up and -Z forward; the engine's world
//! is Z up with +X forward and measured in its own units. Every frame, for
//! each eye, the pipeline:
//!
//! 1. fetches the eye's projection and converts it to column-major,
//! 2. inverts the scaled eye-to-head offset,
//! 3. inverts the scaled head pose,
//! 4. composes eye⁻¹ · head⁻¹ · axis remap · player translation.
//!
//! A [`ViewFrame`] lives for exactly one eye of one frame.

use std::fmt;

use thiserror::Error;

use crate::config::VrSettings;
use crate::foundation::math::{
    self, constants::DEG_TO_RAD, Mat4, Mat4Ext, RowMajor34, Vec3,
};
use crate::runtime::{Eye, VrSystem};

/// Near clip distance in world units
pub const NEAR_CLIP: f32 = 4.0;

/// Height of the tracked floor origin below the player's origin (bottom of
/// the player collision hull), in world units
pub const PLAYER_HULL_OFFSET: f32 = 24.0;

/// Which inversion failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    /// Eye-to-head offset
    EyeOffset,
    /// Head pose
    HeadPose,
}

impl fmt::Display for TransformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EyeOffset => f.write_str("eye offset"),
            Self::HeadPose => f.write_str("head pose"),
        }
    }
}

/// View construction errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewError {
    /// A transform had a zero determinant; the eye is skipped this frame
    #[error("Singular {stage} transform for {eye} eye")]
    SingularTransform {
        /// Eye being built
        eye: Eye,
        /// Failing stage
        stage: TransformStage,
    },
}

/// Inputs that vary per frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    /// World units per tracking meter
    pub world_scale: f32,
    /// Far clip distance
    pub far_clip: f32,
    /// Play-space yaw correction in degrees
    pub yaw_offset: f32,
    /// Player origin in world space
    pub player_origin: Vec3,
}

impl ViewParams {
    /// Read the current settings
    pub fn from_settings(settings: &VrSettings, yaw_offset: f32, player_origin: Vec3) -> Self {
        Self {
            world_scale: settings.world_scale,
            far_clip: settings.far_clip,
            yaw_offset,
            player_origin,
        }
    }
}

/// Matrices for one eye of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewFrame {
    /// Projection, column-major
    pub projection: Mat4,
    /// Scaled eye-to-head offset (before inversion)
    pub eye_to_head: Mat4,
    /// Scaled head pose (before inversion)
    pub head_to_world: Mat4,
    /// Composed world-to-eye view
    pub view: Mat4,
}

impl ViewFrame {
    /// Projection as a column-major float array, ready for a matrix load
    pub fn projection_gl(&self) -> [f32; 16] {
        math::to_column_major(&self.projection)
    }

    /// View as a column-major float array, ready for a matrix load
    pub fn view_gl(&self) -> [f32; 16] {
        math::to_column_major(&self.view)
    }
}

/// Rotation taking engine world axes to runtime tracking axes, with the
/// play-space yaw correction folded into the first rotation.
pub fn axis_remap(yaw_offset: f32) -> Mat4 {
    Mat4::rotation_y((-90.0 - yaw_offset) * DEG_TO_RAD)
        * Mat4::rotation_x(90.0 * DEG_TO_RAD)
        * Mat4::rotation_y(180.0 * DEG_TO_RAD)
}

/// Builds [`ViewFrame`]s
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPipeline {
    /// Near clip distance
    pub near_clip: f32,
    /// Vertical offset added after removing the player origin
    pub hull_offset: f32,
}

impl Default for ViewPipeline {
    fn default() -> Self {
        Self { near_clip: NEAR_CLIP, hull_offset: PLAYER_HULL_OFFSET }
    }
}

impl ViewPipeline {
    /// Build projection and view for `eye`
    pub fn build_eye_transforms(
        &self,
        system: &dyn VrSystem,
        head_pose: &RowMajor34,
        eye: Eye,
        params: &ViewParams,
    ) -> Result<ViewFrame, ViewError> {
        let projection =
            math::from_row_major(&system.projection_matrix(eye, self.near_clip, params.far_clip));

        let eye_to_head = math::scale_translation(
            math::extend_affine(&system.eye_to_head_transform(eye)),
            params.world_scale,
        );
        let head_to_eye = math::invert(&eye_to_head)
            .ok_or(ViewError::SingularTransform { eye, stage: TransformStage::EyeOffset })?;

        let head_to_world =
            math::scale_translation(math::extend_affine(head_pose), params.world_scale);
        let world_to_head = math::invert(&head_to_world)
            .ok_or(ViewError::SingularTransform { eye, stage: TransformStage::HeadPose })?;

        let view = head_to_eye * world_to_head * self.world_alignment(params);

        Ok(ViewFrame { projection, eye_to_head, head_to_world, view })
    }

    /// Axis remap followed by the player translation
    pub fn world_alignment(&self, params: &ViewParams) -> Mat4 {
        let offset = -params.player_origin + Vec3::new(0.0, 0.0, self.hull_offset);
        axis_remap(params.yaw_offset) * Mat4::translation(offset)
    }
}
