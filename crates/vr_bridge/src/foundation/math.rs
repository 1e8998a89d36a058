//! Math utilities and types
//!
//! Fixed-size 4x4 transform helpers used by the per-eye view pipeline. All
//! matrices are `nalgebra` values living on the stack; nothing here allocates.
//!
//! The VR runtime hands matrices over in its own row-major layout, either as a
//! full 4x4 (projection) or as a 3x4 affine (rotation + translation, no
//! projective row). The helpers below convert those into column-major
//! [`Mat4`] values that can be loaded straight into the rendering API.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type (column-major storage)
pub type Mat4 = Matrix4<f32>;

/// Row-major 3x4 affine transform as delivered by the VR runtime
pub type RowMajor34 = [[f32; 4]; 3];

/// Row-major 4x4 matrix as delivered by the VR runtime
pub type RowMajor44 = [[f32; 4]; 4];

/// Identity in the runtime's 3x4 affine layout
pub const IDENTITY_34: RowMajor34 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
];

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Transpose a 4x4 matrix.
pub fn transpose(m: &Mat4) -> Mat4 {
    let mut out = Mat4::zeros();
    for row in 0..4 {
        for col in 0..4 {
            out[(col, row)] = m[(row, col)];
        }
    }
    out
}

/// General 4x4 inverse by cofactor expansion (adjugate over determinant).
///
/// Returns `None` when the determinant is exactly zero or not finite; the
/// caller decides what a singular transform means for it.
#[allow(clippy::float_cmp)]
pub fn invert(matrix: &Mat4) -> Option<Mat4> {
    let m = matrix.as_slice();
    let mut inv = [0.0_f32; 16];

    inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
        + m[9] * m[7] * m[14] + m[13] * m[6] * m[11] - m[13] * m[7] * m[10];
    inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
        - m[8] * m[7] * m[14] - m[12] * m[6] * m[11] + m[12] * m[7] * m[10];
    inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
        + m[8] * m[7] * m[13] + m[12] * m[5] * m[11] - m[12] * m[7] * m[9];
    inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
        - m[8] * m[6] * m[13] - m[12] * m[5] * m[10] + m[12] * m[6] * m[9];

    inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
        - m[9] * m[3] * m[14] - m[13] * m[2] * m[11] + m[13] * m[3] * m[10];
    inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
        + m[8] * m[3] * m[14] + m[12] * m[2] * m[11] - m[12] * m[3] * m[10];
    inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
        - m[8] * m[3] * m[13] - m[12] * m[1] * m[11] + m[12] * m[3] * m[9];
    inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
        + m[8] * m[2] * m[13] + m[12] * m[1] * m[10] - m[12] * m[2] * m[9];

    inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
        + m[5] * m[3] * m[14] + m[13] * m[2] * m[7] - m[13] * m[3] * m[6];
    inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
        - m[4] * m[3] * m[14] - m[12] * m[2] * m[7] + m[12] * m[3] * m[6];
    inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
        + m[4] * m[3] * m[13] + m[12] * m[1] * m[7] - m[12] * m[3] * m[5];
    inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
        - m[4] * m[2] * m[13] - m[12] * m[1] * m[6] + m[12] * m[2] * m[5];

    inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
        - m[5] * m[3] * m[10] - m[9] * m[2] * m[7] + m[9] * m[3] * m[6];
    inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
        + m[4] * m[3] * m[10] + m[8] * m[2] * m[7] - m[8] * m[3] * m[6];
    inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
        - m[4] * m[3] * m[9] - m[8] * m[1] * m[7] + m[8] * m[3] * m[5];
    inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
        + m[4] * m[2] * m[9] + m[8] * m[1] * m[6] - m[8] * m[2] * m[5];

    let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
    if det == 0.0 || !det.is_finite() {
        return None;
    }

    let inv_det = 1.0 / det;
    for value in &mut inv {
        *value *= inv_det;
    }

    Some(Mat4::from_column_slice(&inv))
}

/// Convert a runtime row-major 4x4 into a column-major [`Mat4`].
///
/// Read as column-major memory the runtime's rows come out as columns, so
/// the stored matrix is the transpose of the intended one; transposing it
/// back yields the matrix the rendering API expects.
pub fn from_row_major(raw: &RowMajor44) -> Mat4 {
    let mut flat = [0.0_f32; 16];
    for (row, values) in raw.iter().enumerate() {
        flat[row * 4..row * 4 + 4].copy_from_slice(values);
    }
    transpose(&Mat4::from_column_slice(&flat))
}

/// Extend a runtime 3x4 affine to 4x4 by appending the unit row `(0, 0, 0, 1)`.
pub fn extend_affine(raw: &RowMajor34) -> Mat4 {
    Mat4::new(
        raw[0][0], raw[0][1], raw[0][2], raw[0][3],
        raw[1][0], raw[1][1], raw[1][2], raw[1][3],
        raw[2][0], raw[2][1], raw[2][2], raw[2][3],
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Scale the translation column of an affine transform, leaving rotation untouched.
pub fn scale_translation(mut m: Mat4, scale: f32) -> Mat4 {
    m[(0, 3)] *= scale;
    m[(1, 3)] *= scale;
    m[(2, 3)] *= scale;
    m
}

/// Flatten into the column-major float layout expected by GL matrix loads.
pub fn to_column_major(m: &Mat4) -> [f32; 16] {
    let mut out = [0.0_f32; 16];
    out.copy_from_slice(m.as_slice());
    out
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a rotation matrix around the X axis
    fn rotation_x(angle: f32) -> Mat4;

    /// Create a rotation matrix around the Y axis
    fn rotation_y(angle: f32) -> Mat4;

    /// Create a translation matrix
    fn translation(offset: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn rotation_x(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::x_axis(), angle)
    }

    fn rotation_y(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), angle)
    }

    fn translation(offset: Vec3) -> Mat4 {
        Mat4::new_translation(&offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    fn sample_matrices() -> Vec<Mat4> {
        vec![
            Mat4::identity(),
            Mat4::new(
                2.0, 0.5, -1.0, 3.0,
                0.0, 1.5, 0.25, -2.0,
                1.0, -0.5, 4.0, 0.75,
                0.0, 0.0, 0.0, 1.0,
            ),
            Mat4::new(
                1.0, 2.0, 3.0, 4.0,
                0.0, 1.0, 4.0, 2.0,
                5.0, 6.0, 0.0, 1.0,
                2.0, 0.0, 1.0, 3.0,
            ),
            Mat4::rotation_y(0.7) * Mat4::translation(Vec3::new(12.0, -3.0, 40.0)),
        ]
    }

    #[test]
    fn test_transpose_is_involution() {
        for m in sample_matrices() {
            assert_eq!(transpose(&transpose(&m)), m);
        }
    }

    #[test]
    fn test_transpose_swaps_indices() {
        let m = sample_matrices()[2];
        let t = transpose(&m);
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(t[(row, col)], m[(col, row)]);
            }
        }
    }

    #[test]
    fn test_invert_matches_identity_product() {
        for m in sample_matrices() {
            let inv = invert(&m).expect("sample matrices are invertible");
            assert_relative_eq!(m * inv, Mat4::identity(), epsilon = EPSILON);
        }
    }

    #[test]
    fn test_double_inversion_round_trips() {
        for m in sample_matrices() {
            let inv = invert(&m).expect("invertible");
            let back = invert(&inv).expect("inverse of inverse");
            assert_relative_eq!(back, m, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_singular_matrices_report_failure() {
        assert!(invert(&Mat4::zeros()).is_none());

        // Two identical rows
        let degenerate = Mat4::new(
            1.0, 2.0, 3.0, 4.0,
            1.0, 2.0, 3.0, 4.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        assert!(invert(&degenerate).is_none());
    }

    #[test]
    fn test_from_row_major_keeps_semantics() {
        let raw: RowMajor44 = [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [13.0, 14.0, 15.0, 16.0],
        ];
        let m = from_row_major(&raw);
        assert_eq!(m[(0, 3)], 4.0);
        assert_eq!(m[(3, 0)], 13.0);
        assert_eq!(m[(1, 2)], 7.0);

        // Column-major upload order walks down columns
        let flat = to_column_major(&m);
        assert_eq!(&flat[0..4], &[1.0, 5.0, 9.0, 13.0]);
    }

    #[test]
    fn test_extend_affine_appends_unit_row() {
        let raw: RowMajor34 = [
            [0.0, -1.0, 0.0, 0.1],
            [1.0, 0.0, 0.0, 1.6],
            [0.0, 0.0, 1.0, -0.2],
        ];
        let m = extend_affine(&raw);
        assert_eq!(m.row(3).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(m[(1, 3)], 1.6);
        assert_eq!(extend_affine(&IDENTITY_34), Mat4::identity());
    }

    #[test]
    fn test_scale_translation_leaves_rotation() {
        let m = Mat4::rotation_x(0.3) * Mat4::translation(Vec3::new(1.0, 2.0, 3.0));
        let scaled = scale_translation(m, 10.0);
        assert_relative_eq!(
            scaled.fixed_view::<3, 3>(0, 0).into_owned(),
            m.fixed_view::<3, 3>(0, 0).into_owned(),
            epsilon = EPSILON
        );
        assert_relative_eq!(scaled[(0, 3)], m[(0, 3)] * 10.0, epsilon = EPSILON);
        assert_relative_eq!(scaled[(2, 3)], m[(2, 3)] * 10.0, epsilon = EPSILON);
    }
}
