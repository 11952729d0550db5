//! Minimal triangle mesh for the water surface.
//!
//! Heights live on the Z axis: the plane is laid out in XY and its top face
//! points toward +Z.

use bevy::math::Vec3;

use crate::buffer::BufferError;

#[derive(Debug, Clone, PartialEq)]
pub struct WaterMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Triangle list, counter-clockwise when seen from the normal side.
    pub indices: Vec<u32>,
}

impl WaterMesh {
    pub fn new(vertices: Vec<Vec3>, normals: Vec<Vec3>, indices: Vec<u32>) -> Result<Self, BufferError> {
        if normals.len() != vertices.len() {
            return Err(BufferError::LengthMismatch {
                label: "mesh normals",
                expected: vertices.len(),
                actual: normals.len(),
            });
        }
        Ok(Self {
            vertices,
            normals,
            indices,
        })
    }

    /// Number of vertices [`WaterMesh::plane`] builds; indices must stay within `u32`.
    pub fn plane_vertex_count(subdivisions: u32, double_sided: bool) -> u64 {
        let side = u64::from(subdivisions.max(1)) + 1;
        let sides = if double_sided { 2 } else { 1 };
        side * side * sides
    }

    /// Square grid of `size` units with `subdivisions` quads per side, centred on the origin.
    ///
    /// With `double_sided` a second, downward-facing copy of the grid is
    /// appended so the surface stays visible from below.
    pub fn plane(size: f32, subdivisions: u32, double_sided: bool) -> Self {
        let cells = subdivisions.max(1);
        let side = cells + 1;
        let step = size / cells as f32;
        let half = size / 2.0;

        let mut vertices = Vec::with_capacity(side as usize * side as usize);
        for row in 0..side {
            for col in 0..side {
                vertices.push(Vec3::new(
                    -half + col as f32 * step,
                    -half + row as f32 * step,
                    0.0,
                ));
            }
        }

        let mut indices = Vec::with_capacity(cells as usize * cells as usize * 6);
        for row in 0..cells {
            for col in 0..cells {
                let v00 = row * side + col;
                let v10 = v00 + 1;
                let v01 = v00 + side;
                let v11 = v01 + 1;
                indices.extend_from_slice(&[v00, v10, v11, v00, v11, v01]);
            }
        }

        let mut normals = vec![Vec3::Z; vertices.len()];

        if double_sided {
            let offset = vertices.len() as u32;
            vertices.extend_from_within(..);
            normals.extend(std::iter::repeat_n(Vec3::NEG_Z, offset as usize));
            let bottom: Vec<u32> = indices
                .chunks_exact(3)
                .flat_map(|tri| [tri[0] + offset, tri[2] + offset, tri[1] + offset])
                .collect();
            indices.extend(bottom);
        }

        Self {
            vertices,
            normals,
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Rebuilds vertex normals from the triangles, weighting each face by its area.
    ///
    /// Triangles referencing missing vertices are skipped.
    pub fn recalculate_normals(&mut self) {
        let mut accumulated = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let (Some(&pa), Some(&pb), Some(&pc)) =
                (self.vertices.get(a), self.vertices.get(b), self.vertices.get(c))
            else {
                continue;
            };

            let face = (pb - pa).cross(pc - pa);
            accumulated[a] += face;
            accumulated[b] += face;
            accumulated[c] += face;
        }

        self.normals = accumulated
            .into_iter()
            .map(Vec3::normalize_or_zero)
            .collect();
    }

    /// Lowest and highest Z over all vertices.
    pub fn height_range(&self) -> Option<(f32, f32)> {
        self.vertices.iter().fold(None, |range, v| match range {
            None => Some((v.z, v.z)),
            Some((low, high)) => Some((low.min(v.z), high.max(v.z))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_layout() {
        let mesh = WaterMesh::plane(2.0, 2, false);
        assert_eq!(mesh.vertex_count(), 9);
        assert_eq!(mesh.triangle_count(), 8);
        assert_eq!(mesh.vertices[0], Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(mesh.vertices[8], Vec3::new(1.0, 1.0, 0.0));
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Z));
    }

    #[test]
    fn test_double_sided_plane() {
        let mesh = WaterMesh::plane(1.0, 3, true);
        assert_eq!(mesh.vertex_count(), 32);
        assert_eq!(mesh.triangle_count(), 36);
        assert_eq!(mesh.normals.iter().filter(|n| n.z < 0.0).count(), 16);
    }

    #[test]
    fn test_recalculated_normals_match_winding() {
        let mut mesh = WaterMesh::plane(4.0, 4, true);
        let before = mesh.normals.clone();
        mesh.recalculate_normals();

        for (after, before) in mesh.normals.iter().zip(&before) {
            assert!(after.abs_diff_eq(*before, 1e-6), "{after:?} != {before:?}");
        }
    }

    #[test]
    fn test_recalculated_normals_follow_slope() {
        let mut mesh = WaterMesh::plane(2.0, 1, false);
        for v in &mut mesh.vertices {
            v.z = v.x;
        }
        mesh.recalculate_normals();

        let expected = Vec3::new(-1.0, 0.0, 1.0).normalize();
        for n in &mesh.normals {
            assert!(n.abs_diff_eq(expected, 1e-5), "{n:?}");
        }
    }

    #[test]
    fn test_new_rejects_mismatched_normals() {
        let err = WaterMesh::new(vec![Vec3::ZERO; 3], vec![Vec3::Z; 2], vec![0, 1, 2]).unwrap_err();
        assert_eq!(
            err,
            BufferError::LengthMismatch {
                label: "mesh normals",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_plane_vertex_count_matches_plane() {
        for (subdivisions, double_sided) in [(1, false), (3, true), (8, false), (0, true)] {
            let mesh = WaterMesh::plane(2.0, subdivisions, double_sided);
            assert_eq!(
                WaterMesh::plane_vertex_count(subdivisions, double_sided),
                mesh.vertex_count() as u64
            );
        }
        assert!(WaterMesh::plane_vertex_count(u16::MAX as u32, false) > u32::MAX as u64);
    }

    #[test]
    fn test_height_range() {
        let mut mesh = WaterMesh::plane(1.0, 1, false);
        assert_eq!(mesh.height_range(), Some((0.0, 0.0)));
        mesh.vertices[1].z = 0.5;
        mesh.vertices[2].z = -0.25;
        assert_eq!(mesh.height_range(), Some((-0.25, 0.5)));

        let empty = WaterMesh::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
        assert_eq!(empty.height_range(), None);
    }
}
