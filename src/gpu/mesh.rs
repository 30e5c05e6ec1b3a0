use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const fn new(pos: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position: pos,
            normal,
        }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12, // [f32; 3] is 12 bytes
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Vertex layout for the position-only bounding-box proxy buffer.
pub fn proxy_vertex_desc<'a>() -> wgpu::VertexBufferLayout<'a> {
    wgpu::VertexBufferLayout {
        array_stride: (std::mem::size_of::<f32>() * 3) as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

/// Axis-aligned bounding box for a mesh.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Compute bounding box from a set of vertices.
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        if vertices.is_empty() {
            return Self::default();
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];

        for v in vertices {
            for i in 0..3 {
                min[i] = min[i].min(v.position[i]);
                max[i] = max[i].max(v.position[i]);
            }
        }

        Self { min, max }
    }

    /// Get the center of the bounding box.
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    /// Get the dimensions of the bounding box.
    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Create a UV sphere centered at origin.
///
/// `stacks` latitude rings by `slices` longitude segments, indexed triangles,
/// outward unit normals.
pub fn create_sphere_geometry(radius: f32, stacks: u32, slices: u32) -> (Vec<Vertex>, Vec<u16>) {
    let mut vertices = Vec::with_capacity(((stacks + 1) * (slices + 1)) as usize);
    let mut indices = Vec::with_capacity((stacks * slices * 6) as usize);

    for stack in 0..=stacks {
        let theta = std::f32::consts::PI * (stack as f32) / (stacks as f32);
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        for slice in 0..=slices {
            let phi = 2.0 * std::f32::consts::PI * (slice as f32) / (slices as f32);
            let sin_phi = phi.sin();
            let cos_phi = phi.cos();

            let normal = [cos_phi * sin_theta, cos_theta, sin_phi * sin_theta];
            let position = [normal[0] * radius, normal[1] * radius, normal[2] * radius];

            vertices.push(Vertex::new(position, normal));
        }
    }

    for stack in 0..stacks {
        for slice in 0..slices {
            let first = (stack * (slices + 1) + slice) as u16;
            let second = first + slices as u16 + 1;

            // Two triangles per quad.
            indices.push(first);
            indices.push(second);
            indices.push(first + 1);

            indices.push(second);
            indices.push(second + 1);
            indices.push(first + 1);
        }
    }

    (vertices, indices)
}

/// Expand a bounding box into the 36 triangle-list positions of its six
/// faces. This is the proxy geometry drawn inside each occlusion query.
pub fn bounding_box_positions(bounds: &BoundingBox) -> Vec<[f32; 3]> {
    let [x0, y0, z0] = bounds.min;
    let [x1, y1, z1] = bounds.max;

    // f/b = front (max Z) / back, b/t = bottom/top, l/r = left/right.
    let fbl = [x0, y0, z1];
    let fbr = [x1, y0, z1];
    let ftl = [x0, y1, z1];
    let ftr = [x1, y1, z1];
    let bbl = [x0, y0, z0];
    let bbr = [x1, y0, z0];
    let btl = [x0, y1, z0];
    let btr = [x1, y1, z0];

    vec![
        // front
        fbl, fbr, ftl, ftl, fbr, ftr,
        // right
        fbr, bbr, ftr, ftr, bbr, btr,
        // back
        bbr, bbl, btr, btr, bbl, btl,
        // left
        bbl, fbl, btl, btl, fbl, ftl,
        // top
        ftl, ftr, btl, btl, ftr, btr,
        // bottom
        bbl, bbr, fbl, fbl, bbr, fbr,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_counts() {
        let (vertices, indices) = create_sphere_geometry(20.0, 16, 16);
        assert_eq!(vertices.len(), 17 * 17);
        assert_eq!(indices.len(), 16 * 16 * 6);
        // Index buffer must reference valid vertices.
        let max = *indices.iter().max().unwrap() as usize;
        assert!(max < vertices.len());
    }

    #[test]
    fn test_sphere_normals_are_unit() {
        let (vertices, _) = create_sphere_geometry(20.0, 8, 8);
        for v in &vertices {
            let len = (v.normal[0].powi(2) + v.normal[1].powi(2) + v.normal[2].powi(2)).sqrt();
            assert!((len - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sphere_bounds_match_radius() {
        let (vertices, _) = create_sphere_geometry(20.0, 16, 16);
        let bounds = BoundingBox::from_vertices(&vertices);
        for axis in 0..3 {
            assert!((bounds.min[axis] + 20.0).abs() < 1e-3);
            assert!((bounds.max[axis] - 20.0).abs() < 1e-3);
        }
        assert_eq!(bounds.size(), [40.0, 40.0, 40.0]);
        assert_eq!(bounds.center(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_proxy_positions_are_box_corners() {
        let bounds = BoundingBox {
            min: [-1.0, -2.0, -3.0],
            max: [1.0, 2.0, 3.0],
        };
        let positions = bounding_box_positions(&bounds);
        assert_eq!(positions.len(), 36);

        // Every vertex lies on a corner of the box.
        for p in &positions {
            for axis in 0..3 {
                assert!(p[axis] == bounds.min[axis] || p[axis] == bounds.max[axis]);
            }
        }

        // All eight corners appear.
        for corner in 0..8u32 {
            let expected = [
                if corner & 1 == 0 { bounds.min[0] } else { bounds.max[0] },
                if corner & 2 == 0 { bounds.min[1] } else { bounds.max[1] },
                if corner & 4 == 0 { bounds.min[2] } else { bounds.max[2] },
            ];
            assert!(positions.contains(&expected));
        }
    }

    #[test]
    fn test_empty_bounds() {
        let bounds = BoundingBox::from_vertices(&[]);
        assert_eq!(bounds.min, [0.0; 3]);
        assert_eq!(bounds.max, [0.0; 3]);
    }
}
