//! Triangle rasterization.
//!
//! Triangles arrive in clip space. They are clipped against the near and far
//! planes, divided by w, mapped through the viewport (y grows downwards) and
//! scanned at pixel centers. Edges follow the top-left rule so that two
//! triangles sharing an edge never both cover a pixel on it.

use glam::Vec4;

use crate::command::{Rect, Viewport};
use crate::pipeline::CullMode;

/// Number of interpolated attributes carried from the vertex stage.
pub(crate) const VARYING_COUNT: usize = 8;

pub(crate) type Varyings = [f32; VARYING_COUNT];

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ClipVertex {
    pub position: Vec4,
    pub varyings: Varyings,
}

impl ClipVertex {
    pub fn new(position: Vec4) -> Self {
        Self {
            position,
            varyings: [0.0; VARYING_COUNT],
        }
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        let mut varyings = [0.0; VARYING_COUNT];
        for (i, v) in varyings.iter_mut().enumerate() {
            *v = self.varyings[i] + (other.varyings[i] - self.varyings[i]) * t;
        }
        Self {
            position: self.position.lerp(other.position, t),
            varyings,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub varyings: Varyings,
}

pub(crate) struct RasterState {
    pub viewport: Viewport,
    /// Already clamped to the render target.
    pub scissor: Rect,
    pub cull_mode: CullMode,
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    inv_w: f32,
    /// Varyings divided by w, interpolated linearly in screen space.
    varyings: Varyings,
}

/// Rasterizes one clip-space triangle, calling `emit` for every covered pixel.
pub(crate) fn rasterize_triangle(triangle: &[ClipVertex; 3], state: &RasterState, emit: &mut impl FnMut(&Fragment)) {
    let polygon = clip_polygon(triangle);
    if polygon.len() < 3 {
        return;
    }

    let screen: Vec<ScreenVertex> = polygon
        .iter()
        .map(|v| to_screen(v, &state.viewport))
        .collect();

    for i in 1..screen.len() - 1 {
        scan_triangle([screen[0], screen[i], screen[i + 1]], state, emit);
    }
}

/// Clips against w > 0, z >= 0 and z <= w.
fn clip_polygon(triangle: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    const W_EPSILON: f32 = 1e-6;

    let mut polygon = triangle.to_vec();
    polygon = clip_against(&polygon, |v| v.position.w - W_EPSILON);
    polygon = clip_against(&polygon, |v| v.position.z);
    polygon = clip_against(&polygon, |v| v.position.w - v.position.z);
    polygon
}

/// Sutherland-Hodgman against the half-space `distance >= 0`.
fn clip_against(input: &[ClipVertex], distance: impl Fn(&ClipVertex) -> f32) -> Vec<ClipVertex> {
    let mut output = Vec::with_capacity(input.len() + 2);
    for (i, a) in input.iter().enumerate() {
        let b = &input[(i + 1) % input.len()];
        let da = distance(a);
        let db = distance(b);

        if da >= 0.0 {
            output.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            output.push(a.lerp(b, da / (da - db)));
        }
    }
    output
}

fn to_screen(v: &ClipVertex, viewport: &Viewport) -> ScreenVertex {
    let inv_w = 1.0 / v.position.w;
    let ndc = v.position.truncate() * inv_w;

    let mut varyings = v.varyings;
    for value in &mut varyings {
        *value *= inv_w;
    }

    ScreenVertex {
        x: viewport.x + (ndc.x * 0.5 + 0.5) * viewport.width,
        y: viewport.y + (0.5 - ndc.y * 0.5) * viewport.height,
        z: viewport.min_depth + ndc.z * (viewport.max_depth - viewport.min_depth),
        inv_w,
        varyings,
    }
}

/// Twice the signed area of (a, b, p), positive when p lies right of a->b
/// with y pointing down.
#[inline]
fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Top or left edge of a triangle with positive area.
#[inline]
fn is_top_left(a: &ScreenVertex, b: &ScreenVertex) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

#[inline]
fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

fn scan_triangle(mut v: [ScreenVertex; 3], state: &RasterState, emit: &mut impl FnMut(&Fragment)) {
    let mut area = edge(&v[0], &v[1], v[2].x, v[2].y);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        if state.cull_mode == CullMode::Back {
            return;
        }
        v.swap(1, 2);
        area = -area;
    }

    let scissor = &state.scissor;
    let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let max_x = v.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_y = v.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let x0 = (min_x.floor().max(scissor.x as f32)) as u32;
    let x1 = (max_x.ceil().min((scissor.x + scissor.width) as f32)).max(0.0) as u32;
    let y0 = (min_y.floor().max(scissor.y as f32)) as u32;
    let y1 = (max_y.ceil().min((scissor.y + scissor.height) as f32)).max(0.0) as u32;

    let top_left = [
        is_top_left(&v[1], &v[2]),
        is_top_left(&v[2], &v[0]),
        is_top_left(&v[0], &v[1]),
    ];

    for y in y0..y1 {
        let py = y as f32 + 0.5;
        for x in x0..x1 {
            let px = x as f32 + 0.5;

            let w0 = edge(&v[1], &v[2], px, py);
            let w1 = edge(&v[2], &v[0], px, py);
            let w2 = edge(&v[0], &v[1], px, py);
            if !(covers(w0, top_left[0]) && covers(w1, top_left[1]) && covers(w2, top_left[2])) {
                continue;
            }

            let b = [w0 / area, w1 / area, w2 / area];
            let depth = b[0] * v[0].z + b[1] * v[1].z + b[2] * v[2].z;
            let inv_w = b[0] * v[0].inv_w + b[1] * v[1].inv_w + b[2] * v[2].inv_w;

            let mut varyings = [0.0; VARYING_COUNT];
            for (i, value) in varyings.iter_mut().enumerate() {
                let over_w =
                    b[0] * v[0].varyings[i] + b[1] * v[1].varyings[i] + b[2] * v[2].varyings[i];
                *value = over_w / inv_w;
            }

            emit(&Fragment {
                x,
                y,
                depth,
                varyings,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec4;

    use super::*;

    fn state(width: u32, height: u32) -> RasterState {
        RasterState {
            viewport: Viewport::new(width as f32, height as f32),
            scissor: Rect::new(width, height),
            cull_mode: CullMode::None,
        }
    }

    fn collect(triangle: [ClipVertex; 3], state: &RasterState) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        rasterize_triangle(&triangle, state, &mut |f| fragments.push(*f));
        fragments
    }

    #[test]
    fn test_triangle_coverage() {
        let triangle = [
            ClipVertex::new(vec4(-1.0, 1.0, 0.5, 1.0)),
            ClipVertex::new(vec4(0.9, 1.0, 0.5, 1.0)),
            ClipVertex::new(vec4(-1.0, -0.9, 0.5, 1.0)),
        ];
        let fragments = collect(triangle, &state(8, 8));

        assert_eq!(fragments.len(), 28);
        assert!(fragments.iter().all(|f| f.x + f.y <= 6));
        assert!(fragments.iter().all(|f| (f.depth - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_winding_does_not_matter_without_culling() {
        let triangle = [
            ClipVertex::new(vec4(-1.0, 1.0, 0.5, 1.0)),
            ClipVertex::new(vec4(-1.0, -0.9, 0.5, 1.0)),
            ClipVertex::new(vec4(0.9, 1.0, 0.5, 1.0)),
        ];
        assert_eq!(collect(triangle, &state(8, 8)).len(), 28);

        let culled = RasterState {
            cull_mode: CullMode::Back,
            ..state(8, 8)
        };
        let fragments = collect(triangle, &culled);
        let other_winding = collect([triangle[0], triangle[2], triangle[1]], &culled);
        assert_eq!(fragments.len() + other_winding.len(), 28);
    }

    #[test]
    fn test_shared_edge_covered_once() {
        // Two triangles splitting the full 4x4 target along its diagonal.
        let a = ClipVertex::new(vec4(-1.0, 1.0, 0.0, 1.0));
        let b = ClipVertex::new(vec4(1.0, 1.0, 0.0, 1.0));
        let c = ClipVertex::new(vec4(1.0, -1.0, 0.0, 1.0));
        let d = ClipVertex::new(vec4(-1.0, -1.0, 0.0, 1.0));

        let s = state(4, 4);
        let mut counts = [0u32; 16];
        for f in collect([a, b, c], &s).iter().chain(collect([a, c, d], &s).iter()) {
            counts[(f.y * 4 + f.x) as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c == 1), "{:?}", counts);
    }

    #[test]
    fn test_near_plane_clipping() {
        // One vertex behind the eye; the triangle must still produce a
        // bounded set of fragments with depth in [0, 1].
        let triangle = [
            ClipVertex::new(vec4(-0.5, -0.5, 0.5, 1.0)),
            ClipVertex::new(vec4(0.5, -0.5, 0.5, 1.0)),
            ClipVertex::new(vec4(0.0, 0.5, -1.0, -0.5)),
        ];
        let fragments = collect(triangle, &state(16, 16));
        assert!(!fragments.is_empty());
        assert!(
            fragments
                .iter()
                .all(|f| (-1e-5..=1.0 + 1e-5).contains(&f.depth))
        );
        assert!(fragments.iter().all(|f| f.x < 16 && f.y < 16));
    }

    #[test]
    fn test_fully_clipped_triangle() {
        let triangle = [
            ClipVertex::new(vec4(0.0, 0.0, -0.5, 1.0)),
            ClipVertex::new(vec4(1.0, 0.0, -0.5, 1.0)),
            ClipVertex::new(vec4(0.0, 1.0, -0.5, 1.0)),
        ];
        assert!(collect(triangle, &state(8, 8)).is_empty());
    }

    #[test]
    fn test_perspective_correct_varyings() {
        let mut near = ClipVertex::new(vec4(-1.0, -1.0, 0.0, 1.0));
        let mut far_a = ClipVertex::new(vec4(3.0, -3.0, 0.0, 3.0));
        let mut far_b = ClipVertex::new(vec4(-3.0, 3.0, 0.0, 3.0));
        near.varyings[0] = 2.0;
        far_a.varyings[0] = 2.0;
        far_b.varyings[0] = 2.0;

        // A constant attribute must stay constant after the divide.
        for f in collect([near, far_a, far_b], &state(8, 8)) {
            assert_relative_eq!(f.varyings[0], 2.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_scissor_limits_coverage() {
        let triangle = [
            ClipVertex::new(vec4(-1.0, 1.0, 0.5, 1.0)),
            ClipVertex::new(vec4(3.0, 1.0, 0.5, 1.0)),
            ClipVertex::new(vec4(-1.0, -3.0, 0.5, 1.0)),
        ];
        let mut s = state(8, 8);
        s.scissor = Rect {
            x: 2,
            y: 2,
            width: 2,
            height: 2,
        };
        let fragments = collect(triangle, &s);
        assert_eq!(fragments.len(), 4);
        assert!(fragments.iter().all(|f| (2..4).contains(&f.x) && (2..4).contains(&f.y)));
    }
}
