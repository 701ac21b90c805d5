mod wgpu_backend;

pub use wgpu_backend::Renderer;

use crate::math::Vec2;

/// One colored vertex, shared by the line and fill pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

/// CPU-side geometry collected for one coordinate space (world or screen),
/// uploaded in a single pair of draws.
#[derive(Default)]
pub struct DrawBatch {
    pub(crate) line_vertices: Vec<Vertex>,
    pub(crate) fill_vertices: Vec<Vertex>,
}

impl DrawBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.line_vertices.clear();
        self.fill_vertices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.line_vertices.is_empty() && self.fill_vertices.is_empty()
    }

    fn push_line_vertex(&mut self, position: Vec2, color: [f32; 4]) {
        self.line_vertices.push(Vertex {
            position: [position.x, position.y],
            color,
        });
    }

    /// A closed outline: consecutive points joined, last joined to first.
    pub fn line_loop(&mut self, points: &[Vec2], color: [f32; 4]) {
        if points.len() < 2 {
            return;
        }
        for window in points.windows(2) {
            self.push_line_vertex(window[0], color);
            self.push_line_vertex(window[1], color);
        }
        self.push_line_vertex(points[points.len() - 1], color);
        self.push_line_vertex(points[0], color);
    }

    /// Independent segments: points are consumed in pairs.
    pub fn line_list(&mut self, points: &[Vec2], color: [f32; 4]) {
        for pair in points.chunks_exact(2) {
            self.push_line_vertex(pair[0], color);
            self.push_line_vertex(pair[1], color);
        }
    }

    /// An axis-aligned filled rectangle.
    pub fn quad(&mut self, min: Vec2, max: Vec2, color: [f32; 4]) {
        let corners = [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ];
        for &index in &[0usize, 1, 2, 0, 2, 3] {
            self.fill_vertices.push(Vertex {
                position: [corners[index].x, corners[index].y],
                color,
            });
        }
    }

    /// A filled convex polygon, fanned from the first point.
    pub fn convex_fill(&mut self, points: &[Vec2], color: [f32; 4]) {
        if points.len() < 3 {
            return;
        }
        for i in 1..points.len() - 1 {
            for &p in &[points[0], points[i], points[i + 1]] {
                self.fill_vertices.push(Vertex {
                    position: [p.x, p.y],
                    color,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_loop_closes_the_outline() {
        let mut batch = DrawBatch::new();
        let triangle = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        batch.line_loop(&triangle, [1.0; 4]);

        // Three edges, two vertices each.
        assert_eq!(batch.line_vertices.len(), 6);
        let first = batch.line_vertices.first().unwrap().position;
        let last = batch.line_vertices.last().unwrap().position;
        assert_eq!(first, [0.0, 0.0]);
        assert_eq!(last, [0.0, 0.0]);
    }

    #[test]
    fn quad_emits_two_triangles() {
        let mut batch = DrawBatch::new();
        batch.quad(Vec2::ZERO, Vec2::new(2.0, 1.0), [1.0; 4]);
        assert_eq!(batch.fill_vertices.len(), 6);
    }

    #[test]
    fn degenerate_inputs_are_ignored() {
        let mut batch = DrawBatch::new();
        batch.line_loop(&[Vec2::ZERO], [1.0; 4]);
        batch.convex_fill(&[Vec2::ZERO, Vec2::ONE], [1.0; 4]);
        assert!(batch.is_empty());
    }
}
