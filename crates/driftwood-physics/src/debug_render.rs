//! Debug visualization hook.
//!
//! Backends draw their internal state into a [`DebugRenderer`] as
//! wireframe primitives; the embedding application implements the trait
//! for its graphics layer. Nothing here affects simulation.

use glam::Vec2;

/// RGBA color for debug rendering, 0-255 per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugColor {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl DebugColor {
    /// Create a color.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Dynamic body outlines.
    pub const BODY: Self = Self::new(230, 230, 230, 255);
    /// Static body outlines.
    pub const STATIC: Self = Self::new(100, 200, 100, 255);
    /// Sensor fixture outlines.
    pub const SENSOR: Self = Self::new(120, 120, 255, 160);
    /// Joint anchor lines.
    pub const JOINT: Self = Self::new(255, 200, 60, 255);
    /// Contact points.
    pub const CONTACT: Self = Self::new(255, 60, 60, 255);
}

/// Receiver for wireframe debug primitives.
///
/// Implement this for a graphics backend and pass it to
/// `PhysicsWorld::render_debug`. Draw order follows backend iteration
/// order and is stable across frames.
pub trait DebugRenderer {
    /// Draw a circle outline.
    fn draw_circle(&mut self, center: Vec2, radius: f32, color: DebugColor);

    /// Draw a closed polygon outline.
    fn draw_polygon(&mut self, vertices: &[Vec2], color: DebugColor);

    /// Draw a line segment.
    fn draw_segment(&mut self, p1: Vec2, p2: Vec2, color: DebugColor);

    /// Draw a point marker.
    fn draw_point(&mut self, position: Vec2, color: DebugColor);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Renderer that counts primitives, for asserting draw output.
    #[derive(Default)]
    pub struct CountingRenderer {
        pub circles: usize,
        pub polygons: usize,
        pub segments: usize,
        pub points: usize,
    }

    impl DebugRenderer for CountingRenderer {
        fn draw_circle(&mut self, _center: Vec2, _radius: f32, _color: DebugColor) {
            self.circles += 1;
        }

        fn draw_polygon(&mut self, _vertices: &[Vec2], _color: DebugColor) {
            self.polygons += 1;
        }

        fn draw_segment(&mut self, _p1: Vec2, _p2: Vec2, _color: DebugColor) {
            self.segments += 1;
        }

        fn draw_point(&mut self, _position: Vec2, _color: DebugColor) {
            self.points += 1;
        }
    }
}
