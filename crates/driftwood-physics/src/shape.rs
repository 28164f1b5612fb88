//! Collision geometry descriptors.
//!
//! A [`Shape`] is immutable once created and owned by exactly one fixture.
//! Shapes carry local-space geometry; world-space queries go through
//! [`Shape::aabb`] with the owning body's pose.

use glam::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Lower-left corner.
    pub min: Vec2,
    /// Upper-right corner.
    pub max: Vec2,
}

impl Aabb {
    /// Create an AABB from two corners.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// AABB covering a circle.
    pub fn from_circle(center: Vec2, radius: f32) -> Self {
        let r = Vec2::splat(radius);
        Self {
            min: center - r,
            max: center + r,
        }
    }

    /// Smallest AABB containing a set of points. Empty input collapses to
    /// a degenerate box at the origin.
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Self {
        let mut iter = points.into_iter();
        let first = match iter.next() {
            Some(p) => p,
            None => return Self::new(Vec2::ZERO, Vec2::ZERO),
        };
        let mut min = first;
        let mut max = first;
        for p in iter {
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    /// Returns `true` if the boxes overlap (touching counts).
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Returns `true` if the point lies inside the box.
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Union of two boxes.
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box center.
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Half-widths along each axis.
    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }
}

/// Collision shape for fixtures.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Circle with a local-space center offset.
    Circle {
        /// Radius of the circle.
        radius: f32,
        /// Center offset in body-local space.
        offset: Vec2,
    },
    /// Rectangle with a local offset and rotation.
    Box {
        /// Half-widths along each local axis.
        half_extents: Vec2,
        /// Center offset in body-local space.
        offset: Vec2,
        /// Rotation relative to the body, radians.
        angle: f32,
    },
    /// Convex polygon, vertices in counter-clockwise body-local order.
    Polygon {
        /// Vertex positions.
        vertices: Vec<Vec2>,
    },
    /// Single line segment.
    Edge {
        /// Segment start, body-local.
        v1: Vec2,
        /// Segment end, body-local.
        v2: Vec2,
    },
    /// Polyline of connected segments, optionally closed into a loop.
    Chain {
        /// Polyline vertices.
        vertices: Vec<Vec2>,
        /// Connect the last vertex back to the first.
        looped: bool,
    },
}

impl Shape {
    /// Create a circle centered on the body origin.
    pub fn circle(radius: f32) -> Self {
        Shape::Circle {
            radius,
            offset: Vec2::ZERO,
        }
    }

    /// Create a circle with a local offset.
    pub fn circle_at(radius: f32, offset: Vec2) -> Self {
        Shape::Circle { radius, offset }
    }

    /// Create a box from full width and height, centered on the body origin.
    pub fn rect(width: f32, height: f32) -> Self {
        Shape::Box {
            half_extents: Vec2::new(width * 0.5, height * 0.5),
            offset: Vec2::ZERO,
            angle: 0.0,
        }
    }

    /// Create a convex polygon from counter-clockwise vertices.
    pub fn polygon(vertices: Vec<Vec2>) -> Self {
        Shape::Polygon { vertices }
    }

    /// Create a single edge segment.
    pub fn edge(v1: Vec2, v2: Vec2) -> Self {
        Shape::Edge { v1, v2 }
    }

    /// Create a chain of connected segments.
    pub fn chain(vertices: Vec<Vec2>, looped: bool) -> Self {
        Shape::Chain { vertices, looped }
    }

    /// World-space AABB for this shape attached to a body at `position`
    /// with orientation `angle`.
    pub fn aabb(&self, position: Vec2, angle: f32) -> Aabb {
        let rot = Vec2::from_angle(angle);
        match self {
            Shape::Circle { radius, offset } => {
                Aabb::from_circle(position + rot.rotate(*offset), *radius)
            }
            Shape::Box {
                half_extents,
                offset,
                angle: local_angle,
            } => {
                let center = position + rot.rotate(*offset);
                let corner_rot = Vec2::from_angle(angle + local_angle);
                let he = *half_extents;
                let corners = [
                    Vec2::new(-he.x, -he.y),
                    Vec2::new(he.x, -he.y),
                    Vec2::new(he.x, he.y),
                    Vec2::new(-he.x, he.y),
                ];
                Aabb::from_points(corners.iter().map(|c| center + corner_rot.rotate(*c)))
            }
            Shape::Polygon { vertices } => {
                Aabb::from_points(vertices.iter().map(|v| position + rot.rotate(*v)))
            }
            Shape::Edge { v1, v2 } => {
                Aabb::from_points([position + rot.rotate(*v1), position + rot.rotate(*v2)])
            }
            Shape::Chain { vertices, .. } => {
                Aabb::from_points(vertices.iter().map(|v| position + rot.rotate(*v)))
            }
        }
    }

    /// Area of the shape, used for density-derived mass. Edges and chains
    /// have zero area and contribute no mass.
    pub fn area(&self) -> f32 {
        match self {
            Shape::Circle { radius, .. } => std::f32::consts::PI * radius * radius,
            Shape::Box { half_extents, .. } => 4.0 * half_extents.x * half_extents.y,
            Shape::Polygon { vertices } => {
                // Shoelace formula.
                let n = vertices.len();
                if n < 3 {
                    return 0.0;
                }
                let mut twice_area = 0.0;
                for i in 0..n {
                    let a = vertices[i];
                    let b = vertices[(i + 1) % n];
                    twice_area += a.x * b.y - b.x * a.y;
                }
                twice_area.abs() * 0.5
            }
            Shape::Edge { .. } | Shape::Chain { .. } => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::new(Vec2::ZERO, Vec2::splat(2.0));
        let b = Aabb::new(Vec2::splat(1.0), Vec2::splat(3.0));
        let c = Aabb::new(Vec2::splat(2.5), Vec2::splat(4.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_circle_aabb_follows_offset() {
        let shape = Shape::circle_at(1.0, Vec2::new(2.0, 0.0));
        // Body rotated 90 degrees: the offset swings onto the y axis.
        let aabb = shape.aabb(Vec2::ZERO, std::f32::consts::FRAC_PI_2);
        assert!(aabb.center().distance(Vec2::new(0.0, 2.0)) < 1e-5);
    }

    #[test]
    fn test_rotated_box_aabb_grows() {
        let shape = Shape::rect(2.0, 2.0);
        let axis_aligned = shape.aabb(Vec2::ZERO, 0.0);
        let rotated = shape.aabb(Vec2::ZERO, std::f32::consts::FRAC_PI_4);
        assert!(rotated.max.x > axis_aligned.max.x);
        let expected = std::f32::consts::SQRT_2;
        assert!((rotated.max.x - expected).abs() < 1e-5);
    }

    #[test]
    fn test_polygon_area() {
        let tri = Shape::polygon(vec![
            Vec2::ZERO,
            Vec2::new(2.0, 0.0),
            Vec2::new(0.0, 2.0),
        ]);
        assert!((tri.area() - 2.0).abs() < 1e-6);
        assert_eq!(Shape::edge(Vec2::ZERO, Vec2::X).area(), 0.0);
    }
}
