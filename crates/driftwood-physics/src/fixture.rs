//! Fixtures: shape-on-body bindings with material and filter data.

use crate::shape::Shape;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Collision filter using category/mask bitmasks plus a group index.
///
/// Two fixtures can collide iff:
/// - they share a nonzero positive `group` (always collide), or
/// - they share a nonzero negative `group` — never collide, or
/// - otherwise `(a.category & b.mask) != 0 && (b.category & a.mask) != 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Filter {
    /// Which category bits this fixture belongs to.
    pub category: u16,
    /// Which categories this fixture collides with.
    pub mask: u16,
    /// Collision group index; same-sign grouping overrides category/mask.
    pub group: i16,
}

impl Filter {
    /// Default filter: category 1, collides with everything, no group.
    pub const DEFAULT: Self = Self {
        category: 1,
        mask: u16::MAX,
        group: 0,
    };

    /// Create a filter from category and mask bits.
    pub const fn new(category: u16, mask: u16) -> Self {
        Self {
            category,
            mask,
            group: 0,
        }
    }

    /// Set the group index.
    pub const fn with_group(mut self, group: i16) -> Self {
        self.group = group;
        self
    }

    /// Check whether two filters allow collision.
    pub fn should_collide(a: &Self, b: &Self) -> bool {
        if a.group == b.group && a.group != 0 {
            return a.group > 0;
        }
        (a.category & b.mask) != 0 && (b.category & a.mask) != 0
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Fixture creation parameters.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixtureDef {
    /// Collision geometry.
    pub shape: Shape,
    /// Mass per unit area; total body mass is summed over fixtures.
    pub density: f32,
    /// Friction coefficient, 0..1.
    pub friction: f32,
    /// Bounciness, 0..1.
    pub restitution: f32,
    /// Sensors report contacts but exert no physical response.
    pub is_sensor: bool,
    /// Collision filter.
    pub filter: Filter,
}

impl FixtureDef {
    /// Create a fixture def for a shape with common material defaults.
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            density: 1.0,
            friction: 0.5,
            restitution: 0.3,
            is_sensor: false,
            filter: Filter::DEFAULT,
        }
    }

    /// Set the density.
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Set the friction coefficient.
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution.
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Mark the fixture as a sensor.
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    /// Set the collision filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// A fixture attached to a body. Owns its shape exclusively.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fixture {
    /// Collision geometry.
    pub shape: Shape,
    /// Mass per unit area.
    pub density: f32,
    /// Friction coefficient.
    pub friction: f32,
    /// Bounciness.
    pub restitution: f32,
    /// Overlap-only reporting.
    pub is_sensor: bool,
    /// Collision filter.
    pub filter: Filter,
}

impl From<FixtureDef> for Fixture {
    fn from(def: FixtureDef) -> Self {
        Self {
            shape: def.shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_collide() {
        let a = Filter::DEFAULT;
        let b = Filter::DEFAULT;
        assert!(Filter::should_collide(&a, &b));
    }

    #[test]
    fn test_category_mask() {
        let player = Filter::new(0b01, 0b10);
        let enemy = Filter::new(0b10, 0b01);
        let ghost = Filter::new(0b100, 0);
        assert!(Filter::should_collide(&player, &enemy));
        assert!(!Filter::should_collide(&player, &ghost));
        assert!(!Filter::should_collide(&ghost, &enemy));
    }

    #[test]
    fn test_group_overrides_mask() {
        // Mask says no, positive group says yes.
        let a = Filter::new(0b01, 0).with_group(3);
        let b = Filter::new(0b10, 0).with_group(3);
        assert!(Filter::should_collide(&a, &b));

        // Mask says yes, negative group says no.
        let c = Filter::DEFAULT.with_group(-2);
        let d = Filter::DEFAULT.with_group(-2);
        assert!(!Filter::should_collide(&c, &d));

        // Different groups fall back to category/mask.
        let e = Filter::DEFAULT.with_group(1);
        let f = Filter::DEFAULT.with_group(2);
        assert!(Filter::should_collide(&e, &f));
    }

    #[test]
    fn test_fixture_def_builder() {
        let def = FixtureDef::new(crate::shape::Shape::circle(1.0))
            .with_density(2.0)
            .with_restitution(0.9)
            .sensor();
        assert_eq!(def.density, 2.0);
        assert!(def.is_sensor);
    }
}
