//! Terrain maps for tests.

use nalgebra::{Unit, Vector3};
use poise_wbc::{TerrainContact, TerrainMap};

/// Plane `z = height + slope * x`, tilted about the y axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlopedTerrain {
    pub height: f64,
    pub slope: f64,
}

impl SlopedTerrain {
    pub const fn new(height: f64, slope: f64) -> Self {
        Self { height, slope }
    }
}

impl TerrainMap for SlopedTerrain {
    fn query(&self, point: &Vector3<f64>) -> TerrainContact {
        TerrainContact {
            point: Vector3::new(point.x, point.y, self.height + self.slope * point.x),
            normal: Unit::new_normalize(Vector3::new(-self.slope, 0.0, 1.0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
