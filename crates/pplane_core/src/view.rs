//! World-space bounds and the mapping to clip space used by the renderer.

use crate::traits::State;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle of the plane being displayed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: -5.0,
            min_y: -5.0,
            max_x: 5.0,
            max_y: 5.0,
        }
    }
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> State {
        State::new(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }

    pub fn validate(&self) -> Result<()> {
        let corners = [self.min_x, self.min_y, self.max_x, self.max_y];
        if corners.iter().any(|v| !v.is_finite()) {
            bail!("Plane bounds must be finite.");
        }
        if self.min_x >= self.max_x {
            bail!(
                "min_x ({}) must be less than max_x ({}).",
                self.min_x,
                self.max_x
            );
        }
        if self.min_y >= self.max_y {
            bail!(
                "min_y ({}) must be less than max_y ({}).",
                self.min_y,
                self.max_y
            );
        }
        Ok(())
    }
}

/// Maps world coordinates into clip space `[-1, 1]^2`.
///
/// `clip = scale_factor * (world + translate)`, component-wise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    bounds: Bounds,
}

impl Viewport {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn scale_factor(&self) -> State {
        State::new(2.0 / self.bounds.width(), 2.0 / self.bounds.height())
    }

    pub fn translate(&self) -> State {
        -self.bounds.center()
    }

    pub fn clip_to_world(&self, c: State) -> State {
        c.component_div(&self.scale_factor()) - self.translate()
    }

    /// Converts a window pixel (origin top-left, y down) to world space.
    pub fn pixel_to_world(&self, px: f64, py: f64, width: f64, height: f64) -> State {
        let clip = State::new(2.0 * px / width - 1.0, 1.0 - 2.0 * py / height);
        self.clip_to_world(clip)
    }
}

/// The coordinate axes clipped to `bounds`; axes outside the region are omitted.
pub fn axes_segments(bounds: &Bounds) -> Vec<[State; 2]> {
    let mut segments = Vec::with_capacity(2);
    if bounds.min_y <= 0.0 && bounds.max_y >= 0.0 {
        segments.push([
            State::new(bounds.min_x, 0.0),
            State::new(bounds.max_x, 0.0),
        ]);
    }
    if bounds.min_x <= 0.0 && bounds.max_x >= 0.0 {
        segments.push([
            State::new(0.0, bounds.min_y),
            State::new(0.0, bounds.max_y),
        ]);
    }
    segments
}
