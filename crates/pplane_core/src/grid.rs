use crate::equation_engine::EvalError;
use crate::traits::{DynamicalSystem, State};
use crate::view::Bounds;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Largest number of grid nodes sampled per frame.
pub const MAX_GRID_NODES: usize = 250_000;

/// Number of direction samples along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { rows: 25, cols: 25 }
    }
}

impl GridSpec {
    /// Saturates instead of overflowing; `validate` rejects such grids.
    pub fn len(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            bail!(
                "Grid must have at least one row and column (got {}x{}).",
                self.rows,
                self.cols
            );
        }
        if self.len() > MAX_GRID_NODES {
            bail!(
                "Grid of {}x{} exceeds {} nodes.",
                self.rows,
                self.cols,
                MAX_GRID_NODES
            );
        }
        Ok(())
    }

    /// Centre of cell `(row, col)`; row 0 is at `min_y`, col 0 at `min_x`.
    pub fn node(&self, bounds: &Bounds, row: usize, col: usize) -> State {
        let dx = bounds.width() / self.cols as f64;
        let dy = bounds.height() / self.rows as f64;
        State::new(
            bounds.min_x + (col as f64 + 0.5) * dx,
            bounds.min_y + (row as f64 + 0.5) * dy,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrow {
    pub origin: State,
    pub direction: State,
}

/// Unit vector along `velocity` scaled to `length`.
/// A zero or infinite velocity yields NaN components.
pub fn direction(velocity: State, length: f64) -> State {
    velocity.normalize() * length
}

/// Samples the field at every grid node, row-major.
pub fn sample_direction_grid<S>(
    system: &S,
    bounds: &Bounds,
    grid: &GridSpec,
    arrow_length: f64,
) -> Result<Vec<Arrow>, EvalError>
where
    S: DynamicalSystem + ?Sized,
{
    let mut arrows = Vec::with_capacity(grid.len().min(MAX_GRID_NODES));
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let origin = grid.node(bounds, row, col);
            let velocity = system.apply(origin)?;
            arrows.push(Arrow {
                origin,
                direction: direction(velocity, arrow_length),
            });
        }
    }
    Ok(arrows)
}

/// Flat `x, y, dir_x, dir_y` records, one per arrow.
pub fn arrow_vertices(arrows: &[Arrow]) -> Vec<f32> {
    arrows
        .iter()
        .flat_map(|a| {
            [
                a.origin.x as f32,
                a.origin.y as f32,
                a.direction.x as f32,
                a.direction.y as f32,
            ]
        })
        .collect()
}

/// Flat `x, y` records, one per state.
pub fn trajectory_vertices(trajectory: &[State]) -> Vec<f32> {
    trajectory
        .iter()
        .flat_map(|s| [s.x as f32, s.y as f32])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FormulaField;

    #[test]
    fn nodes_are_cell_centres() {
        let grid = GridSpec { rows: 2, cols: 4 };
        let bounds = Bounds::new(0.0, 0.0, 4.0, 2.0);
        assert_eq!(grid.node(&bounds, 0, 0), State::new(0.5, 0.5));
        assert_eq!(grid.node(&bounds, 1, 3), State::new(3.5, 1.5));
    }

    #[test]
    fn validate_bounds_node_count() {
        assert!(GridSpec::default().validate().is_ok());
        assert!(GridSpec { rows: 0, cols: 4 }.validate().is_err());
        assert!(GridSpec { rows: 500, cols: 500 }.validate().is_ok());
        assert!(GridSpec { rows: 501, cols: 500 }.validate().is_err());
        let huge = GridSpec { rows: usize::MAX, cols: 3 };
        assert_eq!(huge.len(), usize::MAX);
        assert!(huge.validate().is_err());
    }

    #[test]
    fn samples_every_node_row_major() {
        let field = FormulaField::new("1", "0");
        let grid = GridSpec { rows: 3, cols: 2 };
        let arrows = sample_direction_grid(&field, &Bounds::default(), &grid, 0.5).unwrap();
        assert_eq!(arrows.len(), 6);
        assert!(arrows[0].origin.x < arrows[1].origin.x);
        assert_eq!(arrows[0].origin.y, arrows[1].origin.y);
        assert!(arrows[1].origin.y < arrows[2].origin.y);
        for arrow in &arrows {
            assert!((arrow.direction - State::new(0.5, 0.0)).norm() < 1e-15);
        }
    }

    #[test]
    fn directions_have_fixed_length() {
        let field = FormulaField::new("x*x+y", "x-y");
        let arrows = sample_direction_grid(&field, &Bounds::default(), &GridSpec::default(), 0.3).unwrap();
        for arrow in arrows.iter().filter(|a| a.direction.x.is_finite()) {
            assert!((arrow.direction.norm() - 0.3).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_velocity_passes_nan_through() {
        let d = direction(State::new(0.0, 0.0), 1.0);
        assert!(d.x.is_nan() && d.y.is_nan());
        let d = direction(State::new(f64::INFINITY, 0.0), 1.0);
        assert!(d.x.is_nan());
    }

    #[test]
    fn sampling_propagates_evaluator_errors() {
        let field = FormulaField::new("x", "t");
        let result = sample_direction_grid(&field, &Bounds::default(), &GridSpec::default(), 1.0);
        assert!(matches!(result, Err(EvalError::Name { .. })));
    }

    #[test]
    fn vertex_layouts() {
        let arrows = [Arrow {
            origin: State::new(1.0, 2.0),
            direction: State::new(0.5, -0.5),
        }];
        assert_eq!(arrow_vertices(&arrows), vec![1.0, 2.0, 0.5, -0.5]);
        let states = [State::new(1.0, 2.0), State::new(3.0, 4.0)];
        assert_eq!(trajectory_vertices(&states), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
