//! Host-side model of one phase plane: formulas, configuration and the
//! trajectories currently overlaid on the direction field.

use crate::equation_engine::EvalError;
use crate::field::{CompiledField, FormulaPair, DEFAULT_DX, DEFAULT_DY};
use crate::grid::{sample_direction_grid, Arrow, GridSpec};
use crate::solvers::{trace, Trajectory};
use crate::traits::State;
use crate::view::{Bounds, Viewport};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Upper bound on `half_steps`.
pub const MAX_HALF_STEPS: usize = 100_000;
/// Upper bound on `max_trajectories`.
pub const MAX_TRAJECTORIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    pub bounds: Bounds,
    pub grid: GridSpec,
    /// Length of every direction arrow, in world units.
    pub arrow_length: f64,
    pub dt: f64,
    /// Steps traced in each time direction.
    pub half_steps: usize,
    pub max_trajectories: usize,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            grid: GridSpec::default(),
            arrow_length: 0.25,
            dt: 0.01,
            half_steps: 800,
            max_trajectories: 20,
        }
    }
}

impl PlaneConfig {
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        self.grid.validate()?;
        if !self.arrow_length.is_finite() || self.arrow_length <= 0.0 {
            bail!("Arrow length must be positive and finite.");
        }
        if !self.dt.is_finite() || self.dt == 0.0 {
            bail!("Time step must be finite and non-zero.");
        }
        if self.half_steps == 0 {
            bail!("Trajectories need at least one step in each direction.");
        }
        if self.half_steps > MAX_HALF_STEPS {
            bail!(
                "half_steps ({}) exceeds the limit of {}.",
                self.half_steps,
                MAX_HALF_STEPS
            );
        }
        if self.max_trajectories == 0 {
            bail!("max_trajectories must be at least 1.");
        }
        if self.max_trajectories > MAX_TRAJECTORIES {
            bail!(
                "max_trajectories ({}) exceeds the limit of {}.",
                self.max_trajectories,
                MAX_TRAJECTORIES
            );
        }
        Ok(())
    }
}

/// One solution curve and the point it was traced from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryOverlay {
    pub initial: State,
    pub states: Trajectory,
}

pub struct PhasePlane {
    config: PlaneConfig,
    formulas: FormulaPair,
    field: CompiledField,
    overlays: VecDeque<TrajectoryOverlay>,
}

fn retrace<I>(
    field: &CompiledField,
    config: &PlaneConfig,
    initials: I,
) -> Result<VecDeque<TrajectoryOverlay>, EvalError>
where
    I: IntoIterator<Item = State>,
{
    initials
        .into_iter()
        .map(|initial| -> Result<TrajectoryOverlay, EvalError> {
            Ok(TrajectoryOverlay {
                initial,
                states: trace(field, initial, config.dt, config.half_steps)?,
            })
        })
        .collect()
}

impl PhasePlane {
    pub fn new(config: PlaneConfig) -> Result<Self> {
        Self::with_formulas(config, DEFAULT_DX, DEFAULT_DY)
    }

    pub fn with_formulas(config: PlaneConfig, dx: &str, dy: &str) -> Result<Self> {
        config.validate().context("Invalid plane configuration")?;
        let formulas = FormulaPair::parse(dx, dy).context("Invalid formulas")?;
        let field = CompiledField::new(&formulas);
        Ok(Self {
            config,
            formulas,
            field,
            overlays: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &PlaneConfig {
        &self.config
    }

    pub fn formulas(&self) -> &FormulaPair {
        &self.formulas
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.config.bounds)
    }

    /// Replaces both formulas at once.
    ///
    /// On error nothing changes: the previous formulas, field and trajectories
    /// stay active. On success every trajectory is retraced under the new field.
    pub fn apply_formulas(&mut self, dx: &str, dy: &str) -> Result<(), EvalError> {
        let formulas = FormulaPair::parse(dx, dy).inspect_err(|err| {
            warn!(
                "Rejected formula edit ({dx:?}, {dy:?}) at position {}: {err}",
                err.position()
            );
        })?;
        let field = CompiledField::new(&formulas);
        let overlays = retrace(&field, &self.config, self.overlays.iter().map(|o| o.initial))?;

        debug!(
            "Applied formulas dx/dt = {}, dy/dt = {}; retraced {} trajectories",
            formulas.dx,
            formulas.dy,
            overlays.len()
        );
        self.formulas = formulas;
        self.field = field;
        self.overlays = overlays;
        Ok(())
    }

    /// Replaces the configuration; rejected configurations change nothing.
    ///
    /// Trajectories are retraced with the new step settings, keeping only the
    /// newest `max_trajectories` of them.
    pub fn set_config(&mut self, config: PlaneConfig) -> Result<()> {
        config.validate().context("Invalid plane configuration")?;
        let skip = self.overlays.len().saturating_sub(config.max_trajectories);
        if skip > 0 {
            warn!("Dropping {skip} trajectories to fit max_trajectories = {}", config.max_trajectories);
        }
        let initials: Vec<State> = self.overlays.iter().skip(skip).map(|o| o.initial).collect();
        let overlays = retrace(&self.field, &config, initials)?;

        info!(
            "Plane configuration updated: bounds {:?}, grid {}x{}, dt {}, half_steps {}",
            config.bounds, config.grid.rows, config.grid.cols, config.dt, config.half_steps
        );
        self.config = config;
        self.overlays = overlays;
        Ok(())
    }

    /// Traces a trajectory through `initial`, evicting the oldest one when
    /// the plane is full. Returns the index of the new trajectory.
    pub fn add_trajectory(&mut self, initial: State) -> Result<usize, EvalError> {
        let states = trace(&self.field, initial, self.config.dt, self.config.half_steps)?;
        while self.overlays.len() >= self.config.max_trajectories {
            if let Some(evicted) = self.overlays.pop_front() {
                warn!("Evicting trajectory from ({}, {})", evicted.initial.x, evicted.initial.y);
            }
        }
        debug!(
            "Traced {} states through ({}, {})",
            states.len(),
            initial.x,
            initial.y
        );
        self.overlays.push_back(TrajectoryOverlay { initial, states });
        Ok(self.overlays.len() - 1)
    }

    /// Traces a trajectory through the world point under a window pixel.
    pub fn add_trajectory_at_pixel(&mut self, px: f64, py: f64, width: f64, height: f64) -> Result<usize> {
        if !(width > 0.0 && height > 0.0) {
            bail!("Window size must be positive (got {width}x{height}).");
        }
        let initial = self.viewport().pixel_to_world(px, py, width, height);
        Ok(self.add_trajectory(initial)?)
    }

    pub fn clear_trajectories(&mut self) {
        self.overlays.clear();
    }

    pub fn trajectory_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn trajectory(&self, index: usize) -> Option<&TrajectoryOverlay> {
        self.overlays.get(index)
    }

    /// Trajectories from oldest to newest.
    pub fn trajectories(&self) -> impl Iterator<Item = &TrajectoryOverlay> {
        self.overlays.iter()
    }

    pub fn direction_field(&self) -> Result<Vec<Arrow>, EvalError> {
        sample_direction_grid(
            &self.field,
            &self.config.bounds,
            &self.config.grid,
            self.config.arrow_length,
        )
    }
}
