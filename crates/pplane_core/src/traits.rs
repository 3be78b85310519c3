use crate::equation_engine::EvalError;
use nalgebra::Vector2;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that formulas can be evaluated in.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A point `(x, y)` in the phase plane.
pub type State = Vector2<f64>;

/// An autonomous planar vector field, `(x, y) -> (dx/dt, dy/dt)`.
///
/// Evaluation may fail when the field is backed by formula text that is
/// scanned on every call; compiled fields never fail.
pub trait DynamicalSystem {
    fn apply(&self, state: State) -> Result<State, EvalError>;
}

impl<F> DynamicalSystem for F
where
    F: Fn(State) -> Result<State, EvalError>,
{
    fn apply(&self, state: State) -> Result<State, EvalError> {
        self(state)
    }
}
