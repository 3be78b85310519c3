pub mod equation_engine;
pub mod field;
pub mod grid;
pub mod plane;
pub mod solvers;
/// The `pplane_core` crate provides the numeric engine behind the pplane
/// phase-plane explorer for autonomous systems `dx/dt = f(x, y)`, `dy/dt = g(x, y)`.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (planar vector fields).
/// - **Equation Engine**: formula evaluator, expression tree and a bytecode VM for repeated sampling.
/// - **Field**: adapters turning a pair of formulas into a `DynamicalSystem`.
/// - **Solvers**: fixed-step RK4 and bidirectional trajectory tracing.
/// - **Grid / View / Plane**: direction-field sampling, clip-space mapping and the host model.
pub mod traits;
pub mod view;
