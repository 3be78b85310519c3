use crate::equation_engine::EvalError;
use crate::traits::{DynamicalSystem, State};

/// States ordered by time, backward half first.
pub type Trajectory = Vec<State>;

/// Classic Runge-Kutta 4th order step for an autonomous system.
///
/// Fixed step, no error estimate. Evaluation errors from the field are
/// returned as-is.
pub fn rk4_step<S>(system: &S, state: State, dt: f64) -> Result<State, EvalError>
where
    S: DynamicalSystem + ?Sized,
{
    let half = 0.5 * dt;

    // k1 = f(y)
    let k1 = system.apply(state)?;
    // k2 = f(y + dt*k1/2)
    let k2 = system.apply(state + k1 * half)?;
    // k3 = f(y + dt*k2/2)
    let k3 = system.apply(state + k2 * half)?;
    // k4 = f(y + dt*k3)
    let k4 = system.apply(state + k3 * dt)?;

    // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
    Ok(state + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
}

/// Traces the solution through `initial` in both time directions.
///
/// Returns exactly `2 * half_steps` states: `half_steps` states stepped with
/// `-dt`, stored from the earliest time up to `-dt`, then `half_steps` states
/// stepped with `+dt`. `initial` itself is not stored.
pub fn trace<S>(system: &S, initial: State, dt: f64, half_steps: usize) -> Result<Trajectory, EvalError>
where
    S: DynamicalSystem + ?Sized,
{
    let mut trajectory = vec![initial; 2 * half_steps];
    let (backward, forward) = trajectory.split_at_mut(half_steps);

    let mut state = initial;
    for slot in backward.iter_mut().rev() {
        state = rk4_step(system, state, -dt)?;
        *slot = state;
    }

    let mut state = initial;
    for slot in forward.iter_mut() {
        state = rk4_step(system, state, dt)?;
        *slot = state;
    }

    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FormulaField;
    use std::f64::consts::PI;

    fn rotation(s: State) -> Result<State, EvalError> {
        Ok(State::new(s.y, -s.x))
    }

    fn revolution_error(steps: usize) -> f64 {
        let dt = 2.0 * PI / steps as f64;
        let start = State::new(1.0, 0.0);
        let mut state = start;
        for _ in 0..steps {
            state = rk4_step(&rotation, state, dt).unwrap();
        }
        (state - start).norm()
    }

    #[test]
    fn rk4_matches_exact_step_for_constant_field() {
        let constant = |_: State| -> Result<State, EvalError> { Ok(State::new(1.0, -2.0)) };
        let next = rk4_step(&constant, State::new(0.0, 0.0), 0.5).unwrap();
        assert!((next.x - 0.5).abs() < 1e-15);
        assert!((next.y + 1.0).abs() < 1e-15);
    }

    #[test]
    fn rk4_is_exact_to_fourth_order_for_linear_growth() {
        // y' = y: one step gives the Taylor polynomial of exp(dt) to degree 4.
        let growth = |s: State| -> Result<State, EvalError> { Ok(s) };
        let dt = 0.1;
        let next = rk4_step(&growth, State::new(1.0, 2.0), dt).unwrap();
        let taylor = 1.0 + dt + dt * dt / 2.0 + dt.powi(3) / 6.0 + dt.powi(4) / 24.0;
        assert!((next.x - taylor).abs() < 1e-15);
        assert!((next.y - 2.0 * taylor).abs() < 1e-14);
    }

    #[test]
    fn circular_orbit_closes_after_one_revolution() {
        let err = revolution_error(200);
        assert!(err < 1e-6, "revolution error {err}");
    }

    #[test]
    fn circular_orbit_error_converges_at_fourth_order() {
        let coarse = revolution_error(50);
        let fine = revolution_error(100);
        let ratio = coarse / fine;
        assert!(ratio > 12.0 && ratio < 20.0, "convergence ratio {ratio}");
    }

    #[test]
    fn circular_orbit_preserves_radius() {
        let dt = 0.01;
        let mut state = State::new(0.0, 2.0);
        for _ in 0..1000 {
            state = rk4_step(&rotation, state, dt).unwrap();
        }
        assert!((state.norm() - 2.0).abs() < 1e-8);
    }

    #[test]
    fn trace_returns_two_half_steps_in_time_order() {
        let drift = |_: State| -> Result<State, EvalError> { Ok(State::new(1.0, 0.0)) };
        let trajectory = trace(&drift, State::new(0.0, 0.0), 0.1, 5).unwrap();
        assert_eq!(trajectory.len(), 10);
        let times = [-0.5, -0.4, -0.3, -0.2, -0.1, 0.1, 0.2, 0.3, 0.4, 0.5];
        for (i, (state, &t)) in trajectory.iter().zip(&times).enumerate() {
            assert!((state.x - t).abs() < 1e-12, "index {i}: {} vs {t}", state.x);
        }
        assert!(trajectory.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn trace_with_negative_dt_reverses_time() {
        let drift = |_: State| -> Result<State, EvalError> { Ok(State::new(1.0, 0.0)) };
        let trajectory = trace(&drift, State::new(0.0, 0.0), -0.1, 3).unwrap();
        assert_eq!(trajectory.len(), 6);
        assert!(trajectory.windows(2).all(|w| w[0].x > w[1].x));
    }

    #[test]
    fn trace_length_is_fixed_even_when_solution_blows_up() {
        let field = FormulaField::new("x*x", "0");
        let trajectory = trace(&field, State::new(1.0, 0.0), 0.5, 40).unwrap();
        assert_eq!(trajectory.len(), 80);
        assert!(trajectory.iter().any(|s| !s.x.is_finite()));
        assert!(trace(&field, State::new(1.0, 0.0), 0.5, 0).unwrap().is_empty());
    }

    #[test]
    fn trace_halves_are_seeded_from_initial_state() {
        let trajectory = trace(&rotation, State::new(1.0, 0.0), 0.01, 4).unwrap();
        let back = rk4_step(&rotation, State::new(1.0, 0.0), -0.01).unwrap();
        let fwd = rk4_step(&rotation, State::new(1.0, 0.0), 0.01).unwrap();
        assert_eq!(trajectory[3], back);
        assert_eq!(trajectory[4], fwd);
    }

    #[test]
    fn trace_propagates_evaluator_errors() {
        let field = FormulaField::new("x", "y/q");
        let err = trace(&field, State::new(1.0, 1.0), 0.1, 3).unwrap_err();
        assert!(matches!(err, EvalError::Name { .. }));
    }
}
