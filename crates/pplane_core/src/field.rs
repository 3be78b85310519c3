//! Vector fields built from a pair of formulas.

use crate::equation_engine::{evaluate, Bytecode, Environment, EvalError, Formula, VM};
use crate::traits::{DynamicalSystem, State};
use std::cell::RefCell;

pub const DEFAULT_DX: &str = "x*x+y";
pub const DEFAULT_DY: &str = "x-y";

/// The two validated formulas defining `dx/dt` and `dy/dt`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaPair {
    pub dx: Formula,
    pub dy: Formula,
}

impl FormulaPair {
    /// Parses both formulas. Fails on the first invalid one, `dx` first.
    pub fn parse(dx: &str, dy: &str) -> Result<Self, EvalError> {
        Ok(Self {
            dx: Formula::parse(dx)?,
            dy: Formula::parse(dy)?,
        })
    }
}

/// Field that scans both formula texts on every evaluation.
///
/// Both components read from one environment built from the state before
/// either formula runs; `dx` is evaluated to completion before `dy`.
#[derive(Debug, Clone)]
pub struct FormulaField {
    dx: String,
    dy: String,
}

impl FormulaField {
    pub fn new(dx: impl Into<String>, dy: impl Into<String>) -> Self {
        Self {
            dx: dx.into(),
            dy: dy.into(),
        }
    }
}

impl DynamicalSystem for FormulaField {
    fn apply(&self, state: State) -> Result<State, EvalError> {
        let env = Environment::from(state);
        let dx = evaluate(&self.dx, &env)?;
        let dy = evaluate(&self.dy, &env)?;
        Ok(State::new(dx, dy))
    }
}

/// Field backed by compiled bytecode, for grid sampling and tracing.
pub struct CompiledField {
    dx: Bytecode,
    dy: Bytecode,
    // Interior mutability for the VM stack to avoid allocation per call.
    // This makes the field !Sync; parallel samplers need one field per thread.
    stack: RefCell<Vec<f64>>,
}

impl CompiledField {
    pub fn new(formulas: &FormulaPair) -> Self {
        Self {
            dx: formulas.dx.compile(),
            dy: formulas.dy.compile(),
            stack: RefCell::new(Vec::with_capacity(32)),
        }
    }

    pub fn eval(&self, state: State) -> State {
        let env = Environment::from(state);
        let mut stack = self.stack.borrow_mut();
        let dx = VM::execute(&self.dx, &env, &mut stack);
        let dy = VM::execute(&self.dy, &env, &mut stack);
        State::new(dx, dy)
    }
}

impl DynamicalSystem for CompiledField {
    fn apply(&self, state: State) -> Result<State, EvalError> {
        Ok(self.eval(state))
    }
}
