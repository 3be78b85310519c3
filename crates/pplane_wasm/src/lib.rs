//! WASM bridge exposing the pplane core to a browser host.
//!
//! The host owns the window, the formula editors and the GPU buffers; this
//! crate hands it plain `f32` vertex data and reports formula errors as
//! strings so a bad edit can be shown without tearing anything down.

mod plane;

pub use plane::WasmPlane;

use pplane_core::equation_engine::{evaluate as evaluate_formula, Environment};
use wasm_bindgen::prelude::*;

/// One-off evaluation of `formula` at `(x, y)`, scanning the text once.
#[wasm_bindgen]
pub fn evaluate(formula: &str, x: f64, y: f64) -> Result<f64, JsValue> {
    evaluate_formula(formula, &Environment::new(x, y)).map_err(|err| JsValue::from_str(&err.to_string()))
}
