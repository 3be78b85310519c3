//! `PhasePlane` wrapper and vertex buffer export.

use js_sys::Float32Array;
use nalgebra::Vector2;
use pplane_core::equation_engine::EvalError;
use pplane_core::grid::{arrow_vertices, trajectory_vertices};
use pplane_core::plane::{PhasePlane, PlaneConfig};
use pplane_core::view::axes_segments;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn anyhow_to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

fn read_config(value: JsValue) -> Result<PlaneConfig, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(PlaneConfig::default());
    }
    from_value(value).map_err(|err| JsValue::from_str(&format!("Failed to read plane config: {err}")))
}

#[wasm_bindgen]
pub struct WasmPlane {
    pub(crate) plane: PhasePlane,
}

impl WasmPlane {
    pub(crate) fn from_config(config: PlaneConfig) -> anyhow::Result<Self> {
        Ok(Self {
            plane: PhasePlane::new(config)?,
        })
    }

    pub(crate) fn direction_field_buffer(&self) -> Result<Vec<f32>, EvalError> {
        Ok(arrow_vertices(&self.plane.direction_field()?))
    }

    pub(crate) fn trajectory_buffer(&self, index: usize) -> Option<Vec<f32>> {
        self.plane
            .trajectory(index)
            .map(|overlay| trajectory_vertices(&overlay.states))
    }
}

#[wasm_bindgen]
impl WasmPlane {
    /// `config` may be `undefined` for the defaults; missing fields are defaulted too.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmPlane, JsValue> {
        console_error_panic_hook::set_once();
        let config = read_config(config)?;
        Self::from_config(config).map_err(anyhow_to_js)
    }

    pub fn apply_formulas(&mut self, dx: &str, dy: &str) -> Result<(), JsValue> {
        self.plane.apply_formulas(dx, dy).map_err(js_error)
    }

    pub fn formulas(&self) -> Vec<String> {
        let formulas = self.plane.formulas();
        vec![formulas.dx.text().to_string(), formulas.dy.text().to_string()]
    }

    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config = read_config(config)?;
        self.plane.set_config(config).map_err(anyhow_to_js)
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_value(self.plane.config())
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize plane config: {err}")))
    }

    pub fn add_trajectory(&mut self, x: f64, y: f64) -> Result<usize, JsValue> {
        self.plane.add_trajectory(Vector2::new(x, y)).map_err(js_error)
    }

    pub fn add_trajectory_at_pixel(
        &mut self,
        px: f64,
        py: f64,
        width: f64,
        height: f64,
    ) -> Result<usize, JsValue> {
        self.plane
            .add_trajectory_at_pixel(px, py, width, height)
            .map_err(anyhow_to_js)
    }

    pub fn clear_trajectories(&mut self) {
        self.plane.clear_trajectories();
    }

    pub fn trajectory_count(&self) -> usize {
        self.plane.trajectory_count()
    }

    /// Interleaved `x, y, dir_x, dir_y` per arrow.
    pub fn direction_field_vertices(&self) -> Result<Float32Array, JsValue> {
        let buffer = self.direction_field_buffer().map_err(js_error)?;
        Ok(Float32Array::from(buffer.as_slice()))
    }

    /// Interleaved `x, y` per state, backward half first.
    pub fn trajectory_vertices(&self, index: usize) -> Result<Float32Array, JsValue> {
        let buffer = self.trajectory_buffer(index).ok_or_else(|| {
            JsValue::from_str(&format!(
                "Trajectory index {index} out of range ({} stored).",
                self.plane.trajectory_count()
            ))
        })?;
        Ok(Float32Array::from(buffer.as_slice()))
    }

    /// Line-list vertices for the coordinate axes inside the bounds.
    pub fn axes_vertices(&self) -> Vec<f32> {
        axes_segments(&self.plane.config().bounds)
            .iter()
            .flat_map(|segment| segment.iter().flat_map(|p| [p.x as f32, p.y as f32]))
            .collect()
    }

    pub fn scale_factor(&self) -> Vec<f32> {
        let scale = self.plane.viewport().scale_factor();
        vec![scale.x as f32, scale.y as f32]
    }

    pub fn translate(&self) -> Vec<f32> {
        let translate = self.plane.viewport().translate();
        vec![translate.x as f32, translate.y as f32]
    }
}
