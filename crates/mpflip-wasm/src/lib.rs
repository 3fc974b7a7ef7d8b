use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};
use mpflip_core::presets::preset_names;
use mpflip_core::{
    pack_points, HostDevice, OptionsPatch, ParticleSimulation, PointCloudHandle, PointVertex,
    SceneContainer,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Forwards `log` records to the browser console.
struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&line),
            Level::Warn => web_sys::console::warn_1(&line),
            _ => web_sys::console::log_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;
static LOGGER_INIT: Once = Once::new();

fn init_logging() {
    LOGGER_INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
    });
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_patch(json: &str) -> Result<OptionsPatch, JsValue> {
    serde_json::from_str(json).map_err(to_js)
}

fn random_seed() -> Option<u64> {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// A JS object with `add(handle)` and `remove(handle)` methods.
struct JsScene<'a>(&'a JsValue);

impl JsScene<'_> {
    fn call(&self, method: &str, handle: &PointCloudHandle) {
        let func = match js_sys::Reflect::get(self.0, &JsValue::from_str(method)) {
            Ok(f) => f,
            Err(_) => return,
        };
        let Some(func) = func.dyn_ref::<js_sys::Function>() else {
            log::warn!("scene has no `{}` function", method);
            return;
        };
        let arg = serde_json::to_string(handle)
            .map_err(to_js)
            .and_then(|json| js_sys::JSON::parse(&json));
        match arg {
            Ok(arg) => {
                if let Err(e) = func.call1(self.0, &arg) {
                    log::warn!("scene.{} threw: {:?}", method, e);
                }
            }
            Err(e) => log::warn!("could not convert point cloud handle: {:?}", e),
        }
    }
}

impl SceneContainer for JsScene<'_> {
    fn add(&mut self, handle: &PointCloudHandle) {
        self.call("add", handle);
    }

    fn remove(&mut self, handle: &PointCloudHandle) {
        self.call("remove", handle);
    }
}

#[wasm_bindgen]
pub struct SimulationWorld {
    sim: ParticleSimulation,
    points: Vec<PointVertex>,
}

#[wasm_bindgen]
impl SimulationWorld {
    /// `patch_json` is an optional JSON options patch. Without an explicit
    /// `emit.seed` the emitter is seeded from the browser's entropy source.
    #[wasm_bindgen(constructor)]
    pub fn new(patch_json: Option<String>) -> Result<SimulationWorld, JsValue> {
        init_logging();
        let mut patch = match patch_json.as_deref() {
            Some(json) => parse_patch(json)?,
            None => OptionsPatch::default(),
        };
        let emit = patch.emit.get_or_insert_with(Default::default);
        if emit.seed.is_none() {
            emit.seed = random_seed();
        }

        let sim = ParticleSimulation::new(HostDevice::new(), Some(&patch)).map_err(to_js)?;
        let mut world = SimulationWorld {
            sim,
            points: Vec::new(),
        };
        world.write_gpu_output();
        Ok(world)
    }

    /// Advance by `dt` seconds; returns the wall time spent in milliseconds.
    #[wasm_bindgen]
    pub fn step(&mut self, dt: f32) -> f32 {
        let start = js_sys::Date::now();
        self.sim.update(dt);
        self.write_gpu_output();
        (js_sys::Date::now() - start) as f32
    }

    /// Capacity may change, so re-read the buffer pointer afterwards.
    #[wasm_bindgen]
    pub fn set_params(&mut self, patch_json: &str) -> Result<(), JsValue> {
        let patch = parse_patch(patch_json)?;
        self.sim.set_params(&patch).map_err(to_js)?;
        self.write_gpu_output();
        Ok(())
    }

    #[wasm_bindgen]
    pub fn apply_preset(&mut self, name: &str) -> Result<(), JsValue> {
        self.sim.apply_preset(name).map_err(to_js)?;
        self.write_gpu_output();
        Ok(())
    }

    #[wasm_bindgen]
    pub fn stats_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.sim.stats()).map_err(to_js)
    }

    #[wasm_bindgen]
    pub fn options_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.sim.options()).map_err(to_js)
    }

    #[wasm_bindgen]
    pub fn get_gpu_buffer_ptr(&self) -> *const f32 {
        self.points.as_ptr() as *const f32
    }

    #[wasm_bindgen]
    pub fn get_gpu_buffer_byte_length(&self) -> usize {
        bytemuck::cast_slice::<PointVertex, u8>(&self.points[..]).len()
    }

    #[wasm_bindgen]
    pub fn alive(&self) -> usize {
        self.sim.particles().alive()
    }

    #[wasm_bindgen]
    pub fn attach(&mut self, scene: &JsValue) {
        self.sim.attach(&mut JsScene(scene));
    }

    #[wasm_bindgen]
    pub fn detach(&mut self, scene: &JsValue) {
        self.sim.detach(&mut JsScene(scene));
    }

    #[wasm_bindgen]
    pub fn dispose(self) {
        self.sim.dispose();
    }
}

impl SimulationWorld {
    fn write_gpu_output(&mut self) {
        let options = self.sim.options();
        pack_points(
            self.sim.particles(),
            &options.render,
            options.emit.life[1],
            &mut self.points,
        );
    }
}

/// Names accepted by `apply_preset`.
#[wasm_bindgen]
pub fn presets() -> js_sys::Array {
    preset_names().map(JsValue::from_str).collect()
}
