//! Browser entry point.
//!
//! JS owns the canvas, the animation loop and the DOM counters; this module
//! exposes an async constructor plus a `frame()` driver and pointer/wheel
//! hooks. Typical usage from TypeScript:
//!
//! ```js
//! init_panic_hook();
//! const field = await create_field(canvas, canvas.width, canvas.height);
//! const tick = () => { field.frame(); occludedEl.textContent = field.occluded_count(); requestAnimationFrame(tick); };
//! requestAnimationFrame(tick);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

use crate::camera::{Camera, OrbitController};
use crate::gpu::renderer::{FrameReport, Renderer};
use crate::scene::{SphereField, DEFAULT_GRID_DIM};

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

struct FieldContext {
    renderer: Renderer,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    field: SphereField,
    camera: Camera,
    orbit: OrbitController,
    last_report: FrameReport,
}

#[wasm_bindgen]
pub struct WasmField {
    inner: Rc<RefCell<FieldContext>>,
}

/// Async constructor: adapter/device setup must await in the browser.
#[wasm_bindgen]
pub async fn create_field(
    canvas: HtmlCanvasElement,
    width: u32,
    height: u32,
) -> Result<WasmField, JsValue> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(wgpu::SurfaceTarget::Canvas(canvas))
        .map_err(|e| JsValue::from_str(&format!("Failed to create surface: {e}")))?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| JsValue::from_str("No suitable GPU adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .map_err(|e| JsValue::from_str(&format!("Failed to request device: {e}")))?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(caps.formats[0]);
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: caps.present_modes[0],
        alpha_mode: caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let field = SphereField::grid(DEFAULT_GRID_DIM);
    let camera = Camera::field_view(config.width as f32 / config.height as f32);
    let orbit = OrbitController::from_camera(&camera);
    let renderer = Renderer::new(device, queue, format, config.width, config.height, &field);

    log::info!("field ready: {} spheres", field.len());

    Ok(WasmField {
        inner: Rc::new(RefCell::new(FieldContext {
            renderer,
            surface,
            config,
            field,
            camera,
            orbit,
            last_report: FrameReport::default(),
        })),
    })
}

#[wasm_bindgen]
impl WasmField {
    /// Render one frame. Returns the occluded sphere count so callers can
    /// update a DOM counter without a second call.
    pub fn frame(&self) -> u32 {
        let mut guard = self.inner.borrow_mut();
        let ctx = &mut *guard;

        ctx.field.advance();
        ctx.orbit.apply(&mut ctx.camera);

        let frame = match ctx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(_) => {
                // Lost/outdated surface: reconfigure and skip this frame.
                ctx.surface.configure(ctx.renderer.device(), &ctx.config);
                return ctx.last_report.occluded as u32;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        ctx.last_report = ctx.renderer.render(&view, &ctx.field, &ctx.camera);
        frame.present();

        ctx.last_report.occluded as u32
    }

    pub fn resize(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let mut guard = self.inner.borrow_mut();
        let ctx = &mut *guard;
        ctx.config.width = width;
        ctx.config.height = height;
        ctx.surface.configure(ctx.renderer.device(), &ctx.config);
        ctx.renderer.resize(width, height);
        ctx.camera.set_aspect(width, height);
    }

    pub fn pointer_down(&self) {
        self.inner.borrow_mut().orbit.set_dragging(true);
    }

    pub fn pointer_up(&self) {
        self.inner.borrow_mut().orbit.set_dragging(false);
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        self.inner.borrow_mut().orbit.on_cursor_moved(x, y);
    }

    /// Positive deltas zoom in (one wheel notch ~= 1.0).
    pub fn wheel(&self, steps: f32) {
        self.inner.borrow_mut().orbit.dolly(steps);
    }

    pub fn sphere_count(&self) -> u32 {
        self.inner.borrow().last_report.spheres as u32
    }

    pub fn occluded_count(&self) -> u32 {
        self.inner.borrow().last_report.occluded as u32
    }

    pub fn triangle_count(&self) -> u32 {
        self.inner.borrow().last_report.triangles as u32
    }
}
