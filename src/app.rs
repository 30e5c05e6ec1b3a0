//! Interactive native window: winit event loop, orbit input, title-bar stats.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::WindowBuilder,
};

use crate::camera::{Camera, OrbitController};
use crate::gpu::renderer::Renderer;
use crate::scene::SphereField;
use crate::stats::{FpsCounter, FrameStats};

/// How often (in seconds) the window title is refreshed with frame stats.
const TITLE_REFRESH_INTERVAL: f32 = 0.25;

/// How often stats are written to the log (every N frames, ~5s at 60fps).
const STATS_LOG_INTERVAL: u64 = 300;

pub struct ViewOptions {
    pub width: u32,
    pub height: u32,
    pub grid_dim: usize,
}

/// Open a window and run the demo until closed.
pub fn run_view(options: ViewOptions) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("cullfield")
            .with_inner_size(LogicalSize::new(
                options.width as f64,
                options.height as f64,
            ))
            .build(&event_loop)
            .context("Failed to create window")?,
    );

    // WGPU init
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("Failed to create surface")?;
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| anyhow!("No suitable GPU adapter found"))?;
    let (device, queue) =
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
            .context("Failed to request device")?;

    let size = window.inner_size();
    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(caps.formats[0]);
    let mut config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let mut field = SphereField::grid(options.grid_dim);
    let mut camera = Camera::field_view(config.width as f32 / config.height as f32);
    let mut orbit = OrbitController::from_camera(&camera);
    let mut renderer = Renderer::new(device, queue, format, config.width, config.height, &field);

    log::info!("sphere field: {} spheres", field.len());

    let mut fps = FpsCounter::new();
    let mut last_frame = Instant::now();
    let mut title_timer = 0.0f32;
    let mut frame_count: u64 = 0;

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state == ElementState::Pressed
                                && event.logical_key == Key::Named(NamedKey::Escape)
                            {
                                elwt.exit();
                            }
                        }
                        WindowEvent::Resized(new_size) => {
                            if new_size.width > 0 && new_size.height > 0 {
                                config.width = new_size.width;
                                config.height = new_size.height;
                                surface.configure(renderer.device(), &config);
                                renderer.resize(new_size.width, new_size.height);
                                camera.set_aspect(new_size.width, new_size.height);
                            }
                        }
                        WindowEvent::MouseInput { state, button, .. } => {
                            if button == MouseButton::Left {
                                orbit.set_dragging(state == ElementState::Pressed);
                            }
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            orbit.on_cursor_moved(position.x, position.y);
                        }
                        WindowEvent::MouseWheel { delta, .. } => {
                            let steps = match delta {
                                MouseScrollDelta::LineDelta(_, y) => y,
                                MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                            };
                            orbit.dolly(steps);
                        }
                        WindowEvent::RedrawRequested => {
                            let now = Instant::now();
                            let dt = (now - last_frame).as_secs_f32();
                            last_frame = now;

                            orbit.apply(&mut camera);
                            field.advance();

                            let frame = match surface.get_current_texture() {
                                Ok(frame) => frame,
                                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                    surface.configure(renderer.device(), &config);
                                    return;
                                }
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    log::error!("Surface out of memory, exiting");
                                    elwt.exit();
                                    return;
                                }
                                Err(e) => {
                                    log::warn!("Dropped frame: {:?}", e);
                                    return;
                                }
                            };
                            let view = frame
                                .texture
                                .create_view(&wgpu::TextureViewDescriptor::default());

                            let report = renderer.render(&view, &field, &camera);
                            frame.present();

                            let stats = FrameStats {
                                fps: fps.tick(dt),
                                frame_ms: fps.frame_ms(),
                                spheres: report.spheres,
                                occluded: report.occluded,
                                drawn: report.drawn,
                                triangles: report.triangles,
                            };

                            title_timer += dt;
                            if title_timer >= TITLE_REFRESH_INTERVAL {
                                window.set_title(&stats.to_string());
                                title_timer = 0.0;
                            }

                            frame_count += 1;
                            if frame_count % STATS_LOG_INTERVAL == 0 {
                                log::info!(
                                    "{} (queries issued {}, results consumed {})",
                                    stats,
                                    report.queries_issued,
                                    report.results_consumed
                                );
                            }
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .context("Event loop failed")?;

    Ok(())
}
