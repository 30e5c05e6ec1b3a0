use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;

use crate::app::{self, ViewOptions};
use crate::camera::Camera;
use crate::gpu::renderer::{Renderer, MAX_SPHERES};
use crate::scene::SphereField;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive window
    View {
        /// Window width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Window height
        #[arg(long, default_value_t = 720)]
        height: u32,

        /// Grid dimension (grid x grid spheres)
        #[arg(long, default_value_t = 10)]
        grid: usize,
    },

    /// Render frames to disk with an auto-orbiting camera
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Number of frames to render
        #[arg(long, default_value_t = 240)]
        frames: usize,

        /// Frames per second of the simulated clock
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Grid dimension (grid x grid spheres)
        #[arg(long, default_value_t = 10)]
        grid: usize,

        /// Orbit angular speed in radians per second
        #[arg(long, default_value_t = 0.25)]
        orbit_speed: f32,
    },
}

fn check_grid(grid: usize) -> Result<()> {
    if grid * grid > MAX_SPHERES {
        bail!(
            "grid {}x{} exceeds the {} sphere limit",
            grid,
            grid,
            MAX_SPHERES
        );
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::View {
            width,
            height,
            grid,
        } => {
            check_grid(grid)?;
            app::run_view(ViewOptions {
                width,
                height,
                grid_dim: grid,
            })?;
        }
        Commands::Render {
            out,
            frames,
            fps,
            width,
            height,
            grid,
            orbit_speed,
        } => {
            check_grid(grid)?;
            pollster::block_on(render_offline(
                out,
                frames,
                fps,
                width,
                height,
                grid,
                orbit_speed,
            ))?;
        }
    }
    Ok(())
}

async fn render_offline(
    out_dir: PathBuf,
    frames: usize,
    fps: f32,
    width: u32,
    height: u32,
    grid: usize,
    orbit_speed: f32,
) -> Result<()> {
    std::fs::create_dir_all(&out_dir)?;

    // WGPU Init
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };

    let texture = device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Buffer for reading back frames. Rows are padded to the 256-byte
    // alignment wgpu requires for texture-to-buffer copies.
    let u32_size = std::mem::size_of::<u32>() as u32;
    let unpadded_bytes_per_row = u32_size * width;
    let align = 256;
    let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
    let padded_bytes_per_row = unpadded_bytes_per_row + padded_bytes_per_row_padding;

    let output_buffer_size = (padded_bytes_per_row * height) as wgpu::BufferAddress;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: output_buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut field = SphereField::grid(grid);
    let mut camera = Camera::field_view(width as f32 / height as f32);
    let mut renderer = Renderer::new(device, queue, texture_desc.format, width, height, &field);

    println!("Rendering {} frames to {:?}...", frames, out_dir);

    let dt = 1.0 / fps.max(1.0);
    let mut last_report = Default::default();

    for i in 0..frames {
        // Auto-orbit well outside the field so occlusion comes and goes.
        let angle = i as f32 * dt * orbit_speed;
        camera.eye = Vec3::new(angle.cos() * 250.0, 80.0, angle.sin() * 250.0);

        field.advance();
        last_report = renderer.render(&texture_view, &field, &camera);

        // Copy texture to buffer
        let mut encoder = renderer
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture_desc.size,
        );

        renderer.queue().submit(Some(encoder.finish()));

        // Map buffer and save
        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        let _ = renderer.device().poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let data = buffer_slice.get_mapped_range();

        // Strip the row padding back out before encoding.
        let mut unpadded_data = Vec::with_capacity((width * height * 4) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + (width * 4) as usize;
            unpadded_data.extend_from_slice(&data[start..end]);
        }

        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        image::save_buffer(
            &frame_path,
            &unpadded_data,
            width,
            height,
            image::ColorType::Rgba8,
        )?;

        drop(data);
        output_buffer.unmap();

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }

    println!(
        "\nDone. Final frame: {} of {} spheres occluded.",
        last_report.occluded, last_report.spheres
    );

    Ok(())
}
