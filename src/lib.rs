pub mod camera;
pub mod gpu;
pub mod occlusion;
pub mod scene;
pub mod stats;

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
