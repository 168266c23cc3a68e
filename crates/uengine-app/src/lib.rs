//! Application framework for uengine.
//!
//! This crate handles the boilerplate around the graphics core:
//! - Logging setup
//! - Window, GPU context and UI layer creation
//! - The frame loop and its pacing
//! - Teardown once the GPU is idle
//!
//! # Example
//!
//! ```no_run
//! use uengine_app::{run_app, AppConfig, AppContext, UengineApp};
//!
//! struct MyApp;
//!
//! impl UengineApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My App").from_args())
//! }
//! ```

mod app;
mod config;
mod context;
mod runner;

pub use app::UengineApp;
pub use config::AppConfig;
pub use context::AppContext;
pub use runner::{init_logging, run_app};

pub use uengine_gpu::{egui, Drawable, DrawableToken, GpuContext, ResourceFactory, UiFrame};
pub use winit::event::WindowEvent;
