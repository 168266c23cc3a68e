//! uengine sprite editor shell
//!
//! Opens the editor window and renders the sprite preview.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p uengine-editor -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--width <N>`, `--height <N>`: Window size (default: 1200x600)
//! - `--fps <N>`: Frame rate cap (default: 120, 0 for uncapped)
//! - `--validation`, `--no-validation`: Toggle Vulkan validation layers
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod drawables;
mod editor;

use uengine_app::{run_app, AppConfig};

use crate::editor::Editor;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 600;
const TARGET_FPS: u32 = 120;
const CLEAR_COLOR: [f32; 4] = [0.08, 0.08, 0.1, 1.0];

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Editor>(
        AppConfig::new("uengine editor")
            .with_size(WIDTH, HEIGHT)
            .with_target_fps(TARGET_FPS)
            .with_clear_color(CLEAR_COLOR)
            .from_args(),
    )
}

fn print_help() {
    eprintln!(
        "uengine sprite editor

USAGE:
    cargo run -p uengine-editor -- [OPTIONS]

OPTIONS:
    --width <N>         Window width (default: {WIDTH})
    --height <N>        Window height (default: {HEIGHT})
    --fps <N>           Frame rate cap, 0 for uncapped (default: {TARGET_FPS})
    --validation        Enable Vulkan validation layers
    --no-validation     Disable Vulkan validation layers
    -h, --help          Print this help message"
    );
}
