//! Brickmarch headless driver
//!
//! Boots a compute-only Vulkan device, renders the default SDF scene with
//! two frames in flight while replaying a short editing script (adding and
//! removing edits, terrain brush strokes, a pick), and writes the last
//! frame to an image file.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p brickmarch-headless -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `-n, --frames <N>`: Number of frames to render (default: 8)
//! - `-o, --output <PATH>`: Output image path (default: brickmarch.png)
//! - `--size <WxH>`: Output size (default: 1280x720)
//! - `--shaders <DIR>`: Directory holding the compiled `.spv` programs
//! - `--pick <X,Y>`: Pixel to pick on the first frame (default: image center)
//! - `--validation`: Enable the Vulkan validation layer
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)
//! - `BRICKMARCH_SHADER_DIR`: Default shader directory

mod app;

use tracing_subscriber::EnvFilter;

use crate::app::HeadlessConfig;

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    init_logging();

    let config = HeadlessConfig::from_args()?;
    app::run(&config)
}

fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,brickmarch_render=trace,brickmarch_gpu=trace,brickmarch_headless=trace",
            )
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

fn print_help() {
    eprintln!(
        "Brickmarch headless driver

USAGE:
    brickmarch-headless [OPTIONS]

OPTIONS:
    -n, --frames <N>       Number of frames to render (default: 8)
    -o, --output <PATH>    Output image path (default: brickmarch.png)
        --size <WxH>       Output size (default: 1280x720)
        --shaders <DIR>    Directory holding sdf_raymarch.spv and terrain_brush.spv
        --pick <X,Y>       Pixel to pick on the first frame (default: image center)
        --validation       Enable the Vulkan validation layer
    -h, --help             Print this help message

ENVIRONMENT:
    RUST_LOG               Log filter (default: info)
    BRICKMARCH_SHADER_DIR  Default shader directory"
    );
}
