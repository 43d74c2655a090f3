use argh::FromArgs;
use log::LevelFilter;
use render_soft::RenderConfig;

/// Render the demo level along a camera path and report frame times
#[derive(Debug, Clone, FromArgs)]
pub struct CLIOptions {
    /// verbose level: off, error, warn, info, debug
    #[argh(option)]
    pub verbose: Option<LevelFilter>,
    /// view width in pixels
    #[argh(option, default = "0")]
    pub width: u32,
    /// view height in pixels
    #[argh(option, default = "0")]
    pub height: u32,
    /// worker threads for the column and span drawers, 0 draws everything
    /// on the main thread
    #[argh(option)]
    pub threads: Option<u32>,
    /// number of frames to render
    #[argh(option, default = "0")]
    pub frames: u32,
    /// keep sky columns and flat spans on the main thread
    #[argh(switch)]
    pub serial: bool,
    /// write the last frame to this path as a binary PPM
    #[argh(option)]
    pub dump: Option<String>,
}

impl From<&CLIOptions> for RenderConfig {
    fn from(o: &CLIOptions) -> Self {
        let threads = o.threads.unwrap_or(0) as usize;
        RenderConfig {
            threads,
            parallel_sky: !o.serial && threads > 0,
            parallel_spans: !o.serial && threads > 0,
        }
    }
}
