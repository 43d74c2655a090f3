//! Frame driver for the software renderer. Builds a small demo level, walks
//! the view round it and reports how long the frames took.

mod camera;
mod cli;
mod config;
mod demo;

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

use cli::*;
use config::UserConfig;
use level::{Level, Palette, Player};
use log::{debug, info};
use math::FRACUNIT;
use render_soft::{RenderConfig, SoftwareRenderer};
use render_trait::{PixelBuffer, PlayViewRenderer, ScreenBuffer};
use simplelog::TermLogger;

use crate::camera::CameraPath;

const BASE_DIR: &str = "soft-bench/";

fn main() -> Result<(), Box<dyn Error>> {
    let mut options: CLIOptions = argh::from_env();

    let mut user_config = UserConfig::load()?;
    user_config.sync_cli(&mut options);

    TermLogger::init(
        options.verbose.unwrap_or(log::LevelFilter::Info),
        simplelog::ConfigBuilder::default()
            .set_time_level(log::LevelFilter::Trace)
            .build(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;
    user_config.write()?;

    let (pic_data, sprites) = demo::pic_data();
    let (mut level, mut player) = demo::level(&pic_data, &sprites);

    let config = RenderConfig::from(&options);
    let (width, height) = (options.width as usize, options.height as usize);
    let mut renderer = SoftwareRenderer::new(width, height, config)?;
    let mut buffer = ScreenBuffer::new(width, height);
    info!("Rendering {} frames at {width}x{height}, {config:?}", options.frames);

    let path = CameraPath::demo();
    let mut total = Duration::ZERO;
    let mut worst = Duration::ZERO;
    for frame in 0..options.frames {
        move_player(&mut level, &mut player, &path, frame as f64 / options.frames.max(1) as f64);

        let start = Instant::now();
        renderer.render_player_view(&player, &level, &pic_data, &mut buffer);
        let took = start.elapsed();
        total += took;
        worst = worst.max(took);
        debug!("Frame {frame}: {took:?}");
    }

    if options.frames > 0 {
        let avg = total / options.frames;
        info!(
            "Average frame {avg:?} ({:.1} fps), worst {worst:?}",
            1.0 / avg.as_secs_f64().max(f64::EPSILON)
        );
    }

    #[cfg(feature = "hprof")]
    coarse_prof::write(&mut std::io::stdout())?;

    if let Some(path) = options.dump.as_deref() {
        dump_ppm(path, &buffer, pic_data.palette())?;
        info!("Wrote last frame to {path}");
    }
    Ok(())
}

/// Place the player's object on the path. Each frame is one tick, so the
/// previous position is the last frame's.
fn move_player(level: &mut Level, player: &mut Player, path: &CameraPath, t: f64) {
    let (x, y, angle) = path.at(t);
    player.prev_angle = level.things[player.mobj].angle;
    player.prev_viewz = player.viewz;
    level.move_thing(player.mobj, x, y, 0);
    level.things[player.mobj].angle = angle;
    player.viewz = level.thing_sector(player.mobj).floorheight + demo::VIEWHEIGHT;
    level.tic_frac = FRACUNIT;
}

/// Binary PPM, the palette applied
fn dump_ppm(path: &str, buffer: &ScreenBuffer, palette: &Palette) -> std::io::Result<()> {
    let size = buffer.size();
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", size.width_usize(), size.height_usize())?;
    for y in 0..size.height_usize() {
        for x in 0..size.width_usize() {
            out.write_all(&palette[buffer.read_pixel(x, y) as usize])?;
        }
    }
    out.flush()
}
