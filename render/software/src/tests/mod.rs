//! Whole renderer scenarios on levels put together with `MapBuilder`

mod frames;
mod walls;

use level::{
    FF_FULLBRIGHT, FlatPic, Level, MapBuilder, MapObject, Palette, Patch, PicData, Player, Sector,
    SideDef,
};
use math::{ANG90, Fixed, int_to_fixed};
use render_trait::{PixelBuffer, PlayViewRenderer, ScreenBuffer};

use crate::{RenderConfig, SoftwareRenderer};

/// Colour of every opaque texel of the thing sprite
pub(crate) const SPRITE_COLOUR: u8 = 250;
/// Colour of the weapon overlay
pub(crate) const WEAPON_COLOUR: u8 = 240;
pub(crate) const VIEW_HEIGHT: Fixed = 41 << 16;

pub(crate) struct Scene {
    pub level: Level,
    pub player: Player,
    pub pic_data: PicData,
}

fn grey_palette() -> Palette {
    let mut pal = [[0; 3]; 256];
    for (i, c) in pal.iter_mut().enumerate() {
        *c = [i as u8, i as u8, i as u8];
    }
    pal
}

/// A striped wall, a checked floor, a sky and one sprite with a single
/// rotation
pub(crate) fn pic_data() -> PicData {
    let mut pic = PicData::new(grey_palette());

    let wall: Vec<u8> = (0..64 * 128).map(|i| 20 + ((i % 64) / 8) as u8 * 8).collect();
    pic.add_wall(Patch::solid("STRIPES", 64, 128, &wall));

    let floor: Vec<u8> = (0..64 * 64)
        .map(|i| if ((i % 64) / 8 + (i / 64) / 8) % 2 == 0 { 120 } else { 140 })
        .collect();
    pic.add_flat(FlatPic::new("CHECKS", floor));

    let sky_flat = pic.add_flat(FlatPic::new("F_SKY1", vec![0; 64 * 64]));
    let sky: Vec<u8> = (0..256 * 128).map(|i| 180 + (i / 256 / 16) as u8).collect();
    let sky_tex = pic.add_wall(Patch::solid("SKY1", 256, 128, &sky));
    pic.set_sky(sky_flat, sky_tex);

    // 16x32 with a clear border column on each side
    let rows: Vec<Option<u8>> = (0..16 * 32)
        .map(|i| {
            let x = i % 16;
            (x != 0 && x != 15).then_some(SPRITE_COLOUR)
        })
        .collect();
    let thing = pic.add_sprite_patch(Patch::from_pixels("TROOA0", 16, 32, 8, 32, &rows));
    pic.add_sprite("TROO", &[("TROOA0", thing)]);

    let gun: Vec<Option<u8>> = vec![Some(WEAPON_COLOUR); 32 * 32];
    let gun = pic.add_sprite_patch(Patch::from_pixels("PISGA0", 32, 32, 16, 32, &gun));
    pic.add_sprite("PISG", &[("PISGA0", gun)]);
    pic
}

pub(crate) fn open_sector(floor: i32, ceiling: i32) -> Sector {
    Sector::new(int_to_fixed(floor), int_to_fixed(ceiling), 1, 1, 255)
}

/// Player standing at `(x, y)` facing north
pub(crate) fn spawn_player(level: &mut Level, x: i32, y: i32) -> Player {
    let mobj = MapObject::new(int_to_fixed(x), int_to_fixed(y), 0, ANG90, 0, 0);
    let idx = level.spawn_thing(mobj);
    let viewz = level.thing_sector(idx).floorheight + VIEW_HEIGHT;
    Player::new(idx, viewz, ANG90)
}

/// One square room, 512 wide, the player near the south wall
pub(crate) fn room() -> Scene {
    let mut b = MapBuilder::new();
    let s = b.add_sector(open_sector(0, 128));
    b.add_room(s, (0, 0), (512, 512), 1);
    let mut level = Level::new(b.build());
    let player = spawn_player(&mut level, 256, 64);
    Scene {
        level,
        player,
        pic_data: pic_data(),
    }
}

/// Two rooms joined by a window with a raised sill and lowered lintel,
/// and a sky over the far room
pub(crate) fn window_rooms() -> Scene {
    let mut b = MapBuilder::new();
    let near = b.add_sector(open_sector(0, 128));
    let far = b.add_sector(open_sector(24, 160));
    b.sector_mut(far).ceilingpic = 2;
    let side = |s: usize| SideDef::new(s, 1, 0, 1);
    let mid = |s: usize| SideDef::new(s, 0, 1, 0);

    // Near room: x 0..512, y 0..256
    b.add_line((0, 0), (0, 256), mid(near), None, 0);
    b.add_line((512, 256), (512, 0), mid(near), None, 0);
    b.add_line((512, 0), (0, 0), mid(near), None, 0);
    // Dividing wall with a window from 192 to 320
    b.add_line((0, 256), (192, 256), mid(near), None, 0);
    b.add_line((320, 256), (512, 256), mid(near), None, 0);
    b.add_line((192, 256), (320, 256), side(near), Some(side(far)), 0);
    // Far room: y 256..640
    b.add_line((0, 256), (0, 640), mid(far), None, 0);
    b.add_line((0, 640), (512, 640), mid(far), None, 0);
    b.add_line((512, 640), (512, 256), mid(far), None, 0);
    b.add_line((192, 256), (0, 256), mid(far), None, 0);
    b.add_line((512, 256), (320, 256), mid(far), None, 0);

    let mut level = Level::new(b.build());
    let player = spawn_player(&mut level, 256, 64);
    Scene {
        level,
        player,
        pic_data: pic_data(),
    }
}

/// A fullbright thing of the test sprite standing at `(x, y, z)`
pub(crate) fn add_thing(level: &mut Level, x: i32, y: i32, z: i32) -> usize {
    level.spawn_thing(MapObject::new(
        int_to_fixed(x),
        int_to_fixed(y),
        int_to_fixed(z),
        0,
        0,
        FF_FULLBRIGHT,
    ))
}

pub(crate) fn renderer(width: usize, height: usize, config: RenderConfig) -> SoftwareRenderer {
    SoftwareRenderer::new(width, height, config).expect("renderer threads")
}

pub(crate) fn serial() -> RenderConfig {
    RenderConfig {
        threads: 0,
        parallel_sky: false,
        parallel_spans: false,
    }
}

/// One full frame in to a fresh buffer
pub(crate) fn render_frame(r: &mut SoftwareRenderer, scene: &Scene, buffer: &mut ScreenBuffer) {
    buffer.clear();
    r.render_player_view(&scene.player, &scene.level, &scene.pic_data, buffer);
}

pub(crate) fn frame_pixels(r: &mut SoftwareRenderer, scene: &Scene) -> Vec<u8> {
    let size = r.view_tables().width as usize;
    let height = r.view_tables().height as usize;
    let mut buffer = ScreenBuffer::new(size, height);
    render_frame(r, scene, &mut buffer);
    buffer.buf().to_vec()
}
