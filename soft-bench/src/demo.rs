//! The demo level: a hall with a polyobject pillar and a deep water pool,
//! looking out through a grated window on to an open sky yard.

use level::{
    FF_FULLBRIGHT, FlatPic, Level, LineDefFlags, MapBuilder, MapObjFlag, MapObject, Palette,
    Patch, PicData, Player, PspState, Sector, SideDef,
};
use log::debug;
use math::{ANG90, FRACUNIT, Fixed, int_to_fixed};

/// Eye height above the floor
pub const VIEWHEIGHT: Fixed = 41 * FRACUNIT;

/// Colour ramps of 16 shades, dark to light
const RAMPS: [[u8; 3]; 16] = [
    [255, 255, 255],
    [255, 200, 160],
    [200, 60, 40],
    [240, 220, 100],
    [160, 110, 60],
    [120, 120, 140],
    [90, 140, 220],
    [60, 200, 60],
    [180, 180, 180],
    [220, 120, 40],
    [140, 60, 160],
    [60, 160, 160],
    [200, 160, 120],
    [100, 80, 60],
    [240, 240, 200],
    [80, 40, 30],
];

/// Sixteen ramps with green at `0x70..=0x7f` for the player translations
pub fn palette() -> Palette {
    let mut pal = [[0; 3]; 256];
    for (ramp, rgb) in RAMPS.iter().enumerate() {
        for shade in 0..16 {
            let c = &mut pal[ramp * 16 + shade];
            for i in 0..3 {
                c[i] = (rgb[i] as u32 * (shade as u32 + 1) / 16) as u8;
            }
        }
    }
    pal
}

const fn ramp(ramp: u8, shade: u8) -> u8 {
    ramp * 16 + shade
}

fn bricks(width: usize, height: usize) -> Patch {
    let mut rows = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let offset = if (y / 16) % 2 == 0 { 0 } else { 16 };
            let mortar = y % 16 == 0 || (x + offset) % 32 == 0;
            rows.push(if mortar {
                ramp(8, 6)
            } else {
                ramp(2, 9 + ((x * 7 + y * 3) % 5) as u8)
            });
        }
    }
    Patch::solid("BRICK", width, height, &rows)
}

fn metal() -> Patch {
    let rows: Vec<u8> = (0..64 * 64)
        .map(|i| {
            let (x, y) = (i % 64, i / 64);
            if x % 16 == 0 || y % 16 == 0 {
                ramp(5, 5)
            } else {
                ramp(5, 10 + ((x + y) % 3) as u8)
            }
        })
        .collect();
    Patch::solid("METAL", 64, 64, &rows)
}

/// Bars every eighth column and a rail every sixteenth row, see through
/// elsewhere
fn grate() -> Patch {
    let rows: Vec<Option<u8>> = (0..64 * 128)
        .map(|i| {
            let (x, y) = (i % 64, i / 64);
            (x % 8 < 2 || y % 16 < 2).then_some(ramp(13, 8 + (x % 8) as u8))
        })
        .collect();
    Patch::from_pixels("GRATE", 64, 128, 0, 0, &rows)
}

fn sky() -> Patch {
    let rows: Vec<u8> = (0..256 * 128)
        .map(|i| {
            let (x, y) = (i % 256, i / 256);
            let cloud = ((x / 24 + y / 12) % 5 == 0) as u8 * 3;
            ramp(6, (15 - (y / 10) as u8).max(4) - cloud)
        })
        .collect();
    Patch::solid("SKY1", 256, 128, &rows)
}

fn flat(name: &str, f: impl Fn(usize, usize) -> u8) -> FlatPic {
    FlatPic::new(name, (0..64 * 64).map(|i| f(i % 64, i / 64)).collect())
}

/// A humanoid-ish blob, shaded per rotation so turning is visible
fn figure(name: &str, ramp_num: u8, shade: u8) -> Patch {
    let (w, h) = (32, 56);
    let mut rows = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as i32 - 16;
            let head = y < 14 && dx * dx + (y as i32 - 7) * (y as i32 - 7) < 40;
            let body = (14..40).contains(&y) && dx.abs() < 11;
            let legs = y >= 40 && (3..9).contains(&dx.abs());
            let edge = x < w / 3;
            rows.push((head || body || legs).then_some(ramp(ramp_num, if edge { shade - 3 } else { shade })));
        }
    }
    Patch::from_pixels(name, w, h, 16, 52, &rows)
}

fn weapon() -> Patch {
    let (w, h) = (48, 40);
    let rows: Vec<Option<u8>> = (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            let barrel = (18..30).contains(&x) && y < 24;
            let grip = (10..38).contains(&x) && y >= 24;
            (barrel || grip).then_some(ramp(5, if x < 22 { 6 } else { 11 }))
        })
        .collect();
    // Offsets place it at the bottom middle of a 320x200 view
    Patch::from_pixels("PISGA0", w, h, -135, -128, &rows)
}

/// Sprite numbers in the demo `PicData`
pub struct DemoSprites {
    pub figure: usize,
    pub weapon: usize,
}

pub fn pic_data() -> (PicData, DemoSprites) {
    let mut pic = PicData::new(palette());
    pic.add_wall(bricks(64, 128));
    pic.add_wall(metal());
    pic.add_wall(grate());

    pic.add_flat(flat("FLOOR", |x, y| {
        if (x / 32 + y / 32) % 2 == 0 { ramp(12, 9) } else { ramp(13, 10) }
    }));
    pic.add_flat(flat("CEIL", |x, y| ramp(8, 5 + ((x ^ y) % 3) as u8)));
    pic.add_flat(flat("WATER", |x, y| ramp(11, 6 + ((x / 4 + y / 8) % 4) as u8)));
    pic.add_flat(flat("GRASS", |x, y| ramp(7, 6 + ((x * 3 + y * 5) % 4) as u8)));

    let sky_flat = pic.add_flat(flat("F_SKY1", |_, _| 0));
    let sky_tex = pic.add_wall(sky());
    pic.set_sky(sky_flat, sky_tex);

    // Five drawn rotations, the rest are mirrored
    let mut lumps = Vec::new();
    for (name, shade) in [("POSSA1", 14), ("POSSA2A8", 12), ("POSSA3A7", 10), ("POSSA4A6", 8), ("POSSA5", 7)] {
        lumps.push((name, pic.add_sprite_patch(figure(name, 4, shade))));
    }
    let figure = pic.add_sprite("POSS", &lumps);
    let gun = pic.add_sprite_patch(weapon());
    let weapon = pic.add_sprite("PISG", &[("PISGA0", gun)]);
    (pic, DemoSprites { figure, weapon })
}

fn named(pic: &PicData, wall: &str) -> usize {
    pic.wall_num_for_name(wall).unwrap_or_default()
}

fn named_flat(pic: &PicData, flat: &str) -> usize {
    pic.flat_num_for_name(flat).unwrap_or_default()
}

/// Counter clockwise square of lines, fronts facing out
fn square(
    b: &mut MapBuilder,
    (x1, y1): (i32, i32),
    (x2, y2): (i32, i32),
    front: SideDef,
    back: Option<SideDef>,
    flags: u32,
) -> Vec<usize> {
    let pts = [(x1, y1), (x2, y1), (x2, y2), (x1, y2)];
    (0..4)
        .map(|i| b.add_line(pts[i], pts[(i + 1) % 4], front.clone(), back.clone(), flags))
        .collect()
}

pub fn level(pic: &PicData, sprites: &DemoSprites) -> (Level, Player) {
    let brick = named(pic, "BRICK");
    let metal = named(pic, "METAL");
    let grate = named(pic, "GRATE");
    let floor = named_flat(pic, "FLOOR");
    let ceil = named_flat(pic, "CEIL");
    let water = named_flat(pic, "WATER");
    let grass = named_flat(pic, "GRASS");

    let mut b = MapBuilder::new();
    let hall = b.add_sector(Sector::new(0, int_to_fixed(192), floor, ceil, 192));
    let yard = b.add_sector(Sector::new(int_to_fixed(16), int_to_fixed(256), grass, pic.sky_flat(), 255));
    let pool = b.add_sector(Sector::new(int_to_fixed(-64), int_to_fixed(192), water, ceil, 160));
    // Never linked in, only holds the water surface for the pool
    let surface = b.add_sector(Sector::new(int_to_fixed(-8), int_to_fixed(192), water, ceil, 160));
    b.sector_mut(pool).heightsec = Some(surface);

    let wall = |s: usize| SideDef::new(s, 0, brick, 0);
    let block = LineDefFlags::BLOCKING;

    // Hall, x 0..1024 y 0..768
    b.add_line((0, 0), (0, 768), wall(hall), None, block);
    b.add_line((1024, 0), (0, 0), wall(hall), None, block);
    b.add_line((1024, 768), (1024, 0), wall(hall), None, block);
    b.add_line((0, 768), (384, 768), wall(hall), None, block);
    b.add_line((640, 768), (1024, 768), wall(hall), None, block);
    let window = b.add_line(
        (384, 768),
        (640, 768),
        SideDef::new(hall, brick, grate, brick),
        Some(SideDef::new(yard, brick, grate, brick)),
        block,
    );
    b.line_mut(window).tranlump = Some(0);

    // Yard, y 768..1280
    b.add_line((0, 768), (0, 1280), wall(yard), None, block);
    b.add_line((0, 1280), (1024, 1280), wall(yard), None, block);
    b.add_line((1024, 1280), (1024, 768), wall(yard), None, block);
    b.add_line((384, 768), (0, 768), wall(yard), None, block);
    b.add_line((1024, 768), (640, 768), wall(yard), None, block);

    // Pool in the hall floor
    square(
        &mut b,
        (640, 128),
        (896, 384),
        SideDef::new(hall, 0, 0, brick),
        Some(SideDef::new(pool, 0, 0, brick)),
        0,
    );

    // A free standing pillar
    let pillar = square(&mut b, (200, 400), (264, 464), SideDef::new(hall, 0, metal, 0), None, block);
    b.add_polyobj(pillar);

    let mut level = Level::new(b.build());
    debug!(
        "Demo level: {} sectors, {} lines",
        level.map_data.sectors.len(),
        level.map_data.linedefs.len()
    );

    let spawn = |level: &mut Level, x: i32, y: i32, z: i32, angle: u32, flags: u64| {
        let mut thing = MapObject::new(int_to_fixed(x), int_to_fixed(y), int_to_fixed(z), angle, sprites.figure, 0);
        thing.flags = flags;
        level.spawn_thing(thing)
    };
    spawn(&mut level, 512, 512, 0, 0, 0);
    spawn(&mut level, 300, 200, 0, ANG90, 0);
    spawn(&mut level, 512, 1000, 16, ANG90 * 3, 0);
    spawn(&mut level, 800, 1100, 16, ANG90 * 2, 0);
    // Spectre
    spawn(&mut level, 700, 600, 0, ANG90, MapObjFlag::SHADOW);
    spawn(&mut level, 150, 650, 0, 0, MapObjFlag::TRANSLUCENT);
    // Second player colours
    spawn(&mut level, 850, 600, 0, ANG90 * 2, 2 << MapObjFlag::TRANSSHIFT);
    // Wading in the pool
    let wader = spawn(&mut level, 768, 256, -64, ANG90, 0);
    level.things[wader].floorclip = int_to_fixed(10);
    let lit = spawn(&mut level, 400, 650, 0, 0, 0);
    level.things[lit].frame = FF_FULLBRIGHT;

    let mobj = level.spawn_thing(MapObject::new(int_to_fixed(100), int_to_fixed(100), 0, 0, sprites.figure, 0));
    let mut player = Player::new(mobj, VIEWHEIGHT, 0);
    player.psprites[0].state = Some(PspState {
        sprite: sprites.weapon,
        frame: 0,
    });
    player.psprites[0].sx = FRACUNIT;
    player.psprites[0].sy = 32 * FRACUNIT;
    (level, player)
}
