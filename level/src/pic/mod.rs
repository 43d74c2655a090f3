//! All data related to pictures the renderer samples from:
//! - Wall textures and sprite patches (column data with opaque posts)
//! - Flats
//! - Colourmaps and blend tables

mod sprites;
pub use sprites::*;

use std::sync::Arc;

use log::debug;
use math::{FRACBITS, Fixed};

/// Light levels in the colourmap lump, not counting the special maps
pub const NUMCOLORMAPS: usize = 32;
/// Index of the invulnerability map
pub const INVERSECOLORMAP: usize = 32;
const COLOURMAP_LEN: usize = 34;
/// Flats are always 64x64
pub const FLAT_SIZE: usize = 64 * 64;
/// Default blend percentage of the main translucency table
pub const TRANMAP_PERCENT: u32 = 66;

pub type Palette = [[u8; 3]; 256];

/// One run of opaque pixels in a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Post {
    pub topdelta: i32,
    pub length: i32,
}

/// A wall texture or sprite patch. Pixels are stored column major.
#[derive(Debug, Clone)]
pub struct Patch {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub left_offset: i32,
    pub top_offset: i32,
    /// Largest power of two not above the width, minus one
    pub widthmask: usize,
    pixels: Vec<u8>,
    posts: Vec<Vec<Post>>,
}

impl Patch {
    /// Build from row-major pixels where `None` is transparent
    pub fn from_pixels(
        name: &str,
        width: usize,
        height: usize,
        left_offset: i32,
        top_offset: i32,
        rows: &[Option<u8>],
    ) -> Self {
        assert_eq!(rows.len(), width * height, "Patch {name} has the wrong pixel count");
        let mut pixels = vec![0; width * height];
        let mut posts = Vec::with_capacity(width);
        for x in 0..width {
            let mut column_posts: Vec<Post> = Vec::new();
            let mut run: Option<Post> = None;
            for y in 0..height {
                match rows[y * width + x] {
                    Some(p) => {
                        pixels[x * height + y] = p;
                        match run.as_mut() {
                            Some(post) => post.length += 1,
                            None => {
                                run = Some(Post {
                                    topdelta: y as i32,
                                    length: 1,
                                })
                            }
                        }
                    }
                    None => {
                        if let Some(post) = run.take() {
                            column_posts.push(post);
                        }
                    }
                }
            }
            if let Some(post) = run.take() {
                column_posts.push(post);
            }
            posts.push(column_posts);
        }

        let mut mask = 1;
        while mask * 2 <= width {
            mask <<= 1;
        }

        Self {
            name: name.to_string(),
            width,
            height,
            left_offset,
            top_offset,
            widthmask: mask - 1,
            pixels,
            posts,
        }
    }

    /// Fully opaque texture from row-major pixels
    pub fn solid(name: &str, width: usize, height: usize, rows: &[u8]) -> Self {
        let rows: Vec<Option<u8>> = rows.iter().copied().map(Some).collect();
        Self::from_pixels(name, width, height, 0, 0, &rows)
    }

    /// Whole column of pixels, transparent parts are zero
    #[inline]
    pub fn column(&self, x: usize) -> &[u8] {
        let x = x % self.width;
        &self.pixels[x * self.height..(x + 1) * self.height]
    }

    #[inline]
    pub fn posts(&self, x: usize) -> &[Post] {
        &self.posts[x % self.width]
    }

    /// Height as fixed point
    pub const fn height_fixed(&self) -> Fixed {
        (self.height as Fixed) << FRACBITS
    }
}

#[derive(Debug, Clone)]
pub struct FlatPic {
    pub name: String,
    /// 64x64, row major
    pub data: Vec<u8>,
}

impl FlatPic {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), FLAT_SIZE, "Flat {name} must be 64x64");
        Self {
            name: name.to_string(),
            data,
        }
    }
}

/// Everything the renderer samples from. Shared data is behind `Arc` so
/// that draw tasks on worker threads can hold on to it.
#[derive(Debug, Clone)]
pub struct PicData {
    palette: Palette,
    /// 34 blocks of 256, each an index in to the palette
    colourmaps: Arc<[u8]>,
    /// Blend tables, the first is the main table
    tranmaps: Vec<Arc<[u8]>>,
    walls: Vec<Arc<Patch>>,
    /// Used in animations
    wall_translation: Vec<usize>,
    flats: Vec<Arc<FlatPic>>,
    /// Used in animations
    flat_translation: Vec<usize>,
    sprite_patches: Vec<Arc<Patch>>,
    sprite_defs: Vec<SpriteDef>,
    /// The flat number that signifies a sky should be drawn
    sky_flat: usize,
    sky_texture: usize,
    sky_texture_mid: Fixed,
}

impl PicData {
    /// Build colourmaps and the main blend table from a palette. Wall slot 0
    /// and flat slot 0 are reserved as "no texture".
    pub fn new(palette: Palette) -> Self {
        let colourmaps = build_colourmaps(&palette);
        let main_tranmap = build_tranmap(&palette, TRANMAP_PERCENT);
        debug!("Built {COLOURMAP_LEN} colourmaps and main blend table");

        let mut pic = Self {
            palette,
            colourmaps: colourmaps.into(),
            tranmaps: vec![main_tranmap.into()],
            walls: Vec::new(),
            wall_translation: Vec::new(),
            flats: Vec::new(),
            flat_translation: Vec::new(),
            sprite_patches: Vec::new(),
            sprite_defs: Vec::new(),
            sky_flat: 0,
            sky_texture: 0,
            sky_texture_mid: 100 << FRACBITS,
        };
        pic.add_wall(Patch::solid("-", 1, 1, &[0]));
        pic.add_flat(FlatPic::new("-", vec![0; FLAT_SIZE]));
        pic
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn add_wall(&mut self, pic: Patch) -> usize {
        self.walls.push(Arc::new(pic));
        self.wall_translation.push(self.walls.len() - 1);
        self.walls.len() - 1
    }

    pub fn add_flat(&mut self, pic: FlatPic) -> usize {
        self.flats.push(Arc::new(pic));
        self.flat_translation.push(self.flats.len() - 1);
        self.flats.len() - 1
    }

    pub fn add_sprite_patch(&mut self, pic: Patch) -> usize {
        self.sprite_patches.push(Arc::new(pic));
        self.sprite_patches.len() - 1
    }

    /// Install a sprite from lumps named in the `NAMEfr` or `NAMEfrFR`
    /// style, paired with their patch index. See `SpriteDef::from_lumps`.
    pub fn add_sprite(&mut self, name: &str, lumps: &[(&str, usize)]) -> usize {
        self.sprite_defs.push(SpriteDef::from_lumps(name, lumps));
        self.sprite_defs.len() - 1
    }

    pub fn add_tranmap(&mut self, percent: u32) -> usize {
        self.tranmaps.push(build_tranmap(&self.palette, percent).into());
        self.tranmaps.len() - 1
    }

    /// Flat used as the sky marker, and the texture drawn for it
    pub fn set_sky(&mut self, sky_flat: usize, sky_texture: usize) {
        self.sky_flat = sky_flat;
        self.sky_texture = sky_texture;
    }

    /// Animate a wall by pointing its number at another texture
    pub fn set_wall_translation(&mut self, wall: usize, to: usize) {
        self.wall_translation[wall] = to;
    }

    pub fn set_flat_translation(&mut self, flat: usize, to: usize) {
        self.flat_translation[flat] = to;
    }

    #[inline]
    pub fn sky_flat(&self) -> usize {
        self.sky_flat
    }

    #[inline]
    pub fn sky_texture(&self) -> usize {
        self.sky_texture
    }

    #[inline]
    pub fn sky_texture_mid(&self) -> Fixed {
        self.sky_texture_mid
    }

    pub fn colourmaps(&self) -> &Arc<[u8]> {
        &self.colourmaps
    }

    /// A 256 entry light map
    pub fn colourmap(&self, index: usize) -> &[u8] {
        &self.colourmaps[index * 256..(index + 1) * 256]
    }

    pub fn tranmap(&self, index: usize) -> &Arc<[u8]> {
        &self.tranmaps[index]
    }

    pub fn main_tranmap(&self) -> &Arc<[u8]> {
        &self.tranmaps[0]
    }

    /// Wall texture after animation translation
    #[inline]
    pub fn wall(&self, num: usize) -> &Arc<Patch> {
        &self.walls[self.wall_translation[num]]
    }

    #[inline]
    pub fn wall_height(&self, num: usize) -> Fixed {
        self.wall(num).height_fixed()
    }

    /// Flat after animation translation
    #[inline]
    pub fn flat(&self, num: usize) -> &Arc<FlatPic> {
        &self.flats[self.flat_translation[num]]
    }

    pub fn num_walls(&self) -> usize {
        self.walls.len()
    }

    pub fn num_sprites(&self) -> usize {
        self.sprite_defs.len()
    }

    pub fn wall_num_for_name(&self, name: &str) -> Option<usize> {
        self.walls.iter().position(|w| w.name == name)
    }

    pub fn flat_num_for_name(&self, name: &str) -> Option<usize> {
        self.flats.iter().position(|f| f.name == name)
    }

    /// Fatal on a bad index, that is corrupt data
    pub fn sprite_def(&self, sprite_num: usize) -> &SpriteDef {
        match self.sprite_defs.get(sprite_num) {
            Some(def) => def,
            None => panic!("R_ProjectSprite: Invalid sprite number {sprite_num}"),
        }
    }

    pub fn sprite_patch(&self, patch_num: usize) -> &Arc<Patch> {
        &self.sprite_patches[patch_num]
    }
}

fn nearest_colour(palette: &Palette, r: i32, g: i32, b: i32) -> u8 {
    let mut best = 0;
    let mut best_dist = i32::MAX;
    for (i, c) in palette.iter().enumerate() {
        let dr = c[0] as i32 - r;
        let dg = c[1] as i32 - g;
        let db = c[2] as i32 - b;
        let dist = dr * dr + dg * dg + db * db;
        if dist < best_dist {
            best_dist = dist;
            best = i;
            if dist == 0 {
                break;
            }
        }
    }
    best as u8
}

/// 32 diminishing light maps, an inverse grey map, and an all black map
fn build_colourmaps(palette: &Palette) -> Vec<u8> {
    let mut maps = vec![0; COLOURMAP_LEN * 256];
    for level in 0..NUMCOLORMAPS {
        let scale = (NUMCOLORMAPS - level) as i32;
        for (c, rgb) in palette.iter().enumerate() {
            maps[level * 256 + c] = nearest_colour(
                palette,
                rgb[0] as i32 * scale / NUMCOLORMAPS as i32,
                rgb[1] as i32 * scale / NUMCOLORMAPS as i32,
                rgb[2] as i32 * scale / NUMCOLORMAPS as i32,
            );
        }
    }
    for (c, rgb) in palette.iter().enumerate() {
        let grey = 255 - (rgb[0] as i32 * 3 + rgb[1] as i32 * 6 + rgb[2] as i32) / 10;
        maps[INVERSECOLORMAP * 256 + c] = nearest_colour(palette, grey, grey, grey);
    }
    let black = nearest_colour(palette, 0, 0, 0);
    maps[(INVERSECOLORMAP + 1) * 256..].fill(black);
    maps
}

/// Rows are the background colour, columns the foreground
fn build_tranmap(palette: &Palette, percent: u32) -> Vec<u8> {
    let fg_w = percent.min(100) as i32;
    let bg_w = 100 - fg_w;
    let mut map = vec![0; 256 * 256];
    for (bg, b) in palette.iter().enumerate() {
        for (fg, f) in palette.iter().enumerate() {
            let mix = |i: usize| (f[i] as i32 * fg_w + b[i] as i32 * bg_w) / 100;
            map[(bg << 8) + fg] = nearest_colour(palette, mix(0), mix(1), mix(2));
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey_palette() -> Palette {
        let mut pal = [[0; 3]; 256];
        for (i, c) in pal.iter_mut().enumerate() {
            *c = [i as u8, i as u8, i as u8];
        }
        pal
    }

    #[test]
    fn patch_posts() {
        let rows = [
            Some(1), None, //
            Some(2), Some(7), //
            None, Some(8), //
        ];
        let p = Patch::from_pixels("TEST", 2, 3, 1, 3, &rows);
        assert_eq!(p.posts(0), &[Post { topdelta: 0, length: 2 }]);
        assert_eq!(p.posts(1), &[Post { topdelta: 1, length: 2 }]);
        assert_eq!(p.column(0), &[1, 2, 0]);
        assert_eq!(p.column(1), &[0, 7, 8]);
        assert_eq!(p.widthmask, 1);
    }

    #[test]
    fn widthmask_is_power_of_two() {
        let p = Patch::solid("W", 96, 1, &[0; 96]);
        assert_eq!(p.widthmask, 63);
    }

    #[test]
    fn colourmaps_darken() {
        let pic = PicData::new(grey_palette());
        assert_eq!(pic.colourmap(0)[200], 200);
        assert_eq!(pic.colourmap(16)[200], 100);
        assert!(pic.colourmap(31)[200] < 10);
        assert_eq!(pic.colourmap(INVERSECOLORMAP)[255], 0);
        assert!(pic.colourmap(INVERSECOLORMAP + 1).iter().all(|c| *c == 0));
    }

    #[test]
    fn main_tranmap_blends() {
        let pic = PicData::new(grey_palette());
        let map = pic.main_tranmap();
        assert_eq!(map[(0 << 8) + 100], 66);
        assert_eq!(map[(100 << 8) + 100], 100);
    }

    #[test]
    fn reserved_slots_and_translation() {
        let mut pic = PicData::new(grey_palette());
        assert_eq!(pic.num_walls(), 1);
        let a = pic.add_wall(Patch::solid("A", 1, 1, &[1]));
        let b = pic.add_wall(Patch::solid("B", 1, 1, &[2]));
        pic.set_wall_translation(a, b);
        assert_eq!(pic.wall(a).name, "B");
        assert_eq!(pic.wall_num_for_name("A"), Some(a));
    }
}
