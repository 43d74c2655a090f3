use std::fmt::Debug;

use math::{Angle, Fixed};

pub const SIL_NONE: i32 = 0;
pub const SIL_BOTTOM: i32 = 1;
pub const SIL_TOP: i32 = 2;
pub const SIL_BOTH: i32 = 3;

/// Starting capacity, the arrays grow past this when a scene needs it
pub const MAXDRAWSEGS: usize = 256;
pub const MAXVISSPRITES: usize = 128;
/// Size of the visplane hash table
pub const MAXVISPLANES: usize = 256;

/// Marks an unused column in a visplane. Also used in `maskedtexturecol`
/// for a column that has been drawn already.
pub const PLANE_UNUSED: i32 = i16::MAX as i32;

// Lighting constants
pub const LIGHTLEVELS: usize = 16;
pub const LIGHTSEGSHIFT: i32 = 4;
pub const MAXLIGHTSCALE: usize = 48;
pub const LIGHTSCALESHIFT: i32 = 12;
pub const MAXLIGHTZ: usize = 128;
pub const LIGHTZSHIFT: i32 = 20;
pub const DISTMAP: i32 = 2;

/// Line visibility classification, cached per line each frame
pub const RF_TOP_TILE: u32 = 1;
pub const RF_MID_TILE: u32 = 2;
pub const RF_BOT_TILE: u32 = 4;
/// Line is invisible, the sectors on both sides draw the same
pub const RF_IGNORE: u32 = 8;
/// Line blocks sight
pub const RF_CLOSED: u32 = 16;

/// Where a drawseg's sprite clip values come from. The `Openings` offset is
/// adjusted so that indexing with the screen column works directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipArray {
    /// Every value is the view height
    ScreenHeight,
    /// Every value is -1
    NegOne,
    Openings(isize),
}

#[derive(Debug, Clone, Copy)]
pub struct DrawSeg {
    /// Index in to the map segments
    pub curline: usize,
    pub x1: i32,
    pub x2: i32,

    pub scale1: Fixed,
    pub scale2: Fixed,
    pub scalestep: Fixed,

    /// 0=none, 1=bottom, 2=top, 3=both
    pub silhouette: i32,

    /// do not clip sprites above this
    pub bsilheight: Fixed,

    /// do not clip sprites below this
    pub tsilheight: Fixed,

    pub sprtopclip: Option<ClipArray>,
    pub sprbottomclip: Option<ClipArray>,

    /// Offset in to `openings`, indexed by screen column
    pub maskedtexturecol: Option<isize>,
}

impl DrawSeg {
    pub fn new(curline: usize) -> Self {
        DrawSeg {
            curline,
            x1: 0,
            x2: 0,
            scale1: 0,
            scale2: 0,
            scalestep: 0,
            silhouette: SIL_NONE,
            bsilheight: 0,
            tsilheight: 0,
            sprtopclip: None,
            sprbottomclip: None,
            maskedtexturecol: None,
        }
    }
}

/// Everything that must match for two surfaces to share a visplane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneKey {
    pub height: Fixed,
    /// Flat number, or `PL_SKYFLAT | line` for a transferred sky
    pub picnum: u32,
    pub lightlevel: i32,
    pub special: i32,
    pub xoffs: Fixed,
    pub yoffs: Fixed,
    pub rotation: Angle,
    pub xscale: Fixed,
    pub yscale: Fixed,
}

/// Now what is a visplane, anyway?
#[derive(Clone)]
pub struct Visplane {
    pub key: PlaneKey,
    pub minx: i32,
    pub maxx: i32,
    /// Padded by one on both ends so that `minx - 1` and `maxx + 1` can be
    /// set as span stops. Use `top(x)` and friends.
    top: Vec<i32>,
    bottom: Vec<i32>,
    /// Next plane in the hash chain
    pub next: Option<usize>,
}

impl Debug for Visplane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visplane")
            .field("key", &self.key)
            .field("minx", &self.minx)
            .field("maxx", &self.maxx)
            .finish_non_exhaustive()
    }
}

impl Visplane {
    pub fn new(screen_width: usize) -> Self {
        Visplane {
            key: PlaneKey::default(),
            minx: 0,
            maxx: -1,
            top: vec![PLANE_UNUSED; screen_width + 2],
            bottom: vec![0; screen_width + 2],
            next: None,
        }
    }

    /// Reset for reuse with a new key, nothing marked
    pub fn reset(&mut self, key: PlaneKey, screen_width: usize) {
        self.key = key;
        self.minx = screen_width as i32;
        self.maxx = -1;
        self.next = None;
        self.top.resize(screen_width + 2, PLANE_UNUSED);
        self.bottom.resize(screen_width + 2, 0);
        self.top.fill(PLANE_UNUSED);
    }

    #[inline(always)]
    pub fn top(&self, x: i32) -> i32 {
        self.top[(x + 1) as usize]
    }

    #[inline(always)]
    pub fn bottom(&self, x: i32) -> i32 {
        self.bottom[(x + 1) as usize]
    }

    #[inline(always)]
    pub fn set_top(&mut self, x: i32, value: i32) {
        self.top[(x + 1) as usize] = value;
    }

    #[inline(always)]
    pub fn set_bottom(&mut self, x: i32, value: i32) {
        self.bottom[(x + 1) as usize] = value;
    }

    /// True if no column has been marked
    pub fn is_empty(&self) -> bool {
        self.minx > self.maxx
    }
}
