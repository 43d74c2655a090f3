use math::{Angle, BOXBOTTOM, BOXLEFT, BOXRIGHT, BOXTOP, Fixed, FRACBITS, fixed_mul};

/// Marks a child index in a `Node` as a leaf
pub const NF_SUBSECTOR: u32 = 0x8000_0000;
/// Texture slot zero is always "no texture"
pub const NO_TEXTURE: usize = 0;

/// Sky flat transferred from a linedef. The low bits hold the line index.
pub const PL_SKYFLAT: u32 = 0x8000_0000;

/// Line flags, as stored in the map
pub struct LineDefFlags;

impl LineDefFlags {
    pub const BLOCKING: u32 = 1;
    pub const BLOCK_MONSTERS: u32 = 1 << 1;
    /// Backside will not be present at all if not two sided.
    pub const TWO_SIDED: u32 = 1 << 2;
    /// Upper texture is unpegged
    pub const UNPEG_TOP: u32 = 1 << 3;
    /// Lower texture is unpegged
    pub const UNPEG_BOTTOM: u32 = 1 << 4;
    pub const SECRET: u32 = 1 << 5;
    pub const BLOCK_SOUND: u32 = 1 << 6;
    pub const DONT_DRAW: u32 = 1 << 7;
    pub const MAPPED: u32 = 1 << 8;
}

/// Line special that keeps a transferred sky from being mirrored
pub const SKY_LINE_UNFLIPPED: i32 = 272;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Vertex {
    pub x: Fixed,
    pub y: Fixed,
}

impl Vertex {
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }
}

/// The SECTORS record, at runtime. Only what the renderer reads is kept.
#[derive(Debug, Clone)]
pub struct Sector {
    pub floorheight: Fixed,
    pub ceilingheight: Fixed,
    /// Index to flat
    pub floorpic: usize,
    /// Index to flat
    pub ceilingpic: usize,
    pub lightlevel: i32,
    pub special: i32,

    /// Sector whose heights are transferred for deep water and fake ceilings
    pub heightsec: Option<usize>,
    /// Sector providing the floor light level, if different
    pub floorlightsec: Option<usize>,
    /// Sector providing the ceiling light level, if different
    pub ceilinglightsec: Option<usize>,

    pub floor_xoffs: Fixed,
    pub floor_yoffs: Fixed,
    pub ceiling_xoffs: Fixed,
    pub ceiling_yoffs: Fixed,
    pub floor_rotation: Angle,
    pub ceiling_rotation: Angle,
    pub floor_xscale: Fixed,
    pub floor_yscale: Fixed,
    pub ceiling_xscale: Fixed,
    pub ceiling_yscale: Fixed,

    /// `PL_SKYFLAT | line` when the sky is taken from a linedef
    pub floorsky: u32,
    pub ceilingsky: u32,

    /// Indexes in to `Level::things`
    pub thinglist: Vec<usize>,
}

impl Sector {
    pub fn new(
        floorheight: Fixed,
        ceilingheight: Fixed,
        floorpic: usize,
        ceilingpic: usize,
        lightlevel: i32,
    ) -> Self {
        Self {
            floorheight,
            ceilingheight,
            floorpic,
            ceilingpic,
            lightlevel,
            special: 0,
            heightsec: None,
            floorlightsec: None,
            ceilinglightsec: None,
            floor_xoffs: 0,
            floor_yoffs: 0,
            ceiling_xoffs: 0,
            ceiling_yoffs: 0,
            floor_rotation: 0,
            ceiling_rotation: 0,
            floor_xscale: 1 << FRACBITS,
            floor_yscale: 1 << FRACBITS,
            ceiling_xscale: 1 << FRACBITS,
            ceiling_yscale: 1 << FRACBITS,
            floorsky: 0,
            ceilingsky: 0,
            thinglist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SideDef {
    /// Added to the calculated texture column
    pub textureoffset: Fixed,
    /// Added to the calculated texture top
    pub rowoffset: Fixed,
    /// Per-tier row offsets, applied on top of `rowoffset`
    pub rowoffset_top: Fixed,
    pub rowoffset_mid: Fixed,
    pub rowoffset_bottom: Fixed,

    pub toptexture: usize,
    pub bottomtexture: usize,
    pub midtexture: usize,

    /// Sector the SideDef is facing.
    pub sector: usize,
}

impl SideDef {
    pub fn new(sector: usize, toptexture: usize, midtexture: usize, bottomtexture: usize) -> Self {
        Self {
            sector,
            toptexture,
            midtexture,
            bottomtexture,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineDef {
    pub v1: Vertex,
    pub v2: Vertex,
    pub flags: u32,
    pub special: i32,
    /// Front side, then back side if two sided
    pub sidenum: [Option<usize>; 2],
    pub frontsector: usize,
    pub backsector: Option<usize>,
    /// Blend table used for a translucent middle texture
    pub tranlump: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub v1: Vertex,
    pub v2: Vertex,
    /// Offset distance along the linedef to the start of this `Segment`
    pub offset: Fixed,
    pub angle: Angle,
    pub sidedef: usize,
    /// Minisegs have no line and are never drawn
    pub linedef: Option<usize>,
    pub frontsector: usize,
    pub backsector: Option<usize>,
}

impl Segment {
    /// Doom function name `R_PointOnSegSide`
    pub fn point_on_side(&self, x: Fixed, y: Fixed) -> bool {
        side_of(self.v1.x, self.v1.y, self.v2.x - self.v1.x, self.v2.y - self.v1.y, x, y)
    }
}

#[derive(Debug, Clone)]
pub struct SubSector {
    pub sector: usize,
    /// The `Segment` to start with
    pub first_seg: usize,
    /// How many `Segment`s line this `SubSector`
    pub seg_count: usize,
    /// Polyobjects drawn before the subsector's own segs
    pub polys: Vec<usize>,
}

/// A movable group of segs, drawn as part of the subsector that holds it
#[derive(Debug, Clone)]
pub struct PolyObj {
    pub subsector: usize,
    pub segs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Partition line start
    pub x: Fixed,
    pub y: Fixed,
    /// Partition line delta
    pub dx: Fixed,
    pub dy: Fixed,
    /// Bounding box for each child, indexed with `BOXTOP` and friends
    pub bbox: [[Fixed; 4]; 2],
    /// The final 'leaf' is bitmasked to find the index to subsector array
    pub children: [u32; 2],
}

impl Node {
    /// Doom function name `R_PointOnSide`. Returns 0 for the front.
    pub fn point_on_side(&self, x: Fixed, y: Fixed) -> usize {
        side_of(self.x, self.y, self.dx, self.dy, x, y) as usize
    }

    pub fn point_in_bounds(&self, x: Fixed, y: Fixed, side: usize) -> bool {
        let b = &self.bbox[side];
        x >= b[BOXLEFT] && x <= b[BOXRIGHT] && y >= b[BOXBOTTOM] && y <= b[BOXTOP]
    }
}

/// Shared side test. True is the back side.
fn side_of(lx: Fixed, ly: Fixed, ldx: Fixed, ldy: Fixed, x: Fixed, y: Fixed) -> bool {
    if ldx == 0 {
        return if x <= lx { ldy > 0 } else { ldy < 0 };
    }
    if ldy == 0 {
        return if y <= ly { ldx < 0 } else { ldx > 0 };
    }
    let x = x.wrapping_sub(lx);
    let y = y.wrapping_sub(ly);

    // Try to quickly decide by looking at sign bits.
    if (ldy ^ ldx ^ x ^ y) < 0 {
        return ((ldy ^ x) as u32 & 0x8000_0000) != 0;
    }
    let left = fixed_mul(ldy >> FRACBITS, x);
    let right = fixed_mul(y, ldx >> FRACBITS);
    right >= left
}
