use std::sync::Arc;

#[cfg(feature = "hprof")]
use coarse_prof::profile;
use level::{
    Level, LineDefFlags, MapData, NF_SUBSECTOR, NO_TEXTURE, PL_SKYFLAT, PicData, Player, Sector,
};
use log::{debug, trace};
use math::{ANG180, ANG270, Angle, BOXBOTTOM, BOXLEFT, BOXRIGHT, BOXTOP, Fixed};
use render_trait::{PixelBuffer, PlayViewRenderer};

use crate::defs::{
    MAXVISSPRITES, PlaneKey, RF_BOT_TILE, RF_CLOSED, RF_IGNORE, RF_MID_TILE, RF_TOP_TILE,
};
use crate::draw::{DrawWorkers, ScreenTarget, translation_tables};
use crate::segs::{SegRender, WallSeg};
use crate::things::VisSprite;
use crate::view::{View, ViewTables};
use crate::{RenderConfig, RenderData};

/// Corners of a bounding box to test, by where the view is relative to it.
/// Index 5 is inside the box.
const CHECKCOORD: [[usize; 4]; 11] = [
    [3, 0, 2, 1],
    [3, 0, 2, 0],
    [3, 1, 2, 0],
    [0; 4],
    [2, 0, 2, 1],
    [0, 0, 0, 0],
    [3, 1, 3, 0],
    [0; 4],
    [2, 0, 3, 1],
    [2, 1, 3, 1],
    [2, 1, 3, 0],
];

/// A sector as it is drawn this frame. Height transfers replace some of
/// these values, the map itself is never touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SectorView {
    pub floorheight: Fixed,
    pub ceilingheight: Fixed,
    pub floorpic: usize,
    pub ceilingpic: usize,
    pub lightlevel: i32,
    pub special: i32,
    pub heightsec: Option<usize>,
    pub floorlightsec: Option<usize>,
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
    pub floorsky: u32,
    pub ceilingsky: u32,
}

impl SectorView {
    pub fn from_sector(sec: &Sector) -> Self {
        Self {
            floorheight: sec.floorheight,
            ceilingheight: sec.ceilingheight,
            floorpic: sec.floorpic,
            ceilingpic: sec.ceilingpic,
            lightlevel: sec.lightlevel,
            special: sec.special,
            heightsec: sec.heightsec,
            floorlightsec: sec.floorlightsec,
            ceilinglightsec: sec.ceilinglightsec,
            floor_xoffs: sec.floor_xoffs,
            floor_yoffs: sec.floor_yoffs,
            ceiling_xoffs: sec.ceiling_xoffs,
            ceiling_yoffs: sec.ceiling_yoffs,
            floor_rotation: sec.floor_rotation,
            ceiling_rotation: sec.ceiling_rotation,
            floor_xscale: sec.floor_xscale,
            floor_yscale: sec.floor_yscale,
            ceiling_xscale: sec.ceiling_xscale,
            ceiling_yscale: sec.ceiling_yscale,
            floorsky: sec.floorsky,
            ceilingsky: sec.ceilingsky,
        }
    }

    pub fn floor_light_level(&self, map: &MapData) -> i32 {
        self.floorlightsec
            .map_or(self.lightlevel, |s| map.sectors[s].lightlevel)
    }

    pub fn ceiling_light_level(&self, map: &MapData) -> i32 {
        self.ceilinglightsec
            .map_or(self.lightlevel, |s| map.sectors[s].lightlevel)
    }

    fn copy_floor_from(&mut self, s: &Sector) {
        self.floorpic = s.floorpic;
        self.floor_xoffs = s.floor_xoffs;
        self.floor_yoffs = s.floor_yoffs;
    }

    fn copy_ceiling_from(&mut self, s: &Sector) {
        self.ceilingpic = s.ceilingpic;
        self.ceiling_xoffs = s.ceiling_xoffs;
        self.ceiling_yoffs = s.ceiling_yoffs;
    }

    /// True if the two floors can't be drawn as one visplane
    pub fn floor_planes_differ(&self, other: &SectorView, map: &MapData) -> bool {
        self.floorpic != other.floorpic
            || self.floor_xoffs != other.floor_xoffs
            || self.floor_yoffs != other.floor_yoffs
            || self.floor_rotation != other.floor_rotation
            || self.floor_xscale != other.floor_xscale
            || self.floor_yscale != other.floor_yscale
            || self.lightlevel != other.lightlevel
            || self.floor_light_level(map) != other.floor_light_level(map)
    }

    pub fn ceiling_planes_differ(&self, other: &SectorView, map: &MapData) -> bool {
        self.ceilingpic != other.ceilingpic
            || self.ceiling_xoffs != other.ceiling_xoffs
            || self.ceiling_yoffs != other.ceiling_yoffs
            || self.ceiling_rotation != other.ceiling_rotation
            || self.ceiling_xscale != other.ceiling_xscale
            || self.ceiling_yscale != other.ceiling_yscale
            || self.lightlevel != other.lightlevel
            || self.ceiling_light_level(map) != other.ceiling_light_level(map)
    }
}

/// Doom function name `R_FakeFlat`
///
/// Returns the sector as drawn, plus its floor and ceiling light levels.
/// Sectors with a height transfer show the control sector's heights, and
/// its flats and light depending on which side of them the view is.
pub(crate) fn fake_flat(
    view: &View,
    map: &MapData,
    sky_flat: usize,
    num: usize,
    back: bool,
) -> (SectorView, i32, i32) {
    let Some(sec) = map.sectors.get(num) else {
        panic!("R_FakeFlat: sector {num} with numsectors = {}", map.sectors.len());
    };
    let mut v = SectorView::from_sector(sec);
    let mut floorlight = map.floor_light_level(sec);
    let mut ceilinglight = map.ceiling_light_level(sec);

    let Some(hs) = sec.heightsec else {
        return (v, floorlight, ceilinglight);
    };
    let s = &map.sectors[hs];
    let underwater = view
        .heightsec
        .is_some_and(|vh| view.z <= map.sectors[vh].floorheight);

    // Replace sector being drawn, with a copy to be hacked
    v.floorheight = s.floorheight;
    v.ceilingheight = s.ceilingheight;

    let mut head_below = false;
    if underwater {
        v.floorheight = sec.floorheight;
        v.ceilingheight = s.floorheight - 1;
        head_below = !back;
    }

    if head_below || view.z <= s.floorheight {
        // head-below-floor hack
        v.copy_floor_from(s);
        if underwater {
            if s.ceilingpic == sky_flat {
                v.floorheight = v.ceilingheight + 1;
                v.ceilingpic = v.floorpic;
                v.ceiling_xoffs = v.floor_xoffs;
                v.ceiling_yoffs = v.floor_yoffs;
            } else {
                v.copy_ceiling_from(s);
            }
        }
        v.lightlevel = s.lightlevel;
        floorlight = map.floor_light_level(s);
        ceilinglight = map.ceiling_light_level(s);
    } else if view
        .heightsec
        .is_some_and(|vh| view.z >= map.sectors[vh].ceilingheight)
        && sec.ceilingheight > s.ceilingheight
    {
        // above-ceiling hack
        v.ceilingheight = s.ceilingheight;
        v.floorheight = s.ceilingheight + 1;
        v.copy_ceiling_from(s);
        v.floorpic = s.ceilingpic;
        v.floor_xoffs = s.ceiling_xoffs;
        v.floor_yoffs = s.ceiling_yoffs;

        if s.floorpic != sky_flat {
            v.ceilingheight = sec.ceilingheight;
            v.copy_floor_from(s);
        }
        v.lightlevel = s.lightlevel;
        floorlight = map.floor_light_level(s);
        ceilinglight = map.ceiling_light_level(s);
    }
    (v, floorlight, ceilinglight)
}

/// Doom function name `R_ClipWallSegment`
///
/// `store` is called for every run of open columns in `first..last`. If the
/// wall is solid those columns are then closed.
pub(crate) fn clip_wall_segment(
    solidcol: &mut [u8],
    mut first: i32,
    last: i32,
    solid: bool,
    mut store: impl FnMut(i32, i32),
) {
    while first < last {
        let run = &solidcol[first as usize..last as usize];
        if solidcol[first as usize] != 0 {
            match run.iter().position(|c| *c == 0) {
                Some(p) => first += p as i32,
                // All solid
                None => return,
            }
        } else {
            let to = run
                .iter()
                .position(|c| *c != 0)
                .map_or(last, |p| first + p as i32);
            store(first, to - 1);
            if solid {
                solidcol[first as usize..to as usize].fill(1);
            }
            first = to;
        }
    }
}

/// The whole software renderer. Holds every per frame structure, the view
/// tables and the draw workers.
pub struct SoftwareRenderer {
    pub(crate) r_data: RenderData,
    pub(crate) seg_renderer: SegRender,
    pub(crate) view: View,
    pub(crate) workers: DrawWorkers,
    /// One byte per column, set once a solid wall covers it
    pub(crate) solidcol: Vec<u8>,
    /// Visible sprite data, used for Z-ordered rendering of sprites
    pub(crate) vissprites: Vec<VisSprite>,
    /// Indexes in to `vissprites`, nearest first once sorted
    pub(crate) vissprite_order: Vec<usize>,
    pub(crate) sort_scratch: Vec<usize>,
    /// Per column sprite clip, -2 is not clipped yet
    pub(crate) clipbot: Vec<i32>,
    pub(crate) cliptop: Vec<i32>,
    /// Player colour remaps
    pub(crate) translations: Vec<[u8; 256]>,
    /// Rows drawn by the last masked column, steps the fuzz pattern
    pub(crate) colheight: i32,
    /// Bumped by `clear_frame_state`, compared to the stamps below
    frame: u32,
    /// Frame the sector's things were last added
    sector_valid: Vec<u32>,
    /// `(frame, RF_* flags)` per line
    line_flags: Vec<(u32, u32)>,
    /// Subsectors visited this frame, in order
    visited: Vec<usize>,
    config: RenderConfig,
}

impl SoftwareRenderer {
    pub fn new(width: usize, height: usize, config: RenderConfig) -> std::io::Result<Self> {
        let tables = Arc::new(ViewTables::new(width, height));
        let workers = DrawWorkers::new(
            config.threads,
            config.parallel_sky,
            config.parallel_spans,
            height,
        )?;
        debug!(
            "Software renderer at {width}x{height}, {} draw threads, {config:?}",
            workers.threads()
        );
        Ok(Self {
            r_data: RenderData::new(width, height),
            seg_renderer: SegRender::new(),
            view: View::new(tables),
            workers,
            solidcol: vec![0; width],
            vissprites: Vec::with_capacity(MAXVISSPRITES),
            vissprite_order: Vec::with_capacity(MAXVISSPRITES),
            sort_scratch: Vec::with_capacity(MAXVISSPRITES),
            clipbot: vec![-2; width],
            cliptop: vec![-2; width],
            translations: translation_tables(),
            colheight: 0,
            frame: 0,
            sector_valid: Vec::new(),
            line_flags: Vec::new(),
            visited: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Switch sky and span dispatch between the pool and the main thread
    pub fn set_parallel(&mut self, sky: bool, spans: bool) {
        self.config.parallel_sky = sky;
        self.config.parallel_spans = spans;
        self.workers.set_parallel(sky, spans);
    }

    pub fn view_tables(&self) -> &Arc<ViewTables> {
        &self.view.tables
    }

    /// Subsectors reached by the last BSP walk, in the order visited
    pub fn visited_subsectors(&self) -> &[usize] {
        &self.visited
    }

    /// Columns closed by solid walls
    pub fn solid_columns(&self) -> &[u8] {
        &self.solidcol
    }

    /// Visible column ranges of every wall stored this frame
    pub fn drawseg_ranges(&self) -> Vec<(usize, i32, i32)> {
        self.r_data
            .drawsegs
            .iter()
            .map(|ds| (ds.curline, ds.x1, ds.x2))
            .collect()
    }

    /// Scale of each vissprite, in draw order after `draw_masked`
    pub fn vissprite_scales(&self) -> Vec<Fixed> {
        self.vissprite_order
            .iter()
            .map(|i| self.vissprites[*i].scale)
            .collect()
    }

    /// Size the per map caches. Happens on the first frame of a map.
    fn prepare_map(&mut self, map: &MapData) {
        if self.sector_valid.len() != map.sectors.len() {
            self.sector_valid = vec![0; map.sectors.len()];
        }
        if self.line_flags.len() != map.linedefs.len() {
            self.line_flags = vec![(0, 0); map.linedefs.len()];
        }
    }

    /// Doom function name `R_RecalcLineFlags`
    fn recalc_line_flags(
        line_num: usize,
        front: &SectorView,
        back: Option<&SectorView>,
        side_num: usize,
        map: &MapData,
        pic_data: &PicData,
    ) -> u32 {
        let line = &map.linedefs[line_num];
        let side = &map.sidedefs[side_num];
        let sky_flat = pic_data.sky_flat();
        let two_sided = line.flags & LineDefFlags::TWO_SIDED != 0;

        let mut flags = match back {
            Some(back)
                if two_sided
                    && back.ceilingheight > front.floorheight
                    && back.floorheight < front.ceilingheight
                    && !(
                        // if door is closed because back is shut
                        back.ceilingheight <= back.floorheight
                        // preserve a kind of transparent door/lift special effect
                        && (back.ceilingheight >= front.ceilingheight
                            || side.toptexture != NO_TEXTURE)
                        && (back.floorheight <= front.floorheight
                            || side.bottomtexture != NO_TEXTURE)
                        // properly render skies (consider door "open" if both ceilings are sky)
                        && (back.ceilingpic != sky_flat || front.ceilingpic != sky_flat)
                    ) =>
            {
                if back.ceilingheight != front.ceilingheight
                    || back.floorheight != front.floorheight
                    || side.midtexture != NO_TEXTURE
                    || front.floor_planes_differ(back, map)
                    || front.ceiling_planes_differ(back, map)
                {
                    return 0;
                }
                RF_IGNORE
            }
            _ => RF_CLOSED,
        };

        if side.rowoffset != 0 {
            return flags;
        }

        // Now decide on texture tiling
        if two_sided {
            if let Some(back) = back {
                let c = front.ceilingheight - back.ceilingheight;
                if side.rowoffset_top == 0 && c > 0 && pic_data.wall_height(side.toptexture) > c {
                    flags |= RF_TOP_TILE;
                }
                let c = front.floorheight - back.floorheight;
                if side.rowoffset_bottom == 0
                    && c > 0
                    && pic_data.wall_height(side.bottomtexture) > c
                {
                    flags |= RF_BOT_TILE;
                }
            }
        } else {
            let c = front.ceilingheight - front.floorheight;
            if side.rowoffset_mid == 0 && c > 0 && pic_data.wall_height(side.midtexture) > c {
                flags |= RF_MID_TILE;
            }
        }
        flags
    }

    /// R_AddLine - r_bsp
    ///
    /// Clips the given segment and adds any visible pieces to the line list.
    fn add_line(
        &mut self,
        seg_num: usize,
        front: &SectorView,
        map: &MapData,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        let Some(seg) = map.segments.get(seg_num) else {
            panic!("R_AddLine: seg {seg_num} with numsegs = {}", map.segments.len());
        };
        let Some(line_num) = seg.linedef else {
            return;
        };
        let view = &self.view;
        let t = &view.tables;

        let mut angle1 = view.point_to_angle(seg.v1.x, seg.v1.y);
        let mut angle2 = view.point_to_angle(seg.v2.x, seg.v2.y);

        // Back side, i.e. backface culling
        let span = angle1.wrapping_sub(angle2);
        if span >= ANG180 {
            return;
        }

        // Global angle needed by segcalc.
        let rw_angle1 = angle1;
        angle1 = angle1.wrapping_sub(view.angle);
        angle2 = angle2.wrapping_sub(view.angle);

        let clipangle = t.clipangle;
        let mut tspan = angle1.wrapping_add(clipangle);
        if tspan > clipangle.wrapping_mul(2) {
            tspan = tspan.wrapping_sub(clipangle.wrapping_mul(2));
            // Totally off the left edge?
            if tspan >= span {
                return;
            }
            angle1 = clipangle;
        }
        tspan = clipangle.wrapping_sub(angle2);
        if tspan > clipangle.wrapping_mul(2) {
            tspan = tspan.wrapping_sub(clipangle.wrapping_mul(2));
            // Totally off the right edge?
            if tspan >= span {
                return;
            }
            angle2 = 0u32.wrapping_sub(clipangle);
        }

        // The seg is in the view range, but not necessarily visible.
        let x1 = t.angle_to_x(angle1);
        let x2 = t.angle_to_x(angle2);

        // Does not cross a pixel?
        if x1 >= x2 {
            return;
        }

        let sky_flat = pic_data.sky_flat();
        let back = seg
            .backsector
            .map(|b| fake_flat(view, map, sky_flat, b, true).0);

        let (stamp, cached) = self.line_flags[line_num];
        let r_flags = if stamp == self.frame {
            cached
        } else {
            let flags =
                Self::recalc_line_flags(line_num, front, back.as_ref(), seg.sidedef, map, pic_data);
            self.line_flags[line_num] = (self.frame, flags);
            flags
        };

        // Reject empty lines used for triggers and special events.
        // Identical floor and ceiling on both sides, identical light levels
        // on both sides, and no middle texture.
        if r_flags & RF_IGNORE != 0 {
            return;
        }

        let wall = WallSeg {
            seg_num,
            seg,
            line: &map.linedefs[line_num],
            side: &map.sidedefs[seg.sidedef],
            front,
            back: back.as_ref(),
            r_flags,
            rw_angle1,
        };

        let Self {
            solidcol,
            seg_renderer,
            r_data,
            workers,
            view,
            ..
        } = self;
        clip_wall_segment(solidcol, x1, x2, r_flags & RF_CLOSED != 0, |first, last| {
            seg_renderer.store_wall_range(
                first,
                last,
                &wall,
                view,
                map,
                pic_data,
                r_data,
                &mut workers.columns,
                target,
            );
        });
    }

    /// R_CheckBBox - r_bsp
    ///
    /// Checks BSP node/subtree bounding box. Returns true if some part of the
    /// bbox might be visible.
    pub(crate) fn check_bbox(&self, bbox: &[Fixed; 4]) -> bool {
        let view = &self.view;
        let t = &view.tables;

        // Find the corners of the box
        // that define the edges from current viewpoint.
        let boxx = if view.x <= bbox[BOXLEFT] {
            0
        } else if view.x < bbox[BOXRIGHT] {
            1
        } else {
            2
        };
        let boxy = if view.y >= bbox[BOXTOP] {
            0
        } else if view.y > bbox[BOXBOTTOM] {
            4
        } else {
            8
        };
        let boxpos = boxx + boxy;
        if boxpos == 5 {
            return true;
        }

        let c = CHECKCOORD[boxpos];
        let mut angle1 = view
            .point_to_angle(bbox[c[0]], bbox[c[1]])
            .wrapping_sub(view.angle) as i32;
        let mut angle2 = view
            .point_to_angle(bbox[c[2]], bbox[c[3]])
            .wrapping_sub(view.angle) as i32;

        // Sitting on a line?
        if angle1 < angle2 {
            if (angle1 as Angle) >= ANG180 && (angle1 as Angle) < ANG270 {
                angle1 = i32::MAX;
            } else {
                angle2 = i32::MIN;
            }
        }

        let clipangle = t.clipangle as i32;
        // Both off left edge
        if angle2 >= clipangle {
            return false;
        }
        // Both off right edge
        if angle1 <= -clipangle {
            return false;
        }
        // Clip at left edge
        if angle1 >= clipangle {
            angle1 = clipangle;
        }
        // Clip at right edge
        if angle2 <= -clipangle {
            angle2 = -clipangle;
        }

        // Find the first clippost that touches the source post
        //  (adjacent pixels are touching).
        let sx1 = t.angle_to_x(angle1 as Angle);
        let sx2 = t.angle_to_x(angle2 as Angle);

        // Does not cross a pixel.
        if sx1 >= sx2 {
            return false;
        }
        // All columns it covers are already solidly covered
        self.solidcol[sx1 as usize..sx2 as usize]
            .iter()
            .any(|c| *c == 0)
    }

    /// Doom function name `R_UpdateGlobalPlanes`. Finds the floor and
    /// ceiling planes of the sector the walk is in.
    fn update_global_planes(
        &mut self,
        front: &SectorView,
        floorlight: i32,
        ceilinglight: i32,
        map: &MapData,
        pic_data: &PicData,
    ) {
        let view_z = self.view.z;
        let sky_flat = pic_data.sky_flat();
        let planes = &mut self.r_data.visplane_render;

        planes.floorplane = if front.floorheight < view_z
            || front
                .heightsec
                .is_some_and(|hs| map.sectors[hs].ceilingpic == sky_flat)
        {
            let picnum = if front.floorpic == sky_flat && front.floorsky & PL_SKYFLAT != 0 {
                front.floorsky
            } else {
                front.floorpic as u32
            };
            let key = PlaneKey {
                height: front.floorheight,
                picnum,
                lightlevel: floorlight,
                special: front.special,
                xoffs: front.floor_xoffs,
                yoffs: front.floor_yoffs,
                rotation: front.floor_rotation,
                xscale: front.floor_xscale,
                yscale: front.floor_yscale,
            };
            Some(planes.find_plane(key, view_z, sky_flat))
        } else {
            None
        };

        planes.ceilingplane = if front.ceilingheight > view_z
            || front.ceilingpic == sky_flat
            || front
                .heightsec
                .is_some_and(|hs| map.sectors[hs].floorpic == sky_flat)
        {
            let picnum = if front.ceilingpic == sky_flat && front.ceilingsky & PL_SKYFLAT != 0 {
                front.ceilingsky
            } else {
                front.ceilingpic as u32
            };
            let key = PlaneKey {
                height: front.ceilingheight,
                picnum,
                lightlevel: ceilinglight,
                special: 0,
                xoffs: front.ceiling_xoffs,
                yoffs: front.ceiling_yoffs,
                rotation: front.ceiling_rotation,
                xscale: front.ceiling_xscale,
                yscale: front.ceiling_yscale,
            };
            Some(planes.find_plane(key, view_z, sky_flat))
        } else {
            None
        };
    }

    /// R_Subsector - r_bsp
    ///
    /// Determine floor/ceiling planes, add sprites of things in sector and
    /// draw one or more line segments.
    fn subsector(&mut self, num: usize, level: &Level, pic_data: &PicData, target: &ScreenTarget) {
        let map = &level.map_data;
        let Some(sub) = map.subsectors.get(num) else {
            panic!("R_Subsector: ss {num} with numss = {}", map.subsectors.len());
        };
        self.visited.push(num);

        let (front, floorlight, ceilinglight) =
            fake_flat(&self.view, map, pic_data.sky_flat(), sub.sector, false);
        self.update_global_planes(&front, floorlight, ceilinglight, map, pic_data);

        // killough 9/18/98: Fix underwater slowdown, by passing real sector
        // instead of fake one. Improve sprite lighting by basing sprite
        // lightlevels on floor & ceiling lightlevels in the surrounding area.
        if self.sector_valid[sub.sector] != self.frame {
            self.sector_valid[sub.sector] = self.frame;
            self.add_sprites(sub.sector, (floorlight + ceilinglight) / 2, level, pic_data);
        }

        for &num in &sub.polys {
            let Some(poly) = map.polyobjs.get(num) else {
                panic!("R_Subsector: polyobj {num} with numpolyobjs = {}", map.polyobjs.len());
            };
            for seg in &poly.segs {
                self.add_line(*seg, &front, map, pic_data, target);
            }
        }

        for seg in sub.first_seg..sub.first_seg + sub.seg_count {
            if map.segments[seg].linedef.is_some() {
                self.add_line(seg, &front, map, pic_data, target);
            }
        }
    }

    /// R_RenderBSPNode - r_bsp
    ///
    /// Renders all subsectors below a given node, traversing subtree
    /// recursively. Just call with BSP root.
    fn render_bsp_node(&mut self, mut bspnum: u32, level: &Level, pic_data: &PicData, target: &ScreenTarget) {
        let map = &level.map_data;
        while bspnum & NF_SUBSECTOR == 0 {
            let Some(node) = map.nodes.get(bspnum as usize) else {
                panic!("R_RenderBSPNode: node {bspnum} with numnodes = {}", map.nodes.len());
            };
            // Decide which side the view point is on.
            let side = node.point_on_side(self.view.x, self.view.y);
            // Recursively divide front space.
            self.render_bsp_node(node.children[side], level, pic_data, target);

            // Possibly divide back space.
            if !self.check_bbox(&node.bbox[side ^ 1]) {
                return;
            }
            bspnum = node.children[side ^ 1];
        }
        let num = if bspnum == u32::MAX { 0 } else { bspnum & !NF_SUBSECTOR };
        self.subsector(num as usize, level, pic_data, target);
    }

    /// Rebuild the tables and buffers if the frame changed size
    fn match_buffer(&mut self, buffer: &impl PixelBuffer) {
        let size = buffer.size();
        let t = &self.view.tables;
        if size.width() != t.width || size.height() != t.height {
            self.reset_resolution_dependent_buffers(size.width_usize(), size.height_usize());
        }
    }
}

impl PlayViewRenderer for SoftwareRenderer {
    /// Doom function name `R_ClearClipSegs`, `R_ClearDrawSegs`,
    /// `R_ClearPlanes` and `R_ClearSprites` together
    fn clear_frame_state(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        if self.frame == 0 {
            // Stamps from four billion frames ago would look current
            self.frame = 1;
            self.sector_valid.fill(0);
            self.line_flags.fill((0, 0));
        }
        self.solidcol.fill(0);
        self.r_data.clear_data();
        self.vissprites.clear();
        self.vissprite_order.clear();
        self.visited.clear();
    }

    fn render_view(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        buffer: &mut impl PixelBuffer,
    ) {
        #[cfg(feature = "hprof")]
        profile!("render_view");
        self.match_buffer(buffer);
        self.prepare_map(&level.map_data);
        self.view.setup(player, level);
        let target = ScreenTarget::new(buffer);

        {
            #[cfg(feature = "hprof")]
            profile!("render_bsp_node");
            self.render_bsp_node(level.map_data.start_node(), level, pic_data, &target);
        }
        self.workers.reset_column_buffer();
        trace!(
            "BSP visited {} subsectors, {} drawsegs, {} vissprites",
            self.visited.len(),
            self.r_data.drawsegs.len(),
            self.vissprites.len()
        );
    }

    fn draw_planes(&mut self, level: &Level, pic_data: &PicData, buffer: &mut impl PixelBuffer) {
        let target = ScreenTarget::new(buffer);
        self.r_data.visplane_render.draw_planes(
            &self.view,
            &level.map_data,
            pic_data,
            &mut self.workers,
            target,
        );
        self.workers.reset_column_buffer();
    }

    fn draw_masked(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        buffer: &mut impl PixelBuffer,
    ) {
        #[cfg(feature = "hprof")]
        profile!("draw_masked");
        let target = ScreenTarget::new(buffer);
        self.draw_masked_things(player, level, pic_data, &target);
        self.workers.reset_column_buffer();
    }

    /// Doom function name `R_ExecuteSetViewSize`
    fn reset_resolution_dependent_buffers(&mut self, width: usize, height: usize) {
        debug!("Resizing view to {width}x{height}");
        self.workers.wait_idle();
        self.view.tables = Arc::new(ViewTables::new(width, height));
        self.r_data = RenderData::new(width, height);
        self.solidcol = vec![0; width];
        self.clipbot = vec![-2; width];
        self.cliptop = vec![-2; width];
        self.workers.resize(height);
    }
}

#[cfg(test)]
mod tests {
    use level::{MapBuilder, SideDef};
    use math::int_to_fixed;
    use render_trait::ScreenBuffer;

    use super::*;
    use crate::tests::{Scene, open_sector, pic_data, render_frame, renderer, serial, spawn_player};

    #[test]
    fn clip_wall_segment_skips_solid_runs() {
        let mut solid = vec![0u8; 20];
        solid[5..10].fill(1);
        let mut stored = Vec::new();
        clip_wall_segment(&mut solid, 0, 15, true, |a, b| stored.push((a, b)));
        assert_eq!(stored, vec![(0, 4), (10, 14)]);
        assert!(solid[..15].iter().all(|c| *c == 1));
        assert_eq!(solid[15], 0);

        // Everything covered now
        stored.clear();
        clip_wall_segment(&mut solid, 0, 15, true, |a, b| stored.push((a, b)));
        assert!(stored.is_empty());
    }

    #[test]
    fn portal_walls_leave_columns_open() {
        let mut solid = vec![0u8; 8];
        let mut stored = Vec::new();
        clip_wall_segment(&mut solid, 2, 6, false, |a, b| stored.push((a, b)));
        assert_eq!(stored, vec![(2, 5)]);
        assert!(solid.iter().all(|c| *c == 0));
    }

    #[test]
    fn checkcoord_covers_every_outside_position() {
        for boxpos in [0, 1, 2, 4, 6, 8, 9, 10] {
            assert_ne!(CHECKCOORD[boxpos], [0; 4]);
        }
    }

    fn segs_of_line(map: &MapData, line: usize) -> Vec<usize> {
        (0..map.segments.len())
            .filter(|s| map.segments[*s].linedef == Some(line))
            .collect()
    }

    fn drawn(r: &SoftwareRenderer, segs: &[usize]) -> bool {
        r.drawseg_ranges().iter().any(|(seg, ..)| segs.contains(seg))
    }

    /// 512 square room cut in two across the middle by an untextured line
    fn split_room() -> (Scene, usize, usize) {
        let mut b = MapBuilder::new();
        let near = b.add_sector(open_sector(0, 128));
        let far = b.add_sector(open_sector(0, 128));
        let wall = |s: usize| SideDef::new(s, 0, 1, 0);

        b.add_line((0, 0), (0, 256), wall(near), None, 0);
        b.add_line((512, 256), (512, 0), wall(near), None, 0);
        b.add_line((512, 0), (0, 0), wall(near), None, 0);
        let divider = b.add_line(
            (0, 256),
            (512, 256),
            SideDef::new(near, 0, 0, 0),
            Some(SideDef::new(far, 0, 0, 0)),
            0,
        );
        b.add_line((0, 256), (0, 512), wall(far), None, 0);
        b.add_line((0, 512), (512, 512), wall(far), None, 0);
        b.add_line((512, 512), (512, 256), wall(far), None, 0);

        let mut level = Level::new(b.build());
        let player = spawn_player(&mut level, 256, 64);
        let scene = Scene {
            level,
            player,
            pic_data: pic_data(),
        };
        (scene, divider, far)
    }

    #[test]
    fn matching_two_sided_lines_are_ignored() {
        let (mut scene, divider, far) = split_room();
        let mut r = renderer(320, 200, serial());
        let mut buffer = ScreenBuffer::new(320, 200);
        render_frame(&mut r, &scene, &mut buffer);

        let segs = segs_of_line(&scene.level.map_data, divider);
        assert_eq!(r.line_flags[divider], (r.frame, RF_IGNORE));
        assert!(!drawn(&r, &segs));
        // The far half is still walked
        let far_leaf = scene.level.map_data.point_in_subsector(256 << 16, 400 << 16);
        assert!(r.visited_subsectors().contains(&far_leaf));

        // A step on the far side makes it a real wall
        scene.level.map_data.sectors[far].floorheight = int_to_fixed(8);
        render_frame(&mut r, &scene, &mut buffer);
        assert_eq!(r.line_flags[divider], (r.frame, 0));
        assert!(drawn(&r, &segs));
    }

    #[test]
    fn line_flags_are_worked_out_once_per_frame() {
        let mut b = MapBuilder::new();
        let s = b.add_sector(open_sector(0, 64));
        let north = b.add_room(s, (0, 0), (512, 512), 1)[1];
        let mut level = Level::new(b.build());
        let player = spawn_player(&mut level, 256, 64);
        let mut scene = Scene {
            level,
            player,
            pic_data: pic_data(),
        };
        let segs = segs_of_line(&scene.level.map_data, north);

        // 128 high texture in a 64 high room tiles
        let mut r = renderer(320, 200, serial());
        let mut buffer = ScreenBuffer::new(320, 200);
        render_frame(&mut r, &scene, &mut buffer);
        assert_eq!(r.line_flags[north], (r.frame, RF_CLOSED | RF_MID_TILE));
        assert!(drawn(&r, &segs));

        // Flags already stamped with this frame are used as they are
        r.clear_frame_state();
        r.line_flags[north] = (r.frame, RF_IGNORE);
        r.render_view(&scene.player, &scene.level, &scene.pic_data, &mut buffer);
        assert!(!drawn(&r, &segs));

        // The next frame looks again
        scene.level.map_data.sectors[s].ceilingheight = int_to_fixed(192);
        render_frame(&mut r, &scene, &mut buffer);
        assert_eq!(r.line_flags[north], (r.frame, RF_CLOSED));
        assert!(drawn(&r, &segs));
    }
}
