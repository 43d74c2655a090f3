//! Floors, ceilings and sky. Visplanes are collected while walls are drawn
//! then turned in to horizontal spans once the BSP walk is done.

use std::sync::Arc;

#[cfg(feature = "hprof")]
use coarse_prof::profile;
use level::{FlatPic, MapData, PL_SKYFLAT, Patch, PicData, SKY_LINE_UNFLIPPED};
use math::{ANGLETOFINESHIFT, Angle, FRACUNIT, Fixed, finecosine, finesine, fixed_mul};

use crate::defs::{LIGHTZSHIFT, MAXLIGHTZ, MAXVISPLANES, PLANE_UNUSED, PlaneKey, Visplane};
use crate::draw::{DrawColumn, DrawSpan, DrawWorkers, ScreenTarget};
use crate::view::{View, ViewTables};

/// Rows handed to one span task
pub const SPAN_TASK_GRANULARITY: usize = 8;
/// Sky columns handed to one task
pub const SKY_PLANE_MACRO_COLUMNS: i32 = 32;
/// Shift from a view angle to a sky texture column
const ANGLETOSKYSHIFT: u32 = 22;
/// Transferred skies are lowered from the side's row offset by this much
const SKY_LINE_MID_OFFSET: Fixed = 28 * FRACUNIT;

#[inline]
fn visplane_hash(picnum: u32, lightlevel: i32, height: Fixed) -> usize {
    (picnum
        .wrapping_mul(3)
        .wrapping_add(lightlevel as u32)
        .wrapping_add((height as u32).wrapping_mul(7)) as usize)
        & (MAXVISPLANES - 1)
}

pub struct VisPlaneRender {
    /// Every plane allocated so far, the first `active` are in use
    visplanes: Vec<Visplane>,
    active: usize,
    /// Heads of the hash chains
    hash: [Option<usize>; MAXVISPLANES],
    /// Index of current visplane in `self.visplanes` for floor
    pub floorplane: Option<usize>,
    /// Index of current visplane in `self.visplanes` for ceiling
    pub ceilingplane: Option<usize>,

    /// Per column values saved for drawsegs: sprite clips and masked
    /// texture columns
    pub openings: Vec<i32>,

    /// spanstart holds the start of a plane span
    spanstart: Vec<i32>,

    screen_width: usize,
}

impl VisPlaneRender {
    pub fn new(screen_width: usize, screen_height: usize) -> Self {
        VisPlaneRender {
            visplanes: Vec::with_capacity(MAXVISPLANES),
            active: 0,
            hash: [None; MAXVISPLANES],
            floorplane: None,
            ceilingplane: None,
            openings: Vec::with_capacity(screen_width * 16),
            spanstart: vec![0; screen_height],
            screen_width,
        }
    }

    /// Doom function name `R_ClearPlanes`. Every plane goes back to the pool.
    pub fn clear_planes(&mut self) {
        self.hash.fill(None);
        self.active = 0;
        self.floorplane = None;
        self.ceilingplane = None;
        self.openings.clear();
    }

    #[inline]
    pub fn plane(&self, index: usize) -> &Visplane {
        &self.visplanes[index]
    }

    #[inline]
    pub fn plane_mut(&mut self, index: usize) -> &mut Visplane {
        &mut self.visplanes[index]
    }

    /// Planes in use this frame
    pub fn active_planes(&self) -> &[Visplane] {
        &self.visplanes[..self.active]
    }

    fn new_visplane(&mut self, hash: usize, key: PlaneKey) -> usize {
        let index = self.active;
        if index == self.visplanes.len() {
            self.visplanes.push(Visplane::new(self.screen_width));
        }
        self.active += 1;
        let plane = &mut self.visplanes[index];
        plane.reset(key, self.screen_width);
        plane.next = self.hash[hash];
        self.hash[hash] = Some(index);
        index
    }

    /// Doom function name `R_FindPlane`. Sky planes share one key per
    /// side of the view height whatever their light.
    pub fn find_plane(&mut self, mut key: PlaneKey, viewz: Fixed, sky_flat: usize) -> usize {
        if key.picnum as usize == sky_flat || key.picnum & PL_SKYFLAT != 0 {
            key.lightlevel = 0;
            key.height = if key.height > viewz { 1 } else { 0 };
        }

        let hash = visplane_hash(key.picnum, key.lightlevel, key.height);
        let mut check = self.hash[hash];
        while let Some(index) = check {
            let plane = &self.visplanes[index];
            if plane.key == key {
                return index;
            }
            check = plane.next;
        }
        self.new_visplane(hash, key)
    }

    /// Doom function name `R_CheckPlane`. Extends the plane over
    /// `start..=stop` if none of the overlap is marked yet, otherwise
    /// starts a duplicate.
    pub fn check_plane(&mut self, index: usize, start: i32, stop: i32) -> usize {
        let plane = &mut self.visplanes[index];
        let (intrl, unionl) = if start < plane.minx {
            (plane.minx, start)
        } else {
            (start, plane.minx)
        };
        let (intrh, unionh) = if stop > plane.maxx {
            (plane.maxx, stop)
        } else {
            (stop, plane.maxx)
        };

        let mut x = intrl;
        while x <= intrh && plane.top(x) == PLANE_UNUSED {
            x += 1;
        }

        if x > intrh {
            plane.minx = unionl;
            plane.maxx = unionh;
            index
        } else {
            self.dup_plane(index, start, stop)
        }
    }

    /// Doom function name `R_DupPlane`
    fn dup_plane(&mut self, index: usize, start: i32, stop: i32) -> usize {
        let key = self.visplanes[index].key;
        let hash = visplane_hash(key.picnum, key.lightlevel, key.height);
        let new = self.new_visplane(hash, key);
        let plane = &mut self.visplanes[new];
        plane.minx = start;
        plane.maxx = stop;
        new
    }

    /// Doom function name `R_DrawPlanes`. Tasks for every plane go in one
    /// batch that is waited on before returning.
    pub fn draw_planes(
        &mut self,
        view: &View,
        map: &MapData,
        pic_data: &PicData,
        workers: &mut DrawWorkers,
        target: ScreenTarget,
    ) {
        #[cfg(feature = "hprof")]
        profile!("draw_planes");
        workers.begin_batch();
        for slot in 0..MAXVISPLANES {
            let mut check = self.hash[slot];
            while let Some(index) = check {
                self.do_draw_plane(index, view, map, pic_data, workers, target);
                check = self.visplanes[index].next;
            }
        }
        workers.end_batch();
    }

    /// Doom function name `R_DoDrawPlane`
    fn do_draw_plane(
        &mut self,
        index: usize,
        view: &View,
        map: &MapData,
        pic_data: &PicData,
        workers: &mut DrawWorkers,
        target: ScreenTarget,
    ) {
        let plane = &self.visplanes[index];
        if plane.is_empty() {
            return;
        }

        if plane.key.picnum as usize == pic_data.sky_flat() || plane.key.picnum & PL_SKYFLAT != 0 {
            let sky = SkyPlane::new(plane.key.picnum, view, map, pic_data, target);
            draw_sky_plane(plane, Arc::new(sky), workers);
            return;
        }

        let key = plane.key;
        let light = if view.fixedcolormap.is_some() {
            view.light_row(255)
        } else {
            view.light_row(key.lightlevel)
        };

        let (xoffs, yoffs, sine, cosine) = if key.rotation != 0 {
            let rcos = finecosine((key.rotation >> ANGLETOFINESHIFT) as usize);
            let rsin = finesine((key.rotation >> ANGLETOFINESHIFT) as usize);
            let a = (view.angle.wrapping_add(key.rotation) >> ANGLETOFINESHIFT) as usize;
            (
                key.xoffs
                    .wrapping_add(fixed_mul(rcos, view.x))
                    .wrapping_sub(fixed_mul(rsin, view.y)),
                key.yoffs
                    .wrapping_sub(fixed_mul(rsin, view.x).wrapping_add(fixed_mul(rcos, view.y))),
                finesine(a),
                finecosine(a),
            )
        } else {
            (
                key.xoffs.wrapping_add(view.x),
                key.yoffs.wrapping_sub(view.y),
                view.sin,
                view.cos,
            )
        };

        let span = Arc::new(SpanPlane {
            flat: Arc::clone(pic_data.flat(key.picnum as usize)),
            colourmaps: Arc::clone(pic_data.colourmaps()),
            tables: Arc::clone(&view.tables),
            planeheight: key.height.wrapping_sub(view.z).wrapping_abs(),
            xoffs,
            yoffs,
            xscale: key.xscale,
            yscale: key.yscale,
            sine,
            cosine,
            light,
            fixedcolormap: view.fixedcolormap,
            target,
        });

        let plane = &mut self.visplanes[index];
        let stop = plane.maxx + 1;
        let minx = plane.minx;
        plane.set_top(minx - 1, PLANE_UNUSED);
        plane.set_top(stop, PLANE_UNUSED);

        let plane = &self.visplanes[index];
        for x in minx..=stop {
            make_spans(
                x,
                plane.top(x - 1),
                plane.bottom(x - 1),
                plane.top(x),
                plane.bottom(x),
                &mut self.spanstart,
                &span,
                workers,
            );
        }
    }
}

/// What a span task needs to map and draw rows of one plane
pub struct SpanPlane {
    flat: Arc<FlatPic>,
    colourmaps: Arc<[u8]>,
    tables: Arc<ViewTables>,
    planeheight: Fixed,
    xoffs: Fixed,
    yoffs: Fixed,
    xscale: Fixed,
    yscale: Fixed,
    sine: Fixed,
    cosine: Fixed,
    /// Row of `zlight`
    light: usize,
    fixedcolormap: Option<usize>,
    target: ScreenTarget,
}

/// Doom function name `R_MapPlane`
pub fn map_plane(p: &SpanPlane, y: i32, x1: i32, x2: i32) {
    let t = &p.tables;
    if y == t.centery || x2 < x1 || y < 0 || y >= t.height {
        return;
    }
    let den = FRACUNIT as i128 * FRACUNIT as i128 * (t.centery - y).abs() as i128;
    let distance = fixed_mul(p.planeheight, t.yslope[y as usize]);

    let xstep = (p.sine as i128 * p.planeheight as i128 * t.viewfocratio as i128 / den) as Fixed;
    let ystep = (p.cosine as i128 * p.planeheight as i128 * t.viewfocratio as i128 / den) as Fixed;

    let xfrac = p
        .xoffs
        .wrapping_add(fixed_mul(p.cosine, distance))
        .wrapping_add((x1 - t.centerx).wrapping_mul(xstep));
    let yfrac = p
        .yoffs
        .wrapping_sub(fixed_mul(p.sine, distance))
        .wrapping_add((x1 - t.centerx).wrapping_mul(ystep));

    let colourmap = match p.fixedcolormap {
        Some(fixed) => fixed,
        None => {
            let index = ((distance as u32) >> LIGHTZSHIFT).min(MAXLIGHTZ as u32 - 1);
            t.zlight[p.light][index as usize]
        }
    };

    DrawSpan {
        source: &p.flat.data,
        colourmap: &p.colourmaps[colourmap * 256..(colourmap + 1) * 256],
        xfrac: fixed_mul(xfrac, p.xscale),
        yfrac: fixed_mul(yfrac, p.yscale),
        xstep: fixed_mul(xstep, p.xscale),
        ystep: fixed_mul(ystep, p.yscale),
        y,
        x1,
        x2,
    }
    .draw(&p.target);
}

/// Doom function name `R_MakeSpans`. Rows that close at column `x` are
/// drawn, rows that open at `x` get their start recorded. Closed rows are
/// handed out in groups, each task with its own copy of the starts.
#[allow(clippy::too_many_arguments)]
fn make_spans(
    x: i32,
    mut t1: i32,
    mut b1: i32,
    mut t2: i32,
    mut b2: i32,
    spanstart: &mut [i32],
    plane: &Arc<SpanPlane>,
    workers: &mut DrawWorkers,
) {
    while t1 < t2 && t1 <= b1 {
        let mut starts = [0; SPAN_TASK_GRANULARITY];
        let mut count = 0;
        while count < SPAN_TASK_GRANULARITY && t1 + (count as i32) < t2 && t1 + (count as i32) <= b1 {
            starts[count] = spanstart[(t1 + count as i32) as usize];
            count += 1;
        }
        let first = t1;
        let plane = Arc::clone(plane);
        workers.run_span(move |_| {
            for (i, start) in starts[..count].iter().enumerate() {
                map_plane(&plane, first + i as i32, *start, x - 1);
            }
        });
        t1 += count as i32;
    }
    while b1 > b2 && b1 >= t1 {
        let mut starts = [0; SPAN_TASK_GRANULARITY];
        let mut count = 0;
        while count < SPAN_TASK_GRANULARITY && b1 - (count as i32) > b2 && b1 - (count as i32) >= t1 {
            starts[count] = spanstart[(b1 - count as i32) as usize];
            count += 1;
        }
        let first = b1;
        let plane = Arc::clone(plane);
        workers.run_span(move |_| {
            for (i, start) in starts[..count].iter().enumerate() {
                map_plane(&plane, first - i as i32, *start, x - 1);
            }
        });
        b1 -= count as i32;
    }

    while t2 < t1 && t2 <= b2 {
        spanstart[t2 as usize] = x;
        t2 += 1;
    }
    while b2 > b1 && b2 >= t2 {
        spanstart[b2 as usize] = x;
        b2 -= 1;
    }
}

/// Sky columns are sampled by view angle alone
struct SkyPlane {
    patch: Arc<Patch>,
    colourmaps: Arc<[u8]>,
    colourmap: usize,
    tables: Arc<ViewTables>,
    an: Angle,
    flip: Angle,
    texturemid: Fixed,
    target: ScreenTarget,
}

impl SkyPlane {
    fn new(picnum: u32, view: &View, map: &MapData, pic_data: &PicData, target: ScreenTarget) -> Self {
        let mut an = view.angle;
        let (texture, texturemid, flip) = if picnum & PL_SKYFLAT != 0 {
            // Sky transferred from the first side of a line
            let line_num = (picnum & !PL_SKYFLAT) as usize;
            let Some(line) = map.linedefs.get(line_num) else {
                panic!("R_DoDrawPlane: sky line {line_num} does not exist");
            };
            let Some(side) = line.sidenum[0].and_then(|s| map.sidedefs.get(s)) else {
                panic!("R_DoDrawPlane: sky line {line_num} has no front side");
            };
            an = an.wrapping_add(side.textureoffset as Angle);
            let flip = if line.special == SKY_LINE_UNFLIPPED { 0 } else { !0 };
            (side.toptexture, side.rowoffset.wrapping_sub(SKY_LINE_MID_OFFSET), flip)
        } else {
            (pic_data.sky_texture(), pic_data.sky_texture_mid(), 0)
        };

        Self {
            patch: Arc::clone(pic_data.wall(texture)),
            colourmaps: Arc::clone(pic_data.colourmaps()),
            colourmap: view.fixedcolormap.unwrap_or(0),
            tables: Arc::clone(&view.tables),
            an,
            flip,
            texturemid,
            target,
        }
    }
}

/// Doom function name `R_DoDrawSkyPlane`. Each task takes a block of
/// columns with its own copy of their rows.
fn draw_sky_plane(plane: &Visplane, sky: Arc<SkyPlane>, workers: &mut DrawWorkers) {
    let mut x = plane.minx;
    while x <= plane.maxx {
        let first = x;
        let mut rows = [(PLANE_UNUSED, 0); SKY_PLANE_MACRO_COLUMNS as usize];
        for (i, row) in rows.iter_mut().enumerate() {
            let cx = first + i as i32;
            if cx > plane.maxx {
                break;
            }
            *row = (plane.top(cx), plane.bottom(cx));
        }
        let sky = Arc::clone(&sky);
        workers.run_sky(move |columns| {
            let t = &sky.tables;
            let colourmap = &sky.colourmaps[sky.colourmap * 256..(sky.colourmap + 1) * 256];
            for (i, &(yl, yh)) in rows.iter().enumerate() {
                if yl == PLANE_UNUSED || yl > yh {
                    continue;
                }
                let cx = first + i as i32;
                let angle = (sky.an.wrapping_add(t.xtoviewangle[cx as usize]) ^ sky.flip)
                    >> ANGLETOSKYSHIFT;
                let dc = DrawColumn::new(
                    sky.patch.column(angle as usize),
                    colourmap,
                    t.skyiscale,
                    cx,
                    sky.texturemid,
                    yl,
                    yh,
                )
                .wrapping(sky.patch.height as i32);
                columns.draw_column(&dc, &sky.target, t.centery);
            }
        });
        x += SKY_PLANE_MACRO_COLUMNS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::FRACBITS;

    fn key(height: Fixed, picnum: u32) -> PlaneKey {
        PlaneKey {
            height,
            picnum,
            lightlevel: 160,
            xscale: FRACUNIT,
            yscale: FRACUNIT,
            ..Default::default()
        }
    }

    #[test]
    fn find_plane_reuses_matching_key() {
        let mut planes = VisPlaneRender::new(320, 200);
        let a = planes.find_plane(key(0, 3), 41 << FRACBITS, 1);
        let b = planes.find_plane(key(0, 3), 41 << FRACBITS, 1);
        let c = planes.find_plane(key(8 << FRACBITS, 3), 41 << FRACBITS, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(planes.active_planes().len(), 2);
        assert!(planes.plane(a).is_empty());

        planes.clear_planes();
        assert!(planes.active_planes().is_empty());
        let d = planes.find_plane(key(0, 3), 41 << FRACBITS, 1);
        assert_eq!(d, 0);
    }

    #[test]
    fn sky_planes_merge_by_side_of_view() {
        let mut planes = VisPlaneRender::new(320, 200);
        let viewz = 41 << FRACBITS;
        let mut dark = key(128 << FRACBITS, 1);
        dark.lightlevel = 16;
        let a = planes.find_plane(key(128 << FRACBITS, 1), viewz, 1);
        let b = planes.find_plane(dark, viewz, 1);
        let c = planes.find_plane(key(0, 1), viewz, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(planes.plane(a).key.height, 1);
        assert_eq!(planes.plane(c).key.lightlevel, 0);
    }

    #[test]
    fn check_plane_extends_or_duplicates() {
        let mut planes = VisPlaneRender::new(320, 200);
        let p = planes.find_plane(key(0, 3), FRACUNIT, 1);
        let p = planes.check_plane(p, 10, 20);
        for x in 10..=20 {
            planes.plane_mut(p).set_top(x, 100);
            planes.plane_mut(p).set_bottom(x, 150);
        }
        // Adjacent range with nothing marked in the overlap
        let q = planes.check_plane(p, 21, 40);
        assert_eq!(p, q);
        assert_eq!((planes.plane(p).minx, planes.plane(p).maxx), (10, 40));

        // Overlapping marked columns need a new plane
        let r = planes.check_plane(p, 15, 30);
        assert_ne!(p, r);
        assert_eq!(planes.plane(r).key, planes.plane(p).key);
        assert_eq!((planes.plane(r).minx, planes.plane(r).maxx), (15, 30));
        assert_eq!(planes.plane(r).top(15), PLANE_UNUSED);
        assert_eq!(planes.active_planes().len(), 2);
    }

    #[test]
    fn hash_stays_in_table() {
        assert!(visplane_hash(u32::MAX, 255, -1) < MAXVISPLANES);
        assert_eq!(visplane_hash(1, 0, 0), 3);
    }
}
