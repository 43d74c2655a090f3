use std::sync::Arc;

use level::{LineDef, LineDefFlags, MapData, NO_TEXTURE, Patch, PicData, Segment, SideDef};
use math::{
    ANG90, ANG180, ANGLETOFINESHIFT, Angle, FINEANGLES, FRACBITS, Fixed, fine, finesine,
    finetangent, fixed_mul,
};

use crate::RenderData;
use crate::bsp::SectorView;
use crate::defs::{
    ClipArray, DrawSeg, LIGHTLEVELS, LIGHTSEGSHIFT, PLANE_UNUSED, RF_BOT_TILE, RF_MID_TILE,
    RF_TOP_TILE, SIL_BOTH, SIL_BOTTOM, SIL_TOP,
};
use crate::draw::{ColumnBuffer, DrawColumn, ScreenTarget};
use crate::utilities::{point_to_dist, scale_from_global_angle};
use crate::view::View;

const HEIGHTBITS: i32 = 12;
const HEIGHTUNIT: i32 = 1 << HEIGHTBITS;

/// The seg being drawn plus what the BSP walk worked out for it: the
/// possibly faked sectors either side, the cached line flags and the angle
/// to its first vertex.
pub(crate) struct WallSeg<'a> {
    pub seg_num: usize,
    pub seg: &'a Segment,
    pub line: &'a LineDef,
    pub side: &'a SideDef,
    pub front: &'a SectorView,
    pub back: Option<&'a SectorView>,
    pub r_flags: u32,
    pub rw_angle1: Angle,
}

/// Light row for a wall. Walls along the axes get a little fake contrast.
pub(crate) fn wall_light_row(seg: &Segment, lightlevel: i32, extralight: i32) -> usize {
    let mut lightnum = (lightlevel >> LIGHTSEGSHIFT) + extralight;
    if seg.v1.y == seg.v2.y {
        lightnum -= 1;
    } else if seg.v1.x == seg.v2.x {
        lightnum += 1;
    }
    lightnum.clamp(0, LIGHTLEVELS as i32 - 1) as usize
}

/// Texture column with the width wrapped to a power of two
#[inline]
pub(crate) fn texture_column(patch: &Patch, texturecolumn: i32) -> &[u8] {
    patch.column(texturecolumn as usize & patch.widthmask)
}

/// All of the state in this struct is unique to it as it is used once per seg
/// to be rendered.
pub(crate) struct SegRender {
    /// True if any of the segs textures might be visible.
    segtextured: bool,
    /// False if the back side is the same plane.
    markfloor: bool,
    markceiling: bool,
    maskedtexture: bool,
    /// Offset in to `openings`, indexed by screen column
    maskedtexturecol: isize,
    toptexture: Option<Arc<Patch>>,
    bottomtexture: Option<Arc<Patch>>,
    midtexture: Option<Arc<Patch>>,
    /// Wrap heights, zero when the texture fits and is not tiled
    toptexheight: i32,
    midtexheight: i32,
    bottomtexheight: i32,

    rw_normalangle: Angle,
    // regular wall
    rw_x: i32,
    rw_stopx: i32,
    rw_centerangle: Angle,
    rw_offset: Fixed,
    rw_distance: Fixed,
    rw_scale: Fixed,
    rw_scalestep: Fixed,
    rw_midtexturemid: Fixed,
    rw_toptexturemid: Fixed,
    rw_bottomtexturemid: Fixed,

    pixhigh: Fixed,
    pixlow: Fixed,
    pixhighstep: Fixed,
    pixlowstep: Fixed,

    topfrac: Fixed,
    topstep: Fixed,
    bottomfrac: Fixed,
    bottomstep: Fixed,

    worldtop: Fixed,
    worldbottom: Fixed,
    worldhigh: Fixed,
    worldlow: Fixed,

    /// Row of `scalelight` for the wall
    wall_lights: usize,
}

impl SegRender {
    pub fn new() -> Self {
        Self {
            segtextured: false,
            markfloor: false,
            markceiling: false,
            maskedtexture: false,
            maskedtexturecol: 0,
            toptexture: None,
            bottomtexture: None,
            midtexture: None,
            toptexheight: 0,
            midtexheight: 0,
            bottomtexheight: 0,
            rw_normalangle: 0,
            rw_x: 0,
            rw_stopx: 0,
            rw_centerangle: 0,
            rw_offset: 0,
            rw_distance: 0,
            rw_scale: 0,
            rw_scalestep: 0,
            rw_midtexturemid: 0,
            rw_toptexturemid: 0,
            rw_bottomtexturemid: 0,
            pixhigh: 0,
            pixlow: 0,
            pixhighstep: 0,
            pixlowstep: 0,
            topfrac: 0,
            topstep: 0,
            bottomfrac: 0,
            bottomstep: 0,
            worldtop: 0,
            worldbottom: 0,
            worldhigh: 0,
            worldlow: 0,
            wall_lights: 0,
        }
    }

    fn wall_texture(pic_data: &PicData, num: usize, tiled: bool) -> (Option<Arc<Patch>>, i32) {
        if num == NO_TEXTURE {
            return (None, 0);
        }
        let patch = pic_data.wall(num);
        let height = if tiled { 0 } else { patch.height as i32 };
        (Some(Arc::clone(patch)), height)
    }

    /// R_StoreWallRange - r_segs
    ///
    /// A wall segment will be drawn between start and stop pixels
    /// (inclusive). Records a drawseg for it.
    #[allow(clippy::too_many_arguments)]
    pub fn store_wall_range(
        &mut self,
        start: i32,
        stop: i32,
        wall: &WallSeg,
        view: &View,
        map: &MapData,
        pic_data: &PicData,
        rdata: &mut RenderData,
        columns: &mut ColumnBuffer,
        target: &ScreenTarget,
    ) {
        let t = Arc::clone(&view.tables);
        if start >= t.width || start > stop || start < 0 {
            panic!("Bad R_RenderWallRange: {start} to {stop}");
        }

        let seg = wall.seg;
        let side = wall.side;
        let line = wall.line;
        let front = wall.front;
        let sky_flat = pic_data.sky_flat();

        // calculate rw_distance for scale calculation
        self.rw_normalangle = seg.angle.wrapping_add(ANG90);
        let offsetangle = (self.rw_normalangle.wrapping_sub(wall.rw_angle1) as i32)
            .unsigned_abs()
            .min(ANG90);
        let distangle = ANG90 - offsetangle;
        let hyp = point_to_dist(view.x, view.y, seg.v1.x, seg.v1.y);
        let sineval = finesine(fine(distangle));
        self.rw_distance = fixed_mul(hyp, sineval);

        self.rw_x = start;
        self.rw_stopx = stop + 1;
        let mut ds = DrawSeg::new(wall.seg_num);
        ds.x1 = start;
        ds.x2 = stop;

        // calculate scale at both ends and step
        self.rw_scale = scale_from_global_angle(
            view.angle.wrapping_add(t.xtoviewangle[start as usize]),
            view.angle,
            self.rw_normalangle,
            self.rw_distance,
            t.projectiony,
        );
        ds.scale1 = self.rw_scale;
        if stop > start {
            ds.scale2 = scale_from_global_angle(
                view.angle.wrapping_add(t.xtoviewangle[stop as usize]),
                view.angle,
                self.rw_normalangle,
                self.rw_distance,
                t.projectiony,
            );
            self.rw_scalestep = (ds.scale2 - self.rw_scale) / (stop - start);
            ds.scalestep = self.rw_scalestep;
        } else {
            ds.scale2 = ds.scale1;
            self.rw_scalestep = 0;
        }

        // calculate texture boundaries
        //  and decide if floor / ceiling marks are needed
        self.worldtop = front.ceilingheight.wrapping_sub(view.z);
        self.worldbottom = front.floorheight.wrapping_sub(view.z);

        self.midtexture = None;
        self.toptexture = None;
        self.bottomtexture = None;
        self.maskedtexture = false;

        match wall.back {
            None => {
                // single sided line
                (self.midtexture, self.midtexheight) =
                    Self::wall_texture(pic_data, side.midtexture, wall.r_flags & RF_MID_TILE != 0);
                // a single sided line is terminal, so it must mark ends
                self.markfloor = true;
                self.markceiling = true;
                self.rw_midtexturemid = if line.flags & LineDefFlags::UNPEG_BOTTOM != 0 {
                    // bottom of texture at bottom
                    let vtop = front.floorheight + pic_data.wall_height(side.midtexture);
                    vtop - view.z
                } else {
                    // top of texture at top
                    self.worldtop
                };
                self.rw_midtexturemid += side.rowoffset + side.rowoffset_mid;

                ds.silhouette = SIL_BOTH;
                ds.sprtopclip = Some(ClipArray::ScreenHeight);
                ds.sprbottomclip = Some(ClipArray::NegOne);
                ds.bsilheight = i32::MAX;
                ds.tsilheight = i32::MIN;
            }
            Some(back) => {
                // two sided line
                if front.floorheight > back.floorheight {
                    ds.silhouette = SIL_BOTTOM;
                    ds.bsilheight = front.floorheight;
                } else if back.floorheight > view.z {
                    ds.silhouette = SIL_BOTTOM;
                    ds.bsilheight = i32::MAX;
                }

                if front.ceilingheight < back.ceilingheight {
                    ds.silhouette |= SIL_TOP;
                    ds.tsilheight = front.ceilingheight;
                } else if back.ceilingheight < view.z {
                    ds.silhouette |= SIL_TOP;
                    ds.tsilheight = i32::MIN;
                }

                if back.ceilingheight <= front.floorheight {
                    ds.sprbottomclip = Some(ClipArray::NegOne);
                    ds.bsilheight = i32::MAX;
                    ds.silhouette |= SIL_BOTTOM;
                }

                if back.floorheight >= front.ceilingheight {
                    ds.sprtopclip = Some(ClipArray::ScreenHeight);
                    ds.tsilheight = i32::MIN;
                    ds.silhouette |= SIL_TOP;
                }

                self.worldhigh = back.ceilingheight.wrapping_sub(view.z);
                self.worldlow = back.floorheight.wrapping_sub(view.z);

                // hack to allow height changes in outdoor areas
                if front.ceilingpic == sky_flat && back.ceilingpic == sky_flat {
                    self.worldtop = self.worldhigh;
                }

                self.markfloor = self.worldlow != self.worldbottom
                    || front.floor_planes_differ(back, map)
                    // don't let normals bleed through deep water
                    || front.heightsec.is_some();

                self.markceiling = self.worldhigh != self.worldtop
                    || front.ceiling_planes_differ(back, map)
                    || (front.heightsec.is_some() && front.ceilingpic != sky_flat);

                if back.ceilingheight <= front.floorheight
                    || back.floorheight >= front.ceilingheight
                {
                    // closed door
                    self.markceiling = true;
                    self.markfloor = true;
                }

                if self.worldhigh < self.worldtop {
                    // top texture
                    (self.toptexture, self.toptexheight) = Self::wall_texture(
                        pic_data,
                        side.toptexture,
                        wall.r_flags & RF_TOP_TILE != 0,
                    );
                    self.rw_toptexturemid = if line.flags & LineDefFlags::UNPEG_TOP != 0 {
                        // top of texture at top
                        self.worldtop
                    } else {
                        // bottom of texture
                        let vtop = back.ceilingheight + pic_data.wall_height(side.toptexture);
                        vtop - view.z
                    };
                }
                if self.worldlow > self.worldbottom {
                    // bottom texture
                    (self.bottomtexture, self.bottomtexheight) = Self::wall_texture(
                        pic_data,
                        side.bottomtexture,
                        wall.r_flags & RF_BOT_TILE != 0,
                    );
                    self.rw_bottomtexturemid = if line.flags & LineDefFlags::UNPEG_BOTTOM != 0 {
                        // bottom of texture at bottom
                        self.worldtop
                    } else {
                        // top of texture at top
                        self.worldlow
                    };
                }
                self.rw_toptexturemid += side.rowoffset + side.rowoffset_top;
                self.rw_bottomtexturemid += side.rowoffset + side.rowoffset_bottom;

                // allocate space for masked texture tables
                if side.midtexture != NO_TEXTURE {
                    // masked midtexture
                    self.maskedtexture = true;
                    let openings = &mut rdata.visplane_render.openings;
                    self.maskedtexturecol = openings.len() as isize - self.rw_x as isize;
                    ds.maskedtexturecol = Some(self.maskedtexturecol);
                    openings.resize(openings.len() + (self.rw_stopx - self.rw_x) as usize, PLANE_UNUSED);
                }
            }
        }

        // calculate rw_offset (only needed for textured lines)
        self.segtextured = self.midtexture.is_some()
            || self.toptexture.is_some()
            || self.bottomtexture.is_some()
            || self.maskedtexture;

        if self.segtextured {
            let mut offsetangle = self.rw_normalangle.wrapping_sub(wall.rw_angle1);
            if offsetangle > ANG180 {
                offsetangle = 0u32.wrapping_sub(offsetangle);
            }
            offsetangle = offsetangle.min(ANG90);

            let sineval = finesine(fine(offsetangle));
            self.rw_offset = fixed_mul(hyp, sineval);
            if self.rw_normalangle.wrapping_sub(wall.rw_angle1) < ANG180 {
                self.rw_offset = -self.rw_offset;
            }
            self.rw_offset += side.textureoffset + seg.offset;
            self.rw_centerangle = ANG90
                .wrapping_add(view.angle)
                .wrapping_sub(self.rw_normalangle);

            // calculate light table
            //  use different light tables
            //  for horizontal / vertical / diagonal
            if view.fixedcolormap.is_none() {
                self.wall_lights = wall_light_row(seg, front.lightlevel, view.extralight);
            }
        }

        // if a floor / ceiling plane is on the wrong side
        //  of the view plane, it is definitely invisible
        //  and doesn't need to be marked. Deep water sectors are
        //  always marked.
        if front.heightsec.is_none() {
            if front.floorheight >= view.z {
                // above view plane
                self.markfloor = false;
            }
            if front.ceilingheight <= view.z && front.ceilingpic != sky_flat {
                // below view plane
                self.markceiling = false;
            }
        }

        // calculate incremental stepping values for texture edges
        self.worldtop >>= 4;
        self.worldbottom >>= 4;

        self.topstep = -fixed_mul(self.rw_scalestep, self.worldtop);
        self.topfrac = (t.centeryfrac >> 4) - fixed_mul(self.worldtop, self.rw_scale);

        self.bottomstep = -fixed_mul(self.rw_scalestep, self.worldbottom);
        self.bottomfrac = (t.centeryfrac >> 4) - fixed_mul(self.worldbottom, self.rw_scale);

        if wall.back.is_some() {
            self.worldhigh >>= 4;
            self.worldlow >>= 4;

            if self.worldhigh < self.worldtop {
                self.pixhigh = (t.centeryfrac >> 4) - fixed_mul(self.worldhigh, self.rw_scale);
                self.pixhighstep = -fixed_mul(self.rw_scalestep, self.worldhigh);
            }
            if self.worldlow > self.worldbottom {
                self.pixlow = (t.centeryfrac >> 4) - fixed_mul(self.worldlow, self.rw_scale);
                self.pixlowstep = -fixed_mul(self.rw_scalestep, self.worldlow);
            }
        }

        // render it
        let planes = &mut rdata.visplane_render;
        if self.markceiling {
            match planes.ceilingplane {
                Some(p) => planes.ceilingplane = Some(planes.check_plane(p, self.rw_x, self.rw_stopx - 1)),
                None => self.markceiling = false,
            }
        }
        if self.markfloor {
            match planes.floorplane {
                Some(p) => planes.floorplane = Some(planes.check_plane(p, self.rw_x, self.rw_stopx - 1)),
                None => self.markfloor = false,
            }
        }

        self.render_seg_loop(view, pic_data, rdata, columns, target);

        // save sprite clipping info
        let stopx = self.rw_stopx as usize;
        let openings = &mut rdata.visplane_render.openings;
        if (ds.silhouette & SIL_TOP != 0 || self.maskedtexture) && ds.sprtopclip.is_none() {
            let offset = openings.len() as isize - start as isize;
            openings.extend_from_slice(&rdata.portal_clip.ceilingclip[start as usize..stopx]);
            ds.sprtopclip = Some(ClipArray::Openings(offset));
        }
        if (ds.silhouette & SIL_BOTTOM != 0 || self.maskedtexture) && ds.sprbottomclip.is_none() {
            let offset = openings.len() as isize - start as isize;
            openings.extend_from_slice(&rdata.portal_clip.floorclip[start as usize..stopx]);
            ds.sprbottomclip = Some(ClipArray::Openings(offset));
        }

        if self.maskedtexture && ds.silhouette & SIL_TOP == 0 {
            ds.silhouette |= SIL_TOP;
            ds.tsilheight = i32::MIN;
        }
        if self.maskedtexture && ds.silhouette & SIL_BOTTOM == 0 {
            ds.silhouette |= SIL_BOTTOM;
            ds.bsilheight = i32::MAX;
        }
        rdata.drawsegs.push(ds);
    }

    /// Doom function name `R_RenderSegLoop`
    ///
    /// Draws zero, one, or two textures (and possibly a masked texture) for
    /// walls. Can draw or mark the starting pixel of floor and ceiling
    /// textures.
    fn render_seg_loop(
        &mut self,
        view: &View,
        pic_data: &PicData,
        rdata: &mut RenderData,
        columns: &mut ColumnBuffer,
        target: &ScreenTarget,
    ) {
        let t = &view.tables;
        let centery = t.centery;
        let clip = &mut rdata.portal_clip;
        let planes = &mut rdata.visplane_render;
        let floorplane = planes.floorplane;
        let ceilingplane = planes.ceilingplane;

        let mut texturecolumn = 0;
        let mut colourmap = pic_data.colourmap(view.fixedcolormap.unwrap_or(0));
        let mut iscale = 0;

        for x in self.rw_x..self.rw_stopx {
            let xu = x as usize;
            // mark floor / ceiling areas
            let yl = ((self.topfrac + HEIGHTUNIT - 1) >> HEIGHTBITS).max(clip.ceilingclip[xu] + 1);

            if self.markceiling {
                if let Some(p) = ceilingplane {
                    let top = clip.ceilingclip[xu] + 1;
                    let bottom = (yl - 1).min(clip.floorclip[xu] - 1);
                    if top <= bottom {
                        let plane = planes.plane_mut(p);
                        plane.set_top(x, top);
                        plane.set_bottom(x, bottom);
                    }
                }
            }

            let yh = (self.bottomfrac >> HEIGHTBITS).min(clip.floorclip[xu] - 1);

            if self.markfloor {
                if let Some(p) = floorplane {
                    let top = (yh + 1).max(clip.ceilingclip[xu] + 1);
                    let bottom = clip.floorclip[xu] - 1;
                    if top <= bottom {
                        let plane = planes.plane_mut(p);
                        plane.set_top(x, top);
                        plane.set_bottom(x, bottom);
                    }
                }
            }

            // texturecolumn and lighting are independent of wall tiers
            if self.segtextured {
                // calculate texture offset
                let mut angle =
                    (self.rw_centerangle.wrapping_add(t.xtoviewangle[xu]) >> ANGLETOFINESHIFT) as usize;
                if angle >= FINEANGLES / 2 {
                    angle = 0;
                }
                texturecolumn = self
                    .rw_offset
                    .wrapping_sub(fixed_mul(finetangent(angle), self.rw_distance))
                    >> FRACBITS;

                // calculate lighting
                if view.fixedcolormap.is_none() {
                    let index = t.scale_light_index(self.rw_scale);
                    colourmap = pic_data.colourmap(t.scalelight[self.wall_lights][index]);
                }
                iscale = (u32::MAX / (self.rw_scale as u32).max(1)) as i32;
            }

            // draw the wall tiers
            if let Some(mid) = &self.midtexture {
                // single sided line
                let dc = DrawColumn::new(
                    texture_column(mid, texturecolumn),
                    colourmap,
                    iscale,
                    x,
                    self.rw_midtexturemid,
                    yl,
                    yh,
                )
                .wrapping(self.midtexheight);
                columns.draw_column(&dc, target, centery);
                clip.ceilingclip[xu] = t.height;
                clip.floorclip[xu] = -1;
            } else {
                // two sided line
                if let Some(top) = &self.toptexture {
                    // top wall
                    let mid = (self.pixhigh >> HEIGHTBITS).min(clip.floorclip[xu] - 1);
                    self.pixhigh += self.pixhighstep;

                    if mid >= yl {
                        let dc = DrawColumn::new(
                            texture_column(top, texturecolumn),
                            colourmap,
                            iscale,
                            x,
                            self.rw_toptexturemid,
                            yl,
                            mid,
                        )
                        .wrapping(self.toptexheight);
                        columns.draw_column(&dc, target, centery);
                        clip.ceilingclip[xu] = mid;
                    } else {
                        clip.ceilingclip[xu] = yl - 1;
                    }
                } else if self.markceiling {
                    // no top wall
                    clip.ceilingclip[xu] = yl - 1;
                }

                if let Some(bottom) = &self.bottomtexture {
                    // bottom wall
                    let mid = ((self.pixlow + HEIGHTUNIT - 1) >> HEIGHTBITS)
                        .max(clip.ceilingclip[xu] + 1);
                    self.pixlow += self.pixlowstep;

                    if mid <= yh {
                        let dc = DrawColumn::new(
                            texture_column(bottom, texturecolumn),
                            colourmap,
                            iscale,
                            x,
                            self.rw_bottomtexturemid,
                            mid,
                            yh,
                        )
                        .wrapping(self.bottomtexheight);
                        columns.draw_column(&dc, target, centery);
                        clip.floorclip[xu] = mid;
                    } else {
                        clip.floorclip[xu] = yh + 1;
                    }
                } else if self.markfloor {
                    // no bottom wall
                    clip.floorclip[xu] = yh + 1;
                }

                if self.maskedtexture {
                    // save texturecol
                    //  for backdrawing of masked mid texture
                    planes.openings[(self.maskedtexturecol + x as isize) as usize] = texturecolumn;
                }
            }

            self.rw_scale += self.rw_scalestep;
            self.topfrac += self.topstep;
            self.bottomfrac += self.bottomstep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use level::{Patch, Vertex};
    use math::FRACUNIT;

    fn seg(v1: Vertex, v2: Vertex) -> Segment {
        Segment {
            v1,
            v2,
            offset: 0,
            angle: 0,
            sidedef: 0,
            linedef: Some(0),
            frontsector: 0,
            backsector: None,
        }
    }

    #[test]
    fn fake_contrast() {
        let h = seg(Vertex::new(0, 0), Vertex::new(64 * FRACUNIT, 0));
        let v = seg(Vertex::new(0, 0), Vertex::new(0, 64 * FRACUNIT));
        let d = seg(Vertex::new(0, 0), Vertex::new(64 * FRACUNIT, 64 * FRACUNIT));
        assert_eq!(wall_light_row(&h, 160, 0), 9);
        assert_eq!(wall_light_row(&v, 160, 0), 11);
        assert_eq!(wall_light_row(&d, 160, 0), 10);
        assert_eq!(wall_light_row(&v, 255, 2), LIGHTLEVELS - 1);
        assert_eq!(wall_light_row(&h, 0, 0), 0);
    }

    #[test]
    fn texture_columns_wrap_by_mask() {
        let rows: Vec<u8> = (0..8).flat_map(|_| 0..64u8).collect();
        let patch = Patch::solid("WALL", 64, 8, &rows);
        assert_eq!(texture_column(&patch, 3)[0], 3);
        assert_eq!(texture_column(&patch, 67)[0], 3);
        assert_eq!(texture_column(&patch, -1)[0], 63);
    }
}
