#[cfg(feature = "hprof")]
use coarse_prof::profile;
use level::{
    FF_FRAMEMASK, FF_FULLBRIGHT, Level, LineDefFlags, MapData, MapObjFlag, Patch, PicData, Player,
    PspDef,
};
use math::{
    ANG45, ANG180, Fixed, FRACBITS, FRACUNIT, fixed_div, fixed_mul,
};

use crate::bsp::SoftwareRenderer;
use crate::defs::{ClipArray, MAXLIGHTSCALE, PLANE_UNUSED, SIL_BOTTOM, SIL_TOP};
use crate::draw::{Blend, ColumnBuffer, DrawColumn, ScreenTarget};
use crate::segs::wall_light_row;
use crate::utilities::lerp_fixed;

/// Things closer than this are behind the view plane
const MINZ: Fixed = FRACUNIT * 4;
/// Screen row the weapon is positioned against, in 320x200 units
const BASEYCENTER: i32 = 100;
/// Runs shorter than this are insertion sorted
const MSORT_INSERTION_LIMIT: usize = 16;
/// Unset entry in the sprite clip arrays
const CLIP_UNSET: i32 = -2;

/// A thing or weapon overlay projected on to the screen
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisSprite {
    pub x1: i32,
    pub x2: i32,
    /// Line side calc
    pub gx: Fixed,
    pub gy: Fixed,
    /// Bottom and top for clipping
    pub gz: Fixed,
    pub gzt: Fixed,
    /// horizontal position of x1
    pub startfrac: Fixed,
    pub scale: Fixed,
    /// negative if flipped
    pub xiscale: Fixed,
    pub texturemid: Fixed,
    /// The index in to sprite patches
    pub patch: usize,
    /// Colourmap number, `None` draws the fuzz effect
    pub colormap: Option<usize>,
    pub mobjflags: u64,
    /// Height transfer of the thing's sector, for the special clipping
    pub heightsec: Option<usize>,
    pub floorclip: Fixed,
    /// Blend table number
    pub tranmap: Option<usize>,
    /// Weapon overlays are placed with the psprite scales
    pub psprite: bool,
}

/// Per column values of a masked draw that don't change along the sprite
struct MaskedColumn<'a> {
    colourmap: &'a [u8],
    blend: Blend<'a>,
    iscale: Fixed,
    x: i32,
    texturemid: Fixed,
    /// Screen row of the patch top, in fixed point
    sprtopscreen: i64,
    spryscale: Fixed,
    /// Last row drawn when the foot is clipped, -1 for none
    baseclip: i32,
}

/// R_DrawMaskedColumn - r_things
///
/// Draws each post of a patch column, clipped between `topclip` and
/// `botclip` (exclusive). Returns the number of rows drawn.
#[allow(clippy::too_many_arguments)]
fn draw_masked_column(
    columns: &mut ColumnBuffer,
    target: &ScreenTarget,
    centery: i32,
    patch: &Patch,
    texcol: usize,
    mc: &MaskedColumn,
    topclip: i32,
    botclip: i32,
) -> i32 {
    let viewheight = target.height() as i32;
    let pixels = patch.column(texcol);
    let mut colheight = 0;

    for post in patch.posts(texcol) {
        // calculate unclipped screen coordinates for post
        let topscreen = mc.sprtopscreen + mc.spryscale as i64 * post.topdelta as i64;
        let bottomscreen = topscreen + mc.spryscale as i64 * post.length as i64;

        let yl = (((topscreen + FRACUNIT as i64 - 1) >> FRACBITS) as i32).max(topclip + 1);
        let mut yh = (((bottomscreen - 1) >> FRACBITS) as i32).min(botclip - 1);
        if mc.baseclip != -1 && yh >= mc.baseclip {
            yh = mc.baseclip;
        }

        // killough 3/2/98, 3/27/98: Failsafe against overflow/crash:
        if yl >= 0 && yl <= yh && yh < viewheight {
            let start = post.topdelta as usize;
            let end = (start + post.length as usize).min(pixels.len());
            let dc = DrawColumn::new(
                &pixels[start..end],
                mc.colourmap,
                mc.iscale,
                mc.x,
                mc.texturemid - (post.topdelta << FRACBITS),
                yl,
                yh,
            )
            .with_blend(mc.blend);
            columns.draw_column(&dc, target, centery);
            colheight += yh - yl + 1;
        }
    }
    colheight
}

/// killough 9/2/98: merge sort, nearest (largest scale) first. The input is
/// close to ordered already from the BSP walk.
fn msort(s: &mut [usize], t: &mut [usize], vissprites: &[VisSprite]) {
    let n = s.len();
    let scale = |i: usize| vissprites[i].scale;
    if n >= MSORT_INSERTION_LIMIT {
        let n1 = n / 2;
        {
            let (s1, s2) = s.split_at_mut(n1);
            msort(s1, t, vissprites);
            msort(s2, t, vissprites);
        }

        let (mut i, mut j, mut d) = (0, n1, 0);
        loop {
            if scale(s[i]) > scale(s[j]) {
                t[d] = s[i];
                i += 1;
                d += 1;
                if i == n1 {
                    break;
                }
            } else {
                t[d] = s[j];
                j += 1;
                d += 1;
                if j == n {
                    break;
                }
            }
        }
        if j < n {
            t[d..n].copy_from_slice(&s[j..n]);
        } else {
            t[d..n].copy_from_slice(&s[i..n1]);
        }
        s.copy_from_slice(&t[..n]);
    } else {
        for i in 1..n {
            let temp = s[i];
            if scale(s[i - 1]) < scale(temp) {
                let mut j = i;
                loop {
                    s[j] = s[j - 1];
                    if scale(s[j]) < scale(temp) {
                        j -= 1;
                        if j == 0 {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                s[j] = temp;
            }
        }
    }
}

impl SoftwareRenderer {
    /// R_AddSprites - r_things
    ///
    /// During BSP traversal, this adds sprites by sector.
    pub(crate) fn add_sprites(
        &mut self,
        sector: usize,
        lightlevel: i32,
        level: &Level,
        pic_data: &PicData,
    ) {
        for thing in &level.map_data.sectors[sector].thinglist {
            self.project_sprite(*thing, lightlevel, level, pic_data);
        }
    }

    /// R_ProjectSprite - r_things
    ///
    /// Generates a vissprite for a thing if it might be visible.
    fn project_sprite(&mut self, idx: usize, lightlevel: i32, level: &Level, pic_data: &PicData) {
        let Some(thing) = level.things.get(idx) else {
            panic!("R_ProjectSprite: thing {idx} with numthings = {}", level.things.len());
        };
        // The view player's own body
        if idx == self.view.player_mobj {
            return;
        }
        let view = &self.view;
        let t = &view.tables;
        let map = &level.map_data;

        let (fx, fy, fz) = if level.tic_frac < FRACUNIT {
            (
                lerp_fixed(level.tic_frac, thing.prev_x, thing.x),
                lerp_fixed(level.tic_frac, thing.prev_y, thing.y),
                lerp_fixed(level.tic_frac, thing.prev_z, thing.z),
            )
        } else {
            (thing.x, thing.y, thing.z)
        };

        // transform the origin point
        let tr_x = fx.wrapping_sub(view.x);
        let tr_y = fy.wrapping_sub(view.y);

        let gxt = fixed_mul(tr_x, view.cos);
        let gyt = fixed_mul(tr_y, view.sin).wrapping_neg();
        let tz = gxt.wrapping_sub(gyt);

        // thing is behind view plane?
        if tz < MINZ {
            return;
        }

        let gxt = fixed_mul(tr_x, view.sin).wrapping_neg();
        let gyt = fixed_mul(tr_y, view.cos);
        let mut tx = gyt.wrapping_add(gxt).wrapping_neg();

        // too far off the side?
        if (tx as i64).abs() > (tz as i64) << 2 {
            return;
        }

        let xscale = fixed_div(t.projection, tz);

        // decide which patch to use for sprite relative to player
        let sprdef = pic_data.sprite_def(thing.sprite);
        let sprframe = sprdef.frame(thing.sprite, (thing.frame & FF_FRAMEMASK) as usize);

        let (lump, flip) = if sprframe.rotate {
            // choose a different rotation based on player view
            let ang = view.point_to_angle(fx, fy);
            let base = ang
                .wrapping_sub(thing.angle)
                .wrapping_add((ANG45 / 2).wrapping_mul(9));
            let rot = if sprframe.lump[0] == sprframe.lump[1] {
                base >> 28
            } else {
                base.wrapping_sub(ANG180 / 16) >> 28
            } as usize;
            (sprframe.lump[rot], sprframe.flip & (1 << rot) != 0)
        } else {
            // use single rotation for all views
            (sprframe.lump[0], sprframe.flip & 1 != 0)
        };

        let patch = pic_data.sprite_patch(lump);
        let width = patch.width as i32;

        // calculate edges of the shape
        if flip {
            tx = tx.wrapping_sub((width - patch.left_offset) << FRACBITS);
        } else {
            tx = tx.wrapping_sub(patch.left_offset << FRACBITS);
        }
        let x1 = t.centerxfrac.wrapping_add(fixed_mul(tx, xscale)) >> FRACBITS;
        tx = tx.wrapping_add(width << FRACBITS);
        let x2 = t
            .centerxfrac
            .wrapping_add(fixed_mul(tx, xscale))
            .wrapping_sub(FRACUNIT / 2)
            >> FRACBITS;
        let gzt = fz.wrapping_add(patch.top_offset << FRACBITS);

        // off the side?
        if x1 > t.width || x2 < 0 {
            return;
        }

        // killough 3/27/98: exclude things totally separated
        // from the viewer, by either water or fake ceilings
        let heightsec = map.sectors[map.subsectors[thing.subsector].sector].heightsec;
        if let Some(hs) = heightsec {
            let hs = &map.sectors[hs];
            let phs = view.heightsec.map(|p| &map.sectors[p]);
            let below = if phs.is_some_and(|p| view.z < p.floorheight) {
                fz >= hs.floorheight
            } else {
                gzt < hs.floorheight
            };
            if below {
                return;
            }
            let above = if phs.is_some_and(|p| view.z > p.ceilingheight) {
                gzt < hs.ceilingheight && view.z >= hs.ceilingheight
            } else {
                fz >= hs.ceilingheight
            };
            if above {
                return;
            }
        }

        let iscale = fixed_div(FRACUNIT, xscale);
        let mut vis = VisSprite {
            x1: x1.max(0),
            x2: x2.min(t.width - 1),
            gx: fx,
            gy: fy,
            gz: fz,
            gzt,
            scale: fixed_div(t.projectiony, tz),
            texturemid: gzt.wrapping_sub(view.z).wrapping_sub(thing.floorclip),
            patch: lump,
            mobjflags: thing.flags,
            heightsec,
            floorclip: thing.floorclip,
            ..VisSprite::default()
        };

        if flip {
            vis.startfrac = (width << FRACBITS) - 1;
            vis.xiscale = -iscale;
        } else {
            vis.startfrac = 0;
            vis.xiscale = iscale;
        }
        if vis.x1 > x1 {
            vis.startfrac = vis
                .startfrac
                .wrapping_add(vis.xiscale.wrapping_mul(vis.x1 - x1));
        }

        // get light level
        vis.colormap = if thing.flags & MapObjFlag::SHADOW != 0 {
            // shadow draw
            None
        } else if let Some(fixed) = view.fixedcolormap {
            Some(fixed)
        } else if thing.frame & FF_FULLBRIGHT != 0 {
            Some(0)
        } else {
            // diminished light
            let spritelights = &t.scalelight[view.light_row(lightlevel)];
            Some(spritelights[t.scale_light_index(xscale)])
        };

        if thing.flags & MapObjFlag::TRANSLUCENT != 0 {
            vis.tranmap = Some(thing.tranmap.unwrap_or(0));
        }

        self.vissprites.push(vis);
    }

    /// R_SortVisSprites - r_things
    pub(crate) fn sort_vis_sprites(&mut self) {
        let n = self.vissprites.len();
        self.vissprite_order.clear();
        self.vissprite_order.extend((0..n).rev());
        self.sort_scratch.resize(n, 0);
        msort(&mut self.vissprite_order, &mut self.sort_scratch, &self.vissprites);
    }

    /// Column clip value from a drawseg's sprite clip
    fn sprite_clip_at(&self, clip: Option<ClipArray>, x: i32) -> Option<i32> {
        match clip? {
            ClipArray::ScreenHeight => Some(self.view.tables.height),
            ClipArray::NegOne => Some(-1),
            ClipArray::Openings(offset) => {
                Some(self.r_data.visplane_render.openings[(offset + x as isize) as usize])
            }
        }
    }

    /// R_DrawSprite - r_things
    fn draw_sprite(
        &mut self,
        index: usize,
        level: &Level,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        let map = &level.map_data;
        let spr = self.vissprites[index];
        let (x1, x2) = (spr.x1, spr.x2);
        if x1 > x2 {
            return;
        }
        let range = x1 as usize..=x2 as usize;
        self.clipbot[range.clone()].fill(CLIP_UNSET);
        self.cliptop[range.clone()].fill(CLIP_UNSET);

        // Scan drawsegs from end to start for obscuring segs.
        // The first drawseg that has a greater scale is the clip seg.
        for ds_idx in (0..self.r_data.drawsegs.len()).rev() {
            let ds = self.r_data.drawsegs[ds_idx];
            if ds.silhouette == 0 && ds.maskedtexturecol.is_none() {
                continue;
            }
            // determine if the drawseg obscures the sprite
            if ds.x1 > x2 || ds.x2 < x1 {
                continue;
            }

            let (lowscale, scale) = if ds.scale1 > ds.scale2 {
                (ds.scale2, ds.scale1)
            } else {
                (ds.scale1, ds.scale2)
            };

            let r1 = ds.x1.max(x1);
            let r2 = ds.x2.min(x2);

            if scale < spr.scale
                || (lowscale < spr.scale && !map.segments[ds.curline].point_on_side(spr.gx, spr.gy))
            {
                // masked mid texture?
                if ds.maskedtexturecol.is_some() {
                    self.render_masked_seg_range(ds_idx, r1, r2, map, pic_data, target);
                }
                // seg is behind sprite
                continue;
            }

            // clip this piece of the sprite
            if ds.silhouette & SIL_BOTTOM != 0 && spr.gz < ds.bsilheight {
                for x in r1..=r2 {
                    if self.clipbot[x as usize] == CLIP_UNSET {
                        if let Some(c) = self.sprite_clip_at(ds.sprbottomclip, x) {
                            self.clipbot[x as usize] = c;
                        }
                    }
                }
            }
            if ds.silhouette & SIL_TOP != 0 && spr.gzt > ds.tsilheight {
                for x in r1..=r2 {
                    if self.cliptop[x as usize] == CLIP_UNSET {
                        if let Some(c) = self.sprite_clip_at(ds.sprtopclip, x) {
                            self.cliptop[x as usize] = c;
                        }
                    }
                }
            }
        }

        // killough 3/27/98:
        // Clip the sprite against deep water and/or fake ceilings.
        // Only the first column is clipped, as it always has been.
        if let Some(hs) = spr.heightsec {
            let t = &self.view.tables;
            let viewz = self.view.z;
            let phs = self.view.heightsec.map(|p| &map.sectors[p]);
            let x = x1 as usize;

            let mh = map.sectors[hs].floorheight;
            if mh > spr.gz {
                let mh = mh - viewz;
                let h = t.centeryfrac - fixed_mul(mh, spr.scale);
                if h >= 0 && (h >> FRACBITS) < t.height {
                    let h = h >> FRACBITS;
                    if mh <= 0 || phs.is_some_and(|p| viewz > p.floorheight) {
                        // clip bottom
                        if self.clipbot[x] == CLIP_UNSET || h < self.clipbot[x] {
                            self.clipbot[x] = h;
                        }
                    } else if phs.is_some_and(|p| viewz <= p.floorheight) {
                        // clip top
                        if self.cliptop[x] == CLIP_UNSET || h > self.cliptop[x] {
                            self.cliptop[x] = h;
                        }
                    }
                }
            }

            let mh = map.sectors[hs].ceilingheight;
            if mh < spr.gzt {
                let h = t.centeryfrac - fixed_mul(mh - viewz, spr.scale);
                if h >= 0 && (h >> FRACBITS) < t.height {
                    let h = h >> FRACBITS;
                    if phs.is_some_and(|p| viewz >= p.ceilingheight) {
                        // clip bottom
                        if self.clipbot[x] == CLIP_UNSET || h < self.clipbot[x] {
                            self.clipbot[x] = h;
                        }
                    } else if self.cliptop[x] == CLIP_UNSET || h > self.cliptop[x] {
                        // clip top
                        self.cliptop[x] = h;
                    }
                }
            }
        }

        // all clipping has been performed, so draw the sprite
        // check for unclipped columns
        let height = self.view.tables.height;
        for x in range {
            if self.clipbot[x] == CLIP_UNSET {
                self.clipbot[x] = height;
            }
            if self.cliptop[x] == CLIP_UNSET {
                self.cliptop[x] = -1;
            }
        }

        self.draw_vis_sprite(&spr, true, pic_data, target);
    }

    /// R_DrawVisSprite - r_things
    ///
    /// Clipped by `cliptop`/`clipbot` if `clipped`, otherwise by the view.
    fn draw_vis_sprite(
        &mut self,
        vis: &VisSprite,
        clipped: bool,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        let t = &self.view.tables;
        let patch = pic_data.sprite_patch(vis.patch);
        let columns = &mut self.workers.columns;

        let translation = ((vis.mobjflags & MapObjFlag::TRANSLATION) >> MapObjFlag::TRANSSHIFT) as usize;
        let blend = if vis.colormap.is_none() {
            columns.reset_fuzz_col(self.colheight);
            Blend::Fuzz(pic_data.colourmaps())
        } else if translation != 0 {
            Blend::Translated(&self.translations[translation - 1])
        } else if let Some(tranmap) = vis.tranmap {
            Blend::Translucent(pic_data.tranmap(tranmap))
        } else {
            Blend::Standard
        };

        let spryscale = vis.scale;
        let mut mc = MaskedColumn {
            colourmap: pic_data.colourmap(vis.colormap.unwrap_or(0)),
            blend,
            iscale: fixed_div(FRACUNIT, vis.scale),
            x: vis.x1,
            texturemid: vis.texturemid,
            sprtopscreen: t.centeryfrac as i64 - fixed_mul(vis.texturemid, spryscale) as i64,
            spryscale,
            baseclip: -1,
        };

        if vis.psprite {
            mc.iscale = t.pspriteiyscale;
        } else if vis.floorclip != 0 {
            let sprbotscreen = mc.sprtopscreen + fixed_mul(patch.height_fixed(), spryscale) as i64;
            mc.baseclip = ((sprbotscreen - fixed_mul(vis.floorclip, spryscale) as i64) >> FRACBITS) as i32;
        }

        let mut frac = vis.startfrac;
        for x in vis.x1..=vis.x2 {
            let texturecolumn = (frac >> FRACBITS).clamp(0, patch.width as i32 - 1) as usize;
            if vis.colormap.is_none() {
                columns.check_fuzz_col(x, self.colheight);
            }
            let (top, bottom) = if clipped {
                (self.cliptop[x as usize], self.clipbot[x as usize])
            } else {
                (-1, t.height)
            };
            mc.x = x;
            self.colheight =
                draw_masked_column(columns, target, t.centery, patch, texturecolumn, &mc, top, bottom);
            frac = frac.wrapping_add(vis.xiscale);
        }
    }

    /// R_RenderMaskedSegRange - r_segs
    ///
    /// Draws the masked middle texture of a drawseg over `x1..=x2`. Each
    /// column is marked once drawn so the wall is never drawn twice.
    pub(crate) fn render_masked_seg_range(
        &mut self,
        ds_idx: usize,
        x1: i32,
        x2: i32,
        map: &MapData,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        let ds = self.r_data.drawsegs[ds_idx];
        let Some(maskedtexturecol) = ds.maskedtexturecol else {
            return;
        };
        let seg = &map.segments[ds.curline];
        let Some(line_num) = seg.linedef else {
            return;
        };
        let Some(back_num) = seg.backsector else {
            return;
        };
        let line = &map.linedefs[line_num];
        let side = &map.sidedefs[seg.sidedef];
        let front = &map.sectors[seg.frontsector];
        let back = &map.sectors[back_num];
        let view = &self.view;
        let t = &view.tables;

        let patch = pic_data.wall(side.midtexture);
        let blend = match line.tranlump {
            Some(tranlump) => Blend::Translucent(pic_data.tranmap(tranlump)),
            None => Blend::Standard,
        };

        let light_row = wall_light_row(seg, front.lightlevel, view.extralight);

        // find positioning
        let mut texturemid = if line.flags & LineDefFlags::UNPEG_BOTTOM != 0 {
            front.floorheight.max(back.floorheight) + patch.height_fixed() - view.z
        } else {
            front.ceilingheight.min(back.ceilingheight) - view.z
        };
        texturemid += side.rowoffset + side.rowoffset_mid;

        let mut spryscale = ds.scale1 + (x1 - ds.x1) * ds.scalestep;

        for x in x1..=x2 {
            let idx = (maskedtexturecol + x as isize) as usize;
            let col = self.r_data.visplane_render.openings[idx];
            if col != PLANE_UNUSED {
                let colourmap = match view.fixedcolormap {
                    Some(fixed) => fixed,
                    None => t.scalelight[light_row][t.scale_light_index(spryscale)],
                };
                let top = self.sprite_clip_at(ds.sprtopclip, x).unwrap_or(-1);
                let bottom = self.sprite_clip_at(ds.sprbottomclip, x).unwrap_or(t.height);
                let mc = MaskedColumn {
                    colourmap: pic_data.colourmap(colourmap),
                    blend,
                    iscale: (u32::MAX / (spryscale as u32).max(1)) as i32,
                    x,
                    texturemid,
                    sprtopscreen: t.centeryfrac as i64 - fixed_mul(texturemid, spryscale) as i64,
                    spryscale,
                    baseclip: -1,
                };
                let texcol = col as usize & patch.widthmask;
                draw_masked_column(
                    &mut self.workers.columns,
                    target,
                    t.centery,
                    patch,
                    texcol,
                    &mc,
                    top,
                    bottom,
                );
                self.r_data.visplane_render.openings[idx] = PLANE_UNUSED;
            }
            spryscale += ds.scalestep;
        }
    }

    /// R_DrawPSprite - r_things
    fn draw_psprite(
        &mut self,
        player: &Player,
        psp: &PspDef,
        light_row: usize,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        let Some(state) = psp.state else {
            return;
        };
        let t = &self.view.tables;

        // decide which patch to use
        let sprdef = pic_data.sprite_def(state.sprite);
        let sprframe = sprdef.frame(state.sprite, (state.frame & FF_FRAMEMASK) as usize);
        let lump = sprframe.lump[0];
        let flip = sprframe.flip & 1 != 0;
        let patch = pic_data.sprite_patch(lump);
        let width = patch.width as i32;

        // calculate edges of the shape
        let mut tx = psp.sx - 160 * FRACUNIT;
        tx -= patch.left_offset << FRACBITS;
        let x1 = (t.centerxfrac + fixed_mul(tx, t.pspritexscale)) >> FRACBITS;
        tx += width << FRACBITS;
        let x2 = ((t.centerxfrac + fixed_mul(tx, t.pspritexscale)) >> FRACBITS) - 1;

        // off the side
        if x2 < 0 || x1 > t.width {
            return;
        }

        let mut vis = VisSprite {
            x1: x1.max(0),
            x2: x2.min(t.width - 1),
            scale: t.pspriteyscale,
            texturemid: (BASEYCENTER << FRACBITS) - (psp.sy - (patch.top_offset << FRACBITS)),
            patch: lump,
            psprite: true,
            ..VisSprite::default()
        };

        if flip {
            vis.xiscale = -t.pspriteiscale;
            vis.startfrac = (width << FRACBITS) - 1;
        } else {
            vis.xiscale = t.pspriteiscale;
            vis.startfrac = 0;
        }
        if vis.x1 > x1 {
            vis.startfrac = vis
                .startfrac
                .wrapping_add(vis.xiscale.wrapping_mul(vis.x1 - x1));
        }

        vis.colormap = if player.psprites_shadowed() {
            // shadow draw
            None
        } else if let Some(fixed) = self.view.fixedcolormap {
            Some(fixed)
        } else if state.frame & FF_FULLBRIGHT != 0 {
            Some(0)
        } else {
            // local light
            Some(t.scalelight[light_row][MAXLIGHTSCALE - 1])
        };

        self.draw_vis_sprite(&vis, false, pic_data, target);
    }

    /// R_DrawPlayerSprites - r_things
    fn draw_player_sprites(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        // get light level
        let light_row = self
            .view
            .light_row(level.thing_sector(player.mobj).lightlevel);
        // add all active psprites
        for psp in &player.psprites {
            self.draw_psprite(player, psp, light_row, pic_data, target);
        }
    }

    /// R_DrawMasked - r_things
    ///
    /// Sprites back to front, the masked middle textures not drawn with
    /// them, then the weapon on top of everything.
    pub(crate) fn draw_masked_things(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        target: &ScreenTarget,
    ) {
        {
            #[cfg(feature = "hprof")]
            profile!("sort_vis_sprites");
            self.sort_vis_sprites();
        }

        // draw all vissprites back to front
        for i in (0..self.vissprite_order.len()).rev() {
            let index = self.vissprite_order[i];
            self.draw_sprite(index, level, pic_data, target);
        }

        // render any remaining masked mid textures
        for ds_idx in (0..self.r_data.drawsegs.len()).rev() {
            let ds = &self.r_data.drawsegs[ds_idx];
            if ds.maskedtexturecol.is_some() {
                let (x1, x2) = (ds.x1, ds.x2);
                self.render_masked_seg_range(ds_idx, x1, x2, &level.map_data, pic_data, target);
            }
        }

        // draw the psprites on top of everything
        self.draw_player_sprites(player, level, pic_data, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprites(scales: &[Fixed]) -> Vec<VisSprite> {
        scales
            .iter()
            .map(|s| VisSprite {
                scale: *s,
                ..VisSprite::default()
            })
            .collect()
    }

    fn sorted_scales(vis: &[VisSprite]) -> Vec<Fixed> {
        let mut order: Vec<usize> = (0..vis.len()).rev().collect();
        let mut scratch = vec![0; vis.len()];
        msort(&mut order, &mut scratch, vis);
        order.iter().map(|i| vis[*i].scale).collect()
    }

    #[test]
    fn short_runs_insertion_sort() {
        let vis = sprites(&[3, 9, 1, 9, 4]);
        assert_eq!(sorted_scales(&vis), vec![9, 9, 4, 3, 1]);
    }

    #[test]
    fn long_runs_merge_sort() {
        // Roughly ordered input, as the BSP walk gives
        let scales: Vec<Fixed> = (0..100).map(|i| (i * 37) % 101 + (i / 10) * 7).collect();
        let vis = sprites(&scales);
        let out = sorted_scales(&vis);
        assert_eq!(out.len(), 100);
        assert!(out.windows(2).all(|w| w[0] >= w[1]));
        let mut expected = scales.clone();
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(out, expected);
    }

    #[test]
    fn sorting_twice_keeps_order() {
        let scales: Vec<Fixed> = (0..40).map(|i| (i % 7) * FRACUNIT).collect();
        let vis = sprites(&scales);
        let mut order: Vec<usize> = (0..vis.len()).rev().collect();
        let mut scratch = vec![0; vis.len()];
        msort(&mut order, &mut scratch, &vis);
        let first = order.clone();
        msort(&mut order, &mut scratch, &vis);
        let once: Vec<Fixed> = first.iter().map(|i| vis[*i].scale).collect();
        let twice: Vec<Fixed> = order.iter().map(|i| vis[*i].scale).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn far_things_do_not_overflow_projection() {
        use math::{ANG45, int_to_fixed};

        let mut scene = crate::tests::room();
        // Straight down the view line, far but in range
        let near = crate::tests::add_thing(&mut scene.level, 14256, 14064, 0);
        let far = crate::tests::add_thing(&mut scene.level, 256, 256, 0);
        // Beyond what 16.16 can hold once rotated in to view space
        let thing = &mut scene.level.things[far];
        thing.x = int_to_fixed(30000);
        thing.y = int_to_fixed(30000);
        thing.prev_x = thing.x;
        thing.prev_y = thing.y;
        scene.level.things[scene.player.mobj].angle = ANG45;

        let mut r = crate::tests::renderer(320, 200, crate::tests::serial());
        r.view.setup(&scene.player, &scene.level);
        r.project_sprite(far, 255, &scene.level, &scene.pic_data);
        assert!(r.vissprites.is_empty());

        r.project_sprite(near, 255, &scene.level, &scene.pic_data);
        assert_eq!(r.vissprites.len(), 1);
        assert!(r.vissprites[0].scale > 0);
    }

    #[test]
    fn masked_column_clips_posts() {
        let rows: Vec<Option<u8>> = (0..8)
            .map(|y| if (2..6).contains(&y) { Some(7) } else { None })
            .collect();
        let patch = Patch::from_pixels("POST", 1, 8, 0, 0, &rows);
        let mut screen = render_trait::ScreenBuffer::new(4, 16);
        let target = ScreenTarget::new(&mut screen);
        let colourmap: Vec<u8> = (0..=255).collect();
        let mut columns = ColumnBuffer::new(16);
        let mc = MaskedColumn {
            colourmap: &colourmap,
            blend: Blend::Standard,
            iscale: FRACUNIT,
            x: 1,
            texturemid: 8 * FRACUNIT,
            sprtopscreen: 0,
            spryscale: FRACUNIT,
            baseclip: -1,
        };
        // Rows 2..=5, then clipped to start below row 3
        let drawn = draw_masked_column(&mut columns, &target, 8, &patch, 0, &mc, 3, 16);
        assert_eq!(drawn, 2);
        columns.reset();
        use render_trait::PixelBuffer;
        assert_eq!(screen.read_pixel(1, 3), 0);
        assert_eq!(screen.read_pixel(1, 4), 7);
        assert_eq!(screen.read_pixel(1, 5), 7);
        assert_eq!(screen.read_pixel(1, 6), 0);
    }
}
