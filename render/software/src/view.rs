//! Tables that depend on the size of the view, and the per frame view
//! state taken from the player.

use std::sync::Arc;

use level::{Level, NUMCOLORMAPS, Player};
use log::debug;
use math::{
    ANG90, ANGLETOFINESHIFT, Angle, FINEANGLES, FRACBITS, FRACUNIT, Fixed, fine, finecosine,
    finesine, finetangent, fixed_div, fixed_mul,
};

use crate::defs::{DISTMAP, LIGHTLEVELS, LIGHTSCALESHIFT, LIGHTZSHIFT, MAXLIGHTSCALE, MAXLIGHTZ};
use crate::utilities::{lerp_angle, lerp_fixed};

/// Fine angles covered by the width of the view
const FIELDOFVIEW: usize = 2048;
/// Sky texture scale is set for a 200 line view
const SKY_BASE_HEIGHT: i32 = 200;

/// Resolution dependent lookups. Shared with draw tasks, so it is rebuilt
/// as a whole and swapped rather than edited in place.
#[derive(Debug, Clone)]
pub struct ViewTables {
    pub width: i32,
    pub height: i32,
    pub centerx: i32,
    pub centery: i32,
    pub centerxfrac: Fixed,
    pub centeryfrac: Fixed,
    /// Horizontal projection
    pub projection: Fixed,
    /// Vertical projection, keeps the 320x200 pixel aspect on any size
    pub projectiony: Fixed,
    /// Used by `map_plane` to turn row distance in to texture steps
    pub viewfocratio: Fixed,
    /// Fine angle to the next greatest screen column
    pub viewangletox: Vec<i32>,
    /// Smallest view angle that maps to each column, `width + 1` entries
    pub xtoviewangle: Vec<Angle>,
    /// Half the field of view
    pub clipangle: Angle,
    /// Distance scale for each row, used for planes
    pub yslope: Vec<Fixed>,
    pub pspritexscale: Fixed,
    pub pspriteiscale: Fixed,
    pub pspriteyscale: Fixed,
    pub pspriteiyscale: Fixed,
    pub skyiscale: Fixed,
    /// Colourmap number by light level and distance, for planes
    pub zlight: Vec<[usize; MAXLIGHTZ]>,
    /// Colourmap number by light level and scale, for walls and sprites
    pub scalelight: Vec<[usize; MAXLIGHTSCALE]>,
}

impl ViewTables {
    /// Doom function name `R_ExecuteSetViewSize`
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "View of {width}x{height} can't be drawn");
        let width = width as i32;
        let height = height as i32;
        let centerx = width / 2;
        let centery = height / 2;
        let centerxfrac = centerx << FRACBITS;
        let centeryfrac = centery << FRACBITS;
        let projection = centerxfrac;
        let projectiony = ((((height as i64 * centerx as i64 * 320) / 200) / width as i64) as i32)
            << FRACBITS;

        let (viewangletox, xtoviewangle) = texture_mapping(width, centerxfrac);
        let clipangle = xtoviewangle[0];

        let yslope = (0..height)
            .map(|i| {
                let dy = (((i - centery) << FRACBITS) + FRACUNIT / 2).abs();
                fixed_div(projectiony, dy)
            })
            .collect();

        let pspritexscale = centerxfrac / 160;
        let pspriteyscale = projectiony / 160;

        let tables = Self {
            width,
            height,
            centerx,
            centery,
            centerxfrac,
            centeryfrac,
            projection,
            projectiony,
            viewfocratio: fixed_div(projectiony, centerxfrac),
            viewangletox,
            xtoviewangle,
            clipangle,
            yslope,
            pspritexscale,
            pspriteiscale: fixed_div(FRACUNIT, pspritexscale),
            pspriteyscale,
            pspriteiyscale: fixed_div(FRACUNIT, pspriteyscale),
            skyiscale: (FRACUNIT as i64 * SKY_BASE_HEIGHT as i64 / height as i64) as Fixed,
            zlight: zlight_table(),
            scalelight: scalelight_table(),
        };
        debug!("Rebuilt view tables for {width}x{height}");
        tables
    }

    /// Screen column for a view relative angle. The angle must already be
    /// clipped to the field of view.
    #[inline]
    pub fn angle_to_x(&self, angle: Angle) -> i32 {
        self.viewangletox[(angle.wrapping_add(ANG90) >> ANGLETOFINESHIFT) as usize]
    }

    /// Light table index for a wall or sprite scale
    #[inline]
    pub fn scale_light_index(&self, scale: Fixed) -> usize {
        let index = ((scale as i64 * 160 / self.centerx.max(1) as i64) >> LIGHTSCALESHIFT) as usize;
        index.min(MAXLIGHTSCALE - 1)
    }
}

/// Doom function name `R_InitTextureMapping`
fn texture_mapping(width: i32, centerxfrac: Fixed) -> (Vec<i32>, Vec<Angle>) {
    // Calc focallength so FIELDOFVIEW angles covers the view width.
    let focallength = fixed_div(centerxfrac, finetangent(FINEANGLES / 4 + FIELDOFVIEW / 2));

    // viewangletox will give the next greatest x after the view angle.
    let mut viewangletox: Vec<i32> = (0..FINEANGLES / 2)
        .map(|i| {
            let tan = finetangent(i);
            if tan > FRACUNIT * 2 {
                -1
            } else if tan < -FRACUNIT * 2 {
                width + 1
            } else {
                let t = fixed_mul(tan, focallength);
                ((centerxfrac - t + FRACUNIT - 1) >> FRACBITS).clamp(-1, width + 1)
            }
        })
        .collect();

    // xtoviewangle will give the smallest view angle that maps to x.
    let xtoviewangle = (0..=width)
        .map(|x| {
            let mut i = 0;
            while viewangletox[i] > x {
                i += 1;
            }
            ((i as u32) << ANGLETOFINESHIFT).wrapping_sub(ANG90)
        })
        .collect();

    // Take out the fencepost cases from viewangletox.
    for t in viewangletox.iter_mut() {
        if *t == -1 {
            *t = 0;
        } else if *t == width + 1 {
            *t = width;
        }
    }
    (viewangletox, xtoviewangle)
}

/// Doom function name `R_InitLightTables`
fn zlight_table() -> Vec<[usize; MAXLIGHTZ]> {
    (0..LIGHTLEVELS)
        .map(|i| {
            let startmap = (((LIGHTLEVELS - 1 - i) * 2) * NUMCOLORMAPS / LIGHTLEVELS) as i32;
            let mut row = [0; MAXLIGHTZ];
            for (j, level) in row.iter_mut().enumerate() {
                let scale = fixed_div(160 * FRACUNIT, ((j + 1) as i32) << LIGHTZSHIFT)
                    >> LIGHTSCALESHIFT;
                *level = (startmap - scale / DISTMAP).clamp(0, NUMCOLORMAPS as i32 - 1) as usize;
            }
            row
        })
        .collect()
}

/// Scale lights are calculated against a 320 wide view, the index is scaled
/// to the real width when looked up.
fn scalelight_table() -> Vec<[usize; MAXLIGHTSCALE]> {
    (0..LIGHTLEVELS)
        .map(|i| {
            let startmap = (((LIGHTLEVELS - 1 - i) * 2) * NUMCOLORMAPS / LIGHTLEVELS) as i32;
            let mut row = [0; MAXLIGHTSCALE];
            for (j, level) in row.iter_mut().enumerate() {
                *level =
                    (startmap - j as i32 / DISTMAP).clamp(0, NUMCOLORMAPS as i32 - 1) as usize;
            }
            row
        })
        .collect()
}

/// Where the frame is seen from. Rebuilt each frame by `View::setup`.
#[derive(Debug, Clone)]
pub struct View {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
    pub sin: Fixed,
    pub cos: Fixed,
    pub extralight: i32,
    /// Colourmap number forced on everything, from the player
    pub fixedcolormap: Option<usize>,
    /// Height transfer sector of the sector the viewer stands in
    pub heightsec: Option<usize>,
    /// The player's own object, never drawn
    pub player_mobj: usize,
    pub tables: Arc<ViewTables>,
}

impl View {
    pub fn new(tables: Arc<ViewTables>) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            angle: 0,
            sin: 0,
            cos: FRACUNIT,
            extralight: 0,
            fixedcolormap: None,
            heightsec: None,
            player_mobj: usize::MAX,
            tables,
        }
    }

    /// Doom function name `R_SetupFrame`, with the view interpolated between
    /// the last two ticks when the level asks for it
    pub fn setup(&mut self, player: &Player, level: &Level) {
        let Some(mobj) = level.things.get(player.mobj) else {
            panic!("R_SetupFrame: player object {} does not exist", player.mobj);
        };

        if level.tic_frac < FRACUNIT {
            let frac = level.tic_frac;
            self.x = lerp_fixed(frac, mobj.prev_x, mobj.x);
            self.y = lerp_fixed(frac, mobj.prev_y, mobj.y);
            self.z = lerp_fixed(frac, player.prev_viewz, player.viewz);
            self.angle = lerp_angle(frac, player.prev_angle, mobj.angle);
        } else {
            self.x = mobj.x;
            self.y = mobj.y;
            self.z = player.viewz;
            self.angle = mobj.angle;
        }

        self.sin = finesine(fine(self.angle));
        self.cos = finecosine(fine(self.angle));
        self.extralight = player.extralight;
        self.fixedcolormap = (player.fixedcolormap > 0).then_some(player.fixedcolormap as usize);
        self.heightsec = level.thing_sector(player.mobj).heightsec;
        self.player_mobj = player.mobj;
    }

    /// Doom function name `R_PointToAngle`, relative to the view position
    #[inline]
    pub fn point_to_angle(&self, x: Fixed, y: Fixed) -> Angle {
        math::point_to_angle(x.wrapping_sub(self.x), y.wrapping_sub(self.y))
    }

    /// Light row for a sector light level with the view's extra light
    #[inline]
    pub fn light_row(&self, lightlevel: i32) -> usize {
        ((lightlevel >> crate::defs::LIGHTSEGSHIFT) + self.extralight)
            .clamp(0, LIGHTLEVELS as i32 - 1) as usize
    }
}
