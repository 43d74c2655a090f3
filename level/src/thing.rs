//! The parts of moving things and the player that the renderer reads.

use math::{Angle, Fixed};

/// Frame flag: draw at full brightness
pub const FF_FULLBRIGHT: u32 = 0x8000;
pub const FF_FRAMEMASK: u32 = 0x7fff;

/// Map object flags used for drawing
pub struct MapObjFlag;

impl MapObjFlag {
    /// Drawn with the fuzz effect
    pub const SHADOW: u64 = 0x0004_0000;
    /// Player colour translation, two bits
    pub const TRANSLATION: u64 = 0x0c00_0000;
    /// Shift for the translation bits
    pub const TRANSSHIFT: u64 = 26;
    /// Drawn through the main blend table
    pub const TRANSLUCENT: u64 = 0x8000_0000;
    /// Never drawn
    pub const NO_SECTOR: u64 = 0x0000_0008;
}

#[derive(Debug, Clone, Default)]
pub struct MapObject {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    /// Position at the previous tick, for interpolation
    pub prev_x: Fixed,
    pub prev_y: Fixed,
    pub prev_z: Fixed,
    pub angle: Angle,
    /// Index in to the sprite definitions
    pub sprite: usize,
    /// Frame index, with `FF_FULLBRIGHT` possibly set
    pub frame: u32,
    pub flags: u64,
    /// Lowers the bottom of the sprite, used in liquids
    pub floorclip: Fixed,
    pub subsector: usize,
    /// Blend table index for `TRANSLUCENT`, main table when `None`
    pub tranmap: Option<usize>,
}

impl MapObject {
    pub fn new(x: Fixed, y: Fixed, z: Fixed, angle: Angle, sprite: usize, frame: u32) -> Self {
        Self {
            x,
            y,
            z,
            prev_x: x,
            prev_y: y,
            prev_z: z,
            angle,
            sprite,
            frame,
            ..Self::default()
        }
    }

    /// Move and keep the old position for interpolation
    pub fn set_position(&mut self, x: Fixed, y: Fixed, z: Fixed) {
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.prev_z = self.z;
        self.x = x;
        self.y = y;
        self.z = z;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PspState {
    pub sprite: usize,
    pub frame: u32,
}

/// Overlay sprite on the player view, the weapon and its flash
#[derive(Debug, Clone, Copy, Default)]
pub struct PspDef {
    /// A `None` state means not active
    pub state: Option<PspState>,
    pub sx: Fixed,
    pub sy: Fixed,
}

pub const NUM_PSPRITES: usize = 2;
/// Tics left where invisibility starts to flicker off
pub const INVIS_FLICKER_TICS: i32 = 4 * 32;

#[derive(Debug, Clone, Default)]
pub struct Player {
    /// Index in to `Level::things`
    pub mobj: usize,
    pub viewz: Fixed,
    pub prev_viewz: Fixed,
    pub prev_angle: Angle,
    /// Added to light levels, gun flashes and so on
    pub extralight: i32,
    /// Current fixed colormap, 0 for none
    pub fixedcolormap: i32,
    /// Tics of partial invisibility left
    pub invisibility: i32,
    pub psprites: [PspDef; NUM_PSPRITES],
}

impl Player {
    pub fn new(mobj: usize, viewz: Fixed, angle: Angle) -> Self {
        Self {
            mobj,
            viewz,
            prev_viewz: viewz,
            prev_angle: angle,
            ..Self::default()
        }
    }

    /// The weapon sprites are drawn as shadows while invisible
    pub fn psprites_shadowed(&self) -> bool {
        self.invisibility > INVIS_FLICKER_TICS || self.invisibility & 8 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invisibility_flicker() {
        let mut p = Player::new(0, 0, 0);
        assert!(!p.psprites_shadowed());
        p.invisibility = 1000;
        assert!(p.psprites_shadowed());
        p.invisibility = 8;
        assert!(p.psprites_shadowed());
        p.invisibility = 7;
        assert!(!p.psprites_shadowed());
    }

    #[test]
    fn position_keeps_previous() {
        let mut m = MapObject::new(10, 20, 30, 0, 0, 0);
        m.set_position(11, 21, 31);
        assert_eq!((m.prev_x, m.prev_y, m.prev_z), (10, 20, 30));
    }
}
