use log::{debug, warn};

/// Max frame letters per sprite
pub const MAX_SPRITE_FRAMES: usize = 29;

/// Sixteen view rotations. Slot `r` for an 8-way sprite is `(r - 1) * 2`,
/// the odd slots are the in-between angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteFrame {
    pub rotate: bool,
    /// Index in to the sprite patches
    pub lump: [usize; 16],
    /// Bit per rotation, set if that rotation is drawn mirrored
    pub flip: u16,
}

#[derive(Debug, Clone, Default)]
pub struct SpriteDef {
    pub name: String,
    pub frames: Vec<SpriteFrame>,
}

#[derive(Clone, Copy)]
struct FrameBuild {
    /// `None` until any lump is installed
    rotate: Option<bool>,
    lump: [Option<usize>; 16],
    flip: u16,
}

impl Default for FrameBuild {
    fn default() -> Self {
        Self {
            rotate: None,
            lump: [None; 16],
            flip: 0,
        }
    }
}

fn install_lump(
    frames: &mut [FrameBuild],
    maxframe: &mut i32,
    lump_name: &str,
    patch: usize,
    frame: u8,
    rot: u8,
    flipped: bool,
) {
    let rotation = match rot {
        b'0'..=b'9' => (rot - b'0') as usize,
        b'A'.. => (rot - b'A') as usize + 10,
        _ => 17,
    };
    let frame = frame.wrapping_sub(b'A') as usize;
    if frame >= MAX_SPRITE_FRAMES || rotation > 16 {
        panic!("R_InstallSpriteLump: Bad frame characters in lump {lump_name}");
    }
    *maxframe = (*maxframe).max(frame as i32);
    let f = &mut frames[frame];

    if rotation == 0 {
        // the lump should be used for all rotations
        for r in (0..=14).rev().step_by(2) {
            if f.lump[r].is_none() {
                f.lump[r] = Some(patch);
                if flipped {
                    f.flip |= 1 << r;
                }
                f.rotate = Some(false);
            }
        }
        return;
    }

    let rotation = if rotation <= 8 {
        (rotation - 1) * 2
    } else {
        (rotation - 9) * 2 + 1
    };
    if f.lump[rotation].is_none() {
        f.lump[rotation] = Some(patch);
        if flipped {
            f.flip |= 1 << rotation;
        }
        f.rotate = Some(true);
    }
}

impl SpriteDef {
    /// Doom function name `R_InitSpriteDefs`, for a single sprite.
    ///
    /// Lump names are 4 characters for the actor, a letter for the frame,
    /// and a number for the rotation. A flippable sprite has an additional
    /// frame/rotation pair appended. Later lumps are installed first so that
    /// they win over earlier ones with the same name.
    pub fn from_lumps(name: &str, lumps: &[(&str, usize)]) -> Self {
        let mut frames = [FrameBuild::default(); MAX_SPRITE_FRAMES];
        let mut maxframe = -1;
        let prefix = name.as_bytes();

        for (lump_name, patch) in lumps.iter().rev() {
            let bytes = lump_name.as_bytes();
            if bytes.len() < 6 || bytes[..4] != prefix[..4.min(prefix.len())] {
                continue;
            }
            install_lump(&mut frames, &mut maxframe, lump_name, *patch, bytes[4], bytes[5], false);
            if bytes.len() >= 8 {
                install_lump(&mut frames, &mut maxframe, lump_name, *patch, bytes[6], bytes[7], true);
            }
        }

        if maxframe < 0 {
            warn!("No patches found for sprite {name}");
            return Self {
                name: name.to_string(),
                frames: Vec::new(),
            };
        }

        let numframes = (maxframe + 1) as usize;
        let mut out = Vec::with_capacity(numframes);
        for (i, f) in frames.iter_mut().take(numframes).enumerate() {
            match f.rotate {
                // no rotations were found for that frame at all
                None => {
                    out.push(SpriteFrame {
                        rotate: false,
                        lump: [0; 16],
                        flip: 0,
                    });
                    continue;
                }
                Some(false) => {
                    // only the first rotation is needed
                    for rot in 1..16 {
                        f.lump[rot] = f.lump[0];
                    }
                    // If the frame is flipped, they all should be
                    if f.flip & 1 != 0 {
                        f.flip = 0xffff;
                    }
                }
                Some(true) => {
                    // must have all 8 frames, the in-betweens copy a neighbour
                    for rot in 0..8 {
                        if f.lump[rot * 2 + 1].is_none() {
                            f.lump[rot * 2 + 1] = f.lump[rot * 2];
                            if f.flip & (1 << (rot * 2)) != 0 {
                                f.flip |= 1 << (rot * 2 + 1);
                            }
                        }
                        if f.lump[rot * 2].is_none() {
                            f.lump[rot * 2] = f.lump[rot * 2 + 1];
                            if f.flip & (1 << (rot * 2 + 1)) != 0 {
                                f.flip |= 1 << (rot * 2);
                            }
                        }
                    }
                }
            }

            let mut lump = [0; 16];
            for (rot, slot) in f.lump.iter().enumerate() {
                match slot {
                    Some(l) => lump[rot] = *l,
                    None => panic!(
                        "R_InitSprites: Sprite {name} frame {} is missing rotations",
                        (b'A' + i as u8) as char
                    ),
                }
            }
            out.push(SpriteFrame {
                rotate: f.rotate == Some(true),
                lump,
                flip: f.flip,
            });
        }
        debug!("Sprite {name} has {numframes} frames");

        Self {
            name: name.to_string(),
            frames: out,
        }
    }

    /// Fatal on a frame that doesn't exist, that is corrupt data
    pub fn frame(&self, sprite_num: usize, frame: usize) -> &SpriteFrame {
        if self.frames.is_empty() {
            panic!("R_ProjectSprite: Missing spriteframes {sprite_num} : {frame}");
        }
        match self.frames.get(frame) {
            Some(f) => f,
            None => panic!("R_ProjectSprite: Invalid sprite frame {sprite_num} : {frame}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SpriteDef;

    #[test]
    fn single_rotation_fills_all() {
        let def = SpriteDef::from_lumps("BAR1", &[("BAR1A0", 3), ("BAR1B0", 4)]);
        assert_eq!(def.frames.len(), 2);
        assert!(!def.frames[0].rotate);
        assert!(def.frames[0].lump.iter().all(|l| *l == 3));
        assert!(def.frames[1].lump.iter().all(|l| *l == 4));
        assert_eq!(def.frames[0].flip, 0);
    }

    #[test]
    fn eight_rotations_with_mirrors() {
        // Classic layout: 1, 2/8, 3/7, 4/6, 5
        let lumps = [
            ("TROOA1", 0),
            ("TROOA2A8", 1),
            ("TROOA3A7", 2),
            ("TROOA4A6", 3),
            ("TROOA5", 4),
        ];
        let def = SpriteDef::from_lumps("TROO", &lumps);
        let f = &def.frames[0];
        assert!(f.rotate);
        assert_eq!(f.lump[0], 0);
        // rotation 8 is slot 14, mirrored from lump 1
        assert_eq!(f.lump[14], 1);
        assert_ne!(f.flip & (1 << 14), 0);
        assert_eq!(f.flip & (1 << 2), 0);
        // in-between slots copy their neighbour
        assert_eq!(f.lump[1], f.lump[0]);
        assert_eq!(f.lump[15], f.lump[14]);
        assert_ne!(f.flip & (1 << 15), 0);
    }

    #[test]
    #[should_panic(expected = "is missing rotations")]
    fn missing_rotation_is_fatal() {
        SpriteDef::from_lumps("POSS", &[("POSSA1", 0), ("POSSA2", 1)]);
    }

    #[test]
    #[should_panic(expected = "Invalid sprite frame")]
    fn bad_frame_is_fatal() {
        let def = SpriteDef::from_lumps("BAR1", &[("BAR1A0", 3)]);
        def.frame(0, 5);
    }
}
