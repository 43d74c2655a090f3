use math::Fixed;

use super::{ScreenTarget, flat_spot};

/// One horizontal run of a flat, `ds_*` in the Doom source
pub struct DrawSpan<'a> {
    /// 64x64 flat, row major
    pub source: &'a [u8],
    pub colourmap: &'a [u8],
    pub xfrac: Fixed,
    pub yfrac: Fixed,
    pub xstep: Fixed,
    pub ystep: Fixed,
    pub y: i32,
    pub x1: i32,
    pub x2: i32,
}

impl DrawSpan<'_> {
    /// Doom function name `R_DrawSpan`
    pub fn draw(&self, target: &ScreenTarget) {
        if self.x2 < self.x1 {
            return;
        }
        // SAFETY: one task owns each row of the view while spans are drawn
        let row = unsafe { target.row_mut(self.y as usize, self.x1 as usize, self.x2 as usize) };

        let mut xfrac = self.xfrac;
        let mut yfrac = self.yfrac;
        let mut chunks = row.chunks_exact_mut(4);
        for quad in &mut chunks {
            for px in quad.iter_mut() {
                *px = self.colourmap[self.source[flat_spot(xfrac, yfrac)] as usize];
                xfrac = xfrac.wrapping_add(self.xstep);
                yfrac = yfrac.wrapping_add(self.ystep);
            }
        }
        for px in chunks.into_remainder() {
            *px = self.colourmap[self.source[flat_spot(xfrac, yfrac)] as usize];
            xfrac = xfrac.wrapping_add(self.xstep);
            yfrac = yfrac.wrapping_add(self.ystep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::FRACUNIT;
    use render_trait::{PixelBuffer, ScreenBuffer};

    #[test]
    fn span_steps_across_the_flat() {
        let mut screen = ScreenBuffer::new(80, 4);
        let target = ScreenTarget::new(&mut screen);
        let flat: Vec<u8> = (0..64 * 64).map(|i| (i % 64) as u8).collect();
        let map: Vec<u8> = (0..=255).collect();
        DrawSpan {
            source: &flat,
            colourmap: &map,
            xfrac: 0,
            yfrac: 0,
            xstep: FRACUNIT,
            ystep: 0,
            y: 2,
            x1: 3,
            x2: 69,
        }
        .draw(&target);
        assert_eq!(screen.read_pixel(2, 2), 0);
        assert_eq!(screen.read_pixel(3, 2), 0);
        assert_eq!(screen.read_pixel(10, 2), 7);
        // wraps at 64
        assert_eq!(screen.read_pixel(67, 2), 0);
        assert_eq!(screen.read_pixel(69, 2), 2);
        assert_eq!(screen.read_pixel(70, 2), 0);
        assert_eq!(screen.read_pixel(10, 1), 0);
    }
}
