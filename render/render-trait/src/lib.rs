//! The seams between the frame driver, the renderer, and whatever the
//! finished frame is drawn in to.

use level::{Level, PicData, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSize {
    width_usize: usize,
    height_usize: usize,
    width: i32,
    height: i32,
}

impl BufferSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self {
            width_usize: width,
            height_usize: height,
            width: width as i32,
            height: height as i32,
        }
    }

    // todo, need const traits stabilised
    pub const fn width(&self) -> i32 {
        self.width
    }

    pub const fn height(&self) -> i32 {
        self.height
    }

    pub const fn half_width(&self) -> i32 {
        self.width / 2
    }

    pub const fn half_height(&self) -> i32 {
        self.height / 2
    }

    pub const fn width_usize(&self) -> usize {
        self.width_usize
    }

    pub const fn height_usize(&self) -> usize {
        self.height_usize
    }
}

/// An 8-bit paletted buffer. Each byte is a palette index.
pub trait PixelBuffer {
    fn size(&self) -> &BufferSize;
    fn clear(&mut self);
    fn clear_with_colour(&mut self, colour: u8);
    fn set_pixel(&mut self, x: usize, y: usize, colour: u8);
    fn read_pixel(&self, x: usize, y: usize) -> u8;
    fn buf(&self) -> &[u8];
    fn buf_mut(&mut self) -> &mut [u8];
    /// The pitch that should be added/subtracted to go up or down the Y while
    /// keeping X position
    fn pitch(&self) -> usize;
    /// Get an index point for this coord
    fn get_buf_index(&self, x: usize, y: usize) -> usize;
}

/// Plain in-memory frame
#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    size: BufferSize,
    pitch: usize,
    buffer: Vec<u8>,
}

impl ScreenBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            size: BufferSize::new(width, height),
            pitch: width,
            buffer: vec![0; width * height],
        }
    }

    /// Rows padded out to `pitch` bytes
    pub fn with_pitch(width: usize, height: usize, pitch: usize) -> Self {
        assert!(pitch >= width, "pitch {pitch} is narrower than width {width}");
        Self {
            size: BufferSize::new(width, height),
            pitch,
            buffer: vec![0; pitch * height],
        }
    }
}

impl PixelBuffer for ScreenBuffer {
    #[inline]
    fn size(&self) -> &BufferSize {
        &self.size
    }

    #[inline]
    fn clear(&mut self) {
        self.buffer.fill(0);
    }

    #[inline]
    fn clear_with_colour(&mut self, colour: u8) {
        self.buffer.fill(colour);
    }

    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, colour: u8) {
        let pos = self.get_buf_index(x, y);
        self.buffer[pos] = colour;
    }

    /// Read the colour of a single pixel at X|Y
    #[inline]
    fn read_pixel(&self, x: usize, y: usize) -> u8 {
        self.buffer[self.get_buf_index(x, y)]
    }

    #[inline]
    fn buf(&self) -> &[u8] {
        &self.buffer
    }

    #[inline]
    fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    #[inline]
    fn pitch(&self) -> usize {
        self.pitch
    }

    #[inline]
    fn get_buf_index(&self, x: usize, y: usize) -> usize {
        y * self.pitch + x
    }
}

/// The frame API. Called in the order declared, once per rendered frame.
pub trait PlayViewRenderer {
    /// Reset every per-frame structure: clip arrays, draw segments,
    /// visplanes and sprites
    fn clear_frame_state(&mut self);

    /// Set up the view from the player and walk the BSP, drawing walls
    fn render_view(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        buffer: &mut impl PixelBuffer,
    );

    /// Rasterise floors, ceilings and sky
    fn draw_planes(&mut self, level: &Level, pic_data: &PicData, buffer: &mut impl PixelBuffer);

    /// Sprites, masked middle textures, then the player's weapon
    fn draw_masked(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        buffer: &mut impl PixelBuffer,
    );

    /// Reallocate everything that depends on the view size
    fn reset_resolution_dependent_buffers(&mut self, width: usize, height: usize);

    /// Doom function name `R_RenderPlayerView`
    fn render_player_view(
        &mut self,
        player: &Player,
        level: &Level,
        pic_data: &PicData,
        buffer: &mut impl PixelBuffer,
    ) {
        self.clear_frame_state();
        self.render_view(player, level, pic_data, buffer);
        self.draw_planes(level, pic_data, buffer);
        self.draw_masked(player, level, pic_data, buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::{PixelBuffer, ScreenBuffer};

    #[test]
    fn pitch_padding() {
        let mut buf = ScreenBuffer::with_pitch(320, 200, 328);
        buf.set_pixel(319, 1, 7);
        assert_eq!(buf.buf()[328 + 319], 7);
        assert_eq!(buf.read_pixel(319, 1), 7);
        assert_eq!(buf.size().half_width(), 160);
    }
}
