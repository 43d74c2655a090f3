//! Column and span writers.
//!
//! Columns are not written straight to the screen. Up to four adjacent
//! columns are gathered in a `ColumnBuffer` and flushed together. The rows
//! every column covers are written as a block of four, the rest one column
//! at a time. Each pool worker owns its own buffer.

mod span;
mod translation;
mod workers;

pub use span::*;
pub use translation::*;
pub use workers::*;

use std::sync::Arc;

use level::FLAT_SIZE;
use math::{FRACBITS, Fixed};
use render_trait::PixelBuffer;

/// Columns gathered before a flush
pub const TEMPBUF_COLUMNS: usize = 4;
/// Colourmap block used for the fuzz darkening
pub const FUZZ_COLOURMAP: usize = 6;
pub const FUZZTABLE: usize = 50;

const FUZZOFFSET: [i32; FUZZTABLE] = [
    1, -1, 1, -1, 1, 1, -1, 1, 1, -1, 1, 1, 1, -1, 1, 1, 1, -1, -1, -1, -1, 1, -1, -1, 1, 1, 1, 1,
    -1, 1, -1, 1, 1, -1, -1, 1, 1, -1, -1, -1, -1, 1, 1, 1, 1, -1, 1, 1, -1, 1,
];

/// Raw access to the frame being drawn. Draw tasks on the pool write
/// through this, each to its own columns or rows, and every render call
/// waits on its tasks before its borrow of the buffer ends.
#[derive(Debug, Clone, Copy)]
pub struct ScreenTarget {
    ptr: *mut u8,
    len: usize,
    pitch: usize,
    width: usize,
    height: usize,
}

// Writers never share a pixel within one batch
unsafe impl Send for ScreenTarget {}
unsafe impl Sync for ScreenTarget {}

impl ScreenTarget {
    pub fn new(buffer: &mut impl PixelBuffer) -> Self {
        let size = *buffer.size();
        let pitch = buffer.pitch();
        let buf = buffer.buf_mut();
        assert!(
            buf.len() >= pitch * size.height_usize(),
            "Pixel buffer is smaller than its size"
        );
        Self {
            ptr: buf.as_mut_ptr(),
            len: buf.len(),
            pitch,
            width: size.width_usize(),
            height: size.height_usize(),
        }
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline(always)]
    fn index(&self, x: usize, y: usize) -> usize {
        let i = y * self.pitch + x;
        assert!(x < self.width && i < self.len, "Pixel {x},{y} is off the screen");
        i
    }

    #[inline(always)]
    pub fn read(&self, x: usize, y: usize) -> u8 {
        let i = self.index(x, y);
        // SAFETY: in bounds, and the buffer outlives every writer
        unsafe { *self.ptr.add(i) }
    }

    #[inline(always)]
    pub fn write(&self, x: usize, y: usize, colour: u8) {
        let i = self.index(x, y);
        // SAFETY: in bounds, and no two writers share a pixel in a batch
        unsafe { *self.ptr.add(i) = colour }
    }

    /// Part of a row, `x1..=x2`
    ///
    /// # Safety
    /// No other writer may touch these pixels while the slice lives.
    #[inline]
    pub unsafe fn row_mut(&self, y: usize, x1: usize, x2: usize) -> &mut [u8] {
        assert!(x1 <= x2, "Bad span {x1} to {x2}");
        let start = self.index(x1, y);
        self.index(x2, y);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), x2 - x1 + 1) }
    }
}

/// How a column's texels land on the screen
#[derive(Debug, Clone, Copy)]
pub enum Blend<'a> {
    Standard,
    /// Remap through a player colour table before lighting
    Translated(&'a [u8]),
    /// Blend with the screen through a 64k table
    Translucent(&'a Arc<[u8]>),
    /// Darken offset screen pixels, the texels are not read. Holds the
    /// colourmaps.
    Fuzz(&'a Arc<[u8]>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPipeline {
    Standard,
    Translated,
    Translucent,
    Fuzz,
}

impl Blend<'_> {
    pub fn pipeline(&self) -> ColumnPipeline {
        match self {
            Blend::Standard => ColumnPipeline::Standard,
            Blend::Translated(_) => ColumnPipeline::Translated,
            Blend::Translucent(_) => ColumnPipeline::Translucent,
            Blend::Fuzz(_) => ColumnPipeline::Fuzz,
        }
    }
}

/// What a flush does with the buffered texels. The default slot refuses to
/// draw so a missing setup shows up at once.
#[derive(Debug, Clone, Default)]
enum FlushPipeline {
    #[default]
    Uninitialized,
    Standard,
    Translucent(Arc<[u8]>),
    Fuzz(Arc<[u8]>),
}

impl FlushPipeline {
    fn from_blend(blend: &Blend) -> Self {
        match blend {
            Blend::Standard | Blend::Translated(_) => FlushPipeline::Standard,
            Blend::Translucent(map) => FlushPipeline::Translucent(Arc::clone(map)),
            Blend::Fuzz(maps) => FlushPipeline::Fuzz(Arc::clone(maps)),
        }
    }

    fn same_table(&self, blend: &Blend) -> bool {
        match (self, blend) {
            (FlushPipeline::Translucent(a), Blend::Translucent(b)) => Arc::ptr_eq(a, b),
            (FlushPipeline::Fuzz(a), Blend::Fuzz(b)) => Arc::ptr_eq(a, b),
            _ => true,
        }
    }
}

/// Provides an easy way to draw a column in an `x` location, starting and
/// ending at `yl` and `yh`
pub struct DrawColumn<'a> {
    /// Texels from the top of the texture, or of the post being drawn
    source: &'a [u8],
    colourmap: &'a [u8],
    blend: Blend<'a>,
    iscale: Fixed,
    x: i32,
    texturemid: Fixed,
    yl: i32,
    yh: i32,
    /// Wrap height in texels, or zero to clamp in to the source
    texheight: i32,
}

impl<'a> DrawColumn<'a> {
    pub fn new(
        source: &'a [u8],
        colourmap: &'a [u8],
        iscale: Fixed,
        x: i32,
        texturemid: Fixed,
        yl: i32,
        yh: i32,
    ) -> Self {
        Self {
            source,
            colourmap,
            blend: Blend::Standard,
            iscale,
            x,
            texturemid,
            yl,
            yh,
            texheight: 0,
        }
    }

    pub fn with_blend(mut self, blend: Blend<'a>) -> Self {
        self.blend = blend;
        self
    }

    /// Tile the texture vertically every `texheight` texels
    pub fn wrapping(mut self, texheight: i32) -> Self {
        self.texheight = texheight;
        self
    }

    #[inline(always)]
    fn texel(&self, frac: Fixed) -> u8 {
        let last = self.source.len().saturating_sub(1);
        let i = if self.texheight == 0 {
            ((frac >> FRACBITS).max(0) as usize).min(last)
        } else if self.texheight & (self.texheight - 1) == 0 {
            ((frac >> FRACBITS) & (self.texheight - 1)) as usize
        } else {
            (frac.rem_euclid(self.texheight << FRACBITS) >> FRACBITS) as usize
        };
        let texel = self.source.get(i).copied().unwrap_or(0);
        match self.blend {
            Blend::Translated(table) => self.colourmap[table[texel as usize] as usize],
            _ => self.colourmap[texel as usize],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FuzzState {
    pos: usize,
    /// Rows and columns sharing one fuzz offset, grows with resolution
    cellsize: i32,
}

/// Per worker column drawing state, `temp_dcvars` and friends
pub struct ColumnBuffer {
    /// `height * 4` texels, column `i` of row `y` at `(y << 2) + i`
    buf: Vec<u8>,
    tops: [i32; TEMPBUF_COLUMNS],
    bots: [i32; TEMPBUF_COLUMNS],
    count: usize,
    startx: i32,
    commontop: i32,
    commonbot: i32,
    kind: Option<ColumnPipeline>,
    flush: FlushPipeline,
    target: Option<ScreenTarget>,
    fuzz: FuzzState,
}

impl ColumnBuffer {
    pub fn new(view_height: usize) -> Self {
        Self {
            buf: vec![0; view_height * TEMPBUF_COLUMNS],
            tops: [0; TEMPBUF_COLUMNS],
            bots: [0; TEMPBUF_COLUMNS],
            count: 0,
            startx: 0,
            commontop: 0,
            commonbot: 0,
            kind: None,
            flush: FlushPipeline::Uninitialized,
            target: None,
            fuzz: FuzzState {
                pos: 0,
                cellsize: fuzz_cell_size(view_height),
            },
        }
    }

    /// Drop anything buffered and size for a new view
    pub fn resize(&mut self, view_height: usize) {
        self.count = 0;
        self.kind = None;
        self.flush = FlushPipeline::Uninitialized;
        self.target = None;
        self.buf.resize(view_height * TEMPBUF_COLUMNS, 0);
        self.fuzz.cellsize = fuzz_cell_size(view_height);
    }

    /// Columns waiting for a flush
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.count
    }

    #[cfg(test)]
    pub fn fuzz_pos(&self) -> usize {
        self.fuzz.pos
    }

    /// Queue a column. `centery` is the screen row where `texturemid` lands.
    pub fn draw_column(&mut self, dc: &DrawColumn, target: &ScreenTarget, centery: i32) {
        let kind = dc.blend.pipeline();
        let (mut yl, mut yh) = (dc.yl, dc.yh);
        if kind == ColumnPipeline::Fuzz {
            // Keep the sampled rows on the screen
            if yl == 0 {
                yl = 1;
            }
            if yh == target.height() as i32 - 1 {
                yh = target.height() as i32 - 2;
            }
        }
        if yh < yl || yl < 0 || yh >= target.height() as i32 {
            return;
        }

        if self.count == TEMPBUF_COLUMNS
            || (self.count > 0
                && (self.kind != Some(kind)
                    || self.startx + self.count as i32 != dc.x
                    || !self.flush.same_table(&dc.blend)))
        {
            self.flush_columns();
        }

        if self.count == 0 {
            self.startx = dc.x;
            self.commontop = yl;
            self.commonbot = yh;
            self.kind = Some(kind);
            self.flush = FlushPipeline::from_blend(&dc.blend);
            self.target = Some(*target);
        } else {
            self.commontop = self.commontop.max(yl);
            self.commonbot = self.commonbot.min(yh);
        }

        let i = self.count;
        self.tops[i] = yl;
        self.bots[i] = yh;
        self.count += 1;

        if kind == ColumnPipeline::Fuzz {
            return;
        }
        if self.buf.len() < target.height() * TEMPBUF_COLUMNS {
            self.buf.resize(target.height() * TEMPBUF_COLUMNS, 0);
        }
        let mut frac = dc
            .texturemid
            .wrapping_add((yl - centery).wrapping_mul(dc.iscale));
        for y in yl..=yh {
            self.buf[((y as usize) << 2) + i] = dc.texel(frac);
            frac = frac.wrapping_add(dc.iscale);
        }
    }

    /// Doom function name `R_FlushColumns`
    pub fn flush_columns(&mut self) {
        if self.count != TEMPBUF_COLUMNS || self.commontop >= self.commonbot {
            self.flush_whole();
        } else {
            self.flush_head_tail();
            self.flush_quad();
        }
        self.count = 0;
    }

    /// Doom function name `R_ResetColumnBuffer`
    pub fn reset(&mut self) {
        if self.count > 0 {
            self.flush_columns();
        }
        self.kind = None;
        self.flush = FlushPipeline::Uninitialized;
    }

    /// Doom function name `R_ResetFuzzCol`, called as a shadow sprite
    /// starts so neighbouring sprites don't share a pattern
    pub fn reset_fuzz_col(&mut self, height: i32) {
        self.reset();
        let step = (height / self.fuzz.cellsize).max(0) as usize;
        self.fuzz.pos = (self.fuzz.pos + step) % FUZZTABLE;
    }

    /// Doom function name `R_CheckFuzzCol`, a new cell starts every
    /// `cellsize` columns
    pub fn check_fuzz_col(&mut self, x: i32, height: i32) {
        if x % self.fuzz.cellsize == 0 {
            self.reset_fuzz_col(height);
        }
    }

    fn uninitialized(slot: &str) -> ! {
        panic!("{slot} called without being initialized.")
    }

    /// Whole columns, one at a time
    fn flush_whole(&mut self) {
        if matches!(self.flush, FlushPipeline::Uninitialized) {
            Self::uninitialized("R_FlushWholeColumns");
        }
        for i in 0..self.count {
            self.flush_rows(i, self.tops[i], self.bots[i]);
        }
    }

    /// The rows above and below what all four columns share
    fn flush_head_tail(&mut self) {
        if matches!(self.flush, FlushPipeline::Uninitialized) {
            Self::uninitialized("R_FlushHTColumns");
        }
        for i in 0..self.count {
            self.flush_rows(i, self.tops[i], self.commontop - 1);
            self.flush_rows(i, self.commonbot + 1, self.bots[i]);
        }
    }

    /// The shared rows, four pixels at a time
    fn flush_quad(&mut self) {
        if matches!(self.flush, FlushPipeline::Uninitialized) {
            Self::uninitialized("R_FlushQuadColumn");
        }
        let Some(target) = self.target else {
            return;
        };
        let x = self.startx as usize;
        for y in self.commontop..=self.commonbot {
            let row = (y as usize) << 2;
            match &self.flush {
                FlushPipeline::Standard => {
                    // SAFETY: this buffer is the only writer of its columns
                    let dest = unsafe { target.row_mut(y as usize, x, x + TEMPBUF_COLUMNS - 1) };
                    dest.copy_from_slice(&self.buf[row..row + TEMPBUF_COLUMNS]);
                }
                _ => {
                    for i in 0..TEMPBUF_COLUMNS {
                        self.put_pixel(&target, i, y);
                    }
                }
            }
        }
    }

    fn flush_rows(&self, i: usize, from: i32, to: i32) {
        let Some(target) = self.target else {
            return;
        };
        for y in from..=to {
            self.put_pixel(&target, i, y);
        }
    }

    #[inline(always)]
    fn put_pixel(&self, target: &ScreenTarget, i: usize, y: i32) {
        let x = self.startx as usize + i;
        let src = self.buf.get(((y as usize) << 2) + i).copied().unwrap_or(0);
        match &self.flush {
            FlushPipeline::Uninitialized => {}
            FlushPipeline::Standard => target.write(x, y as usize, src),
            FlushPipeline::Translucent(tranmap) => {
                let dest = target.read(x, y as usize) as usize;
                target.write(x, y as usize, tranmap[(dest << 8) + src as usize]);
            }
            FlushPipeline::Fuzz(colourmaps) => {
                let cell = ((y - self.tops[i]) / self.fuzz.cellsize) as usize;
                let pos = (self.fuzz.pos + cell) % FUZZTABLE;
                let sy = (y + FUZZOFFSET[pos] * self.fuzz.cellsize)
                    .clamp(0, target.height() as i32 - 1);
                let dest = target.read(x, sy as usize) as usize;
                target.write(x, y as usize, colourmaps[FUZZ_COLOURMAP * 256 + dest]);
            }
        }
    }
}

fn fuzz_cell_size(view_height: usize) -> i32 {
    ((view_height as i32 + 100) / 200).max(1)
}

/// Sample a 64x64 flat. `xfrac` picks the column and `yfrac` the row.
#[inline(always)]
pub fn flat_spot(xfrac: Fixed, yfrac: Fixed) -> usize {
    let spot = (((xfrac >> 16) & 63) | ((yfrac >> 10) & 4032)) as usize;
    debug_assert!(spot < FLAT_SIZE);
    spot
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::FRACUNIT;
    use render_trait::ScreenBuffer;

    fn identity() -> Vec<u8> {
        (0..=255).collect()
    }

    #[test]
    #[should_panic(expected = "R_FlushWholeColumns called without being initialized.")]
    fn unconfigured_flush_is_fatal() {
        let mut buf = ColumnBuffer::new(200);
        buf.flush_columns();
    }

    #[test]
    fn four_columns_flush_as_a_quad() {
        let mut screen = ScreenBuffer::new(16, 16);
        let target = ScreenTarget::new(&mut screen);
        let map = identity();
        let source: Vec<u8> = (10..26).collect();
        let mut buf = ColumnBuffer::new(16);
        for x in 2..6 {
            let dc = DrawColumn::new(&source, &map, FRACUNIT, x, 0, 0, 7 + x);
            buf.draw_column(&dc, &target, 0);
        }
        assert_eq!(buf.pending(), 4);
        // A fifth column forces the flush
        let dc = DrawColumn::new(&source, &map, FRACUNIT, 6, 0, 0, 3);
        buf.draw_column(&dc, &target, 0);
        assert_eq!(buf.pending(), 1);
        buf.reset();

        for x in 2..6 {
            for y in 0..=7 + x {
                assert_eq!(screen.read_pixel(x as usize, y as usize), 10 + y as u8);
            }
            assert_eq!(screen.read_pixel(x as usize, 8 + x as usize), 0);
        }
        assert_eq!(screen.read_pixel(6, 3), 13);
        assert_eq!(screen.read_pixel(6, 4), 0);
    }

    #[test]
    fn gap_in_columns_starts_a_new_batch() {
        let mut screen = ScreenBuffer::new(8, 8);
        let target = ScreenTarget::new(&mut screen);
        let map = identity();
        let source = [5u8; 8];
        let mut buf = ColumnBuffer::new(8);
        buf.draw_column(&DrawColumn::new(&source, &map, FRACUNIT, 0, 0, 0, 3), &target, 0);
        buf.draw_column(&DrawColumn::new(&source, &map, FRACUNIT, 2, 0, 0, 3), &target, 0);
        assert_eq!(buf.pending(), 1);
        buf.reset();
        assert_eq!(screen.read_pixel(0, 1), 5);
        assert_eq!(screen.read_pixel(1, 1), 0);
        assert_eq!(screen.read_pixel(2, 1), 5);
    }

    #[test]
    fn non_power_of_two_wraps() {
        let mut screen = ScreenBuffer::new(2, 8);
        let target = ScreenTarget::new(&mut screen);
        let map = identity();
        let source = [1u8, 2, 3];
        let mut buf = ColumnBuffer::new(8);
        let dc = DrawColumn::new(&source, &map, FRACUNIT, 0, 0, 0, 7).wrapping(3);
        buf.draw_column(&dc, &target, 0);
        buf.reset();
        let col: Vec<u8> = (0..8).map(|y| screen.read_pixel(0, y)).collect();
        assert_eq!(col, [1, 2, 3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn translucent_blends_with_screen() {
        let mut screen = ScreenBuffer::new(1, 4);
        screen.clear_with_colour(2);
        let target = ScreenTarget::new(&mut screen);
        let map = identity();
        let mut table = vec![0u8; 256 * 256];
        table[(2 << 8) + 9] = 77;
        let table: Arc<[u8]> = table.into();
        let source = [9u8; 4];
        let mut buf = ColumnBuffer::new(4);
        let dc = DrawColumn::new(&source, &map, FRACUNIT, 0, 0, 0, 3)
            .with_blend(Blend::Translucent(&table));
        buf.draw_column(&dc, &target, 0);
        buf.reset();
        assert!((0..4).all(|y| screen.read_pixel(0, y) == 77));
    }

    #[test]
    fn fuzz_walks_the_whole_table() {
        let mut screen = ScreenBuffer::new(64, 8);
        let target = ScreenTarget::new(&mut screen);
        let maps: Arc<[u8]> = vec![0u8; 34 * 256].into();
        let mut buf = ColumnBuffer::new(8);
        let mut seen = Vec::new();
        for x in 0..FUZZTABLE as i32 {
            buf.check_fuzz_col(x, 1);
            seen.push(buf.fuzz_pos());
            let dc = DrawColumn::new(&[], &maps[..256], FRACUNIT, x, 0, 3, 3)
                .with_blend(Blend::Fuzz(&maps));
            buf.draw_column(&dc, &target, 0);
        }
        buf.reset();
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), FUZZTABLE);
        // Then it repeats
        buf.check_fuzz_col(FUZZTABLE as i32, 1);
        assert_eq!(buf.fuzz_pos(), seen[0]);
    }

    #[test]
    fn flat_spot_layout() {
        assert_eq!(flat_spot(0, 0), 0);
        assert_eq!(flat_spot(5 << 16, 0), 5);
        assert_eq!(flat_spot(0, 3 << 16), 3 * 64);
        assert_eq!(flat_spot(64 << 16, 64 << 16), 0);
    }
}
