//! The open window left in each column by the walls stored so far.

pub struct PortalClip {
    /// First covered row below the opening, the view height when nothing
    /// has been drawn in the column yet
    pub floorclip: Vec<i32>,
    /// Last covered row above the opening, or -1
    pub ceilingclip: Vec<i32>,
    screen_height: usize,
}

impl PortalClip {
    pub fn new(screen_width: usize, screen_height: usize) -> Self {
        PortalClip {
            floorclip: vec![screen_height as i32; screen_width],
            ceilingclip: vec![-1; screen_width],
            screen_height,
        }
    }

    pub(super) fn clear(&mut self) {
        self.floorclip.fill(self.screen_height as i32);
        self.ceilingclip.fill(-1);
    }
}

#[cfg(test)]
mod tests {
    use super::PortalClip;

    #[test]
    fn clear_reopens_every_column() {
        let mut rd = PortalClip::new(640, 400);
        rd.floorclip[3] = 12;
        rd.ceilingclip[5] = 40;
        rd.clear();
        assert!(rd.floorclip.iter().all(|c| *c == 400));
        assert!(rd.ceilingclip.iter().all(|c| *c == -1));
    }
}
