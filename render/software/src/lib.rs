//! A software renderer in the style of the prboom family: a BSP walk that
//! clips walls against a column occlusion buffer, visplanes for floors and
//! ceilings, masked sprite and mid texture compositing, and column and span
//! drawers which may be handed out to a small pool of workers.

use self::{defs::DrawSeg, planes::VisPlaneRender, portals::PortalClip};
use defs::MAXDRAWSEGS;

mod bsp;
mod defs;
mod draw;
mod planes;
mod portals;
mod segs;
mod things;
mod utilities;
mod view;

#[cfg(test)]
mod tests;

pub use bsp::SoftwareRenderer;
pub use view::ViewTables;

/// How the renderer should split work between threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    /// Worker count for the column and span drawers
    pub threads: usize,
    /// Sky columns go to the workers
    pub parallel_sky: bool,
    /// Flat spans go to the workers
    pub parallel_spans: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            parallel_sky: false,
            parallel_spans: false,
        }
    }
}

/// Per frame wall and plane state. Filled by `R_StoreWallRange` during the
/// BSP walk, read back by `R_DrawPlanes` and by the sprite clipper in
/// `R_DrawSprite` and `R_DrawMasked`.
pub(crate) struct RenderData {
    /// Visible wall ranges in the order they were stored
    pub drawsegs: Vec<DrawSeg>,
    pub portal_clip: PortalClip,
    pub visplane_render: VisPlaneRender,
}

impl RenderData {
    pub(crate) fn new(screen_width: usize, screen_height: usize) -> Self {
        Self {
            drawsegs: Vec::with_capacity(MAXDRAWSEGS),
            visplane_render: VisPlaneRender::new(screen_width, screen_height),
            portal_clip: PortalClip::new(screen_width, screen_height),
        }
    }

    pub(crate) fn clear_data(&mut self) {
        self.portal_clip.clear();
        self.drawsegs.clear();
        self.visplane_render.clear_planes();
    }
}

#[cfg(test)]
mod render_data_tests {
    use crate::RenderData;

    #[test]
    fn clear_render_data() {
        let mut rd = RenderData::new(640, 400);
        rd.drawsegs.push(crate::defs::DrawSeg::new(3));
        rd.clear_data();
        assert!(rd.drawsegs.is_empty());
        assert!(rd.visplane_render.active_planes().is_empty());
        assert!(rd.portal_clip.floorclip.iter().all(|c| *c == 400));
        assert!(rd.portal_clip.ceilingclip.iter().all(|c| *c == -1));
    }
}
