use crate::map_defs::{LineDef, NF_SUBSECTOR, Node, PolyObj, Sector, Segment, SideDef, SubSector};
use math::Fixed;

/// The geometry the renderer walks. Read-only during a frame.
#[derive(Debug, Default, Clone)]
pub struct MapData {
    pub sectors: Vec<Sector>,
    pub sidedefs: Vec<SideDef>,
    pub linedefs: Vec<LineDef>,
    pub segments: Vec<Segment>,
    pub subsectors: Vec<SubSector>,
    pub nodes: Vec<Node>,
    pub polyobjs: Vec<PolyObj>,
}

impl MapData {
    /// The root of the BSP. A map with a single subsector has no nodes.
    pub fn start_node(&self) -> u32 {
        if self.nodes.is_empty() {
            NF_SUBSECTOR
        } else {
            (self.nodes.len() - 1) as u32
        }
    }

    /// Doom function name `R_PointInSubsector`
    pub fn point_in_subsector(&self, x: Fixed, y: Fixed) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut nodenum = self.start_node();
        while nodenum & NF_SUBSECTOR == 0 {
            let node = &self.nodes[nodenum as usize];
            let side = node.point_on_side(x, y);
            nodenum = node.children[side];
        }
        (nodenum & !NF_SUBSECTOR) as usize
    }

    /// Doom function name `P_FloorLightLevel`
    pub fn floor_light_level(&self, sec: &Sector) -> i32 {
        match sec.floorlightsec {
            Some(s) => self.sectors[s].lightlevel,
            None => sec.lightlevel,
        }
    }

    /// Doom function name `P_CeilingLightLevel`
    pub fn ceiling_light_level(&self, sec: &Sector) -> i32 {
        match sec.ceilinglightsec {
            Some(s) => self.sectors[s].lightlevel,
            None => sec.lightlevel,
        }
    }

    /// True if the two floors can't be drawn as one visplane
    pub fn floor_planes_differ(&self, a: &Sector, b: &Sector) -> bool {
        a.floorpic != b.floorpic
            || a.floor_xoffs != b.floor_xoffs
            || a.floor_yoffs != b.floor_yoffs
            || a.floor_rotation != b.floor_rotation
            || a.floor_xscale != b.floor_xscale
            || a.floor_yscale != b.floor_yscale
            || self.floor_light_level(a) != self.floor_light_level(b)
    }

    pub fn ceiling_planes_differ(&self, a: &Sector, b: &Sector) -> bool {
        a.ceilingpic != b.ceilingpic
            || a.ceiling_xoffs != b.ceiling_xoffs
            || a.ceiling_yoffs != b.ceiling_yoffs
            || a.ceiling_rotation != b.ceiling_rotation
            || a.ceiling_xscale != b.ceiling_xscale
            || a.ceiling_yscale != b.ceiling_yscale
            || self.ceiling_light_level(a) != self.ceiling_light_level(b)
    }
}

#[cfg(test)]
mod tests {
    use super::MapData;
    use crate::map_defs::{NF_SUBSECTOR, Sector};

    #[test]
    fn empty_map_root_is_leaf() {
        let map = MapData::default();
        assert_eq!(map.start_node(), NF_SUBSECTOR);
        assert_eq!(map.point_in_subsector(0, 0), 0);
    }

    #[test]
    fn light_transfer() {
        let mut map = MapData::default();
        map.sectors.push(Sector::new(0, 0, 1, 1, 160));
        map.sectors.push(Sector::new(0, 0, 1, 1, 96));
        map.sectors[0].floorlightsec = Some(1);
        let a = map.sectors[0].clone();
        let b = map.sectors[1].clone();
        assert_eq!(map.floor_light_level(&a), 96);
        assert_eq!(map.ceiling_light_level(&a), 160);
        assert!(!map.floor_planes_differ(&a, &b));
        assert!(map.ceiling_planes_differ(&a, &b));
    }
}
