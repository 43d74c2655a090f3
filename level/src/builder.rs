//! Assemble a map in code, including a simple node builder. Partition lines
//! are always taken from segs, so every leaf is convex and holds at least
//! one seg.

use glam::DVec2;
use log::debug;
use math::{ANG180, BOXBOTTOM, BOXLEFT, BOXRIGHT, BOXTOP, FRACUNIT, Fixed, point_to_angle};

use crate::map_data::MapData;
use crate::map_defs::{
    LineDef, LineDefFlags, NF_SUBSECTOR, Node, PolyObj, Sector, Segment, SideDef, SubSector,
    Vertex,
};

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
struct BuildSeg {
    a: DVec2,
    b: DVec2,
    line: usize,
    side: usize,
    /// Map units along the line from the side's start vertex
    offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Front,
    Back,
    Split,
}

#[derive(Debug, Default)]
pub struct MapBuilder {
    sectors: Vec<Sector>,
    sidedefs: Vec<SideDef>,
    linedefs: Vec<LineDef>,
    /// Lines that belong to polyobjects, never part of the BSP
    poly_lines: Vec<Vec<usize>>,
}

fn to_fixed(v: f64) -> Fixed {
    (v * FRACUNIT as f64).round() as Fixed
}

fn vertex(v: DVec2) -> Vertex {
    Vertex::new(to_fixed(v.x), to_fixed(v.y))
}

/// Negative is the front, to the right of the direction of travel
fn cross(a: DVec2, d: DVec2, p: DVec2) -> f64 {
    d.x * (p.y - a.y) - d.y * (p.x - a.x)
}

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sector(&mut self, sector: Sector) -> usize {
        self.sectors.push(sector);
        self.sectors.len() - 1
    }

    pub fn sector_mut(&mut self, idx: usize) -> &mut Sector {
        &mut self.sectors[idx]
    }

    /// Add a line between two points in whole map units. The front side
    /// faces right when walking from `v1` to `v2`.
    pub fn add_line(
        &mut self,
        v1: (i32, i32),
        v2: (i32, i32),
        front: SideDef,
        back: Option<SideDef>,
        flags: u32,
    ) -> usize {
        let frontsector = front.sector;
        self.sidedefs.push(front);
        let front_idx = self.sidedefs.len() - 1;

        let (back_idx, backsector, flags) = match back {
            Some(side) => {
                let sector = side.sector;
                self.sidedefs.push(side);
                (Some(self.sidedefs.len() - 1), Some(sector), flags | LineDefFlags::TWO_SIDED)
            }
            None => (None, None, flags & !LineDefFlags::TWO_SIDED),
        };

        self.linedefs.push(LineDef {
            v1: Vertex::new(v1.0 * FRACUNIT, v1.1 * FRACUNIT),
            v2: Vertex::new(v2.0 * FRACUNIT, v2.1 * FRACUNIT),
            flags,
            special: 0,
            sidenum: [Some(front_idx), back_idx],
            frontsector,
            backsector,
            tranlump: None,
        });
        self.linedefs.len() - 1
    }

    pub fn line_mut(&mut self, idx: usize) -> &mut LineDef {
        &mut self.linedefs[idx]
    }

    pub fn side_mut(&mut self, idx: usize) -> &mut SideDef {
        &mut self.sidedefs[idx]
    }

    /// Axis aligned room of one sided walls facing inwards
    pub fn add_room(
        &mut self,
        sector: usize,
        (x1, y1): (i32, i32),
        (x2, y2): (i32, i32),
        wall_texture: usize,
    ) -> [usize; 4] {
        let side = || SideDef::new(sector, 0, wall_texture, 0);
        [
            self.add_line((x1, y1), (x1, y2), side(), None, LineDefFlags::BLOCKING),
            self.add_line((x1, y2), (x2, y2), side(), None, LineDefFlags::BLOCKING),
            self.add_line((x2, y2), (x2, y1), side(), None, LineDefFlags::BLOCKING),
            self.add_line((x2, y1), (x1, y1), side(), None, LineDefFlags::BLOCKING),
        ]
    }

    /// Move already added lines in to a polyobject
    pub fn add_polyobj(&mut self, lines: Vec<usize>) -> usize {
        self.poly_lines.push(lines);
        self.poly_lines.len() - 1
    }

    fn line_segs(&self, line: usize) -> Vec<BuildSeg> {
        let l = &self.linedefs[line];
        let a = DVec2::new(l.v1.x as f64, l.v1.y as f64) / FRACUNIT as f64;
        let b = DVec2::new(l.v2.x as f64, l.v2.y as f64) / FRACUNIT as f64;
        let mut segs = vec![BuildSeg {
            a,
            b,
            line,
            side: 0,
            offset: 0.0,
        }];
        if l.sidenum[1].is_some() {
            segs.push(BuildSeg {
                a: b,
                b: a,
                line,
                side: 1,
                offset: 0.0,
            });
        }
        segs
    }

    fn finish_seg(&self, s: &BuildSeg) -> Segment {
        let l = &self.linedefs[s.line];
        let mut angle = point_to_angle(l.v2.x - l.v1.x, l.v2.y - l.v1.y);
        let (frontsector, backsector) = if s.side == 0 {
            (l.frontsector, l.backsector)
        } else {
            angle = angle.wrapping_add(ANG180);
            (l.backsector.unwrap_or(l.frontsector), Some(l.frontsector))
        };
        let sidedef = l.sidenum[s.side].unwrap_or_else(|| {
            panic!("Line {} has no side {}", s.line, s.side);
        });
        Segment {
            v1: vertex(s.a),
            v2: vertex(s.b),
            offset: to_fixed(s.offset),
            angle,
            sidedef,
            linedef: Some(s.line),
            frontsector,
            backsector: if l.sidenum[1].is_some() { backsector } else { None },
        }
    }

    fn classify(split: &BuildSeg, s: &BuildSeg) -> (Side, f64, f64) {
        let d = split.b - split.a;
        let ca = cross(split.a, d, s.a);
        let cb = cross(split.a, d, s.b);
        let ca_on = ca.abs() < EPSILON;
        let cb_on = cb.abs() < EPSILON;
        let side = if ca_on && cb_on {
            if d.dot(s.b - s.a) > 0.0 { Side::Front } else { Side::Back }
        } else if (ca < EPSILON) && (cb < EPSILON) {
            Side::Front
        } else if (ca > -EPSILON) && (cb > -EPSILON) {
            Side::Back
        } else {
            Side::Split
        };
        (side, ca, cb)
    }

    fn pick_splitter(segs: &[BuildSeg]) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, split) in segs.iter().enumerate() {
            let (mut front, mut back, mut splits) = (0usize, 0usize, 0usize);
            for s in segs {
                match Self::classify(split, s).0 {
                    Side::Front => front += 1,
                    Side::Back => back += 1,
                    Side::Split => splits += 1,
                }
            }
            if back + splits == 0 {
                continue;
            }
            let score = splits * 8 + front.abs_diff(back);
            if best.is_none_or(|(_, s)| score < s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }

    fn partition(
        &self,
        segs: Vec<BuildSeg>,
        map: &mut MapData,
    ) -> (u32, [Fixed; 4]) {
        let Some(split_idx) = Self::pick_splitter(&segs) else {
            return self.make_leaf(&segs, map);
        };
        let split = segs[split_idx];
        let mut front = Vec::new();
        let mut back = Vec::new();
        for s in segs {
            let (side, ca, cb) = Self::classify(&split, &s);
            match side {
                Side::Front => front.push(s),
                Side::Back => back.push(s),
                Side::Split => {
                    let t = ca / (ca - cb);
                    let p = s.a + (s.b - s.a) * t;
                    let first = BuildSeg { b: p, ..s };
                    let second = BuildSeg {
                        a: p,
                        offset: s.offset + (p - s.a).length(),
                        ..s
                    };
                    if ca < 0.0 {
                        front.push(first);
                        back.push(second);
                    } else {
                        back.push(first);
                        front.push(second);
                    }
                }
            }
        }

        let (front_child, front_box) = self.partition(front, map);
        let (back_child, back_box) = self.partition(back, map);
        let d = split.b - split.a;
        map.nodes.push(Node {
            x: to_fixed(split.a.x),
            y: to_fixed(split.a.y),
            dx: to_fixed(d.x),
            dy: to_fixed(d.y),
            bbox: [front_box, back_box],
            children: [front_child, back_child],
        });

        let mut bbox = front_box;
        bbox[BOXTOP] = bbox[BOXTOP].max(back_box[BOXTOP]);
        bbox[BOXBOTTOM] = bbox[BOXBOTTOM].min(back_box[BOXBOTTOM]);
        bbox[BOXLEFT] = bbox[BOXLEFT].min(back_box[BOXLEFT]);
        bbox[BOXRIGHT] = bbox[BOXRIGHT].max(back_box[BOXRIGHT]);
        ((map.nodes.len() - 1) as u32, bbox)
    }

    fn make_leaf(&self, segs: &[BuildSeg], map: &mut MapData) -> (u32, [Fixed; 4]) {
        let first_seg = map.segments.len();
        let mut bbox = [Fixed::MIN, Fixed::MAX, Fixed::MAX, Fixed::MIN];
        for s in segs {
            let seg = self.finish_seg(s);
            for v in [seg.v1, seg.v2] {
                bbox[BOXTOP] = bbox[BOXTOP].max(v.y);
                bbox[BOXBOTTOM] = bbox[BOXBOTTOM].min(v.y);
                bbox[BOXLEFT] = bbox[BOXLEFT].min(v.x);
                bbox[BOXRIGHT] = bbox[BOXRIGHT].max(v.x);
            }
            map.segments.push(seg);
        }
        let sector = map.segments.get(first_seg).map_or(0, |s| s.frontsector);
        map.subsectors.push(SubSector {
            sector,
            first_seg,
            seg_count: segs.len(),
            polys: Vec::new(),
        });
        ((map.subsectors.len() - 1) as u32 | NF_SUBSECTOR, bbox)
    }

    pub fn build(self) -> MapData {
        let mut map = MapData::default();
        let poly_lines: Vec<usize> = self.poly_lines.iter().flatten().copied().collect();

        let segs: Vec<BuildSeg> = (0..self.linedefs.len())
            .filter(|l| !poly_lines.contains(l))
            .flat_map(|l| self.line_segs(l))
            .collect();

        if segs.is_empty() {
            map.subsectors.push(SubSector {
                sector: 0,
                first_seg: 0,
                seg_count: 0,
                polys: Vec::new(),
            });
        } else {
            self.partition(segs, &mut map);
        }

        for lines in &self.poly_lines {
            let mut seg_ids = Vec::new();
            let mut centre = DVec2::ZERO;
            for line in lines {
                for s in self.line_segs(*line) {
                    centre += (s.a + s.b) * 0.5;
                    map.segments.push(self.finish_seg(&s));
                    seg_ids.push(map.segments.len() - 1);
                }
            }
            centre /= seg_ids.len().max(1) as f64;
            let subsector = map.point_in_subsector(to_fixed(centre.x), to_fixed(centre.y));
            map.polyobjs.push(PolyObj {
                subsector,
                segs: seg_ids,
            });
            map.subsectors[subsector].polys.push(map.polyobjs.len() - 1);
        }

        debug!(
            "Built map: {} nodes, {} subsectors, {} segs",
            map.nodes.len(),
            map.subsectors.len(),
            map.segments.len()
        );

        map.sectors = self.sectors;
        map.sidedefs = self.sidedefs;
        map.linedefs = self.linedefs;
        map
    }
}
