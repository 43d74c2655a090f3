//! Level data consumed by the renderer: geometry, things, the player view
//! state and picture data. Simulation lives elsewhere, this is only the
//! read side of it plus a builder for assembling maps in code.

mod builder;
mod map_data;
mod map_defs;
mod pic;
mod thing;

pub use builder::*;
pub use map_data::*;
pub use map_defs::*;
pub use pic::*;
pub use thing::*;

pub use log;
use math::{FRACUNIT, Fixed};

/// A loaded level as the renderer sees it
#[derive(Debug, Default, Clone)]
pub struct Level {
    pub map_data: MapData,
    pub things: Vec<MapObject>,
    /// Fraction of the way between the previous and current tick,
    /// `FRACUNIT` when not interpolating
    pub tic_frac: Fixed,
}

impl Level {
    pub fn new(map_data: MapData) -> Self {
        Self {
            map_data,
            things: Vec::new(),
            tic_frac: FRACUNIT,
        }
    }

    /// Add a thing and link it in to the sector it stands in
    pub fn spawn_thing(&mut self, mut thing: MapObject) -> usize {
        let idx = self.things.len();
        thing.subsector = self.map_data.point_in_subsector(thing.x, thing.y);
        if thing.flags & MapObjFlag::NO_SECTOR == 0 {
            let sector = self.map_data.subsectors[thing.subsector].sector;
            self.map_data.sectors[sector].thinglist.push(idx);
        }
        self.things.push(thing);
        idx
    }

    /// Re-link a thing after it moved
    pub fn move_thing(&mut self, idx: usize, x: Fixed, y: Fixed, z: Fixed) {
        let old = self.map_data.subsectors[self.things[idx].subsector].sector;
        self.map_data.sectors[old].thinglist.retain(|t| *t != idx);
        let thing = &mut self.things[idx];
        thing.set_position(x, y, z);
        thing.subsector = self.map_data.point_in_subsector(x, y);
        if thing.flags & MapObjFlag::NO_SECTOR == 0 {
            let sector = self.map_data.subsectors[thing.subsector].sector;
            self.map_data.sectors[sector].thinglist.push(idx);
        }
    }

    /// Sector the thing is standing in
    pub fn thing_sector(&self, idx: usize) -> &Sector {
        let ss = self.things[idx].subsector;
        &self.map_data.sectors[self.map_data.subsectors[ss].sector]
    }
}
