mod angle;
mod fixed_point;

pub use angle::*;
pub use fixed_point::*;

/// Bounding box indices, matching the order stored in BSP nodes
pub const BOXTOP: usize = 0;
pub const BOXBOTTOM: usize = 1;
pub const BOXLEFT: usize = 2;
pub const BOXRIGHT: usize = 3;
