//! Fixed layout and tuning constants shared by every pass.

/// Lanes per road section.
pub const ROAD_LANES: usize = 3;

/// Upper bound on occupancy slots per section.
pub const ROAD_OCCUPATION_SLOTS_MAX: usize = 16;

/// Stride between consecutive sections in the occupancy array.
pub const ROAD_INDEX_MULTIPLIER: usize = ROAD_OCCUPATION_SLOTS_MAX * ROAD_LANES;

pub const VEHICLE_LENGTH: f32 = 10.0;
pub const VEHICLE_WIDTH: f32 = 4.0;

/// Scales parametric advance along a section.
pub const VEHICLE_SPEED_FUDGE: f32 = 100.0;

/// Ticks a vehicle waits after aborting a lane switch.
pub const LANE_SWITCH_DELAY: u32 = 30;

/// Lane spawners inject into.
pub const SPAWN_LANE: u8 = 2;

/// Speed gained per empty slot when back-filling behind an occupant.
pub const GAP_FILL_SPEED_STEP: f32 = 0.1;

/// Fraction below wanted speed that makes a vehicle look for another lane.
pub const WANT_NEW_LANE_RATIO: f32 = 0.10;

pub const MAX_TETHER: f32 = 50.0;
pub const MAX_TETHER_SQUARED: f32 = MAX_TETHER * MAX_TETHER;

/// Endpoints are snapped to a 1/NODE_POSITION_ROUNDING grid before matching.
pub const NODE_POSITION_ROUNDING: f32 = 10.0;

pub const ARC_LENGTH_SAMPLES: usize = 1024;

pub const AVOIDANCE_RADIUS: f32 = 6.0;
pub const AVOIDANCE_RADIUS_PLAYER: f32 = 12.0;

/// Edge length of a spatial hash cell.
pub const CELL_SIZE: f32 = 64.0;

/// Look-ahead, in seconds of current velocity, used to pick a second hash cell.
pub const CELL_LOOKAHEAD_SECONDS: f32 = 2.0;

pub const MAX_SCAN_RANGE: f32 = 64.0;
pub const AVOIDANCE_THRESHOLD_SQUARED: f32 = 0.01;

pub const SLOWING_DISTANCE: f32 = 45.0;
pub const MAX_SEEK_SPEED: f32 = 10.0;
pub const SEEK_DEADBAND_SQUARED: f32 = 0.5;

pub const BANK_DEAD_ZONE: f32 = 0.001;

/// Fixed movement sub-step.
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;
