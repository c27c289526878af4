// tactical_bot_core/bot/src/core/constants.rs

// Simulation timing
pub const SERVER_TICK_RATE: u64 = 60;
pub const TICK_DURATION_MS: u64 = 1000 / SERVER_TICK_RATE;
pub const AI_THINK_STRIDE: u64 = 1; // run bot think every N ticks

// Player box (Quake-style units, z up)
pub const PLAYERBOX_STAND_MINS: [f32; 3] = [-16.0, -16.0, -24.0];
pub const PLAYERBOX_STAND_MAXS: [f32; 3] = [16.0, 16.0, 40.0];
pub const PLAYERBOX_STAND_VIEWHEIGHT: f32 = 30.0;
pub const AI_STEPSIZE: f32 = 18.0;
pub const AI_JUMPABLE_HEIGHT: f32 = 50.0;
pub const DEFAULT_GRAVITY: f32 = 850.0;

// Planner
pub const MAX_PLANNER_NODES: usize = 384;
pub const MAX_PLANNER_GOALS: usize = 8;
pub const MAX_GOAL_ACTIONS: usize = 8;
/// Prime bin counts keep degenerate collisions apart between the two sets.
pub const CLOSED_SET_BINS: usize = 389;
pub const OPEN_SET_BINS: usize = 71;
pub const KEEP_CURR_GOAL_WEIGHT_THRESHOLD: f32 = 0.3;
pub const GOAL_PICKUP_ACTION_RADIUS: f32 = 40.0;
/// A travel time used for destinations the AAS graph can't route to (AAS keeps times in a short).
pub const UNREACHABLE_TRAVEL_TIME_MILLIS: u32 = 10 * i16::MAX as u32;

// World state origin quantization
pub const ORIGIN_VAR_QUANTUM: f32 = 4.0;
pub const ORIGIN_VAR_MAX_ROUNDING_SQUARE_DISTANCE_ERROR: f32 = 3.0 * 4.0 * 4.0;

// Movement prediction
pub const MAX_PREDICTED_STATES: usize = 48;
pub const MAX_REACH_CHAIN_LEN: usize = 16;
pub const MAX_SUGGESTED_LOOK_DIRS: usize = 16;
pub const STRAIGHT_MOVEMENT_DOT_THRESHOLD: f32 = 0.97;
pub const NAV_TARGET_AREA_SCORE: f32 = 999_999.0;
pub const MIN_CANDIDATE_AREA_SQUARE_DISTANCE: f32 = 96.0 * 96.0;
pub const MAX_CANDIDATE_AREA_SQUARE_DISTANCE: f32 = (1024.0 + 512.0) * (1024.0 + 512.0);
pub const STUCK_CHECK_MIN_DISTANCE: f32 = 64.0;
pub const STUCK_CHECK_MILLIS: u32 = 384;
pub const CLOSE_TO_NAV_TARGET_DISTANCE: f32 = 64.0;

// Player move features (pmove stats)
pub const PMFEAT_JUMP: u16 = 1 << 0;
pub const PMFEAT_DASH: u16 = 1 << 1;
pub const PMFEAT_WALLJUMP: u16 = 1 << 2;
pub const PMFEAT_CROUCH: u16 = 1 << 3;
pub const PMFEAT_AIRCONTROL: u16 = 1 << 4;
pub const PMFEAT_DEFAULT: u16 = PMFEAT_JUMP | PMFEAT_DASH | PMFEAT_WALLJUMP | PMFEAT_CROUCH | PMFEAT_AIRCONTROL;

// Tactical spots
pub const MAX_SPOTS: usize = u16::MAX as usize - 1;
pub const MAX_SPOTS_PER_QUERY: usize = 768;
pub const MIN_GRID_CELL_SIDE: u32 = 512;
pub const MAX_GRID_DIMENSION: u32 = 32;
pub const PRECOMPUTED_SPOTS_MAGIC: &[u8; 4] = b"TSPT";
pub const PRECOMPUTED_SPOTS_VERSION: u32 = 3;
