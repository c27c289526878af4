// tactical_bot_core/bot/src/core/config.rs
use crate::core::constants::*;
use crate::core::error::{BotError, BotResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalWeightsConfig {
    pub grab_item_max_weight: f32,
    /// Item weight is scaled down by the travel time to the item, in seconds.
    pub grab_item_travel_time_falloff_seconds: f32,
    pub kill_enemy_base_weight: f32,
    pub kill_enemy_max_weight: f32,
    pub run_away_base_weight: f32,
    pub run_away_max_weight: f32,
    pub react_to_hazard_weight: f32,
    pub roam_weight: f32,
    /// Below this health+armor sum a bot considers itself weak.
    pub weak_bot_damage_to_kill: f32,
}

impl Default for GoalWeightsConfig {
    fn default() -> Self {
        GoalWeightsConfig {
            grab_item_max_weight: 2.0,
            grab_item_travel_time_falloff_seconds: 8.0,
            kill_enemy_base_weight: 1.0,
            kill_enemy_max_weight: 3.0,
            run_away_base_weight: 0.5,
            run_away_max_weight: 3.5,
            react_to_hazard_weight: 5.0,
            roam_weight: 0.25,
            weak_bot_damage_to_kill: 75.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub keep_curr_goal_weight_threshold: f32,
    pub goal_pickup_action_radius: f32,
    pub grab_item_update_period_millis: u32,
    pub kill_enemy_update_period_millis: u32,
    pub run_away_update_period_millis: u32,
    pub react_to_hazard_update_period_millis: u32,
    pub roam_update_period_millis: u32,
    pub goal_weights: GoalWeightsConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            keep_curr_goal_weight_threshold: KEEP_CURR_GOAL_WEIGHT_THRESHOLD,
            goal_pickup_action_radius: GOAL_PICKUP_ACTION_RADIUS,
            grab_item_update_period_millis: 950,
            kill_enemy_update_period_millis: 1250,
            run_away_update_period_millis: 750,
            react_to_hazard_update_period_millis: 350,
            roam_update_period_millis: 1500,
            goal_weights: GoalWeightsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub min_desired_speed_gain_per_second: f32,
    pub tolerable_speed_loss_sequential_millis: u32,
    pub tolerable_walkable_increased_travel_time_millis: u32,
    pub tolerable_unreachable_target_sequential_millis: u32,
    pub run_speed: f32,
    pub dash_speed: f32,
    pub jump_speed: f32,
    pub default_frame_millis: u32,
    pub prediction_step_millis: u32,
    pub max_failed_prediction_frames: u32,
    pub max_suggested_look_dirs: usize,
}

impl Default for MovementConfig {
    fn default() -> Self {
        MovementConfig {
            min_desired_speed_gain_per_second: 0.0,
            tolerable_speed_loss_sequential_millis: 300,
            tolerable_walkable_increased_travel_time_millis: 2000,
            tolerable_unreachable_target_sequential_millis: 700,
            run_speed: 320.0,
            dash_speed: 450.0,
            jump_speed: 280.0,
            default_frame_millis: 16,
            prediction_step_millis: 48,
            max_failed_prediction_frames: 3,
            max_suggested_look_dirs: MAX_SUGGESTED_LOOK_DIRS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalConfig {
    /// Directory for precomputed spot files. `None` disables the on-disk cache.
    pub cache_dir: Option<PathBuf>,
    pub min_grid_cell_side: u32,
    pub max_grid_dimension: u32,
    pub max_spots_per_query: usize,
    pub spot_sampling_step: f32,
    pub min_spot_spacing: f32,
    pub cover_search_radius: f32,
    pub advantage_search_radius: f32,
    pub run_away_search_radius: f32,
    pub dodge_search_radius: f32,
    pub roam_search_radius: f32,
    pub min_height_advantage: f32,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        TacticalConfig {
            cache_dir: None,
            min_grid_cell_side: MIN_GRID_CELL_SIDE,
            max_grid_dimension: MAX_GRID_DIMENSION,
            max_spots_per_query: MAX_SPOTS_PER_QUERY,
            spot_sampling_step: 96.0,
            min_spot_spacing: 128.0,
            cover_search_radius: 768.0,
            advantage_search_radius: 1024.0,
            run_away_search_radius: 1536.0,
            dodge_search_radius: 192.0,
            roam_search_radius: 1024.0,
            min_height_advantage: 24.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub map_name: String,
    pub ticks: u64,
    pub bot_count: usize,
    pub map_cells_x: u32,
    pub map_cells_y: u32,
    pub map_cell_side: f32,
    pub skills: Vec<f32>,
    pub rng_seed: u64,
    pub ai_threads: usize,
    pub metrics_port: Option<u16>,
    /// Other bots farther than this are never selected as enemies.
    pub enemy_view_distance: f32,
    /// How long a selection stays valid without being refreshed.
    pub enemy_selection_timeout_millis: u64,
    pub item_respawn_millis: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            map_name: "generated_arena".to_string(),
            ticks: 600,
            bot_count: 8,
            map_cells_x: 12,
            map_cells_y: 12,
            map_cell_side: 192.0,
            skills: vec![0.2, 0.5, 0.9],
            rng_seed: 0x5eed,
            ai_threads: 4,
            metrics_port: None,
            enemy_view_distance: 1536.0,
            enemy_selection_timeout_millis: 1000,
            item_respawn_millis: 15_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotAiConfig {
    pub planner: PlannerConfig,
    pub movement: MovementConfig,
    pub tactical: TacticalConfig,
    pub simulation: SimulationConfig,
}

impl BotAiConfig {
    pub fn from_yaml_str(text: &str) -> BotResult<Self> {
        let config: BotAiConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> BotResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> BotResult<()> {
        if self.tactical.min_grid_cell_side == 0 {
            return Err(BotError::Config("tactical.min_grid_cell_side must be positive".into()));
        }
        if self.tactical.max_grid_dimension == 0 {
            return Err(BotError::Config("tactical.max_grid_dimension must be positive".into()));
        }
        if self.tactical.max_spots_per_query == 0 || self.tactical.max_spots_per_query > MAX_SPOTS {
            return Err(BotError::Config(format!(
                "tactical.max_spots_per_query must be in 1..={}",
                MAX_SPOTS
            )));
        }
        if self.tactical.spot_sampling_step <= 0.0 {
            return Err(BotError::Config("tactical.spot_sampling_step must be positive".into()));
        }
        if self.movement.default_frame_millis == 0 || self.movement.prediction_step_millis == 0 {
            return Err(BotError::Config("movement frame durations must be positive".into()));
        }
        if self.movement.max_suggested_look_dirs == 0 || self.movement.max_suggested_look_dirs > MAX_SUGGESTED_LOOK_DIRS {
            return Err(BotError::Config(format!(
                "movement.max_suggested_look_dirs must be in 1..={}",
                MAX_SUGGESTED_LOOK_DIRS
            )));
        }
        if self.simulation.skills.iter().any(|s| !(0.0..=1.0).contains(s)) {
            return Err(BotError::Config("simulation.skills must be within [0, 1]".into()));
        }
        if self.simulation.enemy_view_distance <= 0.0 {
            return Err(BotError::Config("simulation.enemy_view_distance must be positive".into()));
        }
        if self.planner.keep_curr_goal_weight_threshold < 0.0 {
            return Err(BotError::Config("planner.keep_curr_goal_weight_threshold must not be negative".into()));
        }
        Ok(())
    }
}
