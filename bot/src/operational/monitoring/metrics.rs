// tactical_bot_core/bot/src/operational/monitoring/metrics.rs
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Instant;
use anyhow::{Context, Result};

pub struct MetricsSystem {
    start_time: Instant,
}

impl MetricsSystem {
    /// Describes the bot metrics. A Prometheus exporter is installed only if a port is given.
    pub fn new(prometheus_port: Option<u16>) -> Result<Self> {
        if let Some(port) = prometheus_port {
            PrometheusBuilder::new()
                .with_http_listener(([0, 0, 0, 0], port))
                .install()
                .context("Failed to install Prometheus exporter")?;
        }

        describe_counter!("ai_plans_built_total", "Plans the goal-oriented planner has found");
        describe_counter!("ai_plans_failed_total", "Planning passes that found no plan for a goal");
        describe_counter!("ai_planner_internal_errors_total", "Planner capacity or invariant violations");
        describe_histogram!("ai_planner_nodes_expanded", "Nodes expanded by a single plan search");
        describe_counter!("ai_movement_rollbacks_total", "Movement prediction rollbacks to a savepoint");
        describe_counter!("ai_movement_fallbacks_total", "Switches of a bot to the walk fallback movement");
        describe_counter!("ai_tactical_spots_cache_hits_total", "Tactical spots loaded from a precomputed file");
        describe_histogram!("ai_bot_think_time_seconds", "Time of a single bot think frame in seconds");
        describe_histogram!("sim_tick_time_seconds", "Time of a whole simulation tick in seconds");
        describe_counter!("sim_ticks_total", "Simulation ticks processed");
        describe_gauge!("sim_bots_alive", "Bots alive at the end of the last tick");

        Ok(MetricsSystem { start_time: Instant::now() })
    }

    pub fn record_tick_time(&self, duration: f64) {
        histogram!("sim_tick_time_seconds").record(duration);
        counter!("sim_ticks_total").increment(1);
    }

    pub fn update_alive_bots(&self, count: usize) {
        gauge!("sim_bots_alive").set(count as f64);
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

// Logging setup
pub fn init_logging() -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tactical_bot_core=info,warn".into()))
        .with(fmt::layer())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Same as `init_logging()` but emits JSON lines.
pub fn init_json_logging() -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tactical_bot_core=info,warn".into()))
        .with(fmt::layer().json())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
