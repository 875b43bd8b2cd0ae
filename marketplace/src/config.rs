//! Service configuration, read from the environment.

use crate::deadlines::GracePolicy;
use std::time::Duration;

/// Runtime configuration for the marketplace service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// How often the background timeout sweep runs
    pub sweep_interval: Duration,
    /// Grace periods for attendance and confirmation deadlines
    pub grace: GracePolicy,
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `BIND_ADDRESS` (default `0.0.0.0:3000`)
    /// - `SWEEP_INTERVAL_SECS` (default `60`)
    /// - `TUTOR_GRACE_MINUTES` / `STUDENT_GRACE_MINUTES` (default `15` / `30`)
    /// - `CONFIRMATION_LEAD_MINUTES` (default `15`)
    #[must_use]
    pub fn from_env() -> Self {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let sweep_interval = Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 60));
        let grace = GracePolicy::from_minutes(
            env_i64("TUTOR_GRACE_MINUTES", crate::deadlines::TUTOR_GRACE_MINUTES),
            env_i64(
                "STUDENT_GRACE_MINUTES",
                crate::deadlines::STUDENT_GRACE_MINUTES,
            ),
            env_i64(
                "CONFIRMATION_LEAD_MINUTES",
                crate::deadlines::CONFIRMATION_LEAD_MINUTES,
            ),
        );
        Self {
            bind_address,
            sweep_interval,
            grace,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            sweep_interval: Duration::from_secs(60),
            grace: GracePolicy::default(),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
