// [[AUTORL]]/apps/autorl-kernel/src/config.rs
// Purpose: Environment-driven kernel settings.
// Architecture: Application Boot
// Dependencies: std::env, tracing

use std::path::PathBuf;
use std::str::FromStr;

use crate::sequencer::Pacing;

#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub port: u16,
    pub screens_path: PathBuf,
    /// Multiplier applied to the default step delays
    pub demo_speed: f64,
    pub event_buffer: usize,
    pub run_history: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            screens_path: PathBuf::from("config/device_screens.json"),
            demo_speed: 1.0,
            event_buffer: 256,
            run_history: 50,
        }
    }
}

impl KernelConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Malformed values are
    /// logged and replaced with the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let demo_speed = parse_or(&lookup, "AUTORL_DEMO_SPEED", defaults.demo_speed);
        let demo_speed = if demo_speed.is_finite() && demo_speed >= 0.0 {
            demo_speed
        } else {
            tracing::warn!("AUTORL_DEMO_SPEED must be a finite, non-negative number. Using {}", defaults.demo_speed);
            defaults.demo_speed
        };

        Self {
            port: parse_or(&lookup, "KERNEL_PORT", defaults.port),
            screens_path: lookup("AUTORL_SCREENS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.screens_path),
            demo_speed,
            event_buffer: parse_or(&lookup, "AUTORL_EVENT_BUFFER", defaults.event_buffer).max(1),
            run_history: parse_or(&lookup, "AUTORL_RUN_HISTORY", defaults.run_history),
        }
    }

    /// `demo_speed`, or 1.0 when it is negative or not finite.
    pub fn speed_factor(&self) -> f64 {
        if self.demo_speed.is_finite() && self.demo_speed >= 0.0 {
            self.demo_speed
        } else {
            1.0
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::scaled(self.speed_factor())
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value '{}' for {}. Using {}", raw, key, default);
                default
            }
        },
        None => default,
    }
}
