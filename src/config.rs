use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::data::{CourseId, FacultyId};
use crate::error::EngineError;

/// Everything a single solve call needs besides the reference data.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub solver: SolverConfig,
    pub objective: ObjectiveConfig,
    pub unenrolled: UnenrolledPolicy,
}

impl EngineConfig {
    pub fn heuristic(config: GeneticConfig) -> Self {
        Self {
            solver: SolverConfig::Heuristic(config),
            ..Self::default()
        }
    }

    pub fn exact(config: ExactConfig) -> Self {
        Self {
            solver: SolverConfig::Exact(config),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.objective.validate()?;
        match &self.solver {
            SolverConfig::Heuristic(ga) => ga.validate(),
            SolverConfig::Exact(exact) => exact.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SolverConfig {
    Heuristic(GeneticConfig),
    Exact(ExactConfig),
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig::Exact(ExactConfig::default())
    }
}

/// Population search settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneticConfig {
    pub population_size: usize,
    pub generations: usize,
    pub seed: u64,
    /// Wall-clock ceiling checked between generations.
    pub time_limit_secs: Option<f64>,
    /// Let mutation hand a session to another faculty member qualified for the course.
    pub allow_faculty_substitution: bool,
    /// Score the population on the rayon pool.
    pub parallel: bool,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 60,
            generations: 400,
            seed: 42,
            time_limit_secs: None,
            allow_faculty_substitution: false,
            parallel: true,
        }
    }
}

impl GeneticConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.population_size < 2 {
            return Err(EngineError::Config(
                "population size must be at least 2".to_string(),
            ));
        }
        if self.generations == 0 {
            return Err(EngineError::Config(
                "generation budget must be positive".to_string(),
            ));
        }
        if let Some(secs) = self.time_limit_secs {
            check_budget(secs)?;
        }
        Ok(())
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs_f64)
    }
}

/// ILP solver settings passed through to HiGHS.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExactConfig {
    pub time_limit_secs: f64,
    /// Advisory thread hint.
    pub threads: u32,
    pub seed: u64,
    pub log_to_console: bool,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 10.0,
            threads: 1, // limit to 1 thread for reproducibility
            seed: 1234,
            log_to_console: false,
        }
    }
}

impl ExactConfig {
    fn validate(&self) -> Result<(), EngineError> {
        check_budget(self.time_limit_secs)?;
        if self.threads == 0 {
            return Err(EngineError::Config("thread hint must be positive".to_string()));
        }
        Ok(())
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs_f64(self.time_limit_secs)
    }
}

fn check_budget(secs: f64) -> Result<(), EngineError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(EngineError::Config(format!(
            "time budget must be a positive number of seconds, got {secs}"
        )));
    }
    Ok(())
}

/// Penalty weights per unit of violation. The hard weight must exceed every
/// soft weight so reported totals read sensibly; ranking never relies on it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PenaltyWeights {
    pub hard: f64,
    pub same_day: f64,
    pub daily_overload: f64,
    pub weekly_imbalance: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            hard: 1000.0,
            same_day: 10.0,
            daily_overload: 5.0,
            weekly_imbalance: 1.0,
        }
    }
}

/// Reference load each faculty member is balanced against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(tag = "kind", content = "hours", rename_all = "camelCase")]
pub enum WeeklyTarget {
    /// Mean weekly hours across the faculty in the solve.
    #[default]
    Mean,
    Fixed(f64),
    Off,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectiveConfig {
    pub weights: PenaltyWeights,
    pub daily_hour_cap: Option<f64>,
    pub weekly_target: WeeklyTarget,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            weights: PenaltyWeights::default(),
            daily_hour_cap: Some(5.0),
            weekly_target: WeeklyTarget::Mean,
        }
    }
}

impl ObjectiveConfig {
    fn validate(&self) -> Result<(), EngineError> {
        let w = &self.weights;
        for (name, value) in [
            ("hard", w.hard),
            ("sameDay", w.same_day),
            ("dailyOverload", w.daily_overload),
            ("weeklyImbalance", w.weekly_imbalance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Config(format!(
                    "weight {name} must be a non-negative number, got {value}"
                )));
            }
        }
        let max_soft = w.same_day.max(w.daily_overload).max(w.weekly_imbalance);
        if w.hard <= max_soft {
            return Err(EngineError::Config(format!(
                "hard weight {} must exceed every soft weight (largest is {max_soft})",
                w.hard
            )));
        }
        if let Some(cap) = self.daily_hour_cap {
            if cap < 0.0 {
                return Err(EngineError::Config(format!(
                    "daily hour cap must not be negative, got {cap}"
                )));
            }
        }
        Ok(())
    }
}

/// What to do with a course nobody enrolled in.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnenrolledPolicy {
    /// Faculty that teaches an unenrolled course. Courses absent from the map are skipped.
    pub default_faculty: BTreeMap<CourseId, FacultyId>,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl ServerConfig {
    pub const BIND_VAR: &'static str = "TIMETABLE_BIND";

    pub fn from_env() -> Result<Self, EngineError> {
        let raw = std::env::var(Self::BIND_VAR).unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind = raw
            .parse()
            .map_err(|e| EngineError::Config(format!("{}={raw}: {e}", Self::BIND_VAR)))?;
        Ok(Self { bind })
    }
}
