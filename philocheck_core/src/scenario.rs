//! Scenario configuration.
//!
//! A [`ScenarioSpec`] is built by the suite, validated once, and then only
//! read: by the driver to launch the subject and by the checkers to judge
//! the resulting timeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checkers::CheckerKind;
use crate::error::VerifyError;

/// Allowed slack, in milliseconds, between `time_to_die` and a reported death.
pub const DEFAULT_DEATH_TOLERANCE_MS: u64 = 10;

/// Largest tolerated gap between meals, as a multiple of `time_to_die`.
pub const DEFAULT_FAIRNESS_GAP_FACTOR: f64 = 2.0;

/// Length of the fairness observation window, as a multiple of `time_to_die`.
pub const DEFAULT_FAIRNESS_WINDOW_FACTOR: f64 = 10.0;

/// Parameters handed to the subject on its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub philosophers: u32,
    pub time_to_die_ms: u64,
    pub time_to_eat_ms: u64,
    pub time_to_sleep_ms: u64,
    pub max_meals: Option<u32>,
}

impl SimulationParams {
    /// Creates parameters without a meal limit.
    pub fn new(philosophers: u32, time_to_die_ms: u64, time_to_eat_ms: u64, time_to_sleep_ms: u64) -> Self {
        Self {
            philosophers,
            time_to_die_ms,
            time_to_eat_ms,
            time_to_sleep_ms,
            max_meals: None,
        }
    }

    /// Sets the meal limit.
    pub fn with_meals(mut self, meals: u32) -> Self {
        self.max_meals = Some(meals);
        self
    }

    /// Renders `<N> <ttd> <tte> <tts> [meals]`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.philosophers.to_string(),
            self.time_to_die_ms.to_string(),
            self.time_to_eat_ms.to_string(),
            self.time_to_sleep_ms.to_string(),
        ];
        if let Some(meals) = self.max_meals {
            args.push(meals.to_string());
        }
        args
    }

    /// Rejects values no subject can be expected to run with.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.philosophers == 0 {
            return Err(VerifyError::config("philosopher count must be at least 1"));
        }
        for (name, value) in [
            ("time_to_die", self.time_to_die_ms),
            ("time_to_eat", self.time_to_eat_ms),
            ("time_to_sleep", self.time_to_sleep_ms),
        ] {
            if value == 0 {
                return Err(VerifyError::config(format!("{} must be positive", name)));
            }
        }
        if self.max_meals == Some(0) {
            return Err(VerifyError::config("meal limit must be positive when given"));
        }
        Ok(())
    }
}

impl std::fmt::Display for SimulationParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}

/// How the subject is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectArgs {
    /// Well-formed simulation parameters
    Params(SimulationParams),

    /// Literal argument vector, used to probe input validation
    Raw(Vec<String>),
}

impl SubjectArgs {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            SubjectArgs::Params(params) => params.to_args(),
            SubjectArgs::Raw(args) => args.clone(),
        }
    }
}

/// What a correct subject does in this scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// Keeps running until the harness deadline with nobody dying
    Survive,
    /// Reports exactly one death and stops
    Die,
    /// Stops on its own once everyone ate the meal limit
    SatisfyMeals,
    /// Refuses the arguments: non-zero exit and an error message
    RejectArguments,
    /// Anything except a crash
    NoCrash,
}

impl Expectation {
    pub fn name(&self) -> &'static str {
        match self {
            Expectation::Survive => "survive",
            Expectation::Die => "die",
            Expectation::SatisfyMeals => "satisfy_meals",
            Expectation::RejectArguments => "reject_arguments",
            Expectation::NoCrash => "no_crash",
        }
    }
}

/// How strictly the meal limit is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MealPolicy {
    /// Every philosopher eats exactly the limit
    #[default]
    Exact,
    /// Every philosopher eats at least the limit
    AtLeast,
}

/// Immutable description of one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Scenario name used in reports
    pub name: String,

    /// Subject invocation
    pub args: SubjectArgs,

    /// Contract for this run
    pub expectation: Expectation,

    /// Harness wall-clock deadline
    pub timeout: Duration,

    /// Time the subject gets to exit by itself after printing a death
    pub death_grace: Duration,

    /// Time between the termination signal and the forced kill
    pub kill_grace: Duration,

    /// Rules applied to the timeline
    pub checkers: Vec<CheckerKind>,

    /// Accepted lateness of a reported death
    pub death_tolerance_ms: u64,

    /// Fairness gap bound, multiple of `time_to_die`
    pub fairness_gap_factor: f64,

    /// Fairness observation window, multiple of `time_to_die`
    pub fairness_window_factor: f64,

    /// Meal limit strictness
    pub meal_policy: MealPolicy,
}

impl ScenarioSpec {
    /// Creates a scenario that runs the subject with `params`.
    pub fn new(name: impl Into<String>, params: SimulationParams, expectation: Expectation) -> Self {
        Self::with_args(name, SubjectArgs::Params(params), expectation)
    }

    /// Creates a scenario that passes a literal argument vector.
    pub fn raw(name: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_args(name, SubjectArgs::Raw(args), Expectation::RejectArguments)
            .with_timeout(Duration::from_secs(1))
            .with_checkers(Vec::new())
    }

    fn with_args(name: impl Into<String>, args: SubjectArgs, expectation: Expectation) -> Self {
        Self {
            name: name.into(),
            args,
            expectation,
            timeout: Duration::from_secs(10),
            death_grace: Duration::from_millis(500),
            kill_grace: Duration::from_millis(200),
            checkers: CheckerKind::all(),
            death_tolerance_ms: DEFAULT_DEATH_TOLERANCE_MS,
            fairness_gap_factor: DEFAULT_FAIRNESS_GAP_FACTOR,
            fairness_window_factor: DEFAULT_FAIRNESS_WINDOW_FACTOR,
            meal_policy: MealPolicy::default(),
        }
    }

    /// Sets the harness deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the post-death grace period.
    pub fn with_death_grace(mut self, grace: Duration) -> Self {
        self.death_grace = grace;
        self
    }

    /// Sets the terminate-to-kill grace period.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Replaces the checker set.
    pub fn with_checkers(mut self, checkers: Vec<CheckerKind>) -> Self {
        self.checkers = checkers;
        self
    }

    /// Sets the death-report tolerance.
    pub fn with_death_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.death_tolerance_ms = tolerance_ms;
        self
    }

    /// Sets the fairness gap factor.
    pub fn with_fairness_gap_factor(mut self, factor: f64) -> Self {
        self.fairness_gap_factor = factor;
        self
    }

    /// Sets the fairness window factor.
    pub fn with_fairness_window_factor(mut self, factor: f64) -> Self {
        self.fairness_window_factor = factor;
        self
    }

    /// Sets the meal policy.
    pub fn with_meal_policy(mut self, policy: MealPolicy) -> Self {
        self.meal_policy = policy;
        self
    }

    /// Simulation parameters, if this is not a raw-argument probe.
    pub fn params(&self) -> Option<&SimulationParams> {
        match &self.args {
            SubjectArgs::Params(params) => Some(params),
            SubjectArgs::Raw(_) => None,
        }
    }

    /// Argument vector for the subject.
    pub fn subject_args(&self) -> Vec<String> {
        self.args.to_args()
    }

    /// Checks the scenario before anything is launched.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.name.trim().is_empty() {
            return Err(VerifyError::config("scenario name must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(VerifyError::config("harness timeout must be positive"));
        }
        if !(self.fairness_gap_factor.is_finite() && self.fairness_gap_factor > 0.0) {
            return Err(VerifyError::config("fairness gap factor must be a positive number"));
        }
        if !(self.fairness_window_factor.is_finite() && self.fairness_window_factor > 0.0) {
            return Err(VerifyError::config("fairness window factor must be a positive number"));
        }
        match &self.args {
            SubjectArgs::Params(params) => params.validate(),
            SubjectArgs::Raw(_) if !self.checkers.is_empty() => Err(VerifyError::config(
                "raw-argument scenarios cannot run timeline checkers",
            )),
            SubjectArgs::Raw(_) => Ok(()),
        }
    }
}
