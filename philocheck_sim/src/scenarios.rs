//! Standard verification scenarios.

use std::str::FromStr;
use std::time::Duration;

use philocheck_core::{
    CheckerKind, Expectation, LineParser, MealPolicy, ScenarioSpec, SimulationParams,
    DEFAULT_DEATH_TOLERANCE_MS, DEFAULT_FAIRNESS_GAP_FACTOR,
};

/// Closing line some subjects print after the meal limit is reached.
pub const MEALS_DONE_BANNER: &str = "All philosophers have eaten enough";

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// 5 philosophers with plenty of slack; nobody may die
    Survival,

    /// 4 philosophers who cannot all eat in time; one must die on schedule
    Death,

    /// 5 philosophers with a limit of 7 meals; the subject stops by itself
    MealLimit,

    /// A single philosopher with one fork; it must die
    Single,

    /// Long survival run judged on starvation and progress
    Fairness,

    /// 100 philosophers; the subject must not crash
    Stress,

    // ═══════════════════════════════════════════════════
    // ARGUMENT REJECTION - the subject must refuse to run
    // ═══════════════════════════════════════════════════

    /// No arguments at all
    BadArgsNone,

    /// A negative time
    BadArgsNegative,

    /// A non-numeric time
    BadArgsNonNumeric,

    /// A zero time
    BadArgsZero,

    /// Six arguments
    BadArgsTooMany,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        let mut all = Self::standard();
        all.extend(Self::rejection());
        all
    }

    /// Returns the simulation scenarios.
    pub fn standard() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Survival,
            ScenarioId::Death,
            ScenarioId::MealLimit,
            ScenarioId::Single,
            ScenarioId::Fairness,
            ScenarioId::Stress,
        ]
    }

    /// Returns the argument rejection probes.
    pub fn rejection() -> Vec<ScenarioId> {
        vec![
            ScenarioId::BadArgsNone,
            ScenarioId::BadArgsNegative,
            ScenarioId::BadArgsNonNumeric,
            ScenarioId::BadArgsZero,
            ScenarioId::BadArgsTooMany,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Survival => "survival",
            ScenarioId::Death => "death",
            ScenarioId::MealLimit => "meal_limit",
            ScenarioId::Single => "single",
            ScenarioId::Fairness => "fairness",
            ScenarioId::Stress => "stress",
            ScenarioId::BadArgsNone => "bad_args_none",
            ScenarioId::BadArgsNegative => "bad_args_negative",
            ScenarioId::BadArgsNonNumeric => "bad_args_non_numeric",
            ScenarioId::BadArgsZero => "bad_args_zero",
            ScenarioId::BadArgsTooMany => "bad_args_too_many",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Survival => "5 800 200 200 for 3s: nobody dies, forks stay exclusive",
            ScenarioId::Death => "4 310 200 100: exactly one death within 10ms of time_to_die",
            ScenarioId::MealLimit => "5 800 200 200 7: everyone eats 7 times, then the subject exits",
            ScenarioId::Single => "1 800 200 200: the lone philosopher dies at 800ms",
            ScenarioId::Fairness => "5 800 200 200 for 15s: no deadlock, no starvation",
            ScenarioId::Stress => "100 800 200 200 for 5s: survives the load without crashing",
            ScenarioId::BadArgsNone => "no arguments: error message and non-zero exit",
            ScenarioId::BadArgsNegative => "negative time_to_die: error message and non-zero exit",
            ScenarioId::BadArgsNonNumeric => "non-numeric time_to_die: error message and non-zero exit",
            ScenarioId::BadArgsZero => "zero time_to_die: error message and non-zero exit",
            ScenarioId::BadArgsTooMany => "six arguments: error message and non-zero exit",
        }
    }

    /// Returns true if this scenario probes argument validation.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ScenarioId::BadArgsNone
                | ScenarioId::BadArgsNegative
                | ScenarioId::BadArgsNonNumeric
                | ScenarioId::BadArgsZero
                | ScenarioId::BadArgsTooMany
        )
    }

    /// Builds the scenario with the suite tunables applied.
    pub fn spec(&self, config: &SuiteConfig) -> ScenarioSpec {
        let base = match self {
            ScenarioId::Survival => ScenarioSpec::new(
                self.name(),
                SimulationParams::new(5, 800, 200, 200),
                Expectation::Survive,
            )
            .with_timeout(Duration::from_secs(3)),

            ScenarioId::Death => ScenarioSpec::new(
                self.name(),
                SimulationParams::new(4, 310, 200, 100),
                Expectation::Die,
            )
            .with_checkers(CheckerKind::safety()),

            ScenarioId::MealLimit => ScenarioSpec::new(
                self.name(),
                SimulationParams::new(5, 800, 200, 200).with_meals(7),
                Expectation::SatisfyMeals,
            )
            .with_checkers(vec![
                CheckerKind::Format,
                CheckerKind::Exclusivity,
                CheckerKind::DeathTiming,
                CheckerKind::MealCount,
            ]),

            ScenarioId::Single => ScenarioSpec::new(
                self.name(),
                SimulationParams::new(1, 800, 200, 200),
                Expectation::Die,
            )
            .with_checkers(CheckerKind::safety()),

            ScenarioId::Fairness => ScenarioSpec::new(
                self.name(),
                SimulationParams::new(5, 800, 200, 200),
                Expectation::Survive,
            )
            .with_timeout(Duration::from_secs(15))
            .with_checkers(vec![
                CheckerKind::Format,
                CheckerKind::Exclusivity,
                CheckerKind::Fairness,
                CheckerKind::Progress,
            ]),

            ScenarioId::Stress => ScenarioSpec::new(
                self.name(),
                SimulationParams::new(100, 800, 200, 200),
                Expectation::NoCrash,
            )
            .with_timeout(Duration::from_secs(5))
            .with_checkers(vec![CheckerKind::Format, CheckerKind::Exclusivity]),

            ScenarioId::BadArgsNone => ScenarioSpec::raw(self.name(), Vec::new()),
            ScenarioId::BadArgsNegative => ScenarioSpec::raw(self.name(), args(&["5", "-800", "200", "200"])),
            ScenarioId::BadArgsNonNumeric => ScenarioSpec::raw(self.name(), args(&["5", "abc", "200", "200"])),
            ScenarioId::BadArgsZero => ScenarioSpec::raw(self.name(), args(&["5", "0", "200", "200"])),
            ScenarioId::BadArgsTooMany => {
                ScenarioSpec::raw(self.name(), args(&["5", "800", "200", "200", "7", "extra"]))
            }
        };
        config.apply(base)
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "survival" | "survive" => Ok(ScenarioId::Survival),
            "death" | "die" => Ok(ScenarioId::Death),
            "meal_limit" | "meals" => Ok(ScenarioId::MealLimit),
            "single" | "one" => Ok(ScenarioId::Single),
            "fairness" | "deadlock" | "starvation" => Ok(ScenarioId::Fairness),
            "stress" => Ok(ScenarioId::Stress),
            "bad_args_none" | "no_args" => Ok(ScenarioId::BadArgsNone),
            "bad_args_negative" | "negative" => Ok(ScenarioId::BadArgsNegative),
            "bad_args_non_numeric" | "non_numeric" => Ok(ScenarioId::BadArgsNonNumeric),
            "bad_args_zero" | "zero" => Ok(ScenarioId::BadArgsZero),
            "bad_args_too_many" | "too_many" => Ok(ScenarioId::BadArgsTooMany),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// Suite-wide tunables applied on top of each catalog scenario.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Replaces every scenario's harness deadline
    pub timeout: Option<Duration>,

    /// Fairness gap bound, multiple of `time_to_die`
    pub fairness_gap_factor: f64,

    /// Accepted lateness of a reported death
    pub death_tolerance_ms: u64,

    /// Meal limit strictness
    pub meal_policy: MealPolicy,

    /// Output lines tolerated as banners rather than format failures
    pub banners: Vec<String>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            fairness_gap_factor: DEFAULT_FAIRNESS_GAP_FACTOR,
            death_tolerance_ms: DEFAULT_DEATH_TOLERANCE_MS,
            meal_policy: MealPolicy::Exact,
            banners: Vec::new(),
        }
    }
}

impl SuiteConfig {
    /// Overrides the harness deadline of every scenario.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the fairness gap factor.
    pub fn with_fairness_gap_factor(mut self, factor: f64) -> Self {
        self.fairness_gap_factor = factor;
        self
    }

    /// Sets the death-report tolerance.
    pub fn with_death_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.death_tolerance_ms = tolerance_ms;
        self
    }

    /// Sets the meal policy.
    pub fn with_meal_policy(mut self, policy: MealPolicy) -> Self {
        self.meal_policy = policy;
        self
    }

    /// Tolerates an extra banner line.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banners.push(banner.into());
        self
    }

    /// Parser configured with the tolerated banners.
    pub fn parser(&self) -> LineParser {
        LineParser::new().with_banners(self.banners.iter().cloned())
    }

    /// Applies the tunables to a scenario.
    pub fn apply(&self, spec: ScenarioSpec) -> ScenarioSpec {
        let spec = spec
            .with_fairness_gap_factor(self.fairness_gap_factor)
            .with_death_tolerance(self.death_tolerance_ms)
            .with_meal_policy(self.meal_policy);
        match self.timeout {
            Some(timeout) => spec.with_timeout(timeout),
            None => spec,
        }
    }

    /// Builds an ad-hoc scenario from raw parameters.
    ///
    /// The expectation is SatisfyMeals with a meal limit and Survive
    /// without one, unless a death is expected.
    pub fn custom(&self, params: SimulationParams, expect_death: bool) -> ScenarioSpec {
        let (expectation, checkers) = if expect_death {
            (Expectation::Die, CheckerKind::safety())
        } else if params.max_meals.is_some() {
            (
                Expectation::SatisfyMeals,
                vec![
                    CheckerKind::Format,
                    CheckerKind::Exclusivity,
                    CheckerKind::DeathTiming,
                    CheckerKind::MealCount,
                ],
            )
        } else {
            (Expectation::Survive, CheckerKind::all())
        };
        self.apply(ScenarioSpec::new("custom", params, expectation).with_checkers(checkers))
    }
}

/// Resolves a `--scenario` selector: a name, `all`, `standard` or `rejection`.
pub fn select(selector: &str) -> Result<Vec<ScenarioId>, String> {
    match selector.to_lowercase().as_str() {
        "all" => Ok(ScenarioId::all()),
        "standard" => Ok(ScenarioId::standard()),
        "rejection" | "errors" => Ok(ScenarioId::rejection()),
        other => other.parse().map(|id| vec![id]),
    }
}
