use crate::content::SessionType;

/// Minimum time (minutes) that must remain for at least one exercise to be
/// attempted.
pub const MIN_TIME_FOR_EXERCISE: f64 = 5.0;
/// Minimum time (minutes) that must remain for at least one card to be
/// attempted.
pub const MIN_TIME_FOR_CARD: f64 = 1.5;

/// Default split of session time between exercises and cards when no ratio
/// or topic hint is available.
pub const DEFAULT_EXERCISE_RATIO: f64 = 0.5;

/// Per-topic exercise ratio overrides, keyed by topic path prefix. Looked up
/// before falling back to `DEFAULT_EXERCISE_RATIO`.
pub fn topic_exercise_ratio(topic: &str) -> Option<f64> {
    match topic {
        t if t.starts_with("code") => Some(0.7),
        t if t.starts_with("math") => Some(0.6),
        _ => None,
    }
}

/// Tracks a practice session's time allocation between exercises and cards,
/// and consumption against that allocation as items are added.
#[derive(Debug, Clone)]
pub struct SessionTimeBudget {
    pub total_minutes: f64,
    pub content_mode: SessionType,
    pub exercise_ratio: Option<f64>,
    pub topic_selected: Option<String>,

    pub exercise_budget: f64,
    pub card_budget: f64,
    pub exercise_consumed: f64,
    pub card_consumed: f64,
    pub exercise_count: u32,
    pub card_count: u32,
}

impl SessionTimeBudget {
    pub fn new(
        total_minutes: f64,
        content_mode: SessionType,
        exercise_ratio: Option<f64>,
        topic_selected: Option<String>,
    ) -> Self {
        let mut budget = Self {
            total_minutes,
            content_mode,
            exercise_ratio,
            topic_selected,
            exercise_budget: 0.0,
            card_budget: 0.0,
            exercise_consumed: 0.0,
            card_consumed: 0.0,
            exercise_count: 0,
            card_count: 0,
        };
        budget.calculate_budgets();
        budget
    }

    /// Allocation rules: `exercises_only`/`cards_only` give the whole budget
    /// to one bucket; `both` prefers an explicit ratio, then a topic-based
    /// ratio, then the default split.
    fn calculate_budgets(&mut self) {
        let exercise_fraction = match self.content_mode {
            SessionType::ExercisesOnly => 1.0,
            SessionType::CardsOnly => 0.0,
            SessionType::Both => self
                .exercise_ratio
                .or_else(|| self.topic_selected.as_deref().and_then(topic_exercise_ratio))
                .unwrap_or(DEFAULT_EXERCISE_RATIO),
        };
        self.exercise_budget = self.total_minutes * exercise_fraction;
        self.card_budget = self.total_minutes * (1.0 - exercise_fraction);
    }

    pub fn exercise_remaining(&self) -> f64 {
        (self.exercise_budget - self.exercise_consumed).max(0.0)
    }

    pub fn card_remaining(&self) -> f64 {
        (self.card_budget - self.card_consumed).max(0.0)
    }

    pub fn total_consumed(&self) -> f64 {
        self.exercise_consumed + self.card_consumed
    }

    pub fn total_remaining(&self) -> f64 {
        (self.total_minutes - self.total_consumed()).max(0.0)
    }

    pub fn is_full(&self) -> bool {
        self.total_remaining() < MIN_TIME_FOR_EXERCISE.min(MIN_TIME_FOR_CARD)
    }

    /// Whether `estimated_minutes` of exercise time can still fit, allowing
    /// overflow into the shared total budget by default.
    pub fn can_fit_exercise(&self, estimated_minutes: f64, allow_overflow: bool) -> (bool, String) {
        if estimated_minutes <= self.exercise_remaining() {
            return (true, "fits within exercise budget".to_string());
        }
        if allow_overflow && estimated_minutes <= self.total_remaining() {
            return (true, "fits via overflow into total remaining time".to_string());
        }
        (false, "insufficient time remaining for an exercise".to_string())
    }

    pub fn can_fit_card(&self, estimated_minutes: f64, allow_overflow: bool) -> (bool, String) {
        if estimated_minutes <= self.card_remaining() {
            return (true, "fits within card budget".to_string());
        }
        if allow_overflow && estimated_minutes <= self.total_remaining() {
            return (true, "fits via overflow into total remaining time".to_string());
        }
        (false, "insufficient time remaining for a card".to_string())
    }

    /// Consume `estimated_minutes` from the exercise budget if it fits,
    /// charging overflow against whichever bucket has room.
    pub fn add_exercise(&mut self, estimated_minutes: f64) -> bool {
        let (fits, _) = self.can_fit_exercise(estimated_minutes, true);
        if !fits {
            return false;
        }
        self.exercise_consumed += estimated_minutes;
        self.exercise_count += 1;
        true
    }

    pub fn add_card(&mut self, estimated_minutes: f64) -> bool {
        let (fits, _) = self.can_fit_card(estimated_minutes, true);
        if !fits {
            return false;
        }
        self.card_consumed += estimated_minutes;
        self.card_count += 1;
        true
    }
}
