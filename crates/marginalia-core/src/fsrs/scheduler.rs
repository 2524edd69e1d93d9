//! FSRS scheduler: card state transitions on review.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::algorithm::{
    self, DEFAULT_DECAY, DEFAULT_MAX_INTERVAL, DEFAULT_RETENTION, FSRS5_WEIGHTS,
};

/// A review rating, matching the four-button Anki-style scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Coarse learning state, matching `SpacedRepCard.state` in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LearningState {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

/// FSRS scheduling state carried on a card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FSRSState {
    pub state: LearningState,
    /// `None` until the first review (spec invariant: new cards have no FSRS state yet).
    pub difficulty: Option<f64>,
    pub stability: Option<f64>,
    pub due: DateTime<Utc>,
    pub last_review: Option<DateTime<Utc>>,
    pub reps: u32,
    pub lapses: u32,
    pub scheduled_days: u32,
}

impl FSRSState {
    pub fn new_card(due: DateTime<Utc>) -> Self {
        Self {
            state: LearningState::New,
            difficulty: None,
            stability: None,
            due,
            last_review: None,
            reps: 0,
            lapses: 0,
            scheduled_days: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.last_review.is_none()
    }

    /// Retrievability at `now`. A new card is always fully retrievable (1.0).
    pub fn retrievability_at(&self, now: DateTime<Utc>) -> f64 {
        match (self.stability, self.last_review) {
            (Some(s), Some(last)) => {
                let days = (now - last).num_milliseconds() as f64 / 86_400_000.0;
                algorithm::retrievability(days, s)
            }
            _ => 1.0,
        }
    }
}

/// Record of a single review, for audit trail / ReviewLog history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub rating: Rating,
    pub reviewed_at: DateTime<Utc>,
    pub state_before: LearningState,
    pub state_after: LearningState,
    pub stability_before: Option<f64>,
    pub stability_after: f64,
    pub difficulty_before: Option<f64>,
    pub difficulty_after: f64,
    pub scheduled_days: u32,
    pub elapsed_days: f64,
}

/// Scheduler tuning parameters.
#[derive(Debug, Clone)]
pub struct FSRSParameters {
    pub desired_retention: f64,
    pub maximum_interval: u32,
    pub weights: [f64; 19],
}

impl Default for FSRSParameters {
    fn default() -> Self {
        Self {
            desired_retention: DEFAULT_RETENTION,
            maximum_interval: DEFAULT_MAX_INTERVAL,
            weights: FSRS5_WEIGHTS,
        }
    }
}

/// Forecast buckets for the review-forecast view (spec.md §4.11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewResults {
    pub overdue: u32,
    pub today: u32,
    pub tomorrow: u32,
    pub this_week: u32,
    pub later: u32,
}

/// FSRS-based review scheduler.
#[derive(Debug, Clone)]
pub struct FSRSScheduler {
    params: FSRSParameters,
}

impl Default for FSRSScheduler {
    fn default() -> Self {
        Self::new(FSRSParameters::default())
    }
}

impl FSRSScheduler {
    pub fn new(params: FSRSParameters) -> Self {
        Self { params }
    }

    pub fn desired_retention(&self) -> f64 {
        self.params.desired_retention
    }

    pub fn maximum_interval(&self) -> u32 {
        self.params.maximum_interval
    }

    /// Apply a review rating to a card's FSRS state, returning the new state and log.
    pub fn review(&self, card: &FSRSState, rating: Rating, now: DateTime<Utc>) -> (FSRSState, ReviewResult) {
        let w = &self.params.weights;
        let g = rating.as_u8();

        let stability_before = card.stability;
        let difficulty_before = card.difficulty;
        let state_before = card.state;

        let elapsed_days = card
            .last_review
            .map(|last| (now - last).num_milliseconds() as f64 / 86_400_000.0)
            .unwrap_or(0.0);

        let (difficulty, stability, state) = if card.is_new() {
            let difficulty = algorithm::initial_difficulty_with_weights(g, w);
            let stability = algorithm::initial_stability_with_weights(g, w);
            let state = if rating == Rating::Easy {
                LearningState::Review
            } else {
                LearningState::Learning
            };
            (difficulty, stability, state)
        } else {
            let d_prev = difficulty_before.unwrap_or(5.0);
            let s_prev = stability_before.unwrap_or(1.0);
            let difficulty = algorithm::next_difficulty_with_weights(d_prev, g, w);

            if elapsed_days < 1.0 {
                // Same-day re-review: short-term stability bump, no lapse/state churn.
                let stability = algorithm::same_day_stability_with_weights(s_prev, g, w);
                let state = if rating == Rating::Again {
                    LearningState::Relearning
                } else {
                    state_before
                };
                (difficulty, stability, state)
            } else {
                let r = algorithm::retrievability_with_decay(elapsed_days, s_prev, DEFAULT_DECAY);
                match rating {
                    Rating::Again => {
                        let stability = algorithm::next_forget_stability_with_weights(d_prev, s_prev, r, w);
                        (difficulty, stability, LearningState::Relearning)
                    }
                    _ => {
                        let stability = algorithm::next_recall_stability_with_weights(d_prev, s_prev, r, g, w);
                        (difficulty, stability, LearningState::Review)
                    }
                }
            }
        };

        let scheduled_days = algorithm::next_interval_with_decay(
            stability,
            self.params.desired_retention,
            self.params.maximum_interval,
            DEFAULT_DECAY,
        );

        let reps = if rating == Rating::Again && !card.is_new() {
            card.reps
        } else {
            card.reps + 1
        };
        let lapses = if rating == Rating::Again && !card.is_new() {
            card.lapses + 1
        } else {
            card.lapses
        };

        let due = now + Duration::days(scheduled_days as i64);

        let new_state = FSRSState {
            state,
            difficulty: Some(difficulty),
            stability: Some(stability),
            due,
            last_review: Some(now),
            reps,
            lapses,
            scheduled_days,
        };

        let log = ReviewResult {
            rating,
            reviewed_at: now,
            state_before,
            state_after: state,
            stability_before,
            stability_after: stability,
            difficulty_before,
            difficulty_after: difficulty,
            scheduled_days,
            elapsed_days,
        };

        (new_state, log)
    }

    /// Bucket a set of due dates relative to `now` into the forecast view.
    /// New cards (no `last_review`) are excluded per spec.md §4.11.
    pub fn forecast<'a>(&self, cards: impl Iterator<Item = &'a FSRSState>, now: DateTime<Utc>) -> PreviewResults {
        let mut out = PreviewResults::default();
        let today_end = (now + Duration::days(1)).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let tomorrow_end = today_end + Duration::days(1);
        let week_end = today_end + Duration::days(7);

        for card in cards {
            if card.is_new() {
                continue;
            }
            if card.due < now {
                out.overdue += 1;
            } else if card.due < today_end {
                out.today += 1;
            } else if card.due < tomorrow_end {
                out.tomorrow += 1;
            } else if card.due < week_end {
                out.this_week += 1;
            } else {
                out.later += 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn first_review_initializes_state() {
        let scheduler = FSRSScheduler::default();
        let card = FSRSState::new_card(t(2025, 1, 1));
        let (new_card, log) = scheduler.review(&card, Rating::Good, t(2025, 1, 1));

        assert_eq!(log.state_before, LearningState::New);
        assert!(new_card.stability.unwrap() > 0.0);
        assert!((1..=10).contains(&(new_card.difficulty.unwrap() as i64)));
        assert_eq!(new_card.reps, 1);
        assert_eq!(new_card.lapses, 0);
        assert!(new_card.scheduled_days >= 1);
        assert_eq!(new_card.last_review, Some(t(2025, 1, 1)));
    }

    #[test]
    fn good_review_on_review_card_increases_stability() {
        let scheduler = FSRSScheduler::default();
        let mut card = FSRSState::new_card(t(2025, 1, 1));
        (card, _) = {
            let (c, l) = scheduler.review(&card, Rating::Good, t(2025, 1, 1));
            (c, l)
        };
        card.state = LearningState::Review;

        let review_time = card.due;
        let (after, log) = scheduler.review(&card, Rating::Good, review_time);

        assert!(after.stability.unwrap() > card.stability.unwrap());
        assert!(after.scheduled_days > 0);
        assert_eq!(log.state_after, LearningState::Review);
    }

    #[test]
    fn again_on_review_card_triggers_lapse() {
        let scheduler = FSRSScheduler::default();
        let mut card = FSRSState {
            state: LearningState::Review,
            difficulty: Some(5.0),
            stability: Some(20.0),
            due: t(2025, 1, 20),
            last_review: Some(t(2025, 1, 1)),
            reps: 3,
            lapses: 0,
            scheduled_days: 19,
        };

        let (after, _log) = scheduler.review(&card, Rating::Again, t(2025, 1, 20));

        assert_eq!(after.lapses, card.lapses + 1);
        assert_eq!(after.state, LearningState::Relearning);
        assert!(after.stability.unwrap() < card.stability.take().unwrap());
    }

    #[test]
    fn scheduled_days_never_exceeds_maximum() {
        let scheduler = FSRSScheduler::new(FSRSParameters {
            maximum_interval: 30,
            ..FSRSParameters::default()
        });
        let card = FSRSState {
            state: LearningState::Review,
            difficulty: Some(2.0),
            stability: Some(5000.0),
            due: t(2025, 1, 1),
            last_review: Some(t(2024, 1, 1)),
            reps: 10,
            lapses: 0,
            scheduled_days: 300,
        };
        let (after, _) = scheduler.review(&card, Rating::Easy, t(2025, 1, 1));
        assert!(after.scheduled_days <= 30);
    }

    #[test]
    fn new_card_retrievability_is_one() {
        let card = FSRSState::new_card(Utc::now());
        assert_eq!(card.retrievability_at(Utc::now()), 1.0);
    }

    #[test]
    fn forecast_excludes_new_cards() {
        let scheduler = FSRSScheduler::default();
        let new_card = FSRSState::new_card(t(2025, 1, 1));
        let due_today = FSRSState {
            last_review: Some(t(2024, 12, 31)),
            due: t(2025, 1, 1),
            ..FSRSState::new_card(t(2025, 1, 1))
        };
        let cards = vec![new_card, due_today];
        let forecast = scheduler.forecast(cards.iter(), t(2025, 1, 1));
        assert_eq!(forecast.today + forecast.overdue, 1);
    }
}
