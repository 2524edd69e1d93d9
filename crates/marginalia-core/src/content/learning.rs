use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fsrs::LearningState;

/// Re-export of the FSRS learning state under the data-model's name for it:
/// `SpacedRepCard.state`.
pub use crate::fsrs::LearningState as CardState;

/// The pedagogical shape of a flashcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Foundational,
    Intermediate,
    Advanced,
}

/// Exercise difficulty; distinct from `Difficulty` on cards only in naming,
/// kept separate so the two axes can diverge without breaking callers.
pub type ExerciseDifficulty = Difficulty;

/// A spaced-repetition flashcard. FSRS fields start uninitialized on a
/// `New` card and are populated by the scheduler on first review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacedRepCard {
    pub id: Uuid,
    pub card_type: CardType,
    pub front: String,
    pub back: String,
    pub hints: Vec<String>,
    pub tags: Vec<String>,
    pub source_content_uuid: Option<Uuid>,
    pub source_concept: Option<String>,

    pub state: CardState,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub due_date: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub scheduled_days: u32,
    pub repetitions: u32,
    pub lapses: u32,
    pub total_reviews: u32,
    pub correct_reviews: u32,
}

/// Closed set of card shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Definition,
    Application,
    Example,
    Misconception,
    Comparison,
    Properties,
}

impl SpacedRepCard {
    pub fn new(card_type: CardType, front: impl Into<String>, back: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            card_type,
            front: front.into(),
            back: back.into(),
            hints: Vec::new(),
            tags: Vec::new(),
            source_content_uuid: None,
            source_concept: None,
            state: LearningState::New,
            stability: None,
            difficulty: None,
            due_date: now,
            last_reviewed: None,
            scheduled_days: 0,
            repetitions: 0,
            lapses: 0,
            total_reviews: 0,
            correct_reviews: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.last_reviewed.is_none()
    }

    pub fn success_rate(&self) -> Option<f64> {
        if self.total_reviews == 0 {
            None
        } else {
            Some(self.correct_reviews as f64 / self.total_reviews as f64)
        }
    }
}

/// Closed set of exercise shapes, spanning conceptual recall and code tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    WorkedExample,
    Recall,
    CodeImplement,
    CodeComplete,
    CodeDebug,
    CodeRefactor,
    CodeExplain,
}

impl ExerciseType {
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Self::CodeImplement | Self::CodeComplete | Self::CodeDebug | Self::CodeRefactor | Self::CodeExplain
        )
    }
}

/// A practice exercise, linked to content via a many-to-many junction (kept
/// in the store, not modeled here).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: Uuid,
    pub exercise_type: ExerciseType,
    pub topic: String,
    pub difficulty: ExerciseDifficulty,
    pub prompt: String,
    pub hints: Vec<String>,
    pub expected_key_points: Vec<String>,
    pub worked_example: Option<String>,
    pub follow_up_problem: Option<String>,
    pub language: Option<String>,
    pub starter_code: Option<String>,
    pub solution_code: Option<String>,
    pub test_cases: Vec<String>,
    pub buggy_code: Option<String>,
    pub estimated_time_minutes: u32,
}

/// A learner's attempt at an `Exercise`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseAttempt {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub response: Option<String>,
    pub response_code: Option<String>,
    pub score: f64,
    pub is_correct: bool,
    pub feedback: Option<String>,
    pub covered_points: Vec<String>,
    pub missing_points: Vec<String>,
    pub misconceptions: Vec<String>,
    pub tests_passed: Option<u32>,
    pub tests_total: Option<u32>,
    pub confidence_before: Option<u8>,
    pub confidence_after: Option<u8>,
    pub time_spent_seconds: u32,
}

/// Session kind, driving `SessionTimeBudget` allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    CardsOnly,
    ExercisesOnly,
    Both,
}

/// A completed (or in-progress) practice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSession {
    pub id: Uuid,
    pub session_type: SessionType,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: f64,
    pub topics_covered: Vec<String>,
    pub total_cards: u32,
    pub exercise_count: u32,
    pub correct_count: u32,
    pub average_score: f64,
}

/// Trend classification over successive `MasterySnapshot`s for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryTrend {
    Improving,
    Stable,
    Declining,
}

/// A point-in-time aggregate of mastery for one topic path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterySnapshot {
    pub snapshot_date: DateTime<Utc>,
    pub topic_path: String,
    pub practice_count: u32,
    pub success_rate: Option<f64>,
    pub mastery_score: f64,
    pub trend: MasteryTrend,
    pub retention_estimate: Option<f64>,
    pub last_practiced: Option<DateTime<Utc>>,
    pub days_since_review: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_card_has_no_fsrs_state() {
        let card = SpacedRepCard::new(CardType::Definition, "Q", "A");
        assert!(card.is_new());
        assert!(card.stability.is_none());
        assert!(card.difficulty.is_none());
        assert_eq!(card.state, CardState::New);
    }

    #[test]
    fn success_rate_is_none_before_any_reviews() {
        let card = SpacedRepCard::new(CardType::Definition, "Q", "A");
        assert_eq!(card.success_rate(), None);
    }

    #[test]
    fn success_rate_computes_ratio() {
        let mut card = SpacedRepCard::new(CardType::Definition, "Q", "A");
        card.total_reviews = 4;
        card.correct_reviews = 3;
        assert_eq!(card.success_rate(), Some(0.75));
    }

    #[test]
    fn code_exercise_types_are_flagged() {
        assert!(ExerciseType::CodeImplement.is_code());
        assert!(!ExerciseType::Recall.is_code());
    }
}
