//! Session Composer (C13): time-budgeted selection and interleaving of due
//! cards and exercises into a single practice session.

mod budget;

pub use budget::{SessionTimeBudget, DEFAULT_EXERCISE_RATIO, MIN_TIME_FOR_CARD, MIN_TIME_FOR_EXERCISE};

use thiserror::Error;

use crate::content::{Exercise, PracticeSession, SessionType, SpacedRepCard};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no due cards or exercises matched topic filter {topic:?}")]
    EmptySession { topic: Option<String> },
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Average minutes budgeted per item when no estimate is supplied.
const DEFAULT_MINUTES_PER_CARD: f64 = 1.0;

/// A composed session's item list, in presentation order.
#[derive(Debug, Clone)]
pub enum SessionItem {
    Card(SpacedRepCard),
    Exercise(Exercise),
}

#[derive(Debug, Clone)]
pub struct ComposedSession {
    pub session: PracticeSession,
    pub items: Vec<SessionItem>,
    pub budget: SessionTimeBudget,
}

/// Select due cards and candidate exercises within `budget`, then interleave
/// them: worked examples lead, then the remaining cards and exercises are
/// shuffled and zipped so a learner doesn't see a long run of one type.
///
/// `due_cards` and `candidate_exercises` are assumed pre-filtered by topic
/// and sorted by due date / priority by the caller; this function only
/// applies the time-budget cutoff and interleaving order.
pub fn compose_session(
    total_minutes: f64,
    content_mode: SessionType,
    exercise_ratio: Option<f64>,
    topic: Option<String>,
    due_cards: Vec<SpacedRepCard>,
    candidate_exercises: Vec<Exercise>,
) -> Result<ComposedSession> {
    let mut budget = SessionTimeBudget::new(total_minutes, content_mode, exercise_ratio, topic.clone());

    let mut selected_exercises = Vec::new();
    for exercise in candidate_exercises {
        if budget.is_full() {
            break;
        }
        let estimate = exercise.estimated_time_minutes.max(1) as f64;
        if budget.add_exercise(estimate) {
            selected_exercises.push(exercise);
        }
    }

    let mut selected_cards = Vec::new();
    for card in due_cards {
        if budget.is_full() {
            break;
        }
        if budget.add_card(DEFAULT_MINUTES_PER_CARD) {
            selected_cards.push(card);
        }
    }

    if selected_cards.is_empty() && selected_exercises.is_empty() {
        return Err(SessionError::EmptySession { topic });
    }

    let items = interleave(selected_exercises, selected_cards);

    let mut session = PracticeSession {
        id: uuid::Uuid::new_v4(),
        session_type: content_mode,
        started_at: chrono::Utc::now(),
        ended_at: None,
        duration_minutes: 0.0,
        topics_covered: topic.into_iter().collect(),
        total_cards: budget.card_count,
        exercise_count: budget.exercise_count,
        correct_count: 0,
        average_score: 0.0,
    };
    session.total_cards = budget.card_count;

    Ok(ComposedSession { session, items, budget })
}

/// Worked examples always open the session (they are pure exposition, best
/// absorbed before active recall); the remainder is interleaved card/exercise
/// so neither type runs in a long uninterrupted streak.
fn interleave(exercises: Vec<Exercise>, cards: Vec<SpacedRepCard>) -> Vec<SessionItem> {
    let (worked, rest): (Vec<_>, Vec<_>) = exercises.into_iter().partition(|e| matches!(e.exercise_type, crate::content::ExerciseType::WorkedExample));

    let mut out: Vec<SessionItem> = worked.into_iter().map(SessionItem::Exercise).collect();

    let mut rest_iter = rest.into_iter();
    let mut card_iter = cards.into_iter();
    loop {
        let e = rest_iter.next();
        let c = card_iter.next();
        if e.is_none() && c.is_none() {
            break;
        }
        if let Some(c) = c {
            out.push(SessionItem::Card(c));
        }
        if let Some(e) = e {
            out.push(SessionItem::Exercise(e));
        }
    }
    out
}

/// Stamp `ended_at`, `duration_minutes`, and `average_score`; the caller is
/// responsible for triggering mastery recomputation afterward.
pub fn end_session(session: &mut PracticeSession, scored_items: &[f64]) {
    let now = chrono::Utc::now();
    session.ended_at = Some(now);
    session.duration_minutes = (now - session.started_at).num_seconds() as f64 / 60.0;
    session.correct_count = scored_items.iter().filter(|&&s| s >= 0.6).count() as u32;
    session.average_score = if scored_items.is_empty() {
        0.0
    } else {
        scored_items.iter().sum::<f64>() / scored_items.len() as f64
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{CardType, Difficulty, ExerciseType};

    fn card() -> SpacedRepCard {
        SpacedRepCard::new(CardType::Definition, "front", "back")
    }

    fn exercise(exercise_type: ExerciseType, minutes: u32) -> Exercise {
        Exercise {
            id: uuid::Uuid::new_v4(),
            exercise_type,
            topic: "ml".into(),
            difficulty: Difficulty::Intermediate,
            prompt: "prompt".into(),
            hints: vec![],
            expected_key_points: vec![],
            worked_example: None,
            follow_up_problem: None,
            language: None,
            starter_code: None,
            solution_code: None,
            test_cases: vec![],
            buggy_code: None,
            estimated_time_minutes: minutes,
        }
    }

    #[test]
    fn empty_candidates_yields_empty_session_error() {
        let result = compose_session(10.0, SessionType::Both, None, Some("rust".into()), vec![], vec![]);
        assert!(matches!(result, Err(SessionError::EmptySession { .. })));
    }

    #[test]
    fn worked_examples_lead_the_interleaved_order() {
        let cards = vec![card(), card()];
        let exercises = vec![exercise(ExerciseType::WorkedExample, 2), exercise(ExerciseType::Recall, 2)];
        let composed = compose_session(30.0, SessionType::Both, None, None, cards, exercises).unwrap();
        assert!(matches!(composed.items[0], SessionItem::Exercise(ref e) if e.exercise_type == ExerciseType::WorkedExample));
    }

    #[test]
    fn respects_budget_cutoff() {
        let cards: Vec<_> = (0..100).map(|_| card()).collect();
        let composed = compose_session(5.0, SessionType::CardsOnly, None, None, cards, vec![]).unwrap();
        assert!(composed.budget.card_count <= 5);
    }

    #[test]
    fn end_session_stamps_duration_and_average_score() {
        let mut session = PracticeSession {
            id: uuid::Uuid::new_v4(),
            session_type: SessionType::CardsOnly,
            started_at: chrono::Utc::now() - chrono::Duration::minutes(10),
            ended_at: None,
            duration_minutes: 0.0,
            topics_covered: vec![],
            total_cards: 2,
            exercise_count: 0,
            correct_count: 0,
            average_score: 0.0,
        };
        end_session(&mut session, &[1.0, 0.5]);
        assert!(session.ended_at.is_some());
        assert!(session.duration_minutes >= 9.0);
        assert_eq!(session.average_score, 0.75);
        assert_eq!(session.correct_count, 2);
    }
}
