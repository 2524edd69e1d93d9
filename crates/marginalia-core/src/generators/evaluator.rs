//! Scores a learner's `ExerciseAttempt` against an `Exercise`. Code exercises
//! weight automated test results more heavily than the LLM's judgment of
//! quality; other exercise types are scored purely from the LLM.

use crate::content::{Exercise, ExerciseAttempt};

/// Weight given to the test pass rate when scoring a code exercise with
/// test results available.
const CODE_TEST_WEIGHT: f64 = 0.7;
const CODE_LLM_WEIGHT: f64 = 0.3;

/// Score below which a response is classified incorrect.
pub const CORRECT_THRESHOLD: f64 = 0.6;

const LLM_SCORE_MIN: f64 = 1.0;
const LLM_SCORE_MAX: f64 = 5.0;
const LLM_SCORE_DEFAULT: f64 = 3.0;

/// Normalize a 1-5 LLM rubric score to `0.0..=1.0`; `None` defaults to the
/// rubric's midpoint.
pub fn normalize_llm_score(llm_score: Option<f64>) -> f64 {
    let score = llm_score.unwrap_or(LLM_SCORE_DEFAULT).clamp(LLM_SCORE_MIN, LLM_SCORE_MAX);
    (score - LLM_SCORE_MIN) / (LLM_SCORE_MAX - LLM_SCORE_MIN)
}

fn test_pass_rate(tests_passed: Option<u32>, tests_total: Option<u32>) -> Option<f64> {
    let total = tests_total.filter(|t| *t > 0)?;
    Some(tests_passed.unwrap_or(0) as f64 / total as f64)
}

/// Weighted combination of test results and LLM assessment; falls back to
/// the LLM score alone when no tests ran.
fn code_score(llm_score: f64, test_score: Option<f64>) -> f64 {
    match test_score {
        Some(test_score) => test_score * CODE_TEST_WEIGHT + llm_score * CODE_LLM_WEIGHT,
        None => llm_score,
    }
}

/// Score one attempt. `raw_llm_score` is the LLM's 1-5 rating of the
/// response; `tests_passed`/`tests_total` are only meaningful for code
/// exercise types.
pub fn score_attempt(exercise: &Exercise, raw_llm_score: Option<f64>, tests_passed: Option<u32>, tests_total: Option<u32>) -> (f64, bool) {
    let llm_score = normalize_llm_score(raw_llm_score);
    let score = if exercise.exercise_type.is_code() {
        code_score(llm_score, test_pass_rate(tests_passed, tests_total))
    } else {
        llm_score
    };
    (score, score >= CORRECT_THRESHOLD)
}

/// Build a persisted `ExerciseAttempt` from a learner's submission and its
/// computed score.
#[allow(clippy::too_many_arguments)]
pub fn build_attempt(
    exercise: &Exercise,
    response: Option<String>,
    response_code: Option<String>,
    raw_llm_score: Option<f64>,
    tests_passed: Option<u32>,
    tests_total: Option<u32>,
    feedback: Option<String>,
    covered_points: Vec<String>,
    missing_points: Vec<String>,
    misconceptions: Vec<String>,
    confidence_before: Option<u8>,
    confidence_after: Option<u8>,
    time_spent_seconds: u32,
) -> ExerciseAttempt {
    let (score, is_correct) = score_attempt(exercise, raw_llm_score, tests_passed, tests_total);
    ExerciseAttempt {
        id: uuid::Uuid::new_v4(),
        exercise_id: exercise.id,
        response,
        response_code,
        score,
        is_correct,
        feedback,
        covered_points,
        missing_points,
        misconceptions,
        tests_passed,
        tests_total,
        confidence_before,
        confidence_after,
        time_spent_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Difficulty, ExerciseType};

    fn exercise(exercise_type: ExerciseType) -> Exercise {
        Exercise {
            id: uuid::Uuid::new_v4(),
            exercise_type,
            topic: "recursion".into(),
            difficulty: Difficulty::Intermediate,
            prompt: "implement factorial".into(),
            hints: vec![],
            expected_key_points: vec![],
            worked_example: None,
            follow_up_problem: None,
            language: Some("rust".into()),
            starter_code: None,
            solution_code: Some("fn f() {}".into()),
            test_cases: vec![],
            buggy_code: None,
            estimated_time_minutes: 10,
        }
    }

    #[test]
    fn normalizes_llm_rubric_to_unit_interval() {
        assert_eq!(normalize_llm_score(Some(4.0)), 0.75);
        assert_eq!(normalize_llm_score(None), 0.5);
        assert_eq!(normalize_llm_score(Some(1.0)), 0.0);
    }

    #[test]
    fn code_score_blends_tests_and_llm_when_tests_present() {
        let ex = exercise(ExerciseType::CodeImplement);
        let (score, correct) = score_attempt(&ex, Some(4.0), Some(4), Some(4));
        assert!((score - (1.0 * CODE_TEST_WEIGHT + 0.75 * CODE_LLM_WEIGHT)).abs() < 1e-9);
        assert!(correct);
    }

    #[test]
    fn code_score_falls_back_to_llm_only_without_tests() {
        let ex = exercise(ExerciseType::CodeImplement);
        let (score, _) = score_attempt(&ex, Some(4.0), None, None);
        assert_eq!(score, 0.75);
    }

    #[test]
    fn non_code_exercise_scored_purely_from_llm() {
        let ex = exercise(ExerciseType::Recall);
        let (score, correct) = score_attempt(&ex, Some(2.0), Some(0), Some(5));
        assert_eq!(score, 0.25);
        assert!(!correct);
    }
}
