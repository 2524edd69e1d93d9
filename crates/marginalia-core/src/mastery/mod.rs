//! Mastery Service (C14): rolls up per-topic practice history into a
//! mastery score, trend classification, weak-spot recommendations, an
//! overview, and a learning-curve forecast.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::content::{CardState, Exercise, ExerciseAttempt, MasterySnapshot, MasteryTrend, SpacedRepCard};

/// Minimum number of attempts before a topic's mastery score is considered
/// meaningful; below this, the topic is reported as `new` rather than scored.
pub const MIN_ATTEMPTS_FOR_MASTERY: u32 = 3;

/// Mastery delta (absolute) below which a trend is reported as `stable`
/// rather than `improving`/`declining`.
const TREND_STABLE_THRESHOLD: f64 = 0.05;

const SUCCESS_RATE_WEIGHT: f64 = 0.6;
const STABILITY_WEIGHT: f64 = 0.4;

/// Stability horizon (days) used to normalize the stability factor into
/// 0..1, clipped at 1.0.
const MASTERY_STABILITY_CEILING_DAYS: f64 = 30.0;

/// One topic's aggregated practice history, gathered by the caller from
/// `ContentStore`/FSRS card state before scoring.
#[derive(Debug, Clone, Default)]
pub struct TopicPractice {
    pub topic_path: String,
    pub attempts: u32,
    pub correct: u32,
    pub average_stability_days: f64,
    pub last_practiced: Option<DateTime<Utc>>,
}

/// mastery_score = 0.6 * success_rate + 0.4 * normalized_stability, gated on
/// a minimum attempt count; below the gate the topic is unscored (`None`).
pub fn mastery_score(practice: &TopicPractice) -> Option<f64> {
    if practice.attempts < MIN_ATTEMPTS_FOR_MASTERY {
        return None;
    }
    let success_rate = practice.correct as f64 / practice.attempts as f64;
    let normalized_stability = (practice.average_stability_days / MASTERY_STABILITY_CEILING_DAYS).min(1.0);
    Some(SUCCESS_RATE_WEIGHT * success_rate + STABILITY_WEIGHT * normalized_stability)
}

/// Compare a new score against the previous snapshot's score to classify
/// trend; `None` previous means the topic has no history to compare and is
/// reported `stable`.
pub fn classify_trend(previous_score: Option<f64>, current_score: f64) -> MasteryTrend {
    match previous_score {
        None => MasteryTrend::Stable,
        Some(prev) => {
            let delta = current_score - prev;
            if delta > TREND_STABLE_THRESHOLD {
                MasteryTrend::Improving
            } else if delta < -TREND_STABLE_THRESHOLD {
                MasteryTrend::Declining
            } else {
                MasteryTrend::Stable
            }
        }
    }
}

pub fn build_snapshot(practice: &TopicPractice, previous_score: Option<f64>, now: DateTime<Utc>) -> MasterySnapshot {
    let score = mastery_score(practice).unwrap_or(0.0);
    let success_rate = if practice.attempts > 0 { Some(practice.correct as f64 / practice.attempts as f64) } else { None };
    let days_since_review = practice.last_practiced.map(|t| (now - t).num_days());
    MasterySnapshot {
        snapshot_date: now,
        topic_path: practice.topic_path.clone(),
        practice_count: practice.attempts,
        success_rate,
        mastery_score: score,
        trend: classify_trend(previous_score, score),
        retention_estimate: success_rate,
        last_practiced: practice.last_practiced,
        days_since_review,
    }
}

/// A weak spot surfaced to the learner, with a recommendation and a
/// suggested next exercise type.
#[derive(Debug, Clone)]
pub struct WeakSpot {
    pub topic_path: String,
    pub mastery_score: f64,
    pub trend: MasteryTrend,
    pub recommendation: String,
    pub suggested_exercise_type: crate::content::ExerciseType,
}

/// Rank topics by weakness: declining trend first, then ascending mastery
/// score, so the topics most in need of attention surface at the top.
pub fn weak_spots(snapshots: &[MasterySnapshot], limit: usize) -> Vec<WeakSpot> {
    let mut ranked: Vec<&MasterySnapshot> = snapshots.iter().collect();
    ranked.sort_by(|a, b| {
        let a_declining = matches!(a.trend, MasteryTrend::Declining);
        let b_declining = matches!(b.trend, MasteryTrend::Declining);
        b_declining
            .cmp(&a_declining)
            .then(a.mastery_score.partial_cmp(&b.mastery_score).unwrap_or(std::cmp::Ordering::Equal))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|snap| {
            let (recommendation, exercise_type) = recommend_for(snap);
            WeakSpot {
                topic_path: snap.topic_path.clone(),
                mastery_score: snap.mastery_score,
                trend: snap.trend,
                recommendation,
                suggested_exercise_type: exercise_type,
            }
        })
        .collect()
}

fn recommend_for(snap: &MasterySnapshot) -> (String, crate::content::ExerciseType) {
    use crate::content::ExerciseType;
    match (snap.trend, snap.mastery_score) {
        (MasteryTrend::Declining, _) => (
            format!("{} is slipping — revisit the core definitions before attempting new exercises", snap.topic_path),
            ExerciseType::Recall,
        ),
        (_, score) if score < 0.3 => (
            format!("{} is still foundational — work through a worked example next", snap.topic_path),
            ExerciseType::WorkedExample,
        ),
        (_, score) if score < 0.6 => (
            format!("{} is developing — apply it with a hands-on exercise", snap.topic_path),
            ExerciseType::CodeImplement,
        ),
        _ => (
            format!("{} is solid — stretch it with a refactor or debugging exercise", snap.topic_path),
            ExerciseType::CodeRefactor,
        ),
    }
}

/// Aggregate dashboard view over all cards and topic snapshots.
#[derive(Debug, Clone)]
pub struct MasteryOverview {
    pub total_cards: u32,
    pub mastered_cards: u32,
    pub learning_cards: u32,
    pub new_cards: u32,
    pub top_topics: Vec<MasterySnapshot>,
    pub average_mastery: f64,
    pub practice_streak_days: u32,
}

/// Build an overview from all cards (fetched once) and per-topic snapshots,
/// taking the top-N snapshots by most recently practiced.
pub fn overview(cards: &[SpacedRepCard], snapshots: &[MasterySnapshot], top_n: usize) -> MasteryOverview {
    let mut mastered = 0;
    let mut learning = 0;
    let mut new = 0;
    for card in cards {
        match card.state {
            CardState::New => new += 1,
            CardState::Review if card.stability.unwrap_or(0.0) >= MASTERY_STABILITY_CEILING_DAYS => mastered += 1,
            _ => learning += 1,
        }
    }

    let mut ranked: Vec<MasterySnapshot> = snapshots.to_vec();
    ranked.sort_by(|a, b| b.snapshot_date.cmp(&a.snapshot_date));
    ranked.truncate(top_n);

    let average_mastery = if snapshots.is_empty() {
        0.0
    } else {
        snapshots.iter().map(|s| s.mastery_score).sum::<f64>() / snapshots.len() as f64
    };

    MasteryOverview {
        total_cards: cards.len() as u32,
        mastered_cards: mastered,
        learning_cards: learning,
        new_cards: new,
        top_topics: ranked,
        average_mastery,
        practice_streak_days: practice_streak(cards),
    }
}

/// Consecutive days (ending today) on which at least one card was reviewed.
fn practice_streak(cards: &[SpacedRepCard]) -> u32 {
    let mut days: std::collections::BTreeSet<chrono::NaiveDate> = std::collections::BTreeSet::new();
    for card in cards {
        if let Some(reviewed) = card.last_reviewed {
            days.insert(reviewed.date_naive());
        }
    }
    let today = Utc::now().date_naive();
    let mut streak = 0;
    let mut cursor = today;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= chrono::Duration::days(1);
    }
    streak
}

/// A single point in a topic's learning curve.
#[derive(Debug, Clone)]
pub struct LearningCurvePoint {
    pub date: chrono::NaiveDate,
    pub mastery_score: f64,
}

/// Linear-extrapolation forecast: fit a line through the snapshot history
/// and project `forecast_days` forward. Returns `None` with fewer than two
/// points (a line needs two).
pub fn learning_curve_forecast(history: &[LearningCurvePoint], forecast_days: i64) -> Option<LearningCurvePoint> {
    if history.len() < 2 {
        return None;
    }
    let first_date = history[0].date;
    let xs: Vec<f64> = history.iter().map(|p| (p.date - first_date).num_days() as f64).collect();
    let ys: Vec<f64> = history.iter().map(|p| p.mastery_score).collect();

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return Some(LearningCurvePoint { date: history.last().unwrap().date, mastery_score: ys.last().copied().unwrap_or(0.0) });
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    let target_x = xs.last().unwrap() + forecast_days as f64;
    let forecast_score = (intercept + slope * target_x).clamp(0.0, 1.0);
    Some(LearningCurvePoint {
        date: first_date + chrono::Duration::days(target_x as i64),
        mastery_score: forecast_score,
    })
}

/// Group exercise attempts by their exercise's topic, for batched
/// in-memory aggregation ahead of `mastery_score`/`build_snapshot`.
pub fn group_attempts_by_topic<'a>(exercises: &'a [Exercise], attempts: &'a [ExerciseAttempt]) -> BTreeMap<&'a str, Vec<&'a ExerciseAttempt>> {
    let topic_by_id: BTreeMap<uuid::Uuid, &str> = exercises.iter().map(|e| (e.id, e.topic.as_str())).collect();
    let mut grouped: BTreeMap<&str, Vec<&ExerciseAttempt>> = BTreeMap::new();
    for attempt in attempts {
        if let Some(topic) = topic_by_id.get(&attempt.exercise_id) {
            grouped.entry(topic).or_default().push(attempt);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn practice(attempts: u32, correct: u32, stability: f64) -> TopicPractice {
        TopicPractice { topic_path: "ml/rl".into(), attempts, correct, average_stability_days: stability, last_practiced: Some(Utc::now()) }
    }

    #[test]
    fn below_minimum_attempts_is_unscored() {
        assert_eq!(mastery_score(&practice(2, 2, 90.0)), None);
    }

    #[test]
    fn mastery_score_blends_success_rate_and_stability() {
        let score = mastery_score(&practice(10, 8, 15.0)).unwrap();
        assert!((score - (0.6 * 0.8 + 0.4 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn trend_classifies_improving_declining_stable() {
        assert_eq!(classify_trend(Some(0.5), 0.7), MasteryTrend::Improving);
        assert_eq!(classify_trend(Some(0.7), 0.5), MasteryTrend::Declining);
        assert_eq!(classify_trend(Some(0.5), 0.51), MasteryTrend::Stable);
        assert_eq!(classify_trend(None, 0.5), MasteryTrend::Stable);
    }

    #[test]
    fn weak_spots_ranks_declining_first_then_ascending_mastery() {
        let now = Utc::now();
        let snaps = vec![
            MasterySnapshot { snapshot_date: now, topic_path: "a".into(), practice_count: 5, success_rate: Some(0.9), mastery_score: 0.9, trend: MasteryTrend::Stable, retention_estimate: None, last_practiced: None, days_since_review: None },
            MasterySnapshot { snapshot_date: now, topic_path: "b".into(), practice_count: 5, success_rate: Some(0.4), mastery_score: 0.4, trend: MasteryTrend::Declining, retention_estimate: None, last_practiced: None, days_since_review: None },
            MasterySnapshot { snapshot_date: now, topic_path: "c".into(), practice_count: 5, success_rate: Some(0.2), mastery_score: 0.2, trend: MasteryTrend::Stable, retention_estimate: None, last_practiced: None, days_since_review: None },
        ];
        let spots = weak_spots(&snaps, 3);
        assert_eq!(spots[0].topic_path, "b");
        assert_eq!(spots[1].topic_path, "c");
        assert_eq!(spots[2].topic_path, "a");
    }

    #[test]
    fn learning_curve_forecast_extrapolates_linearly() {
        let history = vec![
            LearningCurvePoint { date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), mastery_score: 0.2 },
            LearningCurvePoint { date: chrono::NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(), mastery_score: 0.4 },
        ];
        let forecast = learning_curve_forecast(&history, 10).unwrap();
        assert!((forecast.mastery_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn learning_curve_forecast_requires_two_points() {
        let history = vec![LearningCurvePoint { date: Utc::now().date_naive(), mastery_score: 0.5 }];
        assert!(learning_curve_forecast(&history, 7).is_none());
    }
}
