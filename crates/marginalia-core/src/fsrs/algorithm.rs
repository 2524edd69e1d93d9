//! Core FSRS formulas: retrievability, stability/difficulty updates, interval scheduling.
//!
//! Reference: https://github.com/open-spaced-repetition/fsrs4anki (FSRS-5 weight layout).

/// Minimum allowed difficulty (1 = easiest).
pub const MIN_DIFFICULTY: f64 = 1.0;
/// Maximum allowed difficulty (10 = hardest).
pub const MAX_DIFFICULTY: f64 = 10.0;
/// Minimum allowed stability, in days.
pub const MIN_STABILITY: f64 = 0.01;
/// Maximum allowed stability, in days (caps runaway intervals).
pub const MAX_STABILITY: f64 = 36500.0;

/// Default desired retention used when a caller doesn't configure one.
pub const DEFAULT_RETENTION: f64 = 0.9;
/// Default cap on scheduled intervals, in days.
pub const DEFAULT_MAX_INTERVAL: u32 = 365;

/// Default FSRS-5 weight vector (19 parameters), as published by the
/// open-spaced-repetition project. Indices:
/// `w[0..4)`  initial stability per rating (Again, Hard, Good, Easy)
/// `w[4]`, `w[5]`  initial difficulty
/// `w[6]`, `w[7]`  difficulty update / mean reversion
/// `w[8..11)` recall-stability growth
/// `w[11..15)` forget-stability (post-lapse)
/// `w[15]`, `w[16]` hard-penalty / easy-bonus multipliers
/// `w[17]`, `w[18]` same-day (short-term) stability adjustment
pub const FSRS5_WEIGHTS: [f64; 19] = [
    0.4072, 1.1829, 3.1262, 15.4722, 7.2102, 0.5316, 1.0651, 0.0234, 1.616, 0.1544, 1.0824,
    1.9813, 0.0953, 0.2975, 2.2042, 0.2407, 2.9466, 0.5034, 0.6567,
];

/// A 1-indexed rating, matching Again=1, Hard=2, Good=3, Easy=4.
fn rating_index(rating: u8) -> usize {
    (rating.clamp(1, 4) - 1) as usize
}

/// Initial stability (days) for a first review with the given rating.
pub fn initial_stability(rating: u8) -> f64 {
    initial_stability_with_weights(rating, &FSRS5_WEIGHTS)
}

pub fn initial_stability_with_weights(rating: u8, w: &[f64; 19]) -> f64 {
    w[rating_index(rating)].clamp(MIN_STABILITY, MAX_STABILITY)
}

/// Initial difficulty for a first review with the given rating.
pub fn initial_difficulty(rating: u8) -> f64 {
    initial_difficulty_with_weights(rating, &FSRS5_WEIGHTS)
}

pub fn initial_difficulty_with_weights(rating: u8, w: &[f64; 19]) -> f64 {
    let g = rating.clamp(1, 4) as f64;
    let d0 = w[4] - (w[5] * (g - 1.0)).exp() + 1.0;
    d0.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Difficulty after a review, applying linear damping + mean reversion toward
/// the initial difficulty of an `Easy` first review.
pub fn next_difficulty(difficulty: f64, rating: u8) -> f64 {
    next_difficulty_with_weights(difficulty, rating, &FSRS5_WEIGHTS)
}

pub fn next_difficulty_with_weights(difficulty: f64, rating: u8, w: &[f64; 19]) -> f64 {
    let g = rating.clamp(1, 4) as f64;
    let delta = -w[6] * (g - 3.0);
    let damped = difficulty + delta * (10.0 - difficulty) / 9.0;
    let easy_anchor = initial_difficulty_with_weights(4, w);
    let reverted = w[7] * easy_anchor + (1.0 - w[7]) * damped;
    reverted.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Retrievability at elapsed `days` for a card with the given stability,
/// using the default decay exponent.
pub fn retrievability(days: f64, stability: f64) -> f64 {
    retrievability_with_decay(days, stability, DEFAULT_DECAY)
}

/// FSRS decay exponent (negative; matches the published FSRS-5 forgetting curve).
pub const DEFAULT_DECAY: f64 = -0.5;

/// `FACTOR` such that `R(S, S) == 0.9` when `decay == DEFAULT_DECAY`.
pub fn factor_for_decay(decay: f64) -> f64 {
    0.9f64.powf(1.0 / decay) - 1.0
}

/// Retrievability with an explicit decay exponent.
pub fn retrievability_with_decay(days: f64, stability: f64, decay: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    let days = days.max(0.0);
    let factor = factor_for_decay(decay);
    (1.0 + factor * days / stability).powf(decay).clamp(0.0, 1.0)
}

/// Recall-state stability growth (successful review, rating != Again).
pub fn next_recall_stability(difficulty: f64, stability: f64, retrievability: f64, rating: u8) -> f64 {
    next_recall_stability_with_weights(difficulty, stability, retrievability, rating, &FSRS5_WEIGHTS)
}

pub fn next_recall_stability_with_weights(
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    rating: u8,
    w: &[f64; 19],
) -> f64 {
    let hard_penalty = if rating == 2 { w[15] } else { 1.0 };
    let easy_bonus = if rating == 4 { w[16] } else { 1.0 };
    let growth = (w[8]).exp()
        * (11.0 - difficulty)
        * stability.powf(-w[9])
        * (((1.0 - retrievability) * w[10]).exp() - 1.0)
        * hard_penalty
        * easy_bonus;
    (stability * (1.0 + growth)).clamp(MIN_STABILITY, MAX_STABILITY)
}

/// Post-lapse ("forget") stability after an `Again` rating on a review-state card.
pub fn next_forget_stability(difficulty: f64, stability: f64, retrievability: f64) -> f64 {
    next_forget_stability_with_weights(difficulty, stability, retrievability, &FSRS5_WEIGHTS)
}

pub fn next_forget_stability_with_weights(
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    w: &[f64; 19],
) -> f64 {
    let s = w[11]
        * difficulty.powf(-w[12])
        * (((stability + 1.0).powf(w[13])) - 1.0)
        * ((1.0 - retrievability) * w[14]).exp();
    s.min(stability).clamp(MIN_STABILITY, MAX_STABILITY)
}

/// Stability adjustment for a second review on the same calendar day.
pub fn same_day_stability(stability: f64, rating: u8) -> f64 {
    same_day_stability_with_weights(stability, rating, &FSRS5_WEIGHTS)
}

pub fn same_day_stability_with_weights(stability: f64, rating: u8, w: &[f64; 19]) -> f64 {
    let g = rating.clamp(1, 4) as f64;
    (stability * (w[17] * (g - 3.0 + w[18])).exp()).clamp(MIN_STABILITY, MAX_STABILITY)
}

/// Interval (days) to schedule so that retrievability decays to `desired_retention`
/// by the due date, capped at `maximum_interval`.
pub fn next_interval(stability: f64, desired_retention: f64, maximum_interval: u32) -> u32 {
    next_interval_with_decay(stability, desired_retention, maximum_interval, DEFAULT_DECAY)
}

pub fn next_interval_with_decay(
    stability: f64,
    desired_retention: f64,
    maximum_interval: u32,
    decay: f64,
) -> u32 {
    let factor = factor_for_decay(decay);
    let raw = (stability / factor) * (desired_retention.powf(1.0 / decay) - 1.0);
    let days = raw.round().max(1.0) as u32;
    days.min(maximum_interval.max(1))
}

/// Deterministic ±5% fuzz applied to an interval, seeded from the card id so the
/// same card always lands on the same fuzzed day (keeps review load balanced
/// without making scheduling non-reproducible in tests).
pub fn fuzz_interval(interval: u32, seed: &str) -> u32 {
    if interval < 3 {
        return interval;
    }
    let hash: u32 = seed.bytes().fold(2166136261u32, |acc, b| {
        (acc ^ b as u32).wrapping_mul(16777619)
    });
    let span = (interval as f64 * 0.05).max(1.0) as i64;
    let offset = (hash as i64 % (2 * span + 1)) - span;
    (interval as i64 + offset).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrievability_is_one_at_zero_elapsed() {
        assert!((retrievability(0.0, 10.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn retrievability_decreases_with_time() {
        let r1 = retrievability(1.0, 10.0);
        let r10 = retrievability(10.0, 10.0);
        let r100 = retrievability(100.0, 10.0);
        assert!(r1 > r10);
        assert!(r10 > r100);
    }

    #[test]
    fn retrievability_at_stability_equals_default_retention() {
        let r = retrievability(10.0, 10.0);
        assert!((r - DEFAULT_RETENTION).abs() < 1e-6);
    }

    #[test]
    fn next_interval_roughly_matches_stability_at_default_retention() {
        let interval = next_interval(10.0, 0.9, 365);
        assert!((interval as f64 - 10.0).abs() <= 1.0);
    }

    #[test]
    fn next_interval_respects_maximum() {
        let interval = next_interval(10_000.0, 0.9, 365);
        assert_eq!(interval, 365);
    }

    #[test]
    fn recall_stability_grows_with_good_rating() {
        let d = 5.0;
        let s = 10.0;
        let r = retrievability(10.0, s);
        let grown = next_recall_stability(d, s, r, 3);
        assert!(grown > s);
    }

    #[test]
    fn forget_stability_never_exceeds_prior_stability() {
        let d = 5.0;
        let s = 10.0;
        let r = retrievability(10.0, s);
        let shrunk = next_forget_stability(d, s, r);
        assert!(shrunk <= s);
    }

    #[test]
    fn fuzz_interval_is_deterministic() {
        let a = fuzz_interval(30, "card-1");
        let b = fuzz_interval(30, "card-1");
        assert_eq!(a, b);
    }
}
