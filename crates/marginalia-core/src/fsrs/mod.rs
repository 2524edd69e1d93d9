//! FSRS (Free Spaced Repetition Scheduler) module.
//!
//! Implements the FSRS-5 formula set for scheduling `SpacedRepCard` reviews:
//! initial stability/difficulty, recall/forget stability updates, retrievability
//! decay, and interval computation with deterministic fuzzing.
//!
//! Reference: https://github.com/open-spaced-repetition/fsrs4anki

mod algorithm;
mod scheduler;

pub use algorithm::{
    factor_for_decay,
    fuzz_interval,
    initial_difficulty,
    initial_difficulty_with_weights,
    initial_stability,
    initial_stability_with_weights,
    next_difficulty,
    next_difficulty_with_weights,
    next_forget_stability,
    next_forget_stability_with_weights,
    next_interval,
    next_interval_with_decay,
    next_recall_stability,
    next_recall_stability_with_weights,
    retrievability,
    retrievability_with_decay,
    same_day_stability,
    same_day_stability_with_weights,
    DEFAULT_DECAY,
    DEFAULT_MAX_INTERVAL,
    DEFAULT_RETENTION,
    FSRS5_WEIGHTS,
    MAX_DIFFICULTY,
    MAX_STABILITY,
    MIN_DIFFICULTY,
    MIN_STABILITY,
};

pub use scheduler::{
    FSRSParameters, FSRSScheduler, FSRSState, LearningState, PreviewResults, Rating, ReviewResult,
};
