//! Card & Exercise Generators (C12): derives `SpacedRepCard`s from concepts,
//! generates on-demand topic cards, and generates exercises matched to a
//! learner's current mastery level.

pub mod evaluator;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{CardType, Concept, Difficulty, Exercise, ExerciseType, SpacedRepCard};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeneratorError {
    #[error("LLM collaborator call failed: {0}")]
    Llm(String),
    #[error("LLM output failed schema validation: {0}")]
    InvalidOutput(String),
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Varied-type card suggestion, as requested from and returned by the LLM
/// collaborator for on-demand topic generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedCard {
    pub card_type: CardType,
    pub front: String,
    pub back: String,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedExercise {
    pub exercise_type: ExerciseType,
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
}

impl GeneratedExercise {
    /// Reject LLM output missing fields a given exercise type requires: code
    /// types need at minimum `solution_code`; all types need a non-empty
    /// prompt.
    fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GeneratorError::InvalidOutput("prompt is empty".into()));
        }
        if self.exercise_type.is_code() && self.solution_code.as_deref().unwrap_or("").trim().is_empty() {
            return Err(GeneratorError::InvalidOutput("code exercise missing solution_code".into()));
        }
        Ok(())
    }
}

/// Abstraction over whatever LLM provider backs generation; pipelines and
/// the orchestrator supply a concrete implementation.
#[async_trait]
pub trait LlmCollaborator: Send + Sync {
    async fn generate_cards(&self, topic: &str, context: &str, count: u32) -> Result<Vec<GeneratedCard>>;
    async fn generate_exercise(&self, topic: &str, context: &str, exercise_type: ExerciseType, difficulty: Difficulty) -> Result<GeneratedExercise>;
}

/// Number of example/misconception cards emitted per concept, capped.
const MAX_EXAMPLE_CARDS: usize = 2;
const MAX_MISCONCEPTION_CARDS: usize = 2;
/// Minimum related-concept count before a `properties` card is emitted.
const PROPERTIES_CARD_THRESHOLD: usize = 3;

/// Emit the standard card set for one concept: a `definition` card always,
/// a `why-it-matters` card if the concept carries that context, up to
/// `MAX_EXAMPLE_CARDS` `example` cards, up to `MAX_MISCONCEPTION_CARDS`
/// `misconception` cards, and a `properties` card when the concept has
/// enough related concepts to make one worthwhile.
///
/// Cards inherit `content_tags` and start `new`, due now.
pub fn cards_from_concept(concept: &Concept, content_tags: &[String], examples: &[String], misconceptions: &[(String, String)]) -> Vec<SpacedRepCard> {
    let mut cards = Vec::new();

    if let Some(definition) = &concept.definition {
        cards.push(base_card(CardType::Definition, format!("What is {}?", concept.name), definition.clone(), concept, content_tags));
    }

    for example in examples.iter().take(MAX_EXAMPLE_CARDS) {
        cards.push(base_card(
            CardType::Example,
            format!("Give an example of {}.", concept.name),
            example.clone(),
            concept,
            content_tags,
        ));
    }

    for (claim, correction) in misconceptions.iter().take(MAX_MISCONCEPTION_CARDS) {
        cards.push(base_card(CardType::Misconception, format!("True or false: {claim}"), correction.clone(), concept, content_tags));
    }

    if concept.related_concepts.len() >= PROPERTIES_CARD_THRESHOLD {
        let properties = concept
            .related_concepts
            .iter()
            .map(|r| format!("{} ({})", r.target_name, r.relationship_type))
            .collect::<Vec<_>>()
            .join("; ");
        cards.push(base_card(
            CardType::Properties,
            format!("What are the key properties/relations of {}?", concept.name),
            properties,
            concept,
            content_tags,
        ));
    }

    cards
}

fn base_card(card_type: CardType, front: String, back: String, concept: &Concept, content_tags: &[String]) -> SpacedRepCard {
    let mut card = SpacedRepCard::new(card_type, front, back);
    card.tags = content_tags.to_vec();
    card.source_concept = Some(concept.canonical_name.clone());
    card.due_date = Utc::now();
    card
}

/// Map a free-text difficulty keyword (as an LLM might emit it) onto the
/// scheduler's `Difficulty` enum.
pub fn parse_difficulty_keyword(keyword: &str) -> Difficulty {
    match keyword.to_lowercase().as_str() {
        "beginner" | "basic" | "foundational" | "easy" => Difficulty::Foundational,
        "advanced" | "hard" | "expert" => Difficulty::Advanced,
        _ => Difficulty::Intermediate,
    }
}

/// Request `count` varied-type cards for a topic from the LLM collaborator,
/// using `context` gathered by the caller (title/summary matches from
/// ContentStore plus existing exercises), and tag them with `topic`.
pub async fn generate_topic_cards(llm: &dyn LlmCollaborator, topic: &str, context: &str, count: u32) -> Result<Vec<SpacedRepCard>> {
    let generated = llm.generate_cards(topic, context, count).await?;
    Ok(generated
        .into_iter()
        .map(|g| {
            let mut card = SpacedRepCard::new(g.card_type, g.front, g.back);
            card.hints = g.hints;
            card.tags = vec![topic.to_string()];
            card.due_date = Utc::now();
            card
        })
        .collect())
}

/// Coarse mastery bucket driving exercise-type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasteryLevel {
    Novice,
    Intermediate,
    Advanced,
}

impl MasteryLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            Self::Novice
        } else if score < 0.7 {
            Self::Intermediate
        } else {
            Self::Advanced
        }
    }

    /// The exercise types appropriate at this mastery level, in preference
    /// order.
    fn candidate_types(&self) -> &'static [ExerciseType] {
        match self {
            Self::Novice => &[ExerciseType::WorkedExample],
            Self::Intermediate => &[ExerciseType::Recall, ExerciseType::CodeImplement, ExerciseType::CodeComplete],
            Self::Advanced => &[ExerciseType::CodeDebug, ExerciseType::CodeRefactor, ExerciseType::CodeExplain],
        }
    }
}

/// Generate one exercise appropriate to `mastery`, validate the LLM's
/// output against the schema (non-empty prompt; code types require
/// `solution_code`), and build the persisted `Exercise`.
pub async fn generate_exercise(
    llm: &dyn LlmCollaborator,
    topic: &str,
    context: &str,
    mastery: MasteryLevel,
    difficulty: Difficulty,
    preferred_type: Option<ExerciseType>,
) -> Result<Exercise> {
    let exercise_type = preferred_type.unwrap_or_else(|| mastery.candidate_types()[0]);
    let generated = llm.generate_exercise(topic, context, exercise_type, difficulty).await?;
    generated.validate()?;

    Ok(Exercise {
        id: uuid::Uuid::new_v4(),
        exercise_type: generated.exercise_type,
        topic: topic.to_string(),
        difficulty,
        prompt: generated.prompt,
        hints: generated.hints,
        expected_key_points: generated.expected_key_points,
        worked_example: generated.worked_example,
        follow_up_problem: generated.follow_up_problem,
        language: generated.language,
        starter_code: generated.starter_code,
        solution_code: generated.solution_code,
        test_cases: generated.test_cases,
        buggy_code: generated.buggy_code,
        estimated_time_minutes: estimate_minutes(exercise_type),
    })
}

fn estimate_minutes(exercise_type: ExerciseType) -> u32 {
    match exercise_type {
        ExerciseType::WorkedExample => 3,
        ExerciseType::Recall => 2,
        ExerciseType::CodeImplement | ExerciseType::CodeRefactor => 12,
        ExerciseType::CodeComplete | ExerciseType::CodeDebug => 8,
        ExerciseType::CodeExplain => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Importance, RelatedConcept, RelationshipType};

    fn concept() -> Concept {
        Concept {
            id: uuid::Uuid::new_v4(),
            name: "Behavior Cloning".into(),
            canonical_name: "behavior cloning".into(),
            aliases: Default::default(),
            definition: Some("Supervised imitation of expert trajectories.".into()),
            importance: Importance::Core,
            embedding: None,
            related_concepts: vec![],
        }
    }

    #[test]
    fn definition_card_always_emitted_when_definition_present() {
        let cards = cards_from_concept(&concept(), &["ml".to_string()], &[], &[]);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].card_type, CardType::Definition);
        assert!(cards[0].is_new());
        assert_eq!(cards[0].tags, vec!["ml".to_string()]);
    }

    #[test]
    fn properties_card_only_above_threshold() {
        let mut c = concept();
        c.related_concepts = vec![
            RelatedConcept { target_name: "DAgger".into(), relationship_type: RelationshipType::Extends },
            RelatedConcept { target_name: "IRL".into(), relationship_type: RelationshipType::RelatesTo },
        ];
        assert_eq!(cards_from_concept(&c, &[], &[], &[]).len(), 1); // below threshold, no properties card

        c.related_concepts.push(RelatedConcept { target_name: "GAIL".into(), relationship_type: RelationshipType::RelatesTo });
        let cards = cards_from_concept(&c, &[], &[], &[]);
        assert!(cards.iter().any(|c| c.card_type == CardType::Properties));
    }

    #[test]
    fn example_and_misconception_cards_are_capped() {
        let examples: Vec<String> = (0..5).map(|i| format!("example {i}")).collect();
        let misconceptions: Vec<(String, String)> = (0..5).map(|i| (format!("claim {i}"), format!("correction {i}"))).collect();
        let cards = cards_from_concept(&concept(), &[], &examples, &misconceptions);
        assert_eq!(cards.iter().filter(|c| c.card_type == CardType::Example).count(), MAX_EXAMPLE_CARDS);
        assert_eq!(cards.iter().filter(|c| c.card_type == CardType::Misconception).count(), MAX_MISCONCEPTION_CARDS);
    }

    #[test]
    fn difficulty_keyword_mapping() {
        assert_eq!(parse_difficulty_keyword("Beginner"), Difficulty::Foundational);
        assert_eq!(parse_difficulty_keyword("expert"), Difficulty::Advanced);
        assert_eq!(parse_difficulty_keyword("whatever"), Difficulty::Intermediate);
    }

    #[test]
    fn mastery_level_buckets_from_score() {
        assert_eq!(MasteryLevel::from_score(0.1), MasteryLevel::Novice);
        assert_eq!(MasteryLevel::from_score(0.5), MasteryLevel::Intermediate);
        assert_eq!(MasteryLevel::from_score(0.9), MasteryLevel::Advanced);
    }

    #[test]
    fn generated_exercise_validation_rejects_empty_prompt() {
        let bad = GeneratedExercise {
            exercise_type: ExerciseType::Recall,
            prompt: "   ".into(),
            hints: vec![],
            expected_key_points: vec![],
            worked_example: None,
            follow_up_problem: None,
            language: None,
            starter_code: None,
            solution_code: None,
            test_cases: vec![],
            buggy_code: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn generated_exercise_validation_requires_solution_code_for_code_types() {
        let bad = GeneratedExercise {
            exercise_type: ExerciseType::CodeImplement,
            prompt: "implement X".into(),
            hints: vec![],
            expected_key_points: vec![],
            worked_example: None,
            follow_up_problem: None,
            language: Some("rust".into()),
            starter_code: Some("fn x() {}".into()),
            solution_code: None,
            test_cases: vec![],
            buggy_code: None,
        };
        assert!(bad.validate().is_err());
    }
}
