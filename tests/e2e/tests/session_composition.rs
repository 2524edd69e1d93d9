//! End-to-end session composition: a pool of due cards, fed through
//! `compose_session` with a small time budget, yields a session capped by
//! that budget rather than one containing every due card.

use marginalia_core::content::{CardType, SessionType, SpacedRepCard};
use marginalia_core::session::{compose_session, SessionItem};

fn due_card(front: &str) -> SpacedRepCard {
    SpacedRepCard::new(CardType::Definition, front, "back")
}

#[test]
fn session_is_capped_by_the_requested_time_budget() {
    let cards: Vec<_> = (0..50).map(|i| due_card(&format!("card {i}"))).collect();

    let composed = compose_session(10.0, SessionType::CardsOnly, None, None, cards, Vec::new()).unwrap();

    assert!(composed.budget.card_count <= 10, "a 10 minute budget at ~1 minute/card should not admit 50 cards");
    assert_eq!(composed.items.len(), composed.budget.card_count as usize);
    assert!(composed.items.iter().all(|item| matches!(item, SessionItem::Card(_))));
}

#[test]
fn topic_filtering_happens_before_composition_and_can_empty_the_pool() {
    let mut rust_card = due_card("what is ownership");
    rust_card.tags = vec!["rust".to_string()];
    let mut other_card = due_card("what is a monad");
    other_card.tags = vec!["haskell".to_string()];

    let due_cards: Vec<_> = vec![rust_card, other_card].into_iter().filter(|c| c.tags.iter().any(|t| t == "rust")).collect();

    let composed = compose_session(20.0, SessionType::CardsOnly, None, Some("rust".into()), due_cards, Vec::new()).unwrap();
    assert_eq!(composed.items.len(), 1);
    assert!(matches!(&composed.items[0], SessionItem::Card(c) if c.front == "what is ownership"));
}

#[test]
fn no_due_cards_and_no_exercises_is_an_explicit_error() {
    use marginalia_core::session::SessionError;

    let result = compose_session(15.0, SessionType::CardsOnly, None, Some("topology".into()), Vec::new(), Vec::new());
    assert!(matches!(result, Err(SessionError::EmptySession { topic }) if topic.as_deref() == Some("topology")));
}
