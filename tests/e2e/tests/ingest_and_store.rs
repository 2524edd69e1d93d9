//! End-to-end ingest: a raw text idea goes through `TextIdeaPipeline`, is
//! saved to the content store, and can be loaded back unchanged. A separate
//! case exercises the store's hash-based dedup policy directly.

use marginalia_core::content::{ContentRecord, SourceType};
use marginalia_core::pipeline::{Input, Pipeline, TextIdeaPipeline};
use marginalia_core::store::{ContentStore, SaveOutcome};

#[tokio::test]
async fn text_idea_round_trips_through_store() {
    let store = ContentStore::open_in_memory().unwrap();
    let pipeline = TextIdeaPipeline;

    let output = pipeline.process(Input::TextIdea { text: "Leitner boxes predate FSRS by decades".into() }).await.unwrap();
    let uuid = output.record.content_uuid;

    let outcome = store.save(&output.record).unwrap();
    assert!(matches!(outcome, SaveOutcome::Inserted(saved_uuid) if saved_uuid == uuid));

    let loaded = store.load(uuid).unwrap();
    assert_eq!(loaded.title, "Leitner boxes predate FSRS by decades");
    assert_eq!(loaded.full_text.as_deref(), Some("Leitner boxes predate FSRS by decades"));
    assert_eq!(loaded.source_type, SourceType::Idea);
}

#[test]
fn saving_a_record_with_a_seen_hash_is_deduplicated() {
    let store = ContentStore::open_in_memory().unwrap();

    let mut first = ContentRecord::new(SourceType::Article, "Original Title");
    first.raw_file_hash = Some("deadbeef".to_string());
    let first_uuid = first.content_uuid;
    assert!(matches!(store.save(&first).unwrap(), SaveOutcome::Inserted(_)));

    let mut second = ContentRecord::new(SourceType::Article, "Different Title, Same Bytes");
    second.raw_file_hash = Some("deadbeef".to_string());
    match store.save(&second).unwrap() {
        SaveOutcome::Deduplicated(existing_uuid) => assert_eq!(existing_uuid, first_uuid),
        SaveOutcome::Inserted(_) => panic!("expected dedup on matching raw_file_hash"),
    }
}

#[test]
fn empty_text_idea_is_rejected_before_it_reaches_the_store() {
    use marginalia_core::pipeline::PipelineError;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let pipeline = TextIdeaPipeline;
    let result = rt.block_on(pipeline.process(Input::TextIdea { text: "   \n\t ".into() }));
    assert!(matches!(result, Err(PipelineError::Empty)));
}
