//! Wikilink extraction round-trip: every supported `[[...]]` syntax resolves
//! to the bare target, in first-appearance order, deduplicated.

use marginalia_core::reconcile::{extract_inline_tags, extract_wikilinks};

#[test]
fn plain_wikilink_extracts_bare_target() {
    let body = "See [[Spaced Repetition]] for background.";
    assert_eq!(extract_wikilinks(body), vec!["Spaced Repetition"]);
}

#[test]
fn aliased_wikilink_extracts_target_not_alias() {
    let body = "See [[Spaced Repetition|the SR algorithm]] for background.";
    assert_eq!(extract_wikilinks(body), vec!["Spaced Repetition"]);
}

#[test]
fn header_anchored_wikilink_drops_the_anchor() {
    let body = "See [[Spaced Repetition#Forgetting Curve]] and [[Spaced Repetition#^block123]].";
    assert_eq!(extract_wikilinks(body), vec!["Spaced Repetition"]);
}

#[test]
fn embed_wikilink_resolves_like_a_plain_link() {
    let body = "![[diagram.png]]\n\nSome text.";
    assert_eq!(extract_wikilinks(body), vec!["diagram.png"]);
}

#[test]
fn duplicate_targets_are_deduplicated_in_first_appearance_order() {
    let body = "[[B]] then [[A]] then [[B]] again then [[A|alias]].";
    assert_eq!(extract_wikilinks(body), vec!["B", "A"]);
}

#[test]
fn unterminated_link_is_ignored_without_panicking() {
    let body = "oops [[no closing brackets here";
    assert!(extract_wikilinks(body).is_empty());
}

#[test]
fn inline_tags_ignore_markdown_headers_and_wikilinked_anchors() {
    let body = "# Heading\n\nBody with #concept/fsrs and a link to [[Note#Section]].\n\n## Another Heading\n";
    let tags = extract_inline_tags(body);
    assert!(tags.contains("concept/fsrs"));
    assert!(!tags.iter().any(|t| t == "Heading" || t == "Another Heading" || t == "Section"));
}
