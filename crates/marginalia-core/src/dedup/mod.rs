//! Concept Deduplicator (C8): canonical-name normalization and a batch
//! merge pass over concept nodes that share a canonical name.

use std::collections::BTreeSet;

use tracing::warn;

use crate::graph::{GraphStore, NodeId};

/// Lowercase, strip parenthesized aliases, and collapse whitespace, e.g.
/// `"Behavior Cloning (BC)"` -> `"behavior cloning"`.
pub fn canonical_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0u32;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Extract the parenthesized tokens of `raw` as additional alias names, e.g.
/// `"Behavior Cloning (BC) (imitation learning)"` -> `["BC", "imitation
/// learning"]`.
pub fn extract_aliases(raw: &str) -> Vec<String> {
    let mut aliases = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    for c in raw.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth == 1 {
                    current.clear();
                }
            }
            ')' => {
                if depth == 1 {
                    let trimmed = current.trim();
                    if !trimmed.is_empty() {
                        aliases.push(trimmed.to_string());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            _ if depth >= 1 => current.push(c),
            _ => {}
        }
    }
    aliases
}

/// Result of a single concept's redirect during a batch dedup pass.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub canonical_name: String,
    pub winner_definition_len: usize,
    pub loser_count: usize,
}

/// Group concepts by canonical name (already enforced at the storage layer
/// by `GraphStore::create_concept_node`'s MERGE-by-id semantics); this pass
/// exists for administrative cleanup after bulk imports that bypassed it,
/// or after a canonicalization rule changes retroactively.
///
/// Since this crate's graph store already collapses same-canonical-name
/// concepts to one node on write, the batch pass here operates over a
/// caller-supplied list of raw names (e.g. from an external import) and
/// reports which would collapse together and which definition would win.
pub fn plan_merge(raw_names_and_definitions: &[(String, Option<String>)]) -> Vec<MergeOutcome> {
    use std::collections::BTreeMap;

    let mut groups: BTreeMap<String, Vec<&Option<String>>> = BTreeMap::new();
    for (name, definition) in raw_names_and_definitions {
        groups.entry(canonical_name(name)).or_default().push(definition);
    }

    groups
        .into_iter()
        .map(|(canonical, definitions)| {
            let winner_len = definitions
                .iter()
                .filter_map(|d| d.as_deref())
                .map(str::len)
                .max()
                .unwrap_or(0);
            MergeOutcome {
                canonical_name: canonical,
                winner_definition_len: winner_len,
                loser_count: definitions.len().saturating_sub(1),
            }
        })
        .collect()
}

/// Redirect every edge touching a loser concept node onto the winner node
/// (avoiding self-loops; the store's MERGE semantics on
/// `(source, target, rel_type)` collapse any resulting duplicate), then
/// delete the loser node.
pub fn redirect_edges(graph: &GraphStore, winner_name: &str, loser_names: &[String]) -> crate::graph::Result<()> {
    let winner_id = NodeId::from_string(canonical_name(winner_name));
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for loser in loser_names {
        let loser_canonical = canonical_name(loser);
        if loser_canonical == canonical_name(winner_name) {
            continue;
        }
        if !seen.insert(loser_canonical.clone()) {
            continue;
        }

        let loser_id = NodeId::from_string(loser_canonical);
        for edge in graph.edges_touching(&loser_id)? {
            let (new_source, new_target) = (
                if edge.source == loser_id { winner_id.clone() } else { edge.source.clone() },
                if edge.target == loser_id { winner_id.clone() } else { edge.target.clone() },
            );
            if new_source == new_target {
                continue;
            }
            if let Err(err) = graph.create_relationship(&new_source, &new_target, &edge.rel_type, edge.properties.clone()) {
                warn!(winner = %winner_name, loser = %loser, rel_type = %edge.rel_type, error = %err, "dedup: failed to redirect edge to winner");
            }
        }

        if let Err(err) = graph.delete_node(&loser_id) {
            warn!(winner = %winner_name, loser = %loser, error = %err, "dedup: failed to delete loser concept node");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_strips_parenthesized_alias() {
        assert_eq!(canonical_name("Behavior Cloning (BC)"), "behavior cloning");
    }

    #[test]
    fn canonical_name_collapses_whitespace_and_lowercases() {
        assert_eq!(canonical_name("  Gradient   Descent  "), "gradient descent");
    }

    #[test]
    fn extract_aliases_returns_parenthesized_tokens() {
        let aliases = extract_aliases("Behavior Cloning (BC) (imitation learning)");
        assert_eq!(aliases, vec!["BC".to_string(), "imitation learning".to_string()]);
    }

    #[test]
    fn extract_aliases_empty_when_no_parens() {
        assert!(extract_aliases("Gradient Descent").is_empty());
    }

    #[test]
    fn plan_merge_groups_by_canonical_name_and_picks_longest_definition() {
        let names = vec![
            ("Behavior Cloning (BC)".to_string(), Some("short".to_string())),
            ("behavior   cloning".to_string(), Some("a much longer definition text".to_string())),
        ];
        let outcomes = plan_merge(&names);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].canonical_name, "behavior cloning");
        assert_eq!(outcomes[0].loser_count, 1);
    }
}
