//! Proptest generators for property-based testing.

use proptest::prelude::*;

use repo_sync_core::{ActionEntry, ActionKind, Name};

/// Generate a name component.
pub fn component() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,11}".prop_map(String::from)
}

/// Generate a hierarchical name of 1 to 4 components.
pub fn name() -> impl Strategy<Value = Name> {
    prop::collection::vec(component(), 1..=4)
        .prop_map(|parts| Name::from_components(parts).expect("generated components are valid"))
}

/// Generate an object name from a small pool, so actions collide on targets.
pub fn target() -> impl Strategy<Value = Name> {
    (0u8..6).prop_map(|i| Name::parse(&format!("/obj/{i}")).expect("valid name"))
}

/// Generate a creator from a small pool.
pub fn creator() -> impl Strategy<Value = Name> {
    (0u8..4).prop_map(|i| Name::parse(&format!("/repo/{}", char::from(b'a' + i))).expect("valid name"))
}

pub fn action_kind() -> impl Strategy<Value = ActionKind> {
    prop_oneof![Just(ActionKind::Insert), Just(ActionKind::Delete)]
}

/// A `{creator -> last_seq}` table.
pub fn seq_table() -> impl Strategy<Value = Vec<(Name, u64)>> {
    prop::collection::btree_map(creator(), 0u64..50, 0..4).prop_map(|m| m.into_iter().collect())
}

/// One local mutation, before seq numbers are assigned.
#[derive(Debug, Clone)]
pub struct MutationParams {
    pub creator: Name,
    pub kind: ActionKind,
    pub target: Name,
}

impl Arbitrary for MutationParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (creator(), action_kind(), target())
            .prop_map(|(creator, kind, target)| MutationParams {
                creator,
                kind,
                target,
            })
            .boxed()
    }
}

/// Turn mutations into actions with per-creator contiguous seqs starting at 1.
pub fn actions_from_params(params: &[MutationParams]) -> Vec<ActionEntry> {
    let mut next = std::collections::BTreeMap::<Name, u64>::new();
    params
        .iter()
        .map(|p| {
            let seq = next.entry(p.creator.clone()).or_insert(0);
            *seq += 1;
            ActionEntry::new(p.creator.clone(), *seq, p.kind, p.target.clone(), 1)
        })
        .collect()
}

/// A sequence of actions with per-creator contiguous seqs.
pub fn action_history(max_len: usize) -> impl Strategy<Value = Vec<ActionEntry>> {
    prop::collection::vec(any::<MutationParams>(), 0..=max_len)
        .prop_map(|params| actions_from_params(&params))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_generated_names_roundtrip_uri(name in name()) {
            prop_assert_eq!(Name::parse(&name.to_uri()).unwrap(), name);
        }

        #[test]
        fn test_history_seqs_contiguous(actions in action_history(30)) {
            let mut last = std::collections::BTreeMap::new();
            for action in &actions {
                let prev = last.insert(action.creator().clone(), action.seq()).unwrap_or(0);
                prop_assert_eq!(action.seq(), prev + 1);
            }
        }
    }
}
