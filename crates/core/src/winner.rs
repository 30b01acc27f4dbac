use std::cmp::Ordering;

use crate::{RevId, Sequence};

/// The fields of a leaf revision that winner election looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub sequence: Sequence,
    pub rev_id: RevId,
    pub deleted: bool,
}

impl Leaf {
    pub fn new(sequence: Sequence, rev_id: RevId, deleted: bool) -> Self {
        Self {
            sequence,
            rev_id,
            deleted,
        }
    }
}

/// Rank two leaves; the greater one wins.
///
/// Any live leaf outranks every tombstone regardless of generation. Among
/// leaves of the same kind the higher generation wins, then the
/// lexicographically greater revision id.
fn rank(a: &Leaf, b: &Leaf) -> Ordering {
    (!a.deleted)
        .cmp(&!b.deleted)
        .then_with(|| a.rev_id.generation().cmp(&b.rev_id.generation()))
        .then_with(|| a.rev_id.to_string().cmp(&b.rev_id.to_string()))
}

/// Pick the winning leaf, or `None` if there are no leaves.
pub fn elect_winner(leaves: &[Leaf]) -> Option<&Leaf> {
    leaves.iter().max_by(|a, b| rank(a, b))
}

/// A document is conflicted when more than one of its leaves is live.
pub fn is_conflicted(leaves: &[Leaf]) -> bool {
    leaves.iter().filter(|l| !l.deleted).count() > 1
}
