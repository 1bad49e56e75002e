//! Abstract state for the register reaching-definitions analysis: program
//! locations and the per-point fact sets over them.

use crate::containers::unordered::UnorderedSet;
use crate::registers::RegisterTable;

use itertools::Itertools;

/// Identifies a single IR statement by (block identity, statement index).
///
/// Blocks are identified by their stable machine address; a `Location` never
/// owns the block it points into.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    /// Address of the block containing the statement.
    pub block: u64,
    /// Index of the statement within the block.
    pub ind: usize,
}

impl Location {
    pub fn new(block: u64, ind: usize) -> Self {
        Self { block, ind }
    }
}

impl std::fmt::Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({:#x} {})", self.block, self.ind)
    }
}

/// Reaching-definition facts for every tracked register at one program point.
///
/// One slot per tracked register; each slot holds the set of [`Location`]s
/// whose register write may still be in effect (a may-set: after a merge point
/// several last-writers can coexist). An empty slot means "no definition from
/// within this scope; defer to the predecessor/entry state".
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RegFactSet {
    facts: Vec<UnorderedSet<Location>>,
}

impl RegFactSet {
    /// A fresh, empty fact set with one slot per tracked register.
    pub fn new(tracked_len: usize) -> Self {
        Self {
            facts: vec![Default::default(); tracked_len],
        }
    }

    /// The definition sites that may reach this point for slot `slot`.
    pub fn fact(&self, slot: usize) -> &UnorderedSet<Location> {
        &self.facts[slot]
    }

    /// Strong update: replace slot `slot` with `fact`. Valid for a definite
    /// write within straight-line code; never used at merge points.
    pub fn set_fact(&mut self, slot: usize, fact: UnorderedSet<Location>) {
        self.facts[slot] = fact;
    }

    /// Meet: pairwise union of `other` into `self`. Used only when combining
    /// multiple predecessors' exit states into a successor's entry state.
    pub fn meet(&mut self, other: &Self) {
        assert_eq!(self.facts.len(), other.facts.len());
        for (mine, theirs) in self.facts.iter_mut().zip(other.facts.iter()) {
            mine.extend(theirs.iter().copied());
        }
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.facts.iter().all(|f| f.is_empty())
    }

    /// Human-readable rendering, naming slots via `table`. Debug output only.
    pub fn render(&self, table: &RegisterTable) -> String {
        self.facts
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_empty())
            .map(|(slot, f)| {
                format!(
                    "{}: {}",
                    table.slot_name(slot),
                    f.iter().sorted().map(|l| format!("{:?}", l)).join(" ")
                )
            })
            .join("\n")
    }
}
