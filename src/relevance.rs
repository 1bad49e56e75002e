//! Per-block fact stores for the temporary-relevance analysis: which
//! architectural registers each block-local temporary transitively depends on,
//! and the table of each temporary's defining expression.

use std::cell::RefCell;

use crate::containers::unordered::{UnorderedMap, UnorderedSet};
use crate::ir::{Expr, IrBlock, Stmt, Temp};
use crate::log::*;

/// The set of canonical register names a value depends on.
pub type RegNameSet = UnorderedSet<String>;

/// Relevance facts for the temporaries of one block.
///
/// An absent key is equivalent to the empty set ("not yet computed / no
/// dependency").
#[derive(Clone, Default, Debug)]
pub struct TempFactBlock {
    temp_reg_map: UnorderedMap<Temp, RegNameSet>,
}

impl TempFactBlock {
    pub fn new() -> Self {
        Default::default()
    }

    /// The currently recorded relevance of `tmp`, if any. Mid-fixpoint this
    /// may be stale; callers treat `None` as the empty set.
    pub fn get(&self, tmp: Temp) -> Option<&RegNameSet> {
        self.temp_reg_map.get(&tmp)
    }

    /// Replace the recorded relevance of `tmp` with `regs`, reporting whether
    /// the recorded value changed. The report drives the outer fixpoint loop.
    pub fn update(&mut self, tmp: Temp, regs: RegNameSet) -> bool {
        let change = match self.temp_reg_map.get(&tmp) {
            None => true,
            Some(old) => *old != regs,
        };
        self.temp_reg_map.insert(tmp, regs);
        change
    }
}

/// The defining expression of every temporary, per block.
///
/// Temporaries are block-local and write-once, so this is populated in a
/// single pass over each block's statements at block-discovery time; no
/// fixpoint iteration is ever needed here.
#[derive(Default)]
pub struct Definitions {
    block_defs: UnorderedMap<u64, UnorderedMap<Temp, Expr>>,
    // Blocks we have already complained about, so a missing block is logged
    // only once.
    warned_missing: RefCell<UnorderedSet<u64>>,
}

impl Definitions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Drop all recorded definitions.
    pub fn clear(&mut self) {
        self.block_defs = Default::default();
        self.warned_missing.borrow_mut().clear();
    }

    /// Record the definitions of `block`, scanning its temp-write statements.
    pub fn set_block(&mut self, block: &IrBlock) {
        let defs = block
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::TempWrite { tmp, data } => Some((*tmp, data.clone())),
                _ => None,
            })
            .collect();
        self.block_defs.insert(block.addr, defs);
    }

    /// The defining expression of `tmp` in the block at `block_addr`.
    ///
    /// Asking about a block that was never recorded is a recoverable failure:
    /// it returns `None` ("no information") and logs once per block.
    pub fn get_def(&self, block_addr: u64, tmp: Temp) -> Option<&Expr> {
        match self.block_defs.get(&block_addr) {
            Some(defs) => defs.get(&tmp),
            None => {
                if self.warned_missing.borrow_mut().insert(block_addr) {
                    warn!("Definitions queried for unrecorded block"; "addr" => block_addr);
                }
                None
            }
        }
    }
}
