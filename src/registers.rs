//! The register classification table: which raw guest-state offsets are
//! tracked "useful" registers, and their canonical slot indices and names.
//!
//! Architecture specific and supplied once at startup. Modeled as an injective
//! partial mapping from raw offset to slot/name; offsets outside the table are
//! simply not tracked (flags, instruction pointer, lifter-internal state).

use crate::containers::unordered::UnorderedMap;

/// An injective partial mapping from raw register offset to a canonical slot
/// index (dense, `0..tracked_len()`) and display/symbol name.
pub struct RegisterTable {
    by_offset: UnorderedMap<usize, usize>,
    names: Vec<String>,
}

impl RegisterTable {
    /// Build a table from `(raw offset, canonical name)` pairs. Slot indices
    /// are assigned in iteration order.
    pub fn new(entries: impl IntoIterator<Item = (usize, String)>) -> Self {
        let mut r = Self {
            by_offset: Default::default(),
            names: vec![],
        };
        for (offset, name) in entries {
            let slot = r.names.len();
            let prev = r.by_offset.insert(offset, slot);
            assert!(
                prev.is_none(),
                "Register table must be injective; offset {} appears twice",
                offset
            );
            r.names.push(name);
        }
        r
    }

    /// Number of tracked register slots.
    pub fn tracked_len(&self) -> usize {
        self.names.len()
    }

    /// The canonical slot index of `offset`, if tracked.
    pub fn slot_of(&self, offset: usize) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    /// The canonical name of `offset`, if tracked.
    pub fn name_of(&self, offset: usize) -> Option<&str> {
        self.slot_of(offset).map(|slot| self.names[slot].as_str())
    }

    /// The slot of the parent register covering `offset`, resolving the two
    /// sub-register aliasing conventions: 8/16-bit high sub-registers live one
    /// offset above their parent, and upper 128-bit vector lanes live eight
    /// offsets above their base.
    pub fn base_slot_of(&self, offset: usize) -> Option<usize> {
        self.slot_of(offset)
            .or_else(|| offset.checked_sub(1).and_then(|o| self.slot_of(o)))
            .or_else(|| offset.checked_sub(8).and_then(|o| self.slot_of(o)))
    }

    /// The canonical name of the parent register covering `offset` (see
    /// [`Self::base_slot_of`]).
    pub fn base_name_of(&self, offset: usize) -> Option<&str> {
        self.base_slot_of(offset)
            .map(|slot| self.names[slot].as_str())
    }

    /// The canonical name of slot `slot`.
    pub fn slot_name(&self, slot: usize) -> &str {
        &self.names[slot]
    }
}

/// The AMD64 table: the sixteen general-purpose 64-bit registers plus the
/// sixteen vector registers, at their guest-state offsets. Sub-register reads
/// (`ah` and friends one offset above their parent, upper vector lanes eight
/// offsets above their base) are resolved by the lifter against the parent
/// entries here.
pub fn amd64() -> RegisterTable {
    const GPRS: [&str; 16] = [
        "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
        "r13", "r14", "r15",
    ];
    // Guest-state layout: GPRs are 8 bytes apart starting at offset 16; the
    // 256-bit vector registers are 32 bytes apart starting at offset 224.
    RegisterTable::new(
        GPRS.iter()
            .enumerate()
            .map(|(i, name)| (16 + 8 * i, name.to_string()))
            .chain((0..16).map(|i| (224 + 32 * i, format!("ymm{}", i)))),
    )
}

lazy_static::lazy_static! {
    /// The default AMD64 register classification table.
    pub static ref AMD64: RegisterTable = amd64();
}
