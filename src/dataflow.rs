//! The analysis session: register reaching-definitions and temporary
//! relevance, computed as two fixpoint passes over a [`Cfg`].
//!
//! Phase 1 is a forward may-analysis: a node's entry state is the union
//! ("meet") of its predecessors' exit states, and every register write inside
//! a node strongly updates the running state, which is snapshotted per
//! statement into the context register map. Phase 2 runs only after phase 1
//! has converged, since it chases reaching-definition chains across blocks.

use crate::analysis_config::CONFIG;
use crate::cfg::{BlockLifter, Cfg};
use crate::containers::unordered::UnorderedMap;
use crate::ir::{Expr, IrBlock, Stmt, Temp};
use crate::log::*;
use crate::reaching_definitions::{Location, RegFactSet};
use crate::registers::RegisterTable;
use crate::relevance::{Definitions, RegNameSet, TempFactBlock};

/// All fact stores of one analysis run. Owned by the caller; nothing here is
/// shared across sessions, and every map key holds a non-owning block address
/// rather than a pointer into the CFG.
pub struct Analysis<'a> {
    regs: &'a RegisterTable,

    /// IR of every block, lifted once at the dataflow optimization level.
    irsb_map: UnorderedMap<u64, IrBlock>,

    /// Snapshot of the register facts immediately after each register-writing
    /// statement. The finer-grained companion to the per-node entry/exit maps.
    context_reg_map: UnorderedMap<Location, RegFactSet>,
    /// Per-node entry state (meet over predecessors' exit states).
    in_reg_map: UnorderedMap<u64, RegFactSet>,
    /// Per-node exit state (running state after the last statement).
    out_reg_map: UnorderedMap<u64, RegFactSet>,

    /// Per-node temporary-relevance facts.
    temp_map: UnorderedMap<u64, TempFactBlock>,

    defs: Definitions,
}

/// What a statement does to the phase-1 running state. Extracted up front so
/// the transfer loop does not hold a borrow of the block while mutating the
/// fact stores.
enum StmtEffect {
    /// A tracked register write into the given slot.
    WriteSlot(usize),
    /// A write to an untracked register; silently ignored.
    WriteUntracked,
    /// A register-array element write; not modeled, diagnostic only.
    ArrayWrite,
    None,
}

impl<'a> Analysis<'a> {
    /// A fresh session tracking the registers classified by `regs`.
    pub fn new(regs: &'a RegisterTable) -> Self {
        Self {
            regs,
            irsb_map: Default::default(),
            context_reg_map: Default::default(),
            in_reg_map: Default::default(),
            out_reg_map: Default::default(),
            temp_map: Default::default(),
            defs: Definitions::new(),
        }
    }

    /// Drop all computed facts, returning the session to its fresh state.
    pub fn clear(&mut self) {
        self.irsb_map = Default::default();
        self.context_reg_map = Default::default();
        self.in_reg_map = Default::default();
        self.out_reg_map = Default::default();
        self.temp_map = Default::default();
        self.defs.clear();
    }

    /// The register classification table this session tracks.
    pub fn registers(&self) -> &RegisterTable {
        self.regs
    }

    /// The lifted IR of the block at `addr`, if any was recorded.
    pub fn block(&self, addr: u64) -> Option<&IrBlock> {
        self.irsb_map.get(&addr)
    }

    /// The defining expression of `tmp` in the block at `block_addr`.
    pub fn def_of(&self, block_addr: u64, tmp: Temp) -> Option<&Expr> {
        self.defs.get_def(block_addr, tmp)
    }

    /// The computed entry state of the block at `addr`.
    pub fn entry_state(&self, addr: u64) -> Option<&RegFactSet> {
        self.in_reg_map.get(&addr)
    }

    /// The computed exit state of the block at `addr`.
    pub fn exit_state(&self, addr: u64) -> Option<&RegFactSet> {
        self.out_reg_map.get(&addr)
    }

    /// Run both dataflow passes over `cfg`, lifting every node's IR through
    /// `lifter` at the configured dataflow optimization level.
    pub fn analyze_cfg(&mut self, cfg: &Cfg, lifter: &impl BlockLifter) {
        for id in cfg.node_ids() {
            let addr = cfg.node(id).addr;
            assert!(
                !self.in_reg_map.contains_key(&addr),
                "Block addresses must be unique across CFG nodes; {:#x} repeats",
                addr
            );
            self.in_reg_map
                .insert(addr, RegFactSet::new(self.regs.tracked_len()));
            self.out_reg_map
                .insert(addr, RegFactSet::new(self.regs.tracked_len()));
            self.temp_map.insert(addr, TempFactBlock::new());

            if let Some(block) = lifter.lift_block(addr, CONFIG.dataflow_opt_level) {
                self.defs.set_block(&block);
                self.irsb_map.insert(addr, block);
            }
        }

        if CONFIG.dump_cfg_dot_file {
            if let Some(first) = cfg.node_ids().next() {
                let path = format!("cfg-{:x}.dot", cfg.node(first).addr);
                match std::fs::File::create(&path) {
                    Ok(mut f) => cfg.write_dot(&mut f).unwrap_or_else(|e| {
                        warn!("Failed to write CFG dot file"; "path" => %path, "err" => %e)
                    }),
                    Err(e) => warn!("Failed to create CFG dot file"; "path" => %path, "err" => %e),
                }
            }
        }

        // Phase 1: register reaching-definitions, to a fixpoint. Reading a
        // predecessor's not-yet-updated exit state within a sweep only delays
        // convergence; it never changes the final result.
        let mut sweeps = 0;
        let mut change = true;
        while change {
            change = false;
            for id in cfg.node_ids() {
                let addr = cfg.node(id).addr;
                let mut entry = RegFactSet::new(self.regs.tracked_len());
                for &pred in cfg.predecessors(id) {
                    entry.meet(self.out_reg_map.get(&cfg.node(pred).addr).unwrap());
                }
                self.in_reg_map.insert(addr, entry);
                change = self.analyze_block_reg_defs(addr) || change;
            }
            sweeps += 1;
        }
        info!("Register reaching-definitions converged"; "sweeps" => sweeps);

        // Phase 2: temporary relevance, to its own fixpoint. Depends on the
        // finalized reaching-definition data from phase 1.
        let mut sweeps = 0;
        let mut change = true;
        while change {
            change = false;
            for id in cfg.node_ids() {
                change = self.analyze_block_relevance(cfg.node(id).addr) || change;
            }
            sweeps += 1;
        }
        info!("Temporary relevance converged"; "sweeps" => sweeps);
    }

    /// Phase-1 transfer of one block: run the statements in index order over a
    /// copy of the entry state, strongly updating at every tracked register
    /// write and snapshotting into the context register map. Reports whether
    /// the exit state or any snapshot changed.
    fn analyze_block_reg_defs(&mut self, addr: u64) -> bool {
        let effects: Vec<StmtEffect> = match self.irsb_map.get(&addr) {
            Some(block) => block
                .stmts
                .iter()
                .map(|stmt| match stmt {
                    Stmt::RegWrite { offset, .. } => match self.regs.slot_of(*offset) {
                        Some(slot) => StmtEffect::WriteSlot(slot),
                        None => StmtEffect::WriteUntracked,
                    },
                    Stmt::RegArrayWrite { .. } => StmtEffect::ArrayWrite,
                    _ => StmtEffect::None,
                })
                .collect(),
            None => return false,
        };

        let mut change = false;
        let mut out = self.in_reg_map.get(&addr).unwrap().clone();

        for (i, effect) in effects.iter().enumerate() {
            match effect {
                StmtEffect::WriteSlot(slot) => {
                    let loc = Location::new(addr, i);
                    out.set_fact(*slot, std::iter::once(loc).collect());

                    change = change
                        || match self.context_reg_map.get(&loc) {
                            Some(prev) => *prev != out,
                            None => true,
                        };
                    self.context_reg_map.insert(loc, out.clone());
                }
                StmtEffect::ArrayWrite => {
                    warn!("Register-array write not modeled"; "addr" => addr, "ind" => i);
                }
                StmtEffect::WriteUntracked | StmtEffect::None => {}
            }
        }

        change = change || *self.out_reg_map.get(&addr).unwrap() != out;
        self.out_reg_map.insert(addr, out);
        change
    }

    /// The register facts in effect as of `location`: the nearest context
    /// snapshot at or before it in its block, else the block's entry state.
    /// `None` only if the block was never part of this session.
    pub fn query_reg_defs(&self, location: Location) -> Option<&RegFactSet> {
        for i in (0..=location.ind).rev() {
            if let Some(snapshot) = self.context_reg_map.get(&Location::new(location.block, i)) {
                return Some(snapshot);
            }
        }
        self.in_reg_map.get(&location.block)
    }

    /// The recorded relevance of `tmp` in the block at `block_addr`; absent
    /// entries are the empty set.
    pub fn query_temp_relevance(&self, block_addr: u64, tmp: Temp) -> RegNameSet {
        self.temp_map
            .get(&block_addr)
            .and_then(|facts| facts.get(tmp))
            .cloned()
            .unwrap_or_default()
    }

    /// Phase-2 transfer of one block: recompute the relevance of every
    /// temp-write statement, reporting whether any recorded set changed.
    /// Updates are applied statement by statement, so later temps in the same
    /// block see their predecessors' fresh sets immediately.
    fn analyze_block_relevance(&mut self, addr: u64) -> bool {
        let temp_writes: Vec<(usize, Temp, Expr)> = match self.irsb_map.get(&addr) {
            Some(block) => block
                .stmts
                .iter()
                .enumerate()
                .filter_map(|(i, stmt)| match stmt {
                    Stmt::TempWrite { tmp, data } => Some((i, *tmp, data.clone())),
                    _ => None,
                })
                .collect(),
            None => return false,
        };

        let mut change = false;
        for (i, tmp, data) in temp_writes {
            let regs = self.relevance_of(&data, Location::new(addr, i));
            change = self.temp_map.get_mut(&addr).unwrap().update(tmp, regs) || change;
        }
        change
    }

    /// Recursively compute the relevance set of `expr` as evaluated at
    /// `location`.
    fn relevance_of(&self, expr: &Expr, location: Location) -> RegNameSet {
        match expr {
            Expr::Temp(tmp) => self.query_temp_relevance(location.block, *tmp),

            Expr::Unop { arg, .. } => self.relevance_of(arg, location),
            Expr::Binop { args, .. } => {
                let mut ret = self.relevance_of(&args[0], location);
                ret.extend(self.relevance_of(&args[1], location).into_iter());
                ret
            }
            Expr::Triop { args, .. } => {
                let mut ret: RegNameSet = Default::default();
                for arg in args.iter() {
                    ret.extend(self.relevance_of(arg, location).into_iter());
                }
                ret
            }
            Expr::Qop { args, .. } => {
                let mut ret: RegNameSet = Default::default();
                for arg in args.iter() {
                    ret.extend(self.relevance_of(arg, location).into_iter());
                }
                ret
            }

            Expr::RegRead { offset, .. } => {
                let mut ret: RegNameSet = Default::default();
                if let Some(name) = self.regs.base_name_of(*offset) {
                    ret.insert(name.to_string());
                }
                // Chase the reaching definitions of this register: a definition
                // that is a direct temp write contributes that temp's recorded
                // relevance from its own block. This is the only cross-block
                // propagation path, and only a single hop; definitions that are
                // constants or compound expressions are deliberately not
                // followed further.
                if let (Some(slot), Some(reg_defs)) = (
                    self.regs.base_slot_of(*offset),
                    self.query_reg_defs(location),
                ) {
                    for def in reg_defs.fact(slot).iter() {
                        let Some(block) = self.irsb_map.get(&def.block) else {
                            continue;
                        };
                        if let Some(Stmt::RegWrite {
                            data: Expr::Temp(tmp),
                            ..
                        }) = block.stmts.get(def.ind)
                        {
                            ret.extend(self.query_temp_relevance(def.block, *tmp).into_iter());
                        }
                    }
                }
                ret
            }

            // Memory values are approximated as relevant to whatever computed
            // their address.
            Expr::Load { addr, .. } => self.relevance_of(addr, location),

            Expr::Const(_)
            | Expr::Ite { .. }
            | Expr::RegArrayRead { .. }
            | Expr::CallHelper { .. } => Default::default(),
        }
    }

    /// Write a human-readable dump of the block's entry state and every
    /// per-statement context snapshot to `out`. Debug output only.
    pub fn render_block_facts(
        &self,
        addr: u64,
        out: &mut impl std::io::Write,
    ) -> std::io::Result<()> {
        if let Some(entry) = self.in_reg_map.get(&addr) {
            writeln!(out, "In[]:\n{}\n", entry.render(self.regs))?;
        }
        if let Some(block) = self.irsb_map.get(&addr) {
            for i in 0..block.stmts.len() {
                let loc = Location::new(addr, i);
                if let Some(snapshot) = self.context_reg_map.get(&loc) {
                    writeln!(out, "{:?}\n{}\n", loc, snapshot.render(self.regs))?;
                }
            }
        }
        Ok(())
    }
}
