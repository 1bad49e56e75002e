use crate::cfg::BlockLifter;
use crate::containers::unordered::UnorderedMap;
use crate::ir::{Const, Expr, IrBlock, Stmt, Temp, Width};

#[cfg(test)]
use crate::cfg::Cfg;
#[cfg(test)]
use crate::constant_offset::constant_offset;
#[cfg(test)]
use crate::ir::{BinOp, ConstValue, UnOp};
#[cfg(test)]
use crate::dataflow::Analysis;
#[cfg(test)]
use crate::lifter::Lifter;
#[cfg(test)]
use crate::reaching_definitions::Location;
#[cfg(test)]
use crate::registers::AMD64;
#[cfg(test)]
use z3::ast::{Ast, BV};

/// A block provider backed by a plain map, standing in for a real
/// disassembler front-end. Ignores the requested optimization level.
pub struct MapLifter {
    blocks: UnorderedMap<u64, IrBlock>,
}

impl MapLifter {
    pub fn new(blocks: impl IntoIterator<Item = IrBlock>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|b| (b.addr, b)).collect(),
        }
    }
}

impl BlockLifter for MapLifter {
    fn lift_block(&self, addr: u64, _opt_level: u8) -> Option<IrBlock> {
        self.blocks.get(&addr).cloned()
    }
}

pub fn cst(value: u64, width: Width) -> Expr {
    Expr::Const(Const::bits(value, width))
}

pub fn get(offset: usize, width: Width) -> Expr {
    Expr::RegRead { offset, width }
}

pub fn put(offset: usize, data: Expr) -> Stmt {
    Stmt::RegWrite { offset, data }
}

pub fn def_tmp(tmp: Temp, data: Expr) -> Stmt {
    Stmt::TempWrite { tmp, data }
}

// AMD64 guest-state offsets used throughout the tests.
pub const RAX: usize = 16;
pub const RCX: usize = 24;
pub const RBX: usize = 40;
pub const RBP: usize = 56;

#[cfg(test)]
fn assert_unorderedset_eq<T: Eq + std::hash::Hash + Ord + std::fmt::Debug>(
    a: impl IntoIterator<Item = T>,
    b: impl IntoIterator<Item = T>,
) {
    use crate::containers::unordered::UnorderedSet;
    let a: UnorderedSet<_> = a.into_iter().collect();
    let b: UnorderedSet<_> = b.into_iter().collect();
    assert_eq!(a, b)
}

/// Prove two bit-vector terms equivalent (not merely structurally equal).
#[cfg(test)]
fn assert_bv_equiv(a: &BV, b: &BV) {
    let solver = z3::Solver::new();
    solver.assert(&a.eq(b).not());
    assert_eq!(solver.check(), z3::SatResult::Unsat);
}

/// Lift a self-contained expression (no temporaries) in a fresh session.
#[cfg(test)]
fn lift_expr(expr: &Expr) -> BV {
    let analysis = Analysis::new(&AMD64);
    Lifter::new(&analysis).lift(expr, 0)
}

#[test]
fn strong_update_keeps_only_last_write() {
    let mut cfg = Cfg::new();
    cfg.add_node(0x1000, 8, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x1000,
        stmts: vec![put(RAX, cst(1, 64)), put(RAX, cst(2, 64))],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    let rax = AMD64.slot_of(RAX).unwrap();
    let exit = analysis.exit_state(0x1000).unwrap();
    assert_unorderedset_eq(
        exit.fact(rax).iter().copied(),
        [Location::new(0x1000, 1)],
    );
}

#[test]
fn merge_unions_predecessor_definitions() {
    // Two disjoint paths defining rax, joining in a third node.
    let mut cfg = Cfg::new();
    let a = cfg.add_node(0x1000, 4, "a");
    let b = cfg.add_node(0x1100, 4, "b");
    let c = cfg.add_node(0x1200, 4, "c");
    cfg.add_edge(a, c);
    cfg.add_edge(b, c);
    let lifter = MapLifter::new([
        IrBlock {
            addr: 0x1000,
            stmts: vec![put(RAX, cst(1, 64))],
        },
        IrBlock {
            addr: 0x1100,
            stmts: vec![put(RAX, cst(2, 64))],
        },
        IrBlock {
            addr: 0x1200,
            stmts: vec![],
        },
    ]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    let rax = AMD64.slot_of(RAX).unwrap();
    let entry = analysis.entry_state(0x1200).unwrap();
    assert_unorderedset_eq(
        entry.fact(rax).iter().copied(),
        [Location::new(0x1000, 0), Location::new(0x1100, 0)],
    );
    // Nothing in the join block writes rax, so the exit state carries the
    // merged set through unchanged.
    let exit = analysis.exit_state(0x1200).unwrap();
    assert_unorderedset_eq(
        exit.fact(rax).iter().copied(),
        [Location::new(0x1000, 0), Location::new(0x1100, 0)],
    );
}

#[test]
fn diamond_preserves_pass_through_definitions() {
    // entry -> {left, right} -> join: left redefines rax, right only passes
    // the pre-diamond definition through. The join must keep both.
    let mut cfg = Cfg::new();
    let entry = cfg.add_node(0xd000, 4, "entry");
    let left = cfg.add_node(0xd100, 4, "left");
    let right = cfg.add_node(0xd200, 4, "right");
    let join = cfg.add_node(0xd300, 4, "join");
    cfg.add_edge(entry, left);
    cfg.add_edge(entry, right);
    cfg.add_edge(left, join);
    cfg.add_edge(right, join);
    let lifter = MapLifter::new([
        IrBlock {
            addr: 0xd000,
            stmts: vec![put(RAX, cst(1, 64))],
        },
        IrBlock {
            addr: 0xd100,
            stmts: vec![put(RAX, cst(2, 64))],
        },
        IrBlock {
            addr: 0xd200,
            stmts: vec![],
        },
        IrBlock {
            addr: 0xd300,
            stmts: vec![],
        },
    ]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    let rax = AMD64.slot_of(RAX).unwrap();
    let at_join = analysis.entry_state(0xd300).unwrap();
    assert_unorderedset_eq(
        at_join.fact(rax).iter().copied(),
        [Location::new(0xd000, 0), Location::new(0xd100, 0)],
    );
}

#[test]
fn cyclic_cfg_reaches_fixpoint() {
    let mut cfg = Cfg::new();
    let a = cfg.add_node(0x2000, 4, "head");
    let b = cfg.add_node(0x2100, 4, "latch");
    cfg.add_edge(a, b);
    cfg.add_edge(b, a);
    let lifter = MapLifter::new([
        IrBlock {
            addr: 0x2000,
            stmts: vec![put(RAX, cst(1, 64))],
        },
        IrBlock {
            addr: 0x2100,
            stmts: vec![put(RCX, cst(2, 64))],
        },
    ]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    // Around the back edge, both definitions reach the loop head.
    let entry = analysis.entry_state(0x2000).unwrap();
    let rax = AMD64.slot_of(RAX).unwrap();
    let rcx = AMD64.slot_of(RCX).unwrap();
    assert_unorderedset_eq(entry.fact(rax).iter().copied(), [Location::new(0x2000, 0)]);
    assert_unorderedset_eq(entry.fact(rcx).iter().copied(), [Location::new(0x2100, 0)]);
}

#[test]
fn point_queries_walk_back_to_nearest_snapshot() {
    let mut cfg = Cfg::new();
    cfg.add_node(0x3000, 12, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x3000,
        stmts: vec![
            put(RAX, cst(1, 64)),
            Stmt::Other("IMark".into()),
            put(RCX, cst(2, 64)),
        ],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    let rax = AMD64.slot_of(RAX).unwrap();
    let rcx = AMD64.slot_of(RCX).unwrap();

    // Between the writes, only the rax definition is visible.
    let mid = analysis.query_reg_defs(Location::new(0x3000, 1)).unwrap();
    assert_unorderedset_eq(mid.fact(rax).iter().copied(), [Location::new(0x3000, 0)]);
    assert!(mid.fact(rcx).is_empty());

    let end = analysis.query_reg_defs(Location::new(0x3000, 2)).unwrap();
    assert_unorderedset_eq(end.fact(rcx).iter().copied(), [Location::new(0x3000, 2)]);

    // A block this session never saw yields no information at all.
    assert!(analysis.query_reg_defs(Location::new(0xdead, 0)).is_none());
}

#[test]
fn relevance_within_a_block() {
    let mut cfg = Cfg::new();
    cfg.add_node(0x4000, 16, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x4000,
        stmts: vec![
            def_tmp(0, get(RAX, 64)),
            def_tmp(1, Expr::binop(BinOp::Add, Expr::Temp(0), cst(4, 64))),
            def_tmp(
                2,
                Expr::Load {
                    width: 64,
                    addr: Box::new(get(RBP, 64)),
                },
            ),
            def_tmp(3, cst(7, 64)),
            def_tmp(
                4,
                Expr::Ite {
                    cond: Box::new(Expr::Temp(0)),
                    if_true: Box::new(Expr::Temp(1)),
                    if_false: Box::new(Expr::Temp(3)),
                },
            ),
        ],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    assert_unorderedset_eq(analysis.query_temp_relevance(0x4000, 0), ["rax".to_string()]);
    assert_unorderedset_eq(analysis.query_temp_relevance(0x4000, 1), ["rax".to_string()]);
    // A loaded value is relevant to whatever computed its address.
    assert_unorderedset_eq(analysis.query_temp_relevance(0x4000, 2), ["rbp".to_string()]);
    assert!(analysis.query_temp_relevance(0x4000, 3).is_empty());
    // Value selection deliberately contributes nothing.
    assert!(analysis.query_temp_relevance(0x4000, 4).is_empty());
    // Unknown blocks and unknown temporaries read as empty.
    assert!(analysis.query_temp_relevance(0xdead, 0).is_empty());
    assert!(analysis.query_temp_relevance(0x4000, 99).is_empty());
}

#[test]
fn relevance_chases_definitions_across_blocks() {
    // The first block forwards rax through a temporary into rbx; reading rbx
    // downstream is then relevant to both registers.
    let mut cfg = Cfg::new();
    let a = cfg.add_node(0x5000, 8, "producer");
    let b = cfg.add_node(0x5100, 8, "consumer");
    cfg.add_edge(a, b);
    let lifter = MapLifter::new([
        IrBlock {
            addr: 0x5000,
            stmts: vec![def_tmp(0, get(RAX, 64)), put(RBX, Expr::Temp(0))],
        },
        IrBlock {
            addr: 0x5100,
            stmts: vec![def_tmp(0, get(RBX, 64))],
        },
    ]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    assert_unorderedset_eq(
        analysis.query_temp_relevance(0x5100, 0),
        ["rbx".to_string(), "rax".to_string()],
    );
}

#[test]
fn relevance_resolves_sub_register_reads() {
    // An 8-bit high-byte read one offset above rax still names rax.
    let mut cfg = Cfg::new();
    cfg.add_node(0x6000, 4, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x6000,
        stmts: vec![def_tmp(0, get(RAX + 1, 8))],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    assert_unorderedset_eq(analysis.query_temp_relevance(0x6000, 0), ["rax".to_string()]);
}

#[test]
fn clear_returns_session_to_fresh_state() {
    let mut cfg = Cfg::new();
    cfg.add_node(0x7000, 4, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x7000,
        stmts: vec![put(RAX, cst(1, 64))],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);
    assert!(analysis.entry_state(0x7000).is_some());

    analysis.clear();
    assert!(analysis.entry_state(0x7000).is_none());
    assert!(analysis.block(0x7000).is_none());

    // A cleared session accepts the same graph again.
    analysis.analyze_cfg(&cfg, &lifter);
    assert!(analysis.exit_state(0x7000).is_some());
}

#[test]
fn lift_extends_and_truncates() {
    let sext = Expr::unop(
        UnOp::Cast {
            signed: true,
            high: false,
            src_width: 8,
            dst_width: 32,
        },
        cst(0xff, 8),
    );
    let lifted = lift_expr(&sext);
    assert_eq!(lifted.get_size(), 32);
    assert_eq!(lifted.simplify().as_u64(), Some(0xffff_ffff));

    let zext = Expr::unop(
        UnOp::Cast {
            signed: false,
            high: false,
            src_width: 8,
            dst_width: 32,
        },
        cst(0xff, 8),
    );
    assert_eq!(lift_expr(&zext).simplify().as_u64(), Some(0xff));

    let high_half = Expr::unop(
        UnOp::Cast {
            signed: false,
            high: true,
            src_width: 32,
            dst_width: 16,
        },
        cst(0xdead_beef, 32),
    );
    let lifted = lift_expr(&high_half);
    assert_eq!(lifted.get_size(), 16);
    assert_eq!(lifted.simplify().as_u64(), Some(0xdead));
}

#[test]
fn lift_arithmetic_shift_is_signed() {
    // -8 >> 1 == -4 at 32 bits.
    let shr = Expr::binop(BinOp::Sar, cst(0xffff_fff8, 32), cst(1, 8));
    assert_eq!(lift_expr(&shr).simplify().as_u64(), Some(0xffff_fffc));

    // The 8-bit shift amount is widened to the base's width.
    let shl = Expr::binop(BinOp::Shl, cst(1, 64), cst(3, 8));
    let lifted = lift_expr(&shl);
    assert_eq!(lifted.get_size(), 64);
    assert_eq!(lifted.simplify().as_u64(), Some(8));
}

#[test]
fn lift_widening_multiply() {
    // -1 * 2 at 32 bits, sign-extended into a 64-bit product.
    let mul = Expr::binop(
        BinOp::MulWiden { signed: true },
        cst(0xffff_ffff, 32),
        cst(2, 32),
    );
    let lifted = lift_expr(&mul);
    assert_eq!(lifted.get_size(), 64);
    assert_eq!(lifted.simplify().as_u64(), Some(0xffff_ffff_ffff_fffe));
}

#[test]
fn lift_concat_and_division() {
    let concat = Expr::binop(
        BinOp::Concat {
            src_width: 32,
            dst_width: 64,
        },
        cst(0xdead_beef, 32),
        cst(0x1234_5678, 32),
    );
    let lifted = lift_expr(&concat);
    assert_eq!(lifted.get_size(), 64);
    assert_eq!(lifted.simplify().as_u64(), Some(0xdead_beef_1234_5678));

    // The narrower divisor is zero-extended up to the dividend's width.
    let div = Expr::binop(BinOp::Div { signed: false }, cst(100, 64), cst(7, 32));
    let lifted = lift_expr(&div);
    assert_eq!(lifted.get_size(), 64);
    assert_eq!(lifted.simplify().as_u64(), Some(14));

    // Remainder widens the same way.
    let rem = Expr::binop(BinOp::Mod { signed: false }, cst(100, 64), cst(7, 32));
    let lifted = lift_expr(&rem);
    assert_eq!(lifted.get_size(), 64);
    assert_eq!(lifted.simplify().as_u64(), Some(2));
}

#[test]
fn lift_rounded_casts_track_widths() {
    // The rounding-mode operand in the first slot is ignored.
    let rmode = cst(0, 32);
    let widen = Expr::binop(
        BinOp::CastRounded {
            signed: true,
            src_width: 8,
            dst_width: 32,
        },
        rmode.clone(),
        cst(0xff, 8),
    );
    let lifted = lift_expr(&widen);
    assert_eq!(lifted.get_size(), 32);
    assert_eq!(lifted.simplify().as_u64(), Some(0xffff_ffff));

    let narrow = Expr::binop(
        BinOp::CastRounded {
            signed: false,
            src_width: 64,
            dst_width: 32,
        },
        rmode,
        cst(0xdead_beef_cafe_babe, 64),
    );
    let lifted = lift_expr(&narrow);
    assert_eq!(lifted.get_size(), 32);
    assert_eq!(lifted.simplify().as_u64(), Some(0xcafe_babe));
}

#[test]
fn lift_nan_sentinel_as_zero() {
    let nan = Expr::Const(Const {
        value: ConstValue::Nan,
        width: 32,
    });
    let lifted = lift_expr(&nan);
    assert_eq!(lifted.get_size(), 32);
    assert_eq!(lifted.simplify().as_u64(), Some(0));
}

#[test]
fn lift_opaque_symbols_are_deterministic() {
    // Float comparison: an opaque 32-bit symbol regardless of operand widths.
    let cmpf = Expr::binop(BinOp::CmpF, cst(1, 64), cst(2, 64));
    assert_eq!(lift_expr(&cmpf).get_size(), 32);

    // Identical register-array reads share one symbol.
    let read = Expr::RegArrayRead {
        base: 872,
        elem_width: 64,
        index: Box::new(cst(3, 8)),
    };
    let lifted = lift_expr(&read);
    assert_eq!(lifted.get_size(), 64);
    assert_bv_equiv(&lifted, &lift_expr(&read));

    // Helper calls are sized by their declared return width.
    let call = Expr::CallHelper {
        callee: "amd64g_calculate_rflags_c".into(),
        ret_width: 64,
        args: vec![],
    };
    let lifted = lift_expr(&call);
    assert_eq!(lifted.get_size(), 64);
    assert_bv_equiv(&lifted, &lift_expr(&call));
}

#[test]
fn lift_comparisons_yield_single_bits() {
    // -8 < 0 signed: true.
    let lt = Expr::binop(
        BinOp::CmpLt { signed: true },
        cst(0xffff_ffff_ffff_fff8, 64),
        cst(0, 64),
    );
    let lifted = lift_expr(&lt);
    assert_eq!(lifted.get_size(), 1);
    assert_eq!(lifted.simplify().as_u64(), Some(1));

    // Same operands unsigned: false.
    let lt = Expr::binop(
        BinOp::CmpLt { signed: false },
        cst(0xffff_ffff_ffff_fff8, 64),
        cst(0, 64),
    );
    assert_eq!(lift_expr(&lt).simplify().as_u64(), Some(0));
}

#[test]
fn lift_register_reads_at_every_width() {
    assert_eq!(lift_expr(&get(RAX, 64)).get_size(), 64);
    assert_eq!(lift_expr(&get(RAX, 32)).get_size(), 32);
    // High-byte alias one offset above the parent.
    assert_eq!(lift_expr(&get(RAX + 1, 8)).get_size(), 8);
    // Upper vector lane eight offsets above its base.
    assert_eq!(lift_expr(&get(224 + 8, 64)).get_size(), 64);

    // A 32-bit read is exactly the low half of the 64-bit read.
    let full = lift_expr(&get(RAX, 64));
    let half = lift_expr(&get(RAX, 32));
    assert_bv_equiv(&half, &full.extract(31, 0));
}

#[test]
#[should_panic]
fn lift_rejects_unclassified_register_offsets() {
    lift_expr(&get(0, 64));
}

#[test]
#[should_panic]
fn lift_rejects_unsupported_load_widths() {
    lift_expr(&Expr::Load {
        width: 128,
        addr: Box::new(get(RAX, 64)),
    });
}

#[test]
fn lift_degrades_unhandled_operators_to_first_operand() {
    let op = Expr::binop(BinOp::Unhandled("Iop_QAdd8Ux8".into()), cst(7, 32), cst(9, 32));
    assert_eq!(lift_expr(&op).simplify().as_u64(), Some(7));
}

#[test]
fn lift_resolves_temporaries_through_definitions() {
    let mut cfg = Cfg::new();
    cfg.add_node(0x8000, 8, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x8000,
        stmts: vec![def_tmp(
            0,
            Expr::binop(BinOp::Add, get(RAX, 64), cst(0x10, 64)),
        )],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    let lifted = Lifter::new(&analysis).lift(&Expr::Temp(0), 0x8000);
    let expected = BV::new_const("rax", 64).bvadd(&BV::from_u64(0x10, 64));
    assert_bv_equiv(&lifted, &expected);
}

#[test]
#[should_panic]
fn lift_rejects_undefined_temporaries() {
    let mut cfg = Cfg::new();
    cfg.add_node(0x9000, 4, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0x9000,
        stmts: vec![],
    }]);
    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);
    Lifter::new(&analysis).lift(&Expr::Temp(42), 0x9000);
}

#[test]
fn constant_offset_proves_unique_differences() {
    let x = BV::new_const("x", 64);
    let five_past = x.bvadd(&BV::from_u64(5, 64));
    assert_eq!(constant_offset(&five_past, &x, &[]), Some(5));
    assert_eq!(constant_offset(&x, &x, &[]), Some(0));

    // Unrelated symbols have no fixed difference.
    let y = BV::new_const("y", 64);
    assert_eq!(constant_offset(&x, &y, &[]), None);

    // A path condition can pin the difference down.
    let cond = x.eq(&y.bvadd(&BV::from_u64(3, 64)));
    assert_eq!(constant_offset(&x, &y, &[cond]), Some(3));
}

#[test]
fn constant_offset_of_lifted_addresses() {
    let a = lift_expr(&Expr::binop(BinOp::Add, get(RBP, 64), cst(0x10, 64)));
    let b = lift_expr(&Expr::binop(BinOp::Add, get(RBP, 64), cst(0x8, 64)));
    assert_eq!(constant_offset(&a, &b, &[]), Some(8));
}

#[test]
fn traverse_dumps_reachable_blocks() {
    let mut cfg = Cfg::new();
    let a = cfg.add_node(0xa000, 8, "func");
    let b = cfg.add_node(0xa100, 8, "func+0x100");
    cfg.add_edge(a, b);
    let lifter = MapLifter::new([
        IrBlock {
            addr: 0xa000,
            stmts: vec![put(RAX, cst(1, 64))],
        },
        IrBlock {
            addr: 0xa100,
            stmts: vec![def_tmp(0, get(RAX, 64))],
        },
    ]);

    let mut out: Vec<u8> = vec![];
    crate::cfg::traverse(&cfg, &lifter, None, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("func start addr: A000 of size: 8"));
    assert!(out.contains("func+0x100 start addr: A100 of size: 8"));
    assert!(out.contains("PUT(16) = 0x1:I64"));
    assert!(out.contains("successors: [0xa100]"));
}

#[test]
fn render_block_facts_dumps_entry_and_snapshots() {
    let mut cfg = Cfg::new();
    cfg.add_node(0xc000, 8, "entry");
    let lifter = MapLifter::new([IrBlock {
        addr: 0xc000,
        stmts: vec![put(RAX, cst(1, 64)), put(RCX, cst(2, 64))],
    }]);

    let mut analysis = Analysis::new(&AMD64);
    analysis.analyze_cfg(&cfg, &lifter);

    let mut out: Vec<u8> = vec![];
    analysis.render_block_facts(0xc000, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("In[]:"));
    // The snapshot after the second write names both definition sites.
    assert!(out.contains("rax: (0xc000 0)"));
    assert!(out.contains("rcx: (0xc000 1)"));
}

#[test]
fn log_drain_routes_diagnostics_to_file() {
    let path = std::env::temp_dir().join(format!("relift-log-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    {
        let logger = crate::log::FileAndTermDrain::new(2, true, true, Some(path.clone()));
        slog_scope::scope(&logger, || {
            // Drive a degrade-path diagnostic through the drain.
            let op = Expr::binop(BinOp::Unhandled("Iop_QAdd8Ux8".into()), cst(7, 32), cst(9, 32));
            assert_eq!(lift_expr(&op).simplify().as_u64(), Some(7));
        });
    }
    // The file drain flushes on shutdown of its worker; poll briefly.
    let mut contents = String::new();
    for _ in 0..50 {
        contents = std::fs::read_to_string(&path).unwrap_or_default();
        if contents.contains("Unhandled binary operator") {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    let _ = std::fs::remove_file(&path);
    assert!(contents.contains("Unhandled binary operator"));
    assert!(contents.contains("Iop_QAdd8Ux8"));
}

#[test]
fn cfg_renders_to_dot() {
    let mut cfg = Cfg::new();
    let a = cfg.add_node(0xb000, 4, "entry");
    let b = cfg.add_node(0xb100, 4, "exit");
    cfg.add_edge(a, b);

    let dot = cfg.generate_dot();
    assert!(dot.contains("digraph Cfg"));
    assert!(dot.contains("n0xb000"));
    assert!(dot.contains("n0xb000 -> n0xb100"));
}
