//! Proving that two symbolic values differ by a unique constant.

use z3::ast::{Bool, BV};
use z3::{SatResult, Solver};

use crate::log::*;

/// If `exp1 - exp2` is the same constant under every assignment satisfying
/// `conds`, return that constant (as the unsigned value of the difference at
/// the operands' width); otherwise `None`.
///
/// `None` covers both genuinely varying differences and solver failure
/// (unsatisfiable constraints, unknown): the caller cannot distinguish "not
/// constant" from "could not prove constant", and does not need to.
pub fn constant_offset(exp1: &BV, exp2: &BV, conds: &[Bool]) -> Option<u64> {
    assert_eq!(
        exp1.get_size(),
        exp2.get_size(),
        "Offset operands must agree on width"
    );

    let solver = Solver::new();
    for cond in conds {
        solver.assert(cond);
    }
    let off = BV::new_const("off", exp1.get_size());
    solver.assert(&off.eq(&exp1.bvsub(exp2)));

    if solver.check() != SatResult::Sat {
        debug!("Offset constraints unsatisfiable or unknown");
        return None;
    }
    let model = solver.get_model()?;
    let value = model.eval(&off, true)?.as_u64()?;

    // The difference is a unique constant exactly when no satisfying
    // assignment gives it any other value.
    solver.assert(&off.eq(&BV::from_u64(value, off.get_size())).not());
    match solver.check() {
        SatResult::Unsat => Some(value),
        _ => None,
    }
}
