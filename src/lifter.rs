//! Translation of IR expressions into symbolic bit-vector formulas.
//!
//! The lifter walks an expression tree rooted at a register or temporary and
//! produces an equivalent `z3` bit-vector term, resolving temporaries through
//! the session's definition table and registers through its classification
//! table. Comparisons produce 1-bit vectors (one if the comparison holds).
//!
//! Not everything has a precise model. Register-array reads, helper calls and
//! floating-point comparisons become opaque symbols; an operator the lifter
//! does not recognize degrades to its first operand. Each such approximation
//! emits a diagnostic and is documented on the corresponding match arm. Width
//! bookkeeping, by contrast, is never approximate: a mismatch between an
//! operand's width and a cast's declared width indicates malformed IR and
//! fails fast.

use z3::ast::BV;

use crate::dataflow::Analysis;
use crate::ir::{BinOp, ConstValue, Expr, TriOp, UnOp};
use crate::log::*;

/// Byte-addressable load widths with a modeled load operator.
const SUPPORTED_LOAD_WIDTHS: [u32; 4] = [8, 16, 32, 64];

/// Lifts IR expressions of one analysis session into solver formulas.
pub struct Lifter<'s, 'a> {
    analysis: &'s Analysis<'a>,
}

impl<'s, 'a> Lifter<'s, 'a> {
    pub fn new(analysis: &'s Analysis<'a>) -> Self {
        Self { analysis }
    }

    /// Lift `expr`, as it occurs in the block at `block_addr`, into a
    /// bit-vector formula. Recursion stops at register reads, which become
    /// the canonical 64-bit register symbols.
    pub fn lift(&self, expr: &Expr, block_addr: u64) -> BV {
        match expr {
            Expr::Const(c) => match c.value {
                ConstValue::Bits(v) => BV::from_u64(v, c.width),
                // The not-a-number sentinel lifts to the literal zero.
                ConstValue::Nan => BV::from_u64(0, c.width),
            },

            Expr::Temp(tmp) => match self.analysis.def_of(block_addr, *tmp) {
                Some(def) => self.lift(def, block_addr),
                None => panic!(
                    "No definition recorded for temporary t{} in block {:#x}; temporaries are \
                     write-once per block, so a missing definition means malformed IR or a block \
                     that was never part of this session",
                    tmp, block_addr
                ),
            },

            Expr::RegRead { offset, width } => self.lift_reg_read(*offset, *width),

            Expr::Load { width, addr } => {
                assert!(
                    SUPPORTED_LOAD_WIDTHS.contains(width),
                    "Unsupported memory load width {}",
                    width
                );
                let addr = self.lift(addr, block_addr);
                // The load operator is width-specific and a pure function of
                // its address: identical lifted addresses share a symbol, but
                // the value is otherwise unconstrained.
                BV::new_const(format!("load{}[{}]", width, addr), *width)
            }

            Expr::Binop { op, args } => self.lift_binop(op, args, block_addr),

            Expr::Unop { op, arg } => self.lift_unop(op, arg, block_addr),

            // Rounding-mode float arithmetic and the rest of the wide-operator
            // families have no precise model: degrade to the first operand.
            Expr::Triop { op, args } => {
                match op {
                    TriOp::Unhandled(name) => {
                        warn!("Unhandled ternary operator"; "op" => %name)
                    }
                    _ => debug!("Float arithmetic not modeled"; "op" => ?op),
                }
                self.lift(&args[0], block_addr)
            }
            Expr::Qop { op, args } => {
                warn!("Unhandled quaternary operator"; "op" => ?op);
                self.lift(&args[0], block_addr)
            }

            Expr::Ite {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.lift(cond, block_addr);
                // Nonzero condition selects the true branch; a 1-bit
                // comparison result is already exactly that.
                let cond = cond
                    .eq(&BV::from_u64(0, cond.get_size()))
                    .not();
                let if_true = self.lift(if_true, block_addr);
                let if_false = self.lift(if_false, block_addr);
                assert_eq!(
                    if_true.get_size(),
                    if_false.get_size(),
                    "ITE branches must agree on width"
                );
                cond.ite(&if_true, &if_false)
            }

            // Evaluating a runtime index into the register array is out of
            // reach; produce a symbol named deterministically from the array
            // base and the index's textual form, so identical accesses reuse
            // the same symbol without being otherwise constrained.
            Expr::RegArrayRead {
                base,
                elem_width,
                index,
            } => {
                debug!("Register-array read lifted to opaque symbol"; "base" => *base, "ind" => %index);
                BV::new_const(format!("IRRegArray_{}[{}]", base, index), *elem_width)
            }

            // Helper-function semantics are opaque; the symbol is named from
            // the callee and sized by the declared return width.
            Expr::CallHelper {
                callee, ret_width, ..
            } => {
                debug!("Helper call lifted to opaque symbol"; "callee" => %callee);
                BV::new_const(format!("ccall-{}", callee), *ret_width)
            }
        }
    }

    /// Lift a register read: map the offset to its canonical 64-bit symbol
    /// and extract or extend to the requested width. Sub-register reads hit
    /// the two aliasing conventions: the high byte registers live one offset
    /// above their 64-bit parent, and upper vector lanes eight offsets above
    /// their 128-bit base.
    fn lift_reg_read(&self, offset: usize, width: u32) -> BV {
        let table = self.analysis.registers();

        if let Some(name) = table.name_of(offset) {
            let parent = BV::new_const(name, 64);
            return if width < 64 {
                parent.extract(width - 1, 0)
            } else {
                parent.zero_ext(width - 64)
            };
        }

        if let Some(name) = offset.checked_sub(1).and_then(|o| table.name_of(o)) {
            assert_eq!(width, 8, "High sub-register reads are 8 bits wide");
            return BV::new_const(name, 64).extract(15, 8);
        }

        if let Some(name) = offset.checked_sub(8).and_then(|o| table.name_of(o)) {
            assert_eq!(width, 64, "Upper vector-lane reads are 64 bits wide");
            return BV::new_const(name, 128).extract(127, 64);
        }

        panic!(
            "Register offset {} is neither classified nor an alias of a classified register",
            offset
        );
    }

    fn lift_binop(&self, op: &BinOp, args: &[Expr; 2], block_addr: u64) -> BV {
        // Comparisons produce a single bit: one if the comparison holds.
        let bit = |cond: z3::ast::Bool| cond.ite(&BV::from_u64(1, 1), &BV::from_u64(0, 1));

        match op {
            BinOp::Add => {
                let (l, r) = self.lift_pair(args, block_addr);
                l.bvadd(&r)
            }
            BinOp::Sub => {
                let (l, r) = self.lift_pair(args, block_addr);
                l.bvsub(&r)
            }
            BinOp::Mul => {
                let (l, r) = self.lift_pair(args, block_addr);
                l.bvmul(&r)
            }

            // Widening multiply: multiply at the narrow width, then extend the
            // product by one narrow width to reach the declared result width.
            BinOp::MulWiden { signed } => {
                let (l, r) = self.lift_pair(args, block_addr);
                let narrow = l.get_size();
                let product = l.bvmul(&r);
                if *signed {
                    product.sign_ext(narrow)
                } else {
                    product.zero_ext(narrow)
                }
            }

            BinOp::And => {
                let (l, r) = self.lift_pair(args, block_addr);
                l.bvand(&r)
            }
            BinOp::Or => {
                let (l, r) = self.lift_pair(args, block_addr);
                l.bvor(&r)
            }
            BinOp::Xor => {
                let (l, r) = self.lift_pair(args, block_addr);
                l.bvxor(&r)
            }

            BinOp::Shl => {
                let (base, index) = self.lift_shift_operands(args, block_addr);
                base.bvshl(&index)
            }
            BinOp::Shr => {
                let (base, index) = self.lift_shift_operands(args, block_addr);
                base.bvlshr(&index)
            }
            // No arithmetic-shift primitive is used; emulate with the
            // signed-divide piecewise rule: `(x+1)/2^n - 1` for negative `x`,
            // `x/2^n` otherwise.
            BinOp::Sar => {
                let (base, index) = self.lift_shift_operands(args, block_addr);
                let w = base.get_size();
                let zero = BV::from_u64(0, w);
                let one = BV::from_u64(1, w);
                let divisor = one.bvshl(&index);
                base.bvslt(&zero).ite(
                    &base.bvadd(&one).bvsdiv(&divisor).bvsub(&one),
                    &base.bvsdiv(&divisor),
                )
            }

            BinOp::Div { signed } => {
                let (l, r) = self.lift_widened_pair(args, block_addr);
                if *signed {
                    l.bvsdiv(&r)
                } else {
                    l.bvudiv(&r)
                }
            }
            BinOp::Mod { signed } => {
                let (l, r) = self.lift_widened_pair(args, block_addr);
                if *signed {
                    l.bvsrem(&r)
                } else {
                    l.bvurem(&r)
                }
            }

            BinOp::CmpEq => {
                let (l, r) = self.lift_pair(args, block_addr);
                bit(l.eq(&r))
            }
            BinOp::CmpNe => {
                let (l, r) = self.lift_pair(args, block_addr);
                bit(l.eq(&r).not())
            }
            BinOp::CmpGe { signed } => {
                let (l, r) = self.lift_pair(args, block_addr);
                bit(if *signed { l.bvsge(&r) } else { l.bvuge(&r) })
            }
            BinOp::CmpGt { signed } => {
                let (l, r) = self.lift_pair(args, block_addr);
                bit(if *signed { l.bvsgt(&r) } else { l.bvugt(&r) })
            }
            BinOp::CmpLe { signed } => {
                let (l, r) = self.lift_pair(args, block_addr);
                bit(if *signed { l.bvsle(&r) } else { l.bvule(&r) })
            }
            BinOp::CmpLt { signed } => {
                let (l, r) = self.lift_pair(args, block_addr);
                bit(if *signed { l.bvslt(&r) } else { l.bvult(&r) })
            }

            // Floating-point comparison is not precisely modeled: both
            // operands are lifted (surfacing any width defects in them) and
            // discarded in favor of a fresh opaque 32-bit symbol.
            BinOp::CmpF => {
                let _ = self.lift_pair(args, block_addr);
                debug!("Float comparison lifted to opaque symbol");
                BV::new_const("cmpf", 32)
            }

            // Conversion with a rounding-mode operand in `args[0]`; only the
            // value in `args[1]` is lifted, the rounding mode is ignored.
            BinOp::CastRounded {
                signed,
                src_width,
                dst_width,
            } => {
                let value = self.lift(&args[1], block_addr);
                assert_eq!(
                    value.get_size(),
                    *src_width,
                    "Cast source width disagrees with its operand"
                );
                if src_width < dst_width {
                    if *signed {
                        value.sign_ext(dst_width - src_width)
                    } else {
                        value.zero_ext(dst_width - src_width)
                    }
                } else {
                    value.extract(dst_width - 1, 0)
                }
            }

            // Concatenate the low `src_width` bits of each operand into one
            // `dst_width`-bit value, `args[0]` most significant.
            BinOp::Concat {
                src_width,
                dst_width,
            } => {
                let (l, r) = self.lift_pair(args, block_addr);
                assert!(
                    l.get_size() >= *src_width && r.get_size() >= *src_width,
                    "Concatenation operands narrower than the declared part width"
                );
                let high = l.extract(src_width - 1, 0);
                let low = r.extract(src_width - 1, 0);
                let ret = high.concat(&low);
                assert_eq!(
                    ret.get_size(),
                    *dst_width,
                    "Concatenation result width disagrees with its declaration"
                );
                ret
            }

            // Explicit unsound fallback: keep only the first operand.
            BinOp::Unhandled(name) => {
                warn!("Unhandled binary operator"; "op" => %name);
                self.lift(&args[0], block_addr)
            }
        }
    }

    fn lift_unop(&self, op: &UnOp, arg: &Expr, block_addr: u64) -> BV {
        match op {
            UnOp::Neg => self.lift(arg, block_addr).bvneg(),
            UnOp::Not => self.lift(arg, block_addr).bvnot(),
            // No absolute-value primitive on bit-vectors; select on the sign.
            UnOp::Abs => {
                let x = self.lift(arg, block_addr);
                let zero = BV::from_u64(0, x.get_size());
                x.bvslt(&zero).ite(&x.bvneg(), &x)
            }

            UnOp::Cast {
                signed,
                high,
                src_width,
                dst_width,
            } => {
                let x = self.lift(arg, block_addr);
                assert_eq!(
                    x.get_size(),
                    *src_width,
                    "Cast source width disagrees with its operand"
                );
                if dst_width > src_width {
                    if *signed {
                        x.sign_ext(dst_width - src_width)
                    } else {
                        x.zero_ext(dst_width - src_width)
                    }
                } else if *high {
                    x.extract(src_width - 1, src_width - dst_width)
                } else {
                    x.extract(dst_width - 1, 0)
                }
            }

            // Explicit unsound fallback: keep the operand as-is.
            UnOp::Unhandled(name) => {
                warn!("Unhandled unary operator"; "op" => %name);
                self.lift(arg, block_addr)
            }
        }
    }

    /// Lift both operands of a width-homogeneous operator.
    fn lift_pair(&self, args: &[Expr; 2], block_addr: u64) -> (BV, BV) {
        (
            self.lift(&args[0], block_addr),
            self.lift(&args[1], block_addr),
        )
    }

    /// Lift both operands of a division-family operator, zero-extending the
    /// narrower to the wider width.
    fn lift_widened_pair(&self, args: &[Expr; 2], block_addr: u64) -> (BV, BV) {
        let (mut l, mut r) = self.lift_pair(args, block_addr);
        if l.get_size() < r.get_size() {
            l = l.zero_ext(r.get_size() - l.get_size());
        } else if r.get_size() < l.get_size() {
            r = r.zero_ext(l.get_size() - r.get_size());
        }
        (l, r)
    }

    /// Lift a shift's base and amount. A narrower amount is brought up to the
    /// base's width: literals are re-materialized at the wider width, anything
    /// else is zero-extended.
    fn lift_shift_operands(&self, args: &[Expr; 2], block_addr: u64) -> (BV, BV) {
        let (base, mut index) = self.lift_pair(args, block_addr);
        if index.get_size() < base.get_size() {
            index = match index.as_u64() {
                Some(v) => BV::from_u64(v, base.get_size()),
                None => index.zero_ext(base.get_size() - index.get_size()),
            };
        }
        (base, index)
    }
}
