//! Architecture-neutral intermediate representation of lifted basic blocks.
//!
//! Inspired by (but distinct from) Valgrind's VEX intermediate
//! representation: blocks are ordered lists of
//! statements, temporaries are block-local and write-once, and guest registers
//! are addressed by their raw offset into the guest state.

use itertools::Itertools;

/// A block-local temporary. Unique within one [`IrBlock`]; written at most once.
pub type Temp = u32;

/// The width of a value, in bits.
pub type Width = u32;

/// A constant operand, carrying its declared width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Const {
    /// The raw bit pattern. Only the low `width` bits are meaningful.
    pub value: ConstValue,
    /// Declared width of the constant, in bits.
    pub width: Width,
}

/// The payload of a [`Const`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ConstValue {
    /// An ordinary integer constant.
    Bits(u64),
    /// The not-a-number sentinel some lifters emit for float immediates.
    Nan,
}

impl Const {
    /// An ordinary integer constant of the given width.
    pub fn bits(value: u64, width: Width) -> Self {
        Self {
            value: ConstValue::Bits(value),
            width,
        }
    }
}

/// A binary operator. Closed set: anything the disassembler front-end emits
/// that has no listed counterpart must be mapped to [`BinOp::Unhandled`], which
/// downstream consumers treat as an explicit, documented approximation.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinOp {
    /// Wrapping sum `arg0 + arg1`
    Add,
    /// Wrapping subtraction `arg0 - arg1`
    Sub,
    /// Wrapping multiplication `arg0 * arg1`, result width equals operand width
    Mul,
    /// Widening multiplication: narrow × narrow → double-width result,
    /// sign- or zero-extended per `signed`
    MulWiden { signed: bool },
    /// Bitwise AND
    And,
    /// Bitwise OR
    Or,
    /// Bitwise XOR
    Xor,
    /// Left shift `arg0 << arg1`; the shift amount may be narrower than the base
    Shl,
    /// Logical (unsigned) right shift `arg0 u>> arg1`
    Shr,
    /// Arithmetic (signed) right shift `arg0 s>> arg1`
    Sar,
    /// Integer division; `signed` selects signed vs unsigned semantics
    Div { signed: bool },
    /// Integer remainder; `signed` selects signed vs unsigned semantics
    Mod { signed: bool },
    /// Equality comparison, producing a 1-bit value
    CmpEq,
    /// Inequality comparison, producing a 1-bit value
    CmpNe,
    /// Ordering comparison `arg0 >= arg1`, producing a 1-bit value
    CmpGe { signed: bool },
    /// Ordering comparison `arg0 > arg1`, producing a 1-bit value
    CmpGt { signed: bool },
    /// Ordering comparison `arg0 <= arg1`, producing a 1-bit value
    CmpLe { signed: bool },
    /// Ordering comparison `arg0 < arg1`, producing a 1-bit value
    CmpLt { signed: bool },
    /// Floating-point comparison. Not modeled precisely anywhere downstream.
    CmpF,
    /// A conversion that carries a rounding-mode operand in `arg0` and the
    /// value being converted in `arg1` (float-to-int truncations and friends).
    /// The rounding mode is ignored by consumers.
    CastRounded {
        signed: bool,
        src_width: Width,
        dst_width: Width,
    },
    /// Concatenate the low `src_width` bits of `arg0` (high part) and `arg1`
    /// (low part) into one `dst_width`-bit value.
    Concat { src_width: Width, dst_width: Width },
    /// An operator with no precise model; carries the front-end's name of the
    /// operator for diagnostics.
    Unhandled(String),
}

/// A unary operator.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum UnOp {
    /// Two's complement negation `-arg0`
    Neg,
    /// One's complement `~arg0`
    Not,
    /// Integer absolute value `|arg0|`
    Abs,
    /// Width conversion from `src_width` to `dst_width` bits. Widening uses
    /// sign- or zero-extension per `signed`; narrowing truncates, keeping the
    /// high `dst_width` bits when `high` is set and the low bits otherwise.
    Cast {
        signed: bool,
        high: bool,
        src_width: Width,
        dst_width: Width,
    },
    /// An operator with no precise model; carries the front-end's name.
    Unhandled(String),
}

/// A ternary operator. Only the rounding-mode float arithmetic family shows up
/// here in practice; none of it is modeled precisely downstream.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TriOp {
    /// Float sum with rounding mode in `arg0`
    FloatAdd,
    /// Float difference with rounding mode in `arg0`
    FloatSub,
    /// Float product with rounding mode in `arg0`
    FloatMul,
    /// Float quotient with rounding mode in `arg0`
    FloatDiv,
    /// An operator with no precise model; carries the front-end's name.
    Unhandled(String),
}

/// A quaternary operator. Nothing in this family is modeled precisely.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum QuadOp {
    /// An operator with no precise model; carries the front-end's name.
    Unhandled(String),
}

/// An IR expression: a closed tagged union over every form the front-end can
/// produce. Expressions are trees; sharing happens only through [`Expr::Temp`]
/// references resolved against the per-block definition table.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expr {
    /// A literal constant
    Const(Const),
    /// Read of a block-local temporary
    Temp(Temp),
    /// Read of `width` bits of guest register state at raw offset `offset`
    RegRead { offset: usize, width: Width },
    /// Load of `width` bits from the address computed by `addr`
    Load { width: Width, addr: Box<Expr> },
    /// Unary operator application
    Unop { op: UnOp, arg: Box<Expr> },
    /// Binary operator application
    Binop { op: BinOp, args: Box<[Expr; 2]> },
    /// Ternary operator application
    Triop { op: TriOp, args: Box<[Expr; 3]> },
    /// Quaternary operator application
    Qop { op: QuadOp, args: Box<[Expr; 4]> },
    /// Value selection: `if cond != 0 { if_true } else { if_false }`
    Ite {
        cond: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Read of one `elem_width`-bit element of the guest register array based
    /// at raw offset `base`, indexed by a runtime value. Not modeled precisely
    /// anywhere downstream.
    RegArrayRead {
        base: usize,
        elem_width: Width,
        index: Box<Expr>,
    },
    /// Call to an architecture helper function returning `ret_width` bits. The
    /// helper's semantics are opaque to all analyses.
    CallHelper {
        callee: String,
        ret_width: Width,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Convenience constructor for a binary operator application.
    pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binop {
            op,
            args: Box::new([lhs, rhs]),
        }
    }

    /// Convenience constructor for a unary operator application.
    pub fn unop(op: UnOp, arg: Expr) -> Self {
        Expr::Unop {
            op,
            arg: Box::new(arg),
        }
    }
}

/// One IR statement within a block. The dataflow passes only interpret
/// register writes and temp writes; everything else either gets a diagnostic
/// ([`Stmt::RegArrayWrite`]) or is skipped.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Stmt {
    /// Write `data` to guest register state at raw offset `offset`
    RegWrite { offset: usize, data: Expr },
    /// Write `data` to one element of the guest register array based at raw
    /// offset `base`. Not modeled by the dataflow passes.
    RegArrayWrite {
        base: usize,
        index: Expr,
        data: Expr,
    },
    /// Define the block-local temporary `tmp` as `data`. Each temporary is
    /// written at most once per block.
    TempWrite { tmp: Temp, data: Expr },
    /// Store `data` to the address computed by `addr`
    Store { addr: Expr, data: Expr },
    /// Anything else (instruction marks, guarded exits, hints); carries the
    /// front-end's name for diagnostics
    Other(String),
}

/// The lifted IR of one basic block.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IrBlock {
    /// Machine address of the block's first instruction. Stable across
    /// re-lifting; used as the block's identity throughout the analysis.
    pub addr: u64,
    /// The block's statements, in execution order.
    pub stmts: Vec<Stmt>,
}

impl std::fmt::Display for Const {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.value {
            ConstValue::Bits(v) => write!(f, "{:#x}:I{}", v, self.width),
            ConstValue::Nan => write!(f, "nan:I{}", self.width),
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Temp(t) => write!(f, "t{}", t),
            Expr::RegRead { offset, width } => write!(f, "GET:I{}({})", width, offset),
            Expr::Load { width, addr } => write!(f, "LD:I{}({})", width, addr),
            Expr::Unop { op, arg } => write!(f, "{:?}({})", op, arg),
            Expr::Binop { op, args } => write!(f, "{:?}({},{})", op, args[0], args[1]),
            Expr::Triop { op, args } => {
                write!(f, "{:?}({},{},{})", op, args[0], args[1], args[2])
            }
            Expr::Qop { op, args } => write!(
                f,
                "{:?}({})",
                op,
                args.iter().map(|a| a.to_string()).join(",")
            ),
            Expr::Ite {
                cond,
                if_true,
                if_false,
            } => write!(f, "ITE({},{},{})", cond, if_true, if_false),
            Expr::RegArrayRead { base, index, .. } => write!(f, "GETI({})[{}]", base, index),
            Expr::CallHelper { callee, args, .. } => write!(
                f,
                "{}({})",
                callee,
                args.iter().map(|a| a.to_string()).join(",")
            ),
        }
    }
}

impl std::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Stmt::RegWrite { offset, data } => write!(f, "PUT({}) = {}", offset, data),
            Stmt::RegArrayWrite { base, index, data } => {
                write!(f, "PUTI({})[{}] = {}", base, index, data)
            }
            Stmt::TempWrite { tmp, data } => write!(f, "t{} = {}", tmp, data),
            Stmt::Store { addr, data } => write!(f, "ST({}) = {}", addr, data),
            Stmt::Other(what) => write!(f, "{}", what),
        }
    }
}
