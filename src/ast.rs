//! Minimal AST types for Weft's Python parser.
//!
//! Design goals:
//! - Zero-copy: identifiers borrow `&'src str` slices from the source buffer.
//! - Flat expressions: instead of a recursive expression tree, each expression
//!   is reduced to an [`ExprInfo`] that pre-collects what relationship
//!   extraction actually needs (name reads and call sites with their callee
//!   shape).
//! - Compact: only the statement kinds the detectors and the warning scan
//!   inspect.  Everything else becomes [`StmtKind::Expr`] with names and
//!   calls pre-collected.

// ── Location ─────────────────────────────────────────────────────────────────

/// Byte offset of a token in the source file (0-indexed).
/// Using `u32` keeps nodes small; files >4 GB are not realistic.
pub type Offset = u32;

// ── Call sites ────────────────────────────────────────────────────────────────

/// The shape of a call's callee, as far as static analysis can see it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Callee<'src> {
    /// `foo(...)`
    Name(&'src str),
    /// `mod.foo(...)` — exactly one attribute hop.
    Attr(&'src str, &'src str),
    /// `a.b.c(...)`, `a.b().c(...)`, subscripted callees, etc.
    /// These shapes are never tracked as relationships.
    Chained,
    /// `getattr(obj, name)(...)` — the canonical dynamic-dispatch shape.
    GetattrDynamic,
}

/// One call site found while scanning an expression.
#[derive(Debug, Clone)]
pub struct CallInfo<'src> {
    pub callee: Callee<'src>,
    /// Byte offset of the first callee token.
    pub offset: Offset,
}

// ── Expression info ───────────────────────────────────────────────────────────

/// Everything relationship extraction needs from an expression, without a
/// full tree.  Collected in a single forward pass over the token stream.
#[derive(Debug, Default, Clone)]
pub struct ExprInfo<'src> {
    /// Every `Name` token found in this expression that is a *read*.
    pub names: Vec<(&'src str, Offset)>,

    /// Every call site, in source order, with its callee shape.
    pub calls: Vec<CallInfo<'src>>,

    /// The top-level "shape" of the expression — used to recognise guard
    /// conditions (`if TYPE_CHECKING:`, `if sys.version_info >= …:`) and
    /// decorator references.
    pub kind: ExprKind<'src>,
}

/// Top-level "shape" of an expression — only the patterns consumers care about.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum ExprKind<'src> {
    /// A bare identifier: `foo`.
    Name(&'src str),
    /// `obj.attr` — first two links of a dotted chain.
    Attr(&'src str, &'src str),
    /// Anything more complex.
    #[default]
    Other,
}

// ── Assignment targets ────────────────────────────────────────────────────────

/// The left-hand side of an assignment.
#[derive(Debug, Clone)]
pub enum AssignTarget<'src> {
    /// `x = …`
    Name(&'src str, Offset),
    /// `obj.attr = …` — the shape monkey-patch detection inspects.
    Attr {
        base: &'src str,
        attr: &'src str,
        offset: Offset,
    },
    /// Tuple/list/starred/subscript targets — nothing to track.
    Other,
}

// ── Import aliases ────────────────────────────────────────────────────────────

/// One name inside an import statement.
///
/// For `import os.path`: `name = "os.path"`, `asname = None`.
/// For `from x import y as z`: `name = "y"`, `asname = Some("z")`.
#[derive(Debug, Clone)]
pub struct ImportAlias<'src> {
    pub name: &'src str,
    pub asname: Option<&'src str>,
    /// Byte offset of this alias within the import statement.
    pub offset: Offset,
}

// ── Function / Class definitions ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FuncDef<'src> {
    pub name: &'src str,
    pub offset: Offset,
    pub is_async: bool,
    /// Decorator expressions applied to this function.
    pub decorators: Vec<ExprInfo<'src>>,
    pub body: Vec<Stmt<'src>>,
}

#[derive(Debug, Clone)]
pub struct ClassDef<'src> {
    pub name: &'src str,
    pub offset: Offset,
    /// Base class expressions.
    pub bases: Vec<ExprInfo<'src>>,
    /// Keyword arguments in the class header, e.g. `metaclass=Meta`.
    pub keywords: Vec<(&'src str, ExprInfo<'src>)>,
    pub decorators: Vec<ExprInfo<'src>>,
    pub body: Vec<Stmt<'src>>,
}

// ── Exception handlers ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExceptHandler<'src> {
    /// Names referenced in the exception type expression
    /// (`except ImportError:` → `["ImportError"]`).
    pub type_names: Vec<&'src str>,
    pub body: Vec<Stmt<'src>>,
}

// ── Statements ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Stmt<'src> {
    /// Byte offset of the first token of this statement.
    pub offset: Offset,
    pub kind: StmtKind<'src>,
}

#[derive(Debug, Clone)]
pub enum StmtKind<'src> {
    /// `import a, b.c, d as e`
    Import(Vec<ImportAlias<'src>>),
    /// `from .pkg import x, y as z`
    ImportFrom {
        /// Dotted module name; `None` for bare `from . import …`.
        module: Option<&'src str>,
        names: Vec<ImportAlias<'src>>,
        /// Number of leading dots (relative import level).
        level: u32,
        /// True for `from m import *`.
        star: bool,
    },

    FunctionDef(Box<FuncDef<'src>>),
    ClassDef(Box<ClassDef<'src>>),

    /// `a = expr`, `a.b = expr`, `a: T = expr`
    Assign {
        targets: Vec<AssignTarget<'src>>,
        value: ExprInfo<'src>,
    },

    If {
        test: ExprInfo<'src>,
        body: Vec<Stmt<'src>>,
        orelse: Vec<Stmt<'src>>,
    },
    Try {
        body: Vec<Stmt<'src>>,
        handlers: Vec<ExceptHandler<'src>>,
        orelse: Vec<Stmt<'src>>,
        finalbody: Vec<Stmt<'src>>,
    },
    For {
        iter: ExprInfo<'src>,
        body: Vec<Stmt<'src>>,
        orelse: Vec<Stmt<'src>>,
    },
    While {
        test: ExprInfo<'src>,
        body: Vec<Stmt<'src>>,
        orelse: Vec<Stmt<'src>>,
    },
    With {
        items: Vec<ExprInfo<'src>>,
        body: Vec<Stmt<'src>>,
    },

    /// A compound statement we don't model structurally (`match`/`case`
    /// arms, unrecognised block headers): header facts plus body.
    Block {
        header: ExprInfo<'src>,
        body: Vec<Stmt<'src>>,
    },

    /// Any simple statement reduced to its expression facts: bare
    /// expressions, `return`/`raise`/`assert`/`del` tails, augmented
    /// assignments, and anything structurally unrecognised.
    Expr(ExprInfo<'src>),
}
