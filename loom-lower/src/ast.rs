//! The surface AST a parser targets. This crate owns no lexer/parser; a source-text
//! frontend is an external collaborator that builds this tree and hands it to
//! [`crate::lower`].

/// A parsed program: bundle declarations and spindle definitions, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub bundles: Vec<BundleDecl>,
    pub spindles: Vec<SpindleDecl>,
}

/// One `name[tag?] = body` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleDecl {
    pub name: String,
    /// An optional `#tag` attached to the declaration, resolved by [`TagRef`](Expr::TagRef)
    /// elsewhere in the program.
    pub tag: Option<String>,
    pub body: BundleBody,
}

/// A bundle either lists its strands directly (most declarations) or is produced by
/// re-partitioning a single chain expression through named outputs (the
/// `a[x,y,z] = base -> {...}` form, §4.B "Chain patterns").
#[derive(Debug, Clone, PartialEq)]
pub enum BundleBody {
    Strands(Vec<StrandDecl>),
    Chain { names: Vec<String>, expr: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrandDecl {
    pub name: Option<String>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpindleDecl {
    pub name: String,
    pub params: Vec<String>,
    pub locals: Vec<BundleDecl>,
    pub returns: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An endpoint of a `..` range; `None` means "open", resolved against the current
/// context's width during chain expansion.
pub type RangeEnd = Option<i64>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    /// A bare identifier: a bundle name, a coordinate on `me`, a spindle param, or a
    /// local bundle name, disambiguated during lowering by scope.
    Ident(String),
    /// `base.field` — `field` may itself later resolve to a numeric index.
    Field(Box<Expr>, String),
    /// `base.(indexExpr)` — dynamic or computed index.
    Index(Box<Expr>, Box<Expr>),
    /// A bare accessor (`.0`, `.name`, `.(expr)`) with no explicit base, valid only
    /// inside a chain pattern output (the "implicit previous" context).
    BareAccessor(BareAccessor),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Call(String, Vec<Expr>),
    BundleLiteral(Vec<Expr>),
    /// `base -> { pattern0, pattern1, ... }`.
    Chain(Box<Expr>, Vec<PatternBlock>),
    /// `bundle.strand(me.t ~ expr)`.
    TemporalRemap { base: Box<Expr>, shifted_t: Box<Expr> },
    /// `a..b`, valid only inside a pattern output.
    Range(RangeEnd, RangeEnd),
    /// `#tagName` — resolves to whichever bundle declared that tag.
    TagRef(String),
    Load { path: String, u: Option<Box<Expr>>, v: Option<Box<Expr>> },
    Text { text: String, u: Box<Expr>, v: Box<Expr> },
    Sample { path: String, offset: Option<Box<Expr>> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BareAccessor {
    Index(i64),
    Name(String),
    Dynamic(Box<Expr>),
}

/// One pattern block's outputs. Each output expression may use [`Expr::BareAccessor`]
/// and [`Expr::Range`] against the previous step's width.
pub type PatternBlock = Vec<Expr>;
