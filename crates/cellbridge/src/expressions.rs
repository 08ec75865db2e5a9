//! Statement and expression tree produced by the parser and walked by the interpreter.
//!
//! The tree is deliberately smaller than the ruff AST it is lowered from: syntax the
//! interpreter does not run is rejected while parsing, so every variant here has an
//! evaluation rule.

use std::rc::Rc;

use crate::parse::{CodeRange, SourceFile};

/// A name reference with the position it appears at.
#[derive(Debug, Clone)]
pub(crate) struct Identifier {
    pub name: Rc<str>,
    pub position: CodeRange,
}

impl Identifier {
    pub fn new(name: &str, position: CodeRange) -> Self {
        Self {
            name: Rc::from(name),
            position,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
}

/// Binary operators, including the short-circuiting boolean pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    And,
    Or,
}

impl Operator {
    /// The source symbol, used in `TypeError` messages.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mult => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "** or pow()",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

/// Conversion applied to an f-string interpolation (`!s`, `!r`, `!a`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConversionFlag {
    None,
    Str,
    Repr,
    Ascii,
}

#[derive(Debug, Clone)]
pub(crate) enum FStringPart {
    Literal(Rc<str>),
    Interpolation {
        expr: Box<ExprLoc>,
        conversion: ConversionFlag,
    },
}

/// A keyword argument at a call site (`key=value`).
#[derive(Debug, Clone)]
pub(crate) struct Kwarg {
    pub key: Rc<str>,
    pub value: ExprLoc,
}

/// Arguments of a call expression.
#[derive(Debug, Clone, Default)]
pub(crate) struct ArgExprs {
    pub positional: Vec<ExprLoc>,
    /// `*expr` unpacked after the positional arguments.
    pub var_args: Option<ExprLoc>,
    pub kwargs: Vec<Kwarg>,
    /// `**expr` unpacked after the keyword arguments.
    pub var_kwargs: Option<ExprLoc>,
}

/// One `for ... in ... if ...` clause of a comprehension.
#[derive(Debug, Clone)]
pub(crate) struct Comprehension {
    pub target: Target,
    pub iter: ExprLoc,
    pub ifs: Vec<ExprLoc>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExprLoc {
    pub position: CodeRange,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(position: CodeRange, expr: Expr) -> Self {
        Self { position, expr }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Literal),
    Name(Identifier),
    Call {
        callable: Box<ExprLoc>,
        args: Box<ArgExprs>,
    },
    /// Method call on an object, dispatched without materialising a bound method.
    AttrCall {
        object: Box<ExprLoc>,
        attr: Rc<str>,
        args: Box<ArgExprs>,
    },
    AttrGet {
        object: Box<ExprLoc>,
        attr: Rc<str>,
    },
    Subscript {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    Slice {
        lower: Option<Box<ExprLoc>>,
        upper: Option<Box<ExprLoc>>,
        step: Option<Box<ExprLoc>>,
    },
    Op {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    /// A comparison chain `a < b <= c`; every middle operand is evaluated once.
    Compare {
        left: Box<ExprLoc>,
        comparisons: Vec<(CmpOperator, ExprLoc)>,
    },
    Not(Box<ExprLoc>),
    UnaryMinus(Box<ExprLoc>),
    UnaryPlus(Box<ExprLoc>),
    UnaryInvert(Box<ExprLoc>),
    IfElse {
        test: Box<ExprLoc>,
        body: Box<ExprLoc>,
        orelse: Box<ExprLoc>,
    },
    List(Vec<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Dict(Vec<(ExprLoc, ExprLoc)>),
    ListComp {
        elt: Box<ExprLoc>,
        generators: Vec<Comprehension>,
    },
    Lambda(Rc<FunctionDef>),
    FString(Vec<FStringPart>),
}

/// Assignment, `for` and `del` target.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Name(Identifier),
    Attr {
        object: ExprLoc,
        attr: Rc<str>,
    },
    Subscript {
        object: ExprLoc,
        index: ExprLoc,
    },
    Unpack {
        targets: Vec<Target>,
        position: CodeRange,
    },
}

/// A parameter with its unevaluated default.
#[derive(Debug, Clone)]
pub(crate) struct ParsedParam {
    pub name: Rc<str>,
    pub default: Option<ExprLoc>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedSignature {
    pub args: Vec<ParsedParam>,
    pub var_args: Option<Rc<str>>,
    pub kwargs: Vec<ParsedParam>,
    pub var_kwargs: Option<Rc<str>>,
}

#[derive(Debug, Clone)]
pub(crate) enum FunctionBody {
    Block(Vec<NodeLoc>),
    /// A lambda body: the expression value is the return value.
    Expr(ExprLoc),
}

/// A `def` or `lambda`, shared between the tree and every function value created from it.
#[derive(Debug)]
pub(crate) struct FunctionDef {
    pub name: Rc<str>,
    pub signature: ParsedSignature,
    pub body: FunctionBody,
    /// Names declared `global` anywhere in the body.
    pub globals: Vec<Rc<str>>,
    /// Names bound anywhere in the body; reading one before it is bound is an `UnboundLocalError`.
    pub local_names: Vec<Rc<str>>,
    pub source: Rc<SourceFile>,
}

#[derive(Debug)]
pub(crate) struct ClassDef {
    pub name: Rc<str>,
    pub body: Vec<NodeLoc>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExceptHandler {
    /// `None` for a bare `except:`.
    pub exc_type: Option<ExprLoc>,
    pub name: Option<Rc<str>>,
    pub body: Vec<NodeLoc>,
}

#[derive(Debug, Clone)]
pub(crate) struct Try {
    pub body: Vec<NodeLoc>,
    pub handlers: Vec<ExceptHandler>,
    pub or_else: Vec<NodeLoc>,
    pub finally: Vec<NodeLoc>,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Expr(ExprLoc),
    Assign {
        targets: Vec<Target>,
        value: ExprLoc,
    },
    OpAssign {
        target: Target,
        op: Operator,
        value: ExprLoc,
    },
    Delete(Vec<Target>),
    If {
        test: ExprLoc,
        body: Vec<NodeLoc>,
        or_else: Vec<NodeLoc>,
    },
    While {
        test: ExprLoc,
        body: Vec<NodeLoc>,
        or_else: Vec<NodeLoc>,
    },
    For {
        target: Target,
        iter: ExprLoc,
        body: Vec<NodeLoc>,
        or_else: Vec<NodeLoc>,
    },
    FunctionDef(Rc<FunctionDef>),
    ClassDef(Rc<ClassDef>),
    Return(Option<ExprLoc>),
    Raise(Option<ExprLoc>),
    Try(Try),
    Assert {
        test: ExprLoc,
        msg: Option<ExprLoc>,
    },
    Global,
    Pass,
    Break,
    Continue,
}

/// A statement with its source position.
#[derive(Debug, Clone)]
pub(crate) struct NodeLoc {
    pub position: CodeRange,
    pub node: Node,
}
