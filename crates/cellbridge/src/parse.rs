//! Lowering of ruff's Python AST into the interpreter's statement tree.
//!
//! Parsing happens once per cleaned batch: the whole text is handed to
//! `ruff_python_parser::parse_module`, so a logical statement may span several
//! lines. Each top-level statement of the resulting module becomes one
//! [`SyntaxUnit`].

use std::{borrow::Cow, fmt, rc::Rc};

use ruff_python_ast::{
    self as ast, BoolOp, CmpOp, ConversionFlag as RuffConversionFlag, ElifElseClause, Expr as AstExpr,
    InterpolatedStringElement, Keyword, Number, Operator as AstOperator, ParameterWithDefault, Parameters, Stmt,
    UnaryOp,
};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use crate::{
    exception::{ExcType, Exception, StackFrame},
    expressions::{
        ArgExprs, ClassDef, CmpOperator, Comprehension, ConversionFlag, ExceptHandler, Expr, ExprLoc, FStringPart,
        FunctionBody, FunctionDef, Identifier, Kwarg, Literal, Node, NodeLoc, Operator, ParsedParam, ParsedSignature,
        Target, Try,
    },
};

/// Maximum nesting depth for statements and expressions during lowering.
///
/// Lowering and evaluation are both recursive, so deeply nested input such as
/// `((((x,),),),)` must be rejected before it can overflow the stack.
#[cfg(not(debug_assertions))]
pub const MAX_NESTING_DEPTH: u16 = 200;
/// Debug builds have much larger stack frames, so the limit is lower.
#[cfg(debug_assertions)]
pub const MAX_NESTING_DEPTH: u16 = 35;

/// Source text of one parsed batch, kept alive by every function defined in it so
/// tracebacks can show the offending line long after the batch finished.
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    text: String,
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
}

impl SourceFile {
    #[must_use]
    pub fn new(name: &str, text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.char_indices().filter(|(_, c)| *c == '\n').map(|(i, _)| i + 1));
        Self {
            name: name.to_owned(),
            text: text.to_owned(),
            line_starts,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the text of a 1-based line without its terminator.
    #[must_use]
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        let start = *self.line_starts.get(index)?;
        let end = self.line_starts.get(index + 1).map_or(self.text.len(), |next| next - 1);
        self.text.get(start..end).map(|l| l.trim_end_matches('\r'))
    }

    fn location(&self, offset: usize) -> CodeLoc {
        let index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let column = self.text.get(self.line_starts[index]..offset).map_or(0, |s| s.chars().count());
        CodeLoc {
            line: u32::try_from(index + 1).unwrap_or(u32::MAX),
            column: u32::try_from(column).unwrap_or(u32::MAX),
        }
    }

    fn convert_range(&self, range: TextRange) -> CodeRange {
        CodeRange {
            start: self.location(usize::from(range.start())),
            end: self.location(usize::from(range.end())),
        }
    }
}

/// A line (1-based) and column (0-based, in characters) within a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeRange {
    pub start: CodeLoc,
    pub end: CodeLoc,
}

impl fmt::Debug for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

impl CodeRange {
    #[must_use]
    pub fn line(&self) -> u32 {
        self.start.line
    }
}

/// One top-level statement of a batch, in source order.
#[derive(Debug, Clone)]
pub struct SyntaxUnit {
    pub(crate) node: NodeLoc,
}

impl SyntaxUnit {
    /// The 1-based line the unit starts on.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.node.position.line()
    }

    /// True when the unit is a bare expression statement whose value can be echoed.
    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(self.node.node, Node::Expr(_))
    }
}

/// Parses a cleaned batch into its top-level units.
pub fn parse_units(source: &Rc<SourceFile>) -> Result<Vec<SyntaxUnit>, ParseError> {
    let mut parser = Parser::new(Rc::clone(source));
    let parsed =
        parse_module(source.text()).map_err(|e| ParseError::syntax(e.to_string(), source.convert_range(e.range())))?;
    let module = parsed.into_syntax();
    let nodes = parser.parse_statements(module.body)?;
    Ok(nodes.into_iter().map(|node| SyntaxUnit { node }).collect())
}

/// Parses text that must consist of exactly one expression, such as a completion prefix.
pub(crate) fn parse_single_expression(source: &Rc<SourceFile>) -> Result<ExprLoc, ParseError> {
    let mut units = parse_units(source)?;
    match (units.pop(), units.is_empty()) {
        (
            Some(SyntaxUnit {
                node: NodeLoc {
                    node: Node::Expr(expr), ..
                },
            }),
            true,
        ) => Ok(expr),
        _ => Err(ParseError::syntax("expected a single expression", CodeRange::default())),
    }
}

/// Converts ruff AST nodes into [`NodeLoc`] / [`ExprLoc`] trees.
struct Parser {
    source: Rc<SourceFile>,
    /// Remaining nesting budget; see [`MAX_NESTING_DEPTH`].
    depth_remaining: u16,
    /// Bindings collected for each enclosing function body, innermost last.
    function_scopes: Vec<FunctionScope>,
}

#[derive(Default)]
struct FunctionScope {
    globals: Vec<Rc<str>>,
    locals: Vec<Rc<str>>,
}

impl Parser {
    fn new(source: Rc<SourceFile>) -> Self {
        Self {
            source,
            depth_remaining: MAX_NESTING_DEPTH,
            function_scopes: Vec::new(),
        }
    }

    fn convert_range(&self, range: TextRange) -> CodeRange {
        self.source.convert_range(range)
    }

    fn parse_statements(&mut self, statements: Vec<Stmt>) -> Result<Vec<NodeLoc>, ParseError> {
        statements.into_iter().map(|s| self.parse_statement(s)).collect()
    }

    fn parse_statement(&mut self, statement: Stmt) -> Result<NodeLoc, ParseError> {
        self.decr_depth_remaining(|| statement.range())?;
        let position = self.convert_range(statement.range());
        let result = self.parse_statement_impl(statement, position);
        self.depth_remaining += 1;
        Ok(NodeLoc {
            position,
            node: result?,
        })
    }

    fn parse_statement_impl(&mut self, statement: Stmt, position: CodeRange) -> Result<Node, ParseError> {
        match statement {
            Stmt::FunctionDef(function) => {
                if function.is_async {
                    return Err(ParseError::not_implemented("async functions", position));
                }
                if !function.decorator_list.is_empty() {
                    return Err(ParseError::not_implemented("decorators", position));
                }
                let name: Rc<str> = Rc::from(function.name.id.as_str());
                self.bind_local(&name);
                let signature = self.parse_signature(&function.parameters)?;
                self.function_scopes.push(FunctionScope::default());
                let body = self.parse_statements(function.body);
                let scope = self.function_scopes.pop().unwrap_or_default();
                Ok(Node::FunctionDef(Rc::new(FunctionDef {
                    name,
                    signature,
                    body: FunctionBody::Block(body?),
                    globals: scope.globals,
                    local_names: scope.locals,
                    source: Rc::clone(&self.source),
                })))
            }
            Stmt::ClassDef(class) => {
                if class
                    .arguments
                    .as_ref()
                    .is_some_and(|arguments| !arguments.args.is_empty() || !arguments.keywords.is_empty())
                {
                    return Err(ParseError::not_implemented("class inheritance", position));
                }
                if !class.decorator_list.is_empty() {
                    return Err(ParseError::not_implemented("decorators", position));
                }
                let name: Rc<str> = Rc::from(class.name.id.as_str());
                self.bind_local(&name);
                // class bodies do not create a function scope, but their bindings stay in the class
                let enclosing = self.function_scopes.pop();
                let body = self.parse_statements(class.body);
                if let Some(enclosing) = enclosing {
                    self.function_scopes.push(enclosing);
                }
                Ok(Node::ClassDef(Rc::new(ClassDef { name, body: body? })))
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => {
                if self.function_scopes.is_empty() {
                    return Err(ParseError::syntax("'return' outside function", position));
                }
                Ok(Node::Return(value.map(|v| self.parse_expression(*v)).transpose()?))
            }
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                let targets = targets
                    .into_iter()
                    .map(|t| self.parse_target(t))
                    .collect::<Result<_, _>>()?;
                Ok(Node::Delete(targets))
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let targets = targets
                    .into_iter()
                    .map(|t| self.parse_target(t))
                    .collect::<Result<_, _>>()?;
                Ok(Node::Assign {
                    targets,
                    value: self.parse_expression(*value)?,
                })
            }
            Stmt::AnnAssign(ast::StmtAnnAssign { target, value, .. }) => match value {
                Some(value) => Ok(Node::Assign {
                    targets: vec![self.parse_target(*target)?],
                    value: self.parse_expression(*value)?,
                }),
                // a bare annotation binds nothing
                None => Ok(Node::Pass),
            },
            Stmt::AugAssign(ast::StmtAugAssign { target, op, value, .. }) => {
                let target = self.parse_target(*target)?;
                if matches!(target, Target::Unpack { .. }) {
                    return Err(ParseError::syntax(
                        "'tuple' is an illegal expression for augmented assignment",
                        position,
                    ));
                }
                Ok(Node::OpAssign {
                    target,
                    op: convert_op(op),
                    value: self.parse_expression(*value)?,
                })
            }
            Stmt::For(ast::StmtFor {
                is_async,
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                if is_async {
                    return Err(ParseError::not_implemented("async for loops", position));
                }
                Ok(Node::For {
                    target: self.parse_target(*target)?,
                    iter: self.parse_expression(*iter)?,
                    body: self.parse_statements(body)?,
                    or_else: self.parse_statements(orelse)?,
                })
            }
            Stmt::While(ast::StmtWhile { test, body, orelse, .. }) => Ok(Node::While {
                test: self.parse_expression(*test)?,
                body: self.parse_statements(body)?,
                or_else: self.parse_statements(orelse)?,
            }),
            Stmt::If(ast::StmtIf {
                test,
                body,
                elif_else_clauses,
                ..
            }) => {
                let test = self.parse_expression(*test)?;
                let body = self.parse_statements(body)?;
                let or_else = self.parse_elif_else_clauses(elif_else_clauses)?;
                Ok(Node::If { test, body, or_else })
            }
            Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                if cause.is_some() {
                    return Err(ParseError::not_implemented("'raise ... from ...'", position));
                }
                Ok(Node::Raise(exc.map(|e| self.parse_expression(*e)).transpose()?))
            }
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                is_star,
                ..
            }) => {
                if is_star {
                    return Err(ParseError::not_implemented("'except*' handlers", position));
                }
                let body = self.parse_statements(body)?;
                let handlers = handlers
                    .into_iter()
                    .map(|h| self.parse_except_handler(h))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Node::Try(Try {
                    body,
                    handlers,
                    or_else: self.parse_statements(orelse)?,
                    finally: self.parse_statements(finalbody)?,
                }))
            }
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => Ok(Node::Assert {
                test: self.parse_expression(*test)?,
                msg: msg.map(|m| self.parse_expression(*m)).transpose()?,
            }),
            Stmt::Global(ast::StmtGlobal { names, .. }) => {
                if let Some(scope) = self.function_scopes.last_mut() {
                    scope.globals.extend(names.iter().map(|name| Rc::from(name.id.as_str())));
                }
                Ok(Node::Global)
            }
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.parse_expression(*value).map(Node::Expr),
            Stmt::Pass(_) => Ok(Node::Pass),
            Stmt::Break(_) => Ok(Node::Break),
            Stmt::Continue(_) => Ok(Node::Continue),
            Stmt::Import(_) | Stmt::ImportFrom(_) => Err(ParseError::not_implemented("imports", position)),
            Stmt::With(_) => Err(ParseError::not_implemented("'with' statements", position)),
            Stmt::Match(_) => Err(ParseError::not_implemented("'match' statements", position)),
            Stmt::Nonlocal(_) => Err(ParseError::not_implemented("'nonlocal' declarations", position)),
            _ => Err(ParseError::not_implemented("this statement", position)),
        }
    }

    fn parse_elif_else_clauses(&mut self, clauses: Vec<ElifElseClause>) -> Result<Vec<NodeLoc>, ParseError> {
        let mut tail: Vec<NodeLoc> = Vec::new();
        for clause in clauses.into_iter().rev() {
            let position = self.convert_range(clause.range);
            match clause.test {
                Some(test) => {
                    let test = self.parse_expression(test)?;
                    let body = self.parse_statements(clause.body)?;
                    let or_else = tail;
                    tail = vec![NodeLoc {
                        position,
                        node: Node::If { test, body, or_else },
                    }];
                }
                None => {
                    tail = self.parse_statements(clause.body)?;
                }
            }
        }
        Ok(tail)
    }

    fn parse_except_handler(&mut self, handler: ast::ExceptHandler) -> Result<ExceptHandler, ParseError> {
        let ast::ExceptHandler::ExceptHandler(h) = handler;
        let name = h.name.map(|n| Rc::<str>::from(n.id.as_str()));
        if let Some(name) = &name {
            self.bind_local(name);
        }
        Ok(ExceptHandler {
            exc_type: h.type_.map(|e| self.parse_expression(*e)).transpose()?,
            name,
            body: self.parse_statements(h.body)?,
        })
    }

    fn parse_signature(&mut self, params: &Parameters) -> Result<ParsedSignature, ParseError> {
        let mut args = self.parse_params_with_defaults(&params.posonlyargs)?;
        args.extend(self.parse_params_with_defaults(&params.args)?);
        Ok(ParsedSignature {
            args,
            var_args: params.vararg.as_ref().map(|p| Rc::from(p.name.id.as_str())),
            kwargs: self.parse_params_with_defaults(&params.kwonlyargs)?,
            var_kwargs: params.kwarg.as_ref().map(|p| Rc::from(p.name.id.as_str())),
        })
    }

    fn parse_params_with_defaults(&mut self, params: &[ParameterWithDefault]) -> Result<Vec<ParsedParam>, ParseError> {
        params
            .iter()
            .map(|p| {
                Ok(ParsedParam {
                    name: Rc::from(p.parameter.name.id.as_str()),
                    default: p.default.as_ref().map(|d| self.parse_expression((**d).clone())).transpose()?,
                })
            })
            .collect()
    }

    fn parse_target(&mut self, target: AstExpr) -> Result<Target, ParseError> {
        match target {
            AstExpr::Name(ast::ExprName { id, range, .. }) => {
                let identifier = Identifier::new(id.as_str(), self.convert_range(range));
                self.bind_local(&identifier.name);
                Ok(Target::Name(identifier))
            }
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Ok(Target::Attr {
                object: self.parse_expression(*value)?,
                attr: Rc::from(attr.id.as_str()),
            }),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Ok(Target::Subscript {
                object: self.parse_expression(*value)?,
                index: self.parse_expression(*slice)?,
            }),
            AstExpr::Tuple(ast::ExprTuple { elts, range, .. }) | AstExpr::List(ast::ExprList { elts, range, .. }) => {
                let position = self.convert_range(range);
                if elts.iter().any(|e| matches!(e, AstExpr::Starred(_))) {
                    return Err(ParseError::not_implemented("starred assignment targets", position));
                }
                let targets = elts
                    .into_iter()
                    .map(|e| self.parse_target(e))
                    .collect::<Result<_, _>>()?;
                Ok(Target::Unpack { targets, position })
            }
            other => Err(ParseError::syntax(
                "cannot assign to expression",
                self.convert_range(other.range()),
            )),
        }
    }

    fn parse_expression(&mut self, expression: AstExpr) -> Result<ExprLoc, ParseError> {
        self.decr_depth_remaining(|| expression.range())?;
        let result = self.parse_expression_impl(expression);
        self.depth_remaining += 1;
        result
    }

    fn parse_boxed(&mut self, expression: AstExpr) -> Result<Box<ExprLoc>, ParseError> {
        self.parse_expression(expression).map(Box::new)
    }

    fn parse_expression_impl(&mut self, expression: AstExpr) -> Result<ExprLoc, ParseError> {
        let position = self.convert_range(expression.range());
        let expr = match expression {
            AstExpr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
                // `a and b and c` folds right into `a and (b and c)`
                let op = convert_bool_op(op);
                let mut values_iter = values.into_iter().rev();
                let Some(last) = values_iter.next() else {
                    return Err(ParseError::syntax("empty boolean operation", position));
                };
                let mut result = self.parse_expression(last)?;
                for value in values_iter {
                    let left = self.parse_boxed(value)?;
                    result = ExprLoc::new(
                        position,
                        Expr::Op {
                            left,
                            op,
                            right: Box::new(result),
                        },
                    );
                }
                return Ok(result);
            }
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, .. }) => {
                if op == AstOperator::MatMult {
                    return Err(ParseError::not_implemented("the '@' operator", position));
                }
                Expr::Op {
                    left: self.parse_boxed(*left)?,
                    op: convert_op(op),
                    right: self.parse_boxed(*right)?,
                }
            }
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                let operand = self.parse_boxed(*operand)?;
                match op {
                    UnaryOp::Not => Expr::Not(operand),
                    UnaryOp::USub => Expr::UnaryMinus(operand),
                    UnaryOp::UAdd => Expr::UnaryPlus(operand),
                    UnaryOp::Invert => Expr::UnaryInvert(operand),
                }
            }
            AstExpr::Lambda(ast::ExprLambda { parameters, body, .. }) => {
                let signature = match parameters {
                    Some(params) => self.parse_signature(&params)?,
                    None => ParsedSignature::default(),
                };
                let body = self.parse_expression(*body)?;
                Expr::Lambda(Rc::new(FunctionDef {
                    name: Rc::from("<lambda>"),
                    signature,
                    body: FunctionBody::Expr(body),
                    globals: Vec::new(),
                    local_names: Vec::new(),
                    source: Rc::clone(&self.source),
                }))
            }
            AstExpr::If(ast::ExprIf { test, body, orelse, .. }) => Expr::IfElse {
                test: self.parse_boxed(*test)?,
                body: self.parse_boxed(*body)?,
                orelse: self.parse_boxed(*orelse)?,
            },
            AstExpr::Dict(ast::ExprDict { items, .. }) => {
                let mut pairs = Vec::with_capacity(items.len());
                for ast::DictItem { key, value } in items {
                    let Some(key) = key else {
                        return Err(ParseError::not_implemented("dict unpacking (**mapping)", position));
                    };
                    pairs.push((self.parse_expression(key)?, self.parse_expression(value)?));
                }
                Expr::Dict(pairs)
            }
            AstExpr::ListComp(ast::ExprListComp { elt, generators, .. }) => Expr::ListComp {
                elt: self.parse_boxed(*elt)?,
                generators: self.parse_comprehension_generators(generators)?,
            },
            AstExpr::Compare(ast::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => {
                let left = self.parse_boxed(*left)?;
                let comparisons = ops
                    .into_vec()
                    .into_iter()
                    .zip(comparators.into_vec())
                    .map(|(op, right)| Ok((convert_compare_op(op), self.parse_expression(right)?)))
                    .collect::<Result<_, ParseError>>()?;
                Expr::Compare { left, comparisons }
            }
            AstExpr::Call(ast::ExprCall { func, arguments, .. }) => {
                let ast::Arguments { args, keywords, .. } = arguments;
                let args = Box::new(self.parse_call_arguments(args.into_vec(), keywords.into_vec(), position)?);
                match *func {
                    AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Expr::AttrCall {
                        object: self.parse_boxed(*value)?,
                        attr: Rc::from(attr.id.as_str()),
                        args,
                    },
                    other => Expr::Call {
                        callable: self.parse_boxed(other)?,
                        args,
                    },
                }
            }
            AstExpr::FString(ast::ExprFString { value, .. }) => self.parse_fstring(&value, position)?,
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => {
                Expr::Literal(Literal::Str(Rc::from(value.to_string())))
            }
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, .. }) => match value {
                Number::Int(i) => match i.as_i64() {
                    Some(i) => Expr::Literal(Literal::Int(i)),
                    None => return Err(ParseError::not_implemented("integers beyond 64 bits", position)),
                },
                Number::Float(f) => Expr::Literal(Literal::Float(f)),
                Number::Complex { .. } => return Err(ParseError::not_implemented("complex numbers", position)),
            },
            AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Expr::Literal(Literal::Bool(value)),
            AstExpr::NoneLiteral(_) => Expr::Literal(Literal::None),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Expr::AttrGet {
                object: self.parse_boxed(*value)?,
                attr: Rc::from(attr.id.as_str()),
            },
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Expr::Subscript {
                object: self.parse_boxed(*value)?,
                index: self.parse_boxed(*slice)?,
            },
            AstExpr::Name(ast::ExprName { id, .. }) => Expr::Name(Identifier::new(id.as_str(), position)),
            AstExpr::List(ast::ExprList { elts, .. }) => Expr::List(self.parse_elements(elts, position)?),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Expr::Tuple(self.parse_elements(elts, position)?),
            AstExpr::Slice(ast::ExprSlice {
                lower, upper, step, ..
            }) => Expr::Slice {
                lower: lower.map(|e| self.parse_boxed(*e)).transpose()?,
                upper: upper.map(|e| self.parse_boxed(*e)).transpose()?,
                step: step.map(|e| self.parse_boxed(*e)).transpose()?,
            },
            AstExpr::Set(_) | AstExpr::SetComp(_) => return Err(ParseError::not_implemented("sets", position)),
            AstExpr::DictComp(_) => return Err(ParseError::not_implemented("dict comprehensions", position)),
            AstExpr::Generator(_) => return Err(ParseError::not_implemented("generator expressions", position)),
            AstExpr::Await(_) => return Err(ParseError::not_implemented("'await'", position)),
            AstExpr::Yield(_) | AstExpr::YieldFrom(_) => {
                return Err(ParseError::not_implemented("generators", position));
            }
            AstExpr::Named(_) => return Err(ParseError::not_implemented("assignment expressions", position)),
            AstExpr::Starred(_) => return Err(ParseError::not_implemented("starred expressions (*expr)", position)),
            AstExpr::BytesLiteral(_) => return Err(ParseError::not_implemented("bytes literals", position)),
            _ => return Err(ParseError::not_implemented("this expression", position)),
        };
        Ok(ExprLoc::new(position, expr))
    }

    fn parse_elements(&mut self, elts: Vec<AstExpr>, position: CodeRange) -> Result<Vec<ExprLoc>, ParseError> {
        if elts.iter().any(|e| matches!(e, AstExpr::Starred(_))) {
            return Err(ParseError::not_implemented("unpacking in literals", position));
        }
        elts.into_iter().map(|e| self.parse_expression(e)).collect()
    }

    fn parse_call_arguments(
        &mut self,
        args: Vec<AstExpr>,
        keywords: Vec<Keyword>,
        position: CodeRange,
    ) -> Result<ArgExprs, ParseError> {
        let mut parsed = ArgExprs::default();
        for arg in args {
            match arg {
                AstExpr::Starred(ast::ExprStarred { value, .. }) => {
                    if parsed.var_args.is_some() {
                        return Err(ParseError::not_implemented("multiple *args unpacking", position));
                    }
                    parsed.var_args = Some(self.parse_expression(*value)?);
                }
                other => {
                    if parsed.var_args.is_some() {
                        return Err(ParseError::not_implemented(
                            "positional arguments after *args",
                            position,
                        ));
                    }
                    parsed.positional.push(self.parse_expression(other)?);
                }
            }
        }
        for keyword in keywords {
            match keyword.arg {
                Some(key) => parsed.kwargs.push(Kwarg {
                    key: Rc::from(key.id.as_str()),
                    value: self.parse_expression(keyword.value)?,
                }),
                None => {
                    if parsed.var_kwargs.is_some() {
                        return Err(ParseError::not_implemented("multiple **kwargs unpacking", position));
                    }
                    parsed.var_kwargs = Some(self.parse_expression(keyword.value)?);
                }
            }
        }
        Ok(parsed)
    }

    fn parse_comprehension_generators(
        &mut self,
        generators: Vec<ast::Comprehension>,
    ) -> Result<Vec<Comprehension>, ParseError> {
        generators
            .into_iter()
            .map(|comp| {
                if comp.is_async {
                    return Err(ParseError::not_implemented(
                        "async comprehensions",
                        self.convert_range(comp.range),
                    ));
                }
                Ok(Comprehension {
                    target: self.parse_target(comp.target)?,
                    iter: self.parse_expression(comp.iter)?,
                    ifs: comp
                        .ifs
                        .into_iter()
                        .map(|cond| self.parse_expression(cond))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect()
    }

    fn parse_fstring(&mut self, value: &ast::FStringValue, position: CodeRange) -> Result<Expr, ParseError> {
        let mut parts = Vec::new();
        for fstring_part in value {
            match fstring_part {
                ast::FStringPart::Literal(lit) => {
                    let processed = lit.value.to_string();
                    if !processed.is_empty() {
                        parts.push(FStringPart::Literal(Rc::from(processed)));
                    }
                }
                ast::FStringPart::FString(fstring) => {
                    for element in &fstring.elements {
                        self.parse_fstring_element(element, &mut parts, position)?;
                    }
                }
            }
        }
        Ok(Expr::FString(parts))
    }

    fn parse_fstring_element(
        &mut self,
        element: &InterpolatedStringElement,
        parts: &mut Vec<FStringPart>,
        position: CodeRange,
    ) -> Result<(), ParseError> {
        match element {
            InterpolatedStringElement::Literal(lit) => {
                parts.push(FStringPart::Literal(Rc::from(lit.value.to_string())));
            }
            InterpolatedStringElement::Interpolation(interp) => {
                if interp.format_spec.is_some() {
                    return Err(ParseError::not_implemented("f-string format specifiers", position));
                }
                let mut conversion = convert_conversion_flag(interp.conversion);
                // `f'{a=}'` writes the expression text first and defaults to repr
                if let Some(debug_text) = &interp.debug_text {
                    let expr_text = &self.source.text()[interp.expression.range()];
                    parts.push(FStringPart::Literal(Rc::from(format!(
                        "{}{}{}",
                        debug_text.leading, expr_text, debug_text.trailing
                    ))));
                    if conversion == ConversionFlag::None {
                        conversion = ConversionFlag::Repr;
                    }
                }
                parts.push(FStringPart::Interpolation {
                    expr: self.parse_boxed((*interp.expression).clone())?,
                    conversion,
                });
            }
        }
        Ok(())
    }

    /// Records a name bound in the innermost function body, if any.
    fn bind_local(&mut self, name: &Rc<str>) {
        if let Some(scope) = self.function_scopes.last_mut()
            && !scope.locals.contains(name)
        {
            scope.locals.push(Rc::clone(name));
        }
    }

    fn decr_depth_remaining(&mut self, get_range: impl FnOnce() -> TextRange) -> Result<(), ParseError> {
        if let Some(depth_remaining) = self.depth_remaining.checked_sub(1) {
            self.depth_remaining = depth_remaining;
            Ok(())
        } else {
            Err(ParseError::syntax(
                "too many nested parentheses",
                self.convert_range(get_range()),
            ))
        }
    }
}

fn convert_op(op: AstOperator) -> Operator {
    match op {
        AstOperator::Add => Operator::Add,
        AstOperator::Sub => Operator::Sub,
        AstOperator::Mult | AstOperator::MatMult => Operator::Mult,
        AstOperator::Div => Operator::Div,
        AstOperator::Mod => Operator::Mod,
        AstOperator::Pow => Operator::Pow,
        AstOperator::LShift => Operator::LShift,
        AstOperator::RShift => Operator::RShift,
        AstOperator::BitOr => Operator::BitOr,
        AstOperator::BitXor => Operator::BitXor,
        AstOperator::BitAnd => Operator::BitAnd,
        AstOperator::FloorDiv => Operator::FloorDiv,
    }
}

fn convert_bool_op(op: BoolOp) -> Operator {
    match op {
        BoolOp::And => Operator::And,
        BoolOp::Or => Operator::Or,
    }
}

fn convert_compare_op(op: CmpOp) -> CmpOperator {
    match op {
        CmpOp::Eq => CmpOperator::Eq,
        CmpOp::NotEq => CmpOperator::NotEq,
        CmpOp::Lt => CmpOperator::Lt,
        CmpOp::LtE => CmpOperator::LtE,
        CmpOp::Gt => CmpOperator::Gt,
        CmpOp::GtE => CmpOperator::GtE,
        CmpOp::Is => CmpOperator::Is,
        CmpOp::IsNot => CmpOperator::IsNot,
        CmpOp::In => CmpOperator::In,
        CmpOp::NotIn => CmpOperator::NotIn,
    }
}

fn convert_conversion_flag(flag: RuffConversionFlag) -> ConversionFlag {
    match flag {
        RuffConversionFlag::None => ConversionFlag::None,
        RuffConversionFlag::Str => ConversionFlag::Str,
        RuffConversionFlag::Repr => ConversionFlag::Repr,
        RuffConversionFlag::Ascii => ConversionFlag::Ascii,
    }
}

/// Errors raised while turning batch text into units.
#[derive(Debug, Clone)]
pub enum ParseError {
    /// The text is not valid Python.
    Syntax {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
    /// Valid Python the interpreter does not run.
    /// Message gets prefixed with "The cellbridge parser does not yet support ".
    NotImplemented {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
}

impl ParseError {
    pub(crate) fn syntax(msg: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::Syntax {
            msg: msg.into(),
            position,
        }
    }

    pub(crate) fn not_implemented(msg: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::NotImplemented {
            msg: msg.into(),
            position,
        }
    }

    #[must_use]
    pub fn position(&self) -> CodeRange {
        match self {
            Self::Syntax { position, .. } | Self::NotImplemented { position, .. } => *position,
        }
    }

    /// Converts the error into an exception whose traceback points at the failing line.
    #[must_use]
    pub fn into_exception(self, source: &SourceFile) -> Exception {
        let (exc_type, message, position) = match self {
            Self::Syntax { msg, position } => (ExcType::SyntaxError, msg.into_owned(), position),
            Self::NotImplemented { msg, position } => (
                ExcType::NotImplementedError,
                format!("The cellbridge parser does not yet support {msg}"),
                position,
            ),
        };
        let mut frame = StackFrame::new(source.name(), position.line(), None, source.line(position.line()));
        if exc_type == ExcType::SyntaxError {
            frame.caret_column = Some(position.start.column);
        }
        Exception::new(exc_type, Some(message)).with_traceback(vec![frame])
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { msg, position } => write!(f, "line {}: {msg}", position.line()),
            Self::NotImplemented { msg, position } => write!(
                f,
                "line {}: The cellbridge parser does not yet support {msg}",
                position.line()
            ),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(code: &str) -> Result<Vec<SyntaxUnit>, ParseError> {
        parse_units(&Rc::new(SourceFile::new("<stdin>", code)))
    }

    #[test]
    fn multi_line_statement_is_one_unit() {
        let parsed = units("def f(x):\n    return x + 1\nf(2)").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].line(), 1);
        assert_eq!(parsed[1].line(), 3);
        assert!(!parsed[0].is_expression());
        assert!(parsed[1].is_expression());
    }

    #[test]
    fn source_lines_are_one_based() {
        let source = SourceFile::new("<stdin>", "a = 1\nb = 2\r\nc");
        assert_eq!(source.line(1), Some("a = 1"));
        assert_eq!(source.line(2), Some("b = 2"));
        assert_eq!(source.line(3), Some("c"));
        assert_eq!(source.line(4), None);
        assert_eq!(source.line(0), None);
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = units("x = 1\ny = (").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }), "got {err:?}");
        assert_eq!(err.position().line(), 2);
    }

    #[test]
    fn unsupported_syntax_is_not_implemented() {
        let err = units("import os").unwrap_err();
        assert!(matches!(err, ParseError::NotImplemented { .. }), "got {err:?}");
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let err = units("return 1").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }), "got {err:?}");
    }

    #[test]
    fn single_expression_rejects_statements() {
        let source = Rc::new(SourceFile::new("<completion>", "x = 1"));
        assert!(parse_single_expression(&source).is_err());
        let source = Rc::new(SourceFile::new("<completion>", "a.b"));
        assert!(parse_single_expression(&source).is_ok());
    }
}
