//! Tree-walking evaluation of parsed units against a session's namespace.
//!
//! One [`Interp`] lives for the duration of a batch. It borrows the session's globals,
//! context host and output sink, and owns the call stack used for scoping, recursion
//! limits and tracebacks.

use std::{borrow::Cow, cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    args::ArgValues,
    builtins::Builtins,
    config::SessionConfig,
    exception::{ExcType, Exception, RunResult, StackFrame},
    expressions::{
        ArgExprs, ClassDef, CmpOperator, Comprehension, ConversionFlag, Expr, ExprLoc, FStringPart, FunctionBody,
        FunctionDef, Literal, Node, NodeLoc, Operator, Target, Try,
    },
    host::ContextHost,
    io::OutputSink,
    methods::normalize_index,
    namespace::Namespace,
    ops,
    parse::{SourceFile, SyntaxUnit},
    value::{BoundMethod, Class, Dict, Function, Instance, MethodKind, Range, Scope, Value},
};

/// How bare expression statements are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecMode {
    /// Values are discarded.
    Statement,
    /// Non-`None` values are echoed as `repr(value)` followed by a newline.
    Interactive,
}

/// How a block finished, other than by raising.
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

enum FrameKind {
    Module,
    Function(Rc<Function>),
    Class,
}

struct Frame {
    /// `None` for the module frame, shown as `<module>`.
    name: Option<Rc<str>>,
    kind: FrameKind,
    source: Rc<SourceFile>,
    line: u32,
    /// Unused by the module frame, whose names live in the session namespace.
    locals: Scope,
    captured: Vec<Scope>,
    /// Iteration variables of the comprehensions being evaluated, innermost last.
    comp_scopes: Vec<AHashMap<Rc<str>, Value>>,
}

impl Frame {
    fn new(name: Option<Rc<str>>, kind: FrameKind, source: Rc<SourceFile>, captured: Vec<Scope>) -> Self {
        Self {
            name,
            kind,
            source,
            line: 0,
            locals: Scope::default(),
            captured,
            comp_scopes: Vec::new(),
        }
    }

    /// True when `name` refers to the module namespace from this frame.
    fn is_global(&self, name: &str) -> bool {
        match &self.kind {
            FrameKind::Module => true,
            FrameKind::Function(function) => function.def.globals.iter().any(|g| &**g == name),
            FrameKind::Class => false,
        }
    }
}

pub(crate) struct Interp<'a> {
    pub(crate) globals: &'a mut Namespace,
    pub(crate) host: &'a mut dyn ContextHost,
    out: &'a mut dyn OutputSink,
    pub(crate) config: &'a SessionConfig,
    frames: Vec<Frame>,
    /// Exceptions currently being handled by `except` blocks, for bare `raise`.
    handling: Vec<Exception>,
}

impl<'a> Interp<'a> {
    pub(crate) fn new(
        globals: &'a mut Namespace,
        host: &'a mut dyn ContextHost,
        out: &'a mut dyn OutputSink,
        config: &'a SessionConfig,
        source: Rc<SourceFile>,
    ) -> Self {
        Self {
            globals,
            host,
            out,
            config,
            frames: vec![Frame::new(None, FrameKind::Module, source, Vec::new())],
            handling: Vec::new(),
        }
    }

    /// Runs one top-level unit. The error carries a traceback ending at the failing line.
    pub(crate) fn run_unit(&mut self, unit: &SyntaxUnit, mode: ExecMode) -> RunResult<()> {
        match self.exec_stmt(&unit.node, mode)? {
            Flow::Normal => Ok(()),
            Flow::Break => Err(self.misplaced("'break' outside loop")),
            Flow::Continue => Err(self.misplaced("'continue' not properly in loop")),
            Flow::Return(_) => Err(self.misplaced("'return' outside function")),
        }
    }

    /// Evaluates a standalone expression in module scope.
    pub(crate) fn eval_expression(&mut self, expr: &ExprLoc) -> RunResult<Value> {
        self.eval(expr)
    }

    fn misplaced(&self, msg: &str) -> Exception {
        Exception::new_msg(ExcType::SyntaxError, msg).with_traceback(self.traceback())
    }

    fn frame(&self) -> &Frame {
        // the module frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn traceback(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .map(|frame| {
                StackFrame::new(
                    frame.source.name(),
                    frame.line,
                    frame.name.as_deref(),
                    frame.source.line(frame.line),
                )
            })
            .collect()
    }

    fn with_traceback(&self, mut exc: Exception) -> Exception {
        if !exc.has_traceback() {
            exc.set_traceback(self.traceback());
        }
        exc
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, body: &[NodeLoc], mode: ExecMode) -> RunResult<Flow> {
        for node in body {
            match self.exec_stmt(node, mode)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, node: &NodeLoc, mode: ExecMode) -> RunResult<Flow> {
        self.frame_mut().line = node.position.line();
        self.exec_node(node, mode).map_err(|exc| self.with_traceback(exc))
    }

    fn exec_node(&mut self, node: &NodeLoc, mode: ExecMode) -> RunResult<Flow> {
        match &node.node {
            Node::Expr(expr) => {
                let value = self.eval(expr)?;
                if mode == ExecMode::Interactive && !matches!(value, Value::None) {
                    let text = self.repr(&value)?;
                    self.write(&format!("{text}\n"))?;
                }
            }
            Node::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            Node::OpAssign { target, op, value } => self.exec_op_assign(target, *op, value)?,
            Node::Delete(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
            Node::If { test, body, or_else } => {
                let branch = if self.eval(test)?.is_truthy() { body } else { or_else };
                return self.exec_block(branch, mode);
            }
            Node::While { test, body, or_else } => {
                loop {
                    self.frame_mut().line = node.position.line();
                    if !self.eval(test)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(body, mode)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(or_else, mode);
            }
            Node::For {
                target,
                iter,
                body,
                or_else,
            } => {
                for item in self.eval(iter)?.py_iter()? {
                    self.frame_mut().line = node.position.line();
                    self.assign(target, item)?;
                    match self.exec_block(body, mode)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(or_else, mode);
            }
            Node::FunctionDef(def) => {
                let function = self.make_function(def)?;
                self.bind_name(&def.name, function);
            }
            Node::ClassDef(def) => {
                let class = self.make_class(def)?;
                self.bind_name(&def.name, class);
            }
            Node::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Node::Raise(None) => {
                return Err(self.handling.last().cloned().unwrap_or_else(|| {
                    Exception::new_msg(ExcType::RuntimeError, "No active exception to reraise")
                }));
            }
            Node::Raise(Some(expr)) => {
                let value = self.eval(expr)?;
                return Err(self.make_exception(value)?);
            }
            Node::Try(try_) => return self.exec_try(try_, mode),
            Node::Assert { test, msg } => {
                if !self.eval(test)?.is_truthy() {
                    let message = match msg {
                        Some(msg) => {
                            let value = self.eval(msg)?;
                            Some(self.to_str(&value)?)
                        }
                        None => None,
                    };
                    return Err(Exception::new(ExcType::AssertionError, message));
                }
            }
            Node::Global | Node::Pass => {}
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn exec_op_assign(&mut self, target: &Target, op: Operator, value: &ExprLoc) -> RunResult<()> {
        match target {
            Target::Name(ident) => {
                let current = self.lookup(&ident.name)?;
                let rhs = self.eval(value)?;
                let updated = self.in_place_op(current, op, &rhs)?;
                self.bind_name(&ident.name, updated);
            }
            Target::Attr { object, attr } => {
                let object = self.eval(object)?;
                let current = self.get_attr(&object, attr)?;
                let rhs = self.eval(value)?;
                let updated = self.in_place_op(current, op, &rhs)?;
                self.set_attr(&object, attr, updated)?;
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let current = self.get_item(&object, &index)?;
                let rhs = self.eval(value)?;
                let updated = self.in_place_op(current, op, &rhs)?;
                self.set_item(&object, &index, updated)?;
            }
            Target::Unpack { .. } => {
                return Err(Exception::new_msg(
                    ExcType::SyntaxError,
                    "illegal expression for augmented assignment",
                ));
            }
        }
        Ok(())
    }

    /// `a op= b`: lists extend in place, everything else rebinds.
    fn in_place_op(&mut self, current: Value, op: Operator, rhs: &Value) -> RunResult<Value> {
        if let (Value::List(list), Operator::Add) = (&current, op) {
            let items = rhs.to_vec()?;
            list.borrow_mut().extend(items);
            return Ok(current);
        }
        ops::binary_op(&current, op, rhs)
    }

    fn exec_try(&mut self, try_: &Try, mode: ExecMode) -> RunResult<Flow> {
        let outcome = match self.exec_block(&try_.body, mode) {
            Ok(Flow::Normal) => self.exec_block(&try_.or_else, mode),
            Ok(flow) => Ok(flow),
            Err(exc) => self.handle_exception(try_, exc, mode),
        };
        if try_.finally.is_empty() {
            return outcome;
        }
        match self.exec_block(&try_.finally, mode)? {
            // a `finally` that does not jump lets the original outcome through
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn handle_exception(&mut self, try_: &Try, exc: Exception, mode: ExecMode) -> RunResult<Flow> {
        for handler in &try_.handlers {
            let matches = match &handler.exc_type {
                None => true,
                Some(expr) => {
                    let class_info = self.eval(expr)?;
                    exception_matches(&class_info, exc.exc_type())?
                }
            };
            if !matches {
                continue;
            }
            if let Some(name) = &handler.name {
                self.bind_name(name, Value::Exception(Rc::new(exc.clone())));
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body, mode);
            self.handling.pop();
            if let Some(name) = &handler.name {
                self.unbind_name(name);
            }
            return result;
        }
        Err(exc)
    }

    /// Turns the operand of `raise` into the exception to propagate.
    fn make_exception(&mut self, value: Value) -> RunResult<Exception> {
        match value {
            Value::Exception(exc) => {
                let mut exc = Exception::clone(&exc);
                // raised again from here: the traceback is recaptured
                exc.set_traceback(Vec::new());
                Ok(exc)
            }
            Value::Builtin(Builtins::ExcType(exc_type)) => Ok(Exception::new(exc_type, None)),
            _ => Err(ExcType::type_error("exceptions must derive from BaseException")),
        }
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>) -> RunResult<Value> {
        let mut defaults = Vec::with_capacity(def.signature.args.len());
        for param in &def.signature.args {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        let mut kw_defaults = Vec::with_capacity(def.signature.kwargs.len());
        for param in &def.signature.kwargs {
            kw_defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Function {
            def: Rc::clone(def),
            defaults,
            kw_defaults,
            captured: self.closure_scopes(),
        })))
    }

    /// Scopes a function defined in the current frame can see, innermost first.
    fn closure_scopes(&self) -> Vec<Scope> {
        let frame = self.frame();
        let mut scopes: Vec<Scope> = frame
            .comp_scopes
            .iter()
            .rev()
            .map(|scope| Rc::new(RefCell::new(scope.clone())))
            .collect();
        match frame.kind {
            FrameKind::Module => {}
            FrameKind::Function(_) => {
                scopes.push(Rc::clone(&frame.locals));
                scopes.extend(frame.captured.iter().cloned());
            }
            FrameKind::Class => scopes.extend(frame.captured.iter().cloned()),
        }
        scopes
    }

    fn make_class(&mut self, def: &Rc<ClassDef>) -> RunResult<Value> {
        self.check_depth()?;
        let source = Rc::clone(&self.frame().source);
        let captured = self.closure_scopes();
        self.frames
            .push(Frame::new(Some(Rc::clone(&def.name)), FrameKind::Class, source, captured));
        let result = self.exec_block(&def.body, ExecMode::Statement);
        let frame = self.frames.pop();
        match result? {
            Flow::Normal => {}
            Flow::Return(_) => return Err(Exception::new_msg(ExcType::SyntaxError, "'return' outside function")),
            Flow::Break | Flow::Continue => {
                return Err(Exception::new_msg(ExcType::SyntaxError, "'break' outside loop"));
            }
        }
        let attrs = frame.map(|frame| frame.locals.take()).unwrap_or_default();
        Ok(Value::Class(Rc::new(Class {
            name: Rc::clone(&def.name),
            attrs: RefCell::new(attrs),
        })))
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn lookup(&self, name: &str) -> RunResult<Value> {
        let frame = self.frame();
        for scope in frame.comp_scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if !frame.is_global(name) {
            if let Some(value) = frame.locals.borrow().get(name) {
                return Ok(value.clone());
            }
            if let FrameKind::Function(function) = &frame.kind
                && function.def.local_names.iter().any(|local| &**local == name)
            {
                return Err(ExcType::unbound_local(name));
            }
            for scope in &frame.captured {
                if let Some(value) = scope.borrow().get(name) {
                    return Ok(value.clone());
                }
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Builtins::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| ExcType::name_error(name))
    }

    fn bind_name(&mut self, name: &Rc<str>, value: Value) {
        let frame = self.frame();
        if frame.is_global(name) {
            self.globals.set(Rc::clone(name), value);
        } else {
            frame.locals.borrow_mut().insert(Rc::clone(name), value);
        }
    }

    fn unbind_name(&mut self, name: &str) -> bool {
        let frame = self.frame();
        if frame.is_global(name) {
            self.globals.remove(name).is_some()
        } else {
            frame.locals.borrow_mut().remove(name).is_some()
        }
    }

    /// Names bound in the innermost scope, for `dir()`.
    pub(crate) fn scope_names(&self) -> Vec<String> {
        match self.frame().kind {
            FrameKind::Module => self.globals.names().map(str::to_owned).collect(),
            FrameKind::Function(_) | FrameKind::Class => {
                self.frame().locals.borrow().keys().map(ToString::to_string).collect()
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> RunResult<()> {
        match target {
            Target::Name(ident) => self.bind_name(&ident.name, value),
            Target::Attr { object, attr } => {
                let object = self.eval(object)?;
                self.set_attr(&object, attr, value)?;
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object)?;
                if let Expr::Slice { lower, upper, step } = &index.expr {
                    let bounds = self.eval_slice_bounds(lower.as_deref(), upper.as_deref(), step.as_deref())?;
                    self.set_slice(&object, &bounds, &value)?;
                } else {
                    let index = self.eval(index)?;
                    self.set_item(&object, &index, value)?;
                }
            }
            Target::Unpack { targets, .. } => {
                let items = unpack(&value, targets.len())?;
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Target) -> RunResult<()> {
        match target {
            Target::Name(ident) => {
                if !self.unbind_name(&ident.name) {
                    let frame = self.frame();
                    if frame.is_global(&ident.name) {
                        return Err(ExcType::name_error(&ident.name));
                    }
                    return Err(ExcType::unbound_local(&ident.name));
                }
            }
            Target::Attr { object, attr } => {
                let object = self.eval(object)?;
                self.del_attr(&object, attr)?;
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object)?;
                if let Expr::Slice { lower, upper, step } = &index.expr {
                    let bounds = self.eval_slice_bounds(lower.as_deref(), upper.as_deref(), step.as_deref())?;
                    self.del_slice(&object, &bounds)?;
                } else {
                    let index = self.eval(index)?;
                    self.del_item(&object, &index)?;
                }
            }
            Target::Unpack { targets, .. } => {
                for target in targets {
                    self.delete(target)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval(&mut self, expr: &ExprLoc) -> RunResult<Value> {
        match &expr.expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(Rc::clone(s)),
            }),
            Expr::Name(ident) => self.lookup(&ident.name),
            Expr::Call { callable, args } => {
                let callable = self.eval(callable)?;
                let args = self.eval_args(args)?;
                self.call_value(&callable, args)
            }
            Expr::AttrCall { object, attr, args } => {
                let receiver = self.eval(object)?;
                let args = self.eval_args(args)?;
                if receiver.py_type().method_names().contains(&&**attr) && !is_user_object(&receiver) {
                    self.call_method(&receiver, attr, args)
                } else {
                    let method = self.get_attr(&receiver, attr)?;
                    self.call_value(&method, args)
                }
            }
            Expr::AttrGet { object, attr } => {
                let object = self.eval(object)?;
                self.get_attr(&object, attr)
            }
            Expr::Subscript { object, index } => {
                let object = self.eval(object)?;
                if let Expr::Slice { lower, upper, step } = &index.expr {
                    let bounds = self.eval_slice_bounds(lower.as_deref(), upper.as_deref(), step.as_deref())?;
                    get_slice(&object, &bounds)
                } else {
                    let index = self.eval(index)?;
                    self.get_item(&object, &index)
                }
            }
            Expr::Slice { .. } => Err(ExcType::type_error("slices are only supported inside subscripts")),
            Expr::Op {
                left,
                op: Operator::And,
                right,
            } => {
                let left = self.eval(left)?;
                if left.is_truthy() { self.eval(right) } else { Ok(left) }
            }
            Expr::Op {
                left,
                op: Operator::Or,
                right,
            } => {
                let left = self.eval(left)?;
                if left.is_truthy() { Ok(left) } else { self.eval(right) }
            }
            Expr::Op { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary_op(&left, *op, &right)
            }
            Expr::Compare { left, comparisons } => {
                let mut current = self.eval(left)?;
                for (op, right) in comparisons {
                    let right = self.eval(right)?;
                    if !self.compare(&current, *op, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    current = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::UnaryMinus(operand) => ops::negate(&self.eval(operand)?),
            Expr::UnaryPlus(operand) => ops::positive(&self.eval(operand)?),
            Expr::UnaryInvert(operand) => ops::invert(&self.eval(operand)?),
            Expr::IfElse { test, body, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::List(items) => Ok(Value::new_list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::new_tuple(self.eval_all(items)?)),
            Expr::Dict(pairs) => {
                let mut dict = Dict::default();
                for (key, value) in pairs {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::new_dict(dict))
            }
            Expr::ListComp { elt, generators } => self.eval_list_comp(elt, generators),
            Expr::Lambda(def) => self.make_function(def),
            Expr::FString(parts) => self.eval_fstring(parts),
        }
    }

    fn eval_all(&mut self, exprs: &[ExprLoc]) -> RunResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_args(&mut self, args: &ArgExprs) -> RunResult<ArgValues> {
        let mut positional = self.eval_all(&args.positional)?;
        if let Some(var_args) = &args.var_args {
            let value = self.eval(var_args)?;
            let items = value.to_vec().map_err(|_| {
                ExcType::type_error(format!(
                    "Value after * must be an iterable, not {}",
                    value.type_name()
                ))
            })?;
            positional.extend(items);
        }
        let mut kwargs: Vec<(Rc<str>, Value)> = Vec::with_capacity(args.kwargs.len());
        for kwarg in &args.kwargs {
            let value = self.eval(&kwarg.value)?;
            kwargs.push((Rc::clone(&kwarg.key), value));
        }
        if let Some(var_kwargs) = &args.var_kwargs {
            let Value::Dict(dict) = self.eval(var_kwargs)? else {
                return Err(ExcType::type_error("argument after ** must be a mapping"));
            };
            let items = dict.borrow().items();
            for (key, value) in items {
                let Value::Str(key) = key else {
                    return Err(ExcType::type_error("keywords must be strings"));
                };
                if kwargs.iter().any(|(existing, _)| *existing == key) {
                    return Err(ExcType::type_error(format!(
                        "got multiple values for keyword argument '{key}'"
                    )));
                }
                kwargs.push((key, value));
            }
        }
        Ok(ArgValues { positional, kwargs })
    }

    fn compare(&mut self, left: &Value, op: CmpOperator, right: &Value) -> RunResult<bool> {
        match (op, right) {
            (CmpOperator::In, Value::Context) => self.context_contains(left),
            (CmpOperator::NotIn, Value::Context) => self.context_contains(left).map(|found| !found),
            (CmpOperator::In | CmpOperator::NotIn, Value::Instance(instance))
                if instance.class.lookup("__contains__").is_some() =>
            {
                let found = self
                    .call_method_by_name(right, "__contains__", ArgValues::positional(vec![left.clone()]))?
                    .is_truthy();
                Ok(found == (op == CmpOperator::In))
            }
            _ => ops::compare(left, op, right),
        }
    }

    fn eval_list_comp(&mut self, elt: &ExprLoc, generators: &[Comprehension]) -> RunResult<Value> {
        let mut items = Vec::new();
        self.frame_mut().comp_scopes.push(AHashMap::new());
        let result = self.comp_level(elt, generators, &mut items);
        self.frame_mut().comp_scopes.pop();
        result.map(|()| Value::new_list(items))
    }

    fn comp_level(&mut self, elt: &ExprLoc, generators: &[Comprehension], items: &mut Vec<Value>) -> RunResult<()> {
        let Some((generator, rest)) = generators.split_first() else {
            items.push(self.eval(elt)?);
            return Ok(());
        };
        for item in self.eval(&generator.iter)?.py_iter()? {
            self.bind_comp_target(&generator.target, item)?;
            let mut keep = true;
            for condition in &generator.ifs {
                if !self.eval(condition)?.is_truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.comp_level(elt, rest, items)?;
            }
        }
        Ok(())
    }

    fn bind_comp_target(&mut self, target: &Target, value: Value) -> RunResult<()> {
        match target {
            Target::Name(ident) => {
                if let Some(scope) = self.frame_mut().comp_scopes.last_mut() {
                    scope.insert(Rc::clone(&ident.name), value);
                }
                Ok(())
            }
            Target::Unpack { targets, .. } => {
                let items = unpack(&value, targets.len())?;
                for (target, item) in targets.iter().zip(items) {
                    self.bind_comp_target(target, item)?;
                }
                Ok(())
            }
            other => self.assign(other, value),
        }
    }

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> RunResult<Value> {
        let mut text = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(literal) => text.push_str(literal),
                FStringPart::Interpolation { expr, conversion } => {
                    let value = self.eval(expr)?;
                    match conversion {
                        ConversionFlag::None | ConversionFlag::Str => text.push_str(&self.to_str(&value)?),
                        ConversionFlag::Repr => text.push_str(&self.repr(&value)?),
                        ConversionFlag::Ascii => text.push_str(&ascii_escape(&self.repr(&value)?)),
                    }
                }
            }
        }
        Ok(Value::from(text))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn check_depth(&self) -> RunResult<()> {
        if self.frames.len() > self.config.max_recursion_depth {
            return Err(Exception::new_msg(
                ExcType::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        Ok(())
    }

    pub(crate) fn call_value(&mut self, callable: &Value, args: ArgValues) -> RunResult<Value> {
        match callable {
            Value::Function(function) => self.call_function(function, None, args),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args),
            Value::Method(method) => match &method.kind {
                MethodKind::User(function) => self.call_function(function, Some(method.receiver.clone()), args),
                MethodKind::Builtin(name) => self.call_method(&method.receiver, name, args),
            },
            Value::Class(class) => self.instantiate(class, args),
            Value::Instance(instance) if instance.class.lookup("__call__").is_some() => {
                self.call_method_by_name(callable, "__call__", args)
            }
            other => Err(ExcType::type_error_not_callable(&other.type_name())),
        }
    }

    /// Calls a method found on the receiver's class, e.g. a dunder hook.
    pub(crate) fn call_method_by_name(&mut self, receiver: &Value, name: &str, args: ArgValues) -> RunResult<Value> {
        match receiver {
            Value::Instance(instance) => match instance.class.lookup(name) {
                Some(Value::Function(function)) => self.call_function(&function, Some(receiver.clone()), args),
                Some(other) => self.call_value(&other, args),
                None => Err(ExcType::attribute_error(&instance.class.name, name)),
            },
            other if other.py_type().method_names().contains(&name) => self.call_method(other, name, args),
            other => Err(ExcType::attribute_error(&other.type_name(), name)),
        }
    }

    fn call_function(&mut self, function: &Rc<Function>, receiver: Option<Value>, args: ArgValues) -> RunResult<Value> {
        self.check_depth()?;
        let locals = bind_arguments(function, receiver, args)?;
        let mut frame = Frame::new(
            Some(Rc::clone(&function.def.name)),
            FrameKind::Function(Rc::clone(function)),
            Rc::clone(&function.def.source),
            function.captured.clone(),
        );
        frame.locals = Rc::new(RefCell::new(locals));
        self.frames.push(frame);
        let result = match &function.def.body {
            FunctionBody::Block(body) => match self.exec_block(body, ExecMode::Statement) {
                Ok(Flow::Return(value)) => Ok(value),
                Ok(Flow::Normal) => Ok(Value::None),
                Ok(Flow::Break) => Err(self.misplaced("'break' outside loop")),
                Ok(Flow::Continue) => Err(self.misplaced("'continue' not properly in loop")),
                Err(exc) => Err(exc),
            },
            FunctionBody::Expr(expr) => {
                self.frame_mut().line = expr.position.line();
                self.eval(expr).map_err(|exc| self.with_traceback(exc))
            }
        };
        self.frames.pop();
        result
    }

    fn instantiate(&mut self, class: &Rc<Class>, args: ArgValues) -> RunResult<Value> {
        let instance = Value::Instance(Rc::new(Instance::new(Rc::clone(class))));
        match class.lookup("__init__") {
            Some(Value::Function(init)) => {
                let result = self.call_function(&init, Some(instance.clone()), args)?;
                if !matches!(result, Value::None) {
                    return Err(ExcType::type_error(format!(
                        "__init__() should return None, not '{}'",
                        result.type_name()
                    )));
                }
            }
            Some(other) => {
                self.call_value(&other, args)?;
            }
            None if args.count() > 0 => {
                return Err(ExcType::type_error(format!("{}() takes no arguments", class.name)));
            }
            None => {}
        }
        Ok(instance)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub(crate) fn get_attr(&mut self, object: &Value, attr: &str) -> RunResult<Value> {
        if attr == "__class__" {
            return Ok(object.type_object());
        }
        match object {
            Value::Instance(instance) => {
                if attr == "__dict__" {
                    let mut dict = Dict::default();
                    for (name, value) in instance.attrs.borrow().iter() {
                        dict.insert_str(name, value.clone());
                    }
                    return Ok(Value::new_dict(dict));
                }
                if let Some(value) = instance.attrs.borrow().get(attr) {
                    return Ok(value.clone());
                }
                match instance.class.lookup(attr) {
                    Some(Value::Function(function)) => Ok(Value::Method(Rc::new(BoundMethod {
                        receiver: object.clone(),
                        kind: MethodKind::User(function),
                    }))),
                    Some(value) => Ok(value),
                    None => Err(ExcType::attribute_error(&instance.class.name, attr)),
                }
            }
            Value::Class(class) => {
                if attr == "__name__" {
                    return Ok(Value::Str(Rc::clone(&class.name)));
                }
                class.lookup(attr).ok_or_else(|| {
                    Exception::new_msg(
                        ExcType::AttributeError,
                        format!("type object '{}' has no attribute '{attr}'", class.name),
                    )
                })
            }
            Value::Exception(exc) if attr == "args" => Ok(Value::new_tuple(
                exc.message().map(Value::from).into_iter().collect(),
            )),
            Value::Function(function) if attr == "__name__" => Ok(Value::Str(Rc::clone(&function.def.name))),
            Value::Builtin(builtin) if attr == "__name__" => Ok(Value::from(builtin.name())),
            other => match other.py_type().method_names().iter().copied().find(|name| *name == attr) {
                Some(name) => Ok(Value::Method(Rc::new(BoundMethod {
                    receiver: other.clone(),
                    kind: MethodKind::Builtin(name),
                }))),
                None => Err(ExcType::attribute_error(&other.type_name(), attr)),
            },
        }
    }

    fn set_attr(&mut self, object: &Value, attr: &Rc<str>, value: Value) -> RunResult<()> {
        match object {
            Value::Instance(instance) => {
                instance.attrs.borrow_mut().insert(Rc::clone(attr), value);
                Ok(())
            }
            Value::Class(class) => {
                class.attrs.borrow_mut().insert(Rc::clone(attr), value);
                Ok(())
            }
            other => Err(ExcType::attribute_error(&other.type_name(), attr)),
        }
    }

    fn del_attr(&mut self, object: &Value, attr: &str) -> RunResult<()> {
        let removed = match object {
            Value::Instance(instance) => instance.attrs.borrow_mut().remove(attr),
            Value::Class(class) => class.attrs.borrow_mut().remove(attr),
            _ => None,
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(ExcType::attribute_error(&object.type_name(), attr)),
        }
    }

    // ========================================================================
    // Subscripts
    // ========================================================================

    fn get_item(&mut self, object: &Value, index: &Value) -> RunResult<Value> {
        match object {
            Value::List(list) => {
                let i = sequence_index(index, "list")?;
                let list = list.borrow();
                normalize_index(i, list.len())
                    .map(|i| list[i].clone())
                    .ok_or_else(|| ExcType::index_error("list index out of range"))
            }
            Value::Tuple(items) => {
                let i = sequence_index(index, "tuple")?;
                normalize_index(i, items.len())
                    .map(|i| items[i].clone())
                    .ok_or_else(|| ExcType::index_error("tuple index out of range"))
            }
            Value::Str(s) => {
                let Some(i) = index.as_int() else {
                    return Err(ExcType::type_error(format!(
                        "string indices must be integers, not '{}'",
                        index.type_name()
                    )));
                };
                let len = s.chars().count();
                normalize_index(i, len)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::from(c.to_string()))
                    .ok_or_else(|| ExcType::index_error("string index out of range"))
            }
            Value::Range(range) => {
                let i = sequence_index(index, "range object")?;
                normalize_index(i, range.len())
                    .and_then(|i| range.get(i))
                    .map(Value::Int)
                    .ok_or_else(|| ExcType::index_error("range object index out of range"))
            }
            Value::Dict(dict) => dict.borrow().get(index)?.ok_or_else(|| ExcType::key_error(index)),
            Value::Context => self.context_get(index),
            Value::Instance(instance) if instance.class.lookup("__getitem__").is_some() => {
                self.call_method_by_name(object, "__getitem__", ArgValues::positional(vec![index.clone()]))
            }
            other => Err(ExcType::type_error_not_sub(&other.type_name())),
        }
    }

    fn set_item(&mut self, object: &Value, index: &Value, value: Value) -> RunResult<()> {
        match object {
            Value::List(list) => {
                let i = sequence_index(index, "list")?;
                let mut list = list.borrow_mut();
                let len = list.len();
                let slot = normalize_index(i, len)
                    .and_then(|i| list.get_mut(i))
                    .ok_or_else(|| ExcType::index_error("list assignment index out of range"))?;
                *slot = value;
                Ok(())
            }
            Value::Dict(dict) => dict.borrow_mut().insert(index.clone(), value),
            Value::Context => self.context_put(index, &value),
            Value::Instance(instance) if instance.class.lookup("__setitem__").is_some() => {
                self.call_method_by_name(object, "__setitem__", ArgValues::positional(vec![index.clone(), value]))?;
                Ok(())
            }
            other => Err(ExcType::type_error_not_sub_assignment(&other.type_name())),
        }
    }

    fn del_item(&mut self, object: &Value, index: &Value) -> RunResult<()> {
        match object {
            Value::List(list) => {
                let i = sequence_index(index, "list")?;
                let mut list = list.borrow_mut();
                let i = normalize_index(i, list.len())
                    .ok_or_else(|| ExcType::index_error("list assignment index out of range"))?;
                list.remove(i);
                Ok(())
            }
            Value::Dict(dict) => match dict.borrow_mut().remove(index)? {
                Some(_) => Ok(()),
                None => Err(ExcType::key_error(index)),
            },
            Value::Context => self.context_remove(index),
            Value::Instance(instance) if instance.class.lookup("__delitem__").is_some() => {
                self.call_method_by_name(object, "__delitem__", ArgValues::positional(vec![index.clone()]))?;
                Ok(())
            }
            other => Err(ExcType::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }

    fn eval_slice_bounds(
        &mut self,
        lower: Option<&ExprLoc>,
        upper: Option<&ExprLoc>,
        step: Option<&ExprLoc>,
    ) -> RunResult<SliceBounds> {
        let mut bound = |expr: Option<&ExprLoc>| -> RunResult<Option<i64>> {
            let Some(expr) = expr else { return Ok(None) };
            match self.eval(expr)? {
                Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    ExcType::type_error("slice indices must be integers or None or have an __index__ method")
                }),
            }
        };
        let lower = bound(lower)?;
        let upper = bound(upper)?;
        let step = bound(step)?;
        if step == Some(0) {
            return Err(ExcType::value_error("slice step cannot be zero"));
        }
        Ok(SliceBounds {
            lower,
            upper,
            step: step.unwrap_or(1),
        })
    }

    fn set_slice(&mut self, object: &Value, bounds: &SliceBounds, value: &Value) -> RunResult<()> {
        let Value::List(list) = object else {
            return Err(ExcType::type_error_not_sub_assignment(&object.type_name()));
        };
        if bounds.step != 1 {
            return Err(Exception::new_msg(
                ExcType::NotImplementedError,
                "extended slice assignment is not supported",
            ));
        }
        let replacement = value
            .to_vec()
            .map_err(|_| ExcType::type_error("can only assign an iterable"))?;
        let mut list = list.borrow_mut();
        let (start, stop) = bounds.contiguous(list.len());
        list.splice(start..stop, replacement);
        Ok(())
    }

    fn del_slice(&mut self, object: &Value, bounds: &SliceBounds) -> RunResult<()> {
        let Value::List(list) = object else {
            return Err(ExcType::type_error(format!(
                "'{}' object doesn't support item deletion",
                object.type_name()
            )));
        };
        let mut list = list.borrow_mut();
        let mut indices = bounds.indices(list.len());
        indices.sort_unstable();
        for index in indices.into_iter().rev() {
            list.remove(index);
        }
        Ok(())
    }

    // ========================================================================
    // Text
    // ========================================================================

    /// `repr(value)`, running user `__repr__` methods.
    pub(crate) fn repr(&mut self, value: &Value) -> RunResult<String> {
        let mut out = String::new();
        value.write_repr(&mut out, &mut Vec::new(), &mut |instance| {
            self.instance_text(instance, "__repr__")
        })?;
        Ok(out)
    }

    /// `str(value)`, running user `__str__` and `__repr__` methods.
    pub(crate) fn to_str(&mut self, value: &Value) -> RunResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Exception(exc) => Ok(exc.py_str()),
            Value::Instance(instance) => match self.instance_text(instance, "__str__")? {
                Some(text) => Ok(text),
                None => self.repr(value),
            },
            other => self.repr(other),
        }
    }

    fn instance_text(&mut self, instance: &Rc<Instance>, dunder: &str) -> RunResult<Option<String>> {
        if instance.class.lookup(dunder).is_none() {
            return Ok(None);
        }
        let receiver = Value::Instance(Rc::clone(instance));
        match self.call_method_by_name(&receiver, dunder, ArgValues::default())? {
            Value::Str(s) => Ok(Some(s.to_string())),
            other => Err(ExcType::type_error(format!(
                "{dunder} returned non-string (type {})",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn write(&mut self, text: &str) -> RunResult<()> {
        self.out
            .write_output(Cow::Borrowed(text))
            .map_err(|err| Exception::new_msg(ExcType::RuntimeError, format!("failed to write output: {err}")))
    }
}

/// Python slice bounds before they are resolved against a length.
struct SliceBounds {
    lower: Option<i64>,
    upper: Option<i64>,
    step: i64,
}

impl SliceBounds {
    /// Resolves the bounds the way `slice.indices(len)` does: `(start, stop)` clamped to the sequence.
    fn resolve(&self, len: usize) -> (i64, i64) {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let clamp = |bound: i64, low: i64, high: i64| {
            let bound = if bound < 0 { bound + len } else { bound };
            bound.clamp(low, high)
        };
        if self.step > 0 {
            (
                self.lower.map_or(0, |b| clamp(b, 0, len)),
                self.upper.map_or(len, |b| clamp(b, 0, len)),
            )
        } else {
            (
                self.lower.map_or(len - 1, |b| clamp(b, -1, len - 1)),
                self.upper.map_or(-1, |b| clamp(b, -1, len - 1)),
            )
        }
    }

    /// Selected positions, in slice order.
    fn indices(&self, len: usize) -> Vec<usize> {
        let (start, stop) = self.resolve(len);
        let mut indices = Vec::new();
        let mut i = start;
        while (self.step > 0 && i < stop) || (self.step < 0 && i > stop) {
            if let Ok(index) = usize::try_from(i) {
                indices.push(index);
            }
            i += self.step;
        }
        indices
    }

    /// The half-open range replaced by a step-1 slice assignment.
    fn contiguous(&self, len: usize) -> (usize, usize) {
        let (start, stop) = self.resolve(len);
        let start = usize::try_from(start).unwrap_or(0);
        let stop = usize::try_from(stop).unwrap_or(0).max(start);
        (start, stop)
    }
}

fn get_slice(object: &Value, bounds: &SliceBounds) -> RunResult<Value> {
    match object {
        Value::List(list) => {
            let list = list.borrow();
            Ok(Value::new_list(
                bounds.indices(list.len()).into_iter().map(|i| list[i].clone()).collect(),
            ))
        }
        Value::Tuple(items) => Ok(Value::new_tuple(
            bounds.indices(items.len()).into_iter().map(|i| items[i].clone()).collect(),
        )),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::from(
                bounds.indices(chars.len()).into_iter().map(|i| chars[i]).collect::<String>(),
            ))
        }
        Value::Range(range) => {
            let indices = bounds.indices(range.len());
            let Some(start) = indices.first().and_then(|&i| range.get(i)) else {
                return Ok(Value::Range(Range::new(0, 0, 1)?));
            };
            let step = range.step.saturating_mul(bounds.step);
            let count = i64::try_from(indices.len()).unwrap_or(i64::MAX);
            let stop = start.saturating_add(count.saturating_mul(step));
            Ok(Value::Range(Range::new(start, stop, step)?))
        }
        other => Err(ExcType::type_error_not_sub(&other.type_name())),
    }
}

fn sequence_index(index: &Value, type_name: &str) -> RunResult<i64> {
    index.as_int().ok_or_else(|| {
        ExcType::type_error(format!(
            "{type_name} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })
}

/// Splits `value` into exactly `expected` items for an unpacking assignment.
fn unpack(value: &Value, expected: usize) -> RunResult<Vec<Value>> {
    let items = value.to_vec().map_err(|_| {
        ExcType::type_error(format!("cannot unpack non-iterable {} object", value.type_name()))
    })?;
    if items.len() > expected {
        return Err(ExcType::value_error(format!(
            "too many values to unpack (expected {expected})"
        )));
    }
    if items.len() < expected {
        return Err(ExcType::value_error(format!(
            "not enough values to unpack (expected {expected}, got {})",
            items.len()
        )));
    }
    Ok(items)
}

/// Whether a raised exception of `exc_type` is caught by an `except` clause naming `class_info`.
fn exception_matches(class_info: &Value, exc_type: ExcType) -> RunResult<bool> {
    match class_info {
        Value::Builtin(Builtins::ExcType(handler)) => Ok(exc_type.is_subclass_of(*handler)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if exception_matches(item, exc_type)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(ExcType::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

/// Values whose attributes come from a user class rather than a builtin method table.
fn is_user_object(value: &Value) -> bool {
    matches!(value, Value::Instance(_) | Value::Class(_))
}

/// Binds call arguments to a function's parameters.
fn bind_arguments(
    function: &Function,
    receiver: Option<Value>,
    args: ArgValues,
) -> RunResult<AHashMap<Rc<str>, Value>> {
    let signature = &function.def.signature;
    let name = &function.def.name;
    let mut positional: Vec<Value> = receiver.into_iter().chain(args.positional).collect();
    let param_count = signature.args.len();
    let extra = if positional.len() > param_count {
        positional.split_off(param_count)
    } else {
        Vec::new()
    };
    if !extra.is_empty() && signature.var_args.is_none() {
        let given = param_count + extra.len();
        return Err(ExcType::type_error(format!(
            "{name}() takes {param_count} positional argument{} but {given} {} given",
            if param_count == 1 { "" } else { "s" },
            if given == 1 { "was" } else { "were" },
        )));
    }

    let mut locals = AHashMap::new();
    for (param, value) in signature.args.iter().zip(positional) {
        locals.insert(Rc::clone(&param.name), value);
    }
    if let Some(var_args) = &signature.var_args {
        locals.insert(Rc::clone(var_args), Value::new_tuple(extra));
    }

    let mut var_kwargs = Dict::default();
    for (key, value) in args.kwargs {
        let param = signature
            .args
            .iter()
            .chain(&signature.kwargs)
            .find(|param| param.name == key);
        if let Some(param) = param {
            if locals.contains_key(&param.name) {
                return Err(ExcType::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            locals.insert(Rc::clone(&param.name), value);
        } else if signature.var_kwargs.is_some() {
            var_kwargs.insert(Value::Str(key), value)?;
        } else {
            return Err(ExcType::type_error_unexpected_keyword(name, &key));
        }
    }

    let mut missing = Vec::new();
    for (param, default) in signature.args.iter().zip(&function.defaults) {
        if !locals.contains_key(&param.name) {
            match default {
                Some(default) => {
                    locals.insert(Rc::clone(&param.name), default.clone());
                }
                None => missing.push(Rc::clone(&param.name)),
            }
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, "positional", &missing));
    }
    for (param, default) in signature.kwargs.iter().zip(&function.kw_defaults) {
        if !locals.contains_key(&param.name) {
            match default {
                Some(default) => {
                    locals.insert(Rc::clone(&param.name), default.clone());
                }
                None => missing.push(Rc::clone(&param.name)),
            }
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, "keyword-only", &missing));
    }
    if let Some(var_kwargs_name) = &signature.var_kwargs {
        locals.insert(Rc::clone(var_kwargs_name), Value::new_dict(var_kwargs));
    }
    Ok(locals)
}

/// `f() missing 2 required positional arguments: 'a' and 'b'`
fn missing_arguments(function: &str, kind: &str, missing: &[Rc<str>]) -> Exception {
    let quoted: Vec<String> = missing.iter().map(|name| format!("'{name}'")).collect();
    let names = match quoted.as_slice() {
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
        [] => String::new(),
    };
    ExcType::type_error(format!(
        "{function}() missing {} required {kind} argument{}: {names}",
        missing.len(),
        if missing.len() == 1 { "" } else { "s" },
    ))
}

/// `ascii()` escaping applied to an already computed repr.
fn ascii_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        match code {
            0..=0x7f => out.push(c),
            0x80..=0xff => out.push_str(&format!("\\x{code:02x}")),
            0x100..=0xffff => out.push_str(&format!("\\u{code:04x}")),
            _ => out.push_str(&format!("\\U{code:08x}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn slice_bounds_follow_python_indices() {
        let bounds = SliceBounds {
            lower: Some(-2),
            upper: None,
            step: 1,
        };
        assert_eq!(bounds.indices(5), vec![3, 4]);
        let reversed = SliceBounds {
            lower: None,
            upper: None,
            step: -2,
        };
        assert_eq!(reversed.indices(5), vec![4, 2, 0]);
    }

    #[test]
    fn contiguous_slice_never_inverts() {
        let bounds = SliceBounds {
            lower: Some(4),
            upper: Some(1),
            step: 1,
        };
        assert_eq!(bounds.contiguous(6), (4, 4));
    }

    #[test]
    fn missing_arguments_lists_names_like_python() {
        let names: Vec<Rc<str>> = vec![Rc::from("a"), Rc::from("b"), Rc::from("c")];
        let exc = missing_arguments("f", "positional", &names);
        assert_eq!(
            exc.message(),
            Some("f() missing 3 required positional arguments: 'a', 'b', and 'c'")
        );
    }

    #[test]
    fn ascii_escapes_non_ascii() {
        assert_eq!(ascii_escape("'é✓'"), "'\\xe9\\u2713'");
    }

    #[test]
    fn unpack_reports_counts() {
        let value = Value::new_list(vec![Value::Int(1)]);
        let exc = unpack(&value, 2).unwrap_err();
        assert_eq!(exc.message(), Some("not enough values to unpack (expected 2, got 1)"));
    }
}
