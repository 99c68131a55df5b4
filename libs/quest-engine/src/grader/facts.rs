// Structural facts gathered from one walk over a parsed module
//
// Mirrors what a full-tree walk sees: nested function bodies, branches,
// comprehensions and call arguments all count. Only plain `name = ...`
// assignments bind a name (not augmented, annotated or tuple targets), and
// only calls through a bare name count towards that name.

use rustpython_parser::ast::{self, Expr, Stmt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    If,
    For,
    While,
}

impl StatementKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            StatementKind::If => "if",
            StatementKind::For => "for",
            StatementKind::While => "while",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyntaxFacts {
    assigned_names: BTreeSet<String>,
    call_counts: BTreeMap<String, usize>,
    function_names: BTreeSet<String>,
    statements: BTreeSet<StatementKind>,
}

impl SyntaxFacts {
    pub fn collect(suite: &[Stmt]) -> Self {
        let mut facts = Self::default();
        facts.visit_body(suite);
        facts
    }

    pub fn assigns(&self, name: &str) -> bool {
        self.assigned_names.contains(name)
    }

    pub fn calls_to(&self, callee: &str) -> usize {
        self.call_counts.get(callee).copied().unwrap_or(0)
    }

    pub fn defines_function(&self, name: &str) -> bool {
        self.function_names.contains(name)
    }

    pub fn has_statement(&self, kind: StatementKind) -> bool {
        self.statements.contains(&kind)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.function_names.iter().map(String::as_str)
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.visit_expr(expr);
        }
    }

    fn visit_opt(&mut self, expr: Option<&Expr>) {
        if let Some(expr) = expr {
            self.visit_expr(expr);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.function_names.insert(def.name.as_str().to_string());
                self.visit_exprs(&def.decorator_list);
                self.visit_type_params(&def.type_params);
                self.visit_arguments(&def.args);
                self.visit_opt(def.returns.as_deref());
                self.visit_body(&def.body);
            }
            // async defs are not plain function definitions
            Stmt::AsyncFunctionDef(def) => {
                self.visit_exprs(&def.decorator_list);
                self.visit_type_params(&def.type_params);
                self.visit_arguments(&def.args);
                self.visit_opt(def.returns.as_deref());
                self.visit_body(&def.body);
            }
            Stmt::ClassDef(class) => {
                self.visit_exprs(&class.decorator_list);
                self.visit_type_params(&class.type_params);
                self.visit_exprs(&class.bases);
                self.visit_keywords(&class.keywords);
                self.visit_body(&class.body);
            }
            Stmt::TypeAlias(alias) => {
                self.visit_expr(&alias.name);
                self.visit_type_params(&alias.type_params);
                self.visit_expr(&alias.value);
            }
            Stmt::Return(ret) => self.visit_opt(ret.value.as_deref()),
            Stmt::Delete(del) => self.visit_exprs(&del.targets),
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    if let Expr::Name(name) = target {
                        self.assigned_names.insert(name.id.as_str().to_string());
                    }
                    self.visit_expr(target);
                }
                self.visit_expr(&assign.value);
            }
            Stmt::AugAssign(assign) => {
                self.visit_expr(&assign.target);
                self.visit_expr(&assign.value);
            }
            Stmt::AnnAssign(assign) => {
                self.visit_expr(&assign.target);
                self.visit_expr(&assign.annotation);
                self.visit_opt(assign.value.as_deref());
            }
            Stmt::For(stmt) => {
                self.statements.insert(StatementKind::For);
                self.visit_expr(&stmt.target);
                self.visit_expr(&stmt.iter);
                self.visit_body(&stmt.body);
                self.visit_body(&stmt.orelse);
            }
            Stmt::AsyncFor(stmt) => {
                self.visit_expr(&stmt.target);
                self.visit_expr(&stmt.iter);
                self.visit_body(&stmt.body);
                self.visit_body(&stmt.orelse);
            }
            Stmt::While(stmt) => {
                self.statements.insert(StatementKind::While);
                self.visit_expr(&stmt.test);
                self.visit_body(&stmt.body);
                self.visit_body(&stmt.orelse);
            }
            Stmt::If(stmt) => {
                self.statements.insert(StatementKind::If);
                self.visit_expr(&stmt.test);
                self.visit_body(&stmt.body);
                self.visit_body(&stmt.orelse);
            }
            Stmt::With(stmt) => {
                for item in &stmt.items {
                    self.visit_with_item(item);
                }
                self.visit_body(&stmt.body);
            }
            Stmt::AsyncWith(stmt) => {
                for item in &stmt.items {
                    self.visit_with_item(item);
                }
                self.visit_body(&stmt.body);
            }
            Stmt::Match(stmt) => {
                self.visit_expr(&stmt.subject);
                for case in &stmt.cases {
                    self.visit_opt(case.guard.as_deref());
                    self.visit_body(&case.body);
                }
            }
            Stmt::Raise(stmt) => {
                self.visit_opt(stmt.exc.as_deref());
                self.visit_opt(stmt.cause.as_deref());
            }
            Stmt::Try(stmt) => {
                self.visit_body(&stmt.body);
                self.visit_handlers(&stmt.handlers);
                self.visit_body(&stmt.orelse);
                self.visit_body(&stmt.finalbody);
            }
            Stmt::TryStar(stmt) => {
                self.visit_body(&stmt.body);
                self.visit_handlers(&stmt.handlers);
                self.visit_body(&stmt.orelse);
                self.visit_body(&stmt.finalbody);
            }
            Stmt::Assert(stmt) => {
                self.visit_expr(&stmt.test);
                self.visit_opt(stmt.msg.as_deref());
            }
            Stmt::Expr(stmt) => self.visit_expr(&stmt.value),
            _ => {}
        }
    }

    fn visit_arguments(&mut self, arguments: &ast::Arguments) {
        let with_defaults = arguments
            .posonlyargs
            .iter()
            .chain(&arguments.args)
            .chain(&arguments.kwonlyargs);
        for arg in with_defaults {
            self.visit_arg(&arg.def);
            self.visit_opt(arg.default.as_deref());
        }
        for arg in arguments.vararg.iter().chain(&arguments.kwarg) {
            self.visit_arg(arg);
        }
    }

    fn visit_arg(&mut self, arg: &ast::Arg) {
        self.visit_opt(arg.annotation.as_deref());
    }

    fn visit_keywords(&mut self, keywords: &[ast::Keyword]) {
        for keyword in keywords {
            self.visit_expr(&keyword.value);
        }
    }

    fn visit_type_params(&mut self, params: &[ast::TypeParam]) {
        for param in params {
            if let ast::TypeParam::TypeVar(var) = param {
                self.visit_opt(var.bound.as_deref());
            }
        }
    }

    fn visit_with_item(&mut self, item: &ast::WithItem) {
        self.visit_expr(&item.context_expr);
        self.visit_opt(item.optional_vars.as_deref());
    }

    fn visit_handlers(&mut self, handlers: &[ast::ExceptHandler]) {
        for handler in handlers {
            match handler {
                ast::ExceptHandler::ExceptHandler(handler) => {
                    self.visit_opt(handler.type_.as_deref());
                    self.visit_body(&handler.body);
                }
            }
        }
    }

    fn visit_comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.visit_expr(&generator.target);
            self.visit_expr(&generator.iter);
            self.visit_exprs(&generator.ifs);
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call(call) => {
                if let Expr::Name(name) = &*call.func {
                    *self
                        .call_counts
                        .entry(name.id.as_str().to_string())
                        .or_insert(0) += 1;
                }
                self.visit_expr(&call.func);
                self.visit_exprs(&call.args);
                self.visit_keywords(&call.keywords);
            }
            Expr::BoolOp(e) => self.visit_exprs(&e.values),
            Expr::NamedExpr(e) => {
                self.visit_expr(&e.target);
                self.visit_expr(&e.value);
            }
            Expr::BinOp(e) => {
                self.visit_expr(&e.left);
                self.visit_expr(&e.right);
            }
            Expr::UnaryOp(e) => self.visit_expr(&e.operand),
            Expr::Lambda(e) => {
                self.visit_arguments(&e.args);
                self.visit_expr(&e.body);
            }
            Expr::IfExp(e) => {
                self.visit_expr(&e.test);
                self.visit_expr(&e.body);
                self.visit_expr(&e.orelse);
            }
            Expr::Dict(e) => {
                for key in e.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                self.visit_exprs(&e.values);
            }
            Expr::Set(e) => self.visit_exprs(&e.elts),
            Expr::ListComp(e) => {
                self.visit_expr(&e.elt);
                self.visit_comprehensions(&e.generators);
            }
            Expr::SetComp(e) => {
                self.visit_expr(&e.elt);
                self.visit_comprehensions(&e.generators);
            }
            Expr::GeneratorExp(e) => {
                self.visit_expr(&e.elt);
                self.visit_comprehensions(&e.generators);
            }
            Expr::DictComp(e) => {
                self.visit_expr(&e.key);
                self.visit_expr(&e.value);
                self.visit_comprehensions(&e.generators);
            }
            Expr::Await(e) => self.visit_expr(&e.value),
            Expr::Yield(e) => self.visit_opt(e.value.as_deref()),
            Expr::YieldFrom(e) => self.visit_expr(&e.value),
            Expr::Compare(e) => {
                self.visit_expr(&e.left);
                self.visit_exprs(&e.comparators);
            }
            Expr::FormattedValue(e) => self.visit_expr(&e.value),
            Expr::JoinedStr(e) => self.visit_exprs(&e.values),
            Expr::Attribute(e) => self.visit_expr(&e.value),
            Expr::Subscript(e) => {
                self.visit_expr(&e.value);
                self.visit_expr(&e.slice);
            }
            Expr::Starred(e) => self.visit_expr(&e.value),
            Expr::List(e) => self.visit_exprs(&e.elts),
            Expr::Tuple(e) => self.visit_exprs(&e.elts),
            Expr::Slice(e) => {
                self.visit_opt(e.lower.as_deref());
                self.visit_opt(e.upper.as_deref());
                self.visit_opt(e.step.as_deref());
            }
            _ => {}
        }
    }
}
