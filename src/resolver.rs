use std::mem;
use std::rc::Rc;

use crate::error::{parser_error, warning, Error};
use crate::interpreter::Interpreter;
use crate::syntax::{expr, stmt};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::Token;

// Tracks whether the code being visited sits inside a function
// declaration, so a stray top-level return can be rejected here instead of
// unwinding at runtime.
#[derive(Debug, Clone, Copy)]
enum FunctionType {
    None,
    Function,
}

// A binding moves Declared → Defined while its initializer resolves, and
// to Used on the first reference. Whatever is not Used when the scope pops
// earns a warning.
#[derive(Debug, Clone, Copy, PartialEq)]
enum VarStatus {
    Declared,
    Defined,
    Used,
}

struct Binding {
    name: Token,
    status: VarStatus,
}

// Walks the tree once between parsing and evaluation, keeping a stack of
// scopes. Each scope is an ordered list of bindings; a binding's position
// is exactly the slot index the environment will hand out at runtime,
// because both passes see declarations in source order.
//
// Only local block scopes live on the stack. Top-level variables are more
// dynamic, so references that match no scope are left out of the side
// table and fall back to a name lookup in the global frame.
pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,
    scopes: Vec<Vec<Binding>>,
    current_function: FunctionType,
    loop_depth: usize,
    pub had_error: bool,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter) -> Self {
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            loop_depth: 0,
            had_error: false,
        }
    }

    pub fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement)
        }
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        let _ = statement.accept(self);
    }

    fn resolve_expr(&mut self, expression: &Expr) {
        let _ = expression.accept(self);
    }

    fn begin_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn end_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope stack is balanced");
        for binding in scope {
            if binding.status != VarStatus::Used {
                warning(
                    binding.name.line,
                    &format!("Unused identifier '{}'.", binding.name.lexeme),
                );
            }
        }
    }

    // Declaring adds the binding to the innermost scope so it shadows any
    // outer one, but leaves it unavailable until define() flips it; that
    // is how `let a = a;` gets caught.
    fn declare(&mut self, name: &Token) {
        if self.scopes.is_empty() {
            return;
        }

        let duplicate = self
            .scopes
            .last()
            .expect("scope stack is non-empty")
            .iter()
            .any(|binding| binding.name.lexeme == name.lexeme);
        if duplicate {
            // not appended again: slot numbering must keep matching the
            // environment's declaration order
            self.error(
                name,
                "Variable with this name already declared in this scope.",
            );
            return;
        }

        self.scopes
            .last_mut()
            .expect("scope stack is non-empty")
            .push(Binding {
                name: name.clone(),
                status: VarStatus::Declared,
            });
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(binding) = scope
                .iter_mut()
                .find(|binding| binding.name.lexeme == name.lexeme)
            {
                binding.status = VarStatus::Defined;
            }
        }
    }

    // Walk the scope stack from the innermost scope outward. The first
    // scope holding the name decides: still Declared means the reference
    // sits inside its own initializer; otherwise the (depth, slot)
    // coordinates go into the interpreter's side table. A name found
    // nowhere stays unresolved and is assumed global.
    fn resolve_local(&mut self, name: &Token, id: usize) {
        let mut self_initializer = false;

        for (depth, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(slot) = scope
                .iter()
                .position(|binding| binding.name.lexeme == name.lexeme)
            {
                if scope[slot].status == VarStatus::Declared {
                    self_initializer = true;
                } else {
                    scope[slot].status = VarStatus::Used;
                    log::trace!("'{}' resolved to depth {depth}, slot {slot}", name.lexeme);
                    self.interpreter.resolve(id, depth, slot);
                }
                break;
            }
        }

        if self_initializer {
            self.error(name, "Can't read local variable in its own initializer.");
        }
    }

    // The body is traversed right here, unlike at runtime where declaring
    // a function doesn't touch the body until it is called. Loop depth
    // resets so a break inside the body can't target a loop around the
    // declaration.
    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], tpe: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, tpe);
        let enclosing_loop_depth = mem::replace(&mut self.loop_depth, 0);

        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();

        self.current_function = enclosing_function;
        self.loop_depth = enclosing_loop_depth;
    }

    fn error(&mut self, token: &Token, message: &str) {
        parser_error(token, message);
        self.had_error = true;
    }
}

impl<'i> expr::Visitor<()> for Resolver<'i> {
    fn visit_assign_expr(&mut self, name: &Token, value: &Expr, id: usize) -> Result<(), Error> {
        // the assigned value may itself reference variables, so it
        // resolves first
        self.resolve_expr(value);
        self.resolve_local(name, id);
        Ok(())
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        _paren: &Token,
        arguments: &[Expr],
    ) -> Result<(), Error> {
        self.resolve_expr(callee);
        for argument in arguments {
            self.resolve_expr(argument);
        }
        Ok(())
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_literal_expr(&mut self, _value: &LiteralValue) -> Result<(), Error> {
        Ok(())
    }

    // static analysis does no short-circuiting; both operands resolve
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_ternary_expr(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_expr(then_branch);
        self.resolve_expr(else_branch);
        Ok(())
    }

    fn visit_unary_expr(&mut self, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_variable_expr(&mut self, name: &Token, id: usize) -> Result<(), Error> {
        self.resolve_local(name, id);
        Ok(())
    }
}

impl<'i> stmt::Visitor<()> for Resolver<'i> {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        self.begin_scope();
        self.resolve_stmts(statements);
        self.end_scope();
        Ok(())
    }

    fn visit_break_stmt(&mut self, keyword: &Token) -> Result<(), Error> {
        if self.loop_depth == 0 {
            self.error(keyword, "Cannot use 'break' outside of a loop.");
        }
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    // The name defines eagerly, before the body resolves, so the function
    // can recursively refer to itself.
    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &Rc<Vec<Token>>,
        body: &Rc<Vec<Stmt>>,
    ) -> Result<(), Error> {
        self.declare(name);
        self.define(name);

        self.resolve_function(params, body, FunctionType::Function);
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(then_branch);
        if let Some(else_stmt) = else_branch {
            self.resolve_stmt(else_stmt);
        }
        Ok(())
    }

    fn visit_null_stmt(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_return_stmt(&mut self, keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        if let FunctionType::None = self.current_function {
            self.error(keyword, "Illegal return statement.");
        }

        if let Some(return_value) = value {
            self.resolve_expr(return_value);
        }
        Ok(())
    }

    // declaring and defining split so the initializer resolves while the
    // new binding exists but is still unavailable
    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        self.declare(name);
        if let Some(init) = initializer {
            self.resolve_expr(init);
        }
        self.define(name);
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.loop_depth += 1;
        self.resolve_stmt(body);
        self.loop_depth -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve(source: &str) -> (Interpreter, bool) {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens();
        let mut parser = Parser::new(tokens);
        let statements = parser.parse().expect("test source tokenizes");
        assert!(!parser.had_error, "test source should parse: {source}");

        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve_stmts(&statements);
        let had_error = resolver.had_error;
        (interpreter, had_error)
    }

    #[test]
    fn top_level_return_is_rejected() {
        let (_, had_error) = resolve("return 1;");
        assert!(had_error);
    }

    #[test]
    fn return_inside_function_is_fine() {
        let (_, had_error) = resolve("fun f() { return 1; } f();");
        assert!(!had_error);
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_rejected() {
        let (_, had_error) = resolve("{ let a = a; }");
        assert!(had_error);
    }

    // the new binding exists but is unavailable while its initializer
    // resolves, even when an outer binding of the same name is in scope
    #[test]
    fn shadowing_initializer_reading_its_own_name_is_rejected() {
        let (_, had_error) = resolve("let a = 1; { let a = a; }");
        assert!(had_error);
    }

    #[test]
    fn initializer_reading_other_bindings_is_fine() {
        let (_, had_error) = resolve("let a = 1; { let b = a; print b; }");
        assert!(!had_error);
    }

    #[test]
    fn redeclaration_in_the_same_scope_is_rejected() {
        let (_, had_error) = resolve("{ let a = 1; let a = 2; print a; }");
        assert!(had_error);
    }

    #[test]
    fn global_redeclaration_is_allowed() {
        let (_, had_error) = resolve("let a = 1; let a = 2; print a;");
        assert!(!had_error);
    }

    #[test]
    fn break_outside_a_loop_is_rejected() {
        let (_, had_error) = resolve("break;");
        assert!(had_error);

        let (_, had_error) = resolve("while true { break; }");
        assert!(!had_error);
    }

    #[test]
    fn break_cannot_escape_a_function_body() {
        let (_, had_error) = resolve("while true { fun f() { break; } f(); }");
        assert!(had_error);
    }

    #[test]
    fn local_references_get_depth_and_slot() {
        // the only Variable node is `b` inside the print, id 0
        let (interpreter, had_error) = resolve("{ let a = 1; let b = 2; { print b; } }");
        assert!(!had_error);
        assert_eq!(interpreter.resolution(0), Some((1, 1)));
    }

    #[test]
    fn same_scope_references_get_depth_zero() {
        let (interpreter, had_error) = resolve("{ let a = 1; print a; }");
        assert!(!had_error);
        assert_eq!(interpreter.resolution(0), Some((0, 0)));
    }

    #[test]
    fn globals_stay_out_of_the_side_table() {
        let (interpreter, had_error) = resolve("let a = 1; print a;");
        assert!(!had_error);
        assert_eq!(interpreter.resolution(0), None);
    }

    #[test]
    fn resolution_is_deterministic() {
        let source = "{ let a = 1; fun f(b) { return a + b; } print f(2); }";
        let (first, _) = resolve(source);
        let (second, _) = resolve(source);
        for id in 0..8 {
            assert_eq!(first.resolution(id), second.resolution(id));
        }
    }
}
