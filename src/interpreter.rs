use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use crate::environment::Environment;
use crate::error::Error;
use crate::function::{self, Function};
use crate::object::Object;
use crate::syntax::{expr, stmt};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

// Outcome of one statement. Break and Return unwind through this channel
// and get caught at the enclosing loop or call frame; only real failures
// travel as errors.
#[derive(Debug)]
pub enum Completion {
    Normal,
    Break,
    Return(Object),
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    // the frame that tracks the innermost scope being executed; blocks and
    // calls swap it and put it back on every exit path
    environment: Rc<RefCell<Environment>>,
    // side table written by the resolver: reference id → (depth, slot)
    locals: HashMap<usize, (usize, usize)>,
    out: Rc<RefCell<dyn Write>>,
    repl: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(io::stdout())))
    }

    // Program output goes through the sink so tests can capture it.
    pub fn with_output(out: Rc<RefCell<dyn Write>>) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock".to_string(),
            Object::Callable(Function::Native {
                arity: 0,
                body: function::clock,
            }),
        );

        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            out,
            repl: false,
        }
    }

    // In REPL mode expression statements echo their value.
    pub fn set_repl(&mut self, repl: bool) {
        self.repl = repl;
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        for statement in statements {
            // top-level Break/Return never show up here; the resolver
            // rejects them before evaluation starts
            self.execute(statement)?;
        }
        Ok(())
    }

    // Called by the resolver as it walks over variables; by the time the
    // interpreter runs, it has everything it needs.
    pub fn resolve(&mut self, id: usize, depth: usize, slot: usize) {
        self.locals.insert(id, (depth, slot));
    }

    #[cfg(test)]
    pub fn resolution(&self, id: usize) -> Option<(usize, usize)> {
        self.locals.get(&id).copied()
    }

    fn execute(&mut self, statement: &Stmt) -> Result<Completion, Error> {
        statement.accept(self)
    }

    // Runs the statements with `environment` as the current frame and
    // restores the previous frame no matter how the block exits: normal
    // completion, a signal, or a runtime error.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Completion, Error> {
        let previous = mem::replace(&mut self.environment, environment);

        let mut result = Ok(Completion::Normal);
        for statement in statements {
            match self.execute(statement) {
                Ok(Completion::Normal) => continue,
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;
        result
    }

    fn evaluate(&mut self, expression: &Expr) -> Result<Object, Error> {
        expression.accept(self)
    }

    // Resolved references index straight into the frame chain; anything
    // else is a name lookup in the global frame. Either way, a binding
    // still holding the uninitialized sentinel must not be read.
    fn lookup_variable(&self, name: &Token, id: usize) -> Result<Object, Error> {
        let value = match self.locals.get(&id) {
            Some(&(depth, slot)) => self.environment.borrow().get_at(depth, slot),
            None => self.globals.borrow().get(name)?,
        };

        if let Object::Uninitialized = value {
            return Err(Error::Runtime {
                token: name.clone(),
                message: format!(
                    "Variable '{}' must be initialized before use.",
                    name.lexeme
                ),
            });
        }
        Ok(value)
    }

    // nil, false and 0 are falsy; everything else, the empty string
    // included, is truthy
    fn is_truthy(&self, value: &Object) -> bool {
        match value {
            Object::Null => false,
            Object::Boolean(b) => *b,
            Object::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    fn number_operands(
        &self,
        operator: &Token,
        left: Object,
        right: Object,
    ) -> Result<(f64, f64), Error> {
        match (left, right) {
            (Object::Number(left_num), Object::Number(right_num)) => Ok((left_num, right_num)),
            _ => Err(Error::Runtime {
                token: operator.clone(),
                message: "Operands must be numbers.".to_string(),
            }),
        }
    }
}

impl expr::Visitor<Object> for Interpreter {
    fn visit_assign_expr(&mut self, name: &Token, value: &Expr, id: usize)
        -> Result<Object, Error> {
        let value = self.evaluate(value)?;

        match self.locals.get(&id) {
            Some(&(depth, slot)) => {
                self.environment
                    .borrow_mut()
                    .assign_at(depth, slot, value.clone());
            }
            None => self.globals.borrow_mut().assign(name, value.clone())?,
        }

        // assignment is an expression; its result is the assigned value
        Ok(value)
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => {
                let (l, r) = self.number_operands(operator, l, r)?;
                Ok(Object::Number(l - r))
            }
            TokenType::Slash => {
                let (l, r) = self.number_operands(operator, l, r)?;
                if r == 0.0 {
                    return Err(Error::Runtime {
                        token: operator.clone(),
                        message: "Cannot divide by 0".to_string(),
                    });
                }
                Ok(Object::Number(l / r))
            }
            TokenType::Star => {
                let (l, r) = self.number_operands(operator, l, r)?;
                Ok(Object::Number(l * r))
            }
            TokenType::Plus => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Number(left_num + right_num))
                }
                (Object::String(left_str), Object::String(right_str)) => {
                    Ok(Object::String(left_str + &right_str))
                }
                (Object::String(left_str), Object::Number(right_num)) => {
                    Ok(Object::String(format!("{left_str}{right_num}")))
                }
                (Object::Number(left_num), Object::String(right_str)) => {
                    Ok(Object::String(format!("{left_num}{right_str}")))
                }
                _ => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Addition not supported".to_string(),
                }),
            },
            TokenType::Greater => {
                let (l, r) = self.number_operands(operator, l, r)?;
                Ok(Object::Boolean(l > r))
            }
            TokenType::GreaterEqual => {
                let (l, r) = self.number_operands(operator, l, r)?;
                Ok(Object::Boolean(l >= r))
            }
            TokenType::Less => {
                let (l, r) = self.number_operands(operator, l, r)?;
                Ok(Object::Boolean(l < r))
            }
            TokenType::LessEqual => {
                let (l, r) = self.number_operands(operator, l, r)?;
                Ok(Object::Boolean(l <= r))
            }
            TokenType::BangEqual => Ok(Object::Boolean(!l.equals(&r))),
            TokenType::EqualEqual => Ok(Object::Boolean(l.equals(&r))),
            // the comma operator: the left side already ran for its
            // side effects
            TokenType::Comma => Ok(r),
            _ => unreachable!(),
        }
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> Result<Object, Error> {
        let callee = self.evaluate(callee)?;

        // all arguments evaluate, in source order, before the call
        let mut evaluated = Vec::with_capacity(arguments.len());
        for argument in arguments {
            evaluated.push(self.evaluate(argument)?);
        }

        match callee {
            Object::Callable(function) => {
                if evaluated.len() != function.arity() {
                    return Err(Error::Runtime {
                        token: paren.clone(),
                        message: format!(
                            "Expected {} arguments but got {}.",
                            function.arity(),
                            evaluated.len()
                        ),
                    });
                }
                function.call(self, &evaluated)
            }
            _ => Err(Error::Runtime {
                token: paren.clone(),
                message: "Identifier is not a function".to_string(),
            }),
        }
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<Object, Error> {
        self.evaluate(expression)
    }

    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<Object, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => Object::Boolean(*b),
            LiteralValue::Null => Object::Null,
            LiteralValue::Number(n) => Object::Number(*n),
            LiteralValue::String(s) => Object::String(s.clone()),
        })
    }

    // the deciding operand comes back as-is, not coerced to a boolean
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let left = self.evaluate(left)?;

        match operator.token_type {
            TokenType::Or if self.is_truthy(&left) => Ok(left),
            TokenType::And if !self.is_truthy(&left) => Ok(left),
            _ => self.evaluate(right),
        }
    }

    fn visit_ternary_expr(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<Object, Error> {
        let condition = self.evaluate(condition)?;
        if self.is_truthy(&condition) {
            self.evaluate(then_branch)
        } else {
            self.evaluate(else_branch)
        }
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match right {
                Object::Number(n) => Ok(Object::Number(-n)),
                _ => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Operand must be a number.".to_string(),
                }),
            },
            TokenType::Bang => Ok(Object::Boolean(!self.is_truthy(&right))),
            _ => unreachable!(),
        }
    }

    fn visit_variable_expr(&mut self, name: &Token, id: usize) -> Result<Object, Error> {
        self.lookup_variable(name, id)
    }
}

impl stmt::Visitor<Completion> for Interpreter {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<Completion, Error> {
        let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
        self.execute_block(statements, environment)
    }

    fn visit_break_stmt(&mut self, _keyword: &Token) -> Result<Completion, Error> {
        Ok(Completion::Break)
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<Completion, Error> {
        let value = self.evaluate(expression)?;
        if self.repl {
            writeln!(self.out.borrow_mut(), "{value}")?;
        }
        Ok(Completion::Normal)
    }

    // the function value captures the frame that is current right now;
    // that frame outlives this block for as long as the value does
    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &Rc<Vec<Token>>,
        body: &Rc<Vec<Stmt>>,
    ) -> Result<Completion, Error> {
        let function = Function::User {
            name: name.clone(),
            params: Rc::clone(params),
            body: Rc::clone(body),
            closure: Rc::clone(&self.environment),
        };
        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Callable(function));
        Ok(Completion::Normal)
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<Completion, Error> {
        let condition = self.evaluate(condition)?;
        if self.is_truthy(&condition) {
            self.execute(then_branch)
        } else if let Some(else_stmt) = else_branch {
            self.execute(else_stmt)
        } else {
            Ok(Completion::Normal)
        }
    }

    fn visit_null_stmt(&mut self) -> Result<Completion, Error> {
        Ok(Completion::Normal)
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<Completion, Error> {
        let value = self.evaluate(expression)?;
        writeln!(self.out.borrow_mut(), "{value}")?;
        Ok(Completion::Normal)
    }

    fn visit_return_stmt(
        &mut self,
        _keyword: &Token,
        value: &Option<Expr>,
    ) -> Result<Completion, Error> {
        let value = match value {
            Some(value) => self.evaluate(value)?,
            None => Object::Null,
        };
        Ok(Completion::Return(value))
    }

    fn visit_var_stmt(
        &mut self,
        name: &Token,
        initializer: &Option<Expr>,
    ) -> Result<Completion, Error> {
        let value = match initializer {
            Some(init) => self.evaluate(init)?,
            None => Object::Uninitialized,
        };

        // the resolver already rejects local redeclaration; this is the
        // runtime backstop
        if !self.environment.borrow().is_global() && self.environment.borrow().contains(&name.lexeme)
        {
            return Err(Error::Runtime {
                token: name.clone(),
                message: format!("Redeclaration of '{}'.", name.lexeme),
            });
        }

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), value);
        Ok(Completion::Normal)
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<Completion, Error> {
        loop {
            let condition_value = self.evaluate(condition)?;
            if !self.is_truthy(&condition_value) {
                break;
            }

            match self.execute(body)? {
                Completion::Break => break,
                ret @ Completion::Return(_) => return Ok(ret),
                Completion::Normal => (),
            }
        }
        Ok(Completion::Normal)
    }
}
