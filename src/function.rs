use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::environment::Environment;
use crate::error::Error;
use crate::interpreter::{Completion, Interpreter};
use crate::object::Object;
use crate::syntax::Stmt;
use crate::token::Token;

#[derive(Clone)]
pub enum Function {
    // Functions the interpreter exposes to user code but implements in the
    // host language. Installed into the global frame at construction.
    Native {
        arity: usize,
        body: fn(&[Object]) -> Object,
    },

    // A user function keeps the environment that was current at its
    // declaration; that link is what makes closures lexical.
    User {
        name: Token,
        params: Rc<Vec<Token>>,
        body: Rc<Vec<Stmt>>,
        closure: Rc<RefCell<Environment>>,
    },
}

impl Function {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: &[Object],
    ) -> Result<Object, Error> {
        match self {
            Function::Native { body, .. } => Ok(body(arguments)),
            Function::User {
                params,
                body,
                closure,
                ..
            } => {
                // Each call gets its own environment, otherwise recursion
                // would break. Its parent is the closure environment, not
                // the caller's.
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                for (param, argument) in params.iter().zip(arguments.iter()) {
                    environment
                        .borrow_mut()
                        .define(param.lexeme.clone(), argument.clone());
                }
                match interpreter.execute_block(body, environment)? {
                    Completion::Return(value) => Ok(value),
                    // Falling off the end of the body returns nil. A Break
                    // cannot get here; the resolver rejects break outside a
                    // loop and loops catch it themselves.
                    _ => Ok(Object::Null),
                }
            }
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native { arity, .. } => *arity,
            Function::User { params, .. } => params.len(),
        }
    }
}

// Wall-clock milliseconds since the Unix epoch.
pub fn clock(_arguments: &[Object]) -> Object {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    Object::Number(millis as f64)
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { .. } => write!(f, "<native fn>"),
            Function::User { name, .. } => write!(f, "<fn {}>", name.lexeme),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { .. } => write!(f, "<native fn>"),
            Function::User { name, .. } => write!(f, "<fn {}>", name.lexeme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_returns_a_positive_number() {
        match clock(&[]) {
            Object::Number(millis) => assert!(millis > 0.0),
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[test]
    fn native_arity_is_fixed() {
        let function = Function::Native {
            arity: 0,
            body: clock,
        };
        assert_eq!(function.arity(), 0);
        assert_eq!(function.to_string(), "<native fn>");
    }
}
