use std::fmt;

use crate::function::Function;

#[derive(Debug, Clone)]
pub enum Object {
    Boolean(bool),
    Callable(Function),
    Null,
    Number(f64),
    String(String),
    // Stored for `let x;` until the first assignment; reading it back is a
    // runtime error.
    Uninitialized,
}

impl Object {
    // Value equality: operands of different types are never equal and
    // nothing is coerced.
    pub fn equals(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (_, Object::Null) => false,
            (Object::Null, _) => false,
            (Object::Boolean(left), Object::Boolean(right)) => left == right,
            (Object::Number(left), Object::Number(right)) => left == right,
            (Object::String(left), Object::String(right)) => left.eq(right),
            _ => false,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Boolean(b) => write!(f, "{b}"),
            Object::Callable(function) => write!(f, "{function}"),
            Object::Null => write!(f, "nil"),
            Object::Number(n) => write!(f, "{n}"),
            Object::String(s) => write!(f, "{s}"),
            Object::Uninitialized => write!(f, "uninitialized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_cross_type_pairs() {
        assert!(Object::Null.equals(&Object::Null));
        assert!(!Object::Null.equals(&Object::Boolean(false)));
        assert!(!Object::Number(0.0).equals(&Object::Boolean(false)));
        assert!(!Object::Number(1.0).equals(&Object::String("1".to_string())));
        assert!(Object::Number(2.0).equals(&Object::Number(2.0)));
        assert!(Object::String("a".to_string()).equals(&Object::String("a".to_string())));
    }

    #[test]
    fn numbers_display_without_trailing_zero() {
        assert_eq!(Object::Number(7.0).to_string(), "7");
        assert_eq!(Object::Number(2.5).to_string(), "2.5");
        assert_eq!(Object::Null.to_string(), "nil");
    }
}
