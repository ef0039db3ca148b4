use std::cell::RefCell;
use std::rc::Rc;

use crate::{error::Error, object::Object, token::Token};

// One frame of the scope chain. Slots append in declaration order, which
// is the same order the resolver numbered them in; resolved lookups index
// straight into the vector. Only the global frame is ever searched by
// name.
pub struct Environment {
    slots: Vec<(String, Object)>,
    enclosing: Option<Rc<RefCell<Environment>>>, // Parent-pointer
}

impl Environment {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            enclosing: None,
        }
    }

    pub fn from(enclosing: &Rc<RefCell<Environment>>) -> Self {
        Self {
            slots: Vec::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }
    }

    pub fn define(&mut self, name: String, value: Object) {
        self.slots.push((name, value));
    }

    // Whether this frame (and only this frame) already binds the name.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|(slot_name, _)| slot_name == name)
    }

    pub fn is_global(&self) -> bool {
        self.enclosing.is_none()
    }

    // The resolver guarantees depth and slot are in bounds; a miss here is
    // an interpreter bug, not a user error.
    pub fn get_at(&self, depth: usize, slot: usize) -> Object {
        if depth == 0 {
            self.slots
                .get(slot)
                .map(|(_, value)| value.clone())
                .expect("resolved slot exists in frame")
        } else {
            self.enclosing
                .as_ref()
                .expect("resolved depth stays within the chain")
                .borrow()
                .get_at(depth - 1, slot)
        }
    }

    pub fn assign_at(&mut self, depth: usize, slot: usize, value: Object) {
        if depth == 0 {
            self.slots
                .get_mut(slot)
                .expect("resolved slot exists in frame")
                .1 = value;
        } else {
            self.enclosing
                .as_ref()
                .expect("resolved depth stays within the chain")
                .borrow_mut()
                .assign_at(depth - 1, slot, value);
        }
    }

    // Name lookup in this single frame, newest binding first so a global
    // redefinition shadows the older slot.
    pub fn get(&self, name: &Token) -> Result<Object, Error> {
        let key = &*name.lexeme;
        match self.slots.iter().rev().find(|(slot_name, _)| slot_name == key) {
            Some((_, value)) => Ok(value.clone()),
            None => Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", key),
            }),
        }
    }

    pub fn assign(&mut self, name: &Token, value: Object) -> Result<(), Error> {
        let key = &*name.lexeme;
        match self
            .slots
            .iter_mut()
            .rev()
            .find(|(slot_name, _)| slot_name == key)
        {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", key),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::TokenType;

    fn name(lexeme: &str) -> Token {
        Token::new(TokenType::Identifier, lexeme, 1)
    }

    #[test]
    fn slots_index_in_declaration_order() {
        let mut env = Environment::new();
        env.define("a".to_string(), Object::Number(1.0));
        env.define("b".to_string(), Object::Number(2.0));

        assert_eq!(env.get_at(0, 0).to_string(), "1");
        assert_eq!(env.get_at(0, 1).to_string(), "2");
    }

    #[test]
    fn get_at_ascends_exactly_depth_parents() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("x".to_string(), Object::Number(10.0));

        let middle = Rc::new(RefCell::new(Environment::from(&global)));
        middle
            .borrow_mut()
            .define("x".to_string(), Object::Number(20.0));

        let inner = Rc::new(RefCell::new(Environment::from(&middle)));

        assert_eq!(inner.borrow().get_at(1, 0).to_string(), "20");
        assert_eq!(inner.borrow().get_at(2, 0).to_string(), "10");
    }

    #[test]
    fn assign_at_overwrites_the_ancestor_slot() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("x".to_string(), Object::Number(1.0));
        let child = Rc::new(RefCell::new(Environment::from(&global)));

        child
            .borrow_mut()
            .assign_at(1, 0, Object::Number(99.0));

        assert_eq!(global.borrow().get_at(0, 0).to_string(), "99");
    }

    #[test]
    fn global_scan_finds_newest_binding() {
        let mut env = Environment::new();
        env.define("a".to_string(), Object::Number(1.0));
        env.define("a".to_string(), Object::Number(2.0));

        assert_eq!(env.get(&name("a")).unwrap().to_string(), "2");
    }

    #[test]
    fn missing_global_is_a_runtime_error() {
        let mut env = Environment::new();
        assert!(env.get(&name("ghost")).is_err());
        assert!(env.assign(&name("ghost"), Object::Null).is_err());
    }
}
