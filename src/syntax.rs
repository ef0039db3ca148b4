use std::rc::Rc;

use crate::error::Error;
use crate::token::{Token, TokenType};

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Boolean(bool),
    Null,
    Number(f64),
    String(String),
}

// Variable references carry a parser-assigned id; the resolver keys its
// (depth, slot) side table by that id.
#[derive(Debug, Clone)]
pub enum Expr {
    Assign {
        name: Token,
        value: Box<Expr>,
        id: usize,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Grouping {
        expression: Box<Expr>,
    },
    Literal {
        value: LiteralValue,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Variable {
        name: Token,
        id: usize,
    },
}

// Function params and body sit behind Rc so a function value references
// the declaration instead of cloning it on every execution.
#[derive(Debug, Clone)]
pub enum Stmt {
    Block {
        statements: Vec<Stmt>,
    },
    Break {
        keyword: Token,
    },
    Expression {
        expression: Expr,
    },
    Function {
        name: Token,
        params: Rc<Vec<Token>>,
        body: Rc<Vec<Stmt>>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Box<Option<Stmt>>,
    },
    // Placeholder for a declaration the parser gave up on after a syntax
    // error; the later passes skip it.
    Null,
    Print {
        expression: Expr,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
}

pub mod expr {
    use super::{Expr, LiteralValue};
    use crate::error::Error;
    use crate::token::Token;

    pub trait Visitor<R> {
        fn visit_assign_expr(&mut self, name: &Token, value: &Expr, id: usize)
            -> Result<R, Error>;
        fn visit_binary_expr(
            &mut self,
            left: &Expr,
            operator: &Token,
            right: &Expr,
        ) -> Result<R, Error>;
        fn visit_call_expr(
            &mut self,
            callee: &Expr,
            paren: &Token,
            arguments: &[Expr],
        ) -> Result<R, Error>;
        fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<R, Error>;
        fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<R, Error>;
        fn visit_logical_expr(
            &mut self,
            left: &Expr,
            operator: &Token,
            right: &Expr,
        ) -> Result<R, Error>;
        fn visit_ternary_expr(
            &mut self,
            condition: &Expr,
            then_branch: &Expr,
            else_branch: &Expr,
        ) -> Result<R, Error>;
        fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<R, Error>;
        fn visit_variable_expr(&mut self, name: &Token, id: usize) -> Result<R, Error>;
    }
}

pub mod stmt {
    use std::rc::Rc;

    use super::{Expr, Stmt};
    use crate::error::Error;
    use crate::token::Token;

    pub trait Visitor<R> {
        fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<R, Error>;
        fn visit_break_stmt(&mut self, keyword: &Token) -> Result<R, Error>;
        fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<R, Error>;
        fn visit_function_stmt(
            &mut self,
            name: &Token,
            params: &Rc<Vec<Token>>,
            body: &Rc<Vec<Stmt>>,
        ) -> Result<R, Error>;
        fn visit_if_stmt(
            &mut self,
            condition: &Expr,
            then_branch: &Stmt,
            else_branch: &Option<Stmt>,
        ) -> Result<R, Error>;
        fn visit_null_stmt(&mut self) -> Result<R, Error>;
        fn visit_print_stmt(&mut self, expression: &Expr) -> Result<R, Error>;
        fn visit_return_stmt(&mut self, keyword: &Token, value: &Option<Expr>)
            -> Result<R, Error>;
        fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>)
            -> Result<R, Error>;
        fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<R, Error>;
    }
}

impl Expr {
    pub fn accept<R, V: expr::Visitor<R>>(&self, visitor: &mut V) -> Result<R, Error> {
        match self {
            Expr::Assign { name, value, id } => visitor.visit_assign_expr(name, value, *id),
            Expr::Binary {
                left,
                operator,
                right,
            } => visitor.visit_binary_expr(left, operator, right),
            Expr::Call {
                callee,
                paren,
                arguments,
            } => visitor.visit_call_expr(callee, paren, arguments),
            Expr::Grouping { expression } => visitor.visit_grouping_expr(expression),
            Expr::Literal { value } => visitor.visit_literal_expr(value),
            Expr::Logical {
                left,
                operator,
                right,
            } => visitor.visit_logical_expr(left, operator, right),
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => visitor.visit_ternary_expr(condition, then_branch, else_branch),
            Expr::Unary { operator, right } => visitor.visit_unary_expr(operator, right),
            Expr::Variable { name, id } => visitor.visit_variable_expr(name, *id),
        }
    }
}

impl Stmt {
    pub fn accept<R, V: stmt::Visitor<R>>(&self, visitor: &mut V) -> Result<R, Error> {
        match self {
            Stmt::Block { statements } => visitor.visit_block_stmt(statements),
            Stmt::Break { keyword } => visitor.visit_break_stmt(keyword),
            Stmt::Expression { expression } => visitor.visit_expression_stmt(expression),
            Stmt::Function { name, params, body } => {
                visitor.visit_function_stmt(name, params, body)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => visitor.visit_if_stmt(condition, then_branch, else_branch),
            Stmt::Null => visitor.visit_null_stmt(),
            Stmt::Print { expression } => visitor.visit_print_stmt(expression),
            Stmt::Return { keyword, value } => visitor.visit_return_stmt(keyword, value),
            Stmt::Var { name, initializer } => visitor.visit_var_stmt(name, initializer),
            Stmt::While { condition, body } => visitor.visit_while_stmt(condition, body),
        }
    }
}

// Renders an AST back to source form. Groupings stay explicit nodes, so
// parsing the printed text yields a tree of the same shape.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print_expr(&mut self, expr: &Expr) -> String {
        expr.accept(self).expect("printing never fails")
    }

    pub fn print_stmt(&mut self, statement: &Stmt) -> String {
        statement.accept(self).expect("printing never fails")
    }

    pub fn print_program(&mut self, statements: &[Stmt]) -> String {
        statements
            .iter()
            .map(|statement| self.print_stmt(statement))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl expr::Visitor<String> for AstPrinter {
    fn visit_assign_expr(
        &mut self,
        name: &Token,
        value: &Expr,
        _id: usize,
    ) -> Result<String, Error> {
        Ok(format!("{} = {}", name.lexeme, self.print_expr(value)))
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<String, Error> {
        let (left, right) = (self.print_expr(left), self.print_expr(right));
        if operator.token_type == TokenType::Comma {
            Ok(format!("{left}, {right}"))
        } else {
            Ok(format!("{left} {} {right}", operator.lexeme))
        }
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        _paren: &Token,
        arguments: &[Expr],
    ) -> Result<String, Error> {
        let arguments = arguments
            .iter()
            .map(|argument| self.print_expr(argument))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("{}({arguments})", self.print_expr(callee)))
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<String, Error> {
        Ok(format!("({})", self.print_expr(expression)))
    }

    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<String, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::Null => "nil".to_string(),
            LiteralValue::Number(n) => n.to_string(),
            LiteralValue::String(s) => format!("\"{s}\""),
        })
    }

    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<String, Error> {
        Ok(format!(
            "{} {} {}",
            self.print_expr(left),
            operator.lexeme,
            self.print_expr(right)
        ))
    }

    fn visit_ternary_expr(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<String, Error> {
        Ok(format!(
            "{} ? {} : {}",
            self.print_expr(condition),
            self.print_expr(then_branch),
            self.print_expr(else_branch)
        ))
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<String, Error> {
        Ok(format!("{}{}", operator.lexeme, self.print_expr(right)))
    }

    fn visit_variable_expr(&mut self, name: &Token, _id: usize) -> Result<String, Error> {
        Ok(name.lexeme.clone())
    }
}

impl stmt::Visitor<String> for AstPrinter {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<String, Error> {
        Ok(format!("{{ {} }}", self.print_program(statements)))
    }

    fn visit_break_stmt(&mut self, _keyword: &Token) -> Result<String, Error> {
        Ok("break;".to_string())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<String, Error> {
        Ok(format!("{};", self.print_expr(expression)))
    }

    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &Rc<Vec<Token>>,
        body: &Rc<Vec<Stmt>>,
    ) -> Result<String, Error> {
        let params = params
            .iter()
            .map(|param| param.lexeme.clone())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "fun {}({params}) {{ {} }}",
            name.lexeme,
            self.print_program(body)
        ))
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<String, Error> {
        let mut text = format!(
            "if {} {}",
            self.print_expr(condition),
            self.print_stmt(then_branch)
        );
        if let Some(else_stmt) = else_branch {
            text.push_str(&format!(" else {}", self.print_stmt(else_stmt)));
        }
        Ok(text)
    }

    fn visit_null_stmt(&mut self) -> Result<String, Error> {
        Ok(String::new())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<String, Error> {
        Ok(format!("print {};", self.print_expr(expression)))
    }

    fn visit_return_stmt(
        &mut self,
        _keyword: &Token,
        value: &Option<Expr>,
    ) -> Result<String, Error> {
        Ok(match value {
            Some(value) => format!("return {};", self.print_expr(value)),
            None => "return;".to_string(),
        })
    }

    fn visit_var_stmt(
        &mut self,
        name: &Token,
        initializer: &Option<Expr>,
    ) -> Result<String, Error> {
        Ok(match initializer {
            Some(init) => format!("let {} = {};", name.lexeme, self.print_expr(init)),
            None => format!("let {};", name.lexeme),
        })
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<String, Error> {
        Ok(format!(
            "while {} {}",
            self.print_expr(condition),
            self.print_stmt(body)
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    #[test]
    fn prints_expression_in_source_form() {
        let expression = Expr::Binary {
            left: Box::new(Expr::Unary {
                operator: Token::new(TokenType::Minus, "-", 1),
                right: Box::new(Expr::Literal {
                    value: LiteralValue::Number(123.0),
                }),
            }),
            operator: Token::new(TokenType::Star, "*", 1),
            right: Box::new(Expr::Grouping {
                expression: Box::new(Expr::Literal {
                    value: LiteralValue::Number(45.67),
                }),
            }),
        };

        assert_eq!(AstPrinter.print_expr(&expression), "-123 * (45.67)");
    }

    fn printed(source: &str) -> String {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens();
        let mut parser = Parser::new(tokens);
        let statements = parser.parse().expect("test source parses");
        assert!(!parser.had_error);
        AstPrinter.print_program(&statements)
    }

    // Printing then reparsing reaches a fixed point: the second print is
    // byte-identical, so the two trees have the same shape.
    #[test]
    fn print_reparse_round_trip() {
        for source in [
            "print 1 + 2 * 3;",
            "let a = (1 + 2) * 3;",
            "let named;",
            "{ let a = 1; { print a; } }",
            "if a > 1 print \"big\"; else print \"small\";",
            "while true { break; }",
            "for (let i = 0; i < 3; i = i + 1) print i;",
            "fun add(a, b) { return a + b; }",
            "print f(1)(2, g());",
            "print a and b or c;",
            "print a ? 1 : 2, 3;",
            "print !-x;",
        ] {
            let once = printed(source);
            assert_eq!(printed(&once), once, "source: {source}");
        }
    }
}
