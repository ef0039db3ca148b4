use std::rc::Rc;

use crate::error::{parser_error, Error};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

pub struct Parser<'t> {
    tokens: &'t Vec<Token>,
    current: usize,
    // First reference id to hand out. The driver threads the watermark
    // across REPL lines so ids stay unique for the lifetime of the
    // interpreter's resolution map.
    pub next_id: usize,
    pub had_error: bool,
}

macro_rules! matches {
    ( $sel:ident, $( $x:expr ),* ) => {
        {
            if $( $sel.check($x) )||* {
                $sel.advance();
                true
            } else {
                false
            }
        }
    };
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            next_id: 0,
            had_error: false,
        }
    }

    // program        → declaration* EOF ;
    pub fn parse(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut statements: Vec<Stmt> = Vec::new();
        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        Ok(statements)
    }

    // declaration    → varDecl | funDecl | statement ;
    fn declaration(&mut self) -> Result<Stmt, Error> {
        let statement = if matches!(self, TokenType::Let) {
            self.var_declaration()
        } else if matches!(self, TokenType::Fun) {
            self.fun_declaration()
        } else {
            self.statement()
        };

        // catch the error when the parser begins panic-mode recovery; the
        // failed declaration leaves a placeholder and parsing resumes at
        // the next statement boundary
        match statement {
            Err(Error::Parse) => {
                self.synchronize();
                Ok(Stmt::Null)
            }
            other => other,
        }
    }

    // varDecl        → "let" IDENTIFIER ( "=" expression )? ";" ;
    fn var_declaration(&mut self) -> Result<Stmt, Error> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        let initializer = if matches!(self, TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    // funDecl        → "fun" IDENTIFIER "(" parameters? ")" block ;
    // parameters     → IDENTIFIER ( "," IDENTIFIER )* ;
    fn fun_declaration(&mut self) -> Result<Stmt, Error> {
        let name = self.consume(TokenType::Identifier, "Expect function name.")?;

        self.consume(TokenType::LeftParen, "Expect '(' after function name.")?;
        let mut params: Vec<Token> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    // reported without aborting; the parser is not confused,
                    // the declaration just has too many parameters
                    let token = self.peek().clone();
                    self.error(&token, "Can't have more than 255 parameters.");
                }

                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);

                if !matches!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;

        self.consume(TokenType::LeftBrace, "Expect '{' before function body.")?;
        let body = self.block()?;
        Ok(Stmt::Function {
            name,
            params: Rc::new(params),
            body: Rc::new(body),
        })
    }

    // statement      → exprStmt | printStmt | block | ifStmt | whileStmt
    //                | forStmt | breakStmt | returnStmt ;
    fn statement(&mut self) -> Result<Stmt, Error> {
        if matches!(self, TokenType::For) {
            self.for_statement()
        } else if matches!(self, TokenType::If) {
            self.if_statement()
        } else if matches!(self, TokenType::Print) {
            self.print_statement()
        } else if matches!(self, TokenType::Return) {
            self.return_statement()
        } else if matches!(self, TokenType::While) {
            self.while_statement()
        } else if matches!(self, TokenType::Break) {
            self.break_statement()
        } else if matches!(self, TokenType::LeftBrace) {
            Ok(Stmt::Block {
                statements: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    // block          → "{" declaration* "}" ;
    fn block(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    // the condition is a bare expression; a parenthesised one still works
    // through the grouping rule. The else binds to the nearest if.
    // ifStmt         → "if" expression statement ( "else" statement )? ;
    fn if_statement(&mut self) -> Result<Stmt, Error> {
        let condition = self.expression()?;

        let then_branch = Box::new(self.statement()?);

        let else_branch = Box::new(if matches!(self, TokenType::Else) {
            Some(self.statement()?)
        } else {
            None
        });

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    // whileStmt      → "while" expression statement ;
    fn while_statement(&mut self) -> Result<Stmt, Error> {
        let condition = self.expression()?;
        let body = self.statement()?;

        Ok(Stmt::While {
            condition,
            body: Box::new(body),
        })
    }

    // forStmt        → "for" "(" ( varDecl | exprStmt | ";" ) expression? ";" expression? ")" statement ;
    //
    // There is no For node; the loop desugars here into the while form:
    // { initializer; while condition { body; increment; } }
    fn for_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if matches!(self, TokenType::Semicolon) {
            None
        } else if matches!(self, TokenType::Let) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(incr) = increment {
            let incr_stmt = Stmt::Expression { expression: incr };
            body = Stmt::Block {
                statements: vec![body, incr_stmt],
            }
        }

        body = Stmt::While {
            condition: condition.unwrap_or(Expr::Literal {
                value: LiteralValue::Boolean(true),
            }),
            body: Box::new(body),
        };

        if let Some(init) = initializer {
            body = Stmt::Block {
                statements: vec![init, body],
            };
        }

        Ok(body)
    }

    // breakStmt      → "break" ";" ;
    fn break_statement(&mut self) -> Result<Stmt, Error> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
        Ok(Stmt::Break { keyword })
    }

    // returnStmt     → "return" expression? ";" ;
    fn return_statement(&mut self) -> Result<Stmt, Error> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    // printStmt      → "print" expression ";" ;
    fn print_statement(&mut self) -> Result<Stmt, Error> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expression: value })
    }

    // exprStmt       → expression ";" ;
    fn expression_statement(&mut self) -> Result<Stmt, Error> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression { expression: value })
    }

    // expression     → assignment ;
    fn expression(&mut self) -> Result<Expr, Error> {
        self.assignment()
    }

    // The left side parses as an ordinary expression first and converts to
    // an assignment target when an = follows; every valid target is also
    // valid expression syntax. Assignment is right-associative, so the
    // right side recurses at the same level instead of looping.
    // assignment     → IDENTIFIER "=" assignment | comma ;
    fn assignment(&mut self) -> Result<Expr, Error> {
        let expr = self.comma()?;

        if matches!(self, TokenType::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    name,
                    value,
                    id: self.fresh_id(),
                }),
                other => {
                    // no panic mode here; the parser knows exactly where it
                    // is, the target just isn't assignable
                    self.error(&equals, "Invalid assignment target.");
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    // comma          → ternary ( "," ternary )* ;
    // evaluates the left operand for its side effects and yields the right
    fn comma(&mut self) -> Result<Expr, Error> {
        let mut expr = self.ternary()?;

        while matches!(self, TokenType::Comma) {
            let operator = (*self.previous()).clone();
            let right = self.ternary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // ternary        → or ( "?" ternary ":" ternary )? ;
    // both branches recurse at the same level, so a ? b : c ? d : e groups
    // to the right
    fn ternary(&mut self) -> Result<Expr, Error> {
        let mut expr = self.or()?;

        if matches!(self, TokenType::QuestionMark) {
            let then_branch = self.ternary()?;
            self.consume(TokenType::Colon, "Expect ':' in ternary expression.")?;
            let else_branch = self.ternary()?;
            expr = Expr::Ternary {
                condition: Box::new(expr),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }
        }

        Ok(expr)
    }

    // or             → and ( "or" and )* ;
    fn or(&mut self) -> Result<Expr, Error> {
        let mut expr = self.and()?;

        while matches!(self, TokenType::Or) {
            let operator = (*self.previous()).clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // and            → equality ( "and" equality )* ;
    fn and(&mut self) -> Result<Expr, Error> {
        let mut expr = self.equality()?;

        while matches!(self, TokenType::And) {
            let operator = (*self.previous()).clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // equality       → comparison ( ( "!=" | "==" ) comparison )* ;
    // each iteration wraps the previous expression as the left operand, so
    // chains lean left
    fn equality(&mut self) -> Result<Expr, Error> {
        let mut expr: Expr = self.comparison()?;

        while matches!(self, TokenType::BangEqual, TokenType::EqualEqual) {
            let operator = (*self.previous()).clone();
            let right: Expr = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }
        Ok(expr)
    }

    // comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
    fn comparison(&mut self) -> Result<Expr, Error> {
        let mut expr: Expr = self.term()?;

        while matches!(
            self,
            TokenType::GreaterEqual,
            TokenType::Greater,
            TokenType::LessEqual,
            TokenType::Less
        ) {
            let operator = (*self.previous()).clone();
            let right: Expr = self.term()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // term           → factor ( ( "-" | "+" ) factor )* ;
    fn term(&mut self) -> Result<Expr, Error> {
        let mut expr: Expr = self.factor()?;

        while matches!(self, TokenType::Minus, TokenType::Plus) {
            let operator = (*self.previous()).clone();
            let right: Expr = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }
        Ok(expr)
    }

    // factor         → unary ( ( "/" | "*" ) unary )* ;
    fn factor(&mut self) -> Result<Expr, Error> {
        let mut expr: Expr = self.unary()?;

        while matches!(self, TokenType::Slash, TokenType::Star) {
            let operator = (*self.previous()).clone();
            let right: Expr = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // unary          → ( "!" | "-" ) unary | call ;
    fn unary(&mut self) -> Result<Expr, Error> {
        if matches!(self, TokenType::Bang, TokenType::Minus) {
            let operator = (*self.previous()).clone();
            let right = self.unary()?;
            let expr = Expr::Unary {
                operator,
                right: Box::new(right),
            };
            return Ok(expr);
        }

        self.call()
    }

    // call           → primary ( "(" arguments? ")" )* ;
    // a primary followed by any number of argument lists; f()() calls the
    // result of f()
    fn call(&mut self) -> Result<Expr, Error> {
        let mut expr = self.primary()?;

        while matches!(self, TokenType::LeftParen) {
            expr = self.finish_call(expr)?;
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, Error> {
        let mut arguments: Vec<Expr> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    // Only reporting, not bailing into panic mode; the
                    // parser is in a perfectly valid state, the call just
                    // has too many arguments.
                    let token = self.peek().clone();
                    self.error(&token, "Can't have more than 255 arguments.");
                }

                arguments.push(self.argument()?);

                if !matches!(self, TokenType::Comma) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    // An argument binds one level above the comma operator, otherwise a
    // single comma expression would swallow the whole list. Assignment in
    // argument position still parses; a comma expression needs parens.
    fn argument(&mut self) -> Result<Expr, Error> {
        let expr = self.ternary()?;

        if matches!(self, TokenType::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.argument()?);

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    name,
                    value,
                    id: self.fresh_id(),
                }),
                other => {
                    self.error(&equals, "Invalid assignment target.");
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    // primary        → NUMBER | STRING | "true" | "false" | "nil" | IDENTIFIER | "(" expression ")" ;
    fn primary(&mut self) -> Result<Expr, Error> {
        let token = self.peek().clone();
        let expr = match token.token_type {
            TokenType::False => Expr::Literal {
                value: LiteralValue::Boolean(false),
            },
            TokenType::True => Expr::Literal {
                value: LiteralValue::Boolean(true),
            },
            TokenType::Nil => Expr::Literal {
                value: LiteralValue::Null,
            },
            TokenType::Number { literal } => Expr::Literal {
                value: LiteralValue::Number(literal),
            },
            TokenType::String { literal } => Expr::Literal {
                value: LiteralValue::String(literal),
            },
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
                return Ok(Expr::Grouping {
                    expression: Box::new(expr),
                });
            }
            TokenType::Identifier => Expr::Variable {
                name: token,
                id: self.fresh_id(),
            },
            _ => return Err(self.error(&token, "Expect expression.")),
        };

        self.advance();

        Ok(expr)
    }

    // discard tokens until the start of the next statement, so one syntax
    // error doesn't cascade into a pile of bogus ones
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Break
                | TokenType::For
                | TokenType::Fun
                | TokenType::If
                | TokenType::Let
                | TokenType::Print
                | TokenType::Return
                | TokenType::While => return,
                _ => self.advance(),
            };
        }
    }

    // returns true if the current token is of the given type; unlike the
    // matches! macro it never consumes the token
    fn check(&self, token_type: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek().token_type == token_type
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.current)
            .expect("token stream ends with EOF")
    }

    fn previous(&self) -> &Token {
        self.tokens
            .get(self.current - 1)
            .expect("a token was consumed before")
    }

    fn consume(&mut self, token_type: TokenType, msg: &str) -> Result<Token, Error> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            let token = self.peek().clone();
            Err(self.error(&token, msg))
        }
    }

    fn error(&mut self, token: &Token, msg: &str) -> Error {
        parser_error(token, msg);
        self.had_error = true;
        Error::Parse
    }

    // every variable reference gets a unique id; the resolver keys its
    // side table by it
    fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::scanner::Scanner;
    use crate::syntax::AstPrinter;

    fn parse(source: &str) -> (Vec<Stmt>, bool) {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens();
        let mut parser = Parser::new(tokens);
        let statements = parser.parse().expect("parse only fails on token underflow");
        (statements, parser.had_error)
    }

    fn printed(source: &str) -> String {
        let (statements, had_error) = parse(source);
        assert!(!had_error, "unexpected parse error in: {source}");
        AstPrinter.print_program(&statements)
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (statements, _) = parse("1 + 2 * 3;");
        let Stmt::Expression {
            expression:
                Expr::Binary {
                    left,
                    operator,
                    right,
                },
        } = &statements[0]
        else {
            panic!("expected a binary expression statement");
        };

        assert_eq!(operator.token_type, TokenType::Plus);
        assert!(std::matches!(
            **left,
            Expr::Literal {
                value: LiteralValue::Number(n)
            } if n == 1.0
        ));
        assert!(std::matches!(**right, Expr::Binary { .. }));
    }

    #[test]
    fn binary_operators_lean_left() {
        assert_eq!(printed("print 1 - 2 - 3;"), "print 1 - 2 - 3;");
        let (statements, _) = parse("1 - 2 - 3;");
        let Stmt::Expression {
            expression: Expr::Binary { left, .. },
        } = &statements[0]
        else {
            panic!("expected a binary expression statement");
        };
        assert!(std::matches!(**left, Expr::Binary { .. }));
    }

    #[test]
    fn ternary_groups_to_the_right() {
        let (statements, _) = parse("a ? 1 : b ? 2 : 3;");
        let Stmt::Expression {
            expression: Expr::Ternary { else_branch, .. },
        } = &statements[0]
        else {
            panic!("expected a ternary expression statement");
        };
        assert!(std::matches!(**else_branch, Expr::Ternary { .. }));
    }

    #[test]
    fn comma_yields_the_last_operand() {
        assert_eq!(printed("1, 2, 3;"), "1, 2, 3;");
    }

    #[test]
    fn calls_chain() {
        let (statements, _) = parse("f(1)(2);");
        let Stmt::Expression {
            expression: Expr::Call { callee, .. },
        } = &statements[0]
        else {
            panic!("expected a call expression statement");
        };
        assert!(std::matches!(**callee, Expr::Call { .. }));
    }

    #[test]
    fn for_desugars_to_while() {
        assert_eq!(
            printed("for (let i = 0; i < 3; i = i + 1) print i;"),
            "{ let i = 0; while i < 3 { print i; i = i + 1; } }"
        );
        assert_eq!(printed("for (;;) break;"), "while true break;");
    }

    #[test]
    fn condition_parens_are_optional() {
        assert_eq!(
            printed("if (1 > 2) print \"a\"; else print \"b\";"),
            "if (1 > 2) print \"a\"; else print \"b\";"
        );
        assert_eq!(printed("while x print x;"), "while x print x;");
    }

    #[test]
    fn invalid_assignment_target_is_reported_without_panic() {
        let (statements, had_error) = parse("1 = 2; print 3;");
        assert!(had_error);
        // the statement after the bad target still parses
        assert_eq!(statements.len(), 2);
        assert!(std::matches!(statements[1], Stmt::Print { .. }));
    }

    #[test]
    fn panic_mode_recovers_at_statement_boundary() {
        let (statements, had_error) = parse("let = 1; print 2;");
        assert!(had_error);
        assert_eq!(statements.len(), 2);
        assert!(std::matches!(statements[0], Stmt::Null));
        assert!(std::matches!(statements[1], Stmt::Print { .. }));
    }

    fn call_with_args(count: usize) -> String {
        let args = (0..count).map(|i| i.to_string()).collect::<Vec<_>>();
        format!("f({});", args.join(", "))
    }

    #[test]
    fn accepts_255_arguments_rejects_256() {
        let (_, had_error) = parse(&call_with_args(255));
        assert!(!had_error);

        let (_, had_error) = parse(&call_with_args(256));
        assert!(had_error);
    }

    #[test]
    fn assignment_in_argument_position() {
        assert_eq!(printed("f(a = 1, b);"), "f(a = 1, b);");
    }

    #[test]
    fn reserved_class_keyword_is_rejected() {
        let (_, had_error) = parse("class Foo {}");
        assert!(had_error);
    }
}
