// A lexeme is the raw sequence of characters in the source code that represents a meaningful unit
// A token is a categorized representation of a lexeme, pairing it with its type

use crate::error::error;
use crate::token::{Token, TokenType, KEYWORDS};

pub struct Scanner {
    source: String,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: i32,
    pub had_error: bool,
}

impl Scanner {
    pub fn new(source: String) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            had_error: false,
        }
    }

    pub fn scan_tokens(&mut self) -> &Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()
        }

        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
        &self.tokens
    }

    fn scan_token(&mut self) {
        let c: char = self.advance();
        match c {
            // single char
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            ':' => self.add_token(TokenType::Colon),
            '?' => self.add_token(TokenType::QuestionMark),

            // can be double char
            '!' => {
                if self.r#match('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '=' => {
                if self.r#match('=') {
                    self.add_token(TokenType::EqualEqual);
                } else {
                    self.add_token(TokenType::Equal);
                }
            }
            '<' => {
                if self.r#match('=') {
                    self.add_token(TokenType::LessEqual);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '>' => {
                if self.r#match('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }

            // can be comment
            '/' => {
                if self.r#match('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.r#match('*') {
                    self.block_comment();
                } else {
                    self.add_token(TokenType::Slash);
                }
            }

            // ignore whitespace
            ' ' | '\t' | '\r' => (),

            // handle new line
            '\n' => {
                self.line += 1;
            }

            '"' => self.string(),

            c => {
                if c.is_ascii_digit() {
                    self.number()
                } else if c.is_alphabetic() || c == '_' {
                    self.identifier()
                } else {
                    self.error("Unexpected character.")
                }
            }
        }
    }

    // consume characters until we reach the closing "
    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.error("Unterminated string.");
            return;
        }

        // the closing "
        self.advance();

        // trim the surrounding quotes
        let literal = self
            .source
            .get((self.start + 1)..(self.current - 1))
            .expect("string spans scanned bytes")
            .to_string();

        self.add_token(TokenType::String { literal });
    }

    // block comments don't nest; the first */ closes the comment
    fn block_comment(&mut self) {
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return;
            }
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }
        self.error("Unterminated block comment.");
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // consume the . only when a fractional part follows
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let literal: f64 = self
            .source
            .get(self.start..self.current)
            .expect("number spans scanned bytes")
            .parse()
            .expect("scanned digits parse as f64");

        self.add_token(TokenType::Number { literal });
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self
            .source
            .get(self.start..self.current)
            .expect("identifier spans scanned bytes");
        let tpe = KEYWORDS.get(text).cloned().unwrap_or(TokenType::Identifier);

        self.add_token(tpe);
    }

    fn advance(&mut self) -> char {
        self.current += 1;
        self.source
            .chars()
            .nth(self.current - 1)
            .expect("there is a next char")
    }

    // it's like advance but doesn't consume the next character
    fn peek(&self) -> char {
        self.source.chars().nth(self.current).unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.chars().nth(self.current + 1).unwrap_or('\0')
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = self
            .source
            .get(self.start..self.current)
            .expect("token spans scanned bytes");
        self.tokens.push(Token::new(token_type, text, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    // we only consume the current character if that is what we are looking for
    fn r#match(&mut self, expected: char) -> bool {
        if self.is_at_end() {
            return false;
        }

        if self
            .source
            .chars()
            .nth(self.current)
            .expect("not at end")
            != expected
        {
            return false;
        }

        self.current += 1;
        true
    }

    fn error(&mut self, message: &str) {
        error(self.line, message);
        self.had_error = true;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scan(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source.to_string());
        scanner.scan_tokens().clone()
    }

    fn kinds(source: &str) -> Vec<TokenType> {
        scan(source).into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn arithmetic_expression() {
        assert_eq!(
            kinds("1 + -1 * 3"),
            vec![
                TokenType::Number { literal: 1.0 },
                TokenType::Plus,
                TokenType::Minus,
                TokenType::Number { literal: 1.0 },
                TokenType::Star,
                TokenType::Number { literal: 3.0 },
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn ternary_and_comma_operators() {
        assert_eq!(
            kinds("a ? b : c, d"),
            vec![
                TokenType::Identifier,
                TokenType::QuestionMark,
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::Identifier,
                TokenType::Comma,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("let breaker = break;"),
            vec![
                TokenType::Let,
                TokenType::Identifier,
                TokenType::Equal,
                TokenType::Break,
                TokenType::Semicolon,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // rest of the line\n/* a\nblock */ 2"),
            vec![
                TokenType::Number { literal: 1.0 },
                TokenType::Number { literal: 2.0 },
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn block_comment_tracks_lines() {
        let tokens = scan("/* one\ntwo */ x");
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn string_literal_is_trimmed() {
        let tokens = scan("\"hello\"");
        assert_eq!(
            tokens[0].token_type,
            TokenType::String {
                literal: "hello".to_string()
            }
        );
        assert_eq!(tokens[0].lexeme, "\"hello\"");
    }

    #[test]
    fn unexpected_character_sets_error_flag() {
        let mut scanner = Scanner::new("let a = @;".to_string());
        scanner.scan_tokens();
        assert!(scanner.had_error);
    }
}
