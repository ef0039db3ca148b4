use std::io;

use thiserror::Error;

use crate::token::{Token, TokenType};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),

    // Diagnostics are printed where the error is detected; this variant
    // only tells the driver that evaluation must be skipped.
    #[error("parse error")]
    Parse,

    #[error("[line {}] Runtime Error : {message}", token.line)]
    Runtime { token: Token, message: String },
}

pub fn error(line: i32, message: &str) {
    report(line, "", message);
}

pub fn parser_error(token: &Token, message: &str) {
    if token.token_type == TokenType::Eof {
        report(token.line, " at end", message);
    } else {
        report(token.line, &format!(" at '{}'", token.lexeme), message);
    }
}

pub fn warning(line: i32, message: &str) {
    eprintln!("[line {line}] Warning : {message}");
}

fn report(line: i32, where_: &str, message: &str) {
    eprintln!("[line {line}] Error{where_}: {message}");
}
