pub mod ast;
pub mod interpreter;
pub mod parser;
pub mod tokenizer;

use ast::{Expression, Program};
use parser::ParseErrors;
use tokenizer::TokensError;

/// Lexical or syntax errors for one source text.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Tokenize(#[from] TokensError),
    #[error(transparent)]
    Parse(#[from] ParseErrors),
}

pub fn parse_program(source: &str) -> Result<Program, SourceError> {
    let tokens = tokenizer::tokens(source)?;
    Ok(parser::program(&tokens)?)
}

pub fn parse_expression(source: &str) -> Result<Expression, SourceError> {
    let tokens = tokenizer::tokens(source)?;
    Ok(parser::single_expression(&tokens)?)
}
