//! Tokenization of dependency lines using `nom`.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::value,
};

use super::ast::{Comparison, RelationKind};
use crate::version::{self, Version};

/// A token of a dependency line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `REQUIRES`, `CONFLICTS`, `BEFORE` or `AFTER`.
    Kind(RelationKind),
    /// `OR` between alternative branches.
    Or,
    /// A module, service, volume or profile name.
    Name(String),
    /// A version literal.
    Version(Version),
    /// A comparison operator.
    Op(Comparison),
    /// `:` ending a profile list.
    Colon,
    /// `,` separating profiles.
    Comma,
}

fn comparison(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Op(Comparison::Ge), tag(">=")),
        value(Token::Op(Comparison::Le), tag("<=")),
        value(Token::Op(Comparison::Eq), tag("==")),
        value(Token::Op(Comparison::Eq), tag("=")),
        value(Token::Op(Comparison::Gt), tag(">")),
        value(Token::Op(Comparison::Lt), tag("<")),
    ))
    .parse(input)
}

fn punctuation(input: &str) -> IResult<&str, Token> {
    alt((value(Token::Colon, char(':')), value(Token::Comma, char(','))))
        .parse(input)
}

const fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn word(input: &str) -> IResult<&str, Token> {
    let (input, first) = take_while1(|c: char| c.is_ascii_alphabetic())(input)?;
    let (input, rest) = take_while(is_word_continue)(input)?;
    let word = format!("{first}{rest}");
    let token = match word.as_str() {
        "REQUIRES" => Token::Kind(RelationKind::Requires),
        "CONFLICTS" => Token::Kind(RelationKind::Conflicts),
        "BEFORE" => Token::Kind(RelationKind::Before),
        "AFTER" => Token::Kind(RelationKind::After),
        "OR" => Token::Or,
        _ => Token::Name(word),
    };
    Ok((input, token))
}

fn version_literal(input: &str) -> IResult<&str, Token> {
    let (rest, v) = version::version(input)?;
    if rest.starts_with(is_word_continue) || rest.starts_with('.') {
        return Err(nom::Err::Failure(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((rest, Token::Version(v)))
}

fn single_token(input: &str) -> IResult<&str, Token> {
    alt((comparison, punctuation, version_literal, word)).parse(input)
}

/// Tokenizes a dependency line. Whitespace is discarded.
///
/// # Errors
///
/// Returns a description of the first character that cannot start a token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0::<&str, nom::error::Error<&str>>(remaining)
            .map_err(|e| format!("lexer error skipping whitespace: {e}"))?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let (rest, token) = single_token(remaining).map_err(|_| {
            let excerpt: String = remaining.chars().take(20).collect();
            format!("unexpected input at \"{excerpt}\"")
        })?;
        tokens.push(token);
        remaining = rest;
    }

    Ok(tokens)
}
