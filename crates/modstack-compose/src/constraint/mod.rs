//! Dependency line parser.
//!
//! Grammar:
//!
//! ```text
//! line     := [profiles ':'] [KIND] branch ('OR' branch)*
//! profiles := profile (',' profile)*
//! KIND     := REQUIRES | CONFLICTS | BEFORE | AFTER    (default REQUIRES)
//! branch   := module [op] [version] [service-or-volume]
//! ```
//!
//! A version without an operator means `=`. `OR` groups are only valid for
//! `REQUIRES`.

pub mod ast;
pub mod lexer;

use modstack_common::error::{ModstackError, Result};
use modstack_common::types::{Profile, is_valid_module_name, is_valid_service_name};

use self::ast::{Comparison, Constraint, Dependency, RelationKind, VersionBound};
use self::lexer::Token;

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

/// Parses one dependency line declared by `module`.
///
/// # Errors
///
/// Returns [`ModstackError::MalformedConstraint`] naming the module and the
/// offending line on any grammar violation.
pub fn parse_dependency(module: &str, line: &str) -> Result<Dependency> {
    let malformed = |reason: String| ModstackError::MalformedConstraint {
        module: module.to_string(),
        line: line.to_string(),
        reason,
    };

    let tokens = lexer::tokenize(line).map_err(malformed)?;
    if tokens.is_empty() {
        return Err(malformed("empty constraint".into()));
    }
    let mut cursor = TokenCursor::new(&tokens);

    let profiles = parse_profiles(&mut cursor).map_err(malformed)?;
    let kind = match cursor.peek() {
        Some(Token::Kind(kind)) => {
            let kind = *kind;
            let _ = cursor.advance();
            kind
        }
        _ => RelationKind::Requires,
    };

    let primary = parse_branch(&mut cursor, module, kind, &profiles).map_err(malformed)?;
    let mut alternatives = Vec::new();
    while cursor.peek() == Some(&Token::Or) {
        let _ = cursor.advance();
        alternatives.push(parse_branch(&mut cursor, module, kind, &profiles).map_err(malformed)?);
    }

    if let Some(tok) = cursor.peek() {
        return Err(malformed(format!("unexpected {tok:?} after constraint")));
    }
    if !alternatives.is_empty() && kind != RelationKind::Requires {
        return Err(malformed(format!("OR is only allowed with REQUIRES, not {kind}")));
    }
    if std::iter::once(&primary).chain(&alternatives).any(|b| b.target == module) {
        return Err(malformed("a module cannot reference itself".into()));
    }

    Ok(Dependency::new(line.trim(), primary, alternatives))
}

/// Parses every line of a module, stopping at the first malformed one.
///
/// # Errors
///
/// Returns the first [`ModstackError::MalformedConstraint`] encountered.
pub fn parse_dependencies(module: &str, lines: &[String]) -> Result<Vec<Dependency>> {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| parse_dependency(module, l))
        .collect()
}

fn parse_profiles(cursor: &mut TokenCursor<'_>) -> std::result::Result<Vec<Profile>, String> {
    let has_profile_list = cursor.tokens.contains(&Token::Colon);
    if !has_profile_list {
        return Ok(Vec::new());
    }

    let mut profiles = Vec::new();
    loop {
        match cursor.advance() {
            Some(Token::Name(name)) => {
                let profile = name
                    .parse::<Profile>()
                    .map_err(|_| format!("unknown profile \"{name}\""))?;
                if !profiles.contains(&profile) {
                    profiles.push(profile);
                }
            }
            other => return Err(format!("expected profile name, got {other:?}")),
        }
        match cursor.advance() {
            Some(Token::Comma) => {}
            Some(Token::Colon) => return Ok(profiles),
            other => return Err(format!("expected ',' or ':' after profile, got {other:?}")),
        }
    }
}

fn parse_branch(
    cursor: &mut TokenCursor<'_>,
    module: &str,
    kind: RelationKind,
    profiles: &[Profile],
) -> std::result::Result<Constraint, String> {
    let target = match cursor.advance() {
        Some(Token::Name(name)) if is_valid_module_name(name) => name.clone(),
        Some(Token::Name(name)) => return Err(format!("invalid module name \"{name}\"")),
        other => return Err(format!("expected module name, got {other:?}")),
    };

    let op = match cursor.peek() {
        Some(Token::Op(op)) => {
            let op = *op;
            let _ = cursor.advance();
            Some(op)
        }
        _ => None,
    };
    let bound = match (op, cursor.peek()) {
        (op, Some(Token::Version(version))) => {
            let version = *version;
            let _ = cursor.advance();
            Some(VersionBound {
                op: op.unwrap_or(Comparison::Eq),
                version,
            })
        }
        (Some(op), other) => return Err(format!("expected version after '{op}', got {other:?}")),
        (None, _) => None,
    };

    let item = match cursor.peek() {
        Some(Token::Name(name)) => {
            if !is_valid_service_name(name) {
                return Err(format!("invalid service or volume name \"{name}\""));
            }
            let name = name.clone();
            let _ = cursor.advance();
            Some(name)
        }
        _ => None,
    };

    if cursor.at_end() || cursor.peek() == Some(&Token::Or) {
        Ok(Constraint {
            source: module.to_string(),
            target,
            kind,
            bound,
            item,
            profiles: profiles.to_vec(),
        })
    } else {
        Err(format!("unexpected {:?} in constraint", cursor.peek()))
    }
}
