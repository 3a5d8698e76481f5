use unicode_width::UnicodeWidthStr;

use crate::automaton::{Automaton, DriveError, GrammarError};
use crate::schema::Schema;

use super::grammar::{self, Production};
use super::interpreter::Interpreter;
use super::lexer::{LexError, Lexer, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown token '{token}' in '{statement}' at offset {offset}")]
    UnknownToken {
        statement: String,
        token: String,
        offset: usize,
    },
    #[error("Token '{token}' in '{statement}' at offset {offset} is not associative")]
    NonAssociative {
        statement: String,
        token: String,
        offset: usize,
    },
    #[error("Syntax error in '{statement}' at offset {offset} '{token}'")]
    Syntax {
        statement: String,
        token: String,
        offset: usize,
    },
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),
}

impl ParseError {
    fn from_drive(err: DriveError<LexError>, statement: &str) -> Self {
        let statement = statement.to_string();
        match err {
            DriveError::Lex(LexError::UnrecognizedToken { text, offset })
            | DriveError::UnknownToken { text, offset } => Self::UnknownToken {
                statement,
                token: text,
                offset,
            },
            DriveError::NonAssociative { text, offset } => Self::NonAssociative {
                statement,
                token: text,
                offset,
            },
            DriveError::Syntax { text, offset } => Self::Syntax {
                statement,
                token: text,
                offset,
            },
        }
    }

    /// The offending line with a caret under the error offset.
    pub fn caret(&self) -> Option<String> {
        let (statement, offset) = match self {
            Self::UnknownToken {
                statement, offset, ..
            }
            | Self::NonAssociative {
                statement, offset, ..
            }
            | Self::Syntax {
                statement, offset, ..
            } => (statement, *offset),
            Self::Grammar(_) => return None,
        };
        let before = statement.get(..offset)?;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let line_end = statement[offset..]
            .find('\n')
            .map_or(statement.len(), |i| offset + i);
        let line = &statement[line_start..line_end];
        let column = UnicodeWidthStr::width(&statement[line_start..offset]);
        Some(format!("{line}\n{}^", " ".repeat(column)))
    }
}

/// Parses `Schema::…` statements into a [`Schema`].
///
/// The grammar tables are built once per parser; each statement is parsed
/// against them with a fresh stack and committed only when accepted.
pub struct MigrationParser {
    automaton: Automaton<TokenKind, Production>,
}

impl MigrationParser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            automaton: grammar::build()?,
        })
    }

    /// Parse one statement and apply it to `schema`. On error the schema is
    /// left untouched.
    pub fn parse(&self, statement: &str, schema: &mut Schema) -> Result<(), ParseError> {
        let mut interpreter = Interpreter::new();
        self.automaton
            .parse(Lexer::new(statement), statement.len(), &mut interpreter)
            .map_err(|e| ParseError::from_drive(e, statement))?;
        interpreter.finish().commit(schema);
        Ok(())
    }
}
