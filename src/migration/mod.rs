//! Migration statements to schema.

mod grammar;
mod interpreter;
mod lexer;
mod parser;
mod source;
pub mod types;

pub use interpreter::{PendingClass, PendingRelation, TableAction};
pub use lexer::{LexError, Lexer, TokenKind};
pub use parser::{MigrationParser, ParseError};
pub use source::definition;

use crate::schema::Schema;

/// Parse migration file contents in order into one schema. Files without a
/// `Schema::` statement are skipped.
pub fn parse_migrations<'a>(
    sources: impl IntoIterator<Item = &'a str>,
) -> Result<Schema, ParseError> {
    let parser = MigrationParser::new()?;
    let mut schema = Schema::new();
    for source in sources {
        match definition(source) {
            Some(statement) => parser.parse(statement, &mut schema)?,
            None => tracing::debug!("migration without a schema statement skipped"),
        }
    }
    Ok(schema)
}
