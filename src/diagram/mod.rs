//! PlantUML-style class diagram notation.

mod lexer;
mod parser;
mod serializer;

pub use lexer::{LexError, Token};
pub use parser::{DiagramError, Parser};
pub use serializer::serialize;

use crate::schema::Schema;

pub fn parse(input: &str) -> Result<Schema, DiagramError> {
    Parser::new(input)?.parse()
}
