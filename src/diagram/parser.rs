use super::lexer::{LexError, Lexer, Token};
use crate::schema::{Field, Modifiers, Multiplicity, Relation, Schema, Type};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiagramError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Unexpected token: {0:?}, expected {1}")]
    Unexpected(Token, &'static str),
    #[error("Invalid multiplicity: \"{0}\"")]
    InvalidMultiplicity(String),
    #[error("Unknown field modifier: {0}")]
    UnknownModifier(String),
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, DiagramError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), DiagramError> {
        match self.advance() {
            tok if tok == expected => Ok(()),
            tok => Err(DiagramError::Unexpected(tok, what)),
        }
    }

    fn expect_ident(&mut self) -> Result<String, DiagramError> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            tok => Err(DiagramError::Unexpected(tok, "identifier")),
        }
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == name)
    }

    /// Classes and relations in declaration order. Relations may name
    /// classes declared later or never; those are created empty.
    pub fn parse(&mut self) -> Result<Schema, DiagramError> {
        let mut schema = Schema::new();

        while *self.peek() != Token::Eof {
            if self.eat(&Token::At) {
                let marker = self.advance();
                if !matches!(&marker, Token::Ident(s) if s == "startuml" || s == "enduml") {
                    return Err(DiagramError::Unexpected(marker, "@startuml or @enduml"));
                }
            } else if self.check_ident("class") || self.check_ident("entity") {
                self.advance();
                self.parse_class(&mut schema)?;
            } else if matches!(self.peek(), Token::Ident(_)) {
                let relation = self.parse_relation()?;
                schema.entry_class(&relation.from.class);
                schema.entry_class(&relation.to.class);
                schema.add_relation(relation);
            } else {
                return Err(DiagramError::Unexpected(
                    self.peek().clone(),
                    "class, entity or relation",
                ));
            }
        }

        Ok(schema)
    }

    fn parse_class(&mut self, schema: &mut Schema) -> Result<(), DiagramError> {
        let name = self.expect_ident()?;
        let mut fields = Vec::new();

        if self.eat(&Token::LBrace) {
            while !self.eat(&Token::RBrace) {
                fields.push(self.parse_field()?);
            }
        }

        schema.entry_class(&name).fields.extend(fields);
        Ok(())
    }

    fn parse_field(&mut self) -> Result<Field, DiagramError> {
        let name = self.expect_ident()?;
        let typ = if self.eat(&Token::Colon) {
            Some(Type::from_name(&self.expect_ident()?))
        } else {
            None
        };

        let mut modifiers = Modifiers::default();
        if self.eat(&Token::LBrace) {
            loop {
                let keyword = self.expect_ident()?;
                modifiers |= match keyword.as_str() {
                    "pk" | "primary" => Modifiers::PRIMARY,
                    "unique" => Modifiers::UNIQUE,
                    "nullable" => Modifiers::NULLABLE,
                    _ => return Err(DiagramError::UnknownModifier(keyword)),
                };
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RBrace, "'}' after field modifiers")?;
        }

        Ok(Field::new(name, typ).with(modifiers))
    }

    /// `A ["m"] -- ["n"] B [: label]`
    fn parse_relation(&mut self) -> Result<Relation, DiagramError> {
        let left = self.expect_ident()?;
        let left_multiplicity = self.parse_multiplicity()?;
        self.expect(Token::Dash, "'--'")?;
        let right_multiplicity = self.parse_multiplicity()?;
        let right = self.expect_ident()?;

        if self.eat(&Token::Colon) {
            match self.advance() {
                Token::Ident(_) | Token::Str(_) => {}
                tok => return Err(DiagramError::Unexpected(tok, "relation label")),
            }
        }

        Ok(Relation::new(
            (&left, left_multiplicity),
            (&right, right_multiplicity),
        ))
    }

    fn parse_multiplicity(&mut self) -> Result<Multiplicity, DiagramError> {
        let Token::Str(text) = self.peek() else {
            return Ok(Multiplicity::One);
        };
        let multiplicity = match text.trim() {
            "1" => Multiplicity::One,
            "0..1" => Multiplicity::ZeroOrOne,
            "*" | "0..*" => Multiplicity::Any,
            "1..*" => Multiplicity::AtLeastOne,
            other => return Err(DiagramError::InvalidMultiplicity(other.to_string())),
        };
        self.advance();
        Ok(multiplicity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Multiplicity::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Result<Schema, DiagramError> {
        Parser::new(input)?.parse()
    }

    #[test]
    fn test_parse_class() {
        let schema = parse(
            r#"
@startuml
class User {
    id : int {pk}
    email : string {unique}
    bio : string {nullable, unique}
    nickname
}
@enduml
"#,
        )
        .unwrap();

        let user = schema.class("User").unwrap();
        assert_eq!(
            user.fields,
            vec![
                Field::new("id", Some(Type::Int)).with(Modifiers::PRIMARY),
                Field::new("email", Some(Type::String)).with(Modifiers::UNIQUE),
                Field::new("bio", Some(Type::String)).with(Modifiers::NULLABLE | Modifiers::UNIQUE),
                Field::new("nickname", None),
            ]
        );
    }

    #[test]
    fn test_parse_relations() {
        let schema = parse(
            r#"
entity User
entity Post
User "1" -- "*" Post : writes
Post "0..*" -- "1..*" Tag
User -- "0..1" Profile
"#,
        )
        .unwrap();

        assert_eq!(schema.class_count(), 4);
        let relations: Vec<_> = schema.relations().map(|(_, r)| r.clone()).collect();
        assert_eq!(
            relations,
            vec![
                Relation::new(("User", One), ("Post", Any)),
                Relation::new(("Post", Any), ("Tag", AtLeastOne)),
                Relation::new(("User", One), ("Profile", ZeroOrOne)),
            ]
        );
        assert_eq!(schema.class("Tag").unwrap().relation_ids().count(), 1);
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let schema = parse("class Shape { outline : polygon }").unwrap();
        let field = schema.class("Shape").unwrap().field("outline").unwrap();
        assert_eq!(field.typ, Some(Type::Other("polygon".into())));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse(r#"A "2" -- "1" B"#).unwrap_err(),
            DiagramError::InvalidMultiplicity("2".into())
        );
        assert_eq!(
            parse("class A { id : int {key} }").unwrap_err(),
            DiagramError::UnknownModifier("key".into())
        );
        assert_eq!(
            parse("A B").unwrap_err(),
            DiagramError::Unexpected(Token::Ident("B".into()), "'--'")
        );
        assert!(matches!(
            parse("class A { id : int"),
            Err(DiagramError::Unexpected(Token::Eof, _))
        ));
        assert!(matches!(parse("A -- @"), Err(DiagramError::Unexpected(Token::At, _))));
        assert!(matches!(parse("A ; B"), Err(DiagramError::Lex(_))));
    }
}
