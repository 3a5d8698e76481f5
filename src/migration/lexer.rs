//! Lexer for `Schema::…` migration statements.

use crate::automaton::Lexeme;

use super::types;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Statement frame
    Facade,      // Schema
    DoubleColon, // ::
    Create,      // create
    Modify,      // table
    Drop,        // drop | dropIfExists
    Function,    // function
    TableVar,    // $table
    Word,        // any other bare word

    // Column calls
    Arrow, // ->
    Type,
    Nameless,
    Modifier,
    Foreign,
    ForeignId,
    Location, // references | on
    DropColumn,
    DropForeign,

    // Literals
    Text,
    Number,

    // Symbols
    LParen,
    RParen,
    Comma,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    End, // ;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("Unrecognized token '{text}' at offset {offset}")]
    UnrecognizedToken { text: String, offset: usize },
}

/// Chained calls with no effect on the schema. `->name(...)` is dropped
/// whole, arguments included.
const IGNORED_CALLS: &[&str] = &[
    "after",
    "cascadeOnDelete",
    "cascadeOnUpdate",
    "change",
    "comment",
    "constrained",
    "default",
    "index",
    "noActionOnDelete",
    "nullOnDelete",
    "onDelete",
    "onUpdate",
    "restrictOnDelete",
    "restrictOnUpdate",
    "unsigned",
    "useCurrent",
    "useCurrentOnUpdate",
];

fn classify(word: &str) -> TokenKind {
    // `\Illuminate\Support\Facades\Schema` names the facade too.
    let word = word.rsplit('\\').next().unwrap_or(word);
    match word {
        "Schema" => TokenKind::Facade,
        "create" => TokenKind::Create,
        "table" => TokenKind::Modify,
        "drop" | "dropIfExists" => TokenKind::Drop,
        "function" => TokenKind::Function,
        "id" | "rememberToken" | "timestamps" | "timestampsTz" | "nullableTimestamps"
        | "softDeletes" | "softDeletesTz" => TokenKind::Nameless,
        "unique" | "nullable" | "primary" => TokenKind::Modifier,
        "foreign" => TokenKind::Foreign,
        "foreignId" | "foreignUuid" | "foreignUlid" => TokenKind::ForeignId,
        "references" | "on" => TokenKind::Location,
        "dropColumn" => TokenKind::DropColumn,
        "dropForeign" => TokenKind::DropForeign,
        _ if types::column_type(word).is_some() => TokenKind::Type,
        _ => TokenKind::Word,
    }
}

/// Restartable token stream over one statement. Offsets are byte offsets into
/// the input.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            failed: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with(char::is_whitespace) {
                self.bump();
            } else if rest.starts_with("//") || rest.starts_with('#') {
                self.skip_line();
            } else if rest.starts_with("/*") {
                self.pos += match rest[2..].find("*/") {
                    Some(end) => end + 4,
                    None => rest.len(),
                };
            } else if !self.skip_ignored_call() {
                break;
            }
        }
    }

    fn skip_inline_space(&self, mut pos: usize) -> usize {
        while let Some(c) = self.input[pos..].chars().next() {
            if !c.is_whitespace() {
                break;
            }
            pos += c.len_utf8();
        }
        pos
    }

    /// Skip `->name(...)` when `name` is an ignored call.
    fn skip_ignored_call(&mut self) -> bool {
        let Some(after_arrow) = self.rest().strip_prefix("->") else {
            return false;
        };
        let name_len = after_arrow
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after_arrow.len());
        if !IGNORED_CALLS.contains(&&after_arrow[..name_len]) {
            return false;
        }
        let open = self.skip_inline_space(self.pos + 2 + name_len);
        if !self.input[open..].starts_with('(') {
            return false;
        }

        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for (i, c) in self.input[open..].char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos = open + i + 1;
                        return true;
                    }
                }
                _ => {}
            }
        }
        // Unbalanced: leave it for the parser to reject.
        false
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn read_quoted(&mut self, quote: char, offset: usize) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('\\') => {
                    if let Some(c) = self.bump() {
                        s.push(c);
                    }
                }
                Some(c) if c == quote => return Ok(s),
                Some(c) => s.push(c),
                None => {
                    return Err(LexError::UnrecognizedToken {
                        text: self.input[offset..].lines().next().unwrap_or("").to_string(),
                        offset,
                    });
                }
            }
        }
    }

    pub fn next_token(&mut self) -> Option<Result<Lexeme<TokenKind>, LexError>> {
        if self.failed {
            return None;
        }
        self.skip_trivia();

        let offset = self.pos;
        let c = self.peek()?;
        let token = |kind: TokenKind, text: &str| Lexeme {
            kind,
            text: text.to_string(),
            offset,
        };

        let symbol = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ';' => Some(TokenKind::End),
            _ => None,
        };
        if let Some(kind) = symbol {
            self.bump();
            return Some(Ok(token(kind, &c.to_string())));
        }

        let rest = self.rest();
        if rest.starts_with("::") {
            self.pos += 2;
            return Some(Ok(token(TokenKind::DoubleColon, "::")));
        }
        if rest.starts_with("->") {
            self.pos += 2;
            return Some(Ok(token(TokenKind::Arrow, "->")));
        }

        let result = match c {
            '\'' | '"' => {
                self.bump();
                self.read_quoted(c, offset).map(|text| token(TokenKind::Text, &text))
            }
            '$' => {
                self.bump();
                let name = self.read_while(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() {
                    Err(LexError::UnrecognizedToken {
                        text: "$".to_string(),
                        offset,
                    })
                } else {
                    Ok(token(TokenKind::TableVar, &self.input[offset..self.pos]))
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                self.bump();
                let number = self.read_while(|c| c.is_ascii_digit() || c == '.');
                if c == '-' && number.is_empty() {
                    Err(LexError::UnrecognizedToken {
                        text: "-".to_string(),
                        offset,
                    })
                } else {
                    Ok(token(TokenKind::Number, &self.input[offset..self.pos]))
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '\\' => {
                let word = self.read_while(|c| c.is_alphanumeric() || c == '_' || c == '\\');
                Ok(token(classify(word), word))
            }
            _ => {
                let text = self.read_while(|c| !c.is_whitespace());
                Err(LexError::UnrecognizedToken {
                    text: text.to_string(),
                    offset,
                })
            }
        };

        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Lexeme<TokenKind>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
