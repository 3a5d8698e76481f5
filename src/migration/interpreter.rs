//! Reduction handlers for migration statements.
//!
//! Reductions only fill a [`PendingClass`]; nothing touches the schema until
//! the statement has been accepted and [`PendingClass::commit`] runs. Column
//! modifiers are buffered and merged at commit time, since `primary('email')`
//! may come before the `email` column is declared.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::automaton::{Lexeme, Reducer};
use crate::naming;
use crate::schema::{ClassMetadata, Field, Modifiers, Multiplicity, Relation, Schema, Type};

use super::grammar::Production;
use super::lexer::TokenKind;
use super::types;

/// Semantic value of a grammar symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Sigil {
    Token(Lexeme<TokenKind>),
    Names(Vec<String>),
    Flags(Modifiers),
    Target { keyword: String, columns: Vec<String> },
    Located(Location),
    Empty,
}

impl Sigil {
    fn text(&self) -> Option<&str> {
        match self {
            Sigil::Token(lexeme) => Some(lexeme.text.as_str()),
            _ => None,
        }
    }
}

/// Where a foreign key points, from `->references(...)->on(...)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub table: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAction {
    Create,
    Modify,
    Drop,
}

/// A relation declared by a foreign key, local class still implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRelation {
    pub related: String,
    pub columns: Vec<String>,
    /// Multiplicity at the declaring class's end.
    pub local: Multiplicity,
    /// Multiplicity at the referenced class's end.
    pub remote: Multiplicity,
}

impl PendingRelation {
    fn new(related: String, columns: Vec<String>, flags: Modifiers) -> Self {
        let mut relation = Self {
            related,
            columns,
            local: Multiplicity::Any,
            remote: Multiplicity::One,
        };
        relation.apply(flags);
        relation
    }

    /// A unique key allows one declaring row per referenced row; a nullable
    /// key makes the referenced row optional.
    fn apply(&mut self, flags: Modifiers) {
        if flags.unique {
            self.local = Multiplicity::ZeroOrOne;
        }
        if flags.nullable {
            self.remote = Multiplicity::ZeroOrOne;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingClass {
    pub action: Option<TableAction>,
    pub table: String,
    pub name: String,
    pub fields: Vec<Field>,
    pub relations: Vec<PendingRelation>,
    /// Foreign-key column name to its index in `relations`.
    pub relation_columns: BTreeMap<String, usize>,
    pub field_modifiers: Vec<(String, Modifiers)>,
    pub removed_columns: Vec<String>,
    /// Related class names whose foreign key is dropped.
    pub removed_relations: Vec<String>,
}

impl PendingClass {
    fn begin(&mut self, action: TableAction, table: &str) {
        self.action = Some(action);
        self.table = table.to_string();
        self.name = naming::class_name(table);
    }

    fn add_relation(&mut self, relation: PendingRelation) {
        let index = self.relations.len();
        for column in &relation.columns {
            self.relation_columns.insert(column.clone(), index);
        }
        self.relations.push(relation);
    }

    /// Fields that turned out to be foreign-key columns become part of their
    /// relation: the field is dropped and its flags move to the relation.
    fn absorb_relation_columns(&mut self) {
        let columns = &self.relation_columns;
        let relations = &mut self.relations;
        self.fields.retain(|field| match columns.get(&field.name) {
            Some(&index) => {
                relations[index].apply(field.modifiers());
                false
            }
            None => true,
        });
    }

    fn resolve_modifiers(&mut self, mut existing: Option<&mut ClassMetadata>) {
        for (column, flags) in std::mem::take(&mut self.field_modifiers) {
            if let Some(field) = self.fields.iter_mut().find(|f| f.name == column) {
                field.apply(flags);
            } else if let Some(&index) = self.relation_columns.get(&column) {
                self.relations[index].apply(flags);
            } else if let Some(field) = existing.as_mut().and_then(|c| c.field_mut(&column)) {
                field.apply(flags);
            } else {
                warn!(class = %self.name, column = %column, "modifier on unknown column ignored");
            }
        }
    }

    /// `a_b` tables holding nothing but an `id` link two classes.
    fn junction(&self) -> Option<(String, String)> {
        match self.fields.as_slice() {
            [only] if only.name == "id" => naming::junction_classes(&self.table),
            _ => None,
        }
    }

    fn register_relations(&mut self, schema: &mut Schema) {
        for relation in self.relations.drain(..) {
            schema.add_relation(Relation::new(
                (&self.name, relation.local),
                (&relation.related, relation.remote),
            ));
        }
    }

    /// Apply the statement to `schema`.
    pub fn commit(mut self, schema: &mut Schema) {
        match self.action {
            None => {}
            Some(TableAction::Drop) => {
                if schema.remove_class(&self.name).is_none() {
                    warn!(table = %self.table, "dropping unknown table");
                }
            }
            Some(TableAction::Create) => {
                self.absorb_relation_columns();
                if let Some((a, b)) = self.junction() {
                    info!(table = %self.table, "{a} and {b} linked through junction table");
                    schema.add_relation(Relation::new((&a, Multiplicity::Any), (&b, Multiplicity::Any)));
                    return;
                }
                self.resolve_modifiers(None);
                let class = schema.entry_class(&self.name);
                class.fields.append(&mut self.fields);
                self.register_relations(schema);
            }
            Some(TableAction::Modify) => {
                self.absorb_relation_columns();
                if !schema.contains_class(&self.name) {
                    warn!(table = %self.table, "modifying unknown table, creating it");
                }
                let class = schema.entry_class(&self.name);
                self.resolve_modifiers(Some(&mut *class));
                // Columns declared by an earlier migration become part of the
                // relation that now references them.
                for (column, &index) in &self.relation_columns {
                    if let Some(field) = class.remove_field(column) {
                        self.relations[index].apply(field.modifiers());
                    }
                }
                class.fields.append(&mut self.fields);
                for column in &self.removed_columns {
                    if class.remove_field(column).is_none() {
                        debug!(class = %self.name, column = %column, "dropped column was not a field");
                    }
                }

                for related in &self.removed_relations {
                    match schema.relations_between(&self.name, related).last() {
                        Some(&id) => {
                            schema.remove_relation(id);
                        }
                        None => {
                            warn!(class = %self.name, related = %related, "dropped foreign key has no relation");
                        }
                    }
                }
                self.register_relations(schema);
            }
        }
    }
}

/// Drives a [`PendingClass`] from parser reductions.
#[derive(Debug, Default)]
pub struct Interpreter {
    pending: PendingClass,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> PendingClass {
        self.pending
    }

    fn column(&mut self, values: &[Sigil]) {
        let (Some(method), Some(name)) = (text_at(values, 0), text_at(values, 2)) else {
            return;
        };
        let field = Field::new(name, types::column_type(method)).with(flags(values));
        self.pending.fields.push(field);
    }

    fn nameless(&mut self, values: &[Sigil]) {
        match text_at(values, 0) {
            Some("id") => {
                let field = Field::new("id", Some(Type::Int)).with(Modifiers::PRIMARY | flags(values));
                self.pending.fields.push(field);
            }
            Some(other) => debug!(call = other, "column helper without schema effect"),
            None => {}
        }
    }

    fn modifier_call(&mut self, values: &[Sigil]) {
        let Some(keyword) = text_at(values, 0) else { return };
        let modifiers = Modifiers::from_keyword(keyword);
        for column in names(values) {
            self.pending.field_modifiers.push((column, modifiers));
        }
    }

    fn foreign(&mut self, values: &[Sigil]) {
        let columns = names(values);
        let Some(first) = columns.first() else { return };
        let related = match located(values).and_then(|l| l.table.as_deref()) {
            Some(table) => naming::class_name(table),
            None => naming::related_class(first),
        };
        let relation = PendingRelation::new(related, columns, flags(values));
        self.pending.add_relation(relation);
    }

    fn foreign_id(&mut self, values: &[Sigil]) {
        let Some(column) = text_at(values, 2) else { return };
        let related = match located(values).and_then(|l| l.table.as_deref()) {
            Some(table) => naming::class_name(table),
            None => naming::related_class(column),
        };
        let relation = PendingRelation::new(related, vec![column.to_string()], flags(values));
        self.pending.add_relation(relation);
    }

    fn location_of(values: Vec<Sigil>) -> Sigil {
        let mut location = Location::default();
        for value in values {
            if let Sigil::Target { keyword, columns } = value {
                if keyword == "on" {
                    location.table = columns.into_iter().next();
                } else {
                    location.columns = columns;
                }
            }
        }
        Sigil::Located(location)
    }
}

impl Reducer<TokenKind, Production> for Interpreter {
    type Value = Sigil;

    fn shift(&mut self, lexeme: Lexeme<TokenKind>) -> Sigil {
        Sigil::Token(lexeme)
    }

    fn reduce(&mut self, production: Production, values: Vec<Sigil>) -> Sigil {
        match production {
            Production::CreateTable | Production::ModifyTable | Production::DropTable => {
                let action = match production {
                    Production::CreateTable => TableAction::Create,
                    Production::ModifyTable => TableAction::Modify,
                    _ => TableAction::Drop,
                };
                if let Some(table) = text_at(&values, 4) {
                    self.pending.begin(action, table);
                }
            }
            Production::Column => self.column(&values),
            Production::Nameless => self.nameless(&values),
            Production::ModifierCall => self.modifier_call(&values),
            Production::Foreign | Production::ForeignLocated => self.foreign(&values),
            Production::ForeignId | Production::ForeignIdLocated => self.foreign_id(&values),
            Production::DropColumn => self.pending.removed_columns.extend(names(&values)),
            Production::DropForeign => {
                if let Some(first) = names(&values).first() {
                    self.pending.removed_relations.push(naming::related_class(first));
                }
            }

            Production::Columns | Production::Texts => {
                let mut collected = Vec::new();
                for value in values {
                    match value {
                        Sigil::Token(lexeme) if lexeme.kind == TokenKind::Text => {
                            collected.push(lexeme.text)
                        }
                        Sigil::Names(names) => collected.extend(names),
                        _ => {}
                    }
                }
                return Sigil::Names(collected);
            }
            Production::Mods => return Sigil::Flags(flags(&values)),
            Production::Mod => {
                return Sigil::Flags(
                    text_at(&values, 1)
                        .map(Modifiers::from_keyword)
                        .unwrap_or_default(),
                );
            }
            Production::Target => {
                return Sigil::Target {
                    keyword: text_at(&values, 1).unwrap_or_default().to_string(),
                    columns: names(&values),
                };
            }
            Production::Located => return Self::location_of(values),

            Production::Definition
            | Production::Lines
            | Production::Line
            | Production::EmptyLine
            | Production::Args
            | Production::Arg
            | Production::Values
            | Production::Value => {}
        }
        Sigil::Empty
    }
}

fn text_at(values: &[Sigil], index: usize) -> Option<&str> {
    values.get(index).and_then(Sigil::text)
}

fn names(values: &[Sigil]) -> Vec<String> {
    values
        .iter()
        .find_map(|v| match v {
            Sigil::Names(names) => Some(names.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn flags(values: &[Sigil]) -> Modifiers {
    values.iter().fold(Modifiers::default(), |acc, v| match v {
        Sigil::Flags(flags) => acc | *flags,
        _ => acc,
    })
}

fn located(values: &[Sigil]) -> Option<&Location> {
    values.iter().find_map(|v| match v {
        Sigil::Located(location) => Some(location),
        _ => None,
    })
}
