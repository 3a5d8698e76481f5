//! Entity graph shared by both translation directions.
//!
//! Relations live in an arena keyed by a monotonic [`RelationId`]; ids are
//! never reused, so removing a relation cannot invalidate another holder's
//! reference. Every id stored in [`ClassMetadata::related_classes`] points at a
//! live relation: the [`Schema`] methods keep both sides in sync.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    String,
    Int,
    BigInt,
    Float,
    Double,
    Bool,
    Date,
    DateTime,
    /// A type with no portable meaning, kept by name.
    Other(String),
}

impl Type {
    /// Parse a diagram type name. Unknown names are kept as [`Type::Other`].
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "string" | "str" | "text" | "varchar" => Self::String,
            "int" | "integer" => Self::Int,
            "bigint" | "long" => Self::BigInt,
            "float" => Self::Float,
            "double" | "decimal" => Self::Double,
            "bool" | "boolean" => Self::Bool,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::DateTime,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column flags carried by modifier calls, merged with bitwise OR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub nullable: bool,
    pub unique: bool,
    pub primary: bool,
}

impl Modifiers {
    pub const NULLABLE: Self = Self {
        nullable: true,
        unique: false,
        primary: false,
    };
    pub const UNIQUE: Self = Self {
        nullable: false,
        unique: true,
        primary: false,
    };
    pub const PRIMARY: Self = Self {
        nullable: false,
        unique: false,
        primary: true,
    };

    /// Flags for a modifier keyword (`nullable`, `unique`, `primary`).
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "nullable" => Self::NULLABLE,
            "unique" => Self::UNIQUE,
            "primary" => Self::PRIMARY,
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            nullable: self.nullable || rhs.nullable,
            unique: self.unique || rhs.unique,
            primary: self.primary || rhs.primary,
        }
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub typ: Option<Type>,
    pub nullable: bool,
    pub unique: bool,
    pub primary: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, typ: Option<Type>) -> Self {
        Self {
            name: name.into(),
            typ,
            nullable: false,
            unique: false,
            primary: false,
        }
    }

    pub fn with(mut self, modifiers: Modifiers) -> Self {
        self.apply(modifiers);
        self
    }

    pub fn apply(&mut self, modifiers: Modifiers) {
        self.nullable |= modifiers.nullable;
        self.unique |= modifiers.unique;
        self.primary |= modifiers.primary;
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers {
            nullable: self.nullable,
            unique: self.unique,
            primary: self.primary,
        }
    }
}

/// End multiplicity of a relation: how many instances of the endpoint's class
/// relate to one instance of the class at the other end.
///
/// Declaration order is the restrictiveness order, most restrictive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Multiplicity {
    One,
    ZeroOrOne,
    AtLeastOne,
    Any,
}

impl Multiplicity {
    pub fn is_many(self) -> bool {
        matches!(self, Self::Any | Self::AtLeastOne)
    }

    pub fn is_single(self) -> bool {
        !self.is_many()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationId(usize);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub class: String,
    pub multiplicity: Multiplicity,
}

/// An association between two classes. `from`/`to` are nominal; which side
/// stores the foreign key is decided by [`crate::resolve::ownership`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Relation {
    pub fn new(from: (&str, Multiplicity), to: (&str, Multiplicity)) -> Self {
        Self {
            from: Endpoint {
                class: from.0.to_string(),
                multiplicity: from.1,
            },
            to: Endpoint {
                class: to.0.to_string(),
                multiplicity: to.1,
            },
        }
    }

    pub fn is_self(&self) -> bool {
        self.from.class == self.to.class
    }

    pub fn involves(&self, class: &str) -> bool {
        self.from.class == class || self.to.class == class
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from.class == a && self.to.class == b) || (self.from.class == b && self.to.class == a)
    }

    /// The `(own, other)` endpoints as seen from `class`.
    pub fn ends(&self, class: &str) -> Option<(&Endpoint, &Endpoint)> {
        if self.from.class == class {
            Some((&self.from, &self.to))
        } else if self.to.class == class {
            Some((&self.to, &self.from))
        } else {
            None
        }
    }

    pub fn multiplicity_of(&self, class: &str) -> Option<Multiplicity> {
        self.ends(class).map(|(own, _)| own.multiplicity)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} -- {:?} {}",
            self.from.class, self.from.multiplicity, self.to.multiplicity, self.to.class
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassMetadata {
    pub name: String,
    pub fields: Vec<Field>,
    /// Related class name to the relations linking it with this class.
    pub related_classes: BTreeMap<String, Vec<RelationId>>,
}

impl ClassMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let index = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(index))
    }

    pub fn relation_ids(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.related_classes.values().flatten().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    classes: Vec<ClassMetadata>,
    relations: BTreeMap<RelationId, Relation>,
    next_relation: usize,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classes in insertion order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassMetadata> {
        self.classes.iter()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn class(&self, name: &str) -> Option<&ClassMetadata> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassMetadata> {
        self.classes.iter_mut().find(|c| c.name == name)
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.class(name).is_some()
    }

    /// Fetch a class by name, creating it if absent. A new class is linked to
    /// every live relation that already names it.
    pub fn entry_class(&mut self, name: &str) -> &mut ClassMetadata {
        let index = match self.classes.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                let mut class = ClassMetadata::new(name);
                for (id, relation) in &self.relations {
                    if let Some((_, other)) = relation.ends(name) {
                        class
                            .related_classes
                            .entry(other.class.clone())
                            .or_default()
                            .push(*id);
                    }
                }
                self.classes.push(class);
                self.classes.len() - 1
            }
        };
        &mut self.classes[index]
    }

    /// Remove a class together with every relation touching it.
    pub fn remove_class(&mut self, name: &str) -> Option<ClassMetadata> {
        let index = self.classes.iter().position(|c| c.name == name)?;
        let class = self.classes.remove(index);
        let touching: Vec<RelationId> = self
            .relations
            .iter()
            .filter(|(_, r)| r.involves(name))
            .map(|(id, _)| *id)
            .collect();
        for id in touching {
            self.remove_relation(id);
        }
        Some(class)
    }

    pub fn add_relation(&mut self, relation: Relation) -> RelationId {
        let id = RelationId(self.next_relation);
        self.next_relation += 1;

        let (from, to) = (relation.from.class.clone(), relation.to.class.clone());
        if let Some(class) = self.class_mut(&from) {
            class.related_classes.entry(to.clone()).or_default().push(id);
        }
        if from != to {
            if let Some(class) = self.class_mut(&to) {
                class.related_classes.entry(from).or_default().push(id);
            }
        }

        self.relations.insert(id, relation);
        id
    }

    /// Remove a relation and unlink it from both endpoint classes.
    pub fn remove_relation(&mut self, id: RelationId) -> Option<Relation> {
        let relation = self.relations.remove(&id)?;
        for (owner, other) in [
            (&relation.from.class, &relation.to.class),
            (&relation.to.class, &relation.from.class),
        ] {
            if let Some(class) = self.class_mut(owner) {
                if let Some(ids) = class.related_classes.get_mut(other) {
                    ids.retain(|i| *i != id);
                    if ids.is_empty() {
                        class.related_classes.remove(other);
                    }
                }
            }
        }
        Some(relation)
    }

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(&id)
    }

    pub fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        self.relations.get_mut(&id)
    }

    /// Live relations in creation order.
    pub fn relations(&self) -> impl Iterator<Item = (RelationId, &Relation)> {
        self.relations.iter().map(|(id, r)| (*id, r))
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn relations_between(&self, a: &str, b: &str) -> Vec<RelationId> {
        self.relations
            .iter()
            .filter(|(_, r)| r.connects(a, b))
            .map(|(id, _)| *id)
            .collect()
    }
}
