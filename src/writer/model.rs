use std::collections::HashMap;

use tracing::debug;

use crate::config::GeneratorConfig;
use crate::naming;
use crate::plan::{class_keys, uses_id, ForeignKeyPlan, JunctionPlan, MigrationPlan};
use crate::resolve::{self, Ownership};
use crate::schema::{ClassMetadata, Relation, RelationId, Schema, Type};

use super::{line, GeneratedFile};

/// Eloquent relationship method generated for one end of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

impl RelationKind {
    /// Kind of the method on `class`'s model. `None` when `class` is not an
    /// end of `relation`.
    pub fn of(relation: &Relation, class: &str) -> Option<Self> {
        let (_, other) = relation.ends(class)?;
        Some(match resolve::ownership(relation, class)? {
            Ownership::Junction => Self::BelongsToMany,
            Ownership::This => Self::BelongsTo,
            Ownership::Other if other.multiplicity.is_many() => Self::HasMany,
            Ownership::Other => Self::HasOne,
        })
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::BelongsTo => "belongsTo",
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsToMany => "belongsToMany",
        }
    }

    fn is_many(self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany)
    }
}

/// Renders one Eloquent model per class.
///
/// Key columns are taken from the migration plan so models and migrations
/// agree on names. The schema passed to [`ModelWriter::write`] must still
/// hold the relations the plan deferred.
pub struct ModelWriter<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> ModelWriter<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn write(&self, schema: &Schema, plan: &MigrationPlan) -> Vec<GeneratedFile> {
        let mut keys: HashMap<RelationId, &ForeignKeyPlan> = HashMap::new();
        for fk in plan.tables.iter().flat_map(|t| &t.foreign_keys).chain(&plan.deferred) {
            keys.insert(fk.relation, fk);
        }
        let junctions: HashMap<RelationId, &JunctionPlan> = plan
            .junctions
            .iter()
            .filter_map(|j| Some((j.foreign_keys.first()?.relation, j)))
            .collect();

        schema
            .classes()
            .map(|class| GeneratedFile {
                name: format!("{}.php", class.name),
                contents: self.model(schema, class, &keys, &junctions),
            })
            .collect()
    }

    fn model(
        &self,
        schema: &Schema,
        class: &ClassMetadata,
        keys: &HashMap<RelationId, &ForeignKeyPlan>,
        junctions: &HashMap<RelationId, &JunctionPlan>,
    ) -> String {
        let mut members: Vec<Vec<String>> = Vec::new();

        let own_keys = class_keys(class, self.config.composite_keys);
        if !uses_id(&own_keys) {
            if let Some(key) = own_keys.first() {
                let key_type = match key.typ {
                    Some(Type::Int | Type::BigInt) => "int",
                    _ => "string",
                };
                members.push(vec![
                    format!("protected $primaryKey = '{}';", key.name),
                    format!("protected $keyType = '{key_type}';"),
                    "public $incrementing = false;".to_string(),
                ]);
            }
        }

        for (related, ids) in &class.related_classes {
            let numbered = ids.len() > 1;
            for (i, id) in ids.iter().enumerate() {
                let Some(relation) = schema.relation(*id) else { continue };
                let Some(kind) = RelationKind::of(relation, &class.name) else {
                    continue;
                };
                let mut name = naming::snake(related);
                if kind.is_many() {
                    name = naming::pluralize(&name);
                }
                if numbered {
                    name.push_str(&(i + 1).to_string());
                }

                let call = match kind {
                    RelationKind::BelongsToMany => junctions
                        .get(id)
                        .map(|junction| belongs_to_many(junction, &class.name, related)),
                    _ => keys.get(id).map(|fk| {
                        if fk.is_id() && !numbered {
                            format!("$this->{}({related}::class)", kind.method())
                        } else {
                            with_keys(kind, related, fk)
                        }
                    }),
                };
                let Some(call) = call else {
                    debug!(class = %class.name, relation = %id, "no planned key, skipping method");
                    continue;
                };

                members.push(vec![
                    format!("public function {name}()"),
                    "{".to_string(),
                    format!("    return {call};"),
                    "}".to_string(),
                ]);
            }
        }

        let mut out = String::new();
        out.push_str("<?php\n\nnamespace App\\Models;\n\n");
        out.push_str("use Illuminate\\Database\\Eloquent\\Model;\n\n");
        line(&mut out, 0, &format!("class {} extends Model", class.name));
        line(&mut out, 0, "{");
        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for text in member {
                line(&mut out, 1, text);
            }
        }
        line(&mut out, 0, "}");
        out
    }
}

/// Relationship call naming the key columns explicitly. Eloquent relations
/// take a single column, so composite keys use their first column.
fn with_keys(kind: RelationKind, related: &str, fk: &ForeignKeyPlan) -> String {
    let (column, references) = match fk.columns.first() {
        Some(c) => (c.name.as_str(), c.references.as_str()),
        None => ("id", "id"),
    };
    format!("$this->{}({related}::class, '{column}', '{references}')", kind.method())
}

fn belongs_to_many(junction: &JunctionPlan, class: &str, related: &str) -> String {
    let column = |fk: Option<&ForeignKeyPlan>| {
        fk.and_then(|fk| fk.columns.first())
            .map(|c| c.name.clone())
            .unwrap_or_default()
    };
    let (own, other) = if class == related {
        (junction.foreign_keys.first(), junction.foreign_keys.get(1))
    } else {
        (
            junction.foreign_keys.iter().find(|fk| fk.related == class),
            junction.foreign_keys.iter().find(|fk| fk.related == related),
        )
    };
    format!(
        "$this->belongsToMany({related}::class, '{}', '{}', '{}')",
        junction.table,
        column(own),
        column(other)
    )
}
