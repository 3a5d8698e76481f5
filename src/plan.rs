//! Table plan derived from an ordered schema: what each migration creates.

use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::SchemaError;
use crate::migration::types;
use crate::naming;
use crate::resolve::{self, ClassOrder, Ownership};
use crate::schema::{ClassMetadata, Multiplicity, Relation, RelationId, Schema, Type};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub typ: Option<Type>,
}

impl Key {
    fn id() -> Self {
        Self {
            name: "id".to_string(),
            typ: Some(Type::Int),
        }
    }
}

/// Primary key of a class. An `id` field wins outright; otherwise the fields
/// marked primary. Several primaries without `composite`, or none at all,
/// fall back to a synthetic `id`.
pub fn class_keys(class: &ClassMetadata, composite: bool) -> Vec<Key> {
    if let Some(id) = class.field("id") {
        return vec![Key {
            name: id.name.clone(),
            typ: id.typ.clone().or(Some(Type::Int)),
        }];
    }
    let keys: Vec<Key> = class
        .fields
        .iter()
        .filter(|f| f.primary)
        .map(|f| Key {
            name: f.name.clone(),
            typ: f.typ.clone(),
        })
        .collect();
    if keys.is_empty() || (keys.len() > 1 && !composite) {
        vec![Key::id()]
    } else {
        keys
    }
}

pub fn uses_id(keys: &[Key]) -> bool {
    matches!(keys, [key] if key.name == "id")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub name: String,
    pub method: &'static str,
    pub nullable: bool,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyColumn {
    pub name: String,
    /// Column of the referenced table.
    pub references: String,
    pub typ: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyPlan {
    pub relation: RelationId,
    /// Table holding the key.
    pub table: String,
    /// Referenced table and class.
    pub on: String,
    pub related: String,
    pub columns: Vec<KeyColumn>,
    pub nullable: bool,
    pub unique: bool,
}

impl ForeignKeyPlan {
    /// A single `{class}_id` column pointing at an `id` key.
    pub fn is_id(&self) -> bool {
        matches!(self.columns.as_slice(), [column] if column.references == "id")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub class: String,
    pub table: String,
    pub keys: Vec<Key>,
    pub uses_id: bool,
    pub columns: Vec<ColumnPlan>,
    pub foreign_keys: Vec<ForeignKeyPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunctionPlan {
    pub table: String,
    pub foreign_keys: Vec<ForeignKeyPlan>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    pub tables: Vec<TablePlan>,
    pub junctions: Vec<JunctionPlan>,
    /// Keys added after all tables exist, one per deferred relation.
    pub deferred: Vec<ForeignKeyPlan>,
    pub warnings: Vec<SchemaError>,
    pub cycles: Vec<Vec<String>>,
}

impl MigrationPlan {
    /// Order `schema` and plan its tables. Relations deferred to break cycles
    /// are removed from `schema`.
    pub fn build(schema: &mut Schema, config: &GeneratorConfig) -> Self {
        let order = resolve::order(schema);
        Self::from_order(schema, &order, config)
    }

    pub fn from_order(schema: &Schema, order: &ClassOrder, config: &GeneratorConfig) -> Self {
        let mut planner = Planner {
            schema,
            composite: config.composite_keys,
            plan: MigrationPlan {
                cycles: order.cycles.clone(),
                ..Default::default()
            },
        };

        for name in &order.classes {
            if let Some(class) = schema.class(name) {
                let table = planner.table(class);
                planner.plan.tables.push(table);
            }
        }

        for (id, relation) in schema.relations() {
            if ownership_of(relation) == Some(Ownership::Junction) {
                let junction = planner.junction(id, relation);
                planner.plan.junctions.push(junction);
            }
        }

        for (id, relation) in &order.deferred {
            let owner = match ownership(relation, &relation.from.class) {
                Some(Ownership::Other) => &relation.to.class,
                _ => &relation.from.class,
            };
            let previous = owned_between(schema, owner, other_end(relation, owner));
            let suffix = (previous > 0).then_some(previous + 1);
            if let Some(fk) = planner.foreign_key(*id, relation, owner, suffix) {
                planner.plan.deferred.push(fk);
            }
        }

        for warning in &planner.plan.warnings {
            warn!("{warning}");
        }
        planner.plan
    }
}

fn ownership(relation: &Relation, class: &str) -> Option<Ownership> {
    resolve::ownership(relation, class)
}

fn ownership_of(relation: &Relation) -> Option<Ownership> {
    ownership(relation, &relation.from.class)
}

fn other_end<'r>(relation: &'r Relation, class: &str) -> &'r str {
    match relation.ends(class) {
        Some((_, other)) => &other.class,
        None => &relation.to.class,
    }
}

/// Relations between `owner` and `other` that `owner` holds the key for.
fn owned_between(schema: &Schema, owner: &str, other: &str) -> usize {
    schema
        .relations_between(owner, other)
        .into_iter()
        .filter_map(|id| schema.relation(id))
        .filter(|r| ownership(r, owner) == Some(Ownership::This))
        .count()
}

struct Planner<'s> {
    schema: &'s Schema,
    composite: bool,
    plan: MigrationPlan,
}

impl Planner<'_> {
    fn keys_of(&self, class: &str) -> Vec<Key> {
        match self.schema.class(class) {
            Some(class) => class_keys(class, self.composite),
            None => {
                debug!(class, "referenced class is not in the schema, assuming 'id' key");
                vec![Key::id()]
            }
        }
    }

    fn table(&mut self, class: &ClassMetadata) -> TablePlan {
        let keys = class_keys(class, self.composite);
        let uses_id = uses_id(&keys);
        if uses_id && class.field("id").is_none() {
            debug!(class = %class.name, "no usable primary key, adding 'id'");
        }

        let mut columns = Vec::new();
        for field in &class.fields {
            if uses_id && field.name == "id" {
                continue;
            }
            let Some(typ) = &field.typ else {
                self.plan.warnings.push(SchemaError::UnknownFieldType {
                    class: class.name.clone(),
                    field: field.name.clone(),
                });
                continue;
            };
            let Some(method) = types::column_method(typ) else {
                self.plan.warnings.push(SchemaError::UnsupportedTypeForTarget {
                    class: class.name.clone(),
                    field: field.name.clone(),
                    typ: typ.to_string(),
                });
                continue;
            };
            columns.push(ColumnPlan {
                name: field.name.clone(),
                method,
                nullable: !field.primary && field.nullable,
                unique: !field.primary && field.unique,
            });
        }

        let mut foreign_keys = Vec::new();
        for (other, ids) in &class.related_classes {
            let owned: Vec<(RelationId, &Relation)> = ids
                .iter()
                .filter_map(|id| Some((*id, self.schema.relation(*id)?)))
                .filter(|(_, r)| ownership(r, &class.name) == Some(Ownership::This))
                .collect();
            let numbered = owned.len() > 1;
            for (i, (id, relation)) in owned.into_iter().enumerate() {
                let suffix = numbered.then_some(i + 1);
                if let Some(fk) = self.foreign_key(id, relation, &class.name, suffix) {
                    foreign_keys.push(fk);
                }
            }
            debug!(class = %class.name, related = %other, "foreign keys planned");
        }

        TablePlan {
            class: class.name.clone(),
            table: naming::table_name(&class.name),
            keys,
            uses_id,
            columns,
            foreign_keys,
        }
    }

    fn foreign_key(
        &self,
        id: RelationId,
        relation: &Relation,
        owner: &str,
        suffix: Option<usize>,
    ) -> Option<ForeignKeyPlan> {
        let related = other_end(relation, owner).to_string();
        let referenced = resolve::referenced_multiplicity(relation, owner)?;
        let owning = resolve::owning_multiplicity(relation, owner)?;
        let suffix = suffix.map(|n| n.to_string()).unwrap_or_default();
        let prefix = naming::snake(&related);

        let columns = self
            .keys_of(&related)
            .into_iter()
            .map(|key| KeyColumn {
                name: format!("{prefix}_{}{suffix}", key.name),
                references: key.name,
                typ: key.typ,
            })
            .collect();

        Some(ForeignKeyPlan {
            relation: id,
            table: naming::table_name(owner),
            on: naming::table_name(&related),
            related,
            columns,
            nullable: referenced == Multiplicity::ZeroOrOne,
            unique: owning.is_single(),
        })
    }

    fn junction(&self, id: RelationId, relation: &Relation) -> JunctionPlan {
        let (a, b) = (&relation.from.class, &relation.to.class);
        let table = naming::junction_table(a, b);
        let mut foreign_keys = Vec::new();
        let self_link = relation.is_self();
        for (i, class) in [a, b].into_iter().enumerate() {
            let suffix = if self_link { (i + 1).to_string() } else { String::new() };
            let prefix = naming::snake(class);
            let columns = self
                .keys_of(class)
                .into_iter()
                .map(|key| KeyColumn {
                    name: format!("{prefix}_{}{suffix}", key.name),
                    references: key.name,
                    typ: key.typ,
                })
                .collect();
            foreign_keys.push(ForeignKeyPlan {
                relation: id,
                table: table.clone(),
                on: naming::table_name(class),
                related: class.clone(),
                columns,
                nullable: false,
                unique: false,
            });
        }
        JunctionPlan {
            table,
            foreign_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Modifiers, Multiplicity::*};
    use pretty_assertions::assert_eq;

    fn config() -> GeneratorConfig {
        GeneratorConfig::default()
    }

    fn key(name: &str, typ: Type) -> Key {
        Key {
            name: name.to_string(),
            typ: Some(typ),
        }
    }

    #[test]
    fn test_class_keys_defaults() {
        let empty = ClassMetadata::new("Tag");
        assert_eq!(class_keys(&empty, false), vec![key("id", Type::Int)]);

        let mut composite = ClassMetadata::new("Envio");
        composite.fields.push(Field::new("codigo", Some(Type::String)).with(Modifiers::PRIMARY));
        composite.fields.push(Field::new("peso", Some(Type::Float)).with(Modifiers::PRIMARY));
        assert_eq!(class_keys(&composite, false), vec![key("id", Type::Int)]);
        assert_eq!(
            class_keys(&composite, true),
            vec![key("codigo", Type::String), key("peso", Type::Float)]
        );

        composite.fields.push(Field::new("id", Some(Type::BigInt)));
        assert_eq!(class_keys(&composite, true), vec![key("id", Type::BigInt)]);
    }

    #[test]
    fn test_single_named_primary_key() {
        let mut user = ClassMetadata::new("Usuario");
        user.fields.push(Field::new("email", Some(Type::String)).with(Modifiers::PRIMARY));
        let keys = class_keys(&user, false);
        assert_eq!(keys, vec![key("email", Type::String)]);
        assert!(!uses_id(&keys));
    }

    #[test]
    fn test_foreign_key_goes_on_many_side() {
        let mut schema = Schema::new();
        schema.entry_class("Post").fields.push(Field::new("title", Some(Type::String)));
        schema.entry_class("User");
        schema.add_relation(Relation::new(("Post", Any), ("User", One)));

        let plan = MigrationPlan::build(&mut schema, &config());
        let tables: Vec<_> = plan.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(tables, vec!["users", "posts"]);

        let posts = &plan.tables[1];
        assert_eq!(posts.foreign_keys.len(), 1);
        let fk = &posts.foreign_keys[0];
        assert!(fk.is_id());
        assert_eq!(fk.columns[0].name, "user_id");
        assert_eq!(fk.on, "users");
        assert!(!fk.nullable);
        assert!(!fk.unique);
        assert!(plan.tables[0].foreign_keys.is_empty());
    }

    #[test]
    fn test_optional_one_to_one() {
        let mut schema = Schema::new();
        schema.entry_class("User");
        schema.entry_class("Profile");
        schema.add_relation(Relation::new(("Profile", ZeroOrOne), ("User", ZeroOrOne)));

        let plan = MigrationPlan::build(&mut schema, &config());
        let profile = plan.tables.iter().find(|t| t.class == "Profile").unwrap();
        let fk = &profile.foreign_keys[0];
        assert!(fk.nullable);
        assert!(fk.unique);
    }

    #[test]
    fn test_repeated_relations_are_numbered() {
        let mut schema = Schema::new();
        schema.entry_class("Direccion");
        schema.entry_class("Envio");
        schema.add_relation(Relation::new(("Envio", Any), ("Direccion", One)));
        schema.add_relation(Relation::new(("Envio", Any), ("Direccion", One)));

        let plan = MigrationPlan::build(&mut schema, &config());
        let envio = plan.tables.iter().find(|t| t.class == "Envio").unwrap();
        let names: Vec<_> = envio
            .foreign_keys
            .iter()
            .map(|fk| fk.columns[0].name.as_str())
            .collect();
        assert_eq!(names, vec!["direccion_id1", "direccion_id2"]);
    }

    #[test]
    fn test_composite_reference() {
        let mut schema = Schema::new();
        let envio = schema.entry_class("Envio");
        envio.fields.push(Field::new("codigo", Some(Type::String)).with(Modifiers::PRIMARY));
        envio.fields.push(Field::new("peso", Some(Type::Float)).with(Modifiers::PRIMARY));
        schema.entry_class("Historico");
        schema.add_relation(Relation::new(("Historico", Any), ("Envio", One)));

        let config = GeneratorConfig {
            composite_keys: true,
            ..config()
        };
        let plan = MigrationPlan::build(&mut schema, &config);
        let historico = plan.tables.iter().find(|t| t.class == "Historico").unwrap();
        let fk = &historico.foreign_keys[0];
        assert!(!fk.is_id());
        let names: Vec<_> = fk.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["envio_codigo", "envio_peso"]);
    }

    #[test]
    fn test_junction_plan() {
        let mut schema = Schema::new();
        schema.entry_class("Tag");
        schema.entry_class("Post");
        schema.add_relation(Relation::new(("Tag", Any), ("Post", AtLeastOne)));

        let plan = MigrationPlan::build(&mut schema, &config());
        assert_eq!(plan.junctions.len(), 1);
        let junction = &plan.junctions[0];
        assert_eq!(junction.table, "post_tag");
        let columns: Vec<_> = junction
            .foreign_keys
            .iter()
            .map(|fk| fk.columns[0].name.as_str())
            .collect();
        assert_eq!(columns, vec!["tag_id", "post_id"]);
        assert!(plan.tables.iter().all(|t| t.foreign_keys.is_empty()));
    }

    #[test]
    fn test_cycle_produces_deferred_key() {
        let mut schema = Schema::new();
        schema.entry_class("A");
        schema.entry_class("B");
        schema.add_relation(Relation::new(("A", Any), ("B", One)));
        schema.add_relation(Relation::new(("B", Any), ("A", One)));

        let plan = MigrationPlan::build(&mut schema, &config());
        assert_eq!(plan.tables.len(), 2);
        assert_eq!(plan.deferred.len(), 1);
        assert_eq!(plan.cycles.len(), 1);
        let deferred = &plan.deferred[0];
        assert_eq!(deferred.table, "as");
        assert_eq!(deferred.columns[0].name, "b_id");
        let planned: usize = plan.tables.iter().map(|t| t.foreign_keys.len()).sum();
        assert_eq!(planned, 1);
    }

    #[test]
    fn test_unusable_fields_become_warnings() {
        let mut schema = Schema::new();
        let class = schema.entry_class("Shape");
        class.fields.push(Field::new("id", Some(Type::Int)).with(Modifiers::PRIMARY));
        class.fields.push(Field::new("outline", Some(Type::Other("polygon".into()))));
        class.fields.push(Field::new("label", None));

        let plan = MigrationPlan::build(&mut schema, &config());
        assert!(plan.tables[0].columns.is_empty());
        assert_eq!(
            plan.warnings,
            vec![
                SchemaError::UnsupportedTypeForTarget {
                    class: "Shape".into(),
                    field: "outline".into(),
                    typ: "polygon".into(),
                },
                SchemaError::UnknownFieldType {
                    class: "Shape".into(),
                    field: "label".into(),
                },
            ]
        );
    }
}
