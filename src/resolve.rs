//! Foreign-key ownership and class ordering.
//!
//! A class can only be created once every class it references exists. The
//! ordering runs in passes; a pass that places no class means the remaining
//! classes reference each other, and one relation is deferred: removed from
//! the schema and handed back so it can be added once all tables exist.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::schema::{Multiplicity, Relation, RelationId, Schema};

/// Where a relation's foreign key lives, seen from one of its classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This class stores the key.
    This,
    /// The other class stores the key.
    Other,
    /// Both ends are many: a junction table stores both keys.
    Junction,
}

/// Decide which side of `relation` stores the foreign key, from `class`'s
/// point of view. `None` when `class` is not an endpoint.
///
/// The key goes on the side whose rows each reference at most one row of the
/// other side. Between two single ends, a `ZeroOrOne` end holds the key
/// pointing at the `One` end; equal ends fall back to name order.
pub fn ownership(relation: &Relation, class: &str) -> Option<Ownership> {
    let (own, other) = relation.ends(class)?;
    let (mine, theirs) = (own.multiplicity, other.multiplicity);

    if mine.is_many() && theirs.is_many() {
        return Some(Ownership::Junction);
    }
    if relation.is_self() {
        return Some(Ownership::This);
    }

    let owns = if theirs.is_many() {
        false
    } else if mine.is_many() {
        true
    } else if mine == theirs {
        own.class < other.class
    } else {
        mine == Multiplicity::ZeroOrOne
    };
    Some(if owns { Ownership::This } else { Ownership::Other })
}

/// Multiplicity of the end the foreign key points at, when `class` owns it.
/// For a self-relation this is the more restrictive end.
pub fn referenced_multiplicity(relation: &Relation, class: &str) -> Option<Multiplicity> {
    let (own, other) = relation.ends(class)?;
    if relation.is_self() {
        Some(own.multiplicity.min(other.multiplicity))
    } else {
        Some(other.multiplicity)
    }
}

/// Multiplicity of the key-holding end, when `class` owns the key.
/// For a self-relation this is the less restrictive end.
pub fn owning_multiplicity(relation: &Relation, class: &str) -> Option<Multiplicity> {
    let (own, other) = relation.ends(class)?;
    if relation.is_self() {
        Some(own.multiplicity.max(other.multiplicity))
    } else {
        Some(own.multiplicity)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassOrder {
    /// Classes in creation order.
    pub classes: Vec<String>,
    /// Relations removed from the schema to break cycles, in removal order.
    pub deferred: Vec<(RelationId, Relation)>,
    /// The unplaced classes each time a cycle was found.
    pub cycles: Vec<Vec<String>>,
    pub passes: usize,
}

#[derive(Debug)]
struct Dependency {
    id: RelationId,
    other: String,
    resolved: bool,
}

#[derive(Debug)]
struct Unplaced {
    class: String,
    dependencies: Vec<Dependency>,
}

/// Order the classes of `schema` so that every class comes after the classes
/// it holds foreign keys to. Relations deferred to break cycles are removed
/// from `schema` and returned in [`ClassOrder::deferred`].
pub fn order(schema: &mut Schema) -> ClassOrder {
    let mut unplaced: Vec<Unplaced> = schema
        .classes()
        .map(|class| Unplaced {
            class: class.name.clone(),
            dependencies: class
                .related_classes
                .iter()
                .flat_map(|(other, ids)| {
                    ids.iter().map(move |id| Dependency {
                        id: *id,
                        other: other.clone(),
                        resolved: false,
                    })
                })
                .collect(),
        })
        .collect();

    let mut result = ClassOrder::default();
    let mut previous = None;

    while !unplaced.is_empty() {
        if previous == Some(unplaced.len()) && !defer_one(schema, &unplaced, &mut result) {
            // Nothing left to defer; cannot happen while classes are unplaced.
            result.classes.extend(unplaced.drain(..).map(|u| u.class));
            break;
        }
        previous = Some(unplaced.len());
        result.passes += 1;

        let pending: HashSet<String> = unplaced.iter().map(|u| u.class.clone()).collect();
        let mut ready = Vec::new();
        for entry in &mut unplaced {
            entry.dependencies.retain(|d| schema.relation(d.id).is_some());
            let mut blocked = false;
            for dependency in entry.dependencies.iter_mut().filter(|d| !d.resolved) {
                let Some(relation) = schema.relation(dependency.id) else { continue };
                if relation.is_self()
                    || ownership(relation, &entry.class) != Some(Ownership::This)
                    || !pending.contains(&dependency.other)
                {
                    dependency.resolved = true;
                } else {
                    blocked = true;
                }
            }
            if !blocked {
                ready.push(entry.class.clone());
            }
        }

        debug!(pass = result.passes, placed = ?ready, "ordering pass");
        unplaced.retain(|u| !ready.contains(&u.class));
        result.classes.extend(ready);
    }

    result
}

/// Defer the first unresolved relation of the first unplaced class.
fn defer_one(schema: &mut Schema, unplaced: &[Unplaced], result: &mut ClassOrder) -> bool {
    let found = unplaced.iter().find_map(|entry| {
        entry
            .dependencies
            .iter()
            .find(|d| !d.resolved && schema.relation(d.id).is_some())
            .map(|d| (entry.class.clone(), d.id))
    });
    let Some((class, id)) = found else {
        return false;
    };
    let Some(relation) = schema.remove_relation(id) else {
        return false;
    };

    let cycle: Vec<String> = unplaced.iter().map(|u| u.class.clone()).collect();
    info!(
        class = %class,
        relation = %relation,
        cycle = ?cycle,
        "cycle detected, deferring foreign key"
    );
    result.cycles.push(cycle);
    result.deferred.push((id, relation));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::migration::MigrationParser;
    use crate::plan::MigrationPlan;
    use crate::schema::Multiplicity::*;
    use crate::writer::MigrationWriter;
    use pretty_assertions::assert_eq;

    fn schema(classes: &[&str], relations: &[((&str, Multiplicity), (&str, Multiplicity))]) -> Schema {
        let mut schema = Schema::new();
        for class in classes {
            schema.entry_class(class);
        }
        for (from, to) in relations {
            schema.add_relation(Relation::new(*from, *to));
        }
        schema
    }

    #[test]
    fn test_ownership_rules() {
        let many_to_one = Relation::new(("Post", Any), ("User", One));
        assert_eq!(ownership(&many_to_one, "Post"), Some(Ownership::This));
        assert_eq!(ownership(&many_to_one, "User"), Some(Ownership::Other));
        assert_eq!(ownership(&many_to_one, "Tag"), None);

        let optional = Relation::new(("Profile", ZeroOrOne), ("User", One));
        assert_eq!(ownership(&optional, "Profile"), Some(Ownership::This));

        let equal = Relation::new(("B", One), ("A", One));
        assert_eq!(ownership(&equal, "A"), Some(Ownership::This));
        assert_eq!(ownership(&equal, "B"), Some(Ownership::Other));

        let junction = Relation::new(("Post", Any), ("Tag", AtLeastOne));
        assert_eq!(ownership(&junction, "Tag"), Some(Ownership::Junction));
    }

    #[test]
    fn test_self_relation_ownership() {
        let manager = Relation::new(("Employee", Any), ("Employee", ZeroOrOne));
        assert_eq!(ownership(&manager, "Employee"), Some(Ownership::This));
        assert_eq!(referenced_multiplicity(&manager, "Employee"), Some(ZeroOrOne));
        assert_eq!(owning_multiplicity(&manager, "Employee"), Some(Any));
    }

    #[test]
    fn test_referenced_class_first() {
        let mut s = schema(&["Post", "User"], &[(("Post", Any), ("User", One))]);
        let order = order(&mut s);
        assert_eq!(order.classes, vec!["User", "Post"]);
        assert!(order.deferred.is_empty());
    }

    #[test]
    fn test_cycle_defers_one_relation() {
        let mut s = schema(
            &["A", "B"],
            &[(("A", ZeroOrOne), ("B", One)), (("B", ZeroOrOne), ("A", One))],
        );
        let before = s.relation_count();
        let order = order(&mut s);

        assert_eq!(order.classes.len(), 2);
        assert_eq!(order.deferred.len(), 1);
        assert_eq!(order.cycles, vec![vec!["A".to_string(), "B".to_string()]]);
        assert_eq!(s.relation_count() + order.deferred.len(), before);
    }

    #[test]
    fn test_three_class_cycle() {
        let mut s = schema(
            &["A", "B", "C"],
            &[
                (("A", Any), ("B", One)),
                (("B", Any), ("C", One)),
                (("C", Any), ("A", One)),
            ],
        );
        let order = order(&mut s);
        assert_eq!(order.classes.len(), 3);
        assert_eq!(order.deferred.len(), 1);
        assert_eq!(s.relation_count(), 2);
    }

    #[test]
    fn test_ordering_is_stable() {
        let mut s = schema(
            &["Comment", "Post", "User"],
            &[
                (("Comment", Any), ("Post", One)),
                (("Comment", Any), ("User", One)),
                (("Post", Any), ("User", One)),
            ],
        );
        let first = order(&mut s);
        let second = order(&mut s);
        assert_eq!(first.classes, vec!["User", "Post", "Comment"]);
        assert_eq!(first.classes, second.classes);
    }

    #[test]
    fn test_unknown_related_class_does_not_block() {
        let mut s = schema(&["Post"], &[(("Post", Any), ("User", One))]);
        assert_eq!(order(&mut s).classes, vec!["Post"]);
    }

    #[test]
    fn test_junction_and_self_relations_do_not_block() {
        let mut s = schema(
            &["Post", "Tag", "Employee"],
            &[(("Post", Any), ("Tag", Any)), (("Employee", Any), ("Employee", ZeroOrOne))],
        );
        let order = order(&mut s);
        assert_eq!(order.passes, 1);
        assert_eq!(order.classes, vec!["Post", "Tag", "Employee"]);
    }

    fn parsed(statements: &[&str]) -> Schema {
        let parser = MigrationParser::new().unwrap();
        let mut schema = Schema::new();
        for statement in statements {
            parser.parse(statement, &mut schema).unwrap();
        }
        schema
    }

    #[test]
    fn test_parsed_foreign_id_orders_referenced_table_first() {
        let mut s = parsed(&[
            "Schema::create('posts', function (Blueprint $table) {
                $table->id();
                $table->foreignId('user_id')->constrained();
            });",
            "Schema::create('users', function (Blueprint $table) {
                $table->id();
            });",
        ]);
        let order = order(&mut s);
        assert_eq!(order.classes, vec!["User", "Post"]);
        assert!(order.deferred.is_empty());
        assert!(order.cycles.is_empty());
    }

    #[test]
    fn test_parsed_mutual_foreign_ids_defer_one_key() {
        let s = parsed(&[
            "Schema::create('as', function (Blueprint $table) {
                $table->id();
                $table->foreignId('b_id')->constrained();
            });",
            "Schema::create('bs', function (Blueprint $table) {
                $table->id();
                $table->foreignId('a_id')->constrained();
            });",
        ]);

        let mut ordered = s.clone();
        let order = order(&mut ordered);
        assert_eq!(order.deferred.len(), 1);
        assert_eq!(order.classes.len(), 2);
        assert!(order.classes.contains(&"A".to_string()));
        assert!(order.classes.contains(&"B".to_string()));

        let config = GeneratorConfig::default();
        let mut planned = s.clone();
        let plan = MigrationPlan::build(&mut planned, &config);
        let files = MigrationWriter::new(&config).write(&plan);
        let added: Vec<_> = files
            .iter()
            .filter(|f| f.name.contains("_foreign_key_to_"))
            .collect();
        assert_eq!(files.len(), 3);
        assert_eq!(added.len(), 1);
    }
}
