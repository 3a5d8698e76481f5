//! Serializer for converting a schema to diagram notation.

use crate::schema::{Field, Multiplicity, Schema};

/// Serialize a schema: classes in schema order, then relations in id order.
pub fn serialize(schema: &Schema) -> String {
    let mut output = String::from("@startuml\n");

    for class in schema.classes() {
        output.push('\n');
        output.push_str("class ");
        output.push_str(&class.name);
        output.push_str(" {\n");
        for field in &class.fields {
            serialize_field(&mut output, field);
        }
        output.push_str("}\n");
    }

    if schema.relation_count() > 0 {
        output.push('\n');
        for (_, relation) in schema.relations() {
            output.push_str(&format!(
                "{} \"{}\" -- \"{}\" {}\n",
                relation.from.class,
                multiplicity(relation.from.multiplicity),
                multiplicity(relation.to.multiplicity),
                relation.to.class,
            ));
        }
    }

    output.push_str("\n@enduml\n");
    output
}

fn serialize_field(output: &mut String, field: &Field) {
    output.push_str("    ");
    output.push_str(&field.name);
    if let Some(typ) = &field.typ {
        output.push_str(" : ");
        output.push_str(typ.name());
    }

    let mut modifiers = Vec::new();
    if field.primary {
        modifiers.push("pk");
    }
    if field.unique {
        modifiers.push("unique");
    }
    if field.nullable {
        modifiers.push("nullable");
    }
    if !modifiers.is_empty() {
        output.push_str(" {");
        output.push_str(&modifiers.join(", "));
        output.push('}');
    }
    output.push('\n');
}

fn multiplicity(multiplicity: Multiplicity) -> &'static str {
    match multiplicity {
        Multiplicity::One => "1",
        Multiplicity::ZeroOrOne => "0..1",
        Multiplicity::Any => "*",
        Multiplicity::AtLeastOne => "1..*",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::parse;
    use crate::schema::{Modifiers, Multiplicity::*, Relation, Type};
    use pretty_assertions::assert_eq;

    fn blog() -> Schema {
        let mut schema = Schema::new();
        let user = schema.entry_class("User");
        user.fields.push(Field::new("id", Some(Type::Int)).with(Modifiers::PRIMARY));
        user.fields.push(Field::new("email", Some(Type::String)).with(Modifiers::UNIQUE));
        user.fields.push(Field::new("bio", None).with(Modifiers::NULLABLE));
        schema.entry_class("Post");
        schema.add_relation(Relation::new(("User", One), ("Post", Any)));
        schema
    }

    #[test]
    fn test_serialize() {
        let expected = r#"@startuml

class User {
    id : int {pk}
    email : string {unique}
    bio {nullable}
}

class Post {
}

User "1" -- "*" Post

@enduml
"#;
        assert_eq!(serialize(&blog()), expected);
    }

    #[test]
    fn test_parse_serialized() {
        let schema = blog();
        assert_eq!(parse(&serialize(&schema)).unwrap(), schema);
    }

    #[test]
    fn test_serialize_empty() {
        assert_eq!(serialize(&Schema::new()), "@startuml\n\n@enduml\n");
    }
}
