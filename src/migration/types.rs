//! Laravel column types to schema types and back.

use crate::schema::Type;

/// Map a typed-column method (`string`, `bigInteger`, ...) to a schema type.
/// Returns `None` for words that are not column types.
pub fn column_type(method: &str) -> Option<Type> {
    let typ = match method {
        // Strings
        "string" | "char" | "text" | "tinyText" | "mediumText" | "longText" | "ipAddress"
        | "macAddress" => Type::String,

        // Integers
        "integer" | "tinyInteger" | "smallInteger" | "mediumInteger" | "unsignedInteger"
        | "unsignedTinyInteger" | "unsignedSmallInteger" | "unsignedMediumInteger"
        | "increments" | "tinyIncrements" | "smallIncrements" | "mediumIncrements" | "year" => {
            Type::Int
        }
        "bigInteger" | "unsignedBigInteger" | "bigIncrements" => Type::BigInt,

        // Floating point
        "float" => Type::Float,
        "double" | "decimal" | "unsignedDecimal" => Type::Double,

        "boolean" => Type::Bool,

        // Date/time
        "date" => Type::Date,
        "dateTime" | "dateTimeTz" | "timestamp" | "timestampTz" => Type::DateTime,

        // Recognized, but without a portable meaning
        "binary" | "enum" | "geometry" | "geometryCollection" | "json" | "jsonb"
        | "lineString" | "morphs" | "multiLineString" | "multiPoint" | "multiPolygon"
        | "nullableMorphs" | "nullableUlidMorphs" | "nullableUuidMorphs" | "point"
        | "polygon" | "set" | "time" | "timeTz" | "ulid" | "ulidMorphs" | "uuid"
        | "uuidMorphs" => Type::Other(method.to_string()),

        _ => return None,
    };
    Some(typ)
}

/// The column method that declares a field of this type. `Other` types have
/// no portable column and yield `None`.
pub fn column_method(typ: &Type) -> Option<&'static str> {
    match typ {
        Type::String => Some("string"),
        Type::Int => Some("integer"),
        Type::BigInt => Some("bigInteger"),
        Type::Float => Some("float"),
        Type::Double => Some("double"),
        Type::Bool => Some("boolean"),
        Type::Date => Some("date"),
        Type::DateTime => Some("dateTime"),
        Type::Other(_) => None,
    }
}
