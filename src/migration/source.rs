//! Locating the schema statement inside a migration file.

/// The first `Schema::create`, `Schema::table` or `Schema::drop…` statement
/// of a migration file, which is the one in `up()`. Other facade calls such
/// as `Schema::disableForeignKeyConstraints()` are skipped. `Schema::drop…`
/// ends at its `;`, anything else at the closing `});` of its closure.
pub fn definition(source: &str) -> Option<&str> {
    let (start, _) = source.match_indices("Schema::").find(|(i, _)| {
        let call = &source[i + "Schema::".len()..];
        ["create(", "table(", "drop"].iter().any(|c| call.starts_with(c))
    })?;
    let rest = &source[start..];
    let end = if rest.starts_with("Schema::drop") {
        rest.find(';')? + 1
    } else {
        rest.find("});")? + 3
    };
    Some(&rest[..end])
}
