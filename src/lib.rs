pub mod automaton;
pub mod config;
pub mod diagram;
pub mod error;
pub mod migration;
pub mod naming;
pub mod plan;
pub mod resolve;
pub mod schema;
pub mod writer;

use tracing::debug;
use wasm_bindgen::prelude::*;

use config::{GeneratorConfig, ImportConfig};
use error::Error;
use migration::{definition, MigrationParser};
use plan::MigrationPlan;
use schema::Schema;
use writer::{GeneratedFile, MigrationWriter, ModelWriter};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Build a schema from `(file name, contents)` pairs, applied in the given
/// order. Stock framework migrations are skipped per `config`.
pub fn import_migrations<'a>(
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
    config: &ImportConfig,
) -> Result<Schema, Error> {
    let parser = MigrationParser::new()?;
    let mut schema = Schema::new();
    for (file, contents) in files {
        if config.skips(file) {
            debug!(file, "default migration skipped");
            continue;
        }
        let Some(statement) = definition(contents) else {
            debug!(file, "no schema statement");
            continue;
        };
        parser
            .parse(statement, &mut schema)
            .map_err(|source| Error::Migration {
                file: file.to_string(),
                source,
            })?;
    }
    Ok(schema)
}

/// Output of one diagram-to-migrations run.
#[derive(Debug, Clone)]
pub struct Generated {
    pub plan: MigrationPlan,
    pub migrations: Vec<GeneratedFile>,
    pub models: Vec<GeneratedFile>,
}

/// Plan and render migrations and models for `schema`. The schema itself is
/// left intact; relations deferred to break cycles are listed in the plan.
pub fn generate(schema: &Schema, config: &GeneratorConfig) -> Generated {
    let mut ordered = schema.clone();
    let plan = MigrationPlan::build(&mut ordered, config);
    let migrations = MigrationWriter::new(config).write(&plan);
    let models = ModelWriter::new(config).write(schema, &plan);
    Generated {
        plan,
        migrations,
        models,
    }
}

/// Migration sources, in order, to diagram text
#[wasm_bindgen(js_name = "migrationsToDiagram")]
pub fn migrations_to_diagram(sources: js_sys::Array) -> Result<String, String> {
    let sources: Vec<String> = sources.iter().filter_map(|v| v.as_string()).collect();
    let schema =
        migration::parse_migrations(sources.iter().map(String::as_str)).map_err(|e| e.to_string())?;
    Ok(diagram::serialize(&schema))
}

/// Diagram text to migration files, concatenated with a name comment each
#[wasm_bindgen(js_name = "diagramToMigrations")]
pub fn diagram_to_migrations(source: &str, composite_keys: Option<bool>) -> Result<String, String> {
    let schema = diagram::parse(source).map_err(|e| e.to_string())?;
    let config = GeneratorConfig {
        composite_keys: composite_keys.unwrap_or(false),
        ..Default::default()
    };
    let generated = generate(&schema, &config);

    let mut output = String::new();
    for file in &generated.migrations {
        output.push_str("// ");
        output.push_str(&file.name);
        output.push('\n');
        output.push_str(&file.contents);
        output.push('\n');
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Multiplicity::*;
    use pretty_assertions::assert_eq;

    const USERS: &str = "<?php
return new class extends Migration
{
    public function up(): void
    {
        Schema::create('users', function (Blueprint $table) {
            $table->id();
            $table->string('email')->unique();
            $table->timestamps();
        });
    }
};";

    const POSTS: &str = "<?php
return new class extends Migration
{
    public function up(): void
    {
        Schema::create('posts', function (Blueprint $table) {
            $table->id();
            $table->string('title');
            $table->foreignId('user_id')->constrained()->cascadeOnDelete();
        });
    }
};";

    #[test]
    fn test_import_skips_default_migrations() {
        let files = [
            ("2014_10_12_000000_create_users_table.php", USERS),
            ("2024_01_01_000000_create_posts_table.php", POSTS),
        ];
        let schema = import_migrations(files, &ImportConfig::default()).unwrap();
        // The relation to User survives without the class itself.
        assert_eq!(schema.class_count(), 1);
        assert!(schema.contains_class("Post"));
        assert_eq!(schema.relation_count(), 1);

        let all = ImportConfig {
            skip_default_migrations: false,
        };
        let schema = import_migrations(files, &all).unwrap();
        assert!(schema.class("User").unwrap().field("email").unwrap().unique);
    }

    #[test]
    fn test_import_error_names_file() {
        let broken = "Schema::create('posts', function (Blueprint $table) { $table->string('title') });";
        let err = import_migrations([("broken.php", broken)], &ImportConfig::default()).unwrap_err();
        match err {
            Error::Migration { file, .. } => assert_eq!(file, "broken.php"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_migrations_to_diagram_and_back() {
        let files = [("a.php", USERS), ("b.php", POSTS)];
        let schema = import_migrations(files, &ImportConfig::default()).unwrap();
        let text = diagram::serialize(&schema);
        assert!(text.contains("Post \"*\" -- \"1\" User"));

        let diagram = diagram::parse(&text).unwrap();
        assert_eq!(diagram, schema);

        let generated = generate(&diagram, &GeneratorConfig::default());
        let names: Vec<_> = generated.migrations.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "0000_00_00_000000_1_create_users_table.php",
                "0000_00_00_000000_2_create_posts_table.php",
            ]
        );
        let models: Vec<_> = generated.models.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(models, vec!["User.php", "Post.php"]);

        let contents: Vec<_> = generated
            .migrations
            .iter()
            .map(|f| (f.name.as_str(), f.contents.as_str()))
            .collect();
        let reparsed = import_migrations(contents, &ImportConfig::default()).unwrap();
        assert_eq!(reparsed, schema);
    }

    #[test]
    fn test_generate_keeps_deferred_relations_in_schema() {
        let mut schema = Schema::new();
        schema.entry_class("A");
        schema.entry_class("B");
        schema.add_relation(schema::Relation::new(("A", Any), ("B", One)));
        schema.add_relation(schema::Relation::new(("B", Any), ("A", One)));

        let generated = generate(&schema, &GeneratorConfig::default());
        assert_eq!(schema.relation_count(), 2);
        assert_eq!(generated.plan.deferred.len(), 1);
        assert_eq!(generated.migrations.len(), 3);
    }
}
