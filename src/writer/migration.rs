use crate::config::GeneratorConfig;
use crate::migration::types;
use crate::naming;
use crate::plan::{ForeignKeyPlan, JunctionPlan, MigrationPlan, TablePlan};

use super::{line, quoted_list, GeneratedFile};

const HEADER: &str = "<?php

use Illuminate\\Database\\Migrations\\Migration;
use Illuminate\\Database\\Schema\\Blueprint;
use Illuminate\\Support\\Facades\\Schema;

return new class extends Migration
{
";

/// Renders one migration per planned table, then one per junction table,
/// then one per deferred foreign key. Files are numbered in that order.
pub struct MigrationWriter<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> MigrationWriter<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn write(&self, plan: &MigrationPlan) -> Vec<GeneratedFile> {
        let mut files = Vec::new();
        let mut index = 1;
        for table in &plan.tables {
            files.push(self.create_table(table, index));
            index += 1;
        }
        for junction in &plan.junctions {
            files.push(self.create_junction(junction, index));
            index += 1;
        }
        for fk in &plan.deferred {
            files.push(self.add_foreign_key(fk, index));
            index += 1;
        }
        files
    }

    fn file_name(&self, index: usize, action: &str) -> String {
        format!("{}_{index}_{action}.php", self.config.migration_prefix)
    }

    fn create_table(&self, table: &TablePlan, index: usize) -> GeneratedFile {
        let mut body = Vec::new();
        if table.uses_id {
            body.push("$table->id();".to_string());
        }
        if self.config.timestamps {
            body.push("$table->timestamps();".to_string());
        }
        for column in &table.columns {
            let mut s = format!("$table->{}('{}')", column.method, column.name);
            if column.nullable {
                s.push_str("->nullable()");
            }
            if column.unique {
                s.push_str("->unique()");
            }
            s.push(';');
            body.push(s);
        }

        if !table.uses_id {
            let keys: Vec<String> = table.keys.iter().map(|k| k.name.clone()).collect();
            match keys.as_slice() {
                [key] => body.push(format!("$table->primary('{key}');")),
                _ => body.push(format!("$table->primary({});", quoted_list(&keys))),
            }
        }

        for fk in &table.foreign_keys {
            body.extend(foreign_key_lines(fk));
        }

        GeneratedFile {
            name: self.file_name(index, &format!("create_{}_table", table.table)),
            contents: create_migration(&table.table, &body),
        }
    }

    fn create_junction(&self, junction: &JunctionPlan, index: usize) -> GeneratedFile {
        let mut body = vec!["$table->id();".to_string()];
        if self.config.timestamps {
            body.push("$table->timestamps();".to_string());
        }
        for fk in &junction.foreign_keys {
            body.extend(foreign_key_lines(fk));
        }
        GeneratedFile {
            name: self.file_name(index, &format!("create_{}_table", junction.table)),
            contents: create_migration(&junction.table, &body),
        }
    }

    fn add_foreign_key(&self, fk: &ForeignKeyPlan, index: usize) -> GeneratedFile {
        let columns: Vec<String> = fk.columns.iter().map(|c| c.name.clone()).collect();
        let mut down = vec![format!("$table->dropForeign({});", quoted_list(&columns))];
        for column in &columns {
            down.push(format!("$table->dropColumn('{column}');"));
        }

        let mut contents = String::from(HEADER);
        method(&mut contents, "up", &table_block(&fk.table, &foreign_key_lines(fk)));
        contents.push('\n');
        method(&mut contents, "down", &table_block(&fk.table, &down));
        contents.push_str("};\n");

        GeneratedFile {
            name: self.file_name(
                index,
                &format!("add_{}_foreign_key_to_{}_table", fk.on, fk.table),
            ),
            contents,
        }
    }
}

fn create_migration(table: &str, body: &[String]) -> String {
    let mut up = vec![format!("Schema::create('{table}', function (Blueprint $table) {{")];
    up.extend(body.iter().map(|l| format!("    {l}")));
    up.push("});".to_string());

    let mut contents = String::from(HEADER);
    method(&mut contents, "up", &up);
    contents.push('\n');
    method(&mut contents, "down", &[format!("Schema::dropIfExists('{table}');")]);
    contents.push_str("};\n");
    contents
}

fn table_block(table: &str, body: &[String]) -> Vec<String> {
    let mut lines = vec![format!("Schema::table('{table}', function (Blueprint $table) {{")];
    lines.extend(body.iter().map(|l| format!("    {l}")));
    lines.push("});".to_string());
    lines
}

fn method(out: &mut String, name: &str, body: &[String]) {
    line(out, 1, &format!("public function {name}(): void"));
    line(out, 1, "{");
    for l in body {
        line(out, 2, l);
    }
    line(out, 1, "}");
}

/// Column and constraint lines for one foreign key. Chained calls stay in
/// the forms the migration parser reads back.
fn foreign_key_lines(fk: &ForeignKeyPlan) -> Vec<String> {
    let flags = |s: &mut String, unique: bool| {
        if fk.nullable {
            s.push_str("->nullable()");
        }
        if unique {
            s.push_str("->unique()");
        }
    };

    if fk.is_id() {
        let column = &fk.columns[0].name;
        let mut s = format!("$table->foreignId('{column}')");
        flags(&mut s, fk.unique);
        if naming::related_class(column) == fk.related {
            s.push_str(&format!("->constrained('{}');", fk.on));
        } else {
            s.push_str(&format!("->references('id')->on('{}');", fk.on));
        }
        return vec![s];
    }

    let single = fk.columns.len() == 1;
    let mut lines = Vec::new();
    for column in &fk.columns {
        let method = column
            .typ
            .as_ref()
            .and_then(types::column_method)
            .unwrap_or("unsignedBigInteger");
        let mut s = format!("$table->{method}('{}')", column.name);
        flags(&mut s, fk.unique && single);
        s.push(';');
        lines.push(s);
    }

    let names: Vec<String> = fk.columns.iter().map(|c| c.name.clone()).collect();
    let references: Vec<String> = fk.columns.iter().map(|c| c.references.clone()).collect();
    if fk.unique && !single {
        lines.push(format!("$table->unique({});", quoted_list(&names)));
    }
    if single {
        lines.push(format!(
            "$table->foreign('{}')->references('{}')->on('{}');",
            names[0], references[0], fk.on
        ));
    } else {
        lines.push(format!(
            "$table->foreign({})->references({})->on('{}');",
            quoted_list(&names),
            quoted_list(&references),
            fk.on
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{definition, parse_migrations};
    use crate::schema::{Field, Modifiers, Multiplicity::*, Relation, Schema, Type};
    use pretty_assertions::assert_eq;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            migration_prefix: "2024_01_01_000000".to_string(),
            ..Default::default()
        }
    }

    fn blog() -> Schema {
        let mut schema = Schema::new();
        let user = schema.entry_class("User");
        user.fields.push(Field::new("id", Some(Type::Int)).with(Modifiers::PRIMARY));
        user.fields.push(Field::new("email", Some(Type::String)).with(Modifiers::UNIQUE));
        let post = schema.entry_class("Post");
        post.fields.push(Field::new("id", Some(Type::Int)).with(Modifiers::PRIMARY));
        post.fields.push(Field::new("title", Some(Type::String)));
        post.fields.push(Field::new("summary", Some(Type::String)).with(Modifiers::NULLABLE));
        schema.add_relation(Relation::new(("Post", Any), ("User", One)));
        schema
    }

    #[test]
    fn test_create_table_migration() {
        let config = config();
        let mut schema = blog();
        let plan = MigrationPlan::build(&mut schema, &config);
        let files = MigrationWriter::new(&config).write(&plan);

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "2024_01_01_000000_1_create_users_table.php");
        assert_eq!(files[1].name, "2024_01_01_000000_2_create_posts_table.php");

        let expected = "<?php

use Illuminate\\Database\\Migrations\\Migration;
use Illuminate\\Database\\Schema\\Blueprint;
use Illuminate\\Support\\Facades\\Schema;

return new class extends Migration
{
    public function up(): void
    {
        Schema::create('posts', function (Blueprint $table) {
            $table->id();
            $table->timestamps();
            $table->string('title');
            $table->string('summary')->nullable();
            $table->foreignId('user_id')->constrained('users');
        });
    }

    public function down(): void
    {
        Schema::dropIfExists('posts');
    }
};
";
        assert_eq!(files[1].contents, expected);
    }

    #[test]
    fn test_generated_migrations_parse_back() {
        let config = config();
        let mut schema = blog();
        let plan = MigrationPlan::build(&mut schema, &config);
        let files = MigrationWriter::new(&config).write(&plan);

        let reparsed = parse_migrations(files.iter().map(|f| f.contents.as_str())).unwrap();
        let post = reparsed.class("Post").unwrap();
        assert!(post.field("summary").unwrap().nullable);
        assert!(reparsed.class("User").unwrap().field("email").unwrap().unique);
        let (_, relation) = reparsed.relations().next().unwrap();
        assert_eq!(relation.from.class, "Post");
        assert_eq!(relation.from.multiplicity, Any);
        assert_eq!(relation.to.multiplicity, One);
    }

    #[test]
    fn test_composite_keys_and_references() {
        let config = GeneratorConfig {
            composite_keys: true,
            timestamps: false,
            ..config()
        };
        let mut schema = Schema::new();
        let envio = schema.entry_class("Envio");
        envio.fields.push(Field::new("codigo", Some(Type::String)).with(Modifiers::PRIMARY));
        envio.fields.push(Field::new("peso", Some(Type::Float)).with(Modifiers::PRIMARY));
        schema.entry_class("Historico");
        schema.add_relation(Relation::new(("Historico", Any), ("Envio", ZeroOrOne)));

        let plan = MigrationPlan::build(&mut schema, &config);
        let files = MigrationWriter::new(&config).write(&plan);
        let envios = definition(&files[0].contents).unwrap();
        assert!(envios.contains("$table->primary(['codigo', 'peso']);"));
        assert!(!envios.contains("$table->id();"));

        let historicos = definition(&files[1].contents).unwrap();
        assert!(historicos.contains("$table->string('envio_codigo')->nullable();"));
        assert!(historicos.contains("$table->float('envio_peso')->nullable();"));
        assert!(historicos.contains(
            "$table->foreign(['envio_codigo', 'envio_peso'])->references(['codigo', 'peso'])->on('envios');"
        ));
    }

    #[test]
    fn test_junction_and_deferred_files() {
        let config = config();
        let mut schema = Schema::new();
        schema.entry_class("A");
        schema.entry_class("B");
        schema.entry_class("Tag");
        schema.add_relation(Relation::new(("A", Any), ("B", One)));
        schema.add_relation(Relation::new(("B", Any), ("A", One)));
        schema.add_relation(Relation::new(("A", Any), ("Tag", Any)));

        let plan = MigrationPlan::build(&mut schema, &config);
        let files = MigrationWriter::new(&config).write(&plan);
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "2024_01_01_000000_1_create_tags_table.php",
                "2024_01_01_000000_2_create_as_table.php",
                "2024_01_01_000000_3_create_bs_table.php",
                "2024_01_01_000000_4_create_a_tag_table.php",
                "2024_01_01_000000_5_add_bs_foreign_key_to_as_table.php",
            ]
        );

        let add = &files[4].contents;
        assert!(add.contains("Schema::table('as', function (Blueprint $table) {"));
        assert!(add.contains("$table->foreignId('b_id')->constrained('bs');"));
        assert!(add.contains("$table->dropForeign(['b_id']);"));

        // Every generated file reads back; the junction folds into a relation.
        let reparsed = parse_migrations(files.iter().map(|f| f.contents.as_str())).unwrap();
        assert_eq!(reparsed.class_count(), 3);
        assert_eq!(reparsed.relation_count(), 3);
    }
}
