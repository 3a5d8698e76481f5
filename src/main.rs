use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use migruml::config::{GeneratorConfig, ImportConfig};
use migruml::error::Error;
use migruml::writer::GeneratedFile;
use migruml::{diagram, generate, import_migrations};

#[derive(Parser)]
#[command(name = "migruml", version, about = "Laravel migrations to class diagrams and back")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read a migrations directory and write a class diagram
    ToDiagram {
        /// Diagram file to write
        output: PathBuf,
        /// Directory holding the migration files
        #[arg(long, env = "MIGRUML_MIGRATIONS", default_value = "database/migrations")]
        path: PathBuf,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
        /// Also read the migrations a fresh Laravel application ships with
        #[arg(long)]
        include_default_migrations: bool,
    },
    /// Read a class diagram and write migrations and models
    FromDiagram {
        /// Diagram file to read
        input: PathBuf,
        #[arg(long, env = "MIGRUML_MIGRATIONS", default_value = "database/migrations")]
        path_migrations: PathBuf,
        #[arg(long, env = "MIGRUML_MODELS", default_value = "app/Models")]
        path_models: PathBuf,
        #[arg(long)]
        no_migrations: bool,
        #[arg(long)]
        no_models: bool,
        /// Keep multi-field primary keys instead of adding an `id` column
        #[arg(long)]
        composite_keys: bool,
        #[arg(long)]
        no_timestamps: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("migruml=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if let Error::Migration { source, .. } | Error::Parse(source) = &e {
                if let Some(caret) = source.caret() {
                    eprintln!("{caret}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Error> {
    match command {
        Command::ToDiagram {
            output,
            path,
            force,
            include_default_migrations,
        } => {
            if output.exists() && !force {
                return Err(Error::Exists(output));
            }
            let config = ImportConfig {
                skip_default_migrations: !include_default_migrations,
            };
            to_diagram(&path, &output, &config)
        }
        Command::FromDiagram {
            input,
            path_migrations,
            path_models,
            no_migrations,
            no_models,
            composite_keys,
            no_timestamps,
        } => {
            let config = GeneratorConfig {
                composite_keys,
                timestamps: !no_timestamps,
                migration_prefix: chrono::Local::now().format("%Y_%m_%d_%H%M%S").to_string(),
            };
            let migrations = (!no_migrations).then_some(path_migrations.as_path());
            let models = (!no_models).then_some(path_models.as_path());
            from_diagram(&input, migrations, models, &config)
        }
    }
}

fn to_diagram(dir: &Path, output: &Path, config: &ImportConfig) -> Result<(), Error> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(Error::io(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "php"))
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let contents = fs::read_to_string(path).map_err(Error::io(path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push((name, contents));
    }

    let schema = import_migrations(
        files.iter().map(|(name, contents)| (name.as_str(), contents.as_str())),
        config,
    )?;
    fs::write(output, diagram::serialize(&schema)).map_err(Error::io(output))?;
    info!(
        classes = schema.class_count(),
        relations = schema.relation_count(),
        output = %output.display(),
        "diagram written"
    );
    Ok(())
}

fn from_diagram(
    input: &Path,
    migrations: Option<&Path>,
    models: Option<&Path>,
    config: &GeneratorConfig,
) -> Result<(), Error> {
    let source = fs::read_to_string(input).map_err(Error::io(input))?;
    let schema = diagram::parse(&source)?;
    let generated = generate(&schema, config);

    for cycle in &generated.plan.cycles {
        info!(classes = ?cycle, "cycle broken by a separate foreign key migration");
    }
    if let Some(dir) = migrations {
        write_files(dir, &generated.migrations)?;
    }
    if let Some(dir) = models {
        write_files(dir, &generated.models)?;
    }
    Ok(())
}

fn write_files(dir: &Path, files: &[GeneratedFile]) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(Error::io(dir))?;
    for file in files {
        let path = dir.join(&file.name);
        fs::write(&path, &file.contents).map_err(Error::io(&path))?;
        info!(path = %path.display(), "written");
    }
    Ok(())
}
