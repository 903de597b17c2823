// shpbridge command line tool
//
// `write` turns a JSON feature file into a shapefile set, `read` prints the
// records of a set as JSON lines.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use shpbridge::io::{
    managed_records, DeleterRegistration, Feature, FeatureSource, KeyMatcher, ShapeFilesDeleter,
    ShapefileWriter, DEFAULT_KEY_PATTERN,
};
use shpbridge::{ShapeType, ShpOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON options file; missing keys take their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a JSON feature file as a shapefile set
    Write {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// POINT, POLYLINEZ, POLYGON, ...
        #[arg(short, long, default_value = "POLYLINEZ")]
        shape_type: String,

        /// Regex selecting attribute keys; the `name` group is the field name
        #[arg(short, long, default_value = DEFAULT_KEY_PATTERN)]
        key_pattern: String,

        /// Pick a new name instead of overwriting an existing file
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Print the records of a shapefile set as JSON lines
    Read {
        #[arg(short, long)]
        input: PathBuf,

        /// Delete the set once every record has been printed
        #[arg(long)]
        delete_after_read: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => ShpOptions::load(path)?,
        None => ShpOptions::default(),
    };

    match args.command {
        Command::Write { input, output, shape_type, key_pattern, no_overwrite } => {
            if no_overwrite {
                options.filename.overwrite_shp = false;
            }
            write(&options, &input, &output, &shape_type, &key_pattern)
        }
        Command::Read { input, delete_after_read } => read(&options, &input, delete_after_read),
    }
}

fn write(
    options: &ShpOptions,
    input: &Path,
    output: &Path,
    shape_type: &str,
    key_pattern: &str,
) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let features: Vec<Feature> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?;
    let shape_type: ShapeType = shape_type.parse()?;

    let writer = ShapefileWriter::with_config(options)?;
    let matcher = KeyMatcher::new(key_pattern)?;
    let outcome = writer.write(&features, output, shape_type, &FeatureSource::new(shape_type), &matcher)?;

    info!(
        "{} features written to {} ({} fields)",
        outcome.records.len(),
        outcome.path.display(),
        outcome.schema.len()
    );
    println!("{}", outcome.path.display());
    Ok(())
}

fn read(options: &ShpOptions, input: &Path, delete_after_read: bool) -> Result<()> {
    let registration = DeleterRegistration::new();
    let mut deletion = options.deletion();
    if delete_after_read {
        registration.register(ShapeFilesDeleter::new(input));
        deletion.del_after_read = true;
        deletion.overwrite_shp = false;
    }

    let records = managed_records(input, &options.read, &deletion, &registration)?;
    for record in records {
        let line: serde_json::Map<String, serde_json::Value> =
            record?.iter().map(|(name, value)| (name.clone(), value.to_json())).collect();
        println!("{}", serde_json::Value::Object(line));
    }
    Ok(())
}
