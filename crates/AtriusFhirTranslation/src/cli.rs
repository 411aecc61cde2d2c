//! # FHIR Translation CLI
//!
//! Runs a converter or transformer schema against a bundle.
//!
//! ```text
//! atrius-translate convert   --schemas <DIR> --schema <NAME> [--bundle <FILE>] [--options <FILE>] [--strict] [-o <FILE>]
//! atrius-translate transform --schemas <DIR> --schema <NAME> [--bundle <FILE>] [-o <FILE>]
//! ```
//!
//! The bundle is read from stdin when `--bundle` is not given. Converted messages are
//! written with `\n` between segments so they are readable in a terminal; pass
//! `--raw` to keep the `\r` terminators. Set `RUST_LOG=debug` to see each element
//! as it is processed.

use atrius_fhir_translation::{
    ConverterOptions, FhirToHl7Converter, FhirTransformer, SchemaLoader,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "atrius-translate")]
#[command(about = "Convert FHIR bundles to HL7 v2 or transform them in place using schemas")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an HL7 v2 message from a FHIR bundle
    Convert {
        #[command(flatten)]
        input: Input,

        /// Converter options file (JSON or YAML)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Fail on the first field that cannot be written
        #[arg(long)]
        strict: bool,

        /// Keep `\r` segment terminators in the output
        #[arg(long)]
        raw: bool,
    },
    /// Apply a transform schema to a FHIR bundle
    Transform {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(clap::Args, Debug)]
struct Input {
    /// Folder holding the schema files
    #[arg(long, env = "ATRIUS_SCHEMA_DIR")]
    schemas: PathBuf,

    /// Schema name, relative to the schema folder and without extension
    #[arg(long, short = 's')]
    schema: String,

    /// FHIR Bundle JSON file (or use stdin if not provided)
    #[arg(long, short = 'b')]
    bundle: Option<PathBuf>,

    /// Output file path (defaults to stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn read_bundle(path: Option<&Path>) -> Result<Value, Box<dyn std::error::Error>> {
    let text = match path {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&text)?)
}

fn read_options(path: &Path) -> Result<ConverterOptions, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(serde_yaml::from_str(&text)?)
    }
}

fn write_output(path: Option<&Path>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(path) => fs::write(path, content)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Convert {
            input,
            options,
            strict,
            raw,
        } => {
            let schema = SchemaLoader::new(&input.schemas).load_converter_schema(&input.schema)?;
            let mut converter_options = match &options {
                Some(path) => read_options(path)?,
                None => ConverterOptions::default(),
            };
            converter_options.strict |= strict;

            let bundle = read_bundle(input.bundle.as_deref())?;
            let message = FhirToHl7Converter::new(schema)
                .with_options(converter_options)
                .convert_shared(Arc::new(bundle))?;
            let encoded = message.encode();
            let encoded = if raw { encoded } else { encoded.replace('\r', "\n") };
            write_output(input.output.as_deref(), &encoded)
        }
        Command::Transform { input } => {
            let schema = SchemaLoader::new(&input.schemas).load_transformer_schema(&input.schema)?;
            let bundle = read_bundle(input.bundle.as_deref())?;
            let bundle = FhirTransformer::new(schema).transform_owned(bundle)?;
            write_output(input.output.as_deref(), &serde_json::to_string_pretty(&bundle)?)
        }
    }
}
