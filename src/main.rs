use anyhow::{bail, Result};
use std::path::PathBuf;

use garment_lens::attributes::{AttributeCategory, AttributeClassifier};
use garment_lens::config::Config;
use garment_lens::embedding::ImageRef;
use garment_lens::logging::{self, LogOptions};

struct Args {
    config_path: Option<PathBuf>,
    categories: Vec<&'static AttributeCategory>,
    image: String,
    verbose: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut categories = Vec::new();
    let mut image = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("garment-lens {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--verbose" | "-v" => verbose = true,
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    bail!("--config requires a path argument");
                }
            }
            "--category" | "-a" => {
                if i + 1 < args.len() {
                    match AttributeCategory::by_id(&args[i + 1]) {
                        Some(category) => categories.push(category),
                        None => bail!("Unknown category: {}", args[i + 1]),
                    }
                    i += 1;
                } else {
                    bail!("--category requires a category name");
                }
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                bail!("Unknown argument: {}", arg);
            }
            arg => {
                if image.is_some() {
                    bail!("Only one image may be given");
                }
                image = Some(arg.to_string());
            }
        }
        i += 1;
    }

    let Some(image) = image else {
        bail!("Missing IMAGE argument");
    };

    if categories.is_empty() {
        categories.extend_from_slice(AttributeCategory::builtin());
    }

    Ok(Args {
        config_path,
        categories,
        image,
        verbose,
    })
}

fn print_help() {
    println!(
        r#"garment-lens - infer garment fit and pattern from an image

USAGE:
    garment-lens [OPTIONS] IMAGE

IMAGE may be an http(s) URL, a data: URI, or a local image file.

OPTIONS:
    --config, -c PATH       Path to config file
    --category, -a NAME     Attribute to classify (fit, pattern); repeatable
    --verbose, -v           Also log to stderr, at debug level
    --version, -V           Show version
    --help, -h              Show this help message

ENVIRONMENT:
    GARMENT_LENS_CONFIG     Path to config file (overrides default location)
    GARMENT_LENS_LOG        Log level (trace, debug, info, warn, error)
    REPLICATE_API_TOKEN     API token for the embedding service

Config file location: $XDG_CONFIG_HOME/garment-lens/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Uses journald on Linux, file fallback otherwise
    let _ = logging::init(LogOptions {
        log_dir: Some(Config::config_dir().join("logs")),
        verbose: args.verbose,
    });

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let image = ImageRef::parse(&args.image, config.image.max_dimension)?;
    let classifier = AttributeClassifier::from_config(&config.embedding);

    tracing::info!(
        image = %image,
        provider = classifier.provider_name(),
        categories = args.categories.len(),
        "Classifying image"
    );

    let report = classifier.classify_all(&args.categories, &image);
    if report.is_degraded() {
        tracing::warn!(image = %image, "Some attributes fell back to defaults");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
