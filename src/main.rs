use anyhow::{Context, Result};
use clap::Parser;
use maven_stubgen::cache::ModelCache;
use maven_stubgen::cli::{Cli, Commands};
use maven_stubgen::config::{clear_db, resolve_db_path, resolve_mvn};
use maven_stubgen::coordinate::Coordinate;
use maven_stubgen::generate::{GenerateOptions, build, generate_stubs};
use maven_stubgen::jar::list_top_level_packages;
use maven_stubgen::maven::Maven;
use serde::Serialize;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = parse_cli()?;

    match cli.command.clone() {
        Commands::Clear => {
            let db_path = resolve_db_path(&cli)?;
            clear_db(&db_path)?;
            print_json(&ClearResult {
                db_path: db_path.to_string_lossy().to_string(),
                cleared: true,
            })?;
        }
        Commands::Stats => {
            let cache = ModelCache::open(resolve_db_path(&cli)?)?;
            print_json(&cache.stats()?)?;
        }
        Commands::Packages { jar_path } => {
            let packages = list_top_level_packages(&jar_path)?;
            print_json(&PackagesResult {
                jar_path: jar_path.to_string_lossy().to_string(),
                packages: packages.into_iter().collect(),
            })?;
        }
        Commands::Generate {
            endpoints,
            prefixes,
            output_dir,
            convert_strings,
            no_javadoc,
            runtime_imports: _,
            no_runtime_imports,
            remove_namespace_only_stubs,
            runtime_module,
            no_format,
            no_cache,
        } => {
            let endpoints = endpoints
                .iter()
                .map(|e| e.parse::<Coordinate>().with_context(|| format!("Invalid endpoint {e:?}")))
                .collect::<Result<Vec<_>>>()?;
            let options = GenerateOptions {
                endpoints,
                prefixes,
                output_dir,
                convert_strings,
                include_javadoc: !no_javadoc,
                runtime_imports: !no_runtime_imports,
                remove_namespace_only_stubs,
                runtime_module,
                format: !no_format,
            };
            let maven = Maven::new(resolve_mvn(&cli)?, cli.m2.clone());
            let cache = open_cache(&cli, no_cache)?;
            let report = generate_stubs(&maven, cache.as_ref(), &options)?;
            print_json(&report)?;
        }
        Commands::Build { project } => {
            let maven = Maven::new(resolve_mvn(&cli)?, cli.m2.clone());
            let cache = open_cache(&cli, false)?;
            let template = GenerateOptions {
                endpoints: Vec::new(),
                prefixes: Vec::new(),
                output_dir: PathBuf::new(),
                convert_strings: true,
                include_javadoc: true,
                runtime_imports: true,
                remove_namespace_only_stubs: false,
                runtime_module: "scyjava_stubs".to_string(),
                format: true,
            };
            let report = build(&maven, cache.as_ref(), &project, &template)?;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_cache(cli: &Cli, disabled: bool) -> Result<Option<ModelCache>> {
    if disabled {
        return Ok(None);
    }
    let db_path = resolve_db_path(cli)?;
    match ModelCache::open(db_path.clone()) {
        Ok(cache) => Ok(Some(cache)),
        Err(err) => {
            tracing::warn!(db = %db_path.display(), "cache unavailable, continuing without it: {err:#}");
            Ok(None)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ClearResult {
    db_path: String,
    cleared: bool,
}

#[derive(Debug, Serialize)]
struct PackagesResult {
    jar_path: String,
    packages: Vec<String>,
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_generate(args)))
}

fn rewrite_args_for_implicit_generate(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["generate", "build", "packages", "stats", "clear", "help"];
    let valued = ["--m2", "--mvn", "--db"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if valued.contains(&a) {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "generate".to_string());
        }
    }

    args
}
