use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "maven-stubgen")]
#[command(about = "Generate Python type stubs for Java libraries named by Maven coordinates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Local Maven repository passed to mvn as maven.repo.local.
    #[arg(long, value_name = "PATH", global = true)]
    pub m2: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub mvn: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Resolve the endpoints and write stubs (default command).
    Generate {
        #[arg(value_name = "ENDPOINT", required = true)]
        endpoints: Vec<String>,

        #[arg(long = "prefix", value_name = "PREFIX")]
        prefixes: Vec<String>,

        #[arg(short = 'o', long, value_name = "DIR", default_value = "stubs")]
        output_dir: PathBuf,

        #[arg(long)]
        convert_strings: bool,

        #[arg(long)]
        no_javadoc: bool,

        #[arg(long, overrides_with = "no_runtime_imports")]
        runtime_imports: bool,

        #[arg(long, overrides_with = "runtime_imports")]
        no_runtime_imports: bool,

        #[arg(long)]
        remove_namespace_only_stubs: bool,

        #[arg(long, value_name = "NAME", default_value = "scyjava_stubs")]
        runtime_module: String,

        #[arg(long)]
        no_format: bool,

        #[arg(long)]
        no_cache: bool,
    },
    /// Regenerate stubs for the project described by pyproject.toml.
    Build {
        #[arg(long, value_name = "DIR", default_value = ".")]
        project: PathBuf,
    },
    /// List the top-level Java packages of a jar.
    Packages {
        #[arg(value_name = "JAR")]
        jar_path: PathBuf,
    },
    Stats,
    Clear,
}
