use clap::{CommandFactory, Parser, Subcommand};
use pipelex_core::{DryRunner, PipeLibrary, PipelexError, load_and_validate_bundle};
use pipelex_routing::{InferenceConfig, ModelDeck, ModelResolver};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BUNDLE_EXTENSION: &str = ".plx";

#[derive(Parser, Debug)]
#[command(name = "pipelex")]
#[command(about = "Validate and dry run Pipelex pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and dry run a pipe, a bundle, or all pipes.
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
struct ValidateArgs {
    /// Pipe code, bundle file path (detected by its .plx extension), or `all`.
    target: Option<String>,
    /// Pipe code to validate (optional with --bundle).
    #[arg(long)]
    pipe: Option<String>,
    /// Bundle file (.plx); every pipe in it is validated.
    #[arg(long)]
    bundle: Option<PathBuf>,
    /// Directory searched recursively for .plx bundles.
    #[arg(long, default_value = ".")]
    library_dir: PathBuf,
    /// Directory holding backends.toml and routing_profiles.toml. Without it, model
    /// choices are not routed.
    #[arg(long)]
    inference_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum ValidationTarget {
    All,
    Pipe(String),
    Bundle { path: PathBuf, pipe: Option<String> },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Validate(args) => validate_command(args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn validate_command(args: ValidateArgs) -> Result<ExitCode, String> {
    let Some(target) = select_target(&args)? else {
        let mut command = Cli::command();
        if let Some(validate) = command.find_subcommand_mut("validate") {
            validate
                .print_help()
                .map_err(|error| format!("failed printing help: {error}"))?;
        }
        return Ok(ExitCode::SUCCESS);
    };

    let resolver = load_resolver(args.inference_dir.as_deref())?;
    match target {
        ValidationTarget::All => {
            validate_all(&args.library_dir, resolver.as_ref()).await?;
            info!("Setup sequence passed OK, config and pipelines are validated.");
        }
        ValidationTarget::Pipe(pipe_code) => {
            println!("Validating pipe '{pipe_code}'...");
            validate_pipe(&args.library_dir, &pipe_code, resolver.as_ref()).await?;
            println!("Successfully validated pipe '{pipe_code}'");
        }
        ValidationTarget::Bundle { path, pipe } => {
            validate_bundle(&path, pipe.as_deref(), resolver.as_ref()).await?;
            match pipe {
                None => println!(
                    "Successfully validated all pipes in bundle '{}'",
                    path.display()
                ),
                Some(pipe_code) => println!(
                    "Successfully validated all pipes in bundle '{}' (including '{pipe_code}')",
                    path.display()
                ),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Works out what to validate from the positional target and the flags. `None` means
/// nothing was given.
fn select_target(args: &ValidateArgs) -> Result<Option<ValidationTarget>, String> {
    if args.target.as_deref() == Some("all") && args.pipe.is_none() && args.bundle.is_none() {
        return Ok(Some(ValidationTarget::All));
    }

    let mut pipe_code = None;
    let mut bundle_path = None;
    if let Some(target) = &args.target {
        if target.ends_with(BUNDLE_EXTENSION) {
            if args.bundle.is_some() {
                return Err("Failed to validate: cannot use option --bundle if you're already passing a bundle file (.plx) as positional argument".to_string());
            }
            bundle_path = Some(PathBuf::from(target));
        } else {
            if args.pipe.is_some() {
                return Err("Failed to validate: cannot use option --pipe if you're already passing a pipe code as positional argument".to_string());
            }
            pipe_code = Some(target.clone());
        }
    }
    if let Some(bundle) = &args.bundle {
        bundle_path = Some(bundle.clone());
    }
    if let Some(pipe) = &args.pipe {
        pipe_code = Some(pipe.clone());
    }

    Ok(match (bundle_path, pipe_code) {
        (Some(path), pipe) => Some(ValidationTarget::Bundle { path, pipe }),
        (None, Some(pipe_code)) => Some(ValidationTarget::Pipe(pipe_code)),
        (None, None) => None,
    })
}

fn load_resolver(inference_dir: Option<&Path>) -> Result<Option<ModelResolver>, String> {
    let Some(dir) = inference_dir else {
        return Ok(None);
    };
    let config = InferenceConfig::load_from_dir(dir)
        .map_err(|error| format!("Failed to load inference config '{}': {error}", dir.display()))?;
    let resolver = ModelResolver::from_config(ModelDeck::builtin(), &config)
        .map_err(|error| format!("Failed to load inference config '{}': {error}", dir.display()))?;
    Ok(Some(resolver))
}

fn load_library(library_dir: &Path) -> Result<PipeLibrary, String> {
    let library = PipeLibrary::load_dir(library_dir).map_err(|error| {
        format!(
            "Failed to load libraries from '{}': {error}",
            library_dir.display()
        )
    })?;
    library
        .validate()
        .map_err(|error| format!("Failed to validate libraries: {error}"))?;
    Ok(library)
}

fn runner<'a>(library: &'a PipeLibrary, resolver: Option<&'a ModelResolver>) -> DryRunner<'a> {
    let runner = DryRunner::new(library);
    match resolver {
        Some(resolver) => runner.with_resolver(resolver),
        None => runner,
    }
}

async fn validate_all(library_dir: &Path, resolver: Option<&ModelResolver>) -> Result<(), String> {
    let library = load_library(library_dir)?;
    runner(&library, resolver)
        .dry_run_library(true)
        .await
        .map_err(|error| format!("Failed to validate: {error}"))?;
    Ok(())
}

async fn validate_pipe(
    library_dir: &Path,
    pipe_code: &str,
    resolver: Option<&ModelResolver>,
) -> Result<(), String> {
    let library = load_library(library_dir)?;
    let pipe = library
        .get_required_pipe(pipe_code)
        .map_err(|error| format!("Failed to validate pipe '{pipe_code}': {error}"))?;
    runner(&library, resolver)
        .dry_run_pipe(pipe, true)
        .await
        .map_err(|error| format!("Failed to validate pipe '{pipe_code}': {error}"))?;
    Ok(())
}

async fn validate_bundle(
    path: &Path,
    pipe_code: Option<&str>,
    resolver: Option<&ModelResolver>,
) -> Result<(), String> {
    let bundle = load_and_validate_bundle(path, resolver)
        .await
        .map_err(|error| match error {
            PipelexError::NotFound(_) | PipelexError::Io { .. } => {
                format!("Failed to load bundle '{}': {error}", path.display())
            }
            other => format!("Failed to validate bundle '{}': {other}", path.display()),
        })?;
    if let Some(pipe_code) = pipe_code {
        if !bundle.pipes().any(|(code, _)| code == pipe_code) {
            return Err(format!(
                "Failed to validate bundle '{}': pipe '{pipe_code}' is not declared in it",
                path.display()
            ));
        }
    }
    Ok(())
}
