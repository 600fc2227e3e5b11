use clap::{Parser, Subcommand};
use contact_sheet::config;
use contact_sheet::output;
use contact_sheet::pipeline::{self, BuildError, BuildOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Shared flags for commands that process images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the build cache and re-encode every image
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "contact-sheet")]
#[command(about = "Build-time asset pipeline for photo galleries")]
#[command(long_about = "\
Build-time asset pipeline for photo galleries

Scans a content directory for images, keeps a human-edited metadata file in
step with what is on disk, produces a small AVIF and a JPEG fallback for each
image, fingerprints static assets, and writes one render-context.json that a
template layer can turn into pages.

Project layout:

  config.toml          # Optional; defaults apply when absent
  gallery.toml         # Categories, titles, descriptions (new images appended)
  content/             # Source images, any nesting
  static/              # Optional; published under content-hashed names
  dist/
  ├── images/derived/  # <name>-<fingerprint>.avif / .jpg
  ├── images/originals/
  ├── assets/
  ├── render-context.json
  └── .build-cache.json

Run 'contact-sheet gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Project config file [default: ./config.toml, optional]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Content directory (overrides content_root)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output directory (overrides output_dir)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: scan → reconcile → process → publish → render
    Build(CacheArgs),
    /// Scan and diff the metadata store without writing anything
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn init_tracing(verbosity: u8) {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut filter = EnvFilter::from_default_env();
    match format!("contact_sheet={level}").parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("ignoring log directive: {e}"),
    }
    fmt().with_env_filter(filter).with_target(true).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(BuildError::Cancelled) => {
            eprintln!("==> Build cancelled; finished images are cached");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BuildError> {
    let options = BuildOptions {
        config_path: cli.config,
        source_override: cli.source,
        output_override: cli.output,
        use_cache: true,
    };

    match cli.command {
        Command::Build(cache_args) => {
            let options = BuildOptions {
                use_cache: !cache_args.no_cache,
                ..options
            };
            let cancel = cancel_flag();

            println!("==> Building from {}", options.config_file().display());
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_build_event(&event);
                }
            });
            let result = pipeline::build(&options, &cancel, Some(tx));
            if printer.join().is_err() {
                warn!("progress printer panicked");
            }
            let outcome = result?;

            output::print_build_summary(&outcome);
            println!("==> Build complete: {}", outcome.output_dir.display());
        }
        Command::Check => {
            println!("==> Checking {}", options.config_file().display());
            let outcome = pipeline::check(&options)?;
            output::print_check_output(&outcome);
            println!("==> Content is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Raised on Ctrl-C. Workers finish the image in hand and stop.
fn cancel_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }
    flag
}
