use clap::{Parser, Subcommand};
use sitepack::config::{self, BuildSettings, Environment};
use sitepack::output;
use sitepack::pages::{self, MarkdownContentSource, PlaceholderRenderer};
use sitepack::pipeline::{self, Collaborators};
use sitepack::rules::RuleSet;
use sitepack::transform::RustToolchain;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser)]
#[command(name = "sitepack")]
#[command(about = "Rule-driven asset and page builds for static sites")]
#[command(long_about = "\
Rule-driven asset and page builds for static sites

Every file under the source directory is matched against a fixed rule set.
Scripts reachable from the configured entries are bundled (application code
and vendor packages separately), stylesheets are injected or extracted,
small assets are inlined, and pages are rendered from templates.

Project layout (defaults):

  sitepack.toml                    # Config (optional)
  sitepack.production.toml         # Per-environment overrides (optional)
  node_modules/                    # Vendor packages
  src/
  ├── app.js                       # Entry
  ├── styles/main.scss
  ├── assets/images/, assets/fonts/
  ├── views/index.html             # Page templates
  └── content/blog/*.md            # Collection items

Run 'sitepack gen-config' to generate a documented sitepack.toml.")]
#[command(version)]
struct Cli {
    /// Project directory
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Build environment
    #[arg(long, value_enum, default_value_t = Environment::Development, global = true)]
    env: Environment,

    /// URL prefix for emitted assets (overrides `public_path`)
    #[arg(long, env = "ASSET_PATH", global = true)]
    public_path: Option<String>,

    /// Dart Sass executable used for .scss files
    #[arg(long, env = "SITEPACK_SASS", default_value = "sass", global = true)]
    sass: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and publish the site to the output directory
    Build {
        /// Also write the build report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Scan and resolve the project without building
    Check,
    /// List the pages that would be rendered
    Pages,
    /// Print a stock sitepack.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let load_settings = || BuildSettings::load(&cli.root, cli.env, cli.public_path.as_deref());

    match &cli.command {
        Command::Build { report } => {
            let settings = load_settings()?;
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;
            init_thread_pool(&settings.config.processing);

            println!(
                "==> Building {} ({})",
                settings.source_root.display(),
                settings.environment
            );
            let toolchain = RustToolchain::with_sass(cli.sass.clone());
            let content = MarkdownContentSource::new(&settings.content_root());
            let collaborators = Collaborators {
                toolchain: &toolchain,
                content: &content,
                renderer: &PlaceholderRenderer,
            };
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::build(&settings, collaborators, Some(tx), &cancel);
            printer.join().unwrap();
            let result = result?;

            output::print_build_report(&result);
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(path, json)?;
            }
            println!("==> Build complete: {}", settings.output_dir.display());
        }
        Command::Check => {
            let settings = load_settings()?;
            println!("==> Checking {}", settings.source_root.display());
            let rules = RuleSet::from_config(&settings.config)?;
            let plan = pipeline::plan(&settings, &rules)?;
            output::print_plan(&plan, &settings);
            println!("==> Project is valid");
        }
        Command::Pages => {
            let settings = load_settings()?;
            let content = MarkdownContentSource::new(&settings.content_root());
            let pages = pages::compose(&settings, &content)?;
            output::print_pages(&pages);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; `max_processes` can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
