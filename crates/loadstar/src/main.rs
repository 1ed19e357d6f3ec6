//! `loadstar` command line: bundle an entry module and its dependencies.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

use loadstar::config::Config;
use loadstar::{BundleOptions, Bundler, FsPlatform, Loader, PrefixLayer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Id of the entry module
    #[arg(short, long)]
    entry: String,

    /// Name exported by the bundle
    #[arg(short, long, default_value = "Bundle")]
    name: String,

    /// Output bundle file
    #[arg(short, long, conflicts_with = "stdout")]
    output: Option<PathBuf>,

    /// Write the bundle to stdout instead of a file
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory module files are read from
    #[arg(long)]
    root: Option<PathBuf>,

    /// Prefix prepended to module ids when resolving paths
    #[arg(long)]
    prefix: Option<String>,

    /// Text placed at the top of the bundle
    #[arg(long)]
    header: Option<String>,

    /// Module id to leave out of the bundle (repeatable)
    #[arg(long)]
    exclude: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();
    debug!("Verbosity level: {} (log level: {})", cli.verbose, log_level);

    let output = match (cli.output.clone(), cli.stdout) {
        (Some(path), _) => Some(path),
        (None, true) => None,
        (None, false) => {
            return Err(anyhow::anyhow!(
                "Either --output or --stdout must be specified"
            ));
        }
    };
    run(cli, output).await
}

async fn run(cli: Cli, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(prefix) = cli.prefix {
        config.prefix = prefix;
    }
    if let Some(header) = cli.header {
        config.header = header;
    }
    config.exclude.extend(cli.exclude);
    config.validate()?;
    debug!("Configuration: {:?}", config);

    let platform = FsPlatform::new(config.root.clone()).with_manifest(config.modules.clone());
    let options = BundleOptions::default()
        .with_prefix(config.prefix.clone())
        .with_header(config.header.clone())
        .with_root(config.root.clone())
        .excluding(config.exclude.clone());
    let bundler = Bundler::new(Loader::new(Arc::new(platform)), options);
    // Installed last so it sees ids before the bundle prefix is applied
    if !config.prefixes.is_empty() {
        bundler
            .loader()
            .use_layer(config.prefixes.clone().into_iter().collect::<PrefixLayer>());
    }
    let bundle = bundler.generate(&cli.entry, &cli.name).await?;

    match output {
        Some(path) => {
            std::fs::write(&path, bundle)
                .with_context(|| format!("Failed to write bundle to {:?}", path))?;
            info!("Bundle created successfully at {:?}", path);
        }
        None => {
            print!("{}", bundle);
            info!("Bundle output to stdout");
        }
    }
    Ok(())
}
