/// Hostplane - hosted control plane manifests
///
/// Renders the Kubernetes manifests of an OpenShift control plane hosted
/// inside a namespace of a management cluster.
mod assets;
mod config;
mod release;
mod render;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::assets::EmbeddedAssets;
use crate::config::ClusterParams;
use crate::release::{OcReleaseResolver, ReleaseInfo, StaticReleaseResolver};
use crate::render::{render_cluster_manifests, FeatureFlags, RenderRequest, RenderedManifests};

#[derive(Parser)]
#[command(name = "hostplane")]
#[command(about = "Render hosted OpenShift control plane manifests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "cluster.yaml")]
    config: PathBuf,

    /// Output directory for rendered manifests
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the control plane manifests
    Render(RenderArgs),

    /// Generate example configuration file
    Init,

    /// List the embedded manifest templates
    Assets,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Registry pull secret (dockerconfigjson)
    #[arg(long, default_value = "pull-secret.json")]
    pull_secret: PathBuf,

    /// Directory holding the generated PKI files
    #[arg(long, default_value = "./pki")]
    pki_dir: PathBuf,

    /// Include the etcd operator and cluster
    #[arg(long)]
    include_etcd: bool,

    /// Include the OpenVPN server and clients
    #[arg(long)]
    include_vpn: bool,

    /// Deliver ingress certificates for an external OAuth server
    #[arg(long)]
    external_oauth: bool,

    /// Include the image registry configuration
    #[arg(long)]
    include_registry: bool,

    /// Read release images and versions from a file instead of `oc`
    #[arg(long)]
    release_info: Option<PathBuf>,

    /// Seed for generated secrets, for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// OpenShift client used to resolve the release image
    #[arg(long, default_value = "oc")]
    oc: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hostplane={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Render(ref args) => render(&cli, args).await,
        Commands::Init => init_config(&cli).await,
        Commands::Assets => list_assets(),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Render all manifests and write them to the output directory
async fn render(cli: &Cli, args: &RenderArgs) -> Result<()> {
    let params = ClusterParams::from_file(&cli.config).context("Failed to load configuration")?;

    let request = RenderRequest {
        params: &params,
        pull_secret: &args.pull_secret,
        pki_dir: &args.pki_dir,
        output_dir: cli.output.clone(),
        flags: FeatureFlags {
            etcd: args.include_etcd,
            vpn: args.include_vpn,
            external_oauth: args.external_oauth,
            include_registry: args.include_registry,
        },
        random_seed: args.seed,
    };

    let rendered: RenderedManifests = match &args.release_info {
        Some(path) => {
            info!("Using release metadata from {}", path.display());
            let resolver = StaticReleaseResolver::new(ReleaseInfo::from_file(path)?);
            render_cluster_manifests(&resolver, &EmbeddedAssets, &request).await?
        }
        None => {
            let resolver = OcReleaseResolver::new().with_binary(&args.oc);
            resolver
                .check_installed()
                .await
                .context("oc is required to resolve the release image (or pass --release-info)")?;
            render_cluster_manifests(&resolver, &EmbeddedAssets, &request).await?
        }
    };

    rendered
        .write_all()
        .context("Failed to write manifests")?;

    info!("");
    info!("Next steps:");
    info!("  1. Create the namespace on the management cluster:");
    info!("     kubectl create namespace {}", params.namespace);
    info!("  2. Apply the manifests:");
    info!(
        "     kubectl apply -n {} -R -f {}",
        params.namespace,
        cli.output.display()
    );

    Ok(())
}

/// Generate example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = ClusterParams::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the configuration file to match your cluster");
    info!("  2. Place the PKI files in ./pki and the pull secret in pull-secret.json");
    info!("  3. Render the manifests:");
    info!("     hostplane render --include-etcd --include-vpn");

    Ok(())
}

fn list_assets() -> Result<()> {
    for path in EmbeddedAssets.paths() {
        println!("{}", path);
    }
    Ok(())
}
