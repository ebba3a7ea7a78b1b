mod input;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use input::{load_tree, read_input, TreeFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use virtdoc_common::{load_config, load_config_from, ChangeReport, ResourceKind};
use virtdoc_core::{to_bytes, ChangeDetector};

/// Exit status when a compared definition differs
const EXIT_CHANGED: i32 = 2;

#[derive(Parser)]
#[command(name = "virtdoc")]
#[command(author = "virtdoc Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Decode, encode and semantically compare virtualization resource definitions", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Prefer the configuration file next to the executable
    #[arg(long, global = true)]
    portable: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an XML definition into its canonical tree (JSON)
    Decode {
        /// Input document, or - for stdin
        input: PathBuf,
    },

    /// Encode a canonical tree (JSON or YAML) into an XML definition
    Encode {
        /// Tree file (.json, .yaml, .yml), or - for JSON on stdin
        input: PathBuf,

        /// Root element name
        #[arg(short, long, conflicts_with = "kind")]
        root: Option<String>,

        /// Resource kind whose element name is used as root
        #[arg(short, long)]
        kind: Option<ResourceKind>,
    },

    /// Compare a desired definition with the observed XML document
    Compare {
        /// Desired definition (.xml, .json, .yaml)
        desired: PathBuf,

        /// Observed XML document, or - for stdin
        observed: PathBuf,

        /// Resource kind (inferred from the observed root element when omitted)
        #[arg(short, long)]
        kind: Option<ResourceKind>,

        /// Output the change report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a magnitude with a unit into bytes
    ToBytes {
        magnitude: u64,

        /// Unit token such as KiB, mb or bytes
        unit: String,
    },

    /// List known resource kinds
    Kinds {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct KindEntry {
    kind: ResourceKind,
    element: &'static str,
    schema: &'static str,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Decode { ref input } => {
            run_decode(&cli, input).map(|_| 0).context("Decode failed")
        }
        Commands::Encode {
            ref input,
            ref root,
            kind,
        } => run_encode(&cli, input, root.as_deref(), kind)
            .map(|_| 0)
            .context("Encode failed"),
        Commands::Compare {
            ref desired,
            ref observed,
            kind,
            json,
        } => run_compare(&cli, desired, observed, kind, json)
            .map(|changed| if changed { EXIT_CHANGED } else { 0 })
            .context("Compare failed"),
        Commands::ToBytes {
            magnitude,
            ref unit,
        } => run_to_bytes(magnitude, unit).map(|_| 0).context("Conversion failed"),
        Commands::Kinds { json } => run_kinds(json).map(|_| 0),
    };

    match outcome {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn detector(cli: &Cli) -> Result<ChangeDetector> {
    let loaded = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(cli.portable)?,
    };
    debug!(
        "Using configuration {} (exists: {}, portable: {})",
        loaded.path.display(),
        loaded.exists,
        loaded.portable
    );
    Ok(ChangeDetector::from_config(&loaded.config)?)
}

fn run_decode(cli: &Cli, input: &Path) -> Result<()> {
    let detector = detector(cli)?;
    let text = read_input(input)?;
    let decoded = detector.decode_resource(&text)?;

    info!("Decoded <{}> from {}", decoded.root_tag, input.display());
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}

fn run_encode(cli: &Cli, input: &Path, root: Option<&str>, kind: Option<ResourceKind>) -> Result<()> {
    let detector = detector(cli)?;
    let node = load_tree(input, TreeFormat::from_path(input), detector.codec())?;

    let xml = match (kind, root) {
        (Some(kind), _) => detector.encode_resource(kind, &node)?,
        (None, Some(root)) => detector.codec().encode(&node, root)?,
        (None, None) => bail!("either --root or --kind is required"),
    };

    println!("{}", xml);
    Ok(())
}

/// Returns whether the definition changed
fn run_compare(
    cli: &Cli,
    desired: &Path,
    observed: &Path,
    kind: Option<ResourceKind>,
    json: bool,
) -> Result<bool> {
    let detector = detector(cli)?;
    let desired_tree = load_tree(desired, TreeFormat::from_path(desired), detector.codec())?;
    let observed_xml = read_input(observed)?;

    let kind = match kind {
        Some(kind) => kind,
        None => {
            let decoded = detector.decode_resource(&observed_xml)?;
            match decoded.kind {
                Some(kind) => kind,
                None => bail!(
                    "cannot infer resource kind from <{}>, pass --kind",
                    decoded.root_tag
                ),
            }
        }
    };

    info!("Comparing {} definition {} with {}", kind, desired.display(), observed.display());
    let report = detector.has_changed(kind, &desired_tree, &observed_xml)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.changed)
}

fn print_report(report: &ChangeReport) {
    if !report.changed {
        println!("{}: unchanged", report.kind);
        return;
    }

    println!(
        "{}: changed at {}",
        report.kind,
        report.path.as_deref().unwrap_or(report.kind.label())
    );
    if let Some(cause) = &report.cause {
        println!("  {}", cause);
    }
}

fn run_to_bytes(magnitude: u64, unit: &str) -> Result<()> {
    let bytes = to_bytes(magnitude, unit)?;
    println!("{}", bytes);
    Ok(())
}

fn run_kinds(json: bool) -> Result<()> {
    let entries: Vec<KindEntry> = ResourceKind::ALL
        .iter()
        .map(|&kind| KindEntry {
            kind,
            element: kind.label(),
            schema: kind.schema_name(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{:<16} {}", entry.element, entry.schema);
    }
    Ok(())
}
