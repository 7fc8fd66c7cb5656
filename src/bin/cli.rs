//! Manual inspection and maintenance CLI for a label-scan index store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use labelscan::collaborators::InMemoryChangeStream;
use labelscan::{LabelId, LabelScanStore, StoreConfig, TracingMonitor};

#[derive(Parser)]
#[command(name = "labelscan-cli", about = "Inspect and drive a label-scan index store")]
struct Cli {
    /// Path to the store file.
    #[arg(long, default_value = "neostore.labelscanstore.db")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store if absent and populate it from an empty change stream.
    Init,
    /// List node ids carrying a label.
    Query {
        /// Label id to query.
        label: u32,
    },
    /// Checkpoint the store with header CLEAN.
    Force,
    /// Run the structural and semantic consistency check.
    Check,
}

fn main() -> labelscan::Result<()> {
    labelscan::logging::init_logging("info");
    let cli = Cli::parse();
    let monitor = Arc::new(TracingMonitor);

    match cli.command {
        Command::Init => {
            let store = LabelScanStore::init(&cli.store, StoreConfig::default(), monitor)?;
            store.start(&InMemoryChangeStream::new(Vec::new()))?;
            println!("initialized {}", cli.store.display());
        }
        Command::Query { label } => {
            let store = LabelScanStore::init(&cli.store, StoreConfig::default(), monitor)?;
            let reader = store.new_reader()?;
            for node in reader.nodes_with_label(LabelId(label))? {
                println!("{node}");
            }
        }
        Command::Force => {
            let store = LabelScanStore::init(&cli.store, StoreConfig::default(), monitor)?;
            store.force()?;
            println!("forced checkpoint on {}", cli.store.display());
        }
        Command::Check => {
            let store = LabelScanStore::init(&cli.store, StoreConfig::default(), monitor)?;
            let report = store.consistency_check()?;
            if report.ok {
                println!("ok");
            } else {
                for fault in &report.faults {
                    println!("fault: {fault}");
                }
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
