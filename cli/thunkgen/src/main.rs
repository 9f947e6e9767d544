//! thunkgen: generate guest/host thunk sources from a `.thunks.toml`
//! interface declaration.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use thunk_layout::GuestAbi;

#[derive(Parser)]
#[command(name = "thunkgen", version, about = "Guest/host thunk generator")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the guest and host thunk sources for an interface
    Generate {
        /// Interface declaration (.thunks.toml)
        interface: PathBuf,
        /// Guest ABI (x86-32, x86-64)
        #[arg(long)]
        guest_abi: GuestAbi,
        /// Output path of the guest half (default: <out-dir>/<lib>_guest.rs)
        #[arg(long)]
        guest_out: Option<PathBuf>,
        /// Output path of the host half (default: <out-dir>/<lib>_host.rs)
        #[arg(long)]
        host_out: Option<PathBuf>,
        /// Directory for default output paths (default: the interface's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Report layout classes and the thunk plan for an interface
    Analyze {
        /// Interface declaration (.thunks.toml)
        interface: PathBuf,
        /// Guest ABI (x86-32, x86-64)
        #[arg(long, default_value = "x86-64")]
        guest_abi: GuestAbi,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate {
            interface,
            guest_abi,
            guest_out,
            host_out,
            out_dir,
        } => {
            let outputs = commands::generate::OutputPaths {
                guest: guest_out,
                host: host_out,
                dir: out_dir,
            };
            let written = commands::generate::run(&interface, guest_abi, &outputs)?;
            println!(
                "Generated {} and {}",
                written.guest.display(),
                written.host.display()
            );
            Ok(())
        }
        Commands::Analyze {
            interface,
            guest_abi,
            format,
        } => commands::analyze::run(&interface, guest_abi, format),
    }
}
