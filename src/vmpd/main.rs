// SPDX-License-Identifier: GPL-2.0-or-later

mod adapters;
mod app;

use app::run;
use clap::Parser;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let args = parse_args();

    match args.action {
        Action::Run(args) => {
            if let Err(e) = run(&args.config).await {
                eprintln!("failed to run vmpd: {e}");
                std::process::exit(e.exit_code());
            }
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub action: Action,

    // This is just for the help page.
    #[arg(long, default_value_t = DEFAULT_CONFIG_PATH.to_string())]
    config: String,
}

#[derive(Debug, clap::Subcommand)]
pub enum Action {
    #[command(about = "Run the daemon")]
    Run(RunArgs),
}

const DEFAULT_CONFIG_PATH: &str = "./configs/vmpd.toml";

#[derive(Debug, Parser)]
pub struct RunArgs {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}
