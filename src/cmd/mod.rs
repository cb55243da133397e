//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`inspect`], or [`health`]. Each handler
//! lives in its own submodule; [`store`] resolves the config store both
//! `run` and `inspect` read from.

pub mod health;
pub mod inspect;
pub mod run;
pub mod store;

use crate::cli::{Cli, Commands};
use crate::error::PoolRouteError;

pub async fn dispatch(cli: Cli) -> Result<(), PoolRouteError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Inspect(ref args)) => inspect::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    let build = env!("POOLROUTE_GIT_SHORT");
    println!(
        "\n  poolroute v{version} ({build}): load-balancing reverse proxy\n\n  \
         No command provided. To get started:\n\n    \
         poolroute run --default-pool web      Serve pool 'web' (auto-detects ./poolroute.yaml)\n    \
         poolroute run -f pools.yaml           Start with a specific store file\n    \
         poolroute inspect web                 Show what pool 'web' would load\n    \
         poolroute --help                      See all commands and options\n"
    );
}
