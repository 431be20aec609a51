// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Clean, List, Mount, Status, Unmount};

use sdm::{logging, AppState};

command_enum! {
    (List, List),
    (Status, Status),
    (Mount, Mount),
    (Unmount, Unmount),
    (Clean, Clean),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let state = match AppState::load_or_init(args.config_path.clone()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validated when the state was loaded
    let file_level = state.config.log_level().unwrap_or(tracing::Level::INFO);
    let stderr_level = if args.verbose {
        file_level
    } else {
        tracing::Level::WARN
    };
    let log_dir = state.log_dir();
    let guards = logging::init_logging(stderr_level, file_level, log_dir.as_deref());

    let ctx = match cli::op::OpContext::new(state) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to set up backends: {}", e);
            drop(guards);
            std::process::exit(1);
        }
    };

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // Flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
