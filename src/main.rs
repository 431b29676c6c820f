use colored::Colorize;
use srvwarden::commands::{self, Cli};
use srvwarden::utils::logger::{cli_level, init_logger};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse_args_from(std::env::args_os()) {
        Ok(cli) => cli,
        // prints help/version itself and exits 0 for those
        Err(err) => err.exit(),
    };

    let level = cli_level(cli.global.log_level.as_deref());
    if let Err(err) = init_logger(level, cli.global.log_file.clone()) {
        eprintln!("{} could not set up logging: {err}", "❌".red());
        return ExitCode::from(1);
    }

    match commands::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(
                error = ?err,
                category = err.category().display_name(),
                severity = ?err.severity(),
                recoverable = err.is_recoverable(),
                "command failed"
            );
            eprintln!("{}", commands::render_error(&err));
            ExitCode::from(1)
        }
    }
}
