// griddoc CLI entry point.

use clap::Parser;
use griddoc_editor::EditorConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "griddoc", version, about = "Typed tables over a shared store")]
struct Cli {
    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::detect(cli.json);

    let config = match EditorConfig::load() {
        Ok(config) => config,
        Err(error) => {
            output::print_error(format, "config_invalid", &format!("{error:#}"));
            return ExitCode::Usage.into();
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match commands::run(cli.command, config, format).await {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}
