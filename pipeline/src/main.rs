//! Two-stage data-generation driver CLI.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pipeline::{generator_program, resolve_directory, run_stages, stage_invocations};

#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Run the two-stage MCTS data-generation pipeline"
)]
struct Cli {
    /// Directory name for the first stage (defaults to IL_1).
    directory: Option<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let token = resolve_directory(cli.directory);
    let program = generator_program();

    match run_stages(&program, &stage_invocations(&token)) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_no_arguments() {
        let cli = Cli::try_parse_from(["pipeline"]).expect("parse");
        assert!(cli.directory.is_none());
    }

    #[test]
    fn parse_accepts_one_positional_directory() {
        let cli = Cli::try_parse_from(["pipeline", "IL_2"]).expect("parse");
        assert_eq!(cli.directory.as_deref(), Some("IL_2"));
        assert!(Cli::try_parse_from(["pipeline", "IL_2", "extra"]).is_err());
    }
}
