//! GEMS alert compiler binary entrypoint.
//!
//! This is the main entry point for the `gems-alerts` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gems_cli::cli::{Cli, Commands};
use gems_cli::commands::{
    ApplyCommand, CompileCommand, RemoveCommand, RenderCommand, TemplatesCommand, load_options,
};
use gems_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), gems_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let options = load_options(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Compile(args) => {
            CompileCommand::new(&options).execute(&mut stdout, &format, &args)?;
        }
        Commands::Render { alert } => {
            RenderCommand::new(&options).execute(&mut stdout, &format, &alert)?;
        }
        Commands::Apply(args) => {
            ApplyCommand::new(&options).execute(&mut stdout, &format, &args)?;
        }
        Commands::Remove(args) => {
            RemoveCommand::execute(&mut stdout, &format, &args)?;
        }
        Commands::Templates => {
            TemplatesCommand::new(&options).execute(&mut stdout, &format)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gems_cli::cli::Format;

    #[test]
    fn cli_parses_templates() {
        let cli = Cli::parse_from(["gems-alerts", "templates"]);
        assert!(matches!(cli.command, Commands::Templates));
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["gems-alerts", "--format", "json", "templates"]);
        assert_eq!(cli.format, Format::Json);
    }

    #[test]
    fn run_compile_missing_snapshot_fails() {
        let cli = Cli::parse_from(["gems-alerts", "compile", "--snapshot", "/nonexistent/snap.json"]);
        assert!(run(cli).is_err());
    }

    #[test]
    fn run_with_missing_config_fails() {
        let cli = Cli::parse_from(["gems-alerts", "--config", "/nonexistent/config.json", "templates"]);
        assert!(run(cli).is_err());
    }
}
