// SPDX-License-Identifier: GPL-3.0-only

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shows today's date as an icon and the time as its title.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// X display to connect to instead of $DISPLAY
    #[arg(short, long, value_name = "DISPLAY")]
    display: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let _ = tracing_log::LogTracer::init();

    let args = Args::parse();

    tracing::info!("Starting `xcalicon` with version {VERSION}");

    match xcalicon::run(args.display.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn display_flag() {
        let args = Args::try_parse_from(["xcalicon", "-d", ":1"]).unwrap();
        assert_eq!(args.display.as_deref(), Some(":1"));

        let args = Args::try_parse_from(["xcalicon", "--display", "host:0.1"]).unwrap();
        assert_eq!(args.display.as_deref(), Some("host:0.1"));

        let args = Args::try_parse_from(["xcalicon"]).unwrap();
        assert_eq!(args.display, None);

        assert!(Args::try_parse_from(["xcalicon", "-x"]).is_err());
        assert!(Args::try_parse_from(["xcalicon", "extra"]).is_err());
    }
}
