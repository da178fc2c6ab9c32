//! Logging setup.

use eyre::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::LogArgs;

/// Initialize logging based on command line arguments.
///
/// `--quiet` shows errors only. Otherwise `RUST_LOG` wins if set, falling
/// back to a level picked by `-v` count, and `--log.filter` directives are
/// layered on top.
pub(crate) fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = if args.quiet {
        EnvFilter::new("error")
    } else {
        let base_level = match args.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };

        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

        if let Some(custom_filter) = &args.filter {
            for directive in custom_filter.split(',') {
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(e) => eprintln!("ignoring invalid log directive {directive:?}: {e}"),
                }
            }
        }

        filter
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json {
        builder
            .json()
            .try_init()
            .map_err(|e| eyre::eyre!("failed to install logger: {e}"))?;
    } else {
        builder
            .try_init()
            .map_err(|e| eyre::eyre!("failed to install logger: {e}"))?;
    }

    Ok(())
}
