mod plugin_commands;
mod stats_commands;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
};

#[derive(Parser)]
#[command(name = "hive", about = "Hive plugin host harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the property keys a host must supply for a plugin.
    Paths {
        /// Plugin name.
        plugin: String,
    },
    /// Print the SHA-256 digest of a plugin artifact.
    Digest { artifact: std::path::PathBuf },
    /// Attach a plugin, start it, hold it running, then stop it.
    Run(plugin_commands::RunArgs),
    /// Read back the statistics recorded for one flow.
    Stats(stats_commands::StatsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = hive_common::logging::init_tracing(&cli.log_level, cli.json_logs) {
        eprintln!("Warning: {e}");
    }
    debug!(version = env!("CARGO_PKG_VERSION"), "hive starting");

    match cli.command {
        Commands::Paths { plugin } => {
            for path in hive_plugins::config_paths(&plugin) {
                println!("{path}");
            }
            Ok(())
        },
        Commands::Digest { artifact } => {
            let digest = hive_plugins::integrity::sha256_file(&artifact)?;
            println!("{digest}  {}", artifact.display());
            Ok(())
        },
        Commands::Run(args) => plugin_commands::run(args).await,
        Commands::Stats(args) => stats_commands::show(args).await,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_requires_cert_and_key_together() {
        let parsed = Cli::try_parse_from(["hive", "run", "--cert", "p1.crt"]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from(["hive", "run", "--cert", "p1.crt", "--key", "p1key.key"]);
        assert!(parsed.is_ok());
    }
}
