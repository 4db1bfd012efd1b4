mod cli;
mod cmd;
mod format;
mod table;

use std::path::PathBuf;

use clap::Parser;

use cask_core::config;

use cli::{Cli, Commands};

const CONFIG_ENV: &str = "CASK_CONFIG";
const DEFAULT_CONFIG: &str = "cask.yaml";

fn config_path(flag: Option<&str>) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // `config` writes the file the other commands read.
    if let Commands::Config { url, dest } = &cli.command {
        if let Err(e) = cmd::config::run_config_generate(url, dest) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let path = config_path(cli.config.as_deref());
    let cfg = match config::load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run `cask config <repository-path>` to generate a starter config file.");
            std::process::exit(1);
        }
    };
    tracing::info!(command = cli.command.name(), config = %path.display(), "using config");

    if let Err(e) = cmd::dispatch(&cli.command, &cfg) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_flag_wins() {
        assert_eq!(config_path(Some("/etc/cask.yaml")), PathBuf::from("/etc/cask.yaml"));
    }

    #[test]
    fn cli_parses_restore_flags() {
        let cli = Cli::try_parse_from(["cask", "-vv", "restore", "latest:/etc", "--to", "/tmp/out", "--rebase"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Restore {
                snapshot,
                dest,
                rebase,
                skip_permissions,
            } => {
                assert_eq!(snapshot, "latest:/etc");
                assert_eq!(dest, "/tmp/out");
                assert!(rebase);
                assert!(!skip_permissions);
            }
            _ => panic!("expected restore"),
        }
    }

    #[test]
    fn cli_parses_info_subcommands() {
        let cli = Cli::try_parse_from(["cask", "info", "state"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Info {
                command: cli::InfoCommand::State { id: None }
            }
        ));
        assert!(Cli::try_parse_from(["cask", "info", "vfs"]).is_err());
    }

    #[test]
    fn cli_parses_sync_and_rm() {
        let cli = Cli::try_parse_from(["cask", "sync", "from", "/mnt/mirror", "latest"]).unwrap();
        match cli.command {
            Commands::Sync {
                direction,
                url,
                snapshot,
            } => {
                assert_eq!(direction, cli::SyncDirection::From);
                assert_eq!(url, "/mnt/mirror");
                assert_eq!(snapshot.as_deref(), Some("latest"));
            }
            _ => panic!("expected sync"),
        }
        assert!(Cli::try_parse_from(["cask", "sync", "sideways", "/mnt/mirror"]).is_err());
        assert_eq!(Commands::Rm { snapshots: vec![] }.name(), "rm");

        let cli = Cli::try_parse_from(["cask", "rm", "ab12", "cd34"]).unwrap();
        assert!(matches!(cli.command, Commands::Rm { ref snapshots } if snapshots.len() == 2));
        assert!(Cli::try_parse_from(["cask", "rm"]).is_err());

        let cli = Cli::try_parse_from(["cask", "info", "object", "ff"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Info {
                command: cli::InfoCommand::Object { id: Some(_) }
            }
        ));
    }
}
