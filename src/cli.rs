use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "swapflow")]
#[command(version = "0.1.0")]
#[command(about = "Queued swap-order execution engine with DEX routing", long_about = None)]
pub struct Cli {
    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config")]
    pub config_dir: String,

    /// Apply database migrations. Exits afterwards unless `--serve` is given.
    #[arg(long)]
    pub migrate: bool,

    /// Serve after migrating
    #[arg(long)]
    pub serve: bool,

    /// Keep orders, cache and queue in process memory instead of PostgreSQL
    /// and Redis
    #[arg(long, conflicts_with = "migrate")]
    pub in_memory: bool,

    /// Port to listen on (default: from config/env)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// What the process does after loading configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    MigrateOnly,
    Serve { migrate: bool, in_memory: bool },
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.migrate && !self.serve {
            RunMode::MigrateOnly
        } else {
            RunMode::Serve {
                migrate: self.migrate,
                in_memory: self.in_memory,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_by_default() {
        let cli = Cli::parse_from(["swapflow"]);
        assert_eq!(
            cli.mode(),
            RunMode::Serve {
                migrate: false,
                in_memory: false
            }
        );
        assert_eq!(cli.config_dir, "config");
    }

    #[test]
    fn migrate_exits_unless_serve_given() {
        assert_eq!(
            Cli::parse_from(["swapflow", "--migrate"]).mode(),
            RunMode::MigrateOnly
        );
        assert_eq!(
            Cli::parse_from(["swapflow", "--migrate", "--serve"]).mode(),
            RunMode::Serve {
                migrate: true,
                in_memory: false
            }
        );
    }

    #[test]
    fn in_memory_cannot_migrate() {
        assert!(Cli::try_parse_from(["swapflow", "--in-memory", "--migrate"]).is_err());
        let cli = Cli::parse_from(["swapflow", "--in-memory", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
        assert!(matches!(cli.mode(), RunMode::Serve { in_memory: true, .. }));
    }
}
