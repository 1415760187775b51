//! Delete throwaway accounts left behind by load and smoke tests.
//!
//! Patterns are SQL LIKE expressions matched against email. Without any,
//! the test-client defaults are used.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use tracing::info;

use murmur_db::Database;

const DEFAULT_PATTERNS: &[&str] = &["a_%@test.local", "b_%@test.local"];

#[derive(Parser, Debug)]
#[command(name = "murmur-prune")]
#[command(about = "Delete test accounts whose email matches LIKE patterns", long_about = None)]
struct Args {
    /// Only report how many users match
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Database file to prune
    #[arg(long, env = "MURMUR_DB_PATH", default_value = "murmur.db")]
    db: PathBuf,

    /// Email LIKE patterns (default: a_%@test.local b_%@test.local)
    patterns: Vec<String>,
}

impl Args {
    fn patterns(&self) -> Vec<String> {
        if self.patterns.is_empty() {
            DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()
        } else {
            self.patterns.clone()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_prune=info,murmur_db=info".into()),
        )
        .init();

    if !args.db.exists() {
        bail!("database {} not found", args.db.display());
    }
    let db = Database::open(&args.db)?;
    info!("Using database {}", args.db.display());

    let patterns = args.patterns();
    let matching = db.count_users_like(&patterns)?;
    if matching == 0 {
        info!("No users match {:?}, nothing to do", patterns);
        return Ok(());
    }
    if args.dry_run {
        info!("{} users match {:?} (dry run, nothing deleted)", matching, patterns);
        return Ok(());
    }

    let deleted = db.delete_users_like(&patterns)?;
    let remaining = db.count_users_like(&patterns)?;
    info!("Deleted {} users, {} still matching", deleted, remaining);
    Ok(())
}
