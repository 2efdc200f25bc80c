use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use parcel_stats::{
    StatsEngine,
    carrier::{CarrierCode, PrefixClassifier},
    config::{EngineConfig, load_config_path},
    db::{connection::connect_sqlite, migrate},
    period::{Granularity, PeriodKey},
    resolver::PeriodQuery,
    tz,
};
use shared_utils::get_env_var;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about = "Parcel delivery statistics")]
struct Cli {
    /// Engine config TOML; defaults to $PARCEL_STATS_CONFIG when set.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<String>,
    /// SQLite database; overrides the config and $DATABASE_URL.
    #[arg(long, value_name = "URL", global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Fold one UTC date's daily rows into week/month/year rollups.
    Fold {
        /// Date to fold; yesterday (UTC) when omitted.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Skip the date if it was already folded.
        #[arg(long)]
        once: bool,
    },
    /// Recompute one rollup period from daily rows.
    Rebuild {
        #[arg(long)]
        granularity: Granularity,
        #[arg(long)]
        year: i32,
        /// ISO week, month, or 1 for years.
        #[arg(long, default_value_t = 1)]
        number: i32,
    },
    /// Print per-period totals as JSON.
    Stats {
        #[arg(long = "store", required = true)]
        stores: Vec<i64>,
        #[arg(long, default_value = "day")]
        granularity: Granularity,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// IANA zone; the config's default_zone when omitted.
        #[arg(long)]
        zone: Option<String>,
    },
    /// Print current-state (or one day's) totals as JSON.
    Totals {
        #[arg(long)]
        store: i64,
        #[arg(long)]
        carrier: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parcel_stats=info".into()),
        )
        .init();
}

fn load_config(flag: Option<String>) -> Result<EngineConfig> {
    match flag.or_else(|| get_env_var("PARCEL_STATS_CONFIG").ok()) {
        Some(path) => load_config_path(&path),
        None => Ok(EngineConfig::default()),
    }
}

fn database_url(flag: Option<String>, cfg: &EngineConfig) -> Result<String> {
    if let Some(url) = flag.or_else(|| cfg.database_url.clone()) {
        return Ok(url);
    }
    get_env_var("DATABASE_URL").context("no database configured")
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let cfg = load_config(cli.config)?;
    let db_url = database_url(cli.database_url, &cfg)?;

    let mut conn = connect_sqlite(&db_url)?;
    let classifier = PrefixClassifier::from_config(&cfg);
    if classifier.is_empty() {
        warn!("no carrier rules configured, carrier-level stats stay empty");
    } else {
        info!(carriers = classifier.len(), "carrier rules loaded");
    }
    let engine = StatsEngine::new(classifier);

    match cli.cmd {
        Cmd::Migrate => migrate::run_all(&db_url)?,
        Cmd::Fold { date, once } => {
            let report = match (date, once) {
                (None, _) => engine.fold_yesterday(&mut conn)?,
                (Some(day), true) => engine.fold_date_once(&mut conn, day)?,
                (Some(day), false) => engine.fold_date(&mut conn, day)?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Cmd::Rebuild {
            granularity,
            year,
            number,
        } => {
            let report =
                engine.rebuild_period(&mut conn, granularity, PeriodKey { year, number })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Cmd::Stats {
            stores,
            granularity,
            from,
            to,
            zone,
        } => {
            let zone = tz::parse_zone(zone.as_deref().unwrap_or(&cfg.default_zone))?;
            let query = PeriodQuery {
                store_ids: stores.into_iter().collect::<BTreeSet<_>>(),
                granularity,
                from: tz::start_of_day_utc(from, zone)?,
                to: tz::start_of_day_utc(to, zone)?,
                zone,
            };
            let stats = engine.get_period_stats(&mut conn, &query)?;
            info!(periods = stats.len(), "period stats resolved");
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Cmd::Totals {
            store,
            carrier,
            date,
        } => {
            let carrier = carrier.as_deref().and_then(CarrierCode::new);
            let totals = match date {
                Some(day) => engine.get_daily_totals(&mut conn, store, carrier.as_ref(), day)?,
                None => engine.get_current_totals(&mut conn, store, carrier.as_ref())?,
            };
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }

    Ok(())
}
