//! Ledger administration tool
//!
//! Runs schema migrations, bootstraps the standard journals, chart and
//! fiscal periods, and performs the operator-side ledger tasks.
//!
//! # Usage
//!
//! ```bash
//! ledger-admin migrate
//! ledger-admin bootstrap --fiscal-year 2024 --frequency monthly --adjustment-period
//! ledger-admin trial-balance --as-of 2024-03-31
//! ledger-admin recompute --account 1000
//! ledger-admin close-period --period "January 2024" --actor controller
//! ```
//!
//! # Environment Variables
//!
//! * `DATABASE_URL` - PostgreSQL connection string (required)
//! * `DATABASE_MAX_CONNECTIONS` / `DATABASE_MIN_CONNECTIONS` - pool sizing
//! * `LEDGER_LOCK_TIMEOUT_MS` - lock wait before a unit of work aborts (default: 5000)
//! * `LEDGER_MAX_CONTENTION_RETRIES` - retries for aborted units of work (default: 3)
//! * `LEDGER_RETAINED_EARNINGS_CODE` - equity account receiving net income (default: 3000)
//! * `LEDGER_LOG_JSON` - emit JSON log lines when `true`
//! * `RUST_LOG` - log filter (default: info)

use std::collections::HashSet;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::Actor;
use domain_ledger::{AccountFilter, LawFirmChartOfAccounts, Ledger, LedgerConfig, PeriodFrequency};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PgLedgerStore};

#[derive(Debug, Parser)]
#[command(name = "ledger-admin", about = "Administers the double-entry ledger", version)]
struct Cli {
    /// Actor recorded on every change
    #[arg(long, global = true, env = "LEDGER_ACTOR", default_value = "ledger-admin")]
    actor: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emits logs as JSON lines
    #[arg(long, global = true, env = "LEDGER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Applies pending schema migrations
    Migrate,
    /// Creates missing standard journals and accounts, and optionally a fiscal year
    Bootstrap {
        #[arg(long)]
        fiscal_year: Option<i32>,
        #[arg(long, value_enum, default_value_t = Frequency::Monthly)]
        frequency: Frequency,
        /// Adds a year-end adjustment period
        #[arg(long)]
        adjustment_period: bool,
    },
    /// Prints the trial balance as of a date
    TrialBalance {
        #[arg(long)]
        as_of: NaiveDate,
    },
    /// Rebuilds the balance roll-ups of an account from its lines
    Recompute {
        #[arg(long)]
        account: String,
    },
    /// Closes a period by name
    ClosePeriod {
        #[arg(long)]
        period: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Frequency {
    Monthly,
    Quarterly,
}

impl From<Frequency> for PeriodFrequency {
    fn from(frequency: Frequency) -> Self {
        match frequency {
            Frequency::Monthly => PeriodFrequency::Monthly,
            Frequency::Quarterly => PeriodFrequency::Quarterly,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let pool = create_pool(DatabaseConfig::from_env().context("loading DATABASE_* settings")?).await?;
    if let Command::Migrate = cli.command {
        run_migrations(&pool).await?;
        return Ok(());
    }

    let config = LedgerConfig::from_env().context("loading LEDGER_* settings")?;
    let ledger = Ledger::new(PgLedgerStore::new(pool, config.lock_timeout()), config);
    let actor = Actor::new(cli.actor);

    match cli.command {
        Command::Migrate => {}
        Command::Bootstrap {
            fiscal_year,
            frequency,
            adjustment_period,
        } => {
            let journals = ledger.bootstrap_journals(&actor).await?;
            tracing::info!(created = journals.len(), "Standard journals ready");

            let existing: HashSet<String> = ledger
                .accounts(&AccountFilter::default())
                .await?
                .into_iter()
                .map(|a| a.code.to_lowercase())
                .collect();
            let missing: Vec<_> = LawFirmChartOfAccounts::standard()
                .into_iter()
                .filter(|a| !existing.contains(&a.code.to_lowercase()))
                .collect();
            let accounts = ledger.create_accounts(missing, &actor).await?;
            tracing::info!(created = accounts.len(), "Standard chart ready");

            if let Some(year) = fiscal_year {
                let periods = ledger
                    .generate_fiscal_year(year, frequency.into(), adjustment_period, false, &actor)
                    .await?;
                tracing::info!(year, created = periods.len(), "Fiscal year generated");
            }
        }
        Command::TrialBalance { as_of } => {
            let trial_balance = ledger.trial_balance(as_of, None).await?;
            println!("Trial balance as of {}", trial_balance.as_of);
            for line in &trial_balance.lines {
                println!(
                    "{:<8} {:<40} {:>15} {:>15}",
                    line.code, line.name, line.debit_balance, line.credit_balance
                );
            }
            println!(
                "{:<49} {:>15} {:>15}",
                "Totals", trial_balance.total_debits, trial_balance.total_credits
            );
            if !trial_balance.is_balanced {
                return Err(anyhow!("trial balance does not balance"));
            }
        }
        Command::Recompute { account } => {
            let account = ledger.account(&account).await?;
            let outcomes = ledger.recompute_account(account.id).await?;
            let drifted = outcomes.iter().filter(|o| o.drifted).count();
            tracing::info!(
                account = %account.code,
                periods = outcomes.len(),
                drifted,
                "Balances recomputed"
            );
        }
        Command::ClosePeriod { period, notes } => {
            let target = ledger
                .periods(None)
                .await?
                .into_iter()
                .find(|p| p.name.eq_ignore_ascii_case(&period))
                .ok_or_else(|| anyhow!("no period named {:?}", period))?;
            let outcome = ledger.close_period(target.id, &actor, notes).await?;
            tracing::info!(
                period = %outcome.period.name,
                net_income = %outcome.net_income,
                closing_entry = ?outcome.closing_entry.as_ref().map(|e| e.number.as_str()),
                "Period closed"
            );
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}
