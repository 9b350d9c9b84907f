use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use raisket_engine::calculators::{
    amortization_schedule, amortize, compute_bonus_today, project, BonusParameters,
    CompoundInterestParameters, LoanParameters, MAX_SCHEDULE_YEARS,
};
use raisket_engine::{
    load_relational, load_rows, logging, reconcile_all, EngineConfig, ImportReport, ImportRun,
    SqliteStore,
};

#[derive(Parser)]
#[command(name = "raisket")]
#[command(about = "Financial product catalogue: import, ratings, calculators")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./raisket.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides config and RAISKET_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one product-family sheet (CSV)
    Import {
        csv: PathBuf,
        /// Product family of the sheet, e.g. credito, prestamos, inversiones
        #[arg(long)]
        family: String,
    },
    /// Import a JSON array of relational (or kind-tagged) product records
    ImportJson { file: PathBuf },
    /// Add a family sheet's detail columns to products already imported
    /// (rows keyed by id_producto, id or slug)
    Enrich { csv: PathBuf },
    /// Recompute every product's rating summary from approved reviews
    ReconcileRatings,
    /// Fixed monthly payment for a loan
    Loan {
        principal: f64,
        /// Annual rate in percent, e.g. 12 for 12%
        rate: f64,
        years: u32,
        /// Print the month-by-month schedule
        #[arg(long)]
        schedule: bool,
    },
    /// Year-by-year compound interest projection
    Compound {
        initial: f64,
        monthly: f64,
        /// Annual rate in percent
        rate: f64,
        years: u32,
    },
    /// Aguinaldo (year-end bonus) for this year
    Bonus {
        /// Monthly salary
        salary: f64,
        /// Bonus days (config default when omitted)
        #[arg(long)]
        days: Option<f64>,
        /// Start date if you did not work the full year (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    logging::init_logging(&config.log_filter);
    debug!(db = %config.database_path.display(), "configuration loaded");

    match cli.command {
        Commands::Import { csv, family } => run_import(&config, &csv, &family),
        Commands::ImportJson { file } => run_import_json(&config, &file),
        Commands::Enrich { csv } => run_enrich(&config, &csv),
        Commands::ReconcileRatings => run_reconcile(&config),
        Commands::Loan {
            principal,
            rate,
            years,
            schedule,
        } => run_loan(principal, rate, years, schedule),
        Commands::Compound {
            initial,
            monthly,
            rate,
            years,
        } => run_compound(initial, monthly, rate, years),
        Commands::Bonus { salary, days, start } => run_bonus(&config, salary, days, start),
    }
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn open_store(config: &EngineConfig) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    println!("✓ Database ready: {}", config.database_path.display());
    Ok(store)
}

fn print_report(report: &ImportReport, store: &SqliteStore) -> Result<()> {
    println!("✓ Inserted:  {}", report.inserted);
    println!("✓ Updated:   {}", report.updated);
    println!("✓ Unchanged: {}", report.unchanged);

    if !report.errors.is_empty() {
        println!("\n⚠️  Skipped rows:");
        for error in &report.errors {
            println!("   row {}: {}", error.row, error.reason);
        }
    }

    println!("\n🔍 Verifying database...");
    println!("✓ Products:     {}", store.count_products()?);
    println!("✓ Institutions: {}", store.count_institutions()?);

    println!("\n{}", RULE);
    if report.errors.is_empty() {
        println!("🎉 Import complete: {}", report.summary());
    } else {
        println!("✅ Import finished with errors: {}", report.summary());
    }
    Ok(())
}

fn run_import(config: &EngineConfig, csv_path: &Path, family: &str) -> Result<()> {
    println!("🗄️  Product Import - {} → SQLite", family);
    println!("{}", RULE);

    println!("\n📂 Loading sheet...");
    let rows = load_rows(csv_path)
        .with_context(|| format!("Failed to read sheet {}", csv_path.display()))?;
    println!("✓ Loaded {} rows from {}", rows.len(), csv_path.display());

    println!("\n🔧 Setting up database...");
    let mut store = open_store(config)?;

    println!("\n💾 Importing products...");
    let report = ImportRun::new(&mut store, config).import_rows(family, rows);

    print_report(&report, &store)
}

fn run_import_json(config: &EngineConfig, file: &Path) -> Result<()> {
    println!("🗄️  Product Import - JSON records → SQLite");
    println!("{}", RULE);

    println!("\n📂 Loading records...");
    let records = load_relational(file)
        .with_context(|| format!("Failed to read records {}", file.display()))?;
    println!("✓ Loaded {} records from {}", records.len(), file.display());

    println!("\n🔧 Setting up database...");
    let mut store = open_store(config)?;

    println!("\n💾 Importing products...");
    let report = ImportRun::new(&mut store, config).import_records(records);

    print_report(&report, &store)
}

fn run_enrich(config: &EngineConfig, csv_path: &Path) -> Result<()> {
    println!("🧩 Product Details - family sheet → SQLite");
    println!("{}", RULE);

    println!("\n📂 Loading sheet...");
    let rows = load_rows(csv_path)
        .with_context(|| format!("Failed to read sheet {}", csv_path.display()))?;
    println!("✓ Loaded {} rows from {}", rows.len(), csv_path.display());

    println!("\n🔧 Setting up database...");
    let mut store = open_store(config)?;

    println!("\n💾 Applying details...");
    let report = ImportRun::new(&mut store, config).enrich_rows(rows);

    print_report(&report, &store)
}

fn run_reconcile(config: &EngineConfig) -> Result<()> {
    println!("⭐ Rating Reconciliation");
    println!("{}", RULE);

    let mut store = open_store(config)?;
    let report = reconcile_all(&mut store).context("Failed to list products")?;

    for (product_id, reason) in &report.failures {
        println!("❌ {}: {}", product_id, reason);
    }

    println!("\n{}", RULE);
    println!("✅ {}", report.summary());
    Ok(())
}

fn run_loan(principal: f64, rate: f64, years: u32, schedule: bool) -> Result<()> {
    let params = LoanParameters {
        principal,
        annual_rate_percent: rate,
        term_years: years,
    };

    println!("🧮 Loan: {:.2} at {}% for {} years", principal, rate, years);
    println!("{}", RULE);

    let Some(quote) = amortize(&params) else {
        println!("⚠️  No result for these inputs");
        return Ok(());
    };

    println!("Monthly payment: {:>14.2}", quote.monthly_payment);
    println!("Total payment:   {:>14.2}", quote.total_payment);
    println!("Total interest:  {:>14.2}", quote.total_interest);

    if schedule {
        if let Some(rows) = amortization_schedule(&params) {
            println!("\n{:>5} {:>12} {:>12} {:>12} {:>14}", "month", "payment", "interest", "principal", "balance");
            for row in rows {
                println!(
                    "{:>5} {:>12.2} {:>12.2} {:>12.2} {:>14.2}",
                    row.month, row.payment, row.interest, row.principal, row.balance
                );
            }
        } else {
            println!("\n⚠️  Schedules are limited to {} years", MAX_SCHEDULE_YEARS);
        }
    }
    Ok(())
}

fn run_compound(initial: f64, monthly: f64, rate: f64, years: u32) -> Result<()> {
    let params = CompoundInterestParameters {
        initial_deposit: initial,
        monthly_contribution: monthly,
        annual_rate_percent: rate,
        years,
    };

    println!("📈 Compound interest: {:.2} + {:.2}/month at {}%", initial, monthly, rate);
    println!("{}", RULE);

    let Some(series) = project(&params) else {
        println!("⚠️  No result for these inputs");
        return Ok(());
    };

    println!("{:>4} {:>16} {:>16} {:>16}", "year", "principal", "interest", "total");
    for year in series {
        println!(
            "{:>4} {:>16.2} {:>16.2} {:>16.2}",
            year.year, year.principal, year.interest, year.total
        );
    }
    Ok(())
}

fn run_bonus(config: &EngineConfig, salary: f64, days: Option<f64>, start: Option<NaiveDate>) -> Result<()> {
    let params = BonusParameters {
        monthly_salary: salary,
        bonus_days: days.unwrap_or(config.default_bonus_days),
        worked_full_year: start.is_none(),
        start_date: start,
    };

    println!("🎁 Aguinaldo for a monthly salary of {:.2}", salary);
    println!("{}", RULE);

    let Some(quote) = compute_bonus_today(&params) else {
        println!("⚠️  No result for these inputs");
        return Ok(());
    };

    println!("Daily salary: {:>12.2}", quote.daily_salary);
    println!("Days worked:  {:>12}", quote.days_worked);
    println!("Proration:    {:>12.4}", quote.proration);
    println!("Aguinaldo:    {:>12.2}", quote.amount);
    Ok(())
}
