//! health-runner: one batch scoring run against a health database.
//!
//! Usage:
//!   health-runner --db health.db
//!   health-runner --db health.db --as-of 2024-06-30 --model-dir ./models
//!   health-runner --db health.db --config engine.json --train-only
//!   health-runner --db health.db --json
//!
//! Scheduling is external (cron or similar); each invocation is one run.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use custhealth_core::{
    churn::artifact::FileArtifactStore,
    clock::RunClock,
    config::EngineConfig,
    engine::{RunSummary, ScoringEngine},
    notify::LogNotifier,
    store::HealthStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").context("--db <path> is required")?;
    let model_dir = flag_value(&args, "--model-dir").unwrap_or("./models");
    let train_only = args.iter().any(|a| a == "--train-only");
    let json = args.iter().any(|a| a == "--json");
    let as_of = match flag_value(&args, "--as-of") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("--as-of expects YYYY-MM-DD, got '{raw}'"))?,
        None => Utc::now().date_naive(),
    };
    let config = match flag_value(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if !json {
        println!("health-runner");
        println!("  db:         {db}");
        println!("  as_of:      {as_of}");
        println!("  model_dir:  {model_dir}");
        println!("  trees:      {}", config.churn_model.tree_count);
        println!();
    }

    let store = HealthStore::open(db)?;
    store.migrate()?;

    let mut engine = ScoringEngine::new(store, config, Box::new(FileArtifactStore::new(model_dir)))?
        .with_notifier(Box::new(LogNotifier));
    let clock = RunClock::new(as_of);

    if train_only {
        let version = engine.train_only(&clock)?;
        log::info!("Training-only run finished");
        println!("Trained churn model v{version}");
        return Ok(());
    }

    let summary = engine.run(&clock)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn print_summary(s: &RunSummary) {
    println!("Run {} complete", s.run_id);
    println!("  customers scored:   {}", s.customers_scored);
    println!(
        "  categories:         {} at risk, {} healthy, {} champions",
        s.at_risk, s.healthy, s.champions
    );
    println!("  avg health score:   {:.1}", s.average_health_score);
    println!("  revenue at risk:    ${:.0}/month", s.revenue_at_risk);
    match (s.model_version, &s.model_error) {
        (Some(v), _) => println!(
            "  churn model:        v{v}, {} scored, {} high risk",
            s.predictions, s.high_risk
        ),
        (None, Some(e)) => println!("  churn model:        unavailable ({e})"),
        (None, None) => println!("  churn model:        unavailable"),
    }
    println!(
        "  alerts:             {} ({} critical, {} high, {} medium)",
        s.total_alerts(),
        s.alerts_critical,
        s.alerts_high,
        s.alerts_medium
    );
}
