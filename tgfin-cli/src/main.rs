use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tgfin_core::{GroupId, TxType};
use tgfin_ingest::{Classifier, GroupConfig, JsonFileSource, MessageSource};
use tgfin_ledger::TransactionStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod config;
mod listener;
mod logging;
mod scheduler;
mod service;
mod session;
mod state;

use config::{Config, ConfigError};
use listener::RealtimeListener;
use scheduler::{RefreshState, Refresher, TriggerResult, run_refresh_loop};
use service::FinanceService;
use session::{IngestionSession, Pipeline};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TGFIN_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tgfin", version = VERSION, about = "Track income and expenses posted to chat groups")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh on a schedule and listen for new messages until Ctrl-C
    Run {
        /// Scheduled refreshes only, no push listener
        #[arg(long)]
        no_realtime: bool,
    },

    /// Run one ingestion pass and exit
    Refresh,

    /// List stored transactions (income first, newest first)
    List {
        /// income | expense
        #[arg(long = "type")]
        tx_type: Option<TxType>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Totals, balance, and per-category breakdown
    Summary {
        #[arg(long)]
        json: bool,
    },

    /// Refresh state and record count
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Delete every stored transaction
    Clear {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },

    /// Classify a piece of text as if it were posted in GROUP
    Classify {
        #[arg(long)]
        group: String,

        text: String,
    },

    /// Config file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.tgfin/config.toml with defaults (if missing)
    Init,
    /// Print the effective config (file + environment)
    Show,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
            ConfigCommand::Path => println!("{}", state::config_path()?.display()),
        },

        Command::Run { no_realtime } => {
            let cfg = config::load_config()?;
            let store = open_store(&cfg).await?;
            run(&cfg, store, !no_realtime).await?;
        }

        Command::Refresh => {
            let cfg = config::load_config()?;
            let store = open_store(&cfg).await?;
            let (pipeline, groups) = build_pipeline(&cfg, store).await?;
            let report = IngestionSession::new(pipeline)
                .run(&groups, cfg.refresh.per_group_limit)
                .await?;
            println!(
                "groups ok: {}  failed: {}  added: {} income, {} expense  skipped: {}",
                report.groups_ok,
                report.failed_groups.len(),
                report.merge.added_income,
                report.merge.added_expense,
                report.merge.skipped_duplicates,
            );
            for g in &report.failed_groups {
                println!("  failed: {g}");
            }
        }

        Command::List {
            tx_type,
            offset,
            limit,
            json,
        } => {
            let svc = read_only_service(&config::load_config()?).await?;
            let txns = svc.list(tx_type, offset, limit).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&txns)?);
            } else if txns.is_empty() {
                println!("No transactions.");
            } else {
                for t in &txns {
                    println!(
                        "{:<25}  {:<7}  {:>12.2} {:<3}  {:<13}  {}  {}",
                        t.timestamp,
                        t.tx_type,
                        t.amount,
                        t.currency,
                        t.category,
                        t.group_title,
                        t.description,
                    );
                }
            }
        }

        Command::Summary { json } => {
            let svc = read_only_service(&config::load_config()?).await?;
            let s = svc.summary().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                println!("Income:  {:>14.2}  ({} records)", s.total_income, s.income_count);
                println!("Expense: {:>14.2}  ({} records)", s.total_expense, s.expense_count);
                println!("Balance: {:>14.2}", s.balance);
                if let Some(at) = &s.last_update {
                    println!("Updated: {at}");
                }
                for tx_type in [TxType::Income, TxType::Expense] {
                    let totals = svc.category_totals(tx_type).await;
                    if totals.is_empty() {
                        continue;
                    }
                    println!("\n{tx_type} by category:");
                    for c in totals {
                        println!("  {:<13} {:>14.2}  ({})", c.category, c.total, c.count);
                    }
                }
            }
        }

        Command::Status { json } => {
            let svc = read_only_service(&config::load_config()?).await?;
            let st = svc.status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&st)?);
            } else {
                println!("refreshing:   {}", st.is_refreshing);
                println!("last update:  {}", st.last_update.as_deref().unwrap_or("never"));
                println!("transactions: {}", st.transaction_count);
            }
        }

        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the store without --yes");
            }
            let svc = read_only_service(&config::load_config()?).await?;
            svc.clear().await?;
            println!("Store cleared.");
        }

        Command::Classify { group, text } => {
            let cfg = config::load_config()?;
            let group_id = GroupId::parse(&group);
            let classifier = Classifier::new()?;
            match classifier.classify(&text, &group_id, &cfg.group_type_map()) {
                Some(c) => {
                    println!("type:        {}", c.tx_type);
                    println!("amount:      {} {}", c.amount, c.currency);
                    println!("category:    {}", c.category);
                    println!("description: {}", c.description);
                }
                None => println!("Not a transaction (group {group_id} unmapped, or no amount)."),
            }
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<Arc<TransactionStore>> {
    let store = TransactionStore::open(cfg.store_path()?).await;
    debug!(path = %store.path().display(), "transaction store opened");
    Ok(Arc::new(store))
}

/// Queries work without a valid ingestion config.
async fn read_only_service(cfg: &Config) -> Result<FinanceService> {
    let store = open_store(cfg).await?;
    let last = FinanceService::stored_last_update(&store).await;
    Ok(FinanceService::new(store, Arc::new(RefreshState::seeded(last))))
}

/// Validate config, pick the groups, and wire the file source into a pipeline.
async fn build_pipeline(
    cfg: &Config,
    store: Arc<TransactionStore>,
) -> Result<(Pipeline, Vec<GroupConfig>)> {
    cfg.validate_for_ingestion()?;
    let messages_file = cfg
        .source
        .messages_file
        .clone()
        .ok_or(ConfigError::MissingMessagesFile)?;
    let source: Arc<dyn MessageSource> =
        Arc::new(JsonFileSource::new(messages_file, cfg.poll_interval()));

    let groups = session::resolve_groups(cfg, source.as_ref(), cfg.fetch_timeout()).await?;

    // groups listed by the source may declare a type the config does not
    let mut group_types = cfg.group_type_map();
    for g in &groups {
        if group_types.lookup(&g.id).is_none() {
            if let Some(t) = g.tx_type() {
                group_types.insert(g.id.clone(), t);
            }
        }
    }

    info!(
        groups = groups.len(),
        mapped = group_types.len(),
        source = source.name(),
        "ingestion pipeline ready"
    );
    let pipeline = Pipeline {
        source,
        classifier: Arc::new(Classifier::new()?),
        store,
        group_types,
        call_timeout: cfg.fetch_timeout(),
    };
    Ok((pipeline, groups))
}

/// Supervise the refresh loop and the listener until Ctrl-C.
async fn run(cfg: &Config, store: Arc<TransactionStore>, realtime: bool) -> Result<()> {
    let (pipeline, groups) = build_pipeline(cfg, store.clone()).await?;

    let refresher = Arc::new(Refresher::new(
        IngestionSession::new(pipeline.clone()),
        groups.clone(),
        cfg.refresh.per_group_limit,
        Arc::new(RefreshState::new()),
    ));
    let svc = FinanceService::new(store, refresher.state().clone()).with_refresher(refresher.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_loop = tokio::spawn(run_refresh_loop(
        refresher.clone(),
        cfg.refresh_interval(),
        shutdown_rx,
    ));

    let listener = if realtime && cfg.refresh.realtime {
        let l = RealtimeListener::new(pipeline, groups.iter().map(|g| g.id.clone()).collect());
        match l.start().await {
            Ok(()) => Some(l),
            Err(e) => {
                warn!(error = %e, "realtime listener unavailable; scheduled refreshes only");
                None
            }
        }
    } else {
        None
    };

    match &listener {
        Some(l) => loop {
            tokio::select! {
                r = tokio::signal::ctrl_c() => {
                    r.context("wait for ctrl-c")?;
                    break;
                }
                exit = l.join() => {
                    warn!(?exit, "realtime listener ended; reconnecting");
                    // pick up whatever arrived around the disconnect
                    if svc.trigger_refresh() == TriggerResult::AlreadyRunning {
                        info!("refresh already in flight");
                    }
                    if let Err(e) = l.start().await {
                        warn!(error = %e, "realtime listener could not reconnect; scheduled refreshes only");
                        tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
                        break;
                    }
                }
            }
        },
        None => tokio::signal::ctrl_c().await.context("wait for ctrl-c")?,
    }

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    if let Some(l) = &listener {
        info!(state = ?l.state(), "stopping realtime listener");
        l.stop().await;
    }
    refresh_loop.await.context("join refresh loop")?;

    let st = svc.status().await;
    info!(
        transactions = st.transaction_count,
        last_update = st.last_update.as_deref().unwrap_or("never"),
        "stopped"
    );
    Ok(())
}
