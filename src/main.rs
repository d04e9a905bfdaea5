//! VCT Edge Terminal entry point.
//!
//! Loads configuration, initialises structured logging, opens the database
//! and either serves the dashboard (default) or runs a one-off command.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use vct_edge::analysis::multibets;
use vct_edge::api::{self, ApiState};
use vct_edge::collectors::odds::{self, OddsAgent, OddsRequest, ProcessOddsAgent};
use vct_edge::collectors::veto::{self, VetoTeam};
use vct_edge::config::{AppConfig, Settings};
use vct_edge::engine::MatchAnalyzer;
use vct_edge::format::{bo_label, format_currency, format_odds, format_pct};
use vct_edge::storage::{Database, Dataset};
use vct_edge::types::{DataFilter, OddsEntry};

const BANNER: &str = r#"
 __     __ ____ _____   _____ ____   ____ _____
 \ \   / // ___|_   _| | ____|  _ \ / ___| ____|
  \ \ / /| |     | |   |  _| | | | | |  _|  _|
   \ V / | |___  | |   | |___| |_| | |_| | |___
    \_/   \____| |_|   |_____|____/ \____|_____|

  Valorant esports odds & edge terminal
"#;

#[derive(Parser, Debug)]
#[command(name = "vct-edge")]
#[command(about = "Valorant esports odds tracking and betting analytics")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, env = "VCT_CONFIG", default_value = "config.toml")]
    config: String,

    /// Database url, overrides `[database] url`
    #[arg(long, env = "VCT_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the API and dashboard (default)
    Serve,

    /// Create the database schema and exit
    InitDb,

    /// Import a JSON dataset of events, teams and matches
    Import {
        file: PathBuf,
    },

    /// Print the analysis of a match
    Analyze {
        match_id: i64,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Store odds for a match from a quick string, a JSON file or, with
    /// neither, the configured odds agent
    Odds {
        match_id: i64,

        /// "betano match_winner SEN 1.85; betano map1_ot Yes 7.5"
        #[arg(long, conflicts_with = "file")]
        quick: Option<String>,

        /// JSON array of quotes
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Save a manual veto: "SEN ban Pearl; NRG pick Bind; ...; Split remains"
    Veto {
        match_id: i64,
        text: String,
    },

    /// Hedge calculator
    Hedge {
        #[arg(long)]
        stake: f64,
        #[arg(long)]
        odds: f64,
        #[arg(long)]
        hedge_odds: f64,
        /// Only recover the original stake instead of equalising profit
        #[arg(long)]
        break_even: bool,
    },
}

/// Data filter for a single run, replacing the persisted one when any
/// option is given.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Event ids to draw history from
    #[arg(long, short = 'e', value_delimiter = ',')]
    events: Vec<i64>,

    /// Stage names to draw history from
    #[arg(long, short = 's', value_delimiter = ',')]
    stages: Vec<String>,

    /// Earliest match date (YYYY-MM-DD)
    #[arg(long = "from")]
    date_from: Option<String>,

    /// Latest match date (YYYY-MM-DD)
    #[arg(long = "to")]
    date_to: Option<String>,
}

impl FilterArgs {
    fn apply(self, settings: &mut Settings) {
        if self.events.is_empty() && self.stages.is_empty() && self.date_from.is_none() && self.date_to.is_none() {
            return;
        }
        settings.data_filter = DataFilter {
            event_ids: self.events,
            stage_names: self.stages,
            date_from: self.date_from,
            date_to: self.date_to,
        };
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let mut cfg = AppConfig::load_or_default(&cli.config)?;
    if let Some(url) = cli.database_url {
        cfg.database.url = url;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg).await,
        Commands::InitDb => {
            Database::connect(&cfg.database.url).await?;
            println!("Database ready at {}", cfg.database.url);
            Ok(())
        }
        Commands::Import { file } => import(&cfg, &file).await,
        Commands::Analyze { match_id, filter } => analyze(&cfg, match_id, filter).await,
        Commands::Odds { match_id, quick, file } => store_odds(&cfg, match_id, quick, file).await,
        Commands::Veto { match_id, text } => save_veto(&cfg, match_id, &text).await,
        Commands::Hedge {
            stake,
            odds,
            hedge_odds,
            break_even,
        } => hedge(&cfg, stake, odds, hedge_odds, break_even),
    }
}

/// Persisted runtime settings, seeded from `[defaults]` on first start.
async fn load_settings(db: &Database, cfg: &AppConfig) -> Result<Settings> {
    match db.load_settings().await? {
        Some(settings) => Ok(settings),
        None => {
            db.save_settings(&cfg.defaults).await?;
            info!("Runtime settings seeded from config defaults");
            Ok(cfg.defaults.clone())
        }
    }
}

async fn serve(cfg: AppConfig) -> Result<()> {
    println!("{BANNER}");
    let db = Database::connect(&cfg.database.url).await?;
    let settings = load_settings(&db, &cfg).await?;
    info!(
        host = %cfg.server.host,
        port = cfg.server.port,
        filter = %settings.data_filter.description(),
        bankroll = settings.bankroll.total,
        "VCT Edge Terminal starting up"
    );

    let agent = Arc::new(ProcessOddsAgent::new(cfg.odds_agent.clone()));
    let state = Arc::new(ApiState::new(db, cfg, settings, agent));

    api::serve(state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
}

async fn import(cfg: &AppConfig, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read dataset {}", file.display()))?;
    let dataset = Dataset::from_json(&raw)?;
    let db = Database::connect(&cfg.database.url).await?;
    let report = db.import_dataset(&dataset).await?;
    println!(
        "Imported {} events, {} teams, {} matches, {} maps, {} rounds, {} compositions, {} veto steps",
        report.events, report.teams, report.matches, report.maps, report.rounds, report.compositions, report.vetos
    );
    Ok(())
}

async fn analyze(cfg: &AppConfig, match_id: i64, filter: FilterArgs) -> Result<()> {
    let db = Database::connect(&cfg.database.url).await?;
    let mut settings = load_settings(&db, cfg).await?;
    filter.apply(&mut settings);
    let analyzer = MatchAnalyzer::new(&db, &settings, cfg);
    let report = analyzer.analyze_match(match_id).await?;

    println!("{} | {} | {}", report.info.label(), bo_label(report.bo_type), report.filter.description);
    for m in &report.maps {
        println!(
            "  Map {} {:<8} A win {:>6}  OT {:>6}  [{}; n={}]",
            m.map_order,
            m.map_name,
            format_pct(m.p_team_a_win),
            format_pct(m.p_ot),
            m.confidence,
            m.sample_size
        );
    }
    println!(
        "  Series: {} {} / {} {}",
        report.info.team1_display(),
        format_pct(report.series.p_a_series),
        report.info.team2_display(),
        format_pct(report.series.p_b_series)
    );
    for edge in &report.single_edges {
        println!(
            "  {edge} stake {}",
            format_currency(edge.suggested_stake, &cfg.display.currency_symbol)
        );
    }
    for bet in &report.multi_bets {
        println!("  multi: {}", bet.description);
    }
    for arb in report.arbitrage.iter().filter(|a| a.is_arb) {
        println!("  arbitrage: {}", arb.description);
    }
    Ok(())
}

async fn store_odds(cfg: &AppConfig, match_id: i64, quick: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let db = Database::connect(&cfg.database.url).await?;
    let agent = ProcessOddsAgent::new(cfg.odds_agent.clone());
    let entries = collect_odds(&db, &agent, match_id, quick, file).await?;
    if entries.is_empty() {
        bail!("No valid odds entries found");
    }
    let inserted = db.insert_odds(match_id, &entries).await?;
    println!("Stored {inserted} odds for match {match_id}");
    Ok(())
}

/// Quotes from the quick string or file when given, the odds agent otherwise.
async fn collect_odds(
    db: &Database,
    agent: &dyn OddsAgent,
    match_id: i64,
    quick: Option<String>,
    file: Option<PathBuf>,
) -> Result<Vec<OddsEntry>> {
    let info = db
        .match_info(match_id)
        .await?
        .with_context(|| format!("Match {match_id} not found"))?;

    match (quick, file) {
        (Some(text), _) => Ok(odds::parse_odds_string(&text)),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read odds file {}", path.display()))?;
            Ok(odds::parse_odds_file(&raw)?)
        }
        (None, None) => {
            let request = OddsRequest::for_match(&info);
            println!("Asking the odds agent for {}", request.description);
            Ok(odds::collect_with_agent(agent, &request).await?)
        }
    }
}

async fn save_veto(cfg: &AppConfig, match_id: i64, text: &str) -> Result<()> {
    let db = Database::connect(&cfg.database.url).await?;
    let info = db
        .match_info(match_id)
        .await?
        .with_context(|| format!("Match {match_id} not found"))?;

    let mut teams = Vec::new();
    if let (Some(id), Some(name)) = (info.team1_id, info.team1_name.as_deref()) {
        teams.push(VetoTeam { id, name, tag: info.team1_tag.as_deref() });
    }
    if let (Some(id), Some(name)) = (info.team2_id, info.team2_name.as_deref()) {
        teams.push(VetoTeam { id, name, tag: info.team2_tag.as_deref() });
    }
    let actions = veto::parse_veto(text, &teams);
    if actions.is_empty() {
        bail!("Unable to parse veto text");
    }

    let saved = db.replace_manual_veto(match_id, &actions).await?;
    println!("Saved {saved} veto steps for {}", info.label());
    println!("{}", veto::veto_to_markdown(&veto::to_rows("manual", &actions)));
    Ok(())
}

fn hedge(cfg: &AppConfig, stake: f64, odds: f64, hedge_odds: f64, break_even: bool) -> Result<()> {
    if stake <= 0.0 || odds <= 1.0 || hedge_odds <= 1.0 {
        bail!("stake must be positive and both odds greater than 1.0");
    }
    let plan = multibets::hedge(stake, odds, hedge_odds, !break_even);
    let money = |x: f64| format_currency(x, &cfg.display.currency_symbol);
    println!("Hedge stake:        {} @ {}", money(plan.hedge_stake), format_odds(plan.hedge_odds));
    println!("If original wins:   {}", money(plan.profit_if_original_wins));
    println!("If hedge wins:      {}", money(plan.profit_if_hedge_wins));
    println!("Total invested:     {}", money(plan.total_invested));
    println!("Guaranteed profit:  {}", money(plan.guaranteed_profit));
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vct_edge=info,tower_http=info"));

    if std::env::var("VCT_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
