use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use corral_core::ResourceKind;
use corral_gateway::{MockGateway, RancherConfig, RancherGateway, RemoteGateway};
use corral_lifecycle::{Context, EngineSettings};
use corral_persist::{SqliteStore, StateStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod doc;
mod run;

use run::Outcome;

#[derive(Parser, Debug)]
#[command(name = "corralctl", version, about = "Drive control-plane objects from YAML documents")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// State database path
    #[arg(long = "db", env = "CORRAL_DB_PATH", global = true)]
    db: Option<String>,

    /// Use an in-memory gateway and store (nothing leaves the process)
    #[arg(long = "mock", action = ArgAction::SetTrue, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update every document, in file order
    Apply {
        /// YAML file ("-" for stdin)
        #[arg(short = 'f', long = "file")]
        file: String,
        /// Print the field plan without changing anything
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Delete every tracked document, in reverse file order
    Destroy {
        #[arg(short = 'f', long = "file")]
        file: String,
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Re-read tracked objects and update stored state
    Refresh {
        #[arg(short = 'f', long = "file")]
        file: String,
    },
    /// Find exactly one object by wire-field filters, e.g. `name=Default clusterId=c-1`
    Lookup {
        kind: String,
        filters: Vec<String>,
    },
    /// Print a kind's field schema
    Schema {
        kind: String,
    },
    /// Print stored state for one object
    Show {
        kind: String,
        name: String,
    },
}

fn init_tracing() {
    let env = std::env::var("CORRAL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CORRAL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CORRAL_METRICS_ADDR; expected host:port");
        }
    }
}

/// Cancel in-flight waits on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; cancelling in-flight operations");
            child.cancel();
        }
    });
    token
}

fn gateway(mock: bool) -> Result<Arc<dyn RemoteGateway>> {
    if mock {
        info!("using in-memory gateway");
        let gw: Arc<dyn RemoteGateway> = Arc::new(MockGateway::new());
        return Ok(gw);
    }
    let cfg = RancherConfig::from_env()?;
    let gw: Arc<dyn RemoteGateway> = Arc::new(RancherGateway::connect(&cfg)?);
    Ok(gw)
}

fn store(cli: &Cli) -> Result<SqliteStore> {
    match (cli.mock, cli.db.as_deref()) {
        (true, _) => SqliteStore::open(":memory:"),
        (false, Some(path)) => SqliteStore::open(path),
        (false, None) => SqliteStore::open_default(),
    }
}

fn print(output: Output, outcomes: &[Outcome]) -> Result<()> {
    match output {
        Output::Human => {
            for o in outcomes {
                let id = o.id.as_deref().unwrap_or("-");
                let action = serde_json::to_value(o.action)?;
                println!("{:<10} {}/{} {}", action.as_str().unwrap_or("?"), o.kind, o.name, id);
                if let Some(plan) = &o.plan {
                    for p in &plan.paths {
                        println!("    ~ {}", p);
                    }
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(outcomes)?),
    }
    Ok(())
}

fn parse_kind(s: &str) -> Result<ResourceKind> { Ok(s.parse::<ResourceKind>()?) }

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Schema { kind } => {
            let schema = corral_schema::schema_for(parse_kind(kind)?);
            match cli.output {
                Output::Human => {
                    for f in schema.fields {
                        let flags = if f.sensitive { " sensitive" } else { "" };
                        println!("{:<36} {:<8} {:?}{}", f.name, f.ty.name(), f.presence, flags);
                    }
                    for g in schema.groups {
                        println!("one of ({}): {}", g.name, g.blocks.join(", "));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(schema)?),
            }
            return Ok(());
        }
        Commands::Show { kind, name } => {
            let st = store(&cli)?;
            match run::show(&st, parse_kind(kind)?, name)? {
                Some(o) => print(cli.output, &[o])?,
                None => bail!("no stored state for {}/{}", kind, name),
            }
            return Ok(());
        }
        _ => {}
    }

    let settings = EngineSettings::from_env()?;
    info!(?settings, "engine settings");
    let ctx = Context::new(gateway(cli.mock)?).with_cancel(cancel_on_ctrl_c()).with_settings(settings);
    let st = store(&cli)?;
    let st: &dyn StateStore = &st;

    let mut outcomes = Vec::new();
    let result = match &cli.command {
        Commands::Apply { file, dry_run } => {
            let docs = doc::read_documents(file)?;
            info!(docs = docs.len(), dry_run = *dry_run, "apply invoked");
            let mut res = Ok(());
            for d in &docs {
                match run::apply(&ctx, st, d, *dry_run).await {
                    Ok(o) => outcomes.push(o),
                    Err(e) => {
                        res = Err(e);
                        break;
                    }
                }
            }
            res
        }
        Commands::Destroy { file, dry_run } => {
            let docs = doc::read_documents(file)?;
            info!(docs = docs.len(), dry_run = *dry_run, "destroy invoked");
            let mut res = Ok(());
            for d in docs.iter().rev() {
                match run::destroy(&ctx, st, d, *dry_run).await {
                    Ok(o) => outcomes.push(o),
                    Err(e) => {
                        res = Err(e);
                        break;
                    }
                }
            }
            res
        }
        Commands::Refresh { file } => {
            let docs = doc::read_documents(file)?;
            info!(docs = docs.len(), "refresh invoked");
            let mut res = Ok(());
            for d in &docs {
                match run::refresh(&ctx, st, d).await {
                    Ok(o) => outcomes.push(o),
                    Err(e) => {
                        res = Err(e);
                        break;
                    }
                }
            }
            res
        }
        Commands::Lookup { kind, filters } => {
            let filters = doc::parse_filters(filters)?;
            run::lookup(&ctx, parse_kind(kind)?, &filters).await.map(|o| outcomes.push(o))
        }
        Commands::Schema { .. } | Commands::Show { .. } => Ok(()),
    };

    // Whatever completed before a failure is still reported.
    print(cli.output, &outcomes)?;
    result
}
