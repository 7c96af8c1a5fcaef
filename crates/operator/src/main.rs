use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use kube::{Api, ResourceExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use redkeep_core::{classify_topology, LifecyclePhase, PhaseLatch};
use redkeep_kubehub::{get_kube_client, observe_cluster, KubePlatform};
use redkeep_reconcile::{run_controller, Context, ReconcilerConfig, Unprovisioned};
use redkeep_schema::RedisCluster;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "redkeep", version, about = "Redis cluster operator")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: current context)
    #[arg(long = "namespace", env = "REDKEEP_NAMESPACE", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the RedisCluster controller until interrupted
    Run(RunArgs),
    /// Observe one cluster and print its lifecycle phase
    Status {
        /// RedisCluster name
        name: String,
    },
    /// Print the RedisCluster CRD manifest
    Crds,
    /// Validate an install bundle ("-" reads stdin)
    Bundle {
        path: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Requeue interval for Ready clusters
    #[arg(long = "requeue-ready-secs", default_value_t = 300)]
    requeue_ready_secs: u64,
    /// Requeue interval for clusters being created
    #[arg(long = "requeue-pending-secs", default_value_t = 10)]
    requeue_pending_secs: u64,
    /// Requeue interval for clusters in an unrecognized state
    #[arg(long = "requeue-unknown-secs", default_value_t = 30)]
    requeue_unknown_secs: u64,
    /// Backoff after a failed reconcile
    #[arg(long = "error-backoff-secs", default_value_t = 15)]
    error_backoff_secs: u64,
    /// Create the cluster namespace as the first bootstrap step
    #[arg(long = "create-namespace", action = ArgAction::SetTrue)]
    create_namespace: bool,
    /// Only watch this namespace (default: all namespaces)
    #[arg(long = "watch-namespace")]
    watch_namespace: Option<String>,
    /// Serve Prometheus metrics on this host:port
    #[arg(long = "metrics-addr", env = "REDKEEP_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl RunArgs {
    fn config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            requeue_ready: Duration::from_secs(self.requeue_ready_secs),
            requeue_pending: Duration::from_secs(self.requeue_pending_secs),
            requeue_unknown: Duration::from_secs(self.requeue_unknown_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            create_namespace: self.create_namespace,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    cluster: String,
    phase: LifecyclePhase,
    leaders: usize,
    followers: usize,
    desired_leaders: u32,
    desired_followers: Option<u64>,
}

/// Logs go to stderr so `crds` and `-o json` output stay machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("REDKEEP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(addr: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = addr else {
        debug!("no metrics address; exporter disabled");
        return Ok(());
    };
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing Prometheus exporter on {}", addr))?;
    info!(addr = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    init_metrics(args.metrics_addr)?;
    let client = get_kube_client().await?;
    let shutdown = CancellationToken::new();
    let ctx = Arc::new(Context {
        platform: Arc::new(KubePlatform::new(client.clone())),
        client,
        latch: PhaseLatch::new(),
        followers: Arc::new(Unprovisioned),
        config: args.config(),
        shutdown: shutdown.clone(),
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; shutting down");
            }
            shutdown.cancel();
        }
    });

    run_controller(ctx, args.watch_namespace).await
}

async fn status(name: &str, namespace: Option<&str>, output: Output) -> Result<()> {
    let client = get_kube_client().await?;
    let ns = namespace.map(str::to_string).unwrap_or_else(|| client.default_namespace().to_string());
    let api: Api<RedisCluster> = Api::namespaced(client.clone(), &ns);
    let obj = api.get(name).await.with_context(|| format!("getting RedisCluster {}/{}", ns, name))?;

    let topology = obj.spec.topology(&ns)?;
    let platform = KubePlatform::new(client);
    let obs = observe_cluster(&platform, &topology, &CancellationToken::new()).await?;
    // Out of process there is no latch; the last published phase stands in for it.
    let previous = obj.status.as_ref().map(|s| s.phase).unwrap_or(LifecyclePhase::Unknown);
    let phase = classify_topology(&topology, &obs.leaders, &obs.followers, previous);

    let view = StatusView {
        cluster: format!("{}/{}", ns, obj.name_any()),
        phase,
        leaders: obs.leaders.len(),
        followers: obs.followers.len(),
        desired_leaders: topology.leaders(),
        desired_followers: topology.expected_followers(),
    };
    match output {
        Output::Human => {
            let want_f = view.desired_followers.map(|n| n.to_string()).unwrap_or_else(|| "?".into());
            println!("{} • {}", view.cluster, view.phase);
            println!("  leaders   {}/{} ({} running)", view.leaders, view.desired_leaders, obs.leaders.running());
            println!("  followers {}/{} ({} running)", view.followers, want_f, obs.followers.running());
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&view)?),
    }
    Ok(())
}

fn bundle(path: &str, output: Output) -> Result<()> {
    let yaml = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?
    };
    let bundle = redkeep_apply::bundle::split_bundle(&yaml)?;
    let summary = bundle.summary();
    match output {
        Output::Human => {
            for line in summary {
                println!("{}", line);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            info!(create_namespace = args.create_namespace, watch = ?args.watch_namespace, "run invoked");
            run(args).await?;
        }
        Commands::Status { name } => {
            info!(name = %name, ns = ?cli.namespace, "status invoked");
            status(&name, cli.namespace.as_deref(), cli.output).await?;
        }
        Commands::Crds => print!("{}", redkeep_schema::crd_yaml()?),
        Commands::Bundle { path } => bundle(&path, cli.output)?,
    }
    Ok(())
}
