// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The `xdscp` binary: `serve-worker` and `serve-web` run the two halves
//! of the control plane described in section 5, `validate-config` checks
//! a config file without starting anything, and the hidden
//! `render-worker` subcommand is the self-exec target `xdscp-render`'s
//! subprocess isolation spawns.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use xdscp_cache::{CacheBackend, DualCache, LocalCache, RemoteCache};
use xdscp_config::{RemoteBackendConfig, XdscpConfig};
use xdscp_context::{ContextTask, LeaderGate, TemplateContextScheduler};
use xdscp_core::{EventBus, ResourceType, TemplateSpec, DEFAULT_SCOPE};
use xdscp_loadable::{LoadContext, LoadRegistry};
use xdscp_queue::RenderQueue;
use xdscp_render::{run_render_worker, RenderPipeline, TemplateTable, RENDER_WORKER_SUBCOMMAND};
use xdscp_source::{GlobalModifier, MatchingConfig, Modifier, Poller, PollerRetryConfig, PluginRegistry, Source};
use xdscp_worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "xdscp", version, about = "Envoy xDS control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker half: source polling, the template context
    /// scheduler, the render pipeline, and the client registration
    /// endpoint.
    ServeWorker {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "0.0.0.0:9001")]
        bind: String,
        /// Identity of this replica for leader election. Only set this
        /// when running more than one `serve-worker` replica against the
        /// same sources and cache; a single replica always self-elects.
        #[arg(long)]
        node_id: Option<String>,
    },

    /// Run the web half: the outward xDS HTTP surface, reading from the
    /// same cache the worker writes to.
    ServeWeb {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "0.0.0.0:9000")]
        bind: String,
        /// Base URL of a worker's registration endpoint, e.g.
        /// `http://worker:9001`.
        #[arg(long)]
        worker_url: String,
    },

    /// Load and validate a config file, printing the result.
    ValidateConfig {
        #[arg()]
        config: PathBuf,
    },

    /// Render a single job read from stdin and write the result to
    /// stdout. Not meant to be invoked directly — this is the child side
    /// of `xdscp_render`'s subprocess isolation.
    #[command(name = "render-worker", hide = true)]
    RenderWorker {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug { EnvFilter::new("xdscp=debug") } else { EnvFilter::new("xdscp=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::ServeWorker { config, bind, node_id } => serve_worker(config, bind, node_id).await,
        Commands::ServeWeb { config, bind, worker_url } => serve_web(config, bind, worker_url).await,
        Commands::ValidateConfig { config } => validate_config_cmd(config),
        Commands::RenderWorker { config } => render_worker_cmd(config).await,
    }
}

fn load_and_validate(path: &PathBuf) -> Result<XdscpConfig> {
    let config = xdscp_config::load_from_file(path).with_context(|| format!("loading config {}", path.display()))?;
    xdscp_config::validate(&config).with_context(|| format!("validating config {}", path.display()))?;
    Ok(config)
}

fn validate_config_cmd(config_path: PathBuf) -> Result<()> {
    match load_and_validate(&config_path) {
        Ok(config) => {
            println!("{} is valid: {} source(s), {} template version(s)", config_path.display(), config.sources.len(), config.templates.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} is invalid: {e:#}");
            std::process::exit(1);
        }
    }
}

fn parse_resource_type(s: &str) -> Option<ResourceType> {
    Some(match s {
        "clusters" => ResourceType::Clusters,
        "listeners" => ResourceType::Listeners,
        "routes" => ResourceType::Routes,
        "endpoints" => ResourceType::Endpoints,
        "secrets" => ResourceType::Secrets,
        "scoped-routes" => ResourceType::ScopedRoutes,
        "runtime" => ResourceType::Runtime,
        _ => return None,
    })
}

/// Build the version/resource-type template table from config, reading
/// each entry's `path` as a Jinja text template. `depends_on` is parsed
/// but not yet consulted by the render pipeline itself.
fn build_template_table(config: &XdscpConfig) -> Result<TemplateTable> {
    let mut table = TemplateTable::new();
    for (version_key, by_type) in &config.templates {
        for (type_key, entry) in by_type {
            let resource_type =
                parse_resource_type(type_key).with_context(|| format!("unknown resource type {type_key:?} in templates.{version_key}"))?;
            let source = std::fs::read_to_string(&entry.path).with_context(|| format!("reading template {:?}", entry.path))?;
            table.insert(version_key.clone(), resource_type, TemplateSpec::Text { source });
        }
    }
    Ok(table)
}

/// Resolve `sources[]`, `modifiers[]`, and `global_modifiers[]` into live
/// trait objects via the build-time plugin registry, and assemble the
/// Source Poller.
fn build_poller(config: &XdscpConfig, events: EventBus) -> Result<Poller> {
    let registry = PluginRegistry::with_bundled_sources();

    let mut sources: Vec<Box<dyn Source>> = Vec::new();
    for source_config in &config.sources {
        let scope = source_config.scope.clone().unwrap_or_else(|| DEFAULT_SCOPE.to_string());
        let source = registry
            .build_source(&source_config.kind, &scope, &source_config.config)
            .with_context(|| format!("building source of type {:?}", source_config.kind))?;
        sources.push(source);
    }

    let mut modifiers: Vec<Box<dyn Modifier>> = Vec::new();
    for name in &config.modifiers {
        modifiers.push(registry.build_modifier(name, &serde_json::Value::Null).with_context(|| format!("building modifier {name:?}"))?);
    }

    let mut global_modifiers: Vec<Box<dyn GlobalModifier>> = Vec::new();
    for name in &config.global_modifiers {
        global_modifiers
            .push(registry.build_global_modifier(name, &serde_json::Value::Null).with_context(|| format!("building global modifier {name:?}"))?);
    }

    let matching = MatchingConfig {
        enabled: config.matching.enabled,
        node_key: config.matching.node_key.clone(),
        source_key: config.matching.source_key.clone(),
        debug: config.matching.debug,
    };

    Ok(Poller::new(sources, global_modifiers, modifiers, matching, PollerRetryConfig::default(), events))
}

fn build_context_tasks(config: &XdscpConfig) -> Result<Vec<ContextTask>> {
    let mut tasks = Vec::new();
    for (name, entry) in &config.template_context.context {
        let spec = xdscp_loadable::from_config(&entry.load).map_err(|reason| anyhow::anyhow!("context task {name:?}: {reason}"))?;
        let interval = spec.interval.clone().unwrap_or(xdscp_config::TaskInterval::Seconds(60));
        let retry_policy = spec.retry_policy.unwrap_or_default();
        tasks.push(ContextTask { name: name.clone(), spec, interval, retry_policy });
    }
    Ok(tasks)
}

fn build_remote_cache(remote: &RemoteBackendConfig, compaction_threshold: usize) -> Result<Arc<dyn CacheBackend>> {
    let mut builder = object_store::aws::AmazonS3Builder::from_env().with_bucket_name(&remote.bucket);
    if let Some(endpoint) = &remote.endpoint {
        builder = builder.with_endpoint(endpoint).with_allow_http(true);
    }
    let store = builder.build().context("building remote cache object store")?;
    let store: Arc<dyn ObjectStore> = Arc::new(store);
    Ok(Arc::new(RemoteCache::new(store, remote.prefix.clone(), compaction_threshold)))
}

/// Build the local cache tier (also the registration store) and the dual
/// cache wrapping it plus an optional remote tier.
fn build_caches(config: &XdscpConfig) -> Result<(Arc<LocalCache>, Arc<DualCache>)> {
    let local = Arc::new(LocalCache::new(&config.cache.local_fs_path)?);
    let remote = match &config.cache.remote_backend {
        Some(r) => Some(build_remote_cache(r, config.cache.compaction_threshold)?),
        None => None,
    };
    let dual = Arc::new(DualCache::new(local.clone(), remote, Duration::from_secs(config.cache.provisional_ttl_secs)));
    Ok((local, dual))
}

async fn serve_worker(config_path: PathBuf, bind: String, node_id: Option<String>) -> Result<()> {
    let config = load_and_validate(&config_path)?;
    let events = EventBus::default();

    let poller = build_poller(&config, events.clone())?;
    let source_snapshot = poller.snapshot_handle();

    let tasks = build_context_tasks(&config)?;
    let scheduler = Arc::new(TemplateContextScheduler::new(tasks, events.clone(), LoadContext::default()));

    let table = build_template_table(&config)?;
    let pipeline = Arc::new(RenderPipeline::new(table, LoadRegistry::new()));

    let queue = Arc::new(RenderQueue::new(config.queue_capacity));
    let (registration_store, cache) = build_caches(&config)?;

    let self_exe = std::env::current_exe().context("resolving current executable for render subprocess isolation")?;
    let render_mode = xdscp_worker::RenderMode::Subprocess {
        self_exe,
        config_path: config_path.clone(),
        timeout: Duration::from_secs(config.render_timeout_secs),
    };

    let worker = Arc::new(Worker::new(
        source_snapshot,
        scheduler.clone(),
        pipeline,
        queue,
        cache,
        registration_store,
        events,
        config.cache.hash_rules.clone(),
        config.cache.local_ttl_secs.map(Duration::from_secs),
        render_mode,
    ));

    worker.hydrate_registrations().await?;
    match node_id {
        Some(node_id) => {
            let gate = Arc::new(LeaderGate::new());
            worker.clone().spawn_background_tasks_electing_leader(poller, scheduler, gate, node_id);
        }
        None => worker.clone().spawn_background_tasks(poller, scheduler),
    }

    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(bind, "xdscp worker listening");
    axum::serve(listener, worker.router()).await.context("worker http server")?;
    Ok(())
}

async fn serve_web(config_path: PathBuf, bind: String, worker_url: String) -> Result<()> {
    let config = load_and_validate(&config_path)?;
    let (_registration_store, cache) = build_caches(&config)?;

    let read_side = Arc::new(xdscp_web::ReadSide::new(
        cache,
        worker_url,
        config.cache.hash_rules.clone(),
        Duration::from_millis(config.poll_interval_ms),
        Duration::from_secs(config.cache.read_timeout_secs),
    ));
    let state = xdscp_web::WebState { read_side, no_change_status: config.no_change_status };

    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(bind, "xdscp web listening");
    axum::serve(listener, xdscp_web::router(state)).await.context("web http server")?;
    Ok(())
}

/// Build a pipeline from config and run one job off stdin. The parent
/// (`xdscp_render::render_in_subprocess`) re-execs this same binary with
/// `render-worker --config <path>` for every render, so a looping or
/// crashing template only ever takes down this child.
async fn render_worker_cmd(config_path: PathBuf) -> Result<()> {
    let config = load_and_validate(&config_path)?;
    let table = build_template_table(&config)?;
    let pipeline = RenderPipeline::new(table, LoadRegistry::new());
    run_render_worker(&pipeline).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn render_worker_subcommand_name_matches_the_subprocess_constant() {
        let cmd = Cli::command();
        let names: Vec<&str> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        assert!(names.contains(&RENDER_WORKER_SUBCOMMAND));
    }

    #[test]
    fn parses_minimal_serve_worker_invocation() {
        let cli = Cli::try_parse_from(["xdscp", "serve-worker", "--config", "xdscp.toml"]).unwrap();
        match cli.command {
            Commands::ServeWorker { config, bind, node_id } => {
                assert_eq!(config, PathBuf::from("xdscp.toml"));
                assert_eq!(bind, "0.0.0.0:9001");
                assert_eq!(node_id, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_serve_worker_with_node_id() {
        let cli = Cli::try_parse_from(["xdscp", "serve-worker", "--config", "xdscp.toml", "--node-id", "worker-a"]).unwrap();
        match cli.command {
            Commands::ServeWorker { node_id, .. } => assert_eq!(node_id.as_deref(), Some("worker-a")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
