#![warn(
    rust_2024_compatibility,
    clippy::all,
    clippy::future_not_send,
    clippy::mod_module_files,
    clippy::needless_pass_by_ref_mut,
    clippy::unused_async
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};
use rama::{
    Layer as RamaLayer,
    graceful::Shutdown,
    http::{layer::trace::TraceLayer, server::HttpServer},
    layer::ConsumeErrLayer,
    rt::Executor,
    tcp::server::TcpListener,
};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use cdn_warden::access;
use cdn_warden::classify::classify;
use cdn_warden::config::{Config, DEFAULT_CONFIG_FILE};
use cdn_warden::proxy::WardenProxy;
use cdn_warden::store::WhitelistSet;

#[derive(Debug, Parser)]
#[command(author, version, about = "Whitelisting cache proxy for npm, GitHub and WordPress CDN assets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the proxy server
    Serve {
        /// Path to the configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Show how a request path would be classified and whether it is allowed
    Check {
        /// Request path, e.g. /npm/@scope/name@1.0.0/index.js
        path: String,
        /// Path to the configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Probe a running instance's health endpoint
    Health {
        #[arg(long, default_value = "http://127.0.0.1:8347/up")]
        url: String,
        /// Timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => run_server(config),
        Command::Check { path, config } => run_check(path, config),
        Command::Health { url, timeout } => run_health(url, timeout),
    }
}

fn run_server(config_path: PathBuf) -> Result<()> {
    let config = Arc::new(Config::load(Some(config_path)).context("loading configuration")?);
    config.validate().context("validating configuration")?;
    init_tracing(&config)?;

    let proxy = WardenProxy::new(config.clone()).context("creating proxy service")?;
    tracing::info!(
        whitelisted = proxy.store().whitelist().len(),
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        api_cache_enabled = config.github_api_cache.enabled,
        api_cache_ttl_secs = config.github_api_cache.ttl_secs,
        authenticated_api = proxy.store().github_token().is_some(),
        "proxy initialized"
    );

    let rt_server = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()
        .context("constructing server runtime")?;

    rt_server.block_on(async move {
        let graceful = Shutdown::default();
        let addr = format!("{}:{}", config.server.host, config.server.port);

        let tcp_service = TcpListener::build()
            .bind(addr.clone())
            .await
            .map_err(|err| anyhow::anyhow!("binding {addr}: {err}"))?;

        tracing::info!(%addr, "starting Rama HTTP server");

        graceful.spawn_task_fn(move |guard| {
            async move {
                let exec = Executor::graceful(guard.clone());
                let http_service = HttpServer::auto(exec).service(
                    (TraceLayer::new_for_http(), ConsumeErrLayer::default()).into_layer(proxy),
                );

                tcp_service.serve_graceful(guard, http_service).await;
            }
        });

        // Wait for ctrl+c to initiate graceful shutdown
        tokio::signal::ctrl_c()
            .await
            .context("listening for shutdown signal")?;

        graceful
            .shutdown_with_limit(Duration::from_secs(30))
            .await?;

        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn run_check(path: String, config_path: PathBuf) -> Result<()> {
    let config = Config::load(Some(config_path)).context("loading configuration")?;
    init_tracing(&config)?;

    let request = match classify(&path) {
        Ok(request) => request,
        Err(err) => bail!("{path}: {err}"),
    };
    let whitelist = WhitelistSet::from_config(&config.whitelist);
    let allowed = access::is_allowed(&request, &whitelist);

    println!("kind:         {}", request.kind);
    println!("identifier:   {}", request.identifier);
    println!("forward path: {}", request.forward_path);
    println!("allowed:      {}", if allowed { "yes" } else { "no" });
    if !allowed {
        println!(
            "official:     {}",
            request.kind.official_url(&request.identifier)
        );
    }
    Ok(())
}

fn run_health(url: String, timeout: u64) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()
        .context("building health check client")?;

    let response = client
        .get(&url)
        .send()
        .context("sending health check request")?;

    if response.status().is_success() {
        println!("cdn-warden healthy: {}", response.status());
        Ok(())
    } else {
        bail!("health endpoint returned status {}", response.status());
    }
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .context("building log filter")?;

    let fmt_layer = if config.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(config.logging.ansi)
            .boxed()
    };

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        use opentelemetry_otlp::WithExportConfig;

        let resource = Resource::builder_empty()
            .with_attributes([
                KeyValue::new("service.name", "cdn-warden"),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])
            .build();

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?;

        let provider = sdktrace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();

        let tracer = provider.tracer("cdn-warden");
        global::set_tracer_provider(provider);

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
    } else {
        registry.try_init()?;
    }
    Ok(())
}
