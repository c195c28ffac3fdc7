use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use warden::{
    adapters::{HttpClientAdapter, HttpHandler, RuleEngine, router},
    config::{ServerConfig, ServerConfigValidator, loader::load_config},
    core::InspectionPipeline,
    metrics,
    ports::{http_client::HttpClient, inspection::InspectionEngine},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "warden.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "warden.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "warden.yaml")]
        config: String,
    },
    /// Start the proxy (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "warden.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config: ServerConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    ServerConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;

    if config.public_origin_is_wildcard() {
        tracing::warn!(
            "public_origin is not set and {} is a wildcard bind; header values will not \
            be rewritten to the upstream origin until public_origin is configured",
            config.listen_addr
        );
    }

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already; continuing.",
            e
        );
    }

    let meter_provider = metrics::init_metrics(&config.metrics)
        .map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    let engine: Arc<dyn InspectionEngine> = Arc::new(
        RuleEngine::from_config(&config.inspection)
            .context("Failed to initialize inspection engine")?,
    );
    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(config.upstream.timeout_duration())
            .context("Failed to create HTTP client adapter")?,
    );
    let pipeline = Arc::new(
        InspectionPipeline::new(engine, http_client, &config)
            .context("Failed to build inspection pipeline")?,
    );
    let app = router(HttpHandler::new(pipeline));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {addr}"))?;

    tracing::info!(
        "Warden listening on {} -> upstream {} (public origin {})",
        addr,
        config.upstream.url,
        config.effective_public_origin()
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let shutdown_signal = graceful_shutdown.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal.wait_for_shutdown_signal().await;
    });
    let server = tokio::spawn(async move { server.await });

    // Bound the drain once shutdown has begun
    let drain_timeout = graceful_shutdown.drain_timeout();
    let server_result = tokio::select! {
        result = server => result.context("Server task failed")?.context("Server error"),
        _ = async {
            graceful_shutdown.wait_for_shutdown_signal().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            tracing::warn!(
                "In-flight requests did not drain within {}, forcing shutdown",
                humantime::format_duration(drain_timeout)
            );
            Ok(())
        }
    };

    metrics::shutdown_metrics(meter_provider);
    tracing::info!("Graceful shutdown completed");
    server_result
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ServerConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        println!();
        println!("💡 Common fixes:");
        println!("   • Ensure all URLs start with http:// or https://");
        println!("   • Check that directive files exist");
        println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
        println!("   • Use humantime durations for timeouts (e.g., '30s')");
        std::process::exit(1);
    }
    println!("✅ Configuration validation: OK");

    match RuleEngine::from_config(&config.inspection) {
        Ok(engine) => println!("✅ Inspection rules: {} loaded", engine.rule_count()),
        Err(e) => {
            eprintln!("❌ Inspection rules failed to load:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    }

    println!();
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr);
    println!("   • Public Origin: {}", config.effective_public_origin());
    println!("   • Upstream: {} (timeout {})", config.upstream.url, config.upstream.timeout);
    println!(
        "   • Body Limits: request {} bytes, response {} bytes",
        config.limits.max_request_body_bytes, config.limits.max_response_body_bytes
    );
    println!(
        "   • Directive Files: {} (builtin signatures: {})",
        config.inspection.directives.len(),
        config.inspection.builtin_signatures
    );
    println!();
    println!("🎉 Configuration is valid and ready to use!");
    Ok(())
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Warden configuration

# The address to listen on
listen_addr: "127.0.0.1:8080"

# Origin clients use to reach the proxy; header values containing it
# (Referer, Origin, ...) are rewritten to the upstream origin.
# Defaults to http://<listen_addr>; set it when binding 0.0.0.0 or [::].
# public_origin: "http://localhost:8080"

# The single backend every inspected request is forwarded to
upstream:
  url: "http://127.0.0.1:8000"
  timeout: "30s"

# Bodies are buffered in full for inspection; larger bodies are rejected
limits:
  max_request_body_bytes: 10485760
  max_response_body_bytes: 10485760

inspection:
  # SQL injection, XSS, command injection and path traversal signatures
  builtin_signatures: true
  # Additional rule files, evaluated in order after the builtin set
  directives: []

# first_value or all_values (keeps repeated Set-Cookie headers)
response_header_policy: first_value

logging:
  level: "info"
  format: json

metrics: {}
#  otlp_endpoint: "http://127.0.0.1:4317"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'warden serve --config {config_path}' to start the proxy");
    Ok(())
}
