//! crew-server entry point
//!
//! - `crew-server` / `crew-server serve` - HTTP server
//! - `crew-server run <topic>` - One research run in the terminal
//! - `crew-server check` - Validate the configuration
//! - `crew-server workers` - Show the configured workers

use anyhow::{Context, Result};
use crew::{
    api::routes::create_router,
    cli::{output::Output, Cli, Commands},
    types::{ResearchRequest, ResearchResponse},
    workflows::Stage,
    AppState, ConfigBasedLLMFactory, CrewConfig, CrewConfigManager, LLMClientFactoryTrait,
    ToolRegistry, WorkflowEngine,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Err(e) = run(&cli, &output).await {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, output: &Output) -> Result<()> {
    let config = CrewConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.server.log_level, cli.verbose, cli.json_logs);

    match cli.command() {
        Commands::Serve => serve(cli).await,
        Commands::Run { topic, plan, json } => {
            run_research(&config, output, ResearchRequest { topic, plan }, json).await
        }
        Commands::Check => check(&config, cli, output),
        Commands::Workers => {
            list_workers(&config, output);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level (debug with `--verbose`).
fn init_tracing(level: &str, verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "crew={level},crew_server={level},tower_http={level}",
            level = level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn serve(cli: &Cli) -> Result<()> {
    let mut manager = CrewConfigManager::new(&cli.config)?;
    let config = manager.config();
    for warning in config.validate_with_warnings()? {
        warn!("{}", warning);
    }
    if let Err(e) = manager.start_watching() {
        warn!("Config hot reload disabled: {}", e);
    }

    let llm_factory: Arc<dyn LLMClientFactoryTrait> =
        Arc::new(ConfigBasedLLMFactory::from_config(&config)?);
    let tool_registry = Arc::new(ToolRegistry::from_config(&config)?);
    info!(
        tools = ?tool_registry.tool_names(),
        mode = %config.research.mode,
        workers = config.research.effective_workers().len(),
        "research pipeline configured"
    );

    let state = AppState {
        config_manager: Arc::new(manager),
        llm_factory,
        tool_registry,
    };

    let app = create_router()
        .layer(RequestBodyLimitLayer::new(config.server.body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", crew::api::ApiDoc::openapi()),
        )
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("crew-server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

async fn run_research(
    config: &CrewConfig,
    output: &Output,
    request: ResearchRequest,
    json: bool,
) -> Result<()> {
    let factory = ConfigBasedLLMFactory::from_config(config)?;
    let tools = Arc::new(ToolRegistry::from_config(config)?);
    let engine = WorkflowEngine::from_config(config, &factory, tools).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    if !json {
        output.banner();
        output.info(&format!("Researching \"{}\"", request.topic.trim()));
    }

    let start = Instant::now();
    let (tx, mut rx) = mpsc::channel(16);
    let pipeline = async {
        let tx = tx;
        engine.run(&request, Some(&tx), &cancel).await
    };
    let progress = async {
        let mut step = 0;
        while let Some(event) = rx.recv().await {
            step += 1;
            if !json {
                output.stage(step, Stage::ORDER.len(), &event);
            }
        }
    };
    let (result, ()) = tokio::join!(pipeline, progress);
    let state = result?;
    let response = ResearchResponse::from_state(&state, start.elapsed().as_millis() as u64);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    output.header("Workers");
    for worker in &response.workers {
        output.worker(worker);
    }
    output.header("Report");
    println!("\n{}\n", response.report);
    output.success(&format!("Done in {} ms", response.duration_ms));
    Ok(())
}

fn check(config: &CrewConfig, cli: &Cli, output: &Output) -> Result<()> {
    let warnings = config.validate_with_warnings()?;
    output.success(&format!("{} is valid", cli.config.display()));

    output.header("Research");
    output.kv("mode", &config.research.mode.to_string());
    output.kv("failure policy", &format!("{:?}", config.research.failure_policy));
    output.kv(
        "max tool iterations",
        &config.research.max_tool_iterations.to_string(),
    );
    output.kv(
        "default model",
        config.default_model().unwrap_or("(none)"),
    );

    output.header("Models");
    for name in config.models.keys() {
        output.list_item(name);
    }
    output.header("Tools");
    for name in config.enabled_tools() {
        output.list_item(name);
    }

    if !warnings.is_empty() {
        output.header("Warnings");
        for warning in &warnings {
            output.warning(&warning.to_string());
        }
    }
    Ok(())
}

fn list_workers(config: &CrewConfig, output: &Output) {
    output.header(&format!("Workers ({} mode)", config.research.mode));
    output.table_header(&["Worker", "Model", "Tools"]);
    for identity in config.research.effective_workers() {
        let agent = identity.agent_name();
        let tools = config.agent_tools(agent).join(",");
        output.table_row(&[
            identity.as_str(),
            config.agent_model(agent).unwrap_or("-"),
            tools.as_str(),
        ]);
    }

    if config.research.effective_workers().is_empty() {
        output.hint("No workers configured; set [research].workers in crew.toml");
    }
}
