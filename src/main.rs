use std::sync::Arc;

use switchboard::agent::{Engine, EngineDeps, Router};
use switchboard::api::chat_routes;
use switchboard::config::{
    EngineConfig, KakaoConfig, NaverConfig, ServerConfig, SmtpConfig, guardrail_from_env,
};
use switchboard::error::Result;
use switchboard::guardrail::GuardrailGate;
use switchboard::llm::{LlmConfig, create_provider};
use switchboard::memory::ConversationMemory;
use switchboard::tools::{Tool, ToolRegistry};
use switchboard::tools::builtin::{NaverSearchTool, SendEmailTool, SmtpMailer, calendar_tools};
use switchboard::worker::{WorkerAdapter, WorkerKind, WorkerLimits};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run().await?;
    Ok(())
}

async fn run() -> Result<()> {
    // A provider may already be installed by a dependency.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let engine_config = EngineConfig::from_env();
    engine_config.validate()?;
    let server_config = ServerConfig::from_env();

    let llm_config = LlmConfig::from_env()?;
    let llm = create_provider(&llm_config)?;

    let gate = Arc::new(GuardrailGate::new(guardrail_from_env()?)?);

    eprintln!("🔀 Switchboard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   API: http://{}/api/v1/chat", server_config.bind_addr());

    // ── Workers ─────────────────────────────────────────────────────────
    let limits = WorkerLimits {
        max_tool_calls: engine_config.max_tool_calls,
        llm_timeout: engine_config.llm_timeout,
        tool_timeout: engine_config.tool_timeout,
    };
    let mut workers = vec![WorkerAdapter::new(
        WorkerKind::Chat,
        llm.clone(),
        Arc::new(ToolRegistry::new()),
        limits,
    )];

    match NaverConfig::from_env() {
        Some(naver) => {
            let tools =
                ToolRegistry::with_tools([Arc::new(NaverSearchTool::new(naver)) as Arc<dyn Tool>]);
            workers.push(WorkerAdapter::new(
                WorkerKind::Search,
                llm.clone(),
                Arc::new(tools),
                limits,
            ));
        }
        None => eprintln!("   Researcher: disabled (NAVER_CLIENT_ID not set)"),
    }

    match KakaoConfig::from_env() {
        Some(kakao) => {
            let tools = ToolRegistry::with_tools(calendar_tools(kakao));
            workers.push(WorkerAdapter::new(
                WorkerKind::Calendar,
                llm.clone(),
                Arc::new(tools),
                limits,
            ));
        }
        None => eprintln!("   Calendar: disabled (KAKAO_ACCESS_TOKEN not set)"),
    }

    match SmtpConfig::from_env() {
        Some(mut smtp) => {
            // Give up on the relay before the worker gives up on the tool.
            smtp.timeout = smtp.timeout.min(engine_config.tool_timeout / 2);
            let mailer = Arc::new(SmtpMailer::new(smtp));
            let tools = ToolRegistry::with_tools([
                Arc::new(SendEmailTool::new(mailer, Arc::clone(&gate))) as Arc<dyn Tool>
            ]);
            workers.push(WorkerAdapter::new(
                WorkerKind::Mail,
                llm.clone(),
                Arc::new(tools),
                limits,
            ));
        }
        None => eprintln!("   Mail: disabled (SMTP_HOST not set)"),
    }

    let kinds: Vec<WorkerKind> = workers.iter().map(|w| w.kind()).collect();
    let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
    eprintln!("   Workers: {}\n", names.join(", "));

    // ── Engine ──────────────────────────────────────────────────────────
    let deps = EngineDeps {
        memory: Arc::new(ConversationMemory::new(engine_config.max_turns)),
        gate,
        router: Router::new(llm, kinds).with_timeout(engine_config.llm_timeout),
        workers,
    };
    let engine = Arc::new(Engine::new(engine_config, deps));

    let app = chat_routes(engine);
    let listener = tokio::net::TcpListener::bind(server_config.bind_addr()).await?;
    tracing::info!(addr = %server_config.bind_addr(), "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
