use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use threadline_core::thread::Thread;
use threadline_core::{
    telemetry, ApiKeyStore, EnvDefaults, LivenessProber, Session, SessionPhase, SharedState,
    StaticToken, StreamEvent, StreamEventSender, StreamOptions, StreamTransport, ThreadDirectory,
    UiEvent, UiMessage,
};
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Threadline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble a session against a scripted transport and print the folded state.
    Smoke,
    /// Check that an agent server answers its status endpoint.
    Probe {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
}

fn main() -> Result<()> {
    telemetry::init_tracing(telemetry::default_filter())?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
        Commands::Probe {
            url,
            api_key,
            token,
        } => probe(url, api_key, token),
    }
}

struct ScriptedTransport;

impl StreamTransport for ScriptedTransport {
    fn attach(&self, options: StreamOptions, events: StreamEventSender) {
        info!(api_url = %options.api_url, "scripted transport attached");
        let script = [
            StreamEvent::ThreadId("smoke-thread".into()),
            StreamEvent::Custom(UiEvent::Update(UiMessage::new(
                "plan",
                "search_plan",
                json!({ "steps": 2 }),
            ))),
            StreamEvent::Custom(UiEvent::Update(
                UiMessage::new("plan", "search_plan", json!({ "done": true }))
                    .with_metadata(json!({ "merge": true })),
            )),
            StreamEvent::Custom(UiEvent::Update(UiMessage::new(
                "scratch",
                "note",
                json!({}),
            ))),
            StreamEvent::Custom(UiEvent::remove("scratch")),
        ];
        for event in script {
            if events.send(event).is_err() {
                break;
            }
        }
    }
}

struct OfflineThreads;

#[async_trait]
impl ThreadDirectory for OfflineThreads {
    async fn list(&self) -> Result<Vec<Thread>> {
        Ok(vec![Thread::new("smoke-thread")])
    }

    fn replace(&self, threads: Vec<Thread>) {
        info!(count = threads.len(), "thread list refreshed");
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let store = ApiKeyStore::new(temp_dir.path());
    store.save("smoke-key")?;

    runtime.block_on(async {
        let session = Session::builder(SharedState::new(), Arc::new(StaticToken::none()))
            .env(EnvDefaults::from_environment())
            .api_key_store(store)
            .thread_directory(Arc::new(OfflineThreads))
            .settle_delay(Duration::from_millis(50))
            .build();
        session.start(&ScriptedTransport);

        let mut phase = session.watch_phase();
        let ready = *phase
            .wait_for(|phase| matches!(phase, SessionPhase::Ready { .. }))
            .await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let ui = session.conversation().ui();
        info!(
            phase = ?ready,
            thread = ?session.thread_id(),
            route = %session.shared_state().to_query(),
            ui = %serde_json::to_string(&ui)?,
            "smoke session settled"
        );
        if session.thread_id().as_deref() != Some("smoke-thread") || ui.len() != 1 {
            bail!("smoke session did not reach the expected state");
        }
        Ok::<_, anyhow::Error>(())
    })
}

fn probe(url: Option<String>, api_key: Option<String>, token: Option<String>) -> Result<()> {
    let runtime = Runtime::new()?;
    let env = EnvDefaults::from_environment();
    let url = url
        .or(env.api_url)
        .unwrap_or_else(|| threadline_core::config::DEFAULT_API_URL.to_string());
    let api_key = api_key.or(env.api_key);
    let tokens = token.map(StaticToken::new).unwrap_or_else(StaticToken::none);

    let reachable = runtime.block_on(LivenessProber::default().probe(
        &url,
        api_key.as_deref(),
        &tokens,
    ));
    if !reachable {
        bail!("agent server at {url} is not reachable");
    }
    info!(%url, "agent server is reachable");
    Ok(())
}
