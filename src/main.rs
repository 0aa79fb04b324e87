use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use email_triage::api::api_routes;
use email_triage::config::{ClassifierConfig, ServerConfig};
#[cfg(feature = "onnx")]
use email_triage::inference::OnnxEngine;
use email_triage::inference::{InferenceEngine, LexiconEngine};
use email_triage::pipeline::duplicates::HistoryStore;
use email_triage::pipeline::processor::EmailClassifier;
use email_triage::pipeline::types::{Attachment, EmailInput};
use email_triage::tickets::TicketService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ClassifierConfig::from_env().context("invalid classifier configuration")?;

    let engine = build_engine(&config);
    let history = HistoryStore::new(config.history_capacity);
    let tickets = Arc::new(TicketService::new(config.ticket_latency));
    let classifier = Arc::new(EmailClassifier::new(engine, history, config));

    let files: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if !files.is_empty() {
        return classify_files(&classifier, &files).await;
    }

    let server = ServerConfig::from_env().context("invalid server configuration")?;

    eprintln!("📨 Email Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Classify: http://0.0.0.0:{}/api/classify", server.port);
    eprintln!("   Tickets:  http://0.0.0.0:{}/api/tickets", server.port);
    eprintln!(
        "   History:  last {} emails",
        classifier.history().capacity()
    );

    let app = api_routes(classifier, tickets);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server.port))
        .await
        .with_context(|| format!("failed to bind port {}", server.port))?;
    tracing::info!(port = server.port, "Classification server started");
    axum::serve(listener, app).await?;

    Ok(())
}

/// ONNX models when a model directory is configured, the lexicon otherwise.
fn build_engine(config: &ClassifierConfig) -> Arc<dyn InferenceEngine> {
    match &config.model_dir {
        #[cfg(feature = "onnx")]
        Some(dir) => {
            tracing::info!(model_dir = %dir.display(), "Using ONNX inference engine");
            Arc::new(OnnxEngine::new(dir))
        }
        #[cfg(not(feature = "onnx"))]
        Some(dir) => {
            tracing::warn!(
                model_dir = %dir.display(),
                "Built without the onnx feature, using lexicon engine"
            );
            Arc::new(LexiconEngine::new())
        }
        None => {
            tracing::info!("No model directory configured, using lexicon engine");
            Arc::new(LexiconEngine::new())
        }
    }
}

/// Classify each file as an attachment-only email and print one JSON line per result.
async fn classify_files(classifier: &EmailClassifier, files: &[PathBuf]) -> anyhow::Result<()> {
    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        inputs.push(EmailInput {
            attachments: vec![Attachment::load(path).await],
            ..Default::default()
        });
    }

    for result in classifier.classify_batch(inputs).await {
        println!("{}", serde_json::to_string(&result)?);
    }
    Ok(())
}
