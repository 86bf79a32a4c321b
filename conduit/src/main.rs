#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use anyhow::Context;
use args::Args;
use clap::Parser;
use conduit_config::Config;
use conduit_llm::{
    CompletionRequest, CompletionResult, CompletionUpdate, Gateway, GenerationParams, Message, Prompt,
    ToolDeclaration,
};
use futures_util::StreamExt;
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    // Logs go to stderr so completions can be piped
    let _telemetry_guard = conduit_telemetry::init(config.telemetry.as_ref(), "warn")?;

    let gateway = Gateway::from_config(&config.llm)?;
    let provider = match &args.provider {
        Some(name) => name.clone(),
        None => gateway
            .providers()
            .next()
            .map(|provider| provider.name.clone())
            .context("no providers configured")?,
    };

    let request = build_request(&args).await?;

    tracing::info!(
        config_path = %args.config.display(),
        provider = %provider,
        model = %request.model,
        streaming = request.stream,
        "running completion"
    );

    tokio::select! {
        result = run(&gateway, &request, &provider, args.json) => result,
        () = shutdown_signal() => {
            tracing::info!("completion cancelled");
            Ok(())
        }
    }
}

async fn build_request(args: &Args) -> anyhow::Result<CompletionRequest> {
    let prompt_text = match &args.prompt {
        Some(prompt) => prompt.clone(),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("failed to read prompt from stdin")?;
            input
        }
    };

    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user(prompt_text));

    let tools: Vec<ToolDeclaration> = match &args.tools {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read tools file: {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("invalid tools file: {}", path.display()))?
        }
        None => Vec::new(),
    };

    let params = GenerationParams {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        ..GenerationParams::default()
    };

    Ok(
        CompletionRequest::new(args.model.clone(), Prompt::new(messages).with_tools(tools))
            .with_params(params)
            .streaming(args.stream),
    )
}

async fn run(gateway: &Gateway, request: &CompletionRequest, provider: &str, json: bool) -> anyhow::Result<()> {
    if !request.stream {
        let result = gateway.complete(request, provider).await?;
        return print_result(&result, json, false);
    }

    let mut stream = gateway.complete_stream(request, provider)?;
    let mut stdout = std::io::stdout();

    while let Some(update) = stream.next().await {
        match update? {
            CompletionUpdate::Text(delta) => {
                stdout.write_all(delta.as_bytes())?;
                stdout.flush()?;
            }
            CompletionUpdate::Finished(result) => print_result(&result, json, true)?,
        }
    }

    Ok(())
}

fn print_result(result: &CompletionResult, json: bool, streamed: bool) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();

    match result {
        // Streamed text is already on screen
        CompletionResult::Text(_) if streamed => writeln!(stdout)?,
        CompletionResult::Text(text) => writeln!(stdout, "{text}")?,
        CompletionResult::ToolInvocation(invocation) if json => {
            writeln!(stdout, "{}", invocation.to_json()?)?;
        }
        CompletionResult::ToolInvocation(invocation) => writeln!(stdout, "{}", invocation.to_markup())?,
    }

    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
