#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::print_stdout, clippy::print_stderr)]

mod args;

use std::io::Write;

use args::{Args, ChatArgs, Command};
use clap::Parser;
use futures_util::StreamExt;
use relay_config::Config;
use relay_llm::{CompletionRequest, FallbackAttempt, Message, RelayError, Router, StreamEvent};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let _telemetry_guard = relay_telemetry::init(config.telemetry.as_ref(), &args.log_filter)?;

    tracing::debug!(
        providers = config.llm.providers.len(),
        default_provider = %config.llm.default_provider,
        "configuration loaded"
    );

    let router = Router::from_config(&config.llm)?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    match args.command {
        Command::Providers { json } => providers(&router, json).await,
        Command::Models { provider } => models(&router, provider.as_deref()).await,
        Command::Ping { provider } => ping(&router, &provider).await,
        Command::Chat(chat_args) => match chat(&router, chat_args, &cancel).await {
            Err(e) if e.downcast_ref::<RelayError>().is_some_and(RelayError::is_cancelled) => {
                eprintln!("\ncancelled");
                Ok(())
            }
            result => result,
        },
    }
}

async fn providers(router: &Router, json: bool) -> anyhow::Result<()> {
    let statuses = router.list_providers().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    for status in statuses {
        if status.available {
            println!("{:<12} up      {} models", status.provider, status.models.len());
        } else {
            println!(
                "{:<12} down    {}",
                status.provider,
                status.error.as_deref().unwrap_or("unavailable")
            );
            if let Some(hint) = status.hint {
                println!("{:<12}         hint: {hint}", "");
            }
        }
    }
    Ok(())
}

async fn models(router: &Router, provider: Option<&str>) -> anyhow::Result<()> {
    for model in router.list_models(provider).await? {
        let context = model.context_window.map(|n| format!("  ({n} tokens)")).unwrap_or_default();
        println!("{}:{}{context}", model.provider, model.id);
    }
    Ok(())
}

async fn ping(router: &Router, provider: &str) -> anyhow::Result<()> {
    let status = router.ping(provider).await?;
    if status.available {
        println!("{provider} is up ({} models)", status.models.len());
        return Ok(());
    }

    let error = status.error.unwrap_or_default();
    match status.hint {
        Some(hint) => anyhow::bail!("{provider} is down: {error}\nhint: {hint}"),
        None => anyhow::bail!("{provider} is down: {error}"),
    }
}

async fn chat(router: &Router, args: ChatArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt));

    let mut request = CompletionRequest::new(args.model, messages);
    request.reasoning = args.reasoning;
    if !args.fallback.is_empty() {
        request.fallback = Some(args.fallback);
    }

    if !args.stream {
        let routed = router.complete(request, cancel).await?;
        report_fallbacks(&routed.provider, &routed.model, &routed.fallbacks);

        if args.show_reasoning
            && let Some(reasoning) = &routed.response.reasoning
        {
            eprintln!("{reasoning}\n");
        }
        println!("{}", routed.response.message.content.as_text());
        for warning in &routed.response.warnings {
            eprintln!("warning: {warning}");
        }
        return Ok(());
    }

    let routed = router.stream(request, cancel).await?;
    report_fallbacks(&routed.provider, &routed.model, &routed.fallbacks);

    let mut events = routed.events;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Token(token) if token.is_reasoning() => {
                if args.show_reasoning {
                    eprint!("{}", token.text);
                }
            }
            StreamEvent::Token(token) => {
                print!("{}", token.text);
                stdout.flush()?;
            }
            StreamEvent::ToolCall(call) => {
                println!("\n[tool call {}] {}({})", call.id, call.function.name, call.function.arguments);
            }
            StreamEvent::Finished { finish_reason, usage } => {
                println!();
                tracing::debug!(?finish_reason, ?usage, "stream finished");
            }
        }
    }
    Ok(())
}

fn report_fallbacks(provider: &str, model: &str, fallbacks: &[FallbackAttempt]) {
    if fallbacks.is_empty() {
        return;
    }
    for attempt in fallbacks {
        eprintln!("skipped {attempt}");
    }
    eprintln!("served by {provider}:{model}");
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::debug!("interrupt received");
}
