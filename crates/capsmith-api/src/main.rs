//! Capsmith CLI and REST API entry point.
//!
//! Binary name: `capsmith`
//!
//! Parses CLI arguments, loads the descriptor registry from the content root,
//! then dispatches to the matching command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use capsmith_infra::watch::{spawn_reloader, start_content_watcher};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,capsmith=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Neither of these needs a loaded engine.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "capsmith", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Validate => {
            return cli::descriptor::handle_validate(&cli.source, cli.config.as_deref(), cli.json)
                .await;
        }
        _ => {}
    }

    let state = AppState::init(cli.source.clone(), cli.config.clone()).await?;

    match cli.command {
        Commands::Resolve {
            text,
            ids,
            budget,
            dispatch,
        } => {
            cli::resolve::handle_resolve(&state, &text, ids, budget, dispatch, cli.json)?;
        }

        Commands::Describe { id } => {
            cli::descriptor::handle_describe(&state, &id, cli.json)?;
        }

        Commands::List { tag, kind } => {
            cli::descriptor::handle_list(&state, tag.as_deref(), kind, cli.json)?;
        }

        Commands::Serve { port, host, watch } => {
            serve(state, &host, port, watch).await?;
        }

        Commands::Completions { .. } | Commands::Validate => {}
    }

    Ok(())
}

async fn serve(state: AppState, host: &str, port: u16, watch: bool) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // The watcher stops when its handle is dropped at the end of this scope.
    let watcher = if watch {
        let (handle, changes) = start_content_watcher(state.source.root(), None)?;
        let reloader = spawn_reloader(
            state.engine.clone(),
            state.source.clone(),
            changes,
            state.shutdown.clone(),
        );
        Some((handle, reloader))
    } else {
        None
    };

    println!(
        "  {} Capsmith API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {} descriptors from {}{}",
        state.engine.registry().snapshot().len(),
        console::style(state.source.root().display()).cyan(),
        if watch { " (watching)" } else { "" }
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let shutdown = state.shutdown.clone();
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some((_handle, reloader)) = watcher {
        if let Err(e) = reloader.await {
            tracing::warn!(error = %e, "content reloader task failed");
        }
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown` so in-flight reloads
/// stop too.
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
        () = ctrl_c => {},
        () = terminate => {},
        () = shutdown.cancelled() => {},
    }
    shutdown.cancel();
}
