use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use demand_fcst_web::cli::{self, Cli, Command, OfflineRun};
use demand_fcst_web::config::Config;
use demand_fcst_web::logging::init_tracing;
use demand_fcst_web::routes::{router, AppState};
use demand_fcst_web::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match cli::load_config(args.config.as_deref(), args.command.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("{}", e);
    }
    telemetry::init_telemetry(&config.telemetry);

    let result = match args.command {
        Some(Command::Forecast {
            input,
            output,
            technique,
            scope,
            horizon,
        }) => {
            match OfflineRun::new(&config, input, output, technique, scope, horizon) {
                Ok(run) => run_offline(run).await,
                Err(e) => Err(e.to_string()),
            }
        }
        Some(Command::Serve { .. }) | None => run_server(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run_offline(run: OfflineRun) -> Result<(), String> {
    let report = tokio::task::spawn_blocking(move || {
        let report = run.execute()?;
        Ok::<_, cli::CliError>((report, run.output))
    })
    .await
    .map_err(|e| e.to_string())?;

    match report {
        Ok((report, output)) => {
            print!("{}", cli::summary(&report));
            println!("\nReport written to {}", output.display());
            telemetry::capture_forecast_generated(&report);
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

async fn run_server(config: Config) -> Result<(), String> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let purge_every = Duration::from_secs(config.downloads.ttl_secs.clamp(1, 60));

    let state = AppState::new(config);

    // Expired downloads are also dropped lazily on access
    let downloads = state.downloads.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            let removed = downloads.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "purged expired downloads");
            }
        }
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_addr, e))?;

    tracing::info!("Server listening on http://{}", bind_addr);
    telemetry::capture_service_started();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
