use std::{future::Future, process, sync::Arc, time::Duration};

use gazette::{
    app::Application,
    application::{error::AppError, repos::Repositories},
    config,
    infra::{db::PostgresRepositories, error::InfraError, memory::MemoryRepositories, telemetry},
};
use tokio::{signal, sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (repositories, db) = init_repositories(&settings).await?;
    let app = Application::new(repositories, db, &settings);
    serve_http(&settings, app).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Repositories, Option<PostgresRepositories>), AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = "gazette::bootstrap",
            "no database url configured; using the in-memory store"
        );
        let store = Arc::new(MemoryRepositories::new());
        return Ok((Repositories::from_store(store), None));
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let db = PostgresRepositories::new(pool);
    info!(target = "gazette::bootstrap", "connected to postgres");
    Ok((Repositories::from_store(Arc::new(db.clone())), Some(db)))
}

async fn serve_http(settings: &config::Settings, app: Application) -> Result<(), AppError> {
    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "gazette::bootstrap",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let grace = settings.server.graceful_shutdown;

    let public_server = axum::serve(public_listener, app.public.into_make_service())
        .with_graceful_shutdown(wait_for(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, app.admin.into_make_service())
        .with_graceful_shutdown(wait_for(shutdown_rx.clone()));

    tokio::spawn(async move {
        shutdown_signal().await;
        info!(target = "gazette::bootstrap", "shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    with_grace(grace, shutdown_rx, async {
        try_join!(public_server, admin_server)
            .map(|_| ())
            .map_err(|err| AppError::unexpected(format!("server error: {err}")))
    })
    .await
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Run `servers` until they finish; once shutdown starts, give them `grace` to drain.
async fn with_grace<F>(
    grace: Duration,
    shutdown: watch::Receiver<bool>,
    servers: F,
) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>>,
{
    tokio::pin!(servers);
    tokio::select! {
        result = &mut servers => result,
        _ = wait_for(shutdown) => {
            match tokio::time::timeout(grace, &mut servers).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        target = "gazette::bootstrap",
                        grace_secs = grace.as_secs(),
                        "graceful shutdown timed out"
                    );
                    Ok(())
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target = "gazette::bootstrap", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "gazette::bootstrap", error = %err, "failed to listen for SIGTERM");
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
}
