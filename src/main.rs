use photo_classifier_lib::{
    api::{self, ApiState},
    bot::{Bot, BotConfig},
    bridge::SyncBridge,
    classifier::{load_labels, Classifier, HttpClassifier},
    cli::parse_args,
    config::Config,
    prediction::PredictionService,
    server::{setup_server, wait_for_server},
    state::AppState,
    storage::{FsObjectStore, ObjectStore},
    telegram::TelegramClient,
    worker::WorkerContext,
};
use std::error::Error;
use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, error, info};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Gracefully shuts down the application when a SIGTERM or SIGINT signal is received.
async fn handle_shutdown_signals(state: Arc<AppState>) {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to register signal handlers: {}", e);
            state.shutdown_token.cancel();
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down.");
        }
        _ = sigint.recv() => {
            info!("SIGINT received, shutting down.");
        }
        _ = state.shutdown_token.cancelled() => {}
    }

    state.shutdown_token.cancel();
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();
    let args = parse_args();
    let config = Config::from_env(args.mode)?;
    debug!("Config loaded, mode {:?}", args.mode);

    let state = Arc::new(AppState::new(CancellationToken::new()));
    let signal_handle = tokio::spawn(handle_shutdown_signals(state.clone()));

    let labels = load_labels(&config.labels_path()).await?;
    info!("Loaded {} labels", labels.len());
    let classifier: Arc<dyn Classifier> =
        Arc::new(HttpClassifier::new(config.classifier_url.clone(), labels)?);

    let api_routes = if args.mode.runs_api() {
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(
            config.storage_root.clone(),
            &config.storage_bucket_name,
            &config.storage_object_folder,
        ));
        let predictions = PredictionService::new(
            store.clone(),
            classifier.clone(),
            SyncBridge::with_timeout(config.prediction_timeout),
        );
        Some(api::router(ApiState { store, predictions }))
    } else {
        None
    };
    let server_handle = setup_server(state.clone(), config.listen_addr, api_routes).await?;

    let running_bot = if args.mode.runs_bot() {
        let telegram = Arc::new(TelegramClient::new(
            config.telegram_api_url.clone(),
            config.telegram_bot_token.clone(),
            config.reply_rate_limit,
        ));
        let context = WorkerContext {
            payloads: telegram.clone(),
            replies: telegram.clone(),
            classifier: classifier.clone(),
        };
        Some(Bot::new(telegram, context, BotConfig::from(&config)).start(&state.shutdown_token))
    } else {
        None
    };

    let server_result = wait_for_server(server_handle, &state.shutdown_token).await;
    info!("Shutting down");

    let mut failed = false;
    if let Err(e) = server_result {
        error!("{}", e);
        failed = true;
    }

    // The bot releases the classifier once its workers have drained.
    match running_bot {
        Some(bot) => match bot.stop().await {
            Ok(report) => info!(
                "Bot drained: {} processed, {} skipped, last cursor {:?}",
                report.processed, report.skipped, report.final_cursor
            ),
            Err(e) => {
                error!("{}", e);
                failed = true;
            }
        },
        None => {
            if let Err(e) = classifier.shutdown().await {
                error!("Could not release the classifier: {}", e);
                failed = true;
            }
        }
    }

    signal_handle.await?;
    if failed {
        Err("shutdown finished with errors".into())
    } else {
        info!("Shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
