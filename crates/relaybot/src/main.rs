use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relaybot_core::config::Config;

mod health;

#[tokio::main]
async fn main() -> Result<(), relaybot_core::Error> {
    relaybot_core::logging::init("relaybot")?;

    let cfg = Arc::new(Config::load()?);

    let shutdown = CancellationToken::new();
    let health_task = cfg.health_enabled.then(|| {
        let addr = cfg.health_addr;
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(addr, token).await {
                tracing::error!(error = %e, "health endpoint failed");
            }
        })
    });

    let result = relaybot_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| relaybot_core::Error::External(format!("telegram bot failed: {e}")));

    shutdown.cancel();
    if let Some(task) = health_task {
        let _ = task.await;
    }

    result
}
