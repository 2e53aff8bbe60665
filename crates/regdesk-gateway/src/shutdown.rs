use std::future::Future;

use tokio::sync::watch;
use tracing::info;

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

/// Fans a single shutdown future out to any number of waiters.
#[derive(Clone)]
pub struct ShutdownTrigger {
    rx: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    pub fn spawn<F>(signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            signal.await;
            let _ = tx.send(true);
        });
        Self { rx }
    }

    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            // A dropped sender without a send means the signal can no longer fire.
            let fired = rx.wait_for(|fired| *fired).await.is_ok();
            if !fired {
                std::future::pending::<()>().await;
            }
        }
    }
}
