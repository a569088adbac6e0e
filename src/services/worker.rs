use crate::services::login_throttle::LoginThrottle;
use crate::services::session::SessionManager;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodic housekeeping: drops expired sessions and stale login cooldowns.
pub struct BackgroundWorker {
    sessions: Arc<SessionManager>,
    throttle: Arc<LoginThrottle>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        sessions: Arc<SessionManager>,
        throttle: Arc<LoginThrottle>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sessions,
            throttle,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started (sweep every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup();
                }
            }
        }
    }

    fn perform_cleanup(&self) {
        let removed = self.sessions.purge_expired();
        if removed > 0 {
            tracing::info!("🧹 Purged {} expired sessions", removed);
        } else {
            tracing::debug!("Session sweep found nothing to purge");
        }

        let forgotten = self.throttle.purge_stale();
        if forgotten > 0 {
            tracing::debug!("Forgot {} stale login cooldowns", forgotten);
        }
    }
}
