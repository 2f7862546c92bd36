use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::services::RateLimiter;

/// Clears idle rate-limit entries in the background.
///
/// Windows reset lazily on access, so without this job the limiter table
/// would only ever grow as one-off clients come and go.
pub struct SweeperService {
    limiter: Arc<RateLimiter>,
    scheduler: JobScheduler,
}

impl SweeperService {
    pub async fn new(limiter: Arc<RateLimiter>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self { limiter, scheduler })
    }

    /// Registers the sweep job and starts the scheduler.
    pub async fn start(&mut self) -> Result<()> {
        let limiter = self.limiter.clone();

        // Every minute, on the minute.
        let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
            let limiter = limiter.clone();
            Box::pin(async move {
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    log::debug!("🧹 Swept {} idle rate-limit entries", removed);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;

        log::info!("✅ Rate-limit sweeper scheduled (every minute)");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        log::info!("🛑 Rate-limit sweeper stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweeper_starts_and_stops_cleanly() {
        let limiter = Arc::new(RateLimiter::new(10));
        let mut sweeper = SweeperService::new(limiter).await.expect("scheduler");
        sweeper.start().await.expect("start");
        sweeper.stop().await.expect("stop");
    }
}
