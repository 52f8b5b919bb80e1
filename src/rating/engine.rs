use super::Period;
use super::Pipeline;
use super::Rerater;
use crate::config::Config;
use crate::config::ModTable;
use crate::store;
use crate::store::Matches;
use crate::store::State;
use crate::store::StoreError;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio_postgres::Client;

/// how the engine's loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    Restart,
}

/// signal flags flipped by background tasks and read between iterations
#[derive(Clone, Default)]
pub struct Signals {
    shutdown: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
}

impl Signals {
    /// install the handlers: SIGINT/SIGTERM ask for shutdown, SIGHUP for
    /// a graceful restart
    pub fn install() -> Self {
        let signals = Self::default();
        let shutdown = signals.shutdown.clone();
        tokio::spawn(async move {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            shutdown.store(true, Ordering::Relaxed);
        });
        let restart = signals.restart.clone();
        tokio::spawn(async move {
            let mut hup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
                .expect("install SIGHUP handler");
            hup.recv().await;
            restart.store(true, Ordering::Relaxed);
        });
        signals
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn restart_requested(&self) -> bool {
        self.restart.load(Ordering::Relaxed)
    }
}

/// the long-lived rating worker. one single-threaded loop interleaving
/// incremental rating, re-rate collection, and due batch execution, with
/// signals honoured only between iterations.
pub struct Engine {
    client: Arc<Client>,
    cfg: Config,
    mods: ModTable,
    signals: Signals,
    started: Instant,
}

impl Engine {
    pub fn new(client: Arc<Client>, cfg: Config, signals: Signals) -> anyhow::Result<Self> {
        let mods = cfg.mod_table()?;
        Ok(Self {
            client,
            cfg,
            mods,
            signals,
            started: Instant::now(),
        })
    }

    pub async fn run(&self) -> anyhow::Result<Exit> {
        store::ensure(&self.client).await?;
        let reclaimed = self.client.reset_in_progress().await?;
        if reclaimed > 0 {
            log::warn!("reset {} in-progress queue entries", reclaimed);
        }
        let mut current = self.bootstrap().await?;
        log::info!("rating engine up, current period {}", current);
        let exit = loop {
            if self.signals.shutdown_requested() {
                break Exit::Shutdown;
            }
            if self.signals.restart_requested() {
                break Exit::Restart;
            }
            if self.started.elapsed().as_secs() > self.cfg.max_run_time {
                log::info!("max run time reached, restarting");
                break Exit::Restart;
            }
            match self.iteration(&mut current).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::time::sleep(std::time::Duration::from_millis(crate::IDLE_SLEEP_MILLIS))
                        .await;
                }
                Err(e) if e.retryable() => {
                    log::warn!("transient failure, backing off: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
                Err(e) => {
                    log::error!("iteration failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        };
        log::info!("rating engine stopping: {:?}", exit);
        Ok(exit)
    }

    /// one pass over all three concerns; true when any work was done
    async fn iteration(&self, current: &mut Period) -> Result<bool, StoreError> {
        let env = self.cfg.trueskill();
        let rerater = Rerater {
            client: self.client.as_ref(),
            cfg: &self.cfg,
            env,
            mods: &self.mods,
        };
        let collected = rerater.collect().await? > 0;
        let now = chrono::Utc::now().timestamp();
        let batched = rerater.run_due(*current, now).await?;
        let pipeline = Pipeline {
            client: self.client.as_ref(),
            cfg: &self.cfg,
            env,
            mods: &self.mods,
        };
        let rated = pipeline.step(current).await?;
        Ok(collected || batched || rated)
    }

    /// the engine's rating clock: stored state, else the first queued
    /// match, else the wall clock
    async fn bootstrap(&self) -> Result<Period, StoreError> {
        if let Some(period) = self.client.current_period().await? {
            return Ok(period);
        }
        let period = match self.client.next_queued().await? {
            Some((_, reported)) => Period::of(reported)
                .ok_or_else(|| StoreError::inconsistent("queued match with unusable timestamp"))?,
            None => Period::of(chrono::Utc::now().timestamp())
                .expect("the present is a valid period"),
        };
        store::ensure_partition(&self.client, period).await?;
        self.client.set_current_period(period).await?;
        Ok(period)
    }
}
