//! globalkey: Background daemon reporting a global hotkey
//!
//! Registers one configured hotkey and logs every press and release:
//! - The process's first thread becomes the main thread for backends
//!   that require it
//! - Events are consumed from the hotkey's relays on a tokio runtime
//! - SIGINT/SIGTERM unregister the hotkey and stop the daemon

mod config;
mod lifecycle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use globalkey::{mainthread, Key, MemoryBackend, Modifiers, Registry, Scheduler};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::lifecycle::ShutdownSignal;

fn main() -> Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.backend,
        "globalkey daemon starting"
    );

    mainthread::run(move |scheduler| daemon(config, scheduler))
}

/// The daemon proper, running beside the main-thread dispatch loop
fn daemon(config: Config, scheduler: Scheduler) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let (backend, memory) = config.build_backend();
    let registry =
        Registry::with_scheduler(backend, scheduler).context("hotkey backend unavailable")?;

    let modifiers = config.modifier_set();
    let key = config.hotkey_key();
    let hotkey = registry.hotkey(modifiers, key);
    hotkey.register().context("failed to register hotkey")?;
    info!(?modifiers, key = key.code(), backend = registry.backend_name(), "hotkey active");

    let simulator = memory
        .zip(config.simulate_interval_ms)
        .map(|(memory, ms)| Simulator::start(memory, modifiers, key, Duration::from_millis(ms)))
        .transpose()?;

    let keydown = hotkey.keydown();
    let keyup = hotkey.keyup();

    runtime.block_on(async {
        let mut shutdown = ShutdownSignal::new().context("failed to install signal handlers")?;
        let mut presses = 0u64;

        loop {
            tokio::select! {
                event = keydown.recv() => match event {
                    Some(_) => {
                        presses += 1;
                        info!(presses, "hotkey pressed");
                    }
                    None => break,
                },
                event = keyup.recv() => match event {
                    Some(_) => info!("hotkey released"),
                    None => break,
                },
                _ = shutdown.wait() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        Ok::<_, anyhow::Error>(())
    })?;

    info!("shutting down...");

    if let Some(simulator) = simulator {
        simulator.stop();
    }
    hotkey.unregister().context("failed to unregister hotkey")?;

    info!("globalkey daemon stopped");
    Ok(())
}

/// Background thread tapping the hotkey on the memory backend
struct Simulator {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Simulator {
    fn start(
        backend: Arc<MemoryBackend>,
        modifiers: Modifiers,
        key: Key,
        interval: Duration,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        let thread = thread::Builder::new()
            .name("globalkey-simulator".to_string())
            .spawn({
                let running = Arc::clone(&running);
                move || {
                    while running.load(Ordering::SeqCst) {
                        thread::sleep(interval);
                        let fired = backend.tap(modifiers, key);
                        debug!(fired, "simulated hotkey tap");
                    }
                }
            })
            .context("failed to spawn simulator thread")?;

        info!(interval_ms = interval.as_millis() as u64, "simulating hotkey presses");
        Ok(Self { running, thread })
    }

    fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        if self.thread.join().is_err() {
            warn!("simulator thread panicked");
        }
    }
}
