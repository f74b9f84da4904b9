//! finder: hold Pause to find the mouse pointer
//!
//! ```text
//! main thread                         renderer thread
//! ───────────                         ───────────────
//! acquire lock / daemonize / pid
//! open display, install signals
//! spawn renderer ───────────────────> idle -> paint -> hold -> teardown
//! poll hotkey (sets `visible`) ─────>     (reads `visible`, `running`)
//! signal -> shutdown:
//!   running = false ────────────────> exits loop
//!   join, close display, release lock
//! ```

mod cli;
mod error;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use finder_core::{
    FinderConfig, HotkeyPoller, InstanceLock, Lifecycle, SharedState, ShutdownSignal, lifecycle,
    signals,
};
use finder_overlay::{OverlayRenderer, OverlayStyle, RenderTiming, X11Display};
use tracing_appender::non_blocking::WorkerGuard;

use crate::cli::Cli;
use crate::error::StartupError;

fn main() -> ExitCode {
    let config = Cli::parse().config();

    // Daemon logging starts after the fork, see `run`
    if !config.daemonize {
        logging::init_foreground();
    }

    let mut log_guard = None;
    match run(&config, &mut log_guard) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &FinderConfig, log_guard: &mut Option<WorkerGuard>) -> Result<(), StartupError> {
    let mut lock = InstanceLock::acquire(&config.lock_path)?;

    if config.daemonize {
        // The flock belongs to the open file, so the daemon keeps it
        lifecycle::daemonize()?;
        *log_guard = logging::init_daemon();
    }

    match lock.report_pid() {
        Ok(pid) => tracing::info!(pid, path = %lock.path().display(), "finder started"),
        Err(e) => tracing::warn!(error = %e, "could not record pid in lock file"),
    }

    let display = Arc::new(X11Display::open()?);

    let shutdown = ShutdownSignal::new();
    signals::install(&shutdown, lock.path())?;

    let (state, visibility, run_control) = SharedState::new();
    let mut lifecycle = Lifecycle::new(lock, display, run_control, config.shutdown_grace);

    let timing = RenderTiming::from(config);
    lifecycle.spawn_renderer(move |display: Arc<X11Display>| {
        OverlayRenderer::new(&*display, OverlayStyle::default(), timing).run(&state);
    })?;

    if let Some(display) = lifecycle.display() {
        HotkeyPoller::new(display, config.hotkey, visibility, config.hotkey_poll)
            .run_until(shutdown.flag());
    }

    lifecycle.shutdown();
    Ok(())
}

fn report(error: &StartupError) {
    if tracing::dispatcher::has_been_set() {
        tracing::error!(error = %error, "finder failed to start");
    } else {
        eprintln!("finder: {error}");
    }
}
