//! Monitor: supervises a running execution until it finishes or is
//! cancelled.
//!
//! The polling loop is shared; only rendering differs, through a
//! `ProgressPresenter`:
//! - `ConsolePresenter` logs one line per status update
//! - `BarPresenter` redraws a progress bar on the terminal
//! - `SilentPresenter` renders nothing (processes without status support)
//!
//! Cancellation comes from a `CancellationToken`; the caller decides what
//! triggers it (`cancel_on_ctrl_c`, a timeout, user action).

use std::time::Duration;

use console::{Style, Term};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::WpsError;
use super::execution::{ExecutionController, ExecutionHandle, ExecutionStatus};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default wait between two status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Status messages are cut to this many characters in console output.
const MESSAGE_WIDTH: usize = 50;

/// Width of the rendered progress bar, in cells.
const BAR_WIDTH: usize = 30;

fn truncate(message: &str, width: usize) -> String {
    message.chars().take(width).collect()
}

// ─── Presentation ────────────────────────────────────────────────────────────

/// Renders progress of one execution.
pub trait ProgressPresenter: Send {
    fn start(&mut self, _handle: &ExecutionHandle) {}

    fn update(&mut self, handle: &ExecutionHandle);

    /// Called exactly once, after the handle became terminal.
    fn finish(&mut self, handle: &ExecutionHandle);
}

/// Which presenter a client uses for monitored executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Progress bar on a terminal, log lines otherwise.
    #[default]
    Auto,
    Console,
    Bar,
}

impl Presentation {
    pub fn presenter(self) -> Box<dyn ProgressPresenter> {
        match self {
            Presentation::Console => Box::new(ConsolePresenter),
            Presentation::Bar => Box::new(BarPresenter::new()),
            Presentation::Auto if Term::stderr().is_term() => Box::new(BarPresenter::new()),
            Presentation::Auto => Box::new(ConsolePresenter),
        }
    }
}

/// Logs `"{process} [{percent}/100] - {message}"` on every update.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl ProgressPresenter for ConsolePresenter {
    fn update(&mut self, handle: &ExecutionHandle) {
        tracing::info!(
            process = %handle.process(),
            percent = handle.percent_complete(),
            "{} [{}/100] - {}",
            handle.process(),
            handle.percent_complete(),
            truncate(handle.message(), MESSAGE_WIDTH)
        );
    }

    fn finish(&mut self, handle: &ExecutionHandle) {
        match handle.status() {
            ExecutionStatus::Succeeded => tracing::info!(process = %handle.process(), "{} done.", handle.process()),
            ExecutionStatus::Cancelled => {
                tracing::warn!(process = %handle.process(), "{} cancelled.", handle.process())
            }
            _ => tracing::error!(
                process = %handle.process(),
                message = %handle.message(),
                "{} failed.",
                handle.process()
            ),
        }
    }
}

/// Redraws a single progress line on stderr.
#[derive(Debug)]
pub struct BarPresenter {
    term: Term,
}

impl BarPresenter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    fn render(handle: &ExecutionHandle) -> String {
        let percent = usize::from(handle.percent_complete().min(100));
        let filled = percent * BAR_WIDTH / 100;
        format!(
            "{} [{}{}] {:>3}% {}",
            handle.process(),
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            percent,
            truncate(handle.message(), MESSAGE_WIDTH)
        )
    }

    fn draw(&self, line: &str) {
        // Rendering failures must not affect the execution
        if let Err(e) = self
            .term
            .clear_line()
            .and_then(|_| self.term.write_str(line))
        {
            tracing::debug!(error = %e, "failed to draw progress bar");
        }
    }
}

impl Default for BarPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPresenter for BarPresenter {
    fn start(&mut self, handle: &ExecutionHandle) {
        self.draw(&Self::render(handle));
    }

    fn update(&mut self, handle: &ExecutionHandle) {
        self.draw(&Self::render(handle));
    }

    fn finish(&mut self, handle: &ExecutionHandle) {
        let (style, label) = match handle.status() {
            ExecutionStatus::Succeeded => (Style::new().green().bold(), "done"),
            ExecutionStatus::Cancelled => (Style::new().yellow().bold(), "cancelled"),
            _ => (Style::new().red().bold(), "failed"),
        };
        self.draw(&Self::render(handle));
        if let Err(e) = self
            .term
            .write_line(&format!(" {}", style.apply_to(label)))
        {
            tracing::debug!(error = %e, "failed to draw progress bar");
        }
    }
}

/// Renders nothing; only the outcome is logged at debug level.
#[derive(Debug, Default)]
pub struct SilentPresenter;

impl ProgressPresenter for SilentPresenter {
    fn update(&mut self, _handle: &ExecutionHandle) {}

    fn finish(&mut self, handle: &ExecutionHandle) {
        tracing::debug!(
            process = %handle.process(),
            status = %handle.status(),
            "execution finished"
        );
    }
}

// ─── Monitor ─────────────────────────────────────────────────────────────────

/// Polls one execution at a fixed interval.
pub struct Monitor<'a> {
    controller: &'a ExecutionController,
    poll_interval: Duration,
}

impl<'a> Monitor<'a> {
    pub fn new(controller: &'a ExecutionController, poll_interval: Duration) -> Self {
        Self {
            controller,
            poll_interval,
        }
    }

    /// Poll until the handle is terminal.
    ///
    /// Each iteration waits `poll_interval`, then fetches the status. When
    /// `token` fires, during the wait or during the status request, the
    /// handle is cancelled and the loop ends. Taking the handle by `&mut`
    /// keeps a single loop per execution.
    ///
    /// If a status request fails the handle is marked `Failed` with the
    /// error text, the presenter is finished and the error is returned.
    pub async fn watch(
        &self,
        handle: &mut ExecutionHandle,
        token: &CancellationToken,
        presenter: &mut dyn ProgressPresenter,
    ) -> Result<(), WpsError> {
        presenter.start(handle);

        let outcome = self.poll_until_terminal(handle, token, presenter).await;
        if let Err(e) = &outcome {
            handle.fail(&e.to_string());
        }

        presenter.finish(handle);
        outcome
    }

    async fn poll_until_terminal(
        &self,
        handle: &mut ExecutionHandle,
        token: &CancellationToken,
        presenter: &mut dyn ProgressPresenter,
    ) -> Result<(), WpsError> {
        while !handle.is_terminal() {
            let location = handle
                .status_location()
                .map(str::to_string)
                .ok_or_else(|| WpsError::ExecutionSubmission {
                    process: handle.process().to_string(),
                    reason: "server returned no status location".into(),
                })?;
            let service = self.controller.service();
            let interval = self.poll_interval;
            let next_status = async {
                tokio::time::sleep(interval).await;
                service.check_status(&location).await
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.controller.cancel(handle);
                }
                report = next_status => {
                    handle.apply(report?);
                    tracing::debug!(
                        process = %handle.process(),
                        status = %handle.status(),
                        percent = handle.percent_complete(),
                        "polled execution status"
                    );
                    if !handle.is_terminal() {
                        presenter.update(handle);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Cancel `token` when the process receives Ctrl-C.
///
/// The first call registers a SIGINT handler through `tokio::signal::ctrl_c`,
/// which replaces the default Ctrl-C behavior for the rest of the process.
/// Aborting the returned task stops the listener but does not restore it, so
/// only install this in programs that handle interrupts themselves.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        tracing::info!("interrupt received, cancelling execution");
                        token.cancel();
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
                }
            }
            _ = token.cancelled() => {}
        }
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
