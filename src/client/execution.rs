//! Execution controller: submits Execute requests and owns the execution
//! state machine.
//!
//! ```text
//! Submitted ─┬─> Accepted ──> Running ─┬─> Succeeded
//!            └─> Rejected      │       └─> Failed
//!                 Accepted/Running ──> Cancelled
//! ```
//!
//! `Rejected`, `Succeeded`, `Failed` and `Cancelled` are terminal. A handle is
//! mutated only by the controller and by the single monitor loop watching it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::convert::TypeConverter;
use super::errors::WpsError;
use super::value::Value;
use crate::protocol::{
    ExecuteRequest, ExecutionMode, Operation, OutputRequest, ProcessDescriptor, RawOutput,
    ReportedStatus, StatusReport, WpsService,
};

// ─── ExecutionStatus ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Submitted,
    Accepted,
    Rejected,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Rejected
                | ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
        )
    }

    /// Whether `self → next` is an edge of the state machine. Non-terminal
    /// states may also stay where they are (progress updates).
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Submitted, Accepted | Rejected)
                | (Accepted, Running | Cancelled)
                | (Running, Succeeded | Failed | Cancelled)
                | (Accepted, Accepted)
                | (Running, Running)
        )
    }

    fn from_reported(reported: &ReportedStatus) -> Self {
        match reported {
            ReportedStatus::Accepted => ExecutionStatus::Accepted,
            ReportedStatus::Started | ReportedStatus::Paused => ExecutionStatus::Running,
            ReportedStatus::Succeeded => ExecutionStatus::Succeeded,
            ReportedStatus::Failed => ExecutionStatus::Failed,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Submitted => "submitted",
            ExecutionStatus::Accepted => "accepted",
            ExecutionStatus::Rejected => "rejected",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

// ─── ExecutionHandle ─────────────────────────────────────────────────────────

/// Mutable state of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionHandle {
    id: Uuid,
    process: String,
    mode: ExecutionMode,
    submitted_at: DateTime<Utc>,
    status: ExecutionStatus,
    percent_complete: u8,
    message: String,
    status_location: Option<String>,
    outputs: Vec<RawOutput>,
    /// Every status the handle has been in, in order.
    history: Vec<ExecutionStatus>,
}

impl ExecutionHandle {
    pub fn new(process: &str, mode: ExecutionMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            process: process.to_string(),
            mode,
            submitted_at: Utc::now(),
            status: ExecutionStatus::Submitted,
            percent_complete: 0,
            message: String::new(),
            status_location: None,
            outputs: Vec::new(),
            history: vec![ExecutionStatus::Submitted],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn percent_complete(&self) -> u8 {
        self.percent_complete
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_location(&self) -> Option<&str> {
        self.status_location.as_deref()
    }

    /// Raw outputs; empty until the execution succeeds.
    pub fn outputs(&self) -> &[RawOutput] {
        &self.outputs
    }

    pub fn history(&self) -> &[ExecutionStatus] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move along one legal edge. Illegal moves are ignored and reported.
    fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                process = %self.process,
                from = %self.status,
                to = %next,
                "ignoring illegal status transition"
            );
            return false;
        }
        if self.status != next {
            self.status = next;
            self.history.push(next);
        }
        true
    }

    fn reject(&mut self, reason: &str) {
        self.message = reason.to_string();
        self.transition(ExecutionStatus::Rejected);
    }

    /// Mark a running execution failed after losing track of it, e.g. when a
    /// status request errors. No-op on a terminal handle.
    pub(crate) fn fail(&mut self, reason: &str) {
        if self.is_terminal() {
            return;
        }
        self.apply(StatusReport {
            status: ReportedStatus::Failed,
            percent_completed: self.percent_complete,
            message: reason.to_string(),
            status_location: None,
            outputs: Vec::new(),
        });
        tracing::warn!(process = %self.process, id = %self.id, reason, "execution marked failed");
    }

    /// Request cancellation. No-op on a terminal handle.
    pub fn cancel(&mut self) {
        if self.is_terminal() {
            return;
        }
        if self.status == ExecutionStatus::Submitted {
            // Not yet acknowledged by the server; it cannot be running
            self.transition(ExecutionStatus::Accepted);
        }
        if self.transition(ExecutionStatus::Cancelled) {
            self.message = format!("cancelled at {}%", self.percent_complete);
            tracing::info!(process = %self.process, id = %self.id, "execution cancelled");
        }
    }

    /// Apply a server status report, walking intermediate states so that
    /// only legal edges are taken. Reports on a terminal handle are ignored.
    pub(crate) fn apply(&mut self, report: StatusReport) {
        if self.is_terminal() {
            tracing::debug!(
                process = %self.process,
                status = %self.status,
                "ignoring status report for finished execution"
            );
            return;
        }

        let target = ExecutionStatus::from_reported(&report.status);
        while self.status != target && !self.is_terminal() {
            let step = match self.status {
                ExecutionStatus::Submitted => ExecutionStatus::Accepted,
                ExecutionStatus::Accepted => ExecutionStatus::Running,
                _ => target,
            };
            if !self.transition(step) {
                break;
            }
        }

        self.percent_complete = report.percent_completed.min(100);
        if self.status == ExecutionStatus::Succeeded {
            self.percent_complete = 100;
        }
        if !report.message.is_empty() {
            self.message = report.message;
        }
        if report.status_location.is_some() {
            self.status_location = report.status_location;
        }
        if self.status == ExecutionStatus::Succeeded {
            self.outputs = report.outputs;
        }
    }
}

// ─── ExecutionController ─────────────────────────────────────────────────────

/// Converts inputs, picks the execution mode and submits requests.
pub struct ExecutionController {
    service: Arc<dyn WpsService>,
    converter: TypeConverter,
    /// Client-level progress mode.
    progress: bool,
}

impl ExecutionController {
    pub fn new(service: Arc<dyn WpsService>, converter: TypeConverter, progress: bool) -> Self {
        Self {
            service,
            converter,
            progress,
        }
    }

    pub fn service(&self) -> &Arc<dyn WpsService> {
        &self.service
    }

    /// Asynchronous only when progress is requested and the process can store.
    pub fn select_mode(&self, descriptor: &ProcessDescriptor) -> ExecutionMode {
        if self.progress && descriptor.supports_store {
            ExecutionMode::Async
        } else {
            ExecutionMode::Sync
        }
    }

    /// Whether a monitor with a visible presenter should supervise the run.
    pub fn wants_monitor(&self, descriptor: &ProcessDescriptor) -> bool {
        self.progress && descriptor.supports_status
    }

    /// Build the Execute request for `inputs`, given as `(identifier, value)`.
    pub fn build_request(
        &self,
        descriptor: &ProcessDescriptor,
        inputs: &[(String, Value)],
    ) -> Result<ExecuteRequest, WpsError> {
        let mut wire_inputs = Vec::with_capacity(inputs.len());
        for (identifier, value) in inputs {
            let spec = descriptor
                .input(identifier)
                .ok_or_else(|| WpsError::UnknownParameter {
                    operation: descriptor.identifier.clone(),
                    name: identifier.clone(),
                })?;
            for wire in self.converter.to_wire_all(value, spec)? {
                wire_inputs.push((identifier.clone(), wire));
            }
        }

        let outputs = descriptor
            .outputs
            .iter()
            .map(|o| OutputRequest {
                identifier: o.identifier.clone(),
                as_reference: o.kind.is_complex(),
            })
            .collect();

        let mode = self.select_mode(descriptor);
        Ok(ExecuteRequest {
            identifier: descriptor.identifier.clone(),
            inputs: wire_inputs,
            outputs,
            mode,
            status: mode == ExecutionMode::Async && descriptor.supports_status,
        })
    }

    /// Convert inputs and submit. Absent inputs must simply not be passed.
    pub async fn submit(
        &self,
        descriptor: &ProcessDescriptor,
        inputs: &[(String, Value)],
    ) -> Result<ExecutionHandle, WpsError> {
        let request = self.build_request(descriptor, inputs)?;
        let mut handle = ExecutionHandle::new(&descriptor.identifier, request.mode);

        tracing::info!(
            process = %descriptor.identifier,
            id = %handle.id(),
            mode = %request.mode,
            "submitting execution"
        );

        match self.service.execute(&request).await {
            Ok(report) => {
                handle.apply(report);
                tracing::debug!(
                    process = %handle.process(),
                    status = %handle.status(),
                    percent = handle.percent_complete(),
                    "execution submitted"
                );
                Ok(handle)
            }
            Err(e) => {
                handle.reject(&e.to_string());
                tracing::warn!(process = %descriptor.identifier, error = %e, "execution rejected");
                if e.is_access_forbidden() {
                    Err(WpsError::Unauthorized {
                        operation: Operation::Execute,
                    })
                } else {
                    Err(WpsError::ExecutionSubmission {
                        process: descriptor.identifier.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Fetch the current status of a running execution.
    pub async fn poll(&self, handle: &mut ExecutionHandle) -> Result<(), WpsError> {
        if handle.is_terminal() {
            return Ok(());
        }
        let location = handle
            .status_location()
            .map(str::to_string)
            .ok_or_else(|| WpsError::ExecutionSubmission {
                process: handle.process().to_string(),
                reason: "server returned no status location".into(),
            })?;
        let report = self.service.check_status(&location).await?;
        handle.apply(report);
        Ok(())
    }

    /// Cancel a non-terminal execution. Never fails; terminal handles are
    /// left untouched. WPS 1.0.0 has no dismiss operation, so the remote
    /// job is only abandoned.
    pub fn cancel(&self, handle: &mut ExecutionHandle) {
        handle.cancel();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
