//! In-memory `WpsService` used by the client tests.
//!
//! Scripts capabilities, process descriptions, execute outputs and the
//! sequence of status reports an asynchronous execution walks through.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::protocol::{
    Capabilities, DataKind, ExecuteRequest, ExecutionMode, Format, InputSpec, LiteralType,
    OutputSpec, ProcessDescriptor, ProcessSummary, RawOutput, ReportedStatus, ServiceError,
    StatusReport, WireValue, WpsService,
};

type Handler = Box<dyn Fn(&ExecuteRequest) -> Vec<RawOutput> + Send + Sync>;

pub const STATUS_LOCATION: &str = "http://mock.wps/status/1.xml";

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn literal_input(identifier: &str, data_type: LiteralType, default: Option<&str>) -> InputSpec {
    InputSpec {
        identifier: identifier.into(),
        title: Some(format!("{identifier} title")),
        abstract_text: None,
        kind: DataKind::Literal {
            data_type,
            allowed_values: vec![],
        },
        default_value: default.map(str::to_string),
        min_occurs: u32::from(default.is_none()),
        max_occurs: 1,
    }
}

pub fn complex_input(identifier: &str, mime_type: &str) -> InputSpec {
    InputSpec {
        identifier: identifier.into(),
        title: None,
        abstract_text: None,
        kind: DataKind::Complex {
            formats: vec![Format::new(mime_type)],
        },
        default_value: None,
        min_occurs: 0,
        max_occurs: 1,
    }
}

pub fn literal_output(identifier: &str, data_type: LiteralType) -> OutputSpec {
    OutputSpec {
        identifier: identifier.into(),
        title: None,
        abstract_text: None,
        kind: DataKind::Literal {
            data_type,
            allowed_values: vec![],
        },
    }
}

pub fn complex_output(identifier: &str, mime_type: &str) -> OutputSpec {
    OutputSpec {
        identifier: identifier.into(),
        title: None,
        abstract_text: None,
        kind: DataKind::Complex {
            formats: vec![Format::new(mime_type)],
        },
    }
}

/// `hello(name) -> output`, supporting store and status.
pub fn hello_descriptor() -> ProcessDescriptor {
    ProcessDescriptor {
        identifier: "hello".into(),
        title: Some("Say Hello".into()),
        abstract_text: Some("Just says a friendly Hello.".into()),
        version: Some("1.5".into()),
        inputs: vec![literal_input("name", LiteralType::String, None)],
        outputs: vec![literal_output("output", LiteralType::String)],
        supports_store: true,
        supports_status: true,
    }
}

/// Answers `hello` with `Hello {name}`.
pub fn hello_handler(request: &ExecuteRequest) -> Vec<RawOutput> {
    let name = request
        .inputs
        .iter()
        .find_map(|(id, value)| match (id.as_str(), value) {
            ("name", WireValue::Literal(text)) => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_default();
    vec![literal_raw("output", &format!("Hello {name}"))]
}

pub fn literal_raw(identifier: &str, text: &str) -> RawOutput {
    RawOutput {
        identifier: identifier.into(),
        data_type: Some("string".into()),
        mime_type: None,
        data: vec![WireValue::Literal(text.into())],
        reference: None,
    }
}

pub fn reference_raw(identifier: &str, href: &str, mime_type: &str) -> RawOutput {
    RawOutput {
        identifier: identifier.into(),
        data_type: None,
        mime_type: Some(mime_type.into()),
        data: vec![],
        reference: Some(href.into()),
    }
}

pub fn report(status: ReportedStatus, percent: u8, message: &str) -> StatusReport {
    StatusReport {
        status,
        percent_completed: percent,
        message: message.into(),
        status_location: Some(STATUS_LOCATION.into()),
        outputs: vec![],
    }
}

// ─── MockService ─────────────────────────────────────────────────────────────

pub struct MockService {
    url: String,
    processes: Vec<ProcessDescriptor>,
    handlers: HashMap<String, Handler>,
    references: HashMap<String, Vec<u8>>,
    capabilities_error: Mutex<Option<ServiceError>>,
    describe_error: Mutex<Option<ServiceError>>,
    execute_error: Mutex<Option<ServiceError>>,
    status_error: Mutex<Option<ServiceError>>,
    /// Reports returned by successive status polls.
    status_script: Mutex<VecDeque<StatusReport>>,
    /// Keep reporting `Started` once the script runs out.
    never_finishes: bool,
    /// Outputs of the last asynchronous submission.
    pending_outputs: Mutex<Vec<RawOutput>>,
    requests: Mutex<Vec<ExecuteRequest>>,
    describe_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockService {
    pub fn new() -> Self {
        Self::with_url("http://mock.wps/wps")
    }

    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.into(),
            processes: Vec::new(),
            handlers: HashMap::new(),
            references: HashMap::new(),
            capabilities_error: Mutex::new(None),
            describe_error: Mutex::new(None),
            execute_error: Mutex::new(None),
            status_error: Mutex::new(None),
            status_script: Mutex::new(VecDeque::new()),
            never_finishes: false,
            pending_outputs: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            describe_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_process(mut self, descriptor: ProcessDescriptor) -> Self {
        self.processes.push(descriptor);
        self
    }

    pub fn with_handler(
        mut self,
        identifier: &str,
        handler: impl Fn(&ExecuteRequest) -> Vec<RawOutput> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(identifier.into(), Box::new(handler));
        self
    }

    pub fn with_reference(mut self, href: &str, content: &[u8]) -> Self {
        self.references.insert(href.into(), content.to_vec());
        self
    }

    pub fn with_status_script(self, reports: Vec<StatusReport>) -> Self {
        *self.status_script.lock().unwrap() = reports.into();
        self
    }

    pub fn never_finishes(mut self) -> Self {
        self.never_finishes = true;
        self
    }

    pub fn fail_capabilities(self, error: ServiceError) -> Self {
        *self.capabilities_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_describe(self, error: ServiceError) -> Self {
        *self.describe_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_execute(self, error: ServiceError) -> Self {
        *self.execute_error.lock().unwrap() = Some(error);
        self
    }

    pub fn fail_status(self, error: ServiceError) -> Self {
        *self.status_error.lock().unwrap() = Some(error);
        self
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Execute requests received so far.
    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn outputs_for(&self, request: &ExecuteRequest) -> Vec<RawOutput> {
        self.handlers
            .get(&request.identifier)
            .map(|handler| handler(request))
            .unwrap_or_default()
    }
}

#[async_trait]
impl WpsService for MockService {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_capabilities(&self) -> Result<Capabilities, ServiceError> {
        if let Some(error) = self.capabilities_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(Capabilities {
            title: Some("Mock WPS".into()),
            version: Some("1.0.0".into()),
            processes: self
                .processes
                .iter()
                .map(|p| ProcessSummary {
                    identifier: p.identifier.clone(),
                    title: p.title.clone(),
                    abstract_text: p.abstract_text.clone(),
                    version: p.version.clone(),
                })
                .collect(),
        })
    }

    async fn describe_process(&self, identifier: &str) -> Result<ProcessDescriptor, ServiceError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.describe_error.lock().unwrap().take() {
            return Err(error);
        }
        self.processes
            .iter()
            .find(|p| p.identifier == identifier)
            .cloned()
            .ok_or_else(|| ServiceError::Exception {
                code: "InvalidParameterValue".into(),
                locator: Some("identifier".into()),
                text: format!("unknown process {identifier}"),
            })
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<StatusReport, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = self.execute_error.lock().unwrap().take() {
            return Err(error);
        }
        let outputs = self.outputs_for(request);
        match request.mode {
            ExecutionMode::Sync => Ok(StatusReport {
                status: ReportedStatus::Succeeded,
                percent_completed: 100,
                message: "done".into(),
                status_location: None,
                outputs,
            }),
            ExecutionMode::Async => {
                *self.pending_outputs.lock().unwrap() = outputs;
                Ok(report(ReportedStatus::Accepted, 0, "accepted"))
            }
        }
    }

    async fn check_status(&self, _status_location: &str) -> Result<StatusReport, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.status_error.lock().unwrap().take() {
            return Err(error);
        }
        let next = self.status_script.lock().unwrap().pop_front();
        let mut current = match next {
            Some(scripted) => scripted,
            None if self.never_finishes => report(ReportedStatus::Started, 50, "still running"),
            None => report(ReportedStatus::Succeeded, 100, "done"),
        };
        if current.status == ReportedStatus::Succeeded {
            current.outputs = self.pending_outputs.lock().unwrap().clone();
        }
        Ok(current)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ServiceError> {
        self.references
            .get(reference)
            .cloned()
            .ok_or_else(|| ServiceError::Http {
                status: 404,
                body: format!("{reference} not found"),
            })
    }
}
