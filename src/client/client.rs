//! WPS client: discovers the processes of one endpoint and exposes each as
//! a bound operation.
//!
//! Construction discovers and binds every requested process. A call then
//! goes through the execution controller, the monitor (for asynchronous
//! runs) and the result materializer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::binder::{Arguments, BoundOperation, ProcessBinder};
use super::capabilities::CapabilityCache;
use super::config::{ClientConfig, Credentials};
use super::converters::{ConverterRegistry, OutputConverter};
use super::convert::TypeConverter;
use super::errors::WpsError;
use super::execution::{ExecutionController, ExecutionHandle, ExecutionStatus};
use super::interact::{interact, ParameterForm};
use super::monitor::{cancel_on_ctrl_c, Monitor, Presentation, ProgressPresenter, SilentPresenter};
use super::results::{ExecutionResult, ResultMaterializer};
use super::value::Value;
use crate::protocol::{HttpWpsService, WpsService};

// ─── Client ──────────────────────────────────────────────────────────────────

/// A connected WPS client.
pub struct Client {
    config: ClientConfig,
    service: Arc<dyn WpsService>,
    cache: CapabilityCache,
    /// Bound operations in server order.
    operations: Vec<BoundOperation>,
    /// Operation name → index into `operations`.
    by_name: HashMap<String, usize>,
    controller: ExecutionController,
    converter: TypeConverter,
    converters: ConverterRegistry,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.config.url)
            .field("processes", &self.processes())
            .field("progress", &self.config.progress)
            .finish()
    }
}

impl Client {
    pub fn builder(url: &str) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    /// Connect over HTTP using `config`, with the default converters.
    pub async fn connect(config: ClientConfig) -> Result<Self, WpsError> {
        config.validate()?;
        let service = HttpWpsService::new(&config.url, &config.version, &config.http_options())?;
        Self::with_service(config, Arc::new(service), ConverterRegistry::with_defaults()).await
    }

    /// Connect through an existing service implementation.
    pub async fn with_service(
        config: ClientConfig,
        service: Arc<dyn WpsService>,
        converters: ConverterRegistry,
    ) -> Result<Self, WpsError> {
        if config.progress && crate::init_tracing(true) {
            tracing::debug!("installed interactive log subscriber");
        }

        let mut cache = CapabilityCache::discover(service.as_ref(), config.processes.as_deref()).await?;

        let converter = TypeConverter::new(service.url());
        let binder = ProcessBinder::new(converter.clone());
        let operations = binder.bind_all(&mut cache, service.as_ref()).await?;
        let by_name = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.name.clone(), i))
            .collect();

        tracing::info!(
            url = %config.url,
            operations = operations.len(),
            progress = config.progress,
            "WPS client ready"
        );

        Ok(Self {
            controller: ExecutionController::new(service.clone(), converter.clone(), config.progress),
            config,
            service,
            cache,
            operations,
            by_name,
            converter,
            converters,
        })
    }

    // ─── Introspection ───────────────────────────────────────────────────

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Service title from the capability listing.
    pub fn title(&self) -> Option<&str> {
        self.cache.title()
    }

    /// Names of the bound operations, in server order.
    pub fn processes(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name.as_str()).collect()
    }

    /// Look up an operation by name or by process identifier.
    pub fn operation(&self, name: &str) -> Option<&BoundOperation> {
        self.by_name
            .get(name)
            .map(|&i| &self.operations[i])
            .or_else(|| self.operations.iter().find(|op| op.identifier == name))
    }

    pub fn operations(&self) -> &[BoundOperation] {
        &self.operations
    }

    pub fn doc(&self, name: &str) -> Option<&str> {
        self.operation(name).map(|op| op.doc.as_str())
    }

    /// Parameter form for an operation, `None` outside an interactive host.
    pub fn interact(&self, name: &str) -> Result<Option<ParameterForm>, WpsError> {
        let operation = self.require(name)?;
        Ok(interact(operation))
    }

    fn require(&self, name: &str) -> Result<&BoundOperation, WpsError> {
        self.operation(name).ok_or_else(|| WpsError::UnknownOperation {
            name: name.to_string(),
        })
    }

    // ─── Calls ───────────────────────────────────────────────────────────

    /// Call a bound operation.
    ///
    /// With `cancel_on_ctrl_c` enabled in progress mode, Ctrl-C cancels a
    /// monitored execution. A remote failure, a lost status connection or a
    /// cancellation is not an error here; it is reported by the returned
    /// result.
    pub async fn call(&self, name: &str, arguments: Arguments) -> Result<ExecutionResult, WpsError> {
        let token = CancellationToken::new();
        let listener = (self.config.progress && self.config.cancel_on_ctrl_c)
            .then(|| cancel_on_ctrl_c(token.clone()));
        let result = self.call_with_token(name, arguments, &token).await;
        if let Some(listener) = listener {
            listener.abort();
        }
        result
    }

    /// Call a bound operation, cancelling it when `token` fires.
    pub async fn call_with_token(
        &self,
        name: &str,
        arguments: Arguments,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, WpsError> {
        let operation = self.require(name)?;
        let inputs = operation.resolve(arguments)?;
        let mut presenter = self.presenter_for(operation);
        self.run(operation, &inputs, token, presenter.as_mut()).await
    }

    /// Execute a process by identifier with already resolved inputs.
    ///
    /// Absent inputs must simply be left out of `inputs`.
    pub async fn execute(
        &self,
        identifier: &str,
        inputs: Vec<(String, Value)>,
    ) -> Result<ExecutionResult, WpsError> {
        let operation = self
            .operations
            .iter()
            .find(|op| op.identifier == identifier)
            .ok_or_else(|| WpsError::UnknownOperation {
                name: identifier.to_string(),
            })?;
        let mut presenter = self.presenter_for(operation);
        self.run(operation, &inputs, &CancellationToken::new(), presenter.as_mut())
            .await
    }

    fn presenter_for(&self, operation: &BoundOperation) -> Box<dyn ProgressPresenter> {
        if self.controller.wants_monitor(&operation.descriptor) {
            self.config.presentation.presenter()
        } else {
            Box::new(SilentPresenter)
        }
    }

    async fn run(
        &self,
        operation: &BoundOperation,
        inputs: &[(String, Value)],
        token: &CancellationToken,
        presenter: &mut dyn ProgressPresenter,
    ) -> Result<ExecutionResult, WpsError> {
        let mut handle = self.controller.submit(&operation.descriptor, inputs).await?;

        if !handle.is_terminal() {
            let watched = Monitor::new(&self.controller, self.config.poll_interval())
                .watch(&mut handle, token, presenter)
                .await;
            if let Err(e) = watched {
                // The handle is already Failed with the error text
                tracing::warn!(process = %handle.process(), error = %e, "lost track of execution");
                return Ok(ExecutionResult::unfinished(handle));
            }
        }

        self.finish(operation, handle).await
    }

    async fn finish(
        &self,
        operation: &BoundOperation,
        handle: ExecutionHandle,
    ) -> Result<ExecutionResult, WpsError> {
        if handle.status() == ExecutionStatus::Succeeded {
            let values = ResultMaterializer::new(
                self.service.as_ref(),
                &self.converter,
                &self.converters,
                self.config.convert_objects,
            )
            .materialize(&handle, &operation.outputs)
            .await?;
            return Ok(ExecutionResult::new(handle, values, &operation.outputs));
        }

        tracing::info!(
            process = %handle.process(),
            status = %handle.status(),
            message = %handle.message(),
            "execution did not succeed"
        );
        Ok(ExecutionResult::unfinished(handle))
    }
}

// ─── ClientBuilder ───────────────────────────────────────────────────────────

/// Programmatic alternative to a config file.
pub struct ClientBuilder {
    config: ClientConfig,
    converters: ConverterRegistry,
    service: Option<Arc<dyn WpsService>>,
}

impl ClientBuilder {
    pub fn new(url: &str) -> Self {
        Self::from_config(ClientConfig::new(url))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            converters: ConverterRegistry::with_defaults(),
            service: None,
        }
    }

    /// Bind only these processes (matched case-insensitively).
    pub fn processes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.processes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn converter(mut self, converter: Arc<dyn OutputConverter>) -> Self {
        self.converters.register(converter);
        self
    }

    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn credentials(mut self, username: &str, password: Option<&str>) -> Self {
        self.config.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.map(str::to_string),
        });
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.config.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.config.transport.verify = verify;
        self
    }

    /// Total request timeout, rounded up to whole seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout_secs = whole_secs(timeout);
        self
    }

    /// Connect timeout, rounded up to whole seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout_secs = whole_secs(timeout);
        self
    }

    /// Cancel monitored executions on Ctrl-C. See [`cancel_on_ctrl_c`] for
    /// the effect on the host process.
    pub fn cancel_on_ctrl_c(mut self, enabled: bool) -> Self {
        self.config.cancel_on_ctrl_c = enabled;
        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.config.progress = progress;
        self
    }

    pub fn presentation(mut self, presentation: Presentation) -> Self {
        self.config.presentation = presentation;
        self
    }

    pub fn convert_objects(mut self, convert: bool) -> Self {
        self.config.convert_objects = convert;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.config.version = version.to_string();
        self
    }

    /// Seconds between status checks of an asynchronous execution.
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    /// Talk to `service` instead of opening an HTTP connection.
    pub fn service(mut self, service: Arc<dyn WpsService>) -> Self {
        self.service = Some(service);
        self
    }

    pub async fn connect(self) -> Result<Client, WpsError> {
        self.config.validate()?;
        let service: Arc<dyn WpsService> = match self.service {
            Some(service) => service,
            None => Arc::new(HttpWpsService::new(
                &self.config.url,
                &self.config.version,
                &self.config.http_options(),
            )?),
        };
        Client::with_service(self.config, service, self.converters).await
    }
}

fn whole_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::results::Materialized;
    use crate::client::testing::{
        complex_output, hello_descriptor, hello_handler, literal_input, literal_output, literal_raw,
        reference_raw, report, MockService,
    };
    use crate::client::testing::STATUS_LOCATION;
    use crate::protocol::{
        ExecutionMode, LiteralType, ProcessDescriptor, ReportedStatus, ServiceError,
    };

    async fn client_for(service: MockService, progress: bool) -> (Arc<MockService>, Client) {
        let service = Arc::new(service);
        let client = Client::builder(service.url())
            .service(service.clone())
            .progress(progress)
            .presentation(Presentation::Console)
            .poll_interval_secs(1)
            .connect()
            .await
            .unwrap();
        (service, client)
    }

    fn two_output_descriptor() -> ProcessDescriptor {
        ProcessDescriptor {
            identifier: "inout".into(),
            title: Some("In and Out".into()),
            abstract_text: None,
            version: None,
            inputs: vec![literal_input("string", LiteralType::String, Some("This is just a string"))],
            outputs: vec![
                literal_output("string", LiteralType::String),
                complex_output("output", "application/x-netcdf"),
            ],
            supports_store: false,
            supports_status: false,
        }
    }

    #[tokio::test]
    async fn test_hello_end_to_end() {
        let (_, client) = client_for(
            MockService::new()
                .with_process(hello_descriptor())
                .with_handler("hello", hello_handler),
            false,
        )
        .await;

        let result = client
            .call("hello", Arguments::new().arg("name", "david"))
            .await
            .unwrap();
        assert_eq!(
            result.get(None).unwrap(),
            Materialized::Single(Value::from("Hello david"))
        );
        assert_eq!(result.output("output").unwrap(), &Value::from("Hello david"));
    }

    #[tokio::test]
    async fn test_two_outputs_with_reference_fallback() {
        let url = "http://mock.wps/outputs/out.nc";
        let (_, client) = client_for(
            MockService::new()
                .with_process(two_output_descriptor())
                .with_handler("inout", move |_| {
                    vec![
                        literal_raw("string", "This is just a string"),
                        reference_raw("output", url, "application/x-netcdf"),
                    ]
                }),
            false,
        )
        .await;

        let result = client.call("inout", Arguments::new()).await.unwrap();
        assert_eq!(
            result.get(None).unwrap(),
            Materialized::Sequence(vec![
                Value::from("This is just a string"),
                Value::Reference(url.into()),
            ])
        );
    }

    #[tokio::test]
    async fn test_unknown_process_named_exactly() {
        let service = Arc::new(MockService::new().with_process(hello_descriptor()));
        let err = Client::builder(service.url())
            .service(service.clone())
            .processes(["HELLO", "doesnotexist"])
            .connect()
            .await
            .unwrap_err();
        match err {
            WpsError::UnknownProcess { names } => assert_eq!(names, vec!["doesnotexist"]),
            other => panic!("expected UnknownProcess, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_filter_binds_subset() {
        let (service, client) = {
            let service = Arc::new(
                MockService::new()
                    .with_process(hello_descriptor())
                    .with_process(two_output_descriptor()),
            );
            let client = Client::builder(service.url())
                .service(service.clone())
                .processes(["Hello"])
                .connect()
                .await
                .unwrap();
            (service, client)
        };
        assert_eq!(client.processes(), vec!["hello"]);
        assert_eq!(service.describe_calls(), 1);
        assert!(client.operation("inout").is_none());
    }

    #[tokio::test]
    async fn test_sync_without_store_support_even_in_progress_mode() {
        let (service, client) = client_for(
            MockService::new()
                .with_process(two_output_descriptor())
                .with_handler("inout", |_| vec![literal_raw("string", "x")]),
            true,
        )
        .await;

        let result = client.call("inout", Arguments::new()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(service.requests()[0].mode, ExecutionMode::Sync);
        assert_eq!(service.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_progress_mode_runs_async_and_monitors() {
        let (service, client) = client_for(
            MockService::new()
                .with_process(hello_descriptor())
                .with_handler("hello", hello_handler)
                .with_status_script(vec![report(ReportedStatus::Started, 50, "working")]),
            true,
        )
        .await;

        let result = client
            .call("hello", Arguments::new().arg("name", "david"))
            .await
            .unwrap();
        let request = &service.requests()[0];
        assert_eq!(request.mode, ExecutionMode::Async);
        assert!(request.status);
        assert_eq!(service.status_calls(), 2);
        assert_eq!(result.output("output").unwrap(), &Value::from("Hello david"));
    }

    #[tokio::test]
    async fn test_cancelled_call_is_not_materialized() {
        let (_, client) = client_for(
            MockService::new()
                .with_process(hello_descriptor())
                .with_handler("hello", hello_handler)
                .never_finishes(),
            true,
        )
        .await;

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = client
            .call_with_token("hello", Arguments::new().arg("name", "david"), &token)
            .await
            .unwrap();
        assert_eq!(result.status(), ExecutionStatus::Cancelled);
        assert!(matches!(
            result.get(None),
            Err(WpsError::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_lost_status_connection_returns_failed_result() {
        let (_, client) = client_for(
            MockService::new()
                .with_process(hello_descriptor())
                .with_handler("hello", hello_handler)
                .fail_status(ServiceError::Transport {
                    url: STATUS_LOCATION.into(),
                    reason: "connection reset".into(),
                }),
            true,
        )
        .await;

        let result = client
            .call("hello", Arguments::new().arg("name", "david"))
            .await
            .unwrap();
        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert!(result.handle().message().contains("connection reset"));
        assert!(matches!(
            result.get(None),
            Err(WpsError::ExecutionFailed { .. })
        ));
    }

    #[test]
    fn test_builder_timeouts_round_up() {
        let builder = Client::builder("http://mock.wps/wps")
            .timeout(Duration::from_millis(500))
            .connect_timeout(Duration::from_millis(2500));
        assert_eq!(builder.config.transport.timeout_secs, 1);
        assert_eq!(builder.config.transport.connect_timeout_secs, 3);
        assert!(builder.config.validate().is_ok());

        let builder = Client::builder("http://mock.wps/wps").timeout(Duration::from_secs(30));
        assert_eq!(builder.config.transport.timeout_secs, 30);
    }

    #[test]
    fn test_ctrl_c_listener_is_opt_in() {
        let builder = Client::builder("http://mock.wps/wps").progress(true);
        assert!(!builder.config.cancel_on_ctrl_c);
        assert!(builder.cancel_on_ctrl_c(true).config.cancel_on_ctrl_c);
    }

    #[tokio::test]
    async fn test_remote_failure_is_result_not_error() {
        let (_, client) = client_for(
            MockService::new()
                .with_process(hello_descriptor())
                .with_status_script(vec![report(ReportedStatus::Failed, 0, "Process error: boom")]),
            true,
        )
        .await;

        let result = client
            .call("hello", Arguments::new().arg("name", "david"))
            .await
            .unwrap();
        assert_eq!(result.status(), ExecutionStatus::Failed);
        match result.get(Some("output")).unwrap_err() {
            WpsError::ExecutionFailed { message, .. } => assert_eq!(message, "Process error: boom"),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_introspection_and_unknown_operation() {
        let mut descriptor = hello_descriptor();
        descriptor.identifier = "Say.Hello".into();
        let (_, client) = client_for(MockService::new().with_process(descriptor), false).await;

        assert_eq!(client.processes(), vec!["say_hello"]);
        assert!(client.operation("Say.Hello").is_some());
        assert!(client.doc("say_hello").unwrap().contains("Parameters"));
        assert_eq!(client.title(), Some("Mock WPS"));
        assert!(matches!(
            client.call("nope", Arguments::new()).await,
            Err(WpsError::UnknownOperation { .. })
        ));
        assert!(matches!(
            client
                .call("say_hello", Arguments::new().arg("nmae", "x"))
                .await,
            Err(WpsError::UnknownParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_by_identifier_omits_absent_inputs() {
        let (service, client) = client_for(
            MockService::new()
                .with_process(two_output_descriptor())
                .with_handler("inout", |_| vec![literal_raw("string", "x")]),
            false,
        )
        .await;

        client.execute("inout", Vec::new()).await.unwrap();
        assert!(service.requests()[0].inputs.is_empty());
    }
}
