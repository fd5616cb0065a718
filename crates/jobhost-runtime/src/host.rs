//! The job host.
//!
//! [`JobHostBuilder::build`] indexes every function: each trigger parameter
//! is offered to the binding providers of its attribute kind, and the first
//! provider that accepts it supplies the [`Binding`] used for every later
//! invocation. [`JobHost::call`] binds the arguments, runs the body and
//! reports the invocation to the instance loggers and the result aggregator.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use jobhost_core::{
    Binding, BindingProvider, BindingProviderContext, BindingResult, BindingRule, BoxedValue,
    ConversionContext, ConverterRegistry, ConverterRegistryBuilder, ParameterDescriptor,
    ParameterInfo, TypeDesc,
};
use jobhost_telemetry::{
    AggregatorOptions, DiagnosticsHandle, FunctionCompletedMessage, FunctionInstanceLogEntry,
    FunctionInstanceLogger, FunctionStartedMessage, ResultAggregator, SummarySink,
    TracingInstanceLogger,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::{HostConfig, validate_config};
use crate::error::{HostError, HostResult};
use crate::extension::Extension;

/// Target of the per-invocation `function` span.
pub const FUNCTION_TARGET: &str = "jobhost::function";

/// Trigger reason recorded for [`JobHost::call`].
pub const PROGRAMMATIC_TRIGGER_REASON: &str =
    "This function was programmatically called via the host APIs.";

/// Arguments by parameter name.
pub type FunctionArguments = HashMap<String, BoxedValue>;

/// What a function body returns: `Err` carries the failure description.
pub type FunctionOutcome = Result<(), String>;

type FunctionBody =
    Arc<dyn Fn(FunctionArguments, CancellationToken) -> BoxFuture<'static, FunctionOutcome> + Send + Sync>;

// =============================================================================
// Function definitions
// =============================================================================

/// Re-runs a failed function a fixed number of times, waiting `delay`
/// between attempts.
///
/// Every attempt is a separate invocation with its own id. Binding failures
/// are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelayRetry {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Wait before each retry.
    pub delay: Duration,
}

impl FixedDelayRetry {
    /// Creates a policy.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

/// A user function: a name, declared parameters and an async body.
#[derive(Clone)]
pub struct FunctionDefinition {
    name: String,
    parameters: Vec<ParameterInfo>,
    retry: Option<FixedDelayRetry>,
    body: FunctionBody,
}

impl FunctionDefinition {
    /// Creates a function without parameters.
    ///
    /// The body receives the bound arguments and a token that is cancelled
    /// when the host stops.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(FunctionArguments, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FunctionOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            retry: None,
            body: Arc::new(move |args, token| body(args, token).boxed()),
        }
    }

    /// Declares a parameter.
    ///
    /// Parameters with an attribute are trigger parameters and are bound
    /// through a provider. The others are passed through from the call.
    pub fn parameter(mut self, parameter: ParameterInfo) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Retries failed invocations with `policy`.
    pub fn retry(mut self, policy: FixedDelayRetry) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters.
    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResult {
    /// Unique id of the invocation.
    pub invocation_id: Uuid,
    /// Whether the body completed without error.
    pub succeeded: bool,
    /// Failure description, when it did not.
    pub failure: Option<String>,
}

enum ParameterSource {
    Trigger(Arc<dyn Binding>),
    Plain,
}

struct IndexedParameter {
    name: String,
    source: ParameterSource,
}

struct IndexedFunction {
    definition: FunctionDefinition,
    parameters: Vec<IndexedParameter>,
}

// =============================================================================
// Builder
// =============================================================================

type ConverterRegistration = Box<dyn FnOnce(&mut ConverterRegistryBuilder) + Send>;
type ResultAggregatorFactory = Box<dyn FnOnce(AggregatorOptions) -> ResultAggregator + Send>;

/// Builder for [`JobHost`].
///
/// ```rust,ignore
/// let host = JobHost::builder()
///     .config(load_config()?)
///     .extension(BlobExtension)
///     .function(
///         FunctionDefinition::new("resize", |args, _| async move { Ok(()) })
///             .parameter(ParameterInfo::new("blob", TypeDesc::string()).with_attribute(attr)),
///     )
///     .build()?;
/// ```
pub struct JobHostBuilder {
    config: HostConfig,
    extensions: Vec<Box<dyn Extension>>,
    converters: Vec<ConverterRegistration>,
    loggers: Vec<Arc<dyn FunctionInstanceLogger>>,
    functions: Vec<FunctionDefinition>,
    results: Option<ResultAggregatorFactory>,
    diagnostics: Option<DiagnosticsHandle>,
}

impl Default for JobHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JobHostBuilder {
    /// Creates a builder with the default configuration and the tracing
    /// instance logger.
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
            extensions: Vec::new(),
            converters: Vec::new(),
            loggers: vec![Arc::new(TracingInstanceLogger)],
            functions: Vec::new(),
            results: None,
            diagnostics: None,
        }
    }

    /// Sets the host configuration.
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a trigger extension.
    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    /// Registers extra converters after every extension's.
    ///
    /// A registration for an existing `(scope, source, dest)` replaces the
    /// extension's converter.
    pub fn converters<F>(mut self, register: F) -> Self
    where
        F: FnOnce(&mut ConverterRegistryBuilder) + Send + 'static,
    {
        self.converters.push(Box::new(register));
        self
    }

    /// Adds an instance logger.
    pub fn logger(mut self, logger: Arc<dyn FunctionInstanceLogger>) -> Self {
        self.loggers.push(logger);
        self
    }

    /// Adds a function.
    pub fn function(mut self, function: FunctionDefinition) -> Self {
        self.functions.push(function);
        self
    }

    /// Writes aggregated result summaries to `sink` instead of `tracing`.
    pub fn summary_sink(mut self, sink: impl SummarySink) -> Self {
        self.results = Some(Box::new(move |options| ResultAggregator::new(options, sink)));
        self
    }

    /// Hands the diagnostics capture to the host, which shuts it down on stop.
    pub fn diagnostics(mut self, handle: DiagnosticsHandle) -> Self {
        self.diagnostics = Some(handle);
        self
    }

    /// Builds the registry, indexes every function and starts the result
    /// aggregator.
    ///
    /// Must be called within a Tokio runtime when aggregation is enabled.
    pub fn build(self) -> HostResult<JobHost> {
        validate_config(&self.config)?;

        let mut converters = ConverterRegistry::builder();
        for extension in &self.extensions {
            debug!(extension = extension.name(), "Registering converters");
            extension.register_converters(&mut converters);
        }
        for register in self.converters {
            register(&mut converters);
        }
        let registry = Arc::new(converters.build());

        let providers: Vec<Arc<dyn BindingProvider>> = self
            .extensions
            .iter()
            .flat_map(|extension| extension.trigger_providers(&registry))
            .collect();

        let mut functions = HashMap::with_capacity(self.functions.len());
        for definition in self.functions {
            if functions.contains_key(definition.name()) {
                return Err(HostError::DuplicateFunction(definition.name().to_string()));
            }
            let indexed = index_function(&providers, definition)?;
            functions.insert(indexed.definition.name().to_string(), indexed);
        }

        let results = if self.config.aggregator.enabled {
            let options = self.config.aggregator.to_options();
            Some(match self.results {
                Some(factory) => factory(options),
                None => ResultAggregator::with_tracing(options),
            })
        } else {
            None
        };

        info!(
            functions = functions.len(),
            providers = providers.len(),
            converters = registry.len(),
            "Job host built"
        );

        Ok(JobHost {
            registry,
            providers,
            functions,
            loggers: self.loggers,
            results,
            diagnostics: self.diagnostics,
            shutdown: CancellationToken::new(),
            in_flight: TaskTracker::new(),
            stopped: AtomicBool::new(false),
        })
    }
}

fn index_function(
    providers: &[Arc<dyn BindingProvider>],
    definition: FunctionDefinition,
) -> HostResult<IndexedFunction> {
    let mut parameters = Vec::with_capacity(definition.parameters.len());
    for parameter in &definition.parameters {
        let source = if parameter.attribute.is_some() {
            ParameterSource::Trigger(index_parameter(providers, &definition.name, parameter)?)
        } else {
            ParameterSource::Plain
        };
        parameters.push(IndexedParameter {
            name: parameter.name.clone(),
            source,
        });
    }

    debug!(function = %definition.name, parameters = parameters.len(), "Indexed function");
    Ok(IndexedFunction {
        definition,
        parameters,
    })
}

/// `object` and `object[]` ask the provider for a concrete default type.
///
/// A single trigger value never binds to `object[]` itself, so an `object[]`
/// parameter only binds when the trigger converts to a batch default type.
fn is_loose(type_desc: &TypeDesc) -> bool {
    type_desc.is_object() || type_desc.element().is_some_and(TypeDesc::is_object)
}

fn index_parameter(
    providers: &[Arc<dyn BindingProvider>],
    function: &str,
    parameter: &ParameterInfo,
) -> HostResult<Arc<dyn Binding>> {
    let kind = parameter.attribute_kind();
    let loose = is_loose(&parameter.type_desc);

    for provider in providers
        .iter()
        .filter(|p| Some(p.attribute_kind()) == kind.as_ref())
    {
        if loose {
            let resolved = provider.default_type(&parameter.type_desc)?;
            if resolved != parameter.type_desc {
                let concrete = ParameterInfo {
                    type_desc: resolved,
                    ..parameter.clone()
                };
                let ctx = BindingProviderContext::new(function, &concrete);
                if let Some(binding) = provider.try_create(&ctx)? {
                    debug!(
                        function,
                        parameter = %parameter.name,
                        requested = %parameter.type_desc,
                        resolved = %concrete.type_desc,
                        "Bound loose parameter to default type"
                    );
                    return Ok(binding);
                }
            }
        }

        let ctx = BindingProviderContext::new(function, parameter);
        if let Some(binding) = provider.try_create(&ctx)? {
            return Ok(binding);
        }
    }

    Err(HostError::NoBindingProvider {
        function: function.to_string(),
        parameter: parameter.name.clone(),
        type_name: parameter.type_desc.to_string(),
    })
}

// =============================================================================
// JobHost
// =============================================================================

/// Indexed functions ready to be invoked.
pub struct JobHost {
    registry: Arc<ConverterRegistry>,
    providers: Vec<Arc<dyn BindingProvider>>,
    functions: HashMap<String, IndexedFunction>,
    loggers: Vec<Arc<dyn FunctionInstanceLogger>>,
    results: Option<ResultAggregator>,
    diagnostics: Option<DiagnosticsHandle>,
    shutdown: CancellationToken,
    in_flight: TaskTracker,
    stopped: AtomicBool,
}

impl JobHost {
    /// Creates a builder.
    pub fn builder() -> JobHostBuilder {
        JobHostBuilder::new()
    }

    /// The shared converter registry.
    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    /// Names of the indexed functions.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Describes the trigger parameters of a function.
    pub fn describe(&self, name: &str) -> HostResult<Vec<ParameterDescriptor>> {
        let function = self.function(name)?;
        Ok(function
            .parameters
            .iter()
            .filter_map(|p| match &p.source {
                ParameterSource::Trigger(binding) => Some(binding.to_parameter_descriptor()),
                ParameterSource::Plain => None,
            })
            .collect())
    }

    /// Every parameter type the registered triggers can bind to.
    pub fn binding_rules(&self) -> Vec<BindingRule> {
        self.providers.iter().flat_map(|p| p.rules()).collect()
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn function(&self, name: &str) -> HostResult<&IndexedFunction> {
        self.functions
            .get(name)
            .ok_or_else(|| HostError::FunctionNotFound(name.to_string()))
    }

    /// Invokes a function.
    ///
    /// Every declared parameter needs an argument. A trigger argument is the
    /// trigger's native value, a `String` or a `DirectInvokeString`; plain
    /// arguments are passed through unchanged.
    ///
    /// A failing body yields `Ok` with `succeeded == false`, after any
    /// retries the function allows; the result is that of the last attempt.
    /// A binding failure is reported as a failed invocation and returned as
    /// [`HostError::Binding`].
    pub async fn call(&self, name: &str, args: FunctionArguments) -> HostResult<FunctionResult> {
        self.in_flight.track_future(self.run(name, args)).await
    }

    async fn run(&self, name: &str, args: FunctionArguments) -> HostResult<FunctionResult> {
        if self.is_stopped() {
            return Err(HostError::Stopped);
        }
        let function = self.function(name)?;
        if let Some(missing) = function
            .parameters
            .iter()
            .find(|p| !args.contains_key(&p.name))
        {
            return Err(HostError::missing_argument(name, &missing.name));
        }

        let Some(retry) = function.definition.retry else {
            return self.invoke(name, function, args).await;
        };

        let mut attempt = 0;
        loop {
            let result = self.invoke(name, function, args.clone()).await?;
            if result.succeeded || attempt >= retry.max_retries {
                return Ok(result);
            }
            attempt += 1;

            info!(
                function = %name,
                attempt,
                max_retries = retry.max_retries,
                delay_ms = u64::try_from(retry.delay.as_millis()).unwrap_or(u64::MAX),
                "Waiting before retrying function execution"
            );
            tokio::select! {
                () = tokio::time::sleep(retry.delay) => {}
                () = self.shutdown.cancelled() => {
                    debug!(function = %name, attempt, "Host stopping, retries abandoned");
                    return Ok(result);
                }
            }
        }
    }

    /// One attempt: bind, run the body, report.
    async fn invoke(
        &self,
        name: &str,
        function: &IndexedFunction,
        mut args: FunctionArguments,
    ) -> HostResult<FunctionResult> {
        let invocation_id = Uuid::new_v4();
        let cancellation = self.shutdown.child_token();
        let ctx = ConversionContext::new()
            .with_cancellation(cancellation.clone())
            .with_function(name)
            .with_invocation_id(invocation_id);
        let span = info_span!(
            target: FUNCTION_TARGET,
            "function",
            function = %name,
            invocation_id = %invocation_id
        );

        async move {
            let start_time = Utc::now();
            let (invoke_strings, bound) = bind_arguments(function, &mut args, &ctx).await;

            let started = FunctionStartedMessage {
                invocation_id,
                function_name: name.to_string(),
                start_time,
                arguments: invoke_strings,
                trigger_reason: Some(PROGRAMMATIC_TRIGGER_REASON.to_string()),
            };
            for logger in &self.loggers {
                logger.function_started(&started).await;
            }

            let values = match bound {
                Ok(values) => values,
                Err(e) => {
                    self.complete(started, Some(e.to_string())).await;
                    return Err(e.into());
                }
            };

            let body = (function.definition.body)(values, cancellation);
            let (failure, error) = match tokio::spawn(body.in_current_span()).await {
                Ok(Ok(())) => (None, None),
                Ok(Err(failure)) => (Some(failure), None),
                Err(e) if e.is_panic() => (Some(format!("Function panicked: {e}")), None),
                Err(e) => (Some(e.to_string()), Some(HostError::Invocation(e.to_string()))),
            };

            let result = FunctionResult {
                invocation_id,
                succeeded: failure.is_none(),
                failure: failure.clone(),
            };
            self.complete(started, failure).await;

            match error {
                Some(e) => Err(e),
                None => Ok(result),
            }
        }
        .instrument(span)
        .await
    }

    async fn complete(&self, started: FunctionStartedMessage, failure: Option<String>) {
        let completed = FunctionCompletedMessage {
            started,
            end_time: Utc::now(),
            failure,
        };
        for logger in &self.loggers {
            logger.function_completed(&completed).await;
        }
        if let Some(results) = &self.results {
            results.add(FunctionInstanceLogEntry::completed(&completed));
        }
    }

    /// Stops the host: cancels running invocations and waits for them to
    /// report, then flushes and stops the aggregators. Idempotent.
    ///
    /// Both aggregators are shut down even if the first fails; the first
    /// error is returned. Must not be awaited from inside a function body.
    pub async fn stop(&self) -> HostResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!(in_flight = self.in_flight.len(), "Stopping job host");
        self.shutdown.cancel();
        self.in_flight.close();
        self.in_flight.wait().await;

        let results = match &self.results {
            Some(results) => results.shutdown().await,
            None => Ok(()),
        };
        let diagnostics = match &self.diagnostics {
            Some(diagnostics) => diagnostics.shutdown().await,
            None => Ok(()),
        };
        match (results, diagnostics) {
            (Err(e), Err(masked)) => {
                warn!(error = %masked, "Diagnostics shutdown failed");
                Err(e.into())
            }
            (Err(e), _) | (_, Err(e)) => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Binds every parameter in declaration order, stopping at the first
/// failure. Returns the invoke strings collected so far either way.
async fn bind_arguments(
    function: &IndexedFunction,
    args: &mut FunctionArguments,
    ctx: &ConversionContext,
) -> (HashMap<String, String>, BindingResult<FunctionArguments>) {
    let mut invoke_strings = HashMap::new();
    let mut bound = FunctionArguments::with_capacity(function.parameters.len());

    for parameter in &function.parameters {
        let Some(value) = args.remove(&parameter.name) else {
            continue;
        };
        match &parameter.source {
            ParameterSource::Plain => {
                bound.insert(parameter.name.clone(), value);
            }
            ParameterSource::Trigger(binding) => match binding.bind(value, ctx).await {
                Ok(value) => {
                    if let Some(text) = value.invoke_string.value {
                        invoke_strings.insert(parameter.name.clone(), text);
                    }
                    bound.insert(parameter.name.clone(), value.value);
                }
                Err(e) => return (invoke_strings, Err(e)),
            },
        }
    }

    (invoke_strings, Ok(bound))
}

impl fmt::Debug for JobHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHost")
            .field("functions", &self.functions.len())
            .field("providers", &self.providers.len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
