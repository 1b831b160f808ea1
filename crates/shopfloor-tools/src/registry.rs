//! Tool descriptors and the per-server registry.
//!
//! A handler is an async function from typed parameters to a serializable
//! result. [`ToolDescriptor::new`] wraps it once, at registration, in the
//! combinator that every invocation goes through:
//!
//! 1. structural validation against the parameter table,
//! 2. entity-reference checks against the store,
//! 3. deserialization into the typed parameter struct,
//! 4. the handler body, with errors and panics caught,
//! 5. conversion into an [`Envelope`].

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shopfloor_core::{Error, Result, ServerDomain};
use shopfloor_store::DataStore;

use crate::envelope::Envelope;
use crate::schema::{self, ParamSpec};

type WrappedHandler = Arc<dyn Fn(Arc<DataStore>, Value) -> BoxFuture<'static, Envelope> + Send + Sync>;

// ============================================================================
// ToolDescriptor
// ============================================================================

/// A registered tool: name, parameter table, description and wrapped handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: &'static str,
    description: &'static str,
    params: Arc<[ParamSpec]>,
    handler: WrappedHandler,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Describe a tool and wrap its handler.
    ///
    /// `A` is the typed parameter struct; it is deserialized from the
    /// validated argument object, so defaults declared in `params` are
    /// already present.
    pub fn new<A, R, F, Fut>(
        name: &'static str,
        description: &'static str,
        params: Vec<ParamSpec>,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(Arc<DataStore>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let params: Arc<[ParamSpec]> = params.into();
        let handler = Arc::new(handler);
        let table = Arc::clone(&params);

        let wrapped: WrappedHandler = Arc::new(move |store: Arc<DataStore>, args: Value| {
            let handler = Arc::clone(&handler);
            let table = Arc::clone(&table);
            async move {
                let outcome = AssertUnwindSafe(run(store, args, table, handler))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(data)) => {
                        log::debug!("Tool {name} succeeded");
                        Envelope::success(data)
                    }
                    Ok(Err(err)) => {
                        log::warn!("Tool {name} failed: {err}");
                        Envelope::from_error(name, &err)
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        log::error!("Tool {name} panicked: {message}");
                        Envelope::from_error(name, &Error::operation(format!("handler panicked: {message}")))
                    }
                }
            }
            .boxed()
        });

        Self {
            name,
            description,
            params,
            handler: wrapped,
        }
    }

    /// Tool name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tool description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Parameter table.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Listing form: name, description and JSON schema of the parameters.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": schema::json_schema(&self.params),
        })
    }

    /// Run the wrapped handler.
    pub async fn call(&self, store: Arc<DataStore>, args: Value) -> Envelope {
        (self.handler)(store, args).await
    }
}

async fn run<A, R, F, Fut>(
    store: Arc<DataStore>,
    args: Value,
    params: Arc<[ParamSpec]>,
    handler: Arc<F>,
) -> Result<Value>
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(Arc<DataStore>, A) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let args = schema::validate(&params, args)?;
    check_references(&store, &params, &args).await?;
    let typed: A = serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
    let result = handler(store, typed).await?;
    Ok(serde_json::to_value(result)?)
}

async fn check_references(store: &DataStore, params: &[ParamSpec], args: &Value) -> Result<()> {
    for spec in params {
        let (Some(collection), Some(id)) = (&spec.references, args.get(spec.name).and_then(Value::as_str))
        else {
            continue;
        };
        if !store.exists(collection, id).await? {
            return Err(Error::validation(format!(
                "{} '{id}' does not exist",
                collection.entity
            )));
        }
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// The immutable tool table of one server.
#[derive(Clone, Debug)]
pub struct ToolRegistry {
    domain: ServerDomain,
    store: Arc<DataStore>,
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Start building a registry for `domain`.
    pub fn builder(domain: ServerDomain, store: Arc<DataStore>) -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            domain,
            store,
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Domain served by this registry.
    pub fn domain(&self) -> ServerDomain {
        self.domain
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    /// Registered tools, in registration order.
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Names of registered tools, in registration order.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(ToolDescriptor::name).collect()
    }

    /// Whether a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Invoke a tool by name. Never fails: every outcome is an envelope.
    pub async fn invoke(&self, name: &str, params: Value) -> Envelope {
        match self.index.get(name) {
            Some(&i) => self.tools[i].call(Arc::clone(&self.store), params).await,
            None => {
                log::warn!("Unknown tool requested: {name}");
                Envelope::from_error(name, &Error::unknown_tool(name))
            }
        }
    }
}

/// Builder for [`ToolRegistry`]; rejects duplicate names.
pub struct ToolRegistryBuilder {
    domain: ServerDomain,
    store: Arc<DataStore>,
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistryBuilder {
    /// Register one tool.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is already registered.
    pub fn register(mut self, tool: ToolDescriptor) -> Result<Self> {
        if self.index.contains_key(tool.name) {
            return Err(Error::config(format!(
                "tool '{}' registered twice for {}",
                tool.name, self.domain
            )));
        }
        self.index.insert(tool.name, self.tools.len());
        self.tools.push(tool);
        Ok(self)
    }

    /// Register several tools.
    pub fn register_all(self, tools: impl IntoIterator<Item = ToolDescriptor>) -> Result<Self> {
        tools.into_iter().try_fold(self, Self::register)
    }

    /// Freeze the table.
    pub fn build(self) -> ToolRegistry {
        log::debug!("Registered {} tools for {}", self.tools.len(), self.domain);
        ToolRegistry {
            domain: self.domain,
            store: self.store,
            tools: self.tools,
            index: self.index,
        }
    }
}
