//! Bridge client: catalog listing and tool execution
//!
//! Every operation opens its own session, runs under the configured
//! timeout, and closes the session on every path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::cache::{Catalog, ToolCatalogCache};
use super::errors::BridgeError;
use super::session::{SessionFactory, ToolSession, TransportFactory};
use super::types::{ToolDescriptor, ToolExecutionResult, ToolInvocation};
use crate::config::{process_environment, BridgeConfig};
use crate::error::Result;

/// What the agent needs from a tool server
#[async_trait]
pub trait ToolBridge: Send + Sync {
    /// Current tool catalog
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, BridgeError>;

    /// Execute one invocation
    async fn call_tool(
        &self,
        invocation: ToolInvocation,
    ) -> std::result::Result<ToolExecutionResult, BridgeError>;
}

/// MCP bridge bound to one server configuration
pub struct BridgeClient {
    config: BridgeConfig,
    factory: Arc<dyn SessionFactory>,
    catalog: ToolCatalogCache,
}

impl BridgeClient {
    /// Client for `config`, resolving `${NAME}` env values against this process.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        Self::with_environment(config, process_environment())
    }

    /// Client for `config`, resolving env values against `context_env`.
    pub fn with_environment(config: BridgeConfig, context_env: HashMap<String, String>) -> Result<Self> {
        config.validate()?;
        let factory = Arc::new(TransportFactory::new(config.clone(), context_env));
        Ok(Self::with_factory(config, factory))
    }

    /// Client using a caller-supplied session factory
    pub fn with_factory(config: BridgeConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let catalog = ToolCatalogCache::new(config.tool_cache_ttl());
        BridgeClient {
            config,
            factory,
            catalog,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Cached catalog, fetching it when stale or absent.
    pub async fn catalog(&self) -> std::result::Result<Catalog, BridgeError> {
        let budget = self.config.list_timeout();
        self.catalog
            .get_or_fetch(self.with_session("tools/list", budget, |session| {
                Box::pin(async move { session.list_tools().await })
            }))
            .await
    }

    /// Forget the cached catalog
    pub async fn invalidate_catalog(&self) {
        self.catalog.invalidate().await;
    }

    /// Open a session, run `op` under `budget`, close the session.
    ///
    /// The budget covers the handshake and the operation together.
    async fn with_session<T, F>(
        &self,
        operation: &str,
        budget: Duration,
        op: F,
    ) -> std::result::Result<T, BridgeError>
    where
        F: for<'s> FnOnce(
            &'s mut Box<dyn ToolSession>,
        ) -> std::pin::Pin<
            Box<dyn Future<Output = std::result::Result<T, BridgeError>> + Send + 's>,
        >,
    {
        let started = Instant::now();
        let timeout_error = || BridgeError::Timeout {
            operation: operation.to_string(),
            timeout_ms: budget.as_millis() as u64,
        };

        let mut session = tokio::time::timeout(budget, self.factory.open())
            .await
            .map_err(|_| timeout_error())??;

        let remaining = budget.saturating_sub(started.elapsed());
        let outcome = tokio::time::timeout(remaining, op(&mut session)).await;
        session.close().await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                debug!(operation, elapsed_ms, ok = result.is_ok(), "MCP operation finished");
                result
            }
            Err(_) => {
                warn!(operation, elapsed_ms, "MCP operation timed out");
                Err(timeout_error())
            }
        }
    }
}

#[async_trait]
impl ToolBridge for BridgeClient {
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, BridgeError> {
        Ok(self.catalog().await?.as_ref().clone())
    }

    async fn call_tool(
        &self,
        invocation: ToolInvocation,
    ) -> std::result::Result<ToolExecutionResult, BridgeError> {
        let catalog = self.catalog().await?;
        if !catalog.iter().any(|tool| tool.name == invocation.tool_name) {
            return Err(BridgeError::ToolNotFound {
                name: invocation.tool_name,
            });
        }

        let call_id = invocation.resolved_call_id();
        let ToolInvocation {
            tool_name,
            arguments,
            session_id,
            ..
        } = invocation;

        info!(tool = %tool_name, call_id = %call_id, "Calling MCP tool");
        let name = tool_name.clone();
        let raw = self
            .with_session("tools/call", self.config.call_timeout(), move |session| {
                Box::pin(async move { session.call_tool(&name, arguments).await })
            })
            .await?;

        let mut result = ToolExecutionResult::from_wire(call_id, tool_name, raw)?;
        result.session_id = session_id;
        if result.is_error() {
            warn!(
                tool = %result.tool_name,
                error = result.error_message.as_deref().unwrap_or_default(),
                "MCP tool reported an error"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts opens and closes; behaviour is scripted per test.
    #[derive(Default)]
    struct FakeFactory {
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
        tools: Vec<ToolDescriptor>,
        list_delay: Option<Duration>,
        /// Delays consumed one per open, ahead of `list_delay`
        scripted_delays: Mutex<Vec<Duration>>,
        call_result: Option<Value>,
        call_delay: Option<Duration>,
    }

    struct FakeSession {
        tools: Vec<ToolDescriptor>,
        list_delay: Option<Duration>,
        call_result: Option<Value>,
        call_delay: Option<Duration>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolSession for FakeSession {
        async fn list_tools(&mut self) -> std::result::Result<Vec<ToolDescriptor>, BridgeError> {
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.tools.clone())
        }

        async fn call_tool(
            &mut self,
            name: &str,
            arguments: Map<String, Value>,
        ) -> std::result::Result<Value, BridgeError> {
            if let Some(delay) = self.call_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.call_result.clone().unwrap_or_else(|| {
                json!({"content": [{"type": "text", "text": format!("{name} {}", Value::Object(arguments))}]})
            }))
        }

        async fn close(self: Box<Self>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open(&self) -> std::result::Result<Box<dyn ToolSession>, BridgeError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let scripted = self.scripted_delays.lock().unwrap().pop();
            Ok(Box::new(FakeSession {
                tools: self.tools.clone(),
                list_delay: scripted.or(self.list_delay),
                call_result: self.call_result.clone(),
                call_delay: self.call_delay,
                closes: self.closes.clone(),
            }))
        }
    }

    fn math_tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("sum", "Add two numbers"),
            ToolDescriptor::new("random", "Random number"),
        ]
    }

    fn config(cache_seconds: f64) -> BridgeConfig {
        let mut config = BridgeConfig::stdio("unused", vec![]);
        config.tool_cache_seconds = cache_seconds;
        config.list_timeout_seconds = 0.2;
        config.call_timeout_seconds = 0.2;
        config
    }

    fn client(factory: Arc<FakeFactory>, cache_seconds: f64) -> BridgeClient {
        BridgeClient::with_factory(config(cache_seconds), factory)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_list_within_window_opens_one_session() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 30.0);

        let first = bridge.list_tools().await.unwrap();
        let second = bridge.list_tools().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
        assert_eq!(factory.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_after_window_opens_again() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 0.1);

        bridge.list_tools().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        bridge.list_tools().await.unwrap();

        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_cache_seconds_always_refetches() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 0.0);

        bridge.list_tools().await.unwrap();
        bridge.list_tools().await.unwrap();

        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidated_catalog_is_refetched() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 30.0);

        bridge.list_tools().await.unwrap();
        bridge.invalidate_catalog().await;
        bridge.list_tools().await.unwrap();

        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refused_server_reports_transport() {
        let bridge =
            BridgeClient::with_environment(BridgeConfig::http("http://127.0.0.1:1/mcp"), HashMap::new()).unwrap();

        let err = bridge.list_tools().await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            list_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let bridge = Arc::new(client(factory.clone(), 30.0));

        let (a, b) = tokio::join!(bridge.list_tools(), bridge.list_tools());
        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_timeout_is_not_cached() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            scripted_delays: Mutex::new(vec![Duration::from_secs(5)]),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 30.0);

        let err = bridge.list_tools().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.details()["operation"], "tools/list");
        // the session was still released
        assert_eq!(factory.closes.load(Ordering::SeqCst), 1);

        let tools = bridge.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);

        bridge.list_tools().await.unwrap();
        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_opens_no_call_session() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 30.0);
        bridge.list_tools().await.unwrap();
        let opens_before = factory.opens.load(Ordering::SeqCst);

        let err = bridge
            .call_tool(ToolInvocation::new("ghost", Map::new()))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.details()["status"], 404);
        assert_eq!(factory.opens.load(Ordering::SeqCst), opens_before);
    }

    #[tokio::test]
    async fn test_call_tool_maps_result() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            call_result: Some(json!({
                "content": [{"type": "text", "text": "3"}],
                "structuredContent": {"result": 3}
            })),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 30.0);

        let invocation = ToolInvocation::new("sum", args(json!({"a": 1, "b": 2})))
            .with_call_id("call-1")
            .with_session_id(Some("conv-1".into()));
        let result = bridge.call_tool(invocation).await.unwrap();

        assert_eq!(result.call_id, "call-1");
        assert_eq!(result.session_id.as_deref(), Some("conv-1"));
        assert_eq!(result.structured_content, Some(json!({"result": 3})));
        assert!(result.raw_result.is_some());
        // one session for the catalog, one for the call
        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
        assert_eq!(factory.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tool_level_error_is_data() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            call_result: Some(json!({
                "content": [{"type": "text", "text": "a must be a number"}],
                "isError": true
            })),
            ..Default::default()
        });
        let bridge = client(factory, 30.0);

        let result = bridge
            .call_tool(ToolInvocation::new("sum", Map::new()))
            .await
            .unwrap();
        assert!(result.is_error());
        assert_eq!(result.error_message.as_deref(), Some("a must be a number"));
        assert!(result.call_id.starts_with("call_"));
    }

    #[tokio::test]
    async fn test_call_timeout_is_bridge_error() {
        let factory = Arc::new(FakeFactory {
            tools: math_tools(),
            call_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let bridge = client(factory.clone(), 30.0);

        let err = bridge
            .call_tool(ToolInvocation::new("sum", Map::new()))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.details()["operation"], "tools/call");
        assert_eq!(factory.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_environment_rejects_invalid_config() {
        let mut config = BridgeConfig::stdio("python", vec![]);
        config.call_timeout_seconds = 0.0;
        assert!(BridgeClient::with_environment(config, HashMap::new()).is_err());
    }
}
