//! Router orchestrating a set of channel adapters.
//!
//! The router owns adapter membership, the single message handler and the
//! single error handler, starts and stops every adapter concurrently, and
//! exposes send/broadcast across channels.
//!
//! State machine: `Unstarted → Starting → Started` when every adapter
//! starts, `Starting → Unstarted` when any adapter fails, and
//! `Started → Stopping → Unstarted` unconditionally.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::adapter::ChannelAdapter;
use crate::error::{ChannelError, Result};
use crate::handler::{ErrorHandler, MessageHandler};
use crate::message::{BroadcastResult, MessageContext, NormalizedMessage, RouterStatus, SendResult};
use crate::reply::ReplyService;

/// Lifecycle state of a [`Router`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// Not started, or stopped, or a start attempt failed.
    Unstarted,
    /// Adapters are being started.
    Starting,
    /// Every adapter started.
    Started,
    /// Adapters are being stopped.
    Stopping,
}

impl std::fmt::Display for RouterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        })
    }
}

/// Router construction options.
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Project reported in status. Defaults to the reply service's project.
    pub project_id: Option<String>,
    /// Bot id injected into adapters that have none.
    pub default_bot_id: Option<String>,
}

struct RouterInner {
    reply_service: Arc<dyn ReplyService>,
    project_id: Option<String>,
    default_bot_id: Option<String>,
    adapters: RwLock<Vec<Arc<dyn ChannelAdapter>>>,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    error_handler: RwLock<Option<Arc<dyn ErrorHandler>>>,
    state: Mutex<RouterState>,
}

/// Routes inbound messages from many channels through one handler.
///
/// Cheap to clone; clones share the same adapters and handlers.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("state", &self.state())
            .field("channels", &self.channel_names())
            .field("default_bot_id", &self.inner.default_bot_id)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router with no adapters.
    pub fn new(reply_service: Arc<dyn ReplyService>, options: RouterOptions) -> Self {
        let project_id = options
            .project_id
            .or_else(|| reply_service.project_id().map(str::to_owned));
        Self {
            inner: Arc::new(RouterInner {
                reply_service,
                project_id,
                default_bot_id: options.default_bot_id.filter(|b| !b.trim().is_empty()),
                adapters: RwLock::new(Vec::new()),
                handler: RwLock::new(None),
                error_handler: RwLock::new(None),
                state: Mutex::new(RouterState::Unstarted),
            }),
        }
    }

    /// Create a router and register `adapters` in order.
    ///
    /// # Errors
    ///
    /// Fails on the first adapter [`Router::register`] rejects.
    pub fn with_adapters(
        reply_service: Arc<dyn ReplyService>,
        options: RouterOptions,
        adapters: Vec<Arc<dyn ChannelAdapter>>,
    ) -> Result<Self> {
        let router = Self::new(reply_service, options);
        for adapter in adapters {
            router.register(adapter)?;
        }
        Ok(router)
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// Install the message handler on every current and future adapter.
    ///
    /// Handler failures are offered to the error handler installed at the
    /// time of the failure.
    pub fn on_message<H>(&self, handler: H) -> &Self
    where
        H: MessageHandler + 'static,
    {
        let handler: Arc<dyn MessageHandler> = Arc::new(handler);
        if let Ok(mut slot) = self.inner.handler.write() {
            *slot = Some(Arc::clone(&handler));
        }
        for adapter in self.snapshot() {
            adapter
                .core()
                .set_message_handler(Some(self.routed(Arc::clone(&handler))));
        }
        self
    }

    /// Install or replace the error handler.
    ///
    /// Takes effect on the next inbound message; no re-wrapping needed.
    pub fn on_error<H>(&self, handler: H) -> &Self
    where
        H: ErrorHandler + 'static,
    {
        if let Ok(mut slot) = self.inner.error_handler.write() {
            *slot = Some(Arc::new(handler));
        }
        self
    }

    fn error_handler(&self) -> Option<Arc<dyn ErrorHandler>> {
        self.inner
            .error_handler
            .read()
            .ok()
            .and_then(|h| h.clone())
    }

    fn message_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.inner.handler.read().ok().and_then(|h| h.clone())
    }

    fn routed(&self, handler: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> {
        Arc::new(RoutedHandler {
            handler,
            router: Arc::downgrade(&self.inner),
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> RouterState {
        *self.lock_state()
    }

    /// Whether every adapter started.
    pub fn is_started(&self) -> bool {
        self.state() == RouterState::Started
    }

    /// Start every adapter concurrently.
    ///
    /// All adapters get a chance to start even if one fails. Warns and does
    /// nothing when already started.
    ///
    /// # Errors
    ///
    /// Returns the first failing adapter's error (in registration order); the
    /// router stays unstarted. Returns [`ChannelError::Transitioning`] while
    /// another start or stop is in flight.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            match *state {
                RouterState::Unstarted => *state = RouterState::Starting,
                RouterState::Started => {
                    warn!("router already started");
                    return Ok(());
                }
                busy @ (RouterState::Starting | RouterState::Stopping) => {
                    warn!(state = %busy, "start requested while router is {busy}");
                    return Err(ChannelError::Transitioning {
                        state: busy.to_string(),
                    });
                }
            }
        }

        let adapters = self.snapshot();
        info!(count = adapters.len(), "starting adapters");

        let results = join_all(adapters.iter().map(|adapter| async move {
            let result = adapter.start().await;
            match &result {
                Ok(()) => info!(channel = %adapter.channel_name(), "adapter started"),
                Err(e) => {
                    error!(channel = %adapter.channel_name(), error = %e, "adapter failed to start");
                }
            }
            result
        }))
        .await;

        let first_failure = results.into_iter().find_map(Result::err);
        let mut state = self.lock_state();
        match first_failure {
            Some(e) => {
                if *state == RouterState::Starting {
                    *state = RouterState::Unstarted;
                }
                error!(error = %e, "failed to start all adapters");
                Err(e)
            }
            None => {
                if *state == RouterState::Starting {
                    *state = RouterState::Started;
                }
                info!("all adapters started");
                Ok(())
            }
        }
    }

    /// Stop every adapter concurrently.
    ///
    /// Individual failures are logged. Always ends unstarted.
    pub async fn stop(&self) {
        *self.lock_state() = RouterState::Stopping;

        let adapters = self.snapshot();
        info!(count = adapters.len(), "stopping adapters");

        join_all(adapters.iter().map(|adapter| async move {
            match adapter.stop().await {
                Ok(()) => info!(channel = %adapter.channel_name(), "adapter stopped"),
                Err(e) => {
                    error!(channel = %adapter.channel_name(), error = %e, "error stopping adapter");
                }
            }
        }))
        .await;

        *self.lock_state() = RouterState::Unstarted;
        info!("all adapters stopped");
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Register an adapter without starting it.
    ///
    /// Injects the router's reply service and default bot id where the
    /// adapter has none, and installs the current message handler.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DuplicateChannel`] for a used channel name, or
    /// [`ChannelError::Configuration`] when no bot id can be resolved.
    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) -> Result<()> {
        let mut adapters = self
            .inner
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let name = adapter.channel_name().to_owned();
        if adapters.iter().any(|a| a.channel_name() == name) {
            return Err(ChannelError::DuplicateChannel { channel: name });
        }

        let core = adapter.core();
        core.inject_defaults(
            &self.inner.reply_service,
            self.inner.default_bot_id.as_deref(),
        );
        if core.bot_id().is_none() {
            return Err(ChannelError::configuration(format!(
                "{name}: bot id is required (set one on the adapter or a router default)"
            )));
        }

        if let Some(handler) = self.message_handler() {
            core.set_message_handler(Some(self.routed(handler)));
        }

        adapters.push(adapter);
        Ok(())
    }

    /// Register an adapter, starting it immediately if the router is started.
    ///
    /// When that start fails the adapter stays registered but unstarted.
    ///
    /// # Errors
    ///
    /// Registration errors (see [`Router::register`]) or the adapter's start
    /// error.
    pub async fn add_adapter(&self, adapter: Arc<dyn ChannelAdapter>) -> Result<()> {
        self.register(Arc::clone(&adapter))?;
        if self.is_started() {
            info!(channel = %adapter.channel_name(), "router running, starting new adapter");
            adapter.start().await?;
        }
        Ok(())
    }

    /// Stop and unregister an adapter. Stop failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotFound`] if no adapter has that name.
    pub async fn remove_adapter(&self, channel_name: &str) -> Result<()> {
        let adapter = self
            .get_adapter(channel_name)
            .ok_or_else(|| ChannelError::not_found(channel_name))?;

        if let Err(e) = adapter.stop().await {
            error!(channel = %channel_name, error = %e, "error stopping removed adapter");
        }

        self.inner
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a.channel_name() != channel_name);
        info!(channel = %channel_name, "adapter removed");
        Ok(())
    }

    /// Adapter registered under `channel_name`.
    pub fn get_adapter(&self, channel_name: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.inner
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.channel_name() == channel_name)
            .cloned()
    }

    /// Registered channel names in registration order.
    pub fn channel_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|a| a.channel_name().to_owned())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send a message through one channel outside the reply flow.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotFound`] for an unknown channel, otherwise
    /// the adapter's send error.
    pub async fn send_message(
        &self,
        channel_name: &str,
        recipient: &str,
        message: &str,
    ) -> Result<SendResult> {
        let adapter = self
            .get_adapter(channel_name)
            .ok_or_else(|| ChannelError::not_found(channel_name))?;
        adapter.send_message(recipient, message).await
    }

    /// Broadcast through every adapter, or only the named ones.
    ///
    /// Never fails as a whole: returns one result per targeted adapter.
    /// Names that match no adapter are ignored.
    pub async fn broadcast(&self, message: &str, channels: &[&str]) -> Vec<BroadcastResult> {
        let targets: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|a| channels.is_empty() || channels.contains(&a.channel_name()))
            .collect();

        join_all(targets.iter().map(|adapter| async move {
            let channel = adapter.channel_name();
            match adapter.broadcast(message).await {
                Ok(()) => BroadcastResult::delivered(channel),
                Err(ChannelError::BroadcastUnsupported { .. }) => {
                    BroadcastResult::unsupported(channel)
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "broadcast failed");
                    BroadcastResult::failed(channel, e)
                }
            }
        }))
        .await
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Aggregate status snapshot.
    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            is_started: self.is_started(),
            adapters: self.snapshot().iter().map(|a| a.status()).collect(),
            project_id: self.inner.project_id.clone(),
            default_bot_id: self.inner.default_bot_id.clone(),
        }
    }

    /// Reply service shared with adapters.
    pub fn reply_service(&self) -> Arc<dyn ReplyService> {
        Arc::clone(&self.inner.reply_service)
    }

    fn snapshot(&self) -> Vec<Arc<dyn ChannelAdapter>> {
        self.inner
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, RouterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Handler wrapping
// ---------------------------------------------------------------------------

/// Caller handler as installed on adapters: extends the context with router
/// references and offers failures to the router's current error handler.
struct RoutedHandler {
    handler: Arc<dyn MessageHandler>,
    router: Weak<RouterInner>,
}

#[async_trait]
impl MessageHandler for RoutedHandler {
    async fn handle(
        &self,
        message: NormalizedMessage,
        mut context: MessageContext,
    ) -> anyhow::Result<Option<String>> {
        let router = self.router.upgrade().map(|inner| Router { inner });
        if let Some(router) = &router {
            context.reply_service = Some(router.reply_service());
        }
        context.router = router.clone();

        let retained = (message.clone(), context.clone());
        let err = match self.handler.handle(message, context).await {
            Ok(reply) => return Ok(reply),
            Err(err) => err,
        };

        let Some(error_handler) = router.as_ref().and_then(Router::error_handler) else {
            return Err(err);
        };

        let shared = Arc::new(err);
        let (message, context) = retained;
        match error_handler
            .handle(Arc::clone(&shared), message, context)
            .await
        {
            Ok(reply) => Ok(Some(reply)),
            Err(handler_err) => {
                warn!(error = %handler_err, "error handler failed, propagating original error");
                Err(Arc::try_unwrap(shared)
                    .unwrap_or_else(|still_shared| anyhow::anyhow!("{still_shared:#}")))
            }
        }
    }
}
