//! Connected tasks: actions replayed after each successful connect.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use wsbridge_core::{LinkRef, Subscription};

use crate::connection::WsClient;
use crate::subscriptions::{SubscriptionExecutor, SubscriptionResult};

/// Everything a task needs while it runs.
#[derive(Clone)]
pub struct TaskContext {
    client: WsClient,
    link: LinkRef,
    session: CancellationToken,
    registration: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        client: WsClient,
        link: LinkRef,
        session: CancellationToken,
        registration: CancellationToken,
    ) -> Self {
        Self {
            client,
            link,
            session,
            registration,
        }
    }

    /// Client whose connection triggered the run.
    pub fn client(&self) -> &WsClient {
        &self.client
    }

    /// Link the task is registered under.
    pub fn link(&self) -> &LinkRef {
        &self.link
    }

    /// The connection left CONNECTED or the task was unregistered.
    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancelled() || self.registration.is_cancelled()
    }
}

/// An action bound to a [`LinkRef`], run once per successful connection.
///
/// Closures `Fn(TaskContext) -> impl Future<Output = ()>` implement this
/// directly and report no subscription results.
#[async_trait]
pub trait ConnectedTask: Send + Sync {
    /// Run the task. Results are discarded if the context was cancelled
    /// while it ran.
    async fn run(&self, ctx: TaskContext) -> Vec<SubscriptionResult>;
}

#[async_trait]
impl<F, Fut> ConnectedTask for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Vec<SubscriptionResult> {
        self(ctx).await;
        Vec::new()
    }
}

/// Replays a declared subscription list in order.
pub struct SubscriptionTask {
    executor: SubscriptionExecutor,
    subscriptions: Arc<[Subscription]>,
}

impl SubscriptionTask {
    /// Task replaying `subscriptions` through `executor`.
    pub fn new(executor: SubscriptionExecutor, subscriptions: Vec<Subscription>) -> Self {
        Self {
            executor,
            subscriptions: subscriptions.into(),
        }
    }

    /// Declared subscriptions.
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}

#[async_trait]
impl ConnectedTask for SubscriptionTask {
    async fn run(&self, ctx: TaskContext) -> Vec<SubscriptionResult> {
        self.executor.execute_all(&ctx, &self.subscriptions).await
    }
}
