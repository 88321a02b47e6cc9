//! Liveness probes.

use std::{sync::Arc, time::Duration};

use tracing::trace;

use crate::{
    common::{Message, MessageKind, Node},
    statistics::Observer,
    Result,
};

use super::{dispatcher::Dispatcher, worker_pool::WorkerPool};

#[derive(Debug, Clone)]
/// Sends pings, either blocking or on a dedicated worker pool.
pub struct Pinger {
    local: Node,
    dispatcher: Dispatcher,
    pool: Arc<WorkerPool>,
    timeout: Duration,
    observer: Arc<dyn Observer>,
}

impl Pinger {
    pub fn new(
        local: Node,
        dispatcher: Dispatcher,
        pool: Arc<WorkerPool>,
        timeout: Duration,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            local,
            dispatcher,
            pool,
            timeout,
            observer,
        }
    }

    /// Ping `node` and block until it answers, returning its pong.
    pub fn ping(&self, node: &Node) -> Result<Message> {
        self.observer.ping_sent();

        let ping = Message::new(
            self.dispatcher.next_message_id(),
            self.local.clone(),
            MessageKind::Ping,
        );

        self.dispatcher
            .request()
            .timeout(self.timeout)
            .future_send(node, ping)?
            .get()
    }

    /// Ping `node` on the worker pool and report whether it answered.
    ///
    /// Fails without calling `on_result` if the pool is saturated.
    pub fn probe<F>(&self, node: Node, on_result: F) -> Result<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let pinger = self.clone();

        self.pool.execute(move || {
            let answered = pinger.ping(&node).is_ok();
            trace!(?node, answered, "Probe finished");

            on_result(answered);
        })
    }
}
