//! Correlates incoming messages with pending requests and durable registrations.

use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use flume::{Receiver, SendTimeoutError, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::{
    common::{lock, Message, Node},
    Error, Result,
};

use super::{
    filter::MessageFilter,
    response::ResponseFuture,
    timer::{Timer, TimerHandle},
};

/// How often a blocked [Request::send] rechecks for shutdown while waiting for a slot.
const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sends messages to other nodes.
///
/// Decoding and delivering incoming messages is the transport's job too,
/// it hands each of them to [Dispatcher::dispatch].
pub trait Transport: Send + Sync {
    fn send(&self, to: &Node, message: Message) -> io::Result<()>;
}

/// Invoked with the matching message, or with the reason a registration ended.
pub type Callback = Arc<dyn Fn(Result<Message>) + Send + Sync>;

struct Expectation {
    id: u64,
    filters: Vec<MessageFilter>,
    callback: Callback,
    consumable: bool,
    done: AtomicBool,
    holds_slot: AtomicBool,
    timer: Mutex<Option<TimerHandle>>,
}

impl Expectation {
    fn new(id: u64, filters: Vec<MessageFilter>, callback: Callback, consumable: bool) -> Self {
        Self {
            id,
            filters,
            callback,
            consumable,
            done: AtomicBool::new(false),
            holds_slot: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    fn matches(&self, message: &Message) -> bool {
        self.filters.iter().all(|filter| filter.accepts(message))
    }

    /// Flip the done flag, only the first caller wins.
    fn finish(&self) -> bool {
        self.done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    timer: Timer,
    default_timeout: Duration,
    consumable: Mutex<HashMap<u64, Arc<Expectation>>>,
    durable: Mutex<HashMap<u64, Arc<Expectation>>>,
    /// Outstanding request pool, a message in the channel is a held slot.
    slots: Sender<()>,
    freed_slots: Receiver<()>,
    next_registration: AtomicU64,
    next_message_id: AtomicU64,
    shutdown: AtomicBool,
}

impl Inner {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn registrations(&self, consumable: bool) -> &Mutex<HashMap<u64, Arc<Expectation>>> {
        if consumable {
            &self.consumable
        } else {
            &self.durable
        }
    }

    fn insert(&self, expectation: &Arc<Expectation>) {
        lock(self.registrations(expectation.consumable))
            .insert(expectation.id, expectation.clone());
    }

    fn matching(&self, consumable: bool, message: &Message) -> Vec<Arc<Expectation>> {
        lock(self.registrations(consumable))
            .values()
            .filter(|expectation| expectation.matches(message))
            .cloned()
            .collect()
    }

    fn schedule_timeout(self: &Arc<Self>, expectation: &Arc<Expectation>, timeout: Duration) {
        let weak = Arc::downgrade(self);
        let expired = expectation.clone();

        let handle = self.timer.schedule(timeout, move || {
            if let Some(inner) = weak.upgrade() {
                inner.cancel(&expired, Error::Timeout);
            }
        });

        *lock(&expectation.timer) = Some(handle.clone());

        if expectation.is_done() {
            handle.cancel();
        }
    }

    /// Take a slot from the outstanding request pool.
    ///
    /// Returns `Ok(false)` only when not blocking and the pool is full.
    /// A blocking wait ends early once the request is done.
    fn acquire(&self, expectation: &Expectation, blocking: bool) -> Result<bool> {
        if !blocking {
            return match self.slots.try_send(()) {
                Ok(()) => {
                    expectation.holds_slot.store(true, Ordering::Release);
                    Ok(true)
                }
                Err(TrySendError::Full(_)) => Ok(false),
                Err(TrySendError::Disconnected(_)) => Err(Error::Shutdown),
            };
        }

        loop {
            if self.is_shutdown() {
                return Err(Error::Shutdown);
            }
            if expectation.is_done() {
                return Err(Error::Cancelled);
            }

            match self.slots.send_timeout((), SLOT_POLL_INTERVAL) {
                Ok(()) => {
                    expectation.holds_slot.store(true, Ordering::Release);
                    return Ok(true);
                }
                Err(SendTimeoutError::Timeout(_)) => continue,
                Err(SendTimeoutError::Disconnected(_)) => return Err(Error::Shutdown),
            }
        }
    }

    fn release(&self, expectation: &Expectation) {
        if expectation.holds_slot.swap(false, Ordering::AcqRel) {
            let _ = self.freed_slots.try_recv();
        }
    }

    fn cleanup(&self, expectation: &Expectation) {
        if let Some(timer) = lock(&expectation.timer).take() {
            timer.cancel();
        }

        lock(self.registrations(expectation.consumable)).remove(&expectation.id);

        self.release(expectation);
    }

    fn cancel(&self, expectation: &Arc<Expectation>, reason: Error) {
        if !expectation.finish() {
            return;
        }

        self.cleanup(expectation);

        trace!(registration = expectation.id, %reason, "Registration ended");

        invoke(&expectation.callback, Err(reason));
    }
}

fn invoke(callback: &Callback, result: Result<Message>) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
        warn!("Registration callback panicked");
    }
}

fn noop() -> Callback {
    Arc::new(|_| {})
}

#[derive(Clone)]
/// Request/response correlation over a [Transport].
///
/// Cloning is cheap, all clones share the same registrations and outstanding request pool.
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .field("registrations", &self.registrations())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher allowing `concurrency` outstanding requests at a time.
    pub fn new(
        transport: Arc<dyn Transport>,
        concurrency: usize,
        default_timeout: Duration,
    ) -> Result<Self> {
        let (slots, freed_slots) = flume::bounded(concurrency.max(1));

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                timer: Timer::new("kadnet-timer")?,
                default_timeout,
                consumable: Mutex::new(HashMap::new()),
                durable: Mutex::new(HashMap::new()),
                slots,
                freed_slots,
                next_registration: AtomicU64::new(0),
                next_message_id: AtomicU64::new(rand::random()),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    // === Getters ===

    /// Number of live one-shot registrations, including requests waiting for a slot.
    pub fn pending(&self) -> usize {
        lock(&self.inner.consumable).len()
    }

    /// Number of live durable registrations.
    pub fn registrations(&self) -> usize {
        lock(&self.inner.durable).len()
    }

    /// Number of held slots in the outstanding request pool.
    pub fn outstanding(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    // === Public Methods ===

    /// Start building a correlated request or a registration.
    pub fn request(&self) -> Request<'_> {
        Request {
            dispatcher: self,
            filters: Vec::new(),
            timeout: self.inner.default_timeout,
            consumable: true,
            callback: None,
        }
    }

    /// Fresh correlation id for an outgoing request.
    pub fn next_message_id(&self) -> u64 {
        self.inner.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a message without expecting a response.
    pub fn send_message(&self, to: &Node, message: Message) -> Result<()> {
        if self.inner.is_shutdown() {
            return Err(Error::Shutdown);
        }

        self.inner.transport.send(to, message)?;

        Ok(())
    }

    /// Deliver an incoming message to every registration whose filters all accept it.
    ///
    /// Durable registrations see the message before one-shot registrations consume it.
    pub fn dispatch(&self, message: &Message) {
        if self.inner.is_shutdown() {
            return;
        }

        let durable = self.inner.matching(false, message);
        let consumable = self.inner.matching(true, message);

        if durable.is_empty() && consumable.is_empty() {
            trace!(
                id = message.id,
                kind = ?message.message_type(),
                "No registration for incoming message"
            );
            return;
        }

        for expectation in durable {
            if !expectation.is_done() {
                invoke(&expectation.callback, Ok(message.clone()));
            }
        }

        for expectation in consumable {
            if expectation.finish() {
                self.inner.cleanup(&expectation);
                invoke(&expectation.callback, Ok(message.clone()));
            }
        }
    }

    /// End every registration with [Error::Shutdown], and refuse new requests.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut expectations: Vec<_> = lock(&self.inner.consumable)
            .drain()
            .map(|(_, e)| e)
            .collect();
        expectations.extend(lock(&self.inner.durable).drain().map(|(_, e)| e));

        debug!(
            registrations = expectations.len(),
            "Dispatcher shutdown, dropping registrations"
        );

        for expectation in expectations {
            self.inner.cancel(&expectation, Error::Shutdown);
        }
    }
}

#[must_use]
/// Builder for a correlated request or a registration, see [Dispatcher::request].
pub struct Request<'a> {
    dispatcher: &'a Dispatcher,
    filters: Vec<MessageFilter>,
    timeout: Duration,
    consumable: bool,
    callback: Option<Callback>,
}

impl Request<'_> {
    /// Add a filter, all filters must accept a message for it to match.
    pub fn filter(mut self, filter: MessageFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Time to wait for a match before failing with [Error::Timeout].
    ///
    /// Defaults to the dispatcher's request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One-shot (`true`, the default) or durable (`false`) registration.
    ///
    /// Only affects [Self::register], sent requests are always one-shot.
    pub fn consumable(mut self, consumable: bool) -> Self {
        self.consumable = consumable;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Result<Message>) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Register without sending anything.
    ///
    /// One-shot registrations fail with [Error::Timeout] if nothing matches in time,
    /// durable registrations live until cancelled.
    pub fn register(self) -> Registration {
        let inner = self.dispatcher.inner.clone();

        let expectation = Arc::new(Expectation::new(
            inner.next_registration.fetch_add(1, Ordering::Relaxed),
            self.filters,
            self.callback.unwrap_or_else(noop),
            self.consumable,
        ));

        inner.insert(&expectation);

        if expectation.consumable {
            inner.schedule_timeout(&expectation, self.timeout);
        }

        Registration::new(&inner, expectation)
    }

    /// Send `message` and wait for its response.
    ///
    /// Matches on the message id and its response type, on top of any added filters.
    /// Blocks until a slot in the outstanding request pool is free.
    ///
    /// A transport failure is returned here and also delivered to the callback.
    pub fn send(self, to: &Node, message: Message) -> Result<Registration> {
        self.submit(to, message, true)?
            .ok_or(Error::CapacityExceeded)
    }

    /// Like [Self::send] but returns `Ok(false)` instead of blocking
    /// if the outstanding request pool is full.
    pub fn try_send(self, to: &Node, message: Message) -> Result<bool> {
        Ok(self.submit(to, message, false)?.is_some())
    }

    /// [Self::send] exposing the single result as a [ResponseFuture].
    ///
    /// Replaces any callback set on this builder.
    pub fn future_send(mut self, to: &Node, message: Message) -> Result<ResponseFuture> {
        let (callback, receiver) = future_callback();
        self.callback = Some(callback);

        let registration = self.send(to, message)?;

        Ok(ResponseFuture::new(receiver, registration))
    }

    /// [Self::register] exposing the first match as a [ResponseFuture].
    pub fn future_register(mut self) -> ResponseFuture {
        let (callback, receiver) = future_callback();
        self.callback = Some(callback);

        let registration = self.register();

        ResponseFuture::new(receiver, registration)
    }

    fn submit(self, to: &Node, message: Message, blocking: bool) -> Result<Option<Registration>> {
        let inner = self.dispatcher.inner.clone();

        if inner.is_shutdown() {
            return Err(Error::Shutdown);
        }

        let mut filters = self.filters;
        filters.push(MessageFilter::Id(message.id));
        if let Some(response_type) = message.message_type().response_type() {
            filters.push(MessageFilter::Type(response_type));
        }

        let expectation = Arc::new(Expectation::new(
            inner.next_registration.fetch_add(1, Ordering::Relaxed),
            filters,
            self.callback.unwrap_or_else(noop),
            true,
        ));

        // A waiting request is registered so that shutdown reaches it.
        if blocking {
            inner.insert(&expectation);
        }

        match inner.acquire(&expectation, blocking) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(error) => {
                let reason = match error {
                    Error::Shutdown => Error::Shutdown,
                    _ => Error::Cancelled,
                };
                inner.cancel(&expectation, reason);

                return Err(error);
            }
        }

        if !blocking {
            inner.insert(&expectation);
        }
        inner.schedule_timeout(&expectation, self.timeout);

        trace!(
            to = ?to.address(),
            id = message.id,
            kind = ?message.message_type(),
            "Sending request"
        );

        if let Err(error) = inner.transport.send(to, message) {
            debug!(to = ?to.address(), ?error, "Failed to send request");

            let reason = io::Error::new(error.kind(), error.to_string());
            inner.cancel(&expectation, Error::Transport(reason));

            return Err(Error::Transport(error));
        }

        Ok(Some(Registration::new(&inner, expectation)))
    }
}

fn future_callback() -> (Callback, Receiver<Result<Message>>) {
    let (sender, receiver) = flume::bounded(1);

    let callback: Callback = Arc::new(move |result| {
        let _ = sender.try_send(result);
    });

    (callback, receiver)
}

#[derive(Clone)]
/// Handle to a live request or registration.
pub struct Registration {
    inner: Weak<Inner>,
    expectation: Arc<Expectation>,
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.expectation.id)
            .field("consumable", &self.expectation.consumable)
            .field("done", &self.is_done())
            .finish()
    }
}

impl Registration {
    fn new(inner: &Arc<Inner>, expectation: Arc<Expectation>) -> Self {
        Self {
            inner: Arc::downgrade(inner),
            expectation,
        }
    }

    /// Remove the registration, its callback gets [Error::Cancelled] unless it already completed.
    ///
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        match self.inner.upgrade() {
            Some(inner) => inner.cancel(&self.expectation, Error::Cancelled),
            None => {
                self.expectation.finish();
            }
        }
    }

    /// Returns `true` once completed, failed or cancelled.
    pub fn is_done(&self) -> bool {
        self.expectation.is_done()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        sync::atomic::AtomicUsize,
        thread,
        time::Instant,
    };

    use crate::common::{KeyFactory, MessageKind, MessageType};

    use super::*;

    #[derive(Default)]
    /// Records every sent message, optionally failing instead.
    pub(crate) struct Recorder {
        pub sent: Mutex<Vec<(Node, Message)>>,
        pub fail: AtomicBool,
    }

    impl Transport for Recorder {
        fn send(&self, to: &Node, message: Message) -> io::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            lock(&self.sent).push((to.clone(), message));
            Ok(())
        }
    }

    pub(crate) fn node(port: u16) -> Node {
        Node::new(KeyFactory::new(4).random(), ([127, 0, 0, 1], port).into())
    }

    fn setup(concurrency: usize) -> (Dispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::new(recorder.clone(), concurrency, Duration::from_secs(5)).unwrap();

        (dispatcher, recorder)
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn counting() -> (Arc<AtomicUsize>, Arc<AtomicUsize>, impl Fn(Result<Message>) + Send + Sync) {
        let ok = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let (o, f) = (ok.clone(), failed.clone());
        let callback = move |result: Result<Message>| match result {
            Ok(_) => {
                o.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                f.fetch_add(1, Ordering::SeqCst);
            }
        };

        (ok, failed, callback)
    }

    #[test]
    fn response_completes_request_once() {
        let (dispatcher, recorder) = setup(3);
        let (a, b) = (node(1), node(2));
        let (ok, failed, callback) = counting();

        let ping = Message::new(dispatcher.next_message_id(), a.clone(), MessageKind::Ping);
        let registration = dispatcher
            .request()
            .callback(callback)
            .send(&b, ping.clone())
            .unwrap();

        assert_eq!(lock(&recorder.sent).len(), 1);
        assert_eq!(dispatcher.outstanding(), 1);

        // Wrong type, same id.
        dispatcher.dispatch(&ping.reply(b.clone(), MessageKind::Ping));
        assert_eq!(ok.load(Ordering::SeqCst), 0);

        let pong = ping.reply(b.clone(), MessageKind::Pong);
        dispatcher.dispatch(&pong);
        dispatcher.dispatch(&pong);

        assert!(registration.is_done());
        assert_eq!(ok.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[test]
    fn timeout_fails_request() {
        let (dispatcher, _) = setup(3);
        let (ok, failed, callback) = counting();

        let (tx, rx) = flume::bounded(1);
        dispatcher
            .request()
            .timeout(Duration::from_millis(20))
            .callback(move |result| {
                callback(result.map_err(|e| {
                    let _ = tx.send(matches!(e, Error::Timeout));
                    e
                }))
            })
            .send(&node(2), Message::new(1, node(1), MessageKind::Ping))
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
        assert_eq!(ok.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[test]
    fn completion_races_timeout_exactly_once() {
        let (dispatcher, _) = setup(64);
        let src = node(1);
        let mut counters = Vec::new();

        for i in 0..100_u64 {
            let (ok, failed, callback) = counting();
            let message = Message::new(i, src.clone(), MessageKind::Ping);

            dispatcher
                .request()
                .timeout(Duration::from_millis(2))
                .callback(callback)
                .send(&node(2), message.clone())
                .unwrap();

            let d = dispatcher.clone();
            let reply = message.reply(node(3), MessageKind::Pong);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(2));
                d.dispatch(&reply);
            });

            counters.push((ok, failed));
        }

        thread::sleep(Duration::from_millis(300));

        for (ok, failed) in counters {
            assert_eq!(ok.load(Ordering::SeqCst) + failed.load(Ordering::SeqCst), 1);
        }
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[test]
    fn durable_registration_persists_and_sees_messages_first() {
        let (dispatcher, _) = setup(3);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let durable = dispatcher
            .request()
            .consumable(false)
            .filter(MessageFilter::Type(MessageType::Pong))
            .callback(move |_| lock(&o).push("durable"))
            .register();

        let o = order.clone();
        dispatcher
            .request()
            .callback(move |_| lock(&o).push("one-shot"))
            .send(&node(2), Message::new(9, node(1), MessageKind::Ping))
            .unwrap();

        let pong = Message::new(9, node(2), MessageKind::Pong);
        dispatcher.dispatch(&pong);
        dispatcher.dispatch(&pong);

        assert_eq!(*lock(&order), vec!["durable", "one-shot", "durable"]);
        assert_eq!(dispatcher.registrations(), 1);

        durable.cancel();
        dispatcher.dispatch(&pong);

        assert_eq!(lock(&order).len(), 3);
        assert_eq!(dispatcher.registrations(), 0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (dispatcher, _) = setup(3);
        let (ok, failed, callback) = counting();

        let message = Message::new(5, node(1), MessageKind::Ping);
        let registration = dispatcher
            .request()
            .callback(callback)
            .send(&node(2), message.clone())
            .unwrap();

        registration.cancel();
        registration.cancel();
        dispatcher.dispatch(&message.reply(node(2), MessageKind::Pong));

        assert_eq!(ok.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[test]
    fn try_send_reports_full_pool() {
        let (dispatcher, _) = setup(1);

        let first = Message::new(1, node(1), MessageKind::Ping);
        assert!(dispatcher
            .request()
            .try_send(&node(2), first.clone())
            .unwrap());

        let second = Message::new(2, node(1), MessageKind::Ping);
        assert!(!dispatcher
            .request()
            .try_send(&node(2), second.clone())
            .unwrap());
        assert_eq!(dispatcher.pending(), 1);

        dispatcher.dispatch(&first.reply(node(2), MessageKind::Pong));

        assert!(dispatcher.request().try_send(&node(2), second).unwrap());
    }

    #[test]
    fn blocking_send_waits_for_slot() {
        let (dispatcher, _) = setup(1);

        let first = Message::new(1, node(1), MessageKind::Ping);
        dispatcher.request().send(&node(2), first.clone()).unwrap();

        let d = dispatcher.clone();
        let reply = first.reply(node(2), MessageKind::Pong);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            d.dispatch(&reply);
        });

        let start = Instant::now();
        dispatcher
            .request()
            .send(&node(2), Message::new(2, node(1), MessageKind::Ping))
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(dispatcher.outstanding(), 1);
    }

    #[test]
    fn shutdown_ends_wait_for_slot() {
        let (dispatcher, _) = setup(1);
        let (ok, failed, callback) = counting();

        dispatcher
            .request()
            .send(&node(2), Message::new(1, node(1), MessageKind::Ping))
            .unwrap();

        let d = dispatcher.clone();
        let waiting = thread::spawn(move || {
            d.request()
                .callback(callback)
                .send(&node(2), Message::new(2, node(1), MessageKind::Ping))
        });

        assert!(wait_for(|| dispatcher.pending() == 2));
        dispatcher.shutdown();

        assert!(matches!(waiting.join().unwrap(), Err(Error::Shutdown)));
        assert_eq!(ok.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn transport_failure() {
        let (dispatcher, recorder) = setup(1);
        recorder.fail.store(true, Ordering::SeqCst);
        let (ok, failed, callback) = counting();

        let result = dispatcher
            .request()
            .callback(callback)
            .send(&node(2), Message::new(1, node(1), MessageKind::Ping));

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(ok.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[test]
    fn panicking_callback_does_not_affect_others() {
        let (dispatcher, _) = setup(1);
        let (ok, _, callback) = counting();

        dispatcher
            .request()
            .consumable(false)
            .callback(|_| panic!("observer bug"))
            .register();
        dispatcher
            .request()
            .consumable(false)
            .callback(callback)
            .register();

        dispatcher.dispatch(&Message::new(1, node(1), MessageKind::Ping));

        assert_eq!(ok.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn future_send() {
        let (dispatcher, _) = setup(1);
        let responder = node(2);

        let message = Message::new(3, node(1), MessageKind::Ping);
        let future = dispatcher
            .request()
            .future_send(&responder, message.clone())
            .unwrap()
            .map(|pong| Ok(pong.src));

        dispatcher.dispatch(&message.reply(responder.clone(), MessageKind::Pong));

        assert_eq!(future.get().unwrap(), responder);
    }

    #[test]
    fn future_try_get() {
        let (dispatcher, _) = setup(1);
        let message = Message::new(4, node(1), MessageKind::Ping);

        let future = dispatcher
            .request()
            .future_send(&node(2), message.clone())
            .unwrap();

        let future = future.try_get().unwrap_err();
        dispatcher.dispatch(&message.reply(node(2), MessageKind::Pong));

        assert_eq!(future.try_get().unwrap().unwrap().id, 4);
    }

    #[test]
    fn future_cancel() {
        let (dispatcher, _) = setup(1);

        let future = dispatcher
            .request()
            .filter(MessageFilter::Type(MessageType::ContentMessage))
            .future_register();

        future.cancel();
        assert!(future.is_done());
        assert!(matches!(future.get(), Err(Error::Cancelled)));
    }

    #[test]
    fn shutdown_refuses_requests() {
        let (dispatcher, _) = setup(1);
        dispatcher.request().consumable(false).register();

        let future = dispatcher.request().future_register();

        dispatcher.shutdown();

        assert_eq!(dispatcher.registrations(), 0);
        assert!(matches!(future.get(), Err(Error::Shutdown)));
        assert!(matches!(
            dispatcher
                .request()
                .send(&node(2), Message::new(1, node(1), MessageKind::Ping)),
            Err(Error::Shutdown)
        ));
    }
}
