//! Blocking (and optionally async) view of a single response.

use std::{
    fmt::{self, Debug, Formatter},
    time::Duration,
};

use flume::{Receiver, RecvTimeoutError};

use crate::{common::Message, Error, Result};

use super::dispatcher::Registration;

type Transform<T> = Box<dyn FnOnce(Message) -> Result<T> + Send>;

/// The single result of a request, see [super::Request::future_send].
///
/// Every way of reading the result consumes the future, so a [Self::map]
/// transform runs at most once.
pub struct ResponseFuture<T = Message> {
    receiver: Receiver<Result<Message>>,
    registration: Registration,
    transform: Transform<T>,
}

impl<T> Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("registration", &self.registration)
            .field("ready", &!self.receiver.is_empty())
            .finish()
    }
}

impl ResponseFuture<Message> {
    pub(crate) fn new(receiver: Receiver<Result<Message>>, registration: Registration) -> Self {
        Self {
            receiver,
            registration,
            transform: Box::new(Ok),
        }
    }
}

impl<T: 'static> ResponseFuture<T> {
    // === Getters ===

    /// Returns `true` once the result is available, or the request failed or was cancelled.
    pub fn is_done(&self) -> bool {
        !self.receiver.is_empty() || self.registration.is_done()
    }

    // === Public Methods ===

    /// Transform the response once it arrives.
    pub fn map<U, F>(self, f: F) -> ResponseFuture<U>
    where
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let transform = self.transform;

        ResponseFuture {
            receiver: self.receiver,
            registration: self.registration,
            transform: Box::new(move |message| transform(message).and_then(f)),
        }
    }

    /// Cancel the underlying request, [Self::get] then returns [Error::Cancelled].
    pub fn cancel(&self) {
        self.registration.cancel()
    }

    /// Block until the response arrives, or the request fails.
    pub fn get(self) -> Result<T> {
        let ResponseFuture {
            receiver,
            transform,
            ..
        } = self;

        match receiver.recv() {
            Ok(result) => result.and_then(transform),
            Err(_) => Err(Error::Shutdown),
        }
    }

    /// The result if it already arrived, otherwise the future itself back.
    pub fn try_get(self) -> std::result::Result<Result<T>, Self> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(result.and_then(self.transform)),
            Err(flume::TryRecvError::Empty) => Err(self),
            Err(flume::TryRecvError::Disconnected) => Ok(Err(Error::Shutdown)),
        }
    }

    /// Like [Self::get] but gives up after `timeout`, cancelling the request.
    pub fn get_timeout(self, timeout: Duration) -> Result<T> {
        let ResponseFuture {
            receiver,
            registration,
            transform,
        } = self;

        match receiver.recv_timeout(timeout) {
            Ok(result) => result.and_then(transform),
            Err(RecvTimeoutError::Timeout) => {
                registration.cancel();
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Shutdown),
        }
    }

    #[cfg(feature = "async")]
    /// Await the response without blocking a thread.
    pub async fn get_async(self) -> Result<T> {
        let ResponseFuture {
            receiver,
            transform,
            ..
        } = self;

        match receiver.recv_async().await {
            Ok(result) => result.and_then(transform),
            Err(_) => Err(Error::Shutdown),
        }
    }
}
