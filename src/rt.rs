//! Runtime glue: one-shot promises and step-machine driving.
//!
//! A [`Promise`] is the receiving half of a one-shot result, resolved by its
//! [`Completer`] from wherever the work actually runs. [`spawn`] pairs the two with a
//! task on a Tokio runtime.
//!
//! Loops which would otherwise resubmit themselves after every I/O completion are
//! written as a [`StepMachine`] instead, and run to completion by [`drive`].

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project::pin_project;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::trace;

use crate::{BoxFuture, Error};

/// Create a linked [`Completer`] and [`Promise`].
pub fn promise<T>() -> (Completer<T>, Promise<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Promise { rx })
}

/// Run `future` on `handle`, and return a promise of its result.
pub fn spawn<F, T>(handle: &Handle, future: F) -> Promise<T>
where
    F: Future<Output = Result<T, Error>> + Send + 'static,
    T: Send + 'static,
{
    let (completer, promise) = promise();
    handle.spawn(async move { completer.complete(future.await) });
    promise
}

/// The sending half of a [`Promise`].
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T, Error>>,
}

impl<T> Completer<T> {
    /// Resolve the promise with a value.
    pub fn resolve(self, value: T) {
        self.complete(Ok(value))
    }

    /// Resolve the promise with an error.
    pub fn reject(self, error: Error) {
        self.complete(Err(error))
    }

    /// Resolve the promise with a result.
    ///
    /// If the promise has been dropped the result is discarded.
    pub fn complete(self, result: Result<T, Error>) {
        if self.tx.send(result).is_err() {
            trace!("promise dropped before completion");
        }
    }
}

/// A future which resolves when its [`Completer`] does.
///
/// If the completer is dropped without resolving, the promise fails with
/// [`Error::Canceled`].
#[derive(Debug)]
#[pin_project]
pub struct Promise<T> {
    #[pin]
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Promise<T> {
    /// A promise which has already resolved.
    pub fn ready(result: Result<T, Error>) -> Self {
        let (completer, promise) = promise();
        completer.complete(result);
        promise
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.project().rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(Error::Canceled)),
        }
    }
}

/// The outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<T> {
    /// Step again.
    Continue,
    /// The machine has finished with this output.
    Done(T),
}

/// An asynchronous loop expressed as explicit state plus a step function.
///
/// Each call to [`step`](StepMachine::step) performs at most one I/O operation and
/// advances the machine's state.
pub trait StepMachine: Send {
    /// The value the machine produces when it finishes.
    type Output;

    /// Advance the machine by one step.
    fn step(&mut self) -> BoxFuture<'_, Result<Step<Self::Output>, Error>>;
}

/// Step `machine` until it finishes or fails.
pub async fn drive<M>(machine: &mut M) -> Result<M::Output, Error>
where
    M: StepMachine + ?Sized,
{
    let mut steps = 0usize;
    loop {
        steps += 1;
        if let Step::Done(output) = machine.step().await? {
            trace!(steps, "machine finished");
            return Ok(output);
        }
    }
}
