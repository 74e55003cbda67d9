//! The `Stream` abstraction: a lazy, append-only, multi-consumer sequence.
//!
//! One producer task owns writing; every consumer holds its own integer
//! index into the shared item list and advances independently, so two
//! concurrent consumers always see the same item sequence in the same
//! order. `from_futures_in_order` is built on
//! `futures::stream::FuturesOrdered`, which already yields in push order
//! regardless of completion order.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dfm_core::{DfmError, DfmResult};
use futures_core::Stream as FutureStream;
use futures_util::stream::FuturesOrdered;
use futures_util::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// The terminal state a `Stream` settles into once its producer finishes.
#[derive(Debug, Clone)]
pub enum Terminal {
    Ok,
    Err(DfmError),
    Cancelled,
}

struct State<T> {
    items: Vec<T>,
    terminal: Option<Terminal>,
    filters: Vec<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    started: AtomicBool,
    producer: Mutex<Option<JoinHandle<()>>>,
}

/// A lazy, append-only, multi-consumer stream of `T`.
///
/// Cloning a `Stream` shares the same backing sequence and producer — this
/// is how `Adapter::get_or_create_stream()` hands the identical stream to
/// every consumer of an adapter's output.
pub struct Stream<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: Vec::new(),
                    terminal: None,
                    filters: Vec::new(),
                }),
                notify: Notify::new(),
                started: AtomicBool::new(false),
                producer: Mutex::new(None),
            }),
        }
    }

    /// Register a predicate every produced item must pass to be kept.
    /// Must be called before `start_from_*`; returns a `ServerError` if
    /// the stream has already started.
    pub fn add_filter(&self, pred: impl Fn(&T) -> bool + Send + Sync + 'static) -> DfmResult<()> {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(DfmError::server(
                "cannot add a filter to a Stream that has already started",
            ));
        }
        self.inner.state.lock().unwrap().filters.push(Arc::new(pred));
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Start the producer from any asynchronous iterator of results. Once
    /// called, `add_filter` is rejected and a second `start_from_*` call
    /// is a no-op (idempotent with `get_or_create_stream`'s "create on
    /// first request" contract).
    pub fn start_from_async_iterator<S>(&self, mut source: S)
    where
        S: FutureStream<Item = Result<T, DfmError>> + Send + Unpin + 'static,
    {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(item)) => {
                        let keep = {
                            let state = inner.state.lock().unwrap();
                            state.filters.iter().all(|f| f(&item))
                        };
                        if keep {
                            let mut state = inner.state.lock().unwrap();
                            state.items.push(item);
                        }
                        inner.notify.notify_waiters();
                    }
                    Some(Err(e)) => {
                        let mut state = inner.state.lock().unwrap();
                        state.terminal = Some(Terminal::Err(e));
                        drop(state);
                        inner.notify.notify_waiters();
                        return;
                    }
                    None => {
                        let mut state = inner.state.lock().unwrap();
                        state.terminal = Some(Terminal::Ok);
                        drop(state);
                        inner.notify.notify_waiters();
                        return;
                    }
                }
            }
        });
        *self.inner.producer.lock().unwrap() = Some(handle);
    }

    /// Start the producer from a sequence of futures that may complete out
    /// of order, yielding results in the input list's order.
    pub fn start_from_futures_in_order<F>(&self, futures: Vec<F>)
    where
        F: Future<Output = Result<T, DfmError>> + Send + 'static,
    {
        let ordered: FuturesOrdered<F> = futures.into_iter().collect();
        self.start_from_async_iterator(ordered);
    }

    /// Start the producer by yielding a single value once (the `body()`
    /// return-a-value-not-an-awaitable case for nullary/unary adapters).
    pub fn start_from_single(&self, value: T) {
        self.start_from_async_iterator(tokio_stream::once(Ok(value)));
    }

    /// Abort the producer task. Consumers currently or subsequently
    /// waiting observe a `Cancelled` terminal state.
    pub fn cancel(&self) {
        if let Some(handle) = self.inner.producer.lock().unwrap().take() {
            handle.abort();
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.terminal.is_none() {
            state.terminal = Some(Terminal::Cancelled);
        }
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// A fresh cursor over this stream, starting at index 0. Independent
    /// cursors never observe each other's position.
    pub fn cursor(&self) -> StreamCursor<T> {
        StreamCursor {
            stream: self.clone(),
            idx: 0,
        }
    }

    /// Collect every item, waiting for the terminal state. Used by
    /// join-by-completion adapters (`SignalClient`, `SignalAllDone`) that
    /// discard values but must await full completion.
    pub async fn drain_to_completion(&self) -> DfmResult<usize> {
        let mut cursor = self.cursor();
        let mut count = 0;
        loop {
            match cursor.next().await {
                Some(Ok(_)) => count += 1,
                Some(Err(e)) => return Err(e),
                None => return Ok(count),
            }
        }
    }
}

/// An independent consumer position into a [`Stream`].
pub struct StreamCursor<T> {
    stream: Stream<T>,
    idx: usize,
}

impl<T> StreamCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Advance to the next item, suspending until it is available or the
    /// stream reaches a terminal state.
    pub async fn next(&mut self) -> Option<Result<T, DfmError>> {
        loop {
            let notified = self.stream.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.stream.inner.state.lock().unwrap();
                if self.idx < state.items.len() {
                    let item = state.items[self.idx].clone();
                    drop(state);
                    self.idx += 1;
                    return Some(Ok(item));
                }
                if let Some(terminal) = state.terminal.clone() {
                    return match terminal {
                        Terminal::Ok => None,
                        Terminal::Err(e) => Some(Err(e)),
                        Terminal::Cancelled => {
                            Some(Err(DfmError::server("stream was cancelled")))
                        }
                    };
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn two_consumers_see_the_same_item_sequence() {
        let stream: Stream<i32> = Stream::new();
        stream.start_from_async_iterator(tokio_stream::iter(vec![Ok(1), Ok(2), Ok(3)]));

        let mut a = stream.cursor();
        let mut b = stream.cursor();

        let collect = |c: &mut StreamCursor<i32>| async move {
            let mut out = Vec::new();
            while let Some(Ok(v)) = c.next().await {
                out.push(v);
            }
            out
        };

        let (va, vb) = tokio::join!(collect(&mut a), collect(&mut b));
        assert_eq!(va, vec![1, 2, 3]);
        assert_eq!(vb, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn futures_in_order_preserves_input_order_despite_completion_order() {
        let stream: Stream<i32> = Stream::new();
        let futs: Vec<_> = vec![
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(1)
            }) as std::pin::Pin<Box<dyn Future<Output = Result<i32, DfmError>> + Send>>,
            Box::pin(async { Ok(2) }),
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(3)
            }),
        ];
        stream.start_from_futures_in_order(futs);

        let mut cursor = stream.cursor();
        let mut out = Vec::new();
        while let Some(Ok(v)) = cursor.next().await {
            out.push(v);
        }
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn filter_added_after_start_is_rejected() {
        let stream: Stream<i32> = Stream::new();
        stream.start_from_async_iterator(tokio_stream::iter(vec![Ok(1)]));
        // give the producer a chance to flip `started`
        tokio::task::yield_now().await;
        assert!(stream.add_filter(|v| *v > 0).is_err());
    }

    #[tokio::test]
    async fn error_terminal_propagates_to_consumers() {
        let stream: Stream<i32> = Stream::new();
        stream.start_from_async_iterator(tokio_stream::iter(vec![
            Ok(1),
            Err(DfmError::server("boom")),
        ]));
        let mut cursor = stream.cursor();
        assert_eq!(cursor.next().await.unwrap().unwrap(), 1);
        assert!(cursor.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn cancel_surfaces_as_cancelled_to_pending_consumers() {
        let stream: Stream<i32> = Stream::new();
        stream.start_from_async_iterator(futures_util::stream::pending());
        stream.cancel();
        let mut cursor = stream.cursor();
        assert!(cursor.next().await.unwrap().is_err());
    }
}
