//! Blocking facade over the async client.
//!
//! [`Blocking<R>`] owns one async resource and a dedicated current-thread
//! Tokio runtime. Every call drives exactly one async operation to
//! completion on that runtime and returns its result unchanged; there is no
//! extra caching, retrying, or concurrency here, so every behaviour of the
//! async client holds for blocking callers too.
//!
//! `Blocking::enter` drives `Lifecycle::open`. Dropping the wrapper drives
//! `Lifecycle::close` exactly once, on every exit path including `?`
//! propagation and unwinding.
//!
//! Limitations:
//! - A blocking call cannot be cancelled from outside once it has started.
//! - These types must not be used (or dropped) from inside an async
//!   runtime. Tokio forbids nested `block_on` and will panic.

use std::collections::VecDeque;
use std::future::Future;

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};
use tokio::runtime::{Builder, Runtime};
use tracing::warn;

use crate::auth::{Token, WhoAmI};
use crate::client::SophosClient;
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::pagination::{Page, Paginator};
use crate::query::QueryParams;

// ── Generic wrapper ────────────────────────────────────────────────────

/// Owns an async resource and the runtime that drives it.
pub struct Blocking<R: Lifecycle> {
    resource: R,
    runtime: Runtime,
    closed: bool,
}

impl<R: Lifecycle> Blocking<R> {
    /// Builds the runtime and opens the resource. If opening fails the
    /// resource is dropped without `close`.
    pub fn enter(resource: R) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(resource.open())?;
        Ok(Blocking {
            resource,
            runtime,
            closed: false,
        })
    }

    /// Drives `future` to completion on the owned runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// The wrapped resource.
    pub fn get_ref(&self) -> &R {
        &self.resource
    }

    /// The runtime driving the resource.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Closes now and reports any error, instead of logging it on drop.
    pub fn close(mut self) -> Result<()> {
        self.close_once()
    }

    fn close_once(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.runtime.block_on(self.resource.close())
    }
}

impl<R: Lifecycle> Drop for Blocking<R> {
    fn drop(&mut self) {
        if let Err(e) = self.close_once() {
            warn!(error = %e, "Failed to close resource");
        }
    }
}

// ── Client facade ──────────────────────────────────────────────────────

/// Blocking mirror of [`SophosClient`].
pub struct BlockingClient {
    inner: Blocking<SophosClient>,
}

impl BlockingClient {
    /// Opens `client` on a private runtime (warms the token, resolves the
    /// API host).
    pub fn new(client: SophosClient) -> Result<Self> {
        Ok(BlockingClient {
            inner: Blocking::enter(client)?,
        })
    }

    /// The underlying async client.
    pub fn client(&self) -> &SophosClient {
        self.inner.get_ref()
    }

    /// Drives an arbitrary async operation against the client, for the
    /// resource functions in `endpoints`, `alerts` and `tenants`.
    ///
    /// ```ignore
    /// let ep = blocking.call(|c| endpoints::get_endpoint(c, "id"))?;
    /// ```
    pub fn call<'s, F, Fut, T>(&'s self, op: F) -> T
    where
        F: FnOnce(&'s SophosClient) -> Fut,
        Fut: Future<Output = T> + 's,
    {
        self.inner.block_on(op(self.inner.get_ref()))
    }

    /// See [`SophosClient::request`].
    pub fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&QueryParams>,
        body: Option<&B>,
        headers: Option<&HeaderMap>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.inner
            .block_on(self.client().request(method, path, query, body, headers))
    }

    /// See [`SophosClient::get`].
    pub fn get<T: DeserializeOwned>(&self, path: &str, query: Option<&QueryParams>) -> Result<T> {
        self.inner.block_on(self.client().get(path, query))
    }

    /// See [`SophosClient::post`].
    pub fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.inner.block_on(self.client().post(path, body))
    }

    /// See [`SophosClient::put`].
    pub fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.inner.block_on(self.client().put(path, body))
    }

    /// See [`SophosClient::patch`].
    pub fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.inner.block_on(self.client().patch(path, body))
    }

    /// See [`SophosClient::delete`].
    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.inner.block_on(self.client().delete(path))
    }

    /// See [`SophosClient::token`].
    pub fn token(&self) -> Result<Token> {
        self.inner.block_on(self.client().token())
    }

    /// See [`SophosClient::refresh_token`].
    pub fn refresh_token(&self) -> Result<Token> {
        self.inner.block_on(self.client().refresh_token())
    }

    /// See [`SophosClient::whoami`].
    pub fn whoami(&self) -> Result<WhoAmI> {
        self.inner.block_on(self.client().whoami())
    }

    /// See [`SophosClient::clear_auth_cache`].
    pub fn clear_auth_cache(&self) {
        self.inner.block_on(self.client().clear_auth_cache())
    }

    /// Wraps a paginator built against this client.
    ///
    /// ```ignore
    /// let mut pages = blocking.paginate(|c| endpoints::paginate_endpoints(c, &query, None))?;
    /// for ep in pages.items() { println!("{}", ep?.id); }
    /// ```
    pub fn paginate<'s, T, F>(&'s self, make: F) -> Result<BlockingPaginator<'s, 's, T>>
    where
        F: FnOnce(&'s SophosClient) -> Result<Paginator<'s, T>>,
    {
        let inner = make(self.client())?;
        Ok(BlockingPaginator::new(self.inner.runtime(), inner))
    }

    /// Closes the client now and reports any error.
    pub fn close(self) -> Result<()> {
        self.inner.close()
    }
}

// ── Paginator facade ───────────────────────────────────────────────────

/// Blocking mirror of [`Paginator`]. Iterators fetch one page per
/// `next()` that needs one, so laziness and ordering are preserved.
pub struct BlockingPaginator<'r, 'a, T> {
    runtime: &'r Runtime,
    inner: Paginator<'a, T>,
}

impl<'r, 'a, T> BlockingPaginator<'r, 'a, T> {
    /// Pairs a paginator with the runtime that will drive it.
    pub fn new(runtime: &'r Runtime, inner: Paginator<'a, T>) -> Self {
        BlockingPaginator { runtime, inner }
    }

    /// Lazily yields pages until the session ends. An error ends iteration.
    pub fn pages(&mut self) -> impl Iterator<Item = Result<Page<T>>> + '_ {
        let runtime = self.runtime;
        let inner = &mut self.inner;
        std::iter::from_fn(move || runtime.block_on(inner.next_page()).transpose())
    }

    /// Lazily yields items in server order, up to the paginator's item cap.
    /// An error ends iteration.
    pub fn items(&mut self) -> impl Iterator<Item = Result<T>> + '_ {
        let runtime = self.runtime;
        let cap = self.inner.max_items();
        let inner = &mut self.inner;
        let mut buffered: VecDeque<T> = VecDeque::new();
        let mut yielded = 0usize;
        std::iter::from_fn(move || {
            if cap.is_some_and(|max| yielded >= max) {
                return None;
            }
            loop {
                if let Some(item) = buffered.pop_front() {
                    yielded += 1;
                    return Some(Ok(item));
                }
                match runtime.block_on(inner.next_page()) {
                    Ok(Some(page)) => buffered.extend(page.items),
                    Ok(None) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }
        })
    }

    /// See [`Paginator::collect_all`].
    pub fn collect_all(&mut self, max_items: Option<usize>) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.collect_all(max_items))
    }

    /// See [`Paginator::fetch_first_page`].
    pub fn fetch_first_page(&mut self) -> Result<Page<T>> {
        self.runtime.block_on(self.inner.fetch_first_page())
    }

    /// See [`Paginator::reset`].
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// See [`Paginator::pages_fetched`].
    pub fn pages_fetched(&self) -> usize {
        self.inner.pages_fetched()
    }

    /// See [`Paginator::items_fetched`].
    pub fn items_fetched(&self) -> usize {
        self.inner.items_fetched()
    }

    /// The wrapped async paginator.
    pub fn into_inner(self) -> Paginator<'a, T> {
        self.inner
    }
}
