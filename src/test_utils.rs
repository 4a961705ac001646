//! Test utilities for profile-census
//!
//! In-memory writers and a scripted API stub so engine and sink tests run
//! without network access or real files.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::crawling::api::ProfileApi;
use crate::crawling::batcher::KEY_SEPARATOR;
use crate::crawling::error::FetchError;
use crate::domain::UserId;

/// Shared byte buffer usable as a sink writer
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn contents(&self) -> String {
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose every write and flush fails, as a full disk would
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("no space left on device"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("no space left on device"))
    }
}

type Responder = dyn Fn(&[UserId]) -> Result<String, FetchError> + Send + Sync;

/// Scripted [`ProfileApi`] that records how it was called
pub struct StubProfileApi {
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<Vec<UserId>>>,
}

impl StubProfileApi {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[UserId]) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Identifier lists received, in call order
    pub fn batches(&self) -> Vec<Vec<UserId>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ProfileApi for StubProfileApi {
    async fn fetch_batch(&self, ids_key: &str) -> Result<String, FetchError> {
        let ids = ids_key
            .split(KEY_SEPARATOR)
            .map(|id| {
                id.parse::<UserId>()
                    .map_err(|_| FetchError::Transport(format!("bad id in key: {ids_key}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ids.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.responder)(&ids);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Wraps user objects in the `{"response": [...]}` envelope
pub fn response_body(users: &[Value]) -> String {
    json!({ "response": users }).to_string()
}

/// Builds one user object; `None` fields are left out entirely
pub fn user_json(id: UserId, city: Option<i64>, last_seen: Option<i64>, bdate: Option<&str>) -> Value {
    let mut user = json!({
        "id": id,
        "first_name": format!("First{id}"),
        "last_name": format!("Last{id}"),
    });
    if let Some(city) = city {
        user["city"] = json!({ "id": city, "title": format!("City {city}") });
    }
    if let Some(time) = last_seen {
        user["last_seen"] = json!({ "time": time, "platform": 7 });
    }
    if let Some(bdate) = bdate {
        user["bdate"] = json!(bdate);
    }
    user
}
