//! Scripted transport for driving the fetch engine on a paused clock.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use url::Url;

use crate::error::TransportError;
use crate::http::{HttpResponse, Transport};

/// One scripted reaction to a GET.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Respond(HttpResponse),
    /// Fails like a refused connection.
    Refuse,
    /// Answers `{}` after sleeping.
    Stall(Duration),
}

impl Scripted {
    pub(crate) fn ok(body: impl Into<String>) -> Self {
        Scripted::Respond(HttpResponse::ok(body))
    }

    pub(crate) fn status(status: u16) -> Self {
        Scripted::Respond(HttpResponse::status(status))
    }
}

/// Replays a script of responses in order. Once the script runs out the last
/// step repeats forever.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<(Url, Instant)>>,
    idle_closes: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            idle_closes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub(crate) fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub(crate) fn idle_closes(&self) -> usize {
        self.idle_closes.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Scripted {
        let mut last = self.last.lock().unwrap();
        match self.script.lock().unwrap().pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().expect("transport script is empty"),
        }
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: Url) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        self.requests.lock().unwrap().push((url, Instant::now()));
        let step = self.next_step();
        async move {
            match step {
                Scripted::Respond(response) => Ok(response),
                Scripted::Refuse => {
                    Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into())
                }
                Scripted::Stall(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(HttpResponse::ok("{}"))
                }
            }
        }
    }

    fn close_idle_connections(&self) {
        self.idle_closes.fetch_add(1, Ordering::SeqCst);
    }
}
