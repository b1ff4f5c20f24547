//! In-process transport double for unit tests

use crate::crawler::fetcher::{FetchedPage, Transport};
use crate::FetchError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Replays queued responses per URL and records every call
///
/// When a URL's queue holds one response it is repeated forever; longer
/// queues are consumed front to back. Unknown URLs get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<FetchedPage, FetchError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, url: &str, body: &str) -> Self {
        self.push(
            url,
            Ok(FetchedPage {
                status_code: 200,
                body: body.to_string(),
            }),
        )
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.push(
            url,
            Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
        )
    }

    pub fn push(self, url: &str, response: Result<FetchedPage, FetchError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
