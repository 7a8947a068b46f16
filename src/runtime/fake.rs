//! Scripted in-memory container host for tests.

use super::{ContainerHost, EventStream};
use crate::error::HostError;
use crate::types::{ContainerRecord, HostEvent};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub(crate) type EventSender = mpsc::UnboundedSender<Result<HostEvent, HostError>>;

#[derive(Default)]
pub(crate) struct FakeHost {
    containers: Mutex<Vec<ContainerRecord>>,
    failing_lists: AtomicUsize,
    ping_fails: AtomicBool,
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<HostEvent, HostError>>>>,
    pub(crate) list_calls: AtomicUsize,
    pub(crate) subscribe_calls: AtomicUsize,
}

impl FakeHost {
    pub(crate) fn new(containers: Vec<ContainerRecord>) -> Self {
        Self {
            containers: Mutex::new(containers),
            ..Default::default()
        }
    }

    pub(crate) fn set_containers(&self, containers: Vec<ContainerRecord>) {
        *self.containers.lock().unwrap() = containers;
    }

    /// The next `n` listings fail with a server error.
    pub(crate) fn fail_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_ping(&self) {
        self.ping_fails.store(true, Ordering::SeqCst);
    }

    /// Queue a subscription for the next `events()` call and return its
    /// sending half. Dropping the sender ends the stream.
    pub(crate) fn subscription(&self) -> EventSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().unwrap().push_back(rx);
        tx
    }

    pub(crate) fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribes(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn server_error(message: &str) -> HostError {
    HostError::Docker(bollard::errors::Error::DockerResponseServerError {
        status_code: 500,
        message: message.to_string(),
    })
}

#[async_trait]
impl ContainerHost for FakeHost {
    async fn ping(&self) -> Result<String, HostError> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(server_error("ping failed"));
        }
        Ok("1.45".to_string())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerRecord>, HostError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_lists.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_lists.store(failing - 1, Ordering::SeqCst);
            return Err(server_error("list failed"));
        }

        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|c| c.labels.contains_key(label))
            .cloned()
            .collect())
    }

    fn events(&self) -> EventStream {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        match self.subscriptions.lock().unwrap().pop_front() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => stream::pending().boxed(),
        }
    }
}
