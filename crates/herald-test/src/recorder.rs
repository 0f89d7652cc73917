//! Outcome recorder for one subscription

use std::time::Duration;

use herald_core::{Outcome, OutcomeKind, SubscriberId};
use herald_state::Subscription;
use tokio::time::{timeout_at, Instant};

/// Collects what a subscriber receives, with deadlines
#[derive(Debug)]
pub struct Recorder<V> {
    subscription: Subscription<V>,
    seen: Vec<Outcome<V>>,
    closed: bool,
}

impl<V: Clone + Send + 'static> Recorder<V> {
    pub fn new(subscription: Subscription<V>) -> Self {
        Recorder {
            subscription,
            seen: Vec::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }

    pub fn seen(&self) -> &[Outcome<V>] {
        &self.seen
    }

    pub fn kinds(&self) -> Vec<OutcomeKind> {
        self.seen.iter().map(Outcome::kind).collect()
    }

    pub fn last(&self) -> Option<&Outcome<V>> {
        self.seen.last()
    }

    /// True once the stream has ended and everything queued was read
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Record everything already queued without waiting
    pub fn drain_now(&mut self) -> usize {
        let mut count = 0;
        while let Some(outcome) = self.subscription.try_recv() {
            self.seen.push(outcome);
            count += 1;
        }
        if self.subscription.is_closed() && self.subscription.queued() == 0 {
            self.closed = true;
        }
        count
    }

    /// Record until a settled outcome arrives after a Pending one
    ///
    /// Returns false on deadline or end of stream.
    pub async fn collect_until_settled(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut pending_seen = false;
        loop {
            match self.next_before(deadline).await {
                Some(kind) if kind == OutcomeKind::Pending => pending_seen = true,
                Some(kind) if kind.is_settled() && pending_seen => return true,
                Some(_) => {}
                None => return false,
            }
        }
    }

    /// Record `n` more outcomes; returns how many arrived before the deadline
    pub async fn collect_n(&mut self, n: usize, limit: Duration) -> usize {
        let deadline = Instant::now() + limit;
        let mut count = 0;
        while count < n {
            if self.next_before(deadline).await.is_none() {
                break;
            }
            count += 1;
        }
        count
    }

    /// Wait for the end of the stream, recording anything still queued
    pub async fn wait_closed(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while !self.closed {
            if self.next_before(deadline).await.is_none() && !self.closed {
                return false;
            }
        }
        true
    }

    /// Nothing new arrives within `window`
    pub async fn stays_quiet(&mut self, window: Duration) -> bool {
        let before = self.seen.len();
        let _ = self.next_before(Instant::now() + window).await;
        self.seen.len() == before
    }

    pub fn into_subscription(self) -> Subscription<V> {
        self.subscription
    }

    async fn next_before(&mut self, deadline: Instant) -> Option<OutcomeKind> {
        if self.closed {
            return None;
        }
        match timeout_at(deadline, self.subscription.recv()).await {
            Ok(Some(outcome)) => {
                let kind = outcome.kind();
                self.seen.push(outcome);
                Some(kind)
            }
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }
}
