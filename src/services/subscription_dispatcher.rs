//! Shares one candle producer per (pair, period, channel) across subscribers.
//!
//! The table is guarded by a single mutex: subscribe, unsubscribe and the
//! producer's emit all take it, so a new subscriber can never attach to a
//! producer being torn down, and a producer can never push once its
//! cancellation has been recorded.
//!
//! Producers that run out of work call [`ProducerSink::finish`] so their key
//! can be started again. A key whose task died without finishing is
//! restarted on the next subscribe.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::candle::Candle;
use crate::models::pair::Pair;

/// Which producer mode a subscription drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "candles")]
    Live,
    #[serde(rename = "historicalCandles")]
    Historical,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Live => "candles",
            Channel::Historical => "historicalCandles",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub pair: Pair,
    pub period_seconds: u64,
    pub channel: Channel,
}

/// Delivers a candle to one subscriber. Called with the table lock held, so
/// it must not block or call back into the dispatcher.
pub type PushCallback = Arc<dyn Fn(&SubscriptionKey, &Candle) + Send + Sync>;

/// Starts the background producer for a key.
pub trait ProducerFactory: Send + Sync {
    fn spawn(&self, key: SubscriptionKey, sink: ProducerSink) -> JoinHandle<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no active subscription for this pair and period")]
    UnknownKey,

    #[error("not subscribed to this pair and period")]
    NotSubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// First subscriber; a producer was started.
    Started,
    /// Joined an already running producer.
    Joined { subscribers: usize },
    /// The subscriber was already attached; its callback was replaced.
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Left { remaining: usize },
    /// Last subscriber left; the producer was cancelled.
    Stopped,
}

struct ActiveProducer {
    producer_id: Uuid,
    subscribers: HashMap<Uuid, PushCallback>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type Table = HashMap<SubscriptionKey, ActiveProducer>;

/// Producer's handle back into the dispatcher.
#[derive(Clone)]
pub struct ProducerSink {
    key: SubscriptionKey,
    producer_id: Uuid,
    cancel: CancellationToken,
    table: Weak<Mutex<Table>>,
}

impl ProducerSink {
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the producer has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Pushes `candle` to every current subscriber. Returns `false` once the
    /// producer has been cancelled; the caller should stop.
    pub fn emit(&self, candle: &Candle) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let table = table.lock();
        if self.cancel.is_cancelled() {
            return false;
        }
        match table.get(&self.key) {
            Some(active) => {
                for callback in active.subscribers.values() {
                    callback(&self.key, candle);
                }
                true
            }
            None => false,
        }
    }

    /// Cancels the producer and drops its entry, unless the key has since
    /// been taken over by a newer producer.
    pub fn finish(&self) {
        self.cancel.cancel();
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock();
        if table
            .get(&self.key)
            .is_some_and(|active| active.producer_id == self.producer_id)
        {
            table.remove(&self.key);
            debug!(
                pair_id = self.key.pair.id,
                period = self.key.period_seconds,
                channel = self.key.channel.as_str(),
                "Candle producer finished, subscriptions released"
            );
        }
    }
}

pub struct SubscriptionDispatcher {
    table: Arc<Mutex<Table>>,
    factory: Arc<dyn ProducerFactory>,
}

impl SubscriptionDispatcher {
    pub fn new(factory: Arc<dyn ProducerFactory>) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            factory,
        }
    }

    pub fn subscribe(&self, key: SubscriptionKey, subscriber: Uuid, callback: PushCallback) -> SubscribeOutcome {
        let mut table = self.table.lock();

        if let Some(active) = table.get_mut(&key) {
            if !active.handle.is_finished() {
                if active.subscribers.insert(subscriber, callback).is_some() {
                    return SubscribeOutcome::AlreadySubscribed;
                }
                debug!(
                    pair_id = key.pair.id,
                    period = key.period_seconds,
                    subscribers = active.subscribers.len(),
                    "Subscriber joined running producer"
                );
                return SubscribeOutcome::Joined {
                    subscribers: active.subscribers.len(),
                };
            }
        }

        let mut subscribers = match table.remove(&key) {
            Some(dead) => {
                warn!(
                    pair_id = key.pair.id,
                    period = key.period_seconds,
                    channel = key.channel.as_str(),
                    "Candle producer exited without finishing, restarting"
                );
                dead.cancel.cancel();
                dead.subscribers
            }
            None => HashMap::new(),
        };
        subscribers.insert(subscriber, callback);

        let producer_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let sink = ProducerSink {
            key: key.clone(),
            producer_id,
            cancel: cancel.clone(),
            table: Arc::downgrade(&self.table),
        };
        let handle = self.factory.spawn(key.clone(), sink);

        info!(
            pair_id = key.pair.id,
            period = key.period_seconds,
            channel = key.channel.as_str(),
            "Started candle producer"
        );

        table.insert(
            key,
            ActiveProducer {
                producer_id,
                subscribers,
                cancel,
                handle,
            },
        );
        SubscribeOutcome::Started
    }

    pub fn unsubscribe(&self, key: &SubscriptionKey, subscriber: Uuid) -> Result<UnsubscribeOutcome, DispatchError> {
        let mut table = self.table.lock();

        let active = table.get_mut(key).ok_or(DispatchError::UnknownKey)?;
        if active.subscribers.remove(&subscriber).is_none() {
            return Err(DispatchError::NotSubscribed);
        }
        if !active.subscribers.is_empty() {
            return Ok(UnsubscribeOutcome::Left {
                remaining: active.subscribers.len(),
            });
        }

        if let Some(active) = table.remove(key) {
            active.cancel.cancel();
        }
        info!(
            pair_id = key.pair.id,
            period = key.period_seconds,
            channel = key.channel.as_str(),
            "Last subscriber left, cancelled candle producer"
        );
        Ok(UnsubscribeOutcome::Stopped)
    }

    /// Removes `subscriber` from every key. Returns how many keys it left.
    pub fn unsubscribe_all(&self, subscriber: Uuid) -> usize {
        let mut table = self.table.lock();
        let mut left = 0;

        table.retain(|key, active| {
            if active.subscribers.remove(&subscriber).is_some() {
                left += 1;
            }
            if active.subscribers.is_empty() {
                active.cancel.cancel();
                debug!(pair_id = key.pair.id, period = key.period_seconds, "Cancelled abandoned producer");
                false
            } else {
                true
            }
        });
        left
    }

    pub fn active_producers(&self) -> usize {
        self.table.lock().len()
    }

    /// Cancels every producer and waits for them to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut table = self.table.lock();
            table
                .drain()
                .map(|(_, active)| {
                    active.cancel.cancel();
                    active.handle
                })
                .collect()
        };

        for handle in handles {
            let _ = handle.await;
        }
    }
}
