use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::logging::{LogLevel, Logger, emit_optional, json_kv};

const TARGET: &str = "drive::bus";

/// Failure reported by a subscriber. The bus logs it and moves on.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<&str> for HandlerError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub type HandlerResult = std::result::Result<(), HandlerError>;

type ErasedHandler = Arc<dyn Fn(&dyn Any) -> HandlerResult + Send + Sync>;

struct HandlerEntry {
    id: u64,
    handler: ErasedHandler,
}

/// Opaque handle returned by [`EventBus::subscribe`]; required to unsubscribe.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct Subscription {
    id: u64,
    type_id: TypeId,
    type_name: &'static str,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn message_type(&self) -> &'static str {
        self.type_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Nested publishes deeper than this are dropped instead of recursing.
    pub max_publish_depth: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_publish_depth: 16,
        }
    }
}

/// Outcome of a single [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: bool,
}

impl PublishReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct StatCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Typed publish/subscribe bus keyed by message type.
///
/// Delivery is synchronous on the publisher's thread and follows subscription
/// order. The handler list is snapshotted before delivery, so handlers may
/// subscribe, unsubscribe or publish without deadlocking; a subscription added
/// during a publish first sees the next message.
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<HandlerEntry>>>,
    next_id: AtomicU64,
    depth: AtomicUsize,
    config: BusConfig,
    logger: Option<Logger>,
    stats: StatCounters,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            depth: AtomicUsize::new(0),
            config,
            logger: None,
            stats: StatCounters::default(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Register `handler` for messages of type `T`.
    ///
    /// Registering the same closure twice yields two independent
    /// subscriptions and two invocations per publish.
    pub fn subscribe<T, F>(&self, handler: F) -> Subscription
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: ErasedHandler = Arc::new(move |message: &dyn Any| {
            match message.downcast_ref::<T>() {
                Some(typed) => handler(typed),
                None => Err(HandlerError::new("message type mismatch")),
            }
        });

        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(TypeId::of::<T>())
            .or_default()
            .push(HandlerEntry {
                id,
                handler: erased,
            });

        Subscription {
            id,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Remove a subscription. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = guard.get_mut(&subscription.type_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != subscription.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            guard.remove(&subscription.type_id);
        }
        removed
    }

    /// Deliver `message` to every handler currently registered for `T`.
    ///
    /// Handler errors and panics are logged and counted, never propagated.
    pub fn publish<T>(&self, message: T) -> PublishReport
    where
        T: Any + Send + Sync,
    {
        let mut report = PublishReport::default();
        let depth = self.depth.fetch_add(1, Ordering::SeqCst);
        if depth >= self.config.max_publish_depth {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            emit_optional(
                self.logger.as_ref(),
                LogLevel::Error,
                TARGET,
                "publish_depth_exceeded",
                [
                    json_kv("message_type", json!(type_name::<T>())),
                    json_kv("depth", json!(depth)),
                ],
            );
            report.dropped = true;
            return report;
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<(u64, ErasedHandler)> = {
            let guard = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            guard
                .get(&TypeId::of::<T>())
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| (entry.id, Arc::clone(&entry.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&message as &dyn Any)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    self.log_failure(LogLevel::Warn, "handler_failed", id, type_name::<T>(), &err.to_string());
                }
                Err(panic) => {
                    report.failed += 1;
                    let reason = panic_message(panic.as_ref());
                    self.log_failure(LogLevel::Error, "handler_panicked", id, type_name::<T>(), &reason);
                }
            }
        }

        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.stats
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        report
    }

    pub fn subscriber_count<T>(&self) -> usize
    where
        T: Any + Send + Sync,
    {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.stats.published.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    fn log_failure(&self, level: LogLevel, message: &str, id: u64, message_type: &str, reason: &str) {
        emit_optional(
            self.logger.as_ref(),
            level,
            TARGET,
            message,
            [
                json_kv("subscription", json!(id)),
                json_kv("message_type", json!(message_type)),
                json_kv("reason", json!(reason)),
            ],
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _subs: Vec<_> = (0..3)
            .map(|idx| {
                let seen = Arc::clone(&seen);
                bus.subscribe::<Ping, _>(move |ping| {
                    seen.lock().unwrap().push((idx, ping.0));
                    Ok(())
                })
            })
            .collect();

        let report = bus.publish(Ping(7));
        assert_eq!(report.delivered, 3);
        assert_eq!(*seen.lock().unwrap(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn failing_handlers_do_not_block_the_rest() {
        let sink = MemorySink::new();
        let bus = EventBus::new().with_logger(Logger::new(sink.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let _a = bus.subscribe::<Ping, _>(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::new("gauge offline"))
        });
        let c2 = Arc::clone(&calls);
        let _b = bus.subscribe::<Ping, _>(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
            panic!("renderer exploded");
        });
        let c3 = Arc::clone(&calls);
        let _c = bus.subscribe::<Ping, _>(move |_| {
            c3.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = bus.publish(Ping(1));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert!(sink.contains_message("handler_failed"));
        assert!(sink.contains_message("handler_panicked"));
        assert_eq!(bus.stats().failed, 2);
    }

    #[test]
    fn duplicate_subscription_is_invoked_twice() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = Arc::clone(&calls);
            move |_: &Ping| -> HandlerResult {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        let first = bus.subscribe::<Ping, _>(handler.clone());
        let second = bus.subscribe::<Ping, _>(handler);
        assert_ne!(first, second);

        bus.publish(Ping(0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let sub = bus.subscribe::<Ping, _>(|_| Ok(()));
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
        assert!(bus.unsubscribe(&sub));
        assert!(!bus.unsubscribe(&sub));
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
        assert_eq!(bus.publish(Ping(3)).attempted(), 0);
    }

    #[test]
    fn message_types_are_isolated() {
        let bus = EventBus::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pings);
        let _sub = bus.subscribe::<Ping, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish(Pong);
        assert_eq!(pings.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_may_publish_and_unsubscribe_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let pongs = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::clone(&bus);
        let _relay = bus.subscribe::<Ping, _>(move |_| {
            inner_bus.publish(Pong);
            Ok(())
        });
        let counter = Arc::clone(&pongs);
        let _pong = bus.subscribe::<Pong, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(Ping(1));
        assert_eq!(pongs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runaway_recursion_is_cut_off() {
        let sink = MemorySink::new();
        let bus = Arc::new(
            EventBus::with_config(BusConfig {
                max_publish_depth: 4,
            })
            .with_logger(Logger::new(sink.clone())),
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::clone(&bus);
        let counter = Arc::clone(&calls);
        let _echo = bus.subscribe::<Ping, _>(move |ping| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner_bus.publish(Ping(ping.0 + 1));
            Ok(())
        });

        bus.publish(Ping(0));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(bus.stats().dropped, 1);
        assert!(sink.contains_message("publish_depth_exceeded"));
    }
}
