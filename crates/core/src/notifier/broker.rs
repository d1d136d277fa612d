use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::ServerMessage;

/// Queue slots per listener held back for `complete`/`error`, so a backlog
/// of progress events cannot crowd out a task's final message.
const TERMINAL_RESERVE: usize = 1;

/// Opaque handle identifying one connected listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Snapshot of broker occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    pub listeners: usize,
    pub tasks: usize,
    pub subscriptions: usize,
}

enum BrokerCommand {
    Register {
        listener: ListenerId,
        tx: mpsc::Sender<ServerMessage>,
    },
    Subscribe {
        task_id: String,
        listener: ListenerId,
    },
    Unsubscribe {
        task_id: String,
        listener: ListenerId,
    },
    RemoveListener {
        listener: ListenerId,
    },
    Broadcast {
        task_id: String,
        message: ServerMessage,
    },
    CloseTask {
        task_id: String,
    },
    SubscriberCount {
        task_id: String,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },
    Shutdown,
}

/// Handle to the subscription broker.
///
/// Cheap to clone. Every mutation is a message to the [`BrokerActor`], so no
/// call on the handle ever waits on a listener.
#[derive(Clone)]
pub struct SubscriptionBroker {
    tx: mpsc::UnboundedSender<BrokerCommand>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionBroker {
    fn send(&self, command: BrokerCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Subscription broker is stopped, dropping command");
        }
    }

    /// Registers a new listener with a bounded outbound queue of `buffer`
    /// messages, plus a reserved slot for terminal events.
    pub fn connect(&self, buffer: usize) -> (ListenerId, mpsc::Receiver<ServerMessage>) {
        let listener = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(buffer.max(1) + TERMINAL_RESERVE);
        self.send(BrokerCommand::Register { listener, tx });
        (listener, rx)
    }

    pub fn subscribe(&self, task_id: impl Into<String>, listener: ListenerId) {
        self.send(BrokerCommand::Subscribe {
            task_id: task_id.into(),
            listener,
        });
    }

    pub fn unsubscribe(&self, task_id: impl Into<String>, listener: ListenerId) {
        self.send(BrokerCommand::Unsubscribe {
            task_id: task_id.into(),
            listener,
        });
    }

    /// Detaches a listener from every task and drops its queue.
    pub fn remove_listener(&self, listener: ListenerId) {
        self.send(BrokerCommand::RemoveListener { listener });
    }

    /// Delivers a message to every listener currently subscribed to `task_id`.
    pub fn broadcast(&self, task_id: impl Into<String>, message: ServerMessage) {
        self.send(BrokerCommand::Broadcast {
            task_id: task_id.into(),
            message,
        });
    }

    /// Drops all subscriptions for a task.
    pub fn close_task(&self, task_id: impl Into<String>) {
        self.send(BrokerCommand::CloseTask {
            task_id: task_id.into(),
        });
    }

    /// Number of listeners subscribed to `task_id`. Zero once the broker is stopped.
    pub async fn subscriber_count(&self, task_id: impl Into<String>) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::SubscriberCount {
            task_id: task_id.into(),
            reply,
        });
        rx.await.unwrap_or(0)
    }

    pub async fn stats(&self) -> BrokerStats {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Stats { reply });
        rx.await.unwrap_or_default()
    }

    /// Stops the actor. Listener queues close once it exits.
    pub fn shutdown(&self) {
        self.send(BrokerCommand::Shutdown);
    }
}

struct ListenerEntry {
    tx: mpsc::Sender<ServerMessage>,
    tasks: HashSet<String>,
}

/// Single owner of the task to listener map.
pub struct BrokerActor {
    rx: mpsc::UnboundedReceiver<BrokerCommand>,
    listeners: HashMap<ListenerId, ListenerEntry>,
    tasks: HashMap<String, HashSet<ListenerId>>,
}

impl BrokerActor {
    /// Run the broker until shutdown or until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Subscription broker started");

        while let Some(command) = self.rx.recv().await {
            match command {
                BrokerCommand::Register { listener, tx } => {
                    self.listeners.insert(
                        listener,
                        ListenerEntry {
                            tx,
                            tasks: HashSet::new(),
                        },
                    );
                }
                BrokerCommand::Subscribe { task_id, listener } => {
                    self.subscribe(task_id, listener);
                }
                BrokerCommand::Unsubscribe { task_id, listener } => {
                    self.unsubscribe(&task_id, listener);
                }
                BrokerCommand::RemoveListener { listener } => {
                    self.remove_listener(listener);
                }
                BrokerCommand::Broadcast { task_id, message } => {
                    self.broadcast(&task_id, message);
                }
                BrokerCommand::CloseTask { task_id } => {
                    self.close_task(&task_id);
                }
                BrokerCommand::SubscriberCount { task_id, reply } => {
                    let count = self.tasks.get(&task_id).map_or(0, HashSet::len);
                    let _ = reply.send(count);
                }
                BrokerCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                BrokerCommand::Shutdown => break,
            }
        }

        tracing::info!(
            listeners = self.listeners.len(),
            tasks = self.tasks.len(),
            "Subscription broker shutting down"
        );
    }

    fn subscribe(&mut self, task_id: String, listener: ListenerId) {
        let Some(entry) = self.listeners.get_mut(&listener) else {
            tracing::debug!(%listener, task_id, "Subscribe from unknown listener ignored");
            return;
        };
        entry.tasks.insert(task_id.clone());
        tracing::debug!(%listener, task_id, "Listener subscribed");
        self.tasks.entry(task_id).or_default().insert(listener);
    }

    fn unsubscribe(&mut self, task_id: &str, listener: ListenerId) {
        if let Some(entry) = self.listeners.get_mut(&listener) {
            entry.tasks.remove(task_id);
        }
        if let Some(set) = self.tasks.get_mut(task_id) {
            set.remove(&listener);
            if set.is_empty() {
                self.tasks.remove(task_id);
            }
        }
    }

    fn remove_listener(&mut self, listener: ListenerId) {
        let Some(entry) = self.listeners.remove(&listener) else {
            return;
        };
        for task_id in &entry.tasks {
            if let Some(set) = self.tasks.get_mut(task_id) {
                set.remove(&listener);
                if set.is_empty() {
                    self.tasks.remove(task_id);
                }
            }
        }
        tracing::debug!(%listener, tasks = entry.tasks.len(), "Listener removed");
    }

    fn broadcast(&mut self, task_id: &str, message: ServerMessage) {
        let Some(subscribers) = self.tasks.get(task_id) else {
            return;
        };

        let terminal = message.is_terminal();
        for listener in subscribers {
            let Some(entry) = self.listeners.get(listener) else {
                continue;
            };
            if !terminal && entry.tx.capacity() <= TERMINAL_RESERVE {
                tracing::warn!(
                    %listener,
                    task_id,
                    kind = message.type_name(),
                    "Listener queue full, dropping message"
                );
                continue;
            }
            match entry.tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        %listener,
                        task_id,
                        kind = message.type_name(),
                        terminal,
                        "Listener queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Liveness check or disconnect will remove it.
                    tracing::debug!(%listener, task_id, "Listener queue closed");
                }
            }
        }
    }

    fn close_task(&mut self, task_id: &str) {
        let Some(subscribers) = self.tasks.remove(task_id) else {
            return;
        };
        for listener in subscribers {
            if let Some(entry) = self.listeners.get_mut(&listener) {
                entry.tasks.remove(task_id);
            }
        }
    }

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            listeners: self.listeners.len(),
            tasks: self.tasks.len(),
            subscriptions: self.tasks.values().map(HashSet::len).sum(),
        }
    }
}

/// Create a subscription broker.
///
/// Returns:
/// - `SubscriptionBroker` - handle for connecting listeners and publishing events
/// - `BrokerActor` - spawn this as a background task with `tokio::spawn(actor.run())`
pub fn create_broker() -> (SubscriptionBroker, BrokerActor) {
    let (tx, rx) = mpsc::unbounded_channel();
    let broker = SubscriptionBroker {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let actor = BrokerActor {
        rx,
        listeners: HashMap::new(),
        tasks: HashMap::new(),
    };
    (broker, actor)
}
