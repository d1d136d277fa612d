//! Task notification fan-out.
//!
//! A [`TaskTracker`] turns a job's step updates into progress events and hands
//! them to the [`SubscriptionBroker`], which delivers them to every listener
//! subscribed to that task id. The broker is an actor: the task to listener
//! map is owned by a single [`BrokerActor`] and every mutation arrives as a
//! message, so broadcasts and connects/disconnects never contend on a lock.
//!
//! Listener transports use [`Heartbeat`] to drop connections that stop
//! answering pings.

mod broker;
mod heartbeat;
mod tracker;
mod types;

pub use broker::{create_broker, BrokerActor, BrokerStats, ListenerId, SubscriptionBroker};
pub use heartbeat::{Heartbeat, HeartbeatAction};
pub use tracker::{percentage, NoopReporter, ProgressReporter, TaskTracker};
pub use types::{generate_client_id, now_millis, ClientMessage, ServerMessage, TaskStatus};
