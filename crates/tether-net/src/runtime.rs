//! The supervisor task.
//!
//! One task owns the [`Supervisor`] and is the only place its state is
//! touched. Attempt events, facade sends and shutdown requests arrive on a
//! single command channel; the heartbeat and reconnect-poll intervals are
//! polled in the same loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tether_core::logging::targets;
use tether_core::{
    AttemptEvent, AttemptGate, ChannelError, ConnectionState, CurrentAttempt, Generation,
    Supervisor, TrackedGate,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::transport::TungsteniteConnector;

/// A request for the supervisor task.
#[derive(Debug)]
pub(crate) enum Command {
    /// An event reported by an attempt's adapter.
    Attempt {
        generation: Generation,
        event: AttemptEvent,
    },
    /// An outbound message from the facade.
    Send { message_type: String, data: Value },
    /// A failure detected outside the supervisor.
    Fail(ChannelError),
    /// Stop the task; the sender is acknowledged once everything is closed.
    Shutdown(oneshot::Sender<()>),
}

/// State published by the task after every step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub state: ConnectionState,
    pub generation: Option<Generation>,
}

pub(crate) type SharedSnapshot = Arc<Mutex<Snapshot>>;

/// Gate whose reports are queued as [`Command::Attempt`].
pub(crate) fn gate(
    current: Arc<CurrentAttempt>,
    commands: mpsc::UnboundedSender<Command>,
) -> Arc<dyn AttemptGate> {
    Arc::new(TrackedGate::new(current, move |generation, event| {
        let _ = commands.send(Command::Attempt { generation, event });
    }))
}

/// Interval whose first tick fires one full period from now.
fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run the supervisor until shutdown.
pub(crate) async fn run(
    mut supervisor: Supervisor<TungsteniteConnector>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshot: SharedSnapshot,
) {
    let debug = supervisor.options().debug;
    let mut heartbeat = ticker(supervisor.options().heartbeat_interval);
    let mut reconnect = ticker(supervisor.options().reconnect_interval);
    publish(&supervisor, &snapshot);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Attempt { generation, event }) => {
                    supervisor.handle_event(generation, event);
                }
                Some(Command::Send { message_type, data }) => {
                    supervisor.send(&message_type, data);
                }
                Some(Command::Fail(error)) => {
                    supervisor.fail(error);
                }
                Some(Command::Shutdown(done)) => {
                    supervisor.shutdown();
                    publish(&supervisor, &snapshot);
                    let _ = done.send(());
                    break;
                }
                None => {
                    supervisor.shutdown();
                    publish(&supervisor, &snapshot);
                    break;
                }
            },

            _ = heartbeat.tick() => {
                if debug {
                    tracing::debug!(target: targets::RUNTIME, "heartbeat tick");
                }
                supervisor.heartbeat_tick();
            }

            _ = reconnect.tick() => {
                supervisor.reconnect_tick();
            }
        }

        publish(&supervisor, &snapshot);
    }

    if debug {
        tracing::debug!(target: targets::RUNTIME, "supervisor task stopped");
    }
}

fn publish(supervisor: &Supervisor<TungsteniteConnector>, snapshot: &SharedSnapshot) {
    *snapshot.lock() = Snapshot {
        state: supervisor.state(),
        generation: supervisor.generation(),
    };
}
