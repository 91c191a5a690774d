//! The connect / bind / poll cycle and its online-offline bookkeeping.
//!
//! The monitor queries the fridge at a fixed interval and turns the raw
//! poll outcomes into a deduplicated event stream: one `Online` per
//! unreachable-to-reachable transition, one `Offline` per transition back,
//! and a `StateChanged` only when the status actually differs from the last
//! known one. A final `Offline` is always published on the way out, even
//! when the cycle is cancelled mid-poll.

use std::future::Future;

use log::{debug, info};
use tokio::time::{sleep, Duration};

use crate::error::FridgeError;
use crate::fridge_state::FridgeSnapshot;

/// How long to wait for the settings-button press that completes a bind.
pub const BIND_DEADLINE: Duration = Duration::from_secs(30);
/// How long to wait for a status reply before treating the fridge as
/// unreachable.
pub const QUERY_DEADLINE: Duration = Duration::from_secs(5);

/// The fridge operations the monitor drives, separated out so the cycle can
/// be exercised without a radio.
#[allow(async_fn_in_trait)]
pub trait FridgeSession {
    async fn bind(&mut self, deadline: Duration) -> Result<u8, FridgeError>;
    async fn query(&mut self, deadline: Duration) -> Result<FridgeSnapshot, FridgeError>;
}

/// A monitoring event for one fridge.
#[derive(Debug, Clone, PartialEq)]
pub enum FridgeEvent {
    Online,
    Offline,
    StateChanged(FridgeSnapshot),
}

/// Receives the deduplicated event stream.
pub trait StatusSink {
    fn publish(&mut self, address: &str, event: FridgeEvent);
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Perform the one-time bind handshake before the first query.
    pub bind: bool,
    /// Keep polling after the initial query.
    pub poll: bool,
    pub poll_interval: Duration,
}

/// Run the monitor cycle until it fails or the shutdown future completes.
///
/// The final `Offline` publication happens on every exit path; releasing
/// the underlying connection is the caller's job since it owns the session.
pub async fn run<S, P, F>(
    session: &mut S,
    sink: &mut P,
    address: &str,
    config: &MonitorConfig,
    shutdown: F,
) -> Result<(), FridgeError>
where
    S: FridgeSession,
    P: StatusSink,
    F: Future<Output = ()>,
{
    let result = tokio::select! {
        result = poll_cycle(session, sink, address, config) => result,
        _ = shutdown => {
            info!("shutting down");
            Ok(())
        }
    };

    sink.publish(address, FridgeEvent::Offline);
    result
}

async fn poll_cycle<S, P>(
    session: &mut S,
    sink: &mut P,
    address: &str,
    config: &MonitorConfig,
) -> Result<(), FridgeError>
where
    S: FridgeSession,
    P: StatusSink,
{
    if config.bind {
        // Binding waits for a physical button press on the fridge and must
        // not silently continue past its deadline.
        session.bind(BIND_DEADLINE).await?;
        info!("fridge {address} bound");
    }

    let mut last_known: Option<FridgeSnapshot> = None;

    match session.query(QUERY_DEADLINE).await {
        Ok(snapshot) => publish_snapshot(sink, address, snapshot, &mut last_known),
        Err(FridgeError::Timeout) => debug!("initial query to {address} timed out"),
        Err(err) => return Err(err),
    }

    while config.poll {
        sleep(config.poll_interval).await;

        match session.query(QUERY_DEADLINE).await {
            Ok(snapshot) => publish_snapshot(sink, address, snapshot, &mut last_known),
            Err(FridgeError::Timeout) => {
                // One Offline per transition; further timeouts stay quiet.
                if last_known.take().is_some() {
                    info!("fridge {address} went offline");
                    sink.publish(address, FridgeEvent::Offline);
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

fn publish_snapshot<P: StatusSink>(
    sink: &mut P,
    address: &str,
    snapshot: FridgeSnapshot,
    last_known: &mut Option<FridgeSnapshot>,
) {
    if last_known.is_none() {
        info!("fridge {address} online");
        sink.publish(address, FridgeEvent::Online);
    }
    if last_known.as_ref() != Some(&snapshot) {
        sink.publish(address, FridgeEvent::StateChanged(snapshot.clone()));
    }
    *last_known = Some(snapshot);
}

#[cfg(test)]
use std::collections::VecDeque;

#[cfg(test)]
use crate::error::TransportError;
#[cfg(test)]
use crate::fridge_state::sample_snapshot;

/// Replays a fixed sequence of query outcomes, then fails the session.
#[cfg(test)]
struct ScriptedSession {
    bind_reply: Result<u8, FridgeError>,
    replies: VecDeque<Result<FridgeSnapshot, FridgeError>>,
}

#[cfg(test)]
impl ScriptedSession {
    fn new(replies: Vec<Result<FridgeSnapshot, FridgeError>>) -> Self {
        Self { bind_reply: Ok(1), replies: replies.into() }
    }
}

#[cfg(test)]
impl FridgeSession for ScriptedSession {
    async fn bind(&mut self, _deadline: Duration) -> Result<u8, FridgeError> {
        std::mem::replace(&mut self.bind_reply, Ok(1))
    }

    async fn query(&mut self, _deadline: Duration) -> Result<FridgeSnapshot, FridgeError> {
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::CharacteristicMissing.into()))
    }
}

#[cfg(test)]
#[derive(Default)]
struct RecordingSink(Vec<FridgeEvent>);

#[cfg(test)]
impl StatusSink for RecordingSink {
    fn publish(&mut self, _address: &str, event: FridgeEvent) {
        self.0.push(event);
    }
}

#[cfg(test)]
fn polling_config() -> MonitorConfig {
    MonitorConfig { bind: false, poll: true, poll_interval: Duration::ZERO }
}

#[tokio::test]
async fn test_poll_cycle_dedups_events() {
    let snapshot = sample_snapshot();
    let mut session = ScriptedSession::new(vec![
        Ok(snapshot.clone()),
        Ok(snapshot.clone()),
        Err(FridgeError::Timeout),
        Err(FridgeError::Timeout),
        Ok(snapshot.clone()),
    ]);
    let mut sink = RecordingSink::default();

    let result = poll_cycle(&mut session, &mut sink, "fridge", &polling_config()).await;

    // The scripted session fails once exhausted, ending the loop.
    assert!(matches!(result, Err(FridgeError::Transport(_))));
    assert_eq!(
        sink.0,
        vec![
            FridgeEvent::Online,
            FridgeEvent::StateChanged(snapshot.clone()),
            FridgeEvent::Offline,
            FridgeEvent::Online,
            FridgeEvent::StateChanged(snapshot),
        ]
    );
}

#[tokio::test]
async fn test_changed_state_published_without_online() {
    let first = sample_snapshot();
    let mut second = first.clone();
    second.powered_on = false;
    let mut session = ScriptedSession::new(vec![Ok(first.clone()), Ok(second.clone())]);
    let mut sink = RecordingSink::default();

    let _ = poll_cycle(&mut session, &mut sink, "fridge", &polling_config()).await;

    assert_eq!(
        sink.0,
        vec![
            FridgeEvent::Online,
            FridgeEvent::StateChanged(first),
            FridgeEvent::StateChanged(second),
        ]
    );
}

#[tokio::test]
async fn test_initial_timeout_then_online() {
    let snapshot = sample_snapshot();
    let mut session =
        ScriptedSession::new(vec![Err(FridgeError::Timeout), Ok(snapshot.clone())]);
    let mut sink = RecordingSink::default();

    let _ = poll_cycle(&mut session, &mut sink, "fridge", &polling_config()).await;

    // No Offline for the unknown initial state, just the fresh Online.
    assert_eq!(
        sink.0,
        vec![FridgeEvent::Online, FridgeEvent::StateChanged(snapshot)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_publishes_final_offline_on_shutdown() {
    let snapshot = sample_snapshot();
    let mut session = ScriptedSession::new(vec![Ok(snapshot.clone())]);
    let mut sink = RecordingSink::default();
    let config = MonitorConfig {
        bind: false,
        poll: true,
        poll_interval: Duration::from_secs(3600),
    };

    let result = run(
        &mut session,
        &mut sink,
        "fridge",
        &config,
        sleep(Duration::from_secs(1)),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        sink.0,
        vec![
            FridgeEvent::Online,
            FridgeEvent::StateChanged(snapshot),
            FridgeEvent::Offline,
        ]
    );
}

#[tokio::test]
async fn test_bind_timeout_is_fatal() {
    let mut session = ScriptedSession::new(vec![]);
    session.bind_reply = Err(FridgeError::Timeout);
    let mut sink = RecordingSink::default();
    let config = MonitorConfig { bind: true, poll: false, poll_interval: Duration::ZERO };

    let result = run(
        &mut session,
        &mut sink,
        "fridge",
        &config,
        std::future::pending(),
    )
    .await;

    assert!(matches!(result, Err(FridgeError::Timeout)));
    // The final Offline is part of the shutdown contract on every exit path.
    assert_eq!(sink.0, vec![FridgeEvent::Offline]);
}

#[tokio::test]
async fn test_single_query_without_polling() {
    let snapshot = sample_snapshot();
    let mut session = ScriptedSession::new(vec![Ok(snapshot.clone())]);
    let mut sink = RecordingSink::default();
    let config = MonitorConfig { bind: false, poll: false, poll_interval: Duration::ZERO };

    let result = run(
        &mut session,
        &mut sink,
        "fridge",
        &config,
        std::future::pending(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        sink.0,
        vec![
            FridgeEvent::Online,
            FridgeEvent::StateChanged(snapshot),
            FridgeEvent::Offline,
        ]
    );
}
