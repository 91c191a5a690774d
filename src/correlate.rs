//! Matches outbound commands to their asynchronous replies.
//!
//! The protocol has no request identifiers: a reply is matched to a pending
//! command purely by the command code it carries. The table therefore holds
//! at most one waiter per command kind, and issuing the same kind again
//! replaces the earlier waiter (last write wins).
//!
//! Inbound frames that match no waiter are unsolicited. Unsolicited Query
//! status records go to the registered status observer; everything else
//! unsolicited is logged and dropped. A malformed frame never stops the
//! notification loop: it is only reported as an error to a waiter that was
//! actively expecting that command kind.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

use crate::error::FridgeError;
use crate::frame;
use crate::fridge_state::FridgeSnapshot;
use crate::record::{self, CommandKind};

/// A decoded reply to one command.
#[derive(Debug, PartialEq)]
pub(crate) enum Reply {
    /// Bind result byte.
    Bound(u8),
    /// Full status record, carried by Query, Set and Reset replies.
    Status(FridgeSnapshot),
    /// Acknowledged target temperature.
    TargetAck(i8),
}

type ReplyResult = Result<Reply, FridgeError>;
type StatusObserver = Box<dyn Fn(&FridgeSnapshot) + Send>;

pub(crate) struct Correlator {
    waiters: Mutex<HashMap<CommandKind, oneshot::Sender<ReplyResult>>>,
    observer: Mutex<Option<StatusObserver>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            observer: Mutex::new(None),
        }
    }

    /// Register interest in the next reply of the given kind.
    pub fn register(&self, kind: CommandKind) -> oneshot::Receiver<ReplyResult> {
        let (tx, rx) = oneshot::channel();
        if self.waiters.lock().unwrap().insert(kind, tx).is_some() {
            debug!("replaced pending {kind:?} waiter");
        }
        rx
    }

    /// Set the callback invoked for unsolicited Query status records.
    pub fn set_observer(&self, observer: StatusObserver) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    /// Feed one raw notification frame through decode and dispatch.
    pub fn handle_frame(&self, raw: &[u8]) {
        let payload = match frame::decode(raw) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("dropping bad frame: {err}: {}", hex::encode(raw));
                return;
            }
        };

        if payload.len() < 2 {
            warn!("dropping undersized reply: {}", hex::encode(payload));
            return;
        }

        let Some(kind) = CommandKind::from_code(payload[0]) else {
            warn!("{}", FridgeError::ProtocolViolation(payload[0]));
            return;
        };

        let result: ReplyResult = match kind {
            CommandKind::Bind => Ok(Reply::Bound(payload[1])),
            CommandKind::Query | CommandKind::Set | CommandKind::Reset => {
                record::decode_status(&payload[1..])
                    .map(Reply::Status)
                    .map_err(FridgeError::from)
            }
            CommandKind::SetUnit1Target | CommandKind::SetUnit2Target => {
                Ok(Reply::TargetAck(payload[1] as i8))
            }
        };

        let waiter = self.waiters.lock().unwrap().remove(&kind);
        match (waiter, result) {
            (Some(tx), result) => {
                // A send error means the caller already gave up waiting; a
                // stale reply is simply dropped.
                if tx.send(result).is_err() {
                    debug!("discarding stale {kind:?} reply");
                }
            }
            (None, Ok(Reply::Status(snapshot))) if kind == CommandKind::Query => {
                if let Some(observer) = self.observer.lock().unwrap().as_ref() {
                    observer(&snapshot);
                }
            }
            (None, Err(err)) => warn!("dropping undecodable {kind:?} reply: {err}"),
            (None, _) => debug!("dropping unsolicited {kind:?} reply"),
        }
    }
}

/// Await a registered waiter, bounded by the caller's deadline.
///
/// A waiter replaced by a newer command of the same kind observes its
/// channel closing and reports `Timeout` as well; nothing else can resolve
/// it once its sender is gone.
pub(crate) async fn await_reply(
    rx: oneshot::Receiver<ReplyResult>,
    deadline: Duration,
) -> ReplyResult {
    match timeout(deadline, rx).await {
        Err(_) => Err(FridgeError::Timeout),
        Ok(Err(_)) => Err(FridgeError::Timeout),
        Ok(Ok(result)) => result,
    }
}

#[cfg(test)]
fn query_reply_frame() -> Vec<u8> {
    let mut payload = vec![CommandKind::Query as u8];
    payload.extend_from_slice(&record::sample_status_payload());
    frame::encode(&payload)
}

#[tokio::test]
async fn test_correlates_query_reply() {
    let correlator = Correlator::new();
    let rx = correlator.register(CommandKind::Query);

    correlator.handle_frame(&query_reply_frame());

    let reply = rx.await.unwrap().unwrap();
    assert_eq!(
        reply,
        Reply::Status(crate::fridge_state::sample_snapshot())
    );
}

#[tokio::test]
async fn test_correlates_bind_reply() {
    let correlator = Correlator::new();
    let rx = correlator.register(CommandKind::Bind);

    correlator.handle_frame(&frame::encode(&[CommandKind::Bind as u8, 0x01]));

    assert_eq!(rx.await.unwrap().unwrap(), Reply::Bound(1));
}

#[tokio::test]
async fn test_unsolicited_status_goes_to_observer() {
    let correlator = Correlator::new();
    let (tx, rx) = std::sync::mpsc::channel();
    correlator.set_observer(Box::new(move |snapshot| {
        tx.send(snapshot.clone()).unwrap();
    }));

    correlator.handle_frame(&query_reply_frame());

    assert_eq!(rx.try_recv().unwrap(), crate::fridge_state::sample_snapshot());
}

#[tokio::test]
async fn test_decode_error_surfaces_to_waiter() {
    let correlator = Correlator::new();
    let rx = correlator.register(CommandKind::Query);

    // Well-framed, but the status record is truncated.
    correlator.handle_frame(&frame::encode(&[CommandKind::Query as u8, 0x00, 0x00]));

    let result = rx.await.unwrap();
    assert!(matches!(
        result,
        Err(FridgeError::Record(crate::record::RecordError::TooShort(2)))
    ));
}

#[tokio::test]
async fn test_bad_frame_leaves_waiter_pending() {
    let correlator = Correlator::new();
    let mut rx = correlator.register(CommandKind::Query);

    correlator.handle_frame(&[0x00]);
    correlator.handle_frame(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

    assert!(matches!(
        rx.try_recv(),
        Err(oneshot::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_replaced_waiter_times_out() {
    let correlator = Correlator::new();
    let first = correlator.register(CommandKind::Query);
    let _second = correlator.register(CommandKind::Query);

    let result = await_reply(first, Duration::from_millis(10)).await;
    assert!(matches!(result, Err(FridgeError::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_bind_times_out() {
    let correlator = Correlator::new();
    let rx = correlator.register(CommandKind::Bind);

    let result = await_reply(rx, Duration::from_secs(30)).await;
    assert!(matches!(result, Err(FridgeError::Timeout)));
}
