//! BLE client for Alpicool / Brass Monkey compressor fridges.
//!
//! The fridge exposes a vendor-specific GATT service with a command (write)
//! characteristic and a notify characteristic. Commands are framed and
//! written to the command characteristic; every reply arrives as a
//! notification and is matched to its command by the correlator, so a
//! caller can issue a command and await the corresponding reply with a
//! deadline of its choosing.

use std::sync::Arc;

use bluest::{Adapter, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use log::{debug, info, trace, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use crate::correlate::{await_reply, Correlator, Reply};
use crate::error::{FridgeError, TransportError};
use crate::frame;
use crate::fridge_state::FridgeSnapshot;
use crate::monitor::FridgeSession;
use crate::record::Request;

pub struct FridgeClient {
    adapter: Adapter,
    device: Device,
    command: Characteristic,
    correlator: Arc<Correlator>,
    notify_task: JoinHandle<()>,
}

impl FridgeClient {
    const SERVICE_UUID: &'static str = "00001234-0000-1000-8000-00805f9b34fb";
    const COMMAND_UUID: &'static str = "00001235-0000-1000-8000-00805f9b34fb";
    const NOTIFY_UUID: &'static str = "00001236-0000-1000-8000-00805f9b34fb";
    // How long to scan for the fridge before giving up
    const SCAN_TIMEOUT: Duration = Duration::from_secs(30);
    // How many times to immediately retry a failed connect
    const CONNECT_RETRIES: u32 = 2;

    /// Find the fridge with the given address (or advertised name), connect
    /// and subscribe to its notifications.
    pub async fn connect(address: &str) -> Result<Self, FridgeError> {
        let adapter = Adapter::default()
            .await
            .ok_or(TransportError::AdapterUnavailable)?;
        adapter.wait_available().await.map_err(TransportError::from)?;

        let device = timeout(Self::SCAN_TIMEOUT, Self::discover_device(address, &adapter))
            .await
            .map_err(|_| TransportError::DeviceNotFound(address.to_owned()))??;

        info!("fridge {address} found - attempting to connect");
        Self::connect_device(&adapter, &device).await?;

        let (command, notify) = match Self::discover_characteristics(&device).await {
            Ok(pair) => pair,
            Err(err) => {
                let _ = adapter.disconnect_device(&device).await;
                return Err(err);
            }
        };

        let correlator = Arc::new(Correlator::new());
        let notify_task = Self::subscribe(notify, Arc::clone(&correlator)).await?;

        Ok(Self { adapter, device, command, correlator, notify_task })
    }

    /// Set the callback invoked for status records the fridge pushes
    /// without a matching outstanding command.
    pub fn set_status_observer<F>(&self, observer: F)
    where
        F: Fn(&FridgeSnapshot) + Send + 'static,
    {
        self.correlator.set_observer(Box::new(observer));
    }

    /// Send a Bind command and await its response.
    ///
    /// The fridge completes the bind only after its settings button is
    /// pressed, so the deadline should allow for a human.
    pub async fn bind(&self, deadline: Duration) -> Result<u8, FridgeError> {
        match self.issue(&Request::Bind, deadline).await? {
            Reply::Bound(value) => Ok(value),
            _ => Err(FridgeError::ProtocolViolation(Request::Bind.kind() as u8)),
        }
    }

    /// Send a Query command and await the status response.
    pub async fn query(&self, deadline: Duration) -> Result<FridgeSnapshot, FridgeError> {
        self.status_command(Request::Query, deadline).await
    }

    /// Send a Set command carrying the desired settings and await the
    /// resulting status.
    pub async fn set(
        &self,
        settings: &FridgeSnapshot,
        deadline: Duration,
    ) -> Result<FridgeSnapshot, FridgeError> {
        self.status_command(Request::Set(settings.clone()), deadline).await
    }

    /// Send a Reset command and await the resulting status.
    pub async fn reset(&self, deadline: Duration) -> Result<FridgeSnapshot, FridgeError> {
        self.status_command(Request::Reset, deadline).await
    }

    /// Set compartment 1's target temperature, returning the acknowledged
    /// value.
    pub async fn set_unit1_target(
        &self,
        target: i8,
        deadline: Duration,
    ) -> Result<i8, FridgeError> {
        self.target_command(Request::SetUnit1Target(target), deadline).await
    }

    /// Set compartment 2's target temperature, returning the acknowledged
    /// value.
    pub async fn set_unit2_target(
        &self,
        target: i8,
        deadline: Duration,
    ) -> Result<i8, FridgeError> {
        self.target_command(Request::SetUnit2Target(target), deadline).await
    }

    /// Disconnect from the fridge.
    pub async fn stop(self) -> Result<(), FridgeError> {
        self.notify_task.abort();
        self.adapter
            .disconnect_device(&self.device)
            .await
            .map_err(TransportError::from)?;
        Ok(())
    }

    async fn status_command(
        &self,
        request: Request,
        deadline: Duration,
    ) -> Result<FridgeSnapshot, FridgeError> {
        match self.issue(&request, deadline).await? {
            Reply::Status(snapshot) => Ok(snapshot),
            _ => Err(FridgeError::ProtocolViolation(request.kind() as u8)),
        }
    }

    async fn target_command(
        &self,
        request: Request,
        deadline: Duration,
    ) -> Result<i8, FridgeError> {
        match self.issue(&request, deadline).await? {
            Reply::TargetAck(value) => Ok(value),
            _ => Err(FridgeError::ProtocolViolation(request.kind() as u8)),
        }
    }

    /// Write a framed command and await the correlated reply.
    ///
    /// Timing out here does not revoke the write: if the fridge replies
    /// late, the reply is unsolicited by then and gets dropped.
    async fn issue(&self, request: &Request, deadline: Duration) -> Result<Reply, FridgeError> {
        let reply = self.correlator.register(request.kind());
        let pkt = frame::encode(&request.encode());
        trace!("send: {}", hex::encode(&pkt));
        self.command.write(&pkt).await.map_err(TransportError::Write)?;
        await_reply(reply, deadline).await
    }

    async fn discover_device(address: &str, adapter: &Adapter) -> Result<Device, FridgeError> {
        let required_services = [Self::service_uuid()];
        let mut scan = adapter
            .scan(&required_services)
            .await
            .map_err(TransportError::from)?;

        while let Some(found) = scan.next().await {
            let name = found.device.name_async().await.unwrap_or_default();
            if name.eq_ignore_ascii_case(address)
                || found.device.id().to_string().eq_ignore_ascii_case(address)
            {
                return Ok(found.device);
            }
        }

        Err(TransportError::DeviceNotFound(address.to_owned()).into())
    }

    async fn connect_device(adapter: &Adapter, device: &Device) -> Result<(), FridgeError> {
        let mut retries = Self::CONNECT_RETRIES;
        loop {
            match adapter.connect_device(device).await {
                Ok(()) => return Ok(()),
                Err(err) if retries > 0 => {
                    info!("retrying after connect failed: {err}");
                    retries -= 1;
                }
                Err(err) => return Err(TransportError::Connect(err).into()),
            }
        }
    }

    async fn discover_characteristics(
        device: &Device,
    ) -> Result<(Characteristic, Characteristic), FridgeError> {
        let mut command = None;
        let mut notify = None;

        for service in device.discover_services().await.map_err(TransportError::from)? {
            if !uuid_matches(service.uuid(), Self::service_uuid()) {
                continue;
            }
            for characteristic in service
                .discover_characteristics()
                .await
                .map_err(TransportError::from)?
            {
                let uuid = characteristic.uuid();
                if uuid_matches(uuid, Self::command_uuid()) {
                    command = Some(characteristic);
                } else if uuid_matches(uuid, Self::notify_uuid()) {
                    notify = Some(characteristic);
                }
            }
        }

        match (command, notify) {
            (Some(command), Some(notify)) => Ok((command, notify)),
            _ => Err(TransportError::CharacteristicMissing.into()),
        }
    }

    /// Subscribe to the notify characteristic, feeding every notification
    /// through the correlator from a background task.
    async fn subscribe(
        notify: Characteristic,
        correlator: Arc<Correlator>,
    ) -> Result<JoinHandle<()>, FridgeError> {
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut notifications = match notify.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            while let Some(event) = notifications.next().await {
                match event {
                    Ok(pkt) => {
                        trace!("recv: {}", hex::encode(&pkt));
                        correlator.handle_frame(&pkt);
                    }
                    Err(err) => warn!("notification error: {err}"),
                }
            }

            debug!("notification stream ended");
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(task),
            Ok(Err(err)) => Err(TransportError::Subscribe(err.to_string()).into()),
            Err(_) => Err(TransportError::Subscribe("notification task exited".into()).into()),
        }
    }

    fn service_uuid() -> Uuid {
        Uuid::parse_str(Self::SERVICE_UUID).unwrap()
    }

    fn command_uuid() -> Uuid {
        Uuid::parse_str(Self::COMMAND_UUID).unwrap()
    }

    fn notify_uuid() -> Uuid {
        Uuid::parse_str(Self::NOTIFY_UUID).unwrap()
    }
}

impl FridgeSession for FridgeClient {
    async fn bind(&mut self, deadline: Duration) -> Result<u8, FridgeError> {
        FridgeClient::bind(self, deadline).await
    }

    async fn query(&mut self, deadline: Duration) -> Result<FridgeSnapshot, FridgeError> {
        FridgeClient::query(self, deadline).await
    }
}

/// Whether a discovered UUID names the given assigned identifier.
///
/// Stacks differ in how they normalize 16-bit identifiers: most expand them
/// with the Bluetooth base UUID, some report them with a zeroed suffix.
fn uuid_matches(candidate: Uuid, full: Uuid) -> bool {
    candidate == full
        || (candidate.as_fields().0 == full.as_fields().0
            && candidate.as_u128() & ((1u128 << 96) - 1) == 0)
}

#[test]
fn test_uuid_matches_both_forms() {
    let full = Uuid::parse_str("00001234-0000-1000-8000-00805f9b34fb").unwrap();
    let short = Uuid::parse_str("00001234-0000-0000-0000-000000000000").unwrap();
    let other = Uuid::parse_str("00004321-0000-1000-8000-00805f9b34fb").unwrap();

    assert!(uuid_matches(full, full));
    assert!(uuid_matches(short, full));
    assert!(!uuid_matches(other, full));
}
