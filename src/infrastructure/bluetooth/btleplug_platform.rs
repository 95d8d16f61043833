//! btleplug platform adapter
//!
//! Implements [`BlePlatform`] on top of the host Bluetooth stack. Requests
//! are queued to a single worker task so they hit the adapter in the order
//! the session issued them; a second task watches central events for
//! advertisements and link loss.
//!
//! Each connect request is answered by exactly one link-down, whether the
//! link is lost, torn down on request or never came up.

use crate::domain::models::{Advertisement, DeviceId};
use crate::domain::settings::GattSettings;
use crate::infrastructure::bluetooth::platform::{BlePlatform, PlatformEvents};
use anyhow::{anyhow, Context, Result};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Op {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    Write(DeviceId, Vec<u8>),
}

struct Link {
    id: DeviceId,
    peripheral: Peripheral,
    command: Characteristic,
}

#[derive(Default)]
struct Shared {
    scanning: AtomicBool,
    known: Mutex<HashMap<DeviceId, PeripheralId>>,
    /// Device of the last connect request whose link-down is still owed
    requested: Mutex<Option<DeviceId>>,
    link: tokio::sync::Mutex<Option<Link>>,
}

impl Shared {
    fn remember(&self, id: DeviceId, peripheral: PeripheralId) {
        if let Ok(mut known) = self.known.lock() {
            known.insert(id, peripheral);
        }
    }

    fn lookup(&self, id: &DeviceId) -> Option<PeripheralId> {
        self.known.lock().ok()?.get(id).cloned()
    }

    fn request(&self, id: &DeviceId) {
        if let Ok(mut requested) = self.requested.lock() {
            *requested = Some(id.clone());
        }
    }

    /// True once per connect request: the caller reports the link-down
    fn settle(&self, id: &DeviceId) -> bool {
        match self.requested.lock() {
            Ok(mut requested) if requested.as_ref() == Some(id) => {
                *requested = None;
                true
            }
            _ => false,
        }
    }
}

pub struct BtleplugPlatform {
    ops: mpsc::UnboundedSender<Op>,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl BtleplugPlatform {
    /// Use the first adapter the host reports
    pub async fn with_default_adapter(events: PlatformEvents, gatt: GattSettings) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        Ok(Self::new(adapter, events, gatt))
    }

    /// Must be called inside a tokio runtime
    pub fn new(adapter: Adapter, events: PlatformEvents, gatt: GattSettings) -> Self {
        let shared = Arc::new(Shared::default());
        let (ops, ops_rx) = mpsc::unbounded_channel();

        let monitor = tokio::spawn(monitor(adapter.clone(), events.clone(), shared.clone()));
        let worker = tokio::spawn(worker(adapter, events, gatt, shared.clone(), ops_rx));

        Self {
            ops,
            shared,
            tasks: vec![monitor, worker],
        }
    }

    fn queue(&self, op: Op) {
        if self.ops.send(op).is_err() {
            warn!("BLE worker stopped, request dropped");
        }
    }
}

impl BlePlatform for BtleplugPlatform {
    fn start_scan(&mut self) {
        self.shared.scanning.store(true, Ordering::SeqCst);
        self.queue(Op::StartScan);
    }

    fn stop_scan(&mut self) {
        self.shared.scanning.store(false, Ordering::SeqCst);
        self.queue(Op::StopScan);
    }

    fn connect(&mut self, device: &DeviceId) {
        self.queue(Op::Connect(device.clone()));
    }

    fn disconnect(&mut self, device: &DeviceId) {
        self.queue(Op::Disconnect(device.clone()));
    }

    fn write(&mut self, device: &DeviceId, payload: &[u8]) {
        self.queue(Op::Write(device.clone(), payload.to_vec()));
    }
}

impl Drop for BtleplugPlatform {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn worker(
    adapter: Adapter,
    events: PlatformEvents,
    gatt: GattSettings,
    shared: Arc<Shared>,
    mut ops: mpsc::UnboundedReceiver<Op>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            Op::StartScan => {
                if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                    events.platform_error(format!("scan failed: {}", e));
                }
            }
            Op::StopScan => {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("Failed to stop scan cleanly: {}", e);
                }
            }
            Op::Connect(id) => {
                shared.request(&id);
                match open_link(&adapter, &gatt, &shared, &id).await {
                    Ok(link) => {
                        *shared.link.lock().await = Some(link);
                        events.link_up();
                    }
                    Err(e) => {
                        events.platform_error(format!("connect to {} failed: {:#}", id, e))
                    }
                }
            }
            Op::Disconnect(id) => {
                let link = {
                    let mut guard = shared.link.lock().await;
                    match guard.as_ref() {
                        Some(link) if link.id == id => guard.take(),
                        _ => None,
                    }
                };
                if let Some(link) = link {
                    if let Err(e) = link.peripheral.disconnect().await {
                        warn!("Disconnect from {} failed, dropping the link: {}", id, e);
                    }
                }
                if shared.settle(&id) {
                    events.link_down();
                }
            }
            Op::Write(id, payload) => {
                let guard = shared.link.lock().await;
                let Some(link) = guard.as_ref().filter(|link| link.id == id) else {
                    events.write_failed(format!("no link to {}", id));
                    continue;
                };
                match link
                    .peripheral
                    .write(&link.command, &payload, WriteType::WithResponse)
                    .await
                {
                    Ok(()) => events.write_confirmed(),
                    Err(e) => events.write_failed(e.to_string()),
                }
            }
        }
    }
}

async fn open_link(
    adapter: &Adapter,
    gatt: &GattSettings,
    shared: &Shared,
    id: &DeviceId,
) -> Result<Link> {
    let peripheral_id = shared
        .lookup(id)
        .ok_or_else(|| anyhow!("device was never advertised"))?;
    let peripheral = adapter.peripheral(&peripheral_id).await?;

    info!("Connecting to Bluetooth device: {}", id);
    peripheral.connect().await.context("connect")?;
    peripheral
        .discover_services()
        .await
        .context("service discovery")?;

    let command = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == gatt.command_char_uuid && c.service_uuid == gatt.service_uuid)
        .ok_or_else(|| anyhow!("Command characteristic not found"))?;
    info!("Found command characteristic");

    Ok(Link {
        id: id.clone(),
        peripheral,
        command,
    })
}

async fn monitor(adapter: Adapter, events: PlatformEvents, shared: Arc<Shared>) {
    let mut stream = match adapter.events().await {
        Ok(stream) => stream,
        Err(e) => {
            events.platform_error(format!("adapter events unavailable: {}", e));
            return;
        }
    };

    while let Some(event) = stream.next().await {
        match event {
            CentralEvent::DeviceDiscovered(peripheral_id)
            | CentralEvent::DeviceUpdated(peripheral_id) => {
                if !shared.scanning.load(Ordering::SeqCst) {
                    continue;
                }
                let Ok(peripheral) = adapter.peripheral(&peripheral_id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                let id = DeviceId::new(peripheral_id.to_string());
                shared.remember(id.clone(), peripheral_id);
                events.advertisement(Advertisement {
                    id,
                    local_name: properties.local_name,
                    rssi: properties.rssi,
                });
            }
            CentralEvent::DeviceDisconnected(peripheral_id) => {
                let id = DeviceId::new(peripheral_id.to_string());
                let mut link = shared.link.lock().await;
                if link.as_ref().is_some_and(|l| l.id == id) {
                    *link = None;
                    if shared.settle(&id) {
                        events.link_down();
                    }
                }
            }
            _ => {}
        }
    }
}
