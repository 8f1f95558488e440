//! The coordinator's background loops
//!
//! Each loop walks a snapshot of the device set, then waits for its cadence
//! or for cancellation, whichever comes first. The polling and reporting
//! loops skip a device whose slot is busy: the device is being attached,
//! restarted or closed and will be visited next round.

use std::sync::Arc;

use crate::device::{ConnectionState, PollOutcome, StreamPacket};

use super::device_set::DeviceEntry;
use super::manager::Shared;
use super::phase::{CoordinatorPhase, DeviceEvent};

/// Forward device info and stats to the agent
pub(crate) async fn reporting_loop(shared: Arc<Shared>) {
    tracing::debug!("Reporting loop started");

    loop {
        for entry in shared.devices.snapshot() {
            if shared.cancel.is_cancelled() {
                break;
            }
            report_device(&shared, &entry).await;
        }

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.config.report_interval) => {}
        }
    }

    tracing::debug!("Reporting loop stopped");
}

async fn report_device(shared: &Shared, entry: &DeviceEntry) {
    let (info, stats) = {
        let Ok(slot) = entry.slot().try_lock() else {
            return;
        };
        let Some(handle) = slot.as_ref().filter(|h| h.is_connected()) else {
            return;
        };
        (handle.info_report().await, handle.stats_report().await)
    };

    let agent = shared.ctx.agent();

    match info {
        Ok(info) => match agent.publish_device_info(&info).await {
            Ok(()) => shared.stats.record_report(true),
            Err(e) => {
                shared.stats.record_report(false);
                tracing::debug!(mxid = %entry.mxid(), error = %e, "Failed to publish device info");
            }
        },
        Err(e) => {
            shared.stats.record_report(false);
            tracing::debug!(mxid = %entry.mxid(), error = %e, "Could not get device info");
        }
    }

    match stats {
        Ok(stats) => match agent.publish_device_stats(&stats).await {
            Ok(()) => shared.stats.record_report(true),
            Err(e) => {
                shared.stats.record_report(false);
                tracing::debug!(mxid = %entry.mxid(), error = %e, "Failed to publish device stats");
            }
        },
        Err(e) => {
            shared.stats.record_report(false);
            tracing::debug!(mxid = %entry.mxid(), error = %e, "Could not get device stats");
        }
    }
}

/// Pull data from connected devices and feed the live views
pub(crate) async fn polling_loop(shared: Arc<Shared>) {
    tracing::debug!("Polling loop started");

    loop {
        for entry in shared.devices.snapshot() {
            if shared.cancel.is_cancelled() {
                break;
            }
            poll_device(&shared, &entry).await;
        }
        shared.stats.record_poll_round();

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.config.poll_interval) => {}
        }
    }

    tracing::debug!("Polling loop stopped");
}

async fn poll_device(shared: &Shared, entry: &DeviceEntry) {
    let Ok(mut slot) = entry.slot().try_lock() else {
        return;
    };
    let Some(handle) = slot.as_mut() else {
        return;
    };

    let outcome = handle.poll().await;
    match outcome {
        PollOutcome::Data(packets) => {
            drop(slot);
            route_packets(shared, packets).await;
        }
        PollOutcome::Disconnected => {
            // Demote: drop the session, keep the device
            slot.take();
            entry.set_state(ConnectionState::Disconnected);
            drop(slot);

            shared.stats.record_disconnect();
            tracing::info!(mxid = %entry.mxid(), "Device disconnected");
            shared.emit(DeviceEvent::Disconnected {
                mxid: entry.mxid().to_string(),
            });
        }
    }
}

async fn route_packets(shared: &Shared, packets: Vec<StreamPacket>) {
    for packet in packets {
        match shared.ctx.live_views().get_by_key(&packet.unique_key) {
            Some(view) => {
                view.on_frame(packet.frame).await;
                shared.stats.record_routed(1);
            }
            None => {
                shared.stats.record_dropped();
                tracing::trace!(unique_key = %packet.unique_key, "No live view for packet");
            }
        }
    }
}

/// Reattach disconnected devices while running
pub(crate) async fn connection_loop(shared: Arc<Shared>) {
    tracing::debug!("Connection loop started");

    loop {
        let changed = shared.devices_changed.notified();

        if shared.phase() == CoordinatorPhase::Running
            && shared.devices.connected_count() < shared.devices.len()
        {
            reattach_disconnected(&shared).await;
        }

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = changed => {}
            _ = tokio::time::sleep(shared.config.connect_interval) => {}
        }
    }

    tracing::debug!("Connection loop stopped");
}

async fn reattach_disconnected(shared: &Shared) {
    for entry in shared.devices.snapshot() {
        if shared.cancel.is_cancelled() {
            return;
        }
        if entry.state() != ConnectionState::Disconnected {
            continue;
        }

        match shared.attach_bounded(&entry).await {
            Ok(true) => {
                shared.stats.record_reattachment();
                tracing::info!(mxid = %entry.mxid(), "Device reattached");
            }
            Ok(false) => {}
            Err(e) => {
                if shared.cancel.is_cancelled() {
                    return;
                }
                shared.stats.record_failed_attach();
                tracing::debug!(mxid = %entry.mxid(), error = %e, "Reattach failed");
            }
        }
    }
}
