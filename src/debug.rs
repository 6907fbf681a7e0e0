//! Log-gated rendering of records and messages.
//!
//! Nothing here formats anything unless the matching `log` level is enabled:
//! `debug` renders whole messages as pretty JSON, `trace` prints one-line
//! summaries of records.

use crate::protocol::{NetworkEntityRpcMessage, NetworkEntityUpdateMessage, UpdateKind};
use crate::record::ReplicationRecord;
use log::Level;
use serde::Serialize;

fn log_json<T: Serialize>(direction: &str, what: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => log::debug!("{} {}:\n{}", direction, what, json),
        Err(e) => log::debug!("Failed to render {} as JSON: {}", what, e),
    }
}

/// Log an update message as JSON if debug logging is enabled
pub fn log_update(direction: &str, message: &NetworkEntityUpdateMessage) {
    if !log::log_enabled!(Level::Debug) {
        return;
    }
    log_json(direction, &update_summary(message), message);
}

/// Log an RPC message as JSON if debug logging is enabled
pub fn log_rpc(direction: &str, message: &NetworkEntityRpcMessage) {
    if !log::log_enabled!(Level::Debug) {
        return;
    }
    log_json(direction, &rpc_summary(message), message);
}

/// Trace the dirty bits of a record
pub fn log_record(label: &str, record: &ReplicationRecord) {
    if !log::log_enabled!(Level::Trace) {
        return;
    }
    log::trace!("{} record ({} dirty): {}", label, record.dirty_count(), record);
}

/// Format bytes in human-readable format (KB, MB, etc.)
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

pub fn update_summary(message: &NetworkEntityUpdateMessage) -> String {
    let kind = match message.kind {
        UpdateKind::Delta => "Delta",
        UpdateKind::Baseline => "Baseline",
    };
    match &message.prefab_entity_id {
        Some(prefab) => format!(
            "{} update for entity {} as {} from {} ({})",
            kind,
            message.net_entity_id,
            message.role,
            prefab,
            format_bytes(message.data.len())
        ),
        None => format!(
            "{} update for entity {} as {} ({})",
            kind,
            message.net_entity_id,
            message.role,
            format_bytes(message.data.len())
        ),
    }
}

pub fn rpc_summary(message: &NetworkEntityRpcMessage) -> String {
    format!(
        "{:?} RPC {} on component {} of entity {} ({})",
        message.delivery_type,
        message.rpc_index,
        message.component_id,
        message.net_entity_id,
        format_bytes(message.payload.len())
    )
}
