use crate::capture::Frame;
use crate::packet::{Direction, PacketRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::debug;

/// Identifies one TCP client/server pairing: `dbIP:dbPort<->appIP:appPort`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(db_ip: Ipv4Addr, db_port: u16, app_ip: Ipv4Addr, app_port: u16) -> Self {
        ConversationKey(format!("{db_ip}:{db_port}<->{app_ip}:{app_port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame with its database/application sides resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFrame {
    pub key: ConversationKey,
    pub direction: Direction,
    pub db_ip: Ipv4Addr,
}

/// Decide which endpoint of a frame is the database.
///
/// Whichever side matches a configured database IP is "database", the
/// other is "application". A frame matching no configured IP is not
/// dissected further: the caller skips it and counts a classification
/// failure instead of reusing endpoints from an earlier frame.
pub fn classify(frame: &Frame, db_ips: &[Ipv4Addr], db_port: u16) -> Option<ClassifiedFrame> {
    let (db_ip, db_p, app_ip, app_p) = if db_ips.contains(&frame.src_ip) {
        (frame.src_ip, frame.src_port, frame.dst_ip, frame.dst_port)
    } else if db_ips.contains(&frame.dst_ip) {
        (frame.dst_ip, frame.dst_port, frame.src_ip, frame.src_port)
    } else {
        return None;
    };

    let direction = if frame.dst_port == db_port {
        Direction::ToDatabase
    } else {
        Direction::FromDatabase
    };

    Some(ClassifiedFrame {
        key: ConversationKey::new(db_ip, db_p, app_ip, app_p),
        direction,
        db_ip,
    })
}

/// Per-conversation ordered packet log. Append-only during ingestion,
/// read-only during segmentation; packets keep arrival order.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<ConversationKey, Vec<PacketRecord>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: PacketRecord) {
        self.conversations
            .entry(record.conversation.clone())
            .or_default()
            .push(record);
    }

    /// Timestamp of the most recent packet in a conversation, if any.
    pub fn last_timestamp(&self, key: &ConversationKey) -> Option<i64> {
        self.conversations
            .get(key)
            .and_then(|packets| packets.last())
            .map(|p| p.timestamp_ns)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConversationKey, &[PacketRecord])> {
        self.conversations.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

/// Cursor slot to SQL text mapping, reconstructed from observed traffic.
///
/// Populated from responses (fetch completion, DML acknowledgment),
/// consumed by requests that re-execute an open cursor. Slots are
/// recycled by the server, so entries are overwritten, never removed.
#[derive(Debug, Default)]
pub struct CursorSlotTable {
    slots: HashMap<(ConversationKey, u8), String>,
}

impl CursorSlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, key: &ConversationKey, slot: u8, sql: String) {
        debug!(conversation = %key, slot, "storing cursor slot");
        self.slots.insert((key.clone(), slot), sql);
    }

    pub fn lookup(&self, key: &ConversationKey, slot: u8) -> Option<&str> {
        self.slots.get(&(key.clone(), slot)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(src: [u8; 4], sp: u16, dst: [u8; 4], dp: u16) -> Frame {
        Frame {
            src_ip: src.into(),
            dst_ip: dst.into(),
            src_port: sp,
            dst_port: dp,
            seq: 1,
            ack: 0,
            timestamp_ns: 0,
            payload: Bytes::new(),
        }
    }

    #[test]
    fn database_found_in_destination() {
        let db: Ipv4Addr = [10, 0, 0, 5].into();
        let classified = classify(&frame([192, 168, 1, 7], 40001, [10, 0, 0, 5], 1521), &[db], 1521)
            .expect("frame should classify");
        assert_eq!(classified.key.as_str(), "10.0.0.5:1521<->192.168.1.7:40001");
        assert_eq!(classified.direction, Direction::ToDatabase);
        assert_eq!(classified.db_ip, db);
    }

    #[test]
    fn database_found_in_source() {
        let db: Ipv4Addr = [10, 0, 0, 5].into();
        let classified = classify(&frame([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001), &[db], 1521)
            .expect("frame should classify");
        // same key regardless of direction
        assert_eq!(classified.key.as_str(), "10.0.0.5:1521<->192.168.1.7:40001");
        assert_eq!(classified.direction, Direction::FromDatabase);
    }

    #[test]
    fn unmatched_frame_is_skipped() {
        let db: Ipv4Addr = [10, 0, 0, 5].into();
        assert!(classify(&frame([172, 16, 0, 1], 5000, [172, 16, 0, 2], 5001), &[db], 1521).is_none());
    }

    #[test]
    fn slot_entries_are_overwritten() {
        let db: Ipv4Addr = [10, 0, 0, 5].into();
        let key = classify(&frame([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001), &[db], 1521)
            .expect("frame should classify")
            .key;
        let mut table = CursorSlotTable::new();
        table.store(&key, 3, "SELECT 1".to_string());
        table.store(&key, 3, "SELECT 2".to_string());
        assert_eq!(table.lookup(&key, 3), Some("SELECT 2"));
        assert_eq!(table.lookup(&key, 4), None);
    }
}
