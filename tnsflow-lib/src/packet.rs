use crate::conversation::ConversationKey;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Which way an application-layer packet travels within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Direction {
    /// Client request toward the database listener port
    #[strum(to_string = "app->db")]
    ToDatabase,
    /// Server response back to the application
    #[strum(to_string = "db->app")]
    FromDatabase,
}

/// Statement attribution of one classified packet.
///
/// Replaces the sentinel strings of earlier tooling ("_", "SQL_END")
/// with a variant per state, so segmentation never compares text to
/// decide control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlPayload {
    /// Intermediate packet with no statement attached; still recorded
    /// for packet-count and timing bookkeeping
    NoStatement,
    /// Server marked the end of a fetch (ORA-01403)
    EndOfFetch,
    /// A fresh or reused statement travels in this packet
    Statement { text: String, fingerprint: String },
}

impl SqlPayload {
    pub fn is_statement(&self) -> bool {
        matches!(self, SqlPayload::Statement { .. })
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            SqlPayload::Statement { fingerprint, .. } => Some(fingerprint),
            _ => None,
        }
    }
}

/// One classified application-layer packet.
#[derive(Debug, Clone)]
pub struct PacketRecord {
    pub conversation: ConversationKey,
    pub direction: Direction,
    pub sql: SqlPayload,
    pub payload: Bytes,
    pub seq: u32,
    pub ack: u32,
    /// Capture timestamp, nanoseconds since epoch
    pub timestamp_ns: i64,
    /// Set when this packet re-executed an already-open cursor
    pub reused_cursor: bool,
    /// `timestamp - previous packet in conversation`; only meaningful on
    /// response packets, 0 otherwise. Negative values are ordering
    /// violations and are reported at ingestion, never trusted.
    pub rtt_ns: i64,
}
