use crate::capture::{CaptureRead, Frame};
use crate::conversation::{ClassifiedFrame, ConversationKey, ConversationStore, CursorSlotTable, classify};
use crate::error::TnsError;
use crate::fingerprint::fingerprint;
use crate::packet::{Direction, PacketRecord, SqlPayload};
use crate::request::{RequestSql, parse_request};
use crate::response::{ResponseSql, parse_response};
use crate::stats::StatsTable;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Configuration the core consumes; sourced from the CLI layer.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub db_ips: Vec<Ipv4Addr>,
    pub db_port: u16,
    /// Stop ingesting once this many frames failed classification,
    /// keeping the statistics gathered so far
    pub classification_failure_limit: Option<u64>,
}

impl SessionConfig {
    /// Parse a database IP list in the capture-filter notation, one or
    /// more addresses separated by the literal token `or`:
    /// `"10.0.0.5 or 10.0.0.6"`.
    pub fn parse_db_ips(spec: &str) -> Result<Vec<Ipv4Addr>, TnsError> {
        let ips = spec
            .split("or")
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<Ipv4Addr>()
                    .map_err(|e| TnsError::Config(format!("invalid database IP {part:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if ips.is_empty() {
            return Err(TnsError::Config("no database IP given".to_string()));
        }
        Ok(ips)
    }
}

/// One analysis run over one capture: owns every piece of mutable state
/// (conversation log, cursor-slot table, statistics), so multiple
/// independent runs can coexist in a process.
///
/// Two sequential phases with a full barrier between them: `ingest` /
/// `ingest_all` stream packets into the conversation store, then
/// `analyze` segments each conversation into flows. Segmentation must
/// not start earlier because slot entries and flow boundaries depend on
/// packets arriving arbitrarily later in the same conversation.
#[derive(Debug)]
pub struct AnalysisSession {
    config: SessionConfig,
    conversations: ConversationStore,
    slots: CursorSlotTable,
    last_sql: HashMap<ConversationKey, String>,
    stats: StatsTable,
    db_bytes: HashMap<Ipv4Addr, u64>,
    first_ts_ns: Option<i64>,
    last_ts_ns: Option<i64>,
    classification_failures: u64,
    ordering_violations: u64,
    counting_errors: u64,
    flows: u64,
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            conversations: ConversationStore::new(),
            slots: CursorSlotTable::new(),
            last_sql: HashMap::new(),
            stats: StatsTable::new(),
            db_bytes: HashMap::new(),
            first_ts_ns: None,
            last_ts_ns: None,
            classification_failures: 0,
            ordering_violations: 0,
            counting_errors: 0,
            flows: 0,
        }
    }

    /// Classify and dissect one frame, appending it to its conversation.
    pub fn ingest(&mut self, frame: &Frame) {
        let Some(classified) = classify(frame, &self.config.db_ips, self.config.db_port) else {
            warn!(src = %frame.src_ip, dst = %frame.dst_ip, "frame matched no database address");
            self.classification_failures += 1;
            return;
        };

        *self.db_bytes.entry(classified.db_ip).or_default() += frame.payload.len() as u64;

        let (sql, reused_cursor) = match classified.direction {
            Direction::ToDatabase => self.dissect_request(&classified, frame),
            Direction::FromDatabase => self.dissect_response(&classified, frame),
        };

        // RTT only exists on responses with a predecessor to measure from
        let rtt_ns = match classified.direction {
            Direction::FromDatabase => self
                .conversations
                .last_timestamp(&classified.key)
                .map_or(0, |prev| frame.timestamp_ns - prev),
            Direction::ToDatabase => 0,
        };
        if rtt_ns < 0 {
            warn!(
                conversation = %classified.key,
                rtt_ns,
                "negative RTT, capture order violates wire order"
            );
            self.ordering_violations += 1;
        }

        if self.first_ts_ns.is_none() {
            self.first_ts_ns = Some(frame.timestamp_ns);
        }
        self.last_ts_ns = Some(frame.timestamp_ns);

        debug!(
            conversation = %classified.key,
            direction = %classified.direction,
            seq = frame.seq,
            rtt_ns,
            "recording packet"
        );
        self.conversations.append(PacketRecord {
            conversation: classified.key,
            direction: classified.direction,
            sql,
            payload: frame.payload.clone(),
            seq: frame.seq,
            ack: frame.ack,
            timestamp_ns: frame.timestamp_ns,
            reused_cursor,
            rtt_ns,
        });
    }

    fn dissect_request(&mut self, classified: &ClassifiedFrame, frame: &Frame) -> (SqlPayload, bool) {
        match parse_request(&frame.payload) {
            RequestSql::Fresh(text) => {
                // becomes the conversation's last issued SQL even when
                // empty, matching how the client fills slots afterwards
                self.last_sql.insert(classified.key.clone(), text.clone());
                if text.is_empty() {
                    (SqlPayload::NoStatement, false)
                } else {
                    let fingerprint = fingerprint(&text);
                    debug!(conversation = %classified.key, %fingerprint, "fresh statement");
                    (SqlPayload::Statement { text, fingerprint }, false)
                }
            }
            RequestSql::Reused { slot } => match self.slots.lookup(&classified.key, slot) {
                Some(text) if !text.is_empty() => {
                    let text = text.to_string();
                    let fingerprint = fingerprint(&text);
                    debug!(conversation = %classified.key, slot, %fingerprint, "reused statement");
                    (SqlPayload::Statement { text, fingerprint }, true)
                }
                _ => {
                    debug!(conversation = %classified.key, slot, "unresolved cursor slot");
                    (SqlPayload::NoStatement, true)
                }
            },
            RequestSql::None => (SqlPayload::NoStatement, false),
        }
    }

    fn dissect_response(&mut self, classified: &ClassifiedFrame, frame: &Frame) -> (SqlPayload, bool) {
        match parse_response(&frame.payload) {
            ResponseSql::EndOfFetch { slot } => {
                if let Some(slot) = slot {
                    let last = self.last_sql.get(&classified.key).cloned().unwrap_or_default();
                    self.slots.store(&classified.key, slot, last);
                }
                (SqlPayload::EndOfFetch, false)
            }
            ResponseSql::DmlAck { slot } => {
                let last = self.last_sql.get(&classified.key).cloned().unwrap_or_default();
                self.slots.store(&classified.key, slot, last);
                (SqlPayload::NoStatement, false)
            }
            ResponseSql::None => (SqlPayload::NoStatement, false),
        }
    }

    /// Ingest a whole capture in file order. Stops early when the
    /// classification-failure limit is exceeded; statistics collected up
    /// to that point remain usable.
    pub fn ingest_all(&mut self, read: &CaptureRead) -> Result<(), TnsError> {
        for frame in &read.frames {
            self.ingest(frame);
            if let Some(limit) = self.config.classification_failure_limit {
                if self.classification_failures > limit {
                    warn!(limit, "stopping ingestion early, keeping partial statistics");
                    return Err(TnsError::MalformedLimitExceeded { limit });
                }
            }
        }
        Ok(())
    }

    /// Second pass: segment every conversation into flows and aggregate.
    /// Call after ingestion is complete; conversations are processed
    /// independently, each in original packet order.
    pub fn analyze(&mut self) {
        for (key, packets) in self.conversations.iter() {
            let outcome = crate::flow::segment_conversation(key, packets, &mut self.stats);
            self.flows += outcome.flows;
            self.counting_errors += outcome.counting_errors;
        }
        info!(
            conversations = self.conversations.len(),
            flows = self.flows,
            counting_errors = self.counting_errors,
            fingerprints = self.stats.len(),
            "analysis complete"
        );
    }

    /// Per-fingerprint aggregates, including the raw per-execution
    /// sample arrays chart renderers consume.
    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Cumulative TNS payload bytes per database IP.
    pub fn db_bytes(&self) -> &HashMap<Ipv4Addr, u64> {
        &self.db_bytes
    }

    /// First and last recorded capture timestamps, if anything was recorded.
    pub fn time_span_ns(&self) -> Option<(i64, i64)> {
        Some((self.first_ts_ns?, self.last_ts_ns?))
    }

    pub fn classification_failures(&self) -> u64 {
        self.classification_failures
    }

    pub fn ordering_violations(&self) -> u64 {
        self.ordering_violations
    }

    pub fn counting_errors(&self) -> u64 {
        self.counting_errors
    }

    pub fn flows(&self) -> u64 {
        self.flows
    }
}
