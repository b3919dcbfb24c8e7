use crate::conversation::ConversationKey;
use crate::packet::{PacketRecord, SqlPayload};
use crate::stats::StatsTable;
use tracing::{debug, warn};

/// The statement currently being executed in a conversation.
#[derive(Debug, Clone)]
struct OpenFlow {
    text: String,
    fingerprint: String,
    started_ns: i64,
}

/// What one conversation contributed to the aggregates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOutcome {
    /// Flows committed to the aggregator
    pub flows: u64,
    /// Flows dropped because their accumulated RTT went negative
    pub counting_errors: u64,
}

/// Group one conversation's ordered packets into SQL execution flows
/// and commit each completed flow to `stats`.
///
/// Explicit state machine: `Idle` (no open flow, `open == None`) and
/// `Open`. A statement packet opens a flow; while one is open, every
/// non-statement packet accrues its RTT (the opening request's own
/// round trip is thereby excluded). A flow terminates on an
/// end-of-fetch marker, or, for non-SELECT/WITH statements, on the next
/// packet that carries no statement. A statement packet while a flow is
/// open starts a new flow and abandons the previous one unflushed; its
/// packet, RTT and reused-cursor tallies carry into the new flow.
pub fn segment_conversation(
    key: &ConversationKey,
    packets: &[PacketRecord],
    stats: &mut StatsTable,
) -> SegmentOutcome {
    let mut outcome = SegmentOutcome::default();
    let mut open: Option<OpenFlow> = None;
    let mut packet_count: u64 = 0;
    let mut rtt_sum: i64 = 0;
    let mut reused_cursors: u64 = 0;
    let mut prev_ts: Option<i64> = None;

    for packet in packets {
        // client-visible delay of the round trip this packet completes
        let app_delta_ns = prev_ts.map_or(0, |t| packet.timestamp_ns - t);
        packet_count += 1;

        match &packet.sql {
            SqlPayload::Statement { text, fingerprint } => {
                if open.is_some() {
                    debug!(conversation = %key, "statement while flow open, abandoning previous flow");
                }
                if packet.reused_cursor {
                    reused_cursors += 1;
                }
                open = Some(OpenFlow {
                    text: text.clone(),
                    fingerprint: fingerprint.clone(),
                    started_ns: packet.timestamp_ns,
                });
            }
            SqlPayload::EndOfFetch | SqlPayload::NoStatement => {
                if open.is_some() {
                    rtt_sum += packet.rtt_ns;
                }
            }
        }

        if let Some(flow) = &open {
            if is_terminal(&packet.sql, &flow.text) {
                debug!(
                    conversation = %key,
                    fingerprint = %flow.fingerprint,
                    started_ns = flow.started_ns,
                    rtt_sum,
                    packet_count,
                    "flow complete"
                );
                if rtt_sum >= 0 {
                    stats.record(
                        &flow.fingerprint,
                        &flow.text,
                        rtt_sum,
                        key,
                        packet_count,
                        reused_cursors,
                        app_delta_ns,
                    );
                    outcome.flows += 1;
                } else {
                    warn!(
                        conversation = %key,
                        fingerprint = %flow.fingerprint,
                        rtt_sum,
                        "negative RTT sum, dropping flow from aggregation"
                    );
                    outcome.counting_errors += 1;
                }
                open = None;
                packet_count = 0;
                rtt_sum = 0;
                reused_cursors = 0;
            }
        }

        prev_ts = Some(packet.timestamp_ns);
    }

    outcome
}

/// A flow ends on an explicit end-of-fetch marker. Statements that are
/// not SELECT/WITH never get one; for those, any following packet
/// without a statement closes the flow.
fn is_terminal(sql: &SqlPayload, open_text: &str) -> bool {
    match sql {
        SqlPayload::EndOfFetch => true,
        SqlPayload::NoStatement => {
            open_text.len() > 1 && {
                let first = open_text.as_bytes()[0].to_ascii_uppercase();
                first != b'S' && first != b'W'
            }
        }
        SqlPayload::Statement { .. } => false,
    }
}
