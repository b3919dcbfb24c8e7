use crate::constants::{
    AUTH_PHASE_TOKEN, END_OF_FETCH_ERROR, END_OF_FETCH_FLAG, MIN_DML_ACK_LEN, RETURN_OPI_PARAM,
    RETURN_STATUS, SLOT_OFFSET_AFTER_EOF_FLAG, SLOT_OFFSET_OPI_PARAM, SLOT_OFFSET_RET_STATUS,
    TNS_DATA_SUBTYPE_OFFSET,
};
use crate::tns::{TnsHeader, TnsPacketType};
use tracing::{debug, warn};

/// What a response-direction payload tells us about cursor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSql {
    /// The server signalled end-of-fetch (ORA-01403). When the flag and
    /// slot byte were locatable, `slot` names where the server keeps the
    /// just-completed cursor.
    EndOfFetch { slot: Option<u8> },
    /// DML acknowledgment carrying a cursor slot; these statements never
    /// produce an end-of-fetch marker
    DmlAck { slot: u8 },
    /// Nothing statement-related in this packet
    None,
}

/// Dissect a payload flowing from the database port.
pub fn parse_response(payload: &[u8]) -> ResponseSql {
    if contains(payload, END_OF_FETCH_ERROR) {
        let slot = find(payload, &END_OF_FETCH_FLAG)
            .and_then(|flag_at| payload.get(flag_at + SLOT_OFFSET_AFTER_EOF_FLAG))
            .copied();
        if slot.is_none() {
            warn!("end-of-fetch marker without locatable cursor slot");
        }
        return ResponseSql::EndOfFetch { slot };
    }

    if payload.len() >= MIN_DML_ACK_LEN
        && !contains(payload, AUTH_PHASE_TOKEN)
        && TnsHeader::parse(payload).is_some_and(|h| h.packet_type() == TnsPacketType::Data)
    {
        let slot_offset = match payload.get(TNS_DATA_SUBTYPE_OFFSET) {
            Some(&RETURN_OPI_PARAM) => SLOT_OFFSET_OPI_PARAM,
            Some(&RETURN_STATUS) => SLOT_OFFSET_RET_STATUS,
            _ => return ResponseSql::None,
        };
        if let Some(&slot) = payload.get(slot_offset) {
            debug!(slot, slot_offset, "cursor slot in DML acknowledgment");
            return ResponseSql::DmlAck { slot };
        }
    }

    ResponseSql::None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Response carrying the out-of-rows error: the 0x7b05 flag, six
    /// filler bytes, the cursor slot, then the error text.
    fn end_of_fetch(slot: u8) -> Vec<u8> {
        let mut payload = vec![0u8; 8];
        payload[4] = 6;
        payload.extend_from_slice(&END_OF_FETCH_FLAG);
        payload.extend_from_slice(&[0, 0, 0, 0]);
        payload.push(slot);
        payload.extend_from_slice(b"ORA-01403: no data found");
        payload
    }

    #[test]
    fn end_of_fetch_slot() {
        assert_eq!(parse_response(&end_of_fetch(3)), ResponseSql::EndOfFetch { slot: Some(3) });
    }

    #[test]
    fn end_of_fetch_without_flag_still_terminates() {
        let payload = b"some prefix ORA-01403 no flag bytes".to_vec();
        assert_eq!(parse_response(&payload), ResponseSql::EndOfFetch { slot: None });
    }

    #[test]
    fn truncated_end_of_fetch_does_not_panic() {
        // flag present but payload ends before the slot byte
        let mut payload = b"ORA-01403".to_vec();
        payload.extend_from_slice(&END_OF_FETCH_FLAG);
        assert_eq!(parse_response(&payload), ResponseSql::EndOfFetch { slot: None });
    }

    fn dml_ack(subtype: u8, len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; len];
        payload[4] = 6;
        payload[TNS_DATA_SUBTYPE_OFFSET] = subtype;
        payload
    }

    #[test]
    fn opi_param_slot_at_21() {
        let mut payload = dml_ack(RETURN_OPI_PARAM, 32);
        payload[SLOT_OFFSET_OPI_PARAM] = 9;
        assert_eq!(parse_response(&payload), ResponseSql::DmlAck { slot: 9 });
    }

    #[test]
    fn return_status_slot_at_28() {
        let mut payload = dml_ack(RETURN_STATUS, 32);
        payload[SLOT_OFFSET_RET_STATUS] = 2;
        assert_eq!(parse_response(&payload), ResponseSql::DmlAck { slot: 2 });
    }

    #[test]
    fn auth_phase_is_ignored() {
        let mut payload = dml_ack(RETURN_OPI_PARAM, 40);
        payload[30..34].copy_from_slice(b"AUTH");
        assert_eq!(parse_response(&payload), ResponseSql::None);
    }

    #[test]
    fn short_payload_is_ignored() {
        assert_eq!(parse_response(&dml_ack(RETURN_OPI_PARAM, 20)), ResponseSql::None);
    }

    #[test]
    fn non_data_packet_is_ignored() {
        let mut payload = dml_ack(RETURN_OPI_PARAM, 32);
        payload[4] = 11; // resend
        assert_eq!(parse_response(&payload), ResponseSql::None);
    }

    #[test]
    fn status_slot_out_of_range_is_ignored() {
        // return-status subtype but payload ends before offset 28
        let payload = dml_ack(RETURN_STATUS, 25);
        assert_eq!(parse_response(&payload), ResponseSql::None);
    }
}
