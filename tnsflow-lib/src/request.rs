use crate::constants::{
    CONNECT_DESCRIPTOR_TOKEN, REUSED_CURSOR_MARKER, REUSED_CURSOR_MARKER_AFTER_ERROR,
    REUSED_CURSOR_MARKER_OFFSET, SLOT_OFFSET_REUSED_REQUEST, SQL_KEYWORD_PATTERN, SQL_LEN_FLAG_BE,
    SQL_LEN_FLAG_BYTE, SQL_LEN_FLAG_LE, SQL_LEN_PREFIX, SQL_LEN_UNTRUSTED,
};
use regex::bytes::Regex;
use std::sync::LazyLock;
use tracing::debug;

static SQL_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SQL_KEYWORD_PATTERN).expect("keyword pattern compiles"));

/// What a request-direction payload carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSql {
    /// Statement text shipped in this packet. May be empty when the
    /// length flag byte is unrecognized; the caller still records it as
    /// the conversation's last issued SQL, mirroring observed client
    /// behavior.
    Fresh(String),
    /// Re-execution of a cursor the server already holds in `slot`
    Reused { slot: u8 },
    /// No statement in this packet
    None,
}

/// Dissect a payload flowing toward the database port.
pub fn parse_request(payload: &[u8]) -> RequestSql {
    if let Some(found) = SQL_KEYWORD.find(payload) {
        // a keyword inside a connect descriptor is not a statement
        if !contains(payload, CONNECT_DESCRIPTOR_TOKEN) {
            return match extract_statement(payload, found.start()) {
                Some(text) => RequestSql::Fresh(text),
                None => RequestSql::None,
            };
        }
    }

    if payload.len() > SLOT_OFFSET_REUSED_REQUEST {
        let marker = &payload[REUSED_CURSOR_MARKER_OFFSET..REUSED_CURSOR_MARKER_OFFSET + 2];
        if marker == REUSED_CURSOR_MARKER || marker == REUSED_CURSOR_MARKER_AFTER_ERROR {
            let slot = payload[SLOT_OFFSET_REUSED_REQUEST];
            debug!(slot, "reused-cursor invocation");
            return RequestSql::Reused { slot };
        }
    }

    RequestSql::None
}

/// Decode the statement text around a keyword match at offset `k`.
///
/// The byte at `k-5` selects how the 4-byte length field at `[k-4, k)`
/// is read. A length of 0xFEFF, or one that exceeds the bytes remaining
/// after the keyword, means the field cannot be trusted; the text then
/// runs up to the first zero byte after the keyword.
fn extract_statement(payload: &[u8], k: usize) -> Option<String> {
    if k < SQL_LEN_PREFIX {
        // no room for the flag and length field before the keyword
        return None;
    }
    let flag = payload[k - 5];
    let len_bytes: [u8; 4] = payload[k - 4..k].try_into().ok()?;
    let sql_len = match flag {
        SQL_LEN_FLAG_LE => u32::from_le_bytes(len_bytes),
        SQL_LEN_FLAG_BE => u32::from_be_bytes(len_bytes),
        SQL_LEN_FLAG_BYTE => u32::from(len_bytes[3]),
        _ => 0,
    } as usize;

    let text = if sql_len == SQL_LEN_UNTRUSTED as usize || sql_len > payload.len() - k {
        debug!(sql_len, "untrusted length field, scanning for terminator");
        let tail = &payload[k..];
        let end = tail
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(tail.len().saturating_sub(1));
        &tail[..end]
    } else {
        &payload[k..k + sql_len]
    };

    Some(String::from_utf8_lossy(text).into_owned())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
