// Heuristic byte values and offsets observed in Oracle Net (TNS) captures.
//
// These are protocol-version-specific observations, not a formal grammar.
// New framing variants get a new constant here, not a new branch shape in
// the parsers.

/// Size of the TNS packet header (4-byte length, type, flags, checksum)
pub const TNS_HEADER_SIZE: usize = 8;

/// Offset of the TNS packet type byte
pub const TNS_TYPE_OFFSET: usize = 4;

/// Offset of the sub-type byte inside a DATA packet
pub const TNS_DATA_SUBTYPE_OFFSET: usize = 10;

/// Length-field flag: 32-bit little-endian SQL length follows
pub const SQL_LEN_FLAG_LE: u8 = 254;

/// Length-field flag: 32-bit big-endian SQL length follows
pub const SQL_LEN_FLAG_BE: u8 = 0;

/// Length-field flag: single-byte SQL length (low byte of the 4-byte field)
pub const SQL_LEN_FLAG_BYTE: u8 = 1;

/// Decoded length that cannot be trusted (0xFEFF, a byte-order mark
/// bleeding into the length field); forces the zero-byte fallback scan
pub const SQL_LEN_UNTRUSTED: u32 = 65279;

/// Bytes before the keyword reserved for the flag byte and length field
pub const SQL_LEN_PREFIX: usize = 5;

/// Request marker at payload[3..5]: packet length 29, type DATA (0x06);
/// the client is re-executing an already-open cursor
pub const REUSED_CURSOR_MARKER: [u8; 2] = [29, 6];

/// Same reused-cursor invocation observed directly after a server error
/// (packet length 48, type DATA)
pub const REUSED_CURSOR_MARKER_AFTER_ERROR: [u8; 2] = [48, 6];

/// Offset of the marker bytes checked for cursor reuse
pub const REUSED_CURSOR_MARKER_OFFSET: usize = 3;

/// Offset of the cursor slot byte in a reused-cursor request
pub const SLOT_OFFSET_REUSED_REQUEST: usize = 13;

/// Two-byte flag (0x7b05) preceding the ORA-01403 text at the end of a fetch
pub const END_OF_FETCH_FLAG: [u8; 2] = [123, 5];

/// Error text the server sends when a fetch runs out of rows
pub const END_OF_FETCH_ERROR: &[u8] = b"ORA-01403";

/// Distance from the end-of-fetch flag to the cursor slot byte
pub const SLOT_OFFSET_AFTER_EOF_FLAG: usize = 6;

/// DATA sub-type: return OPI parameter
pub const RETURN_OPI_PARAM: u8 = 8;

/// DATA sub-type: return status
pub const RETURN_STATUS: u8 = 4;

/// Cursor slot offset in a return-OPI-parameter response
pub const SLOT_OFFSET_OPI_PARAM: usize = 21;

/// Cursor slot offset in a return-status response
pub const SLOT_OFFSET_RET_STATUS: usize = 28;

/// Shortest response that can carry a DML acknowledgment
pub const MIN_DML_ACK_LEN: usize = 21;

/// Substring marking a connect-descriptor handshake payload; a keyword
/// match inside one is not a statement
pub const CONNECT_DESCRIPTOR_TOKEN: &[u8] = b"DESCRIPTION";

/// Substring marking authentication-phase traffic
pub const AUTH_PHASE_TOKEN: &[u8] = b"AUTH";

/// Statement-starting keywords, scanned case-insensitively
pub const SQL_KEYWORD_PATTERN: &str = "(?i)SELECT|UPDATE|INSERT|WITH|DELETE|COMMIT|ALTER";
