use sha2::{Digest, Sha256};

/// Alphabet Oracle uses for sql_id rendering (base 32, no e/i/l/o).
const SQLID_ALPHABET: &[u8; 32] = b"0123456789abcdfghjkmnpqrstuvwxyz";

/// Number of base-32 characters in a fingerprint.
const SQLID_LEN: usize = 13;

/// Derive a stable fingerprint id from raw SQL text.
///
/// Deterministic: the same text always yields the same id. Literal
/// normalization is deliberately not attempted; executions only group
/// together when their text is byte-identical after trimming.
pub fn fingerprint(sql: &str) -> String {
    let digest = Sha256::digest(sql.trim().as_bytes());
    let mut value = digest[..8].iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut id = [0u8; SQLID_LEN];
    for slot in id.iter_mut().rev() {
        *slot = SQLID_ALPHABET[(value & 0x1f) as usize];
        value >>= 5;
    }
    String::from_utf8_lossy(&id).into_owned()
}
