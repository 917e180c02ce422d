use sha2::{Digest, Sha256};

pub type ConnectionSecret = u64;

/// Tag covering every octet that follows it in the datagram.
pub fn integrity_tag(secret: ConnectionSecret, covered: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(secret.to_le_bytes());
    hasher.update(covered);
    let digest = hasher.finalize();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub fn verify_integrity_tag(secret: ConnectionSecret, tag: u32, covered: &[u8]) -> bool {
    integrity_tag(secret, covered) == tag
}
