use std::time::Duration;

use bytes::Bytes;

const FNV_OFFSET: u64 = 14_695_981_039_346_656_037;
const FNV_PRIME: u64 = 1_099_511_628_211;

/// One encoded frame plus its metadata.
///
/// Records are built by the pipeline when an encode completes and become
/// immutable once the ring has stamped their `sequence_id`.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    payload: Option<Bytes>,
    pts: Duration,
    is_key_frame: bool,
    pub(crate) sequence_id: u64,
}

impl FrameRecord {
    pub fn new(payload: Option<Bytes>, pts: Duration, is_key_frame: bool) -> Self {
        Self {
            payload,
            pts,
            is_key_frame,
            sequence_id: 0,
        }
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Capture-order timestamp. Not monotonic in `sequence_id` order.
    pub fn presentation_timestamp(&self) -> Duration {
        self.pts
    }

    pub fn is_key_frame(&self) -> bool {
        self.is_key_frame
    }

    /// Insertion order into the ring, i.e. encoder completion order.
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// FNV-1a over the payload, eight bytes at a time with a byte-wise tail.
    /// Returns 0 when there is no payload.
    pub fn content_hash(&self) -> u64 {
        let Some(data) = self.payload.as_deref() else {
            return 0;
        };

        let mut hash = FNV_OFFSET;
        let mut words = data.chunks_exact(8);
        for word in &mut words {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(word);
            hash ^= u64::from_ne_bytes(buf);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        for &byte in words.remainder() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_zero_without_payload() {
        let record = FrameRecord::new(None, Duration::ZERO, false);
        assert_eq!(record.content_hash(), 0);
    }

    #[test]
    fn hash_covers_tail_bytes() {
        let a = FrameRecord::new(Some(Bytes::from_static(b"0123456789")), Duration::ZERO, true);
        let b = FrameRecord::new(Some(Bytes::from_static(b"0123456788")), Duration::ZERO, true);
        assert_ne!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), FNV_OFFSET);
    }

    #[test]
    fn empty_payload_hashes_to_offset_basis() {
        let record = FrameRecord::new(Some(Bytes::new()), Duration::ZERO, false);
        assert_eq!(record.content_hash(), FNV_OFFSET);
    }
}
