use std::fmt;

use sha2::{Digest, Sha256};

use super::compiler::AssociatedData;

pub const DIGEST_LEN: usize = 32;

/// SHA-256 over a primary source buffer and every associated buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex_lower(&self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub(crate) fn digest_inputs(primary: &[u8], associated: &AssociatedData) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update((primary.len() as u64).to_le_bytes());
    hasher.update(primary);
    // BTreeMap iteration is sorted by name, so insertion order never leaks in.
    for (name, bytes) in associated {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    ContentDigest(hasher.finalize().into())
}

pub fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn associated(entries: &[(&str, &[u8])]) -> AssociatedData {
        entries
            .iter()
            .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
            .collect()
    }

    #[test]
    fn digest_changes_when_primary_byte_changes() {
        let none = AssociatedData::new();
        let a = digest_inputs(b"texture-bytes", &none);
        let b = digest_inputs(b"texture-bytez", &none);
        assert_ne!(a, b);
        assert_eq!(a, digest_inputs(b"texture-bytes", &none));
    }

    #[test]
    fn digest_covers_associated_files() {
        let without = digest_inputs(b"font", &AssociatedData::new());
        let with = digest_inputs(b"font", &associated(&[("charset", b"abc")]));
        let edited = digest_inputs(b"font", &associated(&[("charset", b"abd")]));
        assert_ne!(without, with);
        assert_ne!(with, edited);
    }

    #[test]
    fn digest_does_not_shift_bytes_between_buffers() {
        let a = digest_inputs(b"ab", &associated(&[("x", b"c")]));
        let b = digest_inputs(b"a", &associated(&[("x", b"bc")]));
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrips_through_slice() {
        let digest = digest_inputs(b"shader", &AssociatedData::new());
        assert_eq!(digest.to_hex().len(), DIGEST_LEN * 2);
        let copy = ContentDigest::from_slice(digest.as_bytes()).expect("32 bytes");
        assert_eq!(copy, digest);
        assert!(ContentDigest::from_slice(&[0u8; 4]).is_none());
    }
}
