//! Signed bytecode envelope
//!
//! Command bodies are executable content served by the Definition Engine or
//! read back from the local database. Neither store is trusted: a package is
//! only accepted if its HMAC-SHA256 signature checks out against the
//! process-wide signing key shared with the Definition Engine.
//!
//! Layout (big-endian):
//!   magic "AVAP" (4) | version (2) | payload_len (4) | hmac (32) | payload

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded SHA-256, used for script hashing and source fingerprints.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

pub const MAGIC: &[u8; 4] = b"AVAP";
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 10;
const SIGNATURE_LEN: usize = 32;
const MIN_PACKAGE_LEN: usize = HEADER_LEN + SIGNATURE_LEN;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("corrupted bytecode: insufficient size ({0} bytes)")]
    Truncated(usize),
    #[error("invalid bytecode: magic number mismatch")]
    BadMagic,
    #[error("invalid bytecode: unsupported version {0}")]
    BadVersion(u16),
    #[error("bytecode has been tampered with or signature is invalid")]
    BadSignature,
    #[error("bytecode payload is not valid UTF-8")]
    BadPayload,
}

/// Frames command source into the signed binary layout and verifies it back.
#[derive(Debug, Clone)]
pub struct BytecodePacker {
    key: Vec<u8>,
}

impl BytecodePacker {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("hmac accepts keys of any length")
    }

    /// Encapsulate source text into a signed binary package.
    pub fn pack(&self, source: &str) -> Vec<u8> {
        let payload = source.as_bytes();
        let mut out = Vec::with_capacity(MIN_PACKAGE_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());

        let mut mac = self.mac();
        mac.update(&out[..HEADER_LEN]);
        mac.update(payload);
        out.extend_from_slice(&mac.finalize().into_bytes());

        out.extend_from_slice(payload);
        out
    }

    /// Validate the signature and extract the source text.
    ///
    /// The signature comparison is constant-time (`Mac::verify_slice`).
    pub fn unpack(&self, data: &[u8]) -> Result<String, PackError> {
        if data.len() < MIN_PACKAGE_LEN {
            return Err(PackError::Truncated(data.len()));
        }
        if &data[..4] != MAGIC {
            return Err(PackError::BadMagic);
        }
        let version = u16::from_be_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(PackError::BadVersion(version));
        }

        let payload = &data[MIN_PACKAGE_LEN..];
        let mut mac = self.mac();
        mac.update(&data[..HEADER_LEN]);
        mac.update(payload);
        mac.verify_slice(&data[HEADER_LEN..MIN_PACKAGE_LEN])
            .map_err(|_| PackError::BadSignature)?;

        String::from_utf8(payload.to_vec()).map_err(|_| PackError::BadPayload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packer() -> BytecodePacker {
        BytecodePacker::new(b"test_signing_key".to_vec())
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let p = packer();
        let packed = p.pack("addVar");
        assert_eq!(p.unpack(&packed).unwrap(), "addVar");
    }

    #[test]
    fn test_roundtrip_preserves_unicode() {
        let p = packer();
        let packed = p.pack("código de comando");
        assert_eq!(p.unpack(&packed).unwrap(), "código de comando");
    }

    #[test]
    fn test_any_flipped_byte_invalidates() {
        let p = packer();
        let packed = p.pack("RequestGet");
        for i in 0..packed.len() {
            let mut tampered = packed.clone();
            tampered[i] ^= 0x01;
            assert!(
                p.unpack(&tampered).is_err(),
                "flipping byte {} was not detected",
                i
            );
        }
    }

    #[test]
    fn test_truncated_package() {
        let p = packer();
        assert!(matches!(p.unpack(&[0u8; 10]), Err(PackError::Truncated(10))));
    }

    #[test]
    fn test_magic_mismatch() {
        let p = packer();
        let mut packed = p.pack("if");
        packed[0] = b'X';
        assert!(matches!(p.unpack(&packed), Err(PackError::BadMagic)));
    }

    #[test]
    fn test_version_mismatch() {
        let p = packer();
        let mut packed = p.pack("if");
        packed[5] = 9;
        assert!(matches!(p.unpack(&packed), Err(PackError::BadVersion(9))));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let packed = packer().pack("exception");
        let other = BytecodePacker::new(b"another_key".to_vec());
        assert!(matches!(other.unpack(&packed), Err(PackError::BadSignature)));
    }
}
