use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Sequential batch identifier. Zero is never allocated.
pub type BatchId = u64;

/// Medicine identifier as submitted by a manufacturer. Zero is rejected.
pub type MedicineId = u64;

// Address identifies a principal (administrator, manufacturer, referee).
// It is a 32 byte long handle, resembling a public key. The all-zero value is the null identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Default for Address {
    fn default() -> Self {
        Address([0; 32])
    }
}

impl Deref for Address {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    /// The null identity, never a valid bind or grant target
    pub fn null() -> Self {
        Address::default()
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Derive a deterministic address from seeds
    pub fn derive(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"PHARMA_Address");

        for seed in seeds {
            hasher.update((seed.len() as u64).to_le_bytes());
            hasher.update(seed);
        }

        Address(hasher.finalize().into())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Address(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| format!("Invalid address hex: {}", e))?;
        Address::from_slice(&bytes)
            .ok_or_else(|| format!("Address must be 32 bytes, got {}", bytes.len()))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Deterministic test address from a label
    pub fn addr(label: &str) -> Address {
        Address::derive(&[label.as_bytes()])
    }

    #[test]
    fn test_null_address() {
        let null = Address::null();
        assert!(null.is_null());
        assert_eq!(*null, [0u8; 32]);
        assert!(!addr("acme").is_null());
    }

    #[test]
    fn test_derive_is_deterministic() {
        assert_eq!(addr("acme"), addr("acme"));
        assert_ne!(addr("acme"), addr("globex"));

        // Seed boundaries matter
        let a = Address::derive(&[b"ab", b"c"]);
        let b = Address::derive(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_parse() {
        let a = addr("acme");
        let parsed: Address = a.to_hex().parse().unwrap();
        assert_eq!(parsed, a);

        let prefixed: Address = format!("0x{}", a).parse().unwrap();
        assert_eq!(prefixed, a);

        assert!("abcd".parse::<Address>().is_err());
        assert!("zz".parse::<Address>().is_err());
    }
}
