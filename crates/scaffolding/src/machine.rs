//! Stable per-device identifier.
//!
//! The lobby keys members by machine id, so it has to survive restarts
//! without leaking the raw hardware identifier: we publish the SHA-256 of
//! it instead.

use std::fs;

use rand::Rng;
use sha2::{Digest, Sha256};

/// Files consulted for a hardware identifier, in order.
const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Returns this device's machine id: lowercase hex SHA-256 of the system
/// machine identifier, or of a random value when none is readable.
pub fn machine_id() -> String {
    let raw = hardware_id().unwrap_or_else(|| {
        tracing::warn!("no system machine id found, using a random one");
        random_id()
    });
    hash_machine_id(&raw)
}

/// Lowercase hex SHA-256 of `raw`.
pub fn hash_machine_id(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hardware_id() -> Option<String> {
    MACHINE_ID_PATHS.iter().find_map(|path| {
        let text = fs::read_to_string(path).ok()?;
        let id = text.trim();
        (!id.is_empty()).then(|| id.to_owned())
    })
}

fn random_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
