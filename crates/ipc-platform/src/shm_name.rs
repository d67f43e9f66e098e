// SPDX-License-Identifier: MIT
//
// Session-key derivation and OS object naming.
// Port of the naming convention in cpp-ipc's `shm_name.h` (FNV-1a hashing,
// POSIX name-length truncation), adapted to the bridge's own key scheme
// (CRC-32 of the model's resource path, §3 "Session identity").

/// CRC-32 (IEEE 802.3 polynomial), computed without a lookup-table crate
/// dependency since the bridge only ever hashes a handful of short paths
/// per session.
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}

/// Derive the short session key from a model resource path, e.g. `/FMU1a2b3c4d`.
///
/// This is the prefix for every OS-named object in a session: semaphores
/// `<key>_client`/`<key>_server` and shared memory `<key>_memory`.
pub fn session_key(resource_path: &str) -> String {
    format!("FMU{:08x}", crc32(resource_path.as_bytes()))
}

/// Opaque-mode fallback: a session key with a random suffix, used when no
/// stable resource path is available. `salt` should be a source of entropy
/// the caller controls (e.g. the current pid combined with a counter) since
/// this crate does not depend on `rand`.
pub fn session_key_with_salt(resource_path: &str, salt: u64) -> String {
    let mut buf = resource_path.as_bytes().to_vec();
    buf.extend_from_slice(&salt.to_le_bytes());
    format!("FMU{:08x}", crc32(&buf))
}

/// Name of the client-side semaphore for a given session key.
pub fn client_sem_name(key: &str) -> String {
    format!("{key}_client")
}

/// Name of the server-side semaphore for a given session key.
pub fn server_sem_name(key: &str) -> String {
    format!("{key}_server")
}

/// Name of the shared-memory region for a given session key.
pub fn shm_name(key: &str) -> String {
    format!("{key}_memory")
}

/// Maximum length for POSIX-portable named-object identifiers. macOS caps
/// `shm_open`/`sem_open` names at `PSHMNAMLEN` (31 bytes including the
/// leading `/`); Linux is far more permissive but we hold every platform to
/// the tightest common denominator so a session key is always safe to use
/// verbatim.
pub const NAME_MAX: usize = 31;

/// Render a bridge-internal name (e.g. `FMUdeadbeef_client`) into the
/// OS-specific form: POSIX names get a leading `/` and are hashed down to
/// `NAME_MAX` bytes if they would otherwise overflow; Windows names are
/// used as-is (the Win32 kernel object namespace has no such limit in
/// practice for this bridge's key lengths).
#[cfg(unix)]
pub fn os_name(name: &str) -> String {
    let full = format!("/{name}");
    if full.len() <= NAME_MAX {
        return full;
    }
    let hash = crc32(full.as_bytes());
    let suffix = format!("_{hash:08x}");
    let keep = NAME_MAX - 1 - suffix.len();
    format!("/{}{}", &full[1..1 + keep.min(full.len() - 1)], suffix)
}

#[cfg(windows)]
pub fn os_name(name: &str) -> String {
    format!("Local\\{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn session_key_is_deterministic() {
        let a = session_key("/models/bouncingBall.fmu");
        let b = session_key("/models/bouncingBall.fmu");
        assert_eq!(a, b);
        assert!(a.starts_with("FMU"));
    }

    #[test]
    fn distinct_resource_paths_yield_distinct_keys() {
        let a = session_key("/models/a.fmu");
        let b = session_key("/models/b.fmu");
        assert_ne!(a, b, "S5: two resource locations must not collide");
    }

    #[test]
    fn derived_names_are_disjoint() {
        let key = session_key("/models/a.fmu");
        assert_ne!(client_sem_name(&key), server_sem_name(&key));
        assert_ne!(client_sem_name(&key), shm_name(&key));
    }

    #[test]
    fn os_name_truncates_when_needed() {
        let long = "x".repeat(100);
        let rendered = os_name(&long);
        #[cfg(unix)]
        assert!(rendered.len() <= NAME_MAX);
    }
}
