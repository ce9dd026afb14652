use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
const ITERATIONS: u32 = 60_000;
const SALT_LEN: usize = 16;

/// Hash a plaintext password into the self-describing stored form
/// `sha256$<iterations>$<salt>$<digest>`.
pub fn hash_password(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = stretch(&salt, plain.as_bytes(), ITERATIONS);
    format!(
        "{}${}${}${}",
        SCHEME,
        ITERATIONS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Check a plaintext password against a stored hash. Malformed stored
/// values never verify.
pub fn verify_password(stored: &str, plain: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 || parts[0] != SCHEME {
        return false;
    }
    let iterations: u32 = match parts[1].parse() {
        Ok(n) if n > 0 => n,
        _ => return false,
    };
    let salt = match URL_SAFE_NO_PAD.decode(parts[2]) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let expected = match URL_SAFE_NO_PAD.decode(parts[3]) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let digest = stretch(&salt, plain.as_bytes(), iterations);
    constant_time_eq(&digest, &expected)
}

fn stretch(salt: &[u8], plain: &[u8], iterations: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plain);
    let mut digest: [u8; 32] = hasher.finalize().into();
    for _ in 1..iterations {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(digest);
        digest = hasher.finalize().into();
    }
    digest
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let stored = hash_password("correct horse battery staple");
        assert!(verify_password(&stored, "correct horse battery staple"));
        assert!(!verify_password(&stored, "correct horse battery"));
    }

    #[test]
    fn test_salts_are_unique() {
        let a = hash_password("same input");
        let b = hash_password("same input");
        assert_ne!(a, b);
        assert!(verify_password(&a, "same input"));
        assert!(verify_password(&b, "same input"));
    }

    #[test]
    fn test_stored_format() {
        let stored = hash_password("pw");
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "sha256");
        assert_eq!(parts[1], ITERATIONS.to_string());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("", "pw"));
        assert!(!verify_password("plaintext", "pw"));
        assert!(!verify_password("sha256$0$a$b", "pw"));
        assert!(!verify_password("md5$1000$a$b", "pw"));
        assert!(!verify_password("sha256$1000$!!$b", "pw"));
    }
}
