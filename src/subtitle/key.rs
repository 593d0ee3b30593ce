//! Subtitle key derivation
//!
//! Recovers the AES key a provider used to encrypt a subtitle script from the
//! script's numeric identifier. The arithmetic mirrors the provider's
//! obfuscation scheme bit for bit; any change breaks decryption of real
//! payloads.

use sha1::{Digest, Sha1};

/// Length of the derived key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Number of sequence terms used to build the seed prefix
const SEED_TERMS: usize = 20;

/// Modulus applied to every sequence term before it is mapped to a character
const SEED_MODULUS: i64 = 97;

/// The two starting values of the seed sequence
const SEED_START: (i64, i64) = (1, 2);

/// The fixed "magic" constant, `floor(sqrt(6.9) * 2^25)`.
fn magic() -> i64 {
    (6.9f64.sqrt() * 2f64.powi(25)).floor() as i64
}

/// Builds the character prefix of the hash seed
///
/// Generates a Fibonacci-style sequence from the two start values and maps
/// every generated term `t` to `chr(t % 97 + 33)`. The start values
/// themselves are not part of the output.
fn seed_prefix() -> String {
    let (mut previous, mut current) = SEED_START;
    let mut prefix = String::with_capacity(SEED_TERMS);

    for _ in 0..SEED_TERMS {
        let next = previous + current;
        previous = current;
        current = next;

        // 33..=129 always fits a char
        let code = (next % SEED_MODULUS + 33) as u32;
        prefix.push(char::from_u32(code).unwrap_or('?'));
    }

    prefix
}

/// Derives the 32-byte decryption key for a subtitle script
///
/// The first 20 bytes are the SHA-1 digest of the seed string, the remaining
/// 12 bytes are zero.
///
/// # Examples
///
/// ```ignore
/// let key = derive_key(758912);
/// assert_eq!(key.len(), 32);
/// ```
pub fn derive_key(subtitle_id: i64) -> [u8; KEY_LEN] {
    let magic = magic();
    let eq1 = magic ^ subtitle_id;
    let mixed = subtitle_id ^ magic;
    let eq3 = mixed ^ (mixed >> 3) ^ eq1.wrapping_mul(32);

    let seed = format!("{}{}", seed_prefix(), eq3);
    let digest = Sha1::digest(seed.as_bytes());

    let mut key = [0u8; KEY_LEN];
    key[..digest.len()].copy_from_slice(&digest);
    key
}
