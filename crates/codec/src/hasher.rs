use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;
use xxhash_rust::xxh64::xxh64;

/// The hash function a domain uses to turn keys into fixed-width key hashes.
///
/// Widths longer than the native digest are filled by re-hashing with an
/// increasing seed (or salt, for MD5), so any `width` is supported and the
/// first bytes of a wide hash always equal the narrow hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyHasher {
    /// MD5 digest, 16 bytes per round.
    #[default]
    Md5,
    /// XXH64, 8 bytes per round, big-endian.
    Xxh64,
    /// XXH3 (64-bit output), 8 bytes per round, big-endian.
    Xxh3,
}

impl KeyHasher {
    /// Writes the key hash of `key` into `out`, filling all of it.
    pub fn hash_into(&self, key: &[u8], out: &mut [u8]) {
        match self {
            KeyHasher::Md5 => {
                for (round, chunk) in out.chunks_mut(16).enumerate() {
                    let digest = if round == 0 {
                        md5::compute(key)
                    } else {
                        let mut ctx = md5::Context::new();
                        ctx.consume(key);
                        ctx.consume((round as u64).to_le_bytes());
                        ctx.compute()
                    };
                    chunk.copy_from_slice(&digest.0[..chunk.len()]);
                }
            }
            KeyHasher::Xxh64 => fill_seeded(out, |seed| xxh64(key, seed)),
            KeyHasher::Xxh3 => fill_seeded(out, |seed| xxh3_64_with_seed(key, seed)),
        }
    }

    /// Returns the `width`-byte key hash of `key`.
    #[must_use]
    pub fn hash(&self, key: &[u8], width: usize) -> Vec<u8> {
        let mut out = vec![0u8; width];
        self.hash_into(key, &mut out);
        out
    }

    /// Stable lowercase name, identical to the config spelling.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            KeyHasher::Md5 => "md5",
            KeyHasher::Xxh64 => "xxh64",
            KeyHasher::Xxh3 => "xxh3",
        }
    }
}

fn fill_seeded<F: Fn(u64) -> u64>(out: &mut [u8], round_hash: F) {
    for (round, chunk) in out.chunks_mut(8).enumerate() {
        let h = round_hash(round as u64).to_be_bytes();
        chunk.copy_from_slice(&h[..chunk.len()]);
    }
}

/// Sorts `(key, value)` pairs into ascending key-hash order, the order the
/// store writers require.
///
/// Each key is hashed exactly once.
pub fn sort_by_key_hash<V>(hasher: KeyHasher, width: usize, entries: &mut [(Vec<u8>, V)]) {
    entries.sort_by_cached_key(|(key, _)| hasher.hash(key, width));
}
