use crc32fast::Hasher;

/// Stable document seed derived from a script identifier using CRC32.
pub fn document_seed(identifier: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(identifier.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential id generator for tree nodes within one parse.
///
/// Ids are `{seed}-{n}`, so re-parsing the same script yields the same id
/// for the same structural position as long as the source is unchanged.
#[derive(Clone)]
pub struct IdGenerator {
    seed: String,
    count: u32,
}

impl IdGenerator {
    pub fn new(identifier: &str) -> Self {
        Self {
            seed: document_seed(identifier),
            count: 0,
        }
    }

    pub fn from_seed(seed: String) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential id
    pub fn new_id(&mut self) -> String {
        self.count += 1;
        format!("{}-{}", self.seed, self.count)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}
