use std::fmt;

use serde::{Deserialize, Serialize};

/// Hex digits in identifiers this crate allocates.
pub const ID_WIDTH: usize = 24;

const ID_MAX: u128 = (1u128 << (ID_WIDTH * 4)) - 1;
const MAX_ATTEMPTS: usize = 64;
const MAX_RESEEDS: usize = 8;

/// A record identifier, kept exactly as written in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(text: impl Into<String>) -> Self {
        ObjectId(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier read as a base-16 integer, when it is one.
    pub fn hex_value(&self) -> Option<u128> {
        if self.0.is_empty() || self.0.len() > 32 {
            return None;
        }
        u128::from_str_radix(&self.0, 16).ok()
    }

    /// Whether `text` has the shape of an allocated identifier.
    pub fn looks_like_id(text: &str) -> bool {
        text.len() == ID_WIDTH && text.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        ObjectId(s.to_string())
    }
}

/// Hands out fresh identifiers for one editing session.
///
/// The counter starts just above the largest 24-digit identifier in the
/// document plus a random salt and only moves forward. Every candidate is
/// checked against the caller's view of taken identifiers.
pub struct IdAllocator {
    next: u128,
    rng: fastrand::Rng,
}

impl IdAllocator {
    pub fn seeded_from<'a>(existing: impl IntoIterator<Item = &'a ObjectId>, mut rng: fastrand::Rng) -> Self {
        let max = existing
            .into_iter()
            .filter(|id| id.as_str().len() == ID_WIDTH)
            .filter_map(ObjectId::hex_value)
            .max();
        let salt = rng.u64(0..=0xFFFF) as u128;
        let next = match max {
            Some(max) if max < ID_MAX - 0x1_0000 => max + 1 + salt,
            _ => random_id_value(&mut rng),
        };
        IdAllocator { next, rng }
    }

    /// Draw an identifier for which `taken` returns false.
    /// Returns `None` when every bounded retry collided.
    pub fn allocate(&mut self, taken: impl Fn(&ObjectId) -> bool) -> Option<ObjectId> {
        for _ in 0..MAX_RESEEDS {
            for _ in 0..MAX_ATTEMPTS {
                if self.next > ID_MAX {
                    break;
                }
                let candidate = ObjectId(format!("{:0width$X}", self.next, width = ID_WIDTH));
                self.next += 1;
                if !taken(&candidate) {
                    return Some(candidate);
                }
                tracing::debug!(id = %candidate, "identifier collision, redrawing");
            }
            self.next = random_id_value(&mut self.rng);
        }
        None
    }
}

fn random_id_value(rng: &mut fastrand::Rng) -> u128 {
    let high = rng.u64(..) as u128;
    let low = rng.u32(..) as u128;
    // leave headroom so a fresh run does not overflow immediately
    ((high << 32) | low) & (ID_MAX >> 1)
}
