//! Random identifiers for domain objects.
//!
//! The generator is an ordinary value: whoever needs identifiers holds one
//! (typically behind an `Arc`) instead of reaching for process-wide state.

use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

pub const USER_ID_PREFIX: &str = "user_";
pub const CLUSTER_ID_PREFIX: &str = "cluster_";
pub const GROUP_ID_PREFIX: &str = "group_";
pub const INSTANCE_ID_PREFIX: &str = "instance_";
pub const SECRET_ID_PREFIX: &str = "secret_";

/// Source of URL-safe random identifiers, safe to share between threads
#[derive(Debug)]
pub struct IdGenerator {
    source: Mutex<StdRng>,
}

impl IdGenerator {
    /// A generator seeded from the operating system's entropy source
    pub fn new() -> Self {
        Self {
            source: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A deterministic generator, for tests and reproducible fixtures
    pub fn with_seed(seed: u64) -> Self {
        Self {
            source: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw one 64-bit value and encode it as unpadded URL-safe base64,
    /// giving 11 characters.
    ///
    /// The lock covers only the draw; encoding happens after it is released.
    pub fn generate_raw_id(&self) -> String {
        let value = {
            // a poisoned lock still guards a usable RNG
            let mut source = self.source.lock().unwrap_or_else(|e| e.into_inner());
            source.next_u64()
        };
        URL_SAFE_NO_PAD.encode(value.to_le_bytes())
    }

    pub fn generate_user_id(&self) -> String {
        format!("{}{}", USER_ID_PREFIX, self.generate_raw_id())
    }

    pub fn generate_cluster_id(&self) -> String {
        format!("{}{}", CLUSTER_ID_PREFIX, self.generate_raw_id())
    }

    pub fn generate_group_id(&self) -> String {
        format!("{}{}", GROUP_ID_PREFIX, self.generate_raw_id())
    }

    pub fn generate_instance_id(&self) -> String {
        format!("{}{}", INSTANCE_ID_PREFIX, self.generate_raw_id())
    }

    pub fn generate_secret_id(&self) -> String {
        format!("{}{}", SECRET_ID_PREFIX, self.generate_raw_id())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
