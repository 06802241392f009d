// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Header integrity hashes.
//!
//! The two wire layers use different 32-bit non-cryptographic hashes so a
//! header from one layer never validates as the other:
//!
//! | Layer   | Function           | Seed |
//! |---------|--------------------|------|
//! | Gateway | MurmurHash3 x86_32 | 1    |
//! | Event   | XXH32              | 0    |

use std::io::Cursor;

/// Seed for the gateway envelope hash
pub const GATEWAY_HASH_SEED: u32 = 1;

/// Seed for the event header hash
pub const EVENT_HASH_SEED: u32 = 0;

/// MurmurHash3 x86_32 of `bytes`, seed [`GATEWAY_HASH_SEED`].
pub fn gateway_hash(bytes: &[u8]) -> u32 {
    // Reading from an in-memory cursor cannot fail
    murmur3::murmur3_32(&mut Cursor::new(bytes), GATEWAY_HASH_SEED).unwrap_or(0)
}

/// XXH32 of `bytes`, seed [`EVENT_HASH_SEED`].
#[inline]
pub fn event_hash(bytes: &[u8]) -> u32 {
    xxhash_rust::xxh32::xxh32(bytes, EVENT_HASH_SEED)
}
