// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packed 16-bit port addresses.
//!
//! ```text
//!  15  14            7 6           0
//! +---+---------------+-------------+
//! | X |       Y       |      Z      |
//! +---+---------------+-------------+
//! ```
//!
//! - `X` domain: 0 = controller side, 1 = application-processor side
//! - `Y` channel inside the domain (0-255)
//! - `Z` role inside the channel (0-127); `Z = 1` is the channel's route
//!   endpoint, `Z > 1` are application endpoints

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const DOMAIN_SHIFT: u16 = 15;
const CHANNEL_SHIFT: u16 = 7;
const CHANNEL_MASK: u16 = 0xFF;
const ROLE_MASK: u16 = 0x7F;
const ROUTE_MASK: u16 = 0xFF80;

/// Port address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(u16);

impl PortId {
    /// Reserved: no port
    pub const UNKNOWN: PortId = PortId(0);
    /// Reserved: every connected port
    pub const BROADCAST: PortId = PortId(0xFFFF);
    /// Controller-domain backbone route (0.0.1)
    pub const CONTROLLER_ROUTE: PortId = PortId::new(0, 0, 1);
    /// Application-processor backbone route (1.0.1)
    pub const APP_ROUTE: PortId = PortId::new(1, 0, 1);
    /// Co-processor backbone route (1.0.2)
    pub const CHIP_ROUTE: PortId = PortId::new(1, 0, 2);

    /// Pack domain, channel and role. Out-of-range bits are masked off.
    pub const fn new(domain: u8, channel: u8, role: u8) -> Self {
        PortId(
            ((domain as u16 & 1) << DOMAIN_SHIFT)
                | ((channel as u16 & CHANNEL_MASK) << CHANNEL_SHIFT)
                | (role as u16 & ROLE_MASK),
        )
    }

    /// Wrap a raw 16-bit id.
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        PortId(raw)
    }

    /// Raw 16-bit id.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Domain bit `X`.
    #[inline]
    pub const fn domain(self) -> u8 {
        (self.0 >> DOMAIN_SHIFT) as u8
    }

    /// Channel `Y`.
    #[inline]
    pub const fn channel(self) -> u8 {
        ((self.0 >> CHANNEL_SHIFT) & CHANNEL_MASK) as u8
    }

    /// Role `Z`.
    #[inline]
    pub const fn role(self) -> u8 {
        (self.0 & ROLE_MASK) as u8
    }

    /// Route endpoint (`Z = 1`) of this id's channel.
    #[inline]
    pub const fn route(self) -> Self {
        PortId((self.0 & ROUTE_MASK) + 1)
    }

    /// True for the channel's route endpoint.
    #[inline]
    pub const fn is_route(self) -> bool {
        self.role() == 1
    }

    /// True for one of the three fixed backbone routes.
    pub fn is_backbone(self) -> bool {
        self == Self::CONTROLLER_ROUTE || self == Self::APP_ROUTE || self == Self::CHIP_ROUTE
    }

    /// True for [`UNKNOWN`](Self::UNKNOWN) and [`BROADCAST`](Self::BROADCAST).
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::UNKNOWN.0 || self.0 == Self::BROADCAST.0
    }

    #[inline]
    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::BROADCAST.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.domain(), self.channel(), self.role())
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortId({} = {:#06x})", self, self.0)
    }
}

impl From<u16> for PortId {
    fn from(raw: u16) -> Self {
        PortId(raw)
    }
}

impl From<PortId> for u16 {
    fn from(id: PortId) -> Self {
        id.0
    }
}

/// Accepts `x.y.z`, `0x` hex, plain decimal, or `broadcast`.
impl FromStr for PortId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("broadcast") {
            return Ok(PortId::BROADCAST);
        }

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16)
                .map(PortId)
                .map_err(|e| format!("Invalid port id '{}': {}", s, e));
        }

        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [raw] => raw
                .parse::<u16>()
                .map(PortId)
                .map_err(|e| format!("Invalid port id '{}': {}", s, e)),
            [x, y, z] => {
                let x: u8 = x.parse().map_err(|_| format!("Invalid domain in '{}'", s))?;
                let y: u8 = y.parse().map_err(|_| format!("Invalid channel in '{}'", s))?;
                let z: u8 = z.parse().map_err(|_| format!("Invalid role in '{}'", s))?;
                if x > 1 {
                    return Err(format!("Domain must be 0 or 1 in '{}'", s));
                }
                if z > ROLE_MASK as u8 {
                    return Err(format!("Role must be at most 127 in '{}'", s));
                }
                Ok(PortId::new(x, y, z))
            }
            _ => Err(format!("Invalid port id '{}' (expected x.y.z)", s)),
        }
    }
}

impl Serialize for PortId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PortIdVisitor;

        impl Visitor<'_> for PortIdVisitor {
            type Value = PortId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a port id as \"x.y.z\", hex string, or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PortId, E> {
                u16::try_from(v)
                    .map(PortId)
                    .map_err(|_| E::custom(format!("port id {} out of range", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PortId, E> {
                u16::try_from(v)
                    .map(PortId)
                    .map_err(|_| E::custom(format!("port id {} out of range", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PortId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(PortIdVisitor)
    }
}
