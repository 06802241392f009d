// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Next-hop resolution over the two-domain port tree.
//!
//! Inside a domain every channel is a star around its route endpoint
//! (`Z = 1`). The two domains are joined by a fixed chain of backbone hops:
//!
//! ```text
//! controller endpoints -- 0.0.1 -- 1.0.2 (chip) -- 1.0.1 (app) -- app channel routes -- app endpoints
//! ```
//!
//! Controller endpoints address each other directly; the controller side
//! has no channel hubs.

use super::PortId;

/// Next hop from `current` toward `dest`, or `None` if unreachable.
///
/// Pure function of its inputs.
pub fn next_hop(current: PortId, dest: PortId) -> Option<PortId> {
    if current.is_reserved() || dest.is_reserved() {
        return None;
    }

    if dest.domain() == 0 {
        if current.domain() == 0 {
            return Some(dest);
        }
        if !current.is_route() && current.channel() != 0 {
            return Some(current.route());
        }
        if current == PortId::APP_ROUTE {
            return Some(PortId::CHIP_ROUTE);
        }
        if current == PortId::CHIP_ROUTE {
            return Some(PortId::CONTROLLER_ROUTE);
        }
        return Some(PortId::APP_ROUTE);
    }

    if current.domain() == 0 {
        return if current == PortId::CONTROLLER_ROUTE {
            Some(PortId::CHIP_ROUTE)
        } else {
            Some(PortId::CONTROLLER_ROUTE)
        };
    }
    if current.channel() == dest.channel() {
        return Some(dest);
    }
    if !current.is_route() {
        return Some(current.route());
    }
    Some(dest.route())
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_ENDPOINT: PortId = PortId::new(1, 2, 5);
    const APP_PEER: PortId = PortId::new(1, 2, 9);
    const APP_CH2_ROUTE: PortId = PortId::new(1, 2, 1);
    const CTRL_ENDPOINT: PortId = PortId::new(0, 3, 4);

    #[test]
    fn test_reserved_ids_unreachable() {
        assert_eq!(next_hop(PortId::UNKNOWN, APP_PEER), None);
        assert_eq!(next_hop(APP_ENDPOINT, PortId::UNKNOWN), None);
        assert_eq!(next_hop(APP_ENDPOINT, PortId::BROADCAST), None);
        assert_eq!(next_hop(PortId::BROADCAST, APP_PEER), None);
    }

    #[test]
    fn test_same_channel_is_direct() {
        assert_eq!(next_hop(APP_ENDPOINT, APP_PEER), Some(APP_PEER));
        assert_eq!(next_hop(APP_CH2_ROUTE, APP_PEER), Some(APP_PEER));
    }

    #[test]
    fn test_app_endpoint_climbs_to_channel_route() {
        assert_eq!(next_hop(APP_ENDPOINT, CTRL_ENDPOINT), Some(APP_CH2_ROUTE));
        assert_eq!(
            next_hop(APP_ENDPOINT, PortId::new(1, 7, 3)),
            Some(APP_CH2_ROUTE)
        );
    }

    #[test]
    fn test_channel_route_descends_into_destination_channel() {
        assert_eq!(
            next_hop(APP_CH2_ROUTE, PortId::new(1, 7, 3)),
            Some(PortId::new(1, 7, 1))
        );
        assert_eq!(
            next_hop(PortId::APP_ROUTE, APP_ENDPOINT),
            Some(APP_CH2_ROUTE)
        );
    }

    #[test]
    fn test_app_side_toward_controller() {
        // Channel route heads for the application backbone
        assert_eq!(
            next_hop(APP_CH2_ROUTE, CTRL_ENDPOINT),
            Some(PortId::APP_ROUTE)
        );
        assert_eq!(
            next_hop(PortId::APP_ROUTE, PortId::CONTROLLER_ROUTE),
            Some(PortId::CHIP_ROUTE)
        );
        assert_eq!(
            next_hop(PortId::CHIP_ROUTE, PortId::CONTROLLER_ROUTE),
            Some(PortId::CONTROLLER_ROUTE)
        );
        assert_eq!(
            next_hop(PortId::CHIP_ROUTE, CTRL_ENDPOINT),
            Some(PortId::CONTROLLER_ROUTE)
        );
    }

    #[test]
    fn test_controller_side_toward_app() {
        assert_eq!(
            next_hop(CTRL_ENDPOINT, APP_ENDPOINT),
            Some(PortId::CONTROLLER_ROUTE)
        );
        assert_eq!(
            next_hop(PortId::CONTROLLER_ROUTE, APP_ENDPOINT),
            Some(PortId::CHIP_ROUTE)
        );
    }

    #[test]
    fn test_controller_domain_is_flat() {
        assert_eq!(
            next_hop(CTRL_ENDPOINT, PortId::new(0, 9, 9)),
            Some(PortId::new(0, 9, 9))
        );
        assert_eq!(
            next_hop(PortId::CONTROLLER_ROUTE, CTRL_ENDPOINT),
            Some(CTRL_ENDPOINT)
        );
    }

    #[test]
    fn test_full_path_reaches_destination() {
        // Walk hop by hop from an app endpoint to a controller endpoint and back
        let walk = |from: PortId, to: PortId| {
            let mut path = vec![from];
            let mut current = from;
            while current != to {
                current = next_hop(current, to).unwrap();
                path.push(current);
                assert!(path.len() < 10, "routing loop: {:?}", path);
            }
            path
        };

        assert_eq!(
            walk(APP_ENDPOINT, CTRL_ENDPOINT),
            vec![
                APP_ENDPOINT,
                APP_CH2_ROUTE,
                PortId::APP_ROUTE,
                PortId::CHIP_ROUTE,
                PortId::CONTROLLER_ROUTE,
                CTRL_ENDPOINT,
            ]
        );
        assert_eq!(
            walk(CTRL_ENDPOINT, APP_ENDPOINT),
            vec![
                CTRL_ENDPOINT,
                PortId::CONTROLLER_ROUTE,
                PortId::CHIP_ROUTE,
                PortId::APP_ROUTE,
                APP_CH2_ROUTE,
                APP_ENDPOINT,
            ]
        );
    }

    #[test]
    fn test_deterministic() {
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..1000 {
            let a = PortId::from_raw(rng.u16(..));
            let b = PortId::from_raw(rng.u16(..));
            assert_eq!(next_hop(a, b), next_hop(a, b));
        }
    }
}
