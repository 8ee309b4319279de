//! Scripts loaded into every runtime during initialization.

/// The `events` dispatcher object.
pub const EVENTS: &str = include_str!("../scripts/events.lua");

/// The `network` envelope helpers and error-code constants.
pub const NETWORK: &str = include_str!("../scripts/network.lua");

/// A named bootstrap script.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapScript {
    pub name: &'static str,
    pub source: &'static str,
}

/// The bootstrap scripts, in load order.
pub fn scripts(include_network: bool) -> Vec<BootstrapScript> {
    let mut scripts = vec![BootstrapScript {
        name: "@bootstrap/events.lua",
        source: EVENTS,
    }];
    if include_network {
        scripts.push(BootstrapScript {
            name: "@bootstrap/network.lua",
            source: NETWORK,
        });
    }
    scripts
}
