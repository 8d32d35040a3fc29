//! Map adapters, mounted through a map provider

use serde_json::Value;

use crate::lifecycle::manager::AttachTarget;

define_entity! {
    Map => "Map", target: AttachTarget::Detached;
    constructor {}
    fields {
        basemap: String => "basemap",
        ground: String => "ground",
    }
}

define_entity! {
    /// Map loaded from a portal item
    WebMap => "WebMap", target: AttachTarget::Detached;
    constructor {
        portal_item: Value => "portalItem",
    }
    fields {}
}
