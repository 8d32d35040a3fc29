//! View adapters; the surface is supplied when the node is built

use serde_json::Value;

use crate::lifecycle::manager::AttachTarget;

define_entity! {
    /// 2D view
    MapView => "views/MapView", target: AttachTarget::Detached;
    constructor {}
    fields {
        center: Vec<f64> => "center",
        zoom: f64 => "zoom",
        scale: f64 => "scale",
        rotation: f64 => "rotation",
        padding: Value => "padding",
        constraints: Value => "constraints",
    }
}

define_entity! {
    /// 3D view
    SceneView => "views/SceneView", target: AttachTarget::Detached;
    constructor {
        quality_profile: String => "qualityProfile",
    }
    fields {
        center: Vec<f64> => "center",
        zoom: f64 => "zoom",
        scale: f64 => "scale",
        camera: Value => "camera",
    }
}
