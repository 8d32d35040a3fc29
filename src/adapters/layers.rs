//! Layer adapters, attached to the nearest map's layer list

use serde_json::Value;

use crate::lifecycle::manager::AttachTarget;

define_entity! {
    /// Layer backed by a feature service
    FeatureLayer => "layers/FeatureLayer", target: AttachTarget::Layers;
    constructor {
        url: String => "url",
        portal_item: Value => "portalItem",
    }
    fields {
        title: String => "title",
        opacity: f64 => "opacity",
        visible: bool => "visible",
        definition_expression: String => "definitionExpression",
        min_scale: f64 => "minScale",
        max_scale: f64 => "maxScale",
        popup_enabled: bool => "popupEnabled",
        labels_visible: bool => "labelsVisible",
        renderer: Value => "renderer",
    }
}

define_entity! {
    /// Client-side graphics
    GraphicsLayer => "layers/GraphicsLayer", target: AttachTarget::Layers;
    constructor {}
    fields {
        title: String => "title",
        opacity: f64 => "opacity",
        visible: bool => "visible",
        graphics: Vec<Value> => "graphics",
    }
}

define_entity! {
    TileLayer => "layers/TileLayer", target: AttachTarget::Layers;
    constructor {
        url: String => "url",
    }
    fields {
        title: String => "title",
        opacity: f64 => "opacity",
        visible: bool => "visible",
        min_scale: f64 => "minScale",
        max_scale: f64 => "maxScale",
    }
}

define_entity! {
    VectorTileLayer => "layers/VectorTileLayer", target: AttachTarget::Layers;
    constructor {
        url: String => "url",
    }
    fields {
        title: String => "title",
        opacity: f64 => "opacity",
        visible: bool => "visible",
        style: Value => "style",
    }
}

define_entity! {
    GeoJsonLayer => "layers/GeoJSONLayer", target: AttachTarget::Layers;
    constructor {
        url: String => "url",
    }
    fields {
        title: String => "title",
        opacity: f64 => "opacity",
        visible: bool => "visible",
        copyright: String => "copyright",
        renderer: Value => "renderer",
    }
}
