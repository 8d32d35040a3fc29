//! Widget adapters, placed on the nearest view's UI overlay

use serde_json::Value;

use crate::lifecycle::manager::AttachTarget;
use crate::traits::UiPosition;

define_entity! {
    Legend => "widgets/Legend", target: AttachTarget::ui(UiPosition::BottomLeft);
    constructor {}
    fields {
        layer_infos: Vec<Value> => "layerInfos",
        respect_layer_visibility: bool => "respectLayerVisibility",
        legend_style: Value => "style",
    }
}

define_entity! {
    Search => "widgets/Search", target: AttachTarget::ui(UiPosition::TopRight);
    constructor {
        include_default_sources: bool => "includeDefaultSources",
    }
    fields {
        search_term: String => "searchTerm",
        popup_enabled: bool => "popupEnabled",
        result_graphic_enabled: bool => "resultGraphicEnabled",
    }
}

define_entity! {
    Zoom => "widgets/Zoom", target: AttachTarget::ui(UiPosition::TopLeft);
    constructor {}
    fields {
        layout: String => "layout",
    }
}

define_entity! {
    ScaleBar => "widgets/ScaleBar", target: AttachTarget::ui(UiPosition::BottomLeft);
    constructor {}
    fields {
        unit: String => "unit",
        bar_style: String => "style",
    }
}

define_entity! {
    LayerList => "widgets/LayerList", target: AttachTarget::ui(UiPosition::TopRight);
    constructor {}
    fields {
        selection_enabled: bool => "selectionEnabled",
        drag_enabled: bool => "dragEnabled",
    }
}

define_entity! {
    BasemapToggle => "widgets/BasemapToggle", target: AttachTarget::ui(UiPosition::BottomRight);
    constructor {}
    fields {
        next_basemap: String => "nextBasemap",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EntityAdapter;

    #[test]
    fn test_widgets_default_to_their_corner() {
        assert!(matches!(
            Zoom::target(),
            AttachTarget::Ui { position: UiPosition::TopLeft }
        ));
        assert!(matches!(
            BasemapToggle::target(),
            AttachTarget::Ui { position: UiPosition::BottomRight }
        ));
    }

    #[test]
    fn test_renamed_field_keeps_engine_key() {
        let bindings = ScaleBar::new().unit("metric").bar_style("line").bindings();
        assert!(bindings.get("style").is_some());
        assert!(bindings.get("bar_style").is_none());
    }
}
