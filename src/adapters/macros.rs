//! Macros to reduce boilerplate in entity adapters
//!
//! Every adapter is a field list. [`define_entity!`](crate::define_entity)
//! turns one into a props struct with an `Option<T>` per field, builder-style
//! setters, and an [`EntityAdapter`](crate::adapters::EntityAdapter) impl that
//! knows the module name, the attach target and which fields are
//! constructor-only.
//!
//! Usage:
//! ```rust,ignore
//! define_entity! {
//!     /// Tiled imagery
//!     TileLayer => "layers/TileLayer", target: AttachTarget::Layers;
//!     constructor { url: String => "url" }
//!     fields { opacity: f64 => "opacity" }
//! }
//! ```
#[macro_export]
macro_rules! define_entity {
    (
        $(#[$meta:meta])*
        $name:ident => $module:literal, target: $target:expr;
        constructor { $($(#[$cmeta:meta])* $cfield:ident : $cty:ty => $ckey:literal),* $(,)? }
        fields { $($(#[$fmeta:meta])* $field:ident : $ty:ty => $key:literal),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $($(#[$cmeta])* pub $cfield: Option<$cty>,)*
            $($(#[$fmeta])* pub $field: Option<$ty>,)*
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            $(
                pub fn $cfield(mut self, value: impl Into<$cty>) -> Self {
                    self.$cfield = Some(value.into());
                    self
                }
            )*

            $(
                pub fn $field(mut self, value: impl Into<$ty>) -> Self {
                    self.$field = Some(value.into());
                    self
                }
            )*
        }

        impl $crate::adapters::EntityAdapter for $name {
            const MODULE: &'static str = $module;
            const CONSTRUCTOR_FIELDS: &'static [&'static str] = &[$($ckey),*];

            fn target() -> $crate::lifecycle::manager::AttachTarget {
                $target
            }

            fn bindings(&self) -> $crate::lifecycle::sync::PropertyBindings {
                $crate::lifecycle::sync::PropertyBindings::new()
                    $(.bind($ckey, $crate::adapters::field_value($ckey, &self.$cfield)))*
                    $(.bind($key, $crate::adapters::field_value($key, &self.$field)))*
            }
        }
    };
}
