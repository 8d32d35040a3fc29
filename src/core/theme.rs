//! Scoped light/dark theme
//!
//! The theme is an ordinary ambient value: a [`ThemeProvider`] publishes it into
//! its own child scope and withdraws it again on unmount, so nothing outside the
//! provider's subtree ever observes the toggle.

use serde::{Deserialize, Serialize};

use crate::core::context::{Provision, Scope};
use crate::lifecycle::{DeclarativeNode, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

/// Provides a theme to its subtree
pub struct ThemeProvider {
    scope: Option<Scope>,
    theme: Theme,
    mounted: bool,
}

impl ThemeProvider {
    pub fn new() -> Self {
        Self {
            scope: None,
            theme: Theme::default(),
            mounted: false,
        }
    }

    /// Scope to mount descendants into; `None` before mount
    pub fn child_scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if theme == self.theme {
            return;
        }
        self.theme = theme;
        if self.mounted {
            if let Some(scope) = &self.scope {
                scope.provide(Provision::theme(theme));
            }
        }
    }

    pub fn toggle(&mut self) -> Theme {
        self.set_theme(self.theme.toggled());
        self.theme
    }
}

impl Default for ThemeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclarativeNode for ThemeProvider {
    type Props = Theme;

    fn mount(&mut self, scope: &Scope, props: Theme) {
        let child = scope.child();
        self.theme = props;
        child.provide(Provision::theme(props));
        self.scope = Some(child);
        self.mounted = true;
    }

    fn update(&mut self, props: Theme) {
        self.set_theme(props);
    }

    fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        if let Some(scope) = &self.scope {
            scope.withdraw();
        }
    }

    fn phase(&self) -> Phase {
        match (self.mounted, &self.scope) {
            (true, _) => Phase::Live,
            (false, Some(_)) => Phase::Destroyed,
            (false, None) => Phase::Unresolved,
        }
    }
}

impl Drop for ThemeProvider {
    fn drop(&mut self) {
        self.unmount();
    }
}
