//! Tray presentation settings.

/// Tooltip shown when hovering the tray icon.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tooltip {
    /// Main tooltip text.
    pub title: String,
    /// Text displayed below the title.
    pub description: String,
    /// Icon name from the freedesktop icon theme.
    pub icon_name: String,
}

/// Settings that stay fixed for the lifetime of a session.
///
/// Everything that changes with the menu lives in [`TrayState`](crate::TrayState)
/// instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrayConfig {
    /// Unique identifier for this tray icon, e.g. `"com.example.myapp"`.
    pub id: String,
    /// Title text of the tray icon.
    pub title: String,
    /// Hover tooltip.
    pub tooltip: Tooltip,
    /// Extra path to search for icon themes.
    pub icon_theme_path: String,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            id: "tray_icon".to_string(),
            title: "Tray Icon".to_string(),
            tooltip: Tooltip::default(),
            icon_theme_path: String::new(),
        }
    }
}

impl TrayConfig {
    /// Creates a config with the given id and default presentation.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_tooltip(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.tooltip.title = title.into();
        self.tooltip.description = description.into();
        self
    }

    pub fn with_icon_theme_path(mut self, path: impl Into<String>) -> Self {
        self.icon_theme_path = path.into();
        self
    }

    /// Text the shell shows on hover: the tooltip title, or the tray title if unset.
    pub fn hover_text(&self) -> &str {
        if self.tooltip.title.is_empty() {
            &self.title
        } else {
            &self.tooltip.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TrayConfig::default();
        assert_eq!(config.id, "tray_icon");
        assert_eq!(config.title, "Tray Icon");
        assert_eq!(config.hover_text(), "Tray Icon");
    }

    #[test]
    fn tooltip_overrides_hover_text() {
        let config = TrayConfig::new("com.example.app")
            .with_title("Example")
            .with_tooltip("Example is running", "2 jobs queued");
        assert_eq!(config.id, "com.example.app");
        assert_eq!(config.hover_text(), "Example is running");
        assert_eq!(config.tooltip.description, "2 jobs queued");
    }
}
