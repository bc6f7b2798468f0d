//! Icon references handed to the notification area.
//!
//! The crate never decodes image files. An icon is either a name the shell
//! resolves itself, a path the shell loads, or pixels the application already
//! decoded.

use std::path::{Path, PathBuf};

use crate::error::{TrayError, TrayResult};

/// Reference to the image shown in the notification area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Icon {
    /// Name from the freedesktop icon theme, e.g. `"application-x-executable"`.
    Name(String),
    /// Image file loaded by the shell (`.ico` on Windows, `.png`/`.svg` elsewhere).
    Path(PathBuf),
    /// Raw pixels, 4 bytes per pixel in ARGB order.
    Pixmap {
        width: i32,
        height: i32,
        argb: Vec<u8>,
    },
}

impl Default for Icon {
    fn default() -> Self {
        Icon::Name("application-x-executable".to_string())
    }
}

impl Icon {
    /// Creates an icon from a theme name.
    pub fn name(name: impl Into<String>) -> Self {
        Icon::Name(name.into())
    }

    /// Creates an icon from an image path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Icon::Path(path.into())
    }

    /// Creates a pixmap icon from RGBA bytes, converting them to ARGB.
    pub fn from_rgba(width: i32, height: i32, mut rgba: Vec<u8>) -> TrayResult<Self> {
        check_dimensions(width, height, rgba.len())?;
        for pixel in rgba.chunks_exact_mut(4) {
            pixel.rotate_right(1);
        }
        Ok(Icon::Pixmap {
            width,
            height,
            argb: rgba,
        })
    }

    /// Checks that the reference can be handed to a shell.
    pub fn validate(&self) -> TrayResult<()> {
        match self {
            Icon::Name(name) if name.is_empty() => Err(TrayError::init("icon name is empty")),
            Icon::Path(path) if path.as_os_str().is_empty() => {
                Err(TrayError::init("icon path is empty"))
            }
            Icon::Pixmap {
                width,
                height,
                argb,
            } => check_dimensions(*width, *height, argb.len()),
            _ => Ok(()),
        }
    }

    /// Splits a path icon into the theme directory and icon name shells that
    /// only understand theme lookups expect.
    pub fn theme_lookup(path: &Path) -> Option<(String, String)> {
        let dir = path.parent()?.to_str()?.to_string();
        let name = path.file_stem()?.to_str()?.to_string();
        Some((dir, name))
    }
}

fn check_dimensions(width: i32, height: i32, len: usize) -> TrayResult<()> {
    if width <= 0 || height <= 0 {
        return Err(TrayError::init(format!(
            "invalid icon dimensions: {width}x{height}"
        )));
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(TrayError::init(format!(
            "icon data size mismatch: expected {expected}, got {len}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_is_rotated_to_argb() {
        let icon = Icon::from_rgba(1, 1, vec![0x11, 0x22, 0x33, 0x44]).expect("valid icon");
        assert_eq!(
            icon,
            Icon::Pixmap {
                width: 1,
                height: 1,
                argb: vec![0x44, 0x11, 0x22, 0x33],
            }
        );
    }

    #[test]
    fn mismatched_pixmap_is_rejected() {
        assert!(Icon::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Icon::from_rgba(0, 2, Vec::new()).is_err());
        let icon = Icon::Pixmap {
            width: 2,
            height: 1,
            argb: vec![0; 4],
        };
        assert!(icon.validate().is_err());
    }

    #[test]
    fn empty_references_are_rejected() {
        assert!(Icon::name("").validate().is_err());
        assert!(Icon::path("").validate().is_err());
        assert!(Icon::default().validate().is_ok());
    }

    #[test]
    fn theme_lookup_splits_path() {
        let (dir, name) =
            Icon::theme_lookup(Path::new("/usr/share/app/icons/tray.png")).expect("lookup");
        assert_eq!(dir, "/usr/share/app/icons");
        assert_eq!(name, "tray");
    }
}
