use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
    Desktop,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
            Platform::Desktop => "desktop",
        }
    }

    /// Browsers own the permission prompt, so the app never asks on `Web`.
    pub fn supports_permission_prompt(&self) -> bool {
        !matches!(self, Platform::Web)
    }

    pub fn native_texture_size(&self) -> TextureSize {
        match self {
            Platform::Ios => TextureSize {
                width: 1080,
                height: 1920,
            },
            _ => TextureSize {
                width: 1600,
                height: 1200,
            },
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::current()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_web_skips_prompt() {
        assert!(!Platform::Web.supports_permission_prompt());
        assert!(Platform::Ios.supports_permission_prompt());
        assert!(Platform::Android.supports_permission_prompt());
        assert!(Platform::Desktop.supports_permission_prompt());
    }

    #[test]
    fn test_native_texture_size() {
        assert_eq!(
            Platform::Ios.native_texture_size(),
            TextureSize {
                width: 1080,
                height: 1920
            }
        );
        assert_eq!(
            Platform::Android.native_texture_size(),
            TextureSize {
                width: 1600,
                height: 1200
            }
        );
    }
}
