// [[AUTORL]]/apps/autorl-kernel/src/screens.rs
// Purpose: Screen Registry. Named mock-device layouts (element name -> geometry).
// Architecture: Device Mock Layer
// Dependencies: DashMap, Models

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::KernelError;
use crate::models::Rect;

pub const SCREEN_BANKING: &str = "banking";
pub const SCREEN_BANKING_UPDATED: &str = "banking_updated";
pub const SCREEN_BANKING_BROKEN: &str = "banking_broken";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenLayout {
    pub name: String,
    pub elements: HashMap<String, Rect>,
}

impl ScreenLayout {
    fn with_elements(name: &str, elements: &[(&str, Rect)]) -> Self {
        Self {
            name: name.to_string(),
            elements: elements
                .iter()
                .map(|(id, rect)| (id.to_string(), *rect))
                .collect(),
        }
    }
}

pub struct ScreenRegistry {
    layouts: DashMap<String, ScreenLayout>,
}

impl ScreenRegistry {
    /// Registry holding only the built-in layouts.
    pub fn with_defaults() -> Self {
        let registry = Self {
            layouts: DashMap::new(),
        };
        registry.register_fallback_layouts();
        registry
    }

    /// Loads layouts from `path`. A missing or malformed file leaves the
    /// built-in layouts in place.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let registry = Self {
            layouts: DashMap::new(),
        };

        match read_layouts(path) {
            Ok(layouts) if !layouts.is_empty() => {
                for layout in layouts {
                    registry.register(layout);
                }
            }
            Ok(_) => {
                tracing::warn!("Screen file {} is empty. Loading fallback layouts.", path.display());
                registry.register_fallback_layouts();
            }
            Err(e) => {
                tracing::warn!("{}. Loading fallback layouts.", e);
                registry.register_fallback_layouts();
            }
        }

        registry
    }

    pub fn register(&self, layout: ScreenLayout) {
        tracing::debug!(
            "Registering screen layout [{}] with {} elements",
            layout.name,
            layout.elements.len()
        );
        self.layouts.insert(layout.name.clone(), layout);
    }

    pub fn element(&self, screen: &str, element: &str) -> Option<Rect> {
        self.layouts
            .get(screen)
            .and_then(|layout| layout.elements.get(element).copied())
    }

    pub fn contains(&self, screen: &str) -> bool {
        self.layouts.contains_key(screen)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layouts.iter().map(|l| l.key().clone()).collect();
        names.sort();
        names
    }

    fn register_fallback_layouts(&self) {
        let amount = ("amount", Rect::new(40, 420, 280, 48));
        let confirm = ("confirm", Rect::new(40, 560, 280, 56));

        self.register(ScreenLayout::with_elements(
            SCREEN_BANKING,
            &[("send-money", Rect::new(40, 300, 280, 56)), amount, confirm],
        ));
        // After an app update the button is relabelled
        self.register(ScreenLayout::with_elements(
            SCREEN_BANKING_UPDATED,
            &[("pay", Rect::new(40, 300, 280, 56)), amount, confirm],
        ));
        self.register(ScreenLayout::with_elements(
            SCREEN_BANKING_BROKEN,
            &[amount, confirm],
        ));
        self.register(ScreenLayout::with_elements(
            "calendar",
            &[
                ("event-card", Rect::new(24, 180, 312, 120)),
                ("send-invite", Rect::new(60, 640, 240, 52)),
            ],
        ));
        self.register(ScreenLayout::with_elements(
            "chat",
            &[("message-input", Rect::new(20, 760, 320, 48))],
        ));
    }
}

fn read_layouts(path: &Path) -> Result<Vec<ScreenLayout>, KernelError> {
    let data = fs::read_to_string(path).map_err(|e| KernelError::ScreenFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str::<Vec<ScreenLayout>>(&data).map_err(|e| KernelError::ScreenFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
