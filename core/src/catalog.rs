//! The collectible catalog: a fixed, ordered list of item definitions.
//!
//! Exactly one item is flagged hidden. It never appears as decoration
//! and can only be won through the gated special pull.

use crate::{
    error::{LullabyError, LullabyResult},
    types::ItemId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub glyph: String,
    pub label: String,
    /// Shown once when the item is revealed.
    pub message: String,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Item {
    fn new(id: &str, glyph: &str, label: &str, message: &str) -> Self {
        Self {
            id: id.into(),
            glyph: glyph.into(),
            label: label.into(),
            message: message.into(),
            is_hidden: false,
        }
    }

    fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    items: Vec<Item>,
    #[serde(skip)]
    hidden_index: usize,
}

impl Catalog {
    /// Validate and wrap an item list.
    /// Requires unique ids, exactly one hidden item and at least
    /// two non-hidden items (a losing result needs two distinct faces).
    pub fn from_items(items: Vec<Item>) -> LullabyResult<Self> {
        let mut seen = HashSet::new();
        for item in &items {
            if item.id.is_empty() {
                return Err(LullabyError::InvalidCatalog {
                    reason: "item with empty id".into(),
                });
            }
            if !seen.insert(item.id.as_str()) {
                return Err(LullabyError::InvalidCatalog {
                    reason: format!("duplicate item id '{}'", item.id),
                });
            }
        }

        let hidden: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_hidden)
            .map(|(idx, _)| idx)
            .collect();
        let hidden_index = match hidden.as_slice() {
            [idx] => *idx,
            other => {
                return Err(LullabyError::InvalidCatalog {
                    reason: format!("expected exactly one hidden item, found {}", other.len()),
                })
            }
        };

        if items.len() - 1 < 2 {
            return Err(LullabyError::InvalidCatalog {
                reason: "at least two non-hidden items are required".into(),
            });
        }

        Ok(Self { items, hidden_index })
    }

    /// Load a catalog from a JSON file of the form `{"items": [...]}`.
    pub fn load(path: &str) -> LullabyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&content)?;
        Self::from_items(file.items)
    }

    /// The shipped 26-item bedtime catalog.
    pub fn standard() -> Self {
        let items = vec![
            Item::new(
                "sheep",
                "🐑",
                "Counting Sheep",
                "One sheep, two sheep... every worry has wandered off.",
            ),
            Item::new(
                "milk",
                "🥛",
                "Warm Milk",
                "A warm cup before bed makes you the undisputed sleep champion.",
            ),
            Item::new(
                "moon",
                "🌕",
                "Full Moon",
                "A perfectly full moon. Tonight's sleep is guaranteed.",
            ),
            Item::new(
                "bear",
                "🧸",
                "Cuddle Bear",
                "Every plush on the pillow is keeping watch tonight.",
            ),
            Item::new(
                "bath",
                "🛁",
                "Bubble Bath",
                "Face mask on, bubbles up, the evening ritual begins.",
            ),
            Item::new(
                "book",
                "📖",
                "Bedtime Story",
                "Sleep on it. The simulation will pass in the morning.",
            ),
            Item::new(
                "phone",
                "📱",
                "Phone Scroll",
                "Still scrolling? Put it down, the feed will wait.",
            ),
            Item::new(
                "tea",
                "🍵",
                "Herbal Tea",
                "Chamomile now, a home-cooked feast some other day.",
            ),
            Item::new(
                "music",
                "🎵",
                "White Noise",
                "Play your favourite song once, then lights out.",
            ),
            Item::new(
                "candle",
                "🕯️",
                "Scented Candle",
                "Warm toes, cool head, exactly as it should be.",
            ),
            Item::new(
                "yoga",
                "🧘",
                "Gentle Yoga",
                "Stretch now, badminton after the holidays.",
            ),
            Item::new(
                "cat",
                "🐱",
                "Purring Cat",
                "This cat is coming home with you. No arguments.",
            ),
            Item::new(
                "star",
                "🌟",
                "Counting Stars",
                "One star, two stars, eyelids getting heavier...",
            ),
            Item::new(
                "cloud",
                "☁️",
                "Cloud Bed",
                "Drawing this means tonight's dreams are sweet ones.",
            ),
            Item::new(
                "socks",
                "🧦",
                "Fluffy Socks",
                "Warm feet, warm everything. No nightmares allowed.",
            ),
            Item::new(
                "mask",
                "🕶️",
                "Steam Eye Mask",
                "Next trip, dinner above the city skyline.",
            ),
            Item::new(
                "pillow",
                "🛌",
                "Soft Pillow",
                "Back-to-bed mode activated. Cannot get up. Can sleep more.",
            ),
            Item::new(
                "rain",
                "🌧️",
                "Rain Sounds",
                "Five more minutes. Five more minutes. Five more minutes.",
            ),
            Item::new(
                "night",
                "🌃",
                "City Lights",
                "The to-do list is long. One item at a time, then sleep.",
            ),
            Item::new(
                "chime",
                "🎐",
                "Wind Chime",
                "Still listening to that one album on repeat?",
            ),
            Item::new(
                "dreamcatcher",
                "🕸️",
                "Dreamcatcher",
                "No bad dreams get through tonight.",
            ),
            Item::new(
                "fireplace",
                "🔥",
                "Fireplace",
                "Cosy and warm, ready for tomorrow's big breakfast.",
            ),
            Item::new(
                "hammock",
                "🏕️",
                "Hammock",
                "Your work needs you. You do not need your work.",
            ),
            Item::new(
                "lavender",
                "🌿",
                "Lavender",
                "Looking forward to that woody scent again.",
            ),
            Item::new(
                "balloon",
                "🎈",
                "Hot Air Balloon",
                "Stay free and happy, and take lots of photos.",
            ),
            Item::new(
                "unicorn",
                "🦄",
                "Hidden: Sleep Keeper",
                "You found the secret. Of all the small chances that had to line up \
                 for two people to meet, this one was the luckiest. Good night.",
            )
            .hidden(),
        ];
        // The literal list above is known-valid.
        let hidden_index = items.len() - 1;
        Self { items, hidden_index }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn hidden(&self) -> &Item {
        &self.items[self.hidden_index]
    }

    /// All non-hidden items, in catalog order.
    pub fn standard_items(&self) -> Vec<&Item> {
        self.items.iter().filter(|i| !i.is_hidden).collect()
    }

    pub fn standard_count(&self) -> usize {
        self.items.len() - 1
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}
