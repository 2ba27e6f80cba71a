//! Layer recipe table.
//!
//! Maps each sound id to its role and its ordered list of [`LayerSpec`]s. The
//! table is pure data: loaded once, validated at load time, never mutated.
//! The built-in table ships as `recipes/ambiance.json` inside the crate.

use std::collections::HashMap;

use ambiance_core::filters::SvfMode;
use ambiance_core::noise::NoiseColor;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RecipeError;

const BUILTIN: &str = include_str!("../recipes/ambiance.json");

/// Secondary depth used when a recipe names a secondary rate only.
pub const DEFAULT_SECONDARY_DEPTH: f32 = 0.2;

/// Background sounds are exclusive (one at a time, crossfaded); assets stack freely.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Background,
    Asset,
}

/// Extra triangle LFO layered on the primary one.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecondaryLfo {
    pub rate_hz: f32,
    #[serde(default = "default_secondary_depth")]
    pub depth: f32,
}

fn default_secondary_depth() -> f32 {
    DEFAULT_SECONDARY_DEPTH
}

/// Gain modulation: a sine LFO whose amplitude is `gain * depth`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LfoSpec {
    pub rate_hz: f32,
    pub depth: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SecondaryLfo>,
}

/// One noise → filter → gain chain.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    pub noise: NoiseColor,
    pub filter: SvfMode,
    pub freq_hz: f32,
    /// Low/high-pass: corner resonance in dB. Band-pass: linear quality factor.
    pub q: f32,
    pub gain: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lfo: Option<LfoSpec>,
}

impl LayerSpec {
    /// Highest gain the modulation can reach: `gain * (1 + depth + secondary depth)`.
    pub fn peak_gain(&self) -> f32 {
        let depth = self.lfo.map_or(0.0, |l| l.depth + l.secondary.map_or(0.0, |s| s.depth));
        self.gain * (1.0 + depth)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub id: String,
    pub role: Role,
    pub layers: Vec<LayerSpec>,
}

#[derive(Deserialize)]
struct TableFile {
    sounds: Vec<Recipe>,
}

/// Validated, read-only recipe table.
#[derive(Clone, Debug)]
pub struct RecipeTable {
    recipes: Vec<Recipe>,
    index: HashMap<String, usize>,
}

impl RecipeTable {
    /// The table embedded in the crate.
    pub fn builtin() -> Result<Self, RecipeError> {
        Self::from_json(BUILTIN)
    }

    pub fn from_json(text: &str) -> Result<Self, RecipeError> {
        let file: TableFile = serde_json::from_str(text)?;
        Self::new(file.sounds)
    }

    /// Validate `recipes` and build the table. Order is preserved for listing.
    pub fn new(recipes: Vec<Recipe>) -> Result<Self, RecipeError> {
        let mut index = HashMap::with_capacity(recipes.len());
        for (i, r) in recipes.iter().enumerate() {
            validate(r)?;
            if index.insert(r.id.clone(), i).is_some() {
                return Err(RecipeError::DuplicateId { id: r.id.clone() });
            }
        }
        Ok(Self { recipes, index })
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.index.get(id).map(|&i| &self.recipes[i])
    }

    #[inline] pub fn contains(&self, id: &str) -> bool { self.index.contains_key(id) }
    #[inline] pub fn len(&self) -> usize { self.recipes.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.recipes.is_empty() }

    pub fn role(&self, id: &str) -> Option<Role> {
        self.get(id).map(|r| r.role)
    }

    /// Membership test separating backgrounds from assets.
    pub fn is_background(&self, id: &str) -> bool {
        self.role(id) == Some(Role::Background)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.recipes.iter().map(|r| r.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> + '_ {
        self.recipes.iter()
    }

    pub fn backgrounds(&self) -> impl Iterator<Item = &Recipe> + '_ {
        self.recipes.iter().filter(|r| r.role == Role::Background)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Recipe> + '_ {
        self.recipes.iter().filter(|r| r.role == Role::Asset)
    }
}

fn validate(r: &Recipe) -> Result<(), RecipeError> {
    if r.id.trim().is_empty() {
        return Err(RecipeError::EmptyId);
    }
    if r.layers.is_empty() {
        return Err(RecipeError::NoLayers { id: r.id.clone() });
    }
    let positive = |layer: usize, field: &'static str, value: f32| {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(RecipeError::NonPositive { id: r.id.clone(), layer, field, value })
        }
    };
    let unit = |layer: usize, field: &'static str, value: f32| {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(RecipeError::OutOfRange { id: r.id.clone(), layer, field, value })
        }
    };

    for (i, l) in r.layers.iter().enumerate() {
        positive(i, "freq_hz", l.freq_hz)?;
        positive(i, "q", l.q)?;
        unit(i, "gain", l.gain)?;
        if let Some(lfo) = &l.lfo {
            positive(i, "lfo.rate_hz", lfo.rate_hz)?;
            unit(i, "lfo.depth", lfo.depth)?;
            if let Some(sec) = &lfo.secondary {
                positive(i, "lfo.secondary.rate_hz", sec.rate_hz)?;
                unit(i, "lfo.secondary.depth", sec.depth)?;
            }
        }
        let peak = l.peak_gain();
        if peak > 1.0 {
            warn!(sound_id = %r.id, layer = i, peak, "layer modulation exceeds unity gain");
        }
    }
    Ok(())
}
