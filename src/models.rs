use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::cache::CacheKey;
use crate::error::AnalysisError;

// Conversion constants for derived environmental equivalents.
pub const TREES_PER_KG_CO2: f64 = 0.05;
pub const MILES_PER_KG_CO2: f64 = 2.5;
pub const GALLONS_PER_LITER: f64 = 0.264172;
pub const LITERS_PER_BOTTLE: f64 = 0.5;

pub const MAX_ALTERNATIVES: usize = 5;
pub const MAX_FINDINGS: usize = 10;

/// Product description a client submits for analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSignature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "ingredient_list")]
    pub ingredients: Vec<String>,
}

// Clients send ingredients either as a list or as one comma-separated string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Ingredients {
    List(Vec<String>),
    Text(String),
    Missing(()),
}

fn ingredient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Ingredients::deserialize(deserializer)? {
        Ingredients::List(items) => items,
        Ingredients::Text(text) => text.split(',').map(str::to_string).collect(),
        Ingredients::Missing(()) => Vec::new(),
    })
}

fn canonical(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ProductSignature {
    pub fn new(name: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            ..Self::default()
        }
    }

    pub fn with_brand(mut self, brand: &str) -> Self {
        self.brand = brand.to_string();
        self
    }

    pub fn with_ingredients(mut self, ingredients: &[&str]) -> Self {
        self.ingredients = ingredients.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Canonical form used for cache keys and heuristics: trimmed, lower-cased,
    /// whitespace collapsed, ingredients de-duplicated and sorted.
    pub fn normalized(&self) -> Self {
        let mut ingredients: Vec<String> = self
            .ingredients
            .iter()
            .map(|i| canonical(i))
            .filter(|i| !i.is_empty())
            .collect();
        ingredients.sort();
        ingredients.dedup();

        Self {
            name: canonical(&self.name),
            brand: canonical(&self.brand),
            category: canonical(&self.category),
            ingredients,
        }
    }

    /// Normalize and check that the signature names at least a product or a category.
    pub fn validate(&self) -> Result<Self, AnalysisError> {
        let normalized = self.normalized();
        if normalized.name.is_empty() && normalized.category.is_empty() {
            return Err(AnalysisError::InvalidRequest(
                "product data must include a name or a category".to_string(),
            ));
        }
        Ok(normalized)
    }

    /// All free text of the signature, for keyword matching.
    pub fn signal_text(&self) -> String {
        let mut text = format!("{} {} {}", self.name, self.brand, self.category);
        for ingredient in &self.ingredients {
            text.push(' ');
            text.push_str(ingredient);
        }
        text.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    #[default]
    Upstream,
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CarbonBreakdown {
    pub production: f64,
    pub transport: f64,
    pub packaging: f64,
    pub distribution: f64,
}

impl CarbonBreakdown {
    pub fn sum(&self) -> f64 {
        self.production + self.transport + self.packaging + self.distribution
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CarbonFootprint {
    /// kg CO2e
    pub total: f64,
    pub per_unit: f64,
    pub breakdown: CarbonBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WaterBreakdown {
    pub agriculture: f64,
    pub processing: f64,
    pub packaging: f64,
}

impl WaterBreakdown {
    pub fn sum(&self) -> f64 {
        self.agriculture + self.processing + self.packaging
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WaterUsage {
    /// liters
    pub total: f64,
    pub breakdown: WaterBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvironmentalEquivalents {
    pub trees_needed: f64,
    pub miles_driven: f64,
    pub water_in_gallons: f64,
    pub plastic_bottles: f64,
}

impl EnvironmentalEquivalents {
    pub fn derive(carbon_kg: f64, water_liters: f64) -> Self {
        Self {
            trees_needed: round3(carbon_kg * TREES_PER_KG_CO2),
            miles_driven: round3(carbon_kg * MILES_PER_KG_CO2),
            water_in_gallons: round3(water_liters * GALLONS_PER_LITER),
            plastic_bottles: round3(water_liters / LITERS_PER_BOTTLE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Alternative {
    pub name: String,
    pub reason: String,
}

/// Structured impact report returned to every caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisResult {
    pub carbon_footprint: CarbonFootprint,
    pub water_usage: WaterUsage,
    pub environmental_equivalents: EnvironmentalEquivalents,
    #[serde(deserialize_with = "clamped_score")]
    pub sustainability_score: u8,
    pub alternatives: Vec<Alternative>,
    pub key_findings: Vec<String>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

// Models report scores as floats and sometimes out of range.
fn clamped_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(if raw.is_finite() {
        raw.round().clamp(0.0, 100.0) as u8
    } else {
        0
    })
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

impl AnalysisResult {
    pub fn with_worker(mut self, worker: impl fmt::Display) -> Self {
        self.worker = Some(worker.to_string());
        self
    }

    /// Enforce the report invariants: finite non-negative numbers, breakdowns that
    /// add up to their totals, equivalents derived from the totals, bounded lists.
    pub fn sanitized(mut self) -> Self {
        let carbon = &mut self.carbon_footprint;
        carbon.total = non_negative(carbon.total);
        carbon.per_unit = non_negative(carbon.per_unit);
        let b = &mut carbon.breakdown;
        b.production = non_negative(b.production);
        b.transport = non_negative(b.transport);
        b.packaging = non_negative(b.packaging);
        b.distribution = non_negative(b.distribution);

        let parts = b.sum();
        if parts > 0.0 {
            if (parts - carbon.total).abs() > carbon.total.max(parts) * 0.01 {
                carbon.total = round3(parts);
            }
        } else if carbon.total > 0.0 {
            let total = carbon.total;
            *b = CarbonBreakdown {
                production: round3(total * 0.6),
                transport: round3(total * 0.15),
                packaging: round3(total * 0.15),
                distribution: round3(total * 0.1),
            };
        }
        if carbon.per_unit == 0.0 {
            carbon.per_unit = carbon.total;
        }

        let water = &mut self.water_usage;
        water.total = non_negative(water.total);
        let w = &mut water.breakdown;
        w.agriculture = non_negative(w.agriculture);
        w.processing = non_negative(w.processing);
        w.packaging = non_negative(w.packaging);

        let parts = w.sum();
        if parts > 0.0 {
            if (parts - water.total).abs() > water.total.max(parts) * 0.01 {
                water.total = round3(parts);
            }
        } else if water.total > 0.0 {
            let total = water.total;
            *w = WaterBreakdown {
                agriculture: round3(total * 0.7),
                processing: round3(total * 0.2),
                packaging: round3(total * 0.1),
            };
        }

        self.environmental_equivalents =
            EnvironmentalEquivalents::derive(self.carbon_footprint.total, self.water_usage.total);
        self.sustainability_score = self.sustainability_score.min(100);
        self.alternatives.retain(|a| !a.name.trim().is_empty());
        self.alternatives.truncate(MAX_ALTERNATIVES);
        self.key_findings.retain(|f| !f.trim().is_empty());
        self.key_findings.truncate(MAX_FINDINGS);
        self
    }
}

/// What a caller receives for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub result: AnalysisResult,
    /// Served from the shared cache rather than computed for this request.
    pub cached: bool,
}

/// One unit of queued work. Lives until its handle is resolved.
pub struct AnalysisRequest {
    pub signature: ProductSignature,
    pub key: CacheKey,
    pub priority: Priority,
    pub submitted_at: Instant,
    result_handle: oneshot::Sender<Submission>,
}

impl AnalysisRequest {
    pub fn new(
        signature: ProductSignature,
        key: CacheKey,
        priority: Priority,
    ) -> (Self, oneshot::Receiver<Submission>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            signature,
            key,
            priority,
            submitted_at: Instant::now(),
            result_handle: tx,
        };
        (request, rx)
    }

    /// Consume the request and hand its result to the waiting caller. A caller
    /// that discarded its handle is ignored.
    pub fn resolve(self, submission: Submission) {
        let _ = self.result_handle.send(submission);
    }
}

impl fmt::Debug for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRequest")
            .field("name", &self.signature.name)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .finish()
    }
}
