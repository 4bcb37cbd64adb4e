//! Deterministic offline estimate used whenever the inference endpoint cannot
//! produce a report. Same signature in, identical numbers out.

use crate::models::{
    Alternative, AnalysisResult, CarbonBreakdown, CarbonFootprint, EnvironmentalEquivalents,
    ProductSignature, Provenance, WaterBreakdown, WaterUsage, round3,
};

struct CategoryProfile {
    label: &'static str,
    keywords: &'static [&'static str],
    /// kg CO2e per unit
    carbon: f64,
    /// liters per unit
    water: f64,
    /// production, transport, packaging, distribution
    carbon_shares: [f64; 4],
    score: i32,
    alternatives: &'static [(&'static str, &'static str)],
}

const GENERAL: CategoryProfile = CategoryProfile {
    label: "general",
    keywords: &[],
    carbon: 1.0,
    water: 100.0,
    carbon_shares: [0.6, 0.15, 0.15, 0.1],
    score: 0,
    alternatives: &[("Locally made equivalent", "Shorter transport distance")],
};

// First match wins, so more specific categories come first.
const CATEGORIES: &[CategoryProfile] = &[
    CategoryProfile {
        label: "meat",
        keywords: &["meat", "beef", "pork", "chicken", "poultry", "lamb", "seafood", "fish"],
        carbon: 6.0,
        water: 1500.0,
        carbon_shares: [0.8, 0.08, 0.05, 0.07],
        score: -20,
        alternatives: &[
            ("Plant-based protein", "Up to 90% lower emissions than red meat"),
            ("Legumes", "Minimal water and land use"),
        ],
    },
    CategoryProfile {
        label: "dairy",
        keywords: &["dairy", "milk", "cheese", "yogurt", "butter"],
        carbon: 2.4,
        water: 600.0,
        carbon_shares: [0.75, 0.1, 0.08, 0.07],
        score: -10,
        alternatives: &[
            ("Oat milk", "Lower emissions and water use than dairy"),
            ("Plant-based cheese", "Avoids livestock emissions"),
        ],
    },
    CategoryProfile {
        label: "beverages",
        keywords: &["beverage", "drink", "soda", "cola", "juice", "water", "coffee", "tea"],
        carbon: 0.3,
        water: 3.0,
        carbon_shares: [0.35, 0.15, 0.4, 0.1],
        score: 0,
        alternatives: &[
            ("Refillable bottle with tap water", "Eliminates single-use packaging"),
            ("Drinks in aluminum cans", "Higher recycling rates than plastic"),
        ],
    },
    CategoryProfile {
        label: "snacks",
        keywords: &["snack", "chips", "candy", "chocolate", "confection", "cookie"],
        carbon: 1.1,
        water: 120.0,
        carbon_shares: [0.6, 0.12, 0.2, 0.08],
        score: -5,
        alternatives: &[
            ("Fresh fruit", "Less processing and packaging"),
            ("Bulk nuts", "Reduced packaging per serving"),
        ],
    },
    CategoryProfile {
        label: "produce",
        keywords: &["produce", "fruit", "vegetable"],
        carbon: 0.4,
        water: 60.0,
        carbon_shares: [0.5, 0.3, 0.1, 0.1],
        score: 10,
        alternatives: &[("Seasonal local produce", "Avoids air freight and cold storage")],
    },
    CategoryProfile {
        label: "grains",
        keywords: &["bakery", "bread", "cereal", "grain", "pasta", "rice"],
        carbon: 0.8,
        water: 150.0,
        carbon_shares: [0.65, 0.15, 0.1, 0.1],
        score: 5,
        alternatives: &[("Whole grains from bulk bins", "Less packaging")],
    },
    CategoryProfile {
        label: "personal care",
        keywords: &["personal care", "cosmetic", "beauty", "shampoo", "soap"],
        carbon: 0.9,
        water: 25.0,
        carbon_shares: [0.5, 0.15, 0.25, 0.1],
        score: 0,
        alternatives: &[
            ("Solid shampoo bar", "No plastic bottle"),
            ("Refill station products", "Reusable containers"),
        ],
    },
    CategoryProfile {
        label: "household",
        keywords: &["household", "cleaning", "detergent", "paper"],
        carbon: 1.2,
        water: 40.0,
        carbon_shares: [0.55, 0.15, 0.2, 0.1],
        score: -5,
        alternatives: &[("Concentrated refills", "Less water shipped and less packaging")],
    },
];

const HIGH_IMPACT_INGREDIENTS: &[&str] = &[
    "beef", "lamb", "palm oil", "cocoa", "coffee", "cheese", "butter", "shrimp", "milk powder",
];
const HIGH_IMPACT_CARBON: f64 = 1.25;
const HIGH_IMPACT_WATER: f64 = 1.2;
const HIGH_IMPACT_SCORE: i32 = -15;

const ORGANIC_CARBON: f64 = 0.85;
const ORGANIC_WATER: f64 = 0.9;

const POSITIVE_SIGNALS: &[(&[&str], i32)] = &[
    (&["organic"], 15),
    (&["recycl"], 10),
    (&["local"], 10),
    (&["plant-based", "plant based", "vegan"], 10),
    (&["fair trade", "fairtrade"], 5),
    (&["compostable"], 5),
];

const NEGATIVE_SIGNALS: &[(&[&str], i32)] = &[
    (&["palm oil"], -10),
    (&["plastic"], -10),
    (&["artificial"], -5),
    (&["high fructose"], -5),
    (&["imported"], -5),
];

const BASE_SCORE: i32 = 50;

// water: agriculture, processing, packaging
const WATER_SHARES: [f64; 3] = [0.7, 0.2, 0.1];

fn profile_for(signature: &ProductSignature) -> &'static CategoryProfile {
    let haystack = if signature.category.trim().is_empty() {
        signature.name.to_lowercase()
    } else {
        signature.category.to_lowercase()
    };
    CATEGORIES
        .iter()
        .find(|p| p.keywords.iter().any(|k| haystack.contains(k)))
        .unwrap_or(&GENERAL)
}

fn signal_score(text: &str, table: &[(&[&str], i32)]) -> i32 {
    table
        .iter()
        .filter(|(tokens, _)| tokens.iter().any(|t| text.contains(t)))
        .map(|(_, delta)| delta)
        .sum()
}

/// Build a structurally valid report from category and ingredient signals alone.
pub fn estimate(signature: &ProductSignature) -> AnalysisResult {
    let signature = signature.normalized();
    let profile = profile_for(&signature);
    let text = signature.signal_text();

    let high_impact: Vec<&str> = HIGH_IMPACT_INGREDIENTS
        .iter()
        .copied()
        .filter(|token| signature.ingredients.iter().any(|i| i.contains(token)))
        .collect();
    let organic = text.contains("organic");

    let mut carbon = profile.carbon;
    let mut water = profile.water;
    if !high_impact.is_empty() {
        carbon *= HIGH_IMPACT_CARBON;
        water *= HIGH_IMPACT_WATER;
    }
    if organic {
        carbon *= ORGANIC_CARBON;
        water *= ORGANIC_WATER;
    }
    let carbon = round3(carbon);
    let water = round3(water);

    let mut score = BASE_SCORE + profile.score;
    score += signal_score(&text, POSITIVE_SIGNALS);
    score += signal_score(&text, NEGATIVE_SIGNALS);
    if !high_impact.is_empty() {
        score += HIGH_IMPACT_SCORE;
    }
    let score = score.clamp(0, 100) as u8;

    let [production, transport, packaging, distribution] = profile.carbon_shares;
    let carbon_footprint = CarbonFootprint {
        total: carbon,
        per_unit: carbon,
        breakdown: CarbonBreakdown {
            production: round3(carbon * production),
            transport: round3(carbon * transport),
            packaging: round3(carbon * packaging),
            distribution: round3(carbon * distribution),
        },
    };
    let [agriculture, processing, water_packaging] = WATER_SHARES;
    let water_usage = WaterUsage {
        total: water,
        breakdown: WaterBreakdown {
            agriculture: round3(water * agriculture),
            processing: round3(water * processing),
            packaging: round3(water * water_packaging),
        },
    };

    let mut key_findings = vec![format!(
        "Estimated {carbon:.2} kg CO2e and {water:.1} L of water per unit from the {} category profile",
        profile.label
    )];
    if !high_impact.is_empty() {
        key_findings.push(format!(
            "Contains high-impact ingredients: {}",
            high_impact.join(", ")
        ));
    }
    if organic {
        key_findings.push("Organic sourcing lowers the estimated footprint".to_string());
    }
    key_findings.push(
        "Offline estimate: detailed analysis was unavailable for this request".to_string(),
    );

    AnalysisResult {
        environmental_equivalents: EnvironmentalEquivalents::derive(carbon, water),
        carbon_footprint,
        water_usage,
        sustainability_score: score,
        alternatives: profile
            .alternatives
            .iter()
            .map(|(name, reason)| Alternative {
                name: name.to_string(),
                reason: reason.to_string(),
            })
            .collect(),
        key_findings,
        provenance: Provenance::Fallback,
        worker: None,
    }
}
