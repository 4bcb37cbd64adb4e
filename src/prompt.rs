use crate::error::UpstreamError;
use crate::models::{AnalysisResult, ProductSignature, Provenance};
use crate::upstream::RawResponse;

const RESPONSE_SHAPE: &str = r#"{
  "carbonFootprint": {"total": number, "perUnit": number,
    "breakdown": {"production": number, "transport": number, "packaging": number, "distribution": number}},
  "waterUsage": {"total": number, "breakdown": {"agriculture": number, "processing": number, "packaging": number}},
  "sustainabilityScore": number,
  "alternatives": [{"name": string, "reason": string}],
  "keyFindings": [string]
}"#;

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "unknown" } else { value }
}

/// Instruction sent to the inference endpoint for one product.
pub fn build_prompt(signature: &ProductSignature) -> String {
    let ingredients = if signature.ingredients.is_empty() {
        "not listed".to_string()
    } else {
        signature.ingredients.join(", ")
    };
    format!(
        "Analyze the environmental impact of one unit of this product.\n\
         Product: {}\nBrand: {}\nCategory: {}\nIngredients: {}\n\n\
         Carbon values are kg CO2e, water values are liters, the sustainability score is 0-100.\n\
         Suggest at most 3 alternatives and at most 5 key findings.\n\
         Respond with JSON only, in exactly this shape:\n{}",
        or_unknown(&signature.name),
        or_unknown(&signature.brand),
        or_unknown(&signature.category),
        ingredients,
        RESPONSE_SHAPE
    )
}

// Models sometimes wrap the object in prose or code fences.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse the endpoint's text into a sanitized report tagged as upstream.
pub fn parse_report(raw: &RawResponse) -> Result<AnalysisResult, UpstreamError> {
    let body = json_object(&raw.text)
        .ok_or_else(|| UpstreamError::Malformed("no JSON object in response".to_string()))?;
    let mut report: AnalysisResult =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
    if report.carbon_footprint.total <= 0.0 && report.carbon_footprint.breakdown.sum() <= 0.0 {
        return Err(UpstreamError::Malformed(
            "response carries no carbon footprint".to_string(),
        ));
    }
    report.provenance = Provenance::Upstream;
    report.worker = None;
    Ok(report.sanitized())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawResponse {
        RawResponse {
            model: Some("llama3".to_string()),
            text: text.to_string(),
        }
    }

    #[test]
    fn prompt_mentions_every_field() {
        let sig = ProductSignature::new("cola", "beverages")
            .with_brand("fizzco")
            .with_ingredients(&["sugar", "water"]);
        let prompt = build_prompt(&sig);
        assert!(prompt.contains("Product: cola"));
        assert!(prompt.contains("Brand: fizzco"));
        assert!(prompt.contains("Ingredients: sugar, water"));
        assert!(build_prompt(&ProductSignature::new("", "snacks")).contains("Product: unknown"));
    }

    #[test]
    fn parses_fenced_json_and_sanitizes() {
        let text = r#"Here you go:
```json
{"carbonFootprint": {"total": 1.0, "breakdown": {"production": 0.5, "transport": 0.2, "packaging": 0.2, "distribution": 0.1}},
 "waterUsage": {"total": 4.0},
 "sustainabilityScore": 130.4,
 "alternatives": [{"name": "Tap water", "reason": "No packaging"}],
 "keyFindings": ["Packaging dominates"],
 "provenance": "fallback",
 "worker": "w9.9"}
```"#;
        let report = parse_report(&raw(text)).unwrap();
        assert_eq!(report.provenance, Provenance::Upstream);
        assert_eq!(report.worker, None);
        assert_eq!(report.sustainability_score, 100);
        assert_eq!(report.carbon_footprint.per_unit, 1.0);
        assert_eq!(report.environmental_equivalents.miles_driven, 2.5);
        assert!((report.water_usage.breakdown.sum() - 4.0).abs() < 0.01);
    }

    #[test]
    fn rejects_text_without_object() {
        assert!(matches!(
            parse_report(&raw("I cannot help with that.")),
            Err(UpstreamError::Malformed(_))
        ));
        assert!(matches!(
            parse_report(&raw("{\"carbonFootprint\": \"lots\"}")),
            Err(UpstreamError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_empty_report() {
        assert!(matches!(
            parse_report(&raw("{\"sustainabilityScore\": 40}")),
            Err(UpstreamError::Malformed(_))
        ));
    }
}
