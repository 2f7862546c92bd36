use serde::{Deserialize, Serialize};

/// Incoming body of `POST /api/analyze`, exactly as the frontend sends it.
///
/// Everything besides `image` is an optional accuracy hint. Hints arrive
/// from loosely typed clients, so the weight fields accept both numbers and
/// numeric strings and are cleaned up in [`AnalyzeRequest::normalize`].
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub image: String,
    #[serde(default, rename = "containerSize")]
    pub container_size: Option<ContainerSize>,
    #[serde(default, rename = "totalWeight")]
    pub total_weight: Option<serde_json::Value>,
    #[serde(default)]
    pub ingredients: Option<Vec<IngredientHint>>,
}

/// One declared ingredient, before normalization.
#[derive(Debug, Deserialize)]
pub struct IngredientHint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub weight: Option<serde_json::Value>,
}

/// Container the food is served in, used as a scale reference for portions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerSize {
    SmallPlate,
    MediumPlate,
    LargePlate,
    Bowl,
    Cup,
    Unknown,
}

impl ContainerSize {
    /// Phrase injected into the vision prompt as a physical scale reference.
    pub fn reference_phrase(&self) -> &'static str {
        match self {
            ContainerSize::SmallPlate => "on a small plate (about 20 cm across)",
            ContainerSize::MediumPlate => "on a medium plate (about 24 cm across)",
            ContainerSize::LargePlate => "on a large plate (about 28 cm across)",
            ContainerSize::Bowl => "in a bowl",
            ContainerSize::Cup => "in a cup",
            ContainerSize::Unknown => "in an unidentified container",
        }
    }
}

/// Cleaned-up analysis input: hints validated, malformed ones dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub image: String,
    pub container: Option<ContainerSize>,
    pub total_weight_grams: Option<f64>,
    pub ingredients: Vec<Ingredient>,
}

/// A declared ingredient that survived normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    pub weight_grams: f64,
}

impl AnalyzeRequest {
    /// Normalizes the wire payload. Hints are advisory only: anything
    /// malformed is dropped here rather than failing the request.
    pub fn normalize(&self) -> AnalysisRequest {
        let container = self.container_size.filter(|c| *c != ContainerSize::Unknown);

        let total_weight_grams = self.total_weight.as_ref().and_then(parse_weight);
        if self.total_weight.is_some() && total_weight_grams.is_none() {
            log::debug!("🔍 Ignoring non-numeric totalWeight hint");
        }

        let ingredients = self
            .ingredients
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter_map(|hint| {
                let name = hint.name.trim();
                let weight_grams = hint.weight.as_ref().and_then(parse_weight);
                match weight_grams {
                    Some(weight_grams) if !name.is_empty() => Some(Ingredient {
                        name: name.to_string(),
                        weight_grams,
                    }),
                    _ => {
                        log::debug!("🔍 Dropping malformed ingredient hint '{}'", hint.name);
                        None
                    }
                }
            })
            .collect();

        AnalysisRequest {
            image: self.image.clone(),
            container,
            total_weight_grams,
            ingredients,
        }
    }
}

/// Accepts `150`, `150.5` or `"150"`; rejects anything non-positive.
fn parse_weight(value: &serde_json::Value) -> Option<f64> {
    let weight = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (weight.is_finite() && weight > 0.0).then_some(weight)
}

/// Calorie bracket reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalorieRange {
    pub min: u32,
    pub max: u32,
}

/// Macronutrient split in grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Macros {
    #[serde(rename = "carbsGrams")]
    pub carbs_grams: u32,
    #[serde(rename = "proteinGrams")]
    pub protein_grams: u32,
    #[serde(rename = "fatGrams")]
    pub fat_grams: u32,
}

/// Successful response body of `POST /api/analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    #[serde(rename = "analysis")]
    pub raw_text: String,
    pub description: String,
    pub calories: u32,
    #[serde(rename = "weight")]
    pub weight_grams: u32,
    pub confidence: u8,
    #[serde(rename = "calorieRange")]
    pub calorie_range: CalorieRange,
    pub reliability: u8,
    pub macros: Option<Macros>,
}
