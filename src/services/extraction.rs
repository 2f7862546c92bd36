use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{AnalysisResult, CalorieRange, Macros};

/// Neutral confidence used when the answer carries no confidence marker.
const DEFAULT_CONFIDENCE: u8 = 5;

/// Half-width of the calorie bracket when the answer gives no range.
const CALORIE_SPREAD: u32 = 50;

/// Longest description kept from the answer text.
const MAX_DESCRIPTION_CHARS: usize = 80;

static FOOD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)FOOD:\s*(.+)$").expect("invalid food pattern"));
static MARKED_CALORIES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CALORIES:\s*([0-9][0-9.,]*)").expect("invalid calories pattern"));
static MARKED_WEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)WEIGHT:\s*([0-9][0-9.,]*)").expect("invalid weight pattern"));
static MARKED_CONFIDENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)CONFIDENCE:\s*([0-9]{1,2})\s*/\s*10").expect("invalid confidence pattern")
});
static MARKED_MACROS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)MACROS:\s*([0-9][0-9.,]*)\s*g\s*carbs?,?\s*([0-9][0-9.,]*)\s*g\s*protein,?\s*([0-9][0-9.,]*)\s*g\s*fat",
    )
    .expect("invalid macros pattern")
});
static CONSENSUS_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)CONSENSUS\s+ESTIMATE:\s*([0-9][0-9.,]*)\s*[-–]\s*([0-9][0-9.,]*)")
        .expect("invalid consensus pattern")
});
static LOOSE_CALORIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([0-9][0-9,]*)(?:\.[0-9]+)?\s*(?:kcal|calories|cal)\b")
        .expect("invalid loose calories pattern")
});
static LOOSE_WEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([0-9][0-9,]*)(?:\.[0-9]+)?\s*(?:grams|g)\b")
        .expect("invalid loose weight pattern")
});

/// A field pulled from the answer text, tagged with how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<T> {
    /// Matched a marker line or a loose unit pattern in the text.
    Parsed(T),
    /// Nothing matched; this is the fallback value.
    Defaulted(T),
}

impl<T: Copy> Extraction<T> {
    pub fn value(self) -> T {
        match self {
            Extraction::Parsed(value) | Extraction::Defaulted(value) => value,
        }
    }

    pub fn is_parsed(self) -> bool {
        matches!(self, Extraction::Parsed(_))
    }
}

/// Structured fields recovered from one model answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEstimate {
    pub description: String,
    pub calories: Extraction<u32>,
    pub calorie_range: CalorieRange,
    pub weight_grams: Extraction<u32>,
    pub confidence: Extraction<u8>,
    pub macros: Option<Macros>,
}

impl ExtractedEstimate {
    /// Pairs the structured fields with the answer they came from.
    pub fn into_result(self, raw_text: String) -> AnalysisResult {
        let confidence = self.confidence.value();
        AnalysisResult {
            raw_text,
            description: self.description,
            calories: self.calories.value(),
            weight_grams: self.weight_grams.value(),
            confidence,
            calorie_range: self.calorie_range,
            reliability: confidence,
            macros: self.macros,
        }
    }
}

/// Recovers structured numbers from a model answer.
///
/// Marker lines from the answer format are tried first; free text with a
/// unit word is the fallback. Nothing here fails: a field that cannot be
/// found comes back `Defaulted` so a degraded answer still produces a
/// well-formed result.
pub fn parse_analysis(raw_text: &str) -> ExtractedEstimate {
    let (calories, calorie_range) = extract_calories(raw_text);

    let weight_grams = match capture_int(&MARKED_WEIGHT, raw_text)
        .or_else(|| capture_int(&LOOSE_WEIGHT, raw_text))
    {
        Some(value) => Extraction::Parsed(value),
        None => Extraction::Defaulted(0),
    };

    let confidence = match capture_int(&MARKED_CONFIDENCE, raw_text) {
        Some(value) => Extraction::Parsed(value.min(10) as u8),
        None => Extraction::Defaulted(DEFAULT_CONFIDENCE),
    };

    ExtractedEstimate {
        description: extract_description(raw_text),
        calories,
        calorie_range,
        weight_grams,
        confidence,
        macros: extract_macros(raw_text),
    }
}

fn extract_calories(raw_text: &str) -> (Extraction<u32>, CalorieRange) {
    // An explicit consensus range beats the spread heuristic.
    if let Some(caps) = CONSENSUS_RANGE.captures(raw_text) {
        let bounds = (
            caps.get(1).and_then(|m| parse_int(m.as_str())),
            caps.get(2).and_then(|m| parse_int(m.as_str())),
        );
        if let (Some(a), Some(b)) = bounds {
            let (min, max) = (a.min(b), a.max(b));
            let midpoint = ((u64::from(min) + u64::from(max)) / 2) as u32;
            return (Extraction::Parsed(midpoint), CalorieRange { min, max });
        }
    }

    let calories = match capture_int(&MARKED_CALORIES, raw_text)
        .or_else(|| capture_int(&LOOSE_CALORIES, raw_text))
    {
        Some(value) => Extraction::Parsed(value),
        None => Extraction::Defaulted(0),
    };

    let value = calories.value();
    let calorie_range = CalorieRange {
        min: value.saturating_sub(CALORIE_SPREAD),
        max: value.saturating_add(CALORIE_SPREAD),
    };
    (calories, calorie_range)
}

fn extract_macros(raw_text: &str) -> Option<Macros> {
    let caps = MARKED_MACROS.captures(raw_text)?;
    Some(Macros {
        carbs_grams: parse_int(caps.get(1)?.as_str())?,
        protein_grams: parse_int(caps.get(2)?.as_str())?,
        fat_grams: parse_int(caps.get(3)?.as_str())?,
    })
}

/// Short display name for the dish: the FOOD line when present, otherwise
/// the first non-empty line of the answer.
fn extract_description(raw_text: &str) -> String {
    let line = FOOD_LINE
        .captures(raw_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .or_else(|| raw_text.lines().find(|line| !line.trim().is_empty()))
        .unwrap_or("");

    line.trim().chars().take(MAX_DESCRIPTION_CHARS).collect()
}

fn capture_int(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_int(m.as_str()))
}

/// Parses "430", "1,250" or "430.5" down to a whole number.
fn parse_int(text: &str) -> Option<u32> {
    let cleaned = text.replace(',', "");
    let whole = cleaned.split('.').next().unwrap_or("");
    whole.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_ANSWER: &str = "🍽️ FOOD: Spaghetti Bolognese\n\
        ⚖️ WEIGHT: 350 g\n\
        🔥 CALORIES: 430 kcal\n\
        📊 CONFIDENCE: 8/10\n\
        🥗 MACROS: 45 g carbs, 22 g protein, 15 g fat\n\
        - spaghetti: 200 g, 280 kcal\n\
        - bolognese sauce: 150 g, 150 kcal";

    #[test]
    fn parses_every_field_from_a_well_formed_answer() {
        let estimate = parse_analysis(FULL_ANSWER);

        assert_eq!(estimate.description, "Spaghetti Bolognese");
        assert_eq!(estimate.calories, Extraction::Parsed(430));
        assert_eq!(estimate.weight_grams, Extraction::Parsed(350));
        assert_eq!(estimate.confidence, Extraction::Parsed(8));
        assert_eq!(estimate.calorie_range, CalorieRange { min: 380, max: 480 });
        assert_eq!(
            estimate.macros,
            Some(Macros {
                carbs_grams: 45,
                protein_grams: 22,
                fat_grams: 15
            })
        );
    }

    #[test]
    fn falls_back_to_unit_words_when_markers_are_missing() {
        let estimate = parse_analysis(
            "This looks like a portion of around 430 calories, roughly 350 grams of pasta.",
        );
        assert_eq!(estimate.calories, Extraction::Parsed(430));
        assert_eq!(estimate.weight_grams, Extraction::Parsed(350));
        assert_eq!(estimate.confidence, Extraction::Defaulted(5));
    }

    #[test]
    fn empty_answer_defaults_every_numeric_field() {
        let estimate = parse_analysis("");
        assert_eq!(estimate.calories, Extraction::Defaulted(0));
        assert_eq!(estimate.weight_grams, Extraction::Defaulted(0));
        assert_eq!(estimate.confidence, Extraction::Defaulted(5));
        assert_eq!(estimate.calorie_range, CalorieRange { min: 0, max: 50 });
        assert_eq!(estimate.macros, None);
        assert_eq!(estimate.description, "");
    }

    #[test]
    fn prose_without_numbers_defaults_calories_to_zero() {
        let estimate = parse_analysis("I cannot tell what this dish is.");
        assert_eq!(estimate.calories, Extraction::Defaulted(0));
        assert_eq!(estimate.description, "I cannot tell what this dish is.");
    }

    #[test]
    fn range_always_brackets_the_point_estimate() {
        let answers = [
            FULL_ANSWER,
            "around 30 kcal",
            "",
            "CONSENSUS ESTIMATE: 400-500 calories",
        ];
        for answer in answers {
            let estimate = parse_analysis(answer);
            let value = estimate.calories.value();
            assert!(estimate.calorie_range.min <= value, "min > value for {:?}", answer);
            assert!(value <= estimate.calorie_range.max, "value > max for {:?}", answer);
        }
    }

    #[test]
    fn low_point_estimates_clamp_the_range_at_zero() {
        let estimate = parse_analysis("roughly 30 kcal");
        assert_eq!(estimate.calorie_range, CalorieRange { min: 0, max: 80 });
    }

    #[test]
    fn consensus_range_overrides_the_spread_heuristic() {
        let estimate = parse_analysis("🔥 CALORIES: 430 kcal\nCONSENSUS ESTIMATE: 400-500 calories");
        assert_eq!(estimate.calories, Extraction::Parsed(450));
        assert_eq!(estimate.calorie_range, CalorieRange { min: 400, max: 500 });
    }

    #[test]
    fn reversed_consensus_bounds_are_reordered() {
        let estimate = parse_analysis("CONSENSUS ESTIMATE: 500-400 calories");
        assert_eq!(estimate.calories, Extraction::Parsed(450));
        assert_eq!(estimate.calorie_range, CalorieRange { min: 400, max: 500 });
    }

    #[test]
    fn thousands_separators_are_stripped() {
        let estimate = parse_analysis("🔥 CALORIES: 1,250 kcal");
        assert_eq!(estimate.calories, Extraction::Parsed(1250));
    }

    #[test]
    fn loose_decimals_keep_the_integer_part() {
        let estimate =
            parse_analysis("I'd estimate around 430.5 calories for roughly 350.25 grams.");
        assert_eq!(estimate.calories, Extraction::Parsed(430));
        assert_eq!(estimate.weight_grams, Extraction::Parsed(350));
    }

    #[test]
    fn markers_are_case_insensitive() {
        let estimate = parse_analysis("calories: 200 kcal\nweight: 150 g\nconfidence: 3/10");
        assert_eq!(estimate.calories, Extraction::Parsed(200));
        assert_eq!(estimate.weight_grams, Extraction::Parsed(150));
        assert_eq!(estimate.confidence, Extraction::Parsed(3));
    }

    #[test]
    fn confidence_is_clamped_to_ten() {
        let estimate = parse_analysis("📊 CONFIDENCE: 15/10");
        assert_eq!(estimate.confidence, Extraction::Parsed(10));
    }

    #[test]
    fn truncated_marker_lines_do_not_panic() {
        let estimate = parse_analysis("🍽️ FOOD: Ramen\n🔥 CALORIES:");
        assert_eq!(estimate.calories, Extraction::Defaulted(0));
        assert_eq!(estimate.description, "Ramen");
    }

    #[test]
    fn macros_require_the_full_marker_line() {
        let estimate = parse_analysis("🥗 MACROS: 45 g carbs and some protein");
        assert_eq!(estimate.macros, None);
    }

    #[test]
    fn description_falls_back_to_the_first_non_empty_line() {
        let estimate = parse_analysis("\n\nA hearty bowl of ramen with pork.\nMore detail follows.");
        assert_eq!(estimate.description, "A hearty bowl of ramen with pork.");
    }

    #[test]
    fn long_descriptions_are_cut_off() {
        let estimate = parse_analysis(&format!("🍽️ FOOD: {}", "x".repeat(200)));
        assert_eq!(estimate.description.chars().count(), 80);
    }

    #[test]
    fn into_result_mirrors_confidence_into_reliability() {
        let result = parse_analysis(FULL_ANSWER).into_result(FULL_ANSWER.to_string());
        assert_eq!(result.confidence, 8);
        assert_eq!(result.reliability, 8);
        assert_eq!(result.raw_text, FULL_ANSWER);
        assert_eq!(result.calories, 430);
        assert_eq!(result.weight_grams, 350);
    }
}
