use crate::models::AnalysisRequest;

/// Fixed answer layout the extractor anchors on. Always the last section of
/// the prompt, whatever hints precede it.
const OUTPUT_CONTRACT: &str = "ANSWER FORMAT (USE EXACTLY THIS FORMAT):\n\
    🍽️ FOOD: [dish name]\n\
    ⚖️ WEIGHT: [number] g\n\
    🔥 CALORIES: [number] kcal\n\
    📊 CONFIDENCE: [number]/10\n\
    🥗 MACROS: [number] g carbs, [number] g protein, [number] g fat\n\
    Then list every visible ingredient on its own line:\n\
    - [ingredient]: [number] g, [number] kcal\n\
    \n\
    Round calories to the nearest 10 kcal. Keep the whole answer under 120 words.";

/// Builds the single-shot vision prompt for a normalized request.
///
/// Pure string assembly, so the same request always yields the same prompt.
/// Hints are appended between the task sections and the answer format in a
/// fixed order: container, known weight, ingredient list.
pub fn build_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = String::from(
        "YOU ARE A FOOD ANALYSIS EXPERT. Examine this food photo carefully.\n\
         \n\
         1. IDENTIFY THE DISH:\n\
         - Name the dish and any sides you can see\n\
         - Note the main visible ingredients\n\
         \n\
         2. ESTIMATE THE PORTION:\n\
         - Estimate the weight of the ACTUAL VISIBLE PORTION in grams\n\
         - Never answer with a generic per-100g figure\n\
         \n\
         3. ESTIMATE CALORIES AND MACROS:\n\
         - Total calories for the visible portion\n\
         - Carbohydrates, protein and fat in grams\n",
    );

    if let Some(container) = request.container {
        prompt.push_str(&format!(
            "\nSCALE REFERENCE: the food is served {}. \
             Use it to judge the real size of the portion.\n",
            container.reference_phrase()
        ));
    }

    if let Some(weight) = request.total_weight_grams {
        prompt.push_str(&format!(
            "\nKNOWN WEIGHT: the food weighs exactly {} g. Treat this as fact: \
             do not estimate the weight, compute calories for this amount.\n",
            format_grams(weight)
        ));
    }

    if !request.ingredients.is_empty() {
        prompt.push_str("\nDECLARED INGREDIENTS:\n");
        for ingredient in &request.ingredients {
            prompt.push_str(&format!(
                "- {}: {} g\n",
                ingredient.name,
                format_grams(ingredient.weight_grams)
            ));
        }
        prompt.push_str(
            "Base the analysis on this list instead of guessing the composition. \
             Confirm or adjust the dish name, then compute calories per ingredient \
             and sum them for the total.\n",
        );
    }

    prompt.push('\n');
    prompt.push_str(OUTPUT_CONTRACT);
    prompt
}

/// Renders weights without a trailing `.0` for whole grams.
fn format_grams(weight: f64) -> String {
    if weight.fract() == 0.0 {
        format!("{:.0}", weight)
    } else {
        format!("{}", weight)
    }
}
