//! Prompt construction for the vision description request.
//!
//! The prompt embeds the output schema as natural-language constraints (the
//! consumer is a language model, not a parser), a policy clause selected by
//! [`PolicyMode`], and an optional caller-supplied instruction. Building a
//! prompt is pure: identical inputs always produce identical text.

use serde::{Deserialize, Serialize};

/// Caller-supplied hint trading generation speed against description
/// thoroughness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Brevity-biased: answer quickly, never invent.
    Fast,
    /// Precision-biased: explicit permission to be slower.
    Accurate,
    /// Compromise between the two.
    #[default]
    Balanced,
}

impl PolicyMode {
    /// Default max-output-token budget for this mode.
    ///
    /// Vision descriptions in `accurate` mode run long (6-10 sentences plus
    /// points of interest), so the budget scales with the mode.
    pub fn default_max_output_tokens(self) -> u32 {
        match self {
            PolicyMode::Fast => 700,
            PolicyMode::Balanced => 1100,
            PolicyMode::Accurate => 1400,
        }
    }
}

/// Fixed schema description sent to the model, with per-field cardinality
/// rules. The model is instructed in Spanish; that is the product language.
const SCHEMA_BLOCK: &str = "Devuelve SOLO un JSON válido (sin markdown, sin texto extra) con este esquema:\n\
{\n\
  \"summary\": string,\n\
  \"detailed\": string,\n\
  \"points_of_interest\": string[],\n\
  \"uncertainties\": string[],\n\
  \"confidence\": number\n\
}\n\n\
Reglas:\n\
- confidence debe estar entre 0 y 1\n\
- summary debe ser 2-3 frases\n\
- detailed debe ser detallado (6-10 frases) y describir el entorno, no solo el objeto principal\n\
- points_of_interest: 5-8 items\n\
- uncertainties: lista vacía si estás seguro\n\
- Incluye contexto del entorno: disposición del espacio, objetos secundarios, iluminación/ambiente, texto visible y posibles riesgos/obstáculos\n\
- Si usas comillas dobles dentro de strings, escápalas con \\\"\n\n";

/// Build the generation prompt for one description request.
///
/// The optional user instruction is inserted verbatim before the generic task
/// description and omitted entirely when absent or blank.
pub fn build_prompt(mode: PolicyMode, user_instruction: Option<&str>) -> String {
    let policy = match mode {
        PolicyMode::Accurate => {
            "Prioriza precisión aunque tardes un poco más. Si no estás seguro, dilo en \"uncertainties\"."
        }
        PolicyMode::Fast => "Prioriza velocidad, pero no inventes.",
        PolicyMode::Balanced => "Balancea precisión y velocidad. No inventes.",
    };

    let extra = match user_instruction.map(str::trim) {
        Some(instruction) if !instruction.is_empty() => format!("Extra: {}\n", instruction),
        _ => String::new(),
    };

    let task = "Tarea: describe claramente la imagen y el entorno. Incluye puntos de interés y posibles incertidumbres.";

    format!("{}{}\n{}{}", SCHEMA_BLOCK, policy, extra, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_prompt(PolicyMode::Balanced, Some("lee el cartel"));
        let b = build_prompt(PolicyMode::Balanced, Some("lee el cartel"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_embeds_schema_keys() {
        let prompt = build_prompt(PolicyMode::Fast, None);
        for key in [
            "summary",
            "detailed",
            "points_of_interest",
            "uncertainties",
            "confidence",
        ] {
            assert!(prompt.contains(key), "schema key {key} missing from prompt");
        }
    }

    #[test]
    fn test_policy_clause_varies_by_mode() {
        let fast = build_prompt(PolicyMode::Fast, None);
        let accurate = build_prompt(PolicyMode::Accurate, None);
        let balanced = build_prompt(PolicyMode::Balanced, None);

        assert!(fast.contains("Prioriza velocidad"));
        assert!(accurate.contains("Prioriza precisión"));
        assert!(balanced.contains("Balancea precisión y velocidad"));
    }

    #[test]
    fn test_user_instruction_inserted_before_task() {
        let prompt = build_prompt(PolicyMode::Balanced, Some("busca la salida"));
        let extra_pos = prompt.find("Extra: busca la salida").expect("extra clause");
        let task_pos = prompt.find("Tarea:").expect("task clause");
        assert!(extra_pos < task_pos);
    }

    #[test]
    fn test_blank_user_instruction_omitted() {
        let without = build_prompt(PolicyMode::Balanced, None);
        let blank = build_prompt(PolicyMode::Balanced, Some("   "));
        assert_eq!(without, blank);
        assert!(!blank.contains("Extra:"));
    }

    #[test]
    fn test_token_budget_scales_with_mode() {
        assert_eq!(PolicyMode::Fast.default_max_output_tokens(), 700);
        assert_eq!(PolicyMode::Balanced.default_max_output_tokens(), 1100);
        assert_eq!(PolicyMode::Accurate.default_max_output_tokens(), 1400);
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        let mode: PolicyMode = serde_json::from_str("\"accurate\"").unwrap();
        assert_eq!(mode, PolicyMode::Accurate);
    }
}
