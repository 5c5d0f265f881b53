//! Compiled-in model pricing registry.
//!
//! Using a model outside this table fails with `MODEL_UNAVAILABLE` before
//! any network I/O. Rates are USD per 1 000 tokens.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Per-1K-token pricing for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

static MODEL_COSTS: Lazy<HashMap<&'static str, ModelPricing>> = Lazy::new(|| {
    HashMap::from([
        (
            "claude-3-sonnet-20240229",
            ModelPricing {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        ),
        (
            "claude-3-opus-20240229",
            ModelPricing {
                input_per_1k: 0.015,
                output_per_1k: 0.075,
            },
        ),
        (
            "claude-3-haiku-20240307",
            ModelPricing {
                input_per_1k: 0.00025,
                output_per_1k: 0.00125,
            },
        ),
        (
            "claude-3-5-sonnet-20240620",
            ModelPricing {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        ),
    ])
});

/// Pricing for a model, `None` when unlisted.
pub fn lookup(model: &str) -> Option<&'static ModelPricing> {
    MODEL_COSTS.get(model)
}

pub fn is_known(model: &str) -> bool {
    MODEL_COSTS.contains_key(model)
}

/// All registered model identifiers, sorted.
pub fn known_models() -> Vec<&'static str> {
    let mut models: Vec<&'static str> = MODEL_COSTS.keys().copied().collect();
    models.sort();
    models
}

/// USD cost for the given token counts, rounded to 6 decimal places.
/// Unknown models cost 0.0.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let Some(pricing) = lookup(model) else {
        return 0.0;
    };
    let cost = (input_tokens as f64 * pricing.input_per_1k
        + output_tokens as f64 * pricing.output_per_1k)
        / 1000.0;
    (cost * 1e6).round() / 1e6
}
