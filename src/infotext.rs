//! Infotext generation.
//!
//! The infotext is the human-readable parameter string attached to each
//! generated image. Its format is stable and byte-for-byte reproducible: a
//! prompt line, an optional `Negative prompt:` line, then one comma-separated
//! line of `key: value` pairs.

use crate::options::Options;
use crate::rng::RngSource;

/// Quote a parameter value for the infotext line.
///
/// Values containing a comma, colon or newline are JSON-quoted so the line
/// stays unambiguous; everything else is emitted bare. Non-ASCII text is
/// preserved as-is.
pub fn quote(text: &str) -> String {
    if !text.contains(',') && !text.contains(':') && !text.contains('\n') {
        return text.to_string();
    }
    serde_json::to_string(text).unwrap_or_else(|_| text.to_string())
}

// Fields whose value equals their key collapse to the bare value.
fn format_param(key: &str, value: &str) -> String {
    if key == value {
        value.to_string()
    } else {
        format!("{key}: {}", quote(value))
    }
}

/// Build the infotext for one generated image.
///
/// `seed` must be the resolved seed actually used for generation. The RNG
/// field is omitted when the configured source is the GPU default.
#[allow(clippy::too_many_arguments)]
pub fn create_infotext(
    prompt: &str,
    negative_prompt: &str,
    guidance_scale: f64,
    prior_steps: usize,
    decoder_steps: usize,
    seed: u64,
    width: usize,
    height: usize,
    options: &Options,
) -> String {
    let generation_params: Vec<(&str, Option<String>)> = vec![
        ("Model", Some("StableCascade".to_string())),
        ("Size", Some(format!("{width}x{height}"))),
        ("Seed", Some(seed.to_string())),
        ("Steps(Prior)", Some(prior_steps.to_string())),
        ("Steps(Decoder)", Some(decoder_steps.to_string())),
        // Debug formatting keeps the decimal point on whole floats.
        ("CFG", Some(format!("{guidance_scale:?}"))),
        (
            "RNG",
            (options.randn_source != RngSource::Gpu).then(|| options.randn_source.to_string()),
        ),
    ];

    let generation_params_text = generation_params
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| format_param(k, &v)))
        .collect::<Vec<_>>()
        .join(", ");

    let negative_prompt_text = if negative_prompt.is_empty() {
        String::new()
    } else {
        format!("\nNegative prompt: {negative_prompt}")
    };

    format!("{prompt}{negative_prompt_text}\n{generation_params_text}")
        .trim()
        .to_string()
}
