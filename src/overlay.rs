//! Query and header overlay
//!
//! Flat query parameters are the last instruction source applied; request
//! headers then fill in content negotiation and client hints.

use http::header::ACCEPT;
use http::HeaderMap;
use tracing::debug;

use crate::config::Config;
use crate::constants::{HEADER_DPR, HEADER_VIEWPORT_WIDTH, HEADER_WIDTH, WEBP_MEDIA_TYPE};
use crate::error::ProcessingError;
use crate::options::{Field, Instruction, OptionName, Precedence, ProcessingOptions};

/// Apply the raw query string (without the leading `?`)
///
/// Pairs are applied in order and repeated keys are honored. Unknown keys are
/// skipped since the query may carry parameters meant for someone else.
pub fn apply_query(
    options: &mut ProcessingOptions,
    query: &str,
    config: &Config,
) -> Result<(), ProcessingError> {
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key)?;
        let value = decode_component(raw_value)?;

        let option = match key.parse::<OptionName>() {
            Ok(option) => option,
            Err(_) => {
                debug!(key = %key, "ignoring unknown query parameter");
                continue;
            }
        };

        let args: Vec<String> = if value.is_empty() {
            Vec::new()
        } else {
            value.split(':').map(str::to_string).collect()
        };

        if option == OptionName::Preset {
            options.apply_presets(&args, Precedence::Preset, &config.presets)?;
        } else if config.presets.only_presets {
            debug!(key = %key, "only presets allowed, ignoring query parameter");
        } else {
            options.apply(&Instruction::new(key, args), Precedence::Query)?;
        }
    }

    Ok(())
}

/// Apply WebP negotiation and, when enabled, client hints
///
/// Header values that do not parse are ignored.
pub fn apply_headers(options: &mut ProcessingOptions, headers: &HeaderMap, config: &Config) {
    let negotiation = &config.negotiation;

    if negotiation.enforce_webp {
        options.prefer_webp = true;
        options.enforce_webp = true;
    } else if negotiation.enable_webp_detection && accepts_webp(headers) {
        options.prefer_webp = true;
    }

    if !negotiation.enable_client_hints {
        return;
    }

    if !options.is_set(Field::Width) {
        if let Some(width) = positive_header::<u32>(headers, HEADER_WIDTH) {
            options.assign(Field::Width, Precedence::ClientHint, |po| po.width = width);
        }
    }
    if !options.is_set(Field::Width) {
        if let Some(width) = positive_header::<u32>(headers, HEADER_VIEWPORT_WIDTH) {
            options.assign(Field::Width, Precedence::ClientHint, |po| po.width = width);
        }
    }
    if !options.is_set(Field::Dpr) {
        if let Some(dpr) = positive_header::<f64>(headers, HEADER_DPR) {
            if dpr.is_finite() {
                options.assign(Field::Dpr, Precedence::ClientHint, |po| po.dpr = dpr);
            }
        }
    }
}

fn accepts_webp(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(WEBP_MEDIA_TYPE))
}

fn positive_header<T>(headers: &HeaderMap, name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = headers.get(name)?.to_str().ok()?.trim();
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            debug!(header = name, value = raw, "ignoring invalid client hint");
            None
        }
    }
}

/// Percent-decode a query component, `+` meaning space
fn decode_component(raw: &str) -> Result<String, ProcessingError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| {
            ProcessingError::invalid_path(format!("invalid percent-encoding in query: '{}'", raw))
        })
}
