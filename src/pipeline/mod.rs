// Request pipeline module - turns an inbound request into processing options
//
// Order: access token -> path grammar -> default preset -> path instructions
// -> URL extension -> query overlay -> header overlay. Precedence tracking in
// ProcessingOptions makes the result independent of which source ran last.

use http::{HeaderMap, Request};
use serde::Serialize;
use tracing::{debug, info_span};

use crate::config::Config;
use crate::constants::DEFAULT_PRESET_NAME;
use crate::error::ProcessingError;
use crate::options::{Precedence, ProcessingOptions};
use crate::overlay::{apply_headers, apply_query};
use crate::path::{parse_tail, split_access_token};
use crate::security::verify_signature;

/// Outcome of resolving one request, handed to the fetch/transform stages
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRequest {
    pub options: ProcessingOptions,
    pub image_url: String,
}

impl ResolvedRequest {
    /// Key identifying the output image: source URL plus options
    pub fn cache_key(&self) -> String {
        format!("{}#{}", self.image_url, self.options.cache_key())
    }
}

/// Resolve an HTTP request into processing options and a source URL
pub fn resolve<B>(request: &Request<B>, config: &Config) -> Result<ResolvedRequest, ProcessingError> {
    let uri = request.uri();
    resolve_parts(uri.path(), uri.query(), request.headers(), config)
}

/// Resolve the request and store the result in its extensions
pub fn resolve_into_extensions<B>(
    request: &mut Request<B>,
    config: &Config,
) -> Result<(), ProcessingError> {
    let resolved = resolve(request, config)?;
    request.extensions_mut().insert(resolved);
    Ok(())
}

/// Resolve from already separated request parts
pub fn resolve_parts(
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    config: &Config,
) -> Result<ResolvedRequest, ProcessingError> {
    let span = info_span!("resolve", path = %path, generation = config.generation);
    let _enter = span.enter();

    let (token, tail) = split_access_token(path, config)?;
    if let Some(token) = token {
        verify_signature(token, &format!("/{}", tail), &config.signing)?;
    }

    let parsed = parse_tail(token, tail, config)?;

    let presets = &config.presets;
    let mut options = ProcessingOptions::default();

    if presets.has_default() {
        options.apply_presets(
            &[DEFAULT_PRESET_NAME.to_string()],
            Precedence::DefaultPreset,
            presets,
        )?;
    }

    for step in &parsed.instructions {
        if step.instruction.is_preset() {
            options.apply_presets(
                &step.instruction.args,
                step.precedence.for_nested_preset(),
                presets,
            )?;
        } else if presets.only_presets {
            debug!(instruction = %step.instruction, "only presets allowed, ignoring path instruction");
        } else {
            options.apply(&step.instruction, step.precedence)?;
        }
    }

    if let Some(step) = parsed.extension_instruction() {
        options.apply(&step.instruction, step.precedence)?;
    }

    if let Some(query) = query {
        apply_query(&mut options, query, config)?;
    }

    apply_headers(&mut options, headers, config);

    debug!(
        image_url = %parsed.source.url,
        used_presets = ?options.used_presets,
        "request resolved"
    );

    Ok(ResolvedRequest {
        options,
        image_url: parsed.source.url,
    })
}
