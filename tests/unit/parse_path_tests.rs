// Request resolution tests: path grammar, query overlay, presets and headers
// driven end to end through pipeline::resolve

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::Request;
use rstest::rstest;

use pixelgate::config::{Config, SecretKey};
use pixelgate::options::{
    Field, GravityType, ImageType, Instruction, Precedence, PresetTable, ResizeType, Rgb,
};
use pixelgate::pipeline::{resolve, ResolvedRequest};
use pixelgate::security::generate_signature;
use pixelgate::ProcessingError;

const IMAGE_URL: &str = "http://images.dev/lorem/ipsum.jpg";

fn request(uri: &str) -> Request<()> {
    Request::builder()
        .uri(format!("http://example.com{}", uri))
        .body(())
        .unwrap()
}

fn request_with_header(uri: &str, name: &str, value: &str) -> Request<()> {
    Request::builder()
        .uri(format!("http://example.com{}", uri))
        .header(name, value)
        .body(())
        .unwrap()
}

fn resolve_ok(uri: &str, config: &Config) -> ResolvedRequest {
    resolve(&request(uri), config).unwrap()
}

fn b64(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url)
}

fn with_base_url() -> Config {
    Config {
        base_url: "http://images.dev/".to_string(),
        ..Config::default()
    }
}

fn with_presets(entries: &[(&str, &str)]) -> Config {
    let mut table = PresetTable::new();
    for (name, list) in entries {
        table.insert(*name, Instruction::parse_list(list).unwrap());
    }
    let mut config = Config::default();
    config.presets.definitions = table;
    config
}

fn signed_config() -> Config {
    let mut config = Config::default();
    config.signing.keys = vec![SecretKey::from(b"test-key".to_vec())];
    config.signing.salts = vec![SecretKey::from(b"test-salt".to_vec())];
    config
}

// ============================================================================
// Source URL forms
// ============================================================================

#[test]
fn test_parse_base64_url() {
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value";
    let resolved = resolve_ok(&format!("/{}?w=100&h=100", b64(image_url)), &Config::default());
    assert_eq!(resolved.image_url, image_url);
}

#[test]
fn test_parse_base64_url_with_base() {
    let image_url = "lorem/ipsum.jpg?param=value";
    let resolved = resolve_ok(
        &format!("/encoded/{}?w=100&h=100", b64(image_url)),
        &with_base_url(),
    );
    assert_eq!(resolved.image_url, format!("http://images.dev/{}", image_url));
}

#[test]
fn test_parse_encoded_keyword() {
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value";
    let resolved = resolve_ok(&format!("/encoded/{}?w=100&h=100", b64(image_url)), &Config::default());
    assert_eq!(resolved.image_url, image_url);
    assert_eq!(resolved.options.width, 100);
    assert_eq!(resolved.options.height, 100);
}

#[test]
fn test_parse_base64_url_keeps_inner_query() {
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value&other=1";
    let resolved = resolve_ok(&format!("/unsafe/w:10/{}?q=80", b64(image_url)), &Config::default());
    assert_eq!(resolved.image_url, image_url);
    assert_eq!(resolved.options.quality, 80);
}

#[test]
fn test_parse_base64_url_with_extension() {
    let resolved = resolve_ok(&format!("/unsafe/{}.webp", b64(IMAGE_URL)), &Config::default());
    assert_eq!(resolved.image_url, IMAGE_URL);
    assert_eq!(resolved.options.format, Some(ImageType::Webp));
}

#[test]
fn test_parse_plain_url() {
    let resolved = resolve_ok(&format!("/{}", IMAGE_URL), &Config::default());
    assert_eq!(resolved.image_url, IMAGE_URL);
}

#[test]
fn test_parse_plain_url_escaped() {
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value";
    let escaped = "http:%2F%2Fimages.dev%2Florem%2Fipsum.jpg%3Fparam=value";
    let resolved = resolve_ok(&format!("/{}", escaped), &Config::default());
    assert_eq!(resolved.image_url, image_url);
}

#[test]
fn test_parse_plain_url_with_base() {
    let resolved = resolve_ok("/lorem/ipsum.jpg", &with_base_url());
    assert_eq!(resolved.image_url, "http://images.dev/lorem/ipsum.jpg");
}

#[test]
fn test_parse_plain_url_escaped_with_base() {
    let resolved = resolve_ok("/lorem%2Fipsum.jpg%3Fparam=value", &with_base_url());
    assert_eq!(resolved.image_url, "http://images.dev/lorem/ipsum.jpg?param=value");
}

#[test]
fn test_plain_keyword_with_extension() {
    let resolved = resolve_ok(&format!("/unsafe/plain/{}@png", IMAGE_URL), &Config::default());
    assert_eq!(resolved.image_url, IMAGE_URL);
    assert_eq!(resolved.options.format, Some(ImageType::Png));
}

#[rstest]
#[case::empty("/")]
#[case::token_only("/unsafe")]
#[case::no_url("/unsafe/w:100/")]
#[case::empty_plain("/unsafe/plain/")]
#[case::bad_base64("/unsafe/w:100/@@@")]
fn test_missing_or_broken_source_fails(#[case] uri: &str) {
    let err = resolve(&request(uri), &Config::default()).unwrap_err();
    assert_eq!(err.to_http_status(), 400);
}

// ============================================================================
// Legacy and advanced forms
// ============================================================================

#[test]
fn test_parse_path_basic() {
    let resolved = resolve_ok(
        &format!(
            "/unsafe/fill/100/200/noea/1/{}?f=png&rs=fill&w=100&h=200&g=noea&el=1",
            IMAGE_URL
        ),
        &Config::default(),
    );
    let po = &resolved.options;
    assert_eq!(po.resize, ResizeType::Fill);
    assert_eq!(po.width, 100);
    assert_eq!(po.height, 200);
    assert_eq!(po.gravity.kind, GravityType::NorthEast);
    assert!(po.enlarge);
    assert_eq!(po.format, Some(ImageType::Png));
}

#[test]
fn test_legacy_equals_advanced() {
    let url = format!("/plain/{}", IMAGE_URL);
    let legacy = resolve_ok(&format!("/unsafe/fill/100/200/noea/1{}", url), &Config::default());
    let advanced = resolve_ok(
        &format!("/unsafe/rt:fill/w:100/h:200/g:noea/el:1{}", url),
        &Config::default(),
    );
    assert_eq!(legacy.cache_key(), advanced.cache_key());
    assert_eq!(legacy.options.gravity, advanced.options.gravity);
}

#[rstest]
#[case("format=webp", "format")]
#[case("rt=fill", "resizing_type")]
#[case("quality=55", "quality")]
#[case("blur=0.2", "blur")]
#[case("sharpen=0.2", "sharpen")]
#[case("dpr=2", "dpr")]
#[case("cachebuster=123", "cachebuster")]
fn test_advanced_query_options(#[case] query: &str, #[case] option: &str) {
    let resolved = resolve_ok(&format!("/{}?{}", IMAGE_URL, query), &Config::default());
    let po = &resolved.options;
    match option {
        "format" => assert_eq!(po.format, Some(ImageType::Webp)),
        "resizing_type" => assert_eq!(po.resize, ResizeType::Fill),
        "quality" => assert_eq!(po.quality, 55),
        "blur" => assert_eq!(po.blur, 0.2),
        "sharpen" => assert_eq!(po.sharpen, 0.2),
        "dpr" => assert_eq!(po.dpr, 2.0),
        "cachebuster" => assert_eq!(po.cache_buster, "123"),
        _ => unreachable!(),
    }
}

#[test]
fn test_gravity_focus_point() {
    let resolved = resolve_ok(
        &format!("/unsafe/gravity:fp:0.5:0.75/plain/{}?gravity=fp:0.5:0.75", IMAGE_URL),
        &Config::default(),
    );
    let gravity = resolved.options.gravity;
    assert_eq!(gravity.kind, GravityType::FocusPoint);
    assert_eq!(gravity.x, 0.5);
    assert_eq!(gravity.y, 0.75);
}

#[rstest]
#[case("background=128:129:130", true, Rgb::new(128, 129, 130))]
#[case("background=ffddee", true, Rgb::new(0xff, 0xdd, 0xee))]
#[case("background=", false, Rgb::new(255, 255, 255))]
fn test_background(#[case] query: &str, #[case] flatten: bool, #[case] color: Rgb) {
    let resolved = resolve_ok(&format!("/{}?{}", IMAGE_URL, query), &Config::default());
    assert_eq!(resolved.options.flatten, flatten);
    assert_eq!(resolved.options.background, color);
}

#[test]
fn test_watermark() {
    let resolved = resolve_ok(
        &format!("/{}?watermark=0.5:soea:10:20:0.6", IMAGE_URL),
        &Config::default(),
    );
    let wm = resolved.options.watermark;
    assert!(wm.enabled);
    assert_eq!(wm.opacity, 0.5);
    assert_eq!(wm.gravity, GravityType::SouthEast);
    assert_eq!(wm.offset_x, 10);
    assert_eq!(wm.offset_y, 20);
    assert_eq!(wm.scale, 0.6);
}

#[rstest]
#[case::unknown_path_option("/unsafe/rotate:90/plain/http://images.dev/a.jpg")]
#[case::bad_quality("/unsafe/q:abc/plain/http://images.dev/a.jpg")]
#[case::bad_resize_type("/http://images.dev/a.jpg?rt=cover")]
#[case::bad_query_value("/http://images.dev/a.jpg?w=-5")]
fn test_malformed_instructions_fail_whole_request(#[case] uri: &str) {
    let err = resolve(&request(uri), &Config::default()).unwrap_err();
    assert_eq!(err.to_http_status(), 400);
}

// ============================================================================
// Precedence between sources
// ============================================================================

#[test]
fn test_path_instruction_beats_query() {
    let resolved = resolve_ok(
        &format!("/unsafe/w:300/plain/{}?w=100&h=50", IMAGE_URL),
        &Config::default(),
    );
    assert_eq!(resolved.options.width, 300);
    assert_eq!(resolved.options.height, 50);
    assert_eq!(resolved.options.origin(Field::Width), Precedence::Path);
    assert_eq!(resolved.options.origin(Field::Height), Precedence::Query);
}

#[test]
fn test_query_beats_legacy_positional_size() {
    let resolved = resolve_ok(
        &format!("/unsafe/fit/100/200/ce/0/plain/{}?w=150", IMAGE_URL),
        &Config::default(),
    );
    assert_eq!(resolved.options.width, 150);
    assert_eq!(resolved.options.height, 200);
}

#[test]
fn test_query_format_beats_url_extension() {
    let resolved = resolve_ok(
        &format!("/unsafe/plain/{}@png?format=webp", IMAGE_URL),
        &Config::default(),
    );
    assert_eq!(resolved.options.format, Some(ImageType::Webp));
}

#[test]
fn test_url_extension_beats_default_preset() {
    let config = with_presets(&[("default", "f:jpg")]);
    let resolved = resolve_ok(&format!("/unsafe/plain/{}@png", IMAGE_URL), &config);
    assert_eq!(resolved.options.format, Some(ImageType::Png));
}

#[test]
fn test_explicit_values_beat_presets_regardless_of_order() {
    let config = with_presets(&[("small", "w:50/q:40")]);
    let resolved = resolve_ok(
        &format!("/unsafe/w:300/preset:small/plain/{}", IMAGE_URL),
        &config,
    );
    assert_eq!(resolved.options.width, 300);
    assert_eq!(resolved.options.quality, 40);
}

// ============================================================================
// Presets
// ============================================================================

#[test]
fn test_query_presets() {
    let config = with_presets(&[("test1", "resizing_type:fill"), ("test2", "blur:0.2/quality:50")]);
    let resolved = resolve_ok(&format!("/{}?preset=test1&preset=test2", IMAGE_URL), &config);
    let po = &resolved.options;
    assert_eq!(po.resize, ResizeType::Fill);
    assert_eq!(po.blur, 0.2);
    assert_eq!(po.quality, 50);
}

#[test]
fn test_default_preset_overridden_by_query() {
    let config = with_presets(&[("default", "resizing_type:fill/blur:0.2/quality:50")]);
    let resolved = resolve_ok(&format!("/{}?quality=70", IMAGE_URL), &config);
    let po = &resolved.options;
    assert_eq!(po.resize, ResizeType::Fill);
    assert_eq!(po.blur, 0.2);
    assert_eq!(po.quality, 70);
    assert_eq!(po.used_presets, vec!["default"]);
}

#[test]
fn test_preset_loop_detection() {
    let config = with_presets(&[("test1", "resizing_type:fill"), ("test2", "blur:0.2/quality:50")]);
    let resolved = resolve_ok(&format!("/{}?preset=test1:test2:test1", IMAGE_URL), &config);
    let mut used = resolved.options.used_presets.clone();
    used.sort();
    assert_eq!(used, vec!["test1", "test2"]);
}

#[test]
fn test_nested_preset_cycle_terminates() {
    let config = with_presets(&[("a", "preset:b/w:10"), ("b", "preset:a/h:20")]);
    let resolved = resolve_ok(&format!("/unsafe/pr:a/plain/{}", IMAGE_URL), &config);
    assert_eq!(resolved.options.width, 10);
    assert_eq!(resolved.options.height, 20);
    assert_eq!(resolved.options.used_presets, vec!["a", "b"]);
}

#[test]
fn test_unknown_preset_fails() {
    let err = resolve(
        &request(&format!("/{}?preset=missing", IMAGE_URL)),
        &Config::default(),
    )
    .unwrap_err();
    assert_eq!(err, ProcessingError::UnknownPreset("missing".to_string()));
}

#[test]
fn test_unknown_preset_ignored_when_configured() {
    let mut config = with_presets(&[("known", "q:70")]);
    config.presets.ignore_unknown = true;
    let resolved = resolve_ok(&format!("/{}?preset=missing:known", IMAGE_URL), &config);
    assert_eq!(resolved.options.quality, 70);
    assert_eq!(resolved.options.used_presets, vec!["known"]);
}

#[test]
fn test_only_presets() {
    let mut config = with_presets(&[("test1", "blur:0.2"), ("test2", "quality:50")]);
    config.presets.only_presets = true;
    let resolved = resolve_ok(
        &format!("/unsafe/w:300/plain/{}?preset=test1&preset=test2&h=100", IMAGE_URL),
        &config,
    );
    let po = &resolved.options;
    assert_eq!(po.blur, 0.2);
    assert_eq!(po.quality, 50);
    assert_eq!(po.width, 0);
    assert_eq!(po.height, 0);
}

#[test]
fn test_base64_url_only_presets() {
    let mut config = with_presets(&[("test1", "blur:0.2"), ("test2", "quality:50")]);
    config.presets.only_presets = true;
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value";
    let resolved = resolve_ok(
        &format!("/{}?preset=test1&preset=test2", b64(image_url)),
        &config,
    );
    assert_eq!(resolved.image_url, image_url);
    assert_eq!(resolved.options.blur, 0.2);
    assert_eq!(resolved.options.quality, 50);
}

// ============================================================================
// Headers
// ============================================================================

#[test]
fn test_webp_detection() {
    let mut config = Config::default();
    config.negotiation.enable_webp_detection = true;
    let req = request_with_header(&format!("/unsafe/plain/{}", IMAGE_URL), "Accept", "image/webp");
    let resolved = resolve(&req, &config).unwrap();
    assert!(resolved.options.prefer_webp);
    assert!(!resolved.options.enforce_webp);
}

#[test]
fn test_webp_enforce() {
    let mut config = Config::default();
    config.negotiation.enforce_webp = true;
    let req = request_with_header(&format!("/unsafe/plain/{}", IMAGE_URL), "Accept", "image/webp");
    let resolved = resolve(&req, &config).unwrap();
    assert!(resolved.options.prefer_webp);
    assert!(resolved.options.enforce_webp);
}

#[test]
fn test_webp_detection_disabled() {
    let req = request_with_header(&format!("/unsafe/plain/{}", IMAGE_URL), "Accept", "image/webp");
    let resolved = resolve(&req, &Config::default()).unwrap();
    assert!(!resolved.options.prefer_webp);
}

#[rstest]
#[case::width("Width", "", true, 100)]
#[case::width_disabled("Width", "", false, 0)]
#[case::width_redefined("Width", "?width=150", true, 150)]
#[case::viewport("Viewport-Width", "", true, 100)]
#[case::viewport_disabled("Viewport-Width", "", false, 0)]
#[case::viewport_redefined("Viewport-Width", "?width=150", true, 150)]
fn test_width_client_hints(
    #[case] header: &str,
    #[case] query: &str,
    #[case] enabled: bool,
    #[case] expected: u32,
) {
    let mut config = Config::default();
    config.negotiation.enable_client_hints = enabled;
    let req = request_with_header(&format!("/{}{}", IMAGE_URL, query), header, "100");
    let resolved = resolve(&req, &config).unwrap();
    assert_eq!(resolved.options.width, expected);
}

#[rstest]
#[case::enabled(true, 2.0)]
#[case::disabled(false, 1.0)]
fn test_dpr_client_hint(#[case] enabled: bool, #[case] expected: f64) {
    let mut config = Config::default();
    config.negotiation.enable_client_hints = enabled;
    let req = request_with_header(&format!("/{}", IMAGE_URL), "DPR", "2");
    let resolved = resolve(&req, &config).unwrap();
    assert_eq!(resolved.options.dpr, expected);
}

#[test]
fn test_client_hint_does_not_override_default_preset() {
    let mut config = with_presets(&[("default", "w:640")]);
    config.negotiation.enable_client_hints = true;
    let req = request_with_header(&format!("/{}", IMAGE_URL), "Width", "100");
    let resolved = resolve(&req, &config).unwrap();
    assert_eq!(resolved.options.width, 640);
}

// ============================================================================
// Signatures
// ============================================================================

#[test]
fn test_signed_path_accepted() {
    let config = signed_config();
    let rest = format!("/width:150/plain/{}@png", IMAGE_URL);
    let signature = generate_signature(&rest, b"test-key", b"test-salt", 32).unwrap();

    let resolved = resolve_ok(&format!("/{}{}", signature, rest), &config);
    assert_eq!(resolved.options.width, 150);
    assert_eq!(resolved.options.format, Some(ImageType::Png));
}

#[test]
fn test_signed_path_with_truncated_signature() {
    let mut config = signed_config();
    config.signing.signature_size = 8;
    let rest = format!("/plain/{}", IMAGE_URL);
    let signature = generate_signature(&rest, b"test-key", b"test-salt", 8).unwrap();

    assert!(resolve(&request(&format!("/{}{}", signature, rest)), &config).is_ok());
}

#[test]
fn test_signed_path_invalid() {
    let config = signed_config();
    let err = resolve(
        &request(&format!("/unsafe/width:150/plain/{}@png", IMAGE_URL)),
        &config,
    )
    .unwrap_err();
    assert_eq!(err, ProcessingError::InvalidSignature);
    assert_eq!(err.to_http_status(), 403);
    assert_eq!(err.to_string(), "Invalid signature");
}

#[test]
fn test_tampered_path_rejected() {
    let config = signed_config();
    let signature =
        generate_signature(&format!("/w:100/plain/{}", IMAGE_URL), b"test-key", b"test-salt", 32)
            .unwrap();
    let err = resolve(
        &request(&format!("/{}/w:2000/plain/{}", signature, IMAGE_URL)),
        &config,
    )
    .unwrap_err();
    assert_eq!(err, ProcessingError::InvalidSignature);
}

#[test]
fn test_insecure_mode_accepts_unsafe() {
    let mut config = signed_config();
    config.signing.allow_insecure = true;
    assert!(resolve(&request(&format!("/unsafe/plain/{}", IMAGE_URL)), &config).is_ok());
}

#[rstest]
#[case::insecure_mode(true, true)]
#[case::no_keys(false, false)]
fn test_signed_path_resolves_when_signing_is_off(#[case] keep_keys: bool, #[case] insecure: bool) {
    let rest = format!("/w:150/plain/{}", IMAGE_URL);
    let signature = generate_signature(&rest, b"test-key", b"test-salt", 32).unwrap();

    let mut config = if keep_keys { signed_config() } else { Config::default() };
    config.signing.allow_insecure = insecure;

    let resolved = resolve_ok(&format!("/{}{}", signature, rest), &config);
    assert_eq!(resolved.image_url, IMAGE_URL);
    assert_eq!(resolved.options.width, 150);
}

#[test]
fn test_signature_checked_before_path_grammar() {
    let config = signed_config();
    let err = resolve(
        &request(&format!("/unsafe/rotate:90/plain/{}", IMAGE_URL)),
        &config,
    )
    .unwrap_err();
    assert_eq!(err, ProcessingError::InvalidSignature);
}

#[test]
fn test_latin1_escaped_source_url() {
    let resolved = resolve_ok("/unsafe/w:100/plain/http://images.dev/caf%E9.jpg", &Config::default());
    assert_eq!(resolved.image_url, "http://images.dev/caf%E9.jpg");
    assert_eq!(resolved.options.width, 100);
}
