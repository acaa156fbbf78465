// Constants module - centralized default values and URL grammar keywords
//
// Keywords here are part of the public URL grammar. Changing one breaks every
// URL already handed out to clients.

// =============================================================================
// Path grammar keywords
// =============================================================================

/// Access token that skips signature verification when signing is not enforced
pub const BYPASS_TOKEN: &str = "unsafe";

/// Segment announcing that the rest of the path is a literal source URL
pub const PLAIN_KEYWORD: &str = "plain";

/// Segment announcing that the rest of the path is a base64url source URL
pub const ENCODED_KEYWORD: &str = "encoded";

/// Name of the preset applied to every request before anything else
pub const DEFAULT_PRESET_NAME: &str = "default";

// =============================================================================
// Signing defaults
// =============================================================================

/// Number of HMAC-SHA256 bytes kept in a signature (full digest)
pub const DEFAULT_SIGNATURE_SIZE: usize = 32;

/// Upper bound for `signature_size`, the SHA-256 digest length
pub const MAX_SIGNATURE_SIZE: usize = 32;

// =============================================================================
// Processing option defaults
// =============================================================================

/// Default device pixel ratio
pub const DEFAULT_DPR: f64 = 1.0;

/// Default flattening background (white)
pub const DEFAULT_BACKGROUND: (u8, u8, u8) = (255, 255, 255);

/// Default watermark opacity
pub const DEFAULT_WATERMARK_OPACITY: f64 = 1.0;

/// Highest accepted quality value
pub const MAX_QUALITY: u8 = 100;

// =============================================================================
// Client hint headers
// =============================================================================

pub const HEADER_WIDTH: &str = "width";
pub const HEADER_VIEWPORT_WIDTH: &str = "viewport-width";
pub const HEADER_DPR: &str = "dpr";

/// Media type searched for in `Accept` when WebP detection is on
pub const WEBP_MEDIA_TYPE: &str = "image/webp";

// =============================================================================
// Logging defaults
// =============================================================================

/// Default log level when neither config nor RUST_LOG set one
pub const DEFAULT_LOG_LEVEL: &str = "info";
