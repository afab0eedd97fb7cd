//! Constants used throughout the HealthBridge core crate.

/// Repository used when no base URL is configured (the public HAPI R4 test server).
pub const DEFAULT_SERVER_BASE: &str = "https://hapi.fhir.org/baseR4";

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Media type for FHIR JSON request and response bodies.
pub const FHIR_JSON_MIME: &str = "application/fhir+json";

/// Header carrying a per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Search parameter for exact family-name matching on `Patient`.
pub const FAMILY_EXACT_PARAM: &str = "family:exact";

/// Search parameter asking the server to report `Bundle.total`, and the value requesting an
/// exact count.
pub const TOTAL_PARAM: &str = "_total";
pub const TOTAL_ACCURATE: &str = "accurate";

/// Upper bound on search pages followed when the server reports no total.
pub const MAX_SEARCH_PAGES: usize = 1000;

/// Environment variable naming the repository base URL.
pub const ENV_SERVER_BASE: &str = "HB_SERVER_BASE";

/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "HB_TIMEOUT_SECS";

/// Environment variable toggling rejection of unmapped measurement kinds.
pub const ENV_STRICT_KINDS: &str = "HB_STRICT_KINDS";
