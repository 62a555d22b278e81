//! Header values and OAuth parameter names shared by both request paths

/// `Accept` value for every request and `Content-Type` for resource requests
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// `Content-Type` of token endpoint requests
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// `response_type` sent on the authorization URL
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Only PKCE method the platform accepts
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Message of the error raised when refreshing without a refresh token.
/// Apps without the `offline_access` scope never receive one.
pub const OFFLINE_ACCESS_NOT_ALLOWED: &str = "offline access not allowed";
