//! Query string assembly for authorization URLs and resource requests
//!
//! Keys and values are form-encoded one by one, so `&` or `=` inside a value
//! can never be mistaken for a separator.

use url::form_urlencoded;

/// Encode `params` as `key=value` pairs joined with `&`, in the given order.
pub fn to_url_params(params: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Build an absolute request URL from the API root, a path and query params.
///
/// A missing leading `/` is added. The `?` is only appended when there is at
/// least one parameter.
pub(crate) fn make_path(api_root: &str, path: &str, params: &[(&str, &str)]) -> String {
    let mut url = String::with_capacity(api_root.len() + path.len() + 1);
    url.push_str(api_root);
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);

    if !params.is_empty() {
        url.push('?');
        url.push_str(&to_url_params(params));
    }
    url
}
