//! URL slicing utilities
//!
//! Tab URLs, frame origins and link targets all arrive as absolute URL
//! strings from the browser. These functions work directly on string slices
//! instead of pulling in a full URL parser.

// =============================================================================
// Scheme Extraction
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    // Find ':'
    let colon_pos = bytes.iter().position(|&b| b == b':')?;
    if colon_pos == 0 {
        return None;
    }

    // Check for "://"
    if bytes.len() > colon_pos + 2
        && bytes[colon_pos + 1] == b'/'
        && bytes[colon_pos + 2] == b'/'
    {
        return Some(colon_pos + 3);
    }

    None
}

/// Extract the scheme (without "://"), e.g. `https`.
#[inline]
pub fn extract_scheme(url: &str) -> Option<&str> {
    let end = get_scheme_end(url)?;
    let scheme = &url[..end - 3];
    if scheme
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
    {
        Some(scheme)
    } else {
        None
    }
}

/// Whether the URL uses a scheme that can carry service workers.
#[inline]
pub fn is_web_scheme(url: &str) -> bool {
    matches!(extract_scheme(url), Some(s) if s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https"))
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Skip userinfo
    let mut host_start = scheme_end;
    for i in scheme_end..bytes.len() {
        if bytes[i] == b'@' {
            host_start = i + 1;
            break;
        }
        if bytes[i] == b'/' || bytes[i] == b'?' || bytes[i] == b'#' {
            break;
        }
    }

    // Find host end
    let mut host_end = bytes.len();
    for i in host_start..bytes.len() {
        let b = bytes[i];
        if b == b'/' || b == b'?' || b == b'#' || b == b':' {
            host_end = i;
            break;
        }
    }

    Some((host_start, host_end))
}

/// Host extraction without allocations.
/// Returns a slice into the original URL, or `None` for URLs without an authority.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    if host_start == host_end {
        return None;
    }
    Some(&url[host_start..host_end])
}

/// Extract host with port if present.
#[inline]
pub fn extract_host_with_port(url: &str) -> Option<&str> {
    let (host_start, _) = get_host_position(url)?;
    let bytes = url.as_bytes();

    // Find authority end (first of: '/', '?', '#', or end of string)
    let mut end = bytes.len();
    for (i, &b) in bytes[host_start..].iter().enumerate() {
        if b == b'/' || b == b'?' || b == b'#' {
            end = host_start + i;
            break;
        }
    }

    if host_start == end {
        return None;
    }
    Some(&url[host_start..end])
}

// =============================================================================
// Origin
// =============================================================================

/// Serialize the origin (`scheme://host[:port]`) of an absolute URL.
///
/// Scheme and host are lowercased. Default ports are dropped so that
/// `https://a.com:443/x` and `https://a.com/` compare equal.
pub fn extract_origin(url: &str) -> Option<String> {
    let scheme = extract_scheme(url)?.to_ascii_lowercase();
    let authority = extract_host_with_port(url)?;

    let (host, port) = match authority.rfind(':') {
        Some(idx) if authority[idx + 1..].bytes().all(|b| b.is_ascii_digit()) => {
            (&authority[..idx], Some(&authority[idx + 1..]))
        }
        _ => (authority, None),
    };

    let port = port.filter(|p| {
        !p.is_empty() && !matches!((scheme.as_str(), *p), ("https", "443") | ("http", "80"))
    });

    let mut origin = String::with_capacity(scheme.len() + 3 + authority.len());
    origin.push_str(&scheme);
    origin.push_str("://");
    origin.push_str(&host.to_ascii_lowercase());
    if let Some(port) = port {
        origin.push(':');
        origin.push_str(port);
    }
    Some(origin)
}

/// Origin used for a bare domain under the given scheme, e.g. `https://example.com`.
#[inline]
pub fn domain_origin(scheme: &str, domain: &str) -> String {
    format!("{}://{}", scheme, domain)
}

// =============================================================================
// Path Extraction
// =============================================================================

/// Extract the path portion of a URL.
#[inline]
pub fn extract_path(url: &str) -> &str {
    let scheme_end = match get_scheme_end(url) {
        Some(pos) => pos,
        None => return "/",
    };

    let bytes = url.as_bytes();

    // Find path start (first '/' after host)
    let mut path_start = None;
    for (i, &b) in bytes[scheme_end..].iter().enumerate() {
        if b == b'/' {
            path_start = Some(scheme_end + i);
            break;
        }
        if b == b'?' || b == b'#' {
            return "/";
        }
    }

    let path_start = match path_start {
        Some(pos) => pos,
        None => return "/",
    };

    // Find path end
    let mut path_end = bytes.len();
    for (i, &b) in bytes[path_start..].iter().enumerate() {
        if b == b'?' || b == b'#' {
            path_end = path_start + i;
            break;
        }
    }

    &url[path_start..path_end]
}

/// First non-empty segment of a path: `/app/x/y` → `app`.
#[inline]
pub fn first_path_segment(path: &str) -> Option<&str> {
    path.split('/').find(|segment| !segment.is_empty())
}
