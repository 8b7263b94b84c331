//! Path rewrite rule normalization
//!
//! M3 path rewrite rules are expressed over a path segment. Before they can
//! be emitted into the web proxy configuration they are extended to match the
//! entire URL path while preserving any unreplaced prefix, the basename, the
//! query string and the fragment.

use regex::Regex;

/// A normalized rewrite rule ready to be emitted into a proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RewriteRule {
    /// Full-path match pattern
    pub pattern: String,
    /// Replacement with back-references
    pub replacement: String,
}

/// Normalize a path rewrite rule
///
/// The request pattern is compiled to verify it is a valid regular
/// expression, then anchored:
///
/// - an unanchored start gains `^(.*)` and the replacement keeps the matched
///   prefix;
/// - an unanchored end gains `([^?#]*/)?` so intermediate path segments
///   survive the rewrite;
/// - the basename, optional fragment and optional query are always captured
///   and appended.
///
/// # Arguments
///
/// * `request_pattern` - Pattern from the path rewrite rule
/// * `mapped_path` - Replacement path
///
/// # Returns
///
/// Returns the normalized rule, or the regex error message if the pattern
/// does not compile.
pub fn normalize_rewrite_rule(
    request_pattern: &str,
    mapped_path: &str,
) -> Result<RewriteRule, String> {
    let compiled = Regex::new(request_pattern).map_err(|e| e.to_string())?;

    // Capturing groups in the original pattern
    let mut groups = compiled.captures_len() - 1;

    let mut pattern = request_pattern.to_string();
    let mut replacement = mapped_path.to_string();

    if !pattern.starts_with('^') {
        pattern = format!("^(.*){}", pattern);
        replacement = format!("${{1}}{}", replacement);
        groups += 1;
    }

    if pattern.ends_with('$') {
        pattern.pop();
    } else {
        pattern.push_str("([^?#]*/)?");
        groups += 1;
        replacement.push_str(&format!("${{{}}}", groups));
    }

    // Basename plus optional fragment and query
    pattern.push_str(r"([^/]*(?:#[^?/]*)?(?:\?.*)?)$");
    groups += 1;
    replacement.push_str(&format!("${{{}}}", groups));

    // The assembled pattern must itself compile
    Regex::new(&pattern).map_err(|e| e.to_string())?;

    Ok(RewriteRule {
        pattern,
        replacement,
    })
}
