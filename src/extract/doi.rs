use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// DOI shape anchored at end of string, so only links that end in a DOI match
    pub static ref DOI_PATTERN: Regex = Regex::new(
        r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+$"
    ).unwrap();
}

/// Decode the URL escapes commonly found in DOI links
pub fn decode_doi_escapes(link: &str) -> String {
    link.replace("%2F", "/")
        .replace("%2f", "/")
        .replace("%3A", ":")
        .replace("%3a", ":")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%3B", ";")
        .replace("%3b", ";")
}

/// Extract a DOI from a link such as `http://dx.doi.org/10.1007/JHEP05(2013)093`
pub fn doi_from_link(link: &str) -> Option<String> {
    let decoded = decode_doi_escapes(link.trim());
    DOI_PATTERN
        .find(&decoded)
        .map(|m| m.as_str().to_string())
}

/// Cache key for a DOI (DOIs are case-insensitive)
pub fn doi_cache_key(doi: &str) -> String {
    doi.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_from_dx_link() {
        assert_eq!(
            doi_from_link("http://dx.doi.org/10.1007/JHEP05(2013)093"),
            Some("10.1007/JHEP05(2013)093".to_string())
        );
    }

    #[test]
    fn test_doi_from_https_link() {
        assert_eq!(
            doi_from_link("https://doi.org/10.1103/PhysRevB.84.245128"),
            Some("10.1103/PhysRevB.84.245128".to_string())
        );
    }

    #[test]
    fn test_doi_from_encoded_link() {
        assert_eq!(
            doi_from_link("https://doi.org/10.1103%2FPhysRevLett.73.3070"),
            Some("10.1103/PhysRevLett.73.3070".to_string())
        );
    }

    #[test]
    fn test_doi_must_end_link() {
        assert_eq!(doi_from_link("https://doi.org/10.1234/abc?format=pdf"), None);
        assert_eq!(doi_from_link("https://arxiv.org/abs/1206.2606"), None);
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(doi_cache_key(" 10.1007/JHEP05(2013)093 "), "10.1007/jhep05(2013)093");
    }
}
