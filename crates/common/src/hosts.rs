//! Host name normalization and exclusion filtering.

use regex::Regex;
use tracing::info;

/// Lowercase every host, keeping order and duplicates.
pub fn normalize_hosts<S: AsRef<str>>(hosts: &[S]) -> Vec<String> {
    hosts.iter().map(|h| h.as_ref().to_lowercase()).collect()
}

/// Ordered list of host exclusion patterns.
///
/// A host is excluded when any pattern matches it; patterns are tried in
/// configuration order and the first match is reported.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    patterns: Vec<Regex>,
}

impl HostFilter {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    /// First pattern matching `host`, if any.
    pub fn matching(&self, host: &str) -> Option<&Regex> {
        self.patterns.iter().find(|re| re.is_match(host))
    }

    /// Return the hosts no pattern matches. The result may be empty.
    pub fn filter(&self, hosts: &[String]) -> Vec<String> {
        hosts
            .iter()
            .filter(|host| match self.matching(host) {
                Some(re) => {
                    info!(host = %host, pattern = %re, "Ignoring host because it matched a filter");
                    false
                }
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_of(patterns: &[&str]) -> HostFilter {
        HostFilter::new(patterns.iter().map(|p| Regex::new(p).unwrap()).collect())
    }

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_hosts() {
        assert_eq!(
            normalize_hosts(&["Example.COM", "www.example.com"]),
            hosts(&["example.com", "www.example.com"])
        );
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = HostFilter::default();
        let input = hosts(&["domain1", "sub.custom-domain.ca"]);
        assert_eq!(filter.filter(&input), input);
    }

    #[test]
    fn test_filter_subdomains() {
        let filter = filter_of(&[r".*\.custom-domain\.ca$"]);
        assert_eq!(
            filter.filter(&hosts(&["domain1", "sub.custom-domain.ca"])),
            hosts(&["domain1"])
        );
        assert_eq!(
            filter.filter(&hosts(&["*.domain.com"])),
            hosts(&["*.domain.com"])
        );
    }

    #[test]
    fn test_filter_wildcards_to_empty() {
        let filter = filter_of(&[r".*\.custom-domain\.ca$", r"^\*\..*"]);
        assert_eq!(filter.filter(&hosts(&["*.domain.com"])), Vec::<String>::new());
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let filter = filter_of(&[r"^a\.", r"example"]);
        assert_eq!(filter.matching("a.example.com").unwrap().as_str(), r"^a\.");
        assert_eq!(filter.matching("b.example.com").unwrap().as_str(), "example");
        assert!(filter.matching("other.org").is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_filter_keeps_unmatched_in_order(list in proptest::collection::vec("[a-c]{1,3}\\.(org|net)", 0..8)) {
            let filter = filter_of(&[r"\.net$"]);
            let kept = filter.filter(&list);
            let expected: Vec<String> = list.iter().filter(|h| h.ends_with(".org")).cloned().collect();
            proptest::prop_assert_eq!(kept, expected);
        }
    }
}
