// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vendor resolution against the vendor ledger.
//!
//! Resolution order, first hit wins:
//!
//! 1. exact match on the normalized row key
//! 2. case-insensitive substring, in either direction
//! 3. when no name was extracted, the sender's registrable domain label
//!    is used as the candidate for steps 1 and 2
//! 4. fuzzy weighted ratio against every active vendor, above a threshold

use std::collections::BTreeSet;

use apflow_core::types::normalize_vendor_key;
use apflow_core::Vendor;
use strum::Display;

/// Default minimum fuzzy score (0-100) for a match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 75.0;

/// Shortest string considered for substring matching.
const MIN_CONTAINS_LEN: usize = 3;

const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "plc",
];

/// Public suffixes with two labels, where the registrable name sits one label further left.
const TWO_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "com.au", "net.au", "org.au", "co.nz",
    "co.jp", "co.in", "co.za", "com.br", "com.mx", "com.sg", "com.cn",
];

/// Which resolution step produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Contains,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VendorMatch {
    pub vendor: Vendor,
    pub method: MatchMethod,
    /// 100 for exact and substring matches, the weighted ratio for fuzzy ones.
    pub score: f64,
    /// The candidate came from the sender's domain rather than the document.
    pub from_domain: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A regular vendor with ledger codes.
    Matched(VendorMatch),
    /// A reseller: resolved, but needs manual allocation.
    Reseller(VendorMatch),
    /// No vendor matched. Carries the candidate name that was tried, if any.
    Unknown { candidate: Option<String> },
}

impl Resolution {
    pub fn vendor(&self) -> Option<&Vendor> {
        match self {
            Self::Matched(m) | Self::Reseller(m) => Some(&m.vendor),
            Self::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}

/// Resolves candidate vendor names to ledger entries.
#[derive(Debug, Clone, Copy)]
pub struct VendorResolver {
    threshold: f64,
}

impl Default for VendorResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl VendorResolver {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 100.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve `candidate` (the name extracted from the invoice, if any) for
    /// a message from `sender_email`. Inactive vendors never match.
    pub fn resolve(
        &self,
        vendors: &[Vendor],
        candidate: Option<&str>,
        sender_email: &str,
    ) -> Resolution {
        let active: Vec<&Vendor> = vendors.iter().filter(|v| v.active).collect();

        let extracted = candidate.map(str::trim).filter(|c| !c.is_empty());
        let (name, from_domain) = match extracted {
            Some(name) => (name.to_string(), false),
            None => match sender_domain_label(sender_email) {
                Some(label) => (label, true),
                None => return Resolution::Unknown { candidate: None },
            },
        };

        let found = exact_match(&active, &name)
            .map(|v| (v, MatchMethod::Exact, 100.0))
            .or_else(|| contains_match(&active, &name).map(|v| (v, MatchMethod::Contains, 100.0)))
            .or_else(|| {
                self.fuzzy_match(&active, &name)
                    .map(|(v, score)| (v, MatchMethod::Fuzzy, score))
            });

        match found {
            Some((vendor, method, score)) => {
                let m = VendorMatch {
                    vendor: vendor.clone(),
                    method,
                    score,
                    from_domain,
                };
                if vendor.is_reseller() {
                    Resolution::Reseller(m)
                } else {
                    Resolution::Matched(m)
                }
            }
            None => Resolution::Unknown {
                candidate: Some(name),
            },
        }
    }

    fn fuzzy_match<'a>(&self, vendors: &[&'a Vendor], name: &str) -> Option<(&'a Vendor, f64)> {
        vendors
            .iter()
            .map(|v| (*v, weighted_ratio(name, &v.name)))
            .filter(|(_, score)| *score >= self.threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

fn exact_match<'a>(vendors: &[&'a Vendor], name: &str) -> Option<&'a Vendor> {
    let key = normalize_vendor_key(name);
    if key.is_empty() {
        return None;
    }
    vendors.iter().copied().find(|v| {
        let row_key = if v.row_key.is_empty() {
            normalize_vendor_key(&v.name)
        } else {
            v.row_key.to_lowercase()
        };
        row_key == key
    })
}

/// Longest display name that contains, or is contained in, `name`.
fn contains_match<'a>(vendors: &[&'a Vendor], name: &str) -> Option<&'a Vendor> {
    let needle = name.trim().to_lowercase();
    if needle.chars().count() < MIN_CONTAINS_LEN {
        return None;
    }
    vendors
        .iter()
        .copied()
        .filter(|v| {
            let display = v.name.trim().to_lowercase();
            display.chars().count() >= MIN_CONTAINS_LEN
                && (display.contains(&needle) || needle.contains(&display))
        })
        .max_by_key(|v| v.name.trim().len())
}

/// First label of the registrable domain of `sender_email`.
///
/// `billing@mail.adobe.com` gives `adobe`, `ap@invoices.acme.co.uk` gives `acme`.
pub fn sender_domain_label(sender_email: &str) -> Option<String> {
    let (_, domain) = sender_email.trim().rsplit_once('@')?;
    let domain = domain.trim().trim_end_matches('>').to_lowercase();
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    let n = labels.len();
    if n < 2 {
        return None;
    }
    let suffix = format!("{}.{}", labels[n - 2], labels[n - 1]);
    let label = if TWO_LEVEL_SUFFIXES.contains(&suffix.as_str()) {
        if n < 3 {
            return None;
        }
        labels[n - 3]
    } else {
        labels[n - 2]
    };
    Some(label.to_string())
}

/// Lowercased alphanumeric tokens with trailing legal suffixes removed.
fn tokens(name: &str) -> Vec<String> {
    let mut tokens: Vec<String> = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|t| LEGAL_SUFFIXES.contains(&t.as_str()))
    {
        tokens.pop();
    }
    tokens
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

fn token_set_ratio(a: &[String], b: &[String]) -> f64 {
    let set_a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = b.iter().map(String::as_str).collect();

    let sect: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    if !sect.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = sect.join(" ");
    let join = |rest: &[&str]| {
        if sect.is_empty() {
            rest.join(" ")
        } else {
            format!("{sect} {}", rest.join(" "))
        }
    };
    let combined_a = join(&only_a);
    let combined_b = join(&only_b);

    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_a))
            .max(ratio(&sect, &combined_b));
    }
    best
}

/// Similarity of two vendor names on a 0-100 scale.
///
/// The maximum of the plain ratio, the token-sort ratio, and 0.95 times the
/// token-set ratio, all computed after dropping legal suffixes.
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let plain = ratio(&ta.join(" "), &tb.join(" "));

    let mut sorted_a = ta.clone();
    let mut sorted_b = tb.clone();
    sorted_a.sort();
    sorted_b.sort();
    let sorted = ratio(&sorted_a.join(" "), &sorted_b.join(" "));

    let set = token_set_ratio(&ta, &tb) * 0.95;

    plain.max(sorted).max(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vendor(name: &str, gl: &str, category: &str) -> Vendor {
        Vendor {
            name: name.to_string(),
            row_key: normalize_vendor_key(name),
            expense_dept: "IT".to_string(),
            gl_code: gl.to_string(),
            allocation_schedule: "MONTHLY".to_string(),
            billing_party: "Company HQ".to_string(),
            product_category: category.to_string(),
            active: true,
        }
    }

    fn ledger() -> Vec<Vendor> {
        vec![
            vendor("Adobe Inc", "6100", "software"),
            vendor("Microsoft", "6110", "software"),
            vendor("CDW Corporation", "6120", "reseller"),
            vendor("Amazon Web Services", "6200", "cloud"),
        ]
    }

    fn matched(resolution: Resolution) -> VendorMatch {
        match resolution {
            Resolution::Matched(m) => m,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn exact_row_key_match() {
        let m = matched(VendorResolver::default().resolve(&ledger(), Some("adobe-inc"), "x@y.com"));
        assert_eq!(m.vendor.gl_code, "6100");
        assert_eq!(m.method, MatchMethod::Exact);
    }

    #[test]
    fn substring_match_both_directions() {
        let resolver = VendorResolver::default();
        let m = matched(resolver.resolve(&ledger(), Some("Microsoft Ireland Operations"), ""));
        assert_eq!(m.vendor.name, "Microsoft");
        assert_eq!(m.method, MatchMethod::Contains);

        let m = matched(resolver.resolve(&ledger(), Some("web services"), ""));
        assert_eq!(m.vendor.name, "Amazon Web Services");
    }

    #[test]
    fn short_candidates_skip_substring() {
        let resolved = VendorResolver::default().resolve(&ledger(), Some("ad"), "");
        assert!(resolved.is_unknown());
    }

    #[test]
    fn fuzzy_matches_legal_name_variants() {
        let m = matched(VendorResolver::default().resolve(
            &ledger(),
            Some("Adobe Systems Incorporated"),
            "billing@adobe.com",
        ));
        assert_eq!(m.vendor.name, "Adobe Inc");
        assert_eq!(m.method, MatchMethod::Fuzzy);
        assert!(m.score >= 75.0, "score {}", m.score);
    }

    #[test]
    fn domain_fallback_when_no_name() {
        let resolution =
            VendorResolver::default().resolve(&ledger(), None, "billing@mail.adobe.com");
        let m = matched(resolution);
        assert_eq!(m.vendor.name, "Adobe Inc");
        assert!(m.from_domain);
    }

    #[test]
    fn unknown_sender_stays_unknown() {
        let resolved = VendorResolver::default().resolve(&ledger(), None, "vendor@nobody.test");
        assert_eq!(
            resolved,
            Resolution::Unknown {
                candidate: Some("nobody".to_string())
            }
        );
    }

    #[test]
    fn reseller_is_flagged() {
        let resolved = VendorResolver::default().resolve(&ledger(), Some("CDW Corporation"), "");
        match resolved {
            Resolution::Reseller(m) => assert_eq!(m.vendor.gl_code, "6120"),
            other => panic!("expected reseller, got {other:?}"),
        }
    }

    #[test]
    fn inactive_vendors_are_ignored() {
        let mut vendors = ledger();
        vendors[0].active = false;
        let resolved = VendorResolver::default().resolve(&vendors, Some("Adobe Inc"), "");
        assert!(resolved.is_unknown());
    }

    #[test]
    fn threshold_is_respected() {
        let strict = VendorResolver::new(99.0);
        let resolved = strict.resolve(&ledger(), Some("Adobe Systems Incorporated"), "");
        assert!(resolved.is_unknown());
    }

    #[test]
    fn registrable_domain_labels() {
        assert_eq!(sender_domain_label("a@adobe.com").as_deref(), Some("adobe"));
        assert_eq!(sender_domain_label("a@eu.mail.adobe.com").as_deref(), Some("adobe"));
        assert_eq!(sender_domain_label("a@invoices.acme.co.uk").as_deref(), Some("acme"));
        assert_eq!(sender_domain_label("Billing <a@Acme.COM>").as_deref(), Some("acme"));
        assert_eq!(sender_domain_label("a@co.uk"), None);
        assert_eq!(sender_domain_label("not-an-address"), None);
        assert_eq!(sender_domain_label("a@localhost"), None);
    }

    #[test]
    fn weighted_ratio_properties() {
        assert_eq!(weighted_ratio("Adobe Inc", "adobe"), 100.0);
        assert_eq!(weighted_ratio("Web Services Amazon", "Amazon Web Services"), 100.0);
        assert!(weighted_ratio("Microsoft", "Adobe Inc") < 50.0);
        assert_eq!(weighted_ratio("", "Adobe"), 0.0);
    }
}
