//! Envelope recipient validation against the configured domain allow-list.

use std::collections::BTreeSet;

/// Which recipient domains the server accepts mail for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedDomains {
    /// Catch-all: the `*` marker.
    Any,
    /// Lower-cased domain names.
    List(BTreeSet<String>),
}

impl AllowedDomains {
    /// Parse a comma separated list. `*` anywhere in the list means catch-all.
    pub fn parse(raw: &str) -> Self {
        let mut set = BTreeSet::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if entry == "*" {
                return Self::Any;
            }
            set.insert(entry.to_ascii_lowercase());
        }
        if set.is_empty() { Self::Any } else { Self::List(set) }
    }

    pub fn permits(&self, domain: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(set) => set.contains(&domain.to_ascii_lowercase()),
        }
    }
}

/// Decides whether an envelope recipient is deliverable here.
#[derive(Debug, Clone)]
pub struct RecipientValidator {
    allowed: AllowedDomains,
}

impl RecipientValidator {
    pub fn new(allowed: AllowedDomains) -> Self {
        Self { allowed }
    }

    /// Accept `address` when it has a local part and a domain the allow-list permits.
    pub fn accept(&self, address: &str) -> bool {
        let Some((local, domain)) = address.trim().rsplit_once('@') else {
            return false;
        };
        if local.is_empty() || domain.is_empty() {
            return false;
        }
        self.allowed.permits(domain)
    }
}

/// Canonical form of an envelope address: no brackets, no whitespace, lower-case.
pub fn normalize_address(address: &str) -> String {
    address
        .trim()
        .trim_matches(['<', '>'])
        .trim()
        .to_lowercase()
}
