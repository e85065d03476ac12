//! Content Provenance & Signing Interfaces
//!
//! `SecurityDescriptor`s record where interpolated content came from; they
//! accumulate in the environment during interpolation and can be attached to
//! derived values. Signing and verification are external concerns consumed
//! through the narrow [`Signer`] trait.

use indexmap::IndexSet;

/// Provenance/label descriptor for a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    /// Where the content came from: file paths, module origins, runtimes.
    pub sources: IndexSet<String>,
    /// Policy labels attached by guards or imports.
    pub labels: IndexSet<String>,
}

impl SecurityDescriptor {
    pub fn from_source(source: impl Into<String>) -> Self {
        let mut sources = IndexSet::new();
        sources.insert(source.into());
        Self {
            sources,
            labels: IndexSet::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.labels.is_empty()
    }
}

/// Merge descriptors; union of sources and labels, order preserved.
pub fn descriptor_merge(descriptors: &[SecurityDescriptor]) -> SecurityDescriptor {
    let mut merged = SecurityDescriptor::default();
    for d in descriptors {
        merged.sources.extend(d.sources.iter().cloned());
        merged.labels.extend(d.labels.iter().cloned());
    }
    merged
}

/// Signing/verification collaborator. The core only calls through this
/// trait; key management and algorithms live outside.
pub trait Signer: Send + Sync {
    fn sign(&self, content: &str, key: &str) -> String;
    fn verify(&self, content: &str, signature: &str) -> bool;
}

/// Signer that accepts everything. Used when no signing backend is wired in.
#[derive(Debug, Default)]
pub struct NullSigner;

impl Signer for NullSigner {
    fn sign(&self, _content: &str, _key: &str) -> String {
        String::new()
    }

    fn verify(&self, _content: &str, _signature: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_unions_and_preserves_order() {
        let a = SecurityDescriptor::from_source("a.mld");
        let b = SecurityDescriptor::from_source("b.mld").with_label("imported");
        let merged = descriptor_merge(&[a, b]);
        let sources: Vec<_> = merged.sources.iter().cloned().collect();
        assert_eq!(sources, vec!["a.mld", "b.mld"]);
        assert!(merged.labels.contains("imported"));
    }

    #[test]
    fn test_merge_dedupes() {
        let a = SecurityDescriptor::from_source("x");
        let b = SecurityDescriptor::from_source("x");
        let merged = descriptor_merge(&[a, b]);
        assert_eq!(merged.sources.len(), 1);
    }

    #[test]
    fn test_null_signer() {
        let s = NullSigner;
        assert_eq!(s.sign("content", "key"), "");
        assert!(s.verify("content", "anything"));
    }
}
