//! Module Resolution
//!
//! Resolves import references — local paths, registered `@prefix/name`
//! modules, URLs — to module content plus an integrity hash. Network and
//! registry backends are external; the core ships the local/file resolver
//! and consumes everything else through the [`ModuleResolver`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::fs::{normalize_path, FileSystem};

/// A resolved module: its source text, where it came from, and a content
/// integrity hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub content: String,
    /// Canonical origin: the absolute path or URL actually loaded. Also the
    /// module identity used for circular-import detection.
    pub origin: String,
    pub integrity_hash: String,
}

/// Context for one resolution: who is importing, and the project root.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub importing_file: Option<String>,
    pub base_path: String,
}

#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(
        &self,
        reference: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedModule, String>;
}

/// FNV-1a over the content, base64-encoded. Integrity checking across
/// fetches is the resolver's concern; this is the identity the core records.
pub fn integrity_hash(content: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in content.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    STANDARD_NO_PAD.encode(hash.to_be_bytes())
}

/// Resolver for local files and registered prefixes. `@ns/name` references
/// map through the prefix table to a directory; plain references resolve as
/// paths relative to the importing file (or the project root).
pub struct LocalResolver {
    fs: Arc<dyn FileSystem>,
    prefixes: HashMap<String, String>,
}

impl LocalResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            prefixes: HashMap::new(),
        }
    }

    /// Register `@prefix/...` to resolve under `directory`.
    pub fn with_prefix(mut self, prefix: impl Into<String>, directory: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), directory.into());
        self
    }

    fn resolve_reference_path(
        &self,
        reference: &str,
        context: &ResolveContext,
    ) -> Result<String, String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Err("network resolution is not configured".to_string());
        }
        if let Some(stripped) = reference.strip_prefix('@') {
            let (ns, name) = stripped
                .split_once('/')
                .ok_or_else(|| format!("malformed module reference '@{}'", stripped))?;
            let dir = self
                .prefixes
                .get(ns)
                .ok_or_else(|| format!("no resolver registered for prefix '@{}'", ns))?;
            let file = if name.ends_with(".mld") || name.ends_with(".mld.md") || name.ends_with(".att") {
                name.to_string()
            } else {
                format!("{}.mld", name)
            };
            return Ok(normalize_path(dir, &file));
        }
        // Plain path: relative to the importing file's directory, then the
        // project root.
        let base = context
            .importing_file
            .as_deref()
            .and_then(|f| f.rsplit_once('/').map(|(dir, _)| dir.to_string()))
            .unwrap_or_else(|| context.base_path.clone());
        Ok(normalize_path(&base, reference))
    }
}

#[async_trait]
impl ModuleResolver for LocalResolver {
    async fn resolve(
        &self,
        reference: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedModule, String> {
        let path = self.resolve_reference_path(reference, context)?;
        let content = self
            .fs
            .read_file(&path)
            .await
            .map_err(|e| e.to_string())?;
        let hash = integrity_hash(&content);
        Ok(ResolvedModule {
            content,
            origin: path,
            integrity_hash: hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    fn world() -> (Arc<InMemoryFs>, ResolveContext) {
        let fs = Arc::new(InMemoryFs::new());
        let ctx = ResolveContext {
            importing_file: Some("/project/main.mld".to_string()),
            base_path: "/project".to_string(),
        };
        (fs, ctx)
    }

    #[tokio::test]
    async fn test_relative_path_resolves_against_importer() {
        let (fs, ctx) = world();
        fs.write_file("/project/lib/util.mld", b"/var @x = 1\n")
            .await
            .unwrap();
        let resolver = LocalResolver::new(fs.clone());
        let module = resolver.resolve("lib/util.mld", &ctx).await.unwrap();
        assert_eq!(module.origin, "/project/lib/util.mld");
        assert!(!module.integrity_hash.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_resolution() {
        let (fs, ctx) = world();
        fs.write_file("/modules/config.mld", b"/var @setting = \"value\"\n")
            .await
            .unwrap();
        let resolver = LocalResolver::new(fs.clone()).with_prefix("local", "/modules");
        let module = resolver.resolve("@local/config", &ctx).await.unwrap();
        assert_eq!(module.origin, "/modules/config.mld");
        assert!(module.content.contains("@setting"));
    }

    #[tokio::test]
    async fn test_unregistered_prefix_fails() {
        let (fs, ctx) = world();
        let resolver = LocalResolver::new(fs);
        let err = resolver.resolve("@nope/x", &ctx).await.unwrap_err();
        assert!(err.contains("no resolver registered"));
    }

    #[tokio::test]
    async fn test_url_requires_network_backend() {
        let (fs, ctx) = world();
        let resolver = LocalResolver::new(fs);
        let err = resolver
            .resolve("https://example.com/m.mld", &ctx)
            .await
            .unwrap_err();
        assert!(err.contains("network"));
    }

    #[test]
    fn test_integrity_hash_is_stable() {
        assert_eq!(integrity_hash("abc"), integrity_hash("abc"));
        assert_ne!(integrity_hash("abc"), integrity_hash("abd"));
    }
}
