//! The resolver and loader contract.
//!
//! Path resolution and file loading are external collaborators: the core
//! only defines the interface and requires implementations to be safe to
//! call concurrently from any worker thread.

use kestrel_common::Loader;
use std::sync::Arc;

/// What the core hands the resolver for one import.
#[derive(Debug, Clone)]
pub struct ResolveArgs<'a> {
    /// The path as written in the source.
    pub path: &'a str,
    /// Absolute path of the importing file ("" for entry points).
    pub importer: &'a str,
    /// Directory resolution should start from.
    pub resolve_dir: &'a str,
    /// Namespace of the importer.
    pub namespace: &'a str,
    pub kind: kestrel_parser::ImportKind,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    /// Absolute logical path of the target.
    pub path: String,
    /// Namespace tag; empty means "file".
    pub namespace: String,
    /// The import stays outside the bundle.
    pub external: bool,
    /// `sideEffects: false` from the surrounding package.
    pub side_effects_false: bool,
}

#[derive(Debug, Clone)]
pub struct LoadArgs<'a> {
    pub path: &'a str,
    pub namespace: &'a str,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub contents: String,
    pub loader: Loader,
    /// Directory used to resolve this file's own imports.
    pub resolve_dir: String,
}

/// Path -> (source | external) contract. Implementations must be safe to
/// call concurrently from any worker.
pub trait Resolver: Send + Sync {
    fn resolve(&self, args: ResolveArgs<'_>) -> Result<ResolveResult, String>;
    fn load(&self, args: LoadArgs<'_>) -> Result<LoadResult, String>;
}

/// An in-memory resolver over a fixed file map. Useful for embedding and
/// for tests; real builds plug in a filesystem implementation.
#[derive(Default)]
pub struct MemoryResolver {
    files: rustc_hash::FxHashMap<String, (String, Loader)>,
    external_prefixes: Vec<String>,
    side_effects_false: rustc_hash::FxHashSet<String>,
}

impl MemoryResolver {
    #[must_use]
    pub fn new() -> MemoryResolver {
        MemoryResolver::default()
    }

    pub fn add(&mut self, path: impl Into<String>, contents: impl Into<String>) -> &mut Self {
        let path = path.into();
        let loader = loader_from_path(&path);
        self.files.insert(path, (contents.into(), loader));
        self
    }

    pub fn add_with_loader(
        &mut self,
        path: impl Into<String>,
        contents: impl Into<String>,
        loader: Loader,
    ) -> &mut Self {
        self.files.insert(path.into(), (contents.into(), loader));
        self
    }

    /// Paths starting with this prefix resolve as external.
    pub fn mark_external(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.external_prefixes.push(prefix.into());
        self
    }

    pub fn mark_side_effect_free(&mut self, path: impl Into<String>) -> &mut Self {
        self.side_effects_false.insert(path.into());
        self
    }

    pub fn shared(self) -> Arc<dyn Resolver> {
        Arc::new(self)
    }
}

fn loader_from_path(path: &str) -> Loader {
    let ext = path.rsplit('.').next().unwrap_or("");
    Loader::from_extension(ext)
}

impl Resolver for MemoryResolver {
    fn resolve(&self, args: ResolveArgs<'_>) -> Result<ResolveResult, String> {
        if self
            .external_prefixes
            .iter()
            .any(|p| args.path.starts_with(p.as_str()))
        {
            return Ok(ResolveResult {
                path: args.path.to_string(),
                namespace: "external".to_string(),
                external: true,
                side_effects_false: false,
            });
        }
        let candidates = [
            args.path.trim_start_matches("./").to_string(),
            format!("{}.js", args.path.trim_start_matches("./")),
            format!("{}.ts", args.path.trim_start_matches("./")),
        ];
        for candidate in &candidates {
            if self.files.contains_key(candidate) {
                return Ok(ResolveResult {
                    path: candidate.clone(),
                    namespace: "file".to_string(),
                    external: false,
                    side_effects_false: self.side_effects_false.contains(candidate),
                });
            }
        }
        Err(format!("Could not resolve \"{}\"", args.path))
    }

    fn load(&self, args: LoadArgs<'_>) -> Result<LoadResult, String> {
        match self.files.get(args.path) {
            Some((contents, loader)) => Ok(LoadResult {
                contents: contents.clone(),
                loader: *loader,
                resolve_dir: String::new(),
            }),
            None => Err(format!("Could not load \"{}\"", args.path)),
        }
    }
}
