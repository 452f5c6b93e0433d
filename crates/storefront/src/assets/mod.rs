//! Vite asset tags for templates.
//!
//! Templates ask for assets by logical name (`main.js`, `checkout`). The
//! [`AssetResolver`] maps those names onto hashed build output through the
//! Vite manifest and renders the `<script>`/`<link>` tags for them.

mod manifest;

pub use manifest::{Manifest, ManifestEntry, ManifestError, Strategy};

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::config::AssetConfig;

/// Directory of the Vite build under the static URL.
const BUILD_DIR: &str = "dist";

/// Resolves logical asset names to built files.
///
/// The manifest is read once, on first use, and the outcome is kept for the
/// life of the resolver. A missing or malformed manifest is logged at that
/// read and every name then falls back to `<static_url>/dist/<name>`; a
/// manifest written later is picked up on restart.
#[derive(Debug)]
pub struct AssetResolver {
    manifest_path: PathBuf,
    static_url: String,
    dev_server_url: Option<String>,
    manifest: OnceLock<Option<Arc<Manifest>>>,
}

/// A resolved asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Manifest key that matched.
    pub key: String,
    /// Public URL of the built file.
    pub url: String,
}

impl AssetResolver {
    #[must_use]
    pub fn new(config: &AssetConfig, static_url: &str) -> Self {
        Self {
            manifest_path: config.manifest_path.clone(),
            static_url: static_url.trim_end_matches('/').to_string(),
            dev_server_url: config.dev_server_url.clone(),
            manifest: OnceLock::new(),
        }
    }

    /// Resolver over an already-parsed manifest.
    #[must_use]
    pub fn with_manifest(manifest: Manifest, static_url: &str) -> Self {
        Self {
            manifest_path: PathBuf::new(),
            static_url: static_url.trim_end_matches('/').to_string(),
            dev_server_url: None,
            manifest: OnceLock::from(Some(Arc::new(manifest))),
        }
    }

    /// The manifest, reading it on the first call.
    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.get_or_init(|| self.load()).clone()
    }

    fn load(&self) -> Option<Arc<Manifest>> {
        match Manifest::load(&self.manifest_path) {
            Ok(loaded) => {
                tracing::info!(
                    path = %self.manifest_path.display(),
                    entries = loaded.len(),
                    "Loaded Vite manifest"
                );
                Some(Arc::new(loaded))
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.manifest_path.display(),
                    error = %e,
                    "Vite manifest unavailable, using fallback asset paths"
                );
                None
            }
        }
    }

    /// URL of the built file for a logical name, if the manifest knows it.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ResolvedAsset> {
        let manifest = self.manifest()?;
        let (key, entry) = manifest.resolve(name)?;
        Some(ResolvedAsset {
            key: key.to_string(),
            url: self.build_url(&entry.file),
        })
    }

    /// URL for a logical name, falling back to the unhashed build path.
    #[must_use]
    pub fn url(&self, name: &str) -> String {
        self.resolve(name)
            .map_or_else(|| self.fallback_url(name), |asset| asset.url)
    }

    /// HTML tags loading the given entries.
    #[must_use]
    pub fn render_tags(&self, names: &[&str]) -> String {
        if let Some(dev) = &self.dev_server_url {
            return render_dev_tags(dev, names);
        }

        let manifest = self.manifest();
        let mut stylesheets: Vec<String> = Vec::new();
        let mut scripts: Vec<String> = Vec::new();
        let mut preloads: Vec<String> = Vec::new();

        for name in names {
            let resolved = manifest.as_deref().and_then(|m| m.resolve(name).map(|r| (m, r)));
            let Some((manifest, (key, entry))) = resolved else {
                let url = self.fallback_url(name);
                if is_stylesheet(name) {
                    push_unique(&mut stylesheets, url);
                } else {
                    push_unique(&mut scripts, url);
                }
                continue;
            };

            for css in &entry.css {
                push_unique(&mut stylesheets, self.build_url(css));
            }
            for import in manifest.transitive_imports(key) {
                if let Some(chunk) = manifest.get(import) {
                    for css in &chunk.css {
                        push_unique(&mut stylesheets, self.build_url(css));
                    }
                    push_unique(&mut preloads, self.build_url(&chunk.file));
                }
            }
            if is_stylesheet(&entry.file) {
                push_unique(&mut stylesheets, self.build_url(&entry.file));
            } else {
                push_unique(&mut scripts, self.build_url(&entry.file));
            }
        }

        let mut html = String::new();
        for href in &stylesheets {
            let _ = writeln!(html, r#"<link rel="stylesheet" href="{}">"#, escape_attr(href));
        }
        for href in &preloads {
            let _ = writeln!(html, r#"<link rel="modulepreload" href="{}">"#, escape_attr(href));
        }
        for src in &scripts {
            let _ = writeln!(html, r#"<script type="module" src="{}"></script>"#, escape_attr(src));
        }
        html
    }

    fn build_url(&self, file: &str) -> String {
        format!("{}/{BUILD_DIR}/{}", self.static_url, file.trim_start_matches('/'))
    }

    fn fallback_url(&self, name: &str) -> String {
        self.build_url(name.trim())
    }
}

fn render_dev_tags(dev_server: &str, names: &[&str]) -> String {
    let mut html = format!(
        "<script type=\"module\" src=\"{}/@vite/client\"></script>\n",
        escape_attr(dev_server)
    );
    for name in names {
        let src = format!("{dev_server}/{}", name.trim().trim_start_matches('/'));
        let _ = writeln!(html, r#"<script type="module" src="{}"></script>"#, escape_attr(&src));
    }
    html
}

fn is_stylesheet(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
