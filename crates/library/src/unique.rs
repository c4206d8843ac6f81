use std::path::Path;

use common::{short_hash, split_extension, strip_catalog_suffix};
use rand::Rng;
use tracing::warn;

use crate::fsview::TreeView;
use crate::report::DuplicateRecord;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueName {
    pub name: String,
    pub duplicate: Option<DuplicateRecord>,
}

/// Picks a free name in `parent`, starting from `desired`.
///
/// Tries `desired` itself, then `base-1`, `base-2`, ... up to `max_attempts`,
/// then `base-dup-<hash of original path>`, then random tokens until one is
/// free. The counter goes in front of a catalog marker so the marker stays last.
pub fn resolve_unique_name(
    view: &TreeView,
    parent: &Path,
    desired: &str,
    original: &Path,
    max_attempts: usize,
) -> UniqueName {
    if !view.exists(&parent.join(desired)) {
        return UniqueName {
            name: desired.to_string(),
            duplicate: None,
        };
    }

    let (stem, ext) = split_extension(desired);
    let base = strip_catalog_suffix(stem);
    let marker = &stem[base.len()..];
    let ext = ext.map(|ext| format!(".{}", ext)).unwrap_or_default();
    let compose = |tag: &str| format!("{}-{}{}{}", base, tag, marker, ext);
    let is_free = |name: &str| !view.exists(&parent.join(name));

    let mut chosen = None;
    for counter in 1..=max_attempts {
        let candidate = compose(&counter.to_string());
        if is_free(&candidate) {
            chosen = Some(candidate);
            break;
        }
    }

    let name = match chosen {
        Some(name) => name,
        None => {
            let hashed = compose(&format!("dup-{}", short_hash(&original.to_string_lossy())));
            if is_free(&hashed) {
                warn!("using hash-based name after {} attempts: {}", max_attempts, hashed);
                hashed
            } else {
                let mut rng = rand::rng();
                loop {
                    let token: u32 = rng.random();
                    let candidate = compose(&format!("{:08x}", token));
                    if is_free(&candidate) {
                        warn!("using random name: {}", candidate);
                        break candidate;
                    }
                }
            }
        }
    };

    UniqueName {
        duplicate: Some(DuplicateRecord {
            original_path: original.to_path_buf(),
            desired_name: desired.to_string(),
            assigned_name: name.clone(),
        }),
        name,
    }
}
