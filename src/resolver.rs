//! Secure path resolution for group-scoped file serving.
//!
//! This is the request-independent core: given an untrusted (group, filename)
//! pair it produces either a canonical path cleared for serving together with
//! its detected MIME type, or a typed denial with the fallback file the group
//! allows for that denial class.
//!
//! The containment check is the load-bearing control. The candidate path is
//! fully canonicalized (symlinks and dot segments resolved) and must come out
//! as a strict descendant of the group's canonical base directory. Comparison
//! is component-wise, never on string prefixes, so a sibling like
//! `/data/imgs2` can never pass for base `/data/img`, and the base itself is
//! rejected. Traversal attempts and genuinely missing files are logged apart
//! but answered identically, to avoid an oracle on filesystem layout.

use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::ServeError;
use crate::mimetype::MimeDetector;

/// Permission seam. The HTTP layer supplies the on-disk user store; tests
/// supply whatever they need.
pub trait PermissionChecker {
    fn has_right(&self, actor: Option<&str>, right: &str) -> bool;
}

/// One resolution attempt. `embedded` requests render a reference back to the
/// direct-fetch URL instead of serving bytes, so they skip the permission
/// gate; the direct fetch the reference points at re-enforces it.
#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    pub group: &'a str,
    pub filename: &'a str,
    pub embedded: bool,
    pub actor: Option<&'a str>,
}

/// Outcome of a resolution. `Deny.fallback` is already filtered down to the
/// denial classes that may use one.
#[derive(Debug)]
pub enum Resolution {
    Serve { path: PathBuf, mime: String },
    Deny { error: ServeError, fallback: Option<PathBuf> },
}

impl Resolution {
    fn deny(error: ServeError, group_fallback: Option<&PathBuf>) -> Self {
        let fallback = if error.fallback_eligible() {
            group_fallback.cloned()
        } else {
            None
        };
        Resolution::Deny { error, fallback }
    }
}

/// Resolve `req` against the group table.
///
/// Order matters: group lookup, permission gate, containment, readability,
/// type allow-list. The permission gate runs before any filesystem access so
/// an unauthorized caller learns nothing about what exists.
pub fn resolve(
    config: &AppConfig,
    perms: &dyn PermissionChecker,
    detector: &dyn MimeDetector,
    req: &ResolveRequest<'_>,
) -> Resolution {
    let Some(group) = config.group(req.group) else {
        warn!(group = req.group, "request for unconfigured group");
        return Resolution::deny(ServeError::UnknownGroup, None);
    };

    if let Some(right) = &group.right {
        if !req.embedded && !perms.has_right(req.actor, right) {
            warn!(
                group = req.group,
                actor = req.actor.unwrap_or("<anonymous>"),
                right = %right,
                "denied direct fetch without required right"
            );
            return Resolution::deny(ServeError::Unauthorized, None);
        }
    }

    let candidate = group.base.join(req.filename);
    let canonical = match fs::canonicalize(&candidate) {
        Ok(p) => p,
        Err(e) => {
            // Missing files land here, and so do traversals that point at
            // nothing; both answer as an unknown file.
            debug!(
                group = req.group,
                filename = req.filename,
                error = %e,
                "candidate path did not canonicalize"
            );
            return Resolution::deny(ServeError::MissingFile, group.fallback.as_ref());
        }
    };

    if canonical == group.base || !canonical.starts_with(&group.base) {
        // Resolvable but escaping: `..` chains, absolute filenames and
        // symlinks pointing out of the base all end up here. Logged louder
        // than a plain miss, answered the same.
        warn!(
            group = req.group,
            filename = req.filename,
            resolved = %canonical.display(),
            "resolved path escapes the group base"
        );
        return Resolution::deny(ServeError::MissingFile, group.fallback.as_ref());
    }

    if let Err(e) = fs::File::open(&canonical) {
        warn!(
            group = req.group,
            path = %canonical.display(),
            error = %e,
            "file resolved inside the base but cannot be opened"
        );
        return Resolution::deny(ServeError::UnreadableFile, group.fallback.as_ref());
    }

    let mime = match detector.detect(&canonical) {
        Ok(mime) => mime,
        Err(e) => {
            warn!(
                group = req.group,
                path = %canonical.display(),
                error = %e,
                "type detection failed on an openable path"
            );
            return Resolution::deny(ServeError::UnreadableFile, group.fallback.as_ref());
        }
    };

    if !group.allows_type(&mime) {
        warn!(
            group = req.group,
            path = %canonical.display(),
            mime = %mime,
            "detected type is not in the group allow-list"
        );
        return Resolution::deny(ServeError::DisallowedType, group.fallback.as_ref());
    }

    debug!(
        group = req.group,
        path = %canonical.display(),
        mime = %mime,
        "resolution cleared for serving"
    );
    Resolution::Serve { path: canonical, mime }
}

/// Checker that allows everything; for groups without a `right` the gate is
/// never consulted, and embedded rendering never consults it either.
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_right(&self, _actor: Option<&str>, _right: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupSpec;
    use crate::mimetype::SniffDetector;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    const PNG_MAGIC: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R',
    ];

    struct DenyAll;
    impl PermissionChecker for DenyAll {
        fn has_right(&self, _actor: Option<&str>, _right: &str) -> bool {
            false
        }
    }

    fn config_for(base: &Path, right: Option<&str>) -> AppConfig {
        let spec = GroupSpec {
            path: base.display().to_string(),
            right: right.map(|r| r.to_string()),
            fallback: None,
            mimetypes: vec!["image/png".into()],
        };
        AppConfig::from_specs(HashMap::from([("img".to_string(), spec)])).unwrap()
    }

    fn base_with_png(dir: &TempDir) -> PathBuf {
        let base = dir.path().join("img");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(base.join("a.png"), PNG_MAGIC).unwrap();
        base
    }

    fn direct<'a>(group: &'a str, filename: &'a str) -> ResolveRequest<'a> {
        ResolveRequest { group, filename, embedded: false, actor: None }
    }

    #[test]
    fn serves_a_valid_file() {
        let dir = tempdir().unwrap();
        let base = base_with_png(&dir);
        let cfg = config_for(&base, None);
        match resolve(&cfg, &AllowAll, &SniffDetector, &direct("img", "a.png")) {
            Resolution::Serve { path, mime } => {
                assert_eq!(mime, "image/png");
                assert!(path.starts_with(base.canonicalize().unwrap()));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn empty_filename_is_the_base_and_is_rejected() {
        let dir = tempdir().unwrap();
        let base = base_with_png(&dir);
        let cfg = config_for(&base, None);
        for filename in ["", ".", "./"] {
            match resolve(&cfg, &AllowAll, &SniffDetector, &direct("img", filename)) {
                Resolution::Deny { error, .. } => assert_eq!(error, ServeError::MissingFile),
                other => panic!("{:?} must not serve, got {:?}", filename, other),
            }
        }
    }

    #[test]
    fn unknown_group_denies_without_fallback() {
        let dir = tempdir().unwrap();
        let base = base_with_png(&dir);
        let cfg = config_for(&base, None);
        match resolve(&cfg, &AllowAll, &SniffDetector, &direct("nope", "a.png")) {
            Resolution::Deny { error, fallback } => {
                assert_eq!(error, ServeError::UnknownGroup);
                assert!(fallback.is_none());
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn permission_gate_runs_before_any_filesystem_probe() {
        let dir = tempdir().unwrap();
        let base = base_with_png(&dir);
        let cfg = config_for(&base, Some("viewimg"));
        // The file does not exist; an unauthorized caller still sees 403,
        // not 404, proving the gate fires first.
        match resolve(&cfg, &DenyAll, &SniffDetector, &direct("img", "nope.png")) {
            Resolution::Deny { error, fallback } => {
                assert_eq!(error, ServeError::Unauthorized);
                assert!(fallback.is_none());
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn embedded_requests_skip_the_permission_gate() {
        let dir = tempdir().unwrap();
        let base = base_with_png(&dir);
        let cfg = config_for(&base, Some("viewimg"));
        let req = ResolveRequest { group: "img", filename: "a.png", embedded: true, actor: None };
        assert!(matches!(resolve(&cfg, &DenyAll, &SniffDetector, &req), Resolution::Serve { .. }));
    }
}
