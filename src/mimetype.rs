//! MIME type detection for resolved files.
//!
//! Detection sniffs magic bytes first and only then consults the file
//! extension: an extension may refine an inconclusive or generic sniff (an
//! SVG sniffs as nothing in particular but `.svg` names it), while a lying
//! extension cannot override recognizable magic bytes.

use std::io;
use std::path::Path;

/// Sniffed types too generic to compare against an allow-list; the extension
/// gets a chance to refine these.
const GENERIC_TYPES: &[&str] = &["application/octet-stream", "text/plain", "unknown/unknown"];

pub const FALLBACK_TYPE: &str = "application/octet-stream";

/// Detection seam the resolver depends on; the sniffing implementation below
/// is the production detector.
pub trait MimeDetector {
    fn detect(&self, path: &Path) -> io::Result<String>;
}

/// Magic-byte sniffing with extension refinement.
#[derive(Debug, Default, Clone, Copy)]
pub struct SniffDetector;

impl MimeDetector for SniffDetector {
    fn detect(&self, path: &Path) -> io::Result<String> {
        detect(path)
    }
}

/// Detect the MIME type of the file at `path`.
///
/// Errors are I/O only (unreadable file, or a directory); an unrecognizable
/// but readable file comes back as `application/octet-stream`.
pub fn detect(path: &Path) -> io::Result<String> {
    let sniffed = infer::get_from_path(path)?.map(|kind| kind.mime_type().to_string());
    match sniffed {
        Some(t) if !GENERIC_TYPES.contains(&t.as_str()) => Ok(t),
        inconclusive => {
            let by_extension = mime_guess::from_path(path)
                .first_raw()
                .map(|m| m.to_string());
            Ok(by_extension
                .or(inconclusive)
                .unwrap_or_else(|| FALLBACK_TYPE.to_string()))
        }
    }
}
