//! Client-visible message catalog.
//!
//! Built-in English texts for the denial message keys, with an optional
//! per-locale JSON override file (`messages.<locale>.json` under the data
//! root). Unknown keys echo the key itself so a missing catalog entry is
//! visible rather than silent.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

static BUILTIN_EN: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("unknown-group", "No such file group is configured."),
        (
            "unauthorized",
            "You are not allowed to fetch files from this group.",
        ),
        ("unknown-file", "The requested file is not available."),
    ])
});

/// Narrow localization seam; the HTTP layer depends on this, not on `Catalog`.
pub trait Localizer {
    fn text(&self, key: &str) -> String;
}

/// The concrete catalog: built-in English plus file-based overrides.
#[derive(Debug, Default)]
pub struct Catalog {
    overrides: HashMap<String, String>,
}

impl Catalog {
    /// Built-in texts only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load overrides for `locale` from the data root. A missing file is
    /// normal (built-ins apply); an unparsable one is logged and skipped.
    pub fn load(data_root: &Path, locale: &str) -> Self {
        let path = data_root.join(format!("messages.{}.json", locale));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::builtin(),
        };
        match serde_json::from_str::<HashMap<String, String>>(&raw) {
            Ok(overrides) => Self { overrides },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparsable message override file");
                Self::builtin()
            }
        }
    }
}

impl Localizer for Catalog {
    fn text(&self, key: &str) -> String {
        if let Some(text) = self.overrides.get(key) {
            return text.clone();
        }
        BUILTIN_EN
            .get(key)
            .map(|t| t.to_string())
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_texts_cover_all_denial_keys() {
        let catalog = Catalog::builtin();
        for key in ["unknown-group", "unauthorized", "unknown-file"] {
            let text = catalog.text(key);
            assert_ne!(text, key, "missing builtin text for {}", key);
        }
    }

    #[test]
    fn unknown_key_echoes_key() {
        assert_eq!(Catalog::builtin().text("no-such-key"), "no-such-key");
    }

    #[test]
    fn override_file_wins_and_gaps_fall_back() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("messages.de.json"),
            r#"{"unknown-file": "Die angeforderte Datei ist nicht verfügbar."}"#,
        )
        .unwrap();
        let catalog = Catalog::load(dir.path(), "de");
        assert!(catalog.text("unknown-file").starts_with("Die"));
        // Key absent from the override file still resolves via the builtin.
        assert_eq!(
            catalog.text("unknown-group"),
            "No such file group is configured."
        );
    }

    #[test]
    fn missing_and_broken_override_files_fall_back() {
        let dir = tempdir().unwrap();
        let missing = Catalog::load(dir.path(), "fr");
        assert_eq!(missing.text("unauthorized"), Catalog::builtin().text("unauthorized"));

        std::fs::write(dir.path().join("messages.it.json"), b"not json").unwrap();
        let broken = Catalog::load(dir.path(), "it");
        assert_eq!(broken.text("unauthorized"), Catalog::builtin().text("unauthorized"));
    }
}
