use std::{collections::HashMap, path::Path};

use crate::Result;

/// Flat `key -> template` message catalogs, one JSON file per language.
///
/// Templates use `${param}` placeholders. Resolution falls back to the
/// default language and finally to the key itself, so a missing entry shows
/// up in chat as the bare key instead of crashing a handler.
#[derive(Clone, Debug, Default)]
pub struct LocaleStore {
    default_lang: String,
    catalogs: HashMap<String, HashMap<String, String>>,
}

impl LocaleStore {
    /// Reads every `<lang>.json` in `dir`.
    pub fn load(dir: &Path, default_lang: &str) -> Result<Self> {
        let mut catalogs = HashMap::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let txt = std::fs::read_to_string(&path)?;
            let catalog: HashMap<String, String> = serde_json::from_str(&txt)?;
            catalogs.insert(lang.to_string(), catalog);
        }

        Ok(Self {
            default_lang: default_lang.to_string(),
            catalogs,
        })
    }

    /// Languages with a loaded catalog, sorted for stable menus.
    pub fn available(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    pub fn has_language(&self, lang: &str) -> bool {
        self.catalogs.contains_key(lang)
    }

    /// Looks up `key` for `lang` (or the default language when `None`) and
    /// interpolates `${param}` placeholders.
    pub fn resolve(&self, lang: Option<&str>, key: &str, params: &[(&str, &str)]) -> String {
        let template = self
            .lookup(lang.unwrap_or(&self.default_lang), key)
            .or_else(|| self.lookup(&self.default_lang, key));

        let Some(template) = template else {
            return key.to_string();
        };

        let mut out = template.to_string();
        for (name, value) in params {
            out = out.replace(&format!("${{{name}}}"), value);
        }
        out
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.catalogs.get(lang)?.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub fn from_catalogs(
        default_lang: &str,
        catalogs: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        Self {
            default_lang: default_lang.to_string(),
            catalogs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocaleStore {
        let mut en = HashMap::new();
        en.insert(
            "ticket_created".to_string(),
            "Your ticket #${id} was created".to_string(),
        );
        en.insert("only_english".to_string(), "english only".to_string());

        let mut ru = HashMap::new();
        ru.insert(
            "ticket_created".to_string(),
            "Ваш тикет #${id} создан".to_string(),
        );

        let mut catalogs = HashMap::new();
        catalogs.insert("en".to_string(), en);
        catalogs.insert("ru".to_string(), ru);
        LocaleStore::from_catalogs("en", catalogs)
    }

    #[test]
    fn interpolates_params() {
        let s = store();
        assert_eq!(
            s.resolve(Some("en"), "ticket_created", &[("id", "ab12cd34")]),
            "Your ticket #ab12cd34 was created"
        );
        assert_eq!(
            s.resolve(Some("ru"), "ticket_created", &[("id", "ab12cd34")]),
            "Ваш тикет #ab12cd34 создан"
        );
    }

    #[test]
    fn falls_back_to_default_language_then_key() {
        let s = store();
        assert_eq!(s.resolve(Some("ru"), "only_english", &[]), "english only");
        assert_eq!(s.resolve(Some("en"), "missing_key", &[]), "missing_key");
        assert_eq!(s.resolve(None, "only_english", &[]), "english only");
    }

    #[test]
    fn loads_catalog_files_from_dir() {
        let dir = std::path::PathBuf::from(format!(
            "/tmp/stb-locales-{}-{:?}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("en.json"), r#"{"hello": "Hi ${name}"}"#).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let s = LocaleStore::load(&dir, "en").unwrap();
        assert_eq!(s.available(), vec!["en"]);
        assert_eq!(s.resolve(None, "hello", &[("name", "Bob")]), "Hi Bob");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
