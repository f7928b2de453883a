//! File-backed UCI-style config store.
//!
//! The host's real config store is OpenWrt's UCI text format — no
//! registry crate parses that syntax, so this ships a small reader/writer
//! of the subset this daemon needs (`config <section>` / `option <key>
//! <value>` pairs, one section per logical config stanza). Per §4.A, the
//! core never writes through this except via an explicit operator
//! command path; `set`/`commit` here exist for that path and for the
//! daemon's own `reload` bookkeeping, not for routine use by the engine.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use autonomy_core::error::HostAdapterError;
use autonomy_core::host::ConfigStore;

type SectionMap = HashMap<String, HashMap<String, String>>;

fn unavailable(reason: impl Into<String>) -> HostAdapterError {
    HostAdapterError::Unavailable {
        capability: "config_store".to_string(),
        reason: reason.into(),
    }
}

/// Parse UCI-subset text into `section -> key -> value`.
///
/// ```text
/// config main
///     option enable '1'
///     option poll_interval_ms '1000'
///
/// config member.starlink
///     option class 'starlink'
///     option weight '100'
///     list probes '1.1.1.1:443'
///     list probes '8.8.8.8:443'
/// ```
fn parse(text: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("config ") {
            let name = rest.trim().trim_matches('\'').trim_matches('"');
            current = Some(name.to_string());
            sections.entry(name.to_string()).or_default();
            continue;
        }
        let Some(section) = current.as_ref() else {
            continue;
        };
        if let Some(rest) = line.strip_prefix("option ") {
            if let Some((key, value)) = split_kv(rest) {
                sections.entry(section.clone()).or_default().insert(key, value);
            }
        } else if let Some(rest) = line.strip_prefix("list ") {
            if let Some((key, value)) = split_kv(rest) {
                let entry = sections.entry(section.clone()).or_default();
                entry
                    .entry(key)
                    .and_modify(|existing| {
                        existing.push(',');
                        existing.push_str(&value);
                    })
                    .or_insert(value);
            }
        }
    }
    sections
}

fn split_kv(rest: &str) -> Option<(String, String)> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let key = parts.next()?.trim();
    let value = parts.next()?.trim().trim_matches('\'').trim_matches('"');
    Some((key.to_string(), value.to_string()))
}

fn render(sections: &SectionMap) -> String {
    let mut names: Vec<&String> = sections.keys().collect();
    names.sort();
    let mut out = String::new();
    for name in names {
        out.push_str("config ");
        out.push_str(name);
        out.push('\n');
        let fields = &sections[name];
        let mut keys: Vec<&String> = fields.keys().collect();
        keys.sort();
        for key in keys {
            out.push_str(&format!("\toption {key} '{}'\n", fields[key]));
        }
        out.push('\n');
    }
    out
}

/// A [`ConfigStore`] backed by a single UCI-subset text file on disk.
pub struct UciFileStore {
    path: PathBuf,
    sections: Mutex<SectionMap>,
}

impl UciFileStore {
    /// Load from `path`, creating an empty store in memory if the file
    /// does not exist yet (a fresh install with all-default config).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HostAdapterError> {
        let path = path.as_ref().to_path_buf();
        let sections = match fs::read_to_string(&path) {
            Ok(text) => parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SectionMap::new(),
            Err(e) => return Err(unavailable(format!("reading {}: {e}", path.display()))),
        };
        Ok(UciFileStore {
            path,
            sections: Mutex::new(sections),
        })
    }
}

impl ConfigStore for UciFileStore {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, HostAdapterError> {
        Ok(self
            .sections
            .lock()
            .unwrap()
            .get(section)
            .and_then(|fields| fields.get(key))
            .cloned())
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), HostAdapterError> {
        self.sections
            .lock()
            .unwrap()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn commit(&self, _package: &str) -> Result<(), HostAdapterError> {
        let sections = self.sections.lock().unwrap();
        let rendered = render(&sections);
        fs::write(&self.path, rendered)
            .map_err(|e| unavailable(format!("writing {}: {e}", self.path.display())))
    }

    fn show(&self, package: &str) -> Result<HashMap<String, String>, HostAdapterError> {
        let prefix = format!("{package}.");
        let sections = self.sections.lock().unwrap();
        let mut out = HashMap::new();
        for (section, fields) in sections.iter() {
            let Some(name) = section.strip_prefix(&prefix) else {
                continue;
            };
            for (key, value) in fields {
                out.insert(format!("{name}.{key}"), value.clone());
            }
        }
        Ok(out)
    }
}
