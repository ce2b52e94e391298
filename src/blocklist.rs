//! Known-bad companies: exact names plus wildcard patterns, persisted as
//! `{"blocklist": [...], "patterns": [...]}`.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct Blocklist {
    path: Option<PathBuf>,
    companies: Vec<String>,
    patterns: Vec<String>,
    compiled: Vec<(String, Regex)>,
    /// Keys other than the two we own, written back untouched.
    extra: Map<String, Value>,
}

/// `*` becomes `.*`; anything else is taken as a regex. Matching is
/// case-insensitive and unanchored, so a pattern may hit anywhere in the name.
fn compile_pattern(raw: &str) -> Option<Regex> {
    let source = raw.trim().replace('*', ".*");
    match RegexBuilder::new(&source).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern = raw, error = %err, "skipping malformed blocklist pattern");
            None
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Blocklist {
    /// An unsaved list, for tests and one-off checks.
    pub fn from_parts(companies: Vec<String>, patterns: Vec<String>) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|p| compile_pattern(p).map(|re| (p.clone(), re)))
            .collect();
        Self {
            path: None,
            companies,
            patterns,
            compiled,
            extra: Map::new(),
        }
    }

    /// Load from `path`. A missing file is an empty list that will be created
    /// on the first addition.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no blocklist file; starting empty");
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read blocklist: {}", path.display()))?;
        let mut doc: Map<String, Value> = if raw.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid blocklist JSON: {}", path.display()))?
        };

        let companies = string_list(doc.get("blocklist"));
        let patterns = string_list(doc.get("patterns"));
        doc.remove("blocklist");
        doc.remove("patterns");

        let mut list = Self::from_parts(companies, patterns);
        list.path = Some(path.to_path_buf());
        list.extra = doc;
        Ok(list)
    }

    pub fn companies(&self) -> &[String] {
        &self.companies
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_blocked(&self, company: &str) -> bool {
        self.matches(company).is_some()
    }

    /// What blocked `company`: the exact entry or the pattern source.
    pub fn matches(&self, company: &str) -> Option<String> {
        let name = company.trim();
        if name.is_empty() {
            return None;
        }
        let lowered = name.to_lowercase();
        if let Some(hit) = self.companies.iter().find(|c| c.to_lowercase() == lowered) {
            return Some(hit.clone());
        }
        self.compiled
            .iter()
            .find(|(_, re)| re.is_match(name))
            .map(|(source, _)| source.clone())
    }

    /// Add an exact company name and persist. Returns false if it was
    /// already listed.
    pub fn add(&mut self, company: &str) -> Result<bool> {
        let name = company.trim();
        if name.is_empty() || self.companies.iter().any(|c| c.to_lowercase() == name.to_lowercase()) {
            return Ok(false);
        }
        self.companies.push(name.to_string());
        self.companies.sort_by_key(|c| c.to_lowercase());
        self.save()?;
        info!(company = name, "added to blocklist");
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut doc = self.extra.clone();
        doc.insert("blocklist".to_string(), Value::from(self.companies.clone()));
        doc.insert("patterns".to_string(), Value::from(self.patterns.clone()));

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let body = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, body + "\n")
            .with_context(|| format!("Failed to write blocklist: {}", path.display()))
    }
}
