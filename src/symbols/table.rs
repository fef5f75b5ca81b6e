//! Queryable symbol table with per-file invalidation.
//!
//! The external extractor cannot re-parse a single file, so invalidation is
//! tracked as a dirty set and any query that asks for freshness while the
//! set is non-empty re-runs the extractor over the whole repository.
//! Correctness beats minimality here.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::doxygen::{SymbolExtractor, XML_SUBDIR};
use super::model::Symbol;
use super::xml::parse_symbol_dir;

pub struct SymbolTable {
    repo_path: PathBuf,
    extractor: Box<dyn SymbolExtractor>,
    symbols: HashMap<String, Symbol>,
    file_index: HashMap<PathBuf, BTreeSet<String>>,
    dirty_files: HashSet<PathBuf>,
}

impl SymbolTable {
    pub fn new(repo_path: &Path, extractor: Box<dyn SymbolExtractor>) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            extractor,
            symbols: HashMap::new(),
            file_index: HashMap::new(),
            dirty_files: HashSet::new(),
        }
    }

    pub fn xml_dir(&self) -> PathBuf {
        self.repo_path.join(XML_SUBDIR)
    }

    fn has_xml_data(&self) -> bool {
        self.xml_dir().join("index.xml").exists()
    }

    /// Full load: generate XML if absent, then parse everything and build
    /// the forward and reverse maps.
    pub fn load(&mut self) -> Result<()> {
        if !self.has_xml_data() {
            tracing::info!("symbol data missing, running extractor");
            self.extractor
                .generate(&self.repo_path)
                .context("symbol extraction failed")?;
        }
        let parsed = parse_symbol_dir(&self.xml_dir())?;
        self.symbols = parsed
            .into_iter()
            .map(|s| (s.qualified_name.clone(), s))
            .collect();
        self.rebuild_file_index();
        self.dirty_files.clear();
        tracing::info!(count = self.symbols.len(), "loaded symbols");
        Ok(())
    }

    fn rebuild_file_index(&mut self) {
        self.file_index.clear();
        for (qualified_name, symbol) in &self.symbols {
            self.file_index
                .entry(symbol.file_path.clone())
                .or_default()
                .insert(qualified_name.clone());
        }
    }

    /// Mark a file's symbols as stale after a mutation.
    pub fn invalidate_file(&mut self, path: &Path) {
        self.dirty_files.insert(path.to_path_buf());
    }

    pub fn has_dirty_files(&self) -> bool {
        !self.dirty_files.is_empty()
    }

    /// Re-run the extractor when anything is dirty. After this returns, no
    /// stale symbol survives for any previously dirty file.
    pub fn refresh_dirty_files(&mut self) -> Result<()> {
        if self.dirty_files.is_empty() {
            return Ok(());
        }
        tracing::debug!(files = self.dirty_files.len(), "refreshing dirty symbol data");
        self.extractor
            .generate(&self.repo_path)
            .context("symbol refresh failed")?;
        self.load()
    }

    pub fn get_symbol(&mut self, qualified_name: &str, auto_refresh: bool) -> Result<Option<Symbol>> {
        if auto_refresh {
            self.refresh_dirty_files()?;
        }
        Ok(self.symbols.get(qualified_name).cloned())
    }

    pub fn get_symbols_in_file(&mut self, path: &Path, auto_refresh: bool) -> Result<Vec<Symbol>> {
        if auto_refresh {
            self.refresh_dirty_files()?;
        }
        if let Some(names) = self.file_index.get(path) {
            return Ok(names
                .iter()
                .filter_map(|n| self.symbols.get(n).cloned())
                .collect());
        }
        // The extractor may record paths absolute; fall back to matching on
        // the file name, as queries often pass repo-relative paths.
        let wanted = path.file_name();
        for (recorded, names) in &self.file_index {
            if recorded.file_name() == wanted {
                return Ok(names
                    .iter()
                    .filter_map(|n| self.symbols.get(n).cloned())
                    .collect());
            }
        }
        Ok(Vec::new())
    }

    /// Functions that call `qualified_name`, resolved through the
    /// extractor's cross-reference ids.
    pub fn get_callers(&mut self, qualified_name: &str, auto_refresh: bool) -> Result<Vec<Symbol>> {
        if auto_refresh {
            self.refresh_dirty_files()?;
        }
        let ids = match self.symbols.get(qualified_name) {
            Some(symbol) => symbol.called_by.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(self.resolve_extractor_ids(&ids))
    }

    /// Functions called by `qualified_name`.
    pub fn get_callees(&mut self, qualified_name: &str, auto_refresh: bool) -> Result<Vec<Symbol>> {
        if auto_refresh {
            self.refresh_dirty_files()?;
        }
        let ids = match self.symbols.get(qualified_name) {
            Some(symbol) => symbol.calls.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(self.resolve_extractor_ids(&ids))
    }

    fn resolve_extractor_ids(
        &self,
        ids: &std::collections::BTreeSet<String>,
    ) -> Vec<Symbol> {
        let mut resolved: Vec<Symbol> = self
            .symbols
            .values()
            .filter(|s| !s.extractor_id.is_empty() && ids.contains(&s.extractor_id))
            .cloned()
            .collect();
        resolved.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        resolved
    }

    pub fn get_all_symbols(&mut self, auto_refresh: bool) -> Result<Vec<Symbol>> {
        if auto_refresh {
            self.refresh_dirty_files()?;
        }
        let mut all: Vec<Symbol> = self.symbols.values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.file_path, a.line_start, &a.qualified_name)
                .cmp(&(&b.file_path, b.line_start, &b.qualified_name))
        });
        Ok(all)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_XML: &str = r#"<?xml version='1.0'?>
<doxygen>
  <compounddef id="math_8h" kind="file">
    <compoundname>math.h</compoundname>
    <sectiondef kind="func">
      <memberdef kind="function" id="math_8h_twice" inline="yes">
        <type>int</type>
        <definition>int twice</definition>
        <argsstring>(int v)</argsstring>
        <name>twice</name>
        <location file="src/math.h" line="2" bodystart="2" bodyend="2"/>
        <referencedby refid="math_8h_thrice">thrice</referencedby>
      </memberdef>
      <memberdef kind="function" id="math_8h_thrice">
        <type>int</type>
        <definition>int thrice</definition>
        <argsstring>(int v)</argsstring>
        <name>thrice</name>
        <location file="src/math.h" line="4" bodystart="4" bodyend="4"/>
        <references refid="math_8h_twice">twice</references>
      </memberdef>
    </sectiondef>
    <location file="src/math.h"/>
  </compounddef>
</doxygen>"#;

    const INDEX_XML: &str = r#"<?xml version='1.0'?>
<doxygenindex>
  <compound refid="math_8h" kind="file"><name>math.h</name></compound>
</doxygenindex>"#;

    /// Fake extractor: each generate() writes the next queued XML snapshot.
    struct FakeExtractor {
        snapshots: std::sync::Mutex<Vec<String>>,
    }

    impl FakeExtractor {
        fn new(snapshots: Vec<String>) -> Box<Self> {
            Box::new(Self {
                snapshots: std::sync::Mutex::new(snapshots),
            })
        }
    }

    impl SymbolExtractor for FakeExtractor {
        fn is_available(&self) -> bool {
            true
        }

        fn generate(&self, repo_path: &Path) -> anyhow::Result<PathBuf> {
            let xml_dir = repo_path.join(XML_SUBDIR);
            std::fs::create_dir_all(&xml_dir)?;
            let mut snapshots = self.snapshots.lock().unwrap();
            let contents = if snapshots.len() > 1 {
                snapshots.remove(0)
            } else {
                snapshots[0].clone()
            };
            std::fs::write(xml_dir.join("index.xml"), INDEX_XML)?;
            std::fs::write(xml_dir.join("math_8h.xml"), contents)?;
            Ok(xml_dir)
        }
    }

    fn seeded_table() -> (tempfile::TempDir, SymbolTable) {
        let dir = tempfile::tempdir().unwrap();
        let xml_dir = dir.path().join(XML_SUBDIR);
        std::fs::create_dir_all(&xml_dir).unwrap();
        std::fs::write(xml_dir.join("index.xml"), INDEX_XML).unwrap();
        std::fs::write(xml_dir.join("math_8h.xml"), FILE_XML).unwrap();
        let table = SymbolTable::new(dir.path(), FakeExtractor::new(vec![FILE_XML.to_string()]));
        (dir, table)
    }

    #[test]
    fn load_builds_forward_and_reverse_maps() {
        let (_dir, mut table) = seeded_table();
        table.load().unwrap();
        assert_eq!(table.len(), 2);

        let twice = table.get_symbol("twice", false).unwrap().unwrap();
        assert!(twice.has_qualifier("inline"));

        let in_file = table
            .get_symbols_in_file(Path::new("src/math.h"), false)
            .unwrap();
        assert_eq!(in_file.len(), 2);

        // Reverse index covers every forward entry.
        for symbol in table.get_all_symbols(false).unwrap() {
            let in_file = table
                .get_symbols_in_file(&symbol.file_path.clone(), false)
                .unwrap();
            assert!(in_file.iter().any(|s| s.qualified_name == symbol.qualified_name));
        }
    }

    #[test]
    fn call_graph_queries_resolve_extractor_ids() {
        let (_dir, mut table) = seeded_table();
        table.load().unwrap();

        let callers = table.get_callers("twice", false).unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].qualified_name, "thrice");

        let callees = table.get_callees("thrice", false).unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].qualified_name, "twice");

        assert!(table.get_callers("thrice", false).unwrap().is_empty());
        assert!(table.get_callers("unknown", false).unwrap().is_empty());
    }

    #[test]
    fn file_name_fallback_matches_relative_queries() {
        let (_dir, mut table) = seeded_table();
        table.load().unwrap();
        let by_name = table
            .get_symbols_in_file(Path::new("math.h"), false)
            .unwrap();
        assert_eq!(by_name.len(), 2);
    }

    #[test]
    fn refresh_after_invalidation_observes_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        // Second snapshot simulates the extractor re-running over modified
        // source: `twice` is no longer inline.
        let updated = FILE_XML.replace(r#"inline="yes""#, r#"inline="no""#);
        let mut table = SymbolTable::new(
            dir.path(),
            FakeExtractor::new(vec![FILE_XML.to_string(), updated]),
        );
        table.load().unwrap();

        table.invalidate_file(Path::new("src/math.h"));
        assert!(table.has_dirty_files());

        // Stale view is visible only when freshness is not requested.
        let stale = table.get_symbol("twice", false).unwrap().unwrap();
        assert!(stale.has_qualifier("inline"));

        // An auto_refresh query re-runs the extractor and drops stale data.
        let fresh = table.get_symbol("twice", true).unwrap().unwrap();
        assert!(!fresh.has_qualifier("inline"));
        assert!(!table.has_dirty_files());
    }
}
