//! Assembly text comparison.
//!
//! Functions are extracted as `NAME PROC` .. `NAME ENDP` blocks and paired
//! by symbol, so reordering whole functions in the file is accepted. Each
//! body is normalized so symbol spellings, label numbering, data-section
//! names and padding do not matter, then compared line-for-line. Anything
//! else, including a different register allocation, is a mismatch.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static PROC_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+PROC\b").unwrap());
static ENDP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+ENDP\b").unwrap());
static COMDAT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*COMDAT(?:\s+(\S+))?").unwrap());

// MSVC mangled identifiers (?name@@...@Z and friends).
static MANGLED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?[\w@$?]+@Z").unwrap());
// Local labels ($LN3@func, $LL7@loop) and bare numeric labels.
static LOCAL_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$L[NL]\d+@\w+").unwrap());
static NUMERIC_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.?L?\d+:").unwrap());
// String/static data labels and literal pools.
static DATA_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$SG\d+(@\w+)?|__(real|mask|xmm)@[0-9A-Fa-f]+").unwrap());
// RIP-relative references to data resolve to addresses that move with
// unrelated edits.
static RIP_RELATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[rip \+ [^\]]+\]").unwrap());
// Alignment / padding / assembler housekeeping.
static IGNORED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ALIGN\b|ORG\b|INCLUDELIB\b|npad\b|nop\b\s*$)").unwrap()
});

#[derive(Debug)]
struct AsmFunction {
    body: Vec<String>,
    comdat: bool,
}

/// Extract top-level `PROC`..`ENDP` blocks keyed by symbol. Body lines keep
/// their text with leading whitespace stripped; the delimiters themselves
/// are excluded. Labels inside a function are body lines, not functions.
fn extract_functions(asm: &str) -> BTreeMap<String, AsmFunction> {
    let mut functions = BTreeMap::new();
    let mut comdat_names: Vec<String> = Vec::new();

    let mut current: Option<(String, Vec<String>, bool)> = None;
    for raw in asm.lines() {
        if current.is_none() {
            if let Some(caps) = COMDAT_MARKER.captures(raw) {
                if let Some(name) = caps.get(1) {
                    comdat_names.push(name.as_str().to_string());
                }
            }
        }

        if let Some((name, body, comdat)) = current.as_mut() {
            if let Some(caps) = ENDP_LINE.captures(raw) {
                if caps[1] == *name {
                    functions.insert(
                        name.clone(),
                        AsmFunction {
                            body: std::mem::take(body),
                            comdat: *comdat,
                        },
                    );
                    current = None;
                    continue;
                }
            }
            body.push(raw.trim_start().to_string());
            continue;
        }

        if let Some(caps) = PROC_LINE.captures(raw) {
            let name = caps[1].to_string();
            let comdat = raw.contains("COMDAT") || comdat_names.iter().any(|c| *c == name);
            current = Some((name, Vec::new(), comdat));
        }
    }

    functions
}

/// Normalize one body for comparison. `symbols` is the file's symbol table:
/// every function name extracted from that file.
fn normalize_body(body: &[String], symbols: &[String]) -> Vec<String> {
    let mut normalized = Vec::with_capacity(body.len());
    for raw in body {
        // Trailing comments first so commented-out instructions vanish.
        let line = match raw.find(';') {
            Some(idx) => &raw[..idx],
            None => raw.as_str(),
        };
        let line = line.trim();
        if line.is_empty() || IGNORED_LINE.is_match(line) {
            continue;
        }

        let mut line = line.to_string();
        for symbol in symbols {
            if line.contains(symbol.as_str()) {
                line = line.replace(symbol.as_str(), "SYMBOL");
            }
        }
        line = MANGLED_NAME.replace_all(&line, "SYMBOL").into_owned();
        line = LOCAL_LABEL.replace_all(&line, "LABEL").into_owned();
        line = NUMERIC_LABEL.replace_all(&line, "LABEL:").into_owned();
        line = DATA_LABEL.replace_all(&line, "DATA").into_owned();
        line = RIP_RELATIVE.replace_all(&line, "[DATA]").into_owned();

        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            normalized.push(collapsed);
        }
    }
    normalized
}

/// Compare two assembly listings for functional equivalence.
///
/// Every function present in both listings must have an identical
/// normalized body. A function present on only one side is tolerated only
/// when it is COMDAT (the linker may discard duplicates); anything else is
/// a mismatch.
pub fn compare_asm(original: &str, modified: &str) -> bool {
    let original_fns = extract_functions(original);
    let modified_fns = extract_functions(modified);

    // Longest names first so one symbol never clobbers part of another.
    let mut original_symbols: Vec<String> = original_fns.keys().cloned().collect();
    original_symbols.sort_by_key(|s| std::cmp::Reverse(s.len()));
    let mut modified_symbols: Vec<String> = modified_fns.keys().cloned().collect();
    modified_symbols.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut names: Vec<&String> = original_fns.keys().collect();
    for name in modified_fns.keys() {
        if !original_fns.contains_key(name) {
            names.push(name);
        }
    }

    for name in names {
        match (original_fns.get(name), modified_fns.get(name)) {
            (Some(a), Some(b)) => {
                let na = normalize_body(&a.body, &original_symbols);
                let nb = normalize_body(&b.body, &modified_symbols);
                if na != nb {
                    tracing::debug!(function = %name, "assembly body mismatch");
                    return false;
                }
            }
            (Some(only), None) | (None, Some(only)) => {
                if !only.comdat {
                    tracing::debug!(function = %name, "function present on one side only");
                    return false;
                }
            }
            (None, None) => unreachable!("name came from one of the maps"),
        }
    }

    true
}
