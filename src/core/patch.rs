//! Line-rewriting patches
//!
//! Source trees are adjusted with small, declarative transforms over the
//! lines of a file rather than with unified diffs. Each transform is a pure
//! function from one line list to another; a patch applies its transforms
//! in order to every file it targets.
//!
//! Transforms that look for a marker fail with
//! [`PatchError::PatternNotFound`] when the marker never matches, unless the
//! patch is marked `optional`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::PatchError;
use crate::infra::filesystem;

/// Line predicate used to locate the lines a transform acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Trimmed line equals the text
    Equals(String),
    /// Line, with leading whitespace removed, starts with the text
    StartsWith(String),
    /// Line contains the text anywhere
    Contains(String),
}

impl Marker {
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Marker::Equals(text) => line.trim() == text,
            Marker::StartsWith(text) => line.trim_start().starts_with(text.as_str()),
            Marker::Contains(text) => line.contains(text.as_str()),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Equals(text) => write!(f, "line equal to '{text}'"),
            Marker::StartsWith(text) => write!(f, "line starting with '{text}'"),
            Marker::Contains(text) => write!(f, "line containing '{text}'"),
        }
    }
}

/// One pure transformation of a file's lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", deny_unknown_fields)]
pub enum LineTransform {
    /// Remove every matching line
    DropLines { marker: Marker },

    /// Substring replacement on every line
    Replace { from: String, to: String },

    /// Insert lines after the first (or every) matching line
    InsertAfter {
        marker: Marker,
        lines: Vec<String>,
        #[serde(default)]
        all: bool,
    },

    /// Insert lines before the first (or every) matching line
    InsertBefore {
        marker: Marker,
        lines: Vec<String>,
        #[serde(default)]
        all: bool,
    },

    /// Append text to every matching line (trailing whitespace removed first)
    AppendToLine { marker: Marker, text: String },

    /// Keep the matching line and its opening delimiter line, replace
    /// everything up to the closing delimiter line with `body`
    ReplaceBlockBody {
        marker: Marker,
        open: String,
        close: String,
        body: Vec<String>,
    },

    /// Surround every matching line with extra lines
    WrapLine {
        marker: Marker,
        #[serde(default)]
        before: Vec<String>,
        #[serde(default)]
        after: Vec<String>,
    },

    /// Replace every matching line with `lines` (possibly none)
    ReplaceLine { marker: Marker, lines: Vec<String> },

    /// Replace the whole file
    ReplaceFile { lines: Vec<String> },
}

/// Why a transform could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformMiss {
    pub pattern: String,
}

impl LineTransform {
    /// Apply to a materialized line list
    pub fn apply(&self, lines: Vec<String>) -> Result<Vec<String>, TransformMiss> {
        match self {
            LineTransform::DropLines { marker } => {
                require_match(&lines, marker)?;
                Ok(lines.into_iter().filter(|l| !marker.matches(l)).collect())
            }
            LineTransform::Replace { from, to } => {
                if !lines.iter().any(|l| l.contains(from.as_str())) {
                    return Err(TransformMiss {
                        pattern: format!("text '{from}'"),
                    });
                }
                Ok(lines.into_iter().map(|l| l.replace(from.as_str(), to)).collect())
            }
            LineTransform::InsertAfter { marker, lines: extra, all } => {
                insert_around(lines, marker, extra, *all, false)
            }
            LineTransform::InsertBefore { marker, lines: extra, all } => {
                insert_around(lines, marker, extra, *all, true)
            }
            LineTransform::AppendToLine { marker, text } => {
                require_match(&lines, marker)?;
                Ok(lines
                    .into_iter()
                    .map(|l| {
                        if marker.matches(&l) {
                            format!("{}{text}", l.trim_end())
                        } else {
                            l
                        }
                    })
                    .collect())
            }
            LineTransform::ReplaceBlockBody {
                marker,
                open,
                close,
                body,
            } => replace_block_body(lines, marker, open, close, body),
            LineTransform::WrapLine {
                marker,
                before,
                after,
            } => {
                require_match(&lines, marker)?;
                let mut out = Vec::with_capacity(lines.len() + before.len() + after.len());
                for line in lines {
                    if marker.matches(&line) {
                        out.extend(before.iter().cloned());
                        out.push(line);
                        out.extend(after.iter().cloned());
                    } else {
                        out.push(line);
                    }
                }
                Ok(out)
            }
            LineTransform::ReplaceLine {
                marker,
                lines: replacement,
            } => {
                require_match(&lines, marker)?;
                let mut out = Vec::with_capacity(lines.len());
                for line in lines {
                    if marker.matches(&line) {
                        out.extend(replacement.iter().cloned());
                    } else {
                        out.push(line);
                    }
                }
                Ok(out)
            }
            LineTransform::ReplaceFile { lines: replacement } => Ok(replacement.clone()),
        }
    }
}

fn require_match(lines: &[String], marker: &Marker) -> Result<(), TransformMiss> {
    if lines.iter().any(|l| marker.matches(l)) {
        Ok(())
    } else {
        Err(TransformMiss {
            pattern: marker.to_string(),
        })
    }
}

fn insert_around(
    lines: Vec<String>,
    marker: &Marker,
    extra: &[String],
    all: bool,
    before: bool,
) -> Result<Vec<String>, TransformMiss> {
    require_match(&lines, marker)?;
    let mut out = Vec::with_capacity(lines.len() + extra.len());
    let mut done = false;
    for line in lines {
        let hit = !done && marker.matches(&line);
        if hit && before {
            out.extend(extra.iter().cloned());
        }
        out.push(line);
        if hit && !before {
            out.extend(extra.iter().cloned());
        }
        if hit && !all {
            done = true;
        }
    }
    Ok(out)
}

/// Consume until the marker, keep it and the opening line, skip to the
/// closing line, inject the body, resume.
fn replace_block_body(
    lines: Vec<String>,
    marker: &Marker,
    open: &str,
    close: &str,
    body: &[String],
) -> Result<Vec<String>, TransformMiss> {
    require_match(&lines, marker)?;
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        out.push(line.clone());
        i += 1;
        if !marker.matches(line) {
            continue;
        }

        if lines.get(i).map(|l| l.trim()) != Some(open) {
            return Err(TransformMiss {
                pattern: format!("'{open}' after {marker}"),
            });
        }
        out.push(lines[i].clone());
        i += 1;

        let close_at = lines[i..]
            .iter()
            .position(|l| l.trim() == close)
            .map(|offset| i + offset)
            .ok_or_else(|| TransformMiss {
                pattern: format!("'{close}' closing block after {marker}"),
            })?;

        out.extend(body.iter().cloned());
        out.push(lines[close_at].clone());
        i = close_at + 1;
    }
    Ok(out)
}

/// When in the lifecycle a patch applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchStage {
    /// After extraction, against the source tree
    #[default]
    Source,
    /// After configure, against generated build files
    Configured,
    /// After install, against files under the prefix
    Installed,
}

/// A set of transforms applied to one file or a glob of files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSpec {
    /// Path or glob, relative to the source root (or the prefix when
    /// `stage = "installed"`)
    pub file: String,

    #[serde(default)]
    pub stage: PatchStage,

    /// Missing files or markers are skipped with a warning
    #[serde(default)]
    pub optional: bool,

    pub transforms: Vec<LineTransform>,
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

impl PatchSpec {
    /// Files under `base` this patch targets, sorted
    pub fn target_files(&self, base: &Path) -> Result<Vec<PathBuf>, PatchError> {
        if !is_glob(&self.file) {
            let path = base.join(&self.file);
            return Ok(if path.is_file() { vec![path] } else { Vec::new() });
        }

        let pattern = base.join(&self.file).display().to_string();
        let entries = glob::glob(&pattern).map_err(|e| PatchError::InvalidPattern {
            pattern: self.file.clone(),
            error: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Apply every transform to every target file under `base`
    ///
    /// Returns the files that were rewritten.
    pub fn apply(&self, base: &Path) -> Result<Vec<PathBuf>, PatchError> {
        let files = self.target_files(base)?;
        if files.is_empty() {
            if self.optional {
                tracing::warn!("Skipping optional patch: no files match '{}'", self.file);
                return Ok(Vec::new());
            }
            return Err(PatchError::NoMatchingFiles {
                pattern: self.file.clone(),
            });
        }

        let mut patched = Vec::with_capacity(files.len());
        for file in files {
            if self.apply_to_file(&file)? {
                patched.push(file);
            }
        }
        Ok(patched)
    }

    fn apply_to_file(&self, path: &Path) -> Result<bool, PatchError> {
        let io_error = |e: crate::error::FilesystemError| PatchError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        };
        let source = SourceText::decode(filesystem::read_bytes(path).map_err(io_error)?);
        let mut lines: Vec<String> = source.text.lines().map(str::to_string).collect();

        for transform in &self.transforms {
            match transform.apply(lines.clone()) {
                Ok(next) => lines = next,
                Err(miss) if self.optional => {
                    tracing::warn!(
                        "Skipping optional patch of {}: {} not found",
                        path.display(),
                        miss.pattern
                    );
                    return Ok(false);
                }
                Err(miss) => {
                    return Err(PatchError::PatternNotFound {
                        file: path.display().to_string(),
                        pattern: miss.pattern,
                    })
                }
            }
        }

        let rewritten = source.encode(&lines).ok_or_else(|| PatchError::Unencodable {
            path: path.to_path_buf(),
        })?;
        filesystem::write_file(path, rewritten).map_err(io_error)?;
        tracing::debug!("Patched {}", path.display());
        Ok(true)
    }
}

/// A patched file's text plus what is needed to write it back unchanged
/// apart from the edited lines
struct SourceText {
    text: String,
    /// Not valid UTF-8; every byte was decoded as one Latin-1 character
    latin1: bool,
    /// `"\r\n"` when the file uses CRLF line endings
    eol: &'static str,
    trailing_newline: bool,
}

impl SourceText {
    fn decode(bytes: Vec<u8>) -> Self {
        let (text, latin1) = match String::from_utf8(bytes) {
            Ok(text) => (text, false),
            Err(e) => (e.into_bytes().iter().map(|&b| char::from(b)).collect(), true),
        };
        let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_newline = text.ends_with('\n');
        Self {
            text,
            latin1,
            eol,
            trailing_newline,
        }
    }

    /// Join `lines` back with the original terminator and encoding
    fn encode(&self, lines: &[String]) -> Option<Vec<u8>> {
        let mut joined = lines.join(self.eol);
        if self.trailing_newline && !joined.is_empty() {
            joined.push_str(self.eol);
        }
        if !self.latin1 {
            return Some(joined.into_bytes());
        }
        joined.chars().map(|c| u8::try_from(c).ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_drop_lines_containing_marker() {
        let t = LineTransform::DropLines {
            marker: Marker::Contains("HAVE_EPOLL".to_string()),
        };
        let out = t
            .apply(lines("#define HAVE_EPOLL 1\n#define HAVE_POLL 1\n/* HAVE_EPOLL */"))
            .unwrap();
        assert_eq!(out, vec!["#define HAVE_POLL 1"]);
    }

    #[test]
    fn test_insert_after_first_match_only() {
        let t = LineTransform::InsertAfter {
            marker: Marker::Equals("def add_multiarch_paths(self):".to_string()),
            lines: vec!["        return".to_string()],
            all: false,
        };
        let input = lines("class X:\n    def add_multiarch_paths(self):\n        pass\n    def add_multiarch_paths(self):");
        let out = t.apply(input).unwrap();
        assert_eq!(
            out,
            vec![
                "class X:",
                "    def add_multiarch_paths(self):",
                "        return",
                "        pass",
                "    def add_multiarch_paths(self):",
            ]
        );
    }

    #[test]
    fn test_insert_before_every_match() {
        let t = LineTransform::InsertBefore {
            marker: Marker::StartsWith("#include".to_string()),
            lines: vec!["#include <typeinfo>".to_string()],
            all: true,
        };
        let out = t.apply(lines("// x\n#include <a>\n#include <b>")).unwrap();
        assert_eq!(
            out,
            vec!["// x", "#include <typeinfo>", "#include <a>", "#include <typeinfo>", "#include <b>"]
        );
    }

    #[test]
    fn test_replace_block_body() {
        let t = LineTransform::ReplaceBlockBody {
            marker: Marker::StartsWith("archive_entry_dev".to_string()),
            open: "{".to_string(),
            close: "}".to_string(),
            body: vec!["    return 0;".to_string()],
        };
        let input = lines(
            "dev_t\narchive_entry_dev(struct archive_entry *entry)\n{\n    if (x)\n        return 1;\n    return 2;\n}\nint other(void)\n{\n}",
        );
        let out = t.apply(input).unwrap();
        assert_eq!(
            out,
            vec![
                "dev_t",
                "archive_entry_dev(struct archive_entry *entry)",
                "{",
                "    return 0;",
                "}",
                "int other(void)",
                "{",
                "}",
            ]
        );
    }

    #[test]
    fn test_replace_block_body_requires_open_line() {
        let t = LineTransform::ReplaceBlockBody {
            marker: Marker::StartsWith("f(".to_string()),
            open: "{".to_string(),
            close: "}".to_string(),
            body: Vec::new(),
        };
        assert!(t.apply(lines("f(void) {\n}")).is_err());
    }

    #[test]
    fn test_wrap_and_replace_line() {
        let wrap = LineTransform::WrapLine {
            marker: Marker::Equals("#define HAVE_TIMEGM 1".to_string()),
            before: vec!["#if !defined(__LSB_VERSION__)".to_string()],
            after: vec!["#endif".to_string()],
        };
        let out = wrap.apply(lines("#define HAVE_TIMEGM 1")).unwrap();
        assert_eq!(out, vec!["#if !defined(__LSB_VERSION__)", "#define HAVE_TIMEGM 1", "#endif"]);

        let replace = LineTransform::ReplaceLine {
            marker: Marker::StartsWith("pthread_cleanup_pop".to_string()),
            lines: vec!["    QThreadPrivate::finish(arg);".to_string()],
        };
        let out = replace.apply(lines("  pthread_cleanup_pop(1);\n  x();")).unwrap();
        assert_eq!(out, vec!["    QThreadPrivate::finish(arg);", "  x();"]);
    }

    #[test]
    fn test_append_to_line_and_replace() {
        let append = LineTransform::AppendToLine {
            marker: Marker::StartsWith("CFLAG=".to_string()),
            text: " -D_GNU_SOURCE".to_string(),
        };
        let replace = LineTransform::Replace {
            from: "-O3".to_string(),
            to: "-Os".to_string(),
        };

        let out = append.apply(lines("CFLAG= -O3  \nOTHER=1")).unwrap();
        let out = replace.apply(out).unwrap();
        assert_eq!(out, vec!["CFLAG= -Os -D_GNU_SOURCE", "OTHER=1"]);
    }

    #[test]
    fn test_marker_not_found_is_a_miss() {
        let t = LineTransform::DropLines {
            marker: Marker::Equals("nothing".to_string()),
        };
        let miss = t.apply(lines("a\nb")).unwrap_err();
        assert!(miss.pattern.contains("nothing"));
    }

    #[test]
    fn test_patch_spec_parses_from_toml() {
        let spec: PatchSpec = toml::from_str(
            r#"
file = "pyconfig.h"
stage = "configured"
transforms = [
    { op = "drop-lines", marker = { contains = "HAVE_EPOLL" } },
    { op = "insert-after", marker = { equals = "x" }, lines = ["y"] },
]
"#,
        )
        .unwrap();

        assert_eq!(spec.stage, PatchStage::Configured);
        assert!(!spec.optional);
        assert_eq!(spec.transforms.len(), 2);
        assert!(matches!(spec.transforms[1], LineTransform::InsertAfter { all: false, .. }));
    }

    #[test]
    fn test_apply_glob_rewrites_every_match() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        filesystem::write_file(&root.join("Makefile.in"), "CFLAGS = -DG_DISABLE_DEPRECATED -O2\n").unwrap();
        filesystem::write_file(
            &root.join("gtk/Makefile.in"),
            "INCLUDES = \\\n\t-DG_DISABLE_DEPRECATED\n\t-I.\n",
        )
        .unwrap();

        let spec = PatchSpec {
            file: "**/Makefile.in".to_string(),
            stage: PatchStage::Source,
            optional: false,
            transforms: vec![
                LineTransform::DropLines {
                    marker: Marker::Equals("-DG_DISABLE_DEPRECATED".to_string()),
                },
                LineTransform::Replace {
                    from: "-DG_DISABLE_DEPRECATED".to_string(),
                    to: String::new(),
                },
            ],
        };

        // The top-level file has no standalone flag line, so it needs
        // optional semantics for the first transform.
        let err = spec.apply(root).unwrap_err();
        assert!(matches!(err, PatchError::PatternNotFound { .. }));

        let lenient = PatchSpec {
            transforms: vec![LineTransform::Replace {
                from: "-DG_DISABLE_DEPRECATED".to_string(),
                to: String::new(),
            }],
            ..spec
        };
        let patched = lenient.apply(root).unwrap();
        assert_eq!(patched.len(), 2);
        assert_eq!(
            filesystem::read_file(&root.join("Makefile.in")).unwrap(),
            "CFLAGS =  -O2\n"
        );
    }

    #[test]
    fn test_missing_file_strict_and_optional() {
        let temp = TempDir::new().unwrap();
        let mut spec = PatchSpec {
            file: "setup.py".to_string(),
            stage: PatchStage::Source,
            optional: false,
            transforms: vec![LineTransform::ReplaceFile { lines: vec![] }],
        };

        assert!(matches!(
            spec.apply(temp.path()),
            Err(PatchError::NoMatchingFiles { .. })
        ));

        spec.optional = true;
        assert!(spec.apply(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_optional_patch_leaves_file_untouched_on_miss() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.c");
        filesystem::write_file(&path, "int x;\n").unwrap();

        let spec = PatchSpec {
            file: "a.c".to_string(),
            stage: PatchStage::Source,
            optional: true,
            transforms: vec![LineTransform::DropLines {
                marker: Marker::Contains("absent".to_string()),
            }],
        };

        assert!(spec.apply(temp.path()).unwrap().is_empty());
        assert_eq!(filesystem::read_file(&path).unwrap(), "int x;\n");
    }

    #[test]
    fn test_crlf_line_endings_survive_patching() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("win32.mak");
        filesystem::write_file(&path, "CFLAGS = -O2\r\nLIBS = -lz\r\n").unwrap();

        let spec = PatchSpec {
            file: "win32.mak".to_string(),
            stage: PatchStage::Source,
            optional: false,
            transforms: vec![LineTransform::AppendToLine {
                marker: Marker::StartsWith("CFLAGS".to_string()),
                text: " -fPIC".to_string(),
            }],
        };

        spec.apply(temp.path()).unwrap();
        assert_eq!(
            filesystem::read_file(&path).unwrap(),
            "CFLAGS = -O2 -fPIC\r\nLIBS = -lz\r\n"
        );
    }

    #[test]
    fn test_latin1_source_keeps_its_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("author.c");
        // "/* Fran\xe7ois */" in ISO-8859-1, not valid UTF-8
        std::fs::write(&path, b"/* Fran\xe7ois */\nint x;\n").unwrap();

        let spec = PatchSpec {
            file: "author.c".to_string(),
            stage: PatchStage::Source,
            optional: false,
            transforms: vec![LineTransform::Replace {
                from: "int x;".to_string(),
                to: "long x;".to_string(),
            }],
        };

        spec.apply(temp.path()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"/* Fran\xe7ois */\nlong x;\n");
    }

    #[test]
    fn test_latin1_source_rejects_wide_characters() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.c"), b"/* \xe9 */\n").unwrap();

        let spec = PatchSpec {
            file: "a.c".to_string(),
            stage: PatchStage::Source,
            optional: false,
            transforms: vec![LineTransform::Replace {
                from: "/*".to_string(),
                to: "/* \u{2713}".to_string(),
            }],
        };

        assert!(matches!(
            spec.apply(temp.path()),
            Err(PatchError::Unencodable { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Dropping a marker removes exactly the matching lines and keeps
        /// the others in order.
        #[test]
        fn prop_drop_lines_keeps_order(
            input in proptest::collection::vec("[a-c]{0,4}", 1..20),
        ) {
            let marker = Marker::Contains("a".to_string());
            let expected: Vec<String> = input.iter().filter(|l| !l.contains('a')).cloned().collect();
            let t = LineTransform::DropLines { marker };

            match t.apply(input.clone()) {
                Ok(out) => prop_assert_eq!(out, expected),
                Err(_) => prop_assert!(input.iter().all(|l| !l.contains('a'))),
            }
        }

        /// Inserting after the first match grows the file by exactly the
        /// inserted lines.
        #[test]
        fn prop_insert_after_grows_by_extra(
            input in proptest::collection::vec("[xy]{1,3}", 1..20),
            extra in proptest::collection::vec("[a-z]{1,5}", 0..4),
        ) {
            let t = LineTransform::InsertAfter {
                marker: Marker::Contains("x".to_string()),
                lines: extra.clone(),
                all: false,
            };
            if let Ok(out) = t.apply(input.clone()) {
                prop_assert_eq!(out.len(), input.len() + extra.len());
            }
        }
    }
}
