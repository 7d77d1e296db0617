//! Index configuration: the `indexloader.ini` text format.
//!
//! The config is line-oriented and section-keyed:
//!
//! ```text
//! [MetaData]
//! MetaDataFilePath=metadata.bin
//! MetaDataIndexPath=metadataIndex.bin
//! MetaDataToVectorIndex=true
//!
//! [Index]
//! IndexAlgoType=BKT
//! ValueType=Float
//! DistCalcMethod=L2
//! ```
//!
//! Section and key names are matched case-insensitively. Values keep their
//! original case. Blank lines and lines starting with `;` or `#` are
//! skipped.
//!
//! # Example
//! ```rust
//! use pulseann::config::IniReader;
//!
//! let reader = IniReader::parse("[Index]\nTreeNumber=4\n").unwrap();
//! assert_eq!(reader.get_parameter("Index", "treenumber", 1usize), 4);
//! assert_eq!(reader.get_parameter("Index", "MaxCheck", 8192usize), 8192);
//! ```

use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AnnError, Result};

/// File name of the index config inside a saved index folder.
pub const INDEX_LOADER_FILE: &str = "indexloader.ini";

/// Section describing metadata files.
pub const METADATA_SECTION: &str = "MetaData";

/// Section holding index type tags and variant tunables.
pub const INDEX_SECTION: &str = "Index";

/// Section describing the in-memory blob layout.
pub const BLOB_LAYOUT_SECTION: &str = "BlobLayout";

/// Default metadata data file name.
pub const DEFAULT_METADATA_FILE: &str = "metadata.bin";

/// Default metadata offset-index file name.
pub const DEFAULT_METADATA_INDEX_FILE: &str = "metadataIndex.bin";

/// Parsed `indexloader.ini` content.
#[derive(Clone, Debug, Default)]
pub struct IniReader {
    /// Lowercased section → (lowercased key → value).
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniReader {
    /// Parses config text.
    ///
    /// # Errors
    /// Returns `FailedParseValue` for a key/value line outside any section,
    /// a line without `=`, or an unterminated section header.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| {
                    AnnError::parse(format!("Line {}: unterminated section '{}'", lineno + 1, line))
                })?;
                let name = name.trim().to_ascii_lowercase();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                AnnError::parse(format!("Line {}: expected Key=Value, got '{}'", lineno + 1, line))
            })?;
            let section = current.as_ref().ok_or_else(|| {
                AnnError::parse(format!("Line {}: parameter outside of a section", lineno + 1))
            })?;
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        Ok(Self { sections })
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    /// Returns `FailedOpenFile` if the file cannot be read.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| AnnError::open_file(path, e))?;
        Self::parse(&text)
    }

    /// Returns true if `section` appeared in the config.
    pub fn does_section_exist(&self, section: &str) -> bool {
        self.sections.contains_key(&section.to_ascii_lowercase())
    }

    /// Returns the raw value of `section.key`.
    pub fn get_raw(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_ascii_lowercase())?
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `section.key` parsed as `T`, or `default` if the key is
    /// absent or does not parse.
    pub fn get_parameter<T: FromStr>(&self, section: &str, key: &str, default: T) -> T {
        self.get_raw(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Returns `section.key` parsed as `T`.
    ///
    /// # Errors
    /// Returns `FailedParseValue` if the key is absent or does not parse.
    pub fn require<T: FromStr>(&self, section: &str, key: &str) -> Result<T> {
        let raw = self
            .get_raw(section, key)
            .ok_or_else(|| AnnError::parse(format!("Missing {}.{}", section, key)))?;
        raw.parse()
            .map_err(|_| AnnError::parse(format!("Invalid value '{}' for {}.{}", raw, section, key)))
    }

    /// Iterates the `(key, value)` pairs of `section` (keys lowercased).
    pub fn section_params(&self, section: &str) -> impl Iterator<Item = (&str, &str)> {
        self.sections
            .get(&section.to_ascii_lowercase())
            .into_iter()
            .flat_map(|params| params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Writes a `[name]` section header.
pub fn write_section(out: &mut dyn Write, name: &str) -> Result<()> {
    writeln!(out, "[{}]", name)?;
    Ok(())
}

/// Writes a `Key=Value` line.
pub fn write_param(out: &mut dyn Write, key: &str, value: impl Display) -> Result<()> {
    writeln!(out, "{}={}", key, value)?;
    Ok(())
}

/// Ends a section with a blank line.
pub fn end_section(out: &mut dyn Write) -> Result<()> {
    writeln!(out)?;
    Ok(())
}
