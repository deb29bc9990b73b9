// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves bundled `(line, column)` locations back to original source locations.
//!
//! One [`SourceMapService`] is constructed per suite, from the `sourceMap` a transpile call
//! returns alongside a bundle's `code` (§1 treats the transpiler as an external collaborator
//! that hands back `{code, sourceMap}`; this module is what the host does with the second
//! half of that pair).

use crate::errors::SourceMapError;
use camino::Utf8PathBuf;
use sourcemap::{SourceMap, SourceMapBuilder};

/// A resolved original-source location, as returned by [`SourceMapService::resolve_original`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalLocation {
    pub source: Utf8PathBuf,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// A source-map service scoped to one suite's bundle.
///
/// `file` is the canonical URI used as that suite's test identity in error payloads and
/// reporter output; it is set once at construction and never changes even after [`concat`](
/// Self::concat) stitches another map's mappings in underneath.
#[derive(Debug)]
pub struct SourceMapService {
    map: SourceMap,
    file: Utf8PathBuf,
    extent_lines: u32,
}

impl SourceMapService {
    /// Parses `raw` (the JSON body of a source map) and associates it with `file`.
    pub fn new(raw: &[u8], file: impl Into<Utf8PathBuf>) -> Result<Self, sourcemap::Error> {
        let map = SourceMap::from_slice(raw)?;
        let extent_lines = map.tokens().map(|t| t.get_dst_line() + 1).max().unwrap_or(0);
        Ok(Self {
            map,
            file: file.into(),
            extent_lines,
        })
    }

    /// The canonical URI identifying this suite's bundled source.
    pub fn file(&self) -> &Utf8PathBuf {
        &self.file
    }

    /// Resolves a bundled `(line, column)` location (0-indexed, as emitted by a stack trace
    /// parser) to its original source location.
    pub fn resolve_original(
        &self,
        line: u32,
        column: u32,
    ) -> Result<OriginalLocation, SourceMapError> {
        if self.map.tokens().next().is_none() {
            return Err(SourceMapError::empty_mappings());
        }
        let token = self
            .map
            .lookup_token(line, column)
            .ok_or_else(|| SourceMapError::out_of_range(line, column))?;
        let source = token
            .get_source()
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| self.file.clone());
        Ok(OriginalLocation {
            source,
            line: token.get_src_line(),
            column: token.get_src_col(),
            name: token.get_name().map(str::to_owned),
        })
    }

    /// Appends `other`'s mappings after this map's own extent, shifting `other`'s destination
    /// lines down by the number of lines this map currently covers.
    ///
    /// Used to stitch a shared runtime preamble's source map underneath a per-suite bundle: the
    /// preamble is prepended to the bundle's code, so its mapped lines must be shifted down by
    /// the preamble's own line count before the two maps can be queried as one.
    pub fn concat(&mut self, other: &SourceMapService) {
        let mut builder = SourceMapBuilder::new(Some(self.file.as_str()));
        for token in self.map.tokens() {
            builder.add(
                token.get_dst_line(),
                token.get_dst_col(),
                token.get_src_line(),
                token.get_src_col(),
                token.get_source(),
                token.get_name(),
            );
        }
        for token in other.map.tokens() {
            builder.add(
                token.get_dst_line() + self.extent_lines,
                token.get_dst_col(),
                token.get_src_line(),
                token.get_src_col(),
                token.get_source(),
                token.get_name(),
            );
        }
        self.map = builder.into_sourcemap();
        self.extent_lines += other.extent_lines;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> Vec<u8> {
        br#"{
            "version": 3,
            "sources": ["original.ts"],
            "names": ["doThing"],
            "mappings": "AAAAA"
        }"#
        .to_vec()
    }

    #[test]
    fn resolves_known_location() {
        let service = SourceMapService::new(&sample_map(), "bundle.js").unwrap();
        let resolved = service.resolve_original(0, 0).unwrap();
        assert_eq!(resolved.source, Utf8PathBuf::from("original.ts"));
        assert_eq!(resolved.line, 0);
        assert_eq!(resolved.name.as_deref(), Some("doThing"));
    }

    #[test]
    fn rejects_out_of_range_location() {
        let service = SourceMapService::new(&sample_map(), "bundle.js").unwrap();
        let err = service.resolve_original(9_999, 0).unwrap_err();
        assert!(err.to_string().contains("no mapping"));
    }

    #[test]
    fn rejects_empty_mappings() {
        let empty = br#"{"version":3,"sources":[],"names":[],"mappings":""}"#;
        let service = SourceMapService::new(empty, "bundle.js").unwrap();
        let err = service.resolve_original(0, 0).unwrap_err();
        assert!(err.to_string().contains("no mappings"));
    }
}
