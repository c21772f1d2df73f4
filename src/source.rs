//! Loading entry collections from raw bytes.
//!
//! Each source is decoded by trying a list of text encodings in order; the
//! first one that decodes the bytes without error wins. The decoded text is
//! handed to an [`EntryParser`]. A source that no encoding can decode, or that
//! the parser rejects, aborts the whole load with
//! [`MergeError::SourceRead`].
//!
//! # Example
//!
//! ```
//! use bibmerge::source::{Source, SourceLoader};
//! use bibmerge::{Entry, Result};
//!
//! let parser = |text: &str| -> Result<Vec<Entry>> {
//!     Ok(vec![Entry::new("misc", "k").with_field("title", text)])
//! };
//!
//! // "Café" in windows-1252, which is not valid UTF-8
//! let source = Source::new("legacy.bib", vec![0x43, 0x61, 0x66, 0xE9]);
//! let entries = SourceLoader::new().load(&parser, &source).unwrap();
//! assert_eq!(entries[0].field("title"), Some("Café"));
//! ```

use crate::{Entry, EntryParser, MergeError, Result};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A named blob of undecoded bibliography data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Identifier reported on failure, typically a file path
    pub id: String,
    /// Raw, undecoded contents
    pub bytes: Vec<u8>,
}

impl Source {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
        }
    }

    /// Reads a source from a file.
    ///
    /// # Errors
    ///
    /// Returns `MergeError::SourceRead` naming the path if the file cannot be read
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let id = path.display().to_string();
        match std::fs::read(path) {
            Ok(bytes) => Ok(Self { id, bytes }),
            Err(err) => Err(MergeError::SourceRead {
                source_id: id,
                reason: err.to_string(),
            }),
        }
    }
}

/// Decodes and parses sources.
///
/// # Examples
///
/// ```
/// use bibmerge::source::SourceLoader;
///
/// let loader = SourceLoader::new()
///     .with_encodings(vec![encoding_rs::UTF_8, encoding_rs::GBK])
///     .with_parallel(false);
/// ```
#[derive(Debug, Clone)]
pub struct SourceLoader {
    encodings: Vec<&'static Encoding>,
    run_in_parallel: bool,
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self {
            encodings: vec![UTF_8, WINDOWS_1252],
            run_in_parallel: false,
        }
    }
}

impl SourceLoader {
    /// Creates a loader trying UTF-8, then windows-1252, one source at a time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ordered list of encodings to attempt.
    #[must_use]
    pub fn with_encodings(mut self, encodings: Vec<&'static Encoding>) -> Self {
        self.encodings = encodings;
        self
    }

    /// Decodes and parses sources on the rayon pool.
    ///
    /// Only takes effect with the `parallel` feature. Entries are still
    /// returned in source order.
    #[must_use]
    pub fn with_parallel(mut self, run_in_parallel: bool) -> Self {
        self.run_in_parallel = run_in_parallel;
        self
    }

    pub fn encodings(&self) -> &[&'static Encoding] {
        &self.encodings
    }

    /// Decodes `source` with the first encoding that accepts it.
    ///
    /// # Errors
    ///
    /// Returns `MergeError::SourceRead` if every encoding fails
    pub fn decode<'a>(&self, source: &'a Source) -> Result<Cow<'a, str>> {
        for (attempt, encoding) in self.encodings.iter().enumerate() {
            let bytes = if *encoding == UTF_8 {
                source.bytes.strip_prefix(UTF8_BOM).unwrap_or(&source.bytes)
            } else {
                source.bytes.as_slice()
            };

            match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
                Some(text) => {
                    if attempt > 0 {
                        warn!("Decoded {} as {} after fallback", source.id, encoding.name());
                    }
                    return Ok(text);
                }
                None => debug!("{} is not valid {}", source.id, encoding.name()),
            }
        }

        let tried = self
            .encodings
            .iter()
            .map(|encoding| encoding.name())
            .collect::<Vec<_>>()
            .join(", ");
        Err(MergeError::SourceRead {
            source_id: source.id.clone(),
            reason: format!("could not decode as any of [{tried}]"),
        })
    }

    /// Decodes and parses a single source.
    ///
    /// # Errors
    ///
    /// Returns `MergeError::SourceRead` if decoding or parsing fails
    pub fn load<P>(&self, parser: &P, source: &Source) -> Result<Vec<Entry>>
    where
        P: EntryParser + ?Sized,
    {
        let text = self.decode(source)?;
        let entries = parser.parse(&text).map_err(|err| MergeError::SourceRead {
            source_id: source.id.clone(),
            reason: err.to_string(),
        })?;

        debug!("Loaded {} entries from {}", entries.len(), source.id);
        Ok(entries)
    }

    /// Loads every source and concatenates the entries in source order.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing source, in source order
    pub fn load_all<P>(&self, parser: &P, sources: &[Source]) -> Result<Vec<Entry>>
    where
        P: EntryParser + Sync + ?Sized,
    {
        let collections = if self.run_in_parallel {
            self.load_parallel(parser, sources)
        } else {
            sources
                .iter()
                .map(|source| self.load(parser, source))
                .collect::<Vec<_>>()
        };

        let mut entries = Vec::new();
        for collection in collections {
            entries.extend(collection?);
        }
        Ok(entries)
    }

    #[cfg(feature = "parallel")]
    fn load_parallel<P>(&self, parser: &P, sources: &[Source]) -> Vec<Result<Vec<Entry>>>
    where
        P: EntryParser + Sync + ?Sized,
    {
        use rayon::prelude::*;

        sources
            .par_iter()
            .map(|source| self.load(parser, source))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn load_parallel<P>(&self, parser: &P, sources: &[Source]) -> Vec<Result<Vec<Entry>>>
    where
        P: EntryParser + Sync + ?Sized,
    {
        sources
            .iter()
            .map(|source| self.load(parser, source))
            .collect()
    }
}
