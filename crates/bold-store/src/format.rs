//! RDF media types and content negotiation.

use std::path::Path;

use crate::error::FormatError;

/// A serialization the protocol can produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdfFormat {
    /// `text/turtle`. Read in full, written as N-Triples.
    Turtle,
    /// `application/n-triples`.
    NTriples,
    /// `application/n-quads`.
    NQuads,
    /// `application/json` value representation (write only).
    Json,
    /// `text/html` value representation (write only).
    Html,
    /// `text/xml` value representation (write only).
    Xml,
}

impl RdfFormat {
    /// Every format, in negotiation preference order.
    pub const ALL: [Self; 6] = [
        Self::Turtle,
        Self::NTriples,
        Self::NQuads,
        Self::Json,
        Self::Html,
        Self::Xml,
    ];

    /// Format used when the client expresses no preference.
    pub const DEFAULT: Self = Self::Turtle;

    /// Canonical media type.
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Turtle => "text/turtle",
            Self::NTriples => "application/n-triples",
            Self::NQuads => "application/n-quads",
            Self::Json => "application/json",
            Self::Html => "text/html",
            Self::Xml => "text/xml",
        }
    }

    /// Whether request bodies in this format can be parsed.
    pub const fn is_readable(self) -> bool {
        matches!(self, Self::Turtle | Self::NTriples | Self::NQuads)
    }

    /// Whether this is one of the `rdf:value` representation formats.
    pub const fn is_value_format(self) -> bool {
        !self.is_readable()
    }

    /// Look up a format by media type. Parameters (`; charset=...`) and
    /// case are ignored.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        Self::ALL
            .into_iter()
            .find(|format| format.media_type().eq_ignore_ascii_case(essence))
    }

    /// Pick a file format from its extension: `.nt` gives N-Triples,
    /// `.ttl` Turtle, anything else N-Quads.
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("nt") => Self::NTriples,
            Some(ext) if ext.eq_ignore_ascii_case("ttl") => Self::Turtle,
            _ => Self::NQuads,
        }
    }

    /// Choose the response format from an `Accept` header.
    ///
    /// A missing or empty header, or `*/*`, selects [`RdfFormat::DEFAULT`].
    /// Otherwise entries are scanned left to right and the first supported
    /// one wins. Quality values are not weighed.
    pub fn negotiate(accept: Option<&str>) -> Result<Self, FormatError> {
        let Some(header) = accept.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(Self::DEFAULT);
        };
        for entry in header.split(',') {
            let essence = entry.split(';').next().unwrap_or_default().trim();
            if essence == "*/*" {
                return Ok(Self::DEFAULT);
            }
            if let Some(format) = Self::from_media_type(essence) {
                return Ok(format);
            }
        }
        Err(FormatError::NotAcceptable(header.to_owned()))
    }

    /// Choose the request body format from a `Content-Type` header. A
    /// missing header means the default format.
    pub fn for_content_type(content_type: Option<&str>) -> Result<Self, FormatError> {
        let Some(header) = content_type.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(Self::DEFAULT);
        };
        match Self::from_media_type(header) {
            Some(format) if format.is_readable() => Ok(format),
            _ => Err(FormatError::UnsupportedMediaType(header.to_owned())),
        }
    }
}

impl std::fmt::Display for RdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.media_type())
    }
}
