//! RDF codec: line-based N-Quads / N-Triples, Turtle input and the
//! `rdf:value` writer.
//!
//! N-Triples and N-Quads are read one statement per line; blank lines and
//! `#` comments are skipped. Turtle documents go through [`turtle`].
//! Turtle output is written as N-Triples, which every Turtle reader
//! accepts.

use std::io::Write;
use std::iter::Peekable;
use std::str::Chars;

use bold_types::vocab::{RDF_LANG_STRING, RDF_VALUE, XSD_STRING};
use bold_types::{GraphName, Literal, Quad, Term};

use crate::error::FormatError;
use crate::format::RdfFormat;
use crate::turtle;

/// Parse `input` in `format`. Statements without an explicit graph land in
/// `default_graph`. Explicit graph labels are only accepted for N-Quads.
/// Relative IRIs in Turtle resolve against the default graph's IRI.
pub fn parse_statements(
    input: &str,
    format: RdfFormat,
    default_graph: &GraphName,
) -> Result<Vec<Quad>, FormatError> {
    if !format.is_readable() {
        return Err(FormatError::UnsupportedMediaType(
            format.media_type().to_owned(),
        ));
    }
    if format == RdfFormat::Turtle {
        return turtle::parse(input, default_graph.iri(), default_graph);
    }
    let mut quads = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let mut cursor = Cursor::new(line, index.saturating_add(1));
        if let Some(quad) = cursor.statement(format, default_graph)? {
            quads.push(quad);
        }
    }
    Ok(quads)
}

/// Serialize `quads` in `format` to `out`.
///
/// The value formats write the lexical form of every `rdf:value` object,
/// in statement order, and nothing else.
pub fn write_statements<W: Write>(
    out: &mut W,
    format: RdfFormat,
    quads: &[Quad],
) -> Result<(), FormatError> {
    match format {
        RdfFormat::Turtle | RdfFormat::NTriples => {
            for quad in quads {
                writeln!(out, "{}", quad.to_ntriples())?;
            }
        }
        RdfFormat::NQuads => {
            for quad in quads {
                writeln!(out, "{}", quad.to_nquads())?;
            }
        }
        RdfFormat::Json | RdfFormat::Html | RdfFormat::Xml => {
            for quad in quads.iter().filter(|q| q.predicate.is_iri(RDF_VALUE)) {
                out.write_all(quad.object.value().as_bytes())?;
            }
        }
    }
    Ok(())
}

/// Serialize `quads` in `format` into a fresh buffer.
pub fn serialize(format: RdfFormat, quads: &[Quad]) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    write_statements(&mut buf, format, quads)?;
    Ok(buf)
}

struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self {
            chars: text.chars().peekable(),
            line,
        }
    }

    fn error(&self, message: impl Into<String>) -> FormatError {
        FormatError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn at_end_or_comment(&mut self) -> bool {
        self.skip_ws();
        matches!(self.chars.peek(), None | Some('#'))
    }

    fn expect(&mut self, wanted: char) -> Result<(), FormatError> {
        match self.chars.next() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(self.error(format!("expected '{wanted}', found '{c}'"))),
            None => Err(self.error(format!("expected '{wanted}', found end of line"))),
        }
    }

    fn statement(
        &mut self,
        format: RdfFormat,
        default_graph: &GraphName,
    ) -> Result<Option<Quad>, FormatError> {
        if self.at_end_or_comment() {
            return Ok(None);
        }
        let subject = self.term()?;
        if matches!(subject, Term::Literal(_)) {
            return Err(self.error("literal in subject position"));
        }
        self.skip_ws();
        let predicate = self.term()?;
        if !matches!(predicate, Term::Iri(_)) {
            return Err(self.error("predicate must be an IRI"));
        }
        self.skip_ws();
        let object = self.term()?;
        self.skip_ws();

        let graph = if self.chars.peek() == Some(&'<') {
            if format != RdfFormat::NQuads {
                return Err(self.error("graph label is only allowed in N-Quads"));
            }
            self.chars.next();
            let iri = self.iri_body()?;
            self.skip_ws();
            GraphName::Named(iri)
        } else {
            default_graph.clone()
        };

        self.expect('.')?;
        if !self.at_end_or_comment() {
            return Err(self.error("trailing content after '.'"));
        }
        Ok(Some(Quad::new(subject, predicate, object, graph)))
    }

    fn term(&mut self) -> Result<Term, FormatError> {
        match self.chars.next() {
            Some('<') => Ok(Term::Iri(self.iri_body()?)),
            Some('_') => {
                self.expect(':')?;
                let label = self.blank_label();
                if label.is_empty() {
                    return Err(self.error("empty blank node label"));
                }
                Ok(Term::BlankNode(label))
            }
            Some('"') => self.literal_body(),
            Some(c) => Err(self.error(format!("unexpected '{c}' at start of term"))),
            None => Err(self.error("unexpected end of line")),
        }
    }

    fn iri_body(&mut self) -> Result<String, FormatError> {
        let mut iri = String::new();
        loop {
            match self.chars.next() {
                Some('>') => return Ok(iri),
                Some(c) if c.is_whitespace() => {
                    return Err(self.error("whitespace inside IRI"));
                }
                Some(c) => iri.push(c),
                None => return Err(self.error("unterminated IRI")),
            }
        }
    }

    fn blank_label(&mut self) -> String {
        let mut label = String::new();
        while let Some(c) = self
            .chars
            .next_if(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        {
            label.push(c);
        }
        label
    }

    fn literal_body(&mut self) -> Result<Term, FormatError> {
        let mut lexical = String::new();
        loop {
            match self.chars.next() {
                Some('"') => break,
                Some('\\') => lexical.push(self.escape()?),
                Some(c) => lexical.push(c),
                None => return Err(self.error("unterminated literal")),
            }
        }
        match self.chars.peek() {
            Some('@') => {
                self.chars.next();
                let mut tag = String::new();
                while let Some(c) = self.chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '-') {
                    tag.push(c);
                }
                if tag.is_empty() {
                    return Err(self.error("empty language tag"));
                }
                Ok(Term::Literal(Literal {
                    lexical,
                    datatype: RDF_LANG_STRING.to_owned(),
                    language: Some(tag),
                }))
            }
            Some('^') => {
                self.chars.next();
                self.expect('^')?;
                self.expect('<')?;
                let datatype = self.iri_body()?;
                Ok(Term::typed(lexical, datatype))
            }
            _ => Ok(Term::typed(lexical, XSD_STRING)),
        }
    }

    fn escape(&mut self) -> Result<char, FormatError> {
        match self.chars.next() {
            Some('t') => Ok('\t'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.hex_escape(4),
            Some('U') => self.hex_escape(8),
            Some(c) => Err(self.error(format!("unknown escape '\\{c}'"))),
            None => Err(self.error("dangling escape")),
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, FormatError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .chars
                .next()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            code = code
                .checked_mul(16)
                .and_then(|c| c.checked_add(digit))
                .ok_or_else(|| self.error("unicode escape out of range"))?;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode scalar"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bold_types::vocab::XSD_INTEGER;

    use super::*;

    const DOC: &str = "# counters\n\
        <http://ex.org/c> <http://ex.org/count> \"3\"^^<http://www.w3.org/2001/XMLSchema#integer> .\n\
        \n\
        _:b1 <http://ex.org/label> \"tab\\there\"@en . # trailing\n\
        <http://ex.org/c> <http://ex.org/name> \"plain \\u0041\" .\n";

    #[test]
    fn parses_triples_into_default_graph() {
        let graph = GraphName::named("http://ex.org/g");
        let quads = parse_statements(DOC, RdfFormat::NTriples, &graph).unwrap();
        assert_eq!(quads.len(), 3);
        assert!(quads.iter().all(|q| q.graph == graph));
        assert_eq!(quads[0].object, Term::typed("3", XSD_INTEGER));
        assert_eq!(quads[1].subject, Term::blank("b1"));
        assert_eq!(quads[1].object, Term::lang("tab\there", "en"));
        assert_eq!(quads[2].object, Term::string("plain A"));
    }

    #[test]
    fn nquads_keep_their_graph_label() {
        let line = "<http://s> <http://p> <http://o> <http://g> .";
        let quads = parse_statements(line, RdfFormat::NQuads, &GraphName::Default).unwrap();
        assert_eq!(quads[0].graph, GraphName::named("http://g"));

        let err = parse_statements(line, RdfFormat::Turtle, &GraphName::Default).unwrap_err();
        assert!(matches!(err, FormatError::Syntax { line: 1, .. }));
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let doc = "<http://s> <http://p> <http://o> .\n<http://s> \"lit\" <http://o> .";
        let err = parse_statements(doc, RdfFormat::NTriples, &GraphName::Default).unwrap_err();
        assert!(matches!(err, FormatError::Syntax { line: 2, .. }));

        for broken in ["<http://s> <http://p> <http://o>", "<http://s <http://p> <http://o> ."] {
            assert!(parse_statements(broken, RdfFormat::NTriples, &GraphName::Default).is_err());
        }
    }

    #[test]
    fn written_statements_parse_back() {
        let graph = GraphName::named("http://ex.org/g");
        let quads = parse_statements(DOC, RdfFormat::NTriples, &graph).unwrap();
        let text = String::from_utf8(serialize(RdfFormat::NQuads, &quads).unwrap()).unwrap();
        let again = parse_statements(&text, RdfFormat::NQuads, &GraphName::Default).unwrap();
        assert_eq!(again, quads);
    }

    #[test]
    fn value_writer_emits_rdf_value_objects_only() {
        let res = Term::iri("http://ex.org/r");
        let quads = vec![
            Quad::new(res.clone(), Term::iri("http://ex.org/p"), Term::string("skip"), GraphName::Default),
            Quad::new(res, Term::iri(RDF_VALUE), Term::string("{\"on\":true}"), GraphName::Default),
        ];
        let body = serialize(RdfFormat::Json, &quads).unwrap();
        assert_eq!(body, b"{\"on\":true}");
        assert!(parse_statements("x", RdfFormat::Json, &GraphName::Default).is_err());
    }
}
