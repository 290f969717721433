//! RDF terms, graph names and quads.
//!
//! A [`Quad`] is the unit of change recorded by the change history and the
//! unit of storage in the graph store. The [`Display`](core::fmt::Display)
//! implementations emit N-Triples / N-Quads syntax, which is also what the
//! store's line codec reads back.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::vocab::{RDF_LANG_STRING, XSD_INT, XSD_INTEGER, XSD_LONG, XSD_STRING};

/// A literal value: lexical form plus datatype, and a language tag for
/// `rdf:langString` literals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// The lexical form, unescaped.
    pub lexical: String,
    /// Datatype IRI.
    pub datatype: String,
    /// Language tag (only for `rdf:langString`).
    pub language: Option<String>,
}

/// An RDF term in subject, predicate or object position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    /// An absolute IRI.
    Iri(String),
    /// A blank node label (without the `_:` prefix).
    BlankNode(String),
    /// A literal.
    Literal(Literal),
}

impl Term {
    /// Build an IRI term.
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    /// Build a blank node term.
    pub fn blank(label: impl Into<String>) -> Self {
        Self::BlankNode(label.into())
    }

    /// Build a plain (`xsd:string`) literal.
    pub fn string(lexical: impl Into<String>) -> Self {
        Self::typed(lexical, XSD_STRING)
    }

    /// Build a literal with an explicit datatype.
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal(Literal {
            lexical: lexical.into(),
            datatype: datatype.into(),
            language: None,
        })
    }

    /// Build a language-tagged literal.
    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal(Literal {
            lexical: lexical.into(),
            datatype: RDF_LANG_STRING.to_owned(),
            language: Some(language.into()),
        })
    }

    /// Build an `xsd:integer` literal.
    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), XSD_INTEGER)
    }

    /// Interpret this term as an integer literal.
    ///
    /// Accepts `xsd:integer`, `xsd:int` and `xsd:long`; any other term
    /// yields `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Literal(lit)
                if lit.datatype == XSD_INTEGER
                    || lit.datatype == XSD_INT
                    || lit.datatype == XSD_LONG =>
            {
                lit.lexical.trim().parse().ok()
            }
            _ => None,
        }
    }

    /// The plain string value of the term: the IRI, the blank node label
    /// or the literal's lexical form. Used for tabular replay output.
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(iri) => iri,
            Self::BlankNode(label) => label,
            Self::Literal(lit) => &lit.lexical,
        }
    }

    /// Whether this term is an IRI equal to `iri`.
    pub fn is_iri(&self, iri: &str) -> bool {
        matches!(self, Self::Iri(own) if own == iri)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::BlankNode(label) => write!(f, "_:{label}"),
            Self::Literal(lit) => {
                f.write_str("\"")?;
                for ch in lit.lexical.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")?;
                match &lit.language {
                    Some(tag) => write!(f, "@{tag}"),
                    None if lit.datatype == XSD_STRING => Ok(()),
                    None => write!(f, "^^<{}>", lit.datatype),
                }
            }
        }
    }
}

/// The graph a statement belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GraphName {
    /// The unnamed default graph.
    #[default]
    Default,
    /// A named graph, identified by an IRI. Protocol resources are named
    /// graphs addressed directly by their URL.
    Named(String),
}

impl GraphName {
    /// Build a named graph.
    pub fn named(iri: impl Into<String>) -> Self {
        Self::Named(iri.into())
    }

    /// Return the graph IRI, or `None` for the default graph.
    pub fn iri(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(iri) => Some(iri),
        }
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("(default graph)"),
            Self::Named(iri) => write!(f, "<{iri}>"),
        }
    }
}

/// A statement: subject, predicate and object scoped to a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quad {
    /// Subject (IRI or blank node).
    pub subject: Term,
    /// Predicate (IRI).
    pub predicate: Term,
    /// Object (any term).
    pub object: Term,
    /// The graph the statement belongs to.
    pub graph: GraphName,
}

impl Quad {
    /// Build a quad.
    pub const fn new(subject: Term, predicate: Term, object: Term, graph: GraphName) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph,
        }
    }

    /// Return the same statement moved into `graph`.
    #[must_use]
    pub fn in_graph(self, graph: GraphName) -> Self {
        Self { graph, ..self }
    }

    /// Format the statement as an N-Triples line (graph omitted), without
    /// the trailing newline.
    pub fn to_ntriples(&self) -> String {
        format!("{} {} {} .", self.subject, self.predicate, self.object)
    }

    /// Format the statement as an N-Quads line, without the trailing newline.
    pub fn to_nquads(&self) -> String {
        match &self.graph {
            GraphName::Default => self.to_ntriples(),
            GraphName::Named(iri) => format!(
                "{} {} {} <{iri}> .",
                self.subject, self.predicate, self.object
            ),
        }
    }
}
