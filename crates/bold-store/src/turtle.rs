//! Turtle reader.
//!
//! Covers the statement syntax agents send: `@prefix`/`PREFIX` and
//! `@base`/`BASE` directives, relative IRIs resolved against the document
//! base, prefixed names, the `a` keyword, predicate (`;`) and object (`,`)
//! lists, blank node property lists, collections, long strings, and the
//! numeric and boolean shorthand literals.

use std::collections::HashMap;

use bold_types::vocab::{
    RDF_FIRST, RDF_NIL, RDF_REST, RDF_TYPE, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER,
};
use bold_types::{GraphName, Quad, Term};

use crate::error::FormatError;

/// Parse a Turtle document. `base` resolves relative IRIs until an
/// `@base` directive replaces it; every statement lands in `graph`.
pub fn parse(input: &str, base: Option<&str>, graph: &GraphName) -> Result<Vec<Quad>, FormatError> {
    Reader {
        chars: input.chars().collect(),
        pos: 0,
        line: 1,
        base: base.map(str::to_owned),
        prefixes: HashMap::new(),
        graph: graph.clone(),
        fresh: 0,
        quads: Vec::new(),
    }
    .document()
}

/// Resolve `reference` against the absolute IRI `base`.
pub fn resolve_iri(base: &str, reference: &str) -> String {
    let base = base.split_once('#').map_or(base, |(head, _)| head);
    if reference.is_empty() {
        return base.to_owned();
    }
    if reference.starts_with('#') {
        return format!("{base}{reference}");
    }
    let (scheme, rest) = base.split_once(':').unwrap_or(("", base));
    if reference.starts_with("//") {
        return format!("{scheme}:{reference}");
    }

    let (authority, path_and_query) = rest.strip_prefix("//").map_or(("", rest), |after| {
        after.split_at(after.find('/').unwrap_or(after.len()))
    });
    let origin = if rest.starts_with("//") {
        format!("{scheme}://{authority}")
    } else {
        format!("{scheme}:")
    };
    let base_path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);
    if reference.starts_with('?') {
        return format!("{origin}{base_path}{reference}");
    }

    let (ref_path, suffix) = reference.split_at(reference.find(['?', '#']).unwrap_or(reference.len()));
    let merged = if ref_path.starts_with('/') {
        ref_path.to_owned()
    } else {
        let dir = base_path
            .rfind('/')
            .map_or("", |slash| base_path.split_at(slash.saturating_add(1)).0);
        if dir.is_empty() && !authority.is_empty() {
            format!("/{ref_path}")
        } else {
            format!("{dir}{ref_path}")
        }
    };
    format!("{origin}{}{suffix}", remove_dot_segments(&merged))
}

fn remove_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    let mut kept: Vec<&str> = Vec::with_capacity(segments.len());
    let mut trailing_slash = false;
    for (index, segment) in segments.into_iter().enumerate() {
        match segment {
            "." => trailing_slash = index == last,
            ".." => {
                if kept.len() > 1 {
                    kept.pop();
                }
                trailing_slash = index == last;
            }
            other => {
                kept.push(other);
                trailing_slash = false;
            }
        }
    }
    let mut joined = kept.join("/");
    if trailing_slash {
        joined.push('/');
    }
    joined
}

fn has_scheme(iri: &str) -> bool {
    iri.split_once(':').is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn is_prefix_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-')
}

fn is_local_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '%' | '.')
}

/// A bare word: either a prefixed name, already expanded, or a keyword.
enum Name {
    Iri(String),
    Keyword(String),
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    base: Option<String>,
    prefixes: HashMap<String, String>,
    graph: GraphName,
    fresh: u64,
    quads: Vec<Quad>,
}

impl Reader {
    fn error(&self, message: impl Into<String>) -> FormatError {
        FormatError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos.saturating_add(ahead)).copied()
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos = self.pos.saturating_add(1);
        if c == '\n' {
            self.line = self.line.saturating_add(1);
        }
        Some(c)
    }

    fn eat(&mut self, wanted: char) -> bool {
        if self.peek() == Some(wanted) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), FormatError> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(self.error(format!("expected '{wanted}', found '{c}'"))),
            None => Err(self.error(format!("expected '{wanted}', found end of input"))),
        }
    }

    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Consume `keyword` (ASCII case-insensitive) if it is followed by
    /// whitespace.
    fn keyword_ahead(&mut self, keyword: &str) -> bool {
        let len = keyword.chars().count();
        let found = keyword
            .chars()
            .enumerate()
            .all(|(offset, k)| self.peek_at(offset).is_some_and(|c| c.eq_ignore_ascii_case(&k)))
            && self.peek_at(len).is_some_and(char::is_whitespace);
        if found {
            self.pos = self.pos.saturating_add(len);
        }
        found
    }

    fn fresh_blank(&mut self) -> Term {
        self.fresh = self.fresh.saturating_add(1);
        Term::blank(format!("genid{}", self.fresh))
    }

    fn emit(&mut self, subject: Term, predicate: Term, object: Term) {
        self.quads
            .push(Quad::new(subject, predicate, object, self.graph.clone()));
    }

    fn document(mut self) -> Result<Vec<Quad>, FormatError> {
        loop {
            self.skip_ws();
            if self.peek().is_none() {
                return Ok(self.quads);
            }
            self.statement()?;
        }
    }

    fn statement(&mut self) -> Result<(), FormatError> {
        if self.eat('@') {
            let mut word = String::new();
            while let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
                self.bump();
                word.push(c);
            }
            match word.as_str() {
                "prefix" => self.prefix_directive()?,
                "base" => self.base_directive()?,
                _ => return Err(self.error(format!("unknown directive '@{word}'"))),
            }
            self.skip_ws();
            return self.expect('.');
        }
        if self.keyword_ahead("PREFIX") {
            return self.prefix_directive();
        }
        if self.keyword_ahead("BASE") {
            return self.base_directive();
        }
        self.triples()?;
        self.skip_ws();
        self.expect('.')
    }

    fn prefix_directive(&mut self) -> Result<(), FormatError> {
        self.skip_ws();
        let mut prefix = String::new();
        while let Some(c) = self.peek().filter(|c| is_prefix_char(*c)) {
            self.bump();
            prefix.push(c);
        }
        self.expect(':')?;
        self.skip_ws();
        self.expect('<')?;
        let namespace = self.iri_ref()?;
        self.prefixes.insert(prefix, namespace);
        Ok(())
    }

    fn base_directive(&mut self) -> Result<(), FormatError> {
        self.skip_ws();
        self.expect('<')?;
        let base = self.iri_ref()?;
        self.base = Some(base);
        Ok(())
    }

    /// The rest of an `<...>` IRI, resolved against the base.
    fn iri_ref(&mut self) -> Result<String, FormatError> {
        let mut raw = String::new();
        loop {
            match self.bump() {
                Some('>') => break,
                Some('\\') => match self.bump() {
                    Some('u') => raw.push(self.hex_escape(4)?),
                    Some('U') => raw.push(self.hex_escape(8)?),
                    _ => return Err(self.error("invalid escape in IRI")),
                },
                Some(c) if c.is_whitespace() => return Err(self.error("whitespace inside IRI")),
                Some(c) => raw.push(c),
                None => return Err(self.error("unterminated IRI")),
            }
        }
        if has_scheme(&raw) {
            return Ok(raw);
        }
        match self.base.as_deref() {
            Some(base) => Ok(resolve_iri(base, &raw)),
            None => Err(self.error(format!("relative IRI <{raw}> without a base"))),
        }
    }

    fn name(&mut self) -> Result<Name, FormatError> {
        let mut prefix = String::new();
        while let Some(c) = self.peek().filter(|c| is_prefix_char(*c)) {
            self.bump();
            prefix.push(c);
        }
        if !self.eat(':') {
            return match self.peek() {
                _ if !prefix.is_empty() => Ok(Name::Keyword(prefix)),
                Some(c) => Err(self.error(format!("unexpected '{c}'"))),
                None => Err(self.error("unexpected end of input")),
            };
        }
        let Some(namespace) = self.prefixes.get(&prefix).cloned() else {
            return Err(self.error(format!("undefined prefix '{prefix}:'")));
        };
        let mut local = String::new();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.bump();
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    local.push(escaped);
                }
                Some('.') if self.peek_at(1).is_some_and(is_local_char) => {
                    self.bump();
                    local.push('.');
                }
                Some(c) if c != '.' && is_local_char(c) => {
                    self.bump();
                    local.push(c);
                }
                _ => return Ok(Name::Iri(format!("{namespace}{local}"))),
            }
        }
    }

    fn iri_or_name(&mut self) -> Result<String, FormatError> {
        if self.eat('<') {
            return self.iri_ref();
        }
        match self.name()? {
            Name::Iri(iri) => Ok(iri),
            Name::Keyword(word) => Err(self.error(format!("expected an IRI, found '{word}'"))),
        }
    }

    fn triples(&mut self) -> Result<(), FormatError> {
        if self.eat('[') {
            let subject = self.blank_property_list()?;
            self.skip_ws();
            if self.peek() != Some('.') {
                self.predicate_object_list(&subject)?;
            }
            return Ok(());
        }
        let subject = match self.peek() {
            Some('_') => self.blank_label()?,
            Some('(') => {
                self.bump();
                self.collection()?
            }
            Some('"' | '\'') => return Err(self.error("literal in subject position")),
            _ => Term::Iri(self.iri_or_name()?),
        };
        self.skip_ws();
        self.predicate_object_list(&subject)
    }

    fn predicate_object_list(&mut self, subject: &Term) -> Result<(), FormatError> {
        loop {
            let predicate = self.verb()?;
            self.skip_ws();
            self.object_list(subject, &predicate)?;
            self.skip_ws();
            if !self.eat(';') {
                return Ok(());
            }
            loop {
                self.skip_ws();
                if !self.eat(';') {
                    break;
                }
            }
            if matches!(self.peek(), Some('.' | ']') | None) {
                return Ok(());
            }
        }
    }

    fn verb(&mut self) -> Result<Term, FormatError> {
        if self.peek() == Some('a') && !self.peek_at(1).is_some_and(is_local_char) {
            self.bump();
            return Ok(Term::iri(RDF_TYPE));
        }
        if matches!(self.peek(), Some('"' | '\'' | '_' | '[')) {
            return Err(self.error("predicate must be an IRI"));
        }
        Ok(Term::Iri(self.iri_or_name()?))
    }

    fn object_list(&mut self, subject: &Term, predicate: &Term) -> Result<(), FormatError> {
        loop {
            let object = self.object()?;
            self.emit(subject.clone(), predicate.clone(), object);
            self.skip_ws();
            if !self.eat(',') {
                return Ok(());
            }
            self.skip_ws();
        }
    }

    fn object(&mut self) -> Result<Term, FormatError> {
        match self.peek() {
            Some('<') => {
                self.bump();
                Ok(Term::Iri(self.iri_ref()?))
            }
            Some('_') => self.blank_label(),
            Some('[') => {
                self.bump();
                self.blank_property_list()
            }
            Some('(') => {
                self.bump();
                self.collection()
            }
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.literal(quote)
            }
            Some(c)
                if c.is_ascii_digit()
                    || matches!(c, '+' | '-')
                    || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                self.numeric()
            }
            Some(_) => match self.name()? {
                Name::Iri(iri) => Ok(Term::Iri(iri)),
                Name::Keyword(word) if word == "true" || word == "false" => {
                    Ok(Term::typed(word, XSD_BOOLEAN))
                }
                Name::Keyword(word) => Err(self.error(format!("unexpected '{word}' in object position"))),
            },
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn blank_label(&mut self) -> Result<Term, FormatError> {
        self.expect('_')?;
        self.expect(':')?;
        let mut label = String::new();
        loop {
            match self.peek() {
                Some('.') if self.peek_at(1).is_some_and(is_prefix_char) => {
                    self.bump();
                    label.push('.');
                }
                Some(c) if is_prefix_char(c) => {
                    self.bump();
                    label.push(c);
                }
                _ => break,
            }
        }
        if label.is_empty() {
            return Err(self.error("empty blank node label"));
        }
        Ok(Term::BlankNode(label))
    }

    /// The rest of a `[ ... ]` property list; returns its fresh node.
    fn blank_property_list(&mut self) -> Result<Term, FormatError> {
        let node = self.fresh_blank();
        self.skip_ws();
        if !self.eat(']') {
            self.predicate_object_list(&node)?;
            self.skip_ws();
            self.expect(']')?;
        }
        Ok(node)
    }

    /// The rest of a `( ... )` collection; returns its head.
    fn collection(&mut self) -> Result<Term, FormatError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(')') {
                break;
            }
            if self.peek().is_none() {
                return Err(self.error("unterminated collection"));
            }
            items.push(self.object()?);
        }
        let mut head = Term::iri(RDF_NIL);
        for item in items.into_iter().rev() {
            let node = self.fresh_blank();
            self.emit(node.clone(), Term::iri(RDF_FIRST), item);
            self.emit(node.clone(), Term::iri(RDF_REST), head);
            head = node;
        }
        Ok(head)
    }

    /// The rest of a string literal opened by `quote`, with its language
    /// tag or datatype.
    fn literal(&mut self, quote: char) -> Result<Term, FormatError> {
        let long = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        let mut lexical = String::new();
        if long {
            self.bump();
            self.bump();
            loop {
                match self.bump() {
                    Some(c)
                        if c == quote
                            && self.peek() == Some(quote)
                            && self.peek_at(1) == Some(quote) =>
                    {
                        self.bump();
                        self.bump();
                        break;
                    }
                    Some('\\') => lexical.push(self.escape()?),
                    Some(c) => lexical.push(c),
                    None => return Err(self.error("unterminated long string")),
                }
            }
        } else {
            loop {
                match self.bump() {
                    Some(c) if c == quote => break,
                    Some('\\') => lexical.push(self.escape()?),
                    Some('\n' | '\r') | None => return Err(self.error("unterminated string")),
                    Some(c) => lexical.push(c),
                }
            }
        }

        if self.eat('@') {
            let mut tag = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '-') {
                self.bump();
                tag.push(c);
            }
            if tag.is_empty() {
                return Err(self.error("empty language tag"));
            }
            return Ok(Term::lang(lexical, tag));
        }
        if self.peek() == Some('^') && self.peek_at(1) == Some('^') {
            self.bump();
            self.bump();
            let datatype = self.iri_or_name()?;
            return Ok(Term::typed(lexical, datatype));
        }
        Ok(Term::string(lexical))
    }

    fn digits(&mut self, text: &mut String) -> bool {
        let mut any = false;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            self.bump();
            text.push(c);
            any = true;
        }
        any
    }

    fn sign(&mut self, text: &mut String) {
        if let Some(sign) = self.peek().filter(|c| matches!(c, '+' | '-')) {
            self.bump();
            text.push(sign);
        }
    }

    fn numeric(&mut self) -> Result<Term, FormatError> {
        let mut text = String::new();
        self.sign(&mut text);
        let mut any = self.digits(&mut text);
        let mut datatype = XSD_INTEGER;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            text.push('.');
            any = self.digits(&mut text) || any;
            datatype = XSD_DECIMAL;
        }
        if !any {
            return Err(self.error("malformed number"));
        }
        if let Some(marker) = self.peek().filter(|c| matches!(c, 'e' | 'E')) {
            self.bump();
            text.push(marker);
            self.sign(&mut text);
            if !self.digits(&mut text) {
                return Err(self.error("missing exponent digits"));
            }
            datatype = XSD_DOUBLE;
        }
        Ok(Term::typed(text, datatype))
    }

    fn escape(&mut self) -> Result<char, FormatError> {
        match self.bump() {
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
                .bump()
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
