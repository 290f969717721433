//! Well-known IRIs used across the workspace.

/// XML Schema namespace.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// `xsd:string`, the datatype of plain literals.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// `xsd:integer`.
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";

/// `xsd:int`.
pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";

/// `xsd:long`.
pub const XSD_LONG: &str = "http://www.w3.org/2001/XMLSchema#long";

/// `rdf:langString`, the datatype of language-tagged literals.
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// `rdf:value`. Its object is an alternative representation of the subject.
pub const RDF_VALUE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#value";

/// Namespace of the simulation control vocabulary.
pub const SIM_NS: &str = "http://ti.rw.fau.de/sim#";

/// `sim:iterations`: number of ticks the experiment should run.
pub const SIM_ITERATIONS: &str = "http://ti.rw.fau.de/sim#iterations";

/// `sim:currentIteration`: ticks executed so far in the current run.
pub const SIM_CURRENT_ITERATION: &str = "http://ti.rw.fau.de/sim#currentIteration";

/// `sim:timeslotDuration`: informative period of one slot, in milliseconds.
pub const SIM_TIMESLOT_DURATION: &str = "http://ti.rw.fau.de/sim#timeslotDuration";

/// `xsd:decimal`.
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";

/// `xsd:double`.
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// `xsd:boolean`.
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

/// RDF namespace.
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// `rdf:type`, abbreviated `a` in Turtle.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// `rdf:first`.
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";

/// `rdf:rest`.
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";

/// `rdf:nil`, the empty list.
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";

/// `ldp:contains`: links a container to a resource created in it.
pub const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";

/// Container types that turn a graph into an LDP container.
pub const LDP_CONTAINER_TYPES: [&str; 3] = [
    "http://www.w3.org/ns/ldp#BasicContainer",
    "http://www.w3.org/ns/ldp#DirectContainer",
    "http://www.w3.org/ns/ldp#IndirectContainer",
];
