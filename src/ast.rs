//! Model types for the BML syntax tree
//!
//! This module defines the resolved/unresolvable document model the scope
//! resolver works over:
//! - **Declarations**: structured types, enumerations, operations, sources
//! - **Reference**: one named slot in the tree, unresolved until the linker
//!   binds it to a target id
//! - **Expr**: the expression union type inference walks
//! - **NodeRef**: a uniform address for any resolvable node in the model
//!
//! ## Key Design Principle: Arena Ownership
//!
//! The `Model` owns every declaration in flat vectors; everything else refers
//! to declarations through small copyable ids (`TypeId`, `AttrRef`, ...).
//! Identity is the arena index, never the name, so two same-named types in
//! different positions are distinct everywhere ids are compared.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Source → Preprocessor → transformed text → (external) Parser
//!                                                  ↓
//!                                   Model with raw References
//!                                                  ↓
//!                                    Linker (scope::scope_for per slot)
//!                                                  ↓
//!                                   Model with bound References
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// IDS AND SPANS
// =============================================================================

/// Index of a structured type declaration in `Model::types`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub usize);

/// Index of an enumeration declaration in `Model::enums`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumId(pub usize);

/// Index of an operation declaration in `Model::operations`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub usize);

/// Index of a source declaration in `Model::sources`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub usize);

/// Address of one attribute: owning type plus position in its attribute list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrRef {
    pub owner: TypeId,
    pub index: usize,
}

/// Address of one enumeration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValueId {
    pub owner: EnumId,
    pub index: usize,
}

/// Byte-offset range into the original source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

// =============================================================================
// REFERENCES
// =============================================================================

/// A named reference slot in the tree.
///
/// The parser leaves `target` empty; the linker asks the scope resolver for
/// candidates and binds the first name match. `raw` is kept after binding so
/// hover and rename consumers still see the written name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference<T> {
    /// The name as written in the source
    pub raw: String,
    /// Bound target, `None` until linked (or unresolvable)
    pub target: Option<T>,
    /// Source span of the name occurrence
    pub span: Span,
}

impl<T> Reference<T> {
    /// An unresolved reference with no recorded location
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            raw: name.into(),
            target: None,
            span: Span::default(),
        }
    }

    /// An unresolved reference at a known location
    pub fn raw_at(name: impl Into<String>, span: Span) -> Self {
        Self {
            raw: name.into(),
            target: None,
            span,
        }
    }

    /// An already-bound reference
    pub fn bound(name: impl Into<String>, target: T) -> Self {
        Self {
            raw: name.into(),
            target: Some(target),
            span: Span::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

// =============================================================================
// TYPE SYSTEM SURFACE
// =============================================================================

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primitive {
    Text,
    Number,
    Boolean,
    Date,
}

/// What a type name can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTarget {
    Structured(TypeId),
    Enumeration(EnumId),
    Primitive(Primitive),
}

impl TypeTarget {
    /// The structured type behind this target, if any.
    ///
    /// Only structured types carry attributes; enumerations and primitives
    /// offer nothing to feature access.
    pub fn as_structured(&self) -> Option<TypeId> {
        match self {
            TypeTarget::Structured(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

// =============================================================================
// DECLARATIONS
// =============================================================================

/// A structured type declaration: `type Employee extends Person: ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub super_type: Option<Reference<TypeId>>,
    pub attributes: Vec<Attribute>,
    pub meta: Vec<MetaEntry>,
    pub span: Span,
}

impl TypeDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_type: None,
            attributes: Vec::new(),
            meta: Vec::new(),
            span: Span::default(),
        }
    }
}

/// One attribute of a structured type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub declared_type: Reference<TypeTarget>,
    pub cardinality: Cardinality,
    pub is_override: bool,
    pub span: Span,
}

impl Attribute {
    pub fn new(name: impl Into<String>, declared_type: Reference<TypeTarget>) -> Self {
        Self {
            name: name.into(),
            declared_type,
            cardinality: Cardinality::One,
            is_override: false,
            span: Span::default(),
        }
    }
}

/// An enumeration declaration: `enum Status: ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<EnumValue>,
    pub span: Span,
}

impl EnumDecl {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values
                .iter()
                .map(|v| EnumValue {
                    name: (*v).to_string(),
                    span: Span::default(),
                })
                .collect(),
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub span: Span,
}

/// A function-like declaration: `operation FullName: ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub output: Option<Parameter>,
    pub lets: Vec<LetBinding>,
    pub assignment: Option<Assignment>,
    pub meta: Vec<MetaEntry>,
    pub span: Span,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: None,
            lets: Vec::new(),
            assignment: None,
            meta: Vec::new(),
            span: Span::default(),
        }
    }
}

/// A declared input or output of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub declared_type: Reference<TypeTarget>,
    pub span: Span,
}

impl Parameter {
    pub fn new(name: impl Into<String>, declared_type: Reference<TypeTarget>) -> Self {
        Self {
            name: name.into(),
            declared_type,
            span: Span::default(),
        }
    }
}

/// A local shortcut binding: `let first = person.name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetBinding {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// The operation's result assignment: `result.address.street := expr`
///
/// `root` names a local (input, output, or shortcut); each segment is a
/// feature access on the type reached through the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub root: Reference<SymbolTarget>,
    pub segments: Vec<Segment>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub attribute: Reference<AttrRef>,
}

/// An external data binding: `source CustomerFeed maps Customer: ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDecl {
    pub name: String,
    pub mapped_type: Reference<TypeId>,
    pub keys: Vec<SourceKey>,
    pub span: Span,
}

/// One column-to-attribute mapping inside a source declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceKey {
    pub column: String,
    pub attribute: Reference<AttrRef>,
    pub span: Span,
}

/// A `with { ... }` annotation entry.
///
/// Meta keys have no resolvable target yet; `MetaTarget` is uninhabited so a
/// bound meta key cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: Reference<MetaTarget>,
    pub value: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaTarget {}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// The expression union type inference dispatches over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Symbol(SymbolExpr),
    Feature(FeatureAccess),
    Construct(Construction),
    EnumValue(EnumValueExpr),
    Match(MatchExpr),
    Binary(BinaryExpr),
}

impl Expr {
    /// A bare symbol reference
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(SymbolExpr {
            reference: Reference::raw(name),
        })
    }

    /// Direct feature access: `receiver.name`
    pub fn feature(receiver: Expr, name: impl Into<String>) -> Self {
        Expr::Feature(FeatureAccess {
            receiver: Box::new(receiver),
            feature: Reference::raw(name),
            deep: false,
        })
    }

    /// Deep feature access: `receiver..name`
    pub fn deep_feature(receiver: Expr, name: impl Into<String>) -> Self {
        Expr::Feature(FeatureAccess {
            receiver: Box::new(receiver),
            feature: Reference::raw(name),
            deep: true,
        })
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Text(value.into()))
    }

    pub fn number(value: Decimal) -> Self {
        Expr::Literal(Literal::Number(value))
    }
}

/// A bare name in expression position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolExpr {
    pub reference: Reference<SymbolTarget>,
}

/// What a bare symbol can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolTarget {
    Input(OperationId, usize),
    Output(OperationId),
    Let(OperationId, usize),
    Type(TypeId),
    Operation(OperationId),
}

/// `receiver.feature` (direct) or `receiver..feature` (deep/transitive)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAccess {
    pub receiver: Box<Expr>,
    pub feature: Reference<AttrRef>,
    pub deep: bool,
}

/// Object construction: `Customer { name: ..., status: ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construction {
    /// Expression naming the constructed type, usually a `Symbol`
    pub type_expr: Box<Expr>,
    pub entries: Vec<ConstructEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructEntry {
    pub key: Reference<AttrRef>,
    pub value: Expr,
}

/// Qualified enumeration value: `Status.Active`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValueExpr {
    pub enumeration: Reference<EnumId>,
    pub value: Reference<EnumValueId>,
}

/// `match subject case Guard: value ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchExpr {
    pub subject: Box<Expr>,
    pub cases: Vec<MatchCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub guard: Reference<GuardTarget>,
    pub value: Expr,
}

/// What a match guard can resolve to: an enumeration value or a type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardTarget {
    Value(EnumValueId),
    Type(TypeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Terminal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Text(String),
    Number(Decimal),
    Boolean(bool),
}

// =============================================================================
// NODE ADDRESSES
// =============================================================================

/// Uniform address of any resolvable node in the model.
///
/// Scope entries pair a name with one of these; consumers follow it back into
/// the `Model` for hover, go-to-definition, and linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Type(TypeId),
    Enum(EnumId),
    EnumValue(EnumValueId),
    Attribute(AttrRef),
    Operation(OperationId),
    Input(OperationId, usize),
    Output(OperationId),
    Let(OperationId, usize),
    Source(SourceId),
}

// =============================================================================
// MODEL
// =============================================================================

/// A fully parsed document: the arena owning every declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub types: Vec<TypeDecl>,
    pub enums: Vec<EnumDecl>,
    pub operations: Vec<Operation>,
    pub sources: Vec<SourceDecl>,
}

impl Model {
    pub fn type_decl(&self, id: TypeId) -> &TypeDecl {
        &self.types[id.0]
    }

    pub fn enum_decl(&self, id: EnumId) -> &EnumDecl {
        &self.enums[id.0]
    }

    pub fn operation(&self, id: OperationId) -> &Operation {
        &self.operations[id.0]
    }

    pub fn source(&self, id: SourceId) -> &SourceDecl {
        &self.sources[id.0]
    }

    pub fn attribute(&self, attr: AttrRef) -> &Attribute {
        &self.types[attr.owner.0].attributes[attr.index]
    }

    pub fn enum_value(&self, value: EnumValueId) -> &EnumValue {
        &self.enums[value.owner.0].values[value.index]
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeId> {
        self.types.iter().position(|t| t.name == name).map(TypeId)
    }

    pub fn enum_by_name(&self, name: &str) -> Option<EnumId> {
        self.enums.iter().position(|e| e.name == name).map(EnumId)
    }

    pub fn operation_by_name(&self, name: &str) -> Option<OperationId> {
        self.operations
            .iter()
            .position(|o| o.name == name)
            .map(OperationId)
    }

    /// Resolve a type name against every named declaration that can appear in
    /// type position
    pub fn type_target_by_name(&self, name: &str) -> Option<TypeTarget> {
        if let Some(p) = primitive_by_name(name) {
            return Some(TypeTarget::Primitive(p));
        }
        if let Some(id) = self.type_by_name(name) {
            return Some(TypeTarget::Structured(id));
        }
        self.enum_by_name(name).map(TypeTarget::Enumeration)
    }

    /// The name a scope entry for this node would carry
    pub fn display_name(&self, node: NodeRef) -> &str {
        match node {
            NodeRef::Type(id) => &self.type_decl(id).name,
            NodeRef::Enum(id) => &self.enum_decl(id).name,
            NodeRef::EnumValue(id) => &self.enum_value(id).name,
            NodeRef::Attribute(attr) => &self.attribute(attr).name,
            NodeRef::Operation(id) => &self.operation(id).name,
            NodeRef::Input(op, i) => &self.operation(op).inputs[i].name,
            NodeRef::Output(op) => match &self.operation(op).output {
                Some(p) => &p.name,
                None => "",
            },
            NodeRef::Let(op, i) => &self.operation(op).lets[i].name,
            NodeRef::Source(id) => &self.source(id).name,
        }
    }
}

/// Primitive type names as written in the DSL
pub fn primitive_by_name(name: &str) -> Option<Primitive> {
    match name {
        "text" => Some(Primitive::Text),
        "number" => Some(Primitive::Number),
        "boolean" => Some(Primitive::Boolean),
        "date" => Some(Primitive::Date),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
