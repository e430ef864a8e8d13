//! bml-core: Semantic frontend for the BML business-modeling DSL
//!
//! This crate contains the pure language logic between raw text and a
//! resolved, typed syntax tree, with NO parser or transport dependencies:
//! - Ambiguity-resolving preprocessor (wraps bare functional-operator
//!   expressions in explicit delimiters before parsing)
//! - Model/AST types with unresolved reference slots
//! - Scope resolution per reference site, with type inference and
//!   own/inherited/transitive attribute collection
//! - By-name linker and diagnostic types for editor integration
//!
//! The grammar-driven parser, structural validation, and the language-server
//! transport live outside this crate and consume these building blocks.

pub mod ast;
pub mod diagnostics;
pub mod keywords;
pub mod linker;
pub mod preprocessor;
pub mod scope;
pub mod typing;

// Re-export commonly used types
pub use ast::{
    AttrRef, Attribute, Cardinality, EnumDecl, EnumId, EnumValueId, Expr, Model, NodeRef,
    Operation, OperationId, Parameter, Primitive, Reference, SourceDecl, SourceId, Span,
    SymbolTarget, TypeDecl, TypeId, TypeTarget,
};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity, SourceSpan};
pub use linker::{link, standard_scope, LinkError};
pub use preprocessor::{insertions, preprocess, Insertion, InsertionKind};
pub use scope::{
    classify, scope_for, RefContainer, ReferenceInfo, Scope, ScopeEntry, ScopeOutcome, SiteKind,
};
pub use typing::{infer_type, own_and_inherited, transitive_attributes};
