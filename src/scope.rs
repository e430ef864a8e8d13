//! Scope computation for reference slots
//!
//! The linker hands over one unresolved name at a time as a `ReferenceInfo`
//! (container node plus property name). A `SiteKind` tag is computed once
//! from that pair and dispatched to exactly one handler, each returning the
//! ordered candidate list the by-name matcher consumes.
//!
//! Handlers never fail: an empty scope is the deliberate "no candidates"
//! signal, and the feature/constructor handlers degrade to a document-global
//! attribute scope when type inference comes up empty. Combinations this
//! module does not own defer to the caller's standard scope.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ast::{
    Assignment, Construction, EnumValueExpr, FeatureAccess, Model, NodeRef, OperationId,
    SourceDecl, TypeId,
};
use crate::typing::{infer_type, own_and_inherited, symbol_target_type, transitive_attributes};

// =============================================================================
// SCOPE
// =============================================================================

/// One candidate a reference may bind to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub name: String,
    pub target: NodeRef,
}

/// An ordered candidate list, built fresh per request and never mutated
/// after being returned. Earlier entries win on name collisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    entries: Vec<ScopeEntry>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, target: NodeRef) {
        self.entries.push(ScopeEntry {
            name: name.into(),
            target,
        });
    }

    /// First candidate with the given name
    pub fn find(&self, name: &str) -> Option<NodeRef> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.target)
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// REFERENCE SITES
// =============================================================================

/// The container node of one unresolved reference, as handed over by the
/// linker together with the property being resolved.
#[derive(Debug, Clone, Copy)]
pub enum RefContainer<'a> {
    /// `receiver.name` / `receiver..name`
    FeatureAccess(&'a FeatureAccess),
    /// `Type { key: value, ... }`
    Construction(&'a Construction),
    /// A bare symbol inside the given operation's body
    SymbolExpr { operation: OperationId },
    /// The operation's result assignment; `segment` is `None` for the root
    /// name and `Some(i)` for the i-th accessor segment
    Assignment {
        operation: OperationId,
        assignment: &'a Assignment,
        segment: Option<usize>,
    },
    /// `Enumeration.Value`
    EnumValueExpr(&'a EnumValueExpr),
    /// A column-to-attribute key inside a source declaration
    SourceKey(&'a SourceDecl),
    /// A `match ... case` guard
    MatchCase,
    /// A `with { ... }` annotation key
    MetaEntry,
    /// Type positions of declarations (supertypes, attribute and parameter
    /// types, source targets) and anything else without a dedicated handler
    Declaration,
}

/// One unresolved name occurrence: which node holds it, under which property
#[derive(Debug, Clone, Copy)]
pub struct ReferenceInfo<'a> {
    pub container: RefContainer<'a>,
    pub property: &'a str,
}

/// Reference-site kind, computed once from (container kind, property name)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    DirectFeature,
    DeepFeature,
    Segment,
    LocalSymbol,
    ConstructorKey,
    EnumValue,
    SourceKey,
    SwitchGuard,
    WithMetaKey,
    Standard,
}

/// Outcome of scope computation
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeOutcome {
    /// The candidate list for this site
    Scope(Scope),
    /// No dedicated handler; the caller applies its standard scope
    Standard,
}

pub fn classify(info: &ReferenceInfo) -> SiteKind {
    match (&info.container, info.property) {
        (RefContainer::FeatureAccess(access), "feature") => {
            if access.deep {
                SiteKind::DeepFeature
            } else {
                SiteKind::DirectFeature
            }
        }
        (RefContainer::Construction(_), "key") => SiteKind::ConstructorKey,
        (RefContainer::SymbolExpr { .. }, "target") => SiteKind::LocalSymbol,
        (RefContainer::Assignment { segment: None, .. }, "root") => SiteKind::LocalSymbol,
        (
            RefContainer::Assignment {
                segment: Some(_), ..
            },
            "attribute",
        ) => SiteKind::Segment,
        (RefContainer::EnumValueExpr(_), "value") => SiteKind::EnumValue,
        (RefContainer::SourceKey(_), "attribute") => SiteKind::SourceKey,
        (RefContainer::MatchCase, "guard") => SiteKind::SwitchGuard,
        (RefContainer::MetaEntry, "key") => SiteKind::WithMetaKey,
        _ => SiteKind::Standard,
    }
}

/// Compute the candidate scope for one reference slot.
///
/// Pure: the same model and site always produce the same scope, however many
/// times the linker asks.
pub fn scope_for(model: &Model, info: &ReferenceInfo) -> ScopeOutcome {
    let scope = match classify(info) {
        SiteKind::DirectFeature => match info.container {
            RefContainer::FeatureAccess(access) => feature_scope(model, access, false),
            _ => Scope::new(),
        },
        SiteKind::DeepFeature => match info.container {
            RefContainer::FeatureAccess(access) => feature_scope(model, access, true),
            _ => Scope::new(),
        },
        SiteKind::Segment => match info.container {
            RefContainer::Assignment {
                operation,
                assignment,
                segment: Some(index),
            } => segment_scope(model, operation, assignment, index),
            _ => Scope::new(),
        },
        SiteKind::LocalSymbol => match info.container {
            RefContainer::SymbolExpr { operation }
            | RefContainer::Assignment { operation, .. } => local_scope(model, operation),
            _ => Scope::new(),
        },
        SiteKind::ConstructorKey => match info.container {
            RefContainer::Construction(construction) => constructor_scope(model, construction),
            _ => Scope::new(),
        },
        SiteKind::EnumValue => match info.container {
            RefContainer::EnumValueExpr(expr) => enum_value_scope(model, expr),
            _ => Scope::new(),
        },
        SiteKind::SourceKey => match info.container {
            RefContainer::SourceKey(source) => source_key_scope(model, source),
            _ => Scope::new(),
        },
        SiteKind::SwitchGuard => switch_guard_scope(model),
        SiteKind::WithMetaKey => Scope::new(),
        SiteKind::Standard => return ScopeOutcome::Standard,
    };
    ScopeOutcome::Scope(scope)
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Attributes offered on a feature access. Direct access sees the receiver
/// type's own and inherited attributes; deep access sees the transitive
/// closure through attribute types. When the receiver's type cannot be
/// inferred, degrade to every attribute of every declared type.
fn feature_scope(model: &Model, access: &FeatureAccess, deep: bool) -> Scope {
    match infer_type(model, &access.receiver) {
        Some(ty) => {
            let attrs = if deep {
                transitive_attributes(model, ty)
            } else {
                own_and_inherited(model, ty)
            };
            attribute_scope(model, &attrs)
        }
        None => {
            trace!(
                feature = access.feature.raw.as_str(),
                "receiver type unknown, degrading to document-global attributes"
            );
            all_attributes_scope(model)
        }
    }
}

/// The type offered for one accessor segment: the root's type for the first
/// segment, otherwise the declared type of the previously resolved segment.
fn segment_scope(
    model: &Model,
    _operation: OperationId,
    assignment: &Assignment,
    index: usize,
) -> Scope {
    let Some(root_target) = assignment.root.target else {
        return Scope::new();
    };
    let Some(mut ty) = symbol_target_type(model, root_target) else {
        return Scope::new();
    };
    for segment in assignment.segments.iter().take(index) {
        let Some(attr) = segment.attribute.target else {
            return Scope::new();
        };
        let declared = model.attribute(attr).declared_type.target;
        match declared.and_then(|t| t.as_structured()) {
            Some(next) => ty = next,
            None => return Scope::new(),
        }
    }
    attribute_scope(model, &own_and_inherited(model, ty))
}

/// Locals visible inside a function-like construct, in declaration order:
/// inputs, then the declared output if present, then shortcut bindings.
fn local_scope(model: &Model, operation: OperationId) -> Scope {
    let op = model.operation(operation);
    let mut scope = Scope::new();
    for (index, input) in op.inputs.iter().enumerate() {
        scope.push(input.name.clone(), NodeRef::Input(operation, index));
    }
    if let Some(output) = &op.output {
        scope.push(output.name.clone(), NodeRef::Output(operation));
    }
    for (index, binding) in op.lets.iter().enumerate() {
        scope.push(binding.name.clone(), NodeRef::Let(operation, index));
    }
    scope
}

/// Keys of an object construction: the constructed type's own and inherited
/// attributes, or the document-global fallback when inference fails.
fn constructor_scope(model: &Model, construction: &Construction) -> Scope {
    match infer_type(model, &construction.type_expr) {
        Some(ty) => attribute_scope(model, &own_and_inherited(model, ty)),
        None => {
            trace!("constructed type unknown, degrading to document-global attributes");
            all_attributes_scope(model)
        }
    }
}

/// Exactly the declared values of the already-resolved enumeration
fn enum_value_scope(model: &Model, expr: &EnumValueExpr) -> Scope {
    let mut scope = Scope::new();
    if let Some(enum_id) = expr.enumeration.target {
        let decl = model.enum_decl(enum_id);
        for (index, value) in decl.values.iter().enumerate() {
            scope.push(
                value.name.clone(),
                NodeRef::EnumValue(crate::ast::EnumValueId {
                    owner: enum_id,
                    index,
                }),
            );
        }
    }
    scope
}

/// Attributes of the type an external source is bound to
fn source_key_scope(model: &Model, source: &SourceDecl) -> Scope {
    match source.mapped_type.target {
        Some(ty) => attribute_scope(model, &own_and_inherited(model, ty)),
        None => Scope::new(),
    }
}

/// Every enumeration value and every declared type name in the document.
/// Intentionally coarse; narrowing to the match subject's type is left to
/// validation.
fn switch_guard_scope(model: &Model) -> Scope {
    let mut scope = Scope::new();
    for (e, decl) in model.enums.iter().enumerate() {
        for (index, value) in decl.values.iter().enumerate() {
            scope.push(
                value.name.clone(),
                NodeRef::EnumValue(crate::ast::EnumValueId {
                    owner: crate::ast::EnumId(e),
                    index,
                }),
            );
        }
    }
    for (t, decl) in model.types.iter().enumerate() {
        scope.push(decl.name.clone(), NodeRef::Type(TypeId(t)));
    }
    scope
}

fn attribute_scope(model: &Model, attrs: &[crate::ast::AttrRef]) -> Scope {
    let mut scope = Scope::new();
    for attr in attrs {
        scope.push(model.attribute(*attr).name.clone(), NodeRef::Attribute(*attr));
    }
    scope
}

/// Degraded fallback: every attribute of every declared type, in document
/// order
fn all_attributes_scope(model: &Model) -> Scope {
    let mut scope = Scope::new();
    for (t, decl) in model.types.iter().enumerate() {
        for (index, attr) in decl.attributes.iter().enumerate() {
            scope.push(
                attr.name.clone(),
                NodeRef::Attribute(crate::ast::AttrRef {
                    owner: TypeId(t),
                    index,
                }),
            );
        }
    }
    scope
}

// =============================================================================
// Tests
// =============================================================================
