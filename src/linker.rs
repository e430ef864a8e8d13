//! By-name reference linking
//!
//! Walks a parsed model in traversal order, asks the scope resolver for the
//! candidate list of every unresolved reference slot, and binds the first
//! candidate whose name matches. Misses are collected as `LinkError` values,
//! never raised; `diagnostics` turns the collected batch into editor
//! diagnostics.
//!
//! Traversal order matters: a receiver is linked before the feature accessed
//! on it, and each assignment segment before the next, so the type-directed
//! handlers always see their prerequisites already bound.

use std::mem;

use thiserror::Error;
use tracing::debug;

use crate::ast::{
    Expr, GuardTarget, Literal, MetaEntry, Model, NodeRef, OperationId, Span, SymbolTarget,
};
use crate::diagnostics::{Diagnostic, DiagnosticCode, SourceSpan};
use crate::scope::{scope_for, RefContainer, ReferenceInfo, Scope, ScopeOutcome};

// =============================================================================
// ERROR TYPES
// =============================================================================

/// One linking failure. Collected during the pass, never thrown.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("unresolved reference '{name}'")]
    Unresolved { name: String, span: Span },

    #[error("'{name}' is not {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        span: Span,
    },
}

impl LinkError {
    pub fn span(&self) -> Span {
        match self {
            LinkError::Unresolved { span, .. } => *span,
            LinkError::WrongKind { span, .. } => *span,
        }
    }
}

/// Convert collected link errors into diagnostics against the source text
pub fn diagnostics(errors: &[LinkError], source: &str) -> Vec<Diagnostic> {
    errors
        .iter()
        .map(|error| {
            let code = match error {
                LinkError::Unresolved { .. } => DiagnosticCode::UnresolvedReference,
                LinkError::WrongKind { .. } => DiagnosticCode::UnknownType,
            };
            let span = error.span();
            Diagnostic::error(code, error.to_string())
                .with_span(SourceSpan::from_byte_offset(source, span.start, span.end))
        })
        .collect()
}

// =============================================================================
// STANDARD SCOPE
// =============================================================================

/// The document-global scope: every top-level declaration by name, in
/// document order. Backs every reference site without a dedicated handler.
pub fn standard_scope(model: &Model) -> Scope {
    let mut scope = Scope::new();
    for (i, decl) in model.types.iter().enumerate() {
        scope.push(decl.name.clone(), NodeRef::Type(crate::ast::TypeId(i)));
    }
    for (i, decl) in model.enums.iter().enumerate() {
        scope.push(decl.name.clone(), NodeRef::Enum(crate::ast::EnumId(i)));
    }
    for (i, decl) in model.operations.iter().enumerate() {
        scope.push(decl.name.clone(), NodeRef::Operation(OperationId(i)));
    }
    for (i, decl) in model.sources.iter().enumerate() {
        scope.push(decl.name.clone(), NodeRef::Source(crate::ast::SourceId(i)));
    }
    scope
}

fn resolve_scope(model: &Model, container: RefContainer, property: &str) -> Scope {
    match scope_for(model, &ReferenceInfo { container, property }) {
        ScopeOutcome::Scope(scope) => scope,
        ScopeOutcome::Standard => standard_scope(model),
    }
}

// =============================================================================
// LINKER
// =============================================================================

/// Resolve every unresolved reference slot in the model.
///
/// Already-bound slots are left untouched, so linking twice is harmless.
pub fn link(model: &mut Model) -> Vec<LinkError> {
    let mut errors = Vec::new();
    link_type_level(model, &mut errors);
    link_sources(model, &mut errors);
    link_operations(model, &mut errors);
    debug!(errors = errors.len(), "linked document");
    errors
}

fn link_type_level(model: &mut Model, errors: &mut Vec<LinkError>) {
    for t in 0..model.types.len() {
        let super_slot = model.types[t]
            .super_type
            .as_ref()
            .filter(|r| !r.is_resolved())
            .map(|r| (r.raw.clone(), r.span));
        if let Some((raw, span)) = super_slot {
            match standard_scope(model).find(&raw) {
                Some(NodeRef::Type(id)) => {
                    if let Some(slot) = model.types[t].super_type.as_mut() {
                        slot.target = Some(id);
                    }
                }
                Some(_) => errors.push(LinkError::WrongKind {
                    name: raw,
                    expected: "a type",
                    span,
                }),
                None => errors.push(LinkError::Unresolved { name: raw, span }),
            }
        }

        for a in 0..model.types[t].attributes.len() {
            let slot = &model.types[t].attributes[a].declared_type;
            if slot.is_resolved() {
                continue;
            }
            let (raw, span) = (slot.raw.clone(), slot.span);
            match type_position_target(model, raw, span) {
                Ok(target) => model.types[t].attributes[a].declared_type.target = Some(target),
                Err(error) => errors.push(error),
            }
        }

        link_meta(model, t, MetaOwner::Type, errors);
    }
}

/// Resolve a name written in type position: primitives first, then the
/// standard scope.
fn type_position_target(
    model: &Model,
    raw: String,
    span: Span,
) -> Result<crate::ast::TypeTarget, LinkError> {
    use crate::ast::TypeTarget;

    if let Some(primitive) = crate::ast::primitive_by_name(&raw) {
        return Ok(TypeTarget::Primitive(primitive));
    }
    match standard_scope(model).find(&raw) {
        Some(NodeRef::Type(id)) => Ok(TypeTarget::Structured(id)),
        Some(NodeRef::Enum(id)) => Ok(TypeTarget::Enumeration(id)),
        Some(_) => Err(LinkError::WrongKind {
            name: raw,
            expected: "a type",
            span,
        }),
        None => Err(LinkError::Unresolved { name: raw, span }),
    }
}

fn link_sources(model: &mut Model, errors: &mut Vec<LinkError>) {
    for s in 0..model.sources.len() {
        let mapped_slot = {
            let slot = &model.sources[s].mapped_type;
            if slot.is_resolved() {
                None
            } else {
                Some((slot.raw.clone(), slot.span))
            }
        };
        if let Some((raw, span)) = mapped_slot {
            match standard_scope(model).find(&raw) {
                Some(NodeRef::Type(id)) => model.sources[s].mapped_type.target = Some(id),
                Some(_) => errors.push(LinkError::WrongKind {
                    name: raw,
                    expected: "a type",
                    span,
                }),
                None => errors.push(LinkError::Unresolved { name: raw, span }),
            }
        }

        for k in 0..model.sources[s].keys.len() {
            let slot = &model.sources[s].keys[k].attribute;
            if slot.is_resolved() {
                continue;
            }
            let (raw, span) = (slot.raw.clone(), slot.span);
            let scope = resolve_scope(model, RefContainer::SourceKey(&model.sources[s]), "attribute");
            match scope.find(&raw) {
                Some(NodeRef::Attribute(attr)) => {
                    model.sources[s].keys[k].attribute.target = Some(attr)
                }
                Some(_) => errors.push(LinkError::WrongKind {
                    name: raw,
                    expected: "an attribute",
                    span,
                }),
                None => errors.push(LinkError::Unresolved { name: raw, span }),
            }
        }
    }
}

fn link_operations(model: &mut Model, errors: &mut Vec<LinkError>) {
    for o in 0..model.operations.len() {
        let op_id = OperationId(o);

        for i in 0..model.operations[o].inputs.len() {
            let slot = &model.operations[o].inputs[i].declared_type;
            if slot.is_resolved() {
                continue;
            }
            let (raw, span) = (slot.raw.clone(), slot.span);
            match type_position_target(model, raw, span) {
                Ok(target) => model.operations[o].inputs[i].declared_type.target = Some(target),
                Err(error) => errors.push(error),
            }
        }

        let output_slot = model.operations[o]
            .output
            .as_ref()
            .filter(|p| !p.declared_type.is_resolved())
            .map(|p| (p.declared_type.raw.clone(), p.declared_type.span));
        if let Some((raw, span)) = output_slot {
            match type_position_target(model, raw, span) {
                Ok(target) => {
                    if let Some(output) = model.operations[o].output.as_mut() {
                        output.declared_type.target = Some(target);
                    }
                }
                Err(error) => errors.push(error),
            }
        }

        // Shortcuts in declaration order; an earlier binding is fully linked
        // before a later one may need its type.
        for l in 0..model.operations[o].lets.len() {
            let value = mem::replace(&mut model.operations[o].lets[l].value, placeholder());
            let value = link_expr(model, op_id, value, SymbolMode::Local, errors);
            model.operations[o].lets[l].value = value;
        }

        if let Some(mut assignment) = model.operations[o].assignment.take() {
            if !assignment.root.is_resolved() {
                let scope = resolve_scope(
                    model,
                    RefContainer::Assignment {
                        operation: op_id,
                        assignment: &assignment,
                        segment: None,
                    },
                    "root",
                );
                let raw = assignment.root.raw.clone();
                let span = assignment.root.span;
                match scope.find(&raw).and_then(node_to_symbol_target) {
                    Some(target) => assignment.root.target = Some(target),
                    None => errors.push(LinkError::Unresolved { name: raw, span }),
                }
            }

            for i in 0..assignment.segments.len() {
                if assignment.segments[i].attribute.is_resolved() {
                    continue;
                }
                let scope = resolve_scope(
                    model,
                    RefContainer::Assignment {
                        operation: op_id,
                        assignment: &assignment,
                        segment: Some(i),
                    },
                    "attribute",
                );
                let raw = assignment.segments[i].attribute.raw.clone();
                let span = assignment.segments[i].attribute.span;
                match scope.find(&raw) {
                    Some(NodeRef::Attribute(attr)) => {
                        assignment.segments[i].attribute.target = Some(attr)
                    }
                    Some(_) => errors.push(LinkError::WrongKind {
                        name: raw,
                        expected: "an attribute",
                        span,
                    }),
                    None => errors.push(LinkError::Unresolved { name: raw, span }),
                }
            }

            let value = mem::replace(&mut assignment.value, placeholder());
            assignment.value = link_expr(model, op_id, value, SymbolMode::Local, errors);
            model.operations[o].assignment = Some(assignment);
        }

        link_meta(model, o, MetaOwner::Operation, errors);
    }
}

#[derive(Clone, Copy)]
enum MetaOwner {
    Type,
    Operation,
}

/// With-meta keys have an empty scope, so every written key surfaces as
/// unresolved.
fn link_meta(model: &Model, index: usize, owner: MetaOwner, errors: &mut Vec<LinkError>) {
    let meta: &[MetaEntry] = match owner {
        MetaOwner::Type => &model.types[index].meta,
        MetaOwner::Operation => &model.operations[index].meta,
    };
    for entry in meta {
        let scope = resolve_scope(model, RefContainer::MetaEntry, "key");
        if scope.find(&entry.key.raw).is_none() {
            errors.push(LinkError::Unresolved {
                name: entry.key.raw.clone(),
                span: entry.key.span,
            });
        }
    }
}

// =============================================================================
// EXPRESSION LINKING
// =============================================================================

/// How a bare symbol in the current position resolves
#[derive(Clone, Copy, PartialEq)]
enum SymbolMode {
    /// Operation-local declarations: inputs, output, shortcuts
    Local,
    /// Type position, resolved against the standard scope
    TypePosition,
}

fn placeholder() -> Expr {
    Expr::Literal(Literal::Boolean(false))
}

fn link_expr(
    model: &Model,
    op: OperationId,
    expr: Expr,
    mode: SymbolMode,
    errors: &mut Vec<LinkError>,
) -> Expr {
    match expr {
        Expr::Literal(_) => expr,

        Expr::Symbol(mut sym) => {
            if !sym.reference.is_resolved() {
                let raw = sym.reference.raw.clone();
                let span = sym.reference.span;
                match mode {
                    SymbolMode::Local => {
                        let scope = resolve_scope(
                            model,
                            RefContainer::SymbolExpr { operation: op },
                            "target",
                        );
                        match scope.find(&raw).and_then(node_to_symbol_target) {
                            Some(target) => sym.reference.target = Some(target),
                            None => errors.push(LinkError::Unresolved { name: raw, span }),
                        }
                    }
                    SymbolMode::TypePosition => match standard_scope(model).find(&raw) {
                        Some(NodeRef::Type(id)) => {
                            sym.reference.target = Some(SymbolTarget::Type(id))
                        }
                        Some(_) => errors.push(LinkError::WrongKind {
                            name: raw,
                            expected: "a type",
                            span,
                        }),
                        None => errors.push(LinkError::Unresolved { name: raw, span }),
                    },
                }
            }
            Expr::Symbol(sym)
        }

        Expr::Feature(mut access) => {
            let receiver = mem::replace(&mut *access.receiver, placeholder());
            *access.receiver = link_expr(model, op, receiver, SymbolMode::Local, errors);

            if !access.feature.is_resolved() {
                let raw = access.feature.raw.clone();
                let span = access.feature.span;
                let scope = resolve_scope(model, RefContainer::FeatureAccess(&access), "feature");
                match scope.find(&raw) {
                    Some(NodeRef::Attribute(attr)) => access.feature.target = Some(attr),
                    Some(_) => errors.push(LinkError::WrongKind {
                        name: raw,
                        expected: "an attribute",
                        span,
                    }),
                    None => errors.push(LinkError::Unresolved { name: raw, span }),
                }
            }
            Expr::Feature(access)
        }

        Expr::Construct(mut construction) => {
            let type_expr = mem::replace(&mut *construction.type_expr, placeholder());
            *construction.type_expr =
                link_expr(model, op, type_expr, SymbolMode::TypePosition, errors);

            for i in 0..construction.entries.len() {
                let value = mem::replace(&mut construction.entries[i].value, placeholder());
                construction.entries[i].value =
                    link_expr(model, op, value, SymbolMode::Local, errors);

                if construction.entries[i].key.is_resolved() {
                    continue;
                }
                let raw = construction.entries[i].key.raw.clone();
                let span = construction.entries[i].key.span;
                let scope = resolve_scope(model, RefContainer::Construction(&construction), "key");
                match scope.find(&raw) {
                    Some(NodeRef::Attribute(attr)) => {
                        construction.entries[i].key.target = Some(attr)
                    }
                    Some(_) => errors.push(LinkError::WrongKind {
                        name: raw,
                        expected: "an attribute",
                        span,
                    }),
                    None => errors.push(LinkError::Unresolved { name: raw, span }),
                }
            }
            Expr::Construct(construction)
        }

        Expr::EnumValue(mut value_expr) => {
            if !value_expr.enumeration.is_resolved() {
                let raw = value_expr.enumeration.raw.clone();
                let span = value_expr.enumeration.span;
                match standard_scope(model).find(&raw) {
                    Some(NodeRef::Enum(id)) => value_expr.enumeration.target = Some(id),
                    Some(_) => errors.push(LinkError::WrongKind {
                        name: raw,
                        expected: "an enumeration",
                        span,
                    }),
                    None => errors.push(LinkError::Unresolved { name: raw, span }),
                }
            }
            if !value_expr.value.is_resolved() {
                let raw = value_expr.value.raw.clone();
                let span = value_expr.value.span;
                let scope =
                    resolve_scope(model, RefContainer::EnumValueExpr(&value_expr), "value");
                match scope.find(&raw) {
                    Some(NodeRef::EnumValue(id)) => value_expr.value.target = Some(id),
                    _ => errors.push(LinkError::Unresolved { name: raw, span }),
                }
            }
            Expr::EnumValue(value_expr)
        }

        Expr::Match(mut match_expr) => {
            let subject = mem::replace(&mut *match_expr.subject, placeholder());
            *match_expr.subject = link_expr(model, op, subject, SymbolMode::Local, errors);

            for case in &mut match_expr.cases {
                if !case.guard.is_resolved() {
                    let raw = case.guard.raw.clone();
                    let span = case.guard.span;
                    let scope = resolve_scope(model, RefContainer::MatchCase, "guard");
                    match scope.find(&raw) {
                        Some(NodeRef::EnumValue(id)) => {
                            case.guard.target = Some(GuardTarget::Value(id))
                        }
                        Some(NodeRef::Type(id)) => case.guard.target = Some(GuardTarget::Type(id)),
                        _ => errors.push(LinkError::Unresolved { name: raw, span }),
                    }
                }
                let value = mem::replace(&mut case.value, placeholder());
                case.value = link_expr(model, op, value, SymbolMode::Local, errors);
            }
            Expr::Match(match_expr)
        }

        Expr::Binary(mut binary) => {
            let lhs = mem::replace(&mut *binary.lhs, placeholder());
            *binary.lhs = link_expr(model, op, lhs, SymbolMode::Local, errors);
            let rhs = mem::replace(&mut *binary.rhs, placeholder());
            *binary.rhs = link_expr(model, op, rhs, SymbolMode::Local, errors);
            Expr::Binary(binary)
        }
    }
}

/// Narrow a scope hit to something a bare symbol may bind to
fn node_to_symbol_target(node: NodeRef) -> Option<SymbolTarget> {
    match node {
        NodeRef::Input(op, index) => Some(SymbolTarget::Input(op, index)),
        NodeRef::Output(op) => Some(SymbolTarget::Output(op)),
        NodeRef::Let(op, index) => Some(SymbolTarget::Let(op, index)),
        NodeRef::Type(id) => Some(SymbolTarget::Type(id)),
        NodeRef::Operation(id) => Some(SymbolTarget::Operation(id)),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
