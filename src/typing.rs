//! Type inference and attribute collection
//!
//! Both halves serve scope computation: inference turns a receiver or
//! constructed-type expression into the structured type it evaluates to, and
//! the collectors turn that type into the attribute candidates a feature
//! reference may bind to.
//!
//! Everything here is a pure function of the model. Visited sets key on
//! arena ids, never names, so same-named declarations are never conflated
//! and malformed cyclic type graphs cannot cause non-termination.

use std::collections::HashSet;

use crate::ast::{AttrRef, Expr, Model, OperationId, Parameter, SymbolTarget, TypeId};

// =============================================================================
// TYPE INFERENCE
// =============================================================================

/// Determine the structured declared type an expression evaluates to.
///
/// `None` means "unknown": either the expression form carries no type, a
/// reference along the way is still unresolved, or the type position names a
/// primitive or enumeration (which offer no attributes).
pub fn infer_type(model: &Model, expr: &Expr) -> Option<TypeId> {
    let mut visited_lets = HashSet::new();
    infer_guarded(model, expr, &mut visited_lets)
}

fn infer_guarded(
    model: &Model,
    expr: &Expr,
    visited_lets: &mut HashSet<(OperationId, usize)>,
) -> Option<TypeId> {
    match expr {
        Expr::Symbol(sym) => {
            let target = sym.reference.target?;
            symbol_type_guarded(model, target, visited_lets)
        }
        Expr::Feature(access) => {
            let attr = access.feature.target?;
            model.attribute(attr).declared_type.target?.as_structured()
        }
        Expr::Construct(construction) => {
            infer_guarded(model, &construction.type_expr, visited_lets)
        }
        Expr::Literal(_) | Expr::EnumValue(_) | Expr::Match(_) | Expr::Binary(_) => None,
    }
}

/// The structured type behind a resolved symbol target.
pub fn symbol_target_type(model: &Model, target: SymbolTarget) -> Option<TypeId> {
    let mut visited_lets = HashSet::new();
    symbol_type_guarded(model, target, &mut visited_lets)
}

fn symbol_type_guarded(
    model: &Model,
    target: SymbolTarget,
    visited_lets: &mut HashSet<(OperationId, usize)>,
) -> Option<TypeId> {
    match target {
        SymbolTarget::Input(op, index) => parameter_type(model.operation(op).inputs.get(index)?),
        SymbolTarget::Output(op) => parameter_type(model.operation(op).output.as_ref()?),
        SymbolTarget::Let(op, index) => {
            // A shortcut bound (transitively) to itself has no type.
            if !visited_lets.insert((op, index)) {
                return None;
            }
            let binding = model.operation(op).lets.get(index)?;
            infer_guarded(model, &binding.value, visited_lets)
        }
        SymbolTarget::Type(id) => Some(id),
        SymbolTarget::Operation(op) => parameter_type(model.operation(op).output.as_ref()?),
    }
}

fn parameter_type(parameter: &Parameter) -> Option<TypeId> {
    parameter.declared_type.target?.as_structured()
}

// =============================================================================
// ATTRIBUTE COLLECTION
// =============================================================================

/// A type's directly declared attributes followed by its supertype chain's,
/// each type visited at most once. A cyclic inheritance chain simply stops
/// contributing once it loops; reporting the cycle is the validator's job.
pub fn own_and_inherited(model: &Model, ty: TypeId) -> Vec<AttrRef> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    push_own_and_inherited(model, ty, &mut visited, &mut out);
    out
}

/// Every attribute reachable from the type through attribute types,
/// recursively ("deep" feature access). One visited set covers the whole
/// walk, so diamonds and cycles in the attribute-type graph terminate with a
/// deduplicated result.
pub fn transitive_attributes(model: &Model, ty: TypeId) -> Vec<AttrRef> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    collect_transitive(model, ty, &mut visited, &mut out);
    out
}

fn push_own_and_inherited(
    model: &Model,
    ty: TypeId,
    visited: &mut HashSet<TypeId>,
    out: &mut Vec<AttrRef>,
) {
    let mut current = Some(ty);
    while let Some(t) = current {
        // A visited type already contributed its whole chain.
        if !visited.insert(t) {
            break;
        }
        let decl = model.type_decl(t);
        for index in 0..decl.attributes.len() {
            out.push(AttrRef { owner: t, index });
        }
        current = decl.super_type.as_ref().and_then(|r| r.target);
    }
}

fn collect_transitive(
    model: &Model,
    ty: TypeId,
    visited: &mut HashSet<TypeId>,
    out: &mut Vec<AttrRef>,
) {
    let emitted_from = out.len();
    push_own_and_inherited(model, ty, visited, out);
    let added: Vec<AttrRef> = out[emitted_from..].to_vec();
    for attr in added {
        let target = model.attribute(attr).declared_type.target;
        if let Some(next) = target.and_then(|t| t.as_structured()) {
            if !visited.contains(&next) {
                collect_transitive(model, next, visited, out);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Attribute, EnumDecl, EnumId, LetBinding, Operation, Primitive, Reference, Span, TypeDecl,
        TypeTarget,
    };
    use pretty_assertions::assert_eq;

    fn attr(owner: usize, index: usize) -> AttrRef {
        AttrRef {
            owner: TypeId(owner),
            index,
        }
    }

    /// Person { name: text } <- Employee { employeeId: text, manager: Person }
    fn inheritance_model() -> Model {
        let mut model = Model::default();

        let mut person = TypeDecl::new("Person");
        person.attributes.push(Attribute::new(
            "name",
            Reference::bound("text", TypeTarget::Primitive(Primitive::Text)),
        ));
        model.types.push(person);

        let mut employee = TypeDecl::new("Employee");
        employee.super_type = Some(Reference::bound("Person", TypeId(0)));
        employee.attributes.push(Attribute::new(
            "employeeId",
            Reference::bound("text", TypeTarget::Primitive(Primitive::Text)),
        ));
        employee.attributes.push(Attribute::new(
            "manager",
            Reference::bound("Person", TypeTarget::Structured(TypeId(0))),
        ));
        model.types.push(employee);

        model
    }

    #[test]
    fn test_own_attributes_precede_inherited() {
        let model = inheritance_model();
        let attrs = own_and_inherited(&model, TypeId(1));
        assert_eq!(attrs, vec![attr(1, 0), attr(1, 1), attr(0, 0)]);
    }

    #[test]
    fn test_inheritance_cycle_terminates() {
        let mut model = Model::default();
        let mut a = TypeDecl::new("A");
        a.super_type = Some(Reference::bound("B", TypeId(1)));
        a.attributes.push(Attribute::new(
            "x",
            Reference::bound("text", TypeTarget::Primitive(Primitive::Text)),
        ));
        let mut b = TypeDecl::new("B");
        b.super_type = Some(Reference::bound("A", TypeId(0)));
        b.attributes.push(Attribute::new(
            "y",
            Reference::bound("text", TypeTarget::Primitive(Primitive::Text)),
        ));
        model.types.push(a);
        model.types.push(b);

        assert_eq!(
            own_and_inherited(&model, TypeId(0)),
            vec![attr(0, 0), attr(1, 0)]
        );
    }

    #[test]
    fn test_transitive_follows_attribute_types() {
        let model = inheritance_model();
        // Employee -> manager: Person -> name
        let attrs = transitive_attributes(&model, TypeId(1));
        assert_eq!(attrs, vec![attr(1, 0), attr(1, 1), attr(0, 0)]);
    }

    #[test]
    fn test_transitive_attribute_cycle_terminates() {
        let mut model = Model::default();
        let mut node = TypeDecl::new("Node");
        node.attributes.push(Attribute::new(
            "next",
            Reference::bound("Node", TypeTarget::Structured(TypeId(0))),
        ));
        node.attributes.push(Attribute::new(
            "label",
            Reference::bound("text", TypeTarget::Primitive(Primitive::Text)),
        ));
        model.types.push(node);

        let attrs = transitive_attributes(&model, TypeId(0));
        assert_eq!(attrs, vec![attr(0, 0), attr(0, 1)]);
    }

    #[test]
    fn test_transitive_diamond_visits_once() {
        // Left { shared: Shared }, Right { shared: Shared }, Top { l: Left, r: Right }
        let mut model = Model::default();
        let mut shared = TypeDecl::new("Shared");
        shared.attributes.push(Attribute::new(
            "value",
            Reference::bound("text", TypeTarget::Primitive(Primitive::Text)),
        ));
        let mut left = TypeDecl::new("Left");
        left.attributes.push(Attribute::new(
            "shared",
            Reference::bound("Shared", TypeTarget::Structured(TypeId(0))),
        ));
        let mut right = TypeDecl::new("Right");
        right.attributes.push(Attribute::new(
            "shared",
            Reference::bound("Shared", TypeTarget::Structured(TypeId(0))),
        ));
        let mut top = TypeDecl::new("Top");
        top.attributes.push(Attribute::new(
            "l",
            Reference::bound("Left", TypeTarget::Structured(TypeId(1))),
        ));
        top.attributes.push(Attribute::new(
            "r",
            Reference::bound("Right", TypeTarget::Structured(TypeId(2))),
        ));
        model.types.push(shared);
        model.types.push(left);
        model.types.push(right);
        model.types.push(top);

        let attrs = transitive_attributes(&model, TypeId(3));
        // Shared::value appears exactly once.
        assert_eq!(
            attrs,
            vec![attr(3, 0), attr(3, 1), attr(1, 0), attr(0, 0), attr(2, 0)]
        );
    }

    #[test]
    fn test_infer_symbol_to_type() {
        let model = inheritance_model();
        let expr = Expr::Symbol(crate::ast::SymbolExpr {
            reference: Reference::bound("Employee", SymbolTarget::Type(TypeId(1))),
        });
        assert_eq!(infer_type(&model, &expr), Some(TypeId(1)));
    }

    #[test]
    fn test_infer_feature_access() {
        let model = inheritance_model();
        // employee.manager : Person
        let expr = Expr::Feature(crate::ast::FeatureAccess {
            receiver: Box::new(Expr::symbol("employee")),
            feature: Reference::bound("manager", attr(1, 1)),
            deep: false,
        });
        assert_eq!(infer_type(&model, &expr), Some(TypeId(0)));
    }

    #[test]
    fn test_infer_primitive_attribute_is_unknown() {
        let model = inheritance_model();
        let expr = Expr::Feature(crate::ast::FeatureAccess {
            receiver: Box::new(Expr::symbol("employee")),
            feature: Reference::bound("name", attr(0, 0)),
            deep: false,
        });
        assert_eq!(infer_type(&model, &expr), None);
    }

    #[test]
    fn test_infer_unresolved_reference_is_unknown() {
        let model = inheritance_model();
        assert_eq!(infer_type(&model, &Expr::symbol("anything")), None);
    }

    #[test]
    fn test_infer_through_let_binding() {
        let mut model = inheritance_model();
        let mut op = Operation::new("Promote");
        op.lets.push(LetBinding {
            name: "boss".to_string(),
            value: Expr::Construct(crate::ast::Construction {
                type_expr: Box::new(Expr::Symbol(crate::ast::SymbolExpr {
                    reference: Reference::bound("Person", SymbolTarget::Type(TypeId(0))),
                })),
                entries: Vec::new(),
            }),
            span: Span::default(),
        });
        model.operations.push(op);

        let expr = Expr::Symbol(crate::ast::SymbolExpr {
            reference: Reference::bound("boss", SymbolTarget::Let(OperationId(0), 0)),
        });
        assert_eq!(infer_type(&model, &expr), Some(TypeId(0)));
    }

    #[test]
    fn test_infer_let_cycle_is_unknown() {
        let mut model = Model::default();
        let mut op = Operation::new("Loop");
        op.lets.push(LetBinding {
            name: "a".to_string(),
            value: Expr::Symbol(crate::ast::SymbolExpr {
                reference: Reference::bound("a", SymbolTarget::Let(OperationId(0), 0)),
            }),
            span: Span::default(),
        });
        model.operations.push(op);

        let expr = Expr::Symbol(crate::ast::SymbolExpr {
            reference: Reference::bound("a", SymbolTarget::Let(OperationId(0), 0)),
        });
        assert_eq!(infer_type(&model, &expr), None);
    }

    #[test]
    fn test_infer_is_referentially_transparent() {
        let model = inheritance_model();
        let expr = Expr::Construct(crate::ast::Construction {
            type_expr: Box::new(Expr::Symbol(crate::ast::SymbolExpr {
                reference: Reference::bound("Employee", SymbolTarget::Type(TypeId(1))),
            })),
            entries: Vec::new(),
        });
        assert_eq!(infer_type(&model, &expr), infer_type(&model, &expr));
    }

    #[test]
    fn test_attribute_typed_as_enumeration_is_unknown() {
        let mut model = inheritance_model();
        model.enums.push(EnumDecl::new("Status", &["Active", "Dormant"]));
        model.types[0].attributes.push(Attribute::new(
            "status",
            Reference::bound("Status", TypeTarget::Enumeration(EnumId(0))),
        ));

        let expr = Expr::Feature(crate::ast::FeatureAccess {
            receiver: Box::new(Expr::symbol("person")),
            feature: Reference::bound("status", attr(0, 1)),
            deep: false,
        });
        assert_eq!(infer_type(&model, &expr), None);
    }
}
