use lqt_graph::hir::{Body, DeclId, DeclKind, ExprId, ExprKind, FrontEnd, Res};
use rustc_hash::FxHashSet;

/// Declarations ordered so that everything a declaration refers to comes before it. Mutually
/// recursive declarations are ordered by first visit.
pub(crate) fn callees_first(fe: &impl FrontEnd) -> Vec<DeclId> {
    let mut visited = FxHashSet::default();
    let mut order = vec![];
    for decl in fe.decls() {
        visit(fe, decl, &mut visited, &mut order);
    }
    order
}

fn visit(
    fe: &impl FrontEnd,
    decl: DeclId,
    visited: &mut FxHashSet<DeclId>,
    order: &mut Vec<DeclId>,
) {
    if !visited.insert(decl) {
        return;
    }
    for callee in referenced_decls(fe, decl) {
        visit(fe, callee, visited, order);
    }
    order.push(decl);
}

fn referenced_decls(fe: &impl FrontEnd, decl: DeclId) -> Vec<DeclId> {
    let Some(d) = fe.decl(decl) else { return vec![] };
    let root = match &d.kind {
        DeclKind::Fun(f) => {
            match f.body {
                Body::Expr(e) | Body::Block(e) => e,
            }
        }
        DeclKind::Val(v) => v.init,
    };
    let mut out = vec![];
    let mut stack = vec![root];
    let mut seen = FxHashSet::default();
    while let Some(expr) = stack.pop() {
        if !seen.insert(expr) {
            continue;
        }
        let Some(kind) = fe.expr_kind(expr) else { continue };
        match kind {
            ExprKind::Name { .. } => {
                if let Some(Res::Decl(target)) = fe.resolve_name(expr) {
                    out.push(target);
                }
            }
            ExprKind::Call { .. } => out.extend(fe.resolve_call(expr)),
            _ => {}
        }
        stack.extend(children(kind));
    }
    out
}

fn children(kind: &ExprKind) -> Vec<ExprId> {
    match kind {
        ExprKind::Lit(_) | ExprKind::Name { .. } => vec![],
        ExprKind::Unary { operand, .. } => vec![*operand],
        ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        ExprKind::If { cond, then, els } => {
            [Some(*cond), Some(*then), *els].into_iter().flatten().collect()
        }
        ExprKind::Call { receiver, args, .. } => receiver.iter().chain(args).copied().collect(),
        ExprKind::Block(exprs) => exprs.clone(),
        ExprKind::Field { base, .. } => vec![*base],
        ExprKind::Index { base, index } => vec![*base, *index],
    }
}
