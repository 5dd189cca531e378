//! Bottom-up construction of liquid types.
//!
//! Operands are analyzed before the expression using them, and every node is memoized by its
//! [`Source`], so asking twice for the same expression returns the same node.
use itertools::Itertools;
use lqt_common::bug;
use lqt_term::{Term, UnOp};
use tracing::{debug, trace};

use crate::{
    AnalysisSession, LowerError, LowerResult, NodeId,
    annot::lower_annotation,
    hir::{
        Body, DeclId, DeclKind, ExprId, ExprKind, FnDecl, FrontEnd, Lit, ReceiverKind, Res, Ty,
        ValDecl,
    },
    liquid::{CallData, FunctionData, LiquidKind, LiquidType, PredSlot, Source},
};

impl AnalysisSession {
    pub fn build_decl(&mut self, fe: &impl FrontEnd, decl: DeclId) -> LowerResult {
        let Some(d) = fe.decl(decl) else {
            return Err(LowerError::MissingResolution(format!("declaration {decl:?}")));
        };
        match &d.kind {
            DeclKind::Fun(_) => self.build_fn(fe, decl),
            DeclKind::Val(_) => self.build_val(fe, decl),
        }
    }

    /// Returns the node of function `decl`, analyzing it if needed. While the body is being
    /// analyzed the returned node is an in-progress placeholder without return value or predicate.
    pub fn build_fn(&mut self, fe: &impl FrontEnd, decl: DeclId) -> LowerResult {
        if let Some(err) = self.failed.get(&decl) {
            return Err(err.clone());
        }
        if let Some(node) = self.graph.lookup(Source::Decl(decl)) {
            return Ok(node);
        }
        let d = fe
            .decl(decl)
            .ok_or_else(|| LowerError::MissingResolution(format!("declaration {decl:?}")))?;
        let DeclKind::Fun(fn_decl) = &d.kind else {
            return Err(LowerError::Unsupported(format!("call to non-function `{}`", d.name)));
        };
        debug!(name = %d.name, "build_fn");
        let node = self.build_fn_shell(decl, &d.name, fn_decl);
        self.in_progress.insert(node);
        let result = self.build_fn_body(fe, node, fn_decl);
        self.in_progress.remove(&node);
        match result {
            Ok(()) => Ok(node),
            Err(err) => {
                self.failed.insert(decl, err.clone());
                Err(err)
            }
        }
    }

    /// Creates the parameter, receiver and function nodes.
    fn build_fn_shell(&mut self, decl: DeclId, name: &str, fn_decl: &FnDecl) -> NodeId {
        let mut params = vec![];
        for (idx, param) in fn_decl.params.iter().enumerate() {
            params.push(self.new_value(Source::Param(decl, idx), &param.name, param.ty.clone()));
        }
        let mut receiver = |kind: ReceiverKind| {
            fn_decl
                .receiver(kind)
                .map(|p| self.new_value(Source::Receiver(decl, kind), &p.name, p.ty.clone()))
        };
        let dispatch_receiver = receiver(ReceiverKind::Dispatch);
        let extension_receiver = receiver(ReceiverKind::Extension);

        let var = self.fresh_var(name);
        let data = FunctionData {
            decl,
            name: name.to_string(),
            param_names: fn_decl.params.iter().map(|p| p.name.clone()).collect(),
            params,
            dispatch_receiver,
            extension_receiver,
            ret: None,
            pred: PredSlot::default(),
        };
        self.graph.insert(LiquidType {
            var,
            source: Source::Decl(decl),
            ty: fn_decl.ret_ty.clone(),
            kind: LiquidKind::Function(data),
            depends_on: vec![],
            declared: None,
        })
    }

    fn build_fn_body(
        &mut self,
        fe: &impl FrontEnd,
        node: NodeId,
        fn_decl: &FnDecl,
    ) -> LowerResult<()> {
        self.lower_fn_annotations(node, fn_decl)?;
        let body = match fn_decl.body {
            Body::Expr(expr) => self.build_expr(fe, expr)?,
            Body::Block(_) => return Err(LowerError::Unsupported("block-bodied function".into())),
        };
        let data = self.graph[node].expect_function();
        let mut depends_on = data.params.clone();
        depends_on.extend(data.dispatch_receiver);
        depends_on.extend(data.extension_receiver);
        depends_on.push(body);
        let pred = Term::eq(Term::var(&self.graph[node].var), Term::var(&self.graph[body].var));

        let node = self.graph.node_mut(node);
        node.depends_on = depends_on;
        let LiquidKind::Function(data) = &mut node.kind else { bug!() };
        data.ret = Some(body);
        data.pred.set(&node.var, pred);
        Ok(())
    }

    /// Parameter annotations may mention the other parameters and receivers; the result
    /// annotation may mention all of them too.
    fn lower_fn_annotations(&mut self, node: NodeId, fn_decl: &FnDecl) -> LowerResult<()> {
        let data = self.graph[node].expect_function();
        let mut scope = vec![];
        for (param, &id) in fn_decl.params.iter().zip(&data.params) {
            scope.push((param.name.clone(), id));
        }
        for (param, id) in [
            (&fn_decl.dispatch_receiver, data.dispatch_receiver),
            (&fn_decl.extension_receiver, data.extension_receiver),
        ] {
            if let (Some(param), Some(id)) = (param, id) {
                scope.push((param.name.clone(), id));
            }
        }
        let resolve = |x: &str| {
            scope
                .iter()
                .find(|(name, _)| name == x)
                .map(|(_, id)| self.graph[*id].var.clone())
        };

        let mut declared = vec![];
        for (name, id) in &scope {
            let param = fn_decl
                .params
                .iter()
                .chain(&fn_decl.dispatch_receiver)
                .chain(&fn_decl.extension_receiver)
                .find(|p| p.name == *name);
            if let Some(annot) = param.and_then(|p| p.annot.as_deref()) {
                declared.push((*id, lower_annotation(annot, &self.graph[*id].var, resolve)?));
            }
        }
        if let Some(annot) = &fn_decl.ret_annot {
            declared.push((node, lower_annotation(annot, &self.graph[node].var, resolve)?));
        }
        for (id, term) in declared {
            trace!(var = %self.graph[id].var, %term, "declared refinement");
            self.graph.node_mut(id).declared = Some(term);
        }
        Ok(())
    }

    pub fn build_val(&mut self, fe: &impl FrontEnd, decl: DeclId) -> LowerResult {
        if let Some(err) = self.failed.get(&decl) {
            return Err(err.clone());
        }
        if let Some(node) = self.graph.lookup(Source::Decl(decl)) {
            return Ok(node);
        }
        let d = fe
            .decl(decl)
            .ok_or_else(|| LowerError::MissingResolution(format!("declaration {decl:?}")))?;
        let DeclKind::Val(val) = &d.kind else {
            return Err(LowerError::Unsupported(format!("`{}` is not a value", d.name)));
        };
        if !self.active_vals.insert(decl) {
            return Err(LowerError::Unsupported(format!("cyclic initializer of `{}`", d.name)));
        }
        let result = self.build_val_inner(fe, decl, &d.name, val);
        self.active_vals.remove(&decl);
        if let Err(err) = &result {
            self.failed.insert(decl, err.clone());
        }
        result
    }

    fn build_val_inner(
        &mut self,
        fe: &impl FrontEnd,
        decl: DeclId,
        name: &str,
        val: &ValDecl,
    ) -> LowerResult {
        let init = self.build_expr(fe, val.init)?;
        let var = self.fresh_var(name);
        let declared = match &val.annot {
            Some(annot) => Some(lower_annotation(annot, &var, |_| None)?),
            None => None,
        };
        let pred = Term::eq(Term::var(&var), Term::var(&self.graph[init].var));
        Ok(self.graph.insert(LiquidType {
            var,
            source: Source::Decl(decl),
            ty: val.ty.clone(),
            kind: LiquidKind::Value(PredSlot::filled(Some(pred))),
            depends_on: vec![init],
            declared,
        }))
    }

    pub fn build_expr(&mut self, fe: &impl FrontEnd, expr: ExprId) -> LowerResult {
        if let Some(node) = self.graph.lookup(Source::Expr(expr)) {
            return Ok(node);
        }
        let kind = fe
            .expr_kind(expr)
            .ok_or_else(|| LowerError::MissingResolution(format!("expression {expr:?}")))?;
        let ty = fe
            .expr_ty(expr)
            .cloned()
            .ok_or_else(|| LowerError::MissingResolution(format!("type of {}", kind.descr())))?;

        let (hint, value, deps): (String, Option<Term>, Vec<NodeId>) = match kind {
            ExprKind::Lit(lit) => {
                let c = match lit {
                    Lit::Int(n) => Term::int(*n),
                    Lit::Bool(b) => Term::bool(*b),
                    Lit::Str(s) => Term::str(s.clone()),
                };
                ("lit".into(), Some(c), vec![])
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.build_expr(fe, *operand)?;
                let value = Term::unary(op.lower(), self.var_of(operand));
                let hint = if op.lower() == UnOp::Not { "not" } else { "neg" };
                (hint.into(), Some(value), vec![operand])
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.build_expr(fe, *lhs)?;
                let rhs = self.build_expr(fe, *rhs)?;
                let value = Term::binary(op.lower(), self.var_of(lhs), self.var_of(rhs));
                ("bin".into(), Some(value), vec![lhs, rhs])
            }
            ExprKind::Name { ident, .. } => {
                let res = fe
                    .resolve_name(expr)
                    .ok_or_else(|| LowerError::MissingResolution(format!("name `{ident}`")))?;
                let target = self.resolve(fe, res, ident)?;
                if self.is_in_progress(target) {
                    // a function mentioned inside its own body
                    (ident.clone(), None, vec![])
                } else {
                    (ident.clone(), Some(self.var_of(target)), vec![target])
                }
            }
            ExprKind::If { cond, then, els } => {
                let Some(els) = els else {
                    return Err(LowerError::Unsupported("conditional without `else`".into()));
                };
                let cond = self.build_expr(fe, *cond)?;
                let then = self.build_expr(fe, *then)?;
                let els = self.build_expr(fe, *els)?;
                let value = Term::ite(self.var_of(cond), self.var_of(then), self.var_of(els));
                ("ite".into(), Some(value), vec![cond, then, els])
            }
            ExprKind::Call { callee, receiver, args, .. } => {
                return self.build_call(fe, expr, ty, callee, *receiver, args);
            }
            ExprKind::Block(_) | ExprKind::Field { .. } | ExprKind::Index { .. } => {
                return Err(LowerError::Unsupported(kind.descr().to_string()));
            }
        };

        let var = self.fresh_var(&hint);
        let pred = value.map(|value| Term::eq(Term::var(&var), value));
        let node = LiquidType {
            var,
            source: Source::Expr(expr),
            ty,
            kind: LiquidKind::Value(PredSlot::filled(pred)),
            depends_on: deps,
            declared: None,
        };
        let id = self.graph.insert(node);
        trace!(var = %self.graph[id].var, pred = ?self.graph[id].pred().map(ToString::to_string));
        Ok(id)
    }

    fn build_call(
        &mut self,
        fe: &impl FrontEnd,
        expr: ExprId,
        ty: Ty,
        callee_name: &str,
        receiver: Option<ExprId>,
        args: &[ExprId],
    ) -> LowerResult {
        let decl = fe
            .resolve_call(expr)
            .ok_or_else(|| LowerError::MissingResolution(format!("call to `{callee_name}`")))?;
        let receiver = receiver.map(|r| self.build_expr(fe, r)).transpose()?;
        let args: Vec<NodeId> = args.iter().map(|&a| self.build_expr(fe, a)).try_collect()?;
        let callee = self.build_fn(fe, decl)?;

        let data = self.graph[callee].expect_function();
        if data.params.len() != args.len() {
            return Err(LowerError::Unsupported(format!(
                "call to `{callee_name}` with {} arguments, expected {}",
                args.len(),
                data.params.len()
            )));
        }
        if receiver.is_some() && data.call_receiver().is_none() {
            return Err(LowerError::Unsupported(format!("`{callee_name}` takes no receiver")));
        }
        let ret = data.ret;

        let var = self.fresh_var(callee_name);
        let mut depends_on = vec![];
        let pred = if self.is_in_progress(callee) {
            debug!(callee = callee_name, "recursive call");
            None
        } else {
            let ret = ret.unwrap_or_else(|| bug!("`{callee_name}` has no return node"));
            depends_on.push(callee);
            Some(Term::eq(Term::var(&var), self.var_of(ret)))
        };
        depends_on.extend(receiver);
        depends_on.extend(args.iter().copied());

        Ok(self.graph.insert(LiquidType {
            var,
            source: Source::Expr(expr),
            ty,
            kind: LiquidKind::Call(CallData::new(callee, args, receiver, pred)),
            depends_on,
            declared: None,
        }))
    }

    fn resolve(&mut self, fe: &impl FrontEnd, res: Res, ident: &str) -> LowerResult {
        let missing = || LowerError::MissingResolution(format!("name `{ident}`"));
        match res {
            Res::Param(decl, idx) => {
                let function = self.build_fn(fe, decl)?;
                self.graph[function].expect_function().params.get(idx).copied().ok_or_else(missing)
            }
            Res::Receiver(decl, kind) => {
                let function = self.build_fn(fe, decl)?;
                self.graph[function].expect_function().receiver(kind).ok_or_else(missing)
            }
            Res::Decl(decl) => self.build_decl(fe, decl),
        }
    }

    fn new_value(&mut self, source: Source, hint: &str, ty: Ty) -> NodeId {
        let var = self.fresh_var(hint);
        self.graph.insert(LiquidType {
            var,
            source,
            ty,
            kind: LiquidKind::Value(PredSlot::default()),
            depends_on: vec![],
            declared: None,
        })
    }

    fn var_of(&self, node: NodeId) -> Term {
        Term::var(&self.graph[node].var)
    }
}
