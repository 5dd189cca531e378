//! The typed expression tree handed over by the front end.
//!
//! Expressions and declarations live in flat tables and refer to each other by index, which keeps
//! a [`Program`] trivially (de)serializable.
use lqt_term as term;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclId(pub u32);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Program {
    pub exprs: Vec<Expr>,
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    /// `None` when the front end could not type the expression.
    #[serde(default)]
    pub ty: Option<Ty>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Lit(Lit),
    Unary { op: UnOp, operand: ExprId },
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    Name { ident: String, res: Option<Res> },
    If { cond: ExprId, then: ExprId, els: Option<ExprId> },
    Call { callee: String, res: Option<DeclId>, receiver: Option<ExprId>, args: Vec<ExprId> },
    Block(Vec<ExprId>),
    Field { base: ExprId, field: String },
    Index { base: ExprId, index: ExprId },
}

impl ExprKind {
    pub fn descr(&self) -> &'static str {
        match self {
            ExprKind::Lit(_) => "literal",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Name { .. } => "name",
            ExprKind::If { .. } => "conditional",
            ExprKind::Call { .. } => "call",
            ExprKind::Block(_) => "block",
            ExprKind::Field { .. } => "field access",
            ExprKind::Index { .. } => "index access",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lit {
    Int(i64),
    Bool(bool),
    Str(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl UnOp {
    pub fn lower(self) -> term::UnOp {
        match self {
            UnOp::Not => term::UnOp::Not,
            UnOp::Neg => term::UnOp::Neg,
        }
    }
}

impl BinOp {
    pub fn lower(self) -> term::BinOp {
        match self {
            BinOp::Add => term::BinOp::Add,
            BinOp::Sub => term::BinOp::Sub,
            BinOp::Mul => term::BinOp::Mul,
            BinOp::Div => term::BinOp::Div,
            BinOp::Mod => term::BinOp::Mod,
            BinOp::Eq => term::BinOp::Eq,
            BinOp::Ne => term::BinOp::Ne,
            BinOp::Lt => term::BinOp::Lt,
            BinOp::Le => term::BinOp::Le,
            BinOp::Gt => term::BinOp::Gt,
            BinOp::Ge => term::BinOp::Ge,
            BinOp::And => term::BinOp::And,
            BinOp::Or => term::BinOp::Or,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ty {
    Int,
    Bool,
    Str,
    Unit,
    Named(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverKind {
    Dispatch,
    Extension,
}

/// What a name resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Res {
    /// The `idx`-th parameter of a function.
    Param(DeclId, usize),
    Receiver(DeclId, ReceiverKind),
    Decl(DeclId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Fun(FnDecl),
    Val(ValDecl),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FnDecl {
    pub params: Vec<Param>,
    #[serde(default)]
    pub dispatch_receiver: Option<Param>,
    #[serde(default)]
    pub extension_receiver: Option<Param>,
    pub ret_ty: Ty,
    /// Refinement of the result, `it` denoting the returned value.
    #[serde(default)]
    pub ret_annot: Option<String>,
    pub body: Body,
}

impl FnDecl {
    pub fn receiver(&self, kind: ReceiverKind) -> Option<&Param> {
        match kind {
            ReceiverKind::Dispatch => self.dispatch_receiver.as_ref(),
            ReceiverKind::Extension => self.extension_receiver.as_ref(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    /// Refinement of the parameter, `it` denoting its value.
    #[serde(default)]
    pub annot: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Expr(ExprId),
    Block(ExprId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValDecl {
    pub ty: Ty,
    pub init: ExprId,
    #[serde(default)]
    pub annot: Option<String>,
}

/// The queries the graph builder needs from the front end.
pub trait FrontEnd {
    fn expr_kind(&self, expr: ExprId) -> Option<&ExprKind>;

    fn expr_ty(&self, expr: ExprId) -> Option<&Ty>;

    fn resolve_name(&self, expr: ExprId) -> Option<Res>;

    fn resolve_call(&self, expr: ExprId) -> Option<DeclId>;

    fn decl(&self, decl: DeclId) -> Option<&Decl>;

    fn decls(&self) -> impl Iterator<Item = DeclId>;
}

impl FrontEnd for Program {
    fn expr_kind(&self, expr: ExprId) -> Option<&ExprKind> {
        self.exprs.get(expr.0 as usize).map(|e| &e.kind)
    }

    fn expr_ty(&self, expr: ExprId) -> Option<&Ty> {
        self.exprs.get(expr.0 as usize)?.ty.as_ref()
    }

    fn resolve_name(&self, expr: ExprId) -> Option<Res> {
        match self.expr_kind(expr)? {
            ExprKind::Name { res, .. } => *res,
            _ => None,
        }
    }

    fn resolve_call(&self, expr: ExprId) -> Option<DeclId> {
        match self.expr_kind(expr)? {
            ExprKind::Call { res, .. } => *res,
            _ => None,
        }
    }

    fn decl(&self, decl: DeclId) -> Option<&Decl> {
        self.decls.get(decl.0 as usize)
    }

    fn decls(&self) -> impl Iterator<Item = DeclId> {
        (0..self.decls.len()).map(|i| DeclId(i as u32))
    }
}

/// Incremental construction of a [`Program`], mostly for tests and embedders.
impl Program {
    pub fn expr(&mut self, kind: ExprKind, ty: Ty) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, ty: Some(ty) });
        id
    }

    pub fn int(&mut self, n: i64) -> ExprId {
        self.expr(ExprKind::Lit(Lit::Int(n)), Ty::Int)
    }

    pub fn name(&mut self, ident: &str, res: Res, ty: Ty) -> ExprId {
        self.expr(ExprKind::Name { ident: ident.to_string(), res: Some(res) }, ty)
    }

    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId, ty: Ty) -> ExprId {
        self.expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn call(&mut self, callee: &str, res: DeclId, args: Vec<ExprId>, ty: Ty) -> ExprId {
        let kind = ExprKind::Call { callee: callee.to_string(), res: Some(res), receiver: None, args };
        self.expr(kind, ty)
    }

    /// Id the next pushed declaration will get, for building recursive references.
    pub fn next_decl_id(&self) -> DeclId {
        DeclId(self.decls.len() as u32)
    }

    pub fn push_decl(&mut self, name: &str, kind: DeclKind) -> DeclId {
        let id = self.next_decl_id();
        self.decls.push(Decl { name: name.to_string(), kind });
        id
    }
}

impl Param {
    pub fn new(name: &str, ty: Ty) -> Self {
        Param { name: name.to_string(), ty, annot: None }
    }

    pub fn annotated(name: &str, ty: Ty, annot: &str) -> Self {
        Param { name: name.to_string(), ty, annot: Some(annot.to_string()) }
    }
}
