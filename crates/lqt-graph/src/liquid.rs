use std::collections::VecDeque;

use lqt_common::{
    bug,
    index::{Idx, IndexVec},
    newtype_index,
};
use lqt_term::{Name, Term};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::hir::{DeclId, ExprId, ReceiverKind, Ty};

newtype_index! {
    /// Index of a [`LiquidType`] in a [`LiquidGraph`].
    pub struct NodeId;
}

/// The source construct a node stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    Expr(ExprId),
    Decl(DeclId),
    Param(DeclId, usize),
    Receiver(DeclId, ReceiverKind),
}

/// A symbolic value: a fresh variable, its logical type and a predicate relating the variable to
/// the variables of the nodes it depends on.
#[derive(Debug)]
pub struct LiquidType {
    pub var: Name,
    pub source: Source,
    pub ty: Ty,
    pub kind: LiquidKind,
    pub depends_on: Vec<NodeId>,
    /// Refinement declared by an annotation, over [`Self::var`].
    pub declared: Option<Term>,
}

#[derive(Debug)]
pub enum LiquidKind {
    Value(PredSlot),
    Function(FunctionData),
    Call(CallData),
}

/// A predicate that can be written once.
#[derive(Debug, Default)]
pub struct PredSlot(Option<Term>);

impl PredSlot {
    pub(crate) fn filled(pred: Option<Term>) -> Self {
        PredSlot(pred)
    }

    pub fn get(&self) -> Option<&Term> {
        self.0.as_ref()
    }

    pub(crate) fn set(&mut self, var: &str, pred: Term) {
        if let Some(old) = &self.0 {
            bug!("predicate of `{var}` written twice: `{old}` then `{pred}`");
        }
        self.0 = Some(pred);
    }
}

#[derive(Debug)]
pub struct FunctionData {
    pub decl: DeclId,
    /// Source names of the function and its parameters, for reporting.
    pub name: Name,
    pub param_names: Vec<Name>,
    pub params: Vec<NodeId>,
    pub dispatch_receiver: Option<NodeId>,
    pub extension_receiver: Option<NodeId>,
    /// The body node, known once the body has been analyzed.
    pub ret: Option<NodeId>,
    pub(crate) pred: PredSlot,
}

impl FunctionData {
    pub fn receiver(&self, kind: ReceiverKind) -> Option<NodeId> {
        match kind {
            ReceiverKind::Dispatch => self.dispatch_receiver,
            ReceiverKind::Extension => self.extension_receiver,
        }
    }

    /// The receiver a call's `a.f()` binds to: the extension receiver if present.
    pub fn call_receiver(&self) -> Option<NodeId> {
        self.extension_receiver.or(self.dispatch_receiver)
    }
}

/// A call site. The predicate is fixed at construction and has no setter.
#[derive(Debug)]
pub struct CallData {
    pub callee: NodeId,
    pub args: Vec<NodeId>,
    pub receiver: Option<NodeId>,
    /// The callee was still being analyzed when the call was reached.
    pub recursive: bool,
    pred: Option<Term>,
}

impl CallData {
    pub(crate) fn new(
        callee: NodeId,
        args: Vec<NodeId>,
        receiver: Option<NodeId>,
        pred: Option<Term>,
    ) -> Self {
        CallData { callee, args, receiver, recursive: pred.is_none(), pred }
    }
}

impl LiquidType {
    /// `None` means the node is unconstrained.
    pub fn pred(&self) -> Option<&Term> {
        match &self.kind {
            LiquidKind::Value(slot) => slot.get(),
            LiquidKind::Function(data) => data.pred.get(),
            LiquidKind::Call(data) => data.pred.as_ref(),
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        if let LiquidKind::Function(data) = &self.kind { Some(data) } else { None }
    }

    pub fn as_call(&self) -> Option<&CallData> {
        if let LiquidKind::Call(data) = &self.kind { Some(data) } else { None }
    }

    pub fn expect_function(&self) -> &FunctionData {
        self.as_function()
            .unwrap_or_else(|| bug!("`{}` is not a function node", self.var))
    }
}

/// Arena of every node created during one analysis run.
#[derive(Default)]
pub struct LiquidGraph {
    nodes: IndexVec<NodeId, LiquidType>,
    by_source: FxHashMap<Source, NodeId>,
}

impl LiquidGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lookup(&self, source: Source) -> Option<NodeId> {
        self.by_source.get(&source).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &LiquidType)> {
        self.nodes.iter_enumerated()
    }

    pub(crate) fn insert(&mut self, node: LiquidType) -> NodeId {
        let source = node.source;
        let id = self.nodes.push(node);
        if self.by_source.insert(source, id).is_some() {
            bug!("two nodes for {source:?}");
        }
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut LiquidType {
        &mut self.nodes[id]
    }

    /// `node` followed by everything it transitively depends on, in breadth-first order.
    pub fn dependency_closure(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        let mut order = vec![];
        let mut queue = VecDeque::from([node]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            queue.extend(self[id].depends_on.iter().copied());
        }
        order
    }

    /// Checks that no node depends on itself. Returns a node on a cycle otherwise.
    pub fn check_acyclic(&self) -> Result<(), NodeId> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }
        let mut marks = vec![Mark::Unvisited; self.len()];
        for (root, _) in self.nodes() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            // iterative DFS: (node, index of the next dependency to visit)
            let mut stack = vec![(root, 0)];
            marks[root.index()] = Mark::Active;
            while let Some((id, next)) = stack.pop() {
                let deps = &self[id].depends_on;
                if let Some(&dep) = deps.get(next) {
                    stack.push((id, next + 1));
                    match marks[dep.index()] {
                        Mark::Active => return Err(dep),
                        Mark::Unvisited => {
                            marks[dep.index()] = Mark::Active;
                            stack.push((dep, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[id.index()] = Mark::Done;
                }
            }
        }
        Ok(())
    }

    /// Call nodes whose callee is `function`.
    pub fn call_sites_of(&self, function: NodeId) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.as_call().is_some_and(|call| call.callee == function))
            .map(|(id, _)| id)
            .collect()
    }
}

impl std::ops::Index<NodeId> for LiquidGraph {
    type Output = LiquidType;

    fn index(&self, id: NodeId) -> &LiquidType {
        &self.nodes[id]
    }
}
