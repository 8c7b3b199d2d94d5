//! The AST node family and visitor contract (spec §3.2). Nodes live in a
//! `generational_arena::Arena<Node>` and are referred to by `NodeRef` (a
//! `Copy` arena index) rather than boxed recursively — the same shape the
//! teacher's abandoned prototype used in `nova_parser::ast::{Node, NodeRef}`,
//! chosen again here because it sidesteps the recursive-ownership pain a
//! `Box<Node>` sum tree would otherwise impose on a tree-walking evaluator
//! that needs to revisit nodes (closures capturing function bodies, for
//! example) without cloning them.

use js_token::Span;

pub type NodeRef = generational_arena::Index;

/// Owns every node produced while parsing one source text. A `Program` is
/// rooted by the `NodeRef` returned from the parser's entry point.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: generational_arena::Arena<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self { nodes: generational_arena::Arena::new() }
    }

    pub fn alloc(&mut self, node: Node) -> NodeRef {
        self.nodes.insert(node)
    }

    pub fn get(&self, r: NodeRef) -> &Node {
        &self.nodes[r]
    }

    pub fn get_mut(&mut self, r: NodeRef) -> &mut Node {
        &mut self.nodes[r]
    }

    pub fn span(&self, r: NodeRef) -> Span {
        self.get(r).span()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Init,
    Get,
    Set,
    Method,
    Spread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    NullishCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    UShr,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    BitAnd,
    BitOr,
    BitXor,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    NullishCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Function/method shape flags, shared by declarations, expressions and
/// class elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionFlags {
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: Option<NodeRef>,
    pub params: Vec<NodeRef>,
    /// Block statement, or for a concise arrow body, a single expression.
    pub body: NodeRef,
    pub is_concise_arrow_body: bool,
    pub flags: FunctionFlags,
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub key: NodeRef,
    pub value: Option<NodeRef>,
    pub computed: bool,
    pub is_static: bool,
    pub kind: PropertyKind,
    pub is_private: bool,
}

#[derive(Debug, Clone)]
pub struct TemplateQuasi {
    pub cooked: std::string::String,
    pub raw: std::string::String,
    pub tail: bool,
}

#[derive(Debug, Clone)]
pub enum Node {
    Program {
        span: Span,
        body: Vec<NodeRef>,
        is_module: bool,
    },

    // ---- Statements ----
    ExpressionStatement { span: Span, expression: NodeRef },
    BlockStatement { span: Span, body: Vec<NodeRef> },
    EmptyStatement { span: Span },
    DebuggerStatement { span: Span },
    VariableDeclaration { span: Span, kind: VarKind, declarations: Vec<NodeRef> },
    VariableDeclarator { span: Span, id: NodeRef, init: Option<NodeRef> },
    FunctionDeclaration { span: Span, function: Function },
    ClassDeclaration { span: Span, id: Option<NodeRef>, super_class: Option<NodeRef>, body: Vec<ClassMember> },
    ReturnStatement { span: Span, argument: Option<NodeRef> },
    IfStatement { span: Span, test: NodeRef, consequent: NodeRef, alternate: Option<NodeRef> },
    ForStatement { span: Span, init: Option<NodeRef>, test: Option<NodeRef>, update: Option<NodeRef>, body: NodeRef },
    ForInStatement { span: Span, left: NodeRef, right: NodeRef, body: NodeRef, is_for_of: bool, is_await: bool },
    WhileStatement { span: Span, test: NodeRef, body: NodeRef },
    DoWhileStatement { span: Span, body: NodeRef, test: NodeRef },
    SwitchStatement { span: Span, discriminant: NodeRef, cases: Vec<SwitchCase> },
    BreakStatement { span: Span, label: Option<std::string::String> },
    ContinueStatement { span: Span, label: Option<std::string::String> },
    LabeledStatement { span: Span, label: std::string::String, body: NodeRef },
    ThrowStatement { span: Span, argument: NodeRef },
    TryStatement { span: Span, block: NodeRef, handler: Option<CatchClause>, finalizer: Option<NodeRef> },
    WithStatement { span: Span, object: NodeRef, body: NodeRef },
    /// `using`/`await using` explicit resource management declarations.
    UsingDeclaration { span: Span, is_await: bool, declarations: Vec<NodeRef> },

    ImportDeclaration { span: Span, specifiers: Vec<ImportSpecifier>, source: std::string::String },
    ExportNamedDeclaration { span: Span, declaration: Option<NodeRef>, specifiers: Vec<(std::string::String, std::string::String)>, source: Option<std::string::String> },
    ExportDefaultDeclaration { span: Span, declaration: NodeRef },
    ExportAllDeclaration { span: Span, source: std::string::String, exported_as: Option<std::string::String> },

    // ---- Expressions ----
    Identifier { span: Span, name: std::string::String },
    PrivateIdentifier { span: Span, name: std::string::String },
    NumberLiteral { span: Span, value: f64 },
    BigIntLiteral { span: Span, digits: std::string::String },
    StringLiteral { span: Span, value: std::string::String },
    BooleanLiteral { span: Span, value: bool },
    NullLiteral { span: Span },
    RegexLiteral { span: Span, pattern: std::string::String, flags: std::string::String },
    TemplateLiteral { span: Span, quasis: Vec<TemplateQuasi>, expressions: Vec<NodeRef> },
    TaggedTemplateExpression { span: Span, tag: NodeRef, quasi: NodeRef },
    ArrayExpression { span: Span, elements: Vec<Option<NodeRef>> },
    ObjectExpression { span: Span, properties: Vec<ObjectProperty> },
    FunctionExpression { span: Span, function: Function },
    ClassExpression { span: Span, id: Option<NodeRef>, super_class: Option<NodeRef>, body: Vec<ClassMember> },
    UnaryExpression { span: Span, operator: UnaryOp, argument: NodeRef },
    UpdateExpression { span: Span, operator: UpdateOp, argument: NodeRef, prefix: bool },
    BinaryExpression { span: Span, operator: BinaryOp, left: NodeRef, right: NodeRef },
    LogicalExpression { span: Span, operator: LogicalOp, left: NodeRef, right: NodeRef },
    AssignmentExpression { span: Span, operator: AssignOp, left: NodeRef, right: NodeRef },
    ConditionalExpression { span: Span, test: NodeRef, consequent: NodeRef, alternate: NodeRef },
    CallExpression { span: Span, callee: NodeRef, arguments: Vec<NodeRef>, optional: bool },
    NewExpression { span: Span, callee: NodeRef, arguments: Vec<NodeRef> },
    MemberExpression { span: Span, object: NodeRef, property: NodeRef, computed: bool, optional: bool },
    SequenceExpression { span: Span, expressions: Vec<NodeRef> },
    ThisExpression { span: Span },
    SuperExpression { span: Span },
    SpreadElement { span: Span, argument: NodeRef },
    YieldExpression { span: Span, argument: Option<NodeRef>, delegate: bool },
    AwaitExpression { span: Span, argument: NodeRef },
    MetaProperty { span: Span, meta: std::string::String, property: std::string::String },

    // ---- Patterns ----
    ArrayPattern { span: Span, elements: Vec<Option<NodeRef>> },
    ObjectPattern { span: Span, properties: Vec<ObjectPatternProperty> },
    AssignmentPattern { span: Span, left: NodeRef, right: NodeRef },
    RestElement { span: Span, argument: NodeRef },
}

#[derive(Debug, Clone)]
pub struct ObjectProperty {
    pub key: NodeRef,
    pub value: NodeRef,
    pub computed: bool,
    pub shorthand: bool,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone)]
pub struct ObjectPatternProperty {
    pub key: NodeRef,
    pub value: NodeRef,
    pub computed: bool,
    pub shorthand: bool,
    pub is_rest: bool,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub test: Option<NodeRef>,
    pub consequent: Vec<NodeRef>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<NodeRef>,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    pub imported: Option<std::string::String>,
    pub local: std::string::String,
    pub is_namespace: bool,
    pub is_default: bool,
}

impl Node {
    pub fn span(&self) -> Span {
        use Node::*;
        match self {
            Program { span, .. }
            | ExpressionStatement { span, .. }
            | BlockStatement { span, .. }
            | EmptyStatement { span }
            | DebuggerStatement { span }
            | VariableDeclaration { span, .. }
            | VariableDeclarator { span, .. }
            | FunctionDeclaration { span, .. }
            | ClassDeclaration { span, .. }
            | ReturnStatement { span, .. }
            | IfStatement { span, .. }
            | ForStatement { span, .. }
            | ForInStatement { span, .. }
            | WhileStatement { span, .. }
            | DoWhileStatement { span, .. }
            | SwitchStatement { span, .. }
            | BreakStatement { span, .. }
            | ContinueStatement { span, .. }
            | LabeledStatement { span, .. }
            | ThrowStatement { span, .. }
            | TryStatement { span, .. }
            | WithStatement { span, .. }
            | UsingDeclaration { span, .. }
            | ImportDeclaration { span, .. }
            | ExportNamedDeclaration { span, .. }
            | ExportDefaultDeclaration { span, .. }
            | ExportAllDeclaration { span, .. }
            | Identifier { span, .. }
            | PrivateIdentifier { span, .. }
            | NumberLiteral { span, .. }
            | BigIntLiteral { span, .. }
            | StringLiteral { span, .. }
            | BooleanLiteral { span, .. }
            | NullLiteral { span }
            | RegexLiteral { span, .. }
            | TemplateLiteral { span, .. }
            | TaggedTemplateExpression { span, .. }
            | ArrayExpression { span, .. }
            | ObjectExpression { span, .. }
            | FunctionExpression { span, .. }
            | ClassExpression { span, .. }
            | UnaryExpression { span, .. }
            | UpdateExpression { span, .. }
            | BinaryExpression { span, .. }
            | LogicalExpression { span, .. }
            | AssignmentExpression { span, .. }
            | ConditionalExpression { span, .. }
            | CallExpression { span, .. }
            | NewExpression { span, .. }
            | MemberExpression { span, .. }
            | SequenceExpression { span, .. }
            | ThisExpression { span }
            | SuperExpression { span }
            | SpreadElement { span, .. }
            | YieldExpression { span, .. }
            | AwaitExpression { span, .. }
            | MetaProperty { span, .. }
            | ArrayPattern { span, .. }
            | ObjectPattern { span, .. }
            | AssignmentPattern { span, .. }
            | RestElement { span, .. } => *span,
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Node::Identifier { .. }
                | Node::ArrayPattern { .. }
                | Node::ObjectPattern { .. }
                | Node::AssignmentPattern { .. }
                | Node::RestElement { .. }
                | Node::MemberExpression { .. }
        )
    }
}

/// Walks the tree, calling back for every node. The evaluator and static
/// analyses (Early Errors, `var`/function hoisting) both ride this trait
/// rather than hand-rolling recursion at each call site, matching how the
/// prototype's `nova_parser::ast` module expected consumers to traverse it.
pub trait Visitor {
    fn visit(&mut self, ast: &Ast, node: NodeRef);

    fn visit_children(&mut self, ast: &Ast, node: NodeRef) {
        for child in children_of(ast, node) {
            self.visit(ast, child);
        }
    }
}

/// Direct children of a node, in evaluation order. Used by the default
/// visitor walk and by hoisting passes that only need one level at a time.
pub fn children_of(ast: &Ast, node: NodeRef) -> Vec<NodeRef> {
    use Node::*;
    match ast.get(node) {
        Program { body, .. } | BlockStatement { body, .. } => body.clone(),
        ExpressionStatement { expression, .. } => vec![*expression],
        VariableDeclaration { declarations, .. } => declarations.clone(),
        VariableDeclarator { id, init, .. } => {
            let mut v = vec![*id];
            v.extend(init.iter().copied());
            v
        }
        FunctionDeclaration { function, .. } | FunctionExpression { function, .. } => {
            let mut v = function.params.clone();
            v.push(function.body);
            if let Some(id) = function.id {
                v.push(id);
            }
            v
        }
        ClassDeclaration { id, super_class, body, .. } | ClassExpression { id, super_class, body, .. } => {
            let mut v: Vec<NodeRef> = id.iter().copied().chain(super_class.iter().copied()).collect();
            for m in body {
                v.push(m.key);
                if let Some(val) = m.value {
                    v.push(val);
                }
            }
            v
        }
        ReturnStatement { argument, .. } => argument.iter().copied().collect(),
        ThrowStatement { argument, .. } => vec![*argument],
        IfStatement { test, consequent, alternate, .. } => {
            let mut v = vec![*test, *consequent];
            v.extend(alternate.iter().copied());
            v
        }
        ForStatement { init, test, update, body, .. } => {
            [*init, *test, *update].into_iter().flatten().chain([*body]).collect()
        }
        ForInStatement { left, right, body, .. } => vec![*left, *right, *body],
        WhileStatement { test, body, .. } | DoWhileStatement { body, test, .. } => vec![*test, *body],
        SwitchStatement { discriminant, cases, .. } => {
            let mut v = vec![*discriminant];
            for c in cases {
                v.extend(c.test.iter().copied());
                v.extend(c.consequent.iter().copied());
            }
            v
        }
        LabeledStatement { body, .. } => vec![*body],
        TryStatement { block, handler, finalizer, .. } => {
            let mut v = vec![*block];
            if let Some(h) = handler {
                v.extend(h.param.iter().copied());
                v.push(h.body);
            }
            v.extend(finalizer.iter().copied());
            v
        }
        WithStatement { object, body, .. } => vec![*object, *body],
        UsingDeclaration { declarations, .. } => declarations.clone(),
        ExportNamedDeclaration { declaration, .. } => declaration.iter().copied().collect(),
        ExportDefaultDeclaration { declaration, .. } => vec![*declaration],
        TemplateLiteral { expressions, .. } => expressions.clone(),
        TaggedTemplateExpression { tag, quasi, .. } => vec![*tag, *quasi],
        ArrayExpression { elements, .. } | ArrayPattern { elements, .. } => elements.iter().flatten().copied().collect(),
        ObjectExpression { properties, .. } => {
            let mut v = Vec::new();
            for p in properties {
                v.push(p.key);
                v.push(p.value);
            }
            v
        }
        ObjectPattern { properties, .. } => {
            let mut v = Vec::new();
            for p in properties {
                v.push(p.key);
                v.push(p.value);
            }
            v
        }
        UnaryExpression { argument, .. } | SpreadElement { argument, .. } | RestElement { argument, .. } | AwaitExpression { argument, .. } => {
            vec![*argument]
        }
        UpdateExpression { argument, .. } => vec![*argument],
        BinaryExpression { left, right, .. } | LogicalExpression { left, right, .. } | AssignmentExpression { left, right, .. } | AssignmentPattern { left, right, .. } => {
            vec![*left, *right]
        }
        ConditionalExpression { test, consequent, alternate, .. } => vec![*test, *consequent, *alternate],
        CallExpression { callee, arguments, .. } | NewExpression { callee, arguments, .. } => {
            let mut v = vec![*callee];
            v.extend(arguments.iter().copied());
            v
        }
        MemberExpression { object, property, computed, .. } => {
            if *computed {
                vec![*object, *property]
            } else {
                vec![*object]
            }
        }
        SequenceExpression { expressions, .. } => expressions.clone(),
        YieldExpression { argument, .. } => argument.iter().copied().collect(),
        _ => Vec::new(),
    }
}

/// Reinterprets an already-parsed expression subtree as a binding/assignment
/// pattern, per the "parse as expression, then convert" technique spec §9
/// calls for (arrow parameter lists and destructuring assignment targets are
/// both ambiguous with plain expressions until a `=>` or `=` commits them).
/// Returns `None` when the expression shape has no valid pattern
/// interpretation (e.g. a bare numeric literal).
pub fn expression_to_pattern(ast: &mut Ast, expr: NodeRef) -> Option<NodeRef> {
    let converted = match ast.get(expr).clone() {
        Node::Identifier { .. } | Node::MemberExpression { .. } => return Some(expr),
        Node::ArrayExpression { span, elements } => {
            let mut pattern_elements = Vec::with_capacity(elements.len());
            for el in elements {
                let converted = match el {
                    None => None,
                    Some(e) => {
                        if let Node::SpreadElement { span, argument } = ast.get(e).clone() {
                            let inner = expression_to_pattern(ast, argument)?;
                            Some(ast.alloc(Node::RestElement { span, argument: inner }))
                        } else {
                            Some(expression_to_pattern(ast, e)?)
                        }
                    }
                };
                pattern_elements.push(converted);
            }
            Node::ArrayPattern { span, elements: pattern_elements }
        }
        Node::ObjectExpression { span, properties } => {
            let mut pattern_properties = Vec::with_capacity(properties.len());
            for p in properties {
                let (value, is_rest) = if let Node::SpreadElement { argument, .. } = ast.get(p.value).clone() {
                    (expression_to_pattern(ast, argument)?, true)
                } else {
                    (expression_to_pattern(ast, p.value)?, false)
                };
                pattern_properties.push(ObjectPatternProperty {
                    key: p.key,
                    value,
                    computed: p.computed,
                    shorthand: p.shorthand,
                    is_rest,
                });
            }
            Node::ObjectPattern { span, properties: pattern_properties }
        }
        Node::AssignmentExpression { span, operator: AssignOp::Assign, left, right } => {
            let left = expression_to_pattern(ast, left)?;
            Node::AssignmentPattern { span, left, right }
        }
        Node::AssignmentPattern { .. } | Node::ArrayPattern { .. } | Node::ObjectPattern { .. } | Node::RestElement { .. } => {
            return Some(expr);
        }
        _ => return None,
    };
    Some(ast.alloc(converted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use js_token::Span;

    fn dummy_span() -> Span {
        Span::new(0, 0, 1, 1)
    }

    #[test]
    fn array_expression_converts_to_pattern_with_rest() {
        let mut ast = Ast::new();
        let a = ast.alloc(Node::Identifier { span: dummy_span(), name: "a".into() });
        let b = ast.alloc(Node::Identifier { span: dummy_span(), name: "b".into() });
        let rest = ast.alloc(Node::SpreadElement { span: dummy_span(), argument: b });
        let arr = ast.alloc(Node::ArrayExpression { span: dummy_span(), elements: vec![Some(a), Some(rest)] });

        let pattern = expression_to_pattern(&mut ast, arr).unwrap();
        match ast.get(pattern) {
            Node::ArrayPattern { elements, .. } => {
                assert_eq!(elements.len(), 2);
                assert!(matches!(ast.get(elements[1].unwrap()), Node::RestElement { .. }));
            }
            other => panic!("expected ArrayPattern, got {other:?}"),
        }
    }

    #[test]
    fn numeric_literal_has_no_pattern_form() {
        let mut ast = Ast::new();
        let n = ast.alloc(Node::NumberLiteral { span: dummy_span(), value: 1.0 });
        assert!(expression_to_pattern(&mut ast, n).is_none());
    }

    #[test]
    fn children_of_if_statement_includes_branches() {
        let mut ast = Ast::new();
        let test = ast.alloc(Node::BooleanLiteral { span: dummy_span(), value: true });
        let cons = ast.alloc(Node::EmptyStatement { span: dummy_span() });
        let alt = ast.alloc(Node::EmptyStatement { span: dummy_span() });
        let stmt = ast.alloc(Node::IfStatement { span: dummy_span(), test, consequent: cons, alternate: Some(alt) });
        assert_eq!(children_of(&ast, stmt), vec![test, cons, alt]);
    }
}
