//! Syntax tree. Operators are already desugared into method sends by the parser.
use crate::compiler::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Nil,
    True,
    False,
    Name(String),
    /// `callee(args)`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `receiver.selector(args)`, also every binary operator
    Send {
        receiver: Box<Expr>,
        selector: String,
        args: Vec<Expr>,
    },
    /// `object.name` without an argument list
    Attribute { object: Box<Expr>, name: String },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Left hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Attribute { object: Expr, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub super_class: Option<Expr>,
    pub attributes: Vec<String>,
    pub methods: Vec<FuncDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign { target: Target, value: Expr },
    Func(FuncDecl),
    Class(ClassDecl),
    If {
        /// `if` and every `elif`, in order
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Vec<Stmt>,
    },
    While { condition: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
}

impl StmtKind {
    /// Name this statement binds in its scope, if any.
    pub fn binds(&self) -> Option<&str> {
        match self {
            StmtKind::Assign {
                target: Target::Name(name),
                ..
            } => Some(name),
            StmtKind::Func(func) => Some(&func.name),
            StmtKind::Class(class) => Some(&class.name),
            _ => None,
        }
    }
}
