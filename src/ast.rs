// Abstract Syntax Tree definitions

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `def name(a, b) = expr`
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Expression,
    },
    /// `name = expr`, scoped to the running unit
    Assignment { name: String, value: Expression },
    /// `Name = expr`, visible to every later unit
    ConstantDef { name: String, value: Expression },
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Double-quoted string containing `#{...}`
    Interpolated(Vec<StringPart>),
    List(Vec<Expression>),
    SelfRef,
    /// A bare name: local variable, user function or method on `self`
    Identifier(String),
    Constant(String),
    Call {
        receiver: Option<Box<Expression>>,
        method: String,
        args: Vec<Expression>,
        block: Option<Block>,
    },
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        branches: Vec<(Expression, Vec<Statement>)>,
        otherwise: Option<Vec<Statement>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Code(Expression),
}

/// A `{ |params| body }` block passed to a method call
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// The operator as written in source, used in error messages
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}
