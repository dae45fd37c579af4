// Recursive-descent parser producing an arena-allocated AST
//
// Grammar (lowest to highest precedence):
//   expr    := term (('+' | '-') term)*
//   term    := factor (('*' | '/' | '%') factor)*
//   factor  := ('+' | '-') factor | power
//   power   := primary ('**' factor)?
//   primary := NUMBER | '(' expr ')' | FUNC '(' args ')'
//   args    := arg (',' arg)* | <empty>
//   arg     := expr | '[' (expr (',' expr)*)? ']'

use super::lexer::{Lexer, Token};
use super::EvalError;

/// Index of a node in its `Ast` arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

/// The only callable names an expression may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Max,
    Min,
    Round,
    Sum,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Function::Abs),
            "max" => Some(Function::Max),
            "min" => Some(Function::Min),
            "round" => Some(Function::Round),
            "sum" => Some(Function::Sum),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Max => "max",
            Function::Min => "min",
            Function::Round => "round",
            Function::Sum => "sum",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Int(i64),
    Float(f64),
    List(Vec<NodeId>),
    Unary { op: UnaryOp, operand: NodeId },
    Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
    Call { function: Function, args: Vec<NodeId> },
}

/// Parsed expression; nodes live in a flat arena and refer to each other by index
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Ast {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub(crate) struct Parser {
    lexer: Lexer,
    current: Token,
    position: usize,
    nodes: Vec<Node>,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub(crate) fn new(src: &str, max_depth: usize) -> Self {
        Self {
            lexer: Lexer::new(src),
            current: Token::Eof,
            position: 0,
            nodes: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Ast, EvalError> {
        self.advance()?;
        if self.current == Token::Eof {
            return Err(EvalError::syntax(0, "empty expression"));
        }

        let root = self.expr()?;
        if self.current != Token::Eof {
            return Err(self.unexpected());
        }

        Ok(Ast {
            nodes: self.nodes,
            root,
        })
    }

    fn advance(&mut self) -> Result<(), EvalError> {
        let (token, position) = self.lexer.next_token()?;
        self.current = token;
        self.position = position;
        Ok(())
    }

    fn expect(&mut self, token: Token) -> Result<(), EvalError> {
        if self.current != token {
            return Err(EvalError::syntax(
                self.position,
                format!("expected {}, found {}", token.describe(), self.current.describe()),
            ));
        }
        self.advance()
    }

    fn unexpected(&self) -> EvalError {
        EvalError::syntax(self.position, format!("unexpected {}", self.current.describe()))
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId((self.nodes.len() - 1) as u32)
    }

    fn expr(&mut self) -> Result<NodeId, EvalError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance()?;
            let rhs = self.term()?;
            lhs = self.push(Node::Binary { op, lhs, rhs });
        }
    }

    fn term(&mut self) -> Result<NodeId, EvalError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance()?;
            let rhs = self.factor()?;
            lhs = self.push(Node::Binary { op, lhs, rhs });
        }
    }

    fn factor(&mut self) -> Result<NodeId, EvalError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvalError::TooDeep(self.max_depth));
        }

        let node = match self.current {
            Token::Plus | Token::Minus => {
                let op = if self.current == Token::Minus {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Plus
                };
                self.advance()?;
                let operand = self.factor()?;
                Ok(self.push(Node::Unary { op, operand }))
            }
            _ => self.power(),
        };

        self.depth -= 1;
        node
    }

    fn power(&mut self) -> Result<NodeId, EvalError> {
        let base = self.primary()?;
        if self.current != Token::DoubleStar {
            return Ok(base);
        }
        self.advance()?;
        let exponent = self.factor()?;
        Ok(self.push(Node::Binary {
            op: BinaryOp::Pow,
            lhs: base,
            rhs: exponent,
        }))
    }

    fn primary(&mut self) -> Result<NodeId, EvalError> {
        match std::mem::replace(&mut self.current, Token::Eof) {
            Token::Int(n) => {
                self.advance()?;
                Ok(self.push(Node::Int(n)))
            }
            Token::Float(x) => {
                self.advance()?;
                Ok(self.push(Node::Float(x)))
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                let function = Function::from_name(&name)
                    .ok_or_else(|| EvalError::Disallowed(format!("name '{}'", name)))?;
                let position = self.position;
                self.advance()?;
                if self.current != Token::LParen {
                    return Err(EvalError::syntax(
                        position,
                        format!("'{}' must be called", function.name()),
                    ));
                }
                self.advance()?;
                let args = self.args()?;
                Ok(self.push(Node::Call { function, args }))
            }
            Token::LBracket => Err(EvalError::Disallowed(
                "a list literal outside function arguments".to_string(),
            )),
            other => {
                self.current = other;
                Err(self.unexpected())
            }
        }
    }

    /// Parse call arguments; the opening parenthesis is already consumed
    fn args(&mut self) -> Result<Vec<NodeId>, EvalError> {
        let mut args = Vec::new();
        if self.current == Token::RParen {
            self.advance()?;
            return Ok(args);
        }

        loop {
            let arg = if self.current == Token::LBracket {
                self.advance()?;
                self.list()?
            } else {
                self.expr()?
            };
            args.push(arg);

            match self.current {
                Token::Comma => self.advance()?,
                Token::RParen => {
                    self.advance()?;
                    return Ok(args);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    /// Parse list items; the opening bracket is already consumed
    fn list(&mut self) -> Result<NodeId, EvalError> {
        let mut items = Vec::new();
        if self.current != Token::RBracket {
            loop {
                items.push(self.expr()?);
                if self.current != Token::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(Token::RBracket)?;
        Ok(self.push(Node::List(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Ast, EvalError> {
        Parser::new(src, 64).parse()
    }

    #[test]
    fn test_precedence_shape() {
        let ast = parse("1 + 2 * 3").unwrap();
        match ast.node(ast.root()) {
            Node::Binary { op, lhs, rhs } => {
                assert_eq!(*op, BinaryOp::Add);
                assert_eq!(ast.node(*lhs), &Node::Int(1));
                assert!(matches!(ast.node(*rhs), Node::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected root {:?}", other),
        }
        assert_eq!(ast.len(), 5);
    }

    #[test]
    fn test_unary_binds_looser_than_power() {
        let ast = parse("-2 ** 2").unwrap();
        assert!(matches!(
            ast.node(ast.root()),
            Node::Unary { op: UnaryOp::Neg, .. }
        ));
    }

    #[test]
    fn test_call_with_list_argument() {
        let ast = parse("sum([1, 2, 3], 4)").unwrap();
        match ast.node(ast.root()) {
            Node::Call { function, args } => {
                assert_eq!(*function, Function::Sum);
                assert_eq!(args.len(), 2);
                assert!(matches!(ast.node(args[0]), Node::List(items) if items.len() == 3));
            }
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_unknown_name_rejected_before_arguments() {
        // The string literal is never reached
        assert_eq!(
            parse("__import__('os')").unwrap_err(),
            EvalError::Disallowed("name '__import__'".to_string())
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse("1 +").unwrap_err(), EvalError::Syntax { .. }));
        assert!(matches!(parse("(1").unwrap_err(), EvalError::Syntax { .. }));
        assert!(matches!(parse("max(1 2)").unwrap_err(), EvalError::Syntax { .. }));
        assert!(matches!(parse("abs").unwrap_err(), EvalError::Syntax { .. }));
        assert!(matches!(parse("1)").unwrap_err(), EvalError::Syntax { .. }));
    }
}
