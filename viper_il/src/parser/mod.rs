//! Parser for the textual IL.
//!
//! The parser only checks syntax and the scoping of temporaries. Structural problems such as a
//! block without a terminator, a branch to an unknown block or a call to an unknown function are
//! accepted here and diagnosed when the module is lowered.


mod lexer;

use crate::{
    instruction::OperandShape, BranchTarget, Extern, FunctionBuilder, Instr, Module, Name, Opcode,
    Param, Type, Value,
};
use lexer::Token;
use std::collections::HashMap;

pub type Span = std::ops::Range<usize>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid token `{text}`")]
    InvalidToken { text: String, span: Span },
    #[error("unexpected {found}, expected {expected}")]
    Unexpected {
        found: String,
        expected: String,
        span: Span,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },
    #[error("unknown opcode `{name}`")]
    UnknownOpcode { name: String, span: Span },
    #[error("unknown type `{name}`")]
    UnknownType { name: String, span: Span },
    #[error("`{opcode}` doesn't produce a result")]
    UnexpectedResult { opcode: Opcode, span: Span },
    #[error("`%{name}` is defined more than once")]
    DuplicateTemp { name: String, span: Span },
    #[error("use of undefined value `%{name}`")]
    UndefinedTemp { name: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::InvalidToken { span, .. }
            | ParseError::Unexpected { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::UnknownOpcode { span, .. }
            | ParseError::UnknownType { span, .. }
            | ParseError::UnexpectedResult { span, .. }
            | ParseError::DuplicateTemp { span, .. }
            | ParseError::UndefinedTemp { span, .. } => span.clone(),
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parses a complete IL module.
pub fn parse_module(source: &str) -> Result<Module> {
    let tokens = lexer::tokenize(source)?;
    Parser::new(tokens, source.len()).parse_module()
}

/// A call whose result type is only known once the whole module is parsed.
struct PendingCall {
    function: usize,
    block: usize,
    instr: usize,
}

/// Definitions and uses of temporaries in the function being parsed.
#[derive(Default)]
struct TempScope {
    defined: HashMap<String, Span>,
    used: Vec<(String, Span)>,
}

impl TempScope {
    fn define(&mut self, name: &str, span: Span) -> Result<()> {
        if self.defined.insert(name.to_owned(), span.clone()).is_some() {
            return Err(ParseError::DuplicateTemp {
                name: name.to_owned(),
                span,
            });
        }
        Ok(())
    }

    fn check_uses(&self) -> Result<()> {
        match self.used.iter().find(|(name, _)| !self.defined.contains_key(name)) {
            Some((name, span)) => Err(ParseError::UndefinedTemp {
                name: name.clone(),
                span: span.clone(),
            }),
            None => Ok(()),
        }
    }
}

struct Parser<'s> {
    tokens: Vec<(Token<'s>, Span)>,
    pos: usize,
    end: usize,
    module: Module,
    pending_calls: Vec<PendingCall>,
}

impl<'s> Parser<'s> {
    fn new(tokens: Vec<(Token<'s>, Span)>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            module: Module::new(),
            pending_calls: Vec::new(),
        }
    }

    fn parse_module(mut self) -> Result<Module> {
        loop {
            self.skip_newlines();
            match self.peek() {
                None => break,
                Some(Token::Func) => self.parse_function()?,
                Some(Token::Extern) => self.parse_extern()?,
                // Version header, e.g. `il 0.1`.
                Some(Token::Ident("il")) => {
                    while !matches!(self.peek(), None | Some(Token::Newline)) {
                        self.pos += 1;
                    }
                }
                Some(_) => return Err(self.unexpected("`func` or `extern`")),
            }
        }

        for pending in std::mem::take(&mut self.pending_calls) {
            let instr = &self.module.functions[pending.function].blocks[pending.block].instrs
                [pending.instr];
            let ret_ty = instr
                .callee
                .as_ref()
                .and_then(|callee| self.module.signature(callee.as_str()))
                .map(|sig| sig.ret_ty);
            if let Some(ret_ty) = ret_ty {
                self.module.functions[pending.function].blocks[pending.block].instrs
                    [pending.instr]
                    .ty = ret_ty;
            }
        }

        Ok(self.module)
    }

    fn parse_extern(&mut self) -> Result<()> {
        self.expect(Token::Extern, "`extern`")?;
        let name = self.expect_global()?;
        self.expect(Token::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.eat(Token::RParen) {
            loop {
                params.push(self.parse_type()?);
                if self.eat(Token::RParen) {
                    break;
                }
                self.expect(Token::Comma, "`,` or `)`")?;
            }
        }
        self.expect(Token::Arrow, "`->`")?;
        let ret_ty = self.parse_type()?;
        self.module.add_extern(Extern {
            name: name.into(),
            params,
            ret_ty,
        });
        Ok(())
    }

    fn parse_function(&mut self) -> Result<()> {
        self.expect(Token::Func, "`func`")?;
        let name = self.expect_global()?;
        let mut scope = TempScope::default();

        self.expect(Token::LParen, "`(`")?;
        let params = self.parse_params(&mut scope)?;
        self.expect(Token::Arrow, "`->`")?;
        let ret_ty = self.parse_type()?;
        self.expect(Token::LBrace, "`{`")?;

        let mut builder = FunctionBuilder::new(name, ret_ty);
        for param in params {
            builder.add_param(param.name, param.ty);
        }

        loop {
            self.skip_newlines();
            match (self.peek(), self.peek_nth(1)) {
                (Some(Token::RBrace), _) => {
                    self.pos += 1;
                    break;
                }
                (Some(Token::Ident(label)), Some(Token::Colon | Token::LParen)) => {
                    let label: &'s str = *label;
                    self.pos += 1;
                    let params = if self.eat(Token::LParen) {
                        self.parse_params(&mut scope)?
                    } else {
                        Vec::new()
                    };
                    self.expect(Token::Colon, "`:`")?;
                    builder.start_block_with_params(label, params);
                }
                (None, _) => return Err(self.unexpected("`}`")),
                _ if !builder.has_block() => return Err(self.unexpected("a block label")),
                _ => {
                    let instr = self.parse_instr(&builder, &mut scope)?;
                    builder.push(instr);
                }
            }
        }

        scope.check_uses()?;
        let function = builder.build();

        let function_index = self.module.functions.len();
        for (block_index, block) in function.blocks.iter().enumerate() {
            for (instr_index, instr) in block.instrs.iter().enumerate() {
                if instr.opcode == Opcode::Call && instr.result.is_some() {
                    self.pending_calls.push(PendingCall {
                        function: function_index,
                        block: block_index,
                        instr: instr_index,
                    });
                }
            }
        }
        self.module.add_function(function);
        Ok(())
    }

    /// Parses parameters up to and including the closing `)`. Accepts both `%a:i64` and
    /// `i64 %a`.
    fn parse_params(&mut self, scope: &mut TempScope) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        if self.eat(Token::RParen) {
            return Ok(params);
        }
        loop {
            let (name, span, ty) = match self.peek() {
                Some(Token::Temp(_)) => {
                    let (name, span) = self.expect_temp()?;
                    self.expect(Token::Colon, "`:`")?;
                    (name, span, self.parse_type()?)
                }
                _ => {
                    let ty = self.parse_type()?;
                    let (name, span) = self.expect_temp()?;
                    (name, span, ty)
                }
            };
            scope.define(name, span)?;
            params.push(Param::new(name, ty));
            if self.eat(Token::RParen) {
                return Ok(params);
            }
            self.expect(Token::Comma, "`,` or `)`")?;
        }
    }

    fn parse_instr(&mut self, builder: &FunctionBuilder, scope: &mut TempScope) -> Result<Instr> {
        let mut result = None;
        let mut annotated_ty = None;
        if let Some(Token::Temp(_)) = self.peek() {
            let (name, span) = self.expect_temp()?;
            scope.define(name, span.clone())?;
            if self.eat(Token::Colon) {
                annotated_ty = Some(self.parse_type()?);
            }
            self.expect(Token::Eq, "`=`")?;
            result = Some((Name::from(name), span));
        }

        let opcode = self.parse_opcode()?;
        if let Some((_, span)) = &result {
            if !opcode.has_result() {
                return Err(ParseError::UnexpectedResult {
                    opcode,
                    span: span.clone(),
                });
            }
        }

        let mut instr = match opcode.shape() {
            OperandShape::Binary => {
                let lhs = self.parse_value(scope)?;
                self.expect(Token::Comma, "`,`")?;
                let rhs = self.parse_value(scope)?;
                let ty = opcode
                    .fixed_result_type()
                    .or_else(|| lhs.as_temp().and_then(|t| builder.type_of(t)))
                    .or_else(|| rhs.as_temp().and_then(|t| builder.type_of(t)))
                    .unwrap_or(Type::I64);
                Instr::new(opcode, ty, vec![lhs, rhs])
            }
            OperandShape::Unary | OperandShape::Alloca => {
                let operand = self.parse_value(scope)?;
                let ty = opcode.fixed_result_type().unwrap_or(Type::I64);
                Instr::new(opcode, ty, vec![operand])
            }
            OperandShape::Load => {
                let ty = self.parse_type()?;
                self.expect(Token::Comma, "`,`")?;
                let ptr = self.parse_value(scope)?;
                Instr::new(opcode, ty, vec![ptr])
            }
            OperandShape::Store => {
                let ty = self.parse_type()?;
                self.expect(Token::Comma, "`,`")?;
                let ptr = self.parse_value(scope)?;
                self.expect(Token::Comma, "`,`")?;
                let value = self.parse_value(scope)?;
                Instr::new(opcode, ty, vec![ptr, value])
            }
            OperandShape::Call => {
                let callee = self.expect_global()?;
                self.expect(Token::LParen, "`(`")?;
                let args = self.parse_value_list(scope)?;
                let ty = match (&result, self.module.signature(callee)) {
                    (None, _) => Type::Void,
                    (Some(_), Some(sig)) => sig.ret_ty,
                    (Some(_), None) => Type::I64,
                };
                Instr::new(opcode, ty, args).with_callee(callee)
            }
            OperandShape::Ret => {
                let operands = match self.peek() {
                    None | Some(Token::Newline | Token::RBrace) => Vec::new(),
                    Some(_) => vec![self.parse_value(scope)?],
                };
                Instr::new(opcode, Type::Void, operands)
            }
            OperandShape::Br => {
                let target = self.parse_branch_target(scope)?;
                Instr::new(opcode, Type::Void, Vec::new()).with_targets(vec![target])
            }
            OperandShape::CBr => {
                let cond = self.parse_value(scope)?;
                self.expect(Token::Comma, "`,`")?;
                let if_true = self.parse_branch_target(scope)?;
                self.expect(Token::Comma, "`,`")?;
                let if_false = self.parse_branch_target(scope)?;
                Instr::new(opcode, Type::Void, vec![cond]).with_targets(vec![if_true, if_false])
            }
            OperandShape::Switch => {
                let scrutinee = self.parse_value(scope)?;
                self.expect(Token::Comma, "`,`")?;
                let mut operands = vec![scrutinee];
                let mut targets = vec![self.parse_branch_target(scope)?];
                while self.eat(Token::Comma) {
                    let value = match self.next() {
                        Some((Token::Int(value), _)) => value,
                        other => return Err(self.error_at(other, "a case value")),
                    };
                    self.expect(Token::Arrow, "`->`")?;
                    operands.push(Value::ConstInt(value));
                    targets.push(self.parse_branch_target(scope)?);
                }
                Instr::new(opcode, Type::Void, operands).with_targets(targets)
            }
            OperandShape::Nullary => Instr::new(opcode, Type::Void, Vec::new()),
        };

        if let Some(ty) = annotated_ty {
            instr.ty = ty;
        }
        if let Some((name, _)) = result {
            instr = instr.with_result(name);
        }

        match self.peek() {
            None | Some(Token::Newline | Token::RBrace) => Ok(instr),
            Some(_) => Err(self.unexpected("end of line")),
        }
    }

    fn parse_branch_target(&mut self, scope: &mut TempScope) -> Result<BranchTarget> {
        let label = match self.next() {
            Some((Token::Ident(label), _)) => label,
            other => return Err(self.error_at(other, "a block label")),
        };
        let args = if self.eat(Token::LParen) {
            self.parse_value_list(scope)?
        } else {
            Vec::new()
        };
        Ok(BranchTarget::new(label, args))
    }

    /// Parses values up to and including the closing `)`.
    fn parse_value_list(&mut self, scope: &mut TempScope) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        if self.eat(Token::RParen) {
            return Ok(values);
        }
        loop {
            values.push(self.parse_value(scope)?);
            if self.eat(Token::RParen) {
                return Ok(values);
            }
            self.expect(Token::Comma, "`,` or `)`")?;
        }
    }

    fn parse_value(&mut self, scope: &mut TempScope) -> Result<Value> {
        match self.next() {
            Some((Token::Temp(name), span)) => {
                scope.used.push((name.to_owned(), span));
                Ok(Value::temp(name))
            }
            Some((Token::Int(value), _)) => Ok(Value::ConstInt(value)),
            Some((Token::Float(value), _)) => Ok(Value::ConstFloat(value)),
            Some((Token::Global(name), _)) => Ok(Value::Global(name.into())),
            Some((Token::Ident("null"), _)) => Ok(Value::Null),
            Some((Token::Ident("true"), _)) => Ok(Value::ConstBool(true)),
            Some((Token::Ident("false"), _)) => Ok(Value::ConstBool(false)),
            other => Err(self.error_at(other, "a value")),
        }
    }

    fn parse_opcode(&mut self) -> Result<Opcode> {
        match self.next() {
            Some((Token::Ident(name), span)) => {
                name.parse().map_err(|()| ParseError::UnknownOpcode {
                    name: name.to_owned(),
                    span,
                })
            }
            other => Err(self.error_at(other, "an opcode")),
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        match self.next() {
            Some((Token::Ident(name), span)) => name.parse().map_err(|()| ParseError::UnknownType {
                name: name.to_owned(),
                span,
            }),
            other => Err(self.error_at(other, "a type")),
        }
    }

    fn expect_global(&mut self) -> Result<&'s str> {
        match self.next() {
            Some((Token::Global(name), _)) => Ok(name),
            other => Err(self.error_at(other, "a `@name`")),
        }
    }

    fn expect_temp(&mut self) -> Result<(&'s str, Span)> {
        match self.next() {
            Some((Token::Temp(name), span)) => Ok((name, span)),
            other => Err(self.error_at(other, "a `%name`")),
        }
    }

    fn expect(&mut self, token: Token<'s>, expected: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn eat(&mut self, token: Token<'s>) -> bool {
        if self.peek() == Some(&token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<&Token<'s>> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token<'s>> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token<'s>, Span)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// An error for the token at the current position.
    fn unexpected(&self, expected: &str) -> ParseError {
        match self.tokens.get(self.pos) {
            Some((token, span)) => ParseError::Unexpected {
                found: token.to_string(),
                expected: expected.to_owned(),
                span: span.clone(),
            },
            None => ParseError::UnexpectedEof {
                expected: expected.to_owned(),
                span: self.end..self.end,
            },
        }
    }

    /// An error for a token that was already consumed by [`Parser::next`].
    fn error_at(&self, token: Option<(Token<'s>, Span)>, expected: &str) -> ParseError {
        match token {
            Some((token, span)) => ParseError::Unexpected {
                found: token.to_string(),
                expected: expected.to_owned(),
                span,
            },
            None => ParseError::UnexpectedEof {
                expected: expected.to_owned(),
                span: self.end..self.end,
            },
        }
    }
}
