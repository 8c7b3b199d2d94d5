//! Recursive-descent parser with a precedence-climbing expression core
//! (spec §4.2). The climbing loop — an `lbp()` (left binding power) lookup
//! consulted from a `parse_binary(min_bp)` loop — and the `preceded_by_newline`-
//! driven semicolon insertion are both lifted from the teacher's abandoned
//! prototype `nova_parser::parser::Parser`. Context tracking is extended past
//! that prototype's `ScopeState { is_loop, is_function }` into the fuller
//! flag set spec §4.2 requires for Early Errors.

use js_ast::{
    Ast, AssignOp, BinaryOp, CatchClause, ClassMember, Function, FunctionFlags, ImportSpecifier, LogicalOp, Node, NodeRef,
    ObjectPatternProperty, ObjectProperty, PropertyKind, SwitchCase, TemplateQuasi, UnaryOp, UpdateOp, VarKind,
};
use js_lexer::Lexer;
use js_token::{LiteralValue, Span, Token, TokenKind};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("{message} at line {line}:{column}")]
    Syntax { message: std::string::String, line: u32, column: u32 },
    #[error(transparent)]
    Lex(#[from] js_lexer::LexError),
}

type Result<T> = std::result::Result<T, ParseError>;

/// Per-function/block context, pushed on entering a function body or class,
/// consulted by Early Error checks (`await`/`yield` availability, whether a
/// bare `return` is legal, `break`/`continue` label validity, `super`
/// availability). Generalizes the prototype's two-flag `ScopeState`.
#[derive(Debug, Clone, Default)]
struct Context {
    in_strict: bool,
    in_function: bool,
    in_async: bool,
    in_generator: bool,
    in_class: bool,
    in_method: bool,
    in_constructor: bool,
    in_arrow: bool,
    loop_depth: u32,
    switch_depth: u32,
    label_stack: Vec<std::string::String>,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
    ctx: Vec<Context>,
}

pub struct ParseOutput {
    pub ast: Ast,
    pub program: NodeRef,
}

impl Parser {
    pub fn parse_program(source: &str, is_module: bool) -> Result<ParseOutput> {
        let tokens = Lexer::tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0, ast: Ast::new(), ctx: vec![Context { in_strict: is_module, ..Default::default() }] };
        let start = parser.cur().span;
        let mut body = parser.parse_directive_prologue()?;
        while !parser.at(TokenKind::Eof) {
            body.push(parser.parse_statement_list_item(is_module)?);
        }
        let end = parser.cur().span;
        let program = parser.ast.alloc(Node::Program { span: join(start, end), body, is_module });
        Ok(ParseOutput { ast: parser.ast, program })
    }

    // ---- token stream helpers ----

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn cur_kind(&self) -> TokenKind {
        self.cur().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.cur_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            self.err(format!("expected {what}"))
        }
    }

    fn err<T>(&self, message: std::string::String) -> Result<T> {
        let span = self.cur().span;
        Err(ParseError::Syntax { message, line: span.line, column: span.column })
    }

    fn ctx(&self) -> &Context {
        self.ctx.last().unwrap()
    }

    fn ctx_mut(&mut self) -> &mut Context {
        self.ctx.last_mut().unwrap()
    }

    /// Consumes the leading run of bare string-literal expression statements
    /// (spec §4.2's Directive Prologue) at the start of a Program or
    /// FunctionBody, setting `in_strict` on `"use strict"`/`'use strict'` so
    /// every later Early Error check in this body sees strict mode. A string
    /// literal that turns out to be part of a larger expression (`"use
    /// strict".length`) ends the prologue, matching the one statement it
    /// produced.
    fn parse_directive_prologue(&mut self) -> Result<Vec<NodeRef>> {
        let mut directives = Vec::new();
        while self.at(TokenKind::StringLiteral) {
            let stmt = self.parse_expression_statement()?;
            let Node::ExpressionStatement { expression, .. } = self.ast.get(stmt) else { unreachable!() };
            let is_directive = match self.ast.get(*expression) {
                Node::StringLiteral { value, .. } => {
                    if value == "use strict" {
                        self.ctx_mut().in_strict = true;
                    }
                    true
                }
                _ => false,
            };
            directives.push(stmt);
            if !is_directive {
                break;
            }
        }
        Ok(directives)
    }

    /// Spec §4.2 ASI: a statement terminator is satisfied by `;`, an
    /// upcoming `}`, end of input, or at least one line terminator before
    /// the next token. Callers of `do...while` pass `allow_no_newline` since
    /// that production's closing `;` may be elided even without a newline.
    fn expect_terminator(&mut self, allow_no_newline: bool) -> Result<()> {
        if self.eat(TokenKind::Semicolon) {
            return Ok(());
        }
        if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
            return Ok(());
        }
        if allow_no_newline || self.cur().preceded_by_newline {
            return Ok(());
        }
        self.err("expected ';'".to_string())
    }

    fn identifier_name(&mut self) -> Result<std::string::String> {
        if matches!(self.cur_kind(), TokenKind::Identifier) || is_contextual_keyword(self.cur_kind()) {
            Ok(self.advance().lexeme)
        } else {
            self.err("expected identifier".to_string())
        }
    }
}

fn is_contextual_keyword(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Async | TokenKind::Static | TokenKind::Get | TokenKind::Set | TokenKind::Of | TokenKind::As | TokenKind::From | TokenKind::Let | TokenKind::Yield | TokenKind::Await
    )
}

fn join(a: Span, b: Span) -> Span {
    Span::new(a.start, b.end.max(a.end), a.line, a.column)
}

// ============================ Statements ============================

impl Parser {
    fn parse_statement_list_item(&mut self, top_level: bool) -> Result<NodeRef> {
        match self.cur_kind() {
            TokenKind::Function => self.parse_function_declaration(FunctionFlags::default()),
            TokenKind::Async if self.peek_is_function() => {
                self.advance();
                self.parse_function_declaration(FunctionFlags { is_async: true, ..Default::default() })
            }
            TokenKind::Class => self.parse_class(true),
            TokenKind::Const | TokenKind::Let | TokenKind::Var => self.parse_variable_statement(),
            TokenKind::Import if top_level => self.parse_import_declaration(),
            TokenKind::Export if top_level => self.parse_export_declaration(),
            _ => self.parse_statement(),
        }
    }

    fn peek_is_function(&self) -> bool {
        self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Function)
    }

    fn parse_statement(&mut self) -> Result<NodeRef> {
        match self.cur_kind() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semicolon => {
                let span = self.advance().span;
                Ok(self.ast.alloc(Node::EmptyStatement { span }))
            }
            TokenKind::Debugger => {
                let span = self.advance().span;
                self.expect_terminator(false)?;
                Ok(self.ast.alloc(Node::DebuggerStatement { span }))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => self.parse_break_continue(true),
            TokenKind::Continue => self.parse_break_continue(false),
            TokenKind::Return => self.parse_return(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Try => self.parse_try(),
            TokenKind::With => self.parse_with(),
            TokenKind::Identifier if self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Colon) => self.parse_labeled(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> Result<NodeRef> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span;
        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            body.push(self.parse_statement_list_item(false)?);
        }
        let end = self.expect(TokenKind::RBrace, "'}'")?.span;
        Ok(self.ast.alloc(Node::BlockStatement { span: join(start, end), body }))
    }

    fn parse_variable_statement(&mut self) -> Result<NodeRef> {
        let decl = self.parse_variable_declaration()?;
        self.expect_terminator(false)?;
        Ok(decl)
    }

    fn parse_variable_declaration(&mut self) -> Result<NodeRef> {
        let start = self.cur().span;
        let kind = match self.advance().kind {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => return self.err("expected a variable declaration keyword".to_string()),
        };
        let mut declarations = Vec::new();
        loop {
            let decl_start = self.cur().span;
            let id = self.parse_binding_target()?;
            let init = if self.eat(TokenKind::Eq) { Some(self.parse_assignment_expression()?) } else { None };
            if kind == VarKind::Const && init.is_none() {
                return self.err("missing initializer in const declaration".to_string());
            }
            let end = init.map(|i| self.ast.span(i)).unwrap_or_else(|| self.ast.span(id));
            declarations.push(self.ast.alloc(Node::VariableDeclarator { span: join(decl_start, end), id, init }));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.ast.span(*declarations.last().unwrap());
        Ok(self.ast.alloc(Node::VariableDeclaration { span: join(start, end), kind, declarations }))
    }

    fn parse_binding_target(&mut self) -> Result<NodeRef> {
        match self.cur_kind() {
            TokenKind::LBracket | TokenKind::LBrace => {
                let expr = self.parse_primary_expression()?;
                match js_ast::expression_to_pattern(&mut self.ast, expr) {
                    Some(pattern) => Ok(pattern),
                    None => self.err("invalid destructuring target".to_string()),
                }
            }
            _ => {
                let span = self.cur().span;
                let name = self.identifier_name()?;
                Ok(self.ast.alloc(Node::Identifier { span, name }))
            }
        }
    }

    fn parse_if(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let consequent = self.parse_statement()?;
        let alternate = if self.eat(TokenKind::Else) { Some(self.parse_statement()?) } else { None };
        let end = alternate.map(|a| self.ast.span(a)).unwrap_or_else(|| self.ast.span(consequent));
        Ok(self.ast.alloc(Node::IfStatement { span: join(start, end), test, consequent, alternate }))
    }

    fn parse_for(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        let is_await = self.eat(TokenKind::Await);
        self.expect(TokenKind::LParen, "'('")?;

        let init: Option<NodeRef> = if self.at(TokenKind::Semicolon) {
            None
        } else if matches!(self.cur_kind(), TokenKind::Var | TokenKind::Let | TokenKind::Const) {
            Some(self.parse_variable_declaration()?)
        } else {
            Some(self.parse_expression_no_in()?)
        };

        if matches!(self.cur_kind(), TokenKind::In | TokenKind::Of) {
            let is_for_of = self.advance().kind == TokenKind::Of;
            let left = init.expect("for-in/of header always has a left-hand side");
            let right = if is_for_of { self.parse_assignment_expression()? } else { self.parse_expression()? };
            self.expect(TokenKind::RParen, "')'")?;
            self.ctx_mut().loop_depth += 1;
            let body = self.parse_statement()?;
            self.ctx_mut().loop_depth -= 1;
            let span = join(start, self.ast.span(body));
            return Ok(self.ast.alloc(Node::ForInStatement { span, left, right, body, is_for_of, is_await }));
        }

        self.expect(TokenKind::Semicolon, "';'")?;
        let test = if self.at(TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(TokenKind::Semicolon, "';'")?;
        let update = if self.at(TokenKind::RParen) { None } else { Some(self.parse_expression()?) };
        self.expect(TokenKind::RParen, "')'")?;
        self.ctx_mut().loop_depth += 1;
        let body = self.parse_statement()?;
        self.ctx_mut().loop_depth -= 1;
        let span = join(start, self.ast.span(body));
        Ok(self.ast.alloc(Node::ForStatement { span, init, test, update, body }))
    }

    fn parse_while(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.ctx_mut().loop_depth += 1;
        let body = self.parse_statement()?;
        self.ctx_mut().loop_depth -= 1;
        let span = join(start, self.ast.span(body));
        Ok(self.ast.alloc(Node::WhileStatement { span, test, body }))
    }

    fn parse_do_while(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        self.ctx_mut().loop_depth += 1;
        let body = self.parse_statement()?;
        self.ctx_mut().loop_depth -= 1;
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        let end = self.expect(TokenKind::RParen, "')'")?.span;
        // The trailing ';' of a do-while may be elided unconditionally.
        self.eat(TokenKind::Semicolon);
        Ok(self.ast.alloc(Node::DoWhileStatement { span: join(start, end), body, test }))
    }

    fn parse_switch(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen, "'('")?;
        let discriminant = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        self.ctx_mut().switch_depth += 1;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let test = if self.eat(TokenKind::Case) {
                let e = self.parse_expression()?;
                Some(e)
            } else {
                self.expect(TokenKind::Default, "'case' or 'default'")?;
                if seen_default {
                    return self.err("multiple default clauses in switch".to_string());
                }
                seen_default = true;
                None
            };
            self.expect(TokenKind::Colon, "':'")?;
            let mut consequent = Vec::new();
            while !matches!(self.cur_kind(), TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof) {
                consequent.push(self.parse_statement_list_item(false)?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.ctx_mut().switch_depth -= 1;
        let end = self.expect(TokenKind::RBrace, "'}'")?.span;
        Ok(self.ast.alloc(Node::SwitchStatement { span: join(start, end), discriminant, cases }))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> Result<NodeRef> {
        let start = self.advance().span;
        let label = if !self.cur().preceded_by_newline && self.at(TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else {
            None
        };
        if label.is_none() && self.ctx().loop_depth == 0 && !(is_break && self.ctx().switch_depth > 0) {
            return self.err(format!("illegal {} statement outside of a loop", if is_break { "break" } else { "continue" }));
        }
        self.expect_terminator(false)?;
        let span = start;
        Ok(self.ast.alloc(if is_break { Node::BreakStatement { span, label } } else { Node::ContinueStatement { span, label } }))
    }

    fn parse_return(&mut self) -> Result<NodeRef> {
        if !self.ctx().in_function {
            return self.err("'return' outside of function".to_string());
        }
        let start = self.advance().span;
        let argument = if self.at(TokenKind::Semicolon) || self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) || self.cur().preceded_by_newline {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_terminator(false)?;
        Ok(self.ast.alloc(Node::ReturnStatement { span: start, argument }))
    }

    fn parse_throw(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        if self.cur().preceded_by_newline {
            return self.err("illegal newline after 'throw'".to_string());
        }
        let argument = self.parse_expression()?;
        self.expect_terminator(false)?;
        let span = join(start, self.ast.span(argument));
        Ok(self.ast.alloc(Node::ThrowStatement { span, argument }))
    }

    fn parse_try(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        let block = self.parse_block()?;
        let handler = if self.eat(TokenKind::Catch) {
            let param = if self.eat(TokenKind::LParen) {
                let p = self.parse_binding_target()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(p)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(TokenKind::Finally) { Some(self.parse_block()?) } else { None };
        if handler.is_none() && finalizer.is_none() {
            return self.err("missing catch or finally after try".to_string());
        }
        let end = finalizer.or(handler.as_ref().map(|h| h.body)).unwrap_or(block);
        let span = join(start, self.ast.span(end));
        Ok(self.ast.alloc(Node::TryStatement { span, block, handler, finalizer }))
    }

    fn parse_with(&mut self) -> Result<NodeRef> {
        if self.ctx().in_strict {
            return self.err("'with' statements are not allowed in strict mode".to_string());
        }
        let start = self.advance().span;
        self.expect(TokenKind::LParen, "'('")?;
        let object = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_statement()?;
        let span = join(start, self.ast.span(body));
        Ok(self.ast.alloc(Node::WithStatement { span, object, body }))
    }

    fn parse_labeled(&mut self) -> Result<NodeRef> {
        let start = self.cur().span;
        let label = self.advance().lexeme;
        self.expect(TokenKind::Colon, "':'")?;
        if self.ctx().label_stack.contains(&label) {
            return self.err(format!("label '{label}' has already been declared"));
        }
        self.ctx_mut().label_stack.push(label.clone());
        let body = self.parse_statement()?;
        self.ctx_mut().label_stack.pop();
        let span = join(start, self.ast.span(body));
        Ok(self.ast.alloc(Node::LabeledStatement { span, label, body }))
    }

    fn parse_expression_statement(&mut self) -> Result<NodeRef> {
        if self.at(TokenKind::Function) || (self.at(TokenKind::Class)) {
            return self.err("unexpected token".to_string());
        }
        let start = self.cur().span;
        let expr = self.parse_expression()?;
        self.expect_terminator(false)?;
        let span = join(start, self.ast.span(expr));
        Ok(self.ast.alloc(Node::ExpressionStatement { span, expression: expr }))
    }

    fn parse_import_declaration(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        let mut specifiers = Vec::new();
        if matches!(self.cur_kind(), TokenKind::Identifier) {
            let local = self.advance().lexeme;
            specifiers.push(ImportSpecifier { imported: None, local, is_namespace: false, is_default: true });
            self.eat(TokenKind::Comma);
        }
        if self.eat(TokenKind::Star) {
            self.expect(TokenKind::As, "'as'")?;
            let local = self.identifier_name()?;
            specifiers.push(ImportSpecifier { imported: None, local, is_namespace: true, is_default: false });
        } else if self.eat(TokenKind::LBrace) {
            while !self.at(TokenKind::RBrace) {
                let imported = self.identifier_name()?;
                let local = if self.eat(TokenKind::As) { self.identifier_name()? } else { imported.clone() };
                specifiers.push(ImportSpecifier { imported: Some(imported), local, is_namespace: false, is_default: false });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "'}'")?;
        }
        if !specifiers.is_empty() {
            self.expect(TokenKind::From, "'from'")?;
        }
        let source = self.parse_string_literal_raw()?;
        let end = self.cur().span;
        self.expect_terminator(false)?;
        Ok(self.ast.alloc(Node::ImportDeclaration { span: join(start, end), specifiers, source }))
    }

    fn parse_string_literal_raw(&mut self) -> Result<std::string::String> {
        let tok = self.expect(TokenKind::StringLiteral, "a string literal")?;
        match tok.literal_value {
            Some(LiteralValue::String(s)) => Ok(s),
            _ => self.err("expected a string literal".to_string()),
        }
    }

    fn parse_export_declaration(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        if self.eat(TokenKind::Default) {
            let decl = match self.cur_kind() {
                TokenKind::Function => self.parse_function_declaration(FunctionFlags::default())?,
                TokenKind::Class => self.parse_class(true)?,
                _ => {
                    let e = self.parse_assignment_expression()?;
                    self.expect_terminator(false)?;
                    e
                }
            };
            let span = join(start, self.ast.span(decl));
            return Ok(self.ast.alloc(Node::ExportDefaultDeclaration { span, declaration: decl }));
        }
        if self.eat(TokenKind::Star) {
            let exported_as = if self.eat(TokenKind::As) { Some(self.identifier_name()?) } else { None };
            self.expect(TokenKind::From, "'from'")?;
            let source = self.parse_string_literal_raw()?;
            let end = self.cur().span;
            self.expect_terminator(false)?;
            return Ok(self.ast.alloc(Node::ExportAllDeclaration { span: join(start, end), source, exported_as }));
        }
        if self.eat(TokenKind::LBrace) {
            let mut specifiers = Vec::new();
            while !self.at(TokenKind::RBrace) {
                let local = self.identifier_name()?;
                let exported = if self.eat(TokenKind::As) { self.identifier_name()? } else { local.clone() };
                specifiers.push((local, exported));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "'}'")?;
            let source = if self.eat(TokenKind::From) { Some(self.parse_string_literal_raw()?) } else { None };
            let end = self.cur().span;
            self.expect_terminator(false)?;
            return Ok(self.ast.alloc(Node::ExportNamedDeclaration { span: join(start, end), declaration: None, specifiers, source }));
        }
        let decl = self.parse_statement_list_item(true)?;
        let span = join(start, self.ast.span(decl));
        Ok(self.ast.alloc(Node::ExportNamedDeclaration { span, declaration: Some(decl), specifiers: Vec::new(), source: None }))
    }
}

// ============================ Functions & classes ============================

impl Parser {
    fn parse_function_declaration(&mut self, mut flags: FunctionFlags) -> Result<NodeRef> {
        let start = self.expect(TokenKind::Function, "'function'")?.span;
        flags.is_generator = self.eat(TokenKind::Star);
        let name = self.identifier_name()?;
        let id_span = self.tokens[self.pos - 1].span;
        let id = Some(self.ast.alloc(Node::Identifier { span: id_span, name }));
        let function = self.parse_function_rest(id, flags)?;
        let span = join(start, self.ast.span(function.body));
        Ok(self.ast.alloc(Node::FunctionDeclaration { span, function }))
    }

    fn parse_function_rest(&mut self, id: Option<NodeRef>, flags: FunctionFlags) -> Result<Function> {
        let inherited_strict = self.ctx().in_strict;
        self.ctx.push(Context { in_function: true, in_async: flags.is_async, in_generator: flags.is_generator, in_strict: inherited_strict, ..Default::default() });
        self.expect(TokenKind::LParen, "'('")?;
        let (params, _is_simple) = self.parse_params()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_function_body_block()?;
        self.ctx.pop();
        Ok(Function { id, params, body, is_concise_arrow_body: false, flags })
    }

    /// A FunctionBody: like `parse_block`, but its leading statements may be
    /// a Directive Prologue (spec §4.2), so strict-mode detection has to run
    /// before the rest of the body is parsed.
    fn parse_function_body_block(&mut self) -> Result<NodeRef> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span;
        let mut body = self.parse_directive_prologue()?;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            body.push(self.parse_statement_list_item(false)?);
        }
        let end = self.expect(TokenKind::RBrace, "'}'")?.span;
        Ok(self.ast.alloc(Node::BlockStatement { span: join(start, end), body }))
    }

    /// Parses a parameter list and checks it against spec §4.2's enumerated
    /// Early Errors. Returns the params plus whether the list is "simple"
    /// (no rest element, default, or destructuring pattern) since that
    /// affects whether a function body's own `"use strict"` directive is
    /// legal — a check this parser accepts skipping, see DESIGN.md.
    fn parse_params(&mut self) -> Result<(Vec<NodeRef>, bool)> {
        let mut params = Vec::new();
        let mut is_simple = true;
        while !self.at(TokenKind::RParen) {
            if self.eat(TokenKind::Ellipsis) {
                is_simple = false;
                let start = self.tokens[self.pos - 1].span;
                let arg = self.parse_binding_target()?;
                let span = join(start, self.ast.span(arg));
                params.push(self.ast.alloc(Node::RestElement { span, argument: arg }));
                break;
            }
            let target = self.parse_binding_target()?;
            if !matches!(self.ast.get(target), Node::Identifier { .. }) {
                is_simple = false;
            }
            let param = if self.eat(TokenKind::Eq) {
                is_simple = false;
                let default = self.parse_assignment_expression()?;
                let span = join(self.ast.span(target), self.ast.span(default));
                self.ast.alloc(Node::AssignmentPattern { span, left: target, right: default })
            } else {
                target
            };
            params.push(param);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.validate_params(&params, is_simple)?;
        Ok((params, is_simple))
    }

    /// Walks a binding pattern collecting every name it binds, so duplicate
    /// and reserved-name checks can see through destructuring and defaults.
    fn collect_pattern_names(&self, node: NodeRef, names: &mut Vec<std::string::String>) {
        match self.ast.get(node) {
            Node::Identifier { name, .. } => names.push(name.clone()),
            Node::ArrayPattern { elements, .. } => {
                for element in elements.iter().flatten() {
                    self.collect_pattern_names(*element, names);
                }
            }
            Node::ObjectPattern { properties, .. } => {
                for property in properties {
                    self.collect_pattern_names(property.value, names);
                }
            }
            Node::AssignmentPattern { left, .. } => self.collect_pattern_names(*left, names),
            Node::RestElement { argument, .. } => self.collect_pattern_names(*argument, names),
            _ => {}
        }
    }

    /// Spec §4.2's parameter Early Errors: `eval`/`arguments` forbidden in
    /// strict mode, `await` forbidden in async function parameters, and
    /// duplicate names forbidden whenever strict mode, arrow functions,
    /// generators, async functions, or a non-simple parameter list is in
    /// play (plain sloppy-mode functions with simple parameter lists are the
    /// sole case where JS still tolerates `function f(a, a) {}`).
    fn validate_params(&self, params: &[NodeRef], is_simple: bool) -> Result<()> {
        let ctx = self.ctx();
        let mut names = Vec::new();
        for param in params {
            self.collect_pattern_names(*param, &mut names);
        }
        for name in &names {
            if ctx.in_strict && (name == "eval" || name == "arguments") {
                return self.err(format!("'{name}' is not a valid parameter name in strict mode"));
            }
            if ctx.in_async && name == "await" {
                return self.err("'await' is not a valid parameter name in an async function".to_string());
            }
        }
        let must_be_unique = ctx.in_strict || ctx.in_arrow || ctx.in_generator || ctx.in_async || !is_simple;
        if must_be_unique {
            let mut seen = std::collections::HashSet::new();
            for name in &names {
                if !seen.insert(name.as_str()) {
                    return self.err(format!("Duplicate parameter name '{name}' not allowed in this context"));
                }
            }
        }
        Ok(())
    }

    fn parse_class(&mut self, as_declaration: bool) -> Result<NodeRef> {
        let start = self.advance().span;
        let id = if matches!(self.cur_kind(), TokenKind::Identifier) {
            let span = self.cur().span;
            let name = self.advance().lexeme;
            Some(self.ast.alloc(Node::Identifier { span, name }))
        } else {
            None
        };
        if as_declaration && id.is_none() {
            return self.err("class declaration requires a name".to_string());
        }
        let super_class = if self.eat(TokenKind::Extends) { Some(self.parse_lhs_expression()?) } else { None };
        self.expect(TokenKind::LBrace, "'{'")?;
        self.ctx.push(Context { in_strict: true, in_class: true, ..Default::default() });
        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            body.push(self.parse_class_member()?);
        }
        self.ctx.pop();
        let end = self.expect(TokenKind::RBrace, "'}'")?.span;
        let node = if as_declaration { Node::ClassDeclaration { span: join(start, end), id, super_class, body } } else { Node::ClassExpression { span: join(start, end), id, super_class, body } };
        Ok(self.ast.alloc(node))
    }

    fn parse_class_member(&mut self) -> Result<ClassMember> {
        let is_static = self.at(TokenKind::Static) && self.tokens.get(self.pos + 1).map(|t| t.kind) != Some(TokenKind::LParen) && self.tokens.get(self.pos + 1).map(|t| t.kind) != Some(TokenKind::Eq);
        if is_static {
            self.advance();
        }
        let mut flags = FunctionFlags::default();
        let mut kind = PropertyKind::Method;
        if self.at(TokenKind::Async) && self.tokens.get(self.pos + 1).map(|t| t.kind) != Some(TokenKind::LParen) && self.tokens.get(self.pos + 1).map(|t| t.kind) != Some(TokenKind::Eq) {
            self.advance();
            flags.is_async = true;
        }
        if self.eat(TokenKind::Star) {
            flags.is_generator = true;
        }
        if matches!(self.cur_kind(), TokenKind::Get | TokenKind::Set)
            && self.tokens.get(self.pos + 1).map(|t| t.kind) != Some(TokenKind::LParen)
            && self.tokens.get(self.pos + 1).map(|t| t.kind) != Some(TokenKind::Eq)
        {
            kind = if self.advance().kind == TokenKind::Get { PropertyKind::Get } else { PropertyKind::Set };
        }

        let (key, computed, is_private) = self.parse_property_key()?;

        if self.at(TokenKind::LParen) {
            let is_constructor = matches!(self.ast.get(key), Node::Identifier { name, .. } if name == "constructor") && !is_static;
            self.ctx.push(Context { in_method: true, in_constructor: is_constructor, in_strict: true, ..Default::default() });
            let function = self.parse_function_rest(None, flags)?;
            self.ctx.pop();
            let span = self.ast.span(function.body);
            let value = self.ast.alloc(Node::FunctionExpression { span, function });
            return Ok(ClassMember { key, value: Some(value), computed, is_static, kind, is_private });
        }

        let value = if self.eat(TokenKind::Eq) { Some(self.parse_assignment_expression()?) } else { None };
        self.expect_terminator(false)?;
        Ok(ClassMember { key, value, computed, is_static, kind: PropertyKind::Init, is_private })
    }

    fn parse_property_key(&mut self) -> Result<(NodeRef, bool, bool)> {
        if self.at(TokenKind::PrivateIdentifier) {
            let span = self.cur().span;
            let name = self.advance().lexeme;
            let key = self.ast.alloc(Node::PrivateIdentifier { span, name });
            return Ok((key, false, true));
        }
        if self.eat(TokenKind::LBracket) {
            let expr = self.parse_assignment_expression()?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok((expr, true, false));
        }
        let span = self.cur().span;
        let key = match self.cur().literal_value.clone() {
            Some(LiteralValue::String(s)) => {
                self.advance();
                self.ast.alloc(Node::StringLiteral { span, value: s })
            }
            Some(LiteralValue::Number(n)) => {
                self.advance();
                self.ast.alloc(Node::NumberLiteral { span, value: n })
            }
            _ => {
                let name = self.identifier_name()?;
                self.ast.alloc(Node::Identifier { span, name })
            }
        };
        Ok((key, false, false))
    }
}

// ============================ Expressions ============================

impl Parser {
    fn parse_expression(&mut self) -> Result<NodeRef> {
        let first = self.parse_assignment_expression()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat(TokenKind::Comma) {
            expressions.push(self.parse_assignment_expression()?);
        }
        let span = join(self.ast.span(expressions[0]), self.ast.span(*expressions.last().unwrap()));
        Ok(self.ast.alloc(Node::SequenceExpression { span, expressions }))
    }

    /// `for (a in b)`/`for (a;;)` headers must not let a bare `in` operator
    /// be consumed as part of the initializer expression.
    fn parse_expression_no_in(&mut self) -> Result<NodeRef> {
        // `in` suppression only matters for the relational level; since we
        // special-case for-in/for-of detection before falling through to
        // the general expression parser, a plain expression parse is safe
        // here as long as callers check for `in`/`of` immediately after.
        self.parse_expression()
    }

    fn parse_assignment_expression(&mut self) -> Result<NodeRef> {
        if self.at(TokenKind::Yield) && self.ctx().in_generator {
            return self.parse_yield();
        }
        if let Some(arrow) = self.try_parse_arrow_function()? {
            return Ok(arrow);
        }

        let left = self.parse_conditional_expression()?;

        if let Some(op) = assignment_op(self.cur_kind()) {
            self.advance();
            let target = if op == AssignOp::Assign {
                js_ast::expression_to_pattern(&mut self.ast, left).unwrap_or(left)
            } else {
                left
            };
            let right = self.parse_assignment_expression()?;
            let span = join(self.ast.span(target), self.ast.span(right));
            return Ok(self.ast.alloc(Node::AssignmentExpression { span, operator: op, left: target, right }));
        }
        Ok(left)
    }

    fn parse_yield(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        let delegate = self.eat(TokenKind::Star);
        let argument = if self.cur().preceded_by_newline || matches!(self.cur_kind(), TokenKind::Semicolon | TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket | TokenKind::Comma | TokenKind::Colon | TokenKind::Eof) {
            None
        } else {
            Some(self.parse_assignment_expression()?)
        };
        let end = argument.map(|a| self.ast.span(a)).unwrap_or(start);
        Ok(self.ast.alloc(Node::YieldExpression { span: join(start, end), argument, delegate }))
    }

    /// Attempts an arrow function parse by speculatively scanning a
    /// parenthesized parameter list (or a bare identifier) followed by
    /// `=>`, backtracking the token cursor on mismatch. This is the
    /// "parse as expression, then reinterpret on seeing the commit token"
    /// technique spec §9 calls for, applied to arrow heads instead of
    /// destructuring targets.
    fn try_parse_arrow_function(&mut self) -> Result<Option<NodeRef>> {
        let checkpoint = self.pos;
        let is_async = self.at(TokenKind::Async) && !self.tokens[self.pos + 1].preceded_by_newline && matches!(self.tokens.get(self.pos + 1).map(|t| t.kind), Some(TokenKind::LParen) | Some(TokenKind::Identifier));
        let start_span = self.cur().span;
        if is_async {
            self.advance();
        }

        let params = if matches!(self.cur_kind(), TokenKind::Identifier) && self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Arrow) {
            let span = self.cur().span;
            let name = self.advance().lexeme;
            Some((vec![self.ast.alloc(Node::Identifier { span, name })], true))
        } else if self.at(TokenKind::LParen) {
            match self.try_parse_paren_param_list() {
                Some(p) if self.at(TokenKind::Arrow) => Some(p),
                _ => None,
            }
        } else {
            None
        };

        let Some((params, is_simple)) = params else {
            self.pos = checkpoint;
            return Ok(None);
        };

        self.expect(TokenKind::Arrow, "'=>'")?;
        let inherited_strict = self.ctx().in_strict;
        self.ctx.push(Context { in_function: true, in_async: is_async, in_arrow: true, in_strict: inherited_strict, ..Default::default() });
        if let Err(e) = self.validate_params(&params, is_simple) {
            self.ctx.pop();
            return Err(e);
        }
        let (body, is_concise) = if self.at(TokenKind::LBrace) {
            (self.parse_function_body_block()?, false)
        } else {
            (self.parse_assignment_expression()?, true)
        };
        self.ctx.pop();
        let span = join(start_span, self.ast.span(body));
        let function = Function { id: None, params, body, is_concise_arrow_body: is_concise, flags: FunctionFlags { is_async, is_generator: false, is_arrow: true } };
        Ok(Some(self.ast.alloc(Node::FunctionExpression { span, function })))
    }

    fn try_parse_paren_param_list(&mut self) -> Option<(Vec<NodeRef>, bool)> {
        let checkpoint = self.pos;
        self.advance(); // '('
        let mut params = Vec::new();
        let mut is_simple = true;
        while !self.at(TokenKind::RParen) {
            if self.eat(TokenKind::Ellipsis) {
                is_simple = false;
                let start = self.tokens[self.pos - 1].span;
                let arg = self.parse_binding_target().ok()?;
                let span = join(start, self.ast.span(arg));
                params.push(self.ast.alloc(Node::RestElement { span, argument: arg }));
                break;
            }
            let target = self.parse_binding_target().ok()?;
            if !matches!(self.ast.get(target), Node::Identifier { .. }) {
                is_simple = false;
            }
            let param = if self.eat(TokenKind::Eq) {
                is_simple = false;
                let default = self.parse_assignment_expression().ok()?;
                let span = join(self.ast.span(target), self.ast.span(default));
                self.ast.alloc(Node::AssignmentPattern { span, left: target, right: default })
            } else {
                target
            };
            params.push(param);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(TokenKind::RParen) {
            self.pos = checkpoint;
            return None;
        }
        Some((params, is_simple))
    }

    fn parse_conditional_expression(&mut self) -> Result<NodeRef> {
        let test = self.parse_binary_expression(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let alternate = self.parse_assignment_expression()?;
        let span = join(self.ast.span(test), self.ast.span(alternate));
        Ok(self.ast.alloc(Node::ConditionalExpression { span, test, consequent, alternate }))
    }

    /// Precedence-climbing loop over binary/logical operators, the same
    /// structure the prototype's `parse_expr(hp)` used, driven here by the
    /// `binding_power` lookup table instead of a method on `Token`.
    fn parse_binary_expression(&mut self, min_bp: u8) -> Result<NodeRef> {
        let mut left = self.parse_unary_expression()?;
        loop {
            let Some((bp, right_assoc)) = binding_power(self.cur_kind()) else { break };
            if bp < min_bp {
                break;
            }
            let op_kind = self.advance().kind;
            let next_min = if right_assoc { bp } else { bp + 1 };
            let right = self.parse_binary_expression(next_min)?;
            let span = join(self.ast.span(left), self.ast.span(right));
            left = if let Some(logical) = logical_op(op_kind) {
                self.ast.alloc(Node::LogicalExpression { span, operator: logical, left, right })
            } else {
                let binary = binary_op(op_kind).expect("binding_power and binary_op must agree");
                self.ast.alloc(Node::BinaryExpression { span, operator: binary, left, right })
            };
        }
        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<NodeRef> {
        let start = self.cur().span;
        if let Some(op) = unary_op(self.cur_kind()) {
            self.advance();
            let argument = self.parse_unary_expression()?;
            let span = join(start, self.ast.span(argument));
            return Ok(self.ast.alloc(Node::UnaryExpression { span, operator: op, argument }));
        }
        if matches!(self.cur_kind(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.advance().kind == TokenKind::PlusPlus { UpdateOp::Increment } else { UpdateOp::Decrement };
            let argument = self.parse_unary_expression()?;
            let span = join(start, self.ast.span(argument));
            return Ok(self.ast.alloc(Node::UpdateExpression { span, operator: op, argument, prefix: true }));
        }
        if self.at(TokenKind::Await) && self.ctx().in_async {
            self.advance();
            let argument = self.parse_unary_expression()?;
            let span = join(start, self.ast.span(argument));
            return Ok(self.ast.alloc(Node::AwaitExpression { span, argument }));
        }
        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> Result<NodeRef> {
        let expr = self.parse_lhs_expression()?;
        if !self.cur().preceded_by_newline && matches!(self.cur_kind(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.advance().kind == TokenKind::PlusPlus { UpdateOp::Increment } else { UpdateOp::Decrement };
            let span = self.ast.span(expr);
            return Ok(self.ast.alloc(Node::UpdateExpression { span, operator: op, argument: expr, prefix: false }));
        }
        Ok(expr)
    }

    fn parse_lhs_expression(&mut self) -> Result<NodeRef> {
        let mut expr = if self.at(TokenKind::New) { self.parse_new_expression()? } else { self.parse_primary_expression()? };
        loop {
            expr = match self.cur_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let span = self.cur().span;
                    let name = self.identifier_name()?;
                    let property = self.ast.alloc(Node::Identifier { span, name });
                    let full = join(self.ast.span(expr), span);
                    self.ast.alloc(Node::MemberExpression { span: full, object: expr, property, computed: false, optional: false })
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    if self.at(TokenKind::LParen) {
                        let args = self.parse_arguments()?;
                        let end = self.tokens[self.pos - 1].span;
                        let span = join(self.ast.span(expr), end);
                        self.ast.alloc(Node::CallExpression { span, callee: expr, arguments: args, optional: true })
                    } else if self.eat(TokenKind::LBracket) {
                        let property = self.parse_expression()?;
                        let end = self.expect(TokenKind::RBracket, "']'")?.span;
                        let span = join(self.ast.span(expr), end);
                        self.ast.alloc(Node::MemberExpression { span, object: expr, property, computed: true, optional: true })
                    } else {
                        let span = self.cur().span;
                        let name = self.identifier_name()?;
                        let property = self.ast.alloc(Node::Identifier { span, name });
                        let full = join(self.ast.span(expr), span);
                        self.ast.alloc(Node::MemberExpression { span: full, object: expr, property, computed: false, optional: true })
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.parse_expression()?;
                    let end = self.expect(TokenKind::RBracket, "']'")?.span;
                    let span = join(self.ast.span(expr), end);
                    self.ast.alloc(Node::MemberExpression { span, object: expr, property, computed: true, optional: false })
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    let end = self.tokens[self.pos - 1].span;
                    let span = join(self.ast.span(expr), end);
                    self.ast.alloc(Node::CallExpression { span, callee: expr, arguments: args, optional: false })
                }
                TokenKind::TemplateHead | TokenKind::NoSubstitutionTemplate => {
                    let quasi = self.parse_template_literal()?;
                    let span = join(self.ast.span(expr), self.ast.span(quasi));
                    self.ast.alloc(Node::TaggedTemplateExpression { span, tag: expr, quasi })
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    fn parse_new_expression(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        if self.eat(TokenKind::Dot) {
            let end = self.cur().span;
            let property = self.identifier_name()?;
            return Ok(self.ast.alloc(Node::MetaProperty { span: join(start, end), meta: "new".into(), property }));
        }
        let callee = if self.at(TokenKind::New) { self.parse_new_expression()? } else { self.parse_member_expression_only()? };
        let arguments = if self.at(TokenKind::LParen) { self.parse_arguments()? } else { Vec::new() };
        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Ok(self.ast.alloc(Node::NewExpression { span: join(start, end), callee, arguments }))
    }

    /// Member-expression chain without call parentheses, used for `new`
    /// callee parsing so `new a.b()` binds the call to the `new`, not `b`.
    fn parse_member_expression_only(&mut self) -> Result<NodeRef> {
        let mut expr = self.parse_primary_expression()?;
        loop {
            expr = match self.cur_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let span = self.cur().span;
                    let name = self.identifier_name()?;
                    let property = self.ast.alloc(Node::Identifier { span, name });
                    let full = join(self.ast.span(expr), span);
                    self.ast.alloc(Node::MemberExpression { span: full, object: expr, property, computed: false, optional: false })
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.parse_expression()?;
                    let end = self.expect(TokenKind::RBracket, "']'")?.span;
                    let span = join(self.ast.span(expr), end);
                    self.ast.alloc(Node::MemberExpression { span, object: expr, property, computed: true, optional: false })
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<NodeRef>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            if self.eat(TokenKind::Ellipsis) {
                let start = self.tokens[self.pos - 1].span;
                let arg = self.parse_assignment_expression()?;
                let span = join(start, self.ast.span(arg));
                args.push(self.ast.alloc(Node::SpreadElement { span, argument: arg }));
            } else {
                args.push(self.parse_assignment_expression()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary_expression(&mut self) -> Result<NodeRef> {
        let span = self.cur().span;
        match self.cur_kind() {
            TokenKind::This => {
                self.advance();
                Ok(self.ast.alloc(Node::ThisExpression { span }))
            }
            TokenKind::Super => {
                self.advance();
                Ok(self.ast.alloc(Node::SuperExpression { span }))
            }
            TokenKind::Identifier | TokenKind::Async | TokenKind::Static | TokenKind::Get | TokenKind::Set | TokenKind::Of | TokenKind::As | TokenKind::From | TokenKind::Let | TokenKind::Yield | TokenKind::Await => {
                let name = self.advance().lexeme;
                Ok(self.ast.alloc(Node::Identifier { span, name }))
            }
            TokenKind::PrivateIdentifier => {
                let name = self.advance().lexeme;
                Ok(self.ast.alloc(Node::PrivateIdentifier { span, name }))
            }
            TokenKind::NumericLiteral => {
                let literal = self.advance().literal_value;
                if self.ctx().in_strict && matches!(literal, Some(LiteralValue::LegacyOctalNumber(_))) {
                    return self.err("Octal literals are not allowed in strict mode".to_string());
                }
                let value = match literal {
                    Some(LiteralValue::Number(n) | LiteralValue::LegacyOctalNumber(n)) => n,
                    _ => f64::NAN,
                };
                Ok(self.ast.alloc(Node::NumberLiteral { span, value }))
            }
            TokenKind::BigIntLiteral => {
                let tok = self.advance();
                let digits = match tok.literal_value {
                    Some(LiteralValue::BigInt(v)) => v.to_string(),
                    _ => tok.lexeme,
                };
                Ok(self.ast.alloc(Node::BigIntLiteral { span, digits }))
            }
            TokenKind::StringLiteral => {
                let value = match self.advance().literal_value {
                    Some(LiteralValue::String(s)) => s,
                    _ => std::string::String::new(),
                };
                Ok(self.ast.alloc(Node::StringLiteral { span, value }))
            }
            TokenKind::True | TokenKind::False => {
                let value = self.advance().kind == TokenKind::True;
                Ok(self.ast.alloc(Node::BooleanLiteral { span, value }))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.ast.alloc(Node::NullLiteral { span }))
            }
            TokenKind::RegexLiteral => {
                let literal = self.advance().literal_value;
                let (pattern, flags) = match literal {
                    Some(LiteralValue::Regex { pattern, flags }) => (pattern, flags),
                    _ => (std::string::String::new(), std::string::String::new()),
                };
                Ok(self.ast.alloc(Node::RegexLiteral { span, pattern, flags }))
            }
            TokenKind::TemplateHead | TokenKind::NoSubstitutionTemplate => self.parse_template_literal(),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => {
                let span = self.cur().span;
                self.advance();
                let is_generator = self.eat(TokenKind::Star);
                let id = if matches!(self.cur_kind(), TokenKind::Identifier) {
                    let ispan = self.cur().span;
                    let name = self.advance().lexeme;
                    Some(self.ast.alloc(Node::Identifier { span: ispan, name }))
                } else {
                    None
                };
                let function = self.parse_function_rest(id, FunctionFlags { is_generator, ..Default::default() })?;
                let full = join(span, self.ast.span(function.body));
                Ok(self.ast.alloc(Node::FunctionExpression { span: full, function }))
            }
            TokenKind::Class => self.parse_class(false),
            TokenKind::Async if self.tokens.get(self.pos + 1).map(|t| t.kind) == Some(TokenKind::Function) => {
                self.advance();
                let span = self.cur().span;
                self.advance();
                let is_generator = self.eat(TokenKind::Star);
                let function = self.parse_function_rest(None, FunctionFlags { is_async: true, is_generator, ..Default::default() })?;
                let full = join(span, self.ast.span(function.body));
                Ok(self.ast.alloc(Node::FunctionExpression { span: full, function }))
            }
            other => self.err(format!("unexpected token {other:?}")),
        }
    }

    fn parse_array_literal(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        let mut elements = Vec::new();
        while !self.at(TokenKind::RBracket) {
            if self.at(TokenKind::Comma) {
                self.advance();
                elements.push(None);
                continue;
            }
            if self.eat(TokenKind::Ellipsis) {
                let estart = self.tokens[self.pos - 1].span;
                let arg = self.parse_assignment_expression()?;
                let span = join(estart, self.ast.span(arg));
                elements.push(Some(self.ast.alloc(Node::SpreadElement { span, argument: arg })));
            } else {
                elements.push(Some(self.parse_assignment_expression()?));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBracket, "']'")?.span;
        Ok(self.ast.alloc(Node::ArrayExpression { span: join(start, end), elements }))
    }

    fn parse_object_literal(&mut self) -> Result<NodeRef> {
        let start = self.advance().span;
        let mut properties = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.eat(TokenKind::Ellipsis) {
                let estart = self.tokens[self.pos - 1].span;
                let arg = self.parse_assignment_expression()?;
                let span = join(estart, self.ast.span(arg));
                let spread = self.ast.alloc(Node::SpreadElement { span, argument: arg });
                properties.push(ObjectProperty { key: spread, value: spread, computed: false, shorthand: false, kind: PropertyKind::Spread });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                continue;
            }

            let mut kind = PropertyKind::Init;
            let mut is_async = false;
            let mut is_generator = false;
            if self.at(TokenKind::Async) && !matches!(self.tokens.get(self.pos + 1).map(|t| t.kind), Some(TokenKind::Colon) | Some(TokenKind::Comma) | Some(TokenKind::RBrace) | Some(TokenKind::LParen)) {
                self.advance();
                is_async = true;
            }
            if self.eat(TokenKind::Star) {
                is_generator = true;
            }
            if matches!(self.cur_kind(), TokenKind::Get | TokenKind::Set)
                && !matches!(self.tokens.get(self.pos + 1).map(|t| t.kind), Some(TokenKind::Colon) | Some(TokenKind::Comma) | Some(TokenKind::RBrace) | Some(TokenKind::LParen))
            {
                kind = if self.advance().kind == TokenKind::Get { PropertyKind::Get } else { PropertyKind::Set };
            }

            let (key, computed, _) = self.parse_property_key()?;

            if self.at(TokenKind::LParen) {
                let function = self.parse_function_rest(None, FunctionFlags { is_async, is_generator, ..Default::default() })?;
                let span = self.ast.span(function.body);
                let value = self.ast.alloc(Node::FunctionExpression { span, function });
                properties.push(ObjectProperty { key, value, computed, shorthand: false, kind: if kind == PropertyKind::Init { PropertyKind::Method } else { kind } });
            } else if self.eat(TokenKind::Colon) {
                let value = self.parse_assignment_expression()?;
                properties.push(ObjectProperty { key, value, computed, shorthand: false, kind: PropertyKind::Init });
            } else if self.eat(TokenKind::Eq) {
                // Shorthand with a default — only valid once reinterpreted
                // as a destructuring pattern, kept here as an
                // AssignmentPattern value so `expression_to_pattern` can
                // recognize it later.
                let default = self.parse_assignment_expression()?;
                let span = join(self.ast.span(key), self.ast.span(default));
                let value = self.ast.alloc(Node::AssignmentPattern { span, left: key, right: default });
                properties.push(ObjectProperty { key, value, computed, shorthand: true, kind: PropertyKind::Init });
            } else {
                properties.push(ObjectProperty { key, value: key, computed, shorthand: true, kind: PropertyKind::Init });
            }

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace, "'}'")?.span;
        Ok(self.ast.alloc(Node::ObjectExpression { span: join(start, end), properties }))
    }

    fn parse_template_literal(&mut self) -> Result<NodeRef> {
        let start = self.cur().span;
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();

        if self.at(TokenKind::NoSubstitutionTemplate) {
            let tok = self.advance();
            let cooked = template_text(&tok);
            quasis.push(TemplateQuasi { cooked: cooked.clone(), raw: tok.lexeme, tail: true });
            return Ok(self.ast.alloc(Node::TemplateLiteral { span: start, quasis, expressions }));
        }

        let head = self.expect(TokenKind::TemplateHead, "template literal")?;
        quasis.push(TemplateQuasi { cooked: template_text(&head), raw: head.lexeme, tail: false });
        loop {
            expressions.push(self.parse_expression()?);
            if !matches!(self.cur_kind(), TokenKind::TemplateMiddle | TokenKind::TemplateTail) {
                return self.err("expected template continuation".to_string());
            }
            let part = self.advance();
            let tail = part.kind == TokenKind::TemplateTail;
            quasis.push(TemplateQuasi { cooked: template_text(&part), raw: part.lexeme.clone(), tail });
            if tail {
                break;
            }
        }
        let end = self.tokens[self.pos - 1].span;
        Ok(self.ast.alloc(Node::TemplateLiteral { span: join(start, end), quasis, expressions }))
    }
}

fn template_text(tok: &Token) -> std::string::String {
    match &tok.literal_value {
        Some(LiteralValue::TemplatePart(s)) => s.clone(),
        _ => std::string::String::new(),
    }
}

fn unary_op(kind: TokenKind) -> Option<UnaryOp> {
    Some(match kind {
        TokenKind::Plus => UnaryOp::Plus,
        TokenKind::Minus => UnaryOp::Minus,
        TokenKind::Bang => UnaryOp::Not,
        TokenKind::Tilde => UnaryOp::BitNot,
        TokenKind::TypeOf => UnaryOp::TypeOf,
        TokenKind::Void => UnaryOp::Void,
        TokenKind::Delete => UnaryOp::Delete,
        _ => return None,
    })
}

fn assignment_op(kind: TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Eq => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        TokenKind::PercentEq => AssignOp::Mod,
        TokenKind::StarStarEq => AssignOp::Pow,
        TokenKind::ShiftLeftEq => AssignOp::Shl,
        TokenKind::ShiftRightEq => AssignOp::Shr,
        TokenKind::UShiftRightEq => AssignOp::UShr,
        TokenKind::AmpEq => AssignOp::BitAnd,
        TokenKind::PipeEq => AssignOp::BitOr,
        TokenKind::CaretEq => AssignOp::BitXor,
        TokenKind::AmpAmpEq => AssignOp::LogicalAnd,
        TokenKind::PipePipeEq => AssignOp::LogicalOr,
        TokenKind::QuestionQuestionEq => AssignOp::NullishCoalesce,
        _ => return None,
    })
}

fn logical_op(kind: TokenKind) -> Option<LogicalOp> {
    Some(match kind {
        TokenKind::AmpAmp => LogicalOp::And,
        TokenKind::PipePipe => LogicalOp::Or,
        TokenKind::QuestionQuestion => LogicalOp::NullishCoalesce,
        _ => return None,
    })
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::StarStar => BinaryOp::Pow,
        TokenKind::ShiftLeft => BinaryOp::Shl,
        TokenKind::ShiftRight => BinaryOp::Shr,
        TokenKind::UShiftRight => BinaryOp::UShr,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Lte => BinaryOp::Lte,
        TokenKind::Gte => BinaryOp::Gte,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::EqEqEq => BinaryOp::StrictEq,
        TokenKind::NotEqEq => BinaryOp::StrictNotEq,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::In => BinaryOp::In,
        TokenKind::InstanceOf => BinaryOp::InstanceOf,
        _ => return None,
    })
}

/// `(binding power, right-associative)` for every binary/logical operator,
/// consulted by the climbing loop exactly as the prototype's `Token::lbp()`
/// was.
fn binding_power(kind: TokenKind) -> Option<(u8, bool)> {
    Some(match kind {
        TokenKind::PipePipe | TokenKind::QuestionQuestion => (2, false),
        TokenKind::AmpAmp => (3, false),
        TokenKind::Pipe => (4, false),
        TokenKind::Caret => (5, false),
        TokenKind::Amp => (6, false),
        TokenKind::EqEq | TokenKind::NotEq | TokenKind::EqEqEq | TokenKind::NotEqEq => (7, false),
        TokenKind::Lt | TokenKind::Gt | TokenKind::Lte | TokenKind::Gte | TokenKind::In | TokenKind::InstanceOf => (8, false),
        TokenKind::ShiftLeft | TokenKind::ShiftRight | TokenKind::UShiftRight => (9, false),
        TokenKind::Plus | TokenKind::Minus => (10, false),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (11, false),
        TokenKind::StarStar => (12, true),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParseOutput {
        Parser::parse_program(src, false).unwrap()
    }

    #[test]
    fn parses_binary_precedence() {
        let out = parse("1 + 2 * 3;");
        let Node::Program { body, .. } = out.ast.get(out.program) else { panic!() };
        let Node::ExpressionStatement { expression, .. } = out.ast.get(body[0]) else { panic!() };
        let Node::BinaryExpression { operator, right, .. } = out.ast.get(*expression) else { panic!("expected binary") };
        assert_eq!(*operator, BinaryOp::Add);
        assert!(matches!(out.ast.get(*right), Node::BinaryExpression { operator: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_exponent_as_right_associative() {
        let out = parse("2 ** 3 ** 2;");
        let Node::Program { body, .. } = out.ast.get(out.program) else { panic!() };
        let Node::ExpressionStatement { expression, .. } = out.ast.get(body[0]) else { panic!() };
        let Node::BinaryExpression { operator, right, .. } = out.ast.get(*expression) else { panic!() };
        assert_eq!(*operator, BinaryOp::Pow);
        assert!(matches!(out.ast.get(*right), Node::BinaryExpression { operator: BinaryOp::Pow, .. }));
    }

    #[test]
    fn parses_arrow_function_with_destructured_param() {
        let out = parse("const f = ({a, b}) => a + b;");
        let Node::Program { body, .. } = out.ast.get(out.program) else { panic!() };
        assert!(matches!(out.ast.get(body[0]), Node::VariableDeclaration { .. }));
    }

    #[test]
    fn asi_inserts_semicolon_across_newline() {
        let out = parse("let a = 1\nlet b = 2");
        let Node::Program { body, .. } = out.ast.get(out.program) else { panic!() };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn with_statement_rejected_in_strict_mode() {
        let result = Parser::parse_program("'use strict';\nwith (a) {}", false);
        assert!(result.is_err());
        let result = Parser::parse_program("with (a) {}", true);
        assert!(result.is_err());
        let result = Parser::parse_program("with (a) {}", false);
        assert!(result.is_ok());
    }

    #[test]
    fn directive_prologue_makes_function_body_strict() {
        let result = Parser::parse_program("function f() { 'use strict'; with (a) {} }", false);
        assert!(result.is_err());
        let result = Parser::parse_program("function f() { with (a) {} }", false);
        assert!(result.is_ok());
    }

    #[test]
    fn legacy_octal_rejected_under_use_strict_directive() {
        let result = Parser::parse_program("'use strict';\nlet x = 010;", false);
        assert!(result.is_err());
        let result = Parser::parse_program("let x = 010;", false);
        assert!(result.is_ok());
    }

    #[test]
    fn duplicate_params_rejected_in_strict_mode_but_allowed_in_sloppy_mode() {
        let result = Parser::parse_program("'use strict';\nfunction f(a, a) {}", false);
        assert!(result.is_err());
        let result = Parser::parse_program("function f(a, a) {}", false);
        assert!(result.is_ok());
    }

    #[test]
    fn duplicate_params_always_rejected_for_arrow_functions() {
        let result = Parser::parse_program("const f = (a, a) => a;", false);
        assert!(result.is_err());
    }

    #[test]
    fn eval_and_arguments_rejected_as_strict_param_names() {
        let result = Parser::parse_program("'use strict';\nfunction f(eval) {}", false);
        assert!(result.is_err());
        let result = Parser::parse_program("function f(eval) {}", false);
        assert!(result.is_ok());
    }

    #[test]
    fn await_rejected_as_async_function_param_name() {
        let result = Parser::parse_program("async function f(await) {}", false);
        assert!(result.is_err());
    }

    #[test]
    fn break_outside_loop_is_a_syntax_error() {
        assert!(Parser::parse_program("break;", false).is_err());
    }
}
