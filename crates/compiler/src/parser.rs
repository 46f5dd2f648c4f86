//! Recursive-descent parser for the C subset
//!
//! Expressions use precedence climbing over the C binary operator table;
//! declarations use a specifier/declarator split with a typedef-name set
//! maintained by the parser itself to disambiguate `T x;` from `a * b;`.
//!
//! On a syntax error inside a statement the parser skips to the next `;`
//! or `}` and keeps going, so one run can report several errors. A parse
//! with any recorded error yields no AST.

use crate::ast::{
    BinaryOp, BlockItem, Decl, EnumDecl, Enumerator, Expr, ExprKind, FuncDecl, Initializer,
    MemberDecl, Param, PostfixOp, RecordDecl, Span, Stmt, StorageClass, TranslationUnit,
    TypedefDecl, UnaryOp, VarDecl,
};
use crate::diag::Diagnostic;
use crate::lexer::{Keyword, Punct, Token, TokenKind};
use crate::types::{IntWidth, Type, TypeKind};
use std::collections::HashSet;

/// `Err(())` means a diagnostic has already been recorded
type PResult<T> = Result<T, ()>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    diagnostics: Vec<Diagnostic>,
    /// Names introduced by `typedef`, consulted on every type-specifier parse
    typedef_names: HashSet<String>,
    /// Record/enum definitions encountered inside declarations; emitted
    /// ahead of the declaration that contains them
    hoisted: Vec<Decl>,
    /// Counter for anonymous struct/union/enum tags
    next_anon: usize,
    /// Parameters of the most recently parsed function declarator, with
    /// their names; consumed when that declarator turns out to be a
    /// function definition
    last_param_list: Vec<Param>,
}

/// Parse a token stream into a translation unit.
///
/// Returns all syntax diagnostics when any error was recorded; the
/// pipeline halts after the parse phase in that case.
pub fn parse(tokens: Vec<Token>, file: &str) -> Result<TranslationUnit, Vec<Diagnostic>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        file: file.to_string(),
        diagnostics: Vec::new(),
        typedef_names: HashSet::new(),
        hoisted: Vec::new(),
        next_anon: 0,
        last_param_list: Vec::new(),
    };
    let unit = parser.parse_translation_unit();
    if parser.diagnostics.is_empty() {
        Ok(unit)
    } else {
        Err(parser.diagnostics)
    }
}

/// Collapsed declaration specifiers
struct Specs {
    storage: StorageClass,
    is_typedef: bool,
    base: Type,
}

impl Parser {
    // ------------------------------------------------------------------
    // Token cursor helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn nth(&self, off: usize) -> &Token {
        &self.tokens[(self.pos + off).min(self.tokens.len() - 1)]
    }

    fn span(&self) -> Span {
        let t = self.peek();
        Span::new(t.line, t.column)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        t
    }

    fn check_punct(&self, p: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(p)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(kw)
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.check_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let t = self.peek().clone();
        self.diagnostics
            .push(Diagnostic::error(&self.file, t.line, t.column, message));
    }

    fn describe_token(t: &Token) -> String {
        match &t.kind {
            TokenKind::Eof => "end of file".to_string(),
            _ => format!("'{}'", t.text),
        }
    }

    fn expect_punct(&mut self, p: Punct, what: &str) -> PResult<Span> {
        if self.check_punct(p) {
            let span = self.span();
            self.pos += 1;
            Ok(span)
        } else {
            let found = Self::describe_token(self.peek());
            self.error_here(format!("expected {} but found {}", what, found));
            Err(())
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<(String, Span)> {
        if matches!(self.peek().kind, TokenKind::Ident) {
            let t = self.advance();
            Ok((t.text, Span::new(t.line, t.column)))
        } else {
            let found = Self::describe_token(self.peek());
            self.error_here(format!("expected {} but found {}", what, found));
            Err(())
        }
    }

    /// Skip to the next `;` (consumed) or `}` (left in place)
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if self.eat_punct(Punct::Semi) {
                return;
            }
            if self.check_punct(Punct::RBrace) {
                return;
            }
            self.pos += 1;
        }
    }

    fn fresh_anon_tag(&mut self, what: &str) -> String {
        let tag = format!("{}.{}", what, self.next_anon);
        self.next_anon += 1;
        tag
    }

    // ------------------------------------------------------------------
    // Translation unit
    // ------------------------------------------------------------------

    fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut unit = TranslationUnit { decls: Vec::new() };
        while !self.at_eof() {
            match self.parse_external_declaration() {
                Ok(decls) => {
                    unit.decls.append(&mut self.hoisted);
                    unit.decls.extend(decls);
                }
                Err(()) => {
                    self.hoisted.clear();
                    self.synchronize();
                    // a stray closing brace at top level would loop forever
                    if self.check_punct(Punct::RBrace) {
                        self.pos += 1;
                    }
                }
            }
        }
        unit
    }

    fn parse_external_declaration(&mut self) -> PResult<Vec<Decl>> {
        let specs = self.parse_decl_specifiers(true)?;

        // `struct S { ... };` or `enum E { ... };` with no declarator
        if self.eat_punct(Punct::Semi) {
            return Ok(Vec::new());
        }

        let mut decls = Vec::new();
        loop {
            let (name, ty, span) = self.parse_declarator(specs.base.clone())?;
            let Some(name) = name else {
                self.error_here("expected a declarator name");
                return Err(());
            };

            if specs.is_typedef {
                self.typedef_names.insert(name.clone());
                decls.push(Decl::Typedef(TypedefDecl { name, ty, span }));
            } else if ty.is_function() && self.check_punct(Punct::LBrace) {
                if !decls.is_empty() {
                    self.error_here("function definition cannot follow other declarators");
                    return Err(());
                }
                let func = self.parse_function_definition(name, ty, specs.storage, span)?;
                return Ok(vec![Decl::Func(func)]);
            } else if ty.is_function() {
                let func = Self::split_function_type(name, ty, specs.storage, span);
                decls.push(Decl::Func(func));
            } else {
                let init = if self.eat_punct(Punct::Assign) {
                    Some(self.parse_initializer()?)
                } else {
                    None
                };
                decls.push(Decl::Var(VarDecl {
                    name,
                    ty,
                    init,
                    storage: specs.storage,
                    is_global: true,
                    span,
                }));
            }

            if self.eat_punct(Punct::Comma) {
                continue;
            }
            self.expect_punct(Punct::Semi, "';' after declaration")?;
            break;
        }
        Ok(decls)
    }

    fn split_function_type(
        name: String,
        ty: Type,
        storage: StorageClass,
        span: Span,
    ) -> FuncDecl {
        let TypeKind::Function {
            ret,
            params,
            variadic,
        } = ty.kind
        else {
            unreachable!("caller checked is_function");
        };
        FuncDecl {
            name,
            ret: *ret,
            params: params
                .into_iter()
                .map(|ty| Param {
                    name: None,
                    ty,
                    span,
                })
                .collect(),
            variadic,
            body: None,
            storage,
            span,
        }
    }

    fn parse_function_definition(
        &mut self,
        name: String,
        ty: Type,
        storage: StorageClass,
        span: Span,
    ) -> PResult<FuncDecl> {
        let TypeKind::Function {
            ret,
            params: _,
            variadic,
        } = ty.kind
        else {
            unreachable!("caller checked is_function");
        };
        // Re-use the named parameters captured by the declarator parse
        let params = std::mem::take(&mut self.last_param_list);
        for p in &params {
            if p.name.is_none() && !p.ty.is_void() {
                self.diagnostics.push(Diagnostic::error(
                    &self.file,
                    p.span.line,
                    p.span.column,
                    format!("parameter of function '{}' needs a name", name),
                ));
            }
        }
        let body = self.parse_compound_items()?;
        Ok(FuncDecl {
            name,
            ret: *ret,
            params,
            variadic,
            body: Some(body),
            storage,
            span,
        })
    }

    // ------------------------------------------------------------------
    // Declaration specifiers
    // ------------------------------------------------------------------

    /// True when the current token can begin a declaration
    fn starts_declaration(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::Void
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Int
                    | Keyword::Long
                    | Keyword::Signed
                    | Keyword::Unsigned
                    | Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Const
                    | Keyword::Typedef
                    | Keyword::Static
                    | Keyword::Extern
                    | Keyword::Auto
                    | Keyword::Register
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Volatile
            ),
            TokenKind::Ident => self.typedef_names.contains(&self.peek().text),
            _ => false,
        }
    }

    /// True when the current token can begin a type name (casts, sizeof)
    fn starts_type_name(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::Void
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Int
                    | Keyword::Long
                    | Keyword::Signed
                    | Keyword::Unsigned
                    | Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Const
            ),
            TokenKind::Ident => self.typedef_names.contains(&self.peek().text),
            _ => false,
        }
    }

    /// Collapse storage-class and type specifiers, in any order, into a
    /// canonical tuple. Inline struct/union/enum definitions are hoisted.
    fn parse_decl_specifiers(&mut self, allow_storage: bool) -> PResult<Specs> {
        let mut storage = StorageClass::None;
        let mut is_typedef = false;
        let mut is_const = false;

        let mut saw_void = false;
        let mut saw_char = false;
        let mut saw_int = false;
        let mut short_count = 0usize;
        let mut long_count = 0usize;
        let mut signedness: Option<bool> = None; // Some(true) = unsigned
        let mut tagged: Option<Type> = None;
        let mut any = false;

        loop {
            let kw = match &self.peek().kind {
                TokenKind::Keyword(kw) => *kw,
                TokenKind::Ident
                    if tagged.is_none()
                        && !saw_void
                        && !saw_char
                        && !saw_int
                        && short_count == 0
                        && long_count == 0
                        && signedness.is_none()
                        && self.typedef_names.contains(&self.peek().text) =>
                {
                    let t = self.advance();
                    tagged = Some(Type::new(TypeKind::Alias(t.text)));
                    any = true;
                    continue;
                }
                _ => break,
            };
            match kw {
                Keyword::Typedef => {
                    self.pos += 1;
                    is_typedef = true;
                }
                Keyword::Static | Keyword::Extern | Keyword::Auto | Keyword::Register => {
                    self.pos += 1;
                    if !allow_storage {
                        self.error_here("storage class is not allowed here");
                        return Err(());
                    }
                    if storage != StorageClass::None {
                        self.error_here("multiple storage classes in declaration");
                        return Err(());
                    }
                    storage = match kw {
                        Keyword::Static => StorageClass::Static,
                        Keyword::Extern => StorageClass::Extern,
                        Keyword::Auto => StorageClass::Auto,
                        _ => StorageClass::Register,
                    };
                }
                Keyword::Const => {
                    self.pos += 1;
                    is_const = true;
                }
                Keyword::Void => {
                    self.pos += 1;
                    saw_void = true;
                    any = true;
                }
                Keyword::Char => {
                    self.pos += 1;
                    saw_char = true;
                    any = true;
                }
                Keyword::Short => {
                    self.pos += 1;
                    short_count += 1;
                    any = true;
                }
                Keyword::Int => {
                    self.pos += 1;
                    saw_int = true;
                    any = true;
                }
                Keyword::Long => {
                    self.pos += 1;
                    long_count += 1;
                    any = true;
                }
                Keyword::Signed => {
                    self.pos += 1;
                    signedness = Some(false);
                    any = true;
                }
                Keyword::Unsigned => {
                    self.pos += 1;
                    signedness = Some(true);
                    any = true;
                }
                Keyword::Struct | Keyword::Union => {
                    let ty = self.parse_record_specifier(kw == Keyword::Union)?;
                    tagged = Some(ty);
                    any = true;
                }
                Keyword::Enum => {
                    let ty = self.parse_enum_specifier()?;
                    tagged = Some(ty);
                    any = true;
                }
                Keyword::Float | Keyword::Double => {
                    self.error_here("floating-point types are not supported");
                    return Err(());
                }
                Keyword::Volatile => {
                    self.error_here("'volatile' is not supported");
                    return Err(());
                }
                _ => break,
            }
        }

        if !any && storage == StorageClass::None && !is_typedef && !is_const {
            let found = Self::describe_token(self.peek());
            self.error_here(format!("expected a declaration but found {}", found));
            return Err(());
        }

        let mut base = if let Some(ty) = tagged {
            if saw_void || saw_char || saw_int || short_count > 0 || long_count > 0 {
                self.error_here("invalid combination of type specifiers");
                return Err(());
            }
            ty
        } else if saw_void {
            Type::void()
        } else {
            let unsigned = signedness == Some(true);
            let width = if saw_char {
                if short_count > 0 || long_count > 0 {
                    self.error_here("invalid combination of type specifiers");
                    return Err(());
                }
                IntWidth::Char
            } else if short_count > 0 {
                IntWidth::Short
            } else if long_count > 0 {
                IntWidth::Long
            } else {
                // bare `signed` / `unsigned` / `int`, or an implicit int
                IntWidth::Int
            };
            Type::integer(width, unsigned)
        };
        if is_const {
            base = base.with_const();
        }

        Ok(Specs {
            storage,
            is_typedef,
            base,
        })
    }

    fn parse_record_specifier(&mut self, is_union: bool) -> PResult<Type> {
        let span = self.span();
        self.pos += 1; // struct / union
        let tag = if matches!(self.peek().kind, TokenKind::Ident) {
            self.advance().text
        } else if self.check_punct(Punct::LBrace) {
            self.fresh_anon_tag(if is_union { "union" } else { "struct" })
        } else {
            self.error_here("expected a tag or '{' after 'struct'/'union'");
            return Err(());
        };

        if self.eat_punct(Punct::LBrace) {
            let mut members = Vec::new();
            while !self.check_punct(Punct::RBrace) {
                if self.at_eof() {
                    self.error_here(format!("unexpected end of file in '{}'", tag));
                    return Err(());
                }
                let specs = self.parse_decl_specifiers(false)?;
                loop {
                    let (name, ty, mspan) = self.parse_declarator(specs.base.clone())?;
                    let Some(name) = name else {
                        self.error_here("expected a member name");
                        return Err(());
                    };
                    if self.check_punct(Punct::Colon) {
                        self.error_here("bit-fields are not supported");
                        return Err(());
                    }
                    members.push(MemberDecl {
                        name,
                        ty,
                        span: mspan,
                    });
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::Semi, "';' after member declaration")?;
            }
            self.expect_punct(Punct::RBrace, "'}'")?;
            self.hoisted.push(Decl::Record(RecordDecl {
                tag: tag.clone(),
                is_union,
                members: Some(members),
                span,
            }));
        }
        Ok(Type::new(TypeKind::Record { tag, is_union }))
    }

    fn parse_enum_specifier(&mut self) -> PResult<Type> {
        let span = self.span();
        self.pos += 1; // enum
        let tag = if matches!(self.peek().kind, TokenKind::Ident) {
            Some(self.advance().text)
        } else {
            None
        };

        if self.eat_punct(Punct::LBrace) {
            let mut enumerators = Vec::new();
            loop {
                if self.check_punct(Punct::RBrace) {
                    break;
                }
                let (name, espan) = self.expect_ident("an enumerator name")?;
                let value = if self.eat_punct(Punct::Assign) {
                    Some(self.parse_conditional()?)
                } else {
                    None
                };
                enumerators.push(Enumerator {
                    name,
                    value,
                    span: espan,
                });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace, "'}' after enumerator list")?;
            if enumerators.is_empty() {
                self.error_here("enum declaration needs at least one enumerator");
                return Err(());
            }
            self.hoisted.push(Decl::Enum(EnumDecl {
                tag,
                enumerators,
                span,
            }));
        } else if tag.is_none() {
            self.error_here("expected a tag or '{' after 'enum'");
            return Err(());
        }
        // enum-typed objects have type int
        Ok(Type::int())
    }

    // ------------------------------------------------------------------
    // Declarators
    // ------------------------------------------------------------------

    fn parse_declarator(&mut self, base: Type) -> PResult<(Option<String>, Type, Span)> {
        let mut ty = base;
        while self.eat_punct(Punct::Star) {
            ty = Type::pointer_to(ty);
            while self.eat_kw(Keyword::Const) {
                ty.is_const = true;
            }
        }
        self.parse_direct_declarator(ty)
    }

    fn parse_direct_declarator(&mut self, base: Type) -> PResult<(Option<String>, Type, Span)> {
        // One level of function-pointer declarator: `(*name)(params)`
        if self.check_punct(Punct::LParen) && self.nth(1).kind == TokenKind::Punct(Punct::Star) {
            self.pos += 2;
            let (name, span) = self.expect_ident("a declarator name after '(*'")?;
            self.expect_punct(Punct::RParen, "')'")?;
            self.expect_punct(Punct::LParen, "'(' for the parameter list")?;
            let (params, variadic) = self.parse_param_list()?;
            let fn_ty = Type::new(TypeKind::Function {
                ret: Box::new(base),
                params: params.into_iter().map(|p| p.ty).collect(),
                variadic,
            });
            return Ok((Some(name), Type::pointer_to(fn_ty), span));
        }

        let (name, span) = if matches!(self.peek().kind, TokenKind::Ident) {
            let t = self.advance();
            (Some(t.text), Span::new(t.line, t.column))
        } else {
            (None, self.span())
        };

        if self.check_punct(Punct::LParen) {
            self.pos += 1;
            let (params, variadic) = self.parse_param_list()?;
            self.last_param_list = params.clone();
            let ty = Type::new(TypeKind::Function {
                ret: Box::new(base),
                params: params.into_iter().map(|p| p.ty).collect(),
                variadic,
            });
            return Ok((name, ty, span));
        }

        let mut dims = Vec::new();
        while self.eat_punct(Punct::LBracket) {
            if self.eat_punct(Punct::RBracket) {
                dims.push(None);
                continue;
            }
            let size_expr = self.parse_conditional()?;
            let size = match Self::fold_int_expr(&size_expr) {
                Some(n) if n >= 0 => n as usize,
                Some(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        &self.file,
                        size_expr.span.line,
                        size_expr.span.column,
                        "array size must be non-negative",
                    ));
                    return Err(());
                }
                None => {
                    self.diagnostics.push(Diagnostic::error(
                        &self.file,
                        size_expr.span.line,
                        size_expr.span.column,
                        "array size must be an integer constant expression",
                    ));
                    return Err(());
                }
            };
            self.expect_punct(Punct::RBracket, "']'")?;
            dims.push(Some(size));
        }
        let mut ty = base;
        for dim in dims.into_iter().rev() {
            ty = Type::array_of(ty, dim);
        }
        Ok((name, ty, span))
    }

    fn parse_param_list(&mut self) -> PResult<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        let mut variadic = false;

        // `(void)` and `()` both mean "no parameters"
        if self.check_kw(Keyword::Void) && self.nth(1).kind == TokenKind::Punct(Punct::RParen) {
            self.pos += 2;
            return Ok((params, false));
        }
        if self.eat_punct(Punct::RParen) {
            return Ok((params, false));
        }

        loop {
            if self.eat_punct(Punct::Ellipsis) {
                variadic = true;
                break;
            }
            let specs = self.parse_decl_specifiers(false)?;
            let (name, mut ty, span) = self.parse_declarator(specs.base)?;
            // arrays and functions adjust to pointers in parameter position
            if let TypeKind::Array { elem, .. } = ty.kind {
                ty = Type::pointer_to(*elem);
            } else if ty.is_function() {
                ty = Type::pointer_to(ty);
            }
            params.push(Param { name, ty, span });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen, "')' after parameters")?;
        Ok((params, variadic))
    }

    /// Type name for casts and `sizeof`: specifiers + abstract declarator
    fn parse_type_name(&mut self) -> PResult<Type> {
        let specs = self.parse_decl_specifiers(false)?;
        let (name, ty, span) = self.parse_declarator(specs.base)?;
        if let Some(name) = name {
            self.diagnostics.push(Diagnostic::error(
                &self.file,
                span.line,
                span.column,
                format!("unexpected name '{}' in type name", name),
            ));
            return Err(());
        }
        Ok(ty)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_compound_items(&mut self) -> PResult<Vec<BlockItem>> {
        self.expect_punct(Punct::LBrace, "'{'")?;
        let mut items = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.at_eof() {
                self.error_here("unexpected end of file inside a block");
                return Err(());
            }
            if self.starts_declaration() {
                match self.parse_local_declaration() {
                    Ok(mut decls) => items.append(&mut decls),
                    Err(()) => self.synchronize(),
                }
            } else {
                match self.parse_statement() {
                    Ok(stmt) => items.push(BlockItem::Stmt(stmt)),
                    Err(()) => self.synchronize(),
                }
            }
        }
        self.expect_punct(Punct::RBrace, "'}'")?;
        Ok(items)
    }

    fn parse_local_declaration(&mut self) -> PResult<Vec<BlockItem>> {
        let specs = self.parse_decl_specifiers(true)?;
        if self.eat_punct(Punct::Semi) {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        loop {
            let (name, ty, span) = self.parse_declarator(specs.base.clone())?;
            let Some(name) = name else {
                self.error_here("expected a declarator name");
                return Err(());
            };
            if specs.is_typedef {
                self.typedef_names.insert(name.clone());
                self.hoisted
                    .push(Decl::Typedef(TypedefDecl { name, ty, span }));
            } else {
                let init = if self.eat_punct(Punct::Assign) {
                    Some(self.parse_initializer()?)
                } else {
                    None
                };
                items.push(BlockItem::Decl(VarDecl {
                    name,
                    ty,
                    init,
                    storage: specs.storage,
                    is_global: false,
                    span,
                }));
            }
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            self.expect_punct(Punct::Semi, "';' after declaration")?;
            break;
        }
        Ok(items)
    }

    fn parse_initializer(&mut self) -> PResult<Initializer> {
        if self.check_punct(Punct::LBrace) {
            let span = self.span();
            self.pos += 1;
            let mut items = Vec::new();
            loop {
                if self.check_punct(Punct::RBrace) {
                    break;
                }
                items.push(self.parse_initializer()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace, "'}' after initializer list")?;
            Ok(Initializer::List(items, span))
        } else {
            Ok(Initializer::Expr(self.parse_assign()?))
        }
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let span = self.span();

        // labeled statement: identifier ':'
        if matches!(self.peek().kind, TokenKind::Ident)
            && self.nth(1).kind == TokenKind::Punct(Punct::Colon)
        {
            let label = self.advance().text;
            self.pos += 1; // ':'
            let body = self.parse_statement()?;
            return Ok(Stmt::Labeled {
                label,
                body: Box::new(body),
                span,
            });
        }

        match &self.peek().kind {
            TokenKind::Punct(Punct::LBrace) => {
                let items = self.parse_compound_items()?;
                Ok(Stmt::Compound { items, span })
            }
            TokenKind::Punct(Punct::Semi) => {
                self.pos += 1;
                Ok(Stmt::Empty { span })
            }
            TokenKind::Keyword(Keyword::If) => {
                self.pos += 1;
                self.expect_punct(Punct::LParen, "'(' after 'if'")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "')'")?;
                let then_branch = Box::new(self.parse_statement()?);
                let else_branch = if self.eat_kw(Keyword::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    span,
                })
            }
            TokenKind::Keyword(Keyword::While) => {
                self.pos += 1;
                self.expect_punct(Punct::LParen, "'(' after 'while'")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "')'")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { cond, body, span })
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.pos += 1;
                let body = Box::new(self.parse_statement()?);
                if !self.eat_kw(Keyword::While) {
                    self.error_here("expected 'while' after do-statement body");
                    return Err(());
                }
                self.expect_punct(Punct::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "')'")?;
                self.expect_punct(Punct::Semi, "';' after do-while")?;
                Ok(Stmt::DoWhile { body, cond, span })
            }
            TokenKind::Keyword(Keyword::For) => {
                self.pos += 1;
                self.expect_punct(Punct::LParen, "'(' after 'for'")?;
                let init = if self.check_punct(Punct::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi, "';' after for-initializer")?;
                let cond = if self.check_punct(Punct::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi, "';' after for-condition")?;
                let post = if self.check_punct(Punct::RParen) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::RParen, "')'")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::For {
                    init,
                    cond,
                    post,
                    body,
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Switch) => {
                self.pos += 1;
                self.expect_punct(Punct::LParen, "'(' after 'switch'")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "')'")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::Switch { cond, body, span })
            }
            TokenKind::Keyword(Keyword::Case) => {
                self.pos += 1;
                let value = self.parse_conditional()?;
                self.expect_punct(Punct::Colon, "':' after case constant")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::Case { value, body, span })
            }
            TokenKind::Keyword(Keyword::Default) => {
                self.pos += 1;
                self.expect_punct(Punct::Colon, "':' after 'default'")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::Default { body, span })
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.pos += 1;
                self.expect_punct(Punct::Semi, "';' after 'break'")?;
                Ok(Stmt::Break { span })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.pos += 1;
                self.expect_punct(Punct::Semi, "';' after 'continue'")?;
                Ok(Stmt::Continue { span })
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.pos += 1;
                let value = if self.check_punct(Punct::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi, "';' after return")?;
                Ok(Stmt::Return { value, span })
            }
            TokenKind::Keyword(Keyword::Goto) => {
                self.pos += 1;
                let (label, _) = self.expect_ident("a label after 'goto'")?;
                self.expect_punct(Punct::Semi, "';' after goto")?;
                Ok(Stmt::Goto { label, span })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect_punct(Punct::Semi, "';' after expression")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_assign()?;
        while self.check_punct(Punct::Comma) {
            let span = self.span();
            self.pos += 1;
            let rhs = self.parse_assign()?;
            lhs = Expr::new(
                ExprKind::Comma {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn assign_op(p: Punct) -> Option<Option<BinaryOp>> {
        match p {
            Punct::Assign => Some(None),
            Punct::PlusAssign => Some(Some(BinaryOp::Add)),
            Punct::MinusAssign => Some(Some(BinaryOp::Sub)),
            Punct::StarAssign => Some(Some(BinaryOp::Mul)),
            Punct::SlashAssign => Some(Some(BinaryOp::Div)),
            Punct::PercentAssign => Some(Some(BinaryOp::Rem)),
            Punct::AmpAssign => Some(Some(BinaryOp::BitAnd)),
            Punct::PipeAssign => Some(Some(BinaryOp::BitOr)),
            Punct::CaretAssign => Some(Some(BinaryOp::BitXor)),
            Punct::ShlAssign => Some(Some(BinaryOp::Shl)),
            Punct::ShrAssign => Some(Some(BinaryOp::Shr)),
            _ => None,
        }
    }

    fn parse_assign(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional()?;
        if let TokenKind::Punct(p) = self.peek().kind
            && let Some(op) = Self::assign_op(p)
        {
            let span = self.span();
            self.pos += 1;
            let value = self.parse_assign()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    op,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                span,
            ));
        }
        Ok(lhs)
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_binary(1)?;
        if self.check_punct(Punct::Question) {
            let span = self.span();
            self.pos += 1;
            let then_expr = self.parse_expr()?;
            self.expect_punct(Punct::Colon, "':' in conditional expression")?;
            let else_expr = self.parse_conditional()?;
            return Ok(Expr::new(
                ExprKind::Conditional {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            ));
        }
        Ok(cond)
    }

    /// Binary operator and its precedence (higher binds tighter)
    fn binary_op(p: Punct) -> Option<(BinaryOp, u8)> {
        let entry = match p {
            Punct::PipePipe => (BinaryOp::LogOr, 1),
            Punct::AmpAmp => (BinaryOp::LogAnd, 2),
            Punct::Pipe => (BinaryOp::BitOr, 3),
            Punct::Caret => (BinaryOp::BitXor, 4),
            Punct::Amp => (BinaryOp::BitAnd, 5),
            Punct::EqEq => (BinaryOp::Eq, 6),
            Punct::BangEq => (BinaryOp::Ne, 6),
            Punct::Lt => (BinaryOp::Lt, 7),
            Punct::Gt => (BinaryOp::Gt, 7),
            Punct::Le => (BinaryOp::Le, 7),
            Punct::Ge => (BinaryOp::Ge, 7),
            Punct::Shl => (BinaryOp::Shl, 8),
            Punct::Shr => (BinaryOp::Shr, 8),
            Punct::Plus => (BinaryOp::Add, 9),
            Punct::Minus => (BinaryOp::Sub, 9),
            Punct::Star => (BinaryOp::Mul, 10),
            Punct::Slash => (BinaryOp::Div, 10),
            Punct::Percent => (BinaryOp::Rem, 10),
            _ => return None,
        };
        Some(entry)
    }

    /// Precedence climbing over the table above
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_cast_expr()?;
        loop {
            let TokenKind::Punct(p) = self.peek().kind else {
                break;
            };
            let Some((op, prec)) = Self::binary_op(p) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let span = self.span();
            self.pos += 1;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_cast_expr(&mut self) -> PResult<Expr> {
        if self.check_punct(Punct::LParen) {
            let saved = self.pos;
            let span = self.span();
            self.pos += 1;
            if self.starts_type_name() {
                let target = self.parse_type_name()?;
                self.expect_punct(Punct::RParen, "')' after cast type")?;
                let operand = self.parse_cast_expr()?;
                return Ok(Expr::new(
                    ExprKind::Cast {
                        target,
                        operand: Box::new(operand),
                    },
                    span,
                ));
            }
            self.pos = saved;
        }
        self.parse_unary()
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let span = self.span();
        let op = match &self.peek().kind {
            TokenKind::Punct(Punct::PlusPlus) => Some(UnaryOp::PreInc),
            TokenKind::Punct(Punct::MinusMinus) => Some(UnaryOp::PreDec),
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::LogNot),
            TokenKind::Punct(Punct::Tilde) => Some(UnaryOp::BitNot),
            TokenKind::Punct(Punct::Star) => Some(UnaryOp::Deref),
            TokenKind::Punct(Punct::Amp) => Some(UnaryOp::AddrOf),
            TokenKind::Keyword(Keyword::Sizeof) => {
                self.pos += 1;
                if self.check_punct(Punct::LParen) && {
                    let saved = self.pos;
                    self.pos += 1;
                    let is_type = self.starts_type_name();
                    self.pos = saved;
                    is_type
                } {
                    self.pos += 1;
                    let ty = self.parse_type_name()?;
                    self.expect_punct(Punct::RParen, "')' after sizeof type")?;
                    return Ok(Expr::new(ExprKind::SizeofType(ty), span));
                }
                let operand = self.parse_unary()?;
                return Ok(Expr::new(ExprKind::SizeofExpr(Box::new(operand)), span));
            }
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) {
                self.parse_unary()?
            } else {
                self.parse_cast_expr()?
            };
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.span();
            match &self.peek().kind {
                TokenKind::Punct(Punct::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect_punct(Punct::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Punct(Punct::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.check_punct(Punct::RParen) {
                        loop {
                            args.push(self.parse_assign()?);
                            if !self.eat_punct(Punct::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect_punct(Punct::RParen, "')' after arguments")?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Punct(Punct::Dot) => {
                    self.pos += 1;
                    let (member, _) = self.expect_ident("a member name after '.'")?;
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            member,
                            arrow: false,
                        },
                        span,
                    );
                }
                TokenKind::Punct(Punct::Arrow) => {
                    self.pos += 1;
                    let (member, _) = self.expect_ident("a member name after '->'")?;
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            member,
                            arrow: true,
                        },
                        span,
                    );
                }
                TokenKind::Punct(Punct::PlusPlus) => {
                    self.pos += 1;
                    expr = Expr::new(
                        ExprKind::Postfix {
                            op: PostfixOp::Inc,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                TokenKind::Punct(Punct::MinusMinus) => {
                    self.pos += 1;
                    expr = Expr::new(
                        ExprKind::Postfix {
                            op: PostfixOp::Dec,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.peek().kind.clone() {
            TokenKind::Ident => {
                let t = self.advance();
                Ok(Expr::new(ExprKind::Ident(t.text), span))
            }
            TokenKind::IntLit {
                value,
                unsigned,
                long,
            } => {
                self.pos += 1;
                Ok(Expr::new(
                    ExprKind::IntLit {
                        value,
                        unsigned,
                        long,
                    },
                    span,
                ))
            }
            TokenKind::CharLit(v) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::CharLit(v), span))
            }
            TokenKind::StrLit(bytes) => {
                self.pos += 1;
                let mut bytes = bytes;
                // adjacent string literals concatenate
                while let TokenKind::StrLit(more) = &self.peek().kind {
                    bytes.extend_from_slice(more);
                    self.pos += 1;
                }
                Ok(Expr::new(ExprKind::StrLit(bytes), span))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "')'")?;
                Ok(expr)
            }
            _ => {
                let found = Self::describe_token(self.peek());
                self.error_here(format!("expected an expression but found {}", found));
                Err(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Parse-time constant folding (array sizes only; enum constants and
    // sizeof fold later, in the semantic analyzer, where the environment
    // exists)
    // ------------------------------------------------------------------

    fn fold_int_expr(expr: &Expr) -> Option<i64> {
        match &expr.kind {
            ExprKind::IntLit { value, .. } => Some(*value),
            ExprKind::CharLit(v) => Some(*v),
            ExprKind::Unary { op, operand } => {
                let v = Self::fold_int_expr(operand)?;
                match op {
                    UnaryOp::Plus => Some(v),
                    UnaryOp::Neg => Some(v.wrapping_neg()),
                    UnaryOp::BitNot => Some(!v),
                    UnaryOp::LogNot => Some((v == 0) as i64),
                    _ => None,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let a = Self::fold_int_expr(lhs)?;
                let b = Self::fold_int_expr(rhs)?;
                match op {
                    BinaryOp::Add => Some(a.wrapping_add(b)),
                    BinaryOp::Sub => Some(a.wrapping_sub(b)),
                    BinaryOp::Mul => Some(a.wrapping_mul(b)),
                    BinaryOp::Div if b != 0 => Some(a.wrapping_div(b)),
                    BinaryOp::Rem if b != 0 => Some(a.wrapping_rem(b)),
                    BinaryOp::BitAnd => Some(a & b),
                    BinaryOp::BitOr => Some(a | b),
                    BinaryOp::BitXor => Some(a ^ b),
                    BinaryOp::Shl => Some(a.wrapping_shl(b as u32)),
                    BinaryOp::Shr => Some(a.wrapping_shr(b as u32)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_ok(source: &str) -> TranslationUnit {
        let tokens = tokenize(source, "test.c").unwrap();
        parse(tokens, "test.c").unwrap()
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        let tokens = tokenize(source, "test.c").unwrap();
        parse(tokens, "test.c").unwrap_err()
    }

    #[test]
    fn test_parse_factorial() {
        let unit = parse_ok(
            "int fact(int n){ if (n<=1) return 1; return n*fact(n-1); }\n\
             int main(void){ return fact(5); }",
        );
        assert_eq!(unit.decls.len(), 2);
        let Decl::Func(f) = &unit.decls[0] else {
            panic!("expected a function");
        };
        assert_eq!(f.name, "fact");
        assert_eq!(f.params.len(), 1);
        assert!(f.body.is_some());
    }

    #[test]
    fn test_precedence_shape() {
        let unit = parse_ok("int x = 1 + 2 * 3;");
        let Decl::Var(v) = &unit.decls[0] else {
            panic!("expected a variable");
        };
        let Some(Initializer::Expr(e)) = &v.init else {
            panic!("expected an initializer expression");
        };
        // `+` at the root, `*` underneath
        let ExprKind::Binary { op, rhs, .. } = &e.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_assignment_right_associative() {
        let unit = parse_ok("void f(void){ int a; int b; a = b = 1; }");
        let Decl::Func(f) = &unit.decls[0] else {
            panic!()
        };
        let items = f.body.as_ref().unwrap();
        let BlockItem::Stmt(Stmt::Expr(e)) = &items[2] else {
            panic!("expected an expression statement");
        };
        let ExprKind::Assign { value, .. } = &e.kind else {
            panic!("expected an assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn test_declarators() {
        let unit = parse_ok("int *p; int a[3]; int m[2][4]; char *const cp;");
        let tys: Vec<&Type> = unit
            .decls
            .iter()
            .map(|d| match d {
                Decl::Var(v) => &v.ty,
                _ => panic!("expected variables"),
            })
            .collect();
        assert!(tys[0].is_pointer());
        assert_eq!(tys[1].elem().unwrap(), &Type::int());
        // m : array 2 of array 4 of int
        let inner = tys[2].elem().unwrap();
        assert!(matches!(
            inner.kind,
            TypeKind::Array { len: Some(4), .. }
        ));
        assert!(tys[3].is_pointer() && tys[3].is_const);
    }

    #[test]
    fn test_function_pointer_declarator() {
        let unit = parse_ok("int (*handler)(int, char *);");
        let Decl::Var(v) = &unit.decls[0] else {
            panic!()
        };
        let fn_ty = v.ty.pointee().unwrap();
        let TypeKind::Function { params, .. } = &fn_ty.kind else {
            panic!("expected a function pointee");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_typedef_disambiguation() {
        let unit = parse_ok("typedef int myint; myint x; int myint2;");
        assert!(matches!(unit.decls[0], Decl::Typedef(_)));
        let Decl::Var(v) = &unit.decls[1] else {
            panic!()
        };
        assert!(matches!(v.ty.kind, TypeKind::Alias(ref n) if n == "myint"));
    }

    #[test]
    fn test_struct_definition_hoisted() {
        let unit = parse_ok("struct point { int x; int y; } origin;");
        assert!(matches!(unit.decls[0], Decl::Record(_)));
        let Decl::Var(v) = &unit.decls[1] else {
            panic!()
        };
        assert!(v.ty.is_record());
    }

    #[test]
    fn test_enum_with_values() {
        let unit = parse_ok("enum color { RED, GREEN = 5, BLUE };");
        let Decl::Enum(e) = &unit.decls[0] else {
            panic!()
        };
        assert_eq!(e.enumerators.len(), 3);
        assert!(e.enumerators[0].value.is_none());
        assert!(e.enumerators[1].value.is_some());
    }

    #[test]
    fn test_switch_with_cases() {
        let unit = parse_ok(
            "int f(int x){ switch(x){ case 1: return 1; default: return 0; } }",
        );
        let Decl::Func(f) = &unit.decls[0] else {
            panic!()
        };
        let items = f.body.as_ref().unwrap();
        assert!(matches!(items[0], BlockItem::Stmt(Stmt::Switch { .. })));
    }

    #[test]
    fn test_sizeof_forms() {
        let unit = parse_ok("long a = sizeof(int); long b = sizeof a;");
        let Decl::Var(v0) = &unit.decls[0] else {
            panic!()
        };
        assert!(matches!(
            v0.init,
            Some(Initializer::Expr(Expr {
                kind: ExprKind::SizeofType(_),
                ..
            }))
        ));
        let Decl::Var(v1) = &unit.decls[1] else {
            panic!()
        };
        assert!(matches!(
            v1.init,
            Some(Initializer::Expr(Expr {
                kind: ExprKind::SizeofExpr(_),
                ..
            }))
        ));
    }

    #[test]
    fn test_cast_vs_parenthesized_expr() {
        let unit = parse_ok("void f(int x){ long a = (long)x; int b = (x); }");
        let Decl::Func(f) = &unit.decls[0] else {
            panic!()
        };
        let items = f.body.as_ref().unwrap();
        let BlockItem::Decl(a) = &items[0] else { panic!() };
        assert!(matches!(
            a.init,
            Some(Initializer::Expr(Expr {
                kind: ExprKind::Cast { .. },
                ..
            }))
        ));
        let BlockItem::Decl(b) = &items[1] else { panic!() };
        assert!(matches!(
            b.init,
            Some(Initializer::Expr(Expr {
                kind: ExprKind::Ident(_),
                ..
            }))
        ));
    }

    #[test]
    fn test_adjacent_string_literals_concatenate() {
        let unit = parse_ok(r#"char *s = "ab" "cd";"#);
        let Decl::Var(v) = &unit.decls[0] else {
            panic!()
        };
        assert!(matches!(
            v.init,
            Some(Initializer::Expr(Expr {
                kind: ExprKind::StrLit(ref b),
                ..
            })) if b == b"abcd"
        ));
    }

    #[test]
    fn test_error_recovery_reports_multiple() {
        let diags = parse_err(
            "int f(void){ int x = ; return 0; }\n\
             int g(void){ return ); }",
        );
        assert!(diags.len() >= 2, "got {:?}", diags);
    }

    #[test]
    fn test_error_names_expected_and_found() {
        let diags = parse_err("int f(void){ return 1 }");
        assert!(diags[0].message.contains("';'"));
        assert!(diags[0].message.contains("'}'"));
    }

    #[test]
    fn test_array_size_must_be_constant() {
        let diags = parse_err("void f(int n){ int a[n]; }");
        assert!(diags[0].message.contains("constant"));
    }

    #[test]
    fn test_float_rejected_with_clear_message() {
        let diags = parse_err("float x;");
        assert!(diags[0].message.contains("not supported"));
    }

    #[test]
    fn test_pretty_reparse_equivalence() {
        // parse, reconstruct with canonical whitespace from the token
        // stream, parse again: same AST
        let source = "int add(int a,int b){return a+b;}";
        let tokens = tokenize(source, "t.c").unwrap();
        let spaced: Vec<String> = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Eof))
            .map(|t| t.text.clone())
            .collect();
        let rebuilt = spaced.join(" ");
        let a = parse_ok(source);
        let b = parse_ok(&rebuilt);
        // spans differ; compare declaration shape
        assert_eq!(a.decls.len(), b.decls.len());
        let (Decl::Func(fa), Decl::Func(fb)) = (&a.decls[0], &b.decls[0]) else {
            panic!()
        };
        assert_eq!(fa.name, fb.name);
        assert_eq!(fa.params.len(), fb.params.len());
    }
}
