//! Semantic analysis
//!
//! Walks the parsed translation unit, builds symbol tables and layouts,
//! attaches a resolved type to every expression, and enforces the static
//! rules of the subset: scope and redeclaration rules, lvalue/const/
//! register checks, case uniqueness, goto targets, break/continue
//! placement, and conversion rules on assignment and return.
//!
//! Output is a [`SemanticInfo`] environment consumed by IR generation and
//! code emission: struct/union layouts, enum constants, typedef aliases,
//! function signatures, global initializer blobs, the string-literal
//! table, and a per-function frame layout. Locals are renamed to
//! frame-unique names (`n.0`, `n.1`, ...) so later phases can use flat
//! name operands.

use crate::ast::{
    BinaryOp, BlockItem, Decl, EnumDecl, Expr, ExprKind, FuncDecl, Initializer, RecordDecl, Span,
    Stmt, StorageClass, TranslationUnit, UnaryOp, VarDecl,
};
use crate::diag::Diagnostic;
use crate::types::{IntWidth, Type, TypeKind};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// `Err(())` means a diagnostic has already been recorded
type SResult<T> = Result<T, ()>;

// ----------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MemberLayout {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
}

/// Struct/union layout, computed once per tag at definition time
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    pub tag: String,
    pub is_union: bool,
    pub members: Vec<MemberLayout>,
    pub size: usize,
    pub align: usize,
}

impl RecordLayout {
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct FuncSig {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
    pub defined: bool,
    pub is_static: bool,
}

/// A local's assigned stack slot, relative to the frame base pointer.
/// Negative offsets are frame slots; positive offsets address stack
/// arguments above the saved return address.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlot {
    pub offset: i64,
    pub ty: Type,
}

#[derive(Debug, Clone, Default)]
pub struct FrameLayout {
    pub slots: HashMap<String, LocalSlot>,
    /// Total frame bytes for locals and spilled parameters, 16-aligned
    pub size: usize,
    /// Register parameters in order, with their spill slots
    pub reg_params: Vec<(String, i64)>,
}

/// Evaluated constant initializer for a global
#[derive(Debug, Clone, PartialEq)]
pub enum ConstInit {
    Scalar(i64),
    /// Pointer to a string literal, by table index
    Str(usize),
    List(Vec<ConstInit>),
}

#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    pub ty: Type,
    pub init: Option<ConstInit>,
    /// Visible outside the translation unit (not `static`)
    pub exported: bool,
    /// False for `extern` declarations that only import the name
    pub defined: bool,
}

/// Everything later phases need to know about the translation unit
#[derive(Debug, Default)]
pub struct SemanticInfo {
    pub records: HashMap<String, RecordLayout>,
    pub enum_consts: HashMap<String, i64>,
    pub typedefs: HashMap<String, Type>,
    pub functions: HashMap<String, FuncSig>,
    pub globals: Vec<GlobalVar>,
    /// String-literal payloads in emission order (no NUL terminator;
    /// emission appends it)
    pub strings: Vec<Vec<u8>>,
    string_ids: HashMap<Vec<u8>, usize>,
    pub frames: HashMap<String, FrameLayout>,
}

impl SemanticInfo {
    pub fn new() -> Self {
        SemanticInfo::default()
    }

    /// Intern a string literal payload, deduplicating identical payloads
    pub fn intern_string(&mut self, bytes: &[u8]) -> usize {
        if let Some(&id) = self.string_ids.get(bytes) {
            return id;
        }
        let id = self.strings.len();
        self.strings.push(bytes.to_vec());
        self.string_ids.insert(bytes.to_vec(), id);
        id
    }

    pub fn string_id(&self, bytes: &[u8]) -> Option<usize> {
        self.string_ids.get(bytes).copied()
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Byte size of a type; aggregates come from their layout
    pub fn size_of(&self, ty: &Type) -> Result<usize, String> {
        match &ty.kind {
            TypeKind::Void => Err("'void' has no size".to_string()),
            TypeKind::Int { width, .. } => Ok(width.size()),
            TypeKind::Pointer(_) => Ok(8),
            TypeKind::Array { elem, len } => match len {
                Some(n) => Ok(self.size_of(elem)? * n),
                None => Err("array type is incomplete".to_string()),
            },
            TypeKind::Function { .. } => Err("function type has no size".to_string()),
            TypeKind::Record { tag, .. } => self
                .records
                .get(tag)
                .map(|l| l.size)
                .ok_or_else(|| format!("'{}' is incomplete", ty)),
            TypeKind::Alias(name) => match self.typedefs.get(name) {
                Some(t) => self.size_of(&t.clone()),
                None => Err(format!("unknown type name '{}'", name)),
            },
        }
    }

    /// Natural alignment: 1/2/4/8 for integers, 8 for pointers,
    /// element alignment for arrays, layout alignment for records
    pub fn align_of(&self, ty: &Type) -> Result<usize, String> {
        match &ty.kind {
            TypeKind::Void => Err("'void' has no alignment".to_string()),
            TypeKind::Int { width, .. } => Ok(width.size()),
            TypeKind::Pointer(_) => Ok(8),
            TypeKind::Array { elem, .. } => self.align_of(elem),
            TypeKind::Function { .. } => Err("function type has no alignment".to_string()),
            TypeKind::Record { tag, .. } => self
                .records
                .get(tag)
                .map(|l| l.align)
                .ok_or_else(|| format!("'{}' is incomplete", ty)),
            TypeKind::Alias(name) => match self.typedefs.get(name) {
                Some(t) => self.align_of(&t.clone()),
                None => Err(format!("unknown type name '{}'", name)),
            },
        }
    }
}

fn round_up(v: usize, align: usize) -> usize {
    v.div_ceil(align) * align
}

// ----------------------------------------------------------------------
// Constant expression evaluation
// ----------------------------------------------------------------------

/// Evaluate an integer constant expression against the environment.
/// Used for enum values, case labels and global initializers; IR
/// generation reuses it for case dispatch.
pub fn eval_const_expr(expr: &Expr, info: &SemanticInfo) -> Result<i64, String> {
    match &expr.kind {
        ExprKind::IntLit { value, .. } => Ok(*value),
        ExprKind::CharLit(v) => Ok(*v),
        ExprKind::Ident(name) => info
            .enum_consts
            .get(name)
            .copied()
            .ok_or_else(|| format!("'{}' is not an integer constant", name)),
        ExprKind::Unary { op, operand } => {
            let v = eval_const_expr(operand, info)?;
            match op {
                UnaryOp::Plus => Ok(v),
                UnaryOp::Neg => Ok(v.wrapping_neg()),
                UnaryOp::BitNot => Ok(!v),
                UnaryOp::LogNot => Ok((v == 0) as i64),
                _ => Err("not an integer constant expression".to_string()),
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let a = eval_const_expr(lhs, info)?;
            let b = eval_const_expr(rhs, info)?;
            match op {
                BinaryOp::Add => Ok(a.wrapping_add(b)),
                BinaryOp::Sub => Ok(a.wrapping_sub(b)),
                BinaryOp::Mul => Ok(a.wrapping_mul(b)),
                BinaryOp::Div => {
                    if b == 0 {
                        Err("division by zero in constant expression".to_string())
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                }
                BinaryOp::Rem => {
                    if b == 0 {
                        Err("division by zero in constant expression".to_string())
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                }
                BinaryOp::BitAnd => Ok(a & b),
                BinaryOp::BitOr => Ok(a | b),
                BinaryOp::BitXor => Ok(a ^ b),
                BinaryOp::Shl => Ok(a.wrapping_shl(b as u32)),
                BinaryOp::Shr => Ok(a.wrapping_shr(b as u32)),
                BinaryOp::Lt => Ok((a < b) as i64),
                BinaryOp::Gt => Ok((a > b) as i64),
                BinaryOp::Le => Ok((a <= b) as i64),
                BinaryOp::Ge => Ok((a >= b) as i64),
                BinaryOp::Eq => Ok((a == b) as i64),
                BinaryOp::Ne => Ok((a != b) as i64),
                BinaryOp::LogAnd => Ok((a != 0 && b != 0) as i64),
                BinaryOp::LogOr => Ok((a != 0 || b != 0) as i64),
            }
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            let c = eval_const_expr(cond, info)?;
            if c != 0 {
                eval_const_expr(then_expr, info)
            } else {
                eval_const_expr(else_expr, info)
            }
        }
        ExprKind::Cast { target, operand } => {
            let v = eval_const_expr(operand, info)?;
            Ok(truncate_to(v, target))
        }
        ExprKind::SizeofType(ty) => info.size_of(ty).map(|n| n as i64),
        ExprKind::SizeofExpr(e) => match &e.ty {
            Some(ty) => info.size_of(ty).map(|n| n as i64),
            None => Err("not an integer constant expression".to_string()),
        },
        _ => Err("not an integer constant expression".to_string()),
    }
}

/// Reduce a value to the range of an integer type (identity for
/// pointers and 64-bit types)
fn truncate_to(v: i64, ty: &Type) -> i64 {
    match &ty.kind {
        TypeKind::Int { width, unsigned } => match (width.size(), unsigned) {
            (1, false) => v as i8 as i64,
            (1, true) => v as u8 as i64,
            (2, false) => v as i16 as i64,
            (2, true) => v as u16 as i64,
            (4, false) => v as i32 as i64,
            (4, true) => v as u32 as i64,
            _ => v,
        },
        _ => v,
    }
}

// ----------------------------------------------------------------------
// Symbols and scopes
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
enum SymbolKind {
    /// `unique` is the frame-unique name locals are renamed to;
    /// globals keep their own name
    Var { unique: String },
    Func,
    TypedefName,
    EnumConst(i64),
}

#[derive(Debug, Clone)]
struct Symbol {
    ty: Type,
    storage: StorageClass,
    kind: SymbolKind,
    span: Span,
}

#[derive(Default)]
struct Scope {
    symbols: HashMap<String, Symbol>,
}

// ----------------------------------------------------------------------
// Analyzer
// ----------------------------------------------------------------------

struct FuncCtx {
    name: String,
    ret: Type,
    labels: HashSet<String>,
    gotos: Vec<(String, Span)>,
    loop_depth: usize,
    /// Depth of constructs a `break` may leave (loops and switches)
    breakable_depth: usize,
    /// Per active switch: case values seen, and whether a default exists
    switch_cases: Vec<(HashSet<i64>, bool)>,
    slots: HashMap<String, LocalSlot>,
    reg_params: Vec<(String, i64)>,
    /// Bytes of frame consumed so far (grows downward)
    frame_bytes: usize,
    rename_counter: usize,
}

struct Analyzer {
    file: String,
    info: SemanticInfo,
    scopes: Vec<Scope>,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    func: Option<FuncCtx>,
}

/// Analyze a translation unit in place, attaching types to expressions
/// and renaming locals. On success returns the environment plus any
/// warnings; on failure returns all errors recorded.
pub fn analyze(
    unit: &mut TranslationUnit,
    file: &str,
) -> Result<(SemanticInfo, Vec<Diagnostic>), Vec<Diagnostic>> {
    let mut a = Analyzer {
        file: file.to_string(),
        info: SemanticInfo::new(),
        scopes: vec![Scope::default()],
        errors: Vec::new(),
        warnings: Vec::new(),
        func: None,
    };
    for decl in &mut unit.decls {
        a.check_decl(decl);
    }
    debug!(
        functions = a.info.functions.len(),
        globals = a.info.globals.len(),
        strings = a.info.strings.len(),
        "semantic analysis finished"
    );
    if a.errors.is_empty() {
        Ok((a.info, a.warnings))
    } else {
        Err(a.errors)
    }
}

impl Analyzer {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors
            .push(Diagnostic::error(&self.file, span.line, span.column, message));
    }

    fn warn(&mut self, span: Span, message: impl Into<String>) {
        self.warnings
            .push(Diagnostic::warning(&self.file, span.line, span.column, message));
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.symbols.get(name))
    }

    fn declare(&mut self, name: &str, symbol: Symbol) -> SResult<()> {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        if scope.symbols.contains_key(name) {
            let span = symbol.span;
            self.error(span, format!("redeclaration of '{}'", name));
            return Err(());
        }
        scope.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Resolve typedef aliases recursively; the result is alias-free
    fn resolve_type(&mut self, ty: &Type, span: Span) -> SResult<Type> {
        let mut resolved = match &ty.kind {
            TypeKind::Alias(name) => match self.info.typedefs.get(name) {
                Some(t) => t.clone(),
                None => {
                    self.error(span, format!("unknown type name '{}'", name));
                    return Err(());
                }
            },
            TypeKind::Pointer(p) => Type::pointer_to(self.resolve_type(p, span)?),
            TypeKind::Array { elem, len } => {
                let elem = self.resolve_type(elem, span)?;
                if elem.is_void() {
                    self.error(span, "array of 'void' is not allowed");
                    return Err(());
                }
                Type::array_of(elem, *len)
            }
            TypeKind::Function {
                ret,
                params,
                variadic,
            } => {
                let ret = self.resolve_type(ret, span)?;
                let params = params
                    .iter()
                    .map(|p| self.resolve_type(p, span))
                    .collect::<SResult<Vec<_>>>()?;
                Type::new(TypeKind::Function {
                    ret: Box::new(ret),
                    params,
                    variadic: *variadic,
                })
            }
            _ => ty.clone(),
        };
        resolved.is_const |= ty.is_const;
        Ok(resolved)
    }

    /// Array and function types decay to pointers in value contexts
    fn decayed(&self, ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Array { elem, .. } => Type::pointer_to((**elem).clone()),
            TypeKind::Function { .. } => {
                let mut inner = ty.clone();
                inner.is_const = false;
                Type::pointer_to(inner)
            }
            _ => {
                let mut t = ty.clone();
                t.is_const = false;
                t
            }
        }
    }

    /// Integer promotions: char and short promote to int
    fn promote(ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Int { width, .. }
                if matches!(width, IntWidth::Char | IntWidth::Short) =>
            {
                Type::int()
            }
            _ => {
                let mut t = ty.clone();
                t.is_const = false;
                t
            }
        }
    }

    /// Usual arithmetic conversions for two promoted integer operands
    fn usual_arith(lhs: &Type, rhs: &Type) -> Type {
        let l = Self::promote(lhs);
        let r = Self::promote(rhs);
        let rank = |t: &Type| match &t.kind {
            TypeKind::Int {
                width: IntWidth::Long,
                unsigned: true,
            } => 3,
            TypeKind::Int {
                width: IntWidth::Long,
                unsigned: false,
            } => 2,
            TypeKind::Int {
                unsigned: true, ..
            } => 1,
            _ => 0,
        };
        match rank(&l).max(rank(&r)) {
            3 => Type::ulong(),
            2 => Type::long(),
            1 => Type::uint(),
            _ => Type::int(),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn check_decl(&mut self, decl: &mut Decl) {
        match decl {
            Decl::Record(r) => {
                let _ = self.check_record(r);
            }
            Decl::Enum(e) => {
                let _ = self.check_enum(e);
            }
            Decl::Typedef(t) => {
                if let Ok(ty) = self.resolve_type(&t.ty.clone(), t.span) {
                    t.ty = ty.clone();
                    if self.info.typedefs.contains_key(&t.name) {
                        self.error(t.span, format!("redefinition of typedef '{}'", t.name));
                        return;
                    }
                    self.info.typedefs.insert(t.name.clone(), ty.clone());
                    let _ = self.declare(
                        &t.name.clone(),
                        Symbol {
                            ty,
                            storage: StorageClass::None,
                            kind: SymbolKind::TypedefName,
                            span: t.span,
                        },
                    );
                }
            }
            Decl::Var(v) => {
                let _ = self.check_global_var(v);
            }
            Decl::Func(f) => {
                let _ = self.check_func(f);
            }
        }
    }

    fn check_record(&mut self, r: &mut RecordDecl) -> SResult<()> {
        let Some(members) = &mut r.members else {
            // forward declaration; the layout arrives with the definition
            return Ok(());
        };
        if self.info.records.contains_key(&r.tag) {
            self.error(
                r.span,
                format!(
                    "redefinition of '{} {}'",
                    if r.is_union { "union" } else { "struct" },
                    r.tag
                ),
            );
            return Err(());
        }
        if members.is_empty() {
            self.error(r.span, format!("'{}' has no members", r.tag));
            return Err(());
        }

        let mut layout_members = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0usize;
        let mut max_align = 1usize;
        let mut max_size = 0usize;
        for m in members.iter_mut() {
            let ty = self.resolve_type(&m.ty.clone(), m.span)?;
            m.ty = ty.clone();
            if ty.is_void() {
                self.error(m.span, format!("member '{}' has type 'void'", m.name));
                return Err(());
            }
            let (size, align) = match (self.info.size_of(&ty), self.info.align_of(&ty)) {
                (Ok(s), Ok(a)) => (s, a),
                _ => {
                    self.error(
                        m.span,
                        format!("member '{}' has incomplete type '{}'", m.name, ty),
                    );
                    return Err(());
                }
            };
            if !seen.insert(m.name.clone()) {
                self.error(m.span, format!("duplicate member '{}'", m.name));
                return Err(());
            }
            let member_offset = if r.is_union {
                0
            } else {
                offset = round_up(offset, align);
                let at = offset;
                offset += size;
                at
            };
            max_align = max_align.max(align);
            max_size = max_size.max(size);
            layout_members.push(MemberLayout {
                name: m.name.clone(),
                ty,
                offset: member_offset,
            });
        }
        let size = if r.is_union {
            round_up(max_size, max_align)
        } else {
            round_up(offset, max_align)
        };
        self.info.records.insert(
            r.tag.clone(),
            RecordLayout {
                tag: r.tag.clone(),
                is_union: r.is_union,
                members: layout_members,
                size,
                align: max_align,
            },
        );
        Ok(())
    }

    fn check_enum(&mut self, e: &mut EnumDecl) -> SResult<()> {
        let mut next = 0i64;
        for enumerator in &mut e.enumerators {
            let value = match enumerator.value.take() {
                Some(mut expr) => {
                    // the value expression may use earlier constants
                    let _ = self.check_expr(&mut expr);
                    let result = eval_const_expr(&expr, &self.info);
                    enumerator.value = Some(expr);
                    match result {
                        Ok(v) => v,
                        Err(msg) => {
                            self.error(enumerator.span, msg);
                            return Err(());
                        }
                    }
                }
                None => next,
            };
            next = value.wrapping_add(1);
            if self.info.enum_consts.contains_key(&enumerator.name) {
                self.error(
                    enumerator.span,
                    format!("redefinition of enumerator '{}'", enumerator.name),
                );
                return Err(());
            }
            self.info
                .enum_consts
                .insert(enumerator.name.clone(), value);
            self.declare(
                &enumerator.name.clone(),
                Symbol {
                    ty: Type::int(),
                    storage: StorageClass::None,
                    kind: SymbolKind::EnumConst(value),
                    span: enumerator.span,
                },
            )?;
        }
        Ok(())
    }

    fn check_global_var(&mut self, v: &mut VarDecl) -> SResult<()> {
        let ty = self.resolve_type(&v.ty.clone(), v.span)?;
        v.ty = ty.clone();
        if ty.is_void() {
            self.error(v.span, format!("'{}' is declared with type 'void'", v.name));
            return Err(());
        }
        match v.storage {
            StorageClass::Auto | StorageClass::Register => {
                self.error(
                    v.span,
                    format!("illegal storage class on file-scope object '{}'", v.name),
                );
                return Err(());
            }
            StorageClass::Extern if v.init.is_some() => {
                self.error(
                    v.span,
                    format!("'extern' declaration of '{}' has an initializer", v.name),
                );
                return Err(());
            }
            _ => {}
        }

        // Redeclaration: an extern declaration may pair with one
        // definition of a compatible type
        let existing = self.info.globals.iter().position(|g| g.name == v.name);
        if let Some(idx) = existing {
            let prior = &self.info.globals[idx];
            if !prior.ty.compatible(&ty) {
                self.error(
                    v.span,
                    format!("conflicting types for '{}'", v.name),
                );
                return Err(());
            }
            let defines = v.storage != StorageClass::Extern;
            if prior.defined && defines {
                self.error(v.span, format!("redefinition of '{}'", v.name));
                return Err(());
            }
            if defines {
                let init = self.eval_global_init(v)?;
                let g = &mut self.info.globals[idx];
                g.defined = true;
                g.ty = v.ty.clone();
                g.init = init;
            }
            return Ok(());
        }

        let defines = v.storage != StorageClass::Extern;
        let init = if defines { self.eval_global_init(v)? } else { None };
        self.info.globals.push(GlobalVar {
            name: v.name.clone(),
            ty: v.ty.clone(),
            init,
            exported: v.storage != StorageClass::Static,
            defined: defines,
        });
        self.declare(
            &v.name.clone(),
            Symbol {
                ty: v.ty.clone(),
                storage: v.storage,
                kind: SymbolKind::Var {
                    unique: v.name.clone(),
                },
                span: v.span,
            },
        )
    }

    /// Evaluate a global initializer into a constant blob. May complete
    /// an incomplete array type from the initializer list length.
    fn eval_global_init(&mut self, v: &mut VarDecl) -> SResult<Option<ConstInit>> {
        let Some(init) = &mut v.init else {
            return Ok(None);
        };
        // size the incomplete array before validating the list
        if let (TypeKind::Array { elem: _, len: len @ None }, Initializer::List(items, _)) =
            (&mut v.ty.kind, &*init)
        {
            *len = Some(items.len());
        }
        let ty = v.ty.clone();
        let result = self.eval_init(&ty, init, v.span)?;
        Ok(Some(result))
    }

    fn eval_init(&mut self, ty: &Type, init: &mut Initializer, span: Span) -> SResult<ConstInit> {
        match init {
            Initializer::Expr(e) => {
                self.check_expr(e)?;
                if ty.is_pointer() {
                    // pointer to a string literal, or a constant address 0
                    if let ExprKind::StrLit(bytes) = &e.kind {
                        let id = self.info.intern_string(bytes);
                        return Ok(ConstInit::Str(id));
                    }
                }
                if ty.is_array() {
                    self.error(
                        span,
                        "array initializer must be a brace-enclosed list",
                    );
                    return Err(());
                }
                match eval_const_expr(e, &self.info) {
                    Ok(value) => Ok(ConstInit::Scalar(truncate_to(value, ty))),
                    Err(msg) => {
                        self.error(e.span, format!("initializer is not constant: {}", msg));
                        Err(())
                    }
                }
            }
            Initializer::List(items, lspan) => match &ty.kind {
                TypeKind::Array { elem, len } => {
                    let len = len.ok_or(()).map_err(|_| {
                        self.error(*lspan, "array type is incomplete");
                    })?;
                    if items.len() > len {
                        self.error(
                            *lspan,
                            format!(
                                "too many initializers for array of {} elements",
                                len
                            ),
                        );
                        return Err(());
                    }
                    let mut out = Vec::new();
                    for item in items {
                        out.push(self.eval_init(elem, item, *lspan)?);
                    }
                    Ok(ConstInit::List(out))
                }
                TypeKind::Record { tag, is_union } => {
                    let layout = match self.info.records.get(tag) {
                        Some(l) => l.clone(),
                        None => {
                            self.error(*lspan, format!("'{}' is incomplete", ty));
                            return Err(());
                        }
                    };
                    if *is_union {
                        self.error(*lspan, "union initializers are not supported");
                        return Err(());
                    }
                    if items.len() > layout.members.len() {
                        self.error(*lspan, "too many initializers for struct");
                        return Err(());
                    }
                    let mut out = Vec::new();
                    for (item, member) in items.iter_mut().zip(layout.members.iter()) {
                        out.push(self.eval_init(&member.ty, item, *lspan)?);
                    }
                    Ok(ConstInit::List(out))
                }
                _ => {
                    // a scalar may carry redundant braces: `int x = {1};`
                    if items.len() == 1 {
                        self.eval_init(ty, &mut items[0], *lspan)
                    } else {
                        self.error(*lspan, "invalid initializer for scalar");
                        Err(())
                    }
                }
            },
        }
    }

    fn check_func(&mut self, f: &mut FuncDecl) -> SResult<()> {
        let ret = self.resolve_type(&f.ret.clone(), f.span)?;
        f.ret = ret.clone();
        if ret.is_record() {
            self.error(
                f.span,
                format!("function '{}' returns a structure by value, which is not supported", f.name),
            );
            return Err(());
        }
        let mut param_tys = Vec::new();
        for p in &mut f.params {
            let ty = self.resolve_type(&p.ty.clone(), p.span)?;
            if ty.is_void() {
                self.error(p.span, "parameter has type 'void'");
                return Err(());
            }
            if ty.is_record() {
                self.error(
                    p.span,
                    "passing structures by value is not supported",
                );
                return Err(());
            }
            p.ty = ty.clone();
            param_tys.push(ty);
        }

        // Prototype/definition agreement: return type and parameter
        // count must match, parameter types best-effort
        if let Some(prior) = self.info.functions.get(&f.name) {
            let signature_ok =
                prior.ret.compatible(&ret) && prior.params.len() == param_tys.len();
            let already_defined = prior.defined;
            let params_match = prior
                .params
                .iter()
                .zip(&param_tys)
                .all(|(a, b)| a.compatible(b));
            if !signature_ok {
                self.error(f.span, format!("conflicting types for '{}'", f.name));
                return Err(());
            }
            if already_defined && f.body.is_some() {
                self.error(f.span, format!("redefinition of '{}'", f.name));
                return Err(());
            }
            if !params_match {
                self.warn(
                    f.span,
                    format!(
                        "parameter types of '{}' differ from previous declaration",
                        f.name
                    ),
                );
            }
        } else {
            let fn_ty = Type::new(TypeKind::Function {
                ret: Box::new(ret.clone()),
                params: param_tys.clone(),
                variadic: f.variadic,
            });
            self.declare(
                &f.name.clone(),
                Symbol {
                    ty: fn_ty,
                    storage: f.storage,
                    kind: SymbolKind::Func,
                    span: f.span,
                },
            )?;
        }
        let defined_now = f.body.is_some();
        let entry = self
            .info
            .functions
            .entry(f.name.clone())
            .or_insert(FuncSig {
                ret: ret.clone(),
                params: param_tys.clone(),
                variadic: f.variadic,
                defined: false,
                is_static: f.storage == StorageClass::Static,
            });
        entry.defined |= defined_now;
        if f.storage == StorageClass::Static {
            entry.is_static = true;
        }

        let Some(body) = &mut f.body else {
            return Ok(());
        };

        // Parameter scope, one level inside the file scope
        self.func = Some(FuncCtx {
            name: f.name.clone(),
            ret: ret.clone(),
            labels: HashSet::new(),
            gotos: Vec::new(),
            loop_depth: 0,
            breakable_depth: 0,
            switch_cases: Vec::new(),
            slots: HashMap::new(),
            reg_params: Vec::new(),
            frame_bytes: 0,
            rename_counter: 0,
        });
        self.push_scope();
        for (i, p) in f.params.iter_mut().enumerate() {
            let Some(name) = &p.name else { continue };
            let unique = self.fresh_local_name(name);
            let offset = if i < 6 {
                let off = self.alloc_slot(8, 8);
                let ctx = self.func.as_mut().expect("inside a function");
                ctx.reg_params.push((unique.clone(), off));
                off
            } else {
                // stack arguments live above the saved return address
                16 + 8 * (i as i64 - 6)
            };
            let ctx = self.func.as_mut().expect("inside a function");
            ctx.slots.insert(
                unique.clone(),
                LocalSlot {
                    offset,
                    ty: p.ty.clone(),
                },
            );
            let _ = self.declare(
                &name.clone(),
                Symbol {
                    ty: p.ty.clone(),
                    storage: StorageClass::None,
                    kind: SymbolKind::Var { unique },
                    span: p.span,
                },
            );
        }

        // Block scope for the body itself
        self.push_scope();
        for item in body {
            self.check_block_item(item);
        }
        self.pop_scope();
        self.pop_scope();

        let ctx = self.func.take().expect("inside a function");
        for (label, span) in &ctx.gotos {
            if !ctx.labels.contains(label) {
                self.error(*span, format!("label '{}' used but not defined", label));
            }
        }
        let frame = FrameLayout {
            slots: ctx.slots,
            size: round_up(ctx.frame_bytes, 16),
            reg_params: ctx.reg_params,
        };
        debug!(function = %f.name, frame_size = frame.size, "frame laid out");
        self.info.frames.insert(f.name.clone(), frame);
        Ok(())
    }

    fn fresh_local_name(&mut self, name: &str) -> String {
        let ctx = self.func.as_mut().expect("inside a function");
        let unique = format!("{}.{}", name, ctx.rename_counter);
        ctx.rename_counter += 1;
        unique
    }

    /// Reserve frame bytes for a local; returns its negative offset
    fn alloc_slot(&mut self, size: usize, align: usize) -> i64 {
        let ctx = self.func.as_mut().expect("inside a function");
        ctx.frame_bytes = round_up(ctx.frame_bytes + size, align.max(8));
        -(ctx.frame_bytes as i64)
    }

    fn check_block_item(&mut self, item: &mut BlockItem) {
        match item {
            BlockItem::Decl(v) => {
                let _ = self.check_local_decl(v);
            }
            BlockItem::Stmt(s) => self.check_stmt(s),
        }
    }

    fn check_local_decl(&mut self, v: &mut VarDecl) -> SResult<()> {
        let ty = self.resolve_type(&v.ty.clone(), v.span)?;
        v.ty = ty.clone();
        if ty.is_void() {
            self.error(v.span, format!("'{}' is declared with type 'void'", v.name));
            return Err(());
        }
        match v.storage {
            StorageClass::Static => {
                self.error(v.span, format!("local '{}' cannot be 'static'", v.name));
                return Err(());
            }
            StorageClass::Extern => {
                if v.init.is_some() {
                    self.error(
                        v.span,
                        format!("'extern' declaration of '{}' has an initializer", v.name),
                    );
                    return Err(());
                }
                // refers to a file-scope object; no frame slot
                if self.info.global(&v.name).is_none() {
                    self.info.globals.push(GlobalVar {
                        name: v.name.clone(),
                        ty: ty.clone(),
                        init: None,
                        exported: true,
                        defined: false,
                    });
                }
                return self.declare(
                    &v.name.clone(),
                    Symbol {
                        ty,
                        storage: v.storage,
                        kind: SymbolKind::Var {
                            unique: v.name.clone(),
                        },
                        span: v.span,
                    },
                );
            }
            _ => {}
        }

        // complete `int a[] = {...}` from the list length
        if let (TypeKind::Array { len: len @ None, .. }, Some(Initializer::List(items, _))) =
            (&mut v.ty.kind, &v.init)
        {
            *len = Some(items.len());
        }
        let ty = v.ty.clone();

        let (size, align) = match (self.info.size_of(&ty), self.info.align_of(&ty)) {
            (Ok(s), Ok(a)) => (s, a),
            _ => {
                self.error(
                    v.span,
                    format!("'{}' has incomplete type '{}'", v.name, ty),
                );
                return Err(());
            }
        };
        // every scalar slot is widened to 8 bytes; aggregates keep
        // their own size, rounded so slots stay 8-aligned
        let slot_size = if ty.is_scalar() { 8 } else { round_up(size, 8) };
        let offset = self.alloc_slot(slot_size, align);
        let unique = self.fresh_local_name(&v.name);
        let ctx = self.func.as_mut().expect("inside a function");
        ctx.slots.insert(
            unique.clone(),
            LocalSlot {
                offset,
                ty: ty.clone(),
            },
        );
        self.declare(
            &v.name.clone(),
            Symbol {
                ty: ty.clone(),
                storage: v.storage,
                kind: SymbolKind::Var {
                    unique: unique.clone(),
                },
                span: v.span,
            },
        )?;
        v.name = unique;

        if let Some(init) = &mut v.init {
            match init {
                Initializer::Expr(e) => {
                    if ty.is_record() || ty.is_array() {
                        self.error(
                            v.span,
                            "initializers for automatic aggregates are not supported",
                        );
                        return Err(());
                    }
                    self.check_expr(e)?;
                    self.check_assignable(&ty, e, v.span);
                }
                Initializer::List(..) => {
                    self.error(
                        v.span,
                        "initializers for automatic aggregates are not supported",
                    );
                    return Err(());
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Compound { items, .. } => {
                self.push_scope();
                for item in items {
                    self.check_block_item(item);
                }
                self.pop_scope();
            }
            Stmt::Expr(e) => {
                let _ = self.check_expr(e);
            }
            Stmt::Empty { .. } => {}
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                let span = *span;
                if self.check_expr(cond).is_ok() {
                    self.require_scalar(cond, span, "'if' condition");
                }
                self.check_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.check_stmt(e);
                }
            }
            Stmt::While { cond, body, span } => {
                let span = *span;
                if self.check_expr(cond).is_ok() {
                    self.require_scalar(cond, span, "loop condition");
                }
                self.enter_loop();
                self.check_stmt(body);
                self.leave_loop();
            }
            Stmt::DoWhile { body, cond, span } => {
                let span = *span;
                self.enter_loop();
                self.check_stmt(body);
                self.leave_loop();
                if self.check_expr(cond).is_ok() {
                    self.require_scalar(cond, span, "loop condition");
                }
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
                span,
            } => {
                let span = *span;
                if let Some(e) = init {
                    let _ = self.check_expr(e);
                }
                if let Some(e) = cond
                    && self.check_expr(e).is_ok()
                {
                    self.require_scalar(e, span, "loop condition");
                }
                if let Some(e) = post {
                    let _ = self.check_expr(e);
                }
                self.enter_loop();
                self.check_stmt(body);
                self.leave_loop();
            }
            Stmt::Switch { cond, body, span } => {
                let span = *span;
                if self.check_expr(cond).is_ok() {
                    let ty = cond.ty().clone();
                    if !ty.is_integer() {
                        self.error(span, "switch expression must have integer type");
                    }
                }
                let ctx = self.func.as_mut().expect("statement outside a function");
                ctx.switch_cases.push((HashSet::new(), false));
                ctx.breakable_depth += 1;
                self.check_stmt(body);
                let ctx = self.func.as_mut().expect("statement outside a function");
                ctx.breakable_depth -= 1;
                ctx.switch_cases.pop();
            }
            Stmt::Case { value, body, span } => {
                let span = *span;
                let _ = self.check_expr(value);
                match eval_const_expr(value, &self.info) {
                    Ok(v) => {
                        let ctx = self.func.as_mut().expect("statement outside a function");
                        let inserted = ctx
                            .switch_cases
                            .last_mut()
                            .map(|(seen, _)| seen.insert(v));
                        match inserted {
                            Some(false) => {
                                self.error(span, format!("duplicate case value '{}'", v));
                            }
                            Some(true) => {}
                            None => {
                                self.error(span, "'case' label outside a switch");
                            }
                        }
                    }
                    Err(msg) => {
                        self.error(span, format!("case label is not constant: {}", msg));
                    }
                }
                self.check_stmt(body);
            }
            Stmt::Default { body, span } => {
                let span = *span;
                let ctx = self.func.as_mut().expect("statement outside a function");
                let seen_before = ctx.switch_cases.last_mut().map(|(_, has_default)| {
                    let was = *has_default;
                    *has_default = true;
                    was
                });
                match seen_before {
                    Some(true) => {
                        self.error(span, "multiple 'default' labels in one switch");
                    }
                    Some(false) => {}
                    None => {
                        self.error(span, "'default' label outside a switch");
                    }
                }
                self.check_stmt(body);
            }
            Stmt::Break { span } => {
                let ctx = self.func.as_ref().expect("statement outside a function");
                if ctx.breakable_depth == 0 {
                    let span = *span;
                    self.error(span, "'break' outside a loop or switch");
                }
            }
            Stmt::Continue { span } => {
                let ctx = self.func.as_ref().expect("statement outside a function");
                if ctx.loop_depth == 0 {
                    let span = *span;
                    self.error(span, "'continue' outside a loop");
                }
            }
            Stmt::Return { value, span } => {
                let span = *span;
                let ret = self
                    .func
                    .as_ref()
                    .expect("statement outside a function")
                    .ret
                    .clone();
                match value {
                    Some(e) => {
                        if ret.is_void() {
                            self.error(span, "'return' with a value in a void function");
                        } else if self.check_expr(e).is_ok() {
                            self.check_assignable(&ret, e, span);
                        }
                    }
                    None => {
                        if !ret.is_void() {
                            self.error(
                                span,
                                "'return' without a value in a non-void function",
                            );
                        }
                    }
                }
            }
            Stmt::Goto { label, span } => {
                let label = label.clone();
                let span = *span;
                let ctx = self.func.as_mut().expect("statement outside a function");
                ctx.gotos.push((label, span));
            }
            Stmt::Labeled { label, body, span } => {
                let span = *span;
                let label_name = label.clone();
                let ctx = self.func.as_mut().expect("statement outside a function");
                if !ctx.labels.insert(label_name.clone()) {
                    self.error(span, format!("duplicate label '{}'", label_name));
                }
                self.check_stmt(body);
            }
        }
    }

    fn enter_loop(&mut self) {
        let ctx = self.func.as_mut().expect("statement outside a function");
        ctx.loop_depth += 1;
        ctx.breakable_depth += 1;
    }

    fn leave_loop(&mut self) {
        let ctx = self.func.as_mut().expect("statement outside a function");
        ctx.loop_depth -= 1;
        ctx.breakable_depth -= 1;
    }

    fn require_scalar(&mut self, e: &Expr, span: Span, what: &str) {
        let ty = self.decayed(e.ty());
        if !ty.is_scalar() {
            self.error(span, format!("{} must have scalar type, found '{}'", what, ty));
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Is this expression an lvalue (designates storage)?
    fn is_lvalue(e: &Expr) -> bool {
        match &e.kind {
            ExprKind::Ident(_) => !matches!(
                e.ty.as_ref().map(|t| &t.kind),
                Some(TypeKind::Function { .. })
            ),
            ExprKind::Unary {
                op: UnaryOp::Deref, ..
            } => true,
            ExprKind::Index { .. } => true,
            ExprKind::Member { .. } => true,
            ExprKind::StrLit(_) => true,
            _ => false,
        }
    }

    /// Enforce the rules for a write target: lvalue, not const, not an
    /// aggregate or array
    fn check_write_target(&mut self, target: &Expr, span: Span) {
        if !Self::is_lvalue(target) || self.names_enum_constant(target) {
            self.error(span, "assignment target is not an lvalue");
            return;
        }
        let ty = target.ty();
        if ty.is_const {
            self.error(span, "assignment to 'const'-qualified object");
        } else if ty.is_array() {
            self.error(span, "array expression is not assignable");
        } else if ty.is_record() {
            self.error(span, "structure assignment is not supported");
        }
    }

    /// Conversion check for assignment, initialization, argument
    /// passing and return
    fn check_assignable(&mut self, dst: &Type, src: &Expr, span: Span) {
        let src_ty = self.decayed(src.ty());
        let is_null = matches!(src.kind, ExprKind::IntLit { value: 0, .. });
        match (&dst.kind, &src_ty.kind) {
            (TypeKind::Int { .. }, TypeKind::Int { .. }) => {}
            (TypeKind::Pointer(a), TypeKind::Pointer(b)) => {
                let a_void = a.is_void();
                let b_void = b.is_void();
                if !a_void && !b_void && !a.compatible(b) {
                    self.warn(span, format!("incompatible pointer types ('{}' from '{}')", dst, src_ty));
                }
            }
            (TypeKind::Pointer(_), TypeKind::Int { .. }) => {
                if !is_null {
                    self.warn(
                        span,
                        "making a pointer from an integer without a cast",
                    );
                }
            }
            (TypeKind::Int { .. }, TypeKind::Pointer(_)) => {
                self.warn(
                    span,
                    "making an integer from a pointer without a cast",
                );
            }
            _ => {
                self.error(
                    span,
                    format!("incompatible types ('{}' from '{}')", dst, src_ty),
                );
            }
        }
    }

    fn check_expr(&mut self, e: &mut Expr) -> SResult<()> {
        let span = e.span;
        let ty = match &mut e.kind {
            ExprKind::IntLit {
                value,
                unsigned,
                long,
            } => {
                // a decimal literal too large for its natural type widens
                let mut long = *long;
                let mut unsigned = *unsigned;
                if !long && !unsigned && *value > i32::MAX as i64 {
                    long = true;
                } else if !long && unsigned && *value > u32::MAX as i64 {
                    long = true;
                    unsigned = true;
                }
                let width = if long { IntWidth::Long } else { IntWidth::Int };
                Type::integer(width, unsigned)
            }
            ExprKind::CharLit(_) => Type::int(),
            ExprKind::StrLit(bytes) => {
                let len = bytes.len() + 1; // the NUL the backend appends
                self.info.intern_string(bytes);
                Type::array_of(Type::char_type(), Some(len))
            }
            ExprKind::Ident(name) => {
                let Some(symbol) = self.lookup(name) else {
                    let msg = format!("undefined identifier '{}'", name);
                    self.error(span, msg);
                    return Err(());
                };
                let symbol = symbol.clone();
                match symbol.kind {
                    SymbolKind::Var { unique } => {
                        *name = unique;
                        symbol.ty
                    }
                    SymbolKind::EnumConst(_) => Type::int(),
                    SymbolKind::Func => symbol.ty,
                    SymbolKind::TypedefName => {
                        let msg = format!("'{}' names a type, not a value", name);
                        self.error(span, msg);
                        return Err(());
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.check_expr(lhs)?;
                self.check_expr(rhs)?;
                self.type_binary(op, lhs, rhs, span)?
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                self.check_expr(operand)?;
                self.type_unary(op, operand, span)?
            }
            ExprKind::Postfix { operand, .. } => {
                self.check_expr(operand)?;
                let ty = self.decayed(operand.ty());
                if !ty.is_scalar() {
                    self.error(span, "operand of '++'/'--' must be scalar");
                    return Err(());
                }
                self.check_write_target(operand, span);
                ty
            }
            ExprKind::Assign { op, target, value } => {
                let op = *op;
                self.check_expr(target)?;
                self.check_expr(value)?;
                self.check_write_target(target, span);
                let target_ty = {
                    let mut t = target.ty().clone();
                    t.is_const = false;
                    t
                };
                if let Some(binop) = op {
                    // the embedded operation must itself type-check
                    self.type_binary(binop, target, value, span)?;
                } else {
                    self.check_assignable(&target_ty, value, span);
                }
                target_ty
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.check_expr(cond)?;
                self.require_scalar(cond, span, "'?:' condition");
                self.check_expr(then_expr)?;
                self.check_expr(else_expr)?;
                let t = self.decayed(then_expr.ty());
                let u = self.decayed(else_expr.ty());
                if t.is_integer() && u.is_integer() {
                    Self::usual_arith(&t, &u)
                } else if t.is_pointer() && u.is_pointer() {
                    if !t.compatible(&u) {
                        self.warn(span, "pointer type mismatch in '?:'");
                    }
                    t
                } else if t.is_pointer()
                    && matches!(else_expr.kind, ExprKind::IntLit { value: 0, .. })
                {
                    t
                } else if u.is_pointer()
                    && matches!(then_expr.kind, ExprKind::IntLit { value: 0, .. })
                {
                    u
                } else if t.is_void() && u.is_void() {
                    Type::void()
                } else {
                    self.error(span, "incompatible operand types in '?:'");
                    return Err(());
                }
            }
            ExprKind::Call { callee, args } => {
                self.check_expr(callee)?;
                let callee_ty = callee.ty().clone();
                let fn_ty = match &callee_ty.kind {
                    TypeKind::Function { .. } => callee_ty.clone(),
                    TypeKind::Pointer(p) if p.is_function() => (**p).clone(),
                    _ => {
                        self.error(span, "called object is not a function");
                        return Err(());
                    }
                };
                let TypeKind::Function {
                    ret,
                    params,
                    variadic,
                } = &fn_ty.kind
                else {
                    unreachable!("checked above");
                };
                if args.len() < params.len() || (args.len() > params.len() && !variadic) {
                    self.error(
                        span,
                        format!(
                            "wrong number of arguments: expected {}{}, got {}",
                            params.len(),
                            if *variadic { " or more" } else { "" },
                            args.len()
                        ),
                    );
                    return Err(());
                }
                if ret.is_record() {
                    self.error(span, "calling a function that returns a structure by value is not supported");
                    return Err(());
                }
                for (i, arg) in args.iter_mut().enumerate() {
                    self.check_expr(arg)?;
                    let arg_ty = self.decayed(arg.ty());
                    if arg_ty.is_record() {
                        self.error(
                            arg.span,
                            "passing structures by value is not supported",
                        );
                        return Err(());
                    }
                    if let Some(pty) = params.get(i) {
                        let span = arg.span;
                        let pty = pty.clone();
                        self.check_assignable(&pty, arg, span);
                    }
                }
                (**ret).clone()
            }
            ExprKind::Index { base, index } => {
                self.check_expr(base)?;
                self.check_expr(index)?;
                // `a[i]` is `*(a + i)`; either side may be the pointer
                let base_ty = self.decayed(base.ty());
                let index_ty = self.decayed(index.ty());
                let elem = if base_ty.is_pointer() && index_ty.is_integer() {
                    base_ty.pointee().expect("pointer").clone()
                } else if index_ty.is_pointer() && base_ty.is_integer() {
                    index_ty.pointee().expect("pointer").clone()
                } else {
                    self.error(span, "subscript needs a pointer and an integer");
                    return Err(());
                };
                if self.info.size_of(&elem).is_err() {
                    self.error(span, format!("subscript of incomplete type '{}'", elem));
                    return Err(());
                }
                elem
            }
            ExprKind::Member {
                base,
                member,
                arrow,
            } => {
                let arrow = *arrow;
                let member = member.clone();
                self.check_expr(base)?;
                let base_ty = base.ty().clone();
                let record_ty = if arrow {
                    let ty = self.decayed(&base_ty);
                    match ty.pointee() {
                        Some(p) => p.clone(),
                        None => {
                            self.error(span, "'->' needs a pointer to a struct or union");
                            return Err(());
                        }
                    }
                } else {
                    base_ty.clone()
                };
                let TypeKind::Record { tag, .. } = &record_ty.kind else {
                    self.error(
                        span,
                        format!("member access on non-aggregate type '{}'", record_ty),
                    );
                    return Err(());
                };
                let Some(layout) = self.info.records.get(tag) else {
                    self.error(span, format!("'{}' is incomplete", record_ty));
                    return Err(());
                };
                let Some(m) = layout.member(&member) else {
                    let msg = format!("'{}' has no member named '{}'", record_ty, member);
                    self.error(span, msg);
                    return Err(());
                };
                let mut ty = m.ty.clone();
                ty.is_const |= record_ty.is_const;
                ty
            }
            ExprKind::Cast { target, operand } => {
                let resolved = self.resolve_type(&target.clone(), span)?;
                *target = resolved.clone();
                self.check_expr(operand)?;
                if resolved.is_void() {
                    Type::void()
                } else {
                    let src = self.decayed(operand.ty());
                    if !resolved.is_scalar() {
                        self.error(span, format!("cast to non-scalar type '{}'", resolved));
                        return Err(());
                    }
                    if !src.is_scalar() {
                        self.error(span, format!("cast from non-scalar type '{}'", src));
                        return Err(());
                    }
                    resolved
                }
            }
            ExprKind::SizeofExpr(operand) => {
                self.check_expr(operand)?;
                // no decay: sizeof an array is the whole array
                let ty = operand.ty().clone();
                if let Err(msg) = self.info.size_of(&ty) {
                    self.error(span, format!("invalid sizeof operand: {}", msg));
                    return Err(());
                }
                Type::ulong()
            }
            ExprKind::SizeofType(ty) => {
                let resolved = self.resolve_type(&ty.clone(), span)?;
                *ty = resolved.clone();
                if let Err(msg) = self.info.size_of(&resolved) {
                    self.error(span, format!("invalid sizeof operand: {}", msg));
                    return Err(());
                }
                Type::ulong()
            }
            ExprKind::Comma { lhs, rhs } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)?;
                self.decayed(rhs.ty())
            }
        };
        e.ty = Some(ty);
        Ok(())
    }

    fn type_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> SResult<Type> {
        let l = self.decayed(lhs.ty());
        let r = self.decayed(rhs.ty());
        if op.is_logical() {
            if !l.is_scalar() || !r.is_scalar() {
                self.error(span, format!("invalid operands to '{}'", op));
                return Err(());
            }
            return Ok(Type::int());
        }
        if op.is_comparison() {
            if l.is_integer() && r.is_integer() {
                return Ok(Type::int());
            }
            if l.is_pointer() && r.is_pointer() {
                if !l.compatible(&r) {
                    self.warn(span, "comparison of incompatible pointer types");
                }
                return Ok(Type::int());
            }
            if (l.is_pointer() && r.is_integer()) || (l.is_integer() && r.is_pointer()) {
                // comparing against a literal 0 is the null-pointer idiom
                let null = matches!(lhs.kind, ExprKind::IntLit { value: 0, .. })
                    || matches!(rhs.kind, ExprKind::IntLit { value: 0, .. });
                if !null {
                    self.warn(span, "comparison between pointer and integer");
                }
                return Ok(Type::int());
            }
            self.error(span, format!("invalid operands to '{}'", op));
            return Err(());
        }
        if op.is_shift() {
            if !l.is_integer() || !r.is_integer() {
                self.error(span, format!("invalid operands to '{}'", op));
                return Err(());
            }
            // only the left operand's promoted type matters
            return Ok(Self::promote(&l));
        }
        match op {
            BinaryOp::Add => {
                if l.is_integer() && r.is_integer() {
                    Ok(Self::usual_arith(&l, &r))
                } else if l.is_pointer() && r.is_integer() {
                    self.require_complete_pointee(&l, span)?;
                    Ok(l)
                } else if l.is_integer() && r.is_pointer() {
                    self.require_complete_pointee(&r, span)?;
                    Ok(r)
                } else {
                    self.error(span, "invalid operands to '+'");
                    Err(())
                }
            }
            BinaryOp::Sub => {
                if l.is_integer() && r.is_integer() {
                    Ok(Self::usual_arith(&l, &r))
                } else if l.is_pointer() && r.is_integer() {
                    self.require_complete_pointee(&l, span)?;
                    Ok(l)
                } else if l.is_pointer() && r.is_pointer() {
                    if !l.compatible(&r) {
                        self.error(span, "subtraction of incompatible pointer types");
                        return Err(());
                    }
                    self.require_complete_pointee(&l, span)?;
                    // element count is a signed integer
                    Ok(Type::long())
                } else {
                    self.error(span, "invalid operands to '-'");
                    Err(())
                }
            }
            _ => {
                // * / % & | ^
                if l.is_integer() && r.is_integer() {
                    Ok(Self::usual_arith(&l, &r))
                } else {
                    self.error(span, format!("invalid operands to '{}'", op));
                    Err(())
                }
            }
        }
    }

    fn require_complete_pointee(&mut self, ptr: &Type, span: Span) -> SResult<()> {
        let pointee = ptr.pointee().expect("pointer type");
        if self.info.size_of(pointee).is_err() {
            self.error(
                span,
                format!("arithmetic on pointer to incomplete type '{}'", pointee),
            );
            return Err(());
        }
        Ok(())
    }

    fn type_unary(&mut self, op: UnaryOp, operand: &mut Expr, span: Span) -> SResult<Type> {
        match op {
            UnaryOp::Plus | UnaryOp::Neg | UnaryOp::BitNot => {
                let ty = self.decayed(operand.ty());
                if !ty.is_integer() {
                    self.error(span, "operand must have integer type");
                    return Err(());
                }
                Ok(Self::promote(&ty))
            }
            UnaryOp::LogNot => {
                let ty = self.decayed(operand.ty());
                if !ty.is_scalar() {
                    self.error(span, "operand of '!' must be scalar");
                    return Err(());
                }
                Ok(Type::int())
            }
            UnaryOp::Deref => {
                let ty = self.decayed(operand.ty());
                match ty.pointee() {
                    Some(p) => Ok(p.clone()),
                    None => {
                        let msg = format!("cannot dereference non-pointer type '{}'", ty);
                        self.error(span, msg);
                        Err(())
                    }
                }
            }
            UnaryOp::AddrOf => {
                let inner_ty = operand.ty().clone();
                if inner_ty.is_function() {
                    return Ok(Type::pointer_to(inner_ty));
                }
                if !Self::is_lvalue(operand) || self.names_enum_constant(operand) {
                    self.error(span, "cannot take the address of an rvalue");
                    return Err(());
                }
                // `register` objects cannot be address-taken
                if let ExprKind::Ident(name) = &operand.kind {
                    let is_register = self
                        .lookup(name)
                        .map(|s| s.storage == StorageClass::Register)
                        .unwrap_or(false)
                        || self.register_locals_contains(name);
                    if is_register {
                        self.error(span, "cannot take the address of a 'register' variable");
                        return Err(());
                    }
                }
                Ok(Type::pointer_to(inner_ty))
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let ty = self.decayed(operand.ty());
                if !ty.is_scalar() {
                    self.error(span, "operand of '++'/'--' must be scalar");
                    return Err(());
                }
                self.check_write_target(operand, span);
                Ok(ty)
            }
        }
    }

    /// An identifier naming an enumerator is a constant, not storage
    fn names_enum_constant(&self, e: &Expr) -> bool {
        let ExprKind::Ident(name) = &e.kind else {
            return false;
        };
        self.lookup(name)
            .map(|s| matches!(s.kind, SymbolKind::EnumConst(_)))
            .unwrap_or(false)
    }

    /// Renamed locals are looked up by their unique name
    fn register_locals_contains(&self, unique: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            for symbol in scope.symbols.values() {
                if let SymbolKind::Var { unique: u } = &symbol.kind
                    && u == unique
                {
                    return symbol.storage == StorageClass::Register;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn analyze_ok(source: &str) -> (TranslationUnit, SemanticInfo, Vec<Diagnostic>) {
        let tokens = tokenize(source, "test.c").unwrap();
        let mut unit = parse(tokens, "test.c").unwrap();
        let (info, warnings) = analyze(&mut unit, "test.c").unwrap();
        (unit, info, warnings)
    }

    fn analyze_err(source: &str) -> Vec<Diagnostic> {
        let tokens = tokenize(source, "test.c").unwrap();
        let mut unit = parse(tokens, "test.c").unwrap();
        analyze(&mut unit, "test.c").unwrap_err()
    }

    fn first_fn_body(unit: &TranslationUnit) -> &Vec<BlockItem> {
        for d in &unit.decls {
            if let Decl::Func(f) = d
                && let Some(body) = &f.body
            {
                return body;
            }
        }
        panic!("no function definition in test source");
    }

    #[test]
    fn test_every_expression_gets_a_type() {
        let (unit, _, _) = analyze_ok(
            "int add(int a, int b){ return a + b * 2; }",
        );
        let body = first_fn_body(&unit);
        let BlockItem::Stmt(Stmt::Return {
            value: Some(e), ..
        }) = &body[0]
        else {
            panic!()
        };
        assert!(e.ty.is_some());
        let ExprKind::Binary { lhs, rhs, .. } = &e.kind else {
            panic!()
        };
        assert!(lhs.ty.is_some());
        assert!(rhs.ty.is_some());
        assert_eq!(e.ty().clone(), Type::int());
    }

    #[test]
    fn test_promotion_char_plus_char_is_int() {
        let (unit, _, _) = analyze_ok("int f(char a, char b){ return a + b; }");
        let body = first_fn_body(&unit);
        let BlockItem::Stmt(Stmt::Return {
            value: Some(e), ..
        }) = &body[0]
        else {
            panic!()
        };
        assert_eq!(e.ty().clone(), Type::int());
    }

    #[test]
    fn test_usual_arith_unsigned_wins() {
        let (unit, _, _) = analyze_ok(
            "unsigned int g; long h; int f(unsigned int u, int i, long l){ \
             return (int)(u + i) + (int)(l + i); }",
        );
        let body = first_fn_body(&unit);
        let BlockItem::Stmt(Stmt::Return {
            value: Some(e), ..
        }) = &body[0]
        else {
            panic!()
        };
        // the inner additions: u+i is unsigned int, l+i is long
        let ExprKind::Binary { lhs, rhs, .. } = &e.kind else {
            panic!()
        };
        let ExprKind::Cast { operand: a, .. } = &lhs.kind else {
            panic!()
        };
        let ExprKind::Cast { operand: b, .. } = &rhs.kind else {
            panic!()
        };
        assert_eq!(a.ty().clone(), Type::uint());
        assert_eq!(b.ty().clone(), Type::long());
    }

    #[test]
    fn test_pointer_arithmetic_types() {
        let (unit, _, _) = analyze_ok(
            "long f(int *p, int *q){ int *r = p + 2; return q - p; }",
        );
        let body = first_fn_body(&unit);
        let BlockItem::Stmt(Stmt::Return {
            value: Some(e), ..
        }) = &body[1]
        else {
            panic!()
        };
        assert_eq!(e.ty().clone(), Type::long());
    }

    #[test]
    fn test_array_decays_in_expression_not_in_sizeof() {
        let (unit, _, _) = analyze_ok(
            "unsigned long f(void){ int a[4]; int *p = a; return sizeof a; }",
        );
        let body = first_fn_body(&unit);
        let BlockItem::Stmt(Stmt::Return {
            value: Some(e), ..
        }) = &body[2]
        else {
            panic!()
        };
        let ExprKind::SizeofExpr(inner) = &e.kind else {
            panic!()
        };
        // array type preserved under sizeof
        assert!(inner.ty().is_array());
    }

    #[test]
    fn test_struct_layout_natural_alignment() {
        let (_, info, _) = analyze_ok(
            "struct s { char c; int i; char d; long l; };",
        );
        let layout = &info.records["s"];
        let offsets: Vec<usize> = layout.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(layout.size, 24);
        assert_eq!(layout.align, 8);
    }

    #[test]
    fn test_union_layout() {
        let (_, info, _) = analyze_ok("union u { char c; int i; long l; };");
        let layout = &info.records["u"];
        assert!(layout.members.iter().all(|m| m.offset == 0));
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 8);
    }

    #[test]
    fn test_enum_values_implicit_and_explicit() {
        let (_, info, _) = analyze_ok("enum e { A, B = 5, C, D = B + 10 };");
        assert_eq!(info.enum_consts["A"], 0);
        assert_eq!(info.enum_consts["B"], 5);
        assert_eq!(info.enum_consts["C"], 6);
        assert_eq!(info.enum_consts["D"], 15);
    }

    #[test]
    fn test_self_referential_struct_through_pointer() {
        let (_, info, _) = analyze_ok(
            "struct node { int value; struct node *next; };",
        );
        assert_eq!(info.records["node"].size, 16);
    }

    #[test]
    fn test_string_literals_interned_and_deduplicated() {
        let (_, info, _) = analyze_ok(
            r#"char *a = "hi"; char *b = "hi"; char *c = "other";"#,
        );
        assert_eq!(info.strings.len(), 2);
    }

    #[test]
    fn test_locals_renamed_per_block() {
        let (unit, info, _) = analyze_ok(
            "int f(void){ int x; x = 1; { int x; x = 2; } return x; }",
        );
        let frame = &info.frames["f"];
        // two distinct slots for the two `x`s
        assert_eq!(frame.slots.len(), 2);
        let body = first_fn_body(&unit);
        let BlockItem::Decl(outer) = &body[0] else { panic!() };
        assert_ne!(outer.name, "x");
    }

    #[test]
    fn test_frame_layout_params_spilled_first() {
        let (_, info, _) = analyze_ok("int f(int a, int b){ int c; return a + b; }");
        let frame = &info.frames["f"];
        assert_eq!(frame.reg_params.len(), 2);
        assert_eq!(frame.reg_params[0].1, -8);
        assert_eq!(frame.reg_params[1].1, -16);
        assert_eq!(frame.size % 16, 0);
        assert!(frame.size >= 24);
    }

    #[test]
    fn test_stack_params_positive_offsets() {
        let (_, info, _) = analyze_ok(
            "long f(long a, long b, long c, long d, long e, long g, long h, long i){ \
             return h + i; }",
        );
        let frame = &info.frames["f"];
        let offsets: Vec<i64> = frame.slots.values().map(|s| s.offset).collect();
        assert!(offsets.contains(&16));
        assert!(offsets.contains(&24));
        assert_eq!(frame.reg_params.len(), 6);
    }

    #[test]
    fn test_undefined_identifier() {
        let diags = analyze_err("int f(void){ return missing; }");
        assert!(diags[0].message.contains("undefined identifier"));
    }

    #[test]
    fn test_const_write_rejected() {
        let diags = analyze_err("int f(void){ const int x = 1; x = 2; return x; }");
        assert!(diags[0].message.contains("const"));
    }

    #[test]
    fn test_register_address_rejected() {
        let diags = analyze_err("int f(void){ register int x; int *p = &x; return 0; }");
        assert!(diags[0].message.contains("register"));
    }

    #[test]
    fn test_duplicate_case_rejected() {
        let diags = analyze_err(
            "int f(int x){ switch(x){ case 1: return 1; case 1: return 2; } return 0; }",
        );
        assert!(diags[0].message.contains("duplicate case"));
    }

    #[test]
    fn test_enum_constant_case_labels_fold() {
        let (_, _, warnings) = analyze_ok(
            "enum e { A, B };\n\
             int f(int x){ switch(x){ case A: return 1; case B: return 2; } return 0; }",
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_multiple_defaults_rejected() {
        let diags = analyze_err(
            "int f(int x){ switch(x){ default: return 1; default: return 2; } }",
        );
        assert!(diags[0].message.contains("default"));
    }

    #[test]
    fn test_goto_missing_label() {
        let diags = analyze_err("int f(void){ goto done; return 0; }");
        assert!(diags[0].message.contains("done"));
    }

    #[test]
    fn test_goto_defined_label_ok() {
        analyze_ok("int f(void){ goto done; done: return 0; }");
    }

    #[test]
    fn test_break_outside_loop() {
        let diags = analyze_err("int f(void){ break; return 0; }");
        assert!(diags[0].message.contains("break"));
    }

    #[test]
    fn test_continue_outside_loop() {
        let diags = analyze_err(
            "int f(int x){ switch(x){ case 1: continue; } return 0; }",
        );
        assert!(diags[0].message.contains("continue"));
    }

    #[test]
    fn test_static_local_rejected() {
        let diags = analyze_err("int f(void){ static int x; return 0; }");
        assert!(diags[0].message.contains("static"));
    }

    #[test]
    fn test_extern_with_initializer_rejected() {
        let diags = analyze_err("extern int x = 5;");
        assert!(diags[0].message.contains("extern"));
    }

    #[test]
    fn test_void_object_rejected() {
        let diags = analyze_err("void x;");
        assert!(diags[0].message.contains("void"));
    }

    #[test]
    fn test_return_value_in_void_function() {
        let diags = analyze_err("void f(void){ return 1; }");
        assert!(diags[0].message.contains("void function"));
    }

    #[test]
    fn test_prototype_then_definition_ok() {
        analyze_ok("int f(int x); int f(int x){ return x; }");
    }

    #[test]
    fn test_conflicting_prototype_rejected() {
        let diags = analyze_err("int f(int x); long f(int x){ return x; }");
        assert!(diags[0].message.contains("conflicting"));
    }

    #[test]
    fn test_incompatible_pointer_assignment_warns_not_errors() {
        let (_, _, warnings) = analyze_ok(
            "int f(void){ int x; char *p = &x; return 0; }",
        );
        assert!(!warnings.is_empty());
        assert!(warnings[0].message.contains("pointer"));
    }

    #[test]
    fn test_global_initializer_blob() {
        let (_, info, _) = analyze_ok("int a[3] = {1, 2}; int s = 40 + 2;");
        let g = info.global("a").unwrap();
        assert_eq!(
            g.init,
            Some(ConstInit::List(vec![
                ConstInit::Scalar(1),
                ConstInit::Scalar(2)
            ]))
        );
        let s = info.global("s").unwrap();
        assert_eq!(s.init, Some(ConstInit::Scalar(42)));
    }

    #[test]
    fn test_sizeof_struct_from_layout() {
        let (_, info, _) = analyze_ok(
            "struct p { int x; int y; }; unsigned long n = sizeof(struct p);",
        );
        let g = info.global("n").unwrap();
        assert_eq!(g.init, Some(ConstInit::Scalar(8)));
    }

    #[test]
    fn test_typedef_resolution() {
        let (_, info, _) = analyze_ok(
            "typedef long word; typedef word *wordp; wordp p; unsigned long n = sizeof(word);",
        );
        assert_eq!(info.global("n").unwrap().init, Some(ConstInit::Scalar(8)));
        let p = info.global("p").unwrap();
        assert!(p.ty.is_pointer());
    }
}
