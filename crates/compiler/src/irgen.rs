//! Lowering from the annotated AST to three-address IR
//!
//! A post-order walk per function: every expression lowers to an operand
//! saying where its value lives. Values are kept in a canonical 64-bit
//! form (sign- or zero-extended from their C type), so conversions are
//! explicit extension ops at narrow boundaries and identities otherwise.
//! Short-circuit operators, the conditional operator and all statements
//! lower to labels and conditional jumps; `switch` becomes an ordered
//! compare-and-jump chain with the case bodies laid out linearly in
//! source order so fallthrough comes for free.
//!
//! The only optimization here is constant folding of integer `Bin` ops
//! whose operands are both immediates.

use crate::ast::{
    BinaryOp, BlockItem, Decl, Expr, ExprKind, Initializer, PostfixOp, Stmt, TranslationUnit,
    UnaryOp, VarDecl,
};
use crate::ir::{
    BinOp, DataItem, GlobalData, Instr, IrFunction, IrModule, Operand, UnOp, Width, string_label,
};
use crate::sema::{ConstInit, FrameLayout, SemanticInfo, eval_const_expr};
use crate::types::{Type, TypeKind};
use std::collections::VecDeque;
use tracing::debug;

/// Lower a checked translation unit. Errors here indicate pipeline bugs
/// (semantic analysis admits only lowerable programs).
pub fn lower(unit: &TranslationUnit, info: &SemanticInfo) -> Result<IrModule, String> {
    let mut module = IrModule::default();

    for (id, bytes) in info.strings.iter().enumerate() {
        module.strings.push((string_label(id), bytes.clone()));
    }

    for global in &info.globals {
        if !global.defined {
            continue;
        }
        let size = info.size_of(&global.ty)?;
        let align = info.align_of(&global.ty)?;
        let init = match &global.init {
            Some(c) => {
                let mut items = Vec::new();
                render_init(info, &global.ty, c, &mut items)?;
                Some(items)
            }
            None => None,
        };
        module.globals.push(GlobalData {
            name: global.name.clone(),
            size,
            align,
            init,
            exported: global.exported,
        });
    }

    let mut next_label = 0u32;
    for decl in &unit.decls {
        let Decl::Func(f) = decl else { continue };
        let Some(body) = &f.body else { continue };
        let frame = info
            .frames
            .get(&f.name)
            .ok_or_else(|| format!("missing frame layout for '{}'", f.name))?;
        let sig = info
            .functions
            .get(&f.name)
            .ok_or_else(|| format!("missing signature for '{}'", f.name))?;
        let mut lowerer = FnLowerer {
            info,
            frame,
            func_name: f.name.clone(),
            ret_ty: f.ret.clone(),
            body: Vec::new(),
            next_temp: 0,
            next_label: &mut next_label,
            breaks: Vec::new(),
            continues: Vec::new(),
            switches: Vec::new(),
        };
        for item in body {
            lowerer.lower_block_item(item)?;
        }
        // fall off the end: epilogue with an indeterminate return value
        if !matches!(lowerer.body.last(), Some(Instr::Ret { .. })) {
            lowerer.body.push(Instr::Ret { src: None });
        }
        debug!(
            function = %f.name,
            instrs = lowerer.body.len(),
            temps = lowerer.next_temp,
            "lowered"
        );
        module.functions.push(IrFunction {
            name: f.name.clone(),
            frame_size: frame.size,
            reg_params: frame.reg_params.clone(),
            temp_count: lowerer.next_temp,
            body: lowerer.body,
            exported: !sig.is_static,
        });
    }
    Ok(module)
}

/// Render a constant initializer into data items, zero-filling the tail
/// of partially initialized aggregates and struct padding holes
fn render_init(
    info: &SemanticInfo,
    ty: &Type,
    init: &ConstInit,
    out: &mut Vec<DataItem>,
) -> Result<(), String> {
    match (init, &ty.kind) {
        (ConstInit::Scalar(v), _) => {
            let size = ty
                .scalar_size()
                .ok_or_else(|| format!("scalar initializer for non-scalar '{}'", ty))?;
            let width = Width::from_size(size).ok_or("bad scalar width")?;
            out.push(DataItem::Int { value: *v, width });
            Ok(())
        }
        (ConstInit::Str(id), _) => {
            out.push(DataItem::StrLabel(string_label(*id)));
            Ok(())
        }
        (ConstInit::List(items), TypeKind::Array { elem, len }) => {
            let len = len.ok_or("incomplete array in initializer")?;
            let elem_size = info.size_of(elem)?;
            for item in items {
                render_init(info, elem, item, out)?;
            }
            if items.len() < len {
                out.push(DataItem::Zero((len - items.len()) * elem_size));
            }
            Ok(())
        }
        (ConstInit::List(items), TypeKind::Record { tag, .. }) => {
            let layout = info
                .records
                .get(tag)
                .ok_or_else(|| format!("missing layout for '{}'", tag))?;
            let mut at = 0usize;
            for (item, member) in items.iter().zip(&layout.members) {
                if member.offset > at {
                    out.push(DataItem::Zero(member.offset - at));
                }
                render_init(info, &member.ty, item, out)?;
                at = member.offset + info.size_of(&member.ty)?;
            }
            if at < layout.size {
                out.push(DataItem::Zero(layout.size - at));
            }
            Ok(())
        }
        _ => Err(format!("initializer does not match type '{}'", ty)),
    }
}

/// Where an lvalue lives, for reads, writes and address-of
enum Place {
    /// A named local frame slot (scalar slots are 8 bytes wide)
    LocalVar { name: String, ty: Type },
    /// A named global object, accessed at its true width
    GlobalVar { name: String, ty: Type },
    /// Behind a computed address
    Mem { addr: Operand, ty: Type },
    Indexed {
        base: Operand,
        index: Operand,
        elem: Type,
    },
    Field {
        base: Operand,
        offset: usize,
        ty: Type,
    },
}

impl Place {
    fn ty(&self) -> &Type {
        match self {
            Place::LocalVar { ty, .. }
            | Place::GlobalVar { ty, .. }
            | Place::Mem { ty, .. }
            | Place::Field { ty, .. } => ty,
            Place::Indexed { elem, .. } => elem,
        }
    }
}

struct FnLowerer<'a> {
    info: &'a SemanticInfo,
    frame: &'a FrameLayout,
    func_name: String,
    ret_ty: Type,
    body: Vec<Instr>,
    next_temp: u32,
    /// Shared across the module so generated labels never collide
    next_label: &'a mut u32,
    breaks: Vec<String>,
    continues: Vec<String>,
    switches: Vec<SwitchFrame>,
}

struct SwitchFrame {
    /// Labels for the cases, in source traversal order
    case_labels: VecDeque<String>,
    default_label: Option<String>,
}

impl<'a> FnLowerer<'a> {
    fn fresh_temp(&mut self) -> Operand {
        let t = Operand::Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    fn fresh_label(&mut self) -> String {
        let l = format!("L{}", *self.next_label);
        *self.next_label += 1;
        l
    }

    /// Labels written in the source are scoped to their function
    fn user_label(&self, name: &str) -> String {
        format!("{}.{}", self.func_name, name)
    }

    fn emit(&mut self, instr: Instr) {
        self.body.push(instr);
    }

    /// Strip arrays and functions down to the pointer they decay to
    fn decayed(ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Array { elem, .. } => Type::pointer_to((**elem).clone()),
            TypeKind::Function { .. } => Type::pointer_to(ty.clone()),
            _ => ty.clone(),
        }
    }

    fn width_of(&self, ty: &Type) -> Result<(Width, bool), String> {
        let size = ty
            .scalar_size()
            .ok_or_else(|| format!("expected a scalar type, found '{}'", ty))?;
        let width = Width::from_size(size).ok_or("bad scalar width")?;
        // pointers load and compare as unsigned
        let signed = ty.is_integer() && !ty.is_unsigned();
        Ok((width, signed))
    }

    /// Re-extend a value so it is canonical for `ty` (identity for
    /// 64-bit types and pointers)
    fn canonicalize(&mut self, value: Operand, ty: &Type) -> Operand {
        let Some(size) = ty.scalar_size() else {
            return value;
        };
        if size == 8 {
            return value;
        }
        let op = match (size, ty.is_unsigned()) {
            (1, false) => UnOp::Sext8,
            (1, true) => UnOp::Zext8,
            (2, false) => UnOp::Sext16,
            (2, true) => UnOp::Zext16,
            (4, false) => UnOp::Sext32,
            _ => UnOp::Zext32,
        };
        if let Operand::Imm(v) = value {
            return Operand::Imm(fold_extend(op, v));
        }
        let dst = self.fresh_temp();
        self.emit(Instr::Un {
            op,
            dst: dst.clone(),
            a: value,
        });
        dst
    }

    /// Convert a canonical value of `from` into a canonical value of
    /// `to`; an identity except when narrowing below 64 bits
    fn convert(&mut self, value: Operand, from: &Type, to: &Type) -> Operand {
        if from.compatible(to) {
            return value;
        }
        match to.scalar_size() {
            Some(size) if size < 8 => self.canonicalize(value, to),
            _ => value,
        }
    }

    /// Copy into a fresh temp unless the operand is already immutable
    fn materialize(&mut self, value: Operand) -> Operand {
        match value {
            Operand::Temp(_) | Operand::Imm(_) => value,
            other => {
                let dst = self.fresh_temp();
                self.emit(Instr::Mov {
                    dst: dst.clone(),
                    src: other,
                });
                dst
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_block_item(&mut self, item: &BlockItem) -> Result<(), String> {
        match item {
            BlockItem::Decl(v) => self.lower_local_decl(v),
            BlockItem::Stmt(s) => self.lower_stmt(s),
        }
    }

    fn lower_local_decl(&mut self, v: &VarDecl) -> Result<(), String> {
        let Some(Initializer::Expr(e)) = &v.init else {
            return Ok(());
        };
        let value = self.lower_expr(e)?;
        let value = self.convert(value, &Self::decayed(e.ty()), &v.ty);
        self.write_place(
            &Place::LocalVar {
                name: v.name.clone(),
                ty: v.ty.clone(),
            },
            value,
        )?;
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), String> {
        match stmt {
            Stmt::Compound { items, .. } => {
                for item in items {
                    self.lower_block_item(item)?;
                }
                Ok(())
            }
            Stmt::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
            Stmt::Empty { .. } => Ok(()),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let end = self.fresh_label();
                let cond_v = self.lower_expr(cond)?;
                match else_branch {
                    Some(else_branch) => {
                        let else_label = self.fresh_label();
                        self.emit(Instr::Jz {
                            cond: cond_v,
                            target: else_label.clone(),
                        });
                        self.lower_stmt(then_branch)?;
                        self.emit(Instr::Jmp(end.clone()));
                        self.emit(Instr::Label(else_label));
                        self.lower_stmt(else_branch)?;
                    }
                    None => {
                        self.emit(Instr::Jz {
                            cond: cond_v,
                            target: end.clone(),
                        });
                        self.lower_stmt(then_branch)?;
                    }
                }
                self.emit(Instr::Label(end));
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                let top = self.fresh_label();
                let end = self.fresh_label();
                self.emit(Instr::Label(top.clone()));
                let cond_v = self.lower_expr(cond)?;
                self.emit(Instr::Jz {
                    cond: cond_v,
                    target: end.clone(),
                });
                self.breaks.push(end.clone());
                self.continues.push(top.clone());
                self.lower_stmt(body)?;
                self.breaks.pop();
                self.continues.pop();
                self.emit(Instr::Jmp(top));
                self.emit(Instr::Label(end));
                Ok(())
            }
            Stmt::DoWhile { body, cond, .. } => {
                let top = self.fresh_label();
                let check = self.fresh_label();
                let end = self.fresh_label();
                self.emit(Instr::Label(top.clone()));
                self.breaks.push(end.clone());
                self.continues.push(check.clone());
                self.lower_stmt(body)?;
                self.breaks.pop();
                self.continues.pop();
                self.emit(Instr::Label(check));
                let cond_v = self.lower_expr(cond)?;
                self.emit(Instr::Jnz {
                    cond: cond_v,
                    target: top,
                });
                self.emit(Instr::Label(end));
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
                ..
            } => {
                if let Some(e) = init {
                    self.lower_expr(e)?;
                }
                let top = self.fresh_label();
                let cont = self.fresh_label();
                let end = self.fresh_label();
                self.emit(Instr::Label(top.clone()));
                if let Some(e) = cond {
                    let cond_v = self.lower_expr(e)?;
                    self.emit(Instr::Jz {
                        cond: cond_v,
                        target: end.clone(),
                    });
                }
                self.breaks.push(end.clone());
                self.continues.push(cont.clone());
                self.lower_stmt(body)?;
                self.breaks.pop();
                self.continues.pop();
                self.emit(Instr::Label(cont));
                if let Some(e) = post {
                    self.lower_expr(e)?;
                }
                self.emit(Instr::Jmp(top));
                self.emit(Instr::Label(end));
                Ok(())
            }
            Stmt::Switch { cond, body, .. } => self.lower_switch(cond, body),
            Stmt::Case { body, .. } => {
                let label = self
                    .switches
                    .last_mut()
                    .and_then(|f| f.case_labels.pop_front())
                    .ok_or("case label outside a lowered switch")?;
                self.emit(Instr::Label(label));
                self.lower_stmt(body)
            }
            Stmt::Default { body, .. } => {
                let label = self
                    .switches
                    .last()
                    .and_then(|f| f.default_label.clone())
                    .ok_or("default label outside a lowered switch")?;
                self.emit(Instr::Label(label));
                self.lower_stmt(body)
            }
            Stmt::Break { .. } => {
                let target = self.breaks.last().cloned().ok_or("break outside a loop")?;
                self.emit(Instr::Jmp(target));
                Ok(())
            }
            Stmt::Continue { .. } => {
                let target = self
                    .continues
                    .last()
                    .cloned()
                    .ok_or("continue outside a loop")?;
                self.emit(Instr::Jmp(target));
                Ok(())
            }
            Stmt::Return { value, .. } => {
                let src = match value {
                    Some(e) => {
                        let v = self.lower_expr(e)?;
                        let ret_ty = self.ret_ty.clone();
                        Some(self.convert(v, &Self::decayed(e.ty()), &ret_ty))
                    }
                    None => None,
                };
                self.emit(Instr::Ret { src });
                Ok(())
            }
            Stmt::Goto { label, .. } => {
                let target = self.user_label(label);
                self.emit(Instr::Jmp(target));
                Ok(())
            }
            Stmt::Labeled { label, body, .. } => {
                let l = self.user_label(label);
                self.emit(Instr::Label(l));
                self.lower_stmt(body)
            }
        }
    }

    fn lower_switch(&mut self, cond: &Expr, body: &Stmt) -> Result<(), String> {
        let v = self.lower_expr(cond)?;
        let scrutinee = self.materialize(v);
        let end = self.fresh_label();

        // one compare-and-jump per case, in source order
        let mut case_values = Vec::new();
        let mut has_default = false;
        collect_cases(body, &mut case_values, &mut has_default);

        let mut labels = VecDeque::new();
        for value_expr in &case_values {
            let value = eval_const_expr(value_expr, self.info)
                .map_err(|e| format!("unfoldable case label: {}", e))?;
            let label = self.fresh_label();
            let hit = self.fresh_temp();
            self.emit(Instr::Bin {
                op: BinOp::Eq,
                signed: true,
                dst: hit.clone(),
                a: scrutinee.clone(),
                b: Operand::Imm(value),
            });
            self.emit(Instr::Jnz {
                cond: hit,
                target: label.clone(),
            });
            labels.push_back(label);
        }
        let default_label = if has_default {
            let l = self.fresh_label();
            self.emit(Instr::Jmp(l.clone()));
            Some(l)
        } else {
            self.emit(Instr::Jmp(end.clone()));
            None
        };

        self.switches.push(SwitchFrame {
            case_labels: labels,
            default_label,
        });
        self.breaks.push(end.clone());
        self.lower_stmt(body)?;
        self.breaks.pop();
        self.switches.pop();
        self.emit(Instr::Label(end));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn lower_expr(&mut self, e: &Expr) -> Result<Operand, String> {
        match &e.kind {
            ExprKind::IntLit { value, .. } => Ok(Operand::Imm(*value)),
            ExprKind::CharLit(v) => Ok(Operand::Imm(*v)),
            ExprKind::StrLit(bytes) => {
                let id = self
                    .info
                    .string_id(bytes)
                    .ok_or("string literal missing from the table")?;
                let dst = self.fresh_temp();
                self.emit(Instr::Lea {
                    dst: dst.clone(),
                    src: Operand::Global(string_label(id)),
                });
                Ok(dst)
            }
            ExprKind::Ident(name) => self.lower_ident(name, e.ty()),
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_logical() {
                    return self.lower_short_circuit(*op, lhs, rhs);
                }
                let a = self.lower_expr(lhs)?;
                let b = self.lower_expr(rhs)?;
                self.lower_binop(
                    *op,
                    a,
                    &Self::decayed(lhs.ty()),
                    b,
                    &Self::decayed(rhs.ty()),
                    e.ty(),
                )
            }
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, e.ty()),
            ExprKind::Postfix { op, operand } => {
                let delta = match op {
                    PostfixOp::Inc => 1,
                    PostfixOp::Dec => -1,
                };
                self.lower_incdec(operand, delta, false)
            }
            ExprKind::Assign { op, target, value } => {
                let place = self.lower_place(target)?;
                let target_ty = place.ty().clone();
                let result = match op {
                    None => {
                        let v = self.lower_expr(value)?;
                        self.convert(v, &Self::decayed(value.ty()), &target_ty)
                    }
                    Some(binop) => {
                        // `a op= b` computes in 64-bit canonical form and
                        // narrows back to the target type
                        let current = self.read_place(&place)?;
                        let rhs = self.lower_expr(value)?;
                        self.lower_binop(
                            *binop,
                            current,
                            &Self::decayed(&target_ty),
                            rhs,
                            &Self::decayed(value.ty()),
                            &target_ty,
                        )?
                    }
                };
                self.write_place(&place, result.clone())?;
                Ok(result)
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let result = self.fresh_temp();
                let else_label = self.fresh_label();
                let end = self.fresh_label();
                let cond_v = self.lower_expr(cond)?;
                self.emit(Instr::Jz {
                    cond: cond_v,
                    target: else_label.clone(),
                });
                let t = self.lower_expr(then_expr)?;
                self.emit(Instr::Mov {
                    dst: result.clone(),
                    src: t,
                });
                self.emit(Instr::Jmp(end.clone()));
                self.emit(Instr::Label(else_label));
                let u = self.lower_expr(else_expr)?;
                self.emit(Instr::Mov {
                    dst: result.clone(),
                    src: u,
                });
                self.emit(Instr::Label(end));
                Ok(result)
            }
            ExprKind::Call { callee, args } => self.lower_call(callee, args, e.ty()),
            ExprKind::Index { .. } | ExprKind::Member { .. } => {
                let place = self.lower_place(e)?;
                self.read_place(&place)
            }
            ExprKind::Cast { target, operand } => {
                let v = self.lower_expr(operand)?;
                Ok(self.convert(v, &Self::decayed(operand.ty()), target))
            }
            ExprKind::SizeofExpr(operand) => {
                let size = self
                    .info
                    .size_of(operand.ty())
                    .map_err(|m| format!("sizeof of unsized type: {}", m))?;
                Ok(Operand::Imm(size as i64))
            }
            ExprKind::SizeofType(ty) => {
                let size = self
                    .info
                    .size_of(ty)
                    .map_err(|m| format!("sizeof of unsized type: {}", m))?;
                Ok(Operand::Imm(size as i64))
            }
            ExprKind::Comma { lhs, rhs } => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)
            }
        }
    }

    fn lower_ident(&mut self, name: &str, ty: &Type) -> Result<Operand, String> {
        if let Some(slot) = self.frame.slots.get(name) {
            let slot_ty = slot.ty.clone();
            if slot_ty.is_array() || slot_ty.is_record() {
                let dst = self.fresh_temp();
                self.emit(Instr::Lea {
                    dst: dst.clone(),
                    src: Operand::Local(name.to_string()),
                });
                return Ok(dst);
            }
            let local = Operand::Local(name.to_string());
            // narrow slots hold the value in their low bytes; re-extend
            if slot_ty.scalar_size() == Some(8) {
                return Ok(local);
            }
            return Ok(self.canonicalize(local, &slot_ty));
        }
        // enum constants lower to their integer value
        if let Some(&v) = self.info.enum_consts.get(name) {
            return Ok(Operand::Imm(v));
        }
        if ty.is_function() {
            let dst = self.fresh_temp();
            self.emit(Instr::Lea {
                dst: dst.clone(),
                src: Operand::Global(name.to_string()),
            });
            return Ok(dst);
        }
        // a global object
        if ty.is_array() || ty.is_record() {
            let dst = self.fresh_temp();
            self.emit(Instr::Lea {
                dst: dst.clone(),
                src: Operand::Global(name.to_string()),
            });
            return Ok(dst);
        }
        let (width, signed) = self.width_of(ty)?;
        let dst = self.fresh_temp();
        self.emit(Instr::Load {
            dst: dst.clone(),
            addr: Operand::Global(name.to_string()),
            width,
            signed,
        });
        Ok(dst)
    }

    fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Operand, String> {
        let result = self.fresh_temp();
        let short = self.fresh_label();
        let end = self.fresh_label();
        let a = self.lower_expr(lhs)?;
        match op {
            BinaryOp::LogAnd => self.emit(Instr::Jz {
                cond: a,
                target: short.clone(),
            }),
            BinaryOp::LogOr => self.emit(Instr::Jnz {
                cond: a,
                target: short.clone(),
            }),
            _ => unreachable!("caller filters logical ops"),
        }
        let b = self.lower_expr(rhs)?;
        match op {
            BinaryOp::LogAnd => self.emit(Instr::Jz {
                cond: b,
                target: short.clone(),
            }),
            BinaryOp::LogOr => self.emit(Instr::Jnz {
                cond: b,
                target: short.clone(),
            }),
            _ => unreachable!(),
        }
        let (taken, fallthrough) = match op {
            BinaryOp::LogAnd => (1, 0),
            _ => (0, 1),
        };
        self.emit(Instr::Mov {
            dst: result.clone(),
            src: Operand::Imm(taken),
        });
        self.emit(Instr::Jmp(end.clone()));
        self.emit(Instr::Label(short));
        self.emit(Instr::Mov {
            dst: result.clone(),
            src: Operand::Imm(fallthrough),
        });
        self.emit(Instr::Label(end));
        Ok(result)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, result_ty: &Type) -> Result<Operand, String> {
        match op {
            UnaryOp::Plus => self.lower_expr(operand),
            UnaryOp::Neg | UnaryOp::BitNot => {
                let a = self.lower_expr(operand)?;
                if let Operand::Imm(v) = a {
                    let folded = if op == UnaryOp::Neg { v.wrapping_neg() } else { !v };
                    return Ok(self.canonicalize(Operand::Imm(folded), result_ty));
                }
                let dst = self.fresh_temp();
                self.emit(Instr::Un {
                    op: if op == UnaryOp::Neg {
                        UnOp::Neg
                    } else {
                        UnOp::BitNot
                    },
                    dst: dst.clone(),
                    a,
                });
                Ok(self.canonicalize(dst, result_ty))
            }
            UnaryOp::LogNot => {
                let a = self.lower_expr(operand)?;
                if let Operand::Imm(v) = a {
                    return Ok(Operand::Imm((v == 0) as i64));
                }
                let dst = self.fresh_temp();
                self.emit(Instr::Un {
                    op: UnOp::LogNot,
                    dst: dst.clone(),
                    a,
                });
                Ok(dst)
            }
            UnaryOp::Deref => {
                // dereferencing a function pointer yields the function;
                // the value is still the pointer itself
                if result_ty.is_function() {
                    return self.lower_expr(operand);
                }
                let addr = self.lower_expr(operand)?;
                if result_ty.is_array() || result_ty.is_record() {
                    return Ok(addr);
                }
                let (width, signed) = self.width_of(result_ty)?;
                let dst = self.fresh_temp();
                self.emit(Instr::Load {
                    dst: dst.clone(),
                    addr,
                    width,
                    signed,
                });
                Ok(dst)
            }
            UnaryOp::AddrOf => {
                if operand.ty().is_function() {
                    return self.lower_expr(operand);
                }
                let place = self.lower_place(operand)?;
                self.addr_of_place(&place)
            }
            UnaryOp::PreInc => self.lower_incdec(operand, 1, true),
            UnaryOp::PreDec => self.lower_incdec(operand, -1, true),
        }
    }

    fn lower_incdec(&mut self, operand: &Expr, delta: i64, pre: bool) -> Result<Operand, String> {
        let place = self.lower_place(operand)?;
        let ty = place.ty().clone();
        let old = self.read_place(&place)?;
        let old = if pre { old } else { self.materialize(old) };
        let decayed = Self::decayed(&ty);
        let step = match decayed.pointee() {
            Some(pointee) => self.info.size_of(pointee)? as i64,
            None => 1,
        };
        let op = if delta > 0 { BinOp::Add } else { BinOp::Sub };
        let updated = self.fresh_temp();
        self.emit(Instr::Bin {
            op,
            signed: !ty.is_unsigned(),
            dst: updated.clone(),
            a: old.clone(),
            b: Operand::Imm(step),
        });
        let updated = self.canonicalize(updated, &ty);
        self.write_place(&place, updated.clone())?;
        Ok(if pre { updated } else { old })
    }

    fn lower_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        result_ty: &Type,
    ) -> Result<Operand, String> {
        // direct call to a named function, otherwise through a value
        let (callee_op, fn_ty) = match (&callee.kind, &callee.ty().kind) {
            (ExprKind::Ident(name), TypeKind::Function { .. }) => (
                Operand::Global(name.clone()),
                callee.ty().clone(),
            ),
            _ => {
                let v = self.lower_expr(callee)?;
                let fn_ty = match &callee.ty().kind {
                    TypeKind::Pointer(p) => (**p).clone(),
                    TypeKind::Function { .. } => callee.ty().clone(),
                    other => return Err(format!("call through non-function {:?}", other)),
                };
                (self.materialize(v), fn_ty)
            }
        };
        let TypeKind::Function {
            params, variadic, ..
        } = &fn_ty.kind
        else {
            return Err("callee does not have function type".to_string());
        };

        // arguments evaluate left to right into temporaries
        let mut arg_ops = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let v = self.lower_expr(arg)?;
            let v = match params.get(i) {
                Some(pty) => self.convert(v, &Self::decayed(arg.ty()), pty),
                None => v, // default argument promotions are identities here
            };
            arg_ops.push(self.materialize(v));
        }
        for src in arg_ops {
            self.emit(Instr::Param { src });
        }
        let dst = if result_ty.is_void() {
            None
        } else {
            Some(self.fresh_temp())
        };
        self.emit(Instr::Call {
            dst: dst.clone(),
            callee: callee_op,
            args: args.len(),
            variadic: *variadic,
        });
        Ok(dst.unwrap_or(Operand::Imm(0)))
    }

    fn lower_binop(
        &mut self,
        op: BinaryOp,
        a: Operand,
        a_ty: &Type,
        b: Operand,
        b_ty: &Type,
        result_ty: &Type,
    ) -> Result<Operand, String> {
        // pointer arithmetic scales the integer side by the element size
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
            if a_ty.is_pointer() && b_ty.is_integer() {
                let elem = self.info.size_of(a_ty.pointee().expect("pointer"))? as i64;
                let scaled = self.scale(b, elem)?;
                return self.emit_bin(bin_of(op), true, a, scaled, result_ty);
            }
            if op == BinaryOp::Add && a_ty.is_integer() && b_ty.is_pointer() {
                let elem = self.info.size_of(b_ty.pointee().expect("pointer"))? as i64;
                let scaled = self.scale(a, elem)?;
                return self.emit_bin(BinOp::Add, true, b, scaled, result_ty);
            }
            if op == BinaryOp::Sub && a_ty.is_pointer() && b_ty.is_pointer() {
                let elem = self.info.size_of(a_ty.pointee().expect("pointer"))? as i64;
                let diff = self.emit_bin(BinOp::Sub, true, a, b, &Type::long())?;
                return self.emit_bin(BinOp::Div, true, diff, Operand::Imm(elem), result_ty);
            }
        }

        let signed = if op.is_comparison() {
            if a_ty.is_pointer() || b_ty.is_pointer() {
                false
            } else {
                !common_unsigned(a_ty, b_ty)
            }
        } else if op.is_shift() {
            // the left operand alone decides arithmetic vs logical
            !a_ty.is_unsigned()
        } else {
            !common_unsigned(a_ty, b_ty)
        };
        self.emit_bin(bin_of(op), signed, a, b, result_ty)
    }

    /// Emit (or fold) one binary operation and re-canonicalize
    fn emit_bin(
        &mut self,
        op: BinOp,
        signed: bool,
        a: Operand,
        b: Operand,
        result_ty: &Type,
    ) -> Result<Operand, String> {
        if let (Operand::Imm(x), Operand::Imm(y)) = (&a, &b)
            && let Some(folded) = fold_binop(op, signed, *x, *y)
        {
            return Ok(self.canonicalize(Operand::Imm(folded), result_ty));
        }
        let dst = self.fresh_temp();
        self.emit(Instr::Bin {
            op,
            signed,
            dst: dst.clone(),
            a,
            b,
        });
        if matches!(
            op,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        ) {
            // comparisons produce 0/1, already canonical
            return Ok(dst);
        }
        Ok(self.canonicalize(dst, result_ty))
    }

    /// Multiply an index by an element size, folding immediates
    fn scale(&mut self, value: Operand, elem: i64) -> Result<Operand, String> {
        if elem == 1 {
            return Ok(value);
        }
        if let Operand::Imm(v) = value {
            return Ok(Operand::Imm(v.wrapping_mul(elem)));
        }
        let dst = self.fresh_temp();
        self.emit(Instr::Bin {
            op: BinOp::Mul,
            signed: true,
            dst: dst.clone(),
            a: value,
            b: Operand::Imm(elem),
        });
        Ok(dst)
    }

    // ------------------------------------------------------------------
    // Places
    // ------------------------------------------------------------------

    fn lower_place(&mut self, e: &Expr) -> Result<Place, String> {
        match &e.kind {
            ExprKind::Ident(name) => {
                let ty = e.ty().clone();
                if self.frame.slots.contains_key(name) {
                    Ok(Place::LocalVar {
                        name: name.clone(),
                        ty,
                    })
                } else {
                    Ok(Place::GlobalVar {
                        name: name.clone(),
                        ty,
                    })
                }
            }
            ExprKind::StrLit(bytes) => {
                let id = self
                    .info
                    .string_id(bytes)
                    .ok_or("string literal missing from the table")?;
                Ok(Place::GlobalVar {
                    name: string_label(id),
                    ty: e.ty().clone(),
                })
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let addr = self.lower_expr(operand)?;
                Ok(Place::Mem {
                    addr,
                    ty: e.ty().clone(),
                })
            }
            ExprKind::Index { base, index } => {
                // either side may be the pointer: `a[i]` and `i[a]`
                let (ptr_e, idx_e) = if Self::decayed(base.ty()).is_pointer() {
                    (base, index)
                } else {
                    (index, base)
                };
                let base_v = self.lower_expr(ptr_e)?;
                let base_v = self.materialize(base_v);
                let index_v = self.lower_expr(idx_e)?;
                Ok(Place::Indexed {
                    base: base_v,
                    index: index_v,
                    elem: e.ty().clone(),
                })
            }
            ExprKind::Member {
                base,
                member,
                arrow,
            } => {
                let base_addr = if *arrow {
                    let v = self.lower_expr(base)?;
                    self.materialize(v)
                } else {
                    let place = self.lower_place(base)?;
                    self.addr_of_place(&place)?
                };
                let record_ty = if *arrow {
                    Self::decayed(base.ty())
                        .pointee()
                        .expect("arrow base is a pointer")
                        .clone()
                } else {
                    base.ty().clone()
                };
                let TypeKind::Record { tag, .. } = &record_ty.kind else {
                    return Err(format!("member access on '{}'", record_ty));
                };
                let layout = self
                    .info
                    .records
                    .get(tag)
                    .ok_or_else(|| format!("missing layout for '{}'", tag))?;
                let m = layout
                    .member(member)
                    .ok_or_else(|| format!("no member '{}' in '{}'", member, tag))?;
                Ok(Place::Field {
                    base: base_addr,
                    offset: m.offset,
                    ty: e.ty().clone(),
                })
            }
            other => Err(format!("expression is not an lvalue: {:?}", other)),
        }
    }

    fn read_place(&mut self, place: &Place) -> Result<Operand, String> {
        let ty = place.ty().clone();
        // aggregates read as their address
        if ty.is_array() || ty.is_record() {
            return self.addr_of_place(place);
        }
        match place {
            Place::LocalVar { name, ty } => {
                let local = Operand::Local(name.clone());
                if ty.scalar_size() == Some(8) {
                    Ok(local)
                } else {
                    let ty = ty.clone();
                    Ok(self.canonicalize(local, &ty))
                }
            }
            Place::GlobalVar { name, ty } => {
                let (width, signed) = self.width_of(ty)?;
                let dst = self.fresh_temp();
                self.emit(Instr::Load {
                    dst: dst.clone(),
                    addr: Operand::Global(name.clone()),
                    width,
                    signed,
                });
                Ok(dst)
            }
            Place::Mem { addr, ty } => {
                let (width, signed) = self.width_of(ty)?;
                let dst = self.fresh_temp();
                self.emit(Instr::Load {
                    dst: dst.clone(),
                    addr: addr.clone(),
                    width,
                    signed,
                });
                Ok(dst)
            }
            Place::Indexed { base, index, elem } => {
                let (width, signed) = self.width_of(elem)?;
                let elem_size = self.info.size_of(elem)?;
                let dst = self.fresh_temp();
                self.emit(Instr::LoadIndex {
                    dst: dst.clone(),
                    base: base.clone(),
                    index: index.clone(),
                    elem_size,
                    width,
                    signed,
                });
                Ok(dst)
            }
            Place::Field { base, offset, ty } => {
                let (width, signed) = self.width_of(ty)?;
                let dst = self.fresh_temp();
                self.emit(Instr::LoadMember {
                    dst: dst.clone(),
                    base: base.clone(),
                    offset: *offset,
                    width,
                    signed,
                });
                Ok(dst)
            }
        }
    }

    fn write_place(&mut self, place: &Place, value: Operand) -> Result<(), String> {
        match place {
            Place::LocalVar { name, ty } => {
                // keep narrow slots canonical so direct reads stay cheap
                let ty = ty.clone();
                let value = self.canonicalize(value, &ty);
                self.emit(Instr::Mov {
                    dst: Operand::Local(name.clone()),
                    src: value,
                });
                Ok(())
            }
            Place::GlobalVar { name, ty } => {
                let (width, _) = self.width_of(ty)?;
                self.emit(Instr::Store {
                    addr: Operand::Global(name.clone()),
                    src: value,
                    width,
                });
                Ok(())
            }
            Place::Mem { addr, ty } => {
                let (width, _) = self.width_of(ty)?;
                self.emit(Instr::Store {
                    addr: addr.clone(),
                    src: value,
                    width,
                });
                Ok(())
            }
            Place::Indexed { base, index, elem } => {
                let (width, _) = self.width_of(elem)?;
                let elem_size = self.info.size_of(elem)?;
                self.emit(Instr::StoreIndex {
                    base: base.clone(),
                    index: index.clone(),
                    src: value,
                    elem_size,
                    width,
                });
                Ok(())
            }
            Place::Field { base, offset, ty } => {
                let (width, _) = self.width_of(ty)?;
                self.emit(Instr::StoreMember {
                    base: base.clone(),
                    offset: *offset,
                    src: value,
                    width,
                });
                Ok(())
            }
        }
    }

    fn addr_of_place(&mut self, place: &Place) -> Result<Operand, String> {
        match place {
            Place::LocalVar { name, .. } => {
                let dst = self.fresh_temp();
                self.emit(Instr::Lea {
                    dst: dst.clone(),
                    src: Operand::Local(name.clone()),
                });
                Ok(dst)
            }
            Place::GlobalVar { name, .. } => {
                let dst = self.fresh_temp();
                self.emit(Instr::Lea {
                    dst: dst.clone(),
                    src: Operand::Global(name.clone()),
                });
                Ok(dst)
            }
            Place::Mem { addr, .. } => Ok(addr.clone()),
            Place::Indexed { base, index, elem } => {
                let elem_size = self.info.size_of(elem)? as i64;
                let scaled = self.scale(index.clone(), elem_size)?;
                let dst = self.fresh_temp();
                self.emit(Instr::Bin {
                    op: BinOp::Add,
                    signed: true,
                    dst: dst.clone(),
                    a: base.clone(),
                    b: scaled,
                });
                Ok(dst)
            }
            Place::Field { base, offset, .. } => {
                if *offset == 0 {
                    return Ok(base.clone());
                }
                let dst = self.fresh_temp();
                self.emit(Instr::Bin {
                    op: BinOp::Add,
                    signed: true,
                    dst: dst.clone(),
                    a: base.clone(),
                    b: Operand::Imm(*offset as i64),
                });
                Ok(dst)
            }
        }
    }
}

/// Case constants of a switch body, in source order, not descending
/// into nested switches
fn collect_cases<'e>(stmt: &'e Stmt, values: &mut Vec<&'e Expr>, has_default: &mut bool) {
    match stmt {
        Stmt::Case { value, body, .. } => {
            values.push(value);
            collect_cases(body, values, has_default);
        }
        Stmt::Default { body, .. } => {
            *has_default = true;
            collect_cases(body, values, has_default);
        }
        Stmt::Switch { .. } => {}
        Stmt::Compound { items, .. } => {
            for item in items {
                if let BlockItem::Stmt(s) = item {
                    collect_cases(s, values, has_default);
                }
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_cases(then_branch, values, has_default);
            if let Some(e) = else_branch {
                collect_cases(e, values, has_default);
            }
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::For { body, .. }
        | Stmt::Labeled { body, .. } => collect_cases(body, values, has_default),
        _ => {}
    }
}

fn bin_of(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Rem => BinOp::Rem,
        BinaryOp::BitAnd => BinOp::And,
        BinaryOp::BitOr => BinOp::Or,
        BinaryOp::BitXor => BinOp::Xor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::Le => BinOp::Le,
        BinaryOp::Ge => BinOp::Ge,
        BinaryOp::Eq => BinOp::Eq,
        BinaryOp::Ne => BinOp::Ne,
        BinaryOp::LogAnd | BinaryOp::LogOr => {
            unreachable!("logical operators lower to control flow")
        }
    }
}

/// Is the common type of two integer operands unsigned?
fn common_unsigned(a: &Type, b: &Type) -> bool {
    let wide = |t: &Type| t.scalar_size() == Some(8);
    // after promotion: unsigned long > long > unsigned int > int
    if (a.is_unsigned() && wide(a)) || (b.is_unsigned() && wide(b)) {
        return true;
    }
    if wide(a) || wide(b) {
        return false;
    }
    (a.is_unsigned() && a.scalar_size() == Some(4))
        || (b.is_unsigned() && b.scalar_size() == Some(4))
}

fn fold_extend(op: UnOp, v: i64) -> i64 {
    match op {
        UnOp::Sext8 => v as i8 as i64,
        UnOp::Zext8 => v as u8 as i64,
        UnOp::Sext16 => v as i16 as i64,
        UnOp::Zext16 => v as u16 as i64,
        UnOp::Sext32 => v as i32 as i64,
        UnOp::Zext32 => v as u32 as i64,
        _ => v,
    }
}

/// Fold a binary op over two immediates; `None` leaves it to runtime
/// (division by zero must fault there, not here)
fn fold_binop(op: BinOp, signed: bool, a: i64, b: i64) -> Option<i64> {
    let (ua, ub) = (a as u64, b as u64);
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            if signed {
                a.wrapping_div(b)
            } else {
                (ua / ub) as i64
            }
        }
        BinOp::Rem => {
            if b == 0 {
                return None;
            }
            if signed {
                a.wrapping_rem(b)
            } else {
                (ua % ub) as i64
            }
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => {
            if signed {
                a.wrapping_shr(b as u32)
            } else {
                (ua.wrapping_shr(b as u32)) as i64
            }
        }
        BinOp::Lt => {
            if signed {
                (a < b) as i64
            } else {
                (ua < ub) as i64
            }
        }
        BinOp::Le => {
            if signed {
                (a <= b) as i64
            } else {
                (ua <= ub) as i64
            }
        }
        BinOp::Gt => {
            if signed {
                (a > b) as i64
            } else {
                (ua > ub) as i64
            }
        }
        BinOp::Ge => {
            if signed {
                (a >= b) as i64
            } else {
                (ua >= ub) as i64
            }
        }
        BinOp::Eq => (a == b) as i64,
        BinOp::Ne => (a != b) as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::sema::analyze;

    fn lower_src(source: &str) -> IrModule {
        let tokens = tokenize(source, "test.c").unwrap();
        let mut unit = parse(tokens, "test.c").unwrap();
        let (info, _) = analyze(&mut unit, "test.c").unwrap();
        lower(&unit, &info).unwrap()
    }

    fn body_of<'m>(module: &'m IrModule, name: &str) -> &'m [Instr] {
        &module
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function '{}'", name))
            .body
    }

    #[test]
    fn test_constant_folding_reduces_to_immediate() {
        let module = lower_src("int f(void){ return 2 + 3 * 4; }");
        let body = body_of(&module, "f");
        assert_eq!(
            body,
            &[Instr::Ret {
                src: Some(Operand::Imm(14))
            }]
        );
    }

    #[test]
    fn test_division_by_zero_not_folded() {
        let module = lower_src("int f(void){ return 1 / 0; }");
        let body = body_of(&module, "f");
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Bin {
                op: BinOp::Div,
                ..
            }
        )));
    }

    #[test]
    fn test_if_else_shape() {
        let module = lower_src("int f(int x){ if (x) return 1; else return 2; }");
        let body = body_of(&module, "f");
        let jzs = body
            .iter()
            .filter(|i| matches!(i, Instr::Jz { .. }))
            .count();
        let labels = body
            .iter()
            .filter(|i| matches!(i, Instr::Label(_)))
            .count();
        assert_eq!(jzs, 1);
        assert_eq!(labels, 2);
    }

    #[test]
    fn test_while_loop_shape() {
        let module = lower_src("int f(int n){ while (n) n = n - 1; return n; }");
        let body = body_of(&module, "f");
        assert!(body.iter().any(|i| matches!(i, Instr::Jmp(_))));
        assert!(body.iter().any(|i| matches!(i, Instr::Jz { .. })));
    }

    #[test]
    fn test_short_circuit_and() {
        let module = lower_src("int f(int a, int b){ return a && b; }");
        let body = body_of(&module, "f");
        // two conditional jumps guarding the right operand
        let jzs = body
            .iter()
            .filter(|i| matches!(i, Instr::Jz { .. }))
            .count();
        assert_eq!(jzs, 2);
        // result temp receives 1 then 0 on the two paths
        let movs: Vec<i64> = body
            .iter()
            .filter_map(|i| match i {
                Instr::Mov {
                    src: Operand::Imm(v),
                    ..
                } => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(movs, vec![1, 0]);
    }

    #[test]
    fn test_call_params_in_source_order() {
        let module = lower_src(
            "int g(int a, int b, int c); int f(void){ return g(1, 2, 3); }",
        );
        let body = body_of(&module, "f");
        let params: Vec<Operand> = body
            .iter()
            .filter_map(|i| match i {
                Instr::Param { src } => Some(src.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            params,
            vec![Operand::Imm(1), Operand::Imm(2), Operand::Imm(3)]
        );
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Call {
                callee: Operand::Global(n),
                args: 3,
                ..
            } if n == "g"
        )));
    }

    #[test]
    fn test_recursive_call_is_direct() {
        let module = lower_src("int fact(int n){ if (n<=1) return 1; return n*fact(n-1); }");
        let body = body_of(&module, "fact");
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Call {
                callee: Operand::Global(n),
                ..
            } if n == "fact"
        )));
    }

    #[test]
    fn test_subscript_lowers_to_indexed_access() {
        let module = lower_src(
            "int f(void){ int a[3]; a[0]=1; a[1]=2; int *p = a; return p[1]; }",
        );
        let body = body_of(&module, "f");
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::StoreIndex { elem_size: 4, .. })));
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::LoadIndex { elem_size: 4, .. })));
    }

    #[test]
    fn test_member_access_uses_offsets() {
        let module = lower_src(
            "struct p { int x; int y; }; int f(void){ struct p v; v.y = 4; return v.y; }",
        );
        let body = body_of(&module, "f");
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::StoreMember { offset: 4, .. })));
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::LoadMember { offset: 4, .. })));
    }

    #[test]
    fn test_switch_compare_chain_and_fallthrough() {
        let module = lower_src(
            "int f(int x){ int s=0; switch(x){ case 1: s+=1; case 2: s+=2; break; default: s=9; } return s; }",
        );
        let body = body_of(&module, "f");
        let eqs = body
            .iter()
            .filter(|i| matches!(i, Instr::Bin { op: BinOp::Eq, .. }))
            .count();
        assert_eq!(eqs, 2);
        let jnzs = body
            .iter()
            .filter(|i| matches!(i, Instr::Jnz { .. }))
            .count();
        assert_eq!(jnzs, 2);
    }

    #[test]
    fn test_unsigned_shift_lowered_logical() {
        let module = lower_src(
            "int f(void){ unsigned int x = 4000000000u; return (int)(x >> 28); }",
        );
        let body = body_of(&module, "f");
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Bin {
                op: BinOp::Shr,
                signed: false,
                ..
            }
        )));
    }

    #[test]
    fn test_signed_shift_stays_arithmetic() {
        let module = lower_src("int f(int x){ return x >> 3; }");
        let body = body_of(&module, "f");
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Bin {
                op: BinOp::Shr,
                signed: true,
                ..
            }
        )));
    }

    #[test]
    fn test_pointer_add_scales_by_element_size() {
        let module = lower_src("long *f(long *p){ return p + 3; }");
        let body = body_of(&module, "f");
        // 3 * 8 folds to an immediate 24
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Bin {
                op: BinOp::Add,
                b: Operand::Imm(24),
                ..
            }
        )));
    }

    #[test]
    fn test_enum_constant_lowered_to_immediate() {
        let module = lower_src("enum e { A = 7 }; int f(void){ return A; }");
        let body = body_of(&module, "f");
        assert_eq!(
            body,
            &[Instr::Ret {
                src: Some(Operand::Imm(7))
            }]
        );
    }

    #[test]
    fn test_sizeof_folds_before_ir() {
        let module = lower_src(
            "struct s { char c; long l; }; unsigned long f(void){ return sizeof(struct s); }",
        );
        let body = body_of(&module, "f");
        assert_eq!(
            body,
            &[Instr::Ret {
                src: Some(Operand::Imm(16))
            }]
        );
    }

    #[test]
    fn test_goto_and_label() {
        let module = lower_src("int f(void){ goto out; out: return 1; }");
        let body = body_of(&module, "f");
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::Jmp(t) if t == "f.out")));
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::Label(l) if l == "f.out")));
    }

    #[test]
    fn test_string_literal_becomes_rodata_label() {
        let module = lower_src(r#"char *greet(void){ return "hi"; }"#);
        assert_eq!(module.strings.len(), 1);
        assert_eq!(module.strings[0].0, ".Lstr0");
        let body = body_of(&module, "greet");
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Lea {
                src: Operand::Global(l),
                ..
            } if l == ".Lstr0"
        )));
    }

    #[test]
    fn test_global_blob_zero_fill() {
        let module = lower_src("int a[4] = {1, 2};");
        let g = module.globals.iter().find(|g| g.name == "a").unwrap();
        let items = g.init.as_ref().unwrap();
        assert_eq!(
            items,
            &vec![
                DataItem::Int {
                    value: 1,
                    width: Width::W4
                },
                DataItem::Int {
                    value: 2,
                    width: Width::W4
                },
                DataItem::Zero(8),
            ]
        );
    }

    #[test]
    fn test_uninitialized_global_is_bss() {
        let module = lower_src("int counter;");
        let g = module.globals.iter().find(|g| g.name == "counter").unwrap();
        assert!(g.init.is_none());
        assert_eq!(g.size, 4);
    }

    #[test]
    fn test_every_function_ends_in_ret() {
        let module = lower_src("void f(void){} int g(int x){ if (x) return 1; return 0; }");
        for func in &module.functions {
            assert!(
                matches!(func.body.last(), Some(Instr::Ret { .. })),
                "function {} does not end in ret",
                func.name
            );
        }
    }

    #[test]
    fn test_labels_defined_exactly_once() {
        let module = lower_src(
            "int f(int n){ int s=0; for(;n;n--){ if(n==2) continue; s+=n; } return s; }",
        );
        let mut seen = std::collections::HashSet::new();
        for i in body_of(&module, "f") {
            if let Instr::Label(l) = i {
                assert!(seen.insert(l.clone()), "label {} defined twice", l);
            }
        }
    }

    #[test]
    fn test_postfix_returns_old_value() {
        let module = lower_src("int f(int x){ return x++; }");
        let body = body_of(&module, "f");
        // the old value is copied into a temp before the update lands
        let Some(Instr::Ret { src: Some(ret) }) = body.last() else {
            panic!("expected ret");
        };
        assert!(matches!(ret, Operand::Temp(_)));
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::Mov { dst: Operand::Local(n), .. } if n.starts_with("x."))));
    }
}
