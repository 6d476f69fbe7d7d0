// The decoder walks one function body with wasmparser, validates it structurally and
// drives a FunctionBodyVisitor (the compiler) one instruction at a time. Validation
// follows the usual operand stack / control stack discipline: every frame remembers the
// operand height at its start, stack-polymorphic code after br/return/unreachable pops
// unknown values, and block ends check result types. Besides validation the decoder tracks
// reachability separately, because dead code is still validated but never compiled: the
// visitor sees an instruction only when control can reach it, and sees the end of a
// construct whenever it saw the start.

//! Validating function body decoder.

use super::instr::{BinaryOp, Instr};
use super::module::{FuncBody, ModuleEnv};
use crate::core::types::ValueType;
use std::ops::ControlFlow;
use thiserror::Error;
use wasmparser::{BinaryReader, BinaryReaderError, BlockType, FunctionBody, Operator};

/// Upper bound on locals per function.
const MAX_LOCALS: u32 = 50_000;

/// Receiver of decoded instructions.
///
/// Hooks returning `ControlFlow::Break` stop decoding.
pub trait FunctionBodyVisitor {
    /// Called once with the types of all locals, parameters first.
    fn start_function(&mut self, locals: &[ValueType]) -> ControlFlow<()>;

    /// Called once before the first instruction.
    fn start_function_body(&mut self) -> ControlFlow<()>;

    /// Called for every reachable instruction in program order.
    fn visit(&mut self, instr: &Instr) -> ControlFlow<()>;

    /// Called after the final `end` if decoding was never stopped.
    fn finish_function(&mut self);

    /// Called when the body fails validation.
    fn on_first_error(&mut self);
}

/// Structural validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at offset {offset})")]
pub struct ValidationError {
    pub offset: usize,
    pub message: String,
}

impl From<BinaryReaderError> for ValidationError {
    fn from(err: BinaryReaderError) -> Self {
        Self {
            offset: err.offset(),
            message: err.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    results: Vec<ValueType>,
    /// Operand stack height at frame entry.
    height: usize,
    /// Validation: the rest of the frame is stack-polymorphic.
    unreachable: bool,
    /// Whether control can reach the current position.
    live: bool,
    live_at_start: bool,
    /// Some live branch targets this frame.
    br_reached: bool,
    /// For `Else` frames: the end of the `then` arm was live.
    then_live: bool,
}

impl Frame {
    fn new(kind: FrameKind, results: Vec<ValueType>, height: usize, live: bool) -> Self {
        Self {
            kind,
            results,
            height,
            unreachable: false,
            live,
            live_at_start: live,
            br_reached: false,
            then_live: false,
        }
    }

    /// Types a branch to this frame carries.
    fn label_types(&self) -> &[ValueType] {
        match self.kind {
            FrameKind::Loop => &[],
            _ => &self.results,
        }
    }
}

type Check<T = ()> = Result<T, String>;

struct Validator<'a> {
    env: &'a ModuleEnv,
    locals: &'a [ValueType],
    operands: Vec<Option<ValueType>>,
    frames: Vec<Frame>,
}

/// Decode and validate `body`, feeding reachable instructions to `visitor`.
///
/// Returns `Ok` both when the body was fully decoded and when the visitor
/// stopped decoding; the visitor knows which of the two happened.
pub fn decode_function<V: FunctionBodyVisitor>(
    body: &FuncBody<'_>,
    env: &ModuleEnv,
    visitor: &mut V,
) -> Result<(), ValidationError> {
    let result = decode(body, env, visitor);
    if result.is_err() {
        visitor.on_first_error();
    }
    result
}

fn decode<V: FunctionBodyVisitor>(
    body: &FuncBody<'_>,
    env: &ModuleEnv,
    visitor: &mut V,
) -> Result<(), ValidationError> {
    let function = FunctionBody::new(BinaryReader::new(body.bytes, body.offset));

    let mut locals: Vec<ValueType> = body.sig.params.clone();
    let locals_reader = function.get_locals_reader()?;
    let locals_offset = locals_reader.original_position();
    for local in locals_reader {
        let (count, ty) = local?;
        if locals.len() as u64 + count as u64 > MAX_LOCALS as u64 {
            return Err(ValidationError {
                offset: locals_offset,
                message: "too many locals".to_string(),
            });
        }
        locals.extend(std::iter::repeat(ValueType::from(ty)).take(count as usize));
    }

    if visitor.start_function(&locals).is_break() {
        return Ok(());
    }

    let mut validator = Validator {
        env,
        locals: &locals,
        operands: Vec::new(),
        frames: vec![Frame::new(FrameKind::Function, body.sig.results.clone(), 0, true)],
    };

    if visitor.start_function_body().is_break() {
        return Ok(());
    }

    let mut operators = function.get_operators_reader()?;
    while !validator.frames.is_empty() {
        let offset = operators.original_position();
        let op = operators.read()?;
        let (instr, visible) = validator
            .step(op)
            .map_err(|message| ValidationError { offset, message })?;

        if let Instr::Unmodeled(_) = instr {
            let _ = visitor.visit(&instr);
            return Ok(());
        }
        if visible && visitor.visit(&instr).is_break() {
            return Ok(());
        }
    }

    if !operators.eof() {
        return Err(ValidationError {
            offset: operators.original_position(),
            message: "operators remaining after end of function".to_string(),
        });
    }

    visitor.finish_function();
    Ok(())
}

macro_rules! binary {
    ($op:ident, $ty:ident) => {
        Instr::Binary {
            op: BinaryOp::$op,
            ty: ValueType::$ty,
        }
    };
}

macro_rules! numeric {
    ($name:literal, [$($param:ident),*] -> $result:ident) => {
        Instr::Numeric {
            name: $name,
            params: &[$(ValueType::$param),*],
            result: ValueType::$result,
        }
    };
}

impl Validator<'_> {
    fn frame(&mut self) -> Check<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| "no open control frame".to_string())
    }

    fn frame_at(&mut self, depth: u32) -> Check<&mut Frame> {
        let len = self.frames.len();
        if depth as usize >= len {
            return Err(format!("unknown label: branch depth {depth} too large"));
        }
        Ok(&mut self.frames[len - 1 - depth as usize])
    }

    fn live(&self) -> bool {
        self.frames.last().is_some_and(|f| f.live)
    }

    fn push(&mut self, ty: ValueType) {
        self.operands.push(Some(ty));
    }

    fn pop(&mut self) -> Check<Option<ValueType>> {
        let (height, unreachable) = {
            let frame = self.frame()?;
            (frame.height, frame.unreachable)
        };
        if self.operands.len() == height {
            if unreachable {
                return Ok(None);
            }
            return Err("type mismatch: operand stack underflow".to_string());
        }
        Ok(self.operands.pop().flatten())
    }

    fn pop_expect(&mut self, expected: ValueType) -> Check {
        match self.pop()? {
            Some(actual) if actual != expected => Err(format!(
                "type mismatch: expected {expected}, found {actual}"
            )),
            _ => Ok(()),
        }
    }

    fn pop_values(&mut self, types: &[ValueType]) -> Check {
        for &ty in types.iter().rev() {
            self.pop_expect(ty)?;
        }
        Ok(())
    }

    fn local(&self, index: u32) -> Check<ValueType> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or_else(|| format!("unknown local {index}"))
    }

    /// Mark the rest of the current frame dead and stack-polymorphic.
    fn set_unreachable(&mut self) -> Check {
        let height = {
            let frame = self.frame()?;
            frame.unreachable = true;
            frame.live = false;
            frame.height
        };
        self.operands.truncate(height);
        Ok(())
    }

    fn mark_br_target(&mut self, depth: u32, live: bool) -> Check {
        let frame = self.frame_at(depth)?;
        if live {
            frame.br_reached = true;
        }
        Ok(())
    }

    fn label_types(&mut self, depth: u32) -> Check<Vec<ValueType>> {
        Ok(self.frame_at(depth)?.label_types().to_vec())
    }

    fn block_result(blockty: BlockType) -> Option<Option<ValueType>> {
        match blockty {
            BlockType::Empty => Some(None),
            BlockType::Type(ty) => Some(Some(ValueType::from(ty))),
            BlockType::FuncType(_) => None,
        }
    }

    fn enter(&mut self, kind: FrameKind, result: Option<ValueType>) {
        let live = self.live();
        let height = self.operands.len();
        self.frames
            .push(Frame::new(kind, result.into_iter().collect(), height, live));
    }

    fn check_frame_end(&mut self) -> Check {
        let (results, height) = {
            let frame = self.frame()?;
            (frame.results.clone(), frame.height)
        };
        self.pop_values(&results)?;
        if self.operands.len() != height {
            return Err("type mismatch: values remaining on stack at end of block".to_string());
        }
        Ok(())
    }

    /// Validate one operator. Returns the instruction and whether the
    /// visitor should see it.
    fn step(&mut self, op: Operator<'_>) -> Check<(Instr, bool)> {
        let live = self.live();
        let instr = match op {
            Operator::Nop => Instr::Nop,
            Operator::Unreachable => {
                self.set_unreachable()?;
                Instr::Unreachable
            }
            Operator::Block { blockty } => match Self::block_result(blockty) {
                Some(result) => {
                    self.enter(FrameKind::Block, result);
                    Instr::Block { result }
                }
                None => Instr::Unmodeled("multi-value block".to_string()),
            },
            Operator::Loop { blockty } => match Self::block_result(blockty) {
                Some(result) => {
                    self.enter(FrameKind::Loop, result);
                    Instr::Loop { result }
                }
                None => Instr::Unmodeled("multi-value block".to_string()),
            },
            Operator::If { blockty } => match Self::block_result(blockty) {
                Some(result) => {
                    self.pop_expect(ValueType::I32)?;
                    self.enter(FrameKind::If, result);
                    Instr::If { result }
                }
                None => Instr::Unmodeled("multi-value block".to_string()),
            },
            Operator::Else => {
                if self.frame()?.kind != FrameKind::If {
                    return Err("else found outside of an if block".to_string());
                }
                self.check_frame_end()?;
                let frame = self.frame()?;
                frame.kind = FrameKind::Else;
                frame.then_live = frame.live;
                frame.unreachable = false;
                frame.live = frame.live_at_start;
                return Ok((Instr::Else, frame.live_at_start));
            }
            Operator::End => return self.end(),
            Operator::Br { relative_depth } => {
                let types = self.label_types(relative_depth)?;
                self.pop_values(&types)?;
                self.mark_br_target(relative_depth, live)?;
                self.set_unreachable()?;
                Instr::Br {
                    depth: relative_depth,
                }
            }
            Operator::BrIf { relative_depth } => {
                self.pop_expect(ValueType::I32)?;
                let types = self.label_types(relative_depth)?;
                self.pop_values(&types)?;
                for &ty in &types {
                    self.push(ty);
                }
                self.mark_br_target(relative_depth, live)?;
                Instr::BrIf {
                    depth: relative_depth,
                }
            }
            Operator::BrTable { targets } => {
                self.pop_expect(ValueType::I32)?;
                let default = targets.default();
                let default_types = self.label_types(default)?;
                let mut depths = Vec::with_capacity(targets.len() as usize);
                for depth in targets.targets() {
                    let depth = depth.map_err(|e| e.message().to_string())?;
                    if self.label_types(depth)? != default_types {
                        return Err("type mismatch: br_table targets disagree".to_string());
                    }
                    self.mark_br_target(depth, live)?;
                    depths.push(depth);
                }
                self.pop_values(&default_types)?;
                self.mark_br_target(default, live)?;
                self.set_unreachable()?;
                Instr::BrTable {
                    targets: depths,
                    default,
                }
            }
            Operator::Return => {
                let depth = self.frames.len() as u32 - 1;
                let types = self.label_types(depth)?;
                self.pop_values(&types)?;
                self.set_unreachable()?;
                Instr::Return
            }
            Operator::Drop => {
                self.pop()?;
                Instr::Drop
            }
            Operator::Select => {
                self.pop_expect(ValueType::I32)?;
                let first = self.pop()?;
                let second = self.pop()?;
                let ty = match (first, second) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(format!("type mismatch: select between {a} and {b}"))
                    }
                    (Some(a), _) | (None, Some(a)) => Some(a),
                    (None, None) => None,
                };
                if matches!(ty, Some(ValueType::V128 | ValueType::Ref)) {
                    return Err("type mismatch: select needs numeric operands".to_string());
                }
                self.operands.push(ty);
                Instr::Select
            }
            Operator::LocalGet { local_index } => {
                let ty = self.local(local_index)?;
                self.push(ty);
                Instr::LocalGet { index: local_index }
            }
            Operator::LocalSet { local_index } => {
                let ty = self.local(local_index)?;
                self.pop_expect(ty)?;
                Instr::LocalSet { index: local_index }
            }
            Operator::LocalTee { local_index } => {
                let ty = self.local(local_index)?;
                self.pop_expect(ty)?;
                self.push(ty);
                Instr::LocalTee { index: local_index }
            }
            Operator::GlobalGet { global_index } => {
                let global = self
                    .env
                    .global(global_index)
                    .ok_or_else(|| format!("unknown global {global_index}"))?;
                let ty = global.ty;
                self.push(ty);
                Instr::GlobalGet {
                    index: global_index,
                }
            }
            Operator::GlobalSet { global_index } => {
                let global = *self
                    .env
                    .global(global_index)
                    .ok_or_else(|| format!("unknown global {global_index}"))?;
                if !global.mutable {
                    return Err(format!("global {global_index} is immutable"));
                }
                self.pop_expect(global.ty)?;
                Instr::GlobalSet {
                    index: global_index,
                }
            }
            Operator::I32Const { value } => {
                self.push(ValueType::I32);
                Instr::I32Const(value)
            }
            Operator::I64Const { value } => {
                self.push(ValueType::I64);
                Instr::I64Const(value)
            }
            Operator::F32Const { value } => {
                self.push(ValueType::F32);
                Instr::F32Const(f32::from_bits(value.bits()))
            }
            Operator::F64Const { value } => {
                self.push(ValueType::F64);
                Instr::F64Const(f64::from_bits(value.bits()))
            }
            other => {
                let instr = numeric_instr(&other);
                match &instr {
                    Instr::Binary { ty, .. } => {
                        self.pop_expect(*ty)?;
                        self.pop_expect(*ty)?;
                        self.push(*ty);
                    }
                    Instr::Numeric { params, result, .. } => {
                        self.pop_values(params)?;
                        self.push(*result);
                    }
                    _ => {}
                }
                instr
            }
        };
        Ok((instr, live))
    }

    fn end(&mut self) -> Check<(Instr, bool)> {
        self.check_frame_end()?;
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| "no open control frame".to_string())?;
        if frame.kind == FrameKind::If && !frame.results.is_empty() {
            return Err("type mismatch: if without else must not produce values".to_string());
        }
        for &ty in &frame.results {
            self.push(ty);
        }

        let fallthrough = frame.live;
        if let Some(parent) = self.frames.last_mut() {
            let reached = match frame.kind {
                FrameKind::Loop => fallthrough,
                FrameKind::Block | FrameKind::Function => fallthrough || frame.br_reached,
                // The condition may skip the whole arm.
                FrameKind::If => true,
                FrameKind::Else => fallthrough || frame.br_reached || frame.then_live,
            };
            parent.live = frame.live_at_start && reached;
        }
        Ok((Instr::End { fallthrough }, frame.live_at_start))
    }
}

/// Map numeric operators onto instruction forms. Anything else is unmodeled.
fn numeric_instr(op: &Operator<'_>) -> Instr {
    use Operator as O;
    match op {
        O::I32Add => binary!(Add, I32),
        O::I32Sub => binary!(Sub, I32),
        O::I32Mul => binary!(Mul, I32),
        O::I32And => binary!(And, I32),
        O::I32Or => binary!(Or, I32),
        O::I32Xor => binary!(Xor, I32),
        O::I64Add => binary!(Add, I64),
        O::I64Sub => binary!(Sub, I64),
        O::I64Mul => binary!(Mul, I64),
        O::I64And => binary!(And, I64),
        O::I64Or => binary!(Or, I64),
        O::I64Xor => binary!(Xor, I64),
        O::F32Add => binary!(Add, F32),
        O::F32Sub => binary!(Sub, F32),
        O::F32Mul => binary!(Mul, F32),
        O::F64Add => binary!(Add, F64),
        O::F64Sub => binary!(Sub, F64),
        O::F64Mul => binary!(Mul, F64),

        O::I32DivS => numeric!("i32.div_s", [I32, I32] -> I32),
        O::I32DivU => numeric!("i32.div_u", [I32, I32] -> I32),
        O::I32RemS => numeric!("i32.rem_s", [I32, I32] -> I32),
        O::I32RemU => numeric!("i32.rem_u", [I32, I32] -> I32),
        O::I32Shl => numeric!("i32.shl", [I32, I32] -> I32),
        O::I32ShrS => numeric!("i32.shr_s", [I32, I32] -> I32),
        O::I32ShrU => numeric!("i32.shr_u", [I32, I32] -> I32),
        O::I32Rotl => numeric!("i32.rotl", [I32, I32] -> I32),
        O::I32Rotr => numeric!("i32.rotr", [I32, I32] -> I32),
        O::I64DivS => numeric!("i64.div_s", [I64, I64] -> I64),
        O::I64DivU => numeric!("i64.div_u", [I64, I64] -> I64),
        O::I64RemS => numeric!("i64.rem_s", [I64, I64] -> I64),
        O::I64RemU => numeric!("i64.rem_u", [I64, I64] -> I64),
        O::I64Shl => numeric!("i64.shl", [I64, I64] -> I64),
        O::I64ShrS => numeric!("i64.shr_s", [I64, I64] -> I64),
        O::I64ShrU => numeric!("i64.shr_u", [I64, I64] -> I64),
        O::I64Rotl => numeric!("i64.rotl", [I64, I64] -> I64),
        O::I64Rotr => numeric!("i64.rotr", [I64, I64] -> I64),
        O::F32Div => numeric!("f32.div", [F32, F32] -> F32),
        O::F32Min => numeric!("f32.min", [F32, F32] -> F32),
        O::F32Max => numeric!("f32.max", [F32, F32] -> F32),
        O::F32Copysign => numeric!("f32.copysign", [F32, F32] -> F32),
        O::F64Div => numeric!("f64.div", [F64, F64] -> F64),
        O::F64Min => numeric!("f64.min", [F64, F64] -> F64),
        O::F64Max => numeric!("f64.max", [F64, F64] -> F64),
        O::F64Copysign => numeric!("f64.copysign", [F64, F64] -> F64),

        O::I32Eqz => numeric!("i32.eqz", [I32] -> I32),
        O::I32Eq => numeric!("i32.eq", [I32, I32] -> I32),
        O::I32Ne => numeric!("i32.ne", [I32, I32] -> I32),
        O::I32LtS => numeric!("i32.lt_s", [I32, I32] -> I32),
        O::I32LtU => numeric!("i32.lt_u", [I32, I32] -> I32),
        O::I32GtS => numeric!("i32.gt_s", [I32, I32] -> I32),
        O::I32GtU => numeric!("i32.gt_u", [I32, I32] -> I32),
        O::I32LeS => numeric!("i32.le_s", [I32, I32] -> I32),
        O::I32LeU => numeric!("i32.le_u", [I32, I32] -> I32),
        O::I32GeS => numeric!("i32.ge_s", [I32, I32] -> I32),
        O::I32GeU => numeric!("i32.ge_u", [I32, I32] -> I32),
        O::I64Eqz => numeric!("i64.eqz", [I64] -> I32),
        O::I64Eq => numeric!("i64.eq", [I64, I64] -> I32),
        O::I64Ne => numeric!("i64.ne", [I64, I64] -> I32),
        O::I64LtS => numeric!("i64.lt_s", [I64, I64] -> I32),
        O::I64LtU => numeric!("i64.lt_u", [I64, I64] -> I32),
        O::I64GtS => numeric!("i64.gt_s", [I64, I64] -> I32),
        O::I64GtU => numeric!("i64.gt_u", [I64, I64] -> I32),
        O::I64LeS => numeric!("i64.le_s", [I64, I64] -> I32),
        O::I64LeU => numeric!("i64.le_u", [I64, I64] -> I32),
        O::I64GeS => numeric!("i64.ge_s", [I64, I64] -> I32),
        O::I64GeU => numeric!("i64.ge_u", [I64, I64] -> I32),
        O::F32Eq => numeric!("f32.eq", [F32, F32] -> I32),
        O::F32Ne => numeric!("f32.ne", [F32, F32] -> I32),
        O::F32Lt => numeric!("f32.lt", [F32, F32] -> I32),
        O::F32Gt => numeric!("f32.gt", [F32, F32] -> I32),
        O::F32Le => numeric!("f32.le", [F32, F32] -> I32),
        O::F32Ge => numeric!("f32.ge", [F32, F32] -> I32),
        O::F64Eq => numeric!("f64.eq", [F64, F64] -> I32),
        O::F64Ne => numeric!("f64.ne", [F64, F64] -> I32),
        O::F64Lt => numeric!("f64.lt", [F64, F64] -> I32),
        O::F64Gt => numeric!("f64.gt", [F64, F64] -> I32),
        O::F64Le => numeric!("f64.le", [F64, F64] -> I32),
        O::F64Ge => numeric!("f64.ge", [F64, F64] -> I32),

        O::I32Clz => numeric!("i32.clz", [I32] -> I32),
        O::I32Ctz => numeric!("i32.ctz", [I32] -> I32),
        O::I32Popcnt => numeric!("i32.popcnt", [I32] -> I32),
        O::I64Clz => numeric!("i64.clz", [I64] -> I64),
        O::I64Ctz => numeric!("i64.ctz", [I64] -> I64),
        O::I64Popcnt => numeric!("i64.popcnt", [I64] -> I64),
        O::F32Abs => numeric!("f32.abs", [F32] -> F32),
        O::F32Neg => numeric!("f32.neg", [F32] -> F32),
        O::F32Ceil => numeric!("f32.ceil", [F32] -> F32),
        O::F32Floor => numeric!("f32.floor", [F32] -> F32),
        O::F32Trunc => numeric!("f32.trunc", [F32] -> F32),
        O::F32Nearest => numeric!("f32.nearest", [F32] -> F32),
        O::F32Sqrt => numeric!("f32.sqrt", [F32] -> F32),
        O::F64Abs => numeric!("f64.abs", [F64] -> F64),
        O::F64Neg => numeric!("f64.neg", [F64] -> F64),
        O::F64Ceil => numeric!("f64.ceil", [F64] -> F64),
        O::F64Floor => numeric!("f64.floor", [F64] -> F64),
        O::F64Trunc => numeric!("f64.trunc", [F64] -> F64),
        O::F64Nearest => numeric!("f64.nearest", [F64] -> F64),
        O::F64Sqrt => numeric!("f64.sqrt", [F64] -> F64),

        O::I32WrapI64 => numeric!("i32.wrap_i64", [I64] -> I32),
        O::I32TruncF32S => numeric!("i32.trunc_f32_s", [F32] -> I32),
        O::I32TruncF32U => numeric!("i32.trunc_f32_u", [F32] -> I32),
        O::I32TruncF64S => numeric!("i32.trunc_f64_s", [F64] -> I32),
        O::I32TruncF64U => numeric!("i32.trunc_f64_u", [F64] -> I32),
        O::I64ExtendI32S => numeric!("i64.extend_i32_s", [I32] -> I64),
        O::I64ExtendI32U => numeric!("i64.extend_i32_u", [I32] -> I64),
        O::I64TruncF32S => numeric!("i64.trunc_f32_s", [F32] -> I64),
        O::I64TruncF32U => numeric!("i64.trunc_f32_u", [F32] -> I64),
        O::I64TruncF64S => numeric!("i64.trunc_f64_s", [F64] -> I64),
        O::I64TruncF64U => numeric!("i64.trunc_f64_u", [F64] -> I64),
        O::F32ConvertI32S => numeric!("f32.convert_i32_s", [I32] -> F32),
        O::F32ConvertI32U => numeric!("f32.convert_i32_u", [I32] -> F32),
        O::F32ConvertI64S => numeric!("f32.convert_i64_s", [I64] -> F32),
        O::F32ConvertI64U => numeric!("f32.convert_i64_u", [I64] -> F32),
        O::F32DemoteF64 => numeric!("f32.demote_f64", [F64] -> F32),
        O::F64ConvertI32S => numeric!("f64.convert_i32_s", [I32] -> F64),
        O::F64ConvertI32U => numeric!("f64.convert_i32_u", [I32] -> F64),
        O::F64ConvertI64S => numeric!("f64.convert_i64_s", [I64] -> F64),
        O::F64ConvertI64U => numeric!("f64.convert_i64_u", [I64] -> F64),
        O::F64PromoteF32 => numeric!("f64.promote_f32", [F32] -> F64),
        O::I32ReinterpretF32 => numeric!("i32.reinterpret_f32", [F32] -> I32),
        O::I64ReinterpretF64 => numeric!("i64.reinterpret_f64", [F64] -> I64),
        O::F32ReinterpretI32 => numeric!("f32.reinterpret_i32", [I32] -> F32),
        O::F64ReinterpretI64 => numeric!("f64.reinterpret_i64", [I64] -> F64),
        O::I32Extend8S => numeric!("i32.extend8_s", [I32] -> I32),
        O::I32Extend16S => numeric!("i32.extend16_s", [I32] -> I32),
        O::I64Extend8S => numeric!("i64.extend8_s", [I64] -> I64),
        O::I64Extend16S => numeric!("i64.extend16_s", [I64] -> I64),
        O::I64Extend32S => numeric!("i64.extend32_s", [I64] -> I64),

        other => Instr::Unmodeled(unmodeled_name(other)),
    }
}

fn unmodeled_name(op: &Operator<'_>) -> String {
    use Operator as O;
    let name = match op {
        O::Call { .. } | O::ReturnCall { .. } => "call",
        O::CallIndirect { .. } | O::ReturnCallIndirect { .. } => "call_indirect",
        O::MemorySize { .. } => "memory.size",
        O::MemoryGrow { .. } => "memory.grow",
        O::I32Load { .. }
        | O::I64Load { .. }
        | O::F32Load { .. }
        | O::F64Load { .. }
        | O::I32Load8S { .. }
        | O::I32Load8U { .. }
        | O::I32Load16S { .. }
        | O::I32Load16U { .. }
        | O::I64Load8S { .. }
        | O::I64Load8U { .. }
        | O::I64Load16S { .. }
        | O::I64Load16U { .. }
        | O::I64Load32S { .. }
        | O::I64Load32U { .. } => "memory load",
        O::I32Store { .. }
        | O::I64Store { .. }
        | O::F32Store { .. }
        | O::F64Store { .. }
        | O::I32Store8 { .. }
        | O::I32Store16 { .. }
        | O::I64Store8 { .. }
        | O::I64Store16 { .. }
        | O::I64Store32 { .. } => "memory store",
        _ => {
            let debug = format!("{op:?}");
            let variant = debug.split([' ', '{', '(']).next().unwrap_or_default();
            return format!("operator {variant}");
        }
    };
    name.to_string()
}
