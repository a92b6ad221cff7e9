//! The dispatch loop and the per-instruction handler state

use std::sync::Arc;

use dexter_bytecode::{Instruction, Opcode, DEX_NO_INDEX};

use crate::class::ClassId;
use crate::exception::{ThrowKind, Thrown};
use crate::gc::Heap;
use crate::interpreter::context::{Flow, SwitchContext};
use crate::interpreter::Interpreter;
use crate::method::Method;
use crate::shadow_frame::ShadowFrame;
use crate::thread::ManagedThread;
use crate::transaction::Transaction;
use crate::value::JValue;

/// Everything a handler may touch while executing one instruction
pub(crate) struct InstructionHandler<'i, 'a, const ACCESS_CHECK: bool, const TRANSACTION: bool> {
    pub(super) interp: &'i Interpreter<'a>,
    pub(super) thread: &'i ManagedThread,
    pub(super) frame: &'i mut ShadowFrame,
    pub(super) ctx: &'i mut SwitchContext,
    pub(super) method: &'i Arc<Method>,
    pub(super) inst: Instruction<'i>,
    /// Dex pc of the next instruction, fall-through unless a handler redirects it
    pub(super) next: u32,
}

pub(super) fn execute_switch_impl<const ACCESS_CHECK: bool, const TRANSACTION: bool>(
    interp: &Interpreter<'_>,
    thread: &ManagedThread,
    frame: &mut ShadowFrame,
    ctx: &mut SwitchContext,
) -> Result<JValue, Thrown> {
    debug_assert!(
        !frame.force_retry_instruction(),
        "entered the interpreter with a pending instruction retry"
    );
    let method = frame.method().clone();
    let insns = method.insns();
    let mut dex_pc = frame.dex_pc();

    loop {
        if dex_pc as usize >= insns.len() {
            tracing::error!(target: "dexter::interp", method = %method, dex_pc, "execution ran past the end of the code");
            panic!("{} ran past the end of its code at {:#06x}", method, dex_pc);
        }
        let inst = Instruction::at(insns, dex_pc);
        frame.set_dex_pc(dex_pc);
        if interp.options.trace_execution {
            tracing::trace!(target: "dexter::interp", method = %method, "{:?}", inst);
        }

        let mut handler = InstructionHandler::<ACCESS_CHECK, TRANSACTION> {
            interp,
            thread,
            frame: &mut *frame,
            ctx: &mut *ctx,
            method: &method,
            inst,
            next: dex_pc + inst.size_in_code_units() as u32,
        };
        let outcome = match handler.preamble() {
            Ok(Flow::Continue) => handler.execute(),
            other => other,
        };
        let outcome = match outcome {
            Err(thrown) => handler.handle_pending_exception(thrown),
            other => other,
        };
        let next = handler.next;

        match outcome {
            Ok(Flow::Continue) => dex_pc = next,
            Ok(Flow::Exit) => {
                frame.set_dex_pc(DEX_NO_INDEX);
                return Ok(ctx.result);
            }
            Err(thrown) => {
                frame.set_dex_pc(DEX_NO_INDEX);
                return Err(thrown);
            }
        }

        if ctx.interpret_one_instruction {
            frame.set_dex_pc(dex_pc);
            ctx.result = ctx.result_register;
            return Ok(ctx.result);
        }
    }
}

impl<'i, 'a, const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'i, 'a, ACCESS_CHECK, TRANSACTION> {
    fn execute(&mut self) -> Result<Flow, Thrown> {
        use Opcode::*;

        let op = self.inst.opcode();
        match op {
            Nop => Ok(Flow::Continue),

            Move | MoveFrom16 | Move16 | MoveWide | MoveWideFrom16 | MoveWide16 | MoveObject | MoveObjectFrom16
            | MoveObject16 | MoveResult | MoveResultWide | MoveResultObject | MoveException => self.exec_move_ops(op),

            ReturnVoid | ReturnVoidNoBarrier | Return | ReturnWide | ReturnObject => self.exec_return_ops(op),

            Const4 | Const16 | Const | ConstHigh16 | ConstWide16 | ConstWide32 | ConstWide | ConstWideHigh16
            | ConstString | ConstStringJumbo | ConstClass | ConstMethodHandle | ConstMethodType => {
                self.exec_const_ops(op)
            }

            MonitorEnter | MonitorExit | CheckCast | InstanceOf | NewInstance | Throw => self.exec_object_ops(op),

            ArrayLength | NewArray | FilledNewArray | FilledNewArrayRange | FillArrayData | Aget | AgetWide
            | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort | Aput | AputWide | AputObject
            | AputBoolean | AputByte | AputChar | AputShort => self.exec_array_ops(op),

            Goto | Goto16 | Goto32 | PackedSwitch | SparseSwitch | IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfEqz
            | IfNez | IfLtz | IfGez | IfGtz | IfLez => self.exec_branch_ops(op),

            CmplFloat | CmpgFloat | CmplDouble | CmpgDouble | CmpLong => self.exec_compare_ops(op),

            Iget | IgetWide | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort | Iput | IputWide
            | IputObject | IputBoolean | IputByte | IputChar | IputShort | Sget | SgetWide | SgetObject
            | SgetBoolean | SgetByte | SgetChar | SgetShort | Sput | SputWide | SputObject | SputBoolean | SputByte
            | SputChar | SputShort | IgetQuick | IgetWideQuick | IgetObjectQuick | IputQuick | IputWideQuick
            | IputObjectQuick | IputBooleanQuick | IputByteQuick | IputCharQuick | IputShortQuick
            | IgetBooleanQuick | IgetByteQuick | IgetCharQuick | IgetShortQuick => self.exec_field_ops(op),

            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface | InvokeVirtualRange
            | InvokeSuperRange | InvokeDirectRange | InvokeStaticRange | InvokeInterfaceRange | InvokeVirtualQuick
            | InvokeVirtualRangeQuick | InvokePolymorphic | InvokePolymorphicRange | InvokeCustom
            | InvokeCustomRange => self.exec_invoke_ops(op),

            NegInt | NotInt | NegLong | NotLong | NegFloat | NegDouble | IntToLong | IntToFloat | IntToDouble
            | LongToInt | LongToFloat | LongToDouble | FloatToInt | FloatToLong | FloatToDouble | DoubleToInt
            | DoubleToLong | DoubleToFloat | IntToByte | IntToChar | IntToShort => self.exec_unary_ops(op),

            _ if op.is_unused() => self.unexpected_opcode(),

            _ => self.exec_arithmetic_ops(op),
        }
    }

    pub(super) fn unexpected_opcode(&self) -> ! {
        tracing::error!(target: "dexter::interp", method = %self.method, dex_pc = self.dex_pc(), "unexpected instruction");
        panic!("unexpected instruction {:?} in {}", self.inst, self.method);
    }

    /// Dex pc of the current instruction
    #[inline]
    pub(super) fn dex_pc(&self) -> u32 {
        self.inst.dex_pc()
    }

    #[inline]
    pub(super) fn heap(&self) -> &'a Heap {
        self.interp.heap
    }

    /// Register operand A
    #[inline]
    pub(super) fn a(&self) -> usize {
        self.inst.vreg_a() as usize
    }

    /// Register operand B
    #[inline]
    pub(super) fn b(&self) -> usize {
        self.inst.vreg_b() as usize
    }

    /// Register operand C
    #[inline]
    pub(super) fn c(&self) -> usize {
        self.inst.vreg_c() as usize
    }

    /// The active transaction, only in the transactional instantiation
    #[inline]
    pub(super) fn transaction(&self) -> Option<&'a Transaction> {
        if TRANSACTION {
            self.interp.transaction
        } else {
            None
        }
    }

    pub(super) fn throw(&self, kind: ThrowKind, message: &str) -> Thrown {
        self.heap().throw_new(kind, Some(message))
    }

    pub(super) fn null_pointer(&self, message: &str) -> Thrown {
        self.throw(ThrowKind::NullPointerException, message)
    }

    /// Abort the transaction with `message`
    pub(super) fn abort_transaction(&self, transaction: &Transaction, message: String) -> Thrown {
        tracing::debug!(target: "dexter::transaction", method = %self.method, %message, "aborting transaction");
        transaction.abort(self.heap(), message)
    }

    /// Descriptor of a class, for messages
    pub(super) fn describe_class(&self, class: ClassId) -> String {
        self.heap().class(class).descriptor().to_string()
    }
}
