//! The invoke family

use dexter_bytecode::Opcode;

use crate::exception::Thrown;
use crate::interpreter::context::Flow;
use crate::interpreter::dispatch::InstructionHandler;
use crate::linker::InvokeKind;

impl<const ACCESS_CHECK: bool, const TRANSACTION: bool> InstructionHandler<'_, '_, ACCESS_CHECK, TRANSACTION> {
    pub(in crate::interpreter) fn exec_invoke_ops(&mut self, op: Opcode) -> Result<Flow, Thrown> {
        use Opcode::*;
        let (kind, is_quick) = match op {
            InvokeVirtual | InvokeVirtualRange => (InvokeKind::Virtual, false),
            InvokeSuper | InvokeSuperRange => (InvokeKind::Super, false),
            InvokeDirect | InvokeDirectRange => (InvokeKind::Direct, false),
            InvokeStatic | InvokeStaticRange => (InvokeKind::Static, false),
            InvokeInterface | InvokeInterfaceRange => (InvokeKind::Interface, false),
            InvokeVirtualQuick | InvokeVirtualRangeQuick => (InvokeKind::Virtual, true),
            InvokePolymorphic | InvokePolymorphicRange => (InvokeKind::Polymorphic, false),
            InvokeCustom | InvokeCustomRange => (InvokeKind::Custom, false),
            _ => self.unexpected_opcode(),
        };
        let outcome = self.do_invoke(kind, is_quick);
        self.possibly_handle_pending_exception_on_invoke(outcome)
    }
}
