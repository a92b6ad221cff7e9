//! Exception routing tests
//!
//! Catch-block selection, `move-exception`, propagation out of callees and
//! the exception events delivered to instrumentation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use dexter_bytecode::{CodeWriter, Opcode};
use dexter_core::{
    ClassBuilder, CodeItem, Instrumentation, JValue, ManagedThread, Method, MethodBuilder, ObjRef, ShadowFrame,
    TableLinker, ThrowKind, Thrown, TryItem, Vm, VmError, VmOptions,
};

fn vm() -> Vm {
    Vm::new(VmOptions::default(), TableLinker::new()).unwrap()
}

fn class_id(vm: &Vm, kind: ThrowKind) -> dexter_core::ClassId {
    vm.heap().find_class(kind.descriptor()).unwrap()
}

fn define(vm: &Vm, descriptor: &str, shorty: &str, code: CodeItem) -> Arc<Method> {
    let class = vm
        .heap()
        .define_class(ClassBuilder::new(descriptor).method(MethodBuilder::new("run", shorty).static_method().code(code)));
    vm.heap().class(class).method("run").unwrap()
}

/// `v1 / v2` inside a try block; the handler at the returned pc
fn guarded_divide(w: &mut CodeWriter) -> u32 {
    w.emit_23x(Opcode::DivInt, 0, 1, 2);
    w.emit_11x(Opcode::Return, 0);
    w.position()
}

#[test]
fn test_catch_binds_exception() {
    let vm = vm();
    let arithmetic = class_id(&vm, ThrowKind::ArithmeticException);
    let mut w = CodeWriter::new();
    let handler = guarded_divide(&mut w);
    w.emit_11x(Opcode::MoveException, 0);
    w.emit_11x(Opcode::ReturnObject, 0);
    let code = CodeItem::new(3, 2, w.finish()).with_try(TryItem::new(0, 2).catch(arithmetic, handler));
    let method = define(&vm, "LCatch;", "LII", code);

    let thread = vm.new_thread();
    let result = vm
        .invoke(&thread, &method, &[JValue::from_int(1), JValue::from_int(0)])
        .unwrap();
    let exception = result.get_l().unwrap();
    assert_eq!(vm.heap().class_of(exception), arithmetic);
    assert_eq!(vm.heap().exception_message(exception).as_deref(), Some("divide by zero"));
    assert!(!thread.is_exception_pending());
}

#[test]
fn test_superclass_handler_catches_subclass() {
    let vm = vm();
    let runtime = class_id(&vm, ThrowKind::RuntimeException);
    let mut w = CodeWriter::new();
    let handler = guarded_divide(&mut w);
    w.emit_21s(Opcode::Const16, 0, 42);
    w.emit_11x(Opcode::Return, 0);
    let code = CodeItem::new(3, 2, w.finish()).with_try(TryItem::new(0, 2).catch(runtime, handler));
    let method = define(&vm, "LCatch;", "III", code);

    let thread = vm.new_thread();
    let caught = vm.invoke(&thread, &method, &[JValue::from_int(1), JValue::from_int(0)]);
    assert_eq!(caught.unwrap().get_i(), 42);
    // The handler clears the exception when it does not start with move-exception.
    assert!(!thread.is_exception_pending());
    let normal = vm.invoke(&thread, &method, &[JValue::from_int(9), JValue::from_int(3)]);
    assert_eq!(normal.unwrap().get_i(), 3);
}

#[test]
fn test_handler_order_and_catch_all() {
    let vm = vm();
    let npe = class_id(&vm, ThrowKind::NullPointerException);
    let mut w = CodeWriter::new();
    let handler = guarded_divide(&mut w);
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_11x(Opcode::Return, 0);
    let catch_all = w.position();
    w.emit_11n(Opcode::Const4, 0, 2);
    w.emit_11x(Opcode::Return, 0);
    let code = CodeItem::new(3, 2, w.finish())
        .with_try(TryItem::new(0, 2).catch(npe, handler).catch_all(catch_all));
    let method = define(&vm, "LCatch;", "III", code);

    let thread = vm.new_thread();
    let result = vm.invoke(&thread, &method, &[JValue::from_int(1), JValue::from_int(0)]);
    assert_eq!(result.unwrap().get_i(), 2);
}

#[test]
fn test_unmatched_handler_propagates() {
    let vm = vm();
    let npe = class_id(&vm, ThrowKind::NullPointerException);
    let mut w = CodeWriter::new();
    let handler = guarded_divide(&mut w);
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_11x(Opcode::Return, 0);
    let code = CodeItem::new(3, 2, w.finish()).with_try(TryItem::new(0, 2).catch(npe, handler));
    let method = define(&vm, "LCatch;", "III", code);

    let thread = vm.new_thread();
    match vm.invoke(&thread, &method, &[JValue::from_int(1), JValue::from_int(0)]) {
        Err(VmError::UncaughtException { class, message }) => {
            assert_eq!(class, "Ljava/lang/ArithmeticException;");
            assert_eq!(message.as_deref(), Some("divide by zero"));
        }
        other => panic!("expected uncaught exception, got {:?}", other),
    }
    assert!(!thread.is_exception_pending());
}

#[test]
fn test_try_range_is_exclusive() {
    let vm = vm();
    let arithmetic = class_id(&vm, ThrowKind::ArithmeticException);
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 0);
    w.emit_23x(Opcode::DivInt, 0, 1, 2);
    w.emit_11x(Opcode::Return, 0);
    let handler = w.position();
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_11x(Opcode::Return, 0);
    // Covers only the const/4 at pc 0.
    let code = CodeItem::new(3, 2, w.finish()).with_try(TryItem::new(0, 1).catch(arithmetic, handler));
    let method = define(&vm, "LCatch;", "III", code);

    let thread = vm.new_thread();
    let result = vm.invoke(&thread, &method, &[JValue::from_int(1), JValue::from_int(0)]);
    assert!(matches!(result, Err(VmError::UncaughtException { .. })));
}

#[test]
fn test_exception_from_callee_is_caught_by_caller() {
    let mut linker = TableLinker::new();
    let fail = linker.add_method("LCallee;", "fail", "I") as u16;
    let vm = Vm::new(VmOptions::default(), linker).unwrap();
    let arithmetic = class_id(&vm, ThrowKind::ArithmeticException);

    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 0);
    w.emit_22b(Opcode::DivIntLit8, 0, 0, 0);
    w.emit_11x(Opcode::Return, 0);
    vm.heap().define_class(
        ClassBuilder::new("LCallee;")
            .method(MethodBuilder::new("fail", "I").static_method().code(CodeItem::new(1, 0, w.finish()))),
    );

    let mut w = CodeWriter::new();
    w.emit_35c(Opcode::InvokeStatic, fail, &[]);
    w.emit_11x(Opcode::MoveResult, 0);
    w.emit_11x(Opcode::Return, 0);
    let handler = w.position();
    w.emit_21s(Opcode::Const16, 0, -100);
    w.emit_11x(Opcode::Return, 0);
    let code = CodeItem::new(1, 0, w.finish()).with_try(TryItem::new(0, 3).catch(arithmetic, handler));
    let method = define(&vm, "LCaller;", "I", code);

    let thread = vm.new_thread();
    assert_eq!(vm.invoke(&thread, &method, &[]).unwrap().get_i(), -100);
    assert_eq!(thread.depth(), 0);
}

// ===== Exception events =====

#[derive(Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Instrumentation for Recorder {
    fn has_exception_thrown_listeners(&self) -> bool {
        true
    }

    fn has_exception_handled_listeners(&self) -> bool {
        true
    }

    fn has_method_unwind_listeners(&self) -> bool {
        true
    }

    fn exception_thrown(&self, _thread: &ManagedThread, frame: &ShadowFrame, _exception: ObjRef) {
        self.events.lock().push(format!("thrown {}", frame.method().name()));
    }

    fn exception_handled(&self, _thread: &ManagedThread, frame: &mut ShadowFrame, handler_pc: u32) -> Result<(), Thrown> {
        self.events
            .lock()
            .push(format!("handled {} at {}", frame.method().name(), handler_pc));
        Ok(())
    }

    fn method_unwind(&self, _thread: &ManagedThread, frame: &ShadowFrame, _exception: ObjRef) {
        self.events.lock().push(format!("unwind {}", frame.method().name()));
    }
}

#[test]
fn test_events_for_caught_exception() {
    let vm = vm();
    let arithmetic = class_id(&vm, ThrowKind::ArithmeticException);
    let mut w = CodeWriter::new();
    let handler = guarded_divide(&mut w);
    w.emit_11x(Opcode::MoveException, 0);
    w.emit_11n(Opcode::Const4, 0, 5);
    w.emit_11x(Opcode::Return, 0);
    let code = CodeItem::new(3, 2, w.finish()).with_try(TryItem::new(0, 2).catch(arithmetic, handler));
    let method = define(&vm, "LEvents;", "III", code);

    let recorder = Recorder::default();
    let thread = vm.new_thread();
    let result = vm
        .interpreter()
        .with_instrumentation(&recorder)
        .invoke(&thread, &method, &[JValue::from_int(1), JValue::from_int(0)]);
    assert_eq!(result.unwrap().get_i(), 5);
    assert_eq!(
        *recorder.events.lock(),
        vec!["thrown run".to_string(), format!("handled run at {}", handler)]
    );
}

#[test]
fn test_propagated_exception_reported_once() {
    let mut linker = TableLinker::new();
    let fail = linker.add_method("LCallee;", "fail", "V") as u16;
    let vm = Vm::new(VmOptions::default(), linker).unwrap();
    let arithmetic = class_id(&vm, ThrowKind::ArithmeticException);

    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 0);
    w.emit_22b(Opcode::RemIntLit8, 0, 0, 0);
    w.emit_10x(Opcode::ReturnVoid);
    vm.heap().define_class(
        ClassBuilder::new("LCallee;")
            .method(MethodBuilder::new("fail", "V").static_method().code(CodeItem::new(1, 0, w.finish()))),
    );

    let mut w = CodeWriter::new();
    w.emit_35c(Opcode::InvokeStatic, fail, &[]);
    w.emit_10x(Opcode::ReturnVoid);
    let handler = w.position();
    w.emit_10x(Opcode::ReturnVoid);
    let code = CodeItem::new(0, 0, w.finish()).with_try(TryItem::new(0, 3).catch(arithmetic, handler));
    let method = define(&vm, "LCaller;", "V", code);

    let recorder = Recorder::default();
    let thread = vm.new_thread();
    vm.interpreter()
        .with_instrumentation(&recorder)
        .invoke(&thread, &method, &[])
        .unwrap();
    assert_eq!(
        *recorder.events.lock(),
        vec![
            "thrown fail".to_string(),
            "unwind fail".to_string(),
            format!("handled run at {}", handler)
        ]
    );
}

/// Throws a preallocated exception the first time the cursor reaches `at`
struct ThrowAt {
    at: u32,
    exception: ObjRef,
    fired: AtomicBool,
    recorder: Recorder,
}

impl Instrumentation for ThrowAt {
    fn has_dex_pc_listeners(&self) -> bool {
        true
    }

    fn has_exception_thrown_listeners(&self) -> bool {
        true
    }

    fn has_exception_handled_listeners(&self) -> bool {
        true
    }

    fn dex_pc_moved(&self, _thread: &ManagedThread, _frame: &mut ShadowFrame, dex_pc: u32) -> Result<(), Thrown> {
        if dex_pc == self.at && !self.fired.swap(true, Ordering::SeqCst) {
            return Err(Thrown(self.exception));
        }
        Ok(())
    }

    fn exception_thrown(&self, thread: &ManagedThread, frame: &ShadowFrame, exception: ObjRef) {
        self.recorder.exception_thrown(thread, frame, exception);
    }

    fn exception_handled(&self, thread: &ManagedThread, frame: &mut ShadowFrame, handler_pc: u32) -> Result<(), Thrown> {
        self.recorder.exception_handled(thread, frame, handler_pc)
    }
}

#[test]
fn test_dex_pc_listener_exception_is_routed_without_events() {
    let vm = vm();
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 0);
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_11x(Opcode::Return, 0);
    let handler = w.position();
    w.emit_11x(Opcode::MoveException, 0);
    w.emit_11x(Opcode::ReturnObject, 0);
    let code = CodeItem::new(1, 0, w.finish()).with_try(TryItem::new(0, 3).catch_all(handler));
    let method = define(&vm, "LListener;", "L", code);

    let injected = vm.heap().throw_new(ThrowKind::InternalError, Some("from listener")).object();
    let listener = ThrowAt {
        at: 1,
        exception: injected,
        fired: AtomicBool::new(false),
        recorder: Recorder::default(),
    };
    let thread = vm.new_thread();
    let result = vm
        .interpreter()
        .with_instrumentation(&listener)
        .invoke(&thread, &method, &[])
        .unwrap();
    assert_eq!(result.get_l(), Some(injected));
    assert!(listener.recorder.events.lock().is_empty());
}
