//! Suspension points and cross-thread interaction
//!
//! Interpreter threads poll the safepoint coordinator on backward branches,
//! exception delivery and returns, and observe asynchronous exceptions on
//! branches and monitor operations.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dexter_bytecode::{CodeWriter, Opcode};
use dexter_core::{
    ClassBuilder, CodeItem, FieldBuilder, JValue, Method, MethodBuilder, Primitive, StopReason, TableLinker, ThrowKind,
    TryItem, Vm, VmError, VmOptions,
};

fn define(vm: &Vm, shorty: &str, code: CodeItem) -> Arc<Method> {
    let class = vm
        .heap()
        .define_class(ClassBuilder::new("LWorker;").method(MethodBuilder::new("run", shorty).static_method().code(code)));
    vm.heap().class(class).method("run").unwrap()
}

/// Counts down from the argument with one backward branch per iteration
fn countdown(vm: &Vm) -> Arc<Method> {
    let mut w = CodeWriter::new();
    let head = w.new_label();
    let done = w.new_label();
    w.bind(head);
    w.emit_21t(Opcode::IfLez, 0, done);
    w.emit_22b(Opcode::AddIntLit8, 0, 0, -1);
    w.emit_10t(Opcode::Goto, head);
    w.bind(done);
    w.emit_11x(Opcode::Return, 0);
    define(vm, "II", CodeItem::new(1, 1, w.finish()))
}

#[test]
fn test_backward_branches_are_suspension_points() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = countdown(&vm);
    let thread = vm.new_thread();
    let result = vm.invoke(&thread, &method, &[JValue::from_int(100)]).unwrap();
    assert_eq!(result.get_i(), 0);
    // One check per taken backward branch plus one on return.
    assert_eq!(thread.suspend_check_count(), 101);
}

#[test]
fn test_threads_register_with_the_vm_coordinator() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    assert_eq!(vm.safepoint().worker_count(), 0);
    let first = vm.new_thread();
    let second = vm.new_thread();
    assert_eq!(vm.safepoint().worker_count(), 2);
    assert_ne!(first.id(), second.id());
    drop(first);
    drop(second);
    assert_eq!(vm.safepoint().worker_count(), 0);
}

#[test]
fn test_pause_parks_running_interpreter() {
    let mut linker = TableLinker::new();
    let stop = linker.add_field("LFlag;", "stop") as u16;
    let vm = Vm::new(VmOptions::default(), linker).unwrap();
    let flag = vm
        .heap()
        .define_class(ClassBuilder::new("LFlag;").field(FieldBuilder::new("stop", Primitive::Int).static_field()));

    // Spin until LFlag;.stop becomes non-zero, counting iterations.
    let mut w = CodeWriter::new();
    let head = w.new_label();
    let done = w.new_label();
    w.emit_11n(Opcode::Const4, 1, 0);
    w.bind(head);
    w.emit_21c(Opcode::Sget, 0, stop);
    w.emit_21t(Opcode::IfNez, 0, done);
    w.emit_22b(Opcode::AddIntLit8, 1, 1, 1);
    w.emit_10t(Opcode::Goto, head);
    w.bind(done);
    w.emit_11x(Opcode::Return, 1);
    let method = define(&vm, "I", CodeItem::new(2, 0, w.finish()));

    let worker = vm.new_thread();
    let coordinator = vm.safepoint().clone();
    thread::scope(|scope| {
        let handle = scope.spawn(|| vm.invoke(&worker, &method, &[]));

        assert!(coordinator.request_pause_timeout(StopReason::Suspend, Some(Duration::from_secs(30))));
        assert_eq!(coordinator.workers_at_safepoint(), 1);
        assert_eq!(coordinator.current_reason(), Some(StopReason::Suspend));
        vm.heap().class(flag).set_static(0, JValue::from_int(1));
        coordinator.resume();

        let iterations = handle.join().unwrap().unwrap().get_i();
        assert!(iterations >= 0);
    });
    assert_eq!(coordinator.stats().0, 1);
}

#[test]
fn test_async_exception_raised_at_monitor_enter() {
    let mut linker = TableLinker::new();
    let object = linker.add_type("Ljava/lang/Object;") as u16;
    let vm = Vm::new(VmOptions::default(), linker).unwrap();

    let mut w = CodeWriter::new();
    w.emit_21c(Opcode::NewInstance, 0, object);
    w.emit_11x(Opcode::MonitorEnter, 0);
    w.emit_11x(Opcode::MonitorExit, 0);
    w.emit_10x(Opcode::ReturnVoid);
    let method = define(&vm, "V", CodeItem::new(1, 0, w.finish()));

    let thread = vm.new_thread();
    let injected = vm.heap().throw_new(ThrowKind::InternalError, Some("interrupted")).object();
    thread.set_async_exception(injected);
    match vm.invoke(&thread, &method, &[]) {
        Err(VmError::UncaughtException { class, message }) => {
            assert_eq!(class, "Ljava/lang/InternalError;");
            assert_eq!(message.as_deref(), Some("interrupted"));
        }
        other => panic!("expected the injected exception, got {:?}", other),
    }
    // Observed once; the next run completes.
    vm.invoke(&thread, &method, &[]).unwrap();
}

#[test]
fn test_async_exception_stops_infinite_loop() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let mut w = CodeWriter::new();
    let head = w.new_label();
    w.emit_11n(Opcode::Const4, 0, 0);
    w.bind(head);
    w.emit_10x(Opcode::Nop);
    w.emit_10t(Opcode::Goto, head);
    let handler = w.position();
    w.emit_11x(Opcode::MoveException, 0);
    w.emit_11x(Opcode::ReturnObject, 0);
    let code = CodeItem::new(1, 0, w.finish()).with_try(TryItem::new(0, handler).catch_all(handler));
    let method = define(&vm, "L", code);

    let worker = vm.new_thread();
    let injected = vm.heap().throw_new(ThrowKind::InternalError, Some("stop")).object();
    thread::scope(|scope| {
        let handle = scope.spawn(|| vm.invoke(&worker, &method, &[]));
        thread::sleep(Duration::from_millis(10));
        worker.set_async_exception(injected);
        let caught = handle.join().unwrap().unwrap();
        assert_eq!(caught.get_l(), Some(injected));
    });
}
