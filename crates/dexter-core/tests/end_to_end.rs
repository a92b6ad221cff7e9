//! Whole-VM scenarios
//!
//! Listener-driven returns, single stepping, on-stack replacement, garbage
//! collection over frame roots and file-based configuration.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use dexter_bytecode::{CodeWriter, Opcode, DEX_NO_INDEX};
use dexter_core::{
    ClassBuilder, CodeItem, FieldBuilder, HotnessCounter, Instrumentation, JValue, ManagedThread, Method,
    MethodBuilder, ShadowFrame, TableLinker, Vm, VmError, VmOptions,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn define(vm: &Vm, descriptor: &str, shorty: &str, code: CodeItem) -> Arc<Method> {
    let class = vm
        .heap()
        .define_class(ClassBuilder::new(descriptor).method(MethodBuilder::new("run", shorty).static_method().code(code)));
    vm.heap().class(class).method("run").unwrap()
}

/// `v0 = 1; v0 = 2; return v0`
fn two_stores(vm: &Vm) -> Arc<Method> {
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_11n(Opcode::Const4, 0, 2);
    w.emit_11x(Opcode::Return, 0);
    define(vm, "LStores;", "I", CodeItem::new(1, 0, w.finish()))
}

/// Counts the argument down to zero, one backward branch per iteration
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
    define(vm, "LLoop;", "II", CodeItem::new(1, 1, w.finish()))
}

// ===== Listener-driven returns =====

#[derive(Default)]
struct ForceAt {
    at: Option<u32>,
    replace_exit: Option<i32>,
    exits: Mutex<Vec<i32>>,
}

impl Instrumentation for ForceAt {
    fn has_dex_pc_listeners(&self) -> bool {
        self.at.is_some()
    }

    fn has_method_exit_listeners(&self) -> bool {
        true
    }

    fn dex_pc_moved(&self, _thread: &ManagedThread, frame: &mut ShadowFrame, dex_pc: u32) -> Result<(), dexter_core::Thrown> {
        if Some(dex_pc) == self.at {
            frame.request_forced_return(JValue::from_int(77));
        }
        Ok(())
    }

    fn method_exited(&self, _thread: &ManagedThread, frame: &mut ShadowFrame, result: &JValue) -> Result<(), dexter_core::Thrown> {
        self.exits.lock().push(result.get_i());
        if let Some(value) = self.replace_exit {
            frame.request_forced_return(JValue::from_int(value));
        }
        Ok(())
    }
}

#[test]
fn test_listener_forces_early_return() {
    init_logging();
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = two_stores(&vm);
    let listener = ForceAt {
        at: Some(1),
        ..ForceAt::default()
    };
    let thread = vm.new_thread();
    let result = vm.interpreter().with_instrumentation(&listener).invoke(&thread, &method, &[]);
    assert_eq!(result.unwrap().get_i(), 77);
    assert_eq!(*listener.exits.lock(), vec![77]);
}

#[test]
fn test_exit_listener_replaces_result() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = two_stores(&vm);
    let listener = ForceAt {
        replace_exit: Some(5),
        ..ForceAt::default()
    };
    let thread = vm.new_thread();
    let result = vm.interpreter().with_instrumentation(&listener).invoke(&thread, &method, &[]);
    assert_eq!(result.unwrap().get_i(), 5);
    assert_eq!(*listener.exits.lock(), vec![2]);
}

#[test]
fn test_exit_events_can_be_suppressed() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = two_stores(&vm);
    let listener = ForceAt::default();
    let thread = vm.new_thread();
    let mut frame = ShadowFrame::new_for_method(method);
    frame.set_skip_method_exit_events(true);
    let result = vm
        .interpreter()
        .with_instrumentation(&listener)
        .execute(&thread, &mut frame, JValue::default(), false);
    assert_eq!(result.unwrap().get_i(), 2);
    assert!(listener.exits.lock().is_empty());
}

/// Rewrites the returned register during the exit event
struct Relocate(dexter_core::ObjRef);

impl Instrumentation for Relocate {
    fn has_method_exit_listeners(&self) -> bool {
        true
    }

    fn method_exited(&self, _thread: &ManagedThread, frame: &mut ShadowFrame, _result: &JValue) -> Result<(), dexter_core::Thrown> {
        frame.set_vreg_reference(0, Some(self.0));
        Ok(())
    }
}

#[test]
fn test_object_return_rereads_register_after_exit_events() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let node = vm.heap().define_class(ClassBuilder::new("LNode;"));
    let mut w = CodeWriter::new();
    w.emit_11x(Opcode::ReturnObject, 0);
    let method = define(&vm, "LIdentity;", "LL", CodeItem::new(1, 1, w.finish()));

    let original = vm.heap().alloc_instance(node).unwrap();
    let moved = vm.heap().alloc_instance(node).unwrap();
    let listener = Relocate(moved);
    let thread = vm.new_thread();
    let result = vm
        .interpreter()
        .with_instrumentation(&listener)
        .invoke(&thread, &method, &[JValue::from_ref(Some(original))])
        .unwrap();
    assert_eq!(result.get_l(), Some(moved));
}

#[derive(Default)]
struct Branches(Mutex<Vec<(u32, i32)>>);

impl Instrumentation for Branches {
    fn has_branch_listeners(&self) -> bool {
        true
    }

    fn branch(&self, _thread: &ManagedThread, _frame: &ShadowFrame, dex_pc: u32, offset: i32) {
        self.0.lock().push((dex_pc, offset));
    }
}

#[test]
fn test_branch_events_include_fall_through() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = countdown(&vm);
    let branches = Branches::default();
    let thread = vm.new_thread();
    vm.interpreter()
        .with_instrumentation(&branches)
        .invoke(&thread, &method, &[JValue::from_int(1)])
        .unwrap();
    assert_eq!(*branches.0.lock(), vec![(0, 2), (4, -4), (0, 5)]);
}

// ===== Stepping =====

#[test]
fn test_single_step_through_invoke() {
    let mut linker = TableLinker::new();
    let answer = linker.add_method("LCallee;", "answer", "I") as u16;
    let vm = Vm::new(VmOptions::default(), linker).unwrap();

    let mut w = CodeWriter::new();
    w.emit_21s(Opcode::Const16, 0, 42);
    w.emit_11x(Opcode::Return, 0);
    vm.heap().define_class(
        ClassBuilder::new("LCallee;")
            .method(MethodBuilder::new("answer", "I").static_method().code(CodeItem::new(1, 0, w.finish()))),
    );

    let mut w = CodeWriter::new();
    w.emit_35c(Opcode::InvokeStatic, answer, &[]);
    w.emit_11x(Opcode::MoveResult, 0);
    w.emit_11x(Opcode::Return, 0);
    let caller = define(&vm, "LCaller;", "I", CodeItem::new(1, 0, w.finish()));

    let thread = vm.new_thread();
    let mut frame = ShadowFrame::new_for_method(caller);
    let result = vm.step(&thread, &mut frame, JValue::default()).unwrap();
    assert_eq!(result.get_i(), 42);
    assert_eq!(frame.dex_pc(), 3);
    assert_eq!(frame.get_vreg(0), 0);

    let result = vm.step(&thread, &mut frame, result).unwrap();
    assert_eq!(frame.dex_pc(), 4);
    assert_eq!(frame.get_vreg(0), 42);

    let result = vm.step(&thread, &mut frame, result).unwrap();
    assert_eq!(result.get_i(), 42);
    assert_eq!(frame.dex_pc(), DEX_NO_INDEX);
}

// ===== On-stack replacement =====

#[test]
fn test_osr_takes_over_hot_loop() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = countdown(&vm);
    let jit = HotnessCounter::new(1);
    jit.install_osr_entry(method.id(), 0, |_, frame| JValue::from_int(frame.get_vreg(0) * 1000));

    let thread = vm.new_thread();
    let result = vm
        .interpreter()
        .with_jit(&jit)
        .invoke(&thread, &method, &[JValue::from_int(10)])
        .unwrap();
    // The first back edge makes the method hot; the second transfers.
    assert_eq!(result.get_i(), 8000);
    assert_eq!(jit.osr_transitions(), 1);
    assert_eq!(jit.hotness(method.id()), 1);
}

#[test]
fn test_cold_method_stays_interpreted() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let method = countdown(&vm);
    let jit = HotnessCounter::new(1_000);
    jit.install_osr_entry(method.id(), 0, |_, _| JValue::from_int(-1));

    let thread = vm.new_thread();
    let result = vm
        .interpreter()
        .with_jit(&jit)
        .invoke(&thread, &method, &[JValue::from_int(10)])
        .unwrap();
    assert_eq!(result.get_i(), 0);
    assert_eq!(jit.osr_transitions(), 0);
    assert_eq!(jit.hotness(method.id()), 10);
}

// ===== Garbage collection =====

#[test]
fn test_collection_keeps_frame_references() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let heap = vm.heap();
    let node = heap.define_class(ClassBuilder::new("LNode;").field(FieldBuilder::reference("next", None)));
    let method = two_stores(&vm);

    let kept = heap.alloc_instance(node).unwrap();
    let child = heap.alloc_instance(node).unwrap();
    heap.set_field(kept, 0, JValue::from_ref(Some(child)));
    let garbage = heap.alloc_instance(node).unwrap();
    let locked = heap.alloc_instance(node).unwrap();

    let thread = vm.new_thread();
    vm.monitors().enter(&thread, locked);

    let mut frame = ShadowFrame::new(method, 2);
    frame.set_vreg_reference(0, Some(kept));
    // Primitive bits that happen to equal an object id are not roots.
    frame.set_vreg(1, garbage.raw() as i32);

    let stats = vm.collect_garbage(&[&frame]);
    assert_eq!(stats.collections, 1);
    assert!(stats.objects_freed >= 1);
    assert!(heap.is_live(kept));
    assert!(heap.is_live(child));
    assert!(!heap.is_live(garbage));
    assert!(heap.is_live(locked));
    assert!(vm.monitors().is_held_by(&thread, locked));

    // Once released, the object and its monitor go with the next collection.
    vm.monitors().exit(&thread, locked).unwrap();
    vm.collect_garbage(&[&frame]);
    assert!(!heap.is_live(locked));
    assert!(vm.monitors().is_empty());
}

#[test]
fn test_heap_limit_raises_out_of_memory() {
    let mut linker = TableLinker::new();
    let object = linker.add_type("Ljava/lang/Object;") as u16;
    let options = VmOptions {
        heap_limit: Some(16),
        ..VmOptions::default()
    };
    let vm = Vm::new(options, linker).unwrap();

    let mut w = CodeWriter::new();
    let head = w.new_label();
    w.bind(head);
    w.emit_21c(Opcode::NewInstance, 0, object);
    w.emit_10t(Opcode::Goto, head);
    let method = define(&vm, "LHog;", "V", CodeItem::new(1, 0, w.finish()));

    let thread = vm.new_thread();
    match vm.invoke(&thread, &method, &[]) {
        Err(VmError::UncaughtException { class, .. }) => assert_eq!(class, "Ljava/lang/OutOfMemoryError;"),
        other => panic!("expected OutOfMemoryError, got {:?}", other),
    }
}

// ===== Embedding =====

#[test]
fn test_options_from_file_select_handler_set() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "access_checks = false").unwrap();
    writeln!(file, "max_stack_depth = 64").unwrap();
    let options = VmOptions::from_file(file.path()).unwrap();
    assert!(!options.access_checks);
    assert_eq!(options.max_stack_depth, 64);

    let mut linker = TableLinker::new();
    let object = linker.add_type("Ljava/lang/Object;") as u16;
    let vm = Vm::new(options, linker).unwrap();
    let mut w = CodeWriter::new();
    w.emit_21c(Opcode::NewInstance, 0, object);
    w.emit_11x(Opcode::MonitorEnter, 0);
    w.emit_10x(Opcode::ReturnVoid);
    let method = define(&vm, "LLeaky;", "V", CodeItem::new(1, 0, w.finish()));

    // Monitor balance is only enforced by the access-checking handlers.
    let thread = vm.new_thread();
    vm.invoke(&thread, &method, &[]).unwrap();
}

#[test]
fn test_invalid_options_are_rejected() {
    let result = VmOptions::from_toml_str("max_stack_depth = 0");
    assert!(matches!(result, Err(VmError::Config(_))));

    let options = VmOptions {
        jit_threshold: 0,
        ..VmOptions::default()
    };
    assert!(matches!(Vm::new(options, TableLinker::new()), Err(VmError::Config(_))));
}

#[test]
fn test_invoke_checks_code_and_arguments() {
    let vm = Vm::new(VmOptions::default(), TableLinker::new()).unwrap();
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 1);
    let falls_off = define(&vm, "LBroken;", "V", CodeItem::new(1, 0, w.finish()));
    let thread = vm.new_thread();
    assert!(matches!(vm.invoke(&thread, &falls_off, &[]), Err(VmError::Verify(_))));

    let method = countdown(&vm);
    match vm.invoke(&thread, &method, &[]) {
        Err(VmError::ArgumentMismatch { expected, actual, .. }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 0);
        }
        other => panic!("expected argument mismatch, got {:?}", other),
    }
}
