//! Transactional execution tests
//!
//! Heap writes made under a [`Transaction`] are logged and undone when the
//! transaction aborts; writes that could escape it abort it.

use std::sync::Arc;

use dexter_bytecode::{CodeWriter, Opcode};
use dexter_core::{
    ClassBuilder, ClassId, CodeItem, FieldBuilder, JValue, Method, MethodBuilder, ObjRef, Primitive, TableLinker,
    Transaction, TryItem, Vm, VmError, VmOptions,
};

const ABORT: &str = "Ldalvik/system/TransactionAbortError;";

struct Fixture {
    vm: Vm,
    init: ClassId,
    boxed: ClassId,
    lazy: ClassId,
    counter: u16,
    value: u16,
    reference: u16,
    other_value: u16,
    lazy_type: u16,
    finalizable_type: u16,
}

impl Fixture {
    fn new() -> Self {
        let mut linker = TableLinker::new();
        let counter = linker.add_field("LInit;", "counter") as u16;
        let value = linker.add_field("LBox;", "value") as u16;
        let reference = linker.add_field("LBox;", "ref") as u16;
        let other_value = linker.add_field("LOther;", "value") as u16;
        let lazy_type = linker.add_type("LLazy;") as u16;
        let finalizable_type = linker.add_type("LFinal;") as u16;
        let vm = Vm::new(VmOptions::default(), linker).unwrap();

        let heap = vm.heap();
        let init = heap.define_class(
            ClassBuilder::new("LInit;").field(FieldBuilder::new("counter", Primitive::Int).static_field()),
        );
        let boxed = heap.define_class(
            ClassBuilder::new("LBox;")
                .field(FieldBuilder::new("value", Primitive::Int))
                .field(FieldBuilder::reference("ref", None)),
        );
        heap.define_class(ClassBuilder::new("LOther;").field(FieldBuilder::new("value", Primitive::Int).static_field()));
        let lazy = heap.define_class(ClassBuilder::new("LLazy;").uninitialized());
        heap.define_class(ClassBuilder::new("LFinal;").finalizable());

        Self {
            vm,
            init,
            boxed,
            lazy,
            counter,
            value,
            reference,
            other_value,
            lazy_type,
            finalizable_type,
        }
    }

    fn method(&self, shorty: &str, code: CodeItem) -> Arc<Method> {
        let class = self.vm.heap().define_class(
            ClassBuilder::new("LClinit;").method(MethodBuilder::new("run", shorty).static_method().code(code)),
        );
        self.vm.heap().class(class).method("run").unwrap()
    }

    fn new_box(&self, value: i32) -> ObjRef {
        let object = self.vm.heap().alloc_instance(self.boxed).unwrap();
        self.vm.heap().set_field(object, 0, JValue::from_int(value));
        object
    }

    fn run(&self, tx: &Transaction, method: &Arc<Method>, args: &[JValue]) -> Result<JValue, VmError> {
        let thread = self.vm.new_thread();
        self.vm.invoke_in_transaction(&thread, tx, method, args)
    }
}

fn expect_abort(result: Result<JValue, VmError>, expected: &str) {
    match result {
        Err(VmError::UncaughtException { class, message }) => {
            assert_eq!(class, ABORT);
            assert_eq!(message.as_deref(), Some(expected));
        }
        other => panic!("expected transaction abort, got {:?}", other),
    }
}

/// Writes a static, a field of `v2` and an array element of `v4`, then
/// a field of `v3`
fn write_everything(f: &Fixture) -> Arc<Method> {
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 7);
    w.emit_11n(Opcode::Const4, 1, 0);
    w.emit_21c(Opcode::Sput, 0, f.counter);
    w.emit_22c(Opcode::Iput, 0, 2, f.value);
    w.emit_23x(Opcode::Aput, 0, 4, 1);
    w.emit_22c(Opcode::Iput, 0, 3, f.value);
    w.emit_10x(Opcode::ReturnVoid);
    f.method("VLLL", CodeItem::new(5, 3, w.finish()))
}

fn int_array(f: &Fixture, first: i32) -> ObjRef {
    let heap = f.vm.heap();
    let array = heap.alloc_array(heap.find_class("[I").unwrap(), 2).unwrap();
    heap.array_set(array, 0, JValue::from_int(first)).unwrap();
    array
}

#[test]
fn test_commit_keeps_writes() {
    let f = Fixture::new();
    let method = write_everything(&f);
    let (first, second) = (f.new_box(3), f.new_box(4));
    let array = int_array(&f, 5);
    let tx = Transaction::new(Some(f.init));

    let args = [Some(first), Some(second), Some(array)].map(JValue::from_ref);
    f.run(&tx, &method, &args).unwrap();

    let heap = f.vm.heap();
    assert!(!tx.is_aborted());
    assert_eq!(tx.undo_log_len(), 4);
    assert_eq!(heap.class(f.init).get_static(0).get_i(), 7);
    assert_eq!(heap.get_field(first, 0).get_i(), 7);
    assert_eq!(heap.get_field(second, 0).get_i(), 7);
    assert_eq!(heap.array_get(array, 0).unwrap().get_i(), 7);
}

#[test]
fn test_abort_rolls_back_every_write() {
    let f = Fixture::new();
    let method = write_everything(&f);
    let (first, frozen) = (f.new_box(3), f.new_box(4));
    let array = int_array(&f, 5);
    let tx = Transaction::new(Some(f.init));
    tx.mark_immutable(frozen);

    let args = [Some(first), Some(frozen), Some(array)].map(JValue::from_ref);
    expect_abort(f.run(&tx, &method, &args), "Can't set fields of LBox;");

    let heap = f.vm.heap();
    assert!(tx.is_aborted());
    assert_eq!(tx.abort_message().as_deref(), Some("Can't set fields of LBox;"));
    assert_eq!(tx.undo_log_len(), 0);
    assert_eq!(heap.class(f.init).get_static(0).get_i(), 0);
    assert_eq!(heap.get_field(first, 0).get_i(), 3);
    assert_eq!(heap.get_field(frozen, 0).get_i(), 4);
    assert_eq!(heap.array_get(array, 0).unwrap().get_i(), 5);
}

#[test]
fn test_quick_field_writes_are_logged_and_checked() {
    let f = Fixture::new();
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 7);
    w.emit_22c(Opcode::IputQuick, 0, 1, 0);
    w.emit_22c(Opcode::IputQuick, 0, 2, 0);
    w.emit_10x(Opcode::ReturnVoid);
    let method = f.method("VLL", CodeItem::new(3, 2, w.finish()));

    let (first, frozen) = (f.new_box(3), f.new_box(4));
    let tx = Transaction::new(Some(f.init));
    tx.mark_immutable(frozen);
    let args = [Some(first), Some(frozen)].map(JValue::from_ref);
    expect_abort(f.run(&tx, &method, &args), "Can't set fields of LBox;");

    let heap = f.vm.heap();
    assert_eq!(heap.get_field(first, 0).get_i(), 3);
    assert_eq!(heap.get_field(frozen, 0).get_i(), 4);

    // Without the immutable receiver the quick write is undo-logged.
    let (first, second) = (f.new_box(3), f.new_box(4));
    let tx = Transaction::new(Some(f.init));
    let args = [Some(first), Some(second)].map(JValue::from_ref);
    f.run(&tx, &method, &args).unwrap();
    assert_eq!(tx.undo_log_len(), 2);
    assert_eq!(heap.get_field(second, 0).get_i(), 7);
}

#[test]
fn test_abort_is_not_catchable() {
    let f = Fixture::new();
    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_22c(Opcode::Iput, 0, 1, f.value);
    w.emit_10x(Opcode::ReturnVoid);
    let handler = w.position();
    w.emit_10x(Opcode::ReturnVoid);
    let code = CodeItem::new(2, 1, w.finish()).with_try(TryItem::new(0, 4).catch_all(handler));
    let method = f.method("VL", code);

    let frozen = f.new_box(0);
    let tx = Transaction::new(Some(f.init));
    tx.mark_immutable(frozen);
    expect_abort(f.run(&tx, &method, &[JValue::from_ref(Some(frozen))]), "Can't set fields of LBox;");
}

#[test]
fn test_strict_mode_rejects_foreign_statics() {
    let f = Fixture::new();
    let mut w = CodeWriter::new();
    w.emit_21c(Opcode::Sget, 0, f.other_value);
    w.emit_11x(Opcode::Return, 0);
    let method = f.method("I", CodeItem::new(1, 0, w.finish()));

    let lenient = Transaction::new(Some(f.init));
    assert_eq!(f.run(&lenient, &method, &[]).unwrap().get_i(), 0);

    let strict = Transaction::new(Some(f.init)).strict();
    expect_abort(
        f.run(&strict, &method, &[]),
        "Can't read static fields of LOther; since it does not belong to clinit's class.",
    );

    let mut w = CodeWriter::new();
    w.emit_11n(Opcode::Const4, 0, 1);
    w.emit_21c(Opcode::Sput, 0, f.other_value);
    w.emit_10x(Opcode::ReturnVoid);
    let method = f.method("V", CodeItem::new(1, 0, w.finish()));
    let strict = Transaction::new(Some(f.init)).strict();
    expect_abort(f.run(&strict, &method, &[]), "Can't set fields of LOther;");
}

#[test]
fn test_references_to_uninitialized_classes_abort() {
    let f = Fixture::new();
    let mut w = CodeWriter::new();
    w.emit_21c(Opcode::ConstClass, 0, f.lazy_type);
    w.emit_22c(Opcode::IputObject, 0, 1, f.reference);
    w.emit_10x(Opcode::ReturnVoid);
    let method = f.method("VL", CodeItem::new(2, 1, w.finish()));
    let tx = Transaction::new(Some(f.init));
    let target = f.new_box(0);
    expect_abort(
        f.run(&tx, &method, &[JValue::from_ref(Some(target))]),
        "Can't store reference to class LLazy;",
    );

    let mut w = CodeWriter::new();
    w.emit_22c(Opcode::IputObject, 1, 0, f.reference);
    w.emit_10x(Opcode::ReturnVoid);
    let method = f.method("VLL", CodeItem::new(2, 2, w.finish()));
    let tx = Transaction::new(Some(f.init));
    let instance = f.vm.heap().alloc_instance(f.lazy).unwrap();
    let args = [Some(target), Some(instance)].map(JValue::from_ref);
    expect_abort(f.run(&tx, &method, &args), "Can't store reference to instance of LLazy;");
    assert_eq!(f.vm.heap().get_field(target, 1).get_l(), None);
}

#[test]
fn test_finalizable_allocation_aborts() {
    let f = Fixture::new();
    let mut w = CodeWriter::new();
    w.emit_21c(Opcode::NewInstance, 0, f.finalizable_type);
    w.emit_10x(Opcode::ReturnVoid);
    let method = f.method("V", CodeItem::new(1, 0, w.finish()));

    let tx = Transaction::new(None);
    expect_abort(
        f.run(&tx, &method, &[]),
        "Allocating finalizable object in transaction: LFinal;",
    );

    // Outside a transaction the allocation succeeds.
    let thread = f.vm.new_thread();
    f.vm.invoke(&thread, &method, &[]).unwrap();
}
