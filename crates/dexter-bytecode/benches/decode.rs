use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dexter_bytecode::{CodeWriter, Instruction, Opcode};

fn build_loop_body() -> Vec<u16> {
    let mut w = CodeWriter::new();
    let top = w.new_label();
    let done = w.new_label();
    w.bind(top);
    w.emit_21t(Opcode::IfEqz, 0, done);
    w.emit_23x(Opcode::AddInt, 1, 1, 0);
    w.emit_22b(Opcode::AddIntLit8, 0, 0, -1);
    w.emit_35c(Opcode::InvokeStatic, 1, &[0, 1]);
    w.emit_51l(Opcode::ConstWide, 2, 42);
    w.emit_10t(Opcode::Goto, top);
    w.bind(done);
    w.emit_11x(Opcode::Return, 1);
    w.finish()
}

fn bench_decode(c: &mut Criterion) {
    let code = build_loop_body();

    c.bench_function("decode_linear_walk", |b| {
        b.iter(|| {
            let mut pc = 0u32;
            let mut acc = 0u32;
            while (pc as usize) < code.len() {
                let inst = Instruction::at(black_box(&code), pc);
                acc = acc.wrapping_add(inst.opcode().to_u8() as u32);
                pc += inst.size_in_code_units() as u32;
            }
            acc
        })
    });

    c.bench_function("decode_operands", |b| {
        b.iter(|| {
            let inst = Instruction::at(black_box(&code), 2);
            inst.vreg_a() ^ inst.vreg_b() ^ inst.vreg_c()
        })
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
