use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::io;

use tern::{Vm, VmSettings};

fn bench_vm() -> Vm {
    let mut vm = Vm::new(VmSettings::default()).expect("settings");
    vm.set_output(Box::new(io::sink()));
    vm
}

fn run_case(c: &mut Criterion, name: &str, src: &str) {
    let mut vm = bench_vm();
    let warmup = vm.run(src).expect("warmup");
    black_box(warmup);

    c.bench_function(&format!("{name}_compile"), |b| {
        b.iter(|| black_box(vm.compile_source(src).expect("compile")))
    });

    c.bench_function(&format!("{name}_run"), |b| {
        b.iter(|| {
            let value = vm.run(src).expect("run");
            black_box(value);
        })
    });
}

fn bench_loops_and_calls(c: &mut Criterion) {
    run_case(
        c,
        "counting_loop",
        "i = 0; total = 0; while (i < 10000) { total += i; i++; } return total;",
    );
    run_case(
        c,
        "recursive_calls",
        "function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } return fib(18);",
    );
    run_case(
        c,
        "method_dispatch",
        "xs = []; i = 0; while (i < 2000) { xs.push(i); i++; } while (xs.len() > 0) xs.pop(); return 0;",
    );

    let mut stress = String::from("x = 0; ");
    for _ in 0..120 {
        stress.push_str("x = x + 1; ");
    }
    stress.push_str("return x;");
    run_case(c, "stress_dispatch", &stress);
}

criterion_group!(benches, bench_loops_and_calls);
criterion_main!(benches);
