use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use wick::bytecode::emit::Emitter;
use wick::frontend::parser::parse_source;
use wick::runtime::vm::Vm;

/// Discards VM output so the benchmarks measure execution, not stdout.
struct Sink;

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const DEMOS: &[&str] = &["demos/fib.wick", "demos/arrays.wick", "demos/loops.wick"];

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    for path in DEMOS {
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path);
        let source = fs::read_to_string(path).expect("read demo program");

        group.bench_function(format!("compile+run/{}", name), |b| {
            b.iter(|| {
                let program = parse_source(&source, Path::new(path)).expect("parse ok");
                let module = Emitter::new().emit(&program).expect("emit ok");
                let mut vm = Vm::new().with_output(Box::new(Sink));
                vm.run(&module).expect("vm ok");
                black_box(vm.stack().len());
            });
        });
    }

    group.finish();
}

fn bench_execute_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    group.sample_size(20);

    for path in DEMOS {
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path);
        let source = fs::read_to_string(path).expect("read demo program");
        let program = parse_source(&source, Path::new(path)).expect("parse ok");
        let module = Emitter::new().emit(&program).expect("emit ok");

        group.bench_function(format!("run/{}", name), |b| {
            b.iter(|| {
                let mut vm = Vm::new().with_output(Box::new(Sink));
                vm.run(black_box(&module)).expect("vm ok");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_execute_only);
criterion_main!(benches);
