//! Invocation throughput through the embedding API.
//!
//!   cargo bench --bench invoke_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ow::{InvokeFlags, Machine, ModuleSource};

/// Compiles and runs `source` as module `bench`, leaving the module on the stack.
fn load_module(machine: &mut Machine, source: &str) {
    machine
        .make_module(Some("bench"), ModuleSource::String(source))
        .expect("compile failed");
    machine.dup(1).expect("dup failed");
    machine
        .invoke(0, InvokeFlags::MODULE | InvokeFlags::NO_RETURN)
        .expect("module body failed");
}

/// Calls global `name` of the module at the bottom of the stack with one int argument.
fn call_global(machine: &mut Machine, name: &str, arg: i64) -> i64 {
    machine.load_module_global(1, name).expect("missing global");
    machine.push_int(arg);
    machine.invoke(1, InvokeFlags::empty()).expect("call failed");
    let result = machine.read_int(0).expect("not an int");
    machine.drop(1);
    result
}

/// Benchmark 1: recursive Fibonacci
/// Script calls and integer method dispatch.
fn bench_fibonacci(c: &mut Criterion) {
    let mut machine = Machine::new();
    load_module(
        &mut machine,
        r#"
func fib(n)
  if n < 2
    return n
  end
  return fib(n - 1) + fib(n - 2)
end
"#,
    );

    c.bench_function("fibonacci_15", |b| {
        b.iter(|| call_global(&mut machine, "fib", black_box(15)));
    });
}

/// Benchmark 2: counter object
/// Instantiation, attribute access and script method sends.
fn bench_counter_increment(c: &mut Criterion) {
    let mut machine = Machine::new();
    load_module(
        &mut machine,
        r#"
class Counter
  var count
  func init(self)
    self.count = 0
  end
  func bump(self)
    self.count = self.count + 1
  end
end

func count_to(n)
  counter = Counter()
  while counter.count < n
    counter.bump()
  end
  return counter.count
end
"#,
    );

    c.bench_function("counter_increment_100", |b| {
        b.iter(|| call_global(&mut machine, "count_to", black_box(100)));
    });
}

/// Benchmark 3: host driven native calls
/// One API round trip per call, no script code involved.
fn bench_native_method(c: &mut Criterion) {
    let mut machine = Machine::new();

    c.bench_function("native_method_send", |b| {
        b.iter(|| {
            machine.push_symbol("+");
            machine.push_int(black_box(40));
            machine.push_int(2);
            machine.invoke(2, InvokeFlags::METHOD).expect("send failed");
            machine.drop(1);
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_fibonacci, bench_counter_increment, bench_native_method
}

criterion_main!(benches);
