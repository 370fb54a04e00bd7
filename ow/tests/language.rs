use ow::{
    ApiError, ExceptionExport, FaultKind, HeapSettings, InvokeFlags, Machine, MachineConfig,
    ModuleSource, PrintFlags,
};

/// Runs `source` as a module and returns the repr of its last expression.
///
/// The module stays on the stack below the result, at local 1 of a fresh machine.
fn eval_in(machine: &mut Machine, source: &str) -> Result<String, (FaultKind, String)> {
    machine
        .make_module(Some("main"), ModuleSource::String(source))
        .and_then(|()| machine.dup(1))
        .and_then(|()| machine.invoke(0, InvokeFlags::MODULE))
        .map_err(|_| fault_of_top(machine))?;
    let result = machine.stack().local(0).unwrap();
    Ok(machine.repr_value(result))
}

fn eval(source: &str) -> Result<String, (FaultKind, String)> {
    eval_in(&mut Machine::new(), source)
}

fn fault_of_top(machine: &mut Machine) -> (FaultKind, String) {
    let exception = machine.stack().local(0).unwrap();
    let kind = machine.exception_kind(exception).unwrap();
    let mut buffer = [0u8; 256];
    machine
        .read_exception(0, ExceptionExport::Buffer(&mut buffer), PrintFlags::MESSAGE)
        .unwrap();
    let end = buffer.iter().position(|&byte| byte == 0).unwrap();
    (kind, String::from_utf8_lossy(&buffer[..end]).into_owned())
}

const SHAPES: &str = "\
class Point
  var x, y
  func init(self, x, y)
    self.x = x
    self.y = y
    Point.count = Point.count + 1
  end
  func sum(self)
    return self.x + self.y
  end
end
Point.count = 0

class Point3 < Point
  var z
  func init(self, x, y, z)
    self.x = x
    self.y = y
    self.z = z
  end
  func sum(self)
    return self.x + self.y + self.z
  end
end

a = Point(1, 2)
b = Point(3, 4)
c = Point3(1, 2, 3)
";

#[test]
fn arithmetic_follows_precedence() {
    assert_eq!(eval("1 + 2 * 3 - 8 / 4"), Ok("5".to_owned()));
    assert_eq!(eval("(1 + 2) * 3"), Ok("9".to_owned()));
    assert_eq!(eval("-(2 + 3)"), Ok("-5".to_owned()));
    assert_eq!(eval("17 % 5"), Ok("2".to_owned()));
    assert_eq!(eval("2.5 * 2"), Ok("5.0".to_owned()));
    assert_eq!(eval("1 + 0.5"), Ok("1.5".to_owned()));
}

#[test]
fn integers_outside_the_small_range_are_boxed() {
    assert_eq!(
        eval("4611686018427387904 + 1"),
        Ok("4611686018427387905".to_owned())
    );
    assert_eq!(
        eval("9223372036854775807 + 1"),
        Err((FaultKind::Index, "integer overflow".to_owned()))
    );
    assert_eq!(
        eval("1 / 0"),
        Err((FaultKind::Index, "division by zero".to_owned()))
    );
}

#[test]
fn comparisons_and_logic() {
    assert_eq!(eval("1 < 2 and not (3 == 4)"), Ok("true".to_owned()));
    assert_eq!(eval("1 != 1"), Ok("false".to_owned()));
    assert_eq!(eval("nil or 5"), Ok("5".to_owned()));
    assert_eq!(eval("false and missing"), Ok("false".to_owned()));
    assert_eq!(eval("3 >= 3 and 2 <= 1"), Ok("false".to_owned()));
}

#[test]
fn control_flow() {
    let source = "\
total = 0
i = 1
while i <= 10
  total = total + i
  i = i + 1
end
func classify(n)
  if n < 0
    return :negative
  elif n == 0
    return :zero
  else
    return :positive
  end
end
tuple(total, classify(-3), classify(0), classify(8))
";
    assert_eq!(
        eval(source),
        Ok("(55, :negative, :zero, :positive)".to_owned())
    );
}

#[test]
fn recursion_and_locals() {
    let source = "\
func fact(n)
  if n < 2
    return 1
  end
  return n * fact(n - 1)
end
fact(10)
";
    assert_eq!(eval(source), Ok("3628800".to_owned()));

    let mut machine = Machine::new();
    let source = "\
func scratch()
  y = 41
  return y + 1
end
scratch()
";
    assert_eq!(eval_in(&mut machine, source), Ok("42".to_owned()));
    // `y` was a local of `scratch`, not a global of the module
    assert_eq!(machine.load_module_global(1, "y"), Err(ApiError::Index));
    assert_eq!(machine.load_module_global(1, "scratch"), Ok(()));
}

#[test]
fn functions_without_return_give_nil() {
    assert_eq!(eval("func f()\n  x = 1\nend\nf()"), Ok("nil".to_owned()));
    assert_eq!(eval("x = 1"), Ok("nil".to_owned()));
}

#[test]
fn classes_attributes_and_statics() {
    let mut machine = Machine::new();
    let source = format!("{SHAPES}tuple(a.sum(), b.sum(), c.sum(), Point.count)");
    assert_eq!(eval_in(&mut machine, &source), Ok("(3, 7, 6, 2)".to_owned()));
}

#[test]
fn subclasses_inherit_methods_and_attributes() {
    let source = "\
class Base
  var name
  func greet(self)
    return \"hello \" + self.name
  end
end
class Derived < Base
  var extra
end
d = Derived()
d.name = \"world\"
tuple(d.greet(), d.is_a(Base), d.is_a(Derived), Base().is_a(Derived), Derived.super() == Base)
";
    assert_eq!(
        eval(source),
        Ok("(\"hello world\", true, true, false, true)".to_owned())
    );
}

#[test]
fn instances_start_with_nil_fields() {
    let source = "\
class Box
  var content
end
Box().content
";
    assert_eq!(eval(source), Ok("nil".to_owned()));
}

#[test]
fn attribute_and_method_faults() {
    let source = format!("{SHAPES}a.w");
    assert_eq!(
        eval(&source),
        Err((
            FaultKind::Resolution,
            "`Point' object has no attribute `w'".to_owned()
        ))
    );
    let source = format!("{SHAPES}a.scale(2)");
    assert_eq!(
        eval(&source),
        Err((
            FaultKind::Resolution,
            "`Point' object has no method `scale'".to_owned()
        ))
    );
    let source = format!("{SHAPES}Point(1)");
    assert_eq!(
        eval(&source),
        Err((
            FaultKind::Type,
            "`init' takes 3 arguments, 2 given".to_owned()
        ))
    );
}

#[test]
fn builtin_objects_and_reflection() {
    assert_eq!(eval("\"ab\" + \"cd\""), Ok("\"abcd\"".to_owned()));
    assert_eq!(eval("\"abc\".size()"), Ok("3".to_owned()));
    assert_eq!(eval("str(12) + \"!\""), Ok("\"12!\"".to_owned()));
    assert_eq!(eval(":sym.name()"), Ok("\"sym\"".to_owned()));
    assert_eq!(eval("tuple(1, 2, 3).get(1)"), Ok("2".to_owned()));
    assert_eq!(eval("tuple(1, 2, 3).size()"), Ok("3".to_owned()));
    assert_eq!(eval("type(1) == Int"), Ok("true".to_owned()));
    assert_eq!(eval("Int.name()"), Ok("\"Int\"".to_owned()));
    assert_eq!(eval("1.5.class()"), Ok("<class Float>".to_owned()));
    assert_eq!(eval("nil"), Ok("nil".to_owned()));
}

#[test]
fn runtime_faults_are_classified() {
    assert_eq!(
        eval("nope + 1"),
        Err((FaultKind::Resolution, "undefined global `nope'".to_owned()))
    );
    assert_eq!(
        eval("5()"),
        Err((
            FaultKind::Type,
            "`Int' object is not a callable object".to_owned()
        ))
    );
    assert_eq!(
        eval("tuple(1).get(4)"),
        Err((FaultKind::Index, "index 4 is out of range".to_owned()))
    );
    assert!(matches!(eval("Int()"), Err((FaultKind::NotImplemented, _))));
    assert!(matches!(eval("class A < 3\nend"), Err((FaultKind::Type, _))));
}

#[test]
fn stress_collection_keeps_reachable_objects() {
    let mut machine = Machine::with_config(MachineConfig {
        heap: HeapSettings {
            stress: true,
            ..HeapSettings::default()
        },
        ..MachineConfig::default()
    });
    let source = format!(
        "{SHAPES}\
words = \"\"
i = 0
while i < 20
  words = words + str(i)
  i = i + 1
end
tuple(words.size(), a.sum(), c.sum(), 4611686018427387904 * 1)"
    );
    assert_eq!(
        eval_in(&mut machine, &source),
        Ok("(30, 3, 6, 4611686018427387904)".to_owned())
    );
    assert!(machine.heap().stats().collections > 0);
}

#[test]
fn collect_reports_freed_objects() {
    let source = "\
i = 0
while i < 10
  garbage = \"x\" + \"y\"
  i = i + 1
end
garbage = nil
collect() > 0
";
    assert_eq!(eval(source), Ok("true".to_owned()));
}
