use beget::vm::VmErrorKind;
use beget::{Error, Library, Vm};

fn run(source: &str) -> Result<String, Error> {
    let mut out = Vec::new();
    beget::run_source(source, &mut out)?;
    Ok(String::from_utf8(out).expect("utf-8 output"))
}

fn output(source: &str) -> String {
    match run(source) {
        Ok(s) => s,
        Err(e) => panic!("{source}\nfailed: {e}"),
    }
}

// --- Small programs ---

#[test]
fn arithmetic_write() {
    assert_eq!(output("write(1 + 2)"), "3");
}

#[test]
fn prototype_read_through_beget() {
    assert_eq!(output("var a = {} a.n = 1 var b = beget a write(b.n)"), "1");
}

#[test]
fn counting_loop() {
    assert_eq!(output("var i = 0 while i < 3 { i = i + 1 } write(i)"), "3");
}

#[test]
fn adding_null_fails_at_runtime() {
    match run("var x = null write(2 + x)") {
        Err(Error::Runtime(e)) => {
            assert!(matches!(e.kind, VmErrorKind::Operands { .. }));
            assert!(e.to_string().starts_with("Add"));
            assert!(e.to_string().contains("null"));
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn function_value_of_last_expression() {
    assert_eq!(output("fn f() { 1 } write(f())"), "1");
}

// --- Larger programs ---

#[test]
fn recursive_factorial() {
    let src = r#"
        fn fact(n) {
            if n <= 1 { 1 } else { n * fact(n - 1) }
        }
        write(fact(5), " ", fact(10))
    "#;
    assert_eq!(output(src), "120 3628800");
}

#[test]
fn mutual_recursion_between_globals() {
    let src = r#"
        fn even(n) { if n == 0 { true } else { odd(n - 1) } }
        fn odd(n) { if n == 0 { false } else { even(n - 1) } }
        write(even(10), odd(7), even(3))
    "#;
    assert_eq!(output(src), "truetruefalse");
}

#[test]
fn fibonacci_loop() {
    let src = r#"
        var a = 0
        var b = 1
        var i = 0
        while i < 10 {
            var next = a + b
            a = b
            b = next
            i = i + 1
        }
        write(a)
    "#;
    assert_eq!(output(src), "55");
}

#[test]
fn prototype_chain_with_methods() {
    let src = r#"
        var animal = {
            describe: fn() { write(self.name, " says ", self.sound(), "\n") },
            sound: fn() { "..." }
        }
        var dog = beget animal
        dog.sound = fn() { "woof" }
        var rex = beget dog
        rex.name = "Rex"
        rex.describe()
        var cat = beget animal
        cat.name = "Tom"
        cat.describe()
    "#;
    assert_eq!(output(src), "Rex says woof\nTom says ...\n");
}

#[test]
fn objects_as_counters() {
    let src = r#"
        fn make_counter() {
            var c = { count: 0 }
            c.inc = fn() { self.count = self.count + 1 }
            c
        }
        var c1 = make_counter()
        var c2 = make_counter()
        c1.inc() c1.inc() c2.inc()
        write(c1.count, c2.count)
    "#;
    assert_eq!(output(src), "21");
}

#[test]
fn computed_keys_and_method_by_index() {
    let src = r#"
        var table = {}
        var i = 0
        while i < 3 { table[i] = i * i  i = i + 1 }
        table["show"] = fn(k) { write(self[k]) }
        table["show"](2)
        write(table[0], table[1], table[3])
    "#;
    assert_eq!(output(src), "401null");
}

#[test]
fn arity_is_normalized() {
    let src = r#"
        fn show(a, b) { write(a, "|", b, ";") }
        show()
        show(1)
        show(1, 2)
        show(1, 2, 3, 4)
    "#;
    assert_eq!(output(src), "null|null;1|null;1|2;1|2;");
}

#[test]
fn anonymous_functions_are_values() {
    let src = r#"
        var apply = fn(f, x) { f(x) }
        write(apply(fn(n) { n * 3 }, 7), apply)
    "#;
    assert_eq!(output(src), "21<fn>");
}

#[test]
fn blocks_scope_declarations() {
    let src = r#"
        var x = "outer"
        {
            var x = "inner"
            write(x, " ")
        }
        write(x)
    "#;
    assert_eq!(output(src), "inner outer");
}

#[test]
fn logical_operators_yield_booleans() {
    assert_eq!(output("write(1 && \"s\", null || false, !null)"), "truefalsetrue");
}

#[test]
fn else_if_chains() {
    let src = r#"
        fn grade(n) {
            if n >= 90 { "A" } else if n >= 80 { "B" } else if n >= 70 { "C" } else { "F" }
        }
        write(grade(95), grade(85), grade(75), grade(10))
    "#;
    assert_eq!(output(src), "ABCF");
}

#[test]
fn builtin_prototypes_extend_primitives() {
    let src = r#"
        Number.squared = fn() { self * self }
        Boolean.flip = fn() { !self }
        write((4).squared(), true.flip())
    "#;
    assert_eq!(output(src), "16false");
}

#[test]
fn while_evaluates_to_null() {
    assert_eq!(output("var i = 0 write(while i < 1 { i = i + 1 })"), "null");
}

// --- Static errors ---

#[test]
fn undeclared_name_is_rejected_before_running() {
    match run("write(\"never\") write(nope)") {
        Err(Error::Compile(e)) => assert_eq!(e.code(), "B-R001"),
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn redeclaration_is_rejected() {
    assert_eq!(run("var a = 1 var a = 2").unwrap_err().code(), "B-R002");
}

#[test]
fn inner_function_cannot_capture_locals() {
    let src = "fn outer() { var hidden = 1 fn inner() { hidden } inner() } outer()";
    assert_eq!(run(src).unwrap_err().code(), "B-R001");
}

// --- Runtime errors ---

#[test]
fn self_in_plain_call() {
    assert_eq!(run("fn f() { self } f()").unwrap_err().code(), "B-V003");
}

#[test]
fn calling_a_missing_method() {
    let err = run("var o = {} o.missing()").unwrap_err();
    assert_eq!(err.code(), "B-V001");
    assert!(err.to_string().contains("null"));
}

// --- Embedding ---

#[test]
fn compile_once_run_with_own_vm() {
    let lib = Library::new();
    let chunk = beget::compile_source("var total = 0 var i = 1 while i <= 4 { total = total + i i = i + 1 }", &lib)
        .expect("compiles");
    let mut vm = Vm::new(&chunk, &lib, std::io::sink());
    vm.run().expect("runs");
    assert_eq!(vm.global("total"), Some(lib.number(10.0)));
    assert!(vm.stack().is_empty());
}
