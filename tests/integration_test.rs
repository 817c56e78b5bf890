use std::{cell::RefCell, rc::Rc};

use tlox::interpreter::{Interpreter, RuntimeError};

fn interpret(source: &str) -> (String, Result<(), RuntimeError>) {
    let program = tlox::parse_program(source).expect("Parse should work on valid program");
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());
    let result = interpreter.interpret(&program);
    let output = String::from_utf8(output.take()).expect("Output should be valid UTF-8");
    (output, result)
}

fn test_valid_program(source: &str, expected_output: &str) {
    let (output, result) = interpret(source);
    result.expect("Interpret should work on valid program");
    assert_eq!(output, expected_output);
}

fn test_runtime_error(source: &str, expected_output: &str, expected_error: &str) {
    let (output, result) = interpret(source);
    let error = result.expect_err("Program should fail at runtime");
    assert_eq!(output, expected_output);
    assert_eq!(error.to_string(), expected_error);
}

#[test]
fn test_shadowing() {
    let source = "var x = 1; { var x = 2; print x; } print x;";
    test_valid_program(source, "2\n1\n");
}

#[test]
fn test_typed_function() {
    let source = "int add(int a, int b) { return a + b; } print add(2,3);";
    test_valid_program(source, "5\n");
}

#[test]
fn test_fib() {
    let source = r#"
    fun fib(n) {
        if (n <= 1) return n;
        return fib(n - 1) + fib(n - 2);
    }

    for (var i = 0; i < 10; i = i + 1) {
        print fib(i);
    }
    "#;
    let expected_output = "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n";
    test_valid_program(source, expected_output);
}

#[test]
fn test_closure() {
    let source = r#"
    fun makeCounter() {
        int i = 0;
        fun count() {
            i = i + 1;
            return i;
        }
        return count;
    }

    var counter = makeCounter();
    print counter(); // 1
    print counter(); // 2
    print counter;
    "#;
    let expected_output = "1\n2\n<fn count>\n";
    test_valid_program(source, expected_output);
}

#[test]
fn test_closures_share_loop_variable() {
    let source = r#"
    var first;
    var second;
    for (int i = 0; i < 2; i = i + 1) {
        fun show() { print i; }
        if (first == nil) first = show; else second = show;
    }
    first();
    second();
    "#;
    test_valid_program(source, "2\n2\n");
}

#[test]
fn test_lookup_is_dynamic() {
    // No static resolution: a closure sees a later declaration in its own scope.
    let source = r#"
    var a = "global";
    {
        fun showA() {
            print a;
        }
        showA();
        var a = "block";
        showA();
    }
    "#;
    test_valid_program(source, "global\nblock\n");
}

#[test]
fn test_counter_class() {
    let source = "class Counter { public constructor() { } public int get() { return 1; } } var c = new Counter(); print c.get();";
    test_valid_program(source, "1\n");
}

#[test]
fn test_constructor_and_fields() {
    let source = r#"
    class Point {
        private int x;
        private int y;

        public constructor(int x, int y) {
            this.x = x;
            this.y = y;
        }

        public int sum() {
            return this.x + this.y;
        }

        public void move(int dx) {
            this.x = this.x + dx;
        }
    }

    Point p = new Point(1, 2);
    print p.sum();
    p.move(10);
    print p.sum();
    print p;
    print Point;
    "#;
    test_valid_program(source, "3\n13\nPoint instance\nPoint\n");
}

#[test]
fn test_class_without_constructor() {
    let source = r#"
    class Bag { }
    var b = new Bag();
    b.item = "apple";
    print b.item;
    var c = Bag();
    print c;
    "#;
    test_valid_program(source, "apple\nBag instance\n");
}

#[test]
fn test_constructor_may_reference_class() {
    let source = r#"
    class Node {
        public constructor(int depth) {
            if (depth > 0) this.child = new Node(depth - 1);
            else this.child = nil;
            this.depth = depth;
        }
    }
    var n = new Node(2);
    print n.child.child.depth;
    print n.child.child.child;
    "#;
    test_valid_program(source, "0\nnil\n");
}

#[test]
fn test_bound_method_keeps_this() {
    let source = r#"
    class Greeter {
        public constructor(string name) { this.name = name; }
        public string greet() { return "hi " + this.name; }
    }
    var greet = new Greeter("ada").greet;
    print greet();
    "#;
    test_valid_program(source, "hi ada\n");
}

#[test]
fn test_static_members() {
    let source = r#"
    class Config {
        public static int retries = 3;
        public static string name = "cfg" + "!";
        public static int twice(int n) { return n * 2; }
    }
    print Config.retries;
    print Config.name;
    print Config.twice(Config.retries);
    Config.added = true;
    print Config.added;
    "#;
    test_valid_program(source, "3\ncfg!\n6\ntrue\n");
}

#[test]
fn test_static_attribute_cannot_be_redefined() {
    // Class-level set never overwrites, unlike instance fields which upsert.
    let source = r#"
    class Counter {
        public static int count = 0;
    }
    print Counter.count;
    Counter.count = 1;
    "#;
    test_runtime_error(
        source,
        "0\n",
        "Static attribute 'count' is already defined on class 'Counter'.\n[line 6]",
    );
}

#[test]
fn test_instance_fields_upsert() {
    let source = r#"
    class Box { }
    var b = new Box();
    b.value = 1;
    b.value = "one";
    print b.value;
    "#;
    test_valid_program(source, "one\n");
}

#[test]
fn test_assignment_keeps_runtime_kind() {
    let source = "var x = 1;\nx = 2;\nprint x;\nx = \"two\";";
    test_runtime_error(
        source,
        "2\n",
        "Cannot assign a value of type string to variable 'x' holding int.\n[line 4]",
    );
}

#[test]
fn test_nil_assignment_keeps_runtime_kind() {
    let source = "var x = 1;\nx = nil;\nprint x;\nx = \"s\";";
    test_runtime_error(
        source,
        "nil\n",
        "Cannot assign a value of type string to variable 'x' holding int.\n[line 4]",
    );
}

#[test]
fn test_uninitialized_binding_accepts_any_kind() {
    test_valid_program("var x; x = \"s\"; print x;", "s\n");
}

#[test]
fn test_mixed_numeric_equality() {
    // Mixed numeric pairs compare as doubles.
    let source = r#"
    print 1 == 1.0;
    print 1 != 1.0;
    print 2 == 2.5;
    print 1.5f == 1.5;
    print 1 == "1";
    print nil == nil;
    print nil == false;
    "#;
    test_valid_program(source, "true\nfalse\nfalse\ntrue\nfalse\ntrue\nfalse\n");
}

#[test]
fn test_numeric_promotion() {
    let source = r#"
    print 7 / 2;
    print 7 / 2.0;
    print 7.0 / 2;
    print 1 + 2.5;
    print 2.5 * 2;
    print 3d - 1;
    print -2.5f;
    print 10 < 10.5;
    "#;
    test_valid_program(source, "3\n3\n3.5d\n3.5d\n5d\n2d\n-2.5f\ntrue\n");
}

#[test]
fn test_string_concatenation() {
    test_valid_program("print \"foo\" + \"bar\";", "foobar\n");
    test_runtime_error(
        "print \"foo\" + 1;",
        "",
        "Unsupported operand types for '+': string and int.\n[line 1]",
    );
}

#[test]
fn test_division_by_zero() {
    test_runtime_error("print 1 / 0;", "", "Division by zero.\n[line 1]");
}

#[test]
fn test_comparison_requires_numbers() {
    test_runtime_error(
        "print \"a\" < \"b\";",
        "",
        "Operands must be numbers.\n[line 1]",
    );
}

#[test]
fn test_truthiness() {
    let source = r#"
    if (0) print "zero"; else print "no";
    if ("") print "empty"; else print "no";
    if (nil) print "nil"; else print "no";
    print !nil;
    print !0;
    "#;
    test_valid_program(source, "zero\nempty\nno\ntrue\nfalse\n");
}

#[test]
fn test_void_function_returning_value() {
    test_runtime_error(
        "print 1;\nvoid f() { return 1; }\nprint 2;",
        "1\n",
        "Void function 'f' cannot return a value.\n[line 2]",
    );
}

#[test]
fn test_missing_return() {
    test_runtime_error(
        "string name() {\n  print \"x\";\n}",
        "",
        "Function 'name' declared to return string has no return statement.\n[line 1]",
    );
}

#[test]
fn test_method_missing_return() {
    let source = "class A {\n  public int f() { }\n}";
    test_runtime_error(
        source,
        "",
        "Function 'f' declared to return int has no return statement.\n[line 2]",
    );
}

#[test]
fn test_dynamic_function_without_return() {
    test_valid_program("fun f() { print 1; }\nprint f();", "1\nnil\n");
}

#[test]
fn test_void_function_called() {
    let source = r#"
    void hello(string name) {
        print "hello " + name;
    }
    print hello("you");
    "#;
    test_valid_program(source, "hello you\nnil\n");
}

#[test]
fn test_undefined_variable() {
    test_runtime_error("print 1;\nprint y;", "1\n", "Undefined variable 'y'.\n[line 2]");
}

#[test]
fn test_undefined_property() {
    let source = "class A { }\nvar a = new A();\nprint a.missing;";
    test_runtime_error(source, "", "Undefined property 'missing'.\n[line 3]");
}

#[test]
fn test_wrong_constructor_arity() {
    let source = "class A { public constructor(a) { } }\nnew A();";
    test_runtime_error(source, "", "Expected 1 arguments but got 0.\n[line 2]");
}

#[test]
fn test_new_requires_class() {
    let source = "fun f() { }\nnew f();";
    test_runtime_error(source, "", "Can only instantiate classes.\n[line 2]");
}

#[test]
fn test_while_loop() {
    let source = r#"
    int i = 0;
    while (i < 3) {
        print i;
        i = i + 1;
    }
    "#;
    test_valid_program(source, "0\n1\n2\n");
}

#[test]
fn test_native_date_time() {
    let (output, result) = interpret("print currentDateTime();");
    result.expect("currentDateTime should run");
    assert_eq!(output.trim_end().len(), "19-10-2026 12:00:00".len());
}
