//! Tests for the language subset a session runs: statements, builtins, classes,
//! closures and exception handling.

use cellbridge::{CollectOutput, ExecutionOutcome, MemoryContextHost, Session, SessionConfig, StatementBatch};
use pretty_assertions::assert_eq;

/// Runs `code` in a fresh session and returns everything it printed or echoed.
fn run_ok(code: &str) -> String {
    let output = CollectOutput::new();
    let mut session = Session::new(
        SessionConfig::default(),
        Box::new(MemoryContextHost::new()),
        Box::new(output.clone()),
    );
    match session.execute(&StatementBatch::new(code, "")) {
        ExecutionOutcome::Finished(_) => output.output(),
        ExecutionOutcome::Failed(diagnostic) => panic!("batch failed:\n{diagnostic}"),
    }
}

/// Runs `code` in a fresh session and returns the final line of its diagnostic.
fn run_err(code: &str) -> String {
    let mut session = Session::new(
        SessionConfig::default(),
        Box::new(MemoryContextHost::new()),
        Box::new(CollectOutput::new()),
    );
    match session.execute(&StatementBatch::new(code, "")) {
        ExecutionOutcome::Failed(diagnostic) => diagnostic.lines().last().unwrap_or_default().to_owned(),
        ExecutionOutcome::Finished(_) => panic!("batch unexpectedly succeeded"),
    }
}

// =============================================================================
// Values and operators
// =============================================================================

/// Arithmetic follows Python semantics for floor division, modulo and true division.
#[test]
fn arithmetic_matches_python() {
    assert_eq!(run_ok("(7 // 2, -7 // 2, -7 % 3, 7 / 2, 2 ** 10)"), "(3, -4, 2, 3.5, 1024)\n");
}

/// Overflowing 64-bit arithmetic raises instead of wrapping.
#[test]
fn integer_overflow_raises() {
    assert_eq!(run_err("2 ** 62 * 4"), "OverflowError: integer result too large for 64 bits");
}

/// Comparison chains evaluate pairwise.
#[test]
fn comparison_chains() {
    assert_eq!(run_ok("x = 5\n(1 < x <= 5, 1 < x < 3, 'a' in 'cat', 3 not in [1, 2])"), "(True, False, True, True)\n");
}

/// Boolean operators return an operand, not a bool.
#[test]
fn boolean_operators_short_circuit() {
    assert_eq!(run_ok("(0 or 'x', [] and 1, None or 0)"), "('x', [], 0)\n");
}

/// Mixing incompatible operand types is a TypeError.
#[test]
fn unsupported_operand_is_type_error() {
    assert_eq!(run_err("1 + 'a'"), "TypeError: unsupported operand type(s) for +: 'int' and 'str'");
}

/// f-strings support str, repr and ascii conversions.
#[test]
fn fstring_conversions() {
    assert_eq!(run_ok("name = 'é'\nf'{name}|{name!r}|{name!a}|{1 + 1}'"), "\"é|'é'|'\\\\xe9'|2\"\n");
}

/// Slicing works on lists, tuples, strings and ranges, including negative steps.
#[test]
fn slicing() {
    assert_eq!(
        run_ok("s = [0, 1, 2, 3, 4, 5]\n(s[1:4], s[::-2], 'hello'[1:3], (1, 2, 3)[-2:], range(10)[2:8:3])"),
        "([1, 2, 3], [5, 3, 1], 'el', (2, 3), range(2, 8, 3))\n"
    );
}

/// Slice assignment and deletion mutate lists in place.
#[test]
fn slice_assignment_and_deletion() {
    assert_eq!(run_ok("s = [0, 1, 2, 3, 4]\ns[1:3] = ['a']\ndel s[::2]\ns"), "['a', 4]\n");
}

/// Dicts keep insertion order; numeric keys that compare equal share an entry.
#[test]
fn dict_semantics() {
    assert_eq!(
        run_ok("d = {'b': 2, 'a': 1}\nd[1] = 'int'\nd[1.0] = 'float'\n(list(d.keys()), d[1], d.get('zz', 0), len(d))"),
        "(['b', 'a', 1], 'float', 0, 3)\n"
    );
}

/// A missing dict key raises KeyError naming the key.
#[test]
fn missing_key_is_key_error() {
    assert_eq!(run_err("{}['k']"), "KeyError: 'k'");
}

/// Lists cannot be dict keys.
#[test]
fn unhashable_key_is_type_error() {
    assert_eq!(run_err("{[1]: 2}"), "TypeError: unhashable type: 'list'");
}

// =============================================================================
// Statements
// =============================================================================

/// Tuple unpacking assigns element-wise, including nested targets.
#[test]
fn unpacking_assignment() {
    assert_eq!(run_ok("a, (b, c) = 1, [2, 3]\na, b = b, a\n(a, b, c)"), "(2, 1, 3)\n");
}

/// Unpacking the wrong number of values reports the counts.
#[test]
fn unpacking_count_mismatch() {
    assert_eq!(run_err("a, b = [1]"), "ValueError: not enough values to unpack (expected 2, got 1)");
    assert_eq!(run_err("a, b = [1, 2, 3]"), "ValueError: too many values to unpack (expected 2)");
}

/// Augmented assignment on a list extends it in place.
#[test]
fn augmented_assignment_on_list_is_in_place() {
    assert_eq!(run_ok("a = [1]\nb = a\nb += [2]\na"), "[1, 2]\n");
}

/// The else clause of a loop runs only when the loop did not break.
#[test]
fn loop_else_clauses() {
    let code = "found = []
for n in range(2, 10):
    for d in range(2, n):
        if n % d == 0:
            break
    else:
        found.append(n)
i = 0
while i < 3:
    i += 1
else:
    found.append('done')
found";
    assert_eq!(run_ok(code), "[2, 3, 5, 7, 'done']\n");
}

/// continue skips to the next iteration.
#[test]
fn continue_skips_iteration() {
    assert_eq!(
        run_ok("out = []\nfor i in range(5):\n    if i % 2:\n        continue\n    out.append(i)\nout"),
        "[0, 2, 4]\n"
    );
}

/// del unbinds names; reading them afterwards is a NameError.
#[test]
fn del_unbinds_names() {
    assert_eq!(run_err("x = 1\ndel x\nx"), "NameError: name 'x' is not defined");
}

/// A failed assert carries its message.
#[test]
fn assert_message() {
    assert_eq!(run_err("assert 1 == 2, 'math is broken'"), "AssertionError: math is broken");
}

// =============================================================================
// Functions and closures
// =============================================================================

/// Defaults, keyword arguments, *args and **kwargs bind like Python.
#[test]
fn argument_binding() {
    let code = "def f(a, b=2, *rest, **named):
    return (a, b, rest, named)
(f(1), f(1, 3, 4, 5), f(b=7, a=0, extra='x'))";
    assert_eq!(
        run_ok(code),
        "((1, 2, (), {}), (1, 3, (4, 5), {}), (0, 7, (), {'extra': 'x'}))\n"
    );
}

/// Calls can unpack sequences and dicts into arguments.
#[test]
fn call_site_unpacking() {
    assert_eq!(run_ok("def f(a, b, c):\n    return a + b + c\nf(*[1, 2], **{'c': 3})"), "6\n");
}

/// Missing arguments are reported by name.
#[test]
fn missing_arguments_are_named() {
    assert_eq!(
        run_err("def f(a, b):\n    pass\nf()"),
        "TypeError: f() missing 2 required positional arguments: 'a' and 'b'"
    );
}

/// Too many positional arguments are rejected.
#[test]
fn too_many_arguments() {
    assert_eq!(
        run_err("def f(a):\n    pass\nf(1, 2)"),
        "TypeError: f() takes 1 positional argument but 2 were given"
    );
}

/// Lambdas capture the scope of the function that created them.
#[test]
fn closures_capture_enclosing_scope() {
    assert_eq!(
        run_ok("def make_adder(n):\n    return lambda x: x + n\nadd3 = make_adder(3)\nadd3(4)"),
        "7\n"
    );
}

/// Nested functions can call themselves through the enclosing scope.
#[test]
fn nested_function_recursion() {
    let code = "def outer():
    def fact(n):
        return 1 if n <= 1 else n * fact(n - 1)
    return fact(5)
outer()";
    assert_eq!(run_ok(code), "120\n");
}

/// Reading a local before its assignment is an UnboundLocalError, not a global read.
#[test]
fn unbound_local() {
    assert_eq!(
        run_err("x = 1\ndef f():\n    y = x\n    x = 2\nf()"),
        "UnboundLocalError: cannot access local variable 'x' where it is not associated with a value"
    );
}

/// `global` declarations make assignments rebind module names.
#[test]
fn global_declaration() {
    assert_eq!(
        run_ok("counter = 0\ndef inc():\n    global counter\n    counter += 1\ninc()\ninc()\ncounter"),
        "2\n"
    );
}

/// List comprehensions support nested clauses and filters without leaking variables.
#[test]
fn list_comprehensions() {
    assert_eq!(
        run_ok("pairs = [(i, j) for i in range(3) for j in range(i) if j != 1]\n(pairs, 'j' in dir())"),
        "([(1, 0), (2, 0)], False)\n"
    );
}

// =============================================================================
// Builtins
// =============================================================================

/// Sorting, aggregation and iteration helpers.
#[test]
fn iteration_builtins() {
    let code = "words = ['pear', 'fig', 'apple']
(sorted(words), sorted(words, key=len, reverse=True), min(3, 1, 2), max(words, key=len), sum(range(5)))";
    assert_eq!(
        run_ok(code),
        "(['apple', 'fig', 'pear'], ['apple', 'pear', 'fig'], 1, 'apple', 10)\n"
    );
    assert_eq!(
        run_ok("(list(enumerate('ab', 1)), list(zip([1, 2, 3], 'xy')))"),
        "([(1, 'a'), (2, 'b')], [(1, 'x'), (2, 'y')])\n"
    );
}

/// Type constructors convert between builtin types.
#[test]
fn type_constructors() {
    assert_eq!(
        run_ok("(int('12'), int(3.9), float('2.5'), str(10), bool([]), list('ab'), tuple([1]), dict(a=1))"),
        "(12, 3, 2.5, '10', False, ['a', 'b'], (1,), {'a': 1})\n"
    );
    assert_eq!(run_ok("(type(1), type('s') is str, isinstance(True, int))"), "(<class 'int'>, True, True)\n");
}

/// Invalid literals for int() are a ValueError.
#[test]
fn int_of_bad_string() {
    assert!(run_err("int('abc')").starts_with("ValueError: invalid literal for int()"));
}

/// String methods used in interactive code.
#[test]
fn string_methods() {
    assert_eq!(
        run_ok("s = '  Hello, World  '\n(s.strip().lower(), s.split(','), '-'.join(['a', 'b']), s.count('l'))"),
        "('hello, world', ['  Hello', ' World  '], 'a-b', 3)\n"
    );
}

/// getattr, hasattr and dir work on builtin values.
#[test]
fn attribute_builtins() {
    assert_eq!(
        run_ok("(hasattr([], 'append'), hasattr(1, 'nope'), getattr(1, 'nope', 'default'), 'append' in dir([]))"),
        "(True, False, 'default', True)\n"
    );
}

// =============================================================================
// Classes
// =============================================================================

/// Instances carry state set in __init__ and mutated through methods.
#[test]
fn class_with_methods() {
    let code = "class Counter:
    step = 1
    def __init__(self, start):
        self.count = start
    def bump(self):
        self.count += self.step
        return self.count
c = Counter(5)
c.bump()
c.bump()";
    assert_eq!(run_ok(code), "7\n");
}

/// User __repr__ and __str__ are used by repr(), print() and the interactive echo.
#[test]
fn user_repr_and_str() {
    let code = "class P:
    def __repr__(self):
        return 'P()'
    def __str__(self):
        return 'a P'
p = P()
print(p)
[p]";
    assert_eq!(run_ok(code), "a P\n[P()]\n");
}

/// Classes without __init__ reject constructor arguments.
#[test]
fn class_without_init_takes_no_arguments() {
    assert_eq!(run_err("class E:\n    pass\nE(1)"), "TypeError: E() takes no arguments");
}

/// Missing attributes are AttributeErrors naming the class.
#[test]
fn missing_attribute() {
    assert_eq!(
        run_err("class C:\n    pass\nC().missing"),
        "AttributeError: 'C' object has no attribute 'missing'"
    );
}

/// Dunder hooks make instances subscriptable, sized and callable.
#[test]
fn dunder_hooks() {
    let code = "class Box:
    def __init__(self):
        self.items = {}
    def __getitem__(self, key):
        return self.items[key]
    def __setitem__(self, key, value):
        self.items[key] = value
    def __len__(self):
        return len(self.items)
    def __call__(self, x):
        return x * 2
b = Box()
b['k'] = 'v'
(b['k'], len(b), b(21))";
    assert_eq!(run_ok(code), "('v', 1, 42)\n");
}

// =============================================================================
// Exceptions
// =============================================================================

/// Handlers match subclasses, bind the exception and run finally blocks.
#[test]
fn try_except_finally() {
    let code = "log = []
try:
    [][1]
except LookupError as e:
    log.append(str(e))
else:
    log.append('else')
finally:
    log.append('finally')
log";
    assert_eq!(run_ok(code), "['list index out of range', 'finally']\n");
}

/// The else clause runs when the body raises nothing.
#[test]
fn try_else_runs_without_exception() {
    assert_eq!(
        run_ok("try:\n    x = 1\nexcept ValueError:\n    x = 2\nelse:\n    x = 3\nx"),
        "3\n"
    );
}

/// Handlers can name a tuple of exception types.
#[test]
fn tuple_of_handlers() {
    assert_eq!(
        run_ok("try:\n    1 / 0\nexcept (KeyError, ZeroDivisionError) as e:\n    r = repr(e)\nr"),
        "\"ZeroDivisionError('division by zero')\"\n"
    );
}

/// A bare raise re-raises the exception being handled.
#[test]
fn bare_raise_reraises() {
    assert_eq!(
        run_err("try:\n    int('x')\nexcept ValueError:\n    raise"),
        "ValueError: invalid literal for int() with base 10: 'x'"
    );
}

/// Non-matching handlers let the exception propagate after finally runs.
#[test]
fn unmatched_exception_propagates_after_finally() {
    let output = CollectOutput::new();
    let mut session = Session::new(
        SessionConfig::default(),
        Box::new(MemoryContextHost::new()),
        Box::new(output.clone()),
    );
    let outcome = session.execute(&StatementBatch::new(
        "try:\n    {}['x']\nexcept ValueError:\n    pass\nfinally:\n    print('cleanup')",
        "",
    ));
    assert!(outcome.is_error());
    assert_eq!(output.output(), "cleanup\n");
}

/// Raising a non-exception is a TypeError.
#[test]
fn raise_requires_exception() {
    assert_eq!(run_err("raise 5"), "TypeError: exceptions must derive from BaseException");
}

/// Exception args are exposed.
#[test]
fn exception_args() {
    assert_eq!(run_ok("e = KeyError('k')\n(e.args, type(e))"), "(('k',), <class 'KeyError'>)\n");
}
