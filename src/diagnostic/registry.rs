/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    /// One-line description.
    pub short: &'static str,
    /// Full explanation printed by `--explain`.
    pub long: &'static str,
}

/// Every stable error code the toolchain can emit.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "B-L001",
        short: "unexpected character",
        long: r#"## B-L001: unexpected character

A character was found that does not start any token.

**Example:**

    var a = 1 & 2

There is no single `&` operator. Logical and is written `&&`,
logical or is written `||`.
"#,
    },
    ErrorEntry {
        code: "B-L002",
        short: "malformed string literal",
        long: r#"## B-L002: malformed string literal

A string literal was not closed, or contains an escape sequence that
is not recognised.

**Example:**

    write("unterminated)

Strings are written between double quotes. The supported escapes are
`\n`, `\t`, `\r`, `\0`, `\"` and `\\`.
"#,
    },
    // ── Parser ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "B-P001",
        short: "expected an expression",
        long: r#"## B-P001: expected an expression

The parser needed the start of an expression (a literal, a name,
`fn`, `if`, `while`, `var`, `write`, `self`, `(`, `{`, or a prefix
operator) but found something else.

**Example:**

    write(1, , 2)
"#,
    },
    ErrorEntry {
        code: "B-P002",
        short: "expected a specific token",
        long: r#"## B-P002: expected a specific token

A construct was left incomplete: a missing closing bracket, a
missing `:` in an object literal, or a missing name after `var`,
`fn` or `.`.

**Example:**

    while x < 3 { x = x + 1

The block is never closed with `}`.
"#,
    },
    ErrorEntry {
        code: "B-P003",
        short: "invalid assignment target",
        long: r#"## B-P003: invalid assignment target

Only a variable, a property (`obj.name`) or an index (`obj[key]`)
can appear on the left of `=`.

**Example:**

    1 = 2
    f() = 3
"#,
    },
    // ── Resolver ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "B-R001",
        short: "undeclared variable",
        long: r#"## B-R001: undeclared variable

A name was used or assigned without a visible `var` declaration.

At top level a name must be declared before it is used. Function
bodies are checked after the whole program has been read, so they
may refer to any global, wherever it is declared. A function never
sees the locals of the function it was written inside.

**Example:**

    write(count)
    var count = 0

**Fix:** declare `count` before the `write`.
"#,
    },
    ErrorEntry {
        code: "B-R002",
        short: "name declared twice in one scope",
        long: r#"## B-R002: name declared twice in one scope

The same name was declared twice in one block, or a function has two
parameters with the same name.

**Example:**

    var a = 1
    var a = 2

An inner block may declare a name that shadows an outer one:

    var a = 1
    { var a = 2 }
"#,
    },
    // ── Compiler ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "B-C001",
        short: "internal compiler error",
        long: r#"## B-C001: internal compiler error

Linking found a jump to a label that was never placed, a function
with no entry offset, or an undecodable instruction word. This is a
bug in the compiler, not in the program being compiled.
"#,
    },
    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "B-V001",
        short: "value is not callable",
        long: r#"## B-V001: value is not callable

A call was made on something that is not a function.

**Example:**

    var x = 3
    x()

Reading a missing property yields `null`, so a misspelt method name
usually shows up as this error:

    var o = { go: fn() { 1 } }
    o.og()
"#,
    },
    ErrorEntry {
        code: "B-V002",
        short: "arithmetic or comparison on a non-number",
        long: r#"## B-V002: arithmetic or comparison on a non-number

`+ - * / %`, unary `-` and `< <= > >=` only accept numbers. There is no
implicit conversion, and `+` does not concatenate strings.

**Example:**

    var x = null
    write(2 + x)

Division and remainder by zero are not errors; they follow IEEE-754
and produce infinities or NaN.
"#,
    },
    ErrorEntry {
        code: "B-V003",
        short: "self outside a method call",
        long: r#"## B-V003: self outside a method call

`self` is bound only when a function is called through a property,
as in `obj.method()` or `obj["method"]()`. A plain call `f()` has no
receiver.

**Example:**

    fn f() { self }
    f()
"#,
    },
    ErrorEntry {
        code: "B-V004",
        short: "property set on a primitive",
        long: r#"## B-V004: property set on a primitive

Only objects and functions have their own property tables. Numbers,
strings, booleans and null cannot be given properties.

**Example:**

    var n = 1
    n.x = 2

To share behaviour across all numbers, add it to the `Number`
prototype instead: `Number.double = fn() { self * 2 }`.
"#,
    },
    ErrorEntry {
        code: "B-V005",
        short: "beget from a primitive",
        long: r#"## B-V005: beget from a primitive

`beget p` creates an object whose prototype is `p`, so `p` must be an
object or a function.

**Example:**

    var o = beget 3
"#,
    },
    ErrorEntry {
        code: "B-V006",
        short: "output failed",
        long: r#"## B-V006: output failed

Writing program output failed, for example because stdout was closed.
"#,
    },
    ErrorEntry {
        code: "B-V007",
        short: "internal VM error",
        long: r#"## B-V007: internal VM error

The virtual machine hit an impossible state: a stack underflow, a bad
operand, an undecodable instruction, or a return with no caller. This
indicates a compiler bug, not a user error.
"#,
    },
];

/// Look up an error entry by code (e.g. `"B-R001"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}
