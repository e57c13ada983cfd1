//! A small prototype-based language: source is lexed, parsed, resolved,
//! compiled to a flat bytecode chunk, and run on a stack VM.

pub mod ast;
pub mod chunk;
pub mod compiler;
pub mod diagnostic;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod resolver;
pub mod vm;

use std::io::Write;

pub use chunk::Chunk;
pub use compiler::{compile, CompileError};
pub use diagnostic::Diagnostic;
pub use lexer::LexError;
pub use object::{Library, Value};
pub use parser::ParseError;
pub use vm::{Vm, VmError};

/// Any failure along the pipeline, from lexing to execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] VmError),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Lex(e) => e.code,
            Error::Parse(e) => e.code,
            Error::Compile(e) => e.code(),
            Error::Runtime(e) => e.code(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Error::Lex(e) => Diagnostic::from(e),
            Error::Parse(e) => Diagnostic::from(e),
            Error::Compile(e) => Diagnostic::from(e),
            Error::Runtime(e) => Diagnostic::from(e),
        }
    }
}

/// Lex and parse. The returned program keeps a copy of its source for diagnostics.
pub fn parse_source(source: &str) -> Result<ast::Program, Error> {
    let tokens = lexer::lex(source)?
        .into_iter()
        .map(|(token, range)| (token, ast::Span::from(range)))
        .collect();
    let mut program = parser::parse(tokens)?;
    program.source = Some(source.to_string());
    Ok(program)
}

/// Parse and compile against `lib`; run the result with a `Vm` sharing the same library.
pub fn compile_source(source: &str, lib: &Library) -> Result<Chunk, Error> {
    let program = parse_source(source)?;
    Ok(compile(&program, lib)?)
}

/// Run a complete program, sending everything it writes to `out`.
pub fn run_source(source: &str, out: &mut impl Write) -> Result<(), Error> {
    let lib = Library::new();
    let chunk = compile_source(source, &lib)?;
    Vm::new(&chunk, &lib, out).run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Result<String, Error> {
        let mut out = Vec::new();
        run_source(source, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn run_source_captures_output() {
        assert_eq!(run("write(\"a\", 1, true)").unwrap(), "a1true");
    }

    #[test]
    fn each_phase_reports_its_own_code() {
        assert_eq!(run("var a = 1 # 2").unwrap_err().code(), "B-L001");
        assert_eq!(run("write(").unwrap_err().code(), "B-P001");
        assert_eq!(run("undeclared").unwrap_err().code(), "B-R001");
        assert_eq!(run("var f = 1 f()").unwrap_err().code(), "B-V001");
    }

    #[test]
    fn diagnostics_keep_spans() {
        let err = run("var x = null\nwrite(2 + x)").unwrap_err();
        let d = err.to_diagnostic();
        assert_eq!(d.code, Some("B-V002"));
        assert_eq!(d.labels[0].span, ast::Span::new(21, 22));
    }

    #[test]
    fn parse_source_keeps_source() {
        let program = parse_source("write(1)").unwrap();
        assert_eq!(program.source.as_deref(), Some("write(1)"));
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn output_before_an_error_is_kept() {
        let mut out = Vec::new();
        let err = run_source("write(\"before\") write(-null)", &mut out).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(out, b"before");
    }
}
