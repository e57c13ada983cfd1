use crate::chunk::{Chunk, Op};

use super::function_table::FunctionTable;
use super::labels::{Label, LabelTable};
use super::CompileError;

/// Rewrite every jump operand from a label number to the label's offset and
/// every `Fn` operand from a function-table index to the body's entry offset.
pub fn link(mut chunk: Chunk, labels: &LabelTable, functions: &FunctionTable) -> Result<Chunk, CompileError> {
    let mut offset = 0;
    let mut patched = 0usize;
    while offset < chunk.len() {
        let Some(instr) = chunk.instr(offset) else {
            return Err(CompileError::BadOpcode { word: chunk.code[offset], offset });
        };
        match (instr.op, instr.operand) {
            (Op::Fn, Some(index)) => {
                let entry = functions
                    .offset(index as usize)
                    .ok_or(CompileError::UnlinkedFunction { index, offset })?;
                chunk.patch_operand(offset, entry as u32);
                patched += 1;
            }
            (op, Some(label)) if op.is_jump() => {
                let target = labels
                    .offset(Label(label))
                    .ok_or(CompileError::UnsetLabel { label, offset })?;
                chunk.patch_operand(offset, target as u32);
                patched += 1;
            }
            _ => {}
        }
        offset += instr.op.width();
    }
    tracing::trace!(patched, "linked chunk");
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;

    fn empty_program() -> Program {
        Program { body: vec![], source: None }
    }

    #[test]
    fn jumps_get_label_offsets() {
        let program = empty_program();
        let functions = FunctionTable::build(&program);
        let mut labels = LabelTable::new();
        let l = labels.new_label();

        let mut chunk = Chunk::new();
        chunk.emit_with(Op::Jump, l.0);
        chunk.emit(Op::Null);
        labels.set(l, chunk.len());
        chunk.emit(Op::Halt);

        let chunk = link(chunk, &labels, &functions).unwrap();
        assert_eq!(chunk.code[1], 3);
    }

    #[test]
    fn unset_label_is_reported() {
        let program = empty_program();
        let functions = FunctionTable::build(&program);
        let mut labels = LabelTable::new();
        let l = labels.new_label();

        let mut chunk = Chunk::new();
        chunk.emit(Op::True);
        chunk.emit_with(Op::JumpFalsy, l.0);

        let err = link(chunk, &labels, &functions).unwrap_err();
        assert!(matches!(err, CompileError::UnsetLabel { label: 0, offset: 1 }));
    }

    #[test]
    fn unlinked_function_is_reported() {
        let program = empty_program();
        let functions = FunctionTable::build(&program);
        let mut chunk = Chunk::new();
        chunk.emit_with(Op::Fn, 0);
        let err = link(chunk, &LabelTable::new(), &functions).unwrap_err();
        assert!(matches!(err, CompileError::UnlinkedFunction { index: 0, offset: 0 }));
    }

    #[test]
    fn const_operands_untouched() {
        let program = empty_program();
        let functions = FunctionTable::build(&program);
        let mut chunk = Chunk::new();
        chunk.emit_with(Op::Const, 5);
        let chunk = link(chunk, &LabelTable::new(), &functions).unwrap();
        assert_eq!(chunk.code, vec![Op::Const as u32, 5]);
    }

    #[test]
    fn garbage_word_is_reported() {
        let program = empty_program();
        let functions = FunctionTable::build(&program);
        let mut chunk = Chunk::new();
        chunk.code.push(999);
        let err = link(chunk, &LabelTable::new(), &functions).unwrap_err();
        assert!(matches!(err, CompileError::BadOpcode { word: 999, offset: 0 }));
    }
}
