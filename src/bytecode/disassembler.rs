//! Bytecode disassembler for debugging and the `--disassemble` CLI flag.

use std::fmt::Write;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_operands, OpCode};
use crate::bytecode::value::Value;

/// Render an instruction stream as one `NNNN Name op1 op2` line per
/// instruction. An undefined opcode byte renders an ERROR line and ends
/// the listing, since the stream cannot be decoded past it.
pub fn disassemble(instructions: &[u8]) -> String {
    let mut output = String::new();
    let mut offset = 0;

    while offset < instructions.len() {
        let byte = instructions[offset];
        let Some(op) = OpCode::from_u8(byte) else {
            writeln!(output, "ERROR: opcode {} not defined", byte).unwrap();
            break;
        };

        let def = op.definition();
        let (operands, read) = read_operands(&def, &instructions[offset + 1..]);

        write!(output, "{:04} {}", offset, def.name).unwrap();
        for operand in &operands {
            write!(output, " {}", operand).unwrap();
        }
        writeln!(output).unwrap();

        offset += 1 + read;
    }

    output
}

/// Render a whole module: the main instruction stream followed by the
/// stream of every compiled function in the constant pool.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    writeln!(output, "== main ==").unwrap();
    output.push_str(&disassemble(&bytecode.instructions));

    for (index, constant) in bytecode.constants.iter().enumerate() {
        if let Value::CompiledFunction(function) = constant {
            writeln!(output, "\n== fn ({}) ==", index).unwrap();
            output.push_str(&disassemble(&function.instructions));
        }
    }

    output
}
