use crate::chunk::{Chunk, OpCode};
use crate::value::{as_function_object, print_value};

#[allow(dead_code)]
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

#[allow(dead_code)]
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);
    if offset > 0
        && chunk.read_line_from_offset(offset) == chunk.read_line_from_offset(offset - 1)
    {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.read_line_from_offset(offset).unwrap_or(0));
    }

    let byte = chunk.byte_at(offset);
    let instruction = match OpCode::from_byte(byte) {
        Some(instruction) => instruction,
        None => {
            println!("Unknown opcode {}", byte);
            return offset + 1;
        }
    };
    let name = instruction.to_string();

    match instruction {
        OpCode::Constant
        | OpCode::DefineGlobal
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::Class => constant_instruction(&name, chunk, offset),

        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => byte_instruction(&name, chunk, offset),

        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
            jump_instruction(&name, 1, chunk, offset)
        }
        OpCode::Loop => jump_instruction(&name, -1, chunk, offset),

        OpCode::Closure => closure_instruction(&name, chunk, offset),

        OpCode::Nil
        | OpCode::True
        | OpCode::False
        | OpCode::Pop
        | OpCode::Equal
        | OpCode::Greater
        | OpCode::Less
        | OpCode::Add
        | OpCode::Subtract
        | OpCode::Multiply
        | OpCode::Divide
        | OpCode::Not
        | OpCode::Negate
        | OpCode::Print
        | OpCode::CloseUpvalue
        | OpCode::Return => simple_instruction(&name, offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.byte_at(offset + 1);
    print!("{:<16} {:>4} '", name, constant);
    print_value(chunk.get_constant(constant as usize));
    println!("'");
    offset + 2
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.byte_at(offset + 1);
    println!("{:<16} {:>4}", name, slot);
    offset + 2
}

fn jump_instruction(name: &str, sign: isize, chunk: &Chunk, offset: usize) -> usize {
    let mut jump_offset = (chunk.byte_at(offset + 1) as u16) << 8;
    jump_offset |= chunk.byte_at(offset + 2) as u16;

    let target = (offset as isize + 3 + sign * jump_offset as isize) as usize;
    println!("{:<16} {:>4} -> {}", name, offset, target);
    offset + 3
}

fn closure_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let mut offset = offset + 1;
    let constant = chunk.byte_at(offset);
    offset += 1;
    print!("{:<16} {:>4} ", name, constant);
    print_value(chunk.get_constant(constant as usize));
    println!();

    // The (is_local, index) pairs emitted after the opcode are operands of
    // Closure, not instructions of their own.
    let function = as_function_object(chunk.get_constant(constant as usize));
    for _ in 0..unsafe { (*function).upvalue_count } {
        let is_local = chunk.byte_at(offset);
        let index = chunk.byte_at(offset + 1);
        println!(
            "{:04}      |                     {} {}",
            offset,
            if is_local == 1 { "local" } else { "upvalue" },
            index
        );
        offset += 2;
    }
    offset
}
