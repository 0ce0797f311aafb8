use crate::{
    call_frame::CallFrame,
    chunk::OpCode,
    compiler::Parser,
    constants::{GC_FIRST_TRIGGER_BYTES, GC_HEAP_GROW_FACTOR, MAX_FRAME_COUNT, MAX_STACK_SIZE},
    gc::GarbageCollector,
    objects::{
        object::{NativeObject, Object, ObjectType},
        object_class::ObjectClass,
        object_closure::ObjectClosure,
        object_function::ObjectFunction,
        object_manager::ObjectManager,
        object_string::ObjectString,
        object_upvalue::ObjectUpvalue,
    },
    std_mod::time::ClockTime,
    table::Table,
    value::{
        as_bool, as_closure_object, as_function_object, as_instance_object, as_number, as_object,
        as_string_object, is_bool, is_instance, is_nil, is_number, is_object, is_string,
        make_bool_value, make_function_value, make_nil_value, make_number_value, make_object_value,
        make_string_value, print_value, Value,
    },
};

#[derive(Debug, PartialEq, Eq)]
pub enum InterpretResult {
    InterpretOk,
    InterpretCompileError,
    InterpretRuntimeError,
}

/// One interpreter instance: value stack, frame stack, globals, intern set,
/// heap and collector. Boxed so the stack array's address stays put — open
/// upvalues hold raw pointers into it.
pub struct VM {
    stack: [Value; MAX_STACK_SIZE],
    stack_top_pos: usize,
    frames: Vec<CallFrame>,
    globals: Table,
    intern_strings: Table,
    object_manager: ObjectManager,
    gc: GarbageCollector,
    /// Sorted by descending stack slot address; scanning stops at the first
    /// entry below the slot being looked up.
    open_upvalues: Vec<*mut ObjectUpvalue>,
    next_gc: usize,
}

impl VM {
    pub fn new() -> Box<VM> {
        let mut vm = Box::new(VM {
            stack: [make_nil_value(); MAX_STACK_SIZE],
            stack_top_pos: 0,
            frames: Vec::with_capacity(MAX_FRAME_COUNT),
            globals: Table::new(),
            intern_strings: Table::new(),
            object_manager: ObjectManager::new(),
            gc: GarbageCollector::new(),
            open_upvalues: vec![],
            next_gc: GC_FIRST_TRIGGER_BYTES,
        });
        vm.define_native("clock", 0, ClockTime::new());
        vm
    }

    /// Compile and run a toplevel script.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = {
            let mut parser = Parser::new(&mut self.object_manager, &mut self.intern_strings);
            parser.compile(source)
        };
        let function = match function {
            Some(function) => function,
            None => return InterpretResult::InterpretCompileError,
        };

        // Root the function across the closure allocation.
        self.push(make_function_value(function));
        let closure = self.allocate_closure(function);
        self.pop();
        self.push(make_object_value(closure as *mut Object));
        if !self.call(closure, 0) {
            return InterpretResult::InterpretRuntimeError;
        }

        self.run()
    }

    /// Register a host function under `name` in the globals table.
    pub fn define_native(
        &mut self,
        name: &str,
        arity: u8,
        native_object: impl NativeObject + 'static,
    ) {
        let name_value =
            make_string_value(&mut self.object_manager, &mut self.intern_strings, name);
        // Both objects go on the stack until the table holds them.
        self.push(name_value);
        let (native, _) =
            self.object_manager
                .alloc_native_function(name.to_string(), arity, native_object);
        self.push(make_object_value(native as *mut Object));
        self.globals
            .set(as_string_object(&name_value), self.peek(0));
        self.pop();
        self.pop();
    }

    fn push(&mut self, value: Value) {
        debug_assert!(self.stack_top_pos < MAX_STACK_SIZE, "value stack overflow");
        self.stack[self.stack_top_pos] = value;
        self.stack_top_pos += 1;
    }

    fn pop(&mut self) -> Value {
        debug_assert!(self.stack_top_pos > 0, "value stack underflow");
        self.stack_top_pos -= 1;
        self.stack[self.stack_top_pos]
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack_top_pos - distance - 1]
    }

    fn is_falsey(value: &Value) -> bool {
        is_nil(value) || (is_bool(value) && !as_bool(value))
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("No call frame.")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("No call frame.")
    }

    fn current_closure(&self) -> *mut ObjectClosure {
        self.current_frame().closure
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("No call frame.");
        let byte = unsafe { (*(*frame.closure).function).chunk.byte_at(frame.ip) };
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.current_frame();
        unsafe { *(*(*frame.closure).function).chunk.get_constant(index) }
    }

    fn read_string_constant(&mut self) -> *mut ObjectString {
        as_string_object(&self.read_constant())
    }

    fn run(&mut self) -> InterpretResult {
        loop {
            debug_feature::trace_execution(self);

            let instruction = match OpCode::from_byte(self.read_byte()) {
                Some(instruction) => instruction,
                None => {
                    self.runtime_error("Unknown opcode.");
                    return InterpretResult::InterpretRuntimeError;
                }
            };

            match instruction {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::Nil => self.push(make_nil_value()),
                OpCode::True => self.push(make_bool_value(true)),
                OpCode::False => self.push(make_bool_value(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base_offset;
                    let value = self.stack[base + slot];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base_offset;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string_constant();
                    match self.globals.get(name) {
                        Some(value) => self.push(value),
                        None => {
                            let message =
                                format!("Undefined variable '{}'.", unsafe { &(*name).content });
                            self.runtime_error(&message);
                            return InterpretResult::InterpretRuntimeError;
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    // Assignment never creates a global; undo the insert the
                    // probe just made and report.
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        let message =
                            format!("Undefined variable '{}'.", unsafe { &(*name).content });
                        self.runtime_error(&message);
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let value = unsafe {
                        let upvalue = (&(*self.current_closure()).upvalues)[slot];
                        *(*upvalue).location
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let value = self.peek(0);
                    unsafe {
                        let upvalue = (&(*self.current_closure()).upvalues)[slot];
                        *(*upvalue).location = value;
                    }
                }
                OpCode::GetProperty => {
                    let name = self.read_string_constant();
                    if !is_instance(&self.peek(0)) {
                        self.runtime_error("Only instances have properties.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                    let instance = as_instance_object(&self.peek(0));
                    match unsafe { (*instance).fields.get(name) } {
                        Some(value) => {
                            self.pop();
                            self.push(value);
                        }
                        None => {
                            let message =
                                format!("Undefined property '{}'.", unsafe { &(*name).content });
                            self.runtime_error(&message);
                            return InterpretResult::InterpretRuntimeError;
                        }
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string_constant();
                    if !is_instance(&self.peek(1)) {
                        self.runtime_error("Only instances have fields.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                    let instance = as_instance_object(&self.peek(1));
                    unsafe {
                        (*instance).fields.set(name, self.peek(0));
                    }
                    // Leave the assigned value as the expression result.
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(make_bool_value(a == b));
                }
                OpCode::Greater
                | OpCode::Less
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide => {
                    if !self.binary_number_op(instruction) {
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Add => {
                    if is_string(&self.peek(0)) && is_string(&self.peek(1)) {
                        self.concatenate();
                    } else if is_number(&self.peek(0)) && is_number(&self.peek(1)) {
                        let value_b = as_number(&self.pop());
                        let value_a = as_number(&self.pop());
                        self.push(make_number_value(value_a + value_b));
                    } else {
                        self.runtime_error("Operands must be two numbers or two strings.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(make_bool_value(Self::is_falsey(&value)));
                }
                OpCode::Negate => {
                    if !is_number(&self.peek(0)) {
                        self.runtime_error("Operand must be a number.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                    let value = self.pop();
                    self.push(make_number_value(-as_number(&value)));
                }
                OpCode::Print => {
                    let value = self.pop();
                    print_value(&value);
                    println!();
                }
                OpCode::Jump => {
                    let offset = self.read_short() as usize;
                    self.current_frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if Self::is_falsey(&self.peek(0)) {
                        self.current_frame_mut().ip += offset;
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = self.read_short() as usize;
                    if !Self::is_falsey(&self.peek(0)) {
                        self.current_frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    self.current_frame_mut().ip -= offset;
                }
                OpCode::Call => {
                    let argument_count = self.read_byte() as usize;
                    if !self.call_value(self.peek(argument_count), argument_count) {
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Closure => {
                    let function = as_function_object(&self.read_constant());
                    let closure = self.allocate_closure(function);
                    // The closure goes on the stack before its upvalues are
                    // captured so a collection during capture sees it.
                    self.push(make_object_value(closure as *mut Object));
                    let upvalue_count = unsafe { (*function).upvalue_count };
                    for i in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let base = self.current_frame().stack_base_offset;
                            self.capture_upvalue(base + index)
                        } else {
                            unsafe { (&(*self.current_closure()).upvalues)[index] }
                        };
                        unsafe {
                            (&mut (*closure).upvalues)[i] = upvalue;
                        }
                    }
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack_top_pos - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("No call frame.");
                    self.close_upvalues(frame.stack_base_offset);
                    if self.frames.is_empty() {
                        // The popped frame was the toplevel script.
                        self.pop();
                        return InterpretResult::InterpretOk;
                    }
                    self.stack_top_pos = frame.stack_base_offset;
                    self.push(result);
                }
                OpCode::Class => {
                    let name = self.read_string_constant();
                    self.maybe_collect();
                    let (class, _) = self.object_manager.alloc_class(name);
                    self.push(make_object_value(class as *mut Object));
                }
            }
        }
    }

    fn binary_number_op(&mut self, op_code: OpCode) -> bool {
        if !is_number(&self.peek(0)) || !is_number(&self.peek(1)) {
            self.runtime_error("Operands must be numbers.");
            return false;
        }

        let value_b = as_number(&self.pop());
        let value_a = as_number(&self.pop());
        match op_code {
            OpCode::Greater => self.push(make_bool_value(value_a > value_b)),
            OpCode::Less => self.push(make_bool_value(value_a < value_b)),
            OpCode::Subtract => self.push(make_number_value(value_a - value_b)),
            OpCode::Multiply => self.push(make_number_value(value_a * value_b)),
            OpCode::Divide => self.push(make_number_value(value_a / value_b)),
            _ => unreachable!("Unexpected binary operator: {}", op_code),
        }
        true
    }

    /// Both operands stay on the stack until the result exists, so a
    /// collection triggered by the allocation cannot reclaim them.
    fn concatenate(&mut self) {
        let value_b = self.peek(0);
        let value_a = self.peek(1);
        let combined = unsafe {
            let string_a = &(*as_string_object(&value_a)).content;
            let string_b = &(*as_string_object(&value_b)).content;
            let mut combined = String::with_capacity(string_a.len() + string_b.len());
            combined.push_str(string_a);
            combined.push_str(string_b);
            combined
        };

        self.maybe_collect();
        let value = make_string_value(
            &mut self.object_manager,
            &mut self.intern_strings,
            &combined,
        );
        self.pop();
        self.pop();
        self.push(value);
    }

    fn call_value(&mut self, callee: Value, argument_count: usize) -> bool {
        if is_object(&callee) {
            let object = as_object(&callee);
            match unsafe { (*object).obj_type } {
                ObjectType::ObjClosure => {
                    return self.call(as_closure_object(&callee), argument_count);
                }
                ObjectType::ObjNativeFunction => {
                    let native = unsafe { (*object).as_native_function() };
                    let args_start = self.stack_top_pos - argument_count;
                    let result = native.invoke(&self.stack[args_start..self.stack_top_pos]);
                    match result {
                        Ok(value) => {
                            // Native calls leave no frame behind; the callee
                            // and arguments collapse into the result.
                            self.stack_top_pos -= argument_count + 1;
                            self.push(value);
                            return true;
                        }
                        Err(message) => {
                            self.runtime_error(&message);
                            return false;
                        }
                    }
                }
                ObjectType::ObjClass => {
                    if argument_count != 0 {
                        let message = format!("Expected 0 arguments but got {}.", argument_count);
                        self.runtime_error(&message);
                        return false;
                    }
                    self.maybe_collect();
                    let (instance, _) = self.object_manager.alloc_instance(object as *mut ObjectClass);
                    let slot = self.stack_top_pos - 1;
                    self.stack[slot] = make_object_value(instance as *mut Object);
                    return true;
                }
                _ => {}
            }
        }

        self.runtime_error("Can only call functions and classes.");
        false
    }

    fn call(&mut self, closure: *mut ObjectClosure, argument_count: usize) -> bool {
        let arity = unsafe { (*(*closure).function).arity } as usize;
        if argument_count != arity {
            let message = format!(
                "Expected {} arguments but got {}.",
                arity, argument_count
            );
            self.runtime_error(&message);
            return false;
        }

        if self.frames.len() == MAX_FRAME_COUNT {
            self.runtime_error("Stack overflow.");
            return false;
        }

        self.frames.push(CallFrame::new(
            closure,
            self.stack_top_pos - argument_count - 1,
        ));
        true
    }

    /// Reuse the open upvalue for a slot if one exists, keeping the list
    /// sorted by descending slot address.
    fn capture_upvalue(&mut self, slot: usize) -> *mut ObjectUpvalue {
        let local = &mut self.stack[slot] as *mut Value;
        let mut insert_at = self.open_upvalues.len();
        for (index, &upvalue) in self.open_upvalues.iter().enumerate() {
            let location = unsafe { (*upvalue).location };
            if location == local {
                return upvalue;
            }
            if (location as usize) < (local as usize) {
                insert_at = index;
                break;
            }
        }

        self.maybe_collect();
        let (created, _) = self.object_manager.alloc_upvalue(local);
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// Close every open upvalue at or above the given slot.
    fn close_upvalues(&mut self, from_slot: usize) {
        let boundary = &mut self.stack[from_slot] as *mut Value;
        loop {
            match self.open_upvalues.first() {
                Some(&upvalue)
                    if unsafe { (*upvalue).location as usize } >= boundary as usize =>
                {
                    unsafe {
                        (*upvalue).close();
                    }
                    self.open_upvalues.remove(0);
                }
                _ => break,
            }
        }
    }

    fn maybe_collect(&mut self) {
        if cfg!(feature = "gc_stress") || self.object_manager.bytes_allocated() > self.next_gc {
            self.collect_garbage();
        }
    }

    fn allocate_closure(&mut self, function: *mut ObjectFunction) -> *mut ObjectClosure {
        self.maybe_collect();
        self.object_manager.alloc_closure(function).0
    }

    /// One full mark-sweep cycle. Runs only from allocation safe-points, so
    /// every live value is reachable from the roots marked here.
    pub(crate) fn collect_garbage(&mut self) {
        let before = self.object_manager.bytes_allocated();
        self.gc.prepare_collection(&self.object_manager);
        self.gc.mark_roots(
            &self.stack,
            self.stack_top_pos,
            &self.globals,
            &self.frames,
            &self.open_upvalues,
        );
        self.gc.trace_references();
        self.gc.remove_white_keys(&mut self.intern_strings);
        let freed = self.gc.sweep(&mut self.object_manager);
        let after = self.object_manager.bytes_allocated();
        self.next_gc = after * GC_HEAP_GROW_FACTOR;
        self.gc.record_cycle(before, freed, after, self.next_gc);
    }

    fn runtime_error(&mut self, message: &str) {
        eprintln!("{}", message);

        for frame in self.frames.iter().rev() {
            unsafe {
                let function = (*frame.closure).function;
                let line = (*function)
                    .chunk
                    .read_line_from_offset(frame.ip.saturating_sub(1))
                    .unwrap_or(0);
                if (&(*function).name).is_empty() {
                    eprintln!("[line {}] in script", line);
                } else {
                    eprintln!("[line {}] in {}()", line, (*function).name);
                }
            }
        }

        self.reset_stack();
    }

    fn reset_stack(&mut self) {
        self.stack_top_pos = 0;
        self.frames.clear();
        self.open_upvalues.clear();
    }
}

#[cfg(feature = "debug_trace_execution")]
mod debug_feature {
    use super::*;
    use crate::debug;

    pub fn trace_execution(vm: &VM) {
        print!("{: >10}", "");
        for slot in &vm.stack[0..vm.stack_top_pos] {
            print!(" [ ");
            print_value(slot);
            print!(" ]");
        }
        println!();
        let frame = vm.frames.last().expect("No call frame.");
        unsafe {
            debug::disassemble_instruction(&(*(*frame.closure).function).chunk, frame.ip);
        }
    }
}

#[cfg(not(feature = "debug_trace_execution"))]
mod debug_feature {
    use super::*;

    pub fn trace_execution(_vm: &VM) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_string::hash_string;

    impl VM {
        fn global_by_name(&self, name: &str) -> Option<Value> {
            let key = self.intern_strings.find_string(name, hash_string(name))?;
            self.globals.get(key)
        }

        fn global_number(&self, name: &str) -> f64 {
            as_number(&self.global_by_name(name).expect("global should be defined"))
        }

        fn global_bool(&self, name: &str) -> bool {
            as_bool(&self.global_by_name(name).expect("global should be defined"))
        }

        fn global_string(&self, name: &str) -> String {
            let value = self.global_by_name(name).expect("global should be defined");
            unsafe { (*as_string_object(&value)).content.clone() }
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var r = 1 + 2 * 3;"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 7.0);
    }

    #[test]
    fn test_grouping_and_negation() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var r = -(1 + 2) * 4;"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), -12.0);
    }

    #[test]
    fn test_string_concatenation() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var a = \"foo\"; var b = \"bar\"; var r = a + b;"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_string("r"), "foobar");
    }

    #[test]
    fn test_concatenation_result_is_interned() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var r = \"he\" + \"llo\" == \"hello\";"),
            InterpretResult::InterpretOk
        );
        assert!(vm.global_bool("r"));
    }

    #[test]
    fn test_truthiness() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var a = !nil; var b = !!0; var c = \"a\" == \"a\"; var d = !!\"\";"),
            InterpretResult::InterpretOk
        );
        assert!(vm.global_bool("a"));
        assert!(vm.global_bool("b"));
        assert!(vm.global_bool("c"));
        assert!(vm.global_bool("d"));
    }

    #[test]
    fn test_comparison_chain() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var r = !(5 - 4 > 3 * 2 == !nil);"),
            InterpretResult::InterpretOk
        );
        assert!(vm.global_bool("r"));
    }

    #[test]
    fn test_if_else_branches() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "var a = 0; var b = 0;
                 if (1 < 2) { a = 1; } else { a = 2; }
                 if (1 > 2) { b = 1; } else { b = 2; }"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("a"), 1.0);
        assert_eq!(vm.global_number("b"), 2.0);
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "var a = nil and 1;
                 var b = 2 and 3;
                 var c = nil or 4;
                 var d = 5 or 6;"
            ),
            InterpretResult::InterpretOk
        );
        assert!(is_nil(&vm.global_by_name("a").unwrap()));
        assert_eq!(vm.global_number("b"), 3.0);
        assert_eq!(vm.global_number("c"), 4.0);
        assert_eq!(vm.global_number("d"), 5.0);
    }

    #[test]
    fn test_while_loop() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var i = 0; var s = 0; while (i < 3) { s = s + i; i = i + 1; }"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("i"), 3.0);
        assert_eq!(vm.global_number("s"), 3.0);
    }

    #[test]
    fn test_for_loop_with_all_clauses() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var s = 0; for (var i = 0; i < 5; i = i + 1) { s = s + i; }"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("s"), 10.0);
    }

    #[test]
    fn test_for_loop_without_clauses_runs_body() {
        let mut vm = VM::new();
        // The language has no break, so the clauseless loop is left through a
        // runtime error once the counter reaches the threshold.
        assert_eq!(
            vm.interpret("var i = 0; for (;;) { i = i + 1; if (i == 3) { i + nil; } }"),
            InterpretResult::InterpretRuntimeError
        );
        assert_eq!(vm.global_number("i"), 3.0);
    }

    #[test]
    fn test_block_scoping_shadows() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "var a = 1; var r = 0;
                 { var a = 2; { var a = 3; r = a; } }
                 var outer = a;"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 3.0);
        assert_eq!(vm.global_number("outer"), 1.0);
    }

    #[test]
    fn test_function_call_and_return() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "fun sum(a, b, c) { return a + b + c; }
                 var r = 4 + sum(5, 6, 7);"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 22.0);
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("fun noop() {} var r = noop();"),
            InterpretResult::InterpretOk
        );
        assert!(is_nil(&vm.global_by_name("r").unwrap()));
    }

    #[test]
    fn test_recursion() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "fun fib(n) { if (n < 2) { return n; } return fib(n - 2) + fib(n - 1); }
                 var r = fib(10);"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 55.0);
    }

    #[test]
    fn test_closure_counter_shares_upvalue_cell() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "fun make(n) {
                     fun inc() { n = n + 1; return n; }
                     return inc;
                 }
                 var c = make(0);
                 var r1 = c();
                 var r2 = c();"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r1"), 1.0);
        assert_eq!(vm.global_number("r2"), 2.0);
    }

    #[test]
    fn test_sibling_closures_share_one_upvalue() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "fun make() {
                     var shared = 0;
                     fun setter(v) { shared = v; }
                     fun getter() { return shared; }
                     setter(41);
                     var before = getter();
                     return getter;
                 }
                 var g = make();
                 var r = g();"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 41.0);
    }

    #[test]
    fn test_closed_upvalue_survives_scope_exit() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "var f;
                 {
                     var captured = \"inside\";
                     fun get() { return captured; }
                     f = get;
                 }
                 var r = f();"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_string("r"), "inside");
    }

    #[test]
    fn test_function_is_first_class_and_identity_equal() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("fun f() { return f; } var r = f() == f;"),
            InterpretResult::InterpretOk
        );
        assert!(vm.global_bool("r"));
    }

    #[test]
    fn test_native_clock_returns_number() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var t = clock(); var r = t > 0;"),
            InterpretResult::InterpretOk
        );
        assert!(vm.global_bool("r"));
    }

    #[test]
    fn test_class_instance_fields() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "class Point {}
                 var p = Point();
                 p.x = 1;
                 p.y = 2;
                 var r = p.x + p.y;"
            ),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 3.0);
    }

    #[test]
    fn test_undefined_variable_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("print x;"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_assignment_to_undefined_global_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("x = 1;"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_mixed_add_operands_are_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("1 + \"a\";"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_negate_non_number_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("-\"a\";"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_calling_non_callable_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var a = 1; a();"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_arity_mismatch_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("fun f(a) { return a; } f(1, 2);"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_unbounded_recursion_overflows_frames() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("fun f() { f(); } f();"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_property_on_non_instance_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var a = 1; a.x;"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_undefined_property_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("class C {} var c = C(); c.missing;"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_class_called_with_arguments_is_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("class C {} C(1);"),
            InterpretResult::InterpretRuntimeError
        );
    }

    #[test]
    fn test_compile_error_reports_without_running() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var a = ;"),
            InterpretResult::InterpretCompileError
        );
        assert_eq!(
            vm.interpret("{ var a; var a; }"),
            InterpretResult::InterpretCompileError
        );
        assert_eq!(
            vm.interpret("return 1;"),
            InterpretResult::InterpretCompileError
        );
    }

    #[test]
    fn test_vm_survives_runtime_error() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("print missing;"),
            InterpretResult::InterpretRuntimeError
        );
        // Stacks were reset; a fresh script still runs.
        assert_eq!(
            vm.interpret("var r = 40 + 2;"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("r"), 42.0);
    }

    #[test]
    fn test_globals_persist_across_interpret_calls() {
        let mut vm = VM::new();
        assert_eq!(vm.interpret("var a = 1;"), InterpretResult::InterpretOk);
        assert_eq!(
            vm.interpret("var b = a + 1;"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_number("b"), 2.0);
    }

    #[test]
    fn test_collect_garbage_reclaims_temporaries_and_keeps_globals() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret("var s = \"a\" + \"b\" + \"c\";"),
            InterpretResult::InterpretOk
        );
        let before = vm.object_manager.object_count();
        vm.collect_garbage();
        let after = vm.object_manager.object_count();
        assert!(after < before, "the script function and temporaries are garbage");
        assert!(vm.gc.stats().cycles >= 1);
        assert_eq!(vm.global_string("s"), "abc");

        // Pruned intern entries must not break later interning.
        assert_eq!(
            vm.interpret("var t = s + \"d\";"),
            InterpretResult::InterpretOk
        );
        assert_eq!(vm.global_string("t"), "abcd");
    }

    #[test]
    fn test_collection_mid_loop_keeps_open_upvalues_alive() {
        let mut vm = VM::new();
        assert_eq!(
            vm.interpret(
                "fun run() {
                     var acc = \"\";
                     fun append(part) { acc = acc + part; }
                     for (var i = 0; i < 50; i = i + 1) { append(\"x\"); }
                     return acc;
                 }
                 var r = run();"
            ),
            InterpretResult::InterpretOk
        );
        vm.collect_garbage();
        assert_eq!(vm.global_string("r").len(), 50);
    }
}
