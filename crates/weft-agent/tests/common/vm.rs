use std::collections::HashMap;

use weft_agent::STORAGE_CLASS;
use weft_classfile::{opcodes, ClassFile, CodeAttribute, Constant, ConstantPool, MemberInfo};

use super::{BOOM_CLASS, BOOM_ERROR_CLASS};

pub type ObjId = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Ref(Option<ObjId>),
}

impl Value {
    pub fn obj(self) -> ObjId {
        match self {
            Value::Ref(Some(id)) => id,
            other => panic!("expected an object reference, got {other:?}"),
        }
    }
}

/// A correlation-store call observed during execution, carrying the key's
/// object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Capture(ObjId),
    InsertEnter(ObjId),
    InsertExit(ObjId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Returned(Option<Value>),
    Threw(ObjId),
}

pub struct Object {
    pub class_name: String,
    pub fields: HashMap<String, Value>,
}

/// Stack-machine interpreter over the opcode subset the fixtures and the
/// rewriter emit. Store hooks and `fixture/Boom.raise` are intercepted by
/// the host instead of dispatching into bytecode.
pub struct Vm {
    classes: HashMap<String, ClassFile>,
    pub heap: Vec<Object>,
    pub events: Vec<Event>,
}

impl Vm {
    pub fn new() -> Self {
        Self { classes: HashMap::new(), heap: Vec::new(), events: Vec::new() }
    }

    pub fn load_class(&mut self, bytes: &[u8]) -> String {
        let class = ClassFile::parse(bytes).expect("fixture class must parse");
        let name = class.class_name().unwrap().to_string();
        self.classes.insert(name.clone(), class);
        name
    }

    pub fn new_object(&mut self, class_name: &str) -> ObjId {
        self.heap.push(Object { class_name: class_name.to_string(), fields: HashMap::new() });
        self.heap.len() - 1
    }

    pub fn set_field(&mut self, obj: ObjId, name: &str, value: Value) {
        self.heap[obj].fields.insert(name.to_string(), value);
    }

    /// Invokes `class.method` with logical arguments (the receiver first
    /// for instance methods); wide values are expanded to their two slots
    /// internally.
    pub fn call(&mut self, class: &str, method: &str, descriptor: &str, args: &[Value]) -> Outcome {
        self.invoke(class, method, descriptor, args.to_vec())
    }

    fn invoke(&mut self, class: &str, method: &str, descriptor: &str, args: Vec<Value>) -> Outcome {
        let (code, pool) = {
            let class_file =
                self.classes.get(class).unwrap_or_else(|| panic!("class {class} not loaded"));
            let member = find_method(class_file, method, descriptor)
                .unwrap_or_else(|| panic!("method {class}.{method}{descriptor} not found"));
            let code_index = member
                .attribute_index(&class_file.constant_pool, "Code")
                .unwrap_or_else(|| panic!("method {class}.{method} has no body"));
            let code = CodeAttribute::parse(&member.attributes[code_index].info).unwrap();
            (code, class_file.constant_pool.clone())
        };

        let mut locals = vec![Value::Int(0); code.max_locals as usize];
        let mut slot = 0usize;
        for arg in args {
            locals[slot] = arg;
            slot += if matches!(arg, Value::Long(_)) { 2 } else { 1 };
        }

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        loop {
            let insn_pc = pc;
            let opcode = code.code[pc];
            pc += 1;
            match opcode {
                opcodes::NOP => {}
                opcodes::ACONST_NULL => stack.push(Value::Ref(None)),
                // iconst_m1 .. iconst_5
                0x02..=0x08 => stack.push(Value::Int(opcode as i32 - 0x03)),
                opcodes::BIPUSH => {
                    stack.push(Value::Int(code.code[pc] as i8 as i32));
                    pc += 1;
                }
                opcodes::SIPUSH => {
                    stack.push(Value::Int(read_i16(&code.code, pc) as i32));
                    pc += 2;
                }
                opcodes::ILOAD | opcodes::LLOAD | opcodes::ALOAD => {
                    stack.push(locals[code.code[pc] as usize]);
                    pc += 1;
                }
                // iload_0..3, lload_0..3, fload_0..3, dload_0..3, aload_0..3
                0x1a..=0x2d => {
                    let slot = ((opcode - 0x1a) % 4) as usize;
                    stack.push(locals[slot]);
                }
                opcodes::ISTORE | opcodes::ASTORE => {
                    locals[code.code[pc] as usize] = stack.pop().unwrap();
                    pc += 1;
                }
                // istore_0..3
                0x3b..=0x3e => locals[(opcode - 0x3b) as usize] = stack.pop().unwrap(),
                // astore_0..3
                0x4b..=0x4e => locals[(opcode - 0x4b) as usize] = stack.pop().unwrap(),
                opcodes::POP => {
                    stack.pop().unwrap();
                }
                opcodes::DUP => {
                    let top = *stack.last().unwrap();
                    stack.push(top);
                }
                opcodes::IADD => {
                    let (b, a) = (pop_int(&mut stack), pop_int(&mut stack));
                    stack.push(Value::Int(a.wrapping_add(b)));
                }
                opcodes::IFEQ | opcodes::IFNE => {
                    let offset = read_i16(&code.code, pc);
                    pc += 2;
                    let v = pop_int(&mut stack);
                    let taken = (opcode == opcodes::IFEQ) == (v == 0);
                    if taken {
                        pc = jump(insn_pc, offset);
                    }
                }
                opcodes::IF_ICMPGE => {
                    let offset = read_i16(&code.code, pc);
                    pc += 2;
                    let (b, a) = (pop_int(&mut stack), pop_int(&mut stack));
                    if a >= b {
                        pc = jump(insn_pc, offset);
                    }
                }
                opcodes::GOTO => {
                    let offset = read_i16(&code.code, pc);
                    pc = jump(insn_pc, offset);
                }
                opcodes::IRETURN | opcodes::LRETURN | opcodes::ARETURN => {
                    return Outcome::Returned(Some(stack.pop().unwrap()));
                }
                opcodes::RETURN => return Outcome::Returned(None),
                opcodes::GETFIELD => {
                    let (_, field_name, _) = resolve_field(&pool, read_u16(&code.code, pc));
                    pc += 2;
                    let receiver = stack.pop().unwrap().obj();
                    let value = *self.heap[receiver]
                        .fields
                        .get(&field_name)
                        .unwrap_or_else(|| panic!("field {field_name} unset"));
                    stack.push(value);
                }
                opcodes::INVOKESTATIC => {
                    let (owner, name, desc) = resolve_method(&pool, read_u16(&code.code, pc));
                    pc += 2;
                    if owner == STORAGE_CLASS {
                        let key = stack.pop().unwrap().obj();
                        self.events.push(match name.as_str() {
                            "capture" => Event::Capture(key),
                            "insertEnter" => Event::InsertEnter(key),
                            "insertExit" => Event::InsertExit(key),
                            other => panic!("unexpected store hook {other}"),
                        });
                        continue;
                    }
                    if owner == BOOM_CLASS && name == "raise" {
                        let exc = self.new_object(BOOM_ERROR_CLASS);
                        match self.unwind(&code, &pool, &mut stack, insn_pc, exc) {
                            Some(handler) => pc = handler,
                            None => return Outcome::Threw(exc),
                        }
                        continue;
                    }
                    let args = pop_arguments(&mut stack, &desc, true);
                    match self.invoke(&owner, &name, &desc, args) {
                        Outcome::Returned(Some(v)) => stack.push(v),
                        Outcome::Returned(None) => {}
                        Outcome::Threw(exc) => match self.unwind(&code, &pool, &mut stack, insn_pc, exc) {
                            Some(handler) => pc = handler,
                            None => return Outcome::Threw(exc),
                        },
                    }
                }
                opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL => {
                    let (owner, name, desc) = resolve_method(&pool, read_u16(&code.code, pc));
                    pc += 2;
                    let args = pop_arguments(&mut stack, &desc, false);
                    // Virtual dispatch goes through the receiver's runtime
                    // class; invokespecial binds to the named owner.
                    let target = if opcode == opcodes::INVOKEVIRTUAL {
                        self.heap[args[0].obj()].class_name.clone()
                    } else {
                        owner
                    };
                    match self.invoke(&target, &name, &desc, args) {
                        Outcome::Returned(Some(v)) => stack.push(v),
                        Outcome::Returned(None) => {}
                        Outcome::Threw(exc) => match self.unwind(&code, &pool, &mut stack, insn_pc, exc) {
                            Some(handler) => pc = handler,
                            None => return Outcome::Threw(exc),
                        },
                    }
                }
                opcodes::ATHROW => {
                    let exc = stack.pop().unwrap().obj();
                    match self.unwind(&code, &pool, &mut stack, insn_pc, exc) {
                        Some(handler) => pc = handler,
                        None => return Outcome::Threw(exc),
                    }
                }
                opcodes::WIDE => {
                    let wide_op = code.code[pc];
                    let slot = read_u16(&code.code, pc + 1) as usize;
                    pc += 3;
                    match wide_op {
                        opcodes::ILOAD | opcodes::LLOAD | opcodes::ALOAD => {
                            stack.push(locals[slot]);
                        }
                        other => panic!("unsupported wide opcode 0x{other:02x}"),
                    }
                }
                other => panic!("unsupported opcode 0x{other:02x} at pc {insn_pc}"),
            }
        }
    }

    /// Exception-table dispatch for one frame: returns the handler pc, or
    /// `None` to propagate to the caller.
    fn unwind(
        &mut self,
        code: &CodeAttribute,
        pool: &ConstantPool,
        stack: &mut Vec<Value>,
        pc: usize,
        exc: ObjId,
    ) -> Option<usize> {
        for handler in &code.exception_table {
            if pc < handler.start_pc as usize || pc >= handler.end_pc as usize {
                continue;
            }
            // catch_type 0 is catch-any; no class hierarchy in the fixture
            // heap, so a named type matches on exact class name.
            let matches = handler.catch_type == 0
                || pool
                    .class_name(handler.catch_type)
                    .is_ok_and(|name| name == self.heap[exc].class_name);
            if matches {
                stack.clear();
                stack.push(Value::Ref(Some(exc)));
                return Some(handler.handler_pc as usize);
            }
        }
        None
    }
}

fn find_method<'a>(class: &'a ClassFile, name: &str, descriptor: &str) -> Option<&'a MemberInfo> {
    class.methods.iter().find(|m| {
        m.name(&class.constant_pool).is_ok_and(|n| n == name)
            && m.descriptor(&class.constant_pool).is_ok_and(|d| d == descriptor)
    })
}

fn pop_arguments(stack: &mut Vec<Value>, descriptor: &str, is_static: bool) -> Vec<Value> {
    let desc = weft_classfile::parse_method_descriptor(descriptor).unwrap();
    let mut count = desc.params.len();
    if !is_static {
        count += 1;
    }
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        args.push(stack.pop().unwrap());
    }
    args.reverse();
    args
}

fn resolve_method(pool: &ConstantPool, index: u16) -> (String, String, String) {
    match pool.get(index).unwrap() {
        Constant::Methodref { class_index, name_and_type_index }
        | Constant::InterfaceMethodref { class_index, name_and_type_index } => {
            let owner = pool.class_name(*class_index).unwrap().to_string();
            let (name, descriptor) = resolve_name_and_type(pool, *name_and_type_index);
            (owner, name, descriptor)
        }
        other => panic!("constant {index} is not a method reference: {other:?}"),
    }
}

fn resolve_field(pool: &ConstantPool, index: u16) -> (String, String, String) {
    match pool.get(index).unwrap() {
        Constant::Fieldref { class_index, name_and_type_index } => {
            let owner = pool.class_name(*class_index).unwrap().to_string();
            let (name, descriptor) = resolve_name_and_type(pool, *name_and_type_index);
            (owner, name, descriptor)
        }
        other => panic!("constant {index} is not a field reference: {other:?}"),
    }
}

fn resolve_name_and_type(pool: &ConstantPool, index: u16) -> (String, String) {
    match pool.get(index).unwrap() {
        Constant::NameAndType { name_index, descriptor_index } => (
            pool.utf8(*name_index).unwrap().to_string(),
            pool.utf8(*descriptor_index).unwrap().to_string(),
        ),
        other => panic!("constant {index} is not a NameAndType: {other:?}"),
    }
}

fn pop_int(stack: &mut Vec<Value>) -> i32 {
    match stack.pop().unwrap() {
        Value::Int(v) => v,
        other => panic!("expected int on stack, got {other:?}"),
    }
}

fn read_u16(code: &[u8], pc: usize) -> u16 {
    u16::from_be_bytes([code[pc], code[pc + 1]])
}

fn read_i16(code: &[u8], pc: usize) -> i16 {
    read_u16(code, pc) as i16
}

fn jump(insn_pc: usize, offset: i16) -> usize {
    (insn_pc as isize + offset as isize) as usize
}
