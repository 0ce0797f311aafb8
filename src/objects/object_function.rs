use crate::{
    chunk::Chunk,
    objects::object::{Object, ObjectType},
};

#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: u8,
    pub chunk: Box<Chunk>,
    /// Empty for the toplevel script.
    pub name: String,
    pub upvalue_count: usize,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: String) -> Self {
        ObjectFunction {
            object: Object {
                obj_type: ObjectType::ObjFunction,
            },
            arity,
            chunk: Box::new(Chunk::new()),
            name,
            upvalue_count: 0,
        }
    }
}
