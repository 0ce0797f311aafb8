use crate::objects::{
    object::{Object, ObjectType},
    object_function::ObjectFunction,
    object_upvalue::ObjectUpvalue,
};

/// Runtime pairing of a function with its captured upvalues. Slots start out
/// null and are filled while the VM consumes the `Closure` operand bytes, so
/// the collector must tolerate null entries.
#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: *mut ObjectFunction,
    pub upvalues: Vec<*mut ObjectUpvalue>,
}

impl ObjectClosure {
    pub fn new(function: *mut ObjectFunction) -> Self {
        let upvalue_count = unsafe { (*function).upvalue_count };
        ObjectClosure {
            object: Object {
                obj_type: ObjectType::ObjClosure,
            },
            function,
            upvalues: vec![std::ptr::null_mut(); upvalue_count],
        }
    }
}
