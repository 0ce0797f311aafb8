use crate::{
    objects::object::{Object, ObjectType},
    value::{make_nil_value, Value},
};

/// Indirection cell for a captured variable. While the variable still lives on
/// the value stack the upvalue is "open" and `location` points at that slot;
/// `close` copies the value into `closed` and rewires `location` to it.
#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub location: *mut Value,
    pub closed: Value,
}

impl ObjectUpvalue {
    pub fn new(location: *mut Value) -> Self {
        ObjectUpvalue {
            object: Object {
                obj_type: ObjectType::ObjUpvalue,
            },
            location,
            closed: make_nil_value(),
        }
    }

    pub fn close(&mut self) {
        self.closed = unsafe { *self.location };
        self.location = &mut self.closed;
    }
}
