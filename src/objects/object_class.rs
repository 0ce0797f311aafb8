use crate::{
    objects::{
        object::{Object, ObjectType},
        object_string::ObjectString,
    },
    table::Table,
};

#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: *mut ObjectString,
}

impl ObjectClass {
    pub fn new(name: *mut ObjectString) -> Self {
        ObjectClass {
            object: Object {
                obj_type: ObjectType::ObjClass,
            },
            name,
        }
    }
}

#[repr(C)]
pub struct ObjectInstance {
    pub object: Object,
    pub class: *mut ObjectClass,
    pub fields: Table,
}

impl ObjectInstance {
    pub fn new(class: *mut ObjectClass) -> Self {
        ObjectInstance {
            object: Object {
                obj_type: ObjectType::ObjInstance,
            },
            class,
            fields: Table::new(),
        }
    }
}
