use crate::{
    objects::object::{NativeObject, Object, ObjectType},
    value::Value,
};

#[repr(C)]
pub struct ObjectNativeFunction {
    pub object: Object,
    pub name: String,
    pub arity: u8,
    pub native_object: Box<dyn NativeObject>,
}

impl ObjectNativeFunction {
    pub fn new(name: String, arity: u8, native_object: impl NativeObject + 'static) -> Self {
        ObjectNativeFunction {
            object: Object {
                obj_type: ObjectType::ObjNativeFunction,
            },
            name,
            arity,
            native_object: Box::new(native_object),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        if args.len() != self.arity as usize {
            return Err(format!(
                "Expected {} arguments but got {}.",
                self.arity,
                args.len()
            ));
        }
        self.native_object.run(args)
    }
}
