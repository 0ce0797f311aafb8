use crate::objects::object::{Object, ObjectType};
use crate::objects::object_class::ObjectInstance;
use crate::objects::object_closure::ObjectClosure;
use crate::objects::object_function::ObjectFunction;
use crate::objects::object_manager::ObjectManager;
use crate::objects::object_string::{hash_string, ObjectString};
use crate::table::Table;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    ValueNil,
    ValueBool,
    ValueNumber,
    ValueObject,
}

#[derive(Clone, Copy)]
pub union ValueUnion {
    pub boolean: bool,
    pub number: f64,
    pub object: *mut Object,
}

#[derive(Clone, Copy)]
pub struct Value {
    pub value_type: ValueType,
    pub value_as: ValueUnion,
}

pub type ValueArray = Vec<Value>;

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if self.value_type != other.value_type {
            return false;
        }

        unsafe {
            match self.value_type {
                ValueType::ValueNil => true,
                ValueType::ValueBool => self.value_as.boolean == other.value_as.boolean,
                // IEEE semantics, so NaN != NaN.
                ValueType::ValueNumber => self.value_as.number == other.value_as.number,
                // Strings are interned, so identity covers content equality.
                ValueType::ValueObject => std::ptr::eq(self.value_as.object, other.value_as.object),
            }
        }
    }
}

pub fn make_nil_value() -> Value {
    Value {
        value_type: ValueType::ValueNil,
        value_as: ValueUnion { number: 0.0 },
    }
}

pub fn make_bool_value(boolean: bool) -> Value {
    Value {
        value_type: ValueType::ValueBool,
        value_as: ValueUnion { boolean },
    }
}

pub fn make_number_value(number: f64) -> Value {
    Value {
        value_type: ValueType::ValueNumber,
        value_as: ValueUnion { number },
    }
}

pub fn make_object_value(object: *mut Object) -> Value {
    Value {
        value_type: ValueType::ValueObject,
        value_as: ValueUnion { object },
    }
}

pub fn make_function_value(function: *mut ObjectFunction) -> Value {
    make_object_value(function as *mut Object)
}

/// Interning entry point: every string value in the system goes through here,
/// so two equal-content strings always share one `ObjectString`.
pub fn make_string_value(
    object_manager: &mut ObjectManager,
    intern_strings: &mut Table,
    content: &str,
) -> Value {
    let hash = hash_string(content);
    if let Some(existing) = intern_strings.find_string(content, hash) {
        return make_object_value(existing as *mut Object);
    }

    let (string, _) = object_manager.alloc_string(content, hash);
    intern_strings.set(string, make_nil_value());
    make_object_value(string as *mut Object)
}

pub fn is_nil(value: &Value) -> bool {
    value.value_type == ValueType::ValueNil
}

pub fn is_bool(value: &Value) -> bool {
    value.value_type == ValueType::ValueBool
}

pub fn is_number(value: &Value) -> bool {
    value.value_type == ValueType::ValueNumber
}

pub fn is_object(value: &Value) -> bool {
    value.value_type == ValueType::ValueObject
}

fn is_object_type(value: &Value, object_type: ObjectType) -> bool {
    is_object(value) && unsafe { (*value.value_as.object).obj_type == object_type }
}

pub fn is_string(value: &Value) -> bool {
    is_object_type(value, ObjectType::ObjString)
}

pub fn is_instance(value: &Value) -> bool {
    is_object_type(value, ObjectType::ObjInstance)
}

pub fn as_bool(value: &Value) -> bool {
    debug_assert!(is_bool(value));
    unsafe { value.value_as.boolean }
}

pub fn as_number(value: &Value) -> f64 {
    debug_assert!(is_number(value));
    unsafe { value.value_as.number }
}

pub fn as_object(value: &Value) -> *mut Object {
    debug_assert!(is_object(value));
    unsafe { value.value_as.object }
}

pub fn as_string_object(value: &Value) -> *mut ObjectString {
    debug_assert!(is_string(value));
    as_object(value) as *mut ObjectString
}

pub fn as_function_object(value: &Value) -> *mut ObjectFunction {
    debug_assert!(is_object_type(value, ObjectType::ObjFunction));
    as_object(value) as *mut ObjectFunction
}

pub fn as_closure_object(value: &Value) -> *mut ObjectClosure {
    debug_assert!(is_object_type(value, ObjectType::ObjClosure));
    as_object(value) as *mut ObjectClosure
}

pub fn as_instance_object(value: &Value) -> *mut ObjectInstance {
    debug_assert!(is_instance(value));
    as_object(value) as *mut ObjectInstance
}

pub fn print_value(value: &Value) {
    match value.value_type {
        ValueType::ValueNil => print!("nil"),
        ValueType::ValueBool => print!("{}", unsafe { value.value_as.boolean }),
        ValueType::ValueNumber => print_number(unsafe { value.value_as.number }),
        ValueType::ValueObject => print_object(value),
    }
}

fn print_number(number: f64) {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        print!("{}", number as i64);
    } else {
        print!("{}", number);
    }
}

fn print_object(value: &Value) {
    let object = as_object(value);
    unsafe {
        match (*object).obj_type {
            ObjectType::ObjString => print!("{}", (*object).as_string().content),
            ObjectType::ObjFunction => print_function((*object).as_function()),
            ObjectType::ObjNativeFunction => print!("<native fn>"),
            ObjectType::ObjClosure => print_function(&*(*object).as_closure().function),
            ObjectType::ObjUpvalue => print!("upvalue"),
            ObjectType::ObjClass => print!("{}", (*(*object).as_class().name).content),
            ObjectType::ObjInstance => {
                let instance = (*object).as_instance();
                print!("{} instance", (*(*instance.class).name).content);
            }
        }
    }
}

fn print_function(function: &ObjectFunction) {
    if function.name.is_empty() {
        print!("<script>");
    } else {
        print!("<fn {}>", function.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_tag_and_payload() {
        assert!(make_nil_value() == make_nil_value());
        assert!(make_bool_value(true) == make_bool_value(true));
        assert!(make_bool_value(true) != make_bool_value(false));
        assert!(make_number_value(1.5) == make_number_value(1.5));
        assert!(make_number_value(0.0) != make_bool_value(false));
        assert!(make_nil_value() != make_number_value(0.0));
    }

    #[test]
    fn test_nan_is_not_equal_to_itself() {
        let nan = make_number_value(f64::NAN);
        assert!(nan != nan);
    }

    #[test]
    fn test_interning_returns_identical_objects() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let first = make_string_value(&mut object_manager, &mut intern_strings, "hello");
        let second = make_string_value(&mut object_manager, &mut intern_strings, "hello");
        let other = make_string_value(&mut object_manager, &mut intern_strings, "world");
        assert!(first == second);
        assert!(first != other);
        assert_eq!(intern_strings.len(), 2);
    }
}
