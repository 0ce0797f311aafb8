use crate::objects::{
    object::{NativeObject, Object, ObjectType},
    object_class::{ObjectClass, ObjectInstance},
    object_closure::ObjectClosure,
    object_function::ObjectFunction,
    object_native_function::ObjectNativeFunction,
    object_string::ObjectString,
    object_upvalue::ObjectUpvalue,
};
use crate::value::Value;

/// Owner of every heap object in one interpreter instance. The vector is the
/// all-objects list the collector sweeps; `bytes_allocated` is the live total
/// the trigger heuristic watches. Pointers handed out stay valid until
/// `free_object` — the heap never moves anything.
pub struct ObjectManager {
    objects: Vec<*mut Object>,
    bytes_allocated: usize,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            bytes_allocated: 0,
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    #[allow(dead_code)]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Take ownership of a newly allocated object, record its deep size, and
    /// return that size.
    fn push_object(&mut self, obj: *mut Object) -> usize {
        let size = unsafe { (*obj).deep_size() };
        self.bytes_allocated += size;
        self.objects.push(obj);
        size
    }

    pub fn alloc_string(&mut self, content: &str, hash: u32) -> (*mut ObjectString, usize) {
        let ptr = Box::into_raw(Box::new(ObjectString::new(content, hash)));
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    /// Functions are built incrementally by the compiler and adopted once
    /// finished; from here on the collector may reclaim them.
    pub fn adopt_function(&mut self, function: Box<ObjectFunction>) -> (*mut ObjectFunction, usize) {
        let ptr = Box::into_raw(function);
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    pub fn alloc_closure(&mut self, function: *mut ObjectFunction) -> (*mut ObjectClosure, usize) {
        let ptr = Box::into_raw(Box::new(ObjectClosure::new(function)));
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    pub fn alloc_native_function<T: NativeObject + 'static>(
        &mut self,
        name: String,
        arity: u8,
        native_object: T,
    ) -> (*mut ObjectNativeFunction, usize) {
        let ptr = Box::into_raw(Box::new(ObjectNativeFunction::new(name, arity, native_object)));
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    pub fn alloc_upvalue(&mut self, location: *mut Value) -> (*mut ObjectUpvalue, usize) {
        let ptr = Box::into_raw(Box::new(ObjectUpvalue::new(location)));
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    pub fn alloc_class(&mut self, name: *mut ObjectString) -> (*mut ObjectClass, usize) {
        let ptr = Box::into_raw(Box::new(ObjectClass::new(name)));
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    pub fn alloc_instance(&mut self, class: *mut ObjectClass) -> (*mut ObjectInstance, usize) {
        let ptr = Box::into_raw(Box::new(ObjectInstance::new(class)));
        let size = self.push_object(ptr as *mut Object);
        (ptr, size)
    }

    /// Iterate over all managed objects (for GC mark/sweep).
    pub fn iter(&self) -> impl Iterator<Item = &*mut Object> {
        self.objects.iter()
    }

    /// Unlink and deallocate one object, returning the bytes released.
    pub fn free_object(&mut self, ptr: *mut Object) -> usize {
        if let Some(pos) = self.objects.iter().position(|&p| p == ptr) {
            self.objects.swap_remove(pos);
            let size = unsafe { (*ptr).deep_size() };
            // An object's owned containers may have grown since allocation,
            // so its current size can exceed what was recorded.
            self.bytes_allocated = self.bytes_allocated.saturating_sub(size);
            unsafe {
                Self::deallocate(ptr);
            }
            size
        } else {
            0
        }
    }

    /// Deallocate every object (interpreter shutdown).
    pub unsafe fn free_all(&mut self) {
        for &ptr in &self.objects {
            if !ptr.is_null() {
                Self::deallocate(ptr);
            }
        }
        self.objects.clear();
        self.bytes_allocated = 0;
    }

    /// Rebuild the Box that allocated the object so the concrete destructor
    /// runs with the concrete layout.
    unsafe fn deallocate(ptr: *mut Object) {
        match (*ptr).obj_type {
            ObjectType::ObjString => drop(Box::from_raw(ptr as *mut ObjectString)),
            ObjectType::ObjFunction => drop(Box::from_raw(ptr as *mut ObjectFunction)),
            ObjectType::ObjNativeFunction => drop(Box::from_raw(ptr as *mut ObjectNativeFunction)),
            ObjectType::ObjClosure => drop(Box::from_raw(ptr as *mut ObjectClosure)),
            ObjectType::ObjUpvalue => drop(Box::from_raw(ptr as *mut ObjectUpvalue)),
            ObjectType::ObjClass => drop(Box::from_raw(ptr as *mut ObjectClass)),
            ObjectType::ObjInstance => drop(Box::from_raw(ptr as *mut ObjectInstance)),
        }
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        unsafe {
            self.free_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_string::hash_string;

    #[test]
    fn test_allocation_accounts_bytes() {
        let mut manager = ObjectManager::new();
        assert_eq!(manager.bytes_allocated(), 0);
        let (_, size) = manager.alloc_string("abc", hash_string("abc"));
        assert!(size > 0);
        assert_eq!(manager.bytes_allocated(), size);
        assert_eq!(manager.object_count(), 1);
    }

    #[test]
    fn test_free_object_releases_bytes() {
        let mut manager = ObjectManager::new();
        let (keep, keep_size) = manager.alloc_string("keep", hash_string("keep"));
        let (gone, _) = manager.alloc_string("gone", hash_string("gone"));
        let freed = manager.free_object(gone as *mut Object);
        assert!(freed > 0);
        assert_eq!(manager.bytes_allocated(), keep_size);
        assert_eq!(manager.object_count(), 1);
        assert!(manager.iter().any(|&p| p == keep as *mut Object));
    }
}
