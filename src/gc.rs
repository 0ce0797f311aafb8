use crate::{
    call_frame::CallFrame,
    objects::{
        object::{Object, ObjectType},
        object_manager::ObjectManager,
        object_upvalue::ObjectUpvalue,
    },
    table::Table,
    value::{as_object, is_object, Value},
};
use std::collections::HashSet;

/// Tri-color mark-sweep over the object manager's heap. Colors are set
/// membership: white objects are candidates, gray are marked but unscanned,
/// black are fully scanned. Nothing is freed while it sits on the gray
/// worklist, and the heap never moves, so pointers held by roots stay valid
/// across a collection.
pub struct GarbageCollector {
    white_set: HashSet<*mut Object>,
    gray_set: HashSet<*mut Object>,
    black_set: HashSet<*mut Object>,
    stats: GCStats,
}

/// Aggregated GC statistics (does not include currently-live total bytes; the
/// object manager tracks that).
#[derive(Default, Debug, Clone)]
pub struct GCStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
    pub last_before_bytes: usize,
    pub last_after_bytes: usize,
    pub last_next_trigger_bytes: usize,
}

impl GCStats {
    fn record(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.cycles += 1;
        self.total_freed_bytes += freed;
        self.last_freed_bytes = freed;
        self.last_before_bytes = before;
        self.last_after_bytes = after;
        self.last_next_trigger_bytes = next_trigger;
    }
}

// Lightweight tracing macro (only active with the gc_debug feature).
#[cfg(feature = "gc_debug")]
macro_rules! gc_trace { ($($arg:tt)*) => { eprintln!("[gc-trace] {}", format_args!($($arg)*)); } }
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace {
    ($($arg:tt)*) => {};
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self {
            white_set: HashSet::new(),
            gray_set: HashSet::new(),
            black_set: HashSet::new(),
            stats: GCStats::default(),
        }
    }

    /// Start a cycle with every managed object colored white.
    pub fn prepare_collection(&mut self, object_manager: &ObjectManager) {
        self.reset();
        for &obj_ptr in object_manager.iter() {
            self.white_set.insert(obj_ptr);
        }
    }

    /// Move an object from white to gray.
    pub fn mark_object(&mut self, obj: *mut Object) {
        if obj.is_null() || self.black_set.contains(&obj) {
            return;
        }

        if self.white_set.remove(&obj) {
            self.gray_set.insert(obj);
            gc_trace!("mark_object enqueue gray ptr={:p}", obj);
        }
    }

    pub fn mark_value(&mut self, value: &Value) {
        if !is_object(value) {
            return;
        }
        self.mark_object(as_object(value));
    }

    /// Mark roots provided by the VM: the live stack window, every call
    /// frame's closure, the open-upvalue list, and the globals table (keys
    /// and values). The intern set is deliberately not a root; unreachable
    /// strings are pruned from it before sweeping.
    pub fn mark_roots(
        &mut self,
        stack: &[Value],
        stack_top: usize,
        globals: &Table,
        frames: &[CallFrame],
        open_upvalues: &[*mut ObjectUpvalue],
    ) {
        for value in &stack[0..stack_top] {
            self.mark_value(value);
        }

        for frame in frames {
            self.mark_object(frame.closure as *mut Object);
        }

        for &upvalue in open_upvalues {
            self.mark_object(upvalue as *mut Object);
        }

        self.mark_table(globals);
    }

    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key as *mut Object);
            self.mark_value(value);
        }
    }

    /// Drain the gray worklist, blackening each object.
    pub fn trace_references(&mut self) {
        while !self.gray_set.is_empty() {
            let obj = *self.gray_set.iter().next().expect("gray set is non-empty");
            self.gray_set.remove(&obj);
            self.black_set.insert(obj);

            unsafe {
                gc_trace!("trace gray -> black ptr={:p}", obj);
                self.blacken_object(obj);
            }
        }
    }

    /// Mark everything an object references.
    unsafe fn blacken_object(&mut self, object: *mut Object) {
        match (*object).obj_type {
            ObjectType::ObjClosure => {
                let closure = (*object).as_closure();
                self.mark_object(closure.function as *mut Object);
                for &upvalue in &closure.upvalues {
                    self.mark_object(upvalue as *mut Object);
                }
            }
            ObjectType::ObjFunction => {
                let function = (*object).as_function();
                for constant in function.chunk.iter_constants() {
                    self.mark_value(constant);
                }
            }
            ObjectType::ObjUpvalue => {
                let upvalue = (*object).as_upvalue();
                self.mark_value(&*upvalue.location);
            }
            ObjectType::ObjClass => {
                let class = (*object).as_class();
                self.mark_object(class.name as *mut Object);
            }
            ObjectType::ObjInstance => {
                let instance = (*object).as_instance();
                self.mark_object(instance.class as *mut Object);
                self.mark_table(&instance.fields);
            }
            // Strings and natives have no outgoing references.
            ObjectType::ObjString | ObjectType::ObjNativeFunction => {}
        }
    }

    /// Prune intern-set entries whose key did not survive marking, so the
    /// sweep below cannot leave dangling keys behind.
    pub fn remove_white_keys(&self, table: &mut Table) {
        table.remove_white(|object| self.black_set.contains(&object));
    }

    /// Free every object still white. Returns the bytes released.
    pub fn sweep(&mut self, object_manager: &mut ObjectManager) -> usize {
        let mut freed_bytes = 0;
        for &obj_ptr in self.white_set.iter() {
            freed_bytes += object_manager.free_object(obj_ptr);
        }
        self.white_set.clear();
        gc_trace!("sweep freed_bytes={}", freed_bytes);
        freed_bytes
    }

    pub fn reset(&mut self) {
        self.white_set.clear();
        self.gray_set.clear();
        self.black_set.clear();
    }

    /// Record a completed cycle (the VM knows bytes before/after and the next
    /// trigger watermark).
    pub fn record_cycle(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.stats.record(before, freed, after, next_trigger);
        gc_trace!(
            "cycle summary cycles={} freed={} before={} after={} next_trigger={}",
            self.stats.cycles,
            freed,
            before,
            after,
            next_trigger
        );
    }

    #[allow(dead_code)]
    pub fn stats(&self) -> &GCStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_function::ObjectFunction;
    use crate::objects::object_string::hash_string;
    use crate::value::{make_nil_value, make_object_value, Value};

    fn collect(
        gc: &mut GarbageCollector,
        manager: &mut ObjectManager,
        stack: &[Value],
        stack_top: usize,
        globals: &Table,
        interns: &mut Table,
        open_upvalues: &[*mut ObjectUpvalue],
    ) -> usize {
        let frames: Vec<CallFrame> = vec![];
        gc.prepare_collection(manager);
        gc.mark_roots(stack, stack_top, globals, &frames, open_upvalues);
        gc.trace_references();
        gc.remove_white_keys(interns);
        gc.sweep(manager)
    }

    #[test]
    fn test_collects_unreachable_objects() {
        let mut manager = ObjectManager::new();
        let (keep, _) = manager.alloc_string("keep", hash_string("keep"));
        manager.alloc_string("drop1", hash_string("drop1"));
        manager.alloc_string("drop2", hash_string("drop2"));
        manager.alloc_string("drop3", hash_string("drop3"));

        let mut gc = GarbageCollector::new();
        let mut stack = [make_nil_value(); 8];
        stack[0] = make_object_value(keep as *mut Object);
        let globals = Table::new();
        let mut interns = Table::new();

        let freed = collect(&mut gc, &mut manager, &stack, 1, &globals, &mut interns, &[]);
        assert!(freed > 0, "Expected some bytes to be freed");
        assert_eq!(manager.object_count(), 1, "Only the rooted object should remain");
    }

    #[test]
    fn test_preserves_reachable_closure_and_function() {
        let mut manager = ObjectManager::new();
        let (function, _) = manager.adopt_function(Box::new(ObjectFunction::new(0, "f1".to_string())));
        let (closure, _) = manager.alloc_closure(function);
        manager.adopt_function(Box::new(ObjectFunction::new(0, "f2".to_string())));

        let mut gc = GarbageCollector::new();
        let mut stack = [make_nil_value(); 8];
        stack[0] = make_object_value(closure as *mut Object);
        let globals = Table::new();
        let mut interns = Table::new();

        collect(&mut gc, &mut manager, &stack, 1, &globals, &mut interns, &[]);
        assert_eq!(manager.object_count(), 2, "Closure and its function should remain");
    }

    #[test]
    fn test_marks_through_open_upvalue() {
        let mut manager = ObjectManager::new();
        let (string, _) = manager.alloc_string("captured", hash_string("captured"));
        let mut stack = [make_nil_value(); 8];
        stack[0] = make_object_value(string as *mut Object);
        let (upvalue, _) = manager.alloc_upvalue(&mut stack[0] as *mut Value);

        let mut gc = GarbageCollector::new();
        let globals = Table::new();
        let mut interns = Table::new();

        collect(
            &mut gc,
            &mut manager,
            &stack,
            1,
            &globals,
            &mut interns,
            &[upvalue],
        );
        assert_eq!(manager.object_count(), 2, "Upvalue and captured string should remain");
    }

    #[test]
    fn test_unreachable_interned_strings_are_pruned() {
        let mut manager = ObjectManager::new();
        let mut interns = Table::new();
        let (reachable, _) = manager.alloc_string("reachable", hash_string("reachable"));
        let (garbage, _) = manager.alloc_string("garbage", hash_string("garbage"));
        interns.set(reachable, make_nil_value());
        interns.set(garbage, make_nil_value());

        let mut gc = GarbageCollector::new();
        let mut stack = [make_nil_value(); 8];
        stack[0] = make_object_value(reachable as *mut Object);
        let globals = Table::new();

        collect(&mut gc, &mut manager, &stack, 1, &globals, &mut interns, &[]);
        assert_eq!(manager.object_count(), 1);
        assert!(interns
            .find_string("reachable", hash_string("reachable"))
            .is_some());
        assert!(interns.find_string("garbage", hash_string("garbage")).is_none());
    }

    #[test]
    fn test_globals_keys_and_values_are_roots() {
        let mut manager = ObjectManager::new();
        let mut globals = Table::new();
        let (name, _) = manager.alloc_string("g", hash_string("g"));
        let (value, _) = manager.alloc_string("held", hash_string("held"));
        globals.set(name, make_object_value(value as *mut Object));

        let mut gc = GarbageCollector::new();
        let stack = [make_nil_value(); 1];
        let mut interns = Table::new();

        collect(&mut gc, &mut manager, &stack, 0, &globals, &mut interns, &[]);
        assert_eq!(manager.object_count(), 2, "Global key and value should survive");
    }

    #[test]
    fn test_stats_record_cycle() {
        let mut gc = GarbageCollector::new();
        assert_eq!(gc.stats().cycles, 0);
        gc.record_cycle(1000, 400, 600, 1200);
        assert_eq!(gc.stats().cycles, 1);
        assert_eq!(gc.stats().last_before_bytes, 1000);
        assert_eq!(gc.stats().last_freed_bytes, 400);
        assert_eq!(gc.stats().last_after_bytes, 600);
        assert_eq!(gc.stats().last_next_trigger_bytes, 1200);
        assert_eq!(gc.stats().total_freed_bytes, 400);
    }
}
