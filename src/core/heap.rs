//! Per-message object arena.
//!
//! Every object a message carries lives in one [`Heap`] slot and is addressed
//! by its [`ObjectId`]. References between objects are ids, so a cycle is two
//! slots pointing at each other's index; identity is id equality.
//!
//! Slots hold any [`Object`]: the generic [`Record`] or an application type
//! handled by a registered mutator.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;

use dyn_clone::DynClone;
use indexmap::IndexMap;

use crate::core::value::{ObjectId, Value};

/// Anything that can sit in a heap slot.
///
/// Implemented for every `Clone + Debug + Send + Sync + 'static` type.
pub trait Object: Any + DynClone + fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> Object for T
where
    T: Any + Clone + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

dyn_clone::clone_trait_object!(Object);

impl dyn Object {
    pub fn is<T: Object>(&self) -> bool {
        <dyn Object as Object>::as_any(self).is::<T>()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        <dyn Object as Object>::as_any(self).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Object>(&mut self) -> Option<&mut T> {
        <dyn Object as Object>::as_any_mut(self).downcast_mut::<T>()
    }
}

/// Generic object: named fields in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a field. A replaced field keeps its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    type_name: String,
    instance: Box<dyn Object>,
}

/// Arena of objects owned by one message.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    slots: Vec<Slot>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store an application object under `type_name`.
    pub fn insert<T: Object>(&mut self, type_name: impl Into<String>, instance: T) -> ObjectId {
        self.insert_boxed(type_name.into(), Box::new(instance))
    }

    /// Store a generic record under `type_name`.
    pub fn insert_record(&mut self, type_name: impl Into<String>, record: Record) -> ObjectId {
        self.insert(type_name, record)
    }

    pub(crate) fn insert_boxed(&mut self, type_name: String, instance: Box<dyn Object>) -> ObjectId {
        let id = ObjectId(self.slots.len() as u32);
        self.slots.push(Slot {
            type_name,
            instance,
        });
        id
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.slots.len()
    }

    pub fn type_name(&self, id: ObjectId) -> Option<&str> {
        self.slots.get(id.index()).map(|s| s.type_name.as_str())
    }

    pub fn object(&self, id: ObjectId) -> Option<&dyn Object> {
        self.slots.get(id.index()).map(|s| &*s.instance)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut dyn Object> {
        self.slots.get_mut(id.index()).map(|s| &mut *s.instance)
    }

    pub fn get<T: Object>(&self, id: ObjectId) -> Option<&T> {
        self.object(id)?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Object>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.object_mut(id)?.downcast_mut::<T>()
    }

    pub fn record(&self, id: ObjectId) -> Option<&Record> {
        self.get::<Record>(id)
    }

    pub fn record_mut(&mut self, id: ObjectId) -> Option<&mut Record> {
        self.get_mut::<Record>(id)
    }

    /// Structural equality of `a` (in `self`) and `b` (in `other`).
    ///
    /// Objects compare by type name and, for records, field by field. A pair of
    /// objects already under comparison is assumed equal, which makes cyclic
    /// graphs terminate. Non-record objects are equal only if both sides are the
    /// same slot of the same heap.
    pub fn graph_eq(&self, a: &Value, other: &Heap, b: &Value) -> bool {
        let mut visiting = HashSet::new();
        self.graph_eq_inner(a, other, b, &mut visiting)
    }

    fn graph_eq_inner(
        &self,
        a: &Value,
        other: &Heap,
        b: &Value,
        visiting: &mut HashSet<(ObjectId, ObjectId)>,
    ) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => {
                if !visiting.insert((*x, *y)) {
                    return true;
                }
                if self.type_name(*x) != other.type_name(*y) {
                    return false;
                }
                match (self.record(*x), other.record(*y)) {
                    (Some(ra), Some(rb)) => {
                        ra.len() == rb.len()
                            && ra.fields.iter().zip(rb.fields.iter()).all(
                                |((na, va), (nb, vb))| {
                                    na == nb && self.graph_eq_inner(va, other, vb, visiting)
                                },
                            )
                    }
                    (None, None) => std::ptr::eq(self, other) && x == y,
                    _ => false,
                }
            }
            (Value::Array(xs), Value::Array(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(x, y)| self.graph_eq_inner(x, other, y, visiting))
            }
            (Value::Map(xs), Value::Map(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|((kx, vx), (ky, vy))| {
                        self.graph_eq_inner(kx, other, ky, visiting)
                            && self.graph_eq_inner(vx, other, vy, visiting)
                    })
            }
            _ => a == b,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
    }

    #[test]
    fn test_insert_and_downcast() {
        let mut heap = Heap::new();
        let id = heap.insert("Point", Point { x: 4 });
        assert_eq!(heap.type_name(id), Some("Point"));
        assert_eq!(heap.get::<Point>(id), Some(&Point { x: 4 }));
        assert!(heap.record(id).is_none());

        heap.get_mut::<Point>(id).unwrap().x = 9;
        assert_eq!(heap.get::<Point>(id).unwrap().x, 9);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut heap = Heap::new();
        let id = heap.insert_record("R", Record::new().with("n", 1i32));
        let mut copy = heap.clone();
        copy.record_mut(id).unwrap().set("n", 2i32);
        assert_eq!(heap.record(id).unwrap().get("n"), Some(&Value::I32(1)));
    }

    #[test]
    fn test_graph_eq_terminates_on_cycles() {
        let mut left = Heap::new();
        let a = left.insert_record("Node", Record::new());
        left.record_mut(a).unwrap().set("self", a);

        let mut right = Heap::new();
        let b = right.insert_record("Node", Record::new());
        right.record_mut(b).unwrap().set("self", b);

        assert!(left.graph_eq(&Value::Object(a), &right, &Value::Object(b)));
    }

    #[test]
    fn test_graph_eq_detects_field_difference() {
        let mut left = Heap::new();
        let a = left.insert_record("Node", Record::new().with("v", 1i64));
        let mut right = Heap::new();
        let b = right.insert_record("Node", Record::new().with("v", 2i64));
        assert!(!left.graph_eq(&Value::Object(a), &right, &Value::Object(b)));
    }
}
